//! User-facing report for flavors that cannot be found

use std::io::Write;

use crate::core::errors::{ChainsimError, Result};

const NEED_HELP: &str = "Need help? Run `chainsim --help` or open an issue on the chainsim repository.";

/// Human readable diagnostic for a fatal load error, `None` for anything else
pub fn fatal_diagnostic(err: &ChainsimError) -> Option<String> {
    let ChainsimError::FlavorNotInstalled { flavor, package } = err else {
        return None;
    };
    Some(format!(
        "\n\nERROR: Could not find chainsim flavor \"{flavor}\"; it probably\n\
         needs to be installed.\n \
         ▸ if you're using chainsim as a library, add the plugin crate:\n   \
         $ cargo add {package}\n \
         ▸ if you're using chainsim as a CLI, rebuild it with the plugin linked in:\n   \
         $ cargo install chainsim --features {package}\n\n\
         {NEED_HELP}\n\n"
    ))
}

/// Pass through `result`, except that a fatal flavor error is printed to
/// `out` and handed to `exit` with status 1.
///
/// When `exit` returns (as it does under test), the error is returned too.
pub fn exit_on_fatal_with<T, W, F>(result: Result<T>, out: &mut W, exit: F) -> Result<T>
where
    W: Write,
    F: FnOnce(i32),
{
    match result {
        Err(err) if err.is_fatal() => {
            if let Some(message) = fatal_diagnostic(&err) {
                // Best effort; the exit below is what matters.
                let _ = out.write_all(message.as_bytes());
                let _ = out.flush();
            }
            tracing::error!(error = %err, "Fatal flavor error");
            exit(1);
            Err(err)
        }
        other => other,
    }
}

/// [`exit_on_fatal_with`] writing to stderr
pub fn exit_on_fatal<T, F>(result: Result<T>, exit: F) -> Result<T>
where
    F: FnOnce(i32),
{
    exit_on_fatal_with(result, &mut std::io::stderr(), exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_names_flavor_and_package() {
        let err = ChainsimError::flavor_not_installed("tezos", "chainsim-tezos");
        let message = fatal_diagnostic(&err).unwrap();
        assert!(message.contains("Could not find chainsim flavor \"tezos\""));
        assert!(message.contains("$ cargo add chainsim-tezos"));
        assert!(message.contains("--features chainsim-tezos"));
        assert!(message.trim_end().ends_with(NEED_HELP));
    }

    #[test]
    fn test_non_fatal_passes_through() {
        let mut out = Vec::new();
        let mut exited = None;
        let result: Result<()> = exit_on_fatal_with(
            Err(ChainsimError::flavor_malformed("broken", "no export")),
            &mut out,
            |code| exited = Some(code),
        );
        assert!(result.is_err());
        assert!(exited.is_none());
        assert!(out.is_empty());

        let ok = exit_on_fatal_with(Ok(5), &mut out, |code| exited = Some(code)).unwrap();
        assert_eq!(ok, 5);
        assert!(exited.is_none());
    }

    #[test]
    fn test_fatal_prints_and_exits() {
        let mut out = Vec::new();
        let mut exited = None;
        let result: Result<()> = exit_on_fatal_with(
            Err(ChainsimError::flavor_not_installed("tezos", "tezos")),
            &mut out,
            |code| exited = Some(code),
        );
        assert!(result.is_err());
        assert_eq!(exited, Some(1));
        assert!(String::from_utf8(out).unwrap().contains("\"tezos\""));
    }
}
