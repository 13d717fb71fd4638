use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

use chainsim::flavor::{exit_on_fatal, process_loader, PluginManifest};
use chainsim::rpc::JsonRpcRequest;
use chainsim::HostConfig;

/// Load a chain flavor and run one JSON-RPC method against it.
///
/// Without a method, lists the methods the flavor serves.
#[derive(Parser)]
#[command(name = "chainsim")]
#[command(version, about)]
struct Cli {
    /// Host configuration file (.json, .yaml or .yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flavor to load, overriding the configuration
    #[arg(short, long)]
    flavor: Option<String>,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// JSON-RPC method to call
    method: Option<String>,

    /// Method params as JSON
    params: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => HostConfig::from_file(path)?,
        None => HostConfig::default(),
    };
    if let Some(flavor) = args.flavor {
        config.options = config.options.with_flavor(flavor);
        config.validate()?;
    }
    config.quiet |= args.quiet;

    // Set up logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(config.tracing_level()?)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default tracing subscriber")?;

    let loader = process_loader();
    if let Some(path) = &config.plugin_manifest {
        loader.registry().apply_manifest(&PluginManifest::from_file(path)?);
    }

    let host = exit_on_fatal(loader.load(&config), |code| std::process::exit(code))?;
    host.ready().await?;

    let Some(method) = args.method else {
        for name in host.connector().methods().names() {
            println!("{}", name);
        }
        host.shutdown();
        return Ok(());
    };
    let params = match &args.params {
        Some(raw) => Some(serde_json::from_str::<Value>(raw).context("params must be JSON")?),
        None => None,
    };

    let response = host
        .handle_request(JsonRpcRequest::new(method, params, Value::from(1)))
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    host.shutdown();

    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
