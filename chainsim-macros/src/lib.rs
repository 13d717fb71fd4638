use proc_macro::TokenStream;
use proc_macro_error::{abort, abort_call_site, proc_macro_error};
use quote::{format_ident, quote};
use syn::{parse_macro_input, punctuated::Punctuated, Expr, ItemStruct, Lit, Meta, Token};

const ID: &str = "id";
const PACKAGE: &str = "package";
const ALIASES: &str = "aliases";
const PACKAGING: &str = "packaging";
const LEGACY: &str = "legacy";
const RPC_ENDPOINT: &str = "rpc_endpoint";
const PORT: &str = "port";
const SCHEMA: &str = "schema";

fn lit_str(expr: &Expr, what: &str) -> String {
    if let Expr::Lit(expr_lit) = expr {
        if let Lit::Str(lit) = &expr_lit.lit {
            return lit.value();
        }
    }
    abort!(expr, "Expected a string literal for {}", what)
}

fn lit_port(expr: &Expr) -> u16 {
    if let Expr::Lit(expr_lit) = expr {
        if let Lit::Int(lit) = &expr_lit.lit {
            return lit
                .base10_parse::<u16>()
                .unwrap_or_else(|_| abort!(expr_lit, "Expected a u16 for port"));
        }
    }
    abort!(expr, "Expected an integer for port")
}

/// Register a connector type as a flavor plugin.
///
/// The struct must provide
/// `fn new(options: &chainsim::config::ConnectorOptions) -> chainsim::Result<Self>`
/// and implement `Connector` (or `LegacyConnector` when `legacy` is given).
/// The crate using the attribute must depend on `linkme`.
///
/// ```ignore
/// #[flavor_plugin(id = "filecoin", package = "chainsim-filecoin", packaging = "default",
///                 legacy, rpc_endpoint = "/rpc/v0", port = 7777)]
/// pub struct FilecoinConnector { /* ... */ }
/// ```
#[proc_macro_attribute]
#[proc_macro_error]
pub fn flavor_plugin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args =
        syn::parse::Parser::parse2(Punctuated::<Meta, Token![,]>::parse_terminated, attr.into())
            .unwrap_or_else(|e| abort!(e.span(), "Failed to parse flavor_plugin attributes: {}", e));
    let input = parse_macro_input!(item as ItemStruct);

    let mut id: Option<String> = None;
    let mut package: Option<String> = None;
    let mut aliases: Vec<String> = Vec::new();
    let mut nested = false;
    let mut legacy = false;
    let mut rpc_endpoint = "/".to_string();
    let mut port: u16 = 8545;
    let mut schema: Option<syn::Path> = None;

    for meta in &attr_args {
        match meta {
            Meta::Path(path) if path.is_ident(LEGACY) => legacy = true,
            Meta::NameValue(nv) => {
                if nv.path.is_ident(ID) {
                    id = Some(lit_str(&nv.value, ID));
                } else if nv.path.is_ident(PACKAGE) {
                    package = Some(lit_str(&nv.value, PACKAGE));
                } else if nv.path.is_ident(ALIASES) {
                    aliases = lit_str(&nv.value, ALIASES)
                        .split(',')
                        .map(|alias| alias.trim().to_string())
                        .filter(|alias| !alias.is_empty())
                        .collect();
                } else if nv.path.is_ident(PACKAGING) {
                    nested = match lit_str(&nv.value, PACKAGING).as_str() {
                        "direct" => false,
                        "default" => true,
                        _ => abort!(nv.value, "packaging must be \"direct\" or \"default\""),
                    };
                } else if nv.path.is_ident(RPC_ENDPOINT) {
                    rpc_endpoint = lit_str(&nv.value, RPC_ENDPOINT);
                } else if nv.path.is_ident(PORT) {
                    port = lit_port(&nv.value);
                } else if nv.path.is_ident(SCHEMA) {
                    let path = lit_str(&nv.value, SCHEMA);
                    schema = Some(syn::parse_str(&path).unwrap_or_else(|e| {
                        abort!(nv.value, "Invalid schema function path: {}", e)
                    }));
                } else {
                    abort!(nv.path, "Unknown flavor_plugin attribute");
                }
            }
            other => abort!(other, "Unsupported flavor_plugin attribute"),
        }
    }

    let id = id.unwrap_or_else(|| abort_call_site!("flavor_plugin requires an `id`"));
    let package = package.unwrap_or_else(|| id.clone());

    let struct_name = &input.ident;
    let prefix = format!("__CHAINSIM_{}", struct_name.to_string().to_uppercase());
    let factory_name = format_ident!("{}_factory", prefix.to_lowercase());
    let descriptor_name = format_ident!("{}_DESCRIPTOR", prefix);
    let inner_name = format_ident!("{}_INNER", prefix);
    let registration_name = format_ident!("{}_REGISTRATION", prefix);

    let connector = if legacy {
        quote! { ::chainsim::flavor::LegacyConnectorAdapter::new(connector) }
    } else {
        quote! { connector }
    };

    let option_schema = match &schema {
        Some(path) => quote! { ::std::option::Option::Some(#path) },
        None => quote! { ::std::option::Option::None },
    };

    let registration = if nested {
        quote! {
            #[doc(hidden)]
            #[allow(non_upper_case_globals)]
            static #inner_name: ::chainsim::flavor::PluginModule =
                ::chainsim::flavor::PluginModule::direct(#package, &#descriptor_name);

            #[doc(hidden)]
            #[allow(non_upper_case_globals)]
            #[::linkme::distributed_slice(::chainsim::flavor::FLAVOR_PLUGINS)]
            static #registration_name: ::chainsim::flavor::PluginModule =
                ::chainsim::flavor::PluginModule::nested(#package, &#inner_name);
        }
    } else {
        quote! {
            #[doc(hidden)]
            #[allow(non_upper_case_globals)]
            #[::linkme::distributed_slice(::chainsim::flavor::FLAVOR_PLUGINS)]
            static #registration_name: ::chainsim::flavor::PluginModule =
                ::chainsim::flavor::PluginModule::direct(#package, &#descriptor_name);
        }
    };

    let expanded = quote! {
        #input

        #[doc(hidden)]
        fn #factory_name(
            options: &::chainsim::config::ConnectorOptions,
        ) -> ::chainsim::Result<::std::boxed::Box<dyn ::chainsim::flavor::Connector>> {
            let connector = #struct_name::new(options)?;
            ::std::result::Result::Ok(::std::boxed::Box::new(#connector))
        }

        #[doc(hidden)]
        #[allow(non_upper_case_globals)]
        pub static #descriptor_name: ::chainsim::flavor::FlavorDescriptor =
            ::chainsim::flavor::FlavorDescriptor {
                id: #id,
                aliases: &[#(#aliases),*],
                factory: #factory_name,
                option_schema: #option_schema,
                server_defaults: ::chainsim::flavor::ServerDefaults::new(#rpc_endpoint, #port),
            };

        #registration
    };

    TokenStream::from(expanded)
}
