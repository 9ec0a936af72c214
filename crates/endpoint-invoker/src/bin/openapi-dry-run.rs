//! Compile an OpenAPI/Swagger document and print what an invoker would expose
//!
//! Output is one JSON object: the registry summary plus the merged-argument
//! tool schema of every endpoint that survives the filters.

use clap::Parser;
use serde_json::json;
use tracing::info;

use endpoint_invoker::EndpointFilter;
use openapi_endpoints::{DocumentLoader, EndpointRegistry};

/// OpenAPI dry run - list compiled endpoints without calling anything
#[derive(Parser, Debug)]
#[command(name = "openapi-dry-run")]
#[command(version)]
#[command(about = "Compile an OpenAPI/Swagger document and print its endpoints as JSON")]
struct Args {
    /// Document file path, http(s) URL, or inline JSON/YAML text
    source: String,

    /// Keep only endpoints whose base URL equals this value
    #[arg(long, env = "OPENAPI_SERVER_URL")]
    server_url: Option<String>,

    /// Keep only paths matching this regex (anchored at the start)
    #[arg(long)]
    include: Option<String>,

    /// Drop paths matching this regex (anchored at the start)
    #[arg(long)]
    exclude: Option<String>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut registry = load(&args.source).await?;

    let mut filter = EndpointFilter::new();
    if let Some(server_url) = &args.server_url {
        filter = filter.server_url(server_url.as_str());
    }
    if let Some(pattern) = &args.include {
        filter = filter.include(pattern)?;
    }
    if let Some(pattern) = &args.exclude {
        filter = filter.exclude(pattern)?;
    }
    filter.apply(&mut registry);

    info!(
        "{} endpoint(s) selected from {}",
        registry.len(),
        registry.info().title
    );

    let output = json!({
        "registry": registry.to_json(),
        "tools": registry
            .combined()
            .iter()
            .map(|tool| json!({
                "name": tool.operation_id,
                "description": tool.tool_description(),
                "inputSchema": tool.input_schema,
                "endpoint": tool,
            }))
            .collect::<Vec<_>>(),
    });

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    Ok(())
}

async fn load(source: &str) -> Result<EndpointRegistry, Box<dyn std::error::Error>> {
    let registry = if source.starts_with("http://") || source.starts_with("https://") {
        DocumentLoader::compile_url(source).await?
    } else {
        DocumentLoader::compile(source)?
    };
    Ok(registry)
}
