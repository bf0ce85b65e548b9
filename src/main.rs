use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use dom_bridge::chrome::{BrowserSession, ChromeHost};
use dom_bridge::config::BridgeConfig;
use dom_bridge::server::{self, BridgeHost};
use dom_bridge::{ActionRequest, Bridge, MemoryDocument, logging};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dom-bridge", version, about = "Inspect and drive web pages")]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the actionable elements of the page.
    Scan(SourceArgs),
    /// Print url, title and balance hint.
    State(SourceArgs),
    /// Run one or more actions given as JSON, in order.
    Perform {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long = "action", required = true, value_name = "JSON")]
        actions: Vec<String>,
    },
    /// Save a PNG of a live page.
    Screenshot {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "screenshot.png")]
        out: PathBuf,
    },
    /// Expose the bridge over HTTP.
    Serve(SourceArgs),
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Open this URL in Chrome.
    #[arg(long)]
    url: Option<String>,
    /// Load this HTML file offline.
    #[arg(long)]
    html: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = BridgeConfig::from_env()?;

    match cli.command {
        Command::Scan(source) => {
            let host = open_host(&source, &config).await?;
            print_json(&host.scan().await?)
        }
        Command::State(source) => {
            let host = open_host(&source, &config).await?;
            print_json(&host.state().await?)
        }
        Command::Perform { source, actions } => {
            let requests = actions
                .iter()
                .map(|raw| {
                    serde_json::from_str(raw)
                        .map(ActionRequest::from_json)
                        .with_context(|| format!("invalid action JSON: {raw}"))
                })
                .collect::<Result<Vec<_>>>()?;
            let host = open_host(&source, &config).await?;
            print_json(&host.perform(requests).await?)
        }
        Command::Screenshot { url, out } => {
            let host = launch(&url, &config).await?;
            host.screenshot(&out).await
        }
        Command::Serve(source) => {
            let host = open_host(&source, &config).await?;
            server::serve(host, &config.server).await
        }
    }
}

async fn open_host(source: &SourceArgs, config: &BridgeConfig) -> Result<Arc<dyn BridgeHost>> {
    match (&source.url, &source.html) {
        (Some(url), _) => Ok(Arc::new(launch(url, config).await?)),
        (None, Some(path)) => {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let url = format!("file://{}", path.display());
            let mut doc = MemoryDocument::parse_html(url, &html);
            doc.flow_layout();
            info!(path = %path.display(), "loaded offline page");
            let bridge = Bridge::inject(doc, config.actions)?;
            Ok(Arc::new(Mutex::new(bridge)))
        }
        (None, None) => Err(anyhow!("either --url or --html is required")),
    }
}

async fn launch(url: &str, config: &BridgeConfig) -> Result<ChromeHost> {
    let chrome = config.chrome.clone();
    let url = url.to_string();
    let session = tokio::task::spawn_blocking(move || {
        let session = BrowserSession::launch(&chrome)?;
        session.navigate(&url)?;
        Ok::<_, anyhow::Error>(session)
    })
    .await
    .map_err(|e| anyhow!("browser launch panicked: {e}"))??;
    Ok(ChromeHost::new(session, config.actions))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
