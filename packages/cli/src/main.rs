#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Wake County dispatch service.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use wake_dispatch_ingest::{Feed, HttpStreamFeed, IngestionPipeline, JsonLinesFeed};
use wake_dispatch_models::RawMessage;
use wake_dispatch_resolver::CoordinateResolver;
use wake_dispatch_server::AppState;
use wake_dispatch_store::Store;

use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "wake_dispatch",
    about = "Wake County dispatch feed ingester and GeoJSON server"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct ServerArgs {
    /// Address to listen on (overrides `HOST`)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides `PORT`)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the store, ingest the feed and serve the API (default)
    Run {
        #[command(flatten)]
        server: ServerArgs,
        /// Read newline-delimited statuses from this file (`-` for stdin)
        /// instead of the configured stream
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Ingest the feed without serving the API
    Ingest {
        /// Read newline-delimited statuses from this file (`-` for stdin)
        /// instead of the configured stream
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Serve the API without ingesting
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Create the database and its `timestamp` view if missing
    Setup,
    /// Parse a dispatch message and print the call record as JSON
    Parse {
        /// Message text, e.g. "03/26 13:01 / 9600 Falls of Neuse Rd, RA https://t.co/x / Cardiac (FHEART) / T17 / 028V / RFE22"
        text: String,
        /// Status id used for the record id and permalink
        #[arg(long, default_value = "0")]
        id: String,
    },
    /// Follow a map link's redirects and print the coordinate as JSON
    Resolve {
        /// Shortened map link, e.g. `https://t.co/afz1yPj1vV`
        url: String,
    },
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command.unwrap_or(Commands::Run {
        server: ServerArgs::default(),
        input: None,
    }) {
        Commands::Run { server, input } => run(&settings, &server, input.as_deref()).await,
        Commands::Ingest { input } => ingest(&settings, input.as_deref()).await,
        Commands::Serve { server } => {
            let store = open_store(&settings).await?;
            serve(&settings, &server, store).await
        }
        Commands::Setup => {
            open_store(&settings).await?;
            Ok(())
        }
        Commands::Parse { text, id } => {
            let raw = RawMessage::new(id, settings.feed.source_handle.as_str(), text, 0);
            let record = wake_dispatch_parser::parse(&raw)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Resolve { url } => {
            let resolver = CoordinateResolver::new(settings.resolver_config())?;
            let coordinate = resolver.resolve(&url).await?;
            println!("{}", serde_json::to_string_pretty(&coordinate)?);
            Ok(())
        }
    }
}

/// Opens the configured store and prepares its database.
async fn open_store(settings: &Settings) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let store = wake_dispatch_store::open(&settings.store_config())?;
    store.setup().await?;
    log::info!("Store '{}' ready", store.name());
    Ok(store)
}

/// Opens the feed: `input` if given, else the configured stream, else stdin.
async fn open_feed(
    settings: &Settings,
    input: Option<&Path>,
) -> Result<Box<dyn Feed>, Box<dyn std::error::Error>> {
    match input {
        Some(path) if path == Path::new("-") => Ok(Box::new(JsonLinesFeed::stdin())),
        Some(path) => {
            log::info!("Reading statuses from {}", path.display());
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(JsonLinesFeed::new(tokio::io::BufReader::new(file))))
        }
        None => match settings.stream_config() {
            Some(config) => {
                let client = reqwest::Client::builder().build()?;
                Ok(Box::new(HttpStreamFeed::connect(&client, &config).await?))
            }
            None => {
                log::info!("No FEED_URL configured; reading statuses from stdin");
                Ok(Box::new(JsonLinesFeed::stdin()))
            }
        },
    }
}

fn pipeline(
    settings: &Settings,
    store: Arc<dyn Store>,
) -> Result<IngestionPipeline, Box<dyn std::error::Error>> {
    let resolver = CoordinateResolver::new(settings.resolver_config())?;
    Ok(IngestionPipeline::new(resolver, store))
}

async fn serve(
    settings: &Settings,
    args: &ServerArgs,
    store: Arc<dyn Store>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = settings.server_config();
    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let state = AppState {
        store,
        title_prefix: settings.collection.title.clone(),
    };
    wake_dispatch_server::run_server(state, &config).await?;
    Ok(())
}

async fn ingest(settings: &Settings, input: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(settings).await?;
    let pipeline = pipeline(settings, store)?;
    let feed = open_feed(settings, input).await?;

    tokio::select! {
        received = pipeline.run(feed) => {
            log::info!("Feed ended after {received} message(s)");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
        }
    }
    Ok(())
}

async fn run(
    settings: &Settings,
    args: &ServerArgs,
    input: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(settings).await?;
    let pipeline = pipeline(settings, Arc::clone(&store))?;
    let feed = open_feed(settings, input).await?;

    let ingestion = tokio::spawn(async move {
        let received = pipeline.run(feed).await;
        log::info!("Feed ended after {received} message(s); still serving");
    });

    let served = serve(settings, args, store).await;
    ingestion.abort();
    log::info!("Cleanup finished, shutting down");
    served
}
