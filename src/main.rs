//! `nanuri-proxy` CLI - search the portal and resolve streams from the shell

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use nanuri_proxy::search::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use nanuri_proxy::{Config, NanuriProxy, ProxyError, SearchQuery};

#[derive(Parser)]
#[command(name = "nanuri-proxy")]
#[command(about = "Search the KTV nanuri portal and resolve HLS streams")]
#[command(version)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the catalog by keyword
    Search {
        keyword: String,

        /// Number of result pages to fetch
        #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
        max_pages: u32,

        /// Results requested per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,

        /// Include a snapshot of the first result page
        #[arg(long)]
        debug: bool,
    },

    /// Resolve a detail reference from a search result to its playlist
    Resolve {
        /// Value of `detailUrl` from a search result
        detail_ref: String,
    },

    /// Report session and credential presence without logging in
    AuthStatus,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(proxy_error) = e.downcast_ref::<ProxyError>() {
                if let Err(write_error) = print_json(&proxy_error.to_payload(), cli.pretty) {
                    warn!(error = %write_error, "Could not write error payload");
                }
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let proxy = NanuriProxy::new(config)?;

    match &cli.command {
        Commands::Search {
            keyword,
            max_pages,
            page_size,
            debug,
        } => {
            let query = SearchQuery {
                keyword: keyword.clone(),
                max_pages: *max_pages,
                page_size: *page_size,
                debug: *debug,
            };
            let outcome = proxy.search(&query).await?;
            print_json(&outcome, cli.pretty)
        }
        Commands::Resolve { detail_ref } => {
            let stream = proxy.resolve_stream(detail_ref).await?;
            print_json(&stream, cli.pretty)
        }
        Commands::AuthStatus => print_json(&proxy.auth_status().await, cli.pretty),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    write_json(&mut std::io::stdout().lock(), value, pretty)
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out).context("failed to write output")?;
    out.flush().context("failed to flush output")
}
