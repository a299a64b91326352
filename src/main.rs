use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use zipinfo::config::Config;
use zipinfo::fetch::HttpFetcher;
use zipinfo::ingest::Ingestor;
use zipinfo::server::{self, sanitize_entry_path};

#[derive(Parser)]
#[command(
    name = "zipinfo",
    version,
    about = "List and read files inside remote ZIP and tar.gz archives"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind, overriding the config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Download an archive and list its entries
    Ls {
        url: String,
    },
    /// Print a file from a previously listed archive
    Cat {
        url: String,
        path: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zipinfo=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            server::run_server(&config).await
        }
        Command::Ls { url } => {
            let paths = ingestor(&config)?.ingest(&url).await?;
            for path in paths {
                if path.ends_with('/') {
                    println!("{}", path.blue().bold());
                } else {
                    println!("{path}");
                }
            }
            Ok(())
        }
        Command::Cat { url, path } => {
            let path = sanitize_entry_path(&path).ok_or_else(|| anyhow!("Invalid path: {path}"))?;
            let bytes = ingestor(&config)?
                .content(&url, &path)
                .await
                .with_context(|| {
                    format!("{path} is not cached for {url}; run `zipinfo ls` first")
                })?;

            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => print!("{text}"),
                Err(_) => {
                    eprintln!("Warning: File contains binary data");
                    let display_len = bytes.len().min(1024);
                    for (i, byte) in bytes[..display_len].iter().enumerate() {
                        if i % 16 == 0 {
                            print!("\n{i:08x}: ");
                        }
                        print!("{byte:02x} ");
                    }
                    println!();
                    if bytes.len() > 1024 {
                        eprintln!("... ({} more bytes)", bytes.len() - 1024);
                    }
                }
            }
            Ok(())
        }
    }
}

fn ingestor(config: &Config) -> Result<Ingestor> {
    let fetcher = HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?;
    Ok(Ingestor::new(config, Arc::new(fetcher)))
}
