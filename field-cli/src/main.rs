//! # livefield
//!
//! CLI tool for inspecting and driving livefield devices.
//!
//! ## Commands
//!
//! - `decode`: Decode an encoding string into a field descriptor
//! - `fetch`: Fetch a form and print its decoded fields
//! - `watch`: Run a push session and print inbound payloads
//! - `send`: Send field updates over the push channel
//!
//! ## Example
//!
//! ```bash
//! # Decode an encoding
//! livefield decode rate "number;rw;mn=0;mx=100"
//!
//! # Fetch the fields of a form
//! livefield --config livefield.toml fetch --form pzemForm
//!
//! # Follow live updates, routed through the form's fields
//! livefield watch --form pzemForm
//!
//! # Switch the light on
//! livefield send led=true level=80
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use field_client::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{decode, fetch, send, watch};

/// CLI tool for inspecting and driving livefield devices.
#[derive(Parser, Debug)]
#[command(name = "livefield")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `livefield_client=trace` (default: RUST_LOG, then `info`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode an encoding string into a field descriptor
    Decode {
        /// Field name
        name: String,
        /// Encoding string, e.g. "number;rw;mn=0;mx=100"
        encoding: String,
    },

    /// Fetch a form and print its decoded fields
    Fetch {
        /// Form endpoint name under the REST base URL
        #[arg(long)]
        form: String,
    },

    /// Run a push session and print inbound payloads
    Watch {
        /// Route payloads through this form's fields and print reconciled values
        #[arg(long)]
        form: Option<String>,

        /// Push channel URL (overrides the config file)
        #[arg(long)]
        url: Option<String>,
    },

    /// Send field updates over the push channel
    Send {
        /// Assignments as key=value; values are parsed as JSON when possible
        #[arg(required = true)]
        assignments: Vec<String>,

        /// Push channel URL (overrides the config file)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Decode { name, encoding } => {
            decode::run(&name, &encoding)?;
        }
        Commands::Fetch { form } => {
            fetch::run(&config, &form).await?;
        }
        Commands::Watch { form, url } => {
            if let Some(url) = url {
                config.push.url = url;
            }
            watch::run(&config, form.as_deref()).await?;
        }
        Commands::Send { assignments, url } => {
            if let Some(url) = url {
                config.push.url = url;
            }
            send::run(&config, &assignments).await?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
