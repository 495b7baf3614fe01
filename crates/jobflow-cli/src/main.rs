//! jobflow - Command-line tool for remote processing jobs
//!
//! Submits images and documents to the processing backend, shows progress
//! while the job runs, and prints where the result can be fetched.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobflow_client::{ClientConfig, FileCredentials, JobClient, JobError, Operation};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "jobflow")]
#[command(author, version, about = "Submit and track remote processing jobs")]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL, including any API path prefix
    #[arg(short, long, env = "JOBFLOW_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "JOBFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        /// Account name
        username: String,

        /// Account password
        #[arg(long, env = "JOBFLOW_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session token
    Logout,

    /// List processing operations and their point costs
    Operations {
        /// Bypass the cached cost table
        #[arg(long)]
        refresh: bool,
    },

    /// Submit a job and wait for the result
    Submit {
        /// Operation name (see `jobflow operations`)
        operation: Operation,

        /// Local file or URL of the source
        source: String,

        /// Send the local file inside the request instead of uploading it first
        #[arg(long)]
        inline: bool,

        /// Operation parameter, repeatable (e.g. --param prompt=beach)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Read the status of a job once
    Status {
        /// Operation the job was submitted to
        operation: Operation,

        /// Job ID
        job: String,
    },

    /// Wait for a previously submitted job
    Poll {
        /// Operation the job was submitted to
        operation: Operation,

        /// Job ID
        job: String,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.server.as_deref(),
        cli.output.map(OutputFormat::name),
        cli.no_color,
    )?;

    // Create output context
    let format = OutputFormat::from_name(&merged.output);
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let client = create_client(&merged)?;

    let result = match &cli.command {
        Commands::Login { username, password } => {
            commands::login(&client, username, password, &ctx).await
        }

        Commands::Logout => commands::logout(&client, &ctx),

        Commands::Operations { refresh } => commands::operations(&client, *refresh, &ctx).await,

        Commands::Submit {
            operation,
            source,
            inline,
            params,
        } => commands::submit(&client, *operation, source, *inline, params, &ctx).await,

        Commands::Status { operation, job } => {
            commands::status(&client, *operation, job, &ctx).await
        }

        Commands::Poll { operation, job } => commands::poll(&client, *operation, job, &ctx).await,
    };

    result.map_err(|e| {
        let expired = e
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<JobError>(), Some(JobError::SessionExpired)));
        if expired {
            e.context("Not logged in or session expired; run `jobflow login`")
        } else {
            e
        }
    })
}

/// Create a job client that keeps its token in the configured file
fn create_client(merged: &MergedConfig) -> Result<JobClient> {
    let mut builder = ClientConfig::builder(&merged.server);
    if let Some(ms) = merged.poll_interval_ms {
        builder = builder.poll_interval_ms(ms);
    }
    if let Some(attempts) = merged.max_attempts {
        builder = builder.max_attempts(attempts);
    }

    debug!(
        "Using server {} with token file {}",
        merged.server,
        merged.token_file.display()
    );
    let credentials = Arc::new(FileCredentials::new(&merged.token_file));
    JobClient::with_credentials(builder.build(), credentials).context("Failed to create job client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("prompt=sunny beach").unwrap(),
            ("prompt".to_string(), "sunny beach".to_string())
        );
        assert_eq!(
            parse_key_val("mask=a=b").unwrap(),
            ("mask".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "jobflow",
            "--server",
            "http://localhost:8000/api",
            "submit",
            "watermark_auto",
            "https://cdn.example.com/a.png",
            "-p",
            "return_type=2",
        ])
        .unwrap();

        match cli.command {
            Commands::Submit {
                operation, params, ..
            } => {
                assert_eq!(operation, Operation::WatermarkAuto);
                assert_eq!(params, vec![("return_type".to_string(), "2".to_string())]);
            }
            _ => panic!("expected submit"),
        }
    }
}
