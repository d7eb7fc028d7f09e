//! heimdall — inspect configuration, fingerprints and pricing

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use heimdall::config::Config;
use heimdall::{CostLedger, GenerateRequest, RequestParams, SystemClock};

/// Heimdall admission layer tooling
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version = heimdall::version::PKG_VERSION)]
#[command(about = "Admission and resilience layer for LLM providers")]
struct Args {
    /// Config file (default: ~/.heimdall/config.toml, then /etc/heimdall/config.toml)
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved configuration as JSON
    Config,

    /// Print the cache fingerprint of a request
    Fingerprint {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        #[arg(short, long, default_value = heimdall::types::DEFAULT_MODEL)]
        model: String,
        #[arg(short, long, default_value_t = heimdall::types::DEFAULT_TEMPERATURE)]
        temperature: f64,
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// List per-model pricing
    Models,

    /// Estimate the cost of a request before sending it
    Estimate {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        #[arg(short, long, default_value = heimdall::types::DEFAULT_MODEL)]
        model: String,
        /// Expected completion length in characters
        #[arg(long, default_value_t = 0)]
        completion_chars: usize,
    },

    /// Check that the configured backing store is reachable
    Ping,

    /// Print version information
    Version,
}

/// Use the positional argument, or read stdin when it is piped.
fn text_or_stdin(text: Option<String>) -> io::Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no text given and stdin is a terminal",
        ));
    }
    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    Ok(buf.trim_end().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Command::Fingerprint {
            prompt,
            model,
            temperature,
            max_tokens,
        } => {
            let mut request = GenerateRequest::new(text_or_stdin(prompt)?, "cli")
                .model(model)
                .temperature(temperature);
            request.max_tokens = max_tokens;
            request.validate()?;
            println!("{}", RequestParams::from_request(&request).fingerprint()?);
        }

        Command::Models => {
            let pricing = config.pricing_table();
            for entry in pricing.models() {
                println!(
                    "{:<24} {:>12.6} USD/token {:>10.4} USD/1k",
                    entry.model, entry.cost_per_token, entry.cost_per_1k_tokens
                );
            }
            println!(
                "{:<24} {:>12.6} USD/token",
                "(other)",
                pricing.fallback_rate()
            );
        }

        Command::Estimate {
            prompt,
            model,
            completion_chars,
        } => {
            let prompt = text_or_stdin(prompt)?;
            let ledger = CostLedger::new(
                config.pricing_table(),
                config.ledger_config(),
                Arc::new(SystemClock),
            );
            let cost = ledger.estimate_cost(&model, prompt.chars().count(), completion_chars);
            println!("{cost:.6} USD ({model})");
        }

        Command::Ping => {
            let store = config.open_store(Arc::new(SystemClock)).await?;
            store.ping().await?;
            println!("{}: ok", store.name());
        }

        Command::Version => {
            println!("heimdall {}", heimdall::version::version_string());
        }
    }

    Ok(())
}
