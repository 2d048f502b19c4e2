//! fmg-connector - run one FortiManager action from the command line
//!
//! Reads connection settings from a TOML file, performs the action, and
//! prints the response JSON on stdout.

use std::fs;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fmg_connector::{Action, Connector, Settings};
use fmg_rpc_common::JsonRpcClient;
use serde_json::{Map, Value};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// FortiManager JSON-RPC connector
#[derive(Parser, Debug)]
#[command(name = "fmg-connector")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Connection settings file
    #[arg(short = 'c', long, default_value = "/etc/fmg-connector/connector.toml")]
    config: String,

    /// Action to perform (get, add, set, delete, execute, free_form)
    #[arg(short = 'a', long, required_unless_present = "health")]
    action: Option<Action>,

    /// Action parameters as JSON, or @path to read them from a file
    #[arg(short = 'p', long, default_value = "{}")]
    params: String,

    /// Only check that the controller is reachable
    #[arg(long)]
    health: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("fmg-connector: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&args.log_level, settings.connection.debug_connection);

    match run(args, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fmg-connector: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, debug_connection: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if debug_connection {
        if let Ok(directive) = "fmg_rpc_common::jsonrpc=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args, settings: Settings) -> Result<()> {
    let cancel = setup_signal_handler();

    let client = JsonRpcClient::connect(&settings.connection)
        .await
        .with_context(|| format!("failed to connect to {}", settings.connection.server_host()))?;

    let connector = Connector::new(client)
        .with_retry_policy(settings.retry_policy())
        .with_tracker_settings(settings.tracker_settings())
        .with_cancellation(cancel);

    let result = perform(&connector, &args).await;

    if let Err(e) = connector.client().logout().await {
        warn!("Logout failed: {}", e);
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn perform(connector: &Connector<JsonRpcClient>, args: &Args) -> Result<Value> {
    if args.health {
        return connector.check_health().await.context("health check failed");
    }

    let Some(action) = args.action else {
        bail!("--action is required");
    };
    let params = read_params(&args.params)?;

    info!(%action, "Performing action");
    let response = connector
        .perform(action, &params)
        .await
        .with_context(|| format!("{} failed", action))?;
    Ok(response.to_json())
}

fn read_params(arg: &str) -> Result<Map<String, Value>> {
    let text = match arg.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?
        }
        None => arg.to_string(),
    };

    match serde_json::from_str::<Value>(&text).context("parameters are not valid JSON")? {
        Value::Object(params) => Ok(params),
        _ => bail!("parameters must be a JSON object"),
    }
}

fn setup_signal_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("fmg-connector: Received SIGINT, cancelling");
            token.cancel();
        }
    });

    cancel
}
