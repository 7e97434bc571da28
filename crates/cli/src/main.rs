mod mcp_commands;

use std::path::PathBuf;

use {
    clap::Parser,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relay", version, about = "Talk to MCP servers from the command line")]
struct Cli {
    #[command(subcommand)]
    command: mcp_commands::McpCommand,

    /// Server config file (TOML, YAML or JSON). Defaults to ./mcp.* then
    /// ~/.config/relay/mcp.*.
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Launch a stdio server from a command line instead of a config file.
    #[arg(long, global = true, conflicts_with = "http")]
    stdio: Option<String>,

    /// Reach an HTTP server at this URL instead of a config file.
    #[arg(long, global = true)]
    http: Option<String>,

    /// Extra header for --http, as "Name: value". Repeatable.
    #[arg(long = "header", global = true, requires = "http")]
    headers: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

/// Logs go to stderr so stdout carries only command output.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "relay starting");

    let target = mcp_commands::Target {
        config: cli.config,
        stdio: cli.stdio,
        http: cli.http,
        headers: cli.headers,
        timeout_ms: cli.timeout_ms,
    };
    let server = target.server_config()?;

    let output = mcp_commands::run(&server, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
