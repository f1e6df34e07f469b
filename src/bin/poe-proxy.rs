use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use poe_proxy::config::Config;
use poe_proxy::handlers::AppState;
use poe_proxy::poe::PoeClient;
use poe_proxy::{http_server, mcp_server};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Serve the HTTP API (with SSE streaming and the test pages).
    Http,
    /// Serve MCP tools on stdin/stdout.
    Stdio,
    /// Serve both at once.
    Both,
}

/// Poe proxy CLI arguments
#[derive(Parser)]
#[command(
    name = "poe-proxy",
    version = env!("CARGO_PKG_VERSION"),
    about = concat!("Poe Proxy v", env!("CARGO_PKG_VERSION"), ". Forward chat requests to Poe.com bots over MCP tools or a plain HTTP API."),
    long_about = None,
    after_help = "Examples:\n  \
        Serve the HTTP API on port 8080:\n  \
        POE_API_KEY=... poe-proxy --transport http --port 8080\n  \
        Serve MCP tools over stdio:\n  \
        POE_API_KEY=... poe-proxy --transport stdio\n  \
        Serve both, without Claude thinking-segment stripping:\n  \
        POE_API_KEY=... poe-proxy --transport both --claude-compatible false
",
)]
struct Cli {
    /// Poe API key; get one from https://poe.com/api_key
    #[arg(long = "api-key", env = "POE_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Which front end(s) to serve
    #[arg(long = "transport", value_enum, default_value = "http")]
    transport: Transport,

    /// Host to bind the HTTP server on
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP server on
    #[arg(long = "port", default_value = "8080")]
    port: u16,

    /// Strip Claude thinking segments from replies
    #[arg(
        long = "claude-compatible",
        env = "CLAUDE_COMPATIBLE",
        action = clap::ArgAction::Set,
        default_value = "true"
    )]
    claude_compatible: bool,

    /// Upstream request timeout in seconds
    #[arg(long = "timeout-secs", env = "POE_TIMEOUT_SECS", default_value = "60")]
    timeout_secs: u64,

    /// Minutes of idleness after which a session expires
    #[arg(long = "session-expiry-mins", env = "SESSION_EXPIRY_MINUTES", default_value = "60")]
    session_expiry_mins: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Logging goes to stderr so the stdio MCP transport stays clean.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::new(
        cli.api_key,
        cli.claude_compatible,
        cli.timeout_secs,
        cli.session_expiry_mins,
    )?;
    let client = Arc::new(PoeClient::new(&config)?);
    let state = Arc::new(AppState::new(config, client));

    let ct = CancellationToken::new();
    spawn_session_sweeper(state.clone(), ct.clone());

    let bind_addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

    match cli.transport {
        Transport::Http => {
            let mut server = tokio::spawn(http_server::serve(state, bind_addr, ct.clone()));
            tokio::select! {
                signal = wait_for_shutdown() => {
                    info!(signal, "signal received, shutting down");
                    ct.cancel();
                    server.await??;
                }
                result = &mut server => {
                    ct.cancel();
                    result??;
                }
            }
        }
        Transport::Stdio => {
            mcp_server::serve_stdio(state).await?;
            ct.cancel();
        }
        Transport::Both => {
            let server = tokio::spawn(http_server::serve(state.clone(), bind_addr, ct.clone()));
            mcp_server::serve_stdio(state).await?;
            ct.cancel();
            server.await??;
        }
    }

    Ok(())
}

/// Periodically drops idle-expired sessions until shutdown.
fn spawn_session_sweeper(state: Arc<AppState>, ct: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ct.cancelled() => break,
                _ = interval.tick() => {
                    let removed = state.sessions.sweep_expired().await;
                    if removed > 0 {
                        debug!(removed, "swept expired sessions");
                    }
                }
            }
        }
    });
}

/// Waits for SIGINT or SIGTERM and reports which one arrived.
async fn wait_for_shutdown() -> &'static str {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
