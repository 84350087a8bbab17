//! Incident reporting MCP server binary.
//!
//! `serve` hosts the session-managed Streamable HTTP endpoint; `probe`
//! exercises the upstream incident API directly from the CLI.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use incident_mcp::transport::{PathAllowList, RateLimiter};
use incident_mcp::upstream::{NewIncident, Severity};
use incident_mcp::{
    shutdown, IncidentEngine, McpService, SecurityPolicy, SecurityService, ServerConfig,
    SessionRegistry, UpstreamClient,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the upstream API bearer token.
const TOKEN_ENV: &str = "INCIDENT_API_TOKEN";

#[derive(Parser)]
#[command(name = "incident-mcp", version, about = "Incident reporting MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server over Streamable HTTP
    Serve(ServeArgs),
    /// Run direct CLI calls against the upstream incident API
    Probe(ProbeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address (e.g., 127.0.0.1:8765)
    #[arg(long, default_value = "127.0.0.1:8765")]
    bind: String,
    /// Protocol endpoint path
    #[arg(long, default_value = "/mcp")]
    path: String,
    /// Paths allowed to receive cross-origin headers (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "/mcp")]
    cors_path: Vec<String>,
    /// Maximum concurrently live sessions
    #[arg(long, default_value_t = 64)]
    session_capacity: usize,
    /// Close sessions idle longer than this many seconds
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,
    /// Seconds between idle-sweep ticks
    #[arg(long, default_value_t = 30)]
    sweep_interval_secs: u64,
    /// Rate-limit window in seconds
    #[arg(long, default_value_t = 60)]
    rate_limit_window_secs: u64,
    /// Requests admitted per rate-limit window
    #[arg(long, default_value_t = 600)]
    rate_limit_max: u32,
    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = 1_048_576)]
    max_body_bytes: usize,
    /// SSE keep-alive interval in seconds (0 disables)
    #[arg(long, default_value_t = 15)]
    sse_keep_alive_secs: u64,
    /// Grace window in seconds for closing sessions at shutdown
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,
    /// Base URL of the upstream incident API
    #[arg(long, default_value = "https://api.incident.example/v1")]
    upstream_url: String,
}

#[derive(Args)]
struct ProbeArgs {
    /// Base URL of the upstream incident API
    #[arg(long, default_value = "https://api.incident.example/v1")]
    upstream_url: String,
    /// List open incidents
    #[arg(long)]
    list: bool,
    /// Report a test incident with this summary
    #[arg(long)]
    report: Option<String>,
    /// Fetch the status of an incident by id
    #[arg(long)]
    status: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("incident_mcp=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Probe(args) => run_probe(args),
    }
}

fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig {
        bind: args
            .bind
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?,
        protocol_path: args.path,
        cors_paths: args
            .cors_path
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        session_capacity: args.session_capacity,
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        rate_limit_window: Duration::from_secs(args.rate_limit_window_secs),
        rate_limit_max: args.rate_limit_max,
        max_body_bytes: args.max_body_bytes,
        sse_keep_alive: if args.sse_keep_alive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.sse_keep_alive_secs))
        },
        shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
    };

    let token = std::env::var(TOKEN_ENV).ok();
    if token.is_none() {
        info!("{TOKEN_ENV} not set; upstream requests will be unauthenticated");
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let upstream = Arc::new(UpstreamClient::new(args.upstream_url, token));
        let registry = Arc::new(SessionRegistry::new(config.session_capacity));
        let cancel = CancellationToken::new();
        let sweeper = registry.clone().spawn_sweeper(
            config.sweep_interval,
            config.idle_timeout,
            cancel.clone(),
        );

        let factory = {
            let upstream = upstream.clone();
            move || IncidentEngine::new(upstream.clone())
        };
        let service = McpService::new(registry.clone(), factory, &config);
        let policy = Arc::new(SecurityPolicy {
            protocol_path: config.protocol_path.clone(),
            allow_list: PathAllowList::new(config.cors_paths.clone()),
            limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
        });
        let service = SecurityService::new(service, policy);

        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|e| anyhow::anyhow!("bind failed: {e}"))?;
        info!(
            "MCP HTTP server listening on http://{}{}",
            config.bind, config.protocol_path
        );

        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            if shutdown::wait_for_shutdown_signal().await.is_ok() {
                info!("Shutdown signal received");
                cancel_for_signal.cancel();
            }
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("HTTP server draining");
                    break;
                }
                res = listener.accept() => {
                    let (stream, _) = res.map_err(|e| anyhow::anyhow!("accept failed: {e}"))?;
                    let svc = service.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let conn = http1::Builder::new()
                            .serve_connection(io, TowerToHyperService::new(svc));
                        if let Err(err) = conn.await {
                            tracing::debug!("http connection error: {err}");
                        }
                    });
                }
            }
        }
        drop(listener);

        shutdown::drain(registry, sweeper, cancel, config.shutdown_grace).await;
        info!("Server stopped");
        Ok::<_, anyhow::Error>(())
    })
}

fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let token = std::env::var(TOKEN_ENV).ok();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let upstream = UpstreamClient::new(args.upstream_url, token);

        if args.list {
            let incidents = upstream.list_incidents(None, 20).await?;
            println!("{}", serde_json::to_string_pretty(&incidents)?);
        }

        if let Some(summary) = args.report.as_deref() {
            let incident = upstream
                .report_incident(&NewIncident {
                    summary: summary.to_string(),
                    severity: Severity::Low,
                    component: None,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&incident)?);
        }

        if let Some(id) = args.status.as_deref() {
            let incident = upstream.incident_status(id).await?;
            println!("{}", serde_json::to_string_pretty(&incident)?);
        }

        Ok::<_, anyhow::Error>(())
    })
    .map_err(|e| {
        error!("probe failed: {e}");
        e
    })
}
