use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use sabong_execution::ArenaConfig;
use sabong_server::{config, Api, ServerConfig, Service, StaffAccount};
use sabong_types::Role;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "sabong-server".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("sabong-server");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, env = "SABONG_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, env = "SABONG_PORT", default_value_t = 8080)]
    port: u16,

    /// SQLite database holding the arena (memory only when omitted).
    #[arg(long, env = "SABONG_DATABASE")]
    database: Option<PathBuf>,

    /// Operator account created at startup if it does not exist.
    #[arg(long, env = "SABONG_OPERATOR_USERNAME")]
    operator_username: Option<String>,

    #[arg(long, env = "SABONG_OPERATOR_PASSWORD", hide_env_values = true)]
    operator_password: Option<String>,

    /// Cashier account created at startup if it does not exist.
    #[arg(long, env = "SABONG_CASHIER_USERNAME")]
    cashier_username: Option<String>,

    #[arg(long, env = "SABONG_CASHIER_PASSWORD", hide_env_values = true)]
    cashier_password: Option<String>,

    /// Largest single stake.
    #[arg(long, env = "SABONG_MAX_BET")]
    max_bet: Option<u64>,

    /// Smallest deposit or withdrawal.
    #[arg(long, env = "SABONG_CASH_MIN")]
    cash_min: Option<u64>,

    /// Largest deposit or withdrawal.
    #[arg(long, env = "SABONG_CASH_MAX")]
    cash_max: Option<u64>,

    /// Credits granted to every new bettor.
    #[arg(long, env = "SABONG_SIGNUP_BONUS")]
    signup_bonus: Option<u64>,

    /// Store commits attempted before a settlement is reported blocked.
    #[arg(long, env = "SABONG_SETTLEMENT_MAX_ATTEMPTS")]
    settlement_max_attempts: Option<u32>,

    /// Number of settled fights served by /history and snapshots.
    #[arg(long, env = "SABONG_HISTORY_LIMIT")]
    history_limit: Option<usize>,

    /// Events buffered per observer before it is resynced (0 uses default).
    #[arg(long)]
    broadcast_buffer: Option<usize>,

    /// Outbound websocket messages queued per observer (0 uses default).
    #[arg(long)]
    ws_outbound_buffer: Option<usize>,

    /// Max websocket message size in bytes (0 uses default).
    #[arg(long)]
    ws_max_message_bytes: Option<usize>,

    /// Max HTTP request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Per-IP login/register requests per minute (0 disables limit).
    #[arg(long)]
    auth_rate_limit_per_minute: Option<u64>,

    /// Burst size for the login/register rate limit.
    #[arg(long)]
    auth_rate_limit_burst: Option<u32>,
}

fn map_optional_default_on_zero(value: Option<usize>, default: usize) -> usize {
    match value {
        Some(0) | None => default,
        Some(value) => value,
    }
}

fn staff_account(
    username: &Option<String>,
    password: &Option<String>,
    role: Role,
) -> Result<Option<StaffAccount>> {
    match (username, password) {
        (None, None) => Ok(None),
        (Some(username), Some(password)) => Ok(Some(StaffAccount {
            username: username.clone(),
            password: password.clone(),
            role,
        })),
        _ => anyhow::bail!(
            "{} username and password must be given together",
            role.as_str()
        ),
    }
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    let arena_defaults = ArenaConfig::default();
    let staff = [
        staff_account(&args.operator_username, &args.operator_password, Role::Operator)?,
        staff_account(&args.cashier_username, &args.cashier_password, Role::Cashier)?,
    ]
    .into_iter()
    .flatten()
    .collect();

    let config = ServerConfig {
        arena: ArenaConfig {
            max_bet: args.max_bet.unwrap_or(arena_defaults.max_bet),
            cash_min: args.cash_min.unwrap_or(arena_defaults.cash_min),
            cash_max: args.cash_max.unwrap_or(arena_defaults.cash_max),
            signup_bonus: args.signup_bonus.unwrap_or(arena_defaults.signup_bonus),
            settlement_max_attempts: args
                .settlement_max_attempts
                .unwrap_or(arena_defaults.settlement_max_attempts),
            history_limit: args.history_limit.unwrap_or(arena_defaults.history_limit),
        },
        database_path: args.database.clone(),
        staff,
        broadcast_buffer: map_optional_default_on_zero(
            args.broadcast_buffer,
            config::DEFAULT_BROADCAST_BUFFER,
        ),
        ws_outbound_buffer: map_optional_default_on_zero(
            args.ws_outbound_buffer,
            config::DEFAULT_WS_OUTBOUND_BUFFER,
        ),
        ws_max_message_bytes: map_optional_default_on_zero(
            args.ws_max_message_bytes,
            config::DEFAULT_WS_MAX_MESSAGE_BYTES,
        ),
        http_body_limit_bytes: args
            .http_body_limit_bytes
            .unwrap_or(defaults.http_body_limit_bytes),
        auth_rate_limit_per_minute: args.auth_rate_limit_per_minute,
        auth_rate_limit_burst: args.auth_rate_limit_burst,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}


async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let config = build_config(&args)?;
    let service = Arc::new(Service::open(config).context("open arena")?);
    {
        let fight = service.read(|arena| arena.fight());
        info!(fight = fight.number, phase = fight.phase.as_str(), "arena ready");
    }

    let api = Api::new(service);
    let app = api.router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("axum server error")?;

    Ok(())
}
