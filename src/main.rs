use anyhow::{Context, bail};
use clap::Parser;
use pflix_status::{
    build_router,
    collector::StatusCollector,
    config::{Cli, Command, RecordArgs, ServeArgs, Settings, WatchArgs},
    monitor::{HttpProbe, LogNotifier, ServiceMonitor},
    rate_limit::{RateLimitStore, sweeper},
    state::AppState,
    store::{SnapshotStore, create_pool},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pflix_status=info")),
        )
        .init();

    match Cli::parse().into_command() {
        Command::Serve(args) => serve(args).await,
        Command::Record(args) => record(args).await,
        Command::Watch(args) => watch(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let pool = create_pool(&args.database_url)
        .await
        .with_context(|| format!("opening database {}", args.database_url))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("pflix-status/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let rate_limiter = RateLimitStore::new(args.rate.limit_config());
    if let Some(every) = args.rate.sweep_interval() {
        tokio::spawn(sweeper(rate_limiter.clone(), every));
    }

    // creating shared state
    let state = Arc::new(AppState {
        client: client.clone(),
        store: SnapshotStore::new(pool),
        collector: StatusCollector::new(client),
        rate_limiter,
        settings: Settings::from(&args),
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!(addr = %addr, "Status service listening");
    info!(
        limit = args.rate.rate_limit,
        window_secs = args.rate.rate_window,
        "Uptime routes rate limited"
    );
    if args.cron_secret.is_none() {
        info!("UPTIME_CRON_SECRET not set; record endpoint is unauthenticated");
        if args.public_url.is_none() {
            warn!(
                port = args.port,
                "Neither PUBLIC_URL nor UPTIME_CRON_SECRET set; status collection targets 127.0.0.1"
            );
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

// one-shot trigger for cron
async fn record(args: RecordArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/admin/uptime/record", args.url.trim_end_matches('/'));
    let mut request = reqwest::Client::new().get(&url);
    if let Some(secret) = &args.secret {
        request = request.header("x-cron-secret", secret);
    }

    let res = request.send().await.with_context(|| format!("calling {}", url))?;
    let status = res.status();
    let body = res.text().await?;
    if !status.is_success() {
        bail!("record failed with HTTP {}: {}", status, body);
    }

    println!("{}", body);
    Ok(())
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let probe = HttpProbe::new(reqwest::Client::new(), &args.url);
    info!(url = %probe.url(), interval_secs = args.interval, "Watching service");

    let handle = ServiceMonitor::start(
        probe,
        LogNotifier,
        Duration::from_secs(args.interval.max(1)),
    );

    tokio::signal::ctrl_c().await?;
    handle.stop().await;
    Ok(())
}
