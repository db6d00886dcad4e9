//! FleetFair - fair assignment control plane for a last-mile delivery fleet.
//! Process-lifecycle glue: build every component once, wire them explicitly,
//! serve HTTP + WebSocket, and drive the background jobs.

use anyhow::{Context, Result};
use fleetfair_backend::{
    api::{self, AppState},
    auth::JwtHandler,
    cache::{Cache, MemoryCache, RedisCache},
    config::Config,
    connections::ConnectionRegistry,
    fairness::CbcSolver,
    jobs::{self, JobContext, Scheduler, Trigger},
    middleware::{request_logging, RateLimitConfig, RateLimiter},
    ml::ModelRegistry,
    notify::{FcmDispatcher, NoopDispatcher, PushDispatcher},
    store::FleetDb,
    weather::WeatherOracle,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace window for in-flight jobs at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetfair_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(Config::from_env());

    info!("🚚 FleetFair control plane starting");

    let db = FleetDb::new(&config.database_path)?;

    // Model registry: first load runs in the background; every consumer
    // falls back deterministically until it completes.
    let registry = Arc::new(ModelRegistry::new(config.models_dir.clone()));
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.load().await {
                warn!("model registry load failed: {e:#}");
            }
        });
    }

    let cache = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(store) => Cache::new(Arc::new(store)),
            Err(e) => {
                warn!("⚠️  Redis unavailable ({e}); using in-process cache");
                Cache::new(Arc::new(MemoryCache::default()))
            }
        },
        None => {
            info!("REDIS_URL not set; using in-process cache");
            Cache::new(Arc::new(MemoryCache::default()))
        }
    };

    let notifier: Arc<dyn PushDispatcher> =
        match (&config.fcm_endpoint, &config.fcm_server_key) {
            (Some(endpoint), Some(key)) => {
                Arc::new(FcmDispatcher::new(endpoint.clone(), key.clone())?)
            }
            _ => {
                warn!("⚠️  FCM not configured - push notifications disabled");
                Arc::new(NoopDispatcher)
            }
        };

    let weather = Arc::new(WeatherOracle::new(config.weather_api_key.clone()));
    let connections = Arc::new(ConnectionRegistry::new());
    let jwt = Arc::new(JwtHandler::new(config.jwt_secret.clone()));
    let solver = Arc::new(CbcSolver::new(config.cbc_binary.clone()));

    let job_ctx = JobContext {
        db: db.clone(),
        registry: registry.clone(),
        notifier: notifier.clone(),
        connections: connections.clone(),
        cache: cache.clone(),
        weather: weather.clone(),
        solver,
        config: config.clone(),
    };

    let scheduler = Arc::new(Scheduler::new());
    scheduler.register(
        "daily-assignment",
        Trigger::cron(&config.schedule.assignment_generation)?,
        |ctx| Box::pin(jobs::daily_assignment::run(ctx)),
    );
    scheduler.register(
        "daily-forecast-refresh",
        Trigger::cron(&config.schedule.forecast_refresh)?,
        |ctx| Box::pin(jobs::forecast_refresh::run(ctx)),
    );
    scheduler.register(
        "health-monitor",
        Trigger::interval(Duration::from_secs(config.health.monitor_interval_seconds)),
        |ctx| Box::pin(jobs::health_monitor::run(ctx)),
    );
    scheduler.register(
        "nightly-learning-export",
        Trigger::cron(&config.schedule.learning_export)?,
        |ctx| Box::pin(jobs::learning_export::run(ctx)),
    );
    scheduler.register(
        "nightly-cleanup",
        Trigger::cron(&config.schedule.cleanup)?,
        |ctx| Box::pin(jobs::cleanup::run(ctx)),
    );

    if config.background_jobs_enabled {
        scheduler.start(job_ctx);
    } else {
        warn!("Background jobs disabled in configuration");
    }

    // Rate limiter entries decay on a slow sweep.
    let limiter = RateLimiter::new(RateLimitConfig::default());
    {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        });
    }

    let state = AppState {
        db,
        registry,
        connections,
        jwt,
        cache,
        weather,
        notifier,
        config: config.clone(),
    };

    let app = api::router(state, limiter)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down; waiting for in-flight jobs...");
    scheduler.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to listen for shutdown signal");
    }
}
