//! Tiered Quota - HTTP service entry point
//!
//! Boot order: config, tracing, database pool, migrations, router, sweeper.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::{net::TcpListener, signal, sync::watch};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tiered_quota::adapters::http::{quota_router, IdentityState, QuotaAppState};
use tiered_quota::adapters::{InMemoryIdentityVerifier, PostgresUsageLedger, SystemClock};
use tiered_quota::application::handlers::quota::{
    AbuseDetector, AbuseSettings, EnforcerSettings, QuotaGuard, QuotaStatusHandler,
    RateLimitEnforcer, ResetUsageHandler, RetentionSweeper, UnblockIdentityHandler,
};
use tiered_quota::config::AppConfig;
use tiered_quota::domain::fingerprint::FingerprintHasher;
use tiered_quota::domain::quota::{PolicyResolver, QuotaLimits};
use tiered_quota::ports::{Clock, UsageLedger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load configuration: {}", e)))?;
    config
        .validate()
        .map_err(|e| std::io::Error::other(format!("Configuration validation failed: {}", e)))?;

    init_tracing(&config);
    tracing::info!(
        environment = ?config.server.environment,
        daily_limit = config.quota.daily_limit,
        anonymous_limit = config.quota.anonymous_limit,
        "starting tiered quota service"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout(config.quota.ledger_timeout()))
        .idle_timeout(config.database.idle_timeout())
        .max_lifetime(config.database.max_lifetime())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let ledger: Arc<dyn UsageLedger> = Arc::new(PostgresUsageLedger::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let verifier = identity_verifier(&config)?;

    let state = build_state(&config, ledger.clone(), clock.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if config.features.enable_retention_sweep {
        let sweeper = RetentionSweeper::new(
            ledger,
            clock,
            config.quota.retention_days,
            config.quota.sweep_interval(),
        );
        Some(tokio::spawn(sweeper.run(shutdown_rx)))
    } else {
        None
    };

    let app = quota_router(state, verifier)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "retention sweeper task failed");
        }
    }

    tracing::info!("server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }
}

fn identity_verifier(config: &AppConfig) -> Result<IdentityState, Box<dyn std::error::Error>> {
    let mut verifier = InMemoryIdentityVerifier::new();
    for entry in config.auth.dev_token_list()? {
        verifier = verifier.try_with_user(entry.token, entry.user_id, entry.unlocked)?;
    }
    if verifier.token_count() > 0 {
        tracing::warn!(tokens = verifier.token_count(), "static development tokens enabled");
    }
    Ok(Arc::new(verifier))
}

fn build_state(
    config: &AppConfig,
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
) -> Result<QuotaAppState, Box<dyn std::error::Error>> {
    let quota = &config.quota;
    let limits = QuotaLimits::new(quota.daily_limit, quota.anonymous_limit)?;
    let hasher = FingerprintHasher::from_optional(quota.fingerprint_secret.clone());
    let resolver = PolicyResolver::new(limits, hasher);
    let timeout = quota.ledger_timeout();

    let enforcer = RateLimitEnforcer::new(
        ledger.clone(),
        resolver.clone(),
        clock.clone(),
        EnforcerSettings {
            ledger_timeout: timeout,
            increment_retry_attempts: quota.increment_retry_attempts,
        },
    );
    let mut guard = QuotaGuard::new(enforcer);
    if config.features.enable_abuse_detection {
        guard = guard.with_abuse_detector(AbuseDetector::new(
            ledger.clone(),
            clock.clone(),
            AbuseSettings {
                fingerprint_threshold: quota.abuse_fingerprint_threshold,
                lookback_hours: quota.abuse_lookback_hours,
                ledger_timeout: timeout,
            },
        ));
    }

    Ok(QuotaAppState {
        guard: Arc::new(guard),
        status_handler: Arc::new(QuotaStatusHandler::new(
            ledger.clone(),
            resolver,
            clock.clone(),
            timeout,
        )),
        unblock_handler: Arc::new(UnblockIdentityHandler::new(
            ledger.clone(),
            clock.clone(),
            timeout,
        )),
        reset_handler: Arc::new(ResetUsageHandler::new(ledger, clock, timeout)),
        admin_key: config.auth.admin_api_key.clone().map(Arc::new),
        verbose_errors: config.features.verbose_errors,
    })
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
