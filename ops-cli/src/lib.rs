//! Operations CLI for the preauthorization engine
//!
//! Wires the engine against PostgreSQL and the HTTP integrations named in
//! the configuration, then runs one command:
//!
//! ```bash
//! # Schema
//! preauth migrate
//!
//! # Intake and staff actions
//! preauth process-order 6f1c...
//! preauth record-eligibility --member-id W123456789 --carrier Acme --eligible --verified-by staff-7
//! preauth reverify-eligibility 9b2e... --staff-id staff-7
//! preauth supplemental-info 9b2e... --notes "Updated wound measurements" --staff-id staff-7
//! preauth audit-trail 9b2e...
//!
//! # Sweeps, once or on the configured cron schedule
//! preauth retry-sweep
//! preauth status-sweep
//! preauth expiry-sweep
//! preauth schedule
//! ```

pub mod schedule;

use anyhow::Context;
use config_engine::EngineConfig;
use preauth_engine::{
    ApiChannel, Clock, EdiChannel, EngineDeps, FaxChannel, HttpRealTimeEligibilityChecker, HttpTextGenerator,
    ManualChannel, Notifier, PgEligibilityCache, PgOrderSource, PgPreauthStore, PgRuleRepository, PortalChannel,
    PreauthOrchestrator, RealTimeEligibilityChecker, SubmissionRouter, SystemClock, TextGenerator,
    TracingNotifier, WebhookNotifier,
};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

/// Open the connection pool described by `database`
pub async fn connect(config: &EngineConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("connecting to the preauth database")?;
    info!(max_connections = config.database.max_connections, "Connected to database");
    Ok(pool)
}

/// One channel per submission method, configured from `channels`
pub async fn build_router(config: &EngineConfig, clock: Arc<dyn Clock>) -> SubmissionRouter {
    let staff_queue = config.channels.manual.staff_queue.clone();
    let router = SubmissionRouter::new();
    router.register(Arc::new(ApiChannel::new())).await;
    router
        .register(Arc::new(EdiChannel::from_config(config.channels.edi.clone(), clock.clone())))
        .await;
    router.register(Arc::new(PortalChannel::new(staff_queue.clone()))).await;
    router
        .register(Arc::new(FaxChannel::from_config(config.channels.fax.clone(), clock)))
        .await;
    router.register(Arc::new(ManualChannel::new(staff_queue))).await;
    router
}

pub async fn build_orchestrator(config: EngineConfig, pool: PgPool) -> anyhow::Result<PreauthOrchestrator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let router = build_router(&config, clock.clone()).await;

    let real_time_eligibility = HttpRealTimeEligibilityChecker::from_config(&config.eligibility)
        .map(|checker| Arc::new(checker) as Arc<dyn RealTimeEligibilityChecker>);
    let text_generator =
        HttpTextGenerator::new(&config.necessity).map(|generator| Arc::new(generator) as Arc<dyn TextGenerator>);

    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(TracingNotifier)];
    if let Some(url) = &config.notifications.webhook_url {
        notifiers.push(Arc::new(WebhookNotifier::new(url.clone())));
    }

    let orchestrator = PreauthOrchestrator::new(
        config,
        EngineDeps {
            store: Arc::new(PgPreauthStore::new(pool.clone())),
            orders: Arc::new(PgOrderSource::new(pool.clone())),
            rules: Arc::new(PgRuleRepository::new(pool.clone())),
            eligibility_cache: Arc::new(PgEligibilityCache::new(pool)),
            real_time_eligibility,
            text_generator,
            router,
            notifiers,
            clock,
        },
    )?;
    Ok(orchestrator)
}

/// Pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
