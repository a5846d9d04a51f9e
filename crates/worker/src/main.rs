//! Worker binary: wires the broker, stores, and both pipeline services,
//! then runs until SIGINT/SIGTERM.

use std::str::FromStr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitalflow_broker::{initialize_topics, Broker, Consumer, ConsumerConfig, OffsetReset};
use vitalflow_core::config::AppConfig;
use vitalflow_core::thresholds::ThresholdProfile;
use vitalflow_core::topics::{ALERTS_TOPIC, DEFAULT_PARTITIONS, RAW_METRICS_TOPIC};
use vitalflow_db::repositories::DeadLetterRepo;
use vitalflow_events::senders::{EmailConfig, EmailSender, WebPushSender};
use vitalflow_events::{
    ChannelType, DispatchPolicy, Dispatcher, PatientHub, PgDeadLetterSink, PgTemplateStore,
    SenderRegistry,
};
use vitalflow_pipeline::{
    AnalysisService, EscalationStateStore, MemoryStateStore, NotificationService, PgAlertStore,
    RedisStateStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "vitalflow_worker=debug,vitalflow_pipeline=debug,vitalflow_events=debug,\
             vitalflow_broker=info"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Database.
    let pool = vitalflow_db::connect(&config.database_url).await?;
    vitalflow_db::MIGRATOR.run(&pool).await?;
    vitalflow_db::health_check(&pool).await?;
    let backlog = DeadLetterRepo::unprocessed_count(&pool).await?;
    if backlog > 0 {
        tracing::warn!(backlog, "Unprocessed dead letters awaiting manual triage");
    }

    // Escalation state store.
    let state_store: Arc<dyn EscalationStateStore> = match &config.cache_url {
        Some(url) => {
            let store = RedisStateStore::connect(url).await?;
            tracing::info!("Escalation state in Redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                "CACHE_URL not set, keeping escalation state in process memory \
                 (single instance only)"
            );
            Arc::new(MemoryStateStore::new())
        }
    };

    // Broker and topics.
    let broker = Broker::new();
    initialize_topics(
        &broker,
        &[
            (RAW_METRICS_TOPIC, DEFAULT_PARTITIONS),
            (ALERTS_TOPIC, DEFAULT_PARTITIONS),
        ],
    );

    let hub = Arc::new(PatientHub::new());

    // Delivery channels.
    let mut registry = SenderRegistry::new();
    let mut channel = None;
    if let Some(url) = &config.push_gateway_url {
        registry.register(ChannelType::WebPush, Arc::new(WebPushSender::new(url)));
        channel = Some(ChannelType::WebPush);
    }
    if let Some(email_config) = EmailConfig::from_env() {
        registry.register(ChannelType::Email, Arc::new(EmailSender::new(email_config)));
        channel.get_or_insert(ChannelType::Email);
    }
    let channel = channel.unwrap_or_else(|| {
        tracing::warn!("No delivery channel configured, notifications will dead-letter");
        ChannelType::Email
    });
    tracing::info!(%channel, recipient = %config.alert_recipient, "Notification channel ready");

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(PgTemplateStore::new(pool.clone())),
        Arc::new(PgDeadLetterSink::new(pool.clone())),
        DispatchPolicy::default(),
        ALERTS_TOPIC,
    ));

    // Consumers.
    let offset_reset = OffsetReset::from_str(&config.offset_reset)
        .map_err(|e| anyhow::anyhow!("OFFSET_RESET: {e}"))?;
    let consumer_config = || ConsumerConfig {
        group_id: config.consumer_group.clone(),
        offset_reset,
        ..ConsumerConfig::default()
    };

    let analysis = Arc::new(AnalysisService::new(
        hub.clone(),
        state_store,
        vitalflow_broker::Producer::for_topic(&broker, ALERTS_TOPIC)?,
        ThresholdProfile::clinical_defaults(),
        config.settings,
    ));
    let notifier = Arc::new(NotificationService::new(
        hub,
        Arc::new(PgAlertStore::new(pool.clone())),
        dispatcher,
        channel,
        config.alert_recipient.clone(),
        config.alert_template.clone(),
    ));

    let cancel = CancellationToken::new();
    let analysis_task = tokio::spawn(analysis.run(
        Consumer::subscribe(&broker, RAW_METRICS_TOPIC, consumer_config())?,
        cancel.clone(),
    ));
    let notifier_task = tokio::spawn(notifier.run(
        Consumer::subscribe(&broker, ALERTS_TOPIC, consumer_config())?,
        cancel.clone(),
    ));

    tracing::info!("Worker started");
    shutdown_signal().await;

    cancel.cancel();
    analysis_task.await?;
    notifier_task.await?;
    pool.close().await;
    tracing::info!("Worker stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM, so the worker shuts down cleanly
/// whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
