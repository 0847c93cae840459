use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    update_listeners::webhooks,
};
use tracing::info;

use warden_core::{
    classify::{ClassificationClient, InferenceClient},
    config::Config,
    messaging::{
        port::{MessagingPort, ModerationPort},
        throttled::{ThrottleConfig, ThrottledMessenger, ThrottledModeration},
    },
    moderation::{ModerationPipeline, PipelineConfig},
    polls::PollEngine,
    storage::{ActivityLog, PollStore, SettingsStore, VerificationStore, WarningLedger},
    verification::VerificationEngine,
};

use crate::{handlers, TelegramMessenger};

/// The durable backends the bot runs against (one store usually implements
/// all five ports).
pub struct Backends {
    pub settings: Arc<dyn SettingsStore>,
    pub ledger: Arc<dyn WarningLedger>,
    pub verification: Arc<dyn VerificationStore>,
    pub polls: Arc<dyn PollStore>,
    pub activity: Arc<dyn ActivityLog>,
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub settings: Arc<dyn SettingsStore>,
    pub ledger: Arc<dyn WarningLedger>,
    pub activity: Arc<dyn ActivityLog>,
    pub classifier: Arc<ClassificationClient>,
    pub messenger: Arc<dyn MessagingPort>,
    pub actions: Arc<dyn ModerationPort>,
    pub pipeline: Arc<ModerationPipeline>,
    pub verification: Arc<VerificationEngine>,
    pub polls: Arc<PollEngine>,
}

/// Wire the engines to Telegram and run until the process is stopped.
///
/// With `WEBHOOK_URL` configured the bot serves a webhook listener whose
/// shared secret is validated on every delivery; otherwise it falls back to
/// long polling.
pub async fn run(
    cfg: Arc<Config>,
    backends: Backends,
    inference: Arc<dyn InferenceClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!("warden started: @{}", me.username());
    }

    // Wrap the raw messenger with flood-control throttling; moderation
    // bursts (delete + notify per spam message) hit the limits quickly.
    let raw = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw.clone(),
        ThrottleConfig::default(),
    ));
    let actions: Arc<dyn ModerationPort> = Arc::new(ThrottledModeration::new(
        raw,
        ThrottleConfig::default(),
    ));

    let classifier = Arc::new(ClassificationClient::new(inference));

    let pipeline = Arc::new(ModerationPipeline::new(
        backends.settings.clone(),
        backends.ledger.clone(),
        backends.activity.clone(),
        classifier.clone(),
        messenger.clone(),
        actions.clone(),
        PipelineConfig {
            warning_ttl: cfg.warning_ttl,
            recent_history_cap: cfg.recent_history_cap,
            recent_history_ttl: cfg.recent_history_ttl,
            new_user_mute: cfg.new_user_mute,
        },
    ));
    let verification = Arc::new(VerificationEngine::new(
        backends.verification.clone(),
        backends.settings.clone(),
        messenger.clone(),
        actions.clone(),
    ));
    let polls = Arc::new(PollEngine::new(
        backends.polls.clone(),
        messenger.clone(),
        cfg.poll_default_ttl,
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        settings: backends.settings,
        ledger: backends.ledger,
        activity: backends.activity,
        classifier,
        messenger,
        actions,
        pipeline,
        verification,
        polls,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .build();

    match (&cfg.webhook_url, &cfg.webhook_secret) {
        (Some(url), Some(secret)) => {
            let address = ([0, 0, 0, 0], cfg.webhook_port).into();
            let url = url
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid WEBHOOK_URL: {e}"))?;
            let options = webhooks::Options::new(address, url).secret_token(secret.clone());

            info!("serving webhook on port {}", cfg.webhook_port);
            let listener = webhooks::axum(bot, options).await?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("webhook update listener error"),
                )
                .await;
        }
        _ => {
            info!("no WEBHOOK_URL configured; using long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}
