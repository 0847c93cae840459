use std::sync::Arc;

use tracing::info;

use warden_ai::{ChatCompletionsClient, OfflineInference};
use warden_core::{classify::InferenceClient, config::Config};
use warden_store::SqliteStore;
use warden_telegram::router::{self, Backends};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_core::logging::init("warden");

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(SqliteStore::open(cfg.db_path.clone())?);
    let backends = Backends {
        settings: store.clone(),
        ledger: store.clone(),
        verification: store.clone(),
        polls: store.clone(),
        activity: store,
    };

    let inference: Arc<dyn InferenceClient> = match &cfg.ai_api_key {
        Some(key) => Arc::new(ChatCompletionsClient::new(
            key.clone(),
            cfg.ai_base_url.clone(),
            cfg.ai_model.clone(),
            cfg.classify_timeout,
        )),
        None => {
            info!("AI_API_KEY not set; classification falls back to neutral verdicts");
            Arc::new(OfflineInference)
        }
    };

    router::run(cfg, backends, inference).await
}
