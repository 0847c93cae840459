use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Webhook (long polling when unset)
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    // Inference backend
    pub ai_api_key: Option<String>,
    pub ai_base_url: String,
    pub ai_model: String,
    pub classify_timeout: Duration,

    // Storage
    pub db_path: String,

    // Lifecycle TTLs
    pub warning_ttl: Duration,
    pub verification_ttl: Duration,
    pub recent_history_ttl: Duration,
    pub recent_history_cap: usize,
    pub poll_default_ttl: Duration,
    pub new_user_mute: Duration,

    // Telegram limits
    pub telegram_safe_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let webhook_url = env_str("WEBHOOK_URL").and_then(non_empty);
        let webhook_port = env_u16("WEBHOOK_PORT").unwrap_or(8443);
        let webhook_secret = env_str("WEBHOOK_SECRET").and_then(non_empty);
        if webhook_url.is_some() && webhook_secret.is_none() {
            return Err(Error::Config(
                "WEBHOOK_SECRET is required when WEBHOOK_URL is set".to_string(),
            ));
        }

        let ai_api_key = env_str("AI_API_KEY").and_then(non_empty);
        let ai_base_url =
            env_str("AI_BASE_URL").unwrap_or("https://openrouter.ai/api/v1".to_string());
        let ai_model =
            env_str("AI_MODEL").unwrap_or("meta-llama/llama-3.1-8b-instruct".to_string());
        let classify_timeout = Duration::from_millis(env_u64("CLASSIFY_TIMEOUT_MS").unwrap_or(10_000));

        let db_path = env_str("DB_PATH").unwrap_or("warden.db".to_string());

        let warning_ttl = Duration::from_secs(env_u64("WARNING_TTL_SECS").unwrap_or(86_400));
        let verification_ttl = Duration::from_secs(env_u64("VERIFICATION_TTL_SECS").unwrap_or(300));
        let recent_history_ttl = Duration::from_secs(env_u64("RECENT_HISTORY_TTL_SECS").unwrap_or(300));
        let recent_history_cap = env_usize("RECENT_HISTORY_CAP").unwrap_or(10);
        let poll_default_ttl = Duration::from_secs(env_u64("POLL_DEFAULT_TTL_SECS").unwrap_or(86_400));
        let new_user_mute = Duration::from_secs(env_u64("NEW_USER_MUTE_SECS").unwrap_or(300));

        let telegram_safe_limit = env_usize("TELEGRAM_SAFE_LIMIT").unwrap_or(4000);

        Ok(Self {
            telegram_bot_token,
            webhook_url,
            webhook_port,
            webhook_secret,
            ai_api_key,
            ai_base_url,
            ai_model,
            classify_timeout,
            db_path,
            warning_ttl,
            verification_ttl,
            recent_history_ttl,
            recent_history_cap,
            poll_default_ttl,
            new_user_mute,
            telegram_safe_limit,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
