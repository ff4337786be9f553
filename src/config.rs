//! runtime settings, seeded from the environment (and a `.env` file on native).
//!
//! - `GOOGLE_API_KEY`     initial api key (optional; can be typed in the ui)
//! - `CHAT_MODEL`         initial model name (default: first recommended model)
//! - `CHAT_TIMEOUT_SECS`  streaming budget per turn (default 30)
//! - `CHAT_EXPORT_DIR`    where transcripts are written on native (default `.`)

use std::path::PathBuf;
use std::time::Duration;

use bevy::log::{info, warn};
use bevy::prelude::Resource;

use crate::catalog::default_model;
use crate::turn::DEFAULT_TURN_TIMEOUT;

#[derive(Resource, Clone, Debug, PartialEq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub turn_timeout: Duration,
    pub export_dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model().to_string(),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            export_dir: PathBuf::from("."),
        }
    }
}

impl ChatConfig {
    /// load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        if let Ok(path) = dotenvy::dotenv() {
            info!(target: "bevy_llm_chat", "loaded env file {}", path.display());
        }
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// build from any key lookup; unset or blank values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        cfg.api_key = get("GOOGLE_API_KEY");
        if let Some(model) = get("CHAT_MODEL") {
            cfg.model = model;
        }
        if let Some(raw) = get("CHAT_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.turn_timeout = Duration::from_secs(secs),
                _ => warn!(target: "bevy_llm_chat",
                    "CHAT_TIMEOUT_SECS='{}' is not a positive integer, using {:?}",
                    raw, cfg.turn_timeout
                ),
            }
        }
        if let Some(dir) = get("CHAT_EXPORT_DIR") {
            cfg.export_dir = PathBuf::from(dir);
        }

        info!(target: "bevy_llm_chat",
            "config: model='{}' timeout={:?} key_present={}",
            cfg.model, cfg.turn_timeout, cfg.api_key.is_some()
        );
        cfg
    }
}
