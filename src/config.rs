//! Process Configuration
//!
//! Everything comes from environment variables (and `.env` in development).

use crate::ai::{ModelChoice, PriceTable};
use crate::sip::SipConfig;

const DEFAULT_MINI_MODEL: &str = "gpt-4o-mini-realtime-preview";
const DEFAULT_PREMIUM_MODEL: &str = "gpt-realtime";

/// Realtime AI configuration
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub voice: String,
    pub mini_model: String,
    pub premium_model: String,
    pub prices: PriceTable,
}

impl AiConfig {
    pub fn model_id(&self, choice: ModelChoice) -> &str {
        match choice {
            ModelChoice::Mini => &self.mini_model,
            ModelChoice::Premium => &self.premium_model,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sip: SipConfig,
    pub ai: AiConfig,
    /// The gate's unlock code; never exposed to the AI
    pub unlock_code: String,
    pub database_path: String,
    /// Dashboard REST/WS listen address
    pub listen_addr: String,
}

impl AppConfig {
    /// Load from the environment. SIP is optional (the platform can run as
    /// dashboard-only when no trunk is configured); everything else has
    /// defaults except the AI key and the unlock code.
    pub fn from_env() -> Result<Self, String> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is required")?;
        let unlock_code =
            std::env::var("UNLOCK_CODE").map_err(|_| "UNLOCK_CODE is required")?;
        if unlock_code.trim().is_empty() {
            return Err("UNLOCK_CODE must not be empty".to_string());
        }

        let mut prices = PriceTable::default();
        apply_price_overrides(&mut prices);

        let sip = SipConfig::from_env().unwrap_or_default();

        Ok(Self {
            sip,
            ai: AiConfig {
                api_key,
                voice: std::env::var("AI_VOICE").unwrap_or_else(|_| "alloy".to_string()),
                mini_model: std::env::var("AI_MODEL_MINI")
                    .unwrap_or_else(|_| DEFAULT_MINI_MODEL.to_string()),
                premium_model: std::env::var("AI_MODEL_PREMIUM")
                    .unwrap_or_else(|_| DEFAULT_PREMIUM_MODEL.to_string()),
                prices,
            },
            unlock_code,
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/voicegate.db".to_string()),
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8085".to_string()),
        })
    }
}

/// Price overrides, cents per 1M tokens:
/// `AI_PRICE_<TIER>_<KIND>` with TIER in {MINI, PREMIUM} and KIND in
/// {INPUT_TEXT, INPUT_AUDIO, OUTPUT_TEXT, OUTPUT_AUDIO}.
fn apply_price_overrides(prices: &mut PriceTable) {
    let mut read = |name: &str, slot: &mut f64| {
        if let Ok(value) = std::env::var(name) {
            match value.parse::<f64>() {
                Ok(v) if v >= 0.0 => *slot = v,
                _ => tracing::warn!("ignoring invalid {}: {}", name, value),
            }
        }
    };

    read("AI_PRICE_MINI_INPUT_TEXT", &mut prices.mini.input_text);
    read("AI_PRICE_MINI_INPUT_AUDIO", &mut prices.mini.input_audio);
    read("AI_PRICE_MINI_OUTPUT_TEXT", &mut prices.mini.output_text);
    read("AI_PRICE_MINI_OUTPUT_AUDIO", &mut prices.mini.output_audio);
    read("AI_PRICE_PREMIUM_INPUT_TEXT", &mut prices.premium.input_text);
    read("AI_PRICE_PREMIUM_INPUT_AUDIO", &mut prices.premium.input_audio);
    read("AI_PRICE_PREMIUM_OUTPUT_TEXT", &mut prices.premium.output_text);
    read("AI_PRICE_PREMIUM_OUTPUT_AUDIO", &mut prices.premium.output_audio);
}
