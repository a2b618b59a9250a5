//! Model Selection and Cost Tracking
//!
//! Two model tiers (mini/premium) with a configurable price table. Costs are
//! accumulated from the usage block of each `response.done` against the model
//! active at that moment.

use serde::{Deserialize, Serialize};

/// Model tier selectable per call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    Mini,
    Premium,
}

impl ModelChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelChoice::Mini => "mini",
            ModelChoice::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mini" => Some(ModelChoice::Mini),
            "premium" => Some(ModelChoice::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prices in cents per one million tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenPrices {
    pub input_text: f64,
    pub input_audio: f64,
    pub output_text: f64,
    pub output_audio: f64,
}

/// Per-tier price table
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceTable {
    pub mini: TokenPrices,
    pub premium: TokenPrices,
}

impl Default for PriceTable {
    fn default() -> Self {
        // Example realtime API prices, overridable via configuration
        Self {
            mini: TokenPrices {
                input_text: 60.0,
                input_audio: 1_000.0,
                output_text: 240.0,
                output_audio: 2_000.0,
            },
            premium: TokenPrices {
                input_text: 400.0,
                input_audio: 3_200.0,
                output_text: 1_600.0,
                output_audio: 6_400.0,
            },
        }
    }
}

impl PriceTable {
    pub fn for_model(&self, model: ModelChoice) -> TokenPrices {
        match model {
            ModelChoice::Mini => self.mini,
            ModelChoice::Premium => self.premium,
        }
    }
}

/// Token counts from a `response.done` usage block.
/// Vendor fields that are absent count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_token_details: TokenDetails,
    #[serde(default)]
    pub output_token_details: TokenDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TokenDetails {
    #[serde(default)]
    pub text_tokens: u64,
    #[serde(default)]
    pub audio_tokens: u64,
}

/// Accumulates call cost from usage deltas.
///
/// Usage blocks are treated as cumulative counters; only positive deltas are
/// charged, against the model active when the response finished.
pub struct CostTracker {
    prices: PriceTable,
    model: ModelChoice,
    last: Usage,
    cost_cents: f64,
}

impl CostTracker {
    pub fn new(prices: PriceTable, model: ModelChoice) -> Self {
        Self {
            prices,
            model,
            last: Usage::default(),
            cost_cents: 0.0,
        }
    }

    pub fn set_model(&mut self, model: ModelChoice) {
        self.model = model;
    }

    pub fn model(&self) -> ModelChoice {
        self.model
    }

    pub fn cost_cents(&self) -> f64 {
        self.cost_cents
    }

    /// Fold one usage block into the running cost, returning the new total
    pub fn on_usage(&mut self, usage: &Usage) -> f64 {
        let prices = self.prices.for_model(self.model);

        let pairs = [
            (
                usage.input_token_details.text_tokens,
                self.last.input_token_details.text_tokens,
                prices.input_text,
            ),
            (
                usage.input_token_details.audio_tokens,
                self.last.input_token_details.audio_tokens,
                prices.input_audio,
            ),
            (
                usage.output_token_details.text_tokens,
                self.last.output_token_details.text_tokens,
                prices.output_text,
            ),
            (
                usage.output_token_details.audio_tokens,
                self.last.output_token_details.audio_tokens,
                prices.output_audio,
            ),
        ];

        for (current, previous, cents_per_million) in pairs {
            if current > previous {
                self.cost_cents += (current - previous) as f64 * cents_per_million / 1_000_000.0;
            }
        }

        self.last = *usage;
        self.cost_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(in_text: u64, in_audio: u64, out_text: u64, out_audio: u64) -> Usage {
        Usage {
            input_tokens: in_text + in_audio,
            output_tokens: out_text + out_audio,
            input_token_details: TokenDetails {
                text_tokens: in_text,
                audio_tokens: in_audio,
            },
            output_token_details: TokenDetails {
                text_tokens: out_text,
                audio_tokens: out_audio,
            },
        }
    }

    #[test]
    fn test_model_parse() {
        assert_eq!(ModelChoice::parse("mini"), Some(ModelChoice::Mini));
        assert_eq!(ModelChoice::parse(" Premium "), Some(ModelChoice::Premium));
        assert_eq!(ModelChoice::parse("turbo"), None);
    }

    #[test]
    fn test_usage_tolerates_missing_fields() {
        let u: Usage = serde_json::from_str("{}").unwrap();
        assert_eq!(u, Usage::default());

        let u: Usage = serde_json::from_str(r#"{"input_tokens": 5}"#).unwrap();
        assert_eq!(u.input_tokens, 5);
        assert_eq!(u.output_token_details.audio_tokens, 0);
    }

    #[test]
    fn test_cost_accumulates_deltas() {
        let mut tracker = CostTracker::new(PriceTable::default(), ModelChoice::Mini);

        // 1M audio input tokens at mini rate = 1000 cents
        let total = tracker.on_usage(&usage(0, 1_000_000, 0, 0));
        assert!((total - 1_000.0).abs() < 1e-9);

        // Another 1M on top (cumulative counter)
        let total = tracker.on_usage(&usage(0, 2_000_000, 0, 0));
        assert!((total - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_ignores_counter_resets() {
        let mut tracker = CostTracker::new(PriceTable::default(), ModelChoice::Mini);
        tracker.on_usage(&usage(0, 1_000_000, 0, 0));

        // Counter going backwards must not produce negative cost
        let total = tracker.on_usage(&usage(0, 500_000, 0, 0));
        assert!((total - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_rate_follows_model_switch() {
        let mut tracker = CostTracker::new(PriceTable::default(), ModelChoice::Mini);
        tracker.on_usage(&usage(0, 1_000_000, 0, 0));
        assert!((tracker.cost_cents() - 1_000.0).abs() < 1e-9);

        tracker.set_model(ModelChoice::Premium);
        tracker.on_usage(&usage(0, 2_000_000, 0, 0));
        // Second million charged at the premium audio rate
        assert!((tracker.cost_cents() - (1_000.0 + 3_200.0)).abs() < 1e-9);
    }
}
