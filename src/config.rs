//! JSON design configuration.

use fixq_core::{FilterDescription, FractionalPolicy, RangeTracker};
use fixq_math::{FixedPointError, FixedPointFormat, OverflowPolicy, QuantizationPolicy};
use serde::{Deserialize, Serialize};

fn default_word_length() -> u32 {
    16
}

fn default_fractional_length() -> u32 {
    15
}

fn default_amplitude_bound() -> f64 {
    1.0
}

fn default_module_name() -> String {
    "filter".to_string()
}

/// Everything needed to go from coefficients to a sized design.
///
/// Only `filter` is required:
///
/// ```
/// use fixq::DesignConfig;
///
/// let cfg = DesignConfig::from_json(r#"{
///     "filter": { "coefficients": { "transfer_function": {
///         "numerator": [0.25, 0.25], "denominator": [1.0] } } },
///     "word_length": 12,
///     "fractional_length": 10,
///     "overflow": "saturate"
/// }"#).unwrap();
/// assert_eq!(cfg.signal_format().unwrap().to_string(), "Q1.10");
/// assert_eq!(cfg.module_name, "filter");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignConfig {
    pub filter: FilterDescription,
    #[serde(default = "default_word_length")]
    pub word_length: u32,
    #[serde(default = "default_fractional_length")]
    pub fractional_length: u32,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default)]
    pub quantization: QuantizationPolicy,
    /// Defaults to the signal word length
    #[serde(default)]
    pub coefficient_word_length: Option<u32>,
    #[serde(default = "default_amplitude_bound")]
    pub amplitude_bound: f64,
    /// Defaults to the signal fractional length everywhere
    #[serde(default)]
    pub fractional_policy: Option<FractionalPolicy>,
    #[serde(default = "default_module_name")]
    pub module_name: String,
}

impl DesignConfig {
    pub fn new(filter: FilterDescription) -> Self {
        Self {
            filter,
            word_length: default_word_length(),
            fractional_length: default_fractional_length(),
            overflow: OverflowPolicy::default(),
            quantization: QuantizationPolicy::default(),
            coefficient_word_length: None,
            amplitude_bound: default_amplitude_bound(),
            fractional_policy: None,
            module_name: default_module_name(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn signal_format(&self) -> Result<FixedPointFormat, FixedPointError> {
        FixedPointFormat::new(
            self.word_length as i64,
            self.fractional_length as i64,
            self.overflow,
            self.quantization,
        )
    }

    /// Range analysis configured from these settings
    pub fn range_tracker(&self) -> Result<RangeTracker, FixedPointError> {
        let signal = self.signal_format()?;
        let mut tracker = RangeTracker::new(signal).with_amplitude_bound(self.amplitude_bound);
        if let Some(wl) = self.coefficient_word_length {
            tracker = tracker.with_coefficient_word_length(wl);
        }
        if let Some(policy) = &self.fractional_policy {
            tracker = tracker.with_fractional_policy(policy.clone());
        }
        Ok(tracker)
    }
}
