use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Every numeric knob the spec names, threaded by reference into each
/// component constructor instead of read from ambient globals (§9: "Global
/// scheduler parameters... pass explicitly into each component").
///
/// Constructed once at process startup (`SchedulerConfig::default()`, a TOML
/// file, or environment overrides in `alif-cli`'s bootstrap) and shared as
/// `&SchedulerConfig` everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub acquisition: AcquisitionConfig,
    pub leech: LeechConfig,
    pub fsrs: FsrsConfig,
    pub material: MaterialConfig,
    pub session: SessionConfig,
    pub auto_intro: AutoIntroConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            leech: LeechConfig::default(),
            fsrs: FsrsConfig::default(),
            material: MaterialConfig::default(),
            session: SessionConfig::default(),
            auto_intro: AutoIntroConfig::default(),
        }
    }
}

/// §4.3 acquisition box intervals and graduation guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub box1_interval: Duration,
    pub box2_interval: Duration,
    pub box3_interval: Duration,
    /// Minimum distinct calendar days since first review before graduation
    /// is permitted, regardless of within-session review count (§4.3, §8).
    pub min_calendar_days_before_graduation: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            box1_interval: Duration::from_secs(4 * 3600),
            box2_interval: Duration::from_secs(24 * 3600),
            box3_interval: Duration::from_secs(3 * 24 * 3600),
            min_calendar_days_before_graduation: 2,
        }
    }
}

/// §4.4 leech detection thresholds and graduated cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeechConfig {
    pub threshold_reviews: u32,
    pub threshold_accuracy: f64,
    pub cooldown_days: [u32; 3],
}

impl Default for LeechConfig {
    fn default() -> Self {
        Self {
            threshold_reviews: 5,
            threshold_accuracy: 0.50,
            cooldown_days: [3, 7, 14],
        }
    }
}

impl LeechConfig {
    /// Cooldown for the nth leech event (1-indexed); caps at the last entry
    /// for 3rd+ (§4.4: "14 on third+").
    pub fn cooldown_for(&self, leech_count: u32) -> u32 {
        let idx = (leech_count.max(1) - 1).min(self.cooldown_days.len() as u32 - 1) as usize;
        self.cooldown_days[idx]
    }
}

/// §4.4 FSRS-6 target retention and parameter vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsrsConfig {
    pub desired_retention: f64,
    /// 21-parameter FSRS-6 weight vector; `None` uses the algorithm's
    /// built-in defaults until ≥1,000 reviews permit optimization.
    pub parameters: Option<Vec<f32>>,
}

impl Default for FsrsConfig {
    fn default() -> Self {
        Self {
            desired_retention: 0.90,
            parameters: None,
        }
    }
}

/// §4.5 sentence material manager pool sizing and pipeline cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub active_pool_hard_cap: u32,
    pub active_pool_headroom: u32,
    pub min_sentences_per_target_word: u32,
    pub min_target_words_per_sentence: u32,
    pub max_target_words_per_sentence: u32,
    pub pipeline_interval: Duration,
    pub jit_generation_budget_per_session: u32,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            active_pool_hard_cap: 300,
            active_pool_headroom: 30,
            min_sentences_per_target_word: 1,
            min_target_words_per_sentence: 2,
            max_target_words_per_sentence: 4,
            pipeline_interval: Duration::from_secs(6 * 3600),
            jit_generation_budget_per_session: 10,
        }
    }
}

/// §4.6 session builder sizing, comprehensibility gate, and staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub min_session_size: u32,
    pub max_session_size: u32,
    pub focus_cohort_cap: u32,
    /// Fraction of scaffold content tokens that must be consolidated for a
    /// sentence to pass the comprehensibility gate (§4.6 step 4).
    pub comprehensibility_fraction: f64,
    pub min_acquisition_exposures: u32,
    pub background_refresh_staleness: Duration,
    /// §9 open question: specification chose "only scaffold" for the gate's
    /// known-fraction denominator; kept switchable here.
    pub comprehensibility_counts_target_word: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_session_size: 10,
            max_session_size: 15,
            focus_cohort_cap: 200,
            comprehensibility_fraction: 0.60,
            min_acquisition_exposures: 4,
            background_refresh_staleness: Duration::from_secs(15 * 60),
            comprehensibility_counts_target_word: false,
        }
    }
}

/// §4.7 auto-introduction accuracy throttle bands and capacity caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoIntroConfig {
    /// Ascending accuracy thresholds paired with the max slots granted at or
    /// above that threshold. Evaluated highest-threshold-first.
    pub accuracy_bands: Vec<(f64, u32)>,
    pub per_session_cap: u32,
    pub box1_soft_cap: u32,
    pub recent_accuracy_window: Duration,
}

impl Default for AutoIntroConfig {
    fn default() -> Self {
        Self {
            accuracy_bands: vec![(0.92, 10), (0.85, 7), (0.70, 4), (0.0, 0)],
            per_session_cap: 10,
            box1_soft_cap: 12,
            recent_accuracy_window: Duration::from_secs(2 * 24 * 3600),
        }
    }
}

impl AutoIntroConfig {
    /// §4.7: "α < 0.70 → 0 slots", ascending bands up to "α ≥ 0.92 → up to 10".
    pub fn slots_for_accuracy(&self, accuracy: f64) -> u32 {
        for (threshold, slots) in &self.accuracy_bands {
            if accuracy >= *threshold {
                return *slots;
            }
        }
        0
    }

    pub fn recent_accuracy_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.recent_accuracy_window).unwrap_or(chrono::Duration::days(2))
    }
}
