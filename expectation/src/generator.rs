//! Expectation generator: combines cached baselines with active triggers to
//! produce the concrete "what SHOULD be happening" prediction for an entity
//! and time window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use common::discourse::DiscourseSnapshot;
use common::expectation::{BaselinePattern, DiscourseExpectation, TimeWindow};

use crate::baseline::BaselineBuilder;
use crate::triggers::TriggerManager;

/// Decay factor for incremental baseline updates: existing pattern keeps 95%
/// of its weight per update.
pub const DEFAULT_DECAY: f64 = 0.95;

/// Generates expectations for discourse at a given point in time, combining
/// historical baselines, active context triggers, and time-of-day/week
/// patterns.
pub struct ExpectationGenerator {
    baseline_builder: BaselineBuilder,
    trigger_manager: TriggerManager,
    /// Per-entity baseline cache. The only long-lived mutable state this
    /// crate owns.
    baselines: HashMap<String, BaselinePattern>,
}

impl ExpectationGenerator {
    pub fn new(baseline_builder: BaselineBuilder, trigger_manager: TriggerManager) -> Self {
        Self {
            baseline_builder,
            trigger_manager,
            baselines: HashMap::new(),
        }
    }

    /// Load a pre-computed baseline for an entity.
    pub fn load_baseline(&mut self, entity: &str, baseline: BaselinePattern) {
        info!(entity, "loaded baseline");
        self.baselines.insert(entity.to_string(), baseline);
    }

    /// Build and cache a baseline from historical data.
    pub fn build_baseline(&mut self, entity: &str, historical_snapshots: &[DiscourseSnapshot]) {
        let baseline =
            self.baseline_builder
                .build_baseline(entity, historical_snapshots, TimeWindow::Hour);
        info!(
            entity,
            snapshots = historical_snapshots.len(),
            "built baseline"
        );
        self.baselines.insert(entity.to_string(), baseline);
    }

    pub fn baseline(&self, entity: &str) -> Option<&BaselinePattern> {
        self.baselines.get(entity)
    }

    pub fn trigger_manager(&self) -> &TriggerManager {
        &self.trigger_manager
    }

    pub fn trigger_manager_mut(&mut self) -> &mut TriggerManager {
        &mut self.trigger_manager
    }

    /// Generate the expectation for an entity over a window. A missing
    /// baseline yields a maximally-uncertain expectation rather than an
    /// error; triggers active at `window_start` are applied in registration
    /// order.
    pub fn generate_expectation(
        &mut self,
        entity: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> DiscourseExpectation {
        let baseline = match self.baselines.get(entity) {
            Some(b) => b.clone(),
            None => {
                warn!(entity, "no baseline, using empty expectation");
                return Self::empty_expectation(entity, window_start, window_end);
            }
        };

        let mut expectation =
            Self::expectation_from_baseline(entity, baseline, window_start, window_end);

        let active_triggers = self
            .trigger_manager
            .get_active_triggers(entity, window_start);

        for trigger in &active_triggers {
            expectation.apply_trigger(trigger);
            debug!(entity, trigger = %trigger.name, "applied trigger");
        }

        expectation
    }

    fn expectation_from_baseline(
        entity: &str,
        baseline: BaselinePattern,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> DiscourseExpectation {
        let expected_volume = baseline.expected_volume_at(window_start);

        let volume_min = (expected_volume - 2.0 * baseline.post_stddev).max(0.0);
        let volume_max = expected_volume + 2.0 * baseline.post_stddev;

        let sentiment_min = baseline.avg_sentiment - 2.0 * baseline.sentiment_stddev;
        let sentiment_max = baseline.avg_sentiment + 2.0 * baseline.sentiment_stddev;

        let expected_topics: Vec<_> = baseline
            .typical_topics
            .iter()
            .filter(|t| t.confidence > 0.5)
            .cloned()
            .collect();

        let expected_voices: Vec<_> = baseline
            .typical_voices
            .iter()
            .filter(|v| v.expected_to_be_active(window_start))
            .cloned()
            .collect();

        let required_topics: Vec<String> = expected_topics
            .iter()
            .filter(|t| t.absence_severity > 0.7)
            .map(|t| t.topic_id.clone())
            .collect();

        let required_voices: Vec<String> = expected_voices
            .iter()
            .filter(|v| v.is_key_voice)
            .map(|v| v.account_id.clone())
            .collect();

        // More samples means more confidence, capped below certainty.
        let confidence = (baseline.sample_size as f64 / 100.0).min(0.9);

        DiscourseExpectation {
            expectation_id: format!("exp_{}_{}", entity, window_start.timestamp()),
            entity: entity.to_string(),
            window_start,
            window_end,
            expected_post_count: expected_volume,
            post_count_range: (volume_min, volume_max),
            expected_topics,
            required_topics,
            expected_voices,
            required_voices,
            expected_sentiment: baseline.avg_sentiment,
            sentiment_range: (sentiment_min, sentiment_max),
            confidence,
            active_triggers: Vec::new(),
            baseline,
        }
    }

    fn empty_expectation(
        entity: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> DiscourseExpectation {
        DiscourseExpectation {
            expectation_id: format!("exp_{}_{}_empty", entity, window_start.timestamp()),
            entity: entity.to_string(),
            window_start,
            window_end,
            baseline: BaselinePattern::empty(entity, TimeWindow::Hour),
            active_triggers: Vec::new(),
            expected_post_count: 0.0,
            post_count_range: (0.0, f64::INFINITY),
            expected_topics: Vec::new(),
            required_topics: Vec::new(),
            expected_voices: Vec::new(),
            required_voices: Vec::new(),
            expected_sentiment: 0.0,
            sentiment_range: (-1.0, 1.0),
            confidence: 0.1,
        }
    }

    /// Incrementally merge new observations into the entity's baseline, or
    /// build one if none exists yet.
    pub fn update_with_new_data(&mut self, entity: &str, new_snapshots: &[DiscourseSnapshot]) {
        match self.baselines.get(entity) {
            Some(existing) => {
                let updated =
                    self.baseline_builder
                        .update_baseline(existing, new_snapshots, DEFAULT_DECAY);
                self.baselines.insert(entity.to_string(), updated);
                info!(entity, "updated baseline");
            }
            None => self.build_baseline(entity, new_snapshots),
        }
    }

    /// Human-readable digest of what we currently expect for an entity.
    pub fn expectation_summary(&mut self, entity: &str, at_time: DateTime<Utc>) -> ExpectationSummary {
        let expectation = self.generate_expectation(entity, at_time, at_time + Duration::hours(1));

        ExpectationSummary {
            entity: entity.to_string(),
            time: at_time,
            confidence: expectation.confidence,
            expected_post_count: expectation.expected_post_count,
            post_count_range: expectation.post_count_range,
            expected_sentiment: expectation.expected_sentiment,
            sentiment_range: expectation.sentiment_range,
            required_topics: expectation.required_topics.clone(),
            expected_voice_count: expectation.expected_voices.len(),
            required_voices: expectation.required_voices.clone(),
            active_triggers: expectation
                .active_triggers
                .iter()
                .map(|t| t.name.clone())
                .collect(),
        }
    }

    /// Compare an expectation to an actual observation, producing the
    /// summary of differences delta detection works from.
    pub fn compare_to_observation(
        &self,
        expectation: &DiscourseExpectation,
        observation: &DiscourseSnapshot,
    ) -> ObservationComparison {
        let volume_expected = expectation.expected_post_count;
        let volume_observed = observation.total_posts;
        let volume_ratio = if volume_expected > 0.0 {
            volume_observed as f64 / volume_expected
        } else {
            f64::INFINITY
        };

        let sentiment_diff = observation.avg_sentiment - expectation.expected_sentiment;

        let missing_required_topics: Vec<String> = expectation
            .required_topics
            .iter()
            .filter(|t| observation.topic_volume(t) == 0)
            .cloned()
            .collect();

        let observed_voices: Vec<String> = observation.active_account_ids();
        let missing_required_voices: Vec<String> = expectation
            .required_voices
            .iter()
            .filter(|v| !observed_voices.contains(v))
            .cloned()
            .collect();

        let mut topic_presence = HashMap::new();
        for topic in &expectation.expected_topics {
            let observed = observation.topic_volume(&topic.topic_id);
            let (anomalous, z_score) = topic.is_anomalous_count(observed);
            topic_presence.insert(
                topic.topic_id.clone(),
                TopicPresence {
                    expected: topic.expected_mention_count,
                    observed,
                    anomalous,
                    z_score,
                },
            );
        }

        let overall_deviation_score = Self::deviation_score(
            volume_ratio,
            sentiment_diff,
            missing_required_topics.len(),
            missing_required_voices.len(),
        );

        ObservationComparison {
            volume: VolumeComparison {
                expected: volume_expected,
                observed: volume_observed,
                ratio: volume_ratio,
                anomalous: volume_ratio < 0.5 || volume_ratio > 2.0,
            },
            sentiment: SentimentComparison {
                expected: expectation.expected_sentiment,
                observed: observation.avg_sentiment,
                difference: sentiment_diff,
                anomalous: sentiment_diff.abs() > 2.0 * expectation.baseline.sentiment_stddev,
            },
            missing_required_topics,
            missing_required_voices,
            topic_presence,
            overall_deviation_score,
        }
    }

    fn deviation_score(
        volume_ratio: f64,
        sentiment_diff: f64,
        missing_topics: usize,
        missing_voices: usize,
    ) -> f64 {
        let mut score = 0.0;

        if volume_ratio < 1.0 {
            score += (1.0 - volume_ratio) * 0.3;
        } else {
            score += ((volume_ratio - 1.0) / 3.0).min(1.0) * 0.3;
        }

        score += sentiment_diff.abs().min(1.0) * 0.3;
        score += (missing_topics as f64 / 3.0).min(1.0) * 0.2;
        score += (missing_voices as f64 / 3.0).min(1.0) * 0.2;

        score.min(1.0)
    }
}

/// Human-readable summary of current expectations for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationSummary {
    pub entity: String,
    pub time: DateTime<Utc>,
    pub confidence: f64,
    pub expected_post_count: f64,
    pub post_count_range: (f64, f64),
    pub expected_sentiment: f64,
    pub sentiment_range: (f64, f64),
    pub required_topics: Vec<String>,
    pub expected_voice_count: usize,
    pub required_voices: Vec<String>,
    pub active_triggers: Vec<String>,
}

/// Volume side of an expectation-vs-observation comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeComparison {
    pub expected: f64,
    pub observed: u64,
    pub ratio: f64,
    pub anomalous: bool,
}

/// Sentiment side of an expectation-vs-observation comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentComparison {
    pub expected: f64,
    pub observed: f64,
    pub difference: f64,
    pub anomalous: bool,
}

/// Per-topic presence in an expectation-vs-observation comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPresence {
    pub expected: f64,
    pub observed: u64,
    pub anomalous: bool,
    pub z_score: f64,
}

/// Full summary of differences between expected and observed discourse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationComparison {
    pub volume: VolumeComparison,
    pub sentiment: SentimentComparison,
    pub missing_required_topics: Vec<String>,
    pub missing_required_voices: Vec<String>,
    pub topic_presence: HashMap<String, TopicPresence>,
    pub overall_deviation_score: f64,
}
