//! Expectation models: what SHOULD be happening in discourse.
//!
//! Baselines capture historical norms, triggers capture known events that
//! temporarily modify them, and `DiscourseExpectation` is the concrete
//! window-specific prediction the analyzers compare snapshots against.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Types of events that modify discourse expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    EarningsRelease,
    ProductLaunch,
    ExecutiveChange,
    RegulatoryFiling,
    NewsBreaking,
    MarketOpen,
    MarketClose,
    CompetitorEvent,
    Seasonal,
    Custom,
}

/// Standard time windows for expectation analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    Hour,
    MarketSession,
    TradingDay,
    Week,
    EarningsWindow,
    Custom,
}

/// A topic expected to be discussed for an entity, with baseline metrics and
/// acceptable variance ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedTopic {
    pub topic_id: String,
    pub topic_name: String,
    /// Average mentions per time window.
    pub expected_mention_count: f64,
    pub mention_stddev: f64,
    pub expected_sentiment: f64,
    pub sentiment_stddev: f64,
    /// How confident we are in this expectation.
    pub confidence: f64,
    /// Number of observations this is based on.
    pub sample_size: usize,
    /// 0-1, how significant the absence of this topic is.
    pub absence_severity: f64,
}

impl ExpectedTopic {
    /// Check whether an observed mention count is anomalous.
    ///
    /// Returns `(is_anomaly, z_score)`. A zero stddev disables the check.
    pub fn is_anomalous_count(&self, observed_count: u64) -> (bool, f64) {
        if self.mention_stddev == 0.0 {
            return (false, 0.0);
        }
        let z = (observed_count as f64 - self.expected_mention_count) / self.mention_stddev;
        (z.abs() > 2.0, z)
    }

    /// Check whether an observed sentiment is anomalous.
    pub fn is_anomalous_sentiment(&self, observed_sentiment: f64) -> (bool, f64) {
        if self.sentiment_stddev == 0.0 {
            return (false, 0.0);
        }
        let z = (observed_sentiment - self.expected_sentiment) / self.sentiment_stddev;
        (z.abs() > 2.0, z)
    }
}

/// An account expected to participate in discourse about an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedVoice {
    pub account_id: String,
    pub username: String,
    pub expected_posts_per_day: f64,
    pub post_stddev: f64,
    /// UTC hours 0-23 this voice is typically active. Empty = always.
    pub active_hours_utc: Vec<u32>,
    /// Days 0-6 (Mon-Sun) this voice is typically active. Empty = always.
    pub active_days: Vec<u32>,
    /// How significant this voice's silence is.
    pub silence_severity: f64,
    /// Executives, official accounts, analysts.
    pub is_key_voice: bool,
    /// Account ids that usually respond to this voice.
    pub typical_responders: Vec<String>,
}

impl ExpectedVoice {
    /// Whether this voice is expected to be active at the given time.
    /// Gates whether silence should even be checked.
    pub fn expected_to_be_active(&self, check_time: DateTime<Utc>) -> bool {
        let hour = check_time.hour();
        let day = check_time.weekday().num_days_from_monday();

        let hour_ok = self.active_hours_utc.is_empty() || self.active_hours_utc.contains(&hour);
        let day_ok = self.active_days.is_empty() || self.active_days.contains(&day);

        hour_ok && day_ok
    }

    /// How long this voice has been silent, in hours.
    pub fn silence_duration_hours(last_post: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        (now - last_post).num_seconds() as f64 / 3600.0
    }
}

/// A time-bounded known event that modifies discourse expectations while
/// active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTrigger {
    pub trigger_id: String,
    pub trigger_type: TriggerType,
    pub entity: String,
    pub name: String,
    pub description: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// 2.0 = expect twice the normal volume.
    pub volume_multiplier: f64,
    /// Expected sentiment change while active.
    pub sentiment_shift: f64,
    pub expected_new_topics: Vec<String>,
    pub expected_new_voices: Vec<String>,
    /// Voices that must participate while this trigger is active.
    pub required_voices: Vec<String>,
    pub confidence: f64,
}

impl ContextTrigger {
    /// Pure interval check: active iff `check_time` is within [start, end).
    pub fn is_active(&self, check_time: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_time {
            if check_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if check_time > end {
                return false;
            }
        }
        true
    }
}

/// Historical pattern for an entity's discourse: what "normal" looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselinePattern {
    pub entity: String,
    pub time_window: TimeWindow,
    pub avg_posts_per_window: f64,
    pub post_stddev: f64,
    /// Normalized volume multiplier per UTC hour, 24 slots.
    pub hourly_volume_pattern: Vec<f64>,
    /// Normalized volume multiplier per weekday (Mon-Sun), 7 slots.
    pub daily_volume_pattern: Vec<f64>,
    pub avg_sentiment: f64,
    pub sentiment_stddev: f64,
    pub typical_topics: Vec<ExpectedTopic>,
    pub typical_voices: Vec<ExpectedVoice>,
    /// author account id -> accounts that typically respond to them.
    pub voice_response_patterns: HashMap<String, Vec<String>>,
    pub sample_start: Option<DateTime<Utc>>,
    pub sample_end: Option<DateTime<Utc>>,
    pub sample_size: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl BaselinePattern {
    /// An all-zero baseline with no samples. Used when no history exists.
    pub fn empty(entity: &str, time_window: TimeWindow) -> Self {
        Self {
            entity: entity.to_string(),
            time_window,
            avg_posts_per_window: 0.0,
            post_stddev: 0.0,
            hourly_volume_pattern: vec![0.0; 24],
            daily_volume_pattern: vec![0.0; 7],
            avg_sentiment: 0.0,
            sentiment_stddev: 0.0,
            typical_topics: Vec::new(),
            typical_voices: Vec::new(),
            voice_response_patterns: HashMap::new(),
            sample_start: None,
            sample_end: None,
            sample_size: 0,
            last_updated: None,
        }
    }

    /// Expected volume at a specific time, scaling the per-window average by
    /// the hour-of-day and day-of-week patterns. If only one factor is
    /// nonzero, it is used alone.
    pub fn expected_volume_at(&self, check_time: DateTime<Utc>) -> f64 {
        let hour_factor = self.hourly_volume_pattern[check_time.hour() as usize];
        let day_factor =
            self.daily_volume_pattern[check_time.weekday().num_days_from_monday() as usize];

        let avg_factor = if hour_factor > 0.0 && day_factor > 0.0 {
            (hour_factor + day_factor) / 2.0
        } else {
            hour_factor.max(day_factor)
        };

        self.avg_posts_per_window * avg_factor
    }
}

/// Complete expectation for an entity over a specific window: baseline plus
/// every active trigger, resolved into concrete predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscourseExpectation {
    pub expectation_id: String,
    pub entity: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub baseline: BaselinePattern,
    pub active_triggers: Vec<ContextTrigger>,
    pub expected_post_count: f64,
    /// (min, max) acceptable post count. Max may be infinite when no
    /// baseline exists.
    pub post_count_range: (f64, f64),
    pub expected_topics: Vec<ExpectedTopic>,
    /// Topic ids that must be discussed.
    pub required_topics: Vec<String>,
    pub expected_voices: Vec<ExpectedVoice>,
    /// Account ids that must participate.
    pub required_voices: Vec<String>,
    pub expected_sentiment: f64,
    pub sentiment_range: (f64, f64),
    pub confidence: f64,
}

impl DiscourseExpectation {
    /// Expectation for a specific topic.
    pub fn expected_topic(&self, topic_id: &str) -> Option<&ExpectedTopic> {
        self.expected_topics.iter().find(|t| t.topic_id == topic_id)
    }

    /// Expectation for a specific voice.
    pub fn expected_voice(&self, account_id: &str) -> Option<&ExpectedVoice> {
        self.expected_voices.iter().find(|v| v.account_id == account_id)
    }

    pub fn is_topic_required(&self, topic_id: &str) -> bool {
        self.required_topics.iter().any(|t| t == topic_id)
    }

    pub fn is_voice_required(&self, account_id: &str) -> bool {
        self.required_voices.iter().any(|v| v == account_id)
    }

    /// Apply a context trigger, mutating expectations in place: volume
    /// scales multiplicatively, sentiment shifts additively, and the
    /// trigger's required voices and new topics are adopted.
    pub fn apply_trigger(&mut self, trigger: &ContextTrigger) {
        self.expected_post_count *= trigger.volume_multiplier;
        self.post_count_range = (
            self.post_count_range.0 * trigger.volume_multiplier,
            self.post_count_range.1 * trigger.volume_multiplier,
        );

        self.expected_sentiment += trigger.sentiment_shift;

        self.required_voices
            .extend(trigger.required_voices.iter().cloned());

        for topic_id in &trigger.expected_new_topics {
            if self.expected_topic(topic_id).is_none() {
                self.expected_topics.push(ExpectedTopic {
                    topic_id: topic_id.clone(),
                    topic_name: topic_id.clone(),
                    expected_mention_count: 10.0,
                    mention_stddev: 5.0,
                    expected_sentiment: 0.0,
                    sentiment_stddev: 0.3,
                    confidence: 0.8,
                    sample_size: 0,
                    // New topics are significant if missing.
                    absence_severity: 0.7,
                });
            }
        }

        self.active_triggers.push(trigger.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn topic(expected: f64, stddev: f64) -> ExpectedTopic {
        ExpectedTopic {
            topic_id: "ticker:TEST".to_string(),
            topic_name: "TEST".to_string(),
            expected_mention_count: expected,
            mention_stddev: stddev,
            expected_sentiment: 0.0,
            sentiment_stddev: 0.2,
            confidence: 0.8,
            sample_size: 20,
            absence_severity: 0.5,
        }
    }

    #[test]
    fn test_anomalous_count_beyond_two_sigma() {
        let t = topic(50.0, 10.0);
        let (anomalous, z) = t.is_anomalous_count(80);
        assert!(anomalous);
        assert!((z - 3.0).abs() < 1e-9);

        let (anomalous, _) = t.is_anomalous_count(55);
        assert!(!anomalous);
    }

    #[test]
    fn test_zero_stddev_disables_anomaly_check() {
        let t = topic(50.0, 0.0);
        assert_eq!(t.is_anomalous_count(0), (false, 0.0));
        assert_eq!(t.is_anomalous_sentiment(1.0), (false, 0.0));
    }

    #[test]
    fn test_trigger_interval_check() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let trigger = ContextTrigger {
            trigger_id: "t1".to_string(),
            trigger_type: TriggerType::EarningsRelease,
            entity: "ACME".to_string(),
            name: "Earnings".to_string(),
            description: String::new(),
            start_time: Some(start),
            end_time: Some(start + chrono::Duration::hours(48)),
            volume_multiplier: 5.0,
            sentiment_shift: 0.0,
            expected_new_topics: Vec::new(),
            expected_new_voices: Vec::new(),
            required_voices: Vec::new(),
            confidence: 0.8,
        };

        assert!(!trigger.is_active(start - chrono::Duration::hours(1)));
        assert!(trigger.is_active(start + chrono::Duration::hours(1)));
        assert!(!trigger.is_active(start + chrono::Duration::hours(49)));
    }

    #[test]
    fn test_expected_volume_uses_nonzero_factor_when_other_is_zero() {
        let mut baseline = BaselinePattern::empty("ACME", TimeWindow::Hour);
        baseline.avg_posts_per_window = 100.0;
        // Monday 2024-03-04, 12:00 UTC.
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();

        baseline.hourly_volume_pattern[12] = 0.8;
        assert!((baseline.expected_volume_at(t) - 80.0).abs() < 1e-9);

        baseline.daily_volume_pattern[0] = 0.4;
        assert!((baseline.expected_volume_at(t) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_trigger_scales_volume_and_shifts_sentiment() {
        let now = Utc::now();
        let mut expectation = DiscourseExpectation {
            expectation_id: "exp".to_string(),
            entity: "ACME".to_string(),
            window_start: now,
            window_end: now + chrono::Duration::hours(1),
            baseline: BaselinePattern::empty("ACME", TimeWindow::Hour),
            active_triggers: Vec::new(),
            expected_post_count: 100.0,
            post_count_range: (60.0, 140.0),
            expected_topics: Vec::new(),
            required_topics: Vec::new(),
            expected_voices: Vec::new(),
            required_voices: Vec::new(),
            expected_sentiment: 0.1,
            sentiment_range: (-0.5, 0.7),
            confidence: 0.8,
        };

        let trigger = ContextTrigger {
            trigger_id: "t1".to_string(),
            trigger_type: TriggerType::EarningsRelease,
            entity: "ACME".to_string(),
            name: "Earnings".to_string(),
            description: String::new(),
            start_time: None,
            end_time: None,
            volume_multiplier: 2.0,
            sentiment_shift: -0.1,
            expected_new_topics: vec!["earnings".to_string()],
            expected_new_voices: Vec::new(),
            required_voices: vec!["x:ir".to_string()],
            confidence: 0.8,
        };

        expectation.apply_trigger(&trigger);

        assert!((expectation.expected_post_count - 200.0).abs() < 1e-9);
        assert_eq!(expectation.post_count_range, (120.0, 280.0));
        assert!((expectation.expected_sentiment - 0.0).abs() < 1e-9);
        assert!(expectation.is_voice_required("x:ir"));
        assert!(expectation.expected_topic("earnings").is_some());
        assert_eq!(expectation.active_triggers.len(), 1);
    }
}
