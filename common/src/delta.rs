//! Delta models: typed gaps between expected and observed discourse.
//!
//! A delta is the core signal of the system — evidence that something which
//! SHOULD be happening isn't (or vice versa). Each delta carries a common
//! header plus a variant-specific payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::short_uuid;

/// Discriminant for the kinds of discourse deltas we can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeltaType {
    /// Expected topic not mentioned.
    TopicAbsence,
    /// Expected voice not participating.
    VoiceSilence,
    /// Tone doesn't match what context suggests.
    SentimentDecoupling,
    /// Expected responses not happening.
    NetworkBreak,
    /// Much less activity than expected.
    VolumeCollapse,
    /// Much more activity than expected.
    VolumeSpike,
    /// Multiple voices go quiet together.
    CoordinatedSilence,
}

impl DeltaType {
    /// Stable snake_case name, used in records and classifier keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaType::TopicAbsence => "topic_absence",
            DeltaType::VoiceSilence => "voice_silence",
            DeltaType::SentimentDecoupling => "sentiment_decoupling",
            DeltaType::NetworkBreak => "network_break",
            DeltaType::VolumeCollapse => "volume_collapse",
            DeltaType::VolumeSpike => "volume_spike",
            DeltaType::CoordinatedSilence => "coordinated_silence",
        }
    }
}

/// Severity of a detected delta, ordered LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeltaSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeltaSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaSeverity::Low => "low",
            DeltaSeverity::Medium => "medium",
            DeltaSeverity::High => "high",
            DeltaSeverity::Critical => "critical",
        }
    }

    /// Weight used for severity-weighted confidence averaging.
    pub fn weight(&self) -> f64 {
        match self {
            DeltaSeverity::Low => 1.0,
            DeltaSeverity::Medium => 2.0,
            DeltaSeverity::High => 3.0,
            DeltaSeverity::Critical => 4.0,
        }
    }

    /// The next severity level up, saturating at CRITICAL.
    pub fn escalate(&self) -> Self {
        match self {
            DeltaSeverity::Low => DeltaSeverity::Medium,
            DeltaSeverity::Medium => DeltaSeverity::High,
            DeltaSeverity::High => DeltaSeverity::Critical,
            DeltaSeverity::Critical => DeltaSeverity::Critical,
        }
    }
}

/// Payload for an expected topic that is not being discussed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicAbsence {
    pub missing_topic_id: String,
    pub missing_topic_name: String,
    pub expected_mentions: f64,
    pub observed_mentions: u64,
    pub baseline_mentions: f64,
    /// How important this topic normally is.
    pub topic_importance: f64,
    pub is_required_topic: bool,
}

/// Payload for an expected voice that is not participating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSilence {
    pub silent_account_id: String,
    pub silent_username: String,
    pub silence_hours: f64,
    pub expected_posts: f64,
    pub observed_posts: u64,
    pub last_post_time: Option<DateTime<Utc>>,
    /// Posts per day.
    pub typical_post_frequency: f64,
    pub is_key_voice: bool,
    pub influence_score: f64,
}

/// Payload for sentiment that doesn't match expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentDecoupling {
    pub expected_sentiment: f64,
    pub observed_sentiment: f64,
    pub sentiment_gap: f64,
    /// What set the expectation (e.g. a topic, a trigger).
    pub context: String,
    pub z_score: f64,
    pub is_statistically_significant: bool,
    pub observed_tones: Vec<String>,
    pub expected_tones: Vec<String>,
}

/// Payload for a broken response pattern: A usually responds to B, but
/// didn't this time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkBreak {
    pub expected_responder_id: String,
    pub expected_responder_name: String,
    pub trigger_post_id: String,
    pub trigger_author: String,
    pub trigger_topic: String,
    pub expected_response_window_hours: f64,
    pub wait_time_hours: f64,
    /// Fraction of the time they historically respond.
    pub historical_response_rate: f64,
    pub avg_response_time_minutes: f64,
}

/// Payload for unusual discourse volume: either a collapse (suspiciously
/// quiet) or a spike (unusually loud).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAnomaly {
    pub expected_volume: f64,
    pub observed_volume: u64,
    /// observed / expected.
    pub volume_ratio: f64,
    pub baseline_volume: f64,
    pub volume_stddev: f64,
    pub z_score: f64,
    pub is_collapse: bool,
    pub unique_authors: u64,
    pub expected_authors: f64,
}

/// Payload for multiple expected voices going quiet together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatedSilence {
    pub silent_accounts: Vec<String>,
    pub silent_usernames: Vec<String>,
    pub silence_start_times: Vec<DateTime<Utc>>,
    /// How close together they went quiet.
    pub time_spread_hours: f64,
    /// 0-1, how coordinated this looks.
    pub coordination_score: f64,
}

/// Variant-specific payload of a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeltaKind {
    TopicAbsence(TopicAbsence),
    VoiceSilence(VoiceSilence),
    SentimentDecoupling(SentimentDecoupling),
    NetworkBreak(NetworkBreak),
    VolumeAnomaly(VolumeAnomaly),
    CoordinatedSilence(CoordinatedSilence),
}

impl DeltaKind {
    /// Type discriminant. Volume anomalies resolve to collapse or spike
    /// based on the observed ratio.
    pub fn delta_type(&self) -> DeltaType {
        match self {
            DeltaKind::TopicAbsence(_) => DeltaType::TopicAbsence,
            DeltaKind::VoiceSilence(_) => DeltaType::VoiceSilence,
            DeltaKind::SentimentDecoupling(_) => DeltaType::SentimentDecoupling,
            DeltaKind::NetworkBreak(_) => DeltaType::NetworkBreak,
            DeltaKind::VolumeAnomaly(v) => {
                if v.is_collapse {
                    DeltaType::VolumeCollapse
                } else {
                    DeltaType::VolumeSpike
                }
            }
            DeltaKind::CoordinatedSilence(_) => DeltaType::CoordinatedSilence,
        }
    }

    /// Normalized measure of how far observation deviates from expectation.
    /// May exceed 1.0 for extreme volume ratios; clamp on display.
    pub fn deviation_score(&self) -> f64 {
        match self {
            DeltaKind::TopicAbsence(t) => {
                if t.expected_mentions > 0.0 {
                    1.0 - t.observed_mentions as f64 / t.expected_mentions
                } else {
                    0.0
                }
            }
            DeltaKind::VoiceSilence(v) => {
                if v.expected_posts > 0.0 {
                    1.0 - v.observed_posts as f64 / v.expected_posts
                } else {
                    0.0
                }
            }
            DeltaKind::SentimentDecoupling(s) => s.sentiment_gap.abs() / 2.0,
            DeltaKind::NetworkBreak(n) => {
                if n.expected_response_window_hours > 0.0 {
                    (n.wait_time_hours / n.expected_response_window_hours).min(1.0)
                } else {
                    0.0
                }
            }
            DeltaKind::VolumeAnomaly(v) => {
                if v.expected_volume > 0.0 {
                    (1.0 - v.volume_ratio).abs()
                } else {
                    0.0
                }
            }
            DeltaKind::CoordinatedSilence(c) => c.coordination_score,
        }
    }

    /// What we expected, rendered for records.
    pub fn expected_value(&self) -> String {
        match self {
            DeltaKind::TopicAbsence(t) => format!("{:.1}", t.expected_mentions),
            DeltaKind::VoiceSilence(v) => format!("{:.1}", v.expected_posts),
            DeltaKind::SentimentDecoupling(s) => format!("{:.2}", s.expected_sentiment),
            DeltaKind::NetworkBreak(_) => "response".to_string(),
            DeltaKind::VolumeAnomaly(v) => format!("{:.1}", v.expected_volume),
            DeltaKind::CoordinatedSilence(c) => {
                format!("{} voices active", c.silent_accounts.len())
            }
        }
    }

    /// What we observed, rendered for records.
    pub fn observed_value(&self) -> String {
        match self {
            DeltaKind::TopicAbsence(t) => t.observed_mentions.to_string(),
            DeltaKind::VoiceSilence(v) => v.observed_posts.to_string(),
            DeltaKind::SentimentDecoupling(s) => format!("{:.2}", s.observed_sentiment),
            DeltaKind::NetworkBreak(_) => "no response".to_string(),
            DeltaKind::VolumeAnomaly(v) => v.observed_volume.to_string(),
            DeltaKind::CoordinatedSilence(_) => "all silent".to_string(),
        }
    }

    /// Human-readable description of the gap.
    pub fn description(&self, entity: &str) -> String {
        match self {
            DeltaKind::TopicAbsence(t) => format!(
                "Topic '{}' not mentioned for {}. Expected ~{:.0} mentions, saw {}.",
                t.missing_topic_name, entity, t.expected_mentions, t.observed_mentions
            ),
            DeltaKind::VoiceSilence(v) => {
                let role = if v.is_key_voice { " (key voice)" } else { "" };
                format!(
                    "@{}{} silent for {:.1} hours. Expected ~{:.0} posts, saw {}.",
                    v.silent_username, role, v.silence_hours, v.expected_posts, v.observed_posts
                )
            }
            DeltaKind::SentimentDecoupling(s) => {
                let direction = if s.expected_sentiment > 0.0 {
                    "positive"
                } else {
                    "negative"
                };
                let actual = if s.observed_sentiment < 0.0 {
                    "negative"
                } else {
                    "positive"
                };
                format!(
                    "Sentiment mismatch for {}: expected {} ({:.2}), observed {} ({:.2}). Gap: {:.2}",
                    entity,
                    direction,
                    s.expected_sentiment,
                    actual,
                    s.observed_sentiment,
                    s.sentiment_gap
                )
            }
            DeltaKind::NetworkBreak(n) => format!(
                "@{} did not respond to @{}'s post about {}. Usually responds {:.0}% of the time within {:.0} minutes.",
                n.expected_responder_name,
                n.trigger_author,
                n.trigger_topic,
                n.historical_response_rate * 100.0,
                n.avg_response_time_minutes
            ),
            DeltaKind::VolumeAnomaly(v) => {
                let direction = if v.is_collapse { "below" } else { "above" };
                format!(
                    "Volume {} expectations for {}: expected ~{:.0}, observed {} ({:.1}% of expected). Z-score: {:.2}",
                    direction,
                    entity,
                    v.expected_volume,
                    v.observed_volume,
                    v.volume_ratio * 100.0,
                    v.z_score
                )
            }
            DeltaKind::CoordinatedSilence(c) => {
                let mut names = c
                    .silent_usernames
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                if c.silent_usernames.len() > 3 {
                    names.push_str(&format!(", and {} others", c.silent_usernames.len() - 3));
                }
                format!(
                    "Coordinated silence detected: {} all went quiet within {:.1} hours about {}. Coordination score: {:.2}",
                    names, c.time_spread_hours, entity, c.coordination_score
                )
            }
        }
    }
}

/// A detected discourse delta: common header plus variant payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub delta_id: String,
    pub entity: String,
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub severity: DeltaSeverity,
    /// 0-1, how confident we are this is real.
    pub confidence: f64,
    /// See `DeltaKind::deviation_score`.
    pub deviation_score: f64,
    /// Post ids, metrics, etc. supporting this delta.
    pub evidence: Vec<String>,
    /// Set by the market-validation layer, outside this core.
    pub validated: bool,
    pub kind: DeltaKind,
}

impl Delta {
    pub fn generate_id() -> String {
        format!("delta_{}", short_uuid())
    }

    /// Build a delta, deriving the deviation score from the payload and
    /// clamping confidence into [0, 1].
    pub fn new(
        entity: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        confidence: f64,
        kind: DeltaKind,
    ) -> Self {
        let deviation_score = kind.deviation_score();
        Self {
            delta_id: Self::generate_id(),
            entity: entity.to_string(),
            detected_at: Utc::now(),
            window_start,
            window_end,
            severity: DeltaSeverity::Medium,
            confidence: confidence.clamp(0.0, 1.0),
            deviation_score,
            evidence: Vec::new(),
            validated: false,
            kind,
        }
    }

    pub fn delta_type(&self) -> DeltaType {
        self.kind.delta_type()
    }

    pub fn description(&self) -> String {
        self.kind.description(&self.entity)
    }

    /// Deviation score clamped to [0, 1] for display.
    pub fn clamped_deviation_score(&self) -> f64 {
        self.deviation_score.clamp(0.0, 1.0)
    }

    /// Serializable row for downstream consumers.
    pub fn to_record(&self) -> DeltaRecord {
        DeltaRecord {
            delta_id: self.delta_id.clone(),
            delta_type: self.delta_type().as_str().to_string(),
            entity: self.entity.clone(),
            detected_at: self.detected_at,
            window_start: self.window_start,
            window_end: self.window_end,
            severity: self.severity.as_str().to_string(),
            confidence: self.confidence,
            expected_value: self.kind.expected_value(),
            observed_value: self.kind.observed_value(),
            deviation_score: self.deviation_score,
            description: self.description(),
        }
    }
}

/// Flat serializable form of a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub delta_id: String,
    pub delta_type: String,
    pub entity: String,
    pub detected_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub severity: String,
    pub confidence: f64,
    pub expected_value: String,
    pub observed_value: String,
    pub deviation_score: f64,
    pub description: String,
}

/// A time-windowed group of related deltas for one entity. Multiple weak
/// signals can combine into a strong one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaCluster {
    pub cluster_id: String,
    pub entity: String,
    pub deltas: Vec<Delta>,
    pub delta_types: Vec<DeltaType>,
    pub first_delta_time: Option<DateTime<Utc>>,
    pub last_delta_time: Option<DateTime<Utc>>,
    pub combined_severity: DeltaSeverity,
    pub combined_confidence: f64,
    /// unique delta types / 4, capped at 1.0.
    pub reinforcement_score: f64,
    pub summary: String,
}

impl DeltaCluster {
    pub fn generate_id() -> String {
        format!("cluster_{}", short_uuid())
    }

    pub fn new(entity: &str) -> Self {
        Self {
            cluster_id: Self::generate_id(),
            entity: entity.to_string(),
            deltas: Vec::new(),
            delta_types: Vec::new(),
            first_delta_time: None,
            last_delta_time: None,
            combined_severity: DeltaSeverity::Medium,
            combined_confidence: 0.0,
            reinforcement_score: 0.0,
            summary: String::new(),
        }
    }

    /// Add a delta and recompute the cluster's combined significance.
    pub fn add_delta(&mut self, delta: Delta) {
        if self
            .first_delta_time
            .map_or(true, |t| delta.detected_at < t)
        {
            self.first_delta_time = Some(delta.detected_at);
        }
        if self.last_delta_time.map_or(true, |t| delta.detected_at > t) {
            self.last_delta_time = Some(delta.detected_at);
        }

        self.delta_types.push(delta.delta_type());
        self.deltas.push(delta);
        self.recalculate_significance();
    }

    /// Ids of member deltas.
    pub fn delta_ids(&self) -> Vec<String> {
        self.deltas.iter().map(|d| d.delta_id.clone()).collect()
    }

    /// Count of distinct delta types present.
    pub fn unique_type_count(&self) -> usize {
        let mut types = self.delta_types.clone();
        types.sort();
        types.dedup();
        types.len()
    }

    fn recalculate_significance(&mut self) {
        if self.deltas.is_empty() {
            return;
        }

        let mut total_weight = 0.0;
        let mut weighted_confidence = 0.0;
        let mut max_severity = DeltaSeverity::Low;

        for delta in &self.deltas {
            let weight = delta.severity.weight();
            total_weight += weight;
            weighted_confidence += delta.confidence * weight;
            if delta.severity > max_severity {
                max_severity = delta.severity;
            }
        }

        self.combined_confidence = if total_weight > 0.0 {
            weighted_confidence / total_weight
        } else {
            0.0
        };

        // Three or more distinct delta types reinforce each other enough to
        // escalate severity a level.
        let unique_types = self.unique_type_count();
        if unique_types >= 3 && max_severity != DeltaSeverity::Critical {
            max_severity = max_severity.escalate();
        }

        self.combined_severity = max_severity;
        self.reinforcement_score = (unique_types as f64 / 4.0).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_delta(confidence: f64, severity: DeltaSeverity, ratio: f64) -> Delta {
        let now = Utc::now();
        let mut delta = Delta::new(
            "ACME",
            now - chrono::Duration::hours(1),
            now,
            confidence,
            DeltaKind::VolumeAnomaly(VolumeAnomaly {
                expected_volume: 100.0,
                observed_volume: (100.0 * ratio) as u64,
                volume_ratio: ratio,
                baseline_volume: 100.0,
                volume_stddev: 20.0,
                z_score: 0.0,
                is_collapse: ratio < 0.5,
                unique_authors: 10,
                expected_authors: 10.0,
            }),
        );
        delta.severity = severity;
        delta
    }

    fn topic_delta(confidence: f64, severity: DeltaSeverity) -> Delta {
        let now = Utc::now();
        let mut delta = Delta::new(
            "ACME",
            now - chrono::Duration::hours(1),
            now,
            confidence,
            DeltaKind::TopicAbsence(TopicAbsence {
                missing_topic_id: "ticker:TEST".to_string(),
                missing_topic_name: "TEST".to_string(),
                expected_mentions: 50.0,
                observed_mentions: 5,
                baseline_mentions: 50.0,
                topic_importance: 0.8,
                is_required_topic: false,
            }),
        );
        delta.severity = severity;
        delta
    }

    fn silence_delta(confidence: f64, severity: DeltaSeverity) -> Delta {
        let now = Utc::now();
        let mut delta = Delta::new(
            "ACME",
            now - chrono::Duration::hours(1),
            now,
            confidence,
            DeltaKind::VoiceSilence(VoiceSilence {
                silent_account_id: "x:123".to_string(),
                silent_username: "testceo".to_string(),
                silence_hours: 30.0,
                expected_posts: 5.0,
                observed_posts: 0,
                last_post_time: None,
                typical_post_frequency: 5.0,
                is_key_voice: true,
                influence_score: 0.9,
            }),
        );
        delta.severity = severity;
        delta
    }

    #[test]
    fn test_volume_delta_type_follows_ratio() {
        assert_eq!(
            volume_delta(0.8, DeltaSeverity::High, 0.3).delta_type(),
            DeltaType::VolumeCollapse
        );
        assert_eq!(
            volume_delta(0.8, DeltaSeverity::High, 3.0).delta_type(),
            DeltaType::VolumeSpike
        );
    }

    #[test]
    fn test_deviation_score_for_topic_absence() {
        let delta = topic_delta(0.9, DeltaSeverity::High);
        assert!((delta.deviation_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_spike_deviation_may_exceed_one_but_clamps_for_display() {
        let delta = volume_delta(0.8, DeltaSeverity::High, 3.0);
        assert!(delta.deviation_score > 1.0);
        assert!((delta.clamped_deviation_score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_clamped_on_construction() {
        let delta = volume_delta(1.7, DeltaSeverity::High, 0.3);
        assert_eq!(delta.confidence, 1.0);
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let record = topic_delta(0.9, DeltaSeverity::High).to_record();
        assert_eq!(record.delta_type, "topic_absence");
        assert!(record.description.contains("TEST"));

        let json = serde_json::to_string(&record).unwrap();
        let back: DeltaRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.delta_id, record.delta_id);
    }

    #[test]
    fn test_cluster_confidence_weighted_by_severity() {
        let mut cluster = DeltaCluster::new("ACME");
        cluster.add_delta(volume_delta(0.4, DeltaSeverity::Low, 0.3));
        cluster.add_delta(topic_delta(0.8, DeltaSeverity::Critical));

        // (0.4 * 1 + 0.8 * 4) / 5 = 0.72
        assert!((cluster.combined_confidence - 0.72).abs() < 1e-9);
        assert_eq!(cluster.combined_severity, DeltaSeverity::Critical);
    }

    #[test]
    fn test_cluster_confidence_monotone_in_critical_members() {
        let mut cluster = DeltaCluster::new("ACME");
        cluster.add_delta(volume_delta(0.5, DeltaSeverity::Low, 0.3));
        let before = cluster.combined_confidence;

        cluster.add_delta(topic_delta(0.9, DeltaSeverity::Critical));
        let one_critical = cluster.combined_confidence;
        assert!(one_critical >= before);

        cluster.add_delta(silence_delta(0.9, DeltaSeverity::Critical));
        assert!(cluster.combined_confidence >= one_critical);
    }

    #[test]
    fn test_cluster_escalates_with_three_distinct_types() {
        let mut cluster = DeltaCluster::new("ACME");
        cluster.add_delta(volume_delta(0.6, DeltaSeverity::Medium, 0.3));
        cluster.add_delta(topic_delta(0.6, DeltaSeverity::Medium));
        assert_eq!(cluster.combined_severity, DeltaSeverity::Medium);

        cluster.add_delta(silence_delta(0.6, DeltaSeverity::Medium));
        assert_eq!(cluster.unique_type_count(), 3);
        assert_eq!(cluster.combined_severity, DeltaSeverity::High);
    }

    #[test]
    fn test_reinforcement_score_caps_at_one() {
        let mut cluster = DeltaCluster::new("ACME");
        cluster.add_delta(volume_delta(0.6, DeltaSeverity::Medium, 0.3));
        cluster.add_delta(volume_delta(0.6, DeltaSeverity::Medium, 3.0));
        cluster.add_delta(topic_delta(0.6, DeltaSeverity::Medium));
        cluster.add_delta(silence_delta(0.6, DeltaSeverity::Medium));
        assert!((cluster.reinforcement_score - 1.0).abs() < 1e-9);
    }
}
