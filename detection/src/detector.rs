//! Delta detector: the core engine for finding discourse gaps.
//!
//! Runs every analyzer over a snapshot, filters and grades the resulting
//! deltas, keeps a rolling per-entity history, and clusters temporally
//! related deltas into reinforcing groups.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use common::delta::{
    CoordinatedSilence, Delta, DeltaCluster, DeltaKind, DeltaSeverity, DeltaType,
};
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;
use expectation::ExpectationGenerator;

use crate::analyzers::{
    DeltaAnalyzer, SentimentDecouplingAnalyzer, TopicAbsenceAnalyzer, VoiceSilenceAnalyzer,
    VolumeAnomalyAnalyzer,
};
use crate::config::DetectionConfig;

/// Voices whose last posts fall within this spread count as coordinated.
const COORDINATION_WINDOW_HOURS: f64 = 6.0;

type DeltaCallback = Box<dyn Fn(&Delta) + Send + Sync>;
type ClusterCallback = Box<dyn Fn(&DeltaCluster) + Send + Sync>;

/// Aggregate statistics over an entity's recent deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaStatistics {
    pub entity: String,
    pub total_deltas: usize,
    pub by_type: HashMap<String, usize>,
    pub by_severity: HashMap<String, usize>,
    pub avg_confidence: f64,
}

/// Detects deltas between expected and observed discourse.
///
/// Owns the expectation generator, the analyzers (including the stateful
/// voice-silence last-seen map), and the rolling delta history. Callers must
/// serialize calls per entity; different entities are independent.
pub struct DeltaDetector {
    generator: ExpectationGenerator,
    config: DetectionConfig,
    topic_absence: TopicAbsenceAnalyzer,
    voice_silence: VoiceSilenceAnalyzer,
    sentiment_decoupling: SentimentDecouplingAnalyzer,
    volume_anomaly: VolumeAnomalyAnalyzer,
    /// Rolling window used for clustering and coordination checks.
    recent_deltas: Vec<Delta>,
    /// Full history, only grows until the caller prunes.
    delta_history: Vec<Delta>,
    on_delta_detected: Option<DeltaCallback>,
    on_cluster_detected: Option<ClusterCallback>,
}

impl DeltaDetector {
    pub fn new(generator: ExpectationGenerator, config: DetectionConfig) -> Self {
        let topic_absence = TopicAbsenceAnalyzer::new(config.topic_absence_threshold);
        let voice_silence = VoiceSilenceAnalyzer::new(config.voice_silence_threshold_hours);
        let sentiment_decoupling = SentimentDecouplingAnalyzer::new(config.sentiment_z_threshold);
        let volume_anomaly = VolumeAnomalyAnalyzer::new(
            config.volume_collapse_threshold,
            config.volume_spike_threshold,
            config.volume_z_threshold,
        );

        Self {
            generator,
            config,
            topic_absence,
            voice_silence,
            sentiment_decoupling,
            volume_anomaly,
            recent_deltas: Vec::new(),
            delta_history: Vec::new(),
            on_delta_detected: None,
            on_cluster_detected: None,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn expectation_generator(&self) -> &ExpectationGenerator {
        &self.generator
    }

    pub fn expectation_generator_mut(&mut self) -> &mut ExpectationGenerator {
        &mut self.generator
    }

    /// Callback fired for every delta that survives filtering.
    pub fn set_on_delta_detected(&mut self, callback: DeltaCallback) {
        self.on_delta_detected = Some(callback);
    }

    /// Callback fired for every cluster formed after a detection pass.
    pub fn set_on_cluster_detected(&mut self, callback: ClusterCallback) {
        self.on_cluster_detected = Some(callback);
    }

    /// Detect deltas in a discourse snapshot. The expectation is generated
    /// from the cached baseline and active triggers unless supplied.
    pub fn detect(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: Option<DiscourseExpectation>,
    ) -> Vec<Delta> {
        let expectation = expectation.unwrap_or_else(|| {
            self.generator.generate_expectation(
                &snapshot.entity,
                snapshot.window_start,
                snapshot.window_end,
            )
        });

        debug!(entity = %snapshot.entity, "detecting deltas");

        let mut deltas = Vec::new();
        deltas.extend(self.topic_absence.analyze(snapshot, &expectation));
        deltas.extend(self.voice_silence.analyze(snapshot, &expectation));
        deltas.extend(self.sentiment_decoupling.analyze(snapshot, &expectation));
        deltas.extend(self.volume_anomaly.analyze(snapshot, &expectation));

        deltas.retain(|d| d.confidence >= self.config.min_delta_confidence);

        for delta in &mut deltas {
            delta.severity = Self::calculate_severity(delta);
        }

        self.recent_deltas.extend(deltas.iter().cloned());
        self.delta_history.extend(deltas.iter().cloned());

        let clusters = self.detect_clusters(&snapshot.entity);

        if let Some(callback) = &self.on_delta_detected {
            for delta in &deltas {
                callback(delta);
            }
        }
        if let Some(callback) = &self.on_cluster_detected {
            for cluster in &clusters {
                callback(cluster);
            }
        }

        info!(
            entity = %snapshot.entity,
            deltas = deltas.len(),
            clusters = clusters.len(),
            "detection pass complete"
        );

        deltas
    }

    /// Check whether multiple expected voices went quiet together. Looks at
    /// the rolling history of voice-silence deltas for this entity; two or
    /// more with last posts inside the coordination window are suspicious.
    pub fn detect_coordinated_silence(&self, snapshot: &DiscourseSnapshot) -> Option<Delta> {
        let silent: Vec<&common::delta::VoiceSilence> = self
            .recent_deltas
            .iter()
            .filter(|d| d.entity == snapshot.entity)
            .filter_map(|d| match &d.kind {
                DeltaKind::VoiceSilence(payload) => Some(payload),
                _ => None,
            })
            .collect();

        if silent.len() < 2 {
            return None;
        }

        let silence_times: Vec<DateTime<Utc>> =
            silent.iter().filter_map(|v| v.last_post_time).collect();
        if silence_times.is_empty() {
            return None;
        }

        let min_time = *silence_times.iter().min()?;
        let max_time = *silence_times.iter().max()?;
        let spread_hours = (max_time - min_time).num_seconds() as f64 / 3600.0;

        if spread_hours >= COORDINATION_WINDOW_HOURS {
            return None;
        }

        let coordination_score = 1.0 - spread_hours / COORDINATION_WINDOW_HOURS;

        Some(Delta::new(
            &snapshot.entity,
            snapshot.window_start,
            snapshot.window_end,
            coordination_score * 0.8,
            DeltaKind::CoordinatedSilence(CoordinatedSilence {
                silent_accounts: silent.iter().map(|v| v.silent_account_id.clone()).collect(),
                silent_usernames: silent.iter().map(|v| v.silent_username.clone()).collect(),
                silence_start_times: silence_times,
                time_spread_hours: spread_hours,
                coordination_score,
            }),
        ))
    }

    /// Severity follows how large and how certain the deviation is.
    fn calculate_severity(delta: &Delta) -> DeltaSeverity {
        let score = delta.deviation_score * delta.confidence;

        if score >= 0.8 {
            DeltaSeverity::Critical
        } else if score >= 0.6 {
            DeltaSeverity::High
        } else if score >= 0.4 {
            DeltaSeverity::Medium
        } else {
            DeltaSeverity::Low
        }
    }

    /// Re-cluster this entity's recent deltas: sort by detection time and
    /// group runs whose consecutive gaps stay inside the cluster window.
    fn detect_clusters(&mut self, entity: &str) -> Vec<DeltaCluster> {
        let mut entity_deltas: Vec<Delta> = self
            .recent_deltas
            .iter()
            .filter(|d| d.entity == entity)
            .cloned()
            .collect();

        if entity_deltas.len() < self.config.min_cluster_size {
            return Vec::new();
        }

        entity_deltas.sort_by_key(|d| d.detected_at);

        let window = Duration::minutes(self.config.cluster_window_minutes);
        let min_size = self.config.min_cluster_size;
        let mut clusters = Vec::new();
        let mut current: Option<DeltaCluster> = None;

        let mut finalize = |cluster: Option<DeltaCluster>| {
            if let Some(mut cluster) = cluster {
                if cluster.deltas.len() >= min_size {
                    cluster.summary = Self::summarize_cluster(&cluster);
                    clusters.push(cluster);
                }
            }
        };

        for delta in entity_deltas {
            let fits = current
                .as_ref()
                .and_then(|c| c.last_delta_time)
                .map_or(false, |last| delta.detected_at - last <= window);

            if let (true, Some(cluster)) = (fits, current.as_mut()) {
                cluster.add_delta(delta);
            } else {
                finalize(current.take());
                let mut cluster = DeltaCluster::new(entity);
                cluster.add_delta(delta);
                current = Some(cluster);
            }
        }

        finalize(current);

        clusters
    }

    fn summarize_cluster(cluster: &DeltaCluster) -> String {
        // Count types in first-seen order so summaries are deterministic.
        let mut counts: Vec<(DeltaType, usize)> = Vec::new();
        for delta in &cluster.deltas {
            let delta_type = delta.delta_type();
            match counts.iter_mut().find(|(t, _)| *t == delta_type) {
                Some((_, count)) => *count += 1,
                None => counts.push((delta_type, 1)),
            }
        }

        let type_summary = counts
            .iter()
            .map(|(t, count)| format!("{} {}", count, t.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Cluster of {} deltas for {}: {}. Combined severity: {}",
            cluster.deltas.len(),
            cluster.entity,
            type_summary,
            cluster.combined_severity.as_str()
        )
    }

    /// Prune the rolling delta window and the voice-silence last-seen map.
    pub fn cleanup_old_deltas(&mut self, max_age_hours: i64) {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        self.recent_deltas.retain(|d| d.detected_at >= cutoff);
        self.voice_silence.prune_last_seen(cutoff);
    }

    /// Recent deltas, optionally filtered by entity, type, and minimum
    /// severity.
    pub fn get_recent_deltas(
        &self,
        entity: Option<&str>,
        delta_type: Option<DeltaType>,
        min_severity: Option<DeltaSeverity>,
    ) -> Vec<&Delta> {
        self.recent_deltas
            .iter()
            .filter(|d| entity.map_or(true, |e| d.entity == e))
            .filter(|d| delta_type.map_or(true, |t| d.delta_type() == t))
            .filter(|d| min_severity.map_or(true, |s| d.severity >= s))
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.delta_history.len()
    }

    /// Aggregate counts and mean confidence over an entity's recent deltas.
    pub fn get_delta_statistics(&self, entity: &str) -> DeltaStatistics {
        let deltas = self.get_recent_deltas(Some(entity), None, None);

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_severity: HashMap<String, usize> = HashMap::new();
        for delta in &deltas {
            *by_type
                .entry(delta.delta_type().as_str().to_string())
                .or_insert(0) += 1;
            *by_severity
                .entry(delta.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        let avg_confidence = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.confidence).sum::<f64>() / deltas.len() as f64
        };

        DeltaStatistics {
            entity: entity.to_string(),
            total_deltas: deltas.len(),
            by_type,
            by_severity,
            avg_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::expectation::{BaselinePattern, ExpectedTopic, ExpectedVoice, TimeWindow};
    use expectation::{BaselineBuilder, TriggerManager};
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn detector(min_confidence: f64) -> DeltaDetector {
        let generator =
            ExpectationGenerator::new(BaselineBuilder::default(), TriggerManager::with_defaults());
        let config = DetectionConfig {
            min_delta_confidence: min_confidence,
            ..DetectionConfig::default()
        };
        DeltaDetector::new(generator, config)
    }

    /// The fixture from the original system tests: 100-post baseline,
    /// expected topic, and a key voice expected to be active.
    fn sample_expectation() -> DiscourseExpectation {
        let now = Utc::now();
        let mut baseline = BaselinePattern::empty("test_entity", TimeWindow::Hour);
        baseline.avg_posts_per_window = 100.0;
        baseline.post_stddev = 20.0;
        baseline.avg_sentiment = 0.2;
        baseline.sentiment_stddev = 0.3;

        DiscourseExpectation {
            expectation_id: "test_exp".to_string(),
            entity: "test_entity".to_string(),
            window_start: now - Duration::hours(1),
            window_end: now,
            baseline,
            active_triggers: Vec::new(),
            expected_post_count: 100.0,
            post_count_range: (60.0, 140.0),
            expected_topics: vec![ExpectedTopic {
                topic_id: "ticker:TEST".to_string(),
                topic_name: "TEST".to_string(),
                expected_mention_count: 50.0,
                mention_stddev: 10.0,
                expected_sentiment: 0.3,
                sentiment_stddev: 0.2,
                confidence: 0.9,
                sample_size: 40,
                absence_severity: 0.8,
            }],
            required_topics: Vec::new(),
            expected_voices: vec![ExpectedVoice {
                account_id: "x:123".to_string(),
                username: "testceo".to_string(),
                expected_posts_per_day: 5.0,
                post_stddev: 2.0,
                active_hours_utc: Vec::new(),
                active_days: Vec::new(),
                silence_severity: 0.9,
                is_key_voice: true,
                typical_responders: Vec::new(),
            }],
            required_voices: Vec::new(),
            expected_sentiment: 0.2,
            sentiment_range: (-0.4, 0.8),
            confidence: 0.8,
        }
    }

    /// Snapshot far below expectations: collapsed volume, missing topic,
    /// negative sentiment, silent key voice.
    fn sample_snapshot() -> DiscourseSnapshot {
        let now = Utc::now();
        DiscourseSnapshot {
            snapshot_id: "test_snap".to_string(),
            entity: "test_entity".to_string(),
            window_start: now - Duration::hours(1),
            window_end: now,
            posts: Vec::new(),
            threads: Vec::new(),
            total_posts: 30,
            unique_authors: 10,
            total_engagement: 500,
            topic_counts: StdHashMap::from([("ticker:OTHER".to_string(), 20)]),
            topic_sentiments: StdHashMap::from([("ticker:OTHER".to_string(), 0.1)]),
            active_accounts: Vec::new(),
            avg_sentiment: -0.5,
            dominant_tones: Vec::new(),
        }
    }

    /// A milder deviation: everything slightly off, nothing catastrophic.
    fn mild_snapshot() -> DiscourseSnapshot {
        let mut snapshot = sample_snapshot();
        snapshot.total_posts = 45;
        snapshot
            .topic_counts
            .insert("ticker:TEST".to_string(), 12);
        snapshot
    }

    #[test]
    fn test_detects_volume_collapse() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        let collapse: Vec<_> = deltas
            .iter()
            .filter(|d| d.delta_type() == DeltaType::VolumeCollapse)
            .collect();
        assert_eq!(collapse.len(), 1);
        assert!(collapse[0].confidence > 0.5);
    }

    #[test]
    fn test_detects_topic_absence() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        assert!(deltas
            .iter()
            .any(|d| d.delta_type() == DeltaType::TopicAbsence));
    }

    #[test]
    fn test_detects_sentiment_decoupling() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        assert!(deltas
            .iter()
            .any(|d| d.delta_type() == DeltaType::SentimentDecoupling));
    }

    #[test]
    fn test_detects_voice_silence_for_never_seen_key_voice() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        let silence: Vec<_> = deltas
            .iter()
            .filter(|d| d.delta_type() == DeltaType::VoiceSilence)
            .collect();
        assert_eq!(silence.len(), 1);
        // Never seen: 0.4 + 0.3 + 0.3 key voice boost, capped.
        assert!((silence[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_high_confidence_filter_drops_weak_deltas() {
        let mut strict = detector(0.99);
        let deltas = strict.detect(&sample_snapshot(), Some(sample_expectation()));
        assert!(deltas.is_empty());

        let mut lax = detector(0.3);
        let deltas = lax.detect(&sample_snapshot(), Some(sample_expectation()));
        assert!(!deltas.is_empty());
    }

    #[test]
    fn test_severity_follows_deviation_times_confidence() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        for delta in &deltas {
            let score = delta.deviation_score * delta.confidence;
            let expected = if score >= 0.8 {
                DeltaSeverity::Critical
            } else if score >= 0.6 {
                DeltaSeverity::High
            } else if score >= 0.4 {
                DeltaSeverity::Medium
            } else {
                DeltaSeverity::Low
            };
            assert_eq!(delta.severity, expected);
        }
    }

    #[test]
    fn test_deltas_from_one_pass_form_a_cluster() {
        let mut detector = detector(0.3);

        let clusters = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&clusters);
        detector.set_on_cluster_detected(Box::new(move |cluster| {
            assert!(cluster.deltas.len() >= 2);
            assert!(!cluster.summary.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));
        assert!(deltas.len() >= 3);
        assert_eq!(clusters.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_three_distinct_types_escalate_cluster_severity() {
        let mut detector = detector(0.3);
        let now = Utc::now();

        // A regular (non-key) voice silent for 25h keeps every member below
        // CRITICAL, so the multi-type escalation is observable.
        let mut expectation = sample_expectation();
        expectation.expected_voices[0].is_key_voice = false;
        detector
            .voice_silence
            .update_last_seen("x:123", now - Duration::hours(25));

        let escalated = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&escalated);
        detector.set_on_cluster_detected(Box::new(move |cluster| {
            assert!(cluster.unique_type_count() >= 3);
            let max_member = cluster
                .deltas
                .iter()
                .map(|d| d.severity)
                .max()
                .unwrap_or(DeltaSeverity::Low);
            assert!(max_member < DeltaSeverity::Critical);
            assert_eq!(cluster.combined_severity, max_member.escalate());
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        detector.detect(&mild_snapshot(), Some(expectation));
        assert_eq!(escalated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coordinated_silence_from_two_quiet_voices() {
        let mut detector = detector(0.3);
        let now = Utc::now();

        let mut expectation = sample_expectation();
        expectation.expected_voices.push(ExpectedVoice {
            account_id: "x:456".to_string(),
            username: "testcfo".to_string(),
            expected_posts_per_day: 3.0,
            post_stddev: 1.0,
            active_hours_utc: Vec::new(),
            active_days: Vec::new(),
            silence_severity: 0.8,
            is_key_voice: true,
            typical_responders: Vec::new(),
        });

        // Both voices last seen ~30h ago, two hours apart.
        detector
            .voice_silence
            .update_last_seen("x:123", now - Duration::hours(30));
        detector
            .voice_silence
            .update_last_seen("x:456", now - Duration::hours(32));

        let snapshot = sample_snapshot();
        detector.detect(&snapshot, Some(expectation));

        let delta = detector.detect_coordinated_silence(&snapshot).unwrap();
        assert_eq!(delta.delta_type(), DeltaType::CoordinatedSilence);
        match &delta.kind {
            DeltaKind::CoordinatedSilence(payload) => {
                assert_eq!(payload.silent_accounts.len(), 2);
                assert!((payload.time_spread_hours - 2.0).abs() < 0.01);
                // score = 1 - 2/6; confidence = score * 0.8.
                assert!((payload.coordination_score - (1.0 - 2.0 / 6.0)).abs() < 0.01);
                assert!((delta.confidence - payload.coordination_score * 0.8).abs() < 0.01);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_coordinated_silence_needs_two_voices() {
        let mut detector = detector(0.3);
        let snapshot = sample_snapshot();
        detector.detect(&snapshot, Some(sample_expectation()));

        // Only one silent voice in history.
        assert!(detector.detect_coordinated_silence(&snapshot).is_none());
    }

    #[test]
    fn test_cleanup_prunes_rolling_window() {
        let mut detector = detector(0.3);
        detector.detect(&sample_snapshot(), Some(sample_expectation()));
        assert!(!detector.get_recent_deltas(None, None, None).is_empty());
        let history = detector.history_len();

        detector.cleanup_old_deltas(0);
        assert!(detector.get_recent_deltas(None, None, None).is_empty());
        // Full history is untouched by the rolling-window cleanup.
        assert_eq!(detector.history_len(), history);
    }

    #[test]
    fn test_statistics_aggregate_by_type_and_severity() {
        let mut detector = detector(0.3);
        let deltas = detector.detect(&sample_snapshot(), Some(sample_expectation()));

        let stats = detector.get_delta_statistics("test_entity");
        assert_eq!(stats.entity, "test_entity");
        assert_eq!(stats.total_deltas, deltas.len());
        assert_eq!(stats.by_type.values().sum::<usize>(), deltas.len());
        assert_eq!(stats.by_severity.values().sum::<usize>(), deltas.len());
        assert!(stats.avg_confidence > 0.0 && stats.avg_confidence <= 1.0);

        let empty = detector.get_delta_statistics("nobody");
        assert_eq!(empty.total_deltas, 0);
        assert_eq!(empty.avg_confidence, 0.0);
    }

    #[test]
    fn test_generates_expectation_when_not_supplied() {
        let mut detector = detector(0.3);

        // Without a baseline the expectation is maximally uncertain, so
        // nothing can be flagged.
        let deltas = detector.detect(&sample_snapshot(), None);
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_min_severity_filter() {
        let mut detector = detector(0.3);
        detector.detect(&sample_snapshot(), Some(sample_expectation()));

        let all = detector.get_recent_deltas(Some("test_entity"), None, None);
        let high = detector.get_recent_deltas(
            Some("test_entity"),
            None,
            Some(DeltaSeverity::High),
        );
        assert!(high.len() <= all.len());
        assert!(high.iter().all(|d| d.severity >= DeltaSeverity::High));
    }
}
