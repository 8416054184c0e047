//! Volume anomaly analyzer: detects unusual activity levels.
//!
//! Both directions matter: a collapse can be coordinated silence or
//! pre-announcement quiet, a spike can be breaking news or a coordinated
//! campaign.

use common::delta::{Delta, DeltaKind, VolumeAnomaly};
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;

use super::DeltaAnalyzer;

pub struct VolumeAnomalyAnalyzer {
    /// Volume ratio below which activity counts as a collapse.
    collapse_threshold: f64,
    /// Volume ratio above which activity counts as a spike.
    spike_threshold: f64,
    /// Z-score a spike must additionally clear. Collapses are flagged on
    /// ratio alone.
    z_threshold: f64,
}

impl VolumeAnomalyAnalyzer {
    pub fn new(collapse_threshold: f64, spike_threshold: f64, z_threshold: f64) -> Self {
        Self {
            collapse_threshold,
            spike_threshold,
            z_threshold,
        }
    }

    fn build_delta(
        &self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
        is_collapse: bool,
        ratio: f64,
        z_score: f64,
    ) -> Delta {
        let confidence = if is_collapse {
            (0.5 + (self.collapse_threshold - ratio) * 0.5).min(0.95)
        } else {
            (0.4 + (ratio - self.spike_threshold) * 0.1).min(0.95)
        };

        let unique_author_ratio = if snapshot.total_posts > 0 {
            snapshot.unique_authors as f64 / snapshot.total_posts as f64
        } else {
            0.0
        };

        Delta::new(
            &snapshot.entity,
            snapshot.window_start,
            snapshot.window_end,
            confidence,
            DeltaKind::VolumeAnomaly(VolumeAnomaly {
                expected_volume: expectation.expected_post_count,
                observed_volume: snapshot.total_posts,
                volume_ratio: ratio,
                baseline_volume: expectation.baseline.avg_posts_per_window,
                volume_stddev: expectation.baseline.post_stddev,
                z_score,
                is_collapse,
                unique_authors: snapshot.unique_authors,
                expected_authors: expectation.expected_post_count * unique_author_ratio,
            }),
        )
    }
}

impl Default for VolumeAnomalyAnalyzer {
    fn default() -> Self {
        Self::new(0.5, 2.0, 2.0)
    }
}

impl DeltaAnalyzer for VolumeAnomalyAnalyzer {
    fn name(&self) -> &'static str {
        "volume_anomaly"
    }

    fn analyze(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta> {
        let expected_volume = expectation.expected_post_count;
        if expected_volume <= 0.0 {
            return Vec::new();
        }

        let observed_volume = snapshot.total_posts;
        let ratio = observed_volume as f64 / expected_volume;

        let stddev = expectation.baseline.post_stddev;
        let z_score = if stddev > 0.0 {
            (observed_volume as f64 - expected_volume) / stddev
        } else {
            0.0
        };

        if ratio < self.collapse_threshold {
            vec![self.build_delta(snapshot, expectation, true, ratio, z_score)]
        } else if ratio > self.spike_threshold && z_score.abs() >= self.z_threshold {
            vec![self.build_delta(snapshot, expectation, false, ratio, z_score)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::delta::DeltaType;
    use common::expectation::{BaselinePattern, TimeWindow};
    use std::collections::HashMap;

    fn expectation(expected_posts: f64, post_stddev: f64) -> DiscourseExpectation {
        let now = Utc::now();
        let mut baseline = BaselinePattern::empty("ACME", TimeWindow::Hour);
        baseline.avg_posts_per_window = expected_posts;
        baseline.post_stddev = post_stddev;

        DiscourseExpectation {
            expectation_id: "exp".to_string(),
            entity: "ACME".to_string(),
            window_start: now - chrono::Duration::hours(1),
            window_end: now,
            baseline,
            active_triggers: Vec::new(),
            expected_post_count: expected_posts,
            post_count_range: (
                expected_posts - 2.0 * post_stddev,
                expected_posts + 2.0 * post_stddev,
            ),
            expected_topics: Vec::new(),
            required_topics: Vec::new(),
            expected_voices: Vec::new(),
            required_voices: Vec::new(),
            expected_sentiment: 0.2,
            sentiment_range: (-0.4, 0.8),
            confidence: 0.8,
        }
    }

    fn snapshot(total_posts: u64) -> DiscourseSnapshot {
        let now = Utc::now();
        DiscourseSnapshot {
            snapshot_id: "snap".to_string(),
            entity: "ACME".to_string(),
            window_start: now - chrono::Duration::hours(1),
            window_end: now,
            posts: Vec::new(),
            threads: Vec::new(),
            total_posts,
            unique_authors: total_posts / 3,
            total_engagement: 0,
            topic_counts: HashMap::new(),
            topic_sentiments: HashMap::new(),
            active_accounts: Vec::new(),
            avg_sentiment: 0.2,
            dominant_tones: Vec::new(),
        }
    }

    #[test]
    fn test_collapse_detected_without_z_gate() {
        let mut analyzer = VolumeAnomalyAnalyzer::default();
        // Ratio 0.3, but stddev 0 so z-score is 0. Collapses flag anyway.
        let deltas = analyzer.analyze(&snapshot(30), &expectation(100.0, 0.0));

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta_type(), DeltaType::VolumeCollapse);
        // 0.5 + (0.5 - 0.3) * 0.5 = 0.6.
        assert!((deltas[0].confidence - 0.6).abs() < 1e-9);
        assert!(deltas[0].confidence > 0.5);
    }

    #[test]
    fn test_spike_requires_statistical_significance() {
        let mut analyzer = VolumeAnomalyAnalyzer::default();

        // Ratio 3.0 but huge stddev keeps |z| below 2: no delta.
        let deltas = analyzer.analyze(&snapshot(300), &expectation(100.0, 150.0));
        assert!(deltas.is_empty());

        // Same ratio with tight stddev: spike.
        let deltas = analyzer.analyze(&snapshot(300), &expectation(100.0, 20.0));
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta_type(), DeltaType::VolumeSpike);
        // 0.4 + (3.0 - 2.0) * 0.1 = 0.5.
        assert!((deltas[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_normal_range_produces_no_delta() {
        let mut analyzer = VolumeAnomalyAnalyzer::default();

        for posts in [50, 100, 150, 200] {
            let deltas = analyzer.analyze(&snapshot(posts), &expectation(100.0, 20.0));
            assert!(deltas.is_empty(), "posts={} should be in range", posts);
        }
    }

    #[test]
    fn test_zero_expected_volume_is_skipped() {
        let mut analyzer = VolumeAnomalyAnalyzer::default();
        let deltas = analyzer.analyze(&snapshot(30), &expectation(0.0, 20.0));
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_collapse_and_spike_are_mutually_exclusive() {
        let mut analyzer = VolumeAnomalyAnalyzer::default();

        let collapse = analyzer.analyze(&snapshot(30), &expectation(100.0, 20.0));
        assert_eq!(collapse.len(), 1);
        match &collapse[0].kind {
            DeltaKind::VolumeAnomaly(payload) => assert!(payload.is_collapse),
            other => panic!("unexpected payload: {:?}", other),
        }

        let spike = analyzer.analyze(&snapshot(300), &expectation(100.0, 20.0));
        assert_eq!(spike.len(), 1);
        match &spike[0].kind {
            DeltaKind::VolumeAnomaly(payload) => assert!(!payload.is_collapse),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
