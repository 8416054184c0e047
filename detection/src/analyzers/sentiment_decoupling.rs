//! Sentiment decoupling analyzer: detects when tone doesn't match what
//! context suggests.
//!
//! Can indicate insiders knowing something the market doesn't, manipulated
//! sentiment, or emerging problems not yet public.

use common::delta::{Delta, DeltaKind, SentimentDecoupling};
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;

use super::DeltaAnalyzer;

pub struct SentimentDecouplingAnalyzer {
    /// Number of standard deviations before sentiment counts as anomalous.
    z_threshold: f64,
}

impl SentimentDecouplingAnalyzer {
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }

    fn check_overall(
        &self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Option<Delta> {
        let observed = snapshot.avg_sentiment;
        let expected = expectation.expected_sentiment;
        let stddev = expectation.baseline.sentiment_stddev;

        // Zero variance disables the z-check.
        if stddev == 0.0 {
            return None;
        }

        let z_score = (observed - expected) / stddev;
        if z_score.abs() < self.z_threshold {
            return None;
        }

        let confidence = (0.4 + (z_score.abs() - self.z_threshold) * 0.1).min(0.95);

        Some(Delta::new(
            &snapshot.entity,
            snapshot.window_start,
            snapshot.window_end,
            confidence,
            DeltaKind::SentimentDecoupling(SentimentDecoupling {
                expected_sentiment: expected,
                observed_sentiment: observed,
                sentiment_gap: observed - expected,
                context: String::new(),
                z_score,
                is_statistically_significant: true,
                observed_tones: snapshot.dominant_tones.clone(),
                expected_tones: Self::infer_expected_tones(expected),
            }),
        ))
    }

    fn check_topics(
        &self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta> {
        let mut deltas = Vec::new();

        for expected_topic in &expectation.expected_topics {
            let observed = match snapshot.topic_sentiment(&expected_topic.topic_id) {
                Some(s) => s,
                // Topic not present this window.
                None => continue,
            };

            let expected = expected_topic.expected_sentiment;
            let stddev = expected_topic.sentiment_stddev;
            if stddev == 0.0 {
                continue;
            }

            let z_score = (observed - expected) / stddev;
            if z_score.abs() < self.z_threshold {
                continue;
            }

            let confidence = (0.3 + (z_score.abs() - self.z_threshold) * 0.1).min(0.9);

            deltas.push(Delta::new(
                &snapshot.entity,
                snapshot.window_start,
                snapshot.window_end,
                confidence,
                DeltaKind::SentimentDecoupling(SentimentDecoupling {
                    expected_sentiment: expected,
                    observed_sentiment: observed,
                    sentiment_gap: observed - expected,
                    context: format!("Topic: {}", expected_topic.topic_name),
                    z_score,
                    is_statistically_significant: true,
                    observed_tones: Vec::new(),
                    expected_tones: Vec::new(),
                }),
            ));
        }

        deltas
    }

    fn infer_expected_tones(sentiment: f64) -> Vec<String> {
        if sentiment > 0.3 {
            vec!["positive".to_string(), "optimistic".to_string()]
        } else if sentiment < -0.3 {
            vec!["negative".to_string(), "concerned".to_string()]
        } else {
            vec!["neutral".to_string()]
        }
    }
}

impl Default for SentimentDecouplingAnalyzer {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl DeltaAnalyzer for SentimentDecouplingAnalyzer {
    fn name(&self) -> &'static str {
        "sentiment_decoupling"
    }

    fn analyze(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta> {
        let mut deltas = Vec::new();

        if let Some(delta) = self.check_overall(snapshot, expectation) {
            deltas.push(delta);
        }

        deltas.extend(self.check_topics(snapshot, expectation));

        deltas
    }
}
