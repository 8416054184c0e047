//! Topic absence analyzer: detects when expected topics aren't being
//! discussed.
//!
//! One of the most powerful signals: when people stop talking about
//! something they usually discuss.

use common::delta::{Delta, DeltaKind, TopicAbsence};
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;

use super::DeltaAnalyzer;

pub struct TopicAbsenceAnalyzer {
    /// Ratio below which a topic is considered absent (0.3 = less than 30%
    /// of expected mentions).
    threshold: f64,
}

impl TopicAbsenceAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for TopicAbsenceAnalyzer {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl DeltaAnalyzer for TopicAbsenceAnalyzer {
    fn name(&self) -> &'static str {
        "topic_absence"
    }

    fn analyze(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta> {
        let mut deltas = Vec::new();

        for expected_topic in &expectation.expected_topics {
            let observed_count = snapshot.topic_volume(&expected_topic.topic_id);
            let expected_count = expected_topic.expected_mention_count;

            // Skip topics we don't expect many mentions of.
            if expected_count < 1.0 {
                continue;
            }

            let ratio = observed_count as f64 / expected_count;
            if ratio >= self.threshold {
                continue;
            }

            let is_required = expectation.is_topic_required(&expected_topic.topic_id);

            // Confidence grows with how far below the threshold we are;
            // required topics get a boost.
            let mut confidence = ((self.threshold - ratio) / self.threshold + 0.3).min(0.95);
            if is_required {
                confidence = (confidence + 0.2).min(0.99);
            }

            deltas.push(Delta::new(
                &snapshot.entity,
                snapshot.window_start,
                snapshot.window_end,
                confidence,
                DeltaKind::TopicAbsence(TopicAbsence {
                    missing_topic_id: expected_topic.topic_id.clone(),
                    missing_topic_name: expected_topic.topic_name.clone(),
                    expected_mentions: expected_count,
                    observed_mentions: observed_count,
                    baseline_mentions: expected_count,
                    topic_importance: expected_topic.absence_severity,
                    is_required_topic: is_required,
                }),
            ));
        }

        deltas
    }
}
