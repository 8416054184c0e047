//! Delta analyzers: each compares one observed snapshot against the
//! expectation and emits zero or more typed deltas.

pub mod sentiment_decoupling;
pub mod topic_absence;
pub mod voice_silence;
pub mod volume_anomaly;

pub use sentiment_decoupling::SentimentDecouplingAnalyzer;
pub use topic_absence::TopicAbsenceAnalyzer;
pub use voice_silence::VoiceSilenceAnalyzer;
pub use volume_anomaly::VolumeAnomalyAnalyzer;

use common::delta::Delta;
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;

/// Common seam for delta analyzers.
///
/// `analyze` takes `&mut self` because some analyzers (voice silence) keep
/// per-account state between windows.
pub trait DeltaAnalyzer {
    fn name(&self) -> &'static str;

    fn analyze(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta>;
}
