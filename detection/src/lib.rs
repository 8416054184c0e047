//! Delta detection: analyzers, the detection engine, and event
//! classification.
//!
//! The core loop: an observed `DiscourseSnapshot` is compared against the
//! expectation for its window, surviving deltas are graded and clustered,
//! and clusters are classified into `DetectedEvent`s with market impact
//! predictions.

pub mod analyzers;
pub mod classifier;
pub mod config;
pub mod detector;

pub use analyzers::{
    DeltaAnalyzer, SentimentDecouplingAnalyzer, TopicAbsenceAnalyzer, VoiceSilenceAnalyzer,
    VolumeAnomalyAnalyzer,
};
pub use classifier::EventClassifier;
pub use config::{create_config_template, load_config, save_config, DetectionConfig};
pub use detector::{DeltaDetector, DeltaStatistics};

// Re-export the shared model types most callers need alongside detection.
pub use common::delta::{Delta, DeltaCluster, DeltaRecord, DeltaSeverity, DeltaType};
pub use common::event::{DetectedEvent, EventClassification, EventRecord, EventSeverity, EventType};
