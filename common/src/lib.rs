//! Shared data model for the discourse delta detection pipeline.
//!
//! This crate holds the types every other layer speaks:
//! - `discourse`: observed reality (posts, accounts, per-window snapshots)
//! - `expectation`: predicted reality (baselines, triggers, expectations)
//! - `delta`: detected gaps between the two
//! - `event`: classified events with market impact predictions

pub mod delta;
pub mod discourse;
pub mod event;
pub mod expectation;

pub use delta::{
    CoordinatedSilence, Delta, DeltaCluster, DeltaKind, DeltaRecord, DeltaSeverity, DeltaType,
    NetworkBreak, SentimentDecoupling, TopicAbsence, VoiceSilence, VolumeAnomaly,
};
pub use discourse::{
    Account, AccountType, ConversationThread, DiscourseSnapshot, Post, PostType, Topic,
};
pub use event::{
    DetectedEvent, EventClassification, EventRecord, EventSeverity, EventTimeline, EventType,
    MarketDirection, MarketMagnitude, MarketPrediction, MarketTiming,
};
pub use expectation::{
    BaselinePattern, ContextTrigger, DiscourseExpectation, ExpectedTopic, ExpectedVoice,
    TimeWindow, TriggerType,
};

/// Short 12-hex identifier fragment, shared by delta/cluster/event id
/// generators.
pub(crate) fn short_uuid() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}
