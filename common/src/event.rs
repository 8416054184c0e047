//! Event models: the semantic classification of detected deltas.
//!
//! Events are the output of the pipeline — something we believe is happening
//! based on the discourse gaps we observed, with a predicted market impact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::delta::{Delta, DeltaCluster};
use crate::short_uuid;

/// Types of events detectable from discourse deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Someone knows something.
    InformationLeak,
    /// Coordinated non-disclosure.
    InformationSuppression,
    /// Major change in how the entity is perceived.
    SentimentShift,
    /// Insiders losing confidence.
    ConfidenceLoss,
    /// Unusual insider behavior.
    InsiderActivity,
    /// Coordinated action.
    CoordinationDetected,
    /// Something about to be announced.
    PreAnnouncement,
    /// Problem developing.
    CrisisEmerging,
    /// Someone about to leave.
    DepartureSignal,
    /// Something unusual, unclear what.
    AnomalyDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InformationLeak => "information_leak",
            EventType::InformationSuppression => "information_suppression",
            EventType::SentimentShift => "sentiment_shift",
            EventType::ConfidenceLoss => "confidence_loss",
            EventType::InsiderActivity => "insider_activity",
            EventType::CoordinationDetected => "coordination_detected",
            EventType::PreAnnouncement => "pre_announcement",
            EventType::CrisisEmerging => "crisis_emerging",
            EventType::DepartureSignal => "departure_signal",
            EventType::AnomalyDetected => "anomaly_detected",
        }
    }

    /// Parse an external label (e.g. from an enhancement layer). Unknown
    /// labels map to `AnomalyDetected` rather than failing.
    pub fn from_label(label: &str) -> Self {
        match label {
            "information_leak" => EventType::InformationLeak,
            "information_suppression" => EventType::InformationSuppression,
            "sentiment_shift" => EventType::SentimentShift,
            "confidence_loss" => EventType::ConfidenceLoss,
            "insider_activity" => EventType::InsiderActivity,
            "coordination_detected" => EventType::CoordinationDetected,
            "pre_announcement" => EventType::PreAnnouncement,
            "crisis_emerging" => EventType::CrisisEmerging,
            "departure_signal" => EventType::DepartureSignal,
            _ => EventType::AnomalyDetected,
        }
    }
}

/// Severity of a detected event, ordered NOISE < MINOR < NOTABLE <
/// SIGNIFICANT < MAJOR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Noise,
    Minor,
    Notable,
    Significant,
    Major,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Noise => "noise",
            EventSeverity::Minor => "minor",
            EventSeverity::Notable => "notable",
            EventSeverity::Significant => "significant",
            EventSeverity::Major => "major",
        }
    }

    /// The next severity level up, saturating at MAJOR.
    pub fn escalate(&self) -> Self {
        match self {
            EventSeverity::Noise => EventSeverity::Minor,
            EventSeverity::Minor => EventSeverity::Notable,
            EventSeverity::Notable => EventSeverity::Significant,
            EventSeverity::Significant => EventSeverity::Major,
            EventSeverity::Major => EventSeverity::Major,
        }
    }
}

/// Predicted market direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketDirection {
    Up,
    Down,
    Volatile,
    Neutral,
}

impl MarketDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketDirection::Up => "up",
            MarketDirection::Down => "down",
            MarketDirection::Volatile => "volatile",
            MarketDirection::Neutral => "neutral",
        }
    }
}

/// Predicted magnitude of market impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketMagnitude {
    Negligible,
    Minor,
    Moderate,
    Major,
}

impl MarketMagnitude {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketMagnitude::Negligible => "negligible",
            MarketMagnitude::Minor => "minor",
            MarketMagnitude::Moderate => "moderate",
            MarketMagnitude::Major => "major",
        }
    }
}

/// Predicted timing of market impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketTiming {
    Immediate,
    Hours,
    Days,
}

/// Market impact prediction bundled onto an event for the validation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketPrediction {
    pub direction: Option<MarketDirection>,
    pub direction_confidence: f64,
    pub magnitude: Option<MarketMagnitude>,
    pub magnitude_confidence: f64,
    pub timing: Option<MarketTiming>,
    pub timing_confidence: f64,
}

/// Classification output: primary type plus the full probability
/// distribution, severity, and market impact prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventClassification {
    pub primary_type: EventType,
    pub primary_confidence: f64,
    pub type_probabilities: HashMap<EventType, f64>,
    pub severity: EventSeverity,
    pub severity_confidence: f64,
    pub predicted_direction: Option<MarketDirection>,
    pub direction_confidence: f64,
    pub predicted_magnitude: Option<MarketMagnitude>,
    pub magnitude_confidence: f64,
    pub predicted_timing: Option<MarketTiming>,
    pub timing_confidence: f64,
    pub reasoning: String,
}

impl EventClassification {
    /// Whether this classification suggests a tradeable signal.
    pub fn is_tradeable(&self) -> bool {
        matches!(
            self.severity,
            EventSeverity::Significant | EventSeverity::Major
        ) && self.primary_confidence > 0.7
            && self.direction_confidence > 0.6
    }

    pub fn market_prediction(&self) -> MarketPrediction {
        MarketPrediction {
            direction: self.predicted_direction,
            direction_confidence: self.direction_confidence,
            magnitude: self.predicted_magnitude,
            magnitude_confidence: self.magnitude_confidence,
            timing: self.predicted_timing,
            timing_confidence: self.timing_confidence,
        }
    }
}

/// A detected event derived from discourse analysis — the main output of the
/// pipeline, handed to the market-validation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub event_id: String,
    pub entity: String,
    pub event_type: EventType,
    pub classification: EventClassification,
    pub detected_at: DateTime<Utc>,
    pub event_window_start: DateTime<Utc>,
    pub event_window_end: DateTime<Utc>,
    /// Ids of the deltas this event was derived from.
    pub source_deltas: Vec<String>,
    /// Cluster id if the event came from a cluster.
    pub source_cluster: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: EventSeverity,
    pub confidence: f64,
    pub market_prediction: MarketPrediction,
    pub related_tickers: Vec<String>,
}

impl DetectedEvent {
    pub fn generate_id() -> String {
        format!("event_{}", short_uuid())
    }

    /// Create an event from a single delta.
    pub fn from_delta(delta: &Delta, classification: EventClassification, entity: &str) -> Self {
        Self {
            event_id: Self::generate_id(),
            entity: entity.to_string(),
            event_type: classification.primary_type,
            detected_at: Utc::now(),
            event_window_start: delta.window_start,
            event_window_end: delta.window_end,
            source_deltas: vec![delta.delta_id.clone()],
            source_cluster: None,
            title: String::new(),
            description: delta.description(),
            severity: classification.severity,
            confidence: classification.primary_confidence.clamp(0.0, 1.0),
            market_prediction: classification.market_prediction(),
            related_tickers: Vec::new(),
            classification,
        }
    }

    /// Create an event from a delta cluster. Cluster-derived confidence is
    /// scaled by the cluster's reinforcement score.
    pub fn from_cluster(cluster: &DeltaCluster, classification: EventClassification) -> Self {
        let now = Utc::now();
        let confidence =
            (classification.primary_confidence * cluster.reinforcement_score).clamp(0.0, 1.0);
        Self {
            event_id: Self::generate_id(),
            entity: cluster.entity.clone(),
            event_type: classification.primary_type,
            detected_at: now,
            event_window_start: cluster.first_delta_time.unwrap_or(now),
            event_window_end: cluster.last_delta_time.unwrap_or(now),
            source_deltas: cluster.delta_ids(),
            source_cluster: Some(cluster.cluster_id.clone()),
            title: String::new(),
            description: cluster.summary.clone(),
            severity: classification.severity,
            confidence,
            market_prediction: classification.market_prediction(),
            related_tickers: Vec::new(),
            classification,
        }
    }

    /// Serializable row for downstream consumers.
    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            event_id: self.event_id.clone(),
            entity: self.entity.clone(),
            event_type: self.event_type.as_str().to_string(),
            detected_at: self.detected_at,
            severity: self.severity.as_str().to_string(),
            confidence: self.confidence,
            title: self.title.clone(),
            description: self.description.clone(),
            market_prediction: self.market_prediction.clone(),
            source_deltas: self.source_deltas.clone(),
            source_cluster: self.source_cluster.clone(),
        }
    }

    /// Compact form for notification channels.
    pub fn to_alert(&self) -> serde_json::Value {
        serde_json::json!({
            "event_id": self.event_id,
            "entity": self.entity,
            "type": self.event_type.as_str(),
            "severity": self.severity.as_str(),
            "confidence": format!("{:.0}%", self.confidence * 100.0),
            "title": self.title,
            "summary": self.description.chars().take(200).collect::<String>(),
            "tickers": self.related_tickers,
            "detected_at": self.detected_at.to_rfc3339(),
        })
    }
}

/// Flat serializable form of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub entity: String,
    pub event_type: String,
    pub detected_at: DateTime<Utc>,
    pub severity: String,
    pub confidence: f64,
    pub title: String,
    pub description: String,
    pub market_prediction: MarketPrediction,
    pub source_deltas: Vec<String>,
    pub source_cluster: Option<String>,
}

/// Timeline of events for one entity, for pattern analysis over time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTimeline {
    pub entity: String,
    pub events: Vec<DetectedEvent>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub events_by_type: HashMap<EventType, usize>,
    pub events_by_severity: HashMap<EventSeverity, usize>,
}

impl EventTimeline {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            ..Self::default()
        }
    }

    pub fn add_event(&mut self, event: DetectedEvent) {
        *self.events_by_type.entry(event.event_type).or_insert(0) += 1;
        *self.events_by_severity.entry(event.severity).or_insert(0) += 1;

        if self.start_time.map_or(true, |t| event.detected_at < t) {
            self.start_time = Some(event.detected_at);
        }
        if self.end_time.map_or(true, |t| event.detected_at > t) {
            self.end_time = Some(event.detected_at);
        }

        self.events.push(event);
    }

    pub fn total_events(&self) -> usize {
        self.events.len()
    }

    /// Events from the last N hours.
    pub fn recent(&self, hours: i64) -> Vec<&DetectedEvent> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        self.events
            .iter()
            .filter(|e| e.detected_at >= cutoff)
            .collect()
    }

    pub fn by_type(&self, event_type: EventType) -> Vec<&DetectedEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn high_confidence(&self, threshold: f64) -> Vec<&DetectedEvent> {
        self.events
            .iter()
            .filter(|e| e.confidence >= threshold)
            .collect()
    }
}
