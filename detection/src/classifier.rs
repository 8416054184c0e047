//! Event classifier: maps delta type signatures to semantic event types
//! with severity and market impact predictions.
//!
//! Classification is table-driven: a literal mapping from canonical sorted
//! delta-type sets to ranked (event type, probability) rows, with a fixed
//! low-confidence anomaly fallback for unrecognized signatures.

use std::collections::HashMap;
use tracing::debug;

use common::delta::{Delta, DeltaCluster, DeltaSeverity, DeltaType};
use common::event::{
    DetectedEvent, EventClassification, EventSeverity, EventType, MarketDirection,
    MarketMagnitude,
};

/// One row of the mapping table: a delta-type signature and its ranked
/// event outcomes.
struct MappingRow {
    types: Vec<DeltaType>,
    outcomes: Vec<(EventType, f64)>,
}

/// Classifies deltas and delta clusters into events.
pub struct EventClassifier {
    rows: Vec<MappingRow>,
    /// Canonical sorted key -> row index, for exact matches.
    index: HashMap<String, usize>,
}

impl EventClassifier {
    pub fn new() -> Self {
        let rows = vec![
            // Single delta type signatures.
            MappingRow {
                types: vec![DeltaType::TopicAbsence],
                outcomes: vec![
                    (EventType::InformationSuppression, 0.6),
                    (EventType::PreAnnouncement, 0.3),
                ],
            },
            MappingRow {
                types: vec![DeltaType::VoiceSilence],
                outcomes: vec![
                    (EventType::InsiderActivity, 0.5),
                    (EventType::DepartureSignal, 0.3),
                ],
            },
            MappingRow {
                types: vec![DeltaType::SentimentDecoupling],
                outcomes: vec![
                    (EventType::ConfidenceLoss, 0.5),
                    (EventType::SentimentShift, 0.4),
                ],
            },
            MappingRow {
                types: vec![DeltaType::VolumeCollapse],
                outcomes: vec![
                    (EventType::InformationSuppression, 0.4),
                    (EventType::PreAnnouncement, 0.4),
                ],
            },
            MappingRow {
                types: vec![DeltaType::CoordinatedSilence],
                outcomes: vec![
                    (EventType::CoordinationDetected, 0.8),
                    (EventType::InformationSuppression, 0.6),
                ],
            },
            // Multi-delta signatures (more specific).
            MappingRow {
                types: vec![DeltaType::TopicAbsence, DeltaType::VoiceSilence],
                outcomes: vec![
                    (EventType::InformationSuppression, 0.8),
                    (EventType::CrisisEmerging, 0.5),
                ],
            },
            MappingRow {
                types: vec![DeltaType::SentimentDecoupling, DeltaType::VolumeSpike],
                outcomes: vec![
                    (EventType::CrisisEmerging, 0.7),
                    (EventType::SentimentShift, 0.5),
                ],
            },
            MappingRow {
                types: vec![DeltaType::SentimentDecoupling, DeltaType::VoiceSilence],
                outcomes: vec![
                    (EventType::InsiderActivity, 0.7),
                    (EventType::ConfidenceLoss, 0.6),
                ],
            },
        ];

        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (Self::canonical_key(&row.types), i))
            .collect();

        Self { rows, index }
    }

    /// Canonical signature: distinct type names, sorted, joined with `+`.
    fn canonical_key(types: &[DeltaType]) -> String {
        let mut names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.join("+")
    }

    /// Classify a single delta.
    pub fn classify_delta(&self, delta: &Delta) -> EventClassification {
        self.classify_types(&[delta.delta_type()], std::slice::from_ref(delta))
    }

    /// Classify a cluster of deltas. Clusters often produce higher
    /// confidence classifications.
    pub fn classify_cluster(&self, cluster: &DeltaCluster) -> EventClassification {
        self.classify_types(&cluster.delta_types, &cluster.deltas)
    }

    fn classify_types(&self, delta_types: &[DeltaType], deltas: &[Delta]) -> EventClassification {
        if deltas.is_empty() {
            return Self::fallback_classification();
        }

        let key = Self::canonical_key(delta_types);

        // Exact signature match first, then the first table row fully
        // contained in the signature, else the anomaly fallback.
        let row = match self.index.get(&key) {
            Some(&i) => Some(&self.rows[i]),
            None => self
                .rows
                .iter()
                .find(|row| row.types.iter().all(|t| delta_types.contains(t))),
        };

        let row = match row {
            Some(row) => row,
            None => {
                debug!(signature = %key, "no mapping for delta signature");
                return Self::fallback_classification();
            }
        };

        let type_probabilities: HashMap<EventType, f64> = row.outcomes.iter().copied().collect();
        let (primary_type, base_confidence) = row.outcomes[0];

        // Strong member deltas raise classification confidence.
        let avg_confidence =
            deltas.iter().map(|d| d.confidence).sum::<f64>() / deltas.len() as f64;
        let primary_confidence = (base_confidence * (0.5 + avg_confidence * 0.5)).min(0.95);

        let severity = Self::determine_severity(deltas);
        let (predicted_direction, direction_confidence) = Self::predict_direction(primary_type);

        EventClassification {
            primary_type,
            primary_confidence,
            type_probabilities,
            severity,
            severity_confidence: avg_confidence,
            predicted_direction,
            direction_confidence,
            predicted_magnitude: Some(Self::predict_magnitude(severity)),
            magnitude_confidence: 0.5,
            predicted_timing: None,
            timing_confidence: 0.0,
            reasoning: Self::reasoning(primary_type, deltas),
        }
    }

    /// Unrecognized signatures (and empty evidence) always classify as an
    /// anomaly at fixed low confidence.
    fn fallback_classification() -> EventClassification {
        EventClassification {
            primary_type: EventType::AnomalyDetected,
            primary_confidence: 0.3,
            type_probabilities: HashMap::from([(EventType::AnomalyDetected, 0.3)]),
            severity: EventSeverity::Minor,
            severity_confidence: 0.3,
            predicted_direction: None,
            direction_confidence: 0.0,
            predicted_magnitude: None,
            magnitude_confidence: 0.0,
            predicted_timing: None,
            timing_confidence: 0.0,
            reasoning: "Unrecognized delta pattern".to_string(),
        }
    }

    /// Max member severity mapped up one notch, escalated once more when
    /// three or more deltas contributed.
    fn determine_severity(deltas: &[Delta]) -> EventSeverity {
        let max_delta_severity = deltas
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or(DeltaSeverity::Low);

        let base = match max_delta_severity {
            DeltaSeverity::Low => EventSeverity::Minor,
            DeltaSeverity::Medium => EventSeverity::Notable,
            DeltaSeverity::High => EventSeverity::Significant,
            DeltaSeverity::Critical => EventSeverity::Major,
        };

        if deltas.len() >= 3 {
            base.escalate()
        } else {
            base
        }
    }

    fn predict_direction(event_type: EventType) -> (Option<MarketDirection>, f64) {
        match event_type {
            EventType::InformationSuppression => (Some(MarketDirection::Down), 0.6),
            EventType::ConfidenceLoss => (Some(MarketDirection::Down), 0.7),
            EventType::CrisisEmerging => (Some(MarketDirection::Down), 0.8),
            EventType::DepartureSignal => (Some(MarketDirection::Down), 0.5),
            EventType::InsiderActivity => (Some(MarketDirection::Volatile), 0.6),
            EventType::CoordinationDetected => (Some(MarketDirection::Volatile), 0.5),
            EventType::SentimentShift => (Some(MarketDirection::Volatile), 0.5),
            EventType::PreAnnouncement => (Some(MarketDirection::Volatile), 0.6),
            EventType::AnomalyDetected | EventType::InformationLeak => (None, 0.3),
        }
    }

    fn predict_magnitude(severity: EventSeverity) -> MarketMagnitude {
        match severity {
            EventSeverity::Noise => MarketMagnitude::Negligible,
            EventSeverity::Minor | EventSeverity::Notable => MarketMagnitude::Minor,
            EventSeverity::Significant => MarketMagnitude::Moderate,
            EventSeverity::Major => MarketMagnitude::Major,
        }
    }

    fn reasoning(event_type: EventType, deltas: &[Delta]) -> String {
        let summary = deltas
            .iter()
            .take(3)
            .map(|d| d.description())
            .collect::<Vec<_>>()
            .join("; ");

        match event_type {
            EventType::InformationSuppression => format!(
                "Detected potential information suppression: {}. This pattern often precedes negative news announcements.",
                summary
            ),
            EventType::ConfidenceLoss => format!(
                "Detected signals of confidence loss: {}. Sentiment and/or voice patterns suggest insiders may be concerned.",
                summary
            ),
            EventType::InsiderActivity => format!(
                "Detected unusual insider behavior: {}. Key voices are behaving differently than expected.",
                summary
            ),
            EventType::CrisisEmerging => format!(
                "Detected early crisis signals: {}. Multiple anomalies suggest a developing situation.",
                summary
            ),
            EventType::PreAnnouncement => format!(
                "Detected pre-announcement quiet: {}. Volume and topic patterns suggest announcement may be imminent.",
                summary
            ),
            _ => format!("Anomaly detected: {}", summary),
        }
    }

    fn title(event_type: EventType, entity: &str) -> String {
        match event_type {
            EventType::InformationSuppression => {
                format!("Potential information suppression for {}", entity)
            }
            EventType::ConfidenceLoss => format!("Confidence signals weakening for {}", entity),
            EventType::InsiderActivity => {
                format!("Unusual insider behavior detected for {}", entity)
            }
            EventType::CrisisEmerging => format!("Early crisis signals for {}", entity),
            EventType::PreAnnouncement => {
                format!("Pre-announcement quiet detected for {}", entity)
            }
            EventType::SentimentShift => format!("Sentiment shift detected for {}", entity),
            EventType::CoordinationDetected => {
                format!("Coordinated activity detected for {}", entity)
            }
            EventType::DepartureSignal => format!("Potential departure signal for {}", entity),
            EventType::AnomalyDetected => format!("Anomaly detected for {}", entity),
            EventType::InformationLeak => format!("Potential information leak for {}", entity),
        }
    }

    /// Create a `DetectedEvent` from deltas. Never fails: a single delta
    /// classifies directly, several deltas without a cluster get a synthetic
    /// one, and no deltas at all produce the anomaly fallback.
    pub fn create_event(
        &self,
        entity: &str,
        deltas: &[Delta],
        cluster: Option<&DeltaCluster>,
    ) -> DetectedEvent {
        let mut event = if let Some(cluster) = cluster {
            DetectedEvent::from_cluster(cluster, self.classify_cluster(cluster))
        } else if deltas.len() == 1 {
            DetectedEvent::from_delta(&deltas[0], self.classify_delta(&deltas[0]), entity)
        } else if deltas.is_empty() {
            let classification = Self::fallback_classification();
            let mut synthetic = DeltaCluster::new(entity);
            synthetic.reinforcement_score = 1.0;
            DetectedEvent::from_cluster(&synthetic, classification)
        } else {
            let mut synthetic = DeltaCluster::new(entity);
            for delta in deltas {
                synthetic.add_delta(delta.clone());
            }
            DetectedEvent::from_cluster(&synthetic, self.classify_cluster(&synthetic))
        };

        event.title = Self::title(event.event_type, entity);
        event
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}
