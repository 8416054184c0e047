//! Context triggers: known events (earnings, launches, breaking news) that
//! temporarily modify what we expect discourse to look like.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use common::expectation::{ContextTrigger, TriggerType};

/// Where trigger information came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// Pre-scheduled events.
    Calendar,
    /// Breaking news detection.
    News,
    /// Market-derived events.
    Market,
    /// Social media-derived events.
    Social,
    /// Manually configured.
    Manual,
}

/// Definition of a trigger type and its default effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub trigger_type: TriggerType,
    pub name: String,
    pub default_volume_multiplier: f64,
    pub default_sentiment_shift: f64,
    pub default_duration_hours: f64,
    pub typical_expected_topics: Vec<String>,
    pub detection_keywords: Vec<String>,
}

/// Immutable registry of trigger definitions, injected into the
/// `TriggerManager` at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRegistry {
    definitions: Vec<TriggerDefinition>,
}

impl TriggerRegistry {
    pub fn new(definitions: Vec<TriggerDefinition>) -> Self {
        Self { definitions }
    }

    pub fn get(&self, trigger_type: TriggerType) -> Option<&TriggerDefinition> {
        self.definitions
            .iter()
            .find(|d| d.trigger_type == trigger_type)
    }

    pub fn definitions(&self) -> &[TriggerDefinition] {
        &self.definitions
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        fn def(
            trigger_type: TriggerType,
            name: &str,
            volume: f64,
            sentiment: f64,
            duration_hours: f64,
            topics: &[&str],
            keywords: &[&str],
        ) -> TriggerDefinition {
            TriggerDefinition {
                trigger_type,
                name: name.to_string(),
                default_volume_multiplier: volume,
                default_sentiment_shift: sentiment,
                default_duration_hours: duration_hours,
                typical_expected_topics: topics.iter().map(|s| s.to_string()).collect(),
                detection_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            }
        }

        Self::new(vec![
            def(
                TriggerType::EarningsRelease,
                "Earnings Release",
                5.0,
                0.0,
                48.0,
                &["earnings", "revenue", "guidance", "eps"],
                &["earnings", "quarterly results", "q1", "q2", "q3", "q4"],
            ),
            def(
                TriggerType::ProductLaunch,
                "Product Launch",
                3.0,
                0.0,
                72.0,
                &["launch", "announcement", "new product"],
                &["launch", "announcing", "introducing", "unveil"],
            ),
            def(
                TriggerType::ExecutiveChange,
                "Executive Change",
                4.0,
                // Usually initially negative.
                -0.1,
                168.0,
                &["ceo", "cfo", "departure", "appointment"],
                &["steps down", "appointed", "resignation", "new ceo"],
            ),
            def(
                TriggerType::RegulatoryFiling,
                "Regulatory Filing",
                2.0,
                0.0,
                24.0,
                &["sec", "filing", "disclosure"],
                &["8-k", "10-k", "10-q", "sec filing", "form 4"],
            ),
            def(
                TriggerType::NewsBreaking,
                "Breaking News",
                10.0,
                0.0,
                12.0,
                &[],
                &["breaking", "just in", "developing"],
            ),
            def(TriggerType::MarketOpen, "Market Open", 1.5, 0.0, 1.0, &[], &[]),
            def(TriggerType::MarketClose, "Market Close", 1.3, 0.0, 1.0, &[], &[]),
        ])
    }
}

/// One trigger's line in an active-trigger summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSummary {
    pub trigger_type: TriggerType,
    pub name: String,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Combined effect of all triggers active for an entity: volume multipliers
/// compose multiplicatively, sentiment shifts additively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTriggerSummary {
    pub entity: String,
    pub active_count: usize,
    pub triggers: Vec<TriggerSummary>,
    pub combined_volume_multiplier: f64,
    pub combined_sentiment_shift: f64,
}

type TriggerCallback = Box<dyn Fn(&ContextTrigger) + Send + Sync>;

/// Manages context triggers: stores active and scheduled triggers, detects
/// them from text, and answers which are active for an entity at a time.
pub struct TriggerManager {
    registry: TriggerRegistry,
    active_triggers: HashMap<String, Vec<ContextTrigger>>,
    scheduled_triggers: Vec<ContextTrigger>,
    on_trigger_detected: Option<TriggerCallback>,
}

impl TriggerManager {
    pub fn new(registry: TriggerRegistry) -> Self {
        Self {
            registry,
            active_triggers: HashMap::new(),
            scheduled_triggers: Vec::new(),
            on_trigger_detected: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TriggerRegistry::default())
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    /// Callback fired whenever a trigger is detected from text.
    pub fn set_on_trigger_detected(&mut self, callback: TriggerCallback) {
        self.on_trigger_detected = Some(callback);
    }

    /// Add a trigger, routing it to the scheduled list if its start time is
    /// in the future and the active set otherwise.
    pub fn add_trigger(&mut self, trigger: ContextTrigger) {
        let now = Utc::now();

        if trigger.start_time.map_or(false, |start| start > now) {
            info!(entity = %trigger.entity, name = %trigger.name, "scheduled trigger");
            self.scheduled_triggers.push(trigger);
        } else {
            info!(entity = %trigger.entity, name = %trigger.name, "activated trigger");
            self.active_triggers
                .entry(trigger.entity.clone())
                .or_default()
                .push(trigger);
        }
    }

    /// All triggers active for an entity at `at_time`. Promotes scheduled
    /// triggers whose start time has passed and drops expired ones.
    pub fn get_active_triggers(&mut self, entity: &str, at_time: DateTime<Utc>) -> Vec<ContextTrigger> {
        self.activate_scheduled(at_time);

        let active: Vec<ContextTrigger> = self
            .active_triggers
            .get(entity)
            .map(|triggers| {
                triggers
                    .iter()
                    .filter(|t| t.is_active(at_time))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        self.cleanup_expired(entity, at_time);

        active
    }

    fn activate_scheduled(&mut self, now: DateTime<Utc>) {
        let (due, still_scheduled): (Vec<_>, Vec<_>) = self
            .scheduled_triggers
            .drain(..)
            .partition(|t| t.start_time.map_or(true, |start| start <= now));

        self.scheduled_triggers = still_scheduled;

        for trigger in due {
            info!(entity = %trigger.entity, name = %trigger.name, "activated trigger");
            self.active_triggers
                .entry(trigger.entity.clone())
                .or_default()
                .push(trigger);
        }
    }

    fn cleanup_expired(&mut self, entity: &str, now: DateTime<Utc>) {
        if let Some(triggers) = self.active_triggers.get_mut(entity) {
            triggers.retain(|t| t.is_active(now));
        }
    }

    /// Keyword-match text against the registry. Returns the first matching
    /// trigger definition instantiated for the entity, or None.
    pub fn detect_trigger_from_text(&self, text: &str, entity: &str) -> Option<ContextTrigger> {
        let text_lower = text.to_lowercase();

        for definition in self.registry.definitions() {
            for keyword in &definition.detection_keywords {
                if text_lower.contains(keyword.as_str()) {
                    let trigger = self.trigger_from_detection(definition, entity, text);

                    if let Some(callback) = &self.on_trigger_detected {
                        callback(&trigger);
                    }

                    return Some(trigger);
                }
            }
        }

        None
    }

    fn trigger_from_detection(
        &self,
        definition: &TriggerDefinition,
        entity: &str,
        source_text: &str,
    ) -> ContextTrigger {
        let now = Utc::now();
        let excerpt: String = source_text.chars().take(100).collect();

        ContextTrigger {
            trigger_id: format!("trigger_{}_{}", entity, now.timestamp()),
            trigger_type: definition.trigger_type,
            entity: entity.to_string(),
            name: definition.name.clone(),
            description: format!("Detected from: {}...", excerpt),
            start_time: Some(now),
            end_time: Some(now + Duration::seconds((definition.default_duration_hours * 3600.0) as i64)),
            volume_multiplier: definition.default_volume_multiplier,
            sentiment_shift: definition.default_sentiment_shift,
            expected_new_topics: definition.typical_expected_topics.clone(),
            expected_new_voices: Vec::new(),
            required_voices: Vec::new(),
            confidence: 0.8,
        }
    }

    /// Pre-scheduled earnings trigger: active from 2 hours before the
    /// release to 48 hours after.
    pub fn create_earnings_trigger(
        &self,
        entity: &str,
        release_time: DateTime<Utc>,
    ) -> ContextTrigger {
        let definition = self
            .registry
            .get(TriggerType::EarningsRelease)
            .cloned()
            .unwrap_or_else(|| TriggerDefinition {
                trigger_type: TriggerType::EarningsRelease,
                name: "Earnings Release".to_string(),
                default_volume_multiplier: 5.0,
                default_sentiment_shift: 0.0,
                default_duration_hours: 48.0,
                typical_expected_topics: Vec::new(),
                detection_keywords: Vec::new(),
            });

        ContextTrigger {
            trigger_id: format!("earnings_{}_{}", entity, release_time.format("%Y-%m-%d")),
            trigger_type: TriggerType::EarningsRelease,
            entity: entity.to_string(),
            name: format!("{} Earnings Release", entity),
            description: format!("Scheduled earnings release at {}", release_time),
            start_time: Some(release_time - Duration::hours(2)),
            end_time: Some(release_time + Duration::hours(48)),
            volume_multiplier: definition.default_volume_multiplier,
            sentiment_shift: definition.default_sentiment_shift,
            expected_new_topics: vec![
                "earnings".to_string(),
                "revenue".to_string(),
                "eps".to_string(),
                "guidance".to_string(),
                "outlook".to_string(),
            ],
            expected_new_voices: Vec::new(),
            required_voices: Vec::new(),
            confidence: 0.8,
        }
    }

    /// Triggers scheduled to start within the next `hours_ahead` hours.
    pub fn get_upcoming_triggers(&self, entity: &str, hours_ahead: i64) -> Vec<&ContextTrigger> {
        let cutoff = Utc::now() + Duration::hours(hours_ahead);

        self.scheduled_triggers
            .iter()
            .filter(|t| t.entity == entity && t.start_time.map_or(false, |start| start <= cutoff))
            .collect()
    }

    /// Combined effect of all triggers active for an entity right now.
    pub fn summarize_active_triggers(&mut self, entity: &str) -> ActiveTriggerSummary {
        let triggers = self.get_active_triggers(entity, Utc::now());

        let mut combined_volume = 1.0;
        let mut combined_sentiment = 0.0;
        let mut summaries = Vec::new();

        for trigger in &triggers {
            combined_volume *= trigger.volume_multiplier;
            combined_sentiment += trigger.sentiment_shift;
            summaries.push(TriggerSummary {
                trigger_type: trigger.trigger_type,
                name: trigger.name.clone(),
                ends_at: trigger.end_time,
            });
        }

        ActiveTriggerSummary {
            entity: entity.to_string(),
            active_count: triggers.len(),
            triggers: summaries,
            combined_volume_multiplier: combined_volume,
            combined_sentiment_shift: combined_sentiment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(entity: &str, start_offset_hours: i64, duration_hours: i64, volume: f64) -> ContextTrigger {
        let start = Utc::now() + Duration::hours(start_offset_hours);
        ContextTrigger {
            trigger_id: format!("t_{}", start_offset_hours),
            trigger_type: TriggerType::Custom,
            entity: entity.to_string(),
            name: "Test".to_string(),
            description: String::new(),
            start_time: Some(start),
            end_time: Some(start + Duration::hours(duration_hours)),
            volume_multiplier: volume,
            sentiment_shift: 0.1,
            expected_new_topics: Vec::new(),
            expected_new_voices: Vec::new(),
            required_voices: Vec::new(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_future_trigger_is_scheduled_then_promoted() {
        let mut manager = TriggerManager::with_defaults();
        manager.add_trigger(trigger("ACME", 2, 24, 2.0));

        // Not yet active.
        assert!(manager.get_active_triggers("ACME", Utc::now()).is_empty());

        // After its start time it is promoted into the active set.
        let later = Utc::now() + Duration::hours(3);
        let active = manager.get_active_triggers("ACME", later);
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_expired_triggers_are_dropped() {
        let mut manager = TriggerManager::with_defaults();
        manager.add_trigger(trigger("ACME", -48, 24, 2.0));

        assert!(manager.get_active_triggers("ACME", Utc::now()).is_empty());
    }

    #[test]
    fn test_detect_earnings_trigger_from_text() {
        let manager = TriggerManager::with_defaults();

        let detected = manager
            .detect_trigger_from_text("ACME reports Q3 earnings after the bell", "ACME")
            .unwrap();

        assert_eq!(detected.trigger_type, TriggerType::EarningsRelease);
        assert_eq!(detected.volume_multiplier, 5.0);
        assert!(detected
            .expected_new_topics
            .contains(&"earnings".to_string()));

        assert!(manager
            .detect_trigger_from_text("nothing interesting here", "ACME")
            .is_none());
    }

    #[test]
    fn test_summary_composes_multiplicatively_and_additively() {
        let mut manager = TriggerManager::with_defaults();
        manager.add_trigger(trigger("ACME", -1, 24, 2.0));
        manager.add_trigger(trigger("ACME", -1, 24, 3.0));

        let summary = manager.summarize_active_triggers("ACME");
        assert_eq!(summary.active_count, 2);
        assert!((summary.combined_volume_multiplier - 6.0).abs() < 1e-9);
        assert!((summary.combined_sentiment_shift - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_earnings_trigger_window() {
        let manager = TriggerManager::with_defaults();
        let release = Utc::now() + Duration::hours(24);
        let trigger = manager.create_earnings_trigger("ACME", release);

        assert_eq!(trigger.start_time, Some(release - Duration::hours(2)));
        assert_eq!(trigger.end_time, Some(release + Duration::hours(48)));
        assert_eq!(trigger.volume_multiplier, 5.0);
    }

    #[test]
    fn test_upcoming_triggers_respect_cutoff() {
        let mut manager = TriggerManager::with_defaults();
        manager.add_trigger(trigger("ACME", 6, 24, 2.0));
        manager.add_trigger(trigger("ACME", 72, 24, 2.0));

        let upcoming = manager.get_upcoming_triggers("ACME", 24);
        assert_eq!(upcoming.len(), 1);
    }
}
