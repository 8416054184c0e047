//! Voice silence analyzer: detects when expected voices aren't
//! participating.
//!
//! Key voices going quiet is often a leading indicator of events.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use common::delta::{Delta, DeltaKind, VoiceSilence};
use common::discourse::DiscourseSnapshot;
use common::expectation::DiscourseExpectation;

use super::DeltaAnalyzer;

pub struct VoiceSilenceAnalyzer {
    /// Hours of silence before flagging.
    threshold_hours: f64,
    /// account id -> last time the account was seen active. Owned cache;
    /// only grows here, pruned through the detector's cleanup.
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl VoiceSilenceAnalyzer {
    pub fn new(threshold_hours: f64) -> Self {
        Self {
            threshold_hours,
            last_seen: HashMap::new(),
        }
    }

    /// Manually set the last seen time for an account.
    pub fn update_last_seen(&mut self, account_id: &str, timestamp: DateTime<Utc>) {
        self.last_seen.insert(account_id.to_string(), timestamp);
    }

    /// How long an account has been silent as of `now`, if it has ever been
    /// seen.
    pub fn silence_duration_hours(&self, account_id: &str, now: DateTime<Utc>) -> Option<f64> {
        self.last_seen
            .get(account_id)
            .map(|last| (now - *last).num_seconds() as f64 / 3600.0)
    }

    /// Drop last-seen entries older than `cutoff`. Called from the
    /// detector's cleanup pass.
    pub fn prune_last_seen(&mut self, cutoff: DateTime<Utc>) {
        self.last_seen.retain(|_, seen| *seen >= cutoff);
    }

    pub fn tracked_accounts(&self) -> usize {
        self.last_seen.len()
    }
}

impl Default for VoiceSilenceAnalyzer {
    fn default() -> Self {
        Self::new(24.0)
    }
}

impl DeltaAnalyzer for VoiceSilenceAnalyzer {
    fn name(&self) -> &'static str {
        "voice_silence"
    }

    fn analyze(
        &mut self,
        snapshot: &DiscourseSnapshot,
        expectation: &DiscourseExpectation,
    ) -> Vec<Delta> {
        let mut deltas = Vec::new();
        let now = snapshot.window_end;

        let active_ids: HashSet<String> = snapshot.active_account_ids().into_iter().collect();

        for account_id in &active_ids {
            self.last_seen.insert(account_id.clone(), now);
        }

        for expected_voice in &expectation.expected_voices {
            if active_ids.contains(&expected_voice.account_id) {
                continue;
            }

            if !expected_voice.expected_to_be_active(now) {
                continue;
            }

            let last_post = self.last_seen.get(&expected_voice.account_id).copied();
            let silence_hours = match last_post {
                Some(last) => (now - last).num_seconds() as f64 / 3600.0,
                // Never seen: assume very long silence.
                None => self.threshold_hours * 2.0,
            };

            if silence_hours < self.threshold_hours {
                continue;
            }

            let window_hours = (snapshot.window_end - snapshot.window_start).num_seconds() as f64
                / 3600.0;
            let expected_posts = expected_voice.expected_posts_per_day * window_hours / 24.0;

            // Longer silences and key voices raise confidence.
            let silence_factor = (silence_hours / (self.threshold_hours * 2.0)).min(1.0);
            let key_voice_factor = if expected_voice.is_key_voice { 0.3 } else { 0.0 };
            let confidence = (0.4 + silence_factor * 0.3 + key_voice_factor).min(0.95);

            deltas.push(Delta::new(
                &snapshot.entity,
                snapshot.window_start,
                snapshot.window_end,
                confidence,
                DeltaKind::VoiceSilence(VoiceSilence {
                    silent_account_id: expected_voice.account_id.clone(),
                    silent_username: expected_voice.username.clone(),
                    silence_hours,
                    expected_posts,
                    observed_posts: 0,
                    last_post_time: last_post,
                    typical_post_frequency: expected_voice.expected_posts_per_day,
                    is_key_voice: expected_voice.is_key_voice,
                    influence_score: expected_voice.silence_severity,
                }),
            ));
        }

        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::delta::DeltaType;
    use common::discourse::{Account, AccountType};
    use common::expectation::{BaselinePattern, ExpectedVoice, TimeWindow};

    fn voice(account_id: &str, key: bool) -> ExpectedVoice {
        ExpectedVoice {
            account_id: account_id.to_string(),
            username: "testceo".to_string(),
            expected_posts_per_day: 5.0,
            post_stddev: 2.0,
            active_hours_utc: Vec::new(),
            active_days: Vec::new(),
            silence_severity: 0.9,
            is_key_voice: key,
            typical_responders: Vec::new(),
        }
    }

    fn expectation(voices: Vec<ExpectedVoice>, window_end: DateTime<Utc>) -> DiscourseExpectation {
        DiscourseExpectation {
            expectation_id: "exp".to_string(),
            entity: "ACME".to_string(),
            window_start: window_end - chrono::Duration::hours(1),
            window_end,
            baseline: BaselinePattern::empty("ACME", TimeWindow::Hour),
            active_triggers: Vec::new(),
            expected_post_count: 100.0,
            post_count_range: (60.0, 140.0),
            expected_topics: Vec::new(),
            required_topics: Vec::new(),
            expected_voices: voices,
            required_voices: Vec::new(),
            expected_sentiment: 0.2,
            sentiment_range: (-0.4, 0.8),
            confidence: 0.8,
        }
    }

    fn snapshot(window_end: DateTime<Utc>, active: Vec<Account>) -> DiscourseSnapshot {
        DiscourseSnapshot {
            snapshot_id: "snap".to_string(),
            entity: "ACME".to_string(),
            window_start: window_end - chrono::Duration::hours(1),
            window_end,
            posts: Vec::new(),
            threads: Vec::new(),
            total_posts: 50,
            unique_authors: 10,
            total_engagement: 0,
            topic_counts: HashMap::new(),
            topic_sentiments: HashMap::new(),
            active_accounts: active,
            avg_sentiment: 0.2,
            dominant_tones: Vec::new(),
        }
    }

    #[test]
    fn test_key_voice_silent_thirty_hours() {
        let mut analyzer = VoiceSilenceAnalyzer::new(24.0);
        let now = Utc::now();
        analyzer.update_last_seen("x:123", now - chrono::Duration::hours(30));

        let deltas = analyzer.analyze(&snapshot(now, Vec::new()), &expectation(vec![voice("x:123", true)], now));

        assert_eq!(deltas.len(), 1);
        let delta = &deltas[0];
        assert_eq!(delta.delta_type(), DeltaType::VoiceSilence);
        // 0.4 + 0.3 * (30 / 48) + 0.3 = 0.8875.
        assert!((delta.confidence - 0.8875).abs() < 1e-6);
    }

    #[test]
    fn test_active_voice_is_not_flagged() {
        let mut analyzer = VoiceSilenceAnalyzer::new(24.0);
        let now = Utc::now();

        let active = Account {
            platform_id: "123".to_string(),
            username: "testceo".to_string(),
            account_type: AccountType::Executive,
            ..Account::default()
        };

        let deltas = analyzer.analyze(
            &snapshot(now, vec![active]),
            &expectation(vec![voice("x:123", true)], now),
        );
        assert!(deltas.is_empty());
        assert_eq!(analyzer.tracked_accounts(), 1);
    }

    #[test]
    fn test_never_seen_voice_assumes_double_threshold() {
        let mut analyzer = VoiceSilenceAnalyzer::new(24.0);
        let now = Utc::now();

        let deltas = analyzer.analyze(&snapshot(now, Vec::new()), &expectation(vec![voice("x:999", false)], now));

        assert_eq!(deltas.len(), 1);
        match &deltas[0].kind {
            DeltaKind::VoiceSilence(payload) => {
                assert!((payload.silence_hours - 48.0).abs() < 1e-9);
                assert!(payload.last_post_time.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        // 0.4 + 0.3 * 1.0, no key voice boost.
        assert!((deltas[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_short_silence_is_not_flagged() {
        let mut analyzer = VoiceSilenceAnalyzer::new(24.0);
        let now = Utc::now();
        analyzer.update_last_seen("x:123", now - chrono::Duration::hours(10));

        let deltas = analyzer.analyze(&snapshot(now, Vec::new()), &expectation(vec![voice("x:123", true)], now));
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_prune_last_seen() {
        let mut analyzer = VoiceSilenceAnalyzer::new(24.0);
        let now = Utc::now();
        analyzer.update_last_seen("x:1", now - chrono::Duration::hours(100));
        analyzer.update_last_seen("x:2", now);

        analyzer.prune_last_seen(now - chrono::Duration::hours(48));
        assert_eq!(analyzer.tracked_accounts(), 1);
        assert!(analyzer.silence_duration_hours("x:1", now).is_none());
        assert!(analyzer.silence_duration_hours("x:2", now).is_some());
    }
}
