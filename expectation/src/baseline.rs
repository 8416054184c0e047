//! Baseline builder: turns historical discourse snapshots into the
//! statistical norms that expectations are derived from.
//!
//! Analyzes volume patterns (hourly, daily), topic patterns, voice
//! patterns, sentiment ranges, and who responds to whom.

use chrono::{Datelike, Timelike, Utc};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::{info, warn};

use common::discourse::{Account, DiscourseSnapshot};
use common::expectation::{BaselinePattern, ExpectedTopic, ExpectedVoice, TimeWindow};

/// Builds baseline patterns from historical discourse data.
#[derive(Debug, Clone)]
pub struct BaselineBuilder {
    /// Minimum snapshots a topic must appear in to get an expectation.
    /// Voices use half this threshold.
    min_samples: usize,
}

impl Default for BaselineBuilder {
    fn default() -> Self {
        Self { min_samples: 10 }
    }
}

impl BaselineBuilder {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    /// Build a baseline pattern from historical snapshots. An empty history
    /// yields an all-zero baseline with no samples rather than an error.
    pub fn build_baseline(
        &self,
        entity: &str,
        snapshots: &[DiscourseSnapshot],
        time_window: TimeWindow,
    ) -> BaselinePattern {
        if snapshots.is_empty() {
            warn!(entity, "no snapshots provided, returning empty baseline");
            return BaselinePattern::empty(entity, time_window);
        }

        info!(entity, snapshots = snapshots.len(), "building baseline");

        let mut ordered: Vec<&DiscourseSnapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| s.window_start);

        let hourly_volume_pattern = self.hourly_pattern(&ordered);
        let daily_volume_pattern = self.daily_pattern(&ordered);
        let (avg_posts_per_window, post_stddev) = self.volume_stats(&ordered);
        let typical_topics = self.topic_expectations(&ordered);
        let voice_response_patterns = self.response_patterns(&ordered);
        let typical_voices = self.voice_expectations(&ordered, &voice_response_patterns);
        let (avg_sentiment, sentiment_stddev) = self.sentiment_stats(&ordered);

        BaselinePattern {
            entity: entity.to_string(),
            time_window,
            avg_posts_per_window,
            post_stddev,
            hourly_volume_pattern,
            daily_volume_pattern,
            avg_sentiment,
            sentiment_stddev,
            typical_topics,
            typical_voices,
            voice_response_patterns,
            sample_start: Some(ordered[0].window_start),
            sample_end: Some(ordered[ordered.len() - 1].window_end),
            sample_size: ordered.len(),
            last_updated: Some(Utc::now()),
        }
    }

    /// Normalized volume by hour of day (each slot relative to the busiest
    /// hour).
    fn hourly_pattern(&self, snapshots: &[&DiscourseSnapshot]) -> Vec<f64> {
        let mut per_hour: Vec<Vec<f64>> = vec![Vec::new(); 24];
        for snap in snapshots {
            per_hour[snap.window_start.hour() as usize].push(snap.total_posts as f64);
        }

        let mut averages: Vec<f64> = per_hour
            .iter()
            .map(|counts| {
                if counts.is_empty() {
                    0.0
                } else {
                    counts.iter().sum::<f64>() / counts.len() as f64
                }
            })
            .collect();

        let max_vol = averages.iter().cloned().fold(0.0_f64, f64::max);
        if max_vol > 0.0 {
            for v in &mut averages {
                *v /= max_vol;
            }
        }

        averages
    }

    /// Normalized volume by day of week (Mon-Sun).
    fn daily_pattern(&self, snapshots: &[&DiscourseSnapshot]) -> Vec<f64> {
        let mut per_day: Vec<Vec<f64>> = vec![Vec::new(); 7];
        for snap in snapshots {
            per_day[snap.window_start.weekday().num_days_from_monday() as usize]
                .push(snap.total_posts as f64);
        }

        let mut averages: Vec<f64> = per_day
            .iter()
            .map(|counts| {
                if counts.is_empty() {
                    0.0
                } else {
                    counts.iter().sum::<f64>() / counts.len() as f64
                }
            })
            .collect();

        let max_vol = averages.iter().cloned().fold(0.0_f64, f64::max);
        if max_vol > 0.0 {
            for v in &mut averages {
                *v /= max_vol;
            }
        }

        averages
    }

    fn volume_stats(&self, snapshots: &[&DiscourseSnapshot]) -> (f64, f64) {
        let volumes: Vec<f64> = snapshots.iter().map(|s| s.total_posts as f64).collect();
        if volumes.is_empty() {
            return (0.0, 0.0);
        }

        let avg = volumes.iter().mean();
        let std = if volumes.len() > 1 {
            volumes.iter().std_dev()
        } else {
            0.0
        };

        (avg, std)
    }

    fn topic_expectations(&self, snapshots: &[&DiscourseSnapshot]) -> Vec<ExpectedTopic> {
        let mut topic_mentions: HashMap<String, Vec<f64>> = HashMap::new();
        let mut topic_sentiments: HashMap<String, Vec<f64>> = HashMap::new();

        for snap in snapshots {
            for (topic_id, count) in &snap.topic_counts {
                topic_mentions
                    .entry(topic_id.clone())
                    .or_default()
                    .push(*count as f64);
            }
            for (topic_id, sentiment) in &snap.topic_sentiments {
                topic_sentiments
                    .entry(topic_id.clone())
                    .or_default()
                    .push(*sentiment);
            }
        }

        let mut expectations = Vec::new();
        for (topic_id, counts) in &topic_mentions {
            if counts.len() < self.min_samples {
                continue;
            }

            let avg_count = counts.iter().mean();
            let count_std = if counts.len() > 1 {
                counts.iter().std_dev()
            } else {
                0.0
            };

            let (avg_sentiment, sentiment_std) = match topic_sentiments.get(topic_id) {
                Some(sentiments) if !sentiments.is_empty() => {
                    let avg = sentiments.iter().mean();
                    let std = if sentiments.len() > 1 {
                        sentiments.iter().std_dev()
                    } else {
                        0.0
                    };
                    (avg, std)
                }
                _ => (0.0, 0.0),
            };

            // Importance from how often the topic appears and how consistent
            // its volume is.
            let frequency_score = (counts.len() as f64 / snapshots.len() as f64).min(1.0);
            let consistency_score = 1.0 - count_std / (avg_count + 1.0);
            let importance = (frequency_score + consistency_score) / 2.0;

            expectations.push(ExpectedTopic {
                topic_name: topic_id.split(':').last().unwrap_or(topic_id).to_string(),
                topic_id: topic_id.clone(),
                expected_mention_count: avg_count,
                mention_stddev: count_std,
                expected_sentiment: avg_sentiment,
                sentiment_stddev: sentiment_std,
                confidence: frequency_score,
                sample_size: counts.len(),
                absence_severity: importance,
            });
        }

        expectations.sort_by(|a, b| {
            b.absence_severity
                .partial_cmp(&a.absence_severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        expectations
    }

    fn voice_expectations(
        &self,
        snapshots: &[&DiscourseSnapshot],
        response_patterns: &HashMap<String, Vec<String>>,
    ) -> Vec<ExpectedVoice> {
        let mut voice_activity: HashMap<String, Vec<f64>> = HashMap::new();
        let mut voice_info: HashMap<String, Account> = HashMap::new();

        for snap in snapshots {
            for account in &snap.active_accounts {
                let account_id = account.account_id();
                let post_count = snap
                    .posts
                    .iter()
                    .filter(|p| p.author.account_id() == account_id)
                    .count() as f64;

                voice_activity
                    .entry(account_id.clone())
                    .or_default()
                    .push(post_count);
                voice_info.insert(account_id, account.clone());
            }
        }

        // Posts-per-window observations scale to posts/day by the average
        // window duration.
        let avg_window_hours = snapshots
            .iter()
            .map(|s| (s.window_end - s.window_start).num_seconds() as f64 / 3600.0)
            .sum::<f64>()
            / snapshots.len() as f64;
        let day_factor = if avg_window_hours > 0.0 {
            24.0 / avg_window_hours
        } else {
            24.0
        };

        let mut expectations = Vec::new();
        for (account_id, activity) in &voice_activity {
            // Voices get half the topic threshold.
            if activity.len() < self.min_samples / 2 {
                continue;
            }

            let account = match voice_info.get(account_id) {
                Some(a) => a,
                None => continue,
            };

            let avg_posts = activity.iter().mean();
            let post_std = if activity.len() > 1 {
                activity.iter().std_dev()
            } else {
                0.0
            };

            let presence_rate = activity.len() as f64 / snapshots.len() as f64;
            let weight = if account.is_high_value() { 0.8 } else { 0.3 };

            expectations.push(ExpectedVoice {
                account_id: account_id.clone(),
                username: account.username.clone(),
                expected_posts_per_day: avg_posts * day_factor,
                post_stddev: post_std,
                active_hours_utc: Vec::new(),
                active_days: Vec::new(),
                silence_severity: presence_rate * weight,
                is_key_voice: account.is_high_value(),
                typical_responders: response_patterns
                    .get(account_id)
                    .cloned()
                    .unwrap_or_default(),
            });
        }

        expectations.sort_by(|a, b| {
            b.silence_severity
                .partial_cmp(&a.silence_severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        expectations
    }

    fn sentiment_stats(&self, snapshots: &[&DiscourseSnapshot]) -> (f64, f64) {
        let sentiments: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.total_posts > 0)
            .map(|s| s.avg_sentiment)
            .collect();

        if sentiments.is_empty() {
            // Neutral with wide variance as default.
            return (0.0, 0.5);
        }

        let avg = sentiments.iter().mean();
        let std = if sentiments.len() > 1 {
            sentiments.iter().std_dev()
        } else {
            0.3
        };

        (avg, std)
    }

    /// Who typically responds to whom: author id -> responders who replied
    /// at least twice across the sample.
    fn response_patterns(&self, snapshots: &[&DiscourseSnapshot]) -> HashMap<String, Vec<String>> {
        let mut response_counts: HashMap<String, HashMap<String, u32>> = HashMap::new();

        for snap in snapshots {
            for thread in &snap.threads {
                let author_id = thread.root_post.author.account_id();
                for reply in &thread.replies {
                    let responder_id = reply.author.account_id();
                    if responder_id != author_id {
                        *response_counts
                            .entry(author_id.clone())
                            .or_default()
                            .entry(responder_id)
                            .or_insert(0) += 1;
                    }
                }
            }
        }

        let mut patterns = HashMap::new();
        for (author_id, responders) in response_counts {
            let typical: Vec<String> = responders
                .into_iter()
                .filter(|(_, count)| *count >= 2)
                .map(|(id, _)| id)
                .collect();
            if !typical.is_empty() {
                patterns.insert(author_id, typical);
            }
        }

        patterns
    }

    /// Incrementally update a baseline with new data, weighting the existing
    /// pattern by `decay` and the new data by `1 - decay`.
    pub fn update_baseline(
        &self,
        existing: &BaselinePattern,
        new_snapshots: &[DiscourseSnapshot],
        decay: f64,
    ) -> BaselinePattern {
        if new_snapshots.is_empty() {
            return existing.clone();
        }

        let fresh = self.build_baseline(&existing.entity, new_snapshots, existing.time_window);
        let blend = |old: f64, new: f64| old * decay + new * (1.0 - decay);

        let mut merged = BaselinePattern::empty(&existing.entity, existing.time_window);

        merged.avg_posts_per_window =
            blend(existing.avg_posts_per_window, fresh.avg_posts_per_window);
        merged.post_stddev = blend(existing.post_stddev, fresh.post_stddev);

        merged.hourly_volume_pattern = (0..24)
            .map(|i| {
                blend(
                    existing.hourly_volume_pattern[i],
                    fresh.hourly_volume_pattern[i],
                )
            })
            .collect();
        merged.daily_volume_pattern = (0..7)
            .map(|i| {
                blend(
                    existing.daily_volume_pattern[i],
                    fresh.daily_volume_pattern[i],
                )
            })
            .collect();

        merged.avg_sentiment = blend(existing.avg_sentiment, fresh.avg_sentiment);
        merged.sentiment_stddev = blend(existing.sentiment_stddev, fresh.sentiment_stddev);

        merged.typical_topics =
            Self::merge_topics(&existing.typical_topics, &fresh.typical_topics, decay);
        merged.typical_voices =
            Self::merge_voices(&existing.typical_voices, &fresh.typical_voices, decay);

        merged.voice_response_patterns = existing.voice_response_patterns.clone();
        if decay < 1.0 {
            for (author, responders) in &fresh.voice_response_patterns {
                merged
                    .voice_response_patterns
                    .insert(author.clone(), responders.clone());
            }
        }

        merged.sample_start = existing.sample_start.or(fresh.sample_start);
        merged.sample_end = fresh.sample_end;
        merged.sample_size = existing.sample_size + new_snapshots.len();
        merged.last_updated = Some(Utc::now());

        merged
    }

    /// Merge topic expectations by id union. Shared ids get every
    /// statistical field decay-merged; ids only in `existing` decay in
    /// place; ids only in `new` are adopted as-is.
    fn merge_topics(
        existing: &[ExpectedTopic],
        new: &[ExpectedTopic],
        decay: f64,
    ) -> Vec<ExpectedTopic> {
        let blend = |old: f64, new: f64| old * decay + new * (1.0 - decay);
        let new_map: HashMap<&str, &ExpectedTopic> =
            new.iter().map(|t| (t.topic_id.as_str(), t)).collect();

        let mut merged = Vec::new();
        for old in existing {
            match new_map.get(old.topic_id.as_str()) {
                Some(current) => merged.push(ExpectedTopic {
                    topic_id: old.topic_id.clone(),
                    topic_name: current.topic_name.clone(),
                    expected_mention_count: blend(
                        old.expected_mention_count,
                        current.expected_mention_count,
                    ),
                    mention_stddev: blend(old.mention_stddev, current.mention_stddev),
                    expected_sentiment: blend(old.expected_sentiment, current.expected_sentiment),
                    sentiment_stddev: blend(old.sentiment_stddev, current.sentiment_stddev),
                    confidence: blend(old.confidence, current.confidence),
                    sample_size: old.sample_size + current.sample_size,
                    absence_severity: blend(old.absence_severity, current.absence_severity),
                }),
                None => {
                    let mut decayed = old.clone();
                    decayed.expected_mention_count *= decay;
                    merged.push(decayed);
                }
            }
        }

        let existing_ids: Vec<&str> = existing.iter().map(|t| t.topic_id.as_str()).collect();
        for topic in new {
            if !existing_ids.contains(&topic.topic_id.as_str()) {
                merged.push(topic.clone());
            }
        }

        merged
    }

    /// Merge voice expectations by id union, same scheme as topics.
    fn merge_voices(
        existing: &[ExpectedVoice],
        new: &[ExpectedVoice],
        decay: f64,
    ) -> Vec<ExpectedVoice> {
        let blend = |old: f64, new: f64| old * decay + new * (1.0 - decay);
        let new_map: HashMap<&str, &ExpectedVoice> =
            new.iter().map(|v| (v.account_id.as_str(), v)).collect();

        let mut merged = Vec::new();
        for old in existing {
            match new_map.get(old.account_id.as_str()) {
                Some(current) => merged.push(ExpectedVoice {
                    account_id: old.account_id.clone(),
                    username: current.username.clone(),
                    expected_posts_per_day: blend(
                        old.expected_posts_per_day,
                        current.expected_posts_per_day,
                    ),
                    post_stddev: blend(old.post_stddev, current.post_stddev),
                    active_hours_utc: old.active_hours_utc.clone(),
                    active_days: old.active_days.clone(),
                    silence_severity: blend(old.silence_severity, current.silence_severity),
                    is_key_voice: old.is_key_voice || current.is_key_voice,
                    typical_responders: if current.typical_responders.is_empty() {
                        old.typical_responders.clone()
                    } else {
                        current.typical_responders.clone()
                    },
                }),
                None => merged.push(old.clone()),
            }
        }

        let existing_ids: Vec<&str> = existing.iter().map(|v| v.account_id.as_str()).collect();
        for voice in new {
            if !existing_ids.contains(&voice.account_id.as_str()) {
                merged.push(voice.clone());
            }
        }

        merged
    }
}
