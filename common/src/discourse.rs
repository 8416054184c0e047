//! Observed discourse state: posts, accounts, topics, and per-window snapshots.
//!
//! These types capture "what IS being said" for an entity. Snapshots are
//! produced by the ingestion layer and consumed read-only by the detection
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of social media post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostType {
    Original,
    Reply,
    Repost,
    Quote,
}

/// Classification of account type for weighted analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Individual,
    CompanyOfficial,
    Executive,
    Media,
    Analyst,
    Influencer,
    BotSuspected,
    Unknown,
}

/// A social media account, with enough behavioral metadata to decide whether
/// its silence is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub platform: String,
    pub platform_id: String,
    pub username: String,
    pub display_name: String,
    pub account_type: AccountType,
    pub verified: bool,
    pub follower_count: u64,
    /// Computed from reach, engagement, and authority; 0.0 to 1.0.
    pub influence_score: f64,
}

impl Account {
    /// Platform-qualified unique identifier.
    pub fn account_id(&self) -> String {
        format!("{}:{}", self.platform, self.platform_id)
    }

    /// Whether this account's silence would be significant.
    pub fn is_high_value(&self) -> bool {
        matches!(
            self.account_type,
            AccountType::Executive | AccountType::CompanyOfficial | AccountType::Analyst
        ) || self.influence_score > 0.7
            || self.verified
    }
}

impl Default for Account {
    fn default() -> Self {
        Self {
            platform: "x".to_string(),
            platform_id: String::new(),
            username: String::new(),
            display_name: String::new(),
            account_type: AccountType::Unknown,
            verified: false,
            follower_count: 0,
            influence_score: 0.0,
        }
    }
}

/// A topic or theme extracted from discourse: a ticker, hashtag, named
/// entity, or concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub name: String,
    pub topic_type: String,
    pub tickers: Vec<String>,
    pub hashtags: Vec<String>,
    pub keywords: Vec<String>,
}

impl Topic {
    /// Create a topic from a stock ticker.
    pub fn from_ticker(ticker: &str) -> Self {
        let upper = ticker.to_uppercase();
        Self {
            topic_id: format!("ticker:{}", upper),
            name: upper.clone(),
            topic_type: "ticker".to_string(),
            tickers: vec![upper],
            hashtags: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Create a topic from a hashtag.
    pub fn from_hashtag(hashtag: &str) -> Self {
        let clean = hashtag.trim_start_matches('#').to_lowercase();
        Self {
            topic_id: format!("hashtag:{}", clean),
            name: format!("#{}", clean),
            topic_type: "hashtag".to_string(),
            tickers: Vec::new(),
            hashtags: vec![clean],
            keywords: Vec::new(),
        }
    }
}

/// A single social media post, the atomic unit of discourse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub platform: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Account,
    pub post_type: PostType,
    pub reply_to_id: Option<String>,
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    pub views: u64,
    /// -1.0 (negative) to 1.0 (positive).
    pub sentiment_score: f64,
    /// Markers like "urgent" or "defensive", set by the preprocessor.
    pub tone_markers: Vec<String>,
}

impl Post {
    /// Platform-qualified unique identifier.
    pub fn unique_id(&self) -> String {
        format!("{}:{}", self.platform, self.post_id)
    }

    /// Normalized engagement metric. Replies weigh heaviest since they
    /// indicate conversation.
    pub fn engagement_score(&self) -> f64 {
        let raw = self.likes as f64 + self.reposts as f64 * 2.0 + self.replies as f64 * 3.0;
        if self.views > 0 {
            raw / self.views as f64
        } else {
            raw
        }
    }
}

/// A conversation thread (root post plus replies), used to learn who
/// typically responds to whom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationThread {
    pub thread_id: String,
    pub root_post: Post,
    pub replies: Vec<Post>,
}

impl ConversationThread {
    /// Account ids of everyone who replied in this thread.
    pub fn responder_ids(&self) -> Vec<String> {
        self.replies.iter().map(|p| p.author.account_id()).collect()
    }
}

/// A point-in-time capture of discourse for one entity over one window.
///
/// Immutable per window; the detection core compares it against a
/// `DiscourseExpectation` to find deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscourseSnapshot {
    pub snapshot_id: String,
    pub entity: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub posts: Vec<Post>,
    pub threads: Vec<ConversationThread>,
    pub total_posts: u64,
    pub unique_authors: u64,
    pub total_engagement: u64,
    /// topic id -> mention count in this window.
    pub topic_counts: HashMap<String, u64>,
    /// topic id -> average sentiment in this window.
    pub topic_sentiments: HashMap<String, f64>,
    pub active_accounts: Vec<Account>,
    pub avg_sentiment: f64,
    pub dominant_tones: Vec<String>,
}

impl DiscourseSnapshot {
    /// Duration of the snapshot window in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.window_end - self.window_start).num_minutes()
    }

    /// Mention count for a specific topic.
    pub fn topic_volume(&self, topic_id: &str) -> u64 {
        self.topic_counts.get(topic_id).copied().unwrap_or(0)
    }

    /// Average sentiment for a specific topic, if it was present.
    pub fn topic_sentiment(&self, topic_id: &str) -> Option<f64> {
        self.topic_sentiments.get(topic_id).copied()
    }

    /// Account ids active in this window.
    pub fn active_account_ids(&self) -> Vec<String> {
        self.active_accounts.iter().map(|a| a.account_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(platform_id: &str, account_type: AccountType) -> Account {
        Account {
            platform_id: platform_id.to_string(),
            username: format!("user_{}", platform_id),
            account_type,
            ..Account::default()
        }
    }

    #[test]
    fn test_account_id_is_platform_qualified() {
        let a = account("123", AccountType::Individual);
        assert_eq!(a.account_id(), "x:123");
    }

    #[test]
    fn test_high_value_accounts() {
        assert!(account("1", AccountType::Executive).is_high_value());
        assert!(account("2", AccountType::Analyst).is_high_value());
        assert!(!account("3", AccountType::Individual).is_high_value());

        let mut influencer = account("4", AccountType::Individual);
        influencer.influence_score = 0.8;
        assert!(influencer.is_high_value());
    }

    #[test]
    fn test_topic_from_ticker() {
        let topic = Topic::from_ticker("tsla");
        assert_eq!(topic.topic_id, "ticker:TSLA");
        assert_eq!(topic.name, "TSLA");
        assert_eq!(topic.tickers, vec!["TSLA".to_string()]);
    }

    #[test]
    fn test_topic_from_hashtag() {
        let topic = Topic::from_hashtag("#Earnings");
        assert_eq!(topic.topic_id, "hashtag:earnings");
        assert_eq!(topic.name, "#earnings");
    }
}
