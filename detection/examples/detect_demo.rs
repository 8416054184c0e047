//! End-to-end demo: build a baseline from synthetic history, feed the
//! detector a suspicious window, and classify the result.
//!
//! Run with: cargo run --example detect_demo -p detection

use chrono::{Duration, Utc};
use std::collections::HashMap;

use common::discourse::{Account, AccountType, DiscourseSnapshot, Post, PostType};
use detection::{DeltaDetector, DetectionConfig, EventClassifier};
use expectation::{BaselineBuilder, ExpectationGenerator, TriggerManager};

fn ceo() -> Account {
    Account {
        platform: "x".to_string(),
        platform_id: "1001".to_string(),
        username: "acme_ceo".to_string(),
        display_name: "ACME CEO".to_string(),
        account_type: AccountType::Executive,
        verified: true,
        follower_count: 250_000,
        influence_score: 0.9,
    }
}

fn post(author: &Account, at: chrono::DateTime<Utc>) -> Post {
    Post {
        post_id: format!("p{}", at.timestamp()),
        platform: "x".to_string(),
        text: "Shipping updates on $ACME today.".to_string(),
        created_at: at,
        author: author.clone(),
        post_type: PostType::Original,
        reply_to_id: None,
        likes: 120,
        reposts: 30,
        replies: 15,
        views: 40_000,
        sentiment_score: 0.3,
        tone_markers: Vec::new(),
    }
}

fn snapshot(at: chrono::DateTime<Utc>, total_posts: u64, mentions: u64, sentiment: f64, active: Vec<Account>) -> DiscourseSnapshot {
    let posts = active.iter().map(|a| post(a, at)).collect();
    DiscourseSnapshot {
        snapshot_id: format!("snap_{}", at.timestamp()),
        entity: "ACME".to_string(),
        window_start: at,
        window_end: at + Duration::hours(1),
        posts,
        threads: Vec::new(),
        total_posts,
        unique_authors: total_posts / 3,
        total_engagement: total_posts * 20,
        topic_counts: HashMap::from([("ticker:ACME".to_string(), mentions)]),
        topic_sentiments: HashMap::from([("ticker:ACME".to_string(), sentiment)]),
        active_accounts: active,
        avg_sentiment: sentiment,
        dominant_tones: Vec::new(),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut generator =
        ExpectationGenerator::new(BaselineBuilder::default(), TriggerManager::with_defaults());

    // Thirty days of healthy hourly history: ~100 posts, ~50 ticker
    // mentions, mildly positive sentiment, CEO active.
    let start = Utc::now() - Duration::days(30);
    let history: Vec<DiscourseSnapshot> = (0..720)
        .map(|i| {
            let at = start + Duration::hours(i);
            let jitter = (i % 7) as u64;
            snapshot(at, 95 + jitter * 2, 48 + jitter, 0.15 + jitter as f64 * 0.01, vec![ceo()])
        })
        .collect();
    generator.build_baseline("ACME", &history);

    let mut detector = DeltaDetector::new(generator, DetectionConfig::default());
    detector.set_on_delta_detected(Box::new(|delta| {
        println!("delta: {}", delta.description());
    }));

    // A suspicious window: volume collapsed, the ticker vanished, sentiment
    // soured, and the CEO is quiet.
    let now = Utc::now();
    let quiet = snapshot(now - Duration::hours(1), 30, 3, -0.4, Vec::new());
    let deltas = detector.detect(&quiet, None);

    println!("\n{} deltas detected", deltas.len());

    let classifier = EventClassifier::new();
    let event = classifier.create_event("ACME", &deltas, None);

    println!("\nevent: {}", event.title);
    println!("type: {:?}", event.event_type);
    println!("severity: {}", event.severity.as_str());
    println!("confidence: {:.2}", event.confidence);
    println!(
        "record: {}",
        serde_json::to_string_pretty(&event.to_record()).expect("event serializes")
    );
}
