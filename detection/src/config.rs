//! Delta detection configuration.

use serde::{Deserialize, Serialize};

/// Thresholds and knobs for the delta detection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Ratio of observed/expected mentions below which a topic is absent.
    pub topic_absence_threshold: f64,

    /// Hours of silence before an expected voice is flagged.
    pub voice_silence_threshold_hours: f64,

    /// Z-score threshold for sentiment decoupling.
    pub sentiment_z_threshold: f64,

    /// Volume ratio below which activity counts as a collapse.
    pub volume_collapse_threshold: f64,

    /// Volume ratio above which activity counts as a spike.
    pub volume_spike_threshold: f64,

    /// Z-score threshold a spike must additionally clear.
    pub volume_z_threshold: f64,

    /// Deltas below this confidence are discarded.
    pub min_delta_confidence: f64,

    /// Maximum gap between consecutive deltas in one cluster.
    pub cluster_window_minutes: i64,

    /// Minimum deltas for a group to count as a cluster.
    pub min_cluster_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            topic_absence_threshold: 0.3,
            voice_silence_threshold_hours: 24.0,
            sentiment_z_threshold: 2.0,
            volume_collapse_threshold: 0.5,
            volume_spike_threshold: 2.0,
            volume_z_threshold: 2.0,
            min_delta_confidence: 0.5,
            cluster_window_minutes: 60,
            min_cluster_size: 2,
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> anyhow::Result<DetectionConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: DetectionConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a TOML file.
pub fn save_config(config: &DetectionConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default configuration file template.
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    let template = "# Delta Detection Configuration

# Ratio of observed/expected mentions below which a topic is absent
topic_absence_threshold = 0.3

# Hours of silence before an expected voice is flagged
voice_silence_threshold_hours = 24.0

# Z-score threshold for sentiment decoupling
sentiment_z_threshold = 2.0

# Volume ratio below which activity counts as a collapse
volume_collapse_threshold = 0.5

# Volume ratio above which activity counts as a spike
volume_spike_threshold = 2.0

# Z-score threshold a spike must additionally clear
volume_z_threshold = 2.0

# Deltas below this confidence are discarded
min_delta_confidence = 0.5

# Maximum gap between consecutive deltas in one cluster (minutes)
cluster_window_minutes = 60

# Minimum deltas for a group to count as a cluster
min_cluster_size = 2
";

    std::fs::write(path, template)?;
    Ok(())
}
