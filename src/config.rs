//! Configuration for the signing subsystem.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for document signing and the engine around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Deadline for one signing call (decode + digest + RSA + serialize).
    #[serde(with = "duration_secs")]
    pub sign_timeout: Duration,
    /// Concurrent signing permits; signing is CPU-bound.
    pub max_concurrent: usize,
    /// Visible block geometry, PDF points from the lower-left corner.
    pub block_x: f32,
    pub block_base_y: f32,
    /// Vertical distance between stacked signature blocks.
    pub block_spacing: f32,
    pub font_size: f32,
    /// Reason rendered when the caller supplies none.
    pub default_reason: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            sign_timeout: Duration::from_secs(30),
            max_concurrent: num_cpus::get(),
            block_x: 50.0,
            block_base_y: 40.0,
            block_spacing: 28.0,
            font_size: 7.0,
            default_reason: None,
        }
    }
}

// Serde helper: persist the timeout as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
