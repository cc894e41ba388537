use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::FrameStripeError;
use crate::types::ScreenOrientation;

/// Stripe composer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Fixed number of stripes each frame is cut into.
    #[serde(alias = "numStripes")]
    pub num_stripes: u32,
    /// Maximum stripes held before the overflow policy kicks in.
    #[serde(alias = "queueCapacity")]
    pub queue_capacity: usize,
    /// The single display whose frames are turned into stripes.
    #[serde(alias = "displayIndex")]
    pub display_index: u32,
    pub orientation: ScreenOrientation,
    /// Already-resolved descriptor of the host's frame server. The composer
    /// does not open or interpret it; it is only logged on construction so
    /// the host can match it with the frame source it built.
    #[serde(alias = "frameSourceFd")]
    pub frame_source_fd: Option<i32>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            num_stripes: 8,
            queue_capacity: 64,
            display_index: 0,
            orientation: ScreenOrientation::Portrait,
            frame_source_fd: None,
        }
    }
}

impl ComposerConfig {
    /// Rejects values the producer loop cannot run with.
    ///
    /// Eviction drops the oldest half of the queue, which only keeps the newest
    /// frame intact while a frame's stripes fit in that half; a config breaking
    /// this is accepted but logged.
    pub fn validate(&self) -> Result<(), FrameStripeError> {
        if self.num_stripes == 0 {
            return Err(FrameStripeError::ConfigurationInvalid {
                reason: "num_stripes must be at least 1".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(FrameStripeError::ConfigurationInvalid {
                reason: "queue_capacity must be at least 1".into(),
            });
        }
        if self.num_stripes as usize > self.queue_capacity / 2 {
            warn!(
                "num_stripes={} exceeds half of queue_capacity={}; \
                 overflow may drop stripes of the newest frame",
                self.num_stripes, self.queue_capacity
            );
        }
        Ok(())
    }
}
