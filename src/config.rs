//! Channel configuration parameters
//!
//! All tunable parameters for one proxied channel. Values can be loaded from
//! JSON; missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::error::{ProxifyError, Result};
use crate::value::MAX_CLONE_DEPTH;

/// Smallest frame limit that still fits a close message.
const MIN_FRAME_SIZE: usize = 16;

/// Per-channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Call `Port::start` when a proxy or target is bound.
    pub auto_start: bool,
    /// Close the channel when the last proxy node of a root is dropped.
    pub close_on_drop: bool,
    /// Longest call path the target side will resolve.
    pub max_path_depth: usize,
    /// Largest payload a framed port will encode or accept (bytes).
    pub max_frame_size: usize,
    /// Deepest array/object nesting a framed port will decode.
    pub max_value_depth: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            close_on_drop: true,
            max_path_depth: 64,
            max_frame_size: 1024 * 1024, // 1 MiB
            max_value_depth: 64,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_path_depth == 0 {
            return Err(ProxifyError::Config("max_path_depth must be at least 1"));
        }
        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(ProxifyError::Config("max_frame_size is too small"));
        }
        if self.max_value_depth == 0 || self.max_value_depth > MAX_CLONE_DEPTH {
            return Err(ProxifyError::Config("max_value_depth must be within 1..=256"));
        }
        if u32::try_from(self.max_frame_size).is_err() {
            return Err(ProxifyError::Config("max_frame_size must fit a u32 length prefix"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| ProxifyError::Config("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }
}
