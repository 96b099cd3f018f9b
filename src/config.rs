use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Passes accumulated in normal mode before the main film is complete.
    pub main_samples: u32,
    /// Passes accumulated while the camera is being dragged.
    pub preview_samples: u32,
    pub icon_samples: u32,
    pub icon_size: u32,
    pub seed: u64,
    /// Idle time after the last drag event before the camera is written back.
    pub debounce_ms: u64,
    /// Orbit angle per pixel of drag, in units of pi.
    pub drag_scale: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            main_samples: 200,
            preview_samples: 1,
            icon_samples: 40,
            icon_size: 64,
            seed: 0,
            debounce_ms: 200,
            drag_scale: 0.003,
        }
    }
}

impl RenderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
