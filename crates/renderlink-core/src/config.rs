// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session settings, loaded from a RON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How scenes declared by the router map onto local content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SceneSelectorKind {
    /// A single scene: the shared root only.
    #[default]
    None,
    /// The default map plus one scene per streaming sub-level.
    StreamingLevels,
    /// One scene per map, switching maps to activate.
    Maps,
}

/// How the render path behaves when no camera response is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameWaitMode {
    /// Never block; hold the last frame when no camera response is queued.
    #[default]
    Interactive,
    /// Wait for frame data up to the configured timeout.
    Synchronised,
}

/// An error raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    /// The settings text is not valid RON for [`RenderLinkSettings`].
    #[error("invalid settings: {0}")]
    Parse(String),
}

/// Everything a session needs to know before connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLinkSettings {
    /// Strategy used to activate scenes.
    pub scene_selector: SceneSelectorKind,
    /// Behaviour of the render path when it runs ahead of the router.
    pub frame_wait: FrameWaitMode,
    /// Budget for each `await_frame_data` call, in milliseconds.
    pub await_frame_timeout_ms: u32,
    /// Bound on waiting for an in-flight send when a channel is torn down.
    pub teardown_fence_timeout_ms: u32,
    /// Project path the schema is saved to and loaded from.
    pub schema_path: Option<PathBuf>,
    /// Post per-frame profiling entries to the router.
    pub post_profiling: bool,
}

impl Default for RenderLinkSettings {
    fn default() -> Self {
        Self {
            scene_selector: SceneSelectorKind::default(),
            frame_wait: FrameWaitMode::default(),
            await_frame_timeout_ms: 5000,
            teardown_fence_timeout_ms: 1000,
            schema_path: None,
            post_profiling: false,
        }
    }
}

impl RenderLinkSettings {
    /// Reads settings from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_ron_str(&text)?;
        log::debug!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Parses settings from RON text. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        ron::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Serializes the settings to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// The frame-data budget as a duration.
    pub fn await_frame_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.await_frame_timeout_ms))
    }

    /// The teardown budget as a duration.
    pub fn teardown_fence_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.teardown_fence_timeout_ms))
    }
}
