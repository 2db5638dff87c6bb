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

//! The schema: the declared output channels and, per scene, the exposed
//! tunable parameters with a content hash.
//!
//! Two representations exist. [`Schema`] is the owned model the workspace works
//! with. [`ScopedSchema`] is the C-layout tree handed across the router
//! boundary; it owns every nested allocation and frees each exactly once.

mod scoped;

pub use scoped::{RawChannels, RawParameter, RawScene, RawScenes, RawSchema, ScopedSchema};

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// DMX offset meaning "let the router allocate one".
pub const DMX_OFFSET_AUTO: i32 = -1;
/// DMX type for 16-bit big endian values.
pub const DMX_TYPE_16_BIT_BIG_ENDIAN: u32 = 2;

/// An error found while building, checking, or persisting a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A scene has no name.
    #[error("scene {index} has an empty name")]
    EmptySceneName {
        /// Position of the scene.
        index: usize,
    },
    /// Two scenes share a name.
    #[error("scene '{0}' is declared more than once")]
    DuplicateScene(String),
    /// A parameter has no key.
    #[error("scene '{scene}' has a parameter with an empty key")]
    EmptyParameterKey {
        /// The scene declaring the parameter.
        scene: String,
    },
    /// Two parameters of one scene share a key.
    #[error("scene '{scene}' declares parameter '{key}' more than once")]
    DuplicateParameter {
        /// The scene declaring the parameter.
        scene: String,
        /// The duplicated key.
        key: String,
    },
    /// A parameter range is inverted or does not match its options.
    #[error("parameter '{key}' of scene '{scene}' has an invalid range")]
    InvalidRange {
        /// The scene declaring the parameter.
        scene: String,
        /// The parameter key.
        key: String,
    },
    /// A string cannot cross the boundary because it contains a NUL byte.
    #[error("{field} contains an interior NUL byte")]
    InteriorNul {
        /// Which field was rejected.
        field: &'static str,
    },
    /// A string read from the boundary is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Which field was rejected.
        field: &'static str,
    },
    /// A sequence is too long to be described by a 32-bit count.
    #[error("too many {0} for a 32-bit count")]
    TooManyEntries(&'static str),
    /// Two maps both claim the same sub-level as their child.
    #[error("sub-level '{sub_level}' is claimed by both '{first_parent}' and '{second_parent}'")]
    DuplicateSubLevel {
        /// The sub-level in question.
        sub_level: String,
        /// The first map claiming it.
        first_parent: String,
        /// The second map claiming it.
        second_parent: String,
    },
    /// A selector needing a default map was used without one.
    #[error("no default map defined, either use the Maps scene selector or define a default map")]
    NoDefaultMap,
    /// A source level referenced by another one is unknown.
    #[error("unknown level '{0}'")]
    UnknownLevel(String),
    /// Reading or writing a persisted schema failed.
    #[error("schema I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted schema could not be decoded.
    #[error("schema format error: {0}")]
    Format(String),
}

/// One exposed tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Grouping shown by the router.
    pub group: String,
    /// Human readable name.
    pub display_name: String,
    /// Unique key within the scene.
    pub key: String,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
    /// Step between values.
    pub step: f32,
    /// Default value.
    pub default_value: f32,
    /// Option labels for enumerated parameters, empty for numeric ones.
    #[serde(default)]
    pub options: Vec<String>,
    /// DMX routing offset, [`DMX_OFFSET_AUTO`] to let the router decide.
    pub dmx_offset: i32,
    /// DMX routing value type.
    pub dmx_type: u32,
}

impl ParameterSchema {
    /// Creates a numeric parameter with automatic DMX routing.
    pub fn numeric(
        group: impl Into<String>,
        display_name: impl Into<String>,
        key: impl Into<String>,
        min: f32,
        max: f32,
        step: f32,
        default_value: f32,
    ) -> Self {
        Self {
            group: group.into(),
            display_name: display_name.into(),
            key: key.into(),
            min,
            max,
            step,
            default_value,
            options: Vec::new(),
            dmx_offset: DMX_OFFSET_AUTO,
            dmx_type: DMX_TYPE_16_BIT_BIG_ENDIAN,
        }
    }

    /// Creates an enumerated parameter. The range collapses to `[0, options - 1]`, step 1.
    pub fn enumerated(
        group: impl Into<String>,
        display_name: impl Into<String>,
        key: impl Into<String>,
        options: Vec<String>,
        default_value: f32,
    ) -> Self {
        let max = options.len().saturating_sub(1) as f32;
        Self {
            options,
            ..Self::numeric(group, display_name, key, 0.0, max, 1.0, default_value)
        }
    }

    /// Returns `true` if the parameter selects one of a list of options.
    pub fn is_enumerated(&self) -> bool {
        !self.options.is_empty()
    }
}

/// The parameters exposed by one scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneSchema {
    /// The scene name, matched against local content.
    pub name: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterSchema>,
    /// Content hash of the parameter list, `0` if not computed yet.
    #[serde(default)]
    pub hash: u64,
}

impl SceneSchema {
    /// Creates a scene and computes its hash.
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterSchema>) -> Self {
        let hash = schema_hash(&parameters);
        Self {
            name: name.into(),
            parameters,
            hash,
        }
    }
}

/// Output channels plus the ordered list of scenes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Channel names; unique, order irrelevant.
    pub channels: BTreeSet<String>,
    /// Scenes in router order.
    pub scenes: Vec<SceneSchema>,
}

impl Schema {
    /// Returns `true` if the schema declares neither channels nor scenes.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.scenes.is_empty()
    }

    /// Looks a scene up by name.
    pub fn scene(&self, name: &str) -> Option<(usize, &SceneSchema)> {
        self.scenes
            .iter()
            .enumerate()
            .find(|(_, scene)| scene.name == name)
    }

    /// Recomputes every scene hash from its parameters.
    pub fn fill_hashes(&mut self) {
        for scene in &mut self.scenes {
            scene.hash = schema_hash(&scene.parameters);
        }
    }

    /// Checks that the schema is well-formed: named, uniquely keyed scenes and
    /// parameters with consistent ranges.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut scene_names = HashSet::new();
        for (index, scene) in self.scenes.iter().enumerate() {
            if scene.name.is_empty() {
                return Err(SchemaError::EmptySceneName { index });
            }
            if !scene_names.insert(scene.name.as_str()) {
                return Err(SchemaError::DuplicateScene(scene.name.clone()));
            }

            let mut keys = HashSet::new();
            for parameter in &scene.parameters {
                if parameter.key.is_empty() {
                    return Err(SchemaError::EmptyParameterKey {
                        scene: scene.name.clone(),
                    });
                }
                if !keys.insert(parameter.key.as_str()) {
                    return Err(SchemaError::DuplicateParameter {
                        scene: scene.name.clone(),
                        key: parameter.key.clone(),
                    });
                }
                let inverted = !(parameter.min <= parameter.max);
                let options_mismatch = parameter.is_enumerated()
                    && (parameter.min != 0.0
                        || parameter.max != (parameter.options.len() - 1) as f32);
                if inverted || options_mismatch {
                    return Err(SchemaError::InvalidRange {
                        scene: scene.name.clone(),
                        key: parameter.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Serializes the schema to pretty JSON.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaError::Format(e.to_string()))
    }

    /// Parses a schema from JSON.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(|e| SchemaError::Format(e.to_string()))
    }
}

/// Computes the content hash of a parameter list.
///
/// Covers keys, groups, ranges, steps, and options in order. Default values are
/// left out: editing a default does not change what the router can drive.
pub fn schema_hash(parameters: &[ParameterSchema]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(parameters.len() as u64).to_le_bytes());
    for parameter in parameters {
        for text in [&parameter.key, &parameter.group] {
            hasher.update(&(text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        for value in [parameter.min, parameter.max, parameter.step] {
            hasher.update(&value.to_le_bytes());
        }
        hasher.update(&(parameter.options.len() as u64).to_le_bytes());
        for option in &parameter.options {
            hasher.update(&(option.len() as u64).to_le_bytes());
            hasher.update(option.as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
