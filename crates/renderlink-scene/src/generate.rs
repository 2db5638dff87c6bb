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

//! Schema generation from cached local content.
//!
//! This is the offline side of scene selection: the editor caches, per level,
//! the channels it renders and the parameters its root exposes, and this module
//! turns those caches into the [`Schema`] saved for the router.

use std::collections::{BTreeSet, HashMap};

use renderlink_core::config::SceneSelectorKind;
use renderlink_core::schema::{ParameterSchema, SceneSchema, Schema, SchemaError};

/// Cached description of one level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneSource {
    /// Short name of the level.
    pub name: String,
    /// Channels the level renders.
    pub channels: Vec<String>,
    /// Flattened parameters exposed by the level's root.
    pub parameters: Vec<ParameterSchema>,
    /// Names of the streaming sub-levels the level owns.
    pub sub_levels: Vec<String>,
}

impl SceneSource {
    /// Creates a source with no sub-levels.
    pub fn new(
        name: impl Into<String>,
        channels: Vec<String>,
        parameters: Vec<ParameterSchema>,
    ) -> Self {
        Self {
            name: name.into(),
            channels,
            parameters,
            sub_levels: Vec::new(),
        }
    }

    /// Adds streaming sub-levels.
    pub fn with_sub_levels(mut self, sub_levels: Vec<String>) -> Self {
        self.sub_levels = sub_levels;
        self
    }
}

/// Builds the schema for `kind` from the cached sources.
///
/// # Arguments
/// * `kind` - The scene selection strategy the schema is generated for.
/// * `default_map` - Name of the project's default map, required by `None` and `StreamingLevels`.
/// * `sources` - One entry per cached level.
///
/// # Returns
/// A schema whose channels are the union of every source's channels, with
/// scene hashes filled in.
///
/// ## Errors
/// * `SchemaError::NoDefaultMap` - No default map is set, or it has no cache.
/// * `SchemaError::UnknownLevel` - A sub-level of the default map has no cache.
/// * `SchemaError::DuplicateSubLevel` - Two maps claim the same sub-level.
pub fn generate_schema(
    kind: SceneSelectorKind,
    default_map: Option<&str>,
    sources: &[SceneSource],
) -> Result<Schema, SchemaError> {
    let by_name: HashMap<&str, &SceneSource> = sources
        .iter()
        .map(|source| (source.name.as_str(), source))
        .collect();
    let channels: BTreeSet<String> = sources
        .iter()
        .flat_map(|source| source.channels.iter().cloned())
        .collect();

    let main_map = || {
        default_map
            .and_then(|name| by_name.get(name).copied())
            .ok_or(SchemaError::NoDefaultMap)
    };

    let scenes = match kind {
        SceneSelectorKind::None => vec![scene(main_map()?, None)],
        SceneSelectorKind::StreamingLevels => {
            let main = main_map()?;
            let mut scenes = vec![scene(main, None)];
            for sub_level in &main.sub_levels {
                let source = by_name
                    .get(sub_level.as_str())
                    .ok_or_else(|| SchemaError::UnknownLevel(sub_level.clone()))?;
                scenes.push(scene(source, Some(main)));
            }
            scenes
        }
        SceneSelectorKind::Maps => {
            let mut parents: HashMap<&str, &SceneSource> = HashMap::new();
            for source in sources {
                for sub_level in &source.sub_levels {
                    if let Some(first) = parents.insert(sub_level.as_str(), source) {
                        return Err(SchemaError::DuplicateSubLevel {
                            sub_level: sub_level.clone(),
                            first_parent: first.name.clone(),
                            second_parent: source.name.clone(),
                        });
                    }
                }
            }
            sources
                .iter()
                .map(|source| scene(source, parents.get(source.name.as_str()).copied()))
                .collect()
        }
    };

    let schema = Schema { channels, scenes };
    schema.validate()?;
    Ok(schema)
}

/// A scene whose parameters are the parent's, if any, followed by its own.
fn scene(source: &SceneSource, parent: Option<&SceneSource>) -> SceneSchema {
    let parameters = parent
        .into_iter()
        .flat_map(|parent| parent.parameters.iter())
        .chain(&source.parameters)
        .cloned()
        .collect();
    log::info!("Generated schema for scene: {}", source.name);
    SceneSchema::new(source.name.clone(), parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(key: &str) -> ParameterSchema {
        ParameterSchema::numeric("", key, key, -1.0, 1.0, 0.001, 0.0)
    }

    fn show() -> Vec<SceneSource> {
        vec![
            SceneSource::new("Show", vec!["Front".into()], vec![param("Exposure")])
                .with_sub_levels(vec!["Forest".into(), "Desert".into()]),
            SceneSource::new("Forest", vec!["Back".into()], vec![param("Fog")]),
            SceneSource::new("Desert", vec!["Front".into()], vec![param("Heat")]),
        ]
    }

    #[test]
    fn none_uses_default_map_only() {
        let schema = generate_schema(SceneSelectorKind::None, Some("Show"), &show()).unwrap();
        assert_eq!(schema.scenes.len(), 1);
        assert_eq!(schema.scenes[0].name, "Show");
        let channels: Vec<_> = schema.channels.iter().map(String::as_str).collect();
        assert_eq!(channels, ["Back", "Front"]);
    }

    #[test]
    fn streaming_levels_prefix_main_map_parameters() {
        let schema =
            generate_schema(SceneSelectorKind::StreamingLevels, Some("Show"), &show()).unwrap();
        let names: Vec<_> = schema.scenes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Show", "Forest", "Desert"]);
        let keys: Vec<_> = schema.scenes[1].parameters.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["Exposure", "Fog"]);
    }

    #[test]
    fn missing_default_map_is_reported() {
        assert!(matches!(
            generate_schema(SceneSelectorKind::None, None, &show()),
            Err(SchemaError::NoDefaultMap)
        ));
        assert!(matches!(
            generate_schema(SceneSelectorKind::StreamingLevels, Some("Nowhere"), &show()),
            Err(SchemaError::NoDefaultMap)
        ));
    }

    #[test]
    fn maps_do_not_need_a_default_map() {
        let schema = generate_schema(SceneSelectorKind::Maps, None, &show()).unwrap();
        assert_eq!(schema.scenes.len(), 3);
        assert_eq!(schema.scenes[0].parameters.len(), 1);
        assert_eq!(schema.scenes[2].parameters[0].key, "Exposure");
    }

    #[test]
    fn maps_reject_a_sub_level_with_two_parents() {
        let mut sources = show();
        sources.push(
            SceneSource::new("Other", vec![], vec![param("Wind")])
                .with_sub_levels(vec!["Desert".into()]),
        );
        let err = generate_schema(SceneSelectorKind::Maps, None, &sources).unwrap_err();
        match err {
            SchemaError::DuplicateSubLevel {
                sub_level,
                first_parent,
                second_parent,
            } => {
                assert_eq!(sub_level, "Desert");
                assert_eq!(first_parent, "Show");
                assert_eq!(second_parent, "Other");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
