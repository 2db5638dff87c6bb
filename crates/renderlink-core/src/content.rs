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

//! The host's content world, as seen by scene selection.
//!
//! Content roots and levels are owned by the host's loading subsystem. This
//! module only hands out non-owning ids that may stop resolving at any time
//! after an unload; callers re-check [`ContentWorld::level_state`] instead of
//! holding on to anything.

use crate::schema::ParameterSchema;

/// A non-owning handle to a loadable level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(pub u64);

/// A non-owning handle to a content root exposing tunable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u64);

/// Load state of a level, polled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentState {
    /// The handle no longer refers to anything.
    Gone,
    /// Known but not resident.
    Unloaded,
    /// A load was requested and has not finished.
    Loading,
    /// Resident and ready to be shown.
    Loaded,
}

/// The kind of an exposed property, with the metadata flattening needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// Exposed as an `Off`/`On` choice.
    Bool,
    /// 8-bit integer; 0 to 255 unless clamped.
    Byte {
        /// Enum labels, empty for a plain number.
        options: Vec<String>,
        /// Explicit clamp range.
        limits: Option<(f32, f32)>,
    },
    /// 32-bit integer; -1000 to 1000 unless clamped.
    Int {
        /// Enum labels, empty for a plain number.
        options: Vec<String>,
        /// Explicit clamp range.
        limits: Option<(f32, f32)>,
    },
    /// Float; -1 to 1 unless clamped.
    Float {
        /// Explicit clamp range.
        limits: Option<(f32, f32)>,
    },
    /// Three components, `x`, `y`, `z`.
    Vector,
    /// 8-bit RGBA colour, exposed normalised.
    Color,
    /// Float RGBA colour.
    LinearColor,
}

impl ParameterKind {
    /// Suffixes of the flattened fields, empty for single-valued kinds.
    pub fn field_suffixes(&self) -> &'static [&'static str] {
        match self {
            ParameterKind::Vector => &["x", "y", "z"],
            ParameterKind::Color | ParameterKind::LinearColor => &["r", "g", "b", "a"],
            _ => &[],
        }
    }

    /// Number of components a value of this kind carries.
    pub fn component_count(&self) -> usize {
        self.field_suffixes().len().max(1)
    }
}

/// A property a content root exposes to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposedParameter {
    /// Grouping shown by the router.
    pub group: String,
    /// Property name, used as the key stem.
    pub name: String,
    /// Kind and range metadata.
    pub kind: ParameterKind,
    /// Current value, one entry per component, in native units.
    pub value: Vec<f32>,
}

impl ExposedParameter {
    /// Creates a parameter with the given current value.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        kind: ParameterKind,
        value: Vec<f32>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            kind,
            value,
        }
    }

    /// Flattens this property into the schema fields the router drives.
    pub fn fields(&self) -> Vec<ParameterSchema> {
        let component = |i: usize| self.value.get(i).copied().unwrap_or_default();
        let field = |min, max, step, default| {
            ParameterSchema::numeric(&self.group, &self.name, &self.name, min, max, step, default)
        };

        match &self.kind {
            ParameterKind::Bool => vec![ParameterSchema::enumerated(
                &self.group,
                &self.name,
                &self.name,
                vec!["Off".into(), "On".into()],
                if component(0) != 0.0 { 1.0 } else { 0.0 },
            )],
            ParameterKind::Byte { options, limits } | ParameterKind::Int { options, limits } => {
                if !options.is_empty() {
                    return vec![ParameterSchema::enumerated(
                        &self.group,
                        &self.name,
                        &self.name,
                        options.clone(),
                        component(0),
                    )];
                }
                let fallback = match self.kind {
                    ParameterKind::Byte { .. } => (0.0, 255.0),
                    _ => (-1000.0, 1000.0),
                };
                let (min, max) = limits.unwrap_or(fallback);
                vec![field(min, max, 1.0, component(0))]
            }
            ParameterKind::Float { limits } => {
                let (min, max) = limits.unwrap_or((-1.0, 1.0));
                vec![field(min, max, 0.001, component(0))]
            }
            ParameterKind::Vector => self.suffixed(-1.0, 1.0, 0.001, 1.0),
            ParameterKind::Color => self.suffixed(0.0, 1.0, 0.0001, 1.0 / 255.0),
            ParameterKind::LinearColor => self.suffixed(0.0, 1.0, 0.0001, 1.0),
        }
    }

    fn suffixed(&self, min: f32, max: f32, step: f32, scale: f32) -> Vec<ParameterSchema> {
        self.kind
            .field_suffixes()
            .iter()
            .enumerate()
            .map(|(i, suffix)| {
                let default = self.value.get(i).copied().unwrap_or_default() * scale;
                ParameterSchema::numeric(
                    &self.group,
                    format!("{} {}", self.name, suffix),
                    format!("{}_{}", self.name, suffix),
                    min,
                    max,
                    step,
                    default,
                )
            })
            .collect()
    }

    /// Writes a router-driven field value back into this property.
    ///
    /// `key` is a flattened key as produced by [`ExposedParameter::fields`].
    /// Returns `false` if the key does not belong to this property.
    pub fn apply_field(&mut self, key: &str, value: f32) -> bool {
        let index = match key.strip_prefix(self.name.as_str()) {
            Some("") if self.kind.field_suffixes().is_empty() => 0,
            Some(rest) => match rest.strip_prefix('_') {
                Some(suffix) => match self.kind.field_suffixes().iter().position(|s| *s == suffix) {
                    Some(index) => index,
                    None => return false,
                },
                None => return false,
            },
            None => return false,
        };

        let native = match self.kind {
            ParameterKind::Bool => if value >= 0.5 { 1.0 } else { 0.0 },
            ParameterKind::Byte { .. } => value.round().clamp(0.0, 255.0),
            ParameterKind::Int { .. } => value.round(),
            ParameterKind::Color => (value * 255.0).round().clamp(0.0, 255.0),
            _ => value,
        };

        let components = self.kind.component_count();
        if self.value.len() < components {
            self.value.resize(components, 0.0);
        }
        self.value[index] = native;
        true
    }
}

/// Flattens every property of a root, in declaration order.
pub fn flatten_parameters(parameters: &[ExposedParameter]) -> Vec<ParameterSchema> {
    parameters.iter().flat_map(ExposedParameter::fields).collect()
}

/// The host's level and content-root graph.
///
/// Every method is cheap and non-blocking. Loads and map switches complete
/// asynchronously and are observed by polling on a later frame.
pub trait ContentWorld {
    /// The root common to every scene (the persistent level's script root), if any.
    fn shared_root(&self) -> Option<RootId>;

    /// Looks a streaming level up by its short name.
    fn find_level(&self, name: &str) -> Option<LevelId>;

    /// Every streaming level of the current map.
    fn levels(&self) -> Vec<LevelId>;

    /// Polls the load state of a level.
    fn level_state(&self, level: LevelId) -> ContentState;

    /// Starts loading a level. Returns immediately.
    fn request_level_load(&mut self, level: LevelId);

    /// Shows or hides a level.
    fn set_level_visible(&mut self, level: LevelId, visible: bool);

    /// The content root of a loaded level.
    fn level_root(&self, level: LevelId) -> Option<RootId>;

    /// Name of the map currently open, if any.
    fn current_map(&self) -> Option<String>;

    /// Starts switching to another map. Returns immediately.
    ///
    /// Asking again for the map already being opened does not restart the switch.
    fn request_map(&mut self, name: &str);

    /// Every map that can be opened.
    fn maps(&self) -> Vec<String>;

    /// The map owning the streaming level `name`, whether or not that map is open.
    /// The current map wins when several maps have a level of that name.
    fn level_map(&self, name: &str) -> Option<String>;

    /// Lists the properties a root exposes, in declaration order.
    fn exposed_parameters(&self, root: RootId) -> Vec<ExposedParameter>;

    /// Writes a flattened field value into a root. Returns `false` if the key is unknown.
    fn apply_parameter(&mut self, root: RootId, key: &str, value: f32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bool_becomes_off_on_choice() {
        let p = ExposedParameter::new("Switches", "Fog", ParameterKind::Bool, vec![1.0]);
        let fields = p.fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].options, vec!["Off".to_string(), "On".to_string()]);
        assert_eq!(fields[0].default_value, 1.0);
        assert_eq!(fields[0].max, 1.0);
    }

    #[test]
    fn numeric_defaults_and_clamps() {
        let byte = ExposedParameter::new(
            "",
            "Level",
            ParameterKind::Byte { options: vec![], limits: None },
            vec![12.0],
        );
        let int = ExposedParameter::new(
            "",
            "Count",
            ParameterKind::Int { options: vec![], limits: Some((0.0, 10.0)) },
            vec![3.0],
        );
        let float = ExposedParameter::new("", "Blend", ParameterKind::Float { limits: None }, vec![0.5]);

        let fields = flatten_parameters(&[byte, int, float]);
        assert_eq!((fields[0].min, fields[0].max, fields[0].step), (0.0, 255.0, 1.0));
        assert_eq!((fields[1].min, fields[1].max), (0.0, 10.0));
        assert_eq!((fields[2].min, fields[2].max), (-1.0, 1.0));
        assert_relative_eq!(fields[2].step, 0.001);
    }

    #[test]
    fn enum_options_collapse_range() {
        let p = ExposedParameter::new(
            "Look",
            "Mood",
            ParameterKind::Int {
                options: vec!["Day".into(), "Dusk".into(), "Night".into()],
                limits: Some((-5.0, 5.0)),
            },
            vec![2.0],
        );
        let field = &p.fields()[0];
        assert_eq!((field.min, field.max, field.step), (0.0, 2.0, 1.0));
    }

    #[test]
    fn colour_is_split_and_normalised() {
        let p = ExposedParameter::new("Look", "Tint", ParameterKind::Color, vec![255.0, 0.0, 51.0, 255.0]);
        let fields = p.fields();
        let keys: Vec<_> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, ["Tint_r", "Tint_g", "Tint_b", "Tint_a"]);
        assert_eq!(fields[0].display_name, "Tint r");
        assert_relative_eq!(fields[2].default_value, 0.2);
        assert_relative_eq!(fields[0].step, 0.0001);
    }

    #[test]
    fn apply_field_maps_back_to_components() {
        let mut p = ExposedParameter::new("Look", "Tint", ParameterKind::Color, vec![0.0; 4]);
        assert!(p.apply_field("Tint_g", 0.5));
        assert_eq!(p.value[1], 128.0);
        assert!(!p.apply_field("Tint_w", 0.5));
        assert!(!p.apply_field("Tint", 0.5));

        let mut v = ExposedParameter::new("", "Offset", ParameterKind::Vector, vec![]);
        assert!(v.apply_field("Offset_z", -0.25));
        assert_eq!(v.value, vec![0.0, 0.0, -0.25]);

        let mut f = ExposedParameter::new("", "Blend", ParameterKind::Float { limits: None }, vec![0.0]);
        assert!(f.apply_field("Blend", 0.75));
        assert!(!f.apply_field("Blender", 0.75));
        assert_eq!(f.value, vec![0.75]);
    }
}
