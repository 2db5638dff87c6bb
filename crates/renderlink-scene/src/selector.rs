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

use renderlink_core::config::SceneSelectorKind;
use renderlink_core::content::{flatten_parameters, ContentState, ContentWorld, LevelId, RootId};
use renderlink_core::schema::{schema_hash, ParameterSchema, Schema};
use renderlink_core::Router;

use crate::binding::{BindingTarget, ContentBinding, Readiness, Validation, ValidationFailure};
use crate::error::SceneError;

/// What [`SceneSelector::apply_scene`] did this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The scene's content is still loading; nothing was activated.
    Loading,
    /// The scene was switched to and its parameters applied.
    Activated,
    /// The scene was already active; only its parameters were applied.
    AlreadyActive,
}

/// Reconciles the router's schema against local content and activates scenes.
///
/// The strategy is chosen once from [`SceneSelectorKind`]:
/// * `None` binds every scene to the shared root and never touches visibility.
/// * `StreamingLevels` binds scenes to streaming levels of the current map by
///   name; a scene matching no level is the base scene.
/// * `Maps` binds scenes to whole maps, or to a streaming level of whichever
///   map owns a level of that name. Reaching such a level opens its map first.
#[derive(Debug)]
pub struct SceneSelector {
    kind: SceneSelectorKind,
    schema: Option<Schema>,
    bindings: Vec<ContentBinding>,
    active: Option<usize>,
}

impl SceneSelector {
    /// Creates a selector with no schema loaded.
    pub fn new(kind: SceneSelectorKind) -> Self {
        Self {
            kind,
            schema: None,
            bindings: Vec::new(),
            active: None,
        }
    }

    /// The strategy in use.
    pub fn kind(&self) -> SceneSelectorKind {
        self.kind
    }

    /// The schema last loaded.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// One binding per scene, in schema order.
    pub fn bindings(&self) -> &[ContentBinding] {
        &self.bindings
    }

    /// The binding of scene `index`.
    pub fn binding(&self, index: usize) -> Option<&ContentBinding> {
        self.bindings.get(index)
    }

    /// Index of the scene currently shown.
    pub fn active_scene(&self) -> Option<usize> {
        self.active
    }

    /// Binds every scene of a freshly loaded schema to local content.
    ///
    /// Resident content is validated immediately. Content that still has to
    /// be loaded is left unvalidated until a later [`SceneSelector::apply_scene`].
    /// A scene failing validation is reported and marked, never fatal.
    ///
    /// ## Errors
    /// * `SceneError::Schema` - The schema itself is malformed.
    pub fn on_loaded_schema<W>(&mut self, world: &W, schema: Schema) -> Result<(), SceneError>
    where
        W: ContentWorld + ?Sized,
    {
        schema.validate()?;

        let shared_root = world.shared_root();
        let shared_count = shared_root
            .map(|root| flatten_parameters(&world.exposed_parameters(root)).len())
            .unwrap_or(0);
        let current_map = world.current_map();

        let mut bindings = Vec::with_capacity(schema.scenes.len());
        for scene in &schema.scenes {
            let target = self.resolve_target(world, &scene.name);
            let mut binding = ContentBinding::new(
                scene,
                target.clone().unwrap_or(BindingTarget::Base),
                shared_root,
            );

            match target {
                None if scene.parameters.len() != shared_count => {
                    log::error!(
                        "Scene '{}' matches no local content and declares {} parameters where the shared root exposes {}, excluding it",
                        scene.name,
                        scene.parameters.len(),
                        shared_count
                    );
                    binding.validation = Validation::Invalid(ValidationFailure::Unresolvable);
                }
                None | Some(BindingTarget::Base) => {
                    validate_binding(world, &mut binding);
                }
                Some(BindingTarget::Level(level))
                | Some(BindingTarget::SubLevel {
                    level: Some(level), ..
                }) => match world.level_state(level) {
                    ContentState::Loaded => {
                        binding.readiness = Readiness::Loaded;
                        validate_binding(world, &mut binding);
                    }
                    state => {
                        if state == ContentState::Loading {
                            binding.readiness = Readiness::Loading;
                        }
                        log::info!("Skipping validation of unloaded streaming level {}", scene.name);
                    }
                },
                Some(BindingTarget::SubLevel {
                    ref map,
                    level: None,
                }) => {
                    log::info!(
                        "Skipping validation of streaming level {} until map {} is opened",
                        scene.name,
                        map
                    );
                }
                Some(BindingTarget::Map(ref map)) => {
                    if current_map.as_deref() == Some(map.as_str()) {
                        binding.readiness = Readiness::Loaded;
                        validate_binding(world, &mut binding);
                    } else {
                        log::info!("Skipping validation of map {} until it is opened", map);
                    }
                }
            }
            bindings.push(binding);
        }

        log::info!(
            "Loaded schema with {} scenes and {} channels",
            schema.scenes.len(),
            schema.channels.len()
        );
        self.bindings = bindings;
        self.schema = Some(schema);
        self.active = None;
        Ok(())
    }

    /// Makes scene `index` the active one and applies the router's current
    /// parameter values to it.
    ///
    /// Never blocks: when the content is not resident yet, a load is requested
    /// and [`ApplyOutcome::Loading`] returned. Calling again on later frames
    /// picks up where it left off.
    ///
    /// ## Errors
    /// * `SceneError::SceneOutOfRange` - No such scene. Nothing is changed.
    /// * `SceneError::Excluded` - The scene has no resolvable content.
    /// * `SceneError::Router` - The router could not provide parameter values.
    pub fn apply_scene<W, R>(
        &mut self,
        world: &mut W,
        router: &R,
        index: u32,
    ) -> Result<ApplyOutcome, SceneError>
    where
        W: ContentWorld + ?Sized,
        R: Router + ?Sized,
    {
        if self.schema.is_none() {
            return Err(SceneError::NoSchema);
        }
        let count = self.bindings.len();
        let scene = index as usize;
        let Some(binding) = self.bindings.get_mut(scene) else {
            log::error!("Unable to apply scene {index}: only {count} scenes are declared");
            return Err(SceneError::SceneOutOfRange { index, count });
        };
        if binding.is_excluded() {
            return Err(SceneError::Excluded(binding.name.clone()));
        }

        if matches!(binding.target, BindingTarget::Base | BindingTarget::Level(_)) {
            let shared_root = world.shared_root();
            if binding.shared_root != shared_root {
                log::debug!("Shared root changed under scene '{}'", binding.name);
                binding.shared_root = shared_root;
                binding.validation = Validation::Unvalidated;
            }
        }

        if poll_content(world, binding)? != Readiness::Loaded {
            // Replaced or unloaded content has to be activated again once resident.
            if self.active == Some(scene) {
                self.active = None;
            }
            return Ok(ApplyOutcome::Loading);
        }
        if !binding.is_loaded() {
            validate_binding(&*world, binding);
        }

        let outcome = if self.active == Some(scene) {
            ApplyOutcome::AlreadyActive
        } else {
            self.activate(world, scene);
            self.active = Some(scene);
            ApplyOutcome::Activated
        };

        self.apply_parameters(world, router, scene)?;
        Ok(outcome)
    }

    /// Re-runs validation of scene `index` against its resident content.
    ///
    /// Returns `Ok(false)` without checking anything if the content is not resident.
    pub fn validate_scene<W>(&mut self, world: &W, index: usize) -> Result<bool, SceneError>
    where
        W: ContentWorld + ?Sized,
    {
        let count = self.bindings.len();
        let binding = self
            .bindings
            .get_mut(index)
            .ok_or(SceneError::SceneOutOfRange {
                index: index as u32,
                count,
            })?;
        if binding.is_excluded() || binding.readiness != Readiness::Loaded {
            return Ok(false);
        }
        Ok(validate_binding(world, binding))
    }

    fn resolve_target<W>(&self, world: &W, name: &str) -> Option<BindingTarget>
    where
        W: ContentWorld + ?Sized,
    {
        let level = find_present_level(world, name);
        match self.kind {
            SceneSelectorKind::None => Some(BindingTarget::Base),
            SceneSelectorKind::StreamingLevels => level.map(BindingTarget::Level),
            SceneSelectorKind::Maps => {
                if let Some(map) = world.level_map(name) {
                    let open = world.current_map().as_deref() == Some(map.as_str());
                    Some(BindingTarget::SubLevel {
                        map,
                        level: level.filter(|_| open),
                    })
                } else if world.maps().iter().any(|map| map == name) {
                    Some(BindingTarget::Map(name.to_owned()))
                } else {
                    None
                }
            }
        }
    }

    fn activate<W>(&self, world: &mut W, scene: usize)
    where
        W: ContentWorld + ?Sized,
    {
        if self.kind == SceneSelectorKind::None {
            return;
        }
        let binding = &self.bindings[scene];
        let own = match binding.target {
            BindingTarget::Level(own)
            | BindingTarget::SubLevel {
                level: Some(own), ..
            } => Some(own),
            _ => None,
        };
        for level in world.levels() {
            world.set_level_visible(level, Some(level) == own);
        }
        log::info!("Activated scene '{}'", binding.name);
    }

    fn apply_parameters<W, R>(&self, world: &mut W, router: &R, scene: usize) -> Result<(), SceneError>
    where
        W: ContentWorld + ?Sized,
        R: Router + ?Sized,
    {
        let binding = &self.bindings[scene];
        if binding.expected_param_count == 0 {
            return Ok(());
        }
        if binding.validation != Validation::Valid {
            log::debug!(
                "Not applying parameters to scene '{}': {:?}",
                binding.name,
                binding.validation
            );
            return Ok(());
        }
        let Some(declared) = self
            .schema
            .as_ref()
            .and_then(|schema| schema.scenes.get(scene))
        else {
            return Ok(());
        };

        let mut values = vec![0.0f32; binding.expected_param_count];
        router.frame_parameters(binding.router_hash, &mut values)?;

        let mut offset = 0;
        for root in content_roots(&*world, binding) {
            let exposed = flatten_parameters(&world.exposed_parameters(root)).len();
            let end = offset + exposed;
            let (Some(parameters), Some(root_values)) =
                (declared.parameters.get(offset..end), values.get(offset..end))
            else {
                log::warn!("Content of scene '{}' changed since validation", binding.name);
                break;
            };
            apply_to_root(world, root, parameters, root_values);
            offset = end;
        }
        Ok(())
    }
}

fn apply_to_root<W>(world: &mut W, root: RootId, parameters: &[ParameterSchema], values: &[f32])
where
    W: ContentWorld + ?Sized,
{
    for (parameter, value) in parameters.iter().zip(values) {
        if !world.apply_parameter(root, &parameter.key, *value) {
            log::warn!("Parameter '{}' not found on {:?}", parameter.key, root);
        }
    }
}

/// The roots whose parameters make up a scene, shared first.
fn content_roots<W>(world: &W, binding: &ContentBinding) -> Vec<RootId>
where
    W: ContentWorld + ?Sized,
{
    let shared = match binding.target {
        BindingTarget::Map(_) | BindingTarget::SubLevel { .. } => world.shared_root(),
        _ => binding.shared_root,
    };
    let level = match binding.target {
        BindingTarget::Level(level)
        | BindingTarget::SubLevel {
            level: Some(level), ..
        } => world.level_root(level),
        _ => None,
    };
    shared.into_iter().chain(level).collect()
}

fn validate_binding<W>(world: &W, binding: &mut ContentBinding) -> bool
where
    W: ContentWorld + ?Sized,
{
    log::info!(
        "Validating schema for {} with {} parameters",
        binding.name,
        binding.expected_param_count
    );
    let exposed: Vec<ParameterSchema> = content_roots(world, binding)
        .into_iter()
        .flat_map(|root| flatten_parameters(&world.exposed_parameters(root)))
        .collect();

    binding.validation = if exposed.len() != binding.expected_param_count {
        Validation::Invalid(ValidationFailure::CountMismatch {
            expected: binding.expected_param_count,
            found: exposed.len(),
        })
    } else if schema_hash(&exposed) != binding.expected_hash {
        Validation::Invalid(ValidationFailure::ContentMismatch)
    } else {
        Validation::Valid
    };

    if let Validation::Invalid(failure) = &binding.validation {
        log::error!("Failed to validate schema for {}: {:?}", binding.name, failure);
        false
    } else {
        true
    }
}

/// Advances a binding's load state by one poll, requesting loads as needed.
fn poll_content<W>(world: &mut W, binding: &mut ContentBinding) -> Result<Readiness, SceneError>
where
    W: ContentWorld + ?Sized,
{
    match binding.target.clone() {
        BindingTarget::Base => Ok(Readiness::Loaded),
        BindingTarget::Level(mut level) => {
            if world.level_state(level) == ContentState::Gone {
                log::warn!("Level of scene '{}' is gone, resolving it again", binding.name);
                let Some(found) = find_present_level(&*world, &binding.name) else {
                    return Err(exclude(binding));
                };
                level = found;
                binding.target = BindingTarget::Level(level);
                binding.reset();
            }
            Ok(poll_level(world, binding, level))
        }
        BindingTarget::SubLevel { map, level } => {
            if world.current_map().as_deref() != Some(map.as_str()) {
                // The level went away with its map; its handle is stale from here on.
                if level.is_some() || binding.readiness == Readiness::Loaded {
                    binding.target = BindingTarget::SubLevel {
                        map: map.clone(),
                        level: None,
                    };
                    binding.reset();
                }
                return open_map(world, binding, &map);
            }

            let level = match level.filter(|level| world.level_state(*level) != ContentState::Gone) {
                Some(level) => level,
                None => {
                    let Some(found) = find_present_level(&*world, &binding.name) else {
                        log::error!("Map {} has no level named {}", map, binding.name);
                        return Err(exclude(binding));
                    };
                    if level.is_some() {
                        binding.reset();
                    }
                    binding.target = BindingTarget::SubLevel {
                        map,
                        level: Some(found),
                    };
                    binding.shared_root = world.shared_root();
                    found
                }
            };
            Ok(poll_level(world, binding, level))
        }
        BindingTarget::Map(map) => {
            if world.current_map().as_deref() == Some(map.as_str()) {
                if binding.readiness != Readiness::Loaded {
                    binding.readiness = Readiness::Loaded;
                    binding.shared_root = world.shared_root();
                }
                return Ok(binding.readiness);
            }
            if binding.readiness == Readiness::Loaded {
                binding.reset();
            }
            open_map(world, binding, &map)
        }
    }
}

fn find_present_level<W>(world: &W, name: &str) -> Option<LevelId>
where
    W: ContentWorld + ?Sized,
{
    world
        .find_level(name)
        .filter(|level| world.level_state(*level) != ContentState::Gone)
}

/// Polls a level of the current map, requesting its load while it is unloaded.
fn poll_level<W>(world: &mut W, binding: &mut ContentBinding, level: LevelId) -> Readiness
where
    W: ContentWorld + ?Sized,
{
    match world.level_state(level) {
        ContentState::Loaded => binding.readiness = Readiness::Loaded,
        ContentState::Loading => {
            binding.readiness = Readiness::Loading;
            mark_validating(binding);
        }
        ContentState::Unloaded | ContentState::Gone => {
            if binding.readiness == Readiness::Loaded {
                binding.reset();
            }
            log::info!("Loading level {}", binding.name);
            world.request_level_load(level);
            binding.readiness = Readiness::Loading;
            mark_validating(binding);
        }
    }
    binding.readiness
}

/// Keeps asking for `map` until it is the current map.
fn open_map<W>(world: &mut W, binding: &mut ContentBinding, map: &str) -> Result<Readiness, SceneError>
where
    W: ContentWorld + ?Sized,
{
    if !world.maps().iter().any(|known| known == map) {
        log::error!("Map {} of scene '{}' does not exist", map, binding.name);
        return Err(exclude(binding));
    }
    if binding.readiness != Readiness::Loading {
        log::info!("Opening map {}", map);
        binding.readiness = Readiness::Loading;
        mark_validating(binding);
    }
    world.request_map(map);
    Ok(binding.readiness)
}

fn exclude(binding: &mut ContentBinding) -> SceneError {
    binding.validation = Validation::Invalid(ValidationFailure::Unresolvable);
    SceneError::Excluded(binding.name.clone())
}

fn mark_validating(binding: &mut ContentBinding) {
    if binding.validation == Validation::Unvalidated {
        binding.validation = Validation::Validating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderlink_core::content::{ExposedParameter, ParameterKind};
    use renderlink_core::api::{RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR};
    use renderlink_core::schema::{SceneSchema, ScopedSchema};
    use renderlink_infra::{LoopbackRouter, MemoryWorld};

    use crate::generate::{generate_schema, SceneSource};

    fn connected(schema: &Schema) -> LoopbackRouter {
        let router = LoopbackRouter::new();
        router
            .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
            .unwrap();
        router.set_schema(ScopedSchema::build(schema).unwrap()).unwrap();
        router
    }

    fn float(name: &str) -> ExposedParameter {
        ExposedParameter::new("", name, ParameterKind::Float { limits: None }, vec![0.0])
    }

    fn base_and_forest() -> (MemoryWorld, Schema) {
        let mut world = MemoryWorld::new("Show");
        world.set_shared_parameters(vec![float("Exposure")]);
        world.add_level("Forest", vec![float("Fog")], false);

        let shared = flatten_parameters(&[float("Exposure")]);
        let mut forest = shared.clone();
        forest.extend(flatten_parameters(&[float("Fog")]));

        let mut schema = Schema::default();
        schema.scenes.push(SceneSchema::new("Base", shared));
        schema.scenes.push(SceneSchema::new("Forest", forest));
        (world, schema)
    }

    #[test]
    fn out_of_range_changes_nothing() {
        let (mut world, schema) = base_and_forest();
        let router = LoopbackRouter::new();
        let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
        selector.on_loaded_schema(&world, schema).unwrap();
        let before: Vec<_> = selector
            .bindings()
            .iter()
            .map(|b| (b.readiness(), b.validation().clone()))
            .collect();

        let err = selector.apply_scene(&mut world, &router, 7).unwrap_err();
        assert!(matches!(err, SceneError::SceneOutOfRange { index: 7, count: 2 }));

        let after: Vec<_> = selector
            .bindings()
            .iter()
            .map(|b| (b.readiness(), b.validation().clone()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(selector.active_scene(), None);
        assert_eq!(world.load_requests(), 0);
    }

    #[test]
    fn apply_without_schema_fails() {
        let mut world = MemoryWorld::new("Show");
        let router = LoopbackRouter::new();
        let mut selector = SceneSelector::new(SceneSelectorKind::None);
        assert!(matches!(
            selector.apply_scene(&mut world, &router, 0),
            Err(SceneError::NoSchema)
        ));
    }

    #[test]
    fn unmatched_scene_with_foreign_parameters_is_excluded() {
        let (mut world, mut schema) = base_and_forest();
        schema.scenes.push(SceneSchema::new(
            "Desert",
            flatten_parameters(&[float("Exposure"), float("Heat")]),
        ));
        let router = LoopbackRouter::new();
        let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
        selector.on_loaded_schema(&world, schema).unwrap();

        assert!(selector.binding(2).unwrap().is_excluded());
        assert!(matches!(
            selector.apply_scene(&mut world, &router, 2),
            Err(SceneError::Excluded(name)) if name == "Desert"
        ));
    }

    #[test]
    fn mismatched_content_is_marked_without_failing_the_schema() {
        let (world, mut schema) = base_and_forest();
        schema.scenes[0].parameters[0].max = 50.0;
        schema.fill_hashes();
        let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
        selector.on_loaded_schema(&world, schema).unwrap();

        assert_eq!(
            selector.binding(0).unwrap().validation(),
            &Validation::Invalid(ValidationFailure::ContentMismatch)
        );
        assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Unvalidated);
    }

    #[test]
    fn malformed_schema_is_rejected() {
        let (world, mut schema) = base_and_forest();
        schema.scenes[1].name = "Base".into();
        let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
        assert!(matches!(
            selector.on_loaded_schema(&world, schema),
            Err(SceneError::Schema(_))
        ));
        assert!(selector.schema().is_none());
    }

    #[test]
    fn none_strategy_never_touches_levels() {
        let (mut world, schema) = base_and_forest();
        let base_only = Schema {
            channels: schema.channels.clone(),
            scenes: vec![schema.scenes[0].clone()],
        };
        let forest = world.find_level("Forest").unwrap();
        world.set_level_visible(forest, true);

        let router = connected(&base_only);
        let mut selector = SceneSelector::new(SceneSelectorKind::None);
        selector
            .on_loaded_schema(&world, router.schema().unwrap())
            .unwrap();
        assert_eq!(
            selector.apply_scene(&mut world, &router, 0).unwrap(),
            ApplyOutcome::Activated
        );
        assert!(world.is_level_visible(forest));
    }

    /// "Show" with resident level "Forest", and "Stage" with level "Pit".
    fn show_and_stage() -> (MemoryWorld, LoopbackRouter, Schema) {
        let mut world = MemoryWorld::new("Show");
        world.set_load_delay(0);
        world.set_shared_parameters(vec![float("Exposure")]);
        world.add_level("Forest", vec![float("Fog")], true);
        world.add_map("Stage", vec![float("Spotlight")]);
        world.add_level_to("Stage", "Pit", vec![float("Heat")], false).unwrap();

        let channels = vec!["Main".to_string()];
        let sources = [
            SceneSource::new("Show", channels.clone(), flatten_parameters(&[float("Exposure")]))
                .with_sub_levels(vec!["Forest".into()]),
            SceneSource::new("Forest", channels.clone(), flatten_parameters(&[float("Fog")])),
            SceneSource::new("Stage", channels.clone(), flatten_parameters(&[float("Spotlight")]))
                .with_sub_levels(vec!["Pit".into()]),
            SceneSource::new("Pit", channels, flatten_parameters(&[float("Heat")])),
        ];
        let schema = generate_schema(SceneSelectorKind::Maps, None, &sources).unwrap();
        let router = connected(&schema);
        let published = router.schema().unwrap();
        (world, router, published)
    }

    #[test]
    fn maps_bind_levels_to_their_owning_map() {
        let (world, _router, schema) = show_and_stage();
        let forest = world.find_level("Forest").unwrap();
        let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
        selector.on_loaded_schema(&world, schema).unwrap();

        assert_eq!(selector.binding(0).unwrap().target(), &BindingTarget::Map("Show".into()));
        assert_eq!(
            selector.binding(1).unwrap().target(),
            &BindingTarget::SubLevel {
                map: "Show".into(),
                level: Some(forest)
            }
        );
        assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Valid);
        assert_eq!(
            selector.binding(3).unwrap().target(),
            &BindingTarget::SubLevel {
                map: "Stage".into(),
                level: None
            }
        );
        assert_eq!(selector.binding(3).unwrap().validation(), &Validation::Unvalidated);
    }

    #[test]
    fn level_is_reached_again_after_leaving_its_map() {
        let (mut world, router, schema) = show_and_stage();
        let forest = world.find_level("Forest").unwrap();
        let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
        selector.on_loaded_schema(&world, schema).unwrap();

        assert_eq!(selector.apply_scene(&mut world, &router, 1).unwrap(), ApplyOutcome::Activated);
        assert_eq!(selector.apply_scene(&mut world, &router, 2).unwrap(), ApplyOutcome::Loading);
        assert_eq!(selector.apply_scene(&mut world, &router, 2).unwrap(), ApplyOutcome::Activated);
        assert_eq!(world.current_map().as_deref(), Some("Stage"));

        assert_eq!(selector.apply_scene(&mut world, &router, 1).unwrap(), ApplyOutcome::Loading);
        assert_eq!(world.current_map().as_deref(), Some("Show"));
        assert_eq!(selector.apply_scene(&mut world, &router, 1).unwrap(), ApplyOutcome::Activated);
        assert!(!selector.binding(1).unwrap().is_excluded());
        assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Valid);
        assert!(world.is_level_visible(forest));
    }

    #[test]
    fn level_of_a_closed_map_opens_that_map_first() {
        let (mut world, router, schema) = show_and_stage();
        let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
        selector.on_loaded_schema(&world, schema).unwrap();

        assert_eq!(selector.apply_scene(&mut world, &router, 3).unwrap(), ApplyOutcome::Loading);
        assert_eq!(world.current_map().as_deref(), Some("Stage"));
        // The map is open; now the level itself streams in.
        assert_eq!(selector.apply_scene(&mut world, &router, 3).unwrap(), ApplyOutcome::Loading);
        assert_eq!(selector.apply_scene(&mut world, &router, 3).unwrap(), ApplyOutcome::Activated);

        let pit = world.find_level("Pit").unwrap();
        assert!(world.is_level_visible(pit));
        assert_eq!(selector.binding(3).unwrap().validation(), &Validation::Valid);
    }

    #[test]
    fn level_deleted_from_its_map_is_excluded() {
        let (mut world, router, schema) = show_and_stage();
        let forest = world.find_level("Forest").unwrap();
        let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
        selector.on_loaded_schema(&world, schema).unwrap();
        selector.apply_scene(&mut world, &router, 2).unwrap();
        selector.apply_scene(&mut world, &router, 2).unwrap();
        world.remove_level(forest);

        assert_eq!(selector.apply_scene(&mut world, &router, 1).unwrap(), ApplyOutcome::Loading);
        assert!(matches!(
            selector.apply_scene(&mut world, &router, 1),
            Err(SceneError::Excluded(name)) if name == "Forest"
        ));
        assert!(selector.binding(1).unwrap().is_excluded());
    }

    #[test]
    fn unknown_scene_is_not_opened_as_a_map() {
        let (mut world, _router, mut schema) = show_and_stage();
        schema.scenes.push(SceneSchema::new(
            "Ghost",
            flatten_parameters(&[float("Exposure"), float("Heat")]),
        ));
        let router = connected(&schema);
        let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
        selector
            .on_loaded_schema(&world, router.schema().unwrap())
            .unwrap();

        assert!(selector.binding(4).unwrap().is_excluded());
        assert!(matches!(
            selector.apply_scene(&mut world, &router, 4),
            Err(SceneError::Excluded(_))
        ));
        assert_eq!(world.current_map().as_deref(), Some("Show"));
        assert_eq!(world.load_requests(), 0);
    }
}
