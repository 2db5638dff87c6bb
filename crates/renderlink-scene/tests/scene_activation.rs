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

use renderlink_core::api::{RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR};
use renderlink_core::config::SceneSelectorKind;
use renderlink_core::content::{flatten_parameters, ContentWorld, ExposedParameter, ParameterKind};
use renderlink_core::schema::{Schema, ScopedSchema};
use renderlink_core::Router;
use renderlink_infra::{LoopbackRouter, MemoryWorld};
use renderlink_scene::{
    generate_schema, ApplyOutcome, BindingTarget, Readiness, SceneSelector, SceneSource, Validation,
};

fn float(name: &str) -> ExposedParameter {
    ExposedParameter::new("Look", name, ParameterKind::Float { limits: Some((0.0, 1.0)) }, vec![0.0])
}

fn publish(schema: &Schema) -> (LoopbackRouter, Schema) {
    let router = LoopbackRouter::new();
    router
        .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
        .unwrap();
    router.set_schema(ScopedSchema::build(schema).unwrap()).unwrap();
    let published = router.schema().unwrap();
    (router, published)
}

/// A "Base" map with an unloaded "Forest" streaming level.
fn base_and_forest() -> (MemoryWorld, LoopbackRouter, Schema) {
    let mut world = MemoryWorld::new("Base");
    world.set_shared_parameters(vec![float("Exposure")]);
    world.add_level("Forest", vec![float("Fog")], false);

    let sources = [
        SceneSource::new("Base", vec!["Main".into()], flatten_parameters(&[float("Exposure")]))
            .with_sub_levels(vec!["Forest".into()]),
        SceneSource::new("Forest", vec!["Main".into()], flatten_parameters(&[float("Fog")])),
    ];
    let schema =
        generate_schema(SceneSelectorKind::StreamingLevels, Some("Base"), &sources).unwrap();
    let (router, published) = publish(&schema);
    (world, router, published)
}

#[test]
fn forest_loads_on_demand_and_replaces_base() {
    let (mut world, router, schema) = base_and_forest();
    let forest = world.find_level("Forest").unwrap();
    let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
    selector.on_loaded_schema(&world, schema.clone()).unwrap();

    let base = selector.binding(0).unwrap();
    assert!(base.is_base());
    assert_eq!(base.validation(), &Validation::Valid);
    let pending = selector.binding(1).unwrap();
    assert_eq!(pending.target(), &BindingTarget::Level(forest));
    assert_eq!(pending.validation(), &Validation::Unvalidated);
    assert_eq!(pending.readiness(), Readiness::Unloaded);

    assert_eq!(
        selector.apply_scene(&mut world, &router, 0).unwrap(),
        ApplyOutcome::Activated
    );
    assert_eq!(selector.active_scene(), Some(0));

    // First request only starts the load.
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(selector.active_scene(), Some(0));
    assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Validating);
    assert!(!world.is_level_visible(forest));

    // Polling while the load is pending neither blocks nor re-requests.
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(world.load_requests(), 1);

    world.tick();
    router.set_parameter_values(schema.scenes[1].hash, vec![0.25, 0.75]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert_eq!(selector.active_scene(), Some(1));
    assert!(selector.binding(1).unwrap().is_loaded());
    assert!(world.is_level_visible(forest));

    let shared = world.shared_root().unwrap();
    let level_root = world.level_root(forest).unwrap();
    approx::assert_relative_eq!(world.parameter(shared, "Exposure").unwrap().value[0], 0.25);
    approx::assert_relative_eq!(world.parameter(level_root, "Fog").unwrap().value[0], 0.75);

    // Re-applying is not a new activation, and going back hides the level.
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::AlreadyActive
    );
    assert_eq!(
        selector.apply_scene(&mut world, &router, 0).unwrap(),
        ApplyOutcome::Activated
    );
    assert!(!world.is_level_visible(forest));
}

#[test]
fn a_replaced_level_is_found_again_by_name() {
    let (mut world, router, schema) = base_and_forest();
    world.set_load_delay(0);
    let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
    selector.on_loaded_schema(&world, schema).unwrap();

    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );

    let old = world.find_level("Forest").unwrap();
    world.remove_level(old);
    let new = world.add_level("Forest", vec![float("Fog")], false);

    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(selector.binding(1).unwrap().target(), &BindingTarget::Level(new));
    assert_eq!(selector.active_scene(), None);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert!(world.is_level_visible(new));
    assert!(selector.binding(1).unwrap().is_loaded());
}

#[test]
fn unloaded_level_is_loaded_again_before_use() {
    let (mut world, router, schema) = base_and_forest();
    world.set_load_delay(0);
    let forest = world.find_level("Forest").unwrap();
    let mut selector = SceneSelector::new(SceneSelectorKind::StreamingLevels);
    selector.on_loaded_schema(&world, schema).unwrap();
    selector.apply_scene(&mut world, &router, 1).unwrap();
    selector.apply_scene(&mut world, &router, 1).unwrap();

    world.unload_level(forest);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(world.load_requests(), 2);
    assert!(!selector.validate_scene(&world, 1).unwrap());
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert!(world.is_level_visible(forest));
    assert!(selector.validate_scene(&world, 1).unwrap());
}

#[test]
fn maps_strategy_switches_maps() {
    let mut world = MemoryWorld::new("Show");
    world.set_shared_parameters(vec![float("Exposure")]);
    world.add_map("Stage", vec![float("Spotlight"), float("Haze")]);

    let sources = [
        SceneSource::new("Show", vec!["Main".into()], flatten_parameters(&[float("Exposure")])),
        SceneSource::new(
            "Stage",
            vec!["Main".into(), "Side".into()],
            flatten_parameters(&[float("Spotlight"), float("Haze")]),
        ),
    ];
    let schema = generate_schema(SceneSelectorKind::Maps, None, &sources).unwrap();
    assert_eq!(schema.channels.len(), 2);
    let (router, schema) = publish(&schema);

    let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
    selector.on_loaded_schema(&world, schema.clone()).unwrap();
    assert_eq!(selector.binding(0).unwrap().validation(), &Validation::Valid);
    assert_eq!(
        selector.binding(1).unwrap().target(),
        &BindingTarget::Map("Stage".into())
    );
    assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Unvalidated);

    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(world.current_map().as_deref(), Some("Show"));
    world.tick();
    assert_eq!(world.current_map().as_deref(), Some("Stage"));

    router.set_parameter_values(schema.scenes[1].hash, vec![0.5, 0.125]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert_eq!(selector.binding(1).unwrap().validation(), &Validation::Valid);
    let stage_root = world.shared_root().unwrap();
    approx::assert_relative_eq!(world.parameter(stage_root, "Haze").unwrap().value[0], 0.125);
}

#[test]
fn maps_tour_through_levels_of_both_maps() {
    let mut world = MemoryWorld::new("Show");
    world.set_shared_parameters(vec![float("Exposure")]);
    let forest = world.add_level("Forest", vec![float("Fog")], true);
    world.add_map("Stage", vec![float("Spotlight"), float("Haze")]);
    world.add_level_to("Stage", "Pit", vec![float("Heat")], false).unwrap();

    let channels = vec!["Main".to_string()];
    let sources = [
        SceneSource::new("Show", channels.clone(), flatten_parameters(&[float("Exposure")]))
            .with_sub_levels(vec!["Forest".into()]),
        SceneSource::new("Forest", channels.clone(), flatten_parameters(&[float("Fog")])),
        SceneSource::new(
            "Stage",
            channels.clone(),
            flatten_parameters(&[float("Spotlight"), float("Haze")]),
        )
        .with_sub_levels(vec!["Pit".into()]),
        SceneSource::new("Pit", channels, flatten_parameters(&[float("Heat")])),
    ];
    let schema = generate_schema(SceneSelectorKind::Maps, None, &sources).unwrap();
    assert_eq!(schema.scenes[3].parameters.len(), 3);
    let (router, schema) = publish(&schema);

    let mut selector = SceneSelector::new(SceneSelectorKind::Maps);
    selector.on_loaded_schema(&world, schema.clone()).unwrap();

    // Show -> Forest: resident level of the open map.
    router.set_parameter_values(schema.scenes[1].hash, vec![0.25, 0.5]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert!(world.is_level_visible(forest));
    let show_root = world.shared_root().unwrap();
    approx::assert_relative_eq!(world.parameter(show_root, "Exposure").unwrap().value[0], 0.25);
    let forest_root = world.level_root(forest).unwrap();
    approx::assert_relative_eq!(world.parameter(forest_root, "Fog").unwrap().value[0], 0.5);

    // Forest -> Stage: another map.
    router.set_parameter_values(schema.scenes[2].hash, vec![0.75, 0.125]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 2).unwrap(),
        ApplyOutcome::Loading
    );
    world.tick();
    assert_eq!(
        selector.apply_scene(&mut world, &router, 2).unwrap(),
        ApplyOutcome::Activated
    );
    assert!(!world.is_level_visible(forest));
    let stage_root = world.shared_root().unwrap();
    approx::assert_relative_eq!(world.parameter(stage_root, "Spotlight").unwrap().value[0], 0.75);
    approx::assert_relative_eq!(world.parameter(stage_root, "Haze").unwrap().value[0], 0.125);

    // Stage -> Forest: the old map is reopened and its level found again.
    router.set_parameter_values(schema.scenes[1].hash, vec![0.5, 1.0]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Loading
    );
    assert_eq!(world.current_map().as_deref(), Some("Stage"));
    world.tick();
    assert_eq!(
        selector.apply_scene(&mut world, &router, 1).unwrap(),
        ApplyOutcome::Activated
    );
    assert_eq!(selector.active_scene(), Some(1));
    assert!(world.is_level_visible(forest));
    approx::assert_relative_eq!(world.parameter(show_root, "Exposure").unwrap().value[0], 0.5);
    let forest_root = world.level_root(forest).unwrap();
    approx::assert_relative_eq!(world.parameter(forest_root, "Fog").unwrap().value[0], 1.0);

    // Forest -> Pit: open Stage, then stream the level in.
    router.set_parameter_values(schema.scenes[3].hash, vec![0.25, 0.5, 0.875]);
    assert_eq!(
        selector.apply_scene(&mut world, &router, 3).unwrap(),
        ApplyOutcome::Loading
    );
    world.tick();
    assert_eq!(world.current_map().as_deref(), Some("Stage"));
    assert_eq!(
        selector.apply_scene(&mut world, &router, 3).unwrap(),
        ApplyOutcome::Loading
    );
    world.tick();
    assert_eq!(
        selector.apply_scene(&mut world, &router, 3).unwrap(),
        ApplyOutcome::Activated
    );
    let pit = world.find_level("Pit").unwrap();
    assert!(world.is_level_visible(pit));
    assert_eq!(selector.binding(3).unwrap().validation(), &Validation::Valid);
    approx::assert_relative_eq!(world.parameter(stage_root, "Spotlight").unwrap().value[0], 0.25);
    approx::assert_relative_eq!(world.parameter(stage_root, "Haze").unwrap().value[0], 0.5);
    let pit_root = world.level_root(pit).unwrap();
    approx::assert_relative_eq!(world.parameter(pit_root, "Heat").unwrap().value[0], 0.875);
}
