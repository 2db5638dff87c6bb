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

//! An in-memory [`ContentWorld`].

use std::collections::HashMap;

use renderlink_core::content::{ContentState, ContentWorld, ExposedParameter, LevelId, RootId};

#[derive(Debug)]
struct MapContent {
    name: String,
    root: RootId,
    levels: Vec<LevelId>,
}

#[derive(Debug)]
struct LevelContent {
    name: String,
    map: usize,
    root: RootId,
    state: ContentState,
    resident: bool,
    visible: bool,
    remaining_ticks: u32,
}

/// Maps, streaming levels, and content roots held in memory.
///
/// Loads and map switches complete after a configurable number of
/// [`MemoryWorld::tick`] calls, standing in for the host's asynchronous loader.
#[derive(Debug)]
pub struct MemoryWorld {
    maps: Vec<MapContent>,
    current: usize,
    pending_map: Option<(usize, u32)>,
    levels: HashMap<LevelId, LevelContent>,
    roots: HashMap<RootId, Vec<ExposedParameter>>,
    load_delay: u32,
    load_requests: usize,
    next_id: u64,
}

impl MemoryWorld {
    /// Creates a world with one open map whose shared root exposes nothing.
    pub fn new(map: impl Into<String>) -> Self {
        let mut world = Self {
            maps: Vec::new(),
            current: 0,
            pending_map: None,
            levels: HashMap::new(),
            roots: HashMap::new(),
            load_delay: 1,
            load_requests: 0,
            next_id: 0,
        };
        world.add_map(map, Vec::new());
        world
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Adds a map that can be switched to.
    pub fn add_map(&mut self, name: impl Into<String>, shared: Vec<ExposedParameter>) {
        let root = RootId(self.next_id());
        self.roots.insert(root, shared);
        self.maps.push(MapContent {
            name: name.into(),
            root,
            levels: Vec::new(),
        });
    }

    /// Replaces what the current map's shared root exposes.
    pub fn set_shared_parameters(&mut self, parameters: Vec<ExposedParameter>) {
        let root = self.maps[self.current].root;
        self.roots.insert(root, parameters);
    }

    /// Adds a streaming level to the current map.
    pub fn add_level(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ExposedParameter>,
        resident: bool,
    ) -> LevelId {
        self.insert_level(self.current, name.into(), parameters, resident)
    }

    /// Adds a streaming level to the named map.
    pub fn add_level_to(
        &mut self,
        map: &str,
        name: impl Into<String>,
        parameters: Vec<ExposedParameter>,
        resident: bool,
    ) -> Option<LevelId> {
        let map = self.maps.iter().position(|m| m.name == map)?;
        Some(self.insert_level(map, name.into(), parameters, resident))
    }

    fn insert_level(
        &mut self,
        map: usize,
        name: String,
        parameters: Vec<ExposedParameter>,
        resident: bool,
    ) -> LevelId {
        let id = LevelId(self.next_id());
        let root = RootId(self.next_id());
        self.roots.insert(root, parameters);
        self.levels.insert(
            id,
            LevelContent {
                name,
                map,
                root,
                state: if resident {
                    ContentState::Loaded
                } else {
                    ContentState::Unloaded
                },
                resident,
                visible: false,
                remaining_ticks: 0,
            },
        );
        self.maps[map].levels.push(id);
        id
    }

    /// Number of ticks a load or map switch takes. `0` completes on request.
    pub fn set_load_delay(&mut self, ticks: u32) {
        self.load_delay = ticks;
    }

    /// Advances pending loads and map switches by one step.
    pub fn tick(&mut self) {
        for level in self.levels.values_mut() {
            if level.state == ContentState::Loading {
                level.remaining_ticks = level.remaining_ticks.saturating_sub(1);
                if level.remaining_ticks == 0 {
                    level.state = ContentState::Loaded;
                    log::debug!("Level {} loaded", level.name);
                }
            }
        }
        if let Some((map, remaining)) = self.pending_map.take() {
            if remaining <= 1 {
                self.open_map(map);
            } else {
                self.pending_map = Some((map, remaining - 1));
            }
        }
    }

    /// Closing a map streams its levels out; resident levels of the new map come back loaded.
    fn open_map(&mut self, map: usize) {
        let previous = self.current;
        self.current = map;
        for level in self.levels.values_mut() {
            if level.map == previous {
                level.state = ContentState::Unloaded;
                level.visible = false;
            }
            if level.map == map && level.resident {
                level.state = ContentState::Loaded;
            }
        }
        log::debug!("Opened map {}", self.maps[map].name);
    }

    /// Unloads a level, as the host would when streaming it out.
    pub fn unload_level(&mut self, id: LevelId) {
        if let Some(level) = self.levels.get_mut(&id) {
            level.state = ContentState::Unloaded;
            level.visible = false;
        }
    }

    /// Deletes a level; its handle resolves to [`ContentState::Gone`] afterwards.
    pub fn remove_level(&mut self, id: LevelId) {
        if let Some(level) = self.levels.remove(&id) {
            self.roots.remove(&level.root);
            self.maps[level.map].levels.retain(|l| *l != id);
        }
    }

    /// Whether a level is currently shown.
    pub fn is_level_visible(&self, id: LevelId) -> bool {
        self.levels.get(&id).is_some_and(|level| level.visible)
    }

    /// A property exposed by a root.
    pub fn parameter(&self, root: RootId, name: &str) -> Option<&ExposedParameter> {
        self.roots.get(&root)?.iter().find(|p| p.name == name)
    }

    /// Number of level loads and map switches requested so far.
    pub fn load_requests(&self) -> usize {
        self.load_requests
    }

    fn in_current_map(&self, id: LevelId) -> Option<&LevelContent> {
        self.levels.get(&id).filter(|level| level.map == self.current)
    }
}

impl ContentWorld for MemoryWorld {
    fn shared_root(&self) -> Option<RootId> {
        self.maps.get(self.current).map(|map| map.root)
    }

    fn find_level(&self, name: &str) -> Option<LevelId> {
        self.maps[self.current]
            .levels
            .iter()
            .copied()
            .find(|id| self.levels.get(id).is_some_and(|level| level.name == name))
    }

    fn levels(&self) -> Vec<LevelId> {
        self.maps[self.current].levels.clone()
    }

    fn level_state(&self, level: LevelId) -> ContentState {
        self.in_current_map(level)
            .map(|level| level.state)
            .unwrap_or(ContentState::Gone)
    }

    fn request_level_load(&mut self, id: LevelId) {
        self.load_requests += 1;
        let delay = self.load_delay;
        let current = self.current;
        if let Some(level) = self.levels.get_mut(&id).filter(|l| l.map == current) {
            if level.state == ContentState::Unloaded {
                log::debug!("Loading level {}", level.name);
                if delay == 0 {
                    level.state = ContentState::Loaded;
                } else {
                    level.state = ContentState::Loading;
                    level.remaining_ticks = delay;
                }
            }
        }
    }

    fn set_level_visible(&mut self, id: LevelId, visible: bool) {
        if let Some(level) = self.levels.get_mut(&id) {
            level.visible = visible;
        }
    }

    fn level_root(&self, id: LevelId) -> Option<RootId> {
        self.in_current_map(id)
            .filter(|level| level.state == ContentState::Loaded)
            .map(|level| level.root)
    }

    fn current_map(&self) -> Option<String> {
        self.maps.get(self.current).map(|map| map.name.clone())
    }

    fn request_map(&mut self, name: &str) {
        let Some(map) = self.maps.iter().position(|m| m.name == name) else {
            log::warn!("Unknown map {name}");
            return;
        };
        if map == self.current || self.pending_map.is_some_and(|(pending, _)| pending == map) {
            return;
        }
        self.load_requests += 1;
        if self.load_delay == 0 {
            self.open_map(map);
        } else {
            self.pending_map = Some((map, self.load_delay));
        }
    }

    fn maps(&self) -> Vec<String> {
        self.maps.iter().map(|map| map.name.clone()).collect()
    }

    fn level_map(&self, name: &str) -> Option<String> {
        if self.find_level(name).is_some() {
            return self.current_map();
        }
        self.levels
            .values()
            .find(|level| level.name == name)
            .map(|level| self.maps[level.map].name.clone())
    }

    fn exposed_parameters(&self, root: RootId) -> Vec<ExposedParameter> {
        self.roots.get(&root).cloned().unwrap_or_default()
    }

    fn apply_parameter(&mut self, root: RootId, key: &str, value: f32) -> bool {
        self.roots
            .get_mut(&root)
            .is_some_and(|parameters| parameters.iter_mut().any(|p| p.apply_field(key, value)))
    }
}
