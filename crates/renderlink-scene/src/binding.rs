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

use renderlink_core::content::{LevelId, RootId};
use renderlink_core::schema::{schema_hash, SceneSchema};

/// What local content a scene resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    /// The shared root alone; always resident.
    Base,
    /// A streaming level of the current map.
    Level(LevelId),
    /// A whole map, activated by switching to it.
    Map(String),
    /// A streaming level of `map`, reached by opening `map` first.
    ///
    /// `level` is resolved by name each time `map` becomes the current map.
    SubLevel {
        /// The map owning the level.
        map: String,
        /// The level's handle while `map` is open.
        level: Option<LevelId>,
    },
}

/// Validation progress of a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Content has not been checked yet.
    Unvalidated,
    /// A load was requested; the check runs once it completes.
    Validating,
    /// The content exposes exactly the declared parameters.
    Valid,
    /// The content does not match the declaration.
    Invalid(ValidationFailure),
}

/// Why a binding failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// No local content matches the scene; it is excluded from activation.
    Unresolvable,
    /// The content exposes a different number of parameters.
    CountMismatch {
        /// Parameters declared by the schema.
        expected: usize,
        /// Parameters exposed by the content.
        found: usize,
    },
    /// Same count, but keys, ranges, or options differ.
    ContentMismatch,
}

/// Residency of a binding's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Not resident.
    Unloaded,
    /// Requested, not resident yet.
    Loading,
    /// Resident.
    Loaded,
}

/// Associates one scene of the schema with local content.
#[derive(Debug, Clone)]
pub struct ContentBinding {
    pub(crate) name: String,
    pub(crate) target: BindingTarget,
    pub(crate) shared_root: Option<RootId>,
    pub(crate) readiness: Readiness,
    pub(crate) validation: Validation,
    pub(crate) expected_param_count: usize,
    pub(crate) expected_hash: u64,
    pub(crate) router_hash: u64,
}

impl ContentBinding {
    pub(crate) fn new(scene: &SceneSchema, target: BindingTarget, shared_root: Option<RootId>) -> Self {
        let readiness = match target {
            BindingTarget::Base => Readiness::Loaded,
            _ => Readiness::Unloaded,
        };
        Self {
            name: scene.name.clone(),
            target,
            shared_root,
            readiness,
            validation: Validation::Unvalidated,
            expected_param_count: scene.parameters.len(),
            expected_hash: schema_hash(&scene.parameters),
            router_hash: scene.hash,
        }
    }

    /// Forgets everything learned about the content, e.g. after it was unloaded.
    pub(crate) fn reset(&mut self) {
        self.readiness = match self.target {
            BindingTarget::Base => Readiness::Loaded,
            _ => Readiness::Unloaded,
        };
        self.validation = Validation::Unvalidated;
    }

    /// The scene name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The content the scene resolves to.
    pub fn target(&self) -> &BindingTarget {
        &self.target
    }

    /// The root shared by every scene, if the world has one.
    pub fn shared_root(&self) -> Option<RootId> {
        self.shared_root
    }

    /// Residency of the content.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Validation state.
    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    /// `true` once the content is resident and has been validated at least once.
    pub fn is_loaded(&self) -> bool {
        self.readiness == Readiness::Loaded
            && matches!(self.validation, Validation::Valid | Validation::Invalid(_))
    }

    /// `true` if the scene cannot be activated at all.
    pub fn is_excluded(&self) -> bool {
        self.validation == Validation::Invalid(ValidationFailure::Unresolvable)
    }

    /// `true` if the scene is the shared root alone.
    pub fn is_base(&self) -> bool {
        self.target == BindingTarget::Base
    }

    /// Number of parameters the schema declares for this scene.
    pub fn expected_param_count(&self) -> usize {
        self.expected_param_count
    }

    /// Content hash of the declared parameters.
    pub fn expected_hash(&self) -> u64 {
        self.expected_hash
    }

    /// The hash the router keys this scene's parameter values by.
    pub fn router_hash(&self) -> u64 {
        self.router_hash
    }
}
