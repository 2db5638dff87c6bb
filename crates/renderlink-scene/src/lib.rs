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

//! # RenderLink Scene
//!
//! Maps the scenes a router declares onto the host's local content and keeps
//! them activated as the router switches between them.
//!
//! The [`SceneSelector`] is driven once per frame from the render loop. Content
//! loading is cooperative: a call that needs content not yet resident asks for
//! it and returns, and a later call finds it loaded and carries on.

#![warn(missing_docs)]

mod binding;
mod error;
pub mod generate;
mod selector;

pub use binding::{BindingTarget, ContentBinding, Readiness, Validation, ValidationFailure};
pub use error::SceneError;
pub use generate::{generate_schema, SceneSource};
pub use selector::{ApplyOutcome, SceneSelector};
