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

//! # RenderLink Core
//!
//! Foundational crate containing the contract with the external router process,
//! the schema ownership model, and the traits of the host collaborators
//! (content world and frame device) that the higher-level crates drive.

#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod content;
pub mod device;
pub mod schema;

pub use api::{Router, RouterError, RouterResult};
pub use config::RenderLinkSettings;
pub use schema::{ParameterSchema, SceneSchema, Schema, ScopedSchema};
