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

use renderlink_core::schema::SchemaError;
use renderlink_core::RouterError;
use thiserror::Error;

/// An error raised by scene selection.
#[derive(Debug, Error)]
pub enum SceneError {
    /// The router asked for a scene the schema does not declare.
    #[error("scene index {index} is out of range ({count} scenes)")]
    SceneOutOfRange {
        /// The requested index.
        index: u32,
        /// Number of scenes in the schema.
        count: usize,
    },
    /// No schema has been loaded yet.
    #[error("no schema loaded")]
    NoSchema,
    /// The scene's content cannot be resolved and it was excluded from activation.
    #[error("scene '{0}' has no resolvable content")]
    Excluded(String),
    /// The schema is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Reading parameter values from the router failed.
    #[error("router error: {0}")]
    Router(#[from] RouterError),
}
