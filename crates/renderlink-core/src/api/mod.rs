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

//! The contract with the external router process.
//!
//! The router is reached through a fixed table of entry points resolved from a
//! dynamically loaded library. [`Router`] is that table expressed as a trait so
//! the rest of the workspace never depends on how the entry points were bound.

mod error;
mod types;

pub use error::{RouterError, RouterResult};
pub use types::*;

use crate::schema::{Schema, ScopedSchema};

/// The entry points exposed by the router.
///
/// Implementations must be callable from the control thread and the render
/// thread at the same time.
pub trait Router: Send + Sync {
    /// Initialises the router, negotiating the protocol version.
    ///
    /// ## Errors
    /// * `RouterError::IncompatibleVersion` - The router speaks another version.
    /// * `RouterError::AlreadyInitialised` - `initialise` was called twice.
    fn initialise(&self, version_major: u32, version_minor: u32) -> RouterResult<()>;

    /// Shuts the router connection down.
    fn shutdown(&self) -> RouterResult<()>;

    /// Saves a schema for the project (or custom executable) at `asset_path`.
    ///
    /// The router reads the tree; ownership stays with the caller.
    fn save_schema(&self, asset_path: &str, schema: &ScopedSchema) -> RouterResult<()>;

    /// Loads the schema saved for `asset_path`. Ownership of the returned tree
    /// is handed to the caller.
    fn load_schema(&self, asset_path: &str) -> RouterResult<ScopedSchema>;

    /// Makes `schema` the active schema, consuming it.
    ///
    /// The router fills in the per-scene hash used by [`Router::frame_parameters`].
    ///
    /// ## Errors
    /// * `RouterError::IncorrectSchema` - The tree is malformed or incompatible.
    fn set_schema(&self, schema: ScopedSchema) -> RouterResult<()>;

    /// Returns a copy of the active schema with per-scene hashes filled in.
    fn schema(&self) -> RouterResult<Schema>;

    /// Fills `out` with the declared output streams and returns how many were written.
    ///
    /// ## Errors
    /// * `RouterError::BufferOverflow` - `out` is shorter than the number of streams;
    ///   the error carries the required length so the caller can retry.
    fn get_streams(&self, out: &mut [StreamDescription]) -> RouterResult<usize>;

    /// Marks this node as receiving frame timing through another mechanism.
    fn set_follower(&self, is_follower: bool) -> RouterResult<()>;

    /// Starts a frame in follower mode with an externally distributed tracked time.
    fn begin_follower_frame(&self, t_tracked: f64) -> RouterResult<()>;

    /// Waits up to `timeout_ms` for the timing of the next frame.
    ///
    /// ## Errors
    /// * `RouterError::Timeout` - No frame was requested in time.
    /// * `RouterError::StreamsChanged` - Stream bindings must be re-established.
    fn await_frame_data(&self, timeout_ms: u32) -> RouterResult<FrameData>;

    /// Returns the camera for `stream` in the current frame.
    fn frame_camera(&self, stream: StreamHandle) -> RouterResult<CameraData>;

    /// Hands a completed frame to the router together with the camera that produced it.
    fn send_frame(
        &self,
        stream: StreamHandle,
        frame: SenderFrame<'_>,
        response: &CameraResponse,
    ) -> RouterResult<()>;

    /// Copies the current parameter values of the scene with `schema_hash` into `out`.
    fn frame_parameters(&self, schema_hash: u64, out: &mut [f32]) -> RouterResult<()>;

    /// Posts profiling samples.
    fn send_profiling_data(&self, entries: &[ProfilingEntry]) -> RouterResult<()>;

    /// Replaces the status line shown by the router.
    fn set_status_message(&self, message: &str) -> RouterResult<()>;

    /// Writes a line into the router's log.
    fn log_to_router(&self, message: &str) -> RouterResult<()>;
}
