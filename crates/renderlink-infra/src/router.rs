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

//! An in-process router.
//!
//! [`LoopbackRouter`] implements the full [`Router`] surface without an external
//! process. The "router side" is driven through its inherent methods: declare
//! streams, request frames, set cameras and parameter values, then inspect the
//! frames, status lines, and profiling entries it received.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use renderlink_core::api::{
    CameraData, CameraResponse, FrameData, FrameType, ProfilingEntry, Router, RouterError,
    RouterResult, SenderFrame, StreamDescription, StreamHandle, RENDER_STREAM_VERSION_MAJOR,
    RENDER_STREAM_VERSION_MINOR,
};
use renderlink_core::schema::{Schema, ScopedSchema};

/// Extension appended to the asset path when persisting a schema.
pub const SCHEMA_FILE_SUFFIX: &str = ".rlschema.json";

/// A frame received through [`Router::send_frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    /// The stream the frame was sent on.
    pub stream: StreamHandle,
    /// The payload kind.
    pub frame_type: FrameType,
    /// The fence value the frame was tagged with, for fenced textures.
    pub fence_value: Option<u64>,
    /// The camera and timing that produced the frame.
    pub response: CameraResponse,
    /// The pixels, for host-memory frames.
    pub pixels: Option<Vec<u8>>,
}

#[derive(Debug)]
enum FrameEvent {
    Frame(FrameData),
    StreamsChanged,
}

#[derive(Debug, Default)]
struct LoopbackState {
    initialised: bool,
    follower: bool,
    last_scene: u32,
    schema: Schema,
    streams: Vec<StreamDescription>,
    next_handle: StreamHandle,
    cameras: HashMap<StreamHandle, CameraData>,
    parameters: HashMap<u64, Vec<f32>>,
    sent: Vec<SentFrame>,
    profiling: Vec<ProfilingEntry>,
    status: Vec<String>,
    log: Vec<String>,
}

impl LoopbackState {
    fn ensure_initialised(&self) -> RouterResult<()> {
        if self.initialised {
            Ok(())
        } else {
            Err(RouterError::NotInitialised)
        }
    }

    fn ensure_stream(&self, stream: StreamHandle) -> RouterResult<()> {
        if self.streams.iter().any(|s| s.handle == stream) {
            Ok(())
        } else {
            Err(RouterError::InvalidHandle)
        }
    }
}

/// A router living in the same process.
#[derive(Debug)]
pub struct LoopbackRouter {
    state: Mutex<LoopbackState>,
    frames_tx: Sender<FrameEvent>,
    frames_rx: Receiver<FrameEvent>,
}

impl Default for LoopbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRouter {
    /// Creates an uninitialised router with no streams.
    pub fn new() -> Self {
        let (frames_tx, frames_rx) = flume::unbounded();
        Self {
            state: Mutex::new(LoopbackState {
                next_handle: 1,
                ..Default::default()
            }),
            frames_tx,
            frames_rx,
        }
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares an output stream and returns its handle.
    pub fn add_stream(&self, mut description: StreamDescription) -> StreamHandle {
        let mut state = self.state();
        let handle = state.next_handle;
        state.next_handle += 1;
        description.handle = handle;
        log::debug!("Loopback router declared stream '{}' ({handle})", description.name);
        state.streams.push(description);
        handle
    }

    /// Removes every stream and tells the next frame wait that bindings changed.
    pub fn replace_streams(&self, descriptions: Vec<StreamDescription>) -> Vec<StreamHandle> {
        self.state().streams.clear();
        let handles = descriptions.into_iter().map(|d| self.add_stream(d)).collect();
        let _ = self.frames_tx.send(FrameEvent::StreamsChanged);
        handles
    }

    /// Queues the timing of the next frame to render.
    pub fn request_frame(&self, frame: FrameData) {
        self.state().last_scene = frame.scene;
        let _ = self.frames_tx.send(FrameEvent::Frame(frame));
    }

    /// Sets the camera returned for `stream` from now on.
    pub fn set_camera(&self, stream: StreamHandle, camera: CameraData) {
        self.state().cameras.insert(stream, camera);
    }

    /// Sets the parameter values of the scene with `schema_hash`.
    pub fn set_parameter_values(&self, schema_hash: u64, values: Vec<f32>) {
        self.state().parameters.insert(schema_hash, values);
    }

    /// Frames received so far.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.state().sent.clone()
    }

    /// Status lines received so far.
    pub fn status_messages(&self) -> Vec<String> {
        self.state().status.clone()
    }

    /// Profiling entries received so far.
    pub fn profiling_entries(&self) -> Vec<ProfilingEntry> {
        self.state().profiling.clone()
    }

    /// Lines written into the router log.
    pub fn log_lines(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Whether the node is in follower mode.
    pub fn is_follower(&self) -> bool {
        self.state().follower
    }

    /// Whether `initialise` succeeded and `shutdown` was not called since.
    pub fn is_initialised(&self) -> bool {
        self.state().initialised
    }

    fn schema_file(asset_path: &str) -> PathBuf {
        PathBuf::from(format!("{asset_path}{SCHEMA_FILE_SUFFIX}"))
    }
}

impl Router for LoopbackRouter {
    fn initialise(&self, version_major: u32, version_minor: u32) -> RouterResult<()> {
        if version_major != RENDER_STREAM_VERSION_MAJOR || version_minor > RENDER_STREAM_VERSION_MINOR {
            return Err(RouterError::IncompatibleVersion);
        }
        let mut state = self.state();
        if state.initialised {
            return Err(RouterError::AlreadyInitialised);
        }
        state.initialised = true;
        log::info!("Loopback router initialised ({version_major}.{version_minor})");
        Ok(())
    }

    fn shutdown(&self) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        state.initialised = false;
        state.follower = false;
        Ok(())
    }

    fn save_schema(&self, asset_path: &str, schema: &ScopedSchema) -> RouterResult<()> {
        self.state().ensure_initialised()?;
        let schema = schema.to_schema().map_err(|_| RouterError::IncorrectSchema)?;
        let json = schema
            .to_json()
            .map_err(|e| RouterError::Unspecified(e.to_string()))?;
        let path = Self::schema_file(asset_path);
        std::fs::write(&path, json).map_err(|e| RouterError::Unspecified(e.to_string()))?;
        log::info!("Saved schema to {}", path.display());
        Ok(())
    }

    fn load_schema(&self, asset_path: &str) -> RouterResult<ScopedSchema> {
        self.state().ensure_initialised()?;
        let path = Self::schema_file(asset_path);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RouterError::NotFound,
            _ => RouterError::Unspecified(e.to_string()),
        })?;
        let schema = Schema::from_json(&text).map_err(|_| RouterError::IncorrectSchema)?;
        ScopedSchema::build(&schema).map_err(|_| RouterError::IncorrectSchema)
    }

    fn set_schema(&self, schema: ScopedSchema) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        let mut schema = schema.to_schema().map_err(|_| RouterError::IncorrectSchema)?;
        if let Err(e) = schema.validate() {
            log::error!("Loopback router rejected schema: {e}");
            return Err(RouterError::IncorrectSchema);
        }
        schema.fill_hashes();
        log::info!("Loopback router schema set with {} scenes", schema.scenes.len());
        state.schema = schema;
        Ok(())
    }

    fn schema(&self) -> RouterResult<Schema> {
        let state = self.state();
        state.ensure_initialised()?;
        Ok(state.schema.clone())
    }

    fn get_streams(&self, out: &mut [StreamDescription]) -> RouterResult<usize> {
        let state = self.state();
        state.ensure_initialised()?;
        let required = state.streams.len();
        if out.len() < required {
            return Err(RouterError::BufferOverflow { required });
        }
        out[..required].clone_from_slice(&state.streams);
        Ok(required)
    }

    fn set_follower(&self, is_follower: bool) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        state.follower = is_follower;
        Ok(())
    }

    fn begin_follower_frame(&self, t_tracked: f64) -> RouterResult<()> {
        let state = self.state();
        state.ensure_initialised()?;
        if !state.follower {
            return Err(RouterError::InvalidParameters);
        }
        let frame = FrameData {
            t_tracked,
            scene: state.last_scene,
            ..Default::default()
        };
        drop(state);
        let _ = self.frames_tx.send(FrameEvent::Frame(frame));
        Ok(())
    }

    fn await_frame_data(&self, timeout_ms: u32) -> RouterResult<FrameData> {
        self.state().ensure_initialised()?;
        // The lock is not held while waiting so the controlling side can feed frames.
        match self
            .frames_rx
            .recv_timeout(Duration::from_millis(u64::from(timeout_ms)))
        {
            Ok(FrameEvent::Frame(frame)) => Ok(frame),
            Ok(FrameEvent::StreamsChanged) => Err(RouterError::StreamsChanged),
            Err(RecvTimeoutError::Timeout) => Err(RouterError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RouterError::Unspecified("frame source disconnected".into()))
            }
        }
    }

    fn frame_camera(&self, stream: StreamHandle) -> RouterResult<CameraData> {
        let state = self.state();
        state.ensure_initialised()?;
        state.ensure_stream(stream)?;
        Ok(state.cameras.get(&stream).copied().unwrap_or(CameraData {
            id: stream,
            ..Default::default()
        }))
    }

    fn send_frame(
        &self,
        stream: StreamHandle,
        frame: SenderFrame<'_>,
        response: &CameraResponse,
    ) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        state.ensure_stream(stream)?;
        let (fence_value, pixels) = match frame {
            SenderFrame::HostMemory { data, .. } => (None, Some(data.to_vec())),
            SenderFrame::SharedTexture { .. } => (None, None),
            SenderFrame::FencedTexture { fence_value, .. } => (Some(fence_value), None),
        };
        state.sent.push(SentFrame {
            stream,
            frame_type: frame.frame_type(),
            fence_value,
            response: *response,
            pixels,
        });
        Ok(())
    }

    fn frame_parameters(&self, schema_hash: u64, out: &mut [f32]) -> RouterResult<()> {
        let state = self.state();
        state.ensure_initialised()?;
        let scene = state
            .schema
            .scenes
            .iter()
            .find(|scene| scene.hash == schema_hash)
            .ok_or(RouterError::NotFound)?;
        if out.len() != scene.parameters.len() {
            return Err(RouterError::InvalidParameters);
        }
        match state.parameters.get(&schema_hash) {
            Some(values) if values.len() == out.len() => out.copy_from_slice(values),
            _ => {
                for (slot, parameter) in out.iter_mut().zip(&scene.parameters) {
                    *slot = parameter.default_value;
                }
            }
        }
        Ok(())
    }

    fn send_profiling_data(&self, entries: &[ProfilingEntry]) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        state.profiling.extend_from_slice(entries);
        Ok(())
    }

    fn set_status_message(&self, message: &str) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        log::debug!("Loopback router status: {message}");
        state.status.push(message.to_owned());
        Ok(())
    }

    fn log_to_router(&self, message: &str) -> RouterResult<()> {
        let mut state = self.state();
        state.ensure_initialised()?;
        state.log.push(message.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderlink_core::schema::{ParameterSchema, SceneSchema};

    fn connected() -> LoopbackRouter {
        let router = LoopbackRouter::new();
        router
            .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
            .unwrap();
        router
    }

    fn schema() -> Schema {
        let mut schema = Schema::default();
        schema.channels.insert("Front".into());
        schema.scenes.push(SceneSchema::new(
            "Main",
            vec![ParameterSchema::numeric("", "Fog", "Fog", 0.0, 1.0, 0.001, 0.25)],
        ));
        schema
    }

    #[test]
    fn version_negotiation() {
        let router = LoopbackRouter::new();
        assert_eq!(router.initialise(2, 0), Err(RouterError::IncompatibleVersion));
        assert_eq!(
            router.initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR + 1),
            Err(RouterError::IncompatibleVersion)
        );
        assert!(router.initialise(1, 20).is_ok());
        assert_eq!(router.initialise(1, 20), Err(RouterError::AlreadyInitialised));
    }

    #[test]
    fn calls_before_initialise_fail() {
        let router = LoopbackRouter::new();
        assert_eq!(router.schema(), Err(RouterError::NotInitialised));
        assert_eq!(router.await_frame_data(0), Err(RouterError::NotInitialised));
    }

    #[test]
    fn get_streams_reports_required_size() {
        let router = connected();
        router.add_stream(StreamDescription {
            name: "A".into(),
            ..Default::default()
        });
        router.add_stream(StreamDescription {
            name: "B".into(),
            ..Default::default()
        });

        let mut small = vec![StreamDescription::default(); 1];
        assert_eq!(
            router.get_streams(&mut small),
            Err(RouterError::BufferOverflow { required: 2 })
        );
        let mut out = vec![StreamDescription::default(); 2];
        assert_eq!(router.get_streams(&mut out), Ok(2));
        assert_eq!(out[1].name, "B");
        assert_eq!(out[1].handle, 2);
    }

    #[test]
    fn frame_parameters_fall_back_to_defaults() {
        let router = connected();
        router.set_schema(ScopedSchema::build(&schema()).unwrap()).unwrap();
        let hash = router.schema().unwrap().scenes[0].hash;

        let mut values = [0.0f32; 1];
        router.frame_parameters(hash, &mut values).unwrap();
        assert_eq!(values, [0.25]);

        router.set_parameter_values(hash, vec![0.75]);
        router.frame_parameters(hash, &mut values).unwrap();
        assert_eq!(values, [0.75]);

        assert_eq!(
            router.frame_parameters(hash, &mut [0.0; 3]),
            Err(RouterError::InvalidParameters)
        );
        assert_eq!(
            router.frame_parameters(hash ^ 1, &mut values),
            Err(RouterError::NotFound)
        );
    }

    #[test]
    fn await_frame_data_times_out_and_reports_stream_changes() {
        let router = connected();
        assert_eq!(router.await_frame_data(1), Err(RouterError::Timeout));

        router.request_frame(FrameData {
            t_tracked: 1.5,
            scene: 1,
            ..Default::default()
        });
        assert_eq!(router.await_frame_data(1).unwrap().scene, 1);

        router.replace_streams(vec![]);
        assert_eq!(router.await_frame_data(1), Err(RouterError::StreamsChanged));
    }

    #[test]
    fn schema_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("Show.uproject");
        let asset = asset.to_str().unwrap();
        let router = connected();

        let mut original = schema();
        original.fill_hashes();
        router
            .save_schema(asset, &ScopedSchema::build(&original).unwrap())
            .unwrap();
        let loaded = router.load_schema(asset).unwrap().to_schema().unwrap();
        assert_eq!(loaded, original);

        assert!(matches!(
            router.load_schema(dir.path().join("Missing").to_str().unwrap()),
            Err(RouterError::NotFound)
        ));
    }
}
