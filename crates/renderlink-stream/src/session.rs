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

//! The connection to the router for the lifetime of a show.

use std::sync::Arc;

use renderlink_core::api::{
    FrameData, ProfilingEntry, StreamDescription, RENDER_STREAM_VERSION_MAJOR,
    RENDER_STREAM_VERSION_MINOR,
};
use renderlink_core::config::FrameWaitMode;
use renderlink_core::device::FrameDevice;
use renderlink_core::{RenderLinkSettings, Router, RouterError, Schema, ScopedSchema};

use crate::endpoint::StreamEndpoint;
use crate::error::SessionError;

/// How often the two-phase stream query is retried when the stream set
/// changes between the size query and the fill.
const MAX_ENUMERATION_ATTEMPTS: usize = 4;

/// Severity of a status line posted to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Everything is running.
    Green,
    /// Degraded but running.
    Orange,
    /// Failed; operator action needed.
    Red,
}

/// The timing the render path should use for the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameTiming {
    /// The router delivered frame data.
    Fresh(FrameData),
    /// The wait timed out; the last frame data is reused.
    Reused(FrameData),
    /// The wait timed out before any frame data was ever received.
    Idle,
}

impl FrameTiming {
    /// The frame data to render with, if any.
    pub fn frame_data(&self) -> Option<&FrameData> {
        match self {
            FrameTiming::Fresh(data) | FrameTiming::Reused(data) => Some(data),
            FrameTiming::Idle => None,
        }
    }

    /// The scene index the router asked for.
    pub fn scene(&self) -> Option<u32> {
        self.frame_data().map(|data| data.scene)
    }
}

/// An initialised connection to the router.
///
/// The session is shared by the control path (frame timing, schema, status)
/// and owns no per-stream state; that lives in [`StreamEndpoint`]s.
#[derive(Debug)]
pub struct RenderSession<R: Router> {
    router: Arc<R>,
    settings: RenderLinkSettings,
    last_frame: Option<FrameData>,
    follower: bool,
}

impl<R: Router> RenderSession<R> {
    /// Initialises the router with this build's protocol version.
    ///
    /// ## Errors
    /// * `SessionError::Protocol` - The router speaks another protocol version.
    /// * `SessionError::Router` - Any other initialisation failure.
    pub fn connect(router: Arc<R>, settings: RenderLinkSettings) -> Result<Self, SessionError> {
        match router.initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR) {
            Ok(()) => log::info!(
                "Connected to router (protocol {RENDER_STREAM_VERSION_MAJOR}.{RENDER_STREAM_VERSION_MINOR})"
            ),
            Err(RouterError::AlreadyInitialised) => {
                log::debug!("Router was already initialised");
            }
            Err(e) => {
                log::error!("Failed to initialise router: {e}");
                return Err(e.into());
            }
        }
        Ok(Self {
            router,
            settings,
            last_frame: None,
            follower: false,
        })
    }

    /// The router this session talks to.
    pub fn router(&self) -> &Arc<R> {
        &self.router
    }

    /// The settings the session was connected with.
    pub fn settings(&self) -> &RenderLinkSettings {
        &self.settings
    }

    /// Lists the output streams the router declares.
    pub fn enumerate_streams(&self) -> Result<Vec<StreamDescription>, SessionError> {
        let mut streams = Vec::new();
        for _ in 0..MAX_ENUMERATION_ATTEMPTS {
            match self.router.get_streams(&mut streams) {
                Ok(count) => {
                    streams.truncate(count);
                    log::info!("Router declares {count} streams");
                    return Ok(streams);
                }
                Err(RouterError::BufferOverflow { required }) => {
                    log::trace!("Stream buffer too small, {required} required");
                    streams.resize_with(required, StreamDescription::default);
                }
                Err(e) => return Err(e.into()),
            }
        }
        log::warn!("Stream set kept changing during enumeration");
        Err(SessionError::Router(RouterError::BufferOverflow {
            required: streams.len(),
        }))
    }

    /// Opens one endpoint per stream on `device`.
    ///
    /// A stream that cannot be set up fails the whole call and is reported to
    /// the operator as a red status.
    pub fn open_endpoints(
        &self,
        device: Arc<dyn FrameDevice>,
        streams: Vec<StreamDescription>,
    ) -> Result<Vec<StreamEndpoint>, SessionError> {
        let mut endpoints = Vec::with_capacity(streams.len());
        for stream in streams {
            let name = stream.name.clone();
            match StreamEndpoint::open(device.clone(), stream, &self.settings) {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => {
                    self.post_status(StatusLevel::Red, "Error: Unable to create stream");
                    return Err(SessionError::Config(format!("stream '{name}': {e}")));
                }
            }
        }
        self.post_status(StatusLevel::Green, "Connected to stream");
        Ok(endpoints)
    }

    /// Hands `schema` to the router and returns it with the router's scene hashes.
    ///
    /// ## Errors
    /// * `SessionError::Config` - The schema cannot be transferred or the router rejected it.
    pub fn publish_schema(&self, schema: &Schema) -> Result<Schema, SessionError> {
        let mut scoped =
            ScopedSchema::build(schema).map_err(|e| SessionError::Config(e.to_string()))?;
        match self.router.set_schema(scoped.take()) {
            Ok(()) => {}
            Err(RouterError::IncorrectSchema) => {
                log::error!("Router rejected the schema");
                return Err(SessionError::Config("router rejected the schema".into()));
            }
            Err(e) => return Err(e.into()),
        }
        let published = self.router.schema()?;
        log::info!(
            "Published schema with {} scenes and {} channels",
            published.scenes.len(),
            published.channels.len()
        );
        Ok(published)
    }

    fn schema_path(&self) -> Result<&str, SessionError> {
        let path = self
            .settings
            .schema_path
            .as_deref()
            .ok_or_else(|| SessionError::Config("no schema path configured".into()))?;
        path.to_str()
            .ok_or_else(|| SessionError::Config(format!("schema path {} is not UTF-8", path.display())))
    }

    /// Persists `schema` at the configured project path.
    pub fn save_schema(&self, schema: &Schema) -> Result<(), SessionError> {
        let path = self.schema_path()?;
        let scoped = ScopedSchema::build(schema).map_err(|e| SessionError::Config(e.to_string()))?;
        self.router.save_schema(path, &scoped)?;
        log::debug!("Saved schema to {path}");
        Ok(())
    }

    /// Reads the schema persisted at the configured project path.
    pub fn load_schema(&self) -> Result<Schema, SessionError> {
        let path = self.schema_path()?;
        let scoped = self.router.load_schema(path)?;
        scoped
            .to_schema()
            .map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Switches follower mode, where frame timing is driven by this node.
    pub fn set_follower(&mut self, follower: bool) -> Result<(), SessionError> {
        self.router.set_follower(follower)?;
        self.follower = follower;
        Ok(())
    }

    /// Waits for the timing of the next frame.
    ///
    /// Interactive sessions poll without waiting; synchronised ones wait up to
    /// the configured budget. A timeout is not an error: the last frame data
    /// is reused.
    ///
    /// ## Errors
    /// * `SessionError::Protocol` - Streams changed or the version is incompatible;
    ///   endpoints must be reopened after a new handshake.
    pub fn begin_frame(&mut self) -> Result<FrameTiming, SessionError> {
        let timeout_ms = match self.settings.frame_wait {
            FrameWaitMode::Interactive => 0,
            FrameWaitMode::Synchronised => self.settings.await_frame_timeout_ms,
        };
        match self.router.await_frame_data(timeout_ms) {
            Ok(frame) => {
                if frame.is_reset() {
                    log::debug!("Router reset its timeline at t={}", frame.t_tracked);
                }
                self.last_frame = Some(frame);
                Ok(FrameTiming::Fresh(frame))
            }
            Err(e) if e.is_transient() => Ok(self
                .last_frame
                .map_or(FrameTiming::Idle, FrameTiming::Reused)),
            Err(e) => {
                if e.requires_rehandshake() {
                    log::warn!("Stream bindings are stale: {e}");
                    self.post_status(StatusLevel::Orange, "Streams changed, reconnecting");
                }
                Err(e.into())
            }
        }
    }

    /// Starts a frame at `t_tracked` in follower mode and waits for its timing.
    pub fn begin_follower_frame(&mut self, t_tracked: f64) -> Result<FrameTiming, SessionError> {
        if !self.follower {
            return Err(SessionError::Config("session is not in follower mode".into()));
        }
        self.router.begin_follower_frame(t_tracked)?;
        self.begin_frame()
    }

    /// Posts profiling samples if enabled in the settings.
    pub fn post_profiling(&self, entries: &[ProfilingEntry]) -> Result<(), SessionError> {
        if self.settings.post_profiling && !entries.is_empty() {
            self.router.send_profiling_data(entries)?;
        }
        Ok(())
    }

    /// Shows `text` as the router's status line. Failures are only logged.
    pub fn post_status(&self, level: StatusLevel, text: &str) {
        match level {
            StatusLevel::Green => log::info!("{text}"),
            StatusLevel::Orange => log::warn!("{text}"),
            StatusLevel::Red => log::error!("{text}"),
        }
        if let Err(e) = self.router.set_status_message(text) {
            log::warn!("Failed to post status: {e}");
        }
    }

    /// Closes the connection.
    pub fn shutdown(self) -> Result<(), SessionError> {
        self.router.shutdown()?;
        log::info!("Router connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderlink_core::api::{PixelFormat, FRAMEDATA_RESET};
    use renderlink_core::schema::{ParameterSchema, SceneSchema};
    use renderlink_infra::{LoopbackRouter, SoftwareDevice};

    fn session(settings: RenderLinkSettings) -> RenderSession<LoopbackRouter> {
        RenderSession::connect(Arc::new(LoopbackRouter::new()), settings).unwrap()
    }

    fn stream(name: &str) -> StreamDescription {
        StreamDescription {
            name: name.into(),
            width: 8,
            height: 8,
            format: PixelFormat::Bgra8,
            ..Default::default()
        }
    }

    #[test]
    fn reconnecting_an_initialised_router_is_accepted() {
        let router = Arc::new(LoopbackRouter::new());
        RenderSession::connect(router.clone(), RenderLinkSettings::default()).unwrap();
        assert!(RenderSession::connect(router, RenderLinkSettings::default()).is_ok());
    }

    #[test]
    fn enumerates_every_declared_stream() {
        let session = session(RenderLinkSettings::default());
        session.router().add_stream(stream("Left"));
        session.router().add_stream(stream("Right"));
        let streams = session.enumerate_streams().unwrap();
        let names: Vec<_> = streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Left", "Right"]);
    }

    #[test]
    fn open_endpoints_reports_status() {
        let session = session(RenderLinkSettings::default());
        session.router().add_stream(stream("Main"));
        let streams = session.enumerate_streams().unwrap();
        let endpoints = session
            .open_endpoints(Arc::new(SoftwareDevice::default()), streams)
            .unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(session.router().status_messages(), ["Connected to stream"]);
    }

    #[test]
    fn refused_stream_is_a_config_error() {
        let session = session(RenderLinkSettings::default());
        let mut refused = stream("Ghost");
        refused.handle = 0;
        let result = session.open_endpoints(Arc::new(SoftwareDevice::default()), vec![refused]);
        assert!(matches!(result, Err(SessionError::Config(_))));
        assert_eq!(
            session.router().status_messages(),
            ["Error: Unable to create stream"]
        );
    }

    #[test]
    fn timeout_reuses_the_last_frame() {
        let mut session = session(RenderLinkSettings::default());
        assert_eq!(session.begin_frame().unwrap(), FrameTiming::Idle);

        let frame = FrameData {
            t_tracked: 1.0,
            scene: 2,
            flags: FRAMEDATA_RESET,
            ..Default::default()
        };
        session.router().request_frame(frame);
        assert_eq!(session.begin_frame().unwrap(), FrameTiming::Fresh(frame));
        let reused = session.begin_frame().unwrap();
        assert_eq!(reused, FrameTiming::Reused(frame));
        assert_eq!(reused.scene(), Some(2));
    }

    #[test]
    fn stream_changes_require_a_new_handshake() {
        let mut session = session(RenderLinkSettings::default());
        session.router().replace_streams(vec![stream("New")]);
        assert!(matches!(
            session.begin_frame(),
            Err(SessionError::Protocol(RouterError::StreamsChanged))
        ));
    }

    #[test]
    fn follower_frames_need_follower_mode() {
        let mut session = session(RenderLinkSettings::default());
        assert!(matches!(
            session.begin_follower_frame(0.5),
            Err(SessionError::Config(_))
        ));
        session.set_follower(true).unwrap();
        let timing = session.begin_follower_frame(0.5).unwrap();
        assert_eq!(timing.frame_data().map(|f| f.t_tracked), Some(0.5));
    }

    #[test]
    fn published_schema_carries_router_hashes() {
        let session = session(RenderLinkSettings::default());
        let mut schema = Schema::default();
        schema.channels.insert("Main".into());
        schema.scenes.push(SceneSchema::new(
            "Base",
            vec![ParameterSchema::numeric("", "Intensity", "intensity", 0.0, 1.0, 0.01, 0.5)],
        ));
        let published = session.publish_schema(&schema).unwrap();
        assert_eq!(published.scenes.len(), 1);
        assert_ne!(published.scenes[0].hash, 0);
    }

    #[test]
    fn schema_io_needs_a_path() {
        let session = session(RenderLinkSettings::default());
        assert!(matches!(session.load_schema(), Err(SessionError::Config(_))));
    }

    #[test]
    fn profiling_is_only_posted_when_enabled() {
        let entries = [ProfilingEntry::new("Render", 1.5)];
        let quiet = session(RenderLinkSettings::default());
        quiet.post_profiling(&entries).unwrap();
        assert!(quiet.router().profiling_entries().is_empty());

        let loud = session(RenderLinkSettings {
            post_profiling: true,
            ..Default::default()
        });
        loud.post_profiling(&entries).unwrap();
        assert_eq!(loud.router().profiling_entries(), entries);
    }
}
