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

use std::sync::Arc;
use std::time::Duration;

use renderlink_core::api::{CameraResponse, FrameData, StreamDescription, StreamHandle};
use renderlink_core::config::FrameWaitMode;
use renderlink_core::device::{FrameDevice, ImageId, PixelRect};
use renderlink_core::{RenderLinkSettings, Router};

use crate::error::StreamError;
use crate::frame_channel::FrameChannel;
use crate::response_queue::ResponseQueue;

/// What [`StreamEndpoint::submit`] did with a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitOutcome {
    /// The frame went to the router.
    Sent {
        /// Fence value the frame was tagged with.
        fence_value: u64,
        /// The camera the frame was paired with.
        response: CameraResponse,
    },
    /// No camera response was available; the router keeps showing the last frame.
    Held,
}

/// The control-path half of a [`StreamEndpoint`]: captures cameras into its queue.
#[derive(Debug, Clone)]
pub struct CameraFeed {
    handle: StreamHandle,
    queue: ResponseQueue,
}

impl CameraFeed {
    /// The router's handle for the stream.
    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    /// Fetches the camera for the stream's next frame and queues it.
    pub fn capture<R>(&self, router: &R, frame: &FrameData) -> Result<CameraResponse, StreamError>
    where
        R: Router + ?Sized,
    {
        let camera = router.frame_camera(self.handle)?;
        let response = CameraResponse {
            t_tracked: frame.t_tracked,
            camera,
        };
        self.queue.push(response);
        Ok(response)
    }
}

/// One output stream: the camera queue filled by the control path and the
/// frame channel drained by the render path.
#[derive(Debug)]
pub struct StreamEndpoint {
    description: StreamDescription,
    channel: FrameChannel,
    queue: ResponseQueue,
    wait: FrameWaitMode,
    response_timeout: Duration,
    frames_sent: u64,
    frames_held: u64,
}

impl StreamEndpoint {
    /// Allocates the stream resources on `device` and binds them to `description`.
    pub fn open(
        device: Arc<dyn FrameDevice>,
        description: StreamDescription,
        settings: &RenderLinkSettings,
    ) -> Result<Self, StreamError> {
        let mut channel = FrameChannel::new(device, settings.teardown_fence_timeout());
        channel.setup(&description)?;
        Ok(Self {
            description,
            channel,
            queue: ResponseQueue::new(),
            wait: settings.frame_wait,
            response_timeout: settings.await_frame_timeout(),
            frames_sent: 0,
            frames_held: 0,
        })
    }

    /// A handle on the camera queue, for the thread that captures cameras.
    pub fn queue(&self) -> ResponseQueue {
        self.queue.clone()
    }

    /// The stream this endpoint sends to.
    pub fn description(&self) -> &StreamDescription {
        &self.description
    }

    /// The router's handle for the stream.
    pub fn handle(&self) -> StreamHandle {
        self.description.handle
    }

    /// The frame channel, for inspection.
    pub fn channel(&self) -> &FrameChannel {
        &self.channel
    }

    /// A feed to hand to the thread that talks to the router.
    pub fn feed(&self) -> CameraFeed {
        CameraFeed {
            handle: self.description.handle,
            queue: self.queue.clone(),
        }
    }

    /// Fetches the camera for this stream's next frame and queues it.
    pub fn capture_camera<R>(&self, router: &R, frame: &FrameData) -> Result<CameraResponse, StreamError>
    where
        R: Router + ?Sized,
    {
        self.feed().capture(router, frame)
    }

    /// Sends `viewport` of `source`, paired with the oldest queued camera.
    pub fn submit<R>(
        &mut self,
        router: &R,
        source: ImageId,
        viewport: PixelRect,
    ) -> Result<SubmitOutcome, StreamError>
    where
        R: Router + ?Sized,
    {
        let response = match self.wait {
            FrameWaitMode::Interactive => self.queue.pop_oldest(),
            FrameWaitMode::Synchronised => self.queue.wait_oldest(self.response_timeout),
        };
        let Some(response) = response else {
            self.frames_held += 1;
            log::trace!("No camera for stream '{}', holding frame", self.description.name);
            return Ok(SubmitOutcome::Held);
        };

        let fence_value = self.channel.send_frame(router, source, viewport, &response)?;
        self.frames_sent += 1;
        Ok(SubmitOutcome::Sent {
            fence_value,
            response,
        })
    }

    /// Frames sent and frames held so far.
    pub fn counters(&self) -> (u64, u64) {
        (self.frames_sent, self.frames_held)
    }

    /// Drops pending cameras and releases the stream resources.
    ///
    /// On a fence timeout the endpoint is handed back so the caller can retry.
    pub fn close(mut self) -> Result<(), (Self, StreamError)> {
        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!(
                "Dropped {dropped} camera responses for stream '{}'",
                self.description.name
            );
        }
        match self.channel.teardown() {
            Ok(()) => Ok(()),
            Err(e) => Err((self, e)),
        }
    }
}
