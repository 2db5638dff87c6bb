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

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use renderlink_core::api::{
    CameraResponse, FrameType, PixelFormat, ProjectionClipping, SenderFrame, StreamDescription,
    StreamHandle,
};
use renderlink_core::device::{
    Extent2D, FenceId, FrameDevice, ImageId, PixelRect, StreamImageDescriptor, UvRect,
};
use renderlink_core::Router;

use crate::error::StreamError;

/// Fence value tagged on the first frame sent on a channel.
pub const FIRST_FENCE_VALUE: u64 = 2;

/// Fence values advance by two per frame: the even value marks "written" on
/// this side, the odd one is left for the router's "read".
pub const FENCE_STRIDE: u64 = 2;

#[derive(Debug)]
struct BoundStream {
    handle: StreamHandle,
    name: String,
    channel: String,
    clipping: ProjectionClipping,
    extent: Extent2D,
    format: PixelFormat,
    image: ImageId,
    fence: FenceId,
    fence_value: u64,
    last_signalled: Option<u64>,
}

/// Sends rendered frames of one output stream to the router.
///
/// The channel exclusively owns a stream image and a fence on `device`. They
/// are created by [`FrameChannel::setup`] and released by
/// [`FrameChannel::teardown`] (or on drop), never while a sent frame may still
/// be read.
#[derive(Debug)]
pub struct FrameChannel {
    device: Arc<dyn FrameDevice>,
    bound: Option<BoundStream>,
    teardown_timeout: Duration,
    readback: Vec<u8>,
}

impl FrameChannel {
    /// Creates an unbound channel.
    pub fn new(device: Arc<dyn FrameDevice>, teardown_timeout: Duration) -> Self {
        Self {
            device,
            bound: None,
            teardown_timeout,
            readback: Vec::new(),
        }
    }

    /// Binds the channel to a stream declared by the router.
    ///
    /// ## Errors
    /// * `StreamError::AlreadyBound` - A stream is bound already; nothing is changed.
    /// * `StreamError::Allocation` - The image or fence could not be created; the channel stays unbound.
    /// * `StreamError::StreamRefused` - The handle is `0`; the resources are released again.
    pub fn setup(&mut self, stream: &StreamDescription) -> Result<(), StreamError> {
        if let Some(bound) = &self.bound {
            return Err(StreamError::AlreadyBound(bound.handle));
        }

        let extent = Extent2D::new(stream.width, stream.height);
        let image = self
            .device
            .create_stream_image(&StreamImageDescriptor {
                label: Some(Cow::Borrowed(stream.name.as_str())),
                size: extent,
                format: stream.format,
            })
            .map_err(|e| {
                log::error!("Failed to create image for stream '{}': {e}", stream.name);
                StreamError::Allocation(e)
            })?;
        let fence = match self.device.create_fence(0) {
            Ok(fence) => fence,
            Err(e) => {
                log::error!("Failed to create fence for stream '{}': {e}", stream.name);
                self.release_image(image);
                return Err(StreamError::Allocation(e));
            }
        };

        if stream.handle == 0 {
            log::error!("Unable to create stream '{}'", stream.name);
            self.release_image(image);
            if let Err(e) = self.device.destroy_fence(fence) {
                log::warn!("Failed to release fence: {e}");
            }
            return Err(StreamError::StreamRefused(stream.name.clone()));
        }

        log::info!("Created stream '{}'", stream.name);
        self.bound = Some(BoundStream {
            handle: stream.handle,
            name: stream.name.clone(),
            channel: stream.channel.clone(),
            clipping: stream.clipping,
            extent,
            format: stream.format,
            image,
            fence,
            fence_value: FIRST_FENCE_VALUE,
            last_signalled: None,
        });
        Ok(())
    }

    fn release_image(&self, image: ImageId) {
        if let Err(e) = self.device.destroy_image(image) {
            log::warn!("Failed to release stream image: {e}");
        }
    }

    /// Copies the `viewport` of `source` into the stream image and hands it to
    /// the router together with the camera that produced it.
    ///
    /// # Returns
    /// The fence value the frame was tagged with.
    pub fn send_frame<R>(
        &mut self,
        router: &R,
        source: ImageId,
        viewport: PixelRect,
        response: &CameraResponse,
    ) -> Result<u64, StreamError>
    where
        R: Router + ?Sized,
    {
        let bound = self.bound.as_mut().ok_or(StreamError::NotBound)?;
        let extent = self
            .device
            .image_extent(source)
            .ok_or(StreamError::InvalidSource)?;
        if viewport.is_empty() {
            return Err(StreamError::EmptyRect(viewport));
        }
        let region = UvRect::from_viewport(viewport, extent).ok_or(StreamError::InvalidRect {
            rect: viewport,
            extent,
        })?;

        self.device
            .copy_region(source, region, bound.image)
            .map_err(StreamError::Device)?;
        let value = bound.fence_value;
        self.device
            .signal_fence(bound.fence, value)
            .map_err(StreamError::Device)?;
        // A queued signal consumes its value even if the router turns the frame down.
        bound.last_signalled = Some(value);
        bound.fence_value += FENCE_STRIDE;

        let frame = match self.device.frame_type() {
            FrameType::FencedTexture => SenderFrame::FencedTexture {
                image: bound.image,
                fence: bound.fence,
                fence_value: value,
            },
            FrameType::SharedTexture => SenderFrame::SharedTexture { image: bound.image },
            FrameType::HostMemory => {
                let stride = self
                    .device
                    .read_image(bound.image, &mut self.readback)
                    .map_err(StreamError::Device)?;
                SenderFrame::HostMemory {
                    data: &self.readback,
                    stride,
                }
            }
        };

        router.send_frame(bound.handle, frame, response)?;
        Ok(value)
    }

    /// Releases the stream image and fence once the last sent frame has completed.
    ///
    /// ## Errors
    /// * `StreamError::FenceTimeout` - The last frame is still in flight; the
    ///   channel stays bound and teardown can be retried.
    pub fn teardown(&mut self) -> Result<(), StreamError> {
        let Some(bound) = self.bound.as_ref() else {
            return Ok(());
        };
        if let Some(value) = bound.last_signalled {
            let completed = self
                .device
                .wait_for_fence(bound.fence, value, self.teardown_timeout)
                .map_err(StreamError::Device)?;
            if !completed {
                log::warn!(
                    "Stream '{}' still in flight at fence value {value}",
                    bound.name
                );
                return Err(StreamError::FenceTimeout { value });
            }
        }

        if let Some(bound) = self.bound.take() {
            self.release_image(bound.image);
            if let Err(e) = self.device.destroy_fence(bound.fence) {
                log::warn!("Failed to release fence: {e}");
            }
            log::info!("Closed stream '{}'", bound.name);
        }
        Ok(())
    }

    /// Returns `true` if a stream is bound.
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Handle of the bound stream, `0` if unbound.
    pub fn handle(&self) -> StreamHandle {
        self.bound.as_ref().map_or(0, |b| b.handle)
    }

    /// The value the next frame will be tagged with.
    pub fn fence_value(&self) -> Option<u64> {
        self.bound.as_ref().map(|b| b.fence_value)
    }

    /// The stream image, for inspection.
    pub fn image(&self) -> Option<ImageId> {
        self.bound.as_ref().map(|b| b.image)
    }

    /// Name of the bound stream.
    pub fn name(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.name.as_str())
    }

    /// Channel (camera rig) of the bound stream.
    pub fn channel(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.channel.as_str())
    }

    /// Frustum clipping of the bound stream.
    pub fn clipping(&self) -> Option<ProjectionClipping> {
        self.bound.as_ref().map(|b| b.clipping)
    }

    /// Resolution and format of the bound stream.
    pub fn resolution(&self) -> Option<(Extent2D, PixelFormat)> {
        self.bound.as_ref().map(|b| (b.extent, b.format))
    }
}

impl Drop for FrameChannel {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            // Leaking beats freeing an image the router may still read.
            log::error!("Leaking stream resources: {e}");
        }
    }
}
