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

//! The GPU side of frame submission: stream images, fences, and copies.
//!
//! Backends are abstracted behind [`FrameDevice`]; the rest of the workspace only
//! sees opaque [`ImageId`] and [`FenceId`] handles.

use std::borrow::Cow;
use std::fmt::Debug;
use std::time::Duration;

use thiserror::Error;

use crate::api::{FrameType, PixelFormat};

/// An opaque handle to a GPU image owned by a [`FrameDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);

/// An opaque handle to a GPU fence owned by a [`FrameDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

/// A two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    /// The width in pixels.
    pub width: u32,
    /// The height in pixels.
    pub height: u32,
}

impl Extent2D {
    /// Creates a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A pixel rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    /// Left edge.
    pub min_x: u32,
    /// Top edge.
    pub min_y: u32,
    /// Right edge.
    pub max_x: u32,
    /// Bottom edge.
    pub max_y: u32,
}

impl PixelRect {
    /// Creates a rectangle from its edges.
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A rectangle covering a whole image of the given extent.
    pub const fn full(extent: Extent2D) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }

    /// Width of the rectangle, zero if inverted.
    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    /// Height of the rectangle, zero if inverted.
    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    /// `true` if the rectangle covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// A normalised sub-rectangle of an image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvRect {
    /// Left edge in `[0, 1]`.
    pub u_left: f32,
    /// Right edge in `[0, 1]`.
    pub u_right: f32,
    /// Top edge in `[0, 1]`.
    pub v_top: f32,
    /// Bottom edge in `[0, 1]`.
    pub v_bottom: f32,
}

impl UvRect {
    /// The whole image.
    pub const FULL: UvRect = UvRect {
        u_left: 0.0,
        u_right: 1.0,
        v_top: 0.0,
        v_bottom: 1.0,
    };

    /// Normalises `viewport` against a source image of `source` extent.
    ///
    /// Returns `None` when the source or the viewport is empty, or the viewport
    /// reaches outside the source, so every returned rectangle satisfies
    /// `0 <= u_left < u_right <= 1` and `0 <= v_top < v_bottom <= 1`.
    pub fn from_viewport(viewport: PixelRect, source: Extent2D) -> Option<Self> {
        if source.is_empty()
            || viewport.is_empty()
            || viewport.max_x > source.width
            || viewport.max_y > source.height
        {
            return None;
        }
        let width = source.width as f32;
        let height = source.height as f32;
        Some(Self {
            u_left: viewport.min_x as f32 / width,
            u_right: viewport.max_x as f32 / width,
            v_top: viewport.min_y as f32 / height,
            v_bottom: viewport.max_y as f32 / height,
        })
    }
}

/// Describes a stream image to allocate.
#[derive(Debug, Clone)]
pub struct StreamImageDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The size of the image.
    pub size: Extent2D,
    /// The texel format.
    pub format: PixelFormat,
}

/// An error related to the creation or use of a frame device resource.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// The backend could not allocate the resource.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    /// The pixel format cannot be used for stream images.
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    /// The handle does not reference a live resource.
    #[error("invalid resource handle")]
    InvalidHandle,
    /// Source and destination of a copy are incompatible.
    #[error("incompatible copy: {0}")]
    IncompatibleCopy(String),
    /// An error originating from the specific backend implementation.
    #[error("backend error: {0}")]
    BackendError(String),
}

/// A device able to allocate stream images and fences and to record copies.
///
/// Every call that records GPU work (`copy_region`, `signal_fence`) is ordered on
/// the device queue: a fence signalled after a copy only reaches its value
/// once that copy has completed.
pub trait FrameDevice: Send + Sync + Debug + 'static {
    /// The payload kind this device hands to the router.
    fn frame_type(&self) -> FrameType;

    /// Allocates an image that can be shared with the router.
    fn create_stream_image(
        &self,
        descriptor: &StreamImageDescriptor<'_>,
    ) -> Result<ImageId, ResourceError>;

    /// Releases an image.
    fn destroy_image(&self, id: ImageId) -> Result<(), ResourceError>;

    /// Returns the extent of an image, or `None` if the handle is stale.
    fn image_extent(&self, id: ImageId) -> Option<Extent2D>;

    /// Creates a fence whose completed value starts at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<FenceId, ResourceError>;

    /// Releases a fence.
    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Copies the `region` of `source` into the whole of `destination`, scaling if needed.
    fn copy_region(
        &self,
        source: ImageId,
        region: UvRect,
        destination: ImageId,
    ) -> Result<(), ResourceError>;

    /// Queues a signal of `fence` to `value` after all previously recorded work.
    fn signal_fence(&self, fence: FenceId, value: u64) -> Result<(), ResourceError>;

    /// The last value the fence reached.
    fn fence_completed_value(&self, fence: FenceId) -> Result<u64, ResourceError>;

    /// Blocks until `fence` reaches `value` or `timeout` elapses. Returns whether it was reached.
    fn wait_for_fence(
        &self,
        fence: FenceId,
        value: u64,
        timeout: Duration,
    ) -> Result<bool, ResourceError>;

    /// Reads an image back to host memory, returning the row stride in bytes.
    fn read_image(&self, id: ImageId, out: &mut Vec<u8>) -> Result<u32, ResourceError>;
}
