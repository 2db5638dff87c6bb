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

//! Records exchanged with the router on every frame.
//!
//! The plain records keep the field order of the native interface so that a
//! dynamically loaded binding can pass them through without conversion.

use crate::device::{FenceId, ImageId};

/// Router-assigned handle of an output stream. `0` means "unbound".
pub type StreamHandle = u64;

/// Router-assigned handle of a tracked camera.
pub type CameraHandle = u64;

/// Major protocol version this crate speaks.
pub const RENDER_STREAM_VERSION_MAJOR: u32 = 1;
/// Minor protocol version this crate speaks.
pub const RENDER_STREAM_VERSION_MINOR: u32 = 23;

/// Pixel layout of a stream image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PixelFormat {
    /// No valid format was declared.
    #[default]
    Invalid = 0,
    /// 8-bit BGRA.
    Bgra8 = 1,
    /// 8-bit BGR with an ignored fourth channel.
    Bgrx8 = 2,
    /// 32-bit float RGBA.
    Rgba32F = 3,
}

impl PixelFormat {
    /// Size of a single texel in bytes, `None` for [`PixelFormat::Invalid`].
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::Invalid => None,
            PixelFormat::Bgra8 | PixelFormat::Bgrx8 => Some(4),
            PixelFormat::Rgba32F => Some(16),
        }
    }
}

/// Normalised (0-1) clipping planes for the edges of the camera frustum, used to
/// perform off-axis projection or to offset and scale orthographic matrices.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ProjectionClipping {
    /// Left edge.
    pub left: f32,
    /// Right edge.
    pub right: f32,
    /// Top edge.
    pub top: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl Default for ProjectionClipping {
    fn default() -> Self {
        Self {
            left: 0.0,
            right: 1.0,
            top: 0.0,
            bottom: 1.0,
        }
    }
}

/// A pixel region of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FrameRegion {
    /// Horizontal offset in pixels.
    pub x_offset: u32,
    /// Vertical offset in pixels.
    pub y_offset: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Tracking data the router needs back but which is not used to render content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct TrackingData {
    /// Virtual zoom applied by the router.
    pub virtual_zoom_scale: f32,
    /// Non-zero when the router must reproject the frame.
    pub virtual_reprojection_required: u8,
    /// Real camera position.
    pub x_real_camera: f32,
    /// Real camera position.
    pub y_real_camera: f32,
    /// Real camera position.
    pub z_real_camera: f32,
    /// Real camera rotation.
    pub rx_real_camera: f32,
    /// Real camera rotation.
    pub ry_real_camera: f32,
    /// Real camera rotation.
    pub rz_real_camera: f32,
}

/// Camera pose and lens description for one stream and one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct CameraData {
    /// The stream this camera drives.
    pub id: StreamHandle,
    /// The camera the pose belongs to.
    pub camera_handle: CameraHandle,
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    /// Position.
    pub z: f32,
    /// Rotation in degrees.
    pub rx: f32,
    /// Rotation in degrees.
    pub ry: f32,
    /// Rotation in degrees.
    pub rz: f32,
    /// Focal length in millimetres. `0` means orthographic.
    pub focal_length: f32,
    /// Sensor width in millimetres.
    pub sensor_x: f32,
    /// Sensor height in millimetres.
    pub sensor_y: f32,
    /// Principal point offset.
    pub cx: f32,
    /// Principal point offset.
    pub cy: f32,
    /// Near clip plane.
    pub near_z: f32,
    /// Far clip plane.
    pub far_z: f32,
    /// Extra tracking data echoed back with the frame.
    pub tracking: TrackingData,
}

/// Frame flag: the router reset its timeline (e.g. a seek happened).
pub const FRAMEDATA_RESET: u32 = 1;

/// Timing for the frame about to be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FrameData {
    /// The tracked time this frame represents.
    pub t_tracked: f64,
    /// Local playback time.
    pub local_time: f64,
    /// Local time elapsed since the previous frame.
    pub local_time_delta: f64,
    /// Frame rate numerator.
    pub frame_rate_numerator: u32,
    /// Frame rate denominator.
    pub frame_rate_denominator: u32,
    /// Bitmask of `FRAMEDATA_*` flags.
    pub flags: u32,
    /// Index of the scene the router wants rendered.
    pub scene: u32,
}

impl FrameData {
    /// Returns `true` if the router flagged a timeline reset.
    pub fn is_reset(&self) -> bool {
        self.flags & FRAMEDATA_RESET != 0
    }
}

/// The camera and timing that produced a rendered frame, sent back with it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct CameraResponse {
    /// The tracked time of the frame the camera was sampled for.
    pub t_tracked: f64,
    /// The camera used to render the frame.
    pub camera: CameraData,
}

/// An output stream declared by the router.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamDescription {
    /// The stream handle.
    pub handle: StreamHandle,
    /// The channel (camera rig) the stream belongs to.
    pub channel: String,
    /// Display name of the stream.
    pub name: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Requested pixel format.
    pub format: PixelFormat,
    /// Frustum clipping of this stream within its channel.
    pub clipping: ProjectionClipping,
}

/// A single named profiling sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilingEntry {
    /// Name of the sample.
    pub name: String,
    /// Value of the sample.
    pub value: f32,
}

impl ProfilingEntry {
    /// Creates a new profiling entry.
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// How a stream's frames are handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// CPU memory copy.
    HostMemory,
    /// Shared GPU texture, synchronised implicitly.
    SharedTexture,
    /// Shared GPU texture plus a fence the router waits on.
    FencedTexture,
}

/// A frame payload together with its frame-type discriminator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SenderFrame<'a> {
    /// Pixels copied to host memory.
    HostMemory {
        /// The pixel rows.
        data: &'a [u8],
        /// Distance in bytes between two rows.
        stride: u32,
    },
    /// A GPU image shared with the router.
    SharedTexture {
        /// The image holding the frame.
        image: ImageId,
    },
    /// A GPU image shared with the router, guarded by a fence.
    FencedTexture {
        /// The image holding the frame.
        image: ImageId,
        /// The fence signalled when the image is complete.
        fence: FenceId,
        /// The value the fence reaches once the image is complete.
        fence_value: u64,
    },
}

impl SenderFrame<'_> {
    /// The discriminator of this payload.
    pub fn frame_type(&self) -> FrameType {
        match self {
            SenderFrame::HostMemory { .. } => FrameType::HostMemory,
            SenderFrame::SharedTexture { .. } => FrameType::SharedTexture,
            SenderFrame::FencedTexture { .. } => FrameType::FencedTexture,
        }
    }
}
