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

//! A [`FrameDevice`] backed by host memory.
//!
//! Images are plain byte buffers and fences are counters guarded by a condition
//! variable. Signals complete immediately unless deferred, which lets tests
//! hold a send "in flight" and observe teardown waiting on it.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use renderlink_core::api::{FrameType, PixelFormat};
use renderlink_core::device::{
    Extent2D, FenceId, FrameDevice, ImageId, ResourceError, StreamImageDescriptor, UvRect,
};

#[derive(Debug)]
struct CpuImage {
    extent: Extent2D,
    format: PixelFormat,
    bytes_per_pixel: usize,
    data: Vec<u8>,
}

impl CpuImage {
    fn stride(&self) -> usize {
        self.extent.width as usize * self.bytes_per_pixel
    }
}

#[derive(Debug, Default)]
struct CpuFence {
    completed: u64,
    pending: Vec<u64>,
}

#[derive(Debug, Default)]
struct DeviceState {
    images: HashMap<u64, CpuImage>,
    fences: HashMap<u64, CpuFence>,
    next_id: u64,
    defer_signals: bool,
    failing_allocations: u32,
}

/// A CPU implementation of [`FrameDevice`].
#[derive(Debug)]
pub struct SoftwareDevice {
    frame_type: FrameType,
    state: Mutex<DeviceState>,
    signalled: Condvar,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(FrameType::FencedTexture)
    }
}

impl SoftwareDevice {
    /// Creates a device handing frames over as `frame_type`.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            state: Mutex::new(DeviceState::default()),
            signalled: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// When `true`, fence signals stay pending until [`SoftwareDevice::complete_pending_work`].
    pub fn defer_fence_signals(&self, defer: bool) {
        self.state().defer_signals = defer;
    }

    /// Completes every pending fence signal.
    pub fn complete_pending_work(&self) {
        let mut state = self.state();
        for fence in state.fences.values_mut() {
            if let Some(max) = fence.pending.drain(..).max() {
                fence.completed = fence.completed.max(max);
            }
        }
        self.signalled.notify_all();
    }

    /// Makes the next `count` image allocations fail.
    pub fn fail_next_allocations(&self, count: u32) {
        self.state().failing_allocations = count;
    }

    /// Number of live images.
    pub fn image_count(&self) -> usize {
        self.state().images.len()
    }

    /// Number of live fences.
    pub fn fence_count(&self) -> usize {
        self.state().fences.len()
    }

    /// Fills every texel of an image with `texel`.
    pub fn fill(&self, id: ImageId, texel: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        let image = state.images.get_mut(&id.0).ok_or(ResourceError::InvalidHandle)?;
        if texel.len() != image.bytes_per_pixel {
            return Err(ResourceError::IncompatibleCopy(format!(
                "texel of {} bytes for a {:?} image",
                texel.len(),
                image.format
            )));
        }
        for chunk in image.data.chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(texel);
        }
        Ok(())
    }

    /// Writes a single texel.
    pub fn write_texel(&self, id: ImageId, x: u32, y: u32, texel: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        let image = state.images.get_mut(&id.0).ok_or(ResourceError::InvalidHandle)?;
        if x >= image.extent.width || y >= image.extent.height || texel.len() != image.bytes_per_pixel {
            return Err(ResourceError::IncompatibleCopy("texel outside the image".into()));
        }
        let offset = y as usize * image.stride() + x as usize * image.bytes_per_pixel;
        image.data[offset..offset + texel.len()].copy_from_slice(texel);
        Ok(())
    }

    /// Writes a single `Rgba32F` texel.
    pub fn write_texel_f32(&self, id: ImageId, x: u32, y: u32, rgba: [f32; 4]) -> Result<(), ResourceError> {
        self.write_texel(id, x, y, bytemuck::bytes_of(&rgba))
    }

    /// Reads a single texel back.
    pub fn texel(&self, id: ImageId, x: u32, y: u32) -> Option<Vec<u8>> {
        let state = self.state();
        let image = state.images.get(&id.0)?;
        if x >= image.extent.width || y >= image.extent.height {
            return None;
        }
        let offset = y as usize * image.stride() + x as usize * image.bytes_per_pixel;
        Some(image.data[offset..offset + image.bytes_per_pixel].to_vec())
    }

    /// Reads a single `Rgba32F` texel back.
    pub fn texel_f32(&self, id: ImageId, x: u32, y: u32) -> Option<[f32; 4]> {
        let bytes = self.texel(id, x, y)?;
        bytemuck::try_pod_read_unaligned(&bytes).ok()
    }
}

impl FrameDevice for SoftwareDevice {
    fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    fn create_stream_image(
        &self,
        descriptor: &StreamImageDescriptor<'_>,
    ) -> Result<ImageId, ResourceError> {
        let bytes_per_pixel = descriptor
            .format
            .bytes_per_pixel()
            .ok_or(ResourceError::UnsupportedFormat(descriptor.format))?
            as usize;
        if descriptor.size.is_empty() {
            return Err(ResourceError::AllocationFailed("empty extent".into()));
        }

        let mut state = self.state();
        if state.failing_allocations > 0 {
            state.failing_allocations -= 1;
            return Err(ResourceError::AllocationFailed("out of device memory".into()));
        }
        let len = descriptor.size.width as usize * descriptor.size.height as usize * bytes_per_pixel;
        state.next_id += 1;
        let id = state.next_id;
        state.images.insert(
            id,
            CpuImage {
                extent: descriptor.size,
                format: descriptor.format,
                bytes_per_pixel,
                data: vec![0; len],
            },
        );
        log::trace!(
            "Created image {id} ({:?}) {}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        Ok(ImageId(id))
    }

    fn destroy_image(&self, id: ImageId) -> Result<(), ResourceError> {
        self.state()
            .images
            .remove(&id.0)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn image_extent(&self, id: ImageId) -> Option<Extent2D> {
        self.state().images.get(&id.0).map(|image| image.extent)
    }

    fn create_fence(&self, initial_value: u64) -> Result<FenceId, ResourceError> {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.fences.insert(
            id,
            CpuFence {
                completed: initial_value,
                pending: Vec::new(),
            },
        );
        Ok(FenceId(id))
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        self.state()
            .fences
            .remove(&id.0)
            .map(|_| ())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn copy_region(
        &self,
        source: ImageId,
        region: UvRect,
        destination: ImageId,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        let src = state.images.get(&source.0).ok_or(ResourceError::InvalidHandle)?;
        let (src_extent, src_format, bpp, src_stride) =
            (src.extent, src.format, src.bytes_per_pixel, src.stride());
        // Copied out so source and destination may be the same image.
        let src_data = src.data.clone();

        let dst = state
            .images
            .get_mut(&destination.0)
            .ok_or(ResourceError::InvalidHandle)?;
        if dst.format != src_format {
            return Err(ResourceError::IncompatibleCopy(format!(
                "{:?} into {:?}",
                src_format, dst.format
            )));
        }

        let dst_stride = dst.stride();
        let (dst_w, dst_h) = (dst.extent.width as f32, dst.extent.height as f32);
        // Nearest-texel sampling of the region.
        for y in 0..dst.extent.height {
            let v = region.v_top + (y as f32 + 0.5) / dst_h * (region.v_bottom - region.v_top);
            let sy = ((v * src_extent.height as f32) as u32).min(src_extent.height - 1) as usize;
            for x in 0..dst.extent.width {
                let u = region.u_left + (x as f32 + 0.5) / dst_w * (region.u_right - region.u_left);
                let sx = ((u * src_extent.width as f32) as u32).min(src_extent.width - 1) as usize;
                let from = sy * src_stride + sx * bpp;
                let to = y as usize * dst_stride + x as usize * bpp;
                dst.data[to..to + bpp].copy_from_slice(&src_data[from..from + bpp]);
            }
        }
        Ok(())
    }

    fn signal_fence(&self, fence: FenceId, value: u64) -> Result<(), ResourceError> {
        let mut state = self.state();
        let defer = state.defer_signals;
        let fence = state.fences.get_mut(&fence.0).ok_or(ResourceError::InvalidHandle)?;
        if defer {
            fence.pending.push(value);
        } else {
            fence.completed = fence.completed.max(value);
            self.signalled.notify_all();
        }
        Ok(())
    }

    fn fence_completed_value(&self, fence: FenceId) -> Result<u64, ResourceError> {
        self.state()
            .fences
            .get(&fence.0)
            .map(|fence| fence.completed)
            .ok_or(ResourceError::InvalidHandle)
    }

    fn wait_for_fence(
        &self,
        fence: FenceId,
        value: u64,
        timeout: Duration,
    ) -> Result<bool, ResourceError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            let completed = state
                .fences
                .get(&fence.0)
                .ok_or(ResourceError::InvalidHandle)?
                .completed;
            if completed >= value {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            state = self
                .signalled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn read_image(&self, id: ImageId, out: &mut Vec<u8>) -> Result<u32, ResourceError> {
        let state = self.state();
        let image = state.images.get(&id.0).ok_or(ResourceError::InvalidHandle)?;
        out.clear();
        out.extend_from_slice(&image.data);
        Ok(image.stride() as u32)
    }
}
