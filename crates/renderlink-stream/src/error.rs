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

use renderlink_core::api::StreamHandle;
use renderlink_core::device::{Extent2D, PixelRect, ResourceError};
use renderlink_core::RouterError;
use thiserror::Error;

/// An error raised by a [`crate::FrameChannel`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// `setup` was called on a channel that is already bound.
    #[error("channel is already bound to stream {0}")]
    AlreadyBound(StreamHandle),
    /// The stream image or fence could not be allocated.
    #[error("failed to allocate stream resources: {0}")]
    Allocation(ResourceError),
    /// The router did not hand out a handle for the stream.
    #[error("unable to create stream '{0}'")]
    StreamRefused(String),
    /// The channel has no stream bound.
    #[error("channel is not bound")]
    NotBound,
    /// The source image does not exist.
    #[error("source image is invalid")]
    InvalidSource,
    /// The viewport covers no pixel.
    #[error("viewport {0:?} is empty")]
    EmptyRect(PixelRect),
    /// The viewport does not fit the source image.
    #[error("viewport {rect:?} does not fit a {extent:?} source")]
    InvalidRect {
        /// The requested viewport.
        rect: PixelRect,
        /// The source extent.
        extent: Extent2D,
    },
    /// Recording the copy or the fence signal failed.
    #[error("device error: {0}")]
    Device(ResourceError),
    /// The router rejected the frame.
    #[error("router rejected the frame: {0}")]
    Router(#[from] RouterError),
    /// The last send did not complete in time; resources were kept alive.
    #[error("in-flight frame (fence value {value}) did not complete in time")]
    FenceTimeout {
        /// The fence value waited for.
        value: u64,
    },
}

/// An error raised by a [`crate::RenderSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Stream bindings are stale; the session must be re-established.
    #[error("protocol error, re-handshake required: {0}")]
    Protocol(RouterError),
    /// Setup or configuration failed; retrying will not help.
    #[error("configuration error: {0}")]
    Config(String),
    /// Any other router failure.
    #[error("router error: {0}")]
    Router(RouterError),
}

impl From<RouterError> for SessionError {
    fn from(error: RouterError) -> Self {
        if error.requires_rehandshake() {
            SessionError::Protocol(error)
        } else {
            SessionError::Router(error)
        }
    }
}
