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

//! # RenderLink Stream
//!
//! The per-frame exchange with the router. The control path asks the router
//! for the camera of every stream and queues it; the render path pops the
//! oldest camera, renders with it, and sends the result back through a
//! [`FrameChannel`], fenced so the router never reads a half-written image.

#![warn(missing_docs)]

mod endpoint;
mod error;
mod frame_channel;
mod response_queue;
mod session;

pub use endpoint::{CameraFeed, StreamEndpoint, SubmitOutcome};
pub use error::{SessionError, StreamError};
pub use frame_channel::{FrameChannel, FIRST_FENCE_VALUE, FENCE_STRIDE};
pub use response_queue::ResponseQueue;
pub use session::{FrameTiming, RenderSession, StatusLevel};
