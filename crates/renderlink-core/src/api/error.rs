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

//! The error taxonomy reported by the router surface.

use thiserror::Error;

/// A specialized `Result` for router calls.
pub type RouterResult<T> = Result<T, RouterError>;

/// An error returned by a call into the router.
///
/// The variants mirror the numeric codes of the native interface one to one,
/// see [`RouterError::code`] and [`RouterError::from_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The router has not been initialised yet.
    #[error("router is not initialised")]
    NotInitialised,
    /// The router was already initialised.
    #[error("router is already initialised")]
    AlreadyInitialised,
    /// The stream or camera handle is not known to the router.
    #[error("invalid handle")]
    InvalidHandle,
    /// The router refuses to create more frame senders.
    #[error("maximum number of frame senders reached")]
    MaxSendersReached,
    /// The frame type sent does not match what the stream expects.
    #[error("bad stream type")]
    BadStreamType,
    /// The requested item does not exist.
    #[error("not found")]
    NotFound,
    /// The schema handed over was malformed or does not match the active one.
    #[error("incorrect schema")]
    IncorrectSchema,
    /// The call arguments were rejected.
    #[error("invalid parameters")]
    InvalidParameters,
    /// The caller-provided buffer is too small; `required` elements are needed.
    #[error("buffer overflow, {required} elements required")]
    BufferOverflow {
        /// The number of elements the caller must provide.
        required: usize,
    },
    /// No data arrived within the allotted time.
    #[error("timed out")]
    Timeout,
    /// The set of declared output streams changed since it was last queried.
    #[error("streams changed")]
    StreamsChanged,
    /// The router speaks a different protocol version.
    #[error("incompatible version")]
    IncompatibleVersion,
    /// Any other failure.
    #[error("unspecified router error: {0}")]
    Unspecified(String),
}

impl RouterError {
    /// Returns `true` when the session's stream bindings are no longer valid and
    /// the caller must perform a full re-handshake instead of retrying the call.
    pub fn requires_rehandshake(&self) -> bool {
        matches!(
            self,
            RouterError::StreamsChanged | RouterError::IncompatibleVersion
        )
    }

    /// Returns `true` for failures that are recovered locally (e.g. by reusing
    /// the last known frame data).
    pub fn is_transient(&self) -> bool {
        matches!(self, RouterError::Timeout)
    }

    /// The numeric code used by the native interface.
    pub fn code(&self) -> u32 {
        match self {
            RouterError::NotInitialised => 1,
            RouterError::AlreadyInitialised => 2,
            RouterError::InvalidHandle => 3,
            RouterError::MaxSendersReached => 4,
            RouterError::BadStreamType => 5,
            RouterError::NotFound => 6,
            RouterError::IncorrectSchema => 7,
            RouterError::InvalidParameters => 8,
            RouterError::BufferOverflow { .. } => 9,
            RouterError::Timeout => 10,
            RouterError::StreamsChanged => 11,
            RouterError::IncompatibleVersion => 12,
            RouterError::Unspecified(_) => 13,
        }
    }

    /// Converts a native status code into a result. `0` is success.
    ///
    /// The native interface reports the required size of an overflowing buffer
    /// through an out-parameter, so it is passed alongside the code.
    pub fn from_code(code: u32, required: usize) -> RouterResult<()> {
        let err = match code {
            0 => return Ok(()),
            1 => RouterError::NotInitialised,
            2 => RouterError::AlreadyInitialised,
            3 => RouterError::InvalidHandle,
            4 => RouterError::MaxSendersReached,
            5 => RouterError::BadStreamType,
            6 => RouterError::NotFound,
            7 => RouterError::IncorrectSchema,
            8 => RouterError::InvalidParameters,
            9 => RouterError::BufferOverflow { required },
            10 => RouterError::Timeout,
            11 => RouterError::StreamsChanged,
            12 => RouterError::IncompatibleVersion,
            other => RouterError::Unspecified(format!("native error code {other}")),
        };
        Err(err)
    }
}
