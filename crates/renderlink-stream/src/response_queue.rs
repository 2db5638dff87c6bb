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

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use renderlink_core::api::CameraResponse;

#[derive(Debug, Default)]
struct QueueInner {
    entries: Mutex<VecDeque<CameraResponse>>,
    available: Condvar,
}

/// FIFO of camera responses between the control path and the render path.
///
/// Cloning shares the same queue: one clone stays with the producer, the other
/// with the consumer. The N-th response pushed is the N-th one popped, which
/// pairs every rendered frame with exactly the camera it was rendered for.
#[derive(Debug, Clone, Default)]
pub struct ResponseQueue {
    inner: Arc<QueueInner>,
}

impl ResponseQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<CameraResponse>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a response. Only blocks for the lock.
    pub fn push(&self, response: CameraResponse) {
        self.entries().push_back(response);
        self.inner.available.notify_one();
    }

    /// Removes and returns the oldest response, or `None` if there is none yet.
    pub fn pop_oldest(&self) -> Option<CameraResponse> {
        self.entries().pop_front()
    }

    /// Like [`ResponseQueue::pop_oldest`], but waits up to `timeout` for a response.
    pub fn wait_oldest(&self, timeout: Duration) -> Option<CameraResponse> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.entries();
        loop {
            if let Some(response) = entries.pop_front() {
                return Some(response);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            entries = self
                .inner
                .available
                .wait_timeout(entries, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Number of queued responses.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drops every queued response and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let dropped = entries.len();
        entries.clear();
        dropped
    }
}
