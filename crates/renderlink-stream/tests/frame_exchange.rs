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
use std::thread;
use std::time::Duration;

use renderlink_core::api::{
    CameraData, CameraResponse, FrameData, PixelFormat, StreamDescription,
    RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR,
};
use renderlink_core::config::FrameWaitMode;
use renderlink_core::device::{Extent2D, FrameDevice, ImageId, PixelRect, StreamImageDescriptor};
use renderlink_core::{RenderLinkSettings, Router};
use renderlink_infra::{LoopbackRouter, SoftwareDevice};
use renderlink_stream::{
    FrameChannel, RenderSession, ResponseQueue, StreamError, SubmitOutcome, FENCE_STRIDE,
    FIRST_FENCE_VALUE,
};

fn source_image(device: &SoftwareDevice, extent: Extent2D) -> ImageId {
    device
        .create_stream_image(&StreamImageDescriptor {
            label: Some("atlas".into()),
            size: extent,
            format: PixelFormat::Bgra8,
        })
        .unwrap()
}

fn declare(router: &LoopbackRouter, name: &str, width: u32, height: u32) -> StreamDescription {
    let mut description = StreamDescription {
        channel: "Main".into(),
        name: name.into(),
        width,
        height,
        format: PixelFormat::Bgra8,
        ..Default::default()
    };
    description.handle = router.add_stream(description.clone());
    description
}

#[test]
fn responses_cross_threads_in_push_order() {
    const COUNT: usize = 2_000;
    let queue = ResponseQueue::new();
    let producer = queue.clone();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);

    let handle = thread::spawn(move || {
        for i in 0..COUNT {
            producer.push(CameraResponse {
                t_tracked: i as f64,
                ..Default::default()
            });
            if i % 64 == 0 {
                thread::yield_now();
            }
        }
        done_tx.send(()).unwrap();
    });

    let mut seen = Vec::with_capacity(COUNT);
    while seen.len() < COUNT {
        match queue.pop_oldest() {
            Some(response) => seen.push(response.t_tracked as usize),
            None => thread::yield_now(),
        }
    }
    done_rx.recv().unwrap();
    handle.join().unwrap();

    assert!(seen.iter().copied().eq(0..COUNT));
    assert!(queue.is_empty());
}

#[test]
fn every_sent_frame_is_paired_with_its_camera() {
    const FRAMES: u64 = 50;
    let router = Arc::new(LoopbackRouter::new());
    let settings = RenderLinkSettings {
        frame_wait: FrameWaitMode::Synchronised,
        await_frame_timeout_ms: 2_000,
        ..Default::default()
    };
    let session = RenderSession::connect(router.clone(), settings).unwrap();
    let description = declare(&router, "Front", 4, 4);
    let device = Arc::new(SoftwareDevice::default());
    let mut endpoints = session
        .open_endpoints(device.clone(), session.enumerate_streams().unwrap())
        .unwrap();
    let mut endpoint = endpoints.remove(0);
    let source = source_image(&device, Extent2D::new(8, 4));

    let feed = endpoint.feed();
    let control_router = router.clone();
    let handle = description.handle;
    assert_eq!(feed.handle(), handle);
    let (frames_tx, frames_rx) = flume::unbounded::<FrameData>();
    let control = thread::spawn(move || {
        for frame in frames_rx.iter() {
            feed.capture(control_router.as_ref(), &frame).unwrap();
        }
    });

    for i in 0..FRAMES {
        router.set_camera(
            handle,
            CameraData {
                id: handle,
                x: i as f32,
                ..Default::default()
            },
        );
        frames_tx
            .send(FrameData {
                t_tracked: i as f64,
                ..Default::default()
            })
            .unwrap();
    }
    drop(frames_tx);

    for i in 0..FRAMES {
        match endpoint
            .submit(router.as_ref(), source, PixelRect::new(4, 0, 8, 4))
            .unwrap()
        {
            SubmitOutcome::Sent { fence_value, .. } => {
                assert_eq!(fence_value, FIRST_FENCE_VALUE + FENCE_STRIDE * i);
            }
            SubmitOutcome::Held => panic!("frame {i} was held"),
        }
    }
    control.join().unwrap();

    let sent = router.sent_frames();
    assert_eq!(sent.len(), FRAMES as usize);
    for (i, frame) in sent.iter().enumerate() {
        assert_eq!(frame.response.t_tracked, i as f64);
        assert_eq!(frame.stream, handle);
    }
    assert_eq!(
        endpoint.channel().fence_value(),
        Some(FIRST_FENCE_VALUE + FENCE_STRIDE * FRAMES)
    );
    assert_eq!(endpoint.counters(), (FRAMES, 0));
}

#[test]
fn atlas_viewport_lands_in_the_stream_image() {
    let router = LoopbackRouter::new();
    router
        .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
        .unwrap();
    let description = declare(&router, "Right half", 2, 2);
    let device = Arc::new(SoftwareDevice::default());
    let atlas = source_image(&device, Extent2D::new(4, 2));
    for y in 0..2 {
        for x in 0..4 {
            device.write_texel(atlas, x, y, &[x as u8, y as u8, 0, 255]).unwrap();
        }
    }

    let mut channel = FrameChannel::new(device.clone(), Duration::from_secs(1));
    channel.setup(&description).unwrap();
    channel
        .send_frame(&router, atlas, PixelRect::new(2, 0, 4, 2), &CameraResponse::default())
        .unwrap();

    let image = channel.image().unwrap();
    assert_eq!(device.texel(image, 0, 0).unwrap(), [2, 0, 0, 255]);
    assert_eq!(device.texel(image, 1, 1).unwrap(), [3, 1, 0, 255]);
}

#[test]
fn a_rejected_frame_still_consumes_its_fence_value() {
    let router = LoopbackRouter::new();
    let description = declare(&router, "Front", 2, 2);
    let device = Arc::new(SoftwareDevice::default());
    let source = source_image(&device, Extent2D::new(2, 2));
    let mut channel = FrameChannel::new(device, Duration::from_secs(1));
    channel.setup(&description).unwrap();

    // The router is not up yet, so the frame is turned down after its signal was queued.
    let result = channel.send_frame(&router, source, PixelRect::new(0, 0, 2, 2), &CameraResponse::default());
    assert!(matches!(result, Err(StreamError::Router(_))));
    assert_eq!(channel.fence_value(), Some(FIRST_FENCE_VALUE + FENCE_STRIDE));
    assert!(router.sent_frames().is_empty());

    router
        .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
        .unwrap();
    let tagged = channel
        .send_frame(&router, source, PixelRect::new(0, 0, 2, 2), &CameraResponse::default())
        .unwrap();
    assert_eq!(tagged, FIRST_FENCE_VALUE + FENCE_STRIDE);
    assert_eq!(router.sent_frames()[0].fence_value, Some(tagged));
}

#[test]
fn teardown_blocks_until_the_router_is_done() {
    let router = LoopbackRouter::new();
    router
        .initialise(RENDER_STREAM_VERSION_MAJOR, RENDER_STREAM_VERSION_MINOR)
        .unwrap();
    let description = declare(&router, "Front", 2, 2);
    let device = Arc::new(SoftwareDevice::default());
    let source = source_image(&device, Extent2D::new(2, 2));

    let mut channel = FrameChannel::new(device.clone(), Duration::from_secs(10));
    channel.setup(&description).unwrap();
    device.defer_fence_signals(true);
    channel
        .send_frame(&router, source, PixelRect::new(0, 0, 2, 2), &CameraResponse::default())
        .unwrap();

    let (started_tx, started_rx) = crossbeam_channel::bounded(0);
    let closer = thread::spawn(move || {
        started_tx.send(()).unwrap();
        let result = channel.teardown();
        (result, channel.is_bound())
    });
    started_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    // The stream image is still alive while the fence is pending.
    assert_eq!(device.image_count(), 2);
    device.complete_pending_work();

    let (result, still_bound) = closer.join().unwrap();
    assert_eq!(result, Ok(()));
    assert!(!still_bound);
    assert_eq!(device.image_count(), 1);
    assert_eq!(device.fence_count(), 0);
}
