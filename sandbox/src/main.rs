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

// RenderLink Sandbox
// Drives a short show against the in-process loopback router.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use renderlink_core::api::{
    CameraData, FrameData, PixelFormat, ProfilingEntry, StreamDescription,
};
use renderlink_core::config::{FrameWaitMode, SceneSelectorKind};
use renderlink_core::content::{flatten_parameters, ExposedParameter, ParameterKind};
use renderlink_core::device::{Extent2D, FrameDevice, ImageId, PixelRect, StreamImageDescriptor};
use renderlink_core::RenderLinkSettings;
use renderlink_infra::{LoopbackRouter, MemoryWorld, SoftwareDevice};
use renderlink_scene::{generate_schema, ApplyOutcome, SceneSelector, SceneSource};
use renderlink_stream::{FrameTiming, RenderSession, StatusLevel, StreamEndpoint, SubmitOutcome};

const FRAMES: u32 = 120;
const STREAM_WIDTH: u32 = 64;
const STREAM_HEIGHT: u32 = 36;
const STREAMS: [&str; 2] = ["Left", "Right"];

fn settings() -> Result<RenderLinkSettings> {
    match std::env::args().nth(1) {
        Some(path) => RenderLinkSettings::load(&path)
            .with_context(|| format!("failed to load settings from {path}")),
        None => Ok(RenderLinkSettings {
            scene_selector: SceneSelectorKind::StreamingLevels,
            frame_wait: FrameWaitMode::Synchronised,
            ..Default::default()
        }),
    }
}

fn build_world() -> MemoryWorld {
    let mut world = MemoryWorld::new("Show");
    world.set_load_delay(3);
    world.set_shared_parameters(vec![ExposedParameter::new(
        "Lighting",
        "Exposure",
        ParameterKind::Float { limits: Some((0.0, 4.0)) },
        vec![1.0],
    )]);
    world.add_level("Forest", forest_parameters(), false);
    world
}

fn forest_parameters() -> Vec<ExposedParameter> {
    vec![
        ExposedParameter::new("Atmosphere", "Fog", ParameterKind::LinearColor, vec![0.5, 0.5, 0.6, 1.0]),
        ExposedParameter::new("Atmosphere", "Rain", ParameterKind::Bool, vec![0.0]),
    ]
}

fn scene_sources(world: &MemoryWorld) -> Vec<SceneSource> {
    use renderlink_core::content::ContentWorld;

    let channels = vec!["Main".to_string()];
    let exposed = |root| flatten_parameters(&world.exposed_parameters(root));
    let shared = world.shared_root().map(exposed).unwrap_or_default();
    let mut sources = vec![SceneSource::new("Show", channels.clone(), shared).with_sub_levels(
        vec!["Forest".into()],
    )];
    // Unloaded levels expose nothing yet; describe the cached content instead.
    sources.push(SceneSource::new("Forest", channels, flatten_parameters(&forest_parameters())));
    sources
}

/// Feeds frame timing and cameras into the router, standing in for the show clock.
fn spawn_clock(router: Arc<LoopbackRouter>, handles: Vec<u64>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for i in 0..FRAMES {
            let t = f64::from(i) / 60.0;
            for handle in &handles {
                router.set_camera(
                    *handle,
                    CameraData {
                        id: *handle,
                        x: t as f32,
                        focal_length: 35.0,
                        sensor_x: 36.0,
                        sensor_y: 24.0,
                        near_z: 0.1,
                        far_z: 1000.0,
                        ..Default::default()
                    },
                );
            }
            router.request_frame(FrameData {
                t_tracked: t,
                local_time: t,
                local_time_delta: 1.0 / 60.0,
                frame_rate_numerator: 60,
                frame_rate_denominator: 1,
                flags: 0,
                scene: u32::from(i >= FRAMES / 2),
            });
            thread::sleep(Duration::from_millis(2));
        }
    })
}

/// Renders one atlas per frame and sends each stream its slice of it.
fn spawn_renderer(
    router: Arc<LoopbackRouter>,
    device: Arc<SoftwareDevice>,
    atlas: ImageId,
    mut endpoints: Vec<StreamEndpoint>,
    jobs: flume::Receiver<u32>,
) -> thread::JoinHandle<Result<Vec<StreamEndpoint>>> {
    thread::spawn(move || {
        for scene in jobs.iter() {
            let shade = if scene == 0 { 40 } else { 200 };
            device.fill(atlas, &[shade, shade / 2, 20, 255])?;
            for (i, endpoint) in endpoints.iter_mut().enumerate() {
                let left = i as u32 * STREAM_WIDTH;
                let viewport = PixelRect::new(left, 0, left + STREAM_WIDTH, STREAM_HEIGHT);
                match endpoint.submit(router.as_ref(), atlas, viewport)? {
                    SubmitOutcome::Sent { fence_value, response } => log::trace!(
                        "Sent '{}' t={} fence={fence_value}",
                        endpoint.description().name,
                        response.t_tracked
                    ),
                    SubmitOutcome::Held => log::debug!("Held '{}'", endpoint.description().name),
                }
            }
        }
        Ok(endpoints)
    })
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = settings()?;
    let router = Arc::new(LoopbackRouter::new());
    for name in STREAMS {
        router.add_stream(StreamDescription {
            channel: "Main".into(),
            name: name.into(),
            width: STREAM_WIDTH,
            height: STREAM_HEIGHT,
            format: PixelFormat::Bgra8,
            ..Default::default()
        });
    }

    let mut session = RenderSession::connect(router.clone(), settings.clone())?;
    let mut world = build_world();
    let schema = generate_schema(settings.scene_selector, Some("Show"), &scene_sources(&world))?;
    if settings.schema_path.is_some() {
        session.save_schema(&schema)?;
        let reloaded = session.load_schema()?;
        log::info!("Schema round-tripped with {} scenes", reloaded.scenes.len());
    }
    let published = session.publish_schema(&schema)?;

    let mut selector = SceneSelector::new(settings.scene_selector);
    selector.on_loaded_schema(&world, published)?;

    let device = Arc::new(SoftwareDevice::default());
    let endpoints = session.open_endpoints(device.clone(), session.enumerate_streams()?)?;
    let feeds: Vec<_> = endpoints.iter().map(StreamEndpoint::feed).collect();
    let atlas = device.create_stream_image(&StreamImageDescriptor {
        label: Some("atlas".into()),
        size: Extent2D::new(STREAM_WIDTH * STREAMS.len() as u32, STREAM_HEIGHT),
        format: PixelFormat::Bgra8,
    })?;

    let clock = spawn_clock(router.clone(), feeds.iter().map(|f| f.handle()).collect());
    let (jobs_tx, jobs_rx) = flume::unbounded();
    let renderer = spawn_renderer(router.clone(), device.clone(), atlas, endpoints, jobs_rx);

    let mut fresh = 0;
    while fresh < FRAMES {
        let FrameTiming::Fresh(frame) = session.begin_frame()? else {
            thread::yield_now();
            continue;
        };
        fresh += 1;
        world.tick();
        match selector.apply_scene(&mut world, router.as_ref(), frame.scene) {
            Ok(ApplyOutcome::Loading) => log::debug!("Scene {} is loading", frame.scene),
            Ok(_) => {}
            Err(e) => log::warn!("Unable to apply scene {}: {e}", frame.scene),
        }
        for feed in &feeds {
            feed.capture(router.as_ref(), &frame)?;
        }
        jobs_tx
            .send(frame.scene)
            .map_err(|_| anyhow!("render thread stopped"))?;
    }
    drop(jobs_tx);

    clock.join().map_err(|_| anyhow!("clock thread panicked"))?;
    let endpoints = renderer
        .join()
        .map_err(|_| anyhow!("render thread panicked"))??;

    let mut sent = 0;
    for endpoint in endpoints {
        let (frames_sent, frames_held) = endpoint.counters();
        log::info!(
            "Stream '{}': {frames_sent} sent, {frames_held} held",
            endpoint.description().name
        );
        sent += frames_sent;
        endpoint.close().map_err(|(_, e)| e)?;
    }

    session.post_profiling(&[ProfilingEntry::new("Frames sent", sent as f32)])?;
    session.post_status(StatusLevel::Green, "Show complete");
    session.shutdown()?;
    Ok(())
}
