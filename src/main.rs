// Scene scan demo: drives the scene understanding plugin against a simulated
// room and publishes the scanned surfaces into an ECS world.
//
// Usage: scene_scan_demo [settings.json]

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};
use rand::Rng;

use scene_understanding::engine::{EcsTrackedGeometry, GeometryKind, TrackedGeometry};
use scene_understanding::scan::{
    CaptureType, CustomCaptureSupport, FrameContext, OpenXrExtensionPlugin, SceneUnderstandingPlugin, SessionInfo,
    TraceChannels,
};
use scene_understanding::xr::simulated::{SimulatedInstance, SimulatedRuntime, SimulatedScan, SimulatedSurface};
use scene_understanding::xr::{SceneObjectKind, SessionId, SpaceId, XrPose, XrTime};
use scene_understanding::{ScanSettings, SessionConfig};

const FRAME_COUNT: u32 = 600;
const FRAME_INTERVAL_NS: XrTime = 11_111_111; // 90 Hz
const CAPTURE_OFF_FRAME: u32 = 400;
const WORLD_TO_METERS: f32 = 100.0;

// ============================================================================
// ROOM GENERATION
// ============================================================================

fn surface_pose(position: Vec3, orientation: Quat) -> XrPose {
    XrPose { orientation, position }
}

/// Floor, ceiling, four walls and a few tables, in runtime coordinates.
fn build_room(rng: &mut impl Rng) -> SimulatedScan {
    let width = rng.gen_range(3.0..6.0);
    let depth = rng.gen_range(3.0..6.0);
    let height = rng.gen_range(2.4..3.0);
    let face_up = Quat::from_rotation_x(-FRAC_PI_2);
    let face_down = Quat::from_rotation_x(FRAC_PI_2);

    let mut surfaces = vec![
        SimulatedSurface::plane(1, SceneObjectKind::Floor, width, depth)
            .with_pose(surface_pose(Vec3::new(0.0, -1.6, 0.0), face_up))
            .with_quad_mesh(),
        SimulatedSurface::plane(2, SceneObjectKind::Ceiling, width, depth)
            .with_pose(surface_pose(Vec3::new(0.0, height - 1.6, 0.0), face_down)),
    ];

    let walls = [
        (Vec3::new(0.0, 0.0, -depth * 0.5), 0.0, width),
        (Vec3::new(0.0, 0.0, depth * 0.5), std::f32::consts::PI, width),
        (Vec3::new(-width * 0.5, 0.0, 0.0), FRAC_PI_2, depth),
        (Vec3::new(width * 0.5, 0.0, 0.0), -FRAC_PI_2, depth),
    ];
    for (index, (position, yaw, span)) in walls.into_iter().enumerate() {
        surfaces.push(
            SimulatedSurface::plane(10 + index as u128, SceneObjectKind::Wall, span, height)
                .with_pose(surface_pose(position, Quat::from_rotation_y(yaw)))
                .with_quad_mesh(),
        );
    }

    let table_count = rng.gen_range(1..4);
    for index in 0..table_count {
        let position = Vec3::new(
            rng.gen_range(-width * 0.3..width * 0.3),
            rng.gen_range(-0.9..-0.8),
            rng.gen_range(-depth * 0.3..depth * 0.3),
        );
        surfaces.push(
            SimulatedSurface::plane(20 + index as u128, SceneObjectKind::Platform, 1.2, 0.8)
                .with_pose(surface_pose(position, face_up)),
        );
    }

    log::info!(
        "Simulated room {:.1}m x {:.1}m x {:.1}m with {} surfaces",
        width,
        depth,
        height,
        surfaces.len()
    );
    SimulatedScan::new(surfaces)
}

// ============================================================================
// MAIN
// ============================================================================

fn load_settings() -> ScanSettings {
    let Some(path) = std::env::args().nth(1) else {
        return ScanSettings::default();
    };
    match ScanSettings::load(&path) {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    let mut settings = load_settings();
    settings.mesh_detection = true;

    let runtime = Arc::new(SimulatedRuntime::new());
    let mut rng = rand::thread_rng();
    let room = build_room(&mut rng);
    // First scan sees part of the room; later scans see all of it.
    let partial = SimulatedScan::new(room.surfaces.iter().take(3).cloned().collect());
    runtime.queue_scan(partial, 5);
    runtime.queue_scan(room, 8);

    let instance = SimulatedInstance::new(runtime.clone());
    let mut plugin = SceneUnderstandingPlugin::new(settings, EcsTrackedGeometry::new());
    if let Err(err) = plugin.on_create_session(&instance) {
        log::error!("Scene understanding unavailable: {err}");
        std::process::exit(1);
    }
    plugin.on_begin_session(&SessionInfo {
        session: SessionId(1),
        view_space: SpaceId(2),
        xr_system_name: "OpenXR".to_string(),
    });
    if let Some(capture) = plugin.custom_capture_support(CaptureType::SceneUnderstanding) {
        capture.on_start_ar_session(&SessionConfig {
            horizontal_plane_detection: true,
            vertical_plane_detection: true,
        });
        capture.on_toggle_ar_capture(true);
    }

    let mut display_time: XrTime = 0;
    let mut last_status = Instant::now();
    for frame in 0..FRAME_COUNT {
        if frame == CAPTURE_OFF_FRAME {
            log::info!("Capture off, locating existing surfaces only");
            if let Some(capture) = plugin.custom_capture_support(CaptureType::SceneUnderstanding) {
                capture.on_toggle_ar_capture(false);
            }
        }

        display_time += FRAME_INTERVAL_NS;
        plugin.update_device_locations(&FrameContext {
            display_time,
            tracking_space: SpaceId(3),
            world_to_meters: WORLD_TO_METERS,
        });

        let now = Instant::now();
        if (now - last_status).as_secs_f32() >= 0.25 {
            if let Some(holder) = plugin.holder() {
                log::info!(
                    "Frame {frame} | {:?} | planes: {} | meshes: {} | batches: {}",
                    plugin.scan_state(),
                    holder.count_of(GeometryKind::Plane),
                    holder.count_of(GeometryKind::Mesh),
                    holder.batches_applied()
                );
            }
            last_status = now;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    // Straight down from head height through the floor.
    let start = Vec3::new(0.0, 0.0, 50.0);
    let end = Vec3::new(0.0, 0.0, -500.0);
    let mut hits = plugin.on_line_trace_tracked_objects(start, end, TraceChannels::PLANE_USING_EXTENT);
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    println!("Line trace: {} hits", hits.len());
    for hit in &hits {
        let kind = plugin
            .holder()
            .and_then(|holder| holder.geometry(hit.geometry))
            .map(|TrackedGeometry { kind, .. }| kind);
        println!(
            "  {:>8.1} cm  {:?} {:032x} at {:?}",
            hit.distance, kind, hit.geometry.0, hit.local_to_world.translation
        );
    }

    plugin.unregister();
    println!(
        "Compute requests: {} | scenes destroyed: {} | locate calls: {}",
        runtime.compute_requests().len(),
        runtime.destroyed_scenes(),
        runtime.locate_calls()
    );
}
