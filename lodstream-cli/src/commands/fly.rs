//! `fly`: descend a synthetic camera onto a tileset and report what the
//! engine keeps resident at each step.

use std::sync::{Arc, Mutex};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use lodstream::config::{format_size, ConfigFile};
use lodstream::engine::{EngineEvents, TilesetEngine};
use lodstream::geometry::Vec3;
use lodstream::loader::{DefaultFetcher, GeometryLoader, LoadErrorKind};
use lodstream::tileset::{LayerDescriptor, NodeId, TilesetError, TilesetId};
use lodstream::ViewState;
use tracing::info;

use crate::error::CliError;

const FIELD_OF_VIEW_DEG: f64 = 60.0;
const ASPECT_RATIO: f64 = 16.0 / 9.0;
const SCREEN_HEIGHT_PX: f64 = 1080.0;
/// Default start altitude, in root bounding radii above the centre.
const DEFAULT_ALTITUDE_RADII: f64 = 4.0;
/// Closest approach, as a fraction of the root bounding radius.
const FINAL_DISTANCE_FRACTION: f64 = 0.05;

#[derive(Debug, Args)]
pub struct FlyArgs {
    /// Tileset document: HTTP(S) URL, file:// URL or local path
    pub tileset: String,

    /// Layer id used in node identities
    #[arg(long, default_value = "layer")]
    pub id: String,

    /// Opaque access token forwarded with every request
    #[arg(long)]
    pub token: Option<String>,

    /// Number of camera positions
    #[arg(long, default_value_t = 10)]
    pub steps: usize,

    /// Start distance from the tileset centre in metres
    #[arg(long)]
    pub altitude: Option<f64>,

    /// Memory budget override in MiB
    #[arg(long)]
    pub budget_mb: Option<u64>,
}

/// Collects failures for the final summary.
#[derive(Default)]
struct FlyEvents {
    tileset_error: Mutex<Option<String>>,
    timeouts: Mutex<usize>,
}

impl EngineEvents for FlyEvents {
    fn on_tileset_error(&self, _tileset: &TilesetId, error: &TilesetError) {
        if let Ok(mut slot) = self.tileset_error.lock() {
            *slot = Some(error.to_string());
        }
    }

    fn on_load_error(&self, _node_id: &NodeId, kind: LoadErrorKind) {
        if kind == LoadErrorKind::Timeout {
            if let Ok(mut n) = self.timeouts.lock() {
                *n += 1;
            }
        }
    }
}

/// One camera pose on the descent.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Pose {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
    distance: f64,
}

/// Geometric descent from `altitude` to a fraction of `radius`, looking at
/// `center` from "above" (away from the origin for geocentric data, +z for
/// local data).
fn camera_path(center: Vec3, radius: f64, altitude: f64, steps: usize) -> Vec<Pose> {
    let outward = if center.length() > radius {
        center.normalize()
    } else {
        Vec3::Z
    };
    let up = if outward.cross(Vec3::Y).length() > 1e-6 {
        Vec3::Y
    } else {
        Vec3::X
    };
    let closest = (radius * FINAL_DISTANCE_FRACTION).max(1.0).min(altitude);

    (0..steps)
        .map(|i| {
            let t = if steps > 1 {
                i as f64 / (steps - 1) as f64
            } else {
                0.0
            };
            let distance = altitude * (closest / altitude).powf(t);
            Pose {
                position: center + outward * distance,
                direction: -outward,
                up,
                distance,
            }
        })
        .collect()
}

pub async fn run(args: FlyArgs, config: &ConfigFile) -> Result<(), CliError> {
    if args.steps == 0 {
        return Err(CliError::InvalidArgument("--steps must be at least 1".to_string()));
    }

    let mut engine_config = config.engine_config();
    if let Some(mb) = args.budget_mb {
        engine_config = engine_config.with_memory_budget_mb(mb);
    }
    let max_sse = engine_config.maximum_screen_space_error;

    let fetcher = Arc::new(DefaultFetcher::new()?);
    let loader = Arc::new(GeometryLoader::new(Arc::clone(&fetcher)));
    let events = Arc::new(FlyEvents::default());
    let mut engine = TilesetEngine::new(engine_config, loader, fetcher, events.clone());

    let id = TilesetId::new(&args.id);
    let mut descriptor = LayerDescriptor::new(args.id, args.tileset);
    if let Some(token) = args.token {
        descriptor = descriptor.with_token(token);
    }
    engine.add_layer(descriptor)?;
    engine.run_until_idle().await;

    let (center, radius) = {
        let Some(arena) = engine.tileset(&id) else {
            let reason = events
                .tileset_error
                .lock()
                .ok()
                .and_then(|e| e.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(CliError::Config(format!("tileset failed to load: {}", reason)));
        };
        let root = arena
            .get(arena.root())
            .and_then(|n| n.bounding_volume.as_ref())
            .ok_or_else(|| CliError::InvalidArgument("tileset root has no bounding volume".to_string()))?;
        (root.center(), root.bounding_radius())
    };
    let altitude = args
        .altitude
        .unwrap_or(radius * DEFAULT_ALTITUDE_RADII)
        .max(1.0);
    info!(tileset = %id, radius, altitude, steps = args.steps, "Starting fly-through");

    let progress = ProgressBar::new(args.steps as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    for (step, pose) in camera_path(center, radius, altitude, args.steps).into_iter().enumerate() {
        let view = ViewState::perspective(
            pose.position,
            pose.direction,
            pose.up,
            FIELD_OF_VIEW_DEG.to_radians(),
            ASPECT_RATIO,
            SCREEN_HEIGHT_PX,
        )
        .with_maximum_screen_space_error(max_sse);

        progress.set_message(format!("{:.0} m", pose.distance));
        let report = engine.on_view_state_changed(&view);
        let in_flight = engine.scheduler().in_flight_count();
        engine.run_until_idle().await;

        let stats = engine.stats();
        progress.println(format!(
            "step {:>3}  dist {:>10.1} m  in-flight={:<3} admitted={:<4} {}",
            step + 1,
            pose.distance,
            in_flight,
            report.admitted,
            stats.totals
        ));
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let stats = engine.stats();
    let timeouts = events.timeouts.lock().map(|n| *n).unwrap_or(0);
    println!();
    println!("Passes:     {}", stats.passes);
    println!("Loaded:     {}", stats.totals.tiles_loaded);
    println!("Failed:     {} ({} timed out)", stats.totals.tiles_failed, timeouts);
    println!("Evicted:    {}", stats.totals.tiles_evicted);
    println!("Retries:    {}", stats.totals.load_retries);
    println!(
        "Resident:   {}",
        format_size(engine.cache().total_bytes() as usize)
    );
    println!("Warnings:   {}", engine.warnings().len());
    Ok(())
}
