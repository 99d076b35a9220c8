use std::path::PathBuf;

use accel_calibration::calibration::align_rotations_within;
use accel_calibration::types::{rotation_from_euler, EulerAngles, Mat3, Vec3};
use accel_calibration::{update, Calibration, CalibrationConfig, CalibrationSummary, FitReport};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "accel_calibrate")]
#[command(about = "Simulate a rig of accelerometers and calibrate offset, scale and mounting rotation", long_about = None)]
struct Args {
    /// Number of rigidly mounted accelerometers
    #[arg(long, default_value = "2")]
    channels: usize,

    /// Yaw step between consecutive channels' mountings (degrees)
    #[arg(long, default_value = "10.0")]
    mount_deg: f64,

    /// Number of stationary poses the rig is held in
    #[arg(long, default_value = "12")]
    orientations: usize,

    /// Ticks each pose is held for
    #[arg(long, default_value = "15")]
    hold: usize,

    /// Uniform per-axis sample noise amplitude (g)
    #[arg(long, default_value = "0.005")]
    noise: f64,

    /// Seed for the simulated rig (and the swarm, unless the config sets one)
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Solver time budget per fit in seconds (overrides the config; inf = no limit)
    #[arg(long)]
    time_limit: Option<f64>,

    /// TOML calibration config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibrate again without time limit once all poses are collected
    #[arg(long)]
    refit: bool,
}

/// Ground truth of one simulated channel
struct ChannelTruth {
    offset: Vec3,
    scale: Vec3,
    mount: Mat3,
    mount_deg: f64,
}

impl ChannelTruth {
    /// Raw reading that calibrates to `R_mount · gravity`
    fn raw(&self, gravity: &Vec3) -> Vec3 {
        (self.mount * gravity + self.offset).component_div(&self.scale)
    }
}

#[derive(Serialize)]
struct ChannelReport {
    channel: usize,
    true_offset: [f64; 3],
    true_scale: [f64; 3],
    mount_yaw_deg: f64,
    fitted: CalibrationSummary,
}

fn random_unit(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            2.0 * rng.random::<f64>() - 1.0,
            2.0 * rng.random::<f64>() - 1.0,
            2.0 * rng.random::<f64>() - 1.0,
        );
        let norm = v.norm();
        if norm > 0.1 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn symmetric(rng: &mut StdRng, amplitude: f64) -> f64 {
    amplitude * (2.0 * rng.random::<f64>() - 1.0)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CalibrationConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CalibrationConfig::default(),
    };
    if let Some(time_limit) = args.time_limit {
        config.time_limit = time_limit;
    }
    if config.swarm.seed.is_none() {
        config.swarm.seed = Some(args.seed);
    }
    config.validate().context("invalid calibration config")?;
    if args.channels == 0 {
        anyhow::bail!("--channels must be at least 1");
    }

    info!("Accelerometer calibration simulator starting");
    info!("  Channels: {}", args.channels);
    info!("  Mounting step: {:.2}°", args.mount_deg);
    info!("  Poses: {} x {} ticks", args.orientations, args.hold);
    info!("  Noise: {} g", args.noise);
    info!("  Time limit: {} s", config.time_limit);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let truths: Vec<ChannelTruth> = (0..args.channels)
        .map(|channel| {
            let mount_deg = args.mount_deg * channel as f64;
            ChannelTruth {
                offset: Vec3::new(
                    symmetric(&mut rng, 0.1),
                    symmetric(&mut rng, 0.1),
                    symmetric(&mut rng, 0.1),
                ),
                scale: Vec3::new(
                    1.0 + symmetric(&mut rng, 0.05),
                    1.0 + symmetric(&mut rng, 0.05),
                    1.0 + symmetric(&mut rng, 0.05),
                ),
                mount: rotation_from_euler(&EulerAngles::new(0.0, 0.0, mount_deg.to_radians())),
                mount_deg,
            }
        })
        .collect();

    let mut group: Vec<Calibration> = (0..args.channels)
        .map(|channel| {
            Calibration::from_config(&config).with_callback(move |report: &FitReport| {
                info!(
                    "[ch{}] {:?} fit: cost={:.3e} iterations={} converged={}",
                    channel, report.kind, report.cost, report.iterations, report.converged
                );
            })
        })
        .collect();

    let mut accepted = 0usize;
    for pose in 0..args.orientations {
        let gravity = random_unit(&mut rng);
        for _ in 0..args.hold {
            let samples: Vec<Vec3> = truths
                .iter()
                .map(|truth| {
                    let noise = Vec3::new(
                        symmetric(&mut rng, args.noise),
                        symmetric(&mut rng, args.noise),
                        symmetric(&mut rng, args.noise),
                    );
                    truth.raw(&gravity) + noise
                })
                .collect();
            if update(&mut group, &samples)? {
                accepted += 1;
                info!(
                    "Pose {} accepted as calibration point {} (gravity [{:.3}, {:.3}, {:.3}])",
                    pose, accepted, gravity[0], gravity[1], gravity[2]
                );
            }
        }
    }
    info!(
        "Collected {} calibration points from {} poses",
        accepted, args.orientations
    );

    if args.refit && accepted >= 3 {
        info!("Calibrating again without time limit");
        for calibration in group.iter_mut() {
            calibration.refit(None)?;
        }
        align_rotations_within(&mut group, None)?;
    }

    let reports: Vec<ChannelReport> = group
        .iter()
        .zip(truths.iter())
        .enumerate()
        .map(|(channel, (calibration, truth))| ChannelReport {
            channel,
            true_offset: truth.offset.into(),
            true_scale: truth.scale.into(),
            mount_yaw_deg: truth.mount_deg,
            fitted: calibration.summary(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
