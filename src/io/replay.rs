//! Loaders for recorded sensor logs.
//!
//! IMU logs use the EuRoC `imu0/data.csv` layout: `timestamp [ns], w_x,
//! w_y, w_z, a_x, a_y, a_z`. Feature logs carry one row per tracked
//! point: `timestamp [ns], feature_id, camera_id, x, y, z, u, v, vx, vy`,
//! with the rows of one frame stored consecutively.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use nalgebra::{Vector2, Vector3};

use crate::clock::Timestamp;
use crate::msg::{FeatureBundle, FeaturePoint, ImuSample};

pub fn load_imu_log<P: AsRef<Path>>(path: P) -> Result<Vec<ImuSample>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut samples = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 7 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let gyro = Vector3::new(
            rec[1].trim().parse()?,
            rec[2].trim().parse()?,
            rec[3].trim().parse()?,
        );
        let accel = Vector3::new(
            rec[4].trim().parse()?,
            rec[5].trim().parse()?,
            rec[6].trim().parse()?,
        );
        samples.push(ImuSample::new(Timestamp::from_nanos(ts), accel, gyro));
    }
    Ok(samples)
}

pub fn load_feature_log<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureBundle>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut bundles: Vec<FeatureBundle> = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 10 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let t = Timestamp::from_nanos(ts);
        let point = FeaturePoint {
            id: rec[1].trim().parse()?,
            camera: rec[2].trim().parse()?,
            point: Vector3::new(
                rec[3].trim().parse()?,
                rec[4].trim().parse()?,
                rec[5].trim().parse()?,
            ),
            pixel: Vector2::new(rec[6].trim().parse()?, rec[7].trim().parse()?),
            velocity: Vector2::new(rec[8].trim().parse()?, rec[9].trim().parse()?),
        };

        match bundles.last_mut() {
            Some(bundle) if bundle.t == t => bundle.points.push(point),
            _ => bundles.push(FeatureBundle {
                t,
                points: vec![point],
            }),
        }
    }
    Ok(bundles)
}
