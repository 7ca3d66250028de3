//! Feature-bundle messages and their point-cloud wire encoding.
//!
//! A bundle carries one frame's worth of tracked points. On the wire each
//! point is a normalized camera coordinate `(x, y, 1)` plus five parallel
//! channels indexed by point position:
//!
//! - channel 0: `feature_id * NUM_OF_CAM + camera_id`, stored as a float
//! - channel 1/2: pixel `u`, `v`
//! - channel 3/4: pixel velocity `vx`, `vy`

use std::collections::HashMap;

use nalgebra::{SVector, Vector2, Vector3};

use crate::clock::Timestamp;

/// Number of cameras encoded into channel 0.
pub const NUM_OF_CAM: u64 = 1;

/// Per-feature observation fed to the back-end: `[x, y, z, u, v, vx, vy]`,
/// keyed by feature id, one entry per observing camera.
pub type FeatureMap = HashMap<u64, Vec<(u32, SVector<f64, 7>)>>;

/// Encode a feature/camera pair into the channel-0 float.
pub fn encode_id(feature_id: u64, camera_id: u32) -> f64 {
    debug_assert!((camera_id as u64) < NUM_OF_CAM);
    (feature_id * NUM_OF_CAM + camera_id as u64) as f64
}

/// Decode the channel-0 float back into `(feature_id, camera_id)`.
///
/// The float is rounded to the nearest integer before splitting, so the
/// encode/decode pair round-trips for every non-negative integer input.
pub fn decode_id(value: f64) -> (u64, u32) {
    let v = (value + 0.5) as u64;
    (v / NUM_OF_CAM, (v % NUM_OF_CAM) as u32)
}

/// One tracked image point.
#[derive(Debug, Clone, Copy)]
pub struct FeaturePoint {
    pub id: u64,
    pub camera: u32,
    /// Normalized camera coordinates, `z == 1`.
    pub point: Vector3<f64>,
    /// Pixel coordinates `(u, v)`.
    pub pixel: Vector2<f64>,
    /// Pixel-space optical-flow velocity `(vx, vy)`.
    pub velocity: Vector2<f64>,
}

/// One frame's worth of tracked feature points.
#[derive(Debug, Clone)]
pub struct FeatureBundle {
    pub t: Timestamp,
    pub points: Vec<FeaturePoint>,
}

impl FeatureBundle {
    /// Decode a bundle from its point-cloud wire form.
    ///
    /// Panics if the channels do not match the point count or a point
    /// violates the `z == 1` normalized-coordinate contract.
    pub fn from_cloud(t: Timestamp, points: &[Vector3<f64>], channels: &[Vec<f64>; 5]) -> Self {
        for channel in channels {
            assert_eq!(channel.len(), points.len());
        }

        let points = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                assert!(p.z == 1.0, "feature point with non-unit depth");
                let (id, camera) = decode_id(channels[0][i]);
                FeaturePoint {
                    id,
                    camera,
                    point: *p,
                    pixel: Vector2::new(channels[1][i], channels[2][i]),
                    velocity: Vector2::new(channels[3][i], channels[4][i]),
                }
            })
            .collect();

        Self { t, points }
    }

    /// Group the points by feature id into the observation map the
    /// back-end consumes.
    pub fn feature_map(&self) -> FeatureMap {
        let mut map = FeatureMap::new();
        for p in &self.points {
            let obs = SVector::<f64, 7>::from_column_slice(&[
                p.point.x, p.point.y, p.point.z, p.pixel.x, p.pixel.y, p.velocity.x, p.velocity.y,
            ]);
            map.entry(p.id).or_insert_with(Vec::new).push((p.camera, obs));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for feature_id in 0..1000 {
            for camera_id in 0..NUM_OF_CAM as u32 {
                let encoded = encode_id(feature_id, camera_id);
                assert_eq!(decode_id(encoded), (feature_id, camera_id));
            }
        }
    }

    #[test]
    fn test_id_round_trip_survives_float_noise() {
        // A transport that perturbs the float below the rounding threshold
        // must not change the decoded ids.
        let encoded = encode_id(4217, 0);
        assert_eq!(decode_id(encoded + 0.49), (4217, 0));
        assert_eq!(decode_id(encoded - 0.49), (4217, 0));
    }

    #[test]
    fn test_from_cloud_decodes_channels() {
        let points = vec![Vector3::new(0.1, -0.2, 1.0), Vector3::new(0.3, 0.4, 1.0)];
        let channels = [
            vec![encode_id(7, 0), encode_id(9, 0)],
            vec![100.0, 200.0],
            vec![110.0, 210.0],
            vec![1.0, -1.0],
            vec![2.0, -2.0],
        ];
        let bundle = FeatureBundle::from_cloud(Timestamp::from_secs(0.5), &points, &channels);

        assert_eq!(bundle.points.len(), 2);
        assert_eq!(bundle.points[0].id, 7);
        assert_eq!(bundle.points[1].id, 9);
        assert_eq!(bundle.points[1].pixel, Vector2::new(200.0, 210.0));
        assert_eq!(bundle.points[1].velocity, Vector2::new(-1.0, -2.0));

        let map = bundle.feature_map();
        assert_eq!(map.len(), 2);
        let obs = &map[&7][0];
        assert_eq!(obs.0, 0);
        assert_eq!(obs.1.as_slice(), &[0.1, -0.2, 1.0, 100.0, 110.0, 1.0, 2.0]);
    }

    #[test]
    #[should_panic(expected = "non-unit depth")]
    fn test_from_cloud_rejects_non_unit_depth() {
        let points = vec![Vector3::new(0.1, 0.2, 0.99)];
        let channels = [vec![0.0], vec![0.0], vec![0.0], vec![0.0], vec![0.0]];
        FeatureBundle::from_cloud(Timestamp::from_secs(0.0), &points, &channels);
    }
}
