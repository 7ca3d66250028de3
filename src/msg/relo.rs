//! Relocalization (loop-closure) messages from the pose-graph source.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::clock::Timestamp;

/// Loop-closure correspondence pinning the current window to a prior
/// keyframe.
#[derive(Debug, Clone)]
pub struct ReloBundle {
    pub t: Timestamp,
    /// Index of the matched keyframe in the pose graph.
    pub frame_index: u64,
    /// Matched points, normalized coordinates of the prior keyframe.
    pub match_points: Vec<Vector3<f64>>,
    /// Pose of the matched keyframe.
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl ReloBundle {
    /// Decode a bundle from its point-cloud wire form. The single channel
    /// carries eight scalars: `t_x, t_y, t_z, q_w, q_x, q_y, q_z,
    /// frame_index`.
    pub fn from_cloud(t: Timestamp, match_points: Vec<Vector3<f64>>, channel: &[f64]) -> Self {
        assert!(channel.len() >= 8, "relocalization channel too short");

        let translation = Vector3::new(channel[0], channel[1], channel[2]);
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(
            channel[3], channel[4], channel[5], channel[6],
        ));
        let frame_index = (channel[7] + 0.5) as u64;

        Self {
            t,
            frame_index,
            match_points,
            translation,
            rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cloud_channel_order() {
        let points = vec![Vector3::new(0.1, 0.2, 1.0)];
        // 90 degrees about z.
        let half = std::f64::consts::FRAC_PI_4;
        let channel = [1.0, 2.0, 3.0, half.cos(), 0.0, 0.0, half.sin(), 42.0];
        let relo = ReloBundle::from_cloud(Timestamp::from_secs(1.0), points, &channel);

        assert_eq!(relo.translation, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(relo.frame_index, 42);
        let rotated = relo.rotation * Vector3::x();
        assert!((rotated - Vector3::y()).norm() < 1e-12);
    }
}
