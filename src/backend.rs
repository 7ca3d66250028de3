//! The back-end estimator boundary.
//!
//! The coordinator drives an opaque nonlinear estimator through this
//! trait: it feeds time-aligned IMU steps and feature frames in, and reads
//! the optimized sliding-window tail back out to reseed the fast path.
//! Preintegration, initialization, bundle adjustment, and marginalization
//! all live behind this seam.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::clock::Timestamp;
use crate::msg::FeatureMap;

/// Tail index of the back-end's fixed-size keyframe window.
pub const WINDOW_SIZE: usize = 10;

/// Solver phase of the back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverFlag {
    /// Still initializing; the sliding window is not yet optimized.
    Initial,
    /// Sliding-window optimization has converged at least once.
    NonLinear,
}

/// A position/orientation pair in the world frame.
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Snapshot of the newest sliding-window state (index `WINDOW_SIZE`).
#[derive(Debug, Clone, Copy)]
pub struct WindowTail {
    pub pose: Pose,
    pub velocity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
}

impl WindowTail {
    pub fn identity() -> Self {
        Self {
            pose: Pose::identity(),
            velocity: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
        }
    }
}

/// Operations the coordinator invokes on the back-end, plus its readable
/// surface. Every call happens under the estimator mutex, from the
/// dispatcher thread only.
pub trait Backend: Send {
    /// Feed one IMU step of duration `dt` seconds.
    fn process_imu(&mut self, dt: f64, accel: Vector3<f64>, gyro: Vector3<f64>);

    /// Feed one feature frame.
    fn process_image(&mut self, features: FeatureMap, t: Timestamp);

    /// Install a relocalization frame from the pose-graph source.
    fn set_relo_frame(
        &mut self,
        stamp: Timestamp,
        frame_index: u64,
        match_points: Vec<Vector3<f64>>,
        translation: Vector3<f64>,
        rotation: Matrix3<f64>,
    );

    /// Drop all estimator state (restart).
    fn clear_state(&mut self);

    /// (Re)load estimator parameters (restart).
    fn set_parameter(&mut self);

    fn solver_flag(&self) -> SolverFlag;

    /// Newest optimized window state.
    fn window_tail(&self) -> WindowTail;

    /// Last IMU measurement the back-end accepted: `(accel, gyro)`.
    fn last_imu(&self) -> (Vector3<f64>, Vector3<f64>);

    /// Gravity vector in the world frame.
    fn gravity(&self) -> Vector3<f64>;

    /// Current visual-to-inertial time offset estimate `td`, seconds.
    fn time_offset(&self) -> f64;

    /// Poses of every keyframe in the window, oldest first.
    fn key_poses(&self) -> Vec<Pose> {
        Vec::new()
    }

    /// Landmarks of the marginalized frame, world frame.
    fn marginal_cloud(&self) -> Vec<Vector3<f64>> {
        Vec::new()
    }

    /// Camera pose for the newest frame. Back-ends that know their
    /// body-to-camera extrinsics override this; the default is the body
    /// pose.
    fn camera_pose(&self) -> Pose {
        self.window_tail().pose
    }
}
