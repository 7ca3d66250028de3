//! Fast-path state propagation.
//!
//! Between sliding-window optimizations the node keeps a low-latency pose
//! estimate by integrating every incoming IMU sample on top of the last
//! optimized state. The result drifts, but it is available at IMU rate
//! while the back-end is still chewing on the previous feature frame.

use nalgebra::{UnitQuaternion, Vector3};

use crate::backend::{Pose, WindowTail};
use crate::msg::ImuSample;

/// Default gravity in the world frame (m/s², z-up). Replaced by the
/// back-end's own estimate on the first resync.
pub const GRAVITY: Vector3<f64> = Vector3::new(0.0, 0.0, 9.81);

/// Pose, velocity, and bias state advanced by midpoint integration.
pub struct FastState {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
    /// Gravity in the world frame, from the back-end.
    gravity: Vector3<f64>,

    /// Previous measurement, for the midpoint.
    acc_prev: Vector3<f64>,
    gyr_prev: Vector3<f64>,
    /// Timestamp of the last integrated sample; `None` until the first
    /// sample seeds the clock.
    t_latest: Option<f64>,
}

impl FastState {
    pub fn new() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            gravity: GRAVITY,
            acc_prev: Vector3::zeros(),
            gyr_prev: Vector3::zeros(),
            t_latest: None,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
        }
    }

    pub fn t_latest(&self) -> Option<f64> {
        self.t_latest
    }

    /// Advance the state by one IMU sample (midpoint integration).
    ///
    /// The first sample after (re)initialization only seeds the clock.
    pub fn propagate(&mut self, sample: &ImuSample) {
        let t = sample.t.as_secs();
        let Some(t_prev) = self.t_latest else {
            self.t_latest = Some(t);
            return;
        };
        let dt = t - t_prev;
        self.t_latest = Some(t);

        let un_acc_0 = self.orientation * (self.acc_prev - self.accel_bias) - self.gravity;

        let un_gyr = 0.5 * (self.gyr_prev + sample.gyro) - self.gyro_bias;
        self.orientation *= UnitQuaternion::from_scaled_axis(un_gyr * dt);

        let un_acc_1 = self.orientation * (sample.accel - self.accel_bias) - self.gravity;
        let un_acc = 0.5 * (un_acc_0 + un_acc_1);

        self.position += dt * self.velocity + 0.5 * dt * dt * un_acc;
        self.velocity += dt * un_acc;

        self.acc_prev = sample.accel;
        self.gyr_prev = sample.gyro;
    }

    /// Reseed the state from the optimized sliding-window tail.
    ///
    /// `t_latest` restarts at the dispatcher's current IMU clock so the
    /// subsequent replay of still-buffered samples lines up.
    pub fn resync(
        &mut self,
        tail: &WindowTail,
        accel: Vector3<f64>,
        gyro: Vector3<f64>,
        gravity: Vector3<f64>,
        t_latest: Option<f64>,
    ) {
        self.position = tail.pose.position;
        self.orientation = tail.pose.orientation;
        self.velocity = tail.velocity;
        self.accel_bias = tail.accel_bias;
        self.gyro_bias = tail.gyro_bias;
        self.gravity = gravity;
        self.acc_prev = accel;
        self.gyr_prev = gyro;
        self.t_latest = t_latest;
    }
}

impl Default for FastState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;

    fn sample(t: f64, accel: Vector3<f64>, gyro: Vector3<f64>) -> ImuSample {
        ImuSample::new(Timestamp::from_secs(t), accel, gyro)
    }

    fn resynced_at(t0: f64, accel: Vector3<f64>) -> FastState {
        let mut state = FastState::new();
        state.resync(
            &WindowTail::identity(),
            accel,
            Vector3::zeros(),
            GRAVITY,
            Some(t0),
        );
        state
    }

    #[test]
    fn test_first_sample_only_seeds_clock() {
        let mut state = FastState::new();
        state.propagate(&sample(1.0, Vector3::new(5.0, 0.0, 9.81), Vector3::zeros()));
        assert_eq!(state.t_latest(), Some(1.0));
        assert_eq!(state.position, Vector3::zeros());
        assert_eq!(state.velocity, Vector3::zeros());
    }

    #[test]
    fn test_stationary_imu_cancels_gravity() {
        // A level, motionless IMU measures +g as specific force.
        let mut state = resynced_at(0.0, GRAVITY);
        for k in 1..=100 {
            state.propagate(&sample(k as f64 * 0.01, GRAVITY, Vector3::zeros()));
        }
        assert!(state.position.norm() < 1e-12);
        assert!(state.velocity.norm() < 1e-12);
    }

    #[test]
    fn test_constant_acceleration_integrates_exactly() {
        let accel = Vector3::new(1.0, 0.0, 9.81);
        let mut state = resynced_at(0.0, accel);
        for k in 1..=100 {
            state.propagate(&sample(k as f64 * 0.01, accel, Vector3::zeros()));
        }
        // 1 m/s² for 1 s.
        assert!((state.velocity.x - 1.0).abs() < 1e-9);
        assert!((state.position.x - 0.5).abs() < 1e-9);
        assert_eq!(state.t_latest(), Some(1.0));
    }

    #[test]
    fn test_constant_rate_rotation() {
        let rate = Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let mut state = FastState::new();
        // Seed the gyro midpoint with the constant rate; no gravity so the
        // zero accelerometer reading keeps the state in place.
        state.resync(
            &WindowTail::identity(),
            Vector3::zeros(),
            rate,
            Vector3::zeros(),
            Some(0.0),
        );
        for k in 1..=100 {
            state.propagate(&sample(k as f64 * 0.01, Vector3::zeros(), rate));
        }
        let angle = state.orientation.angle();
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_accel_bias_is_subtracted() {
        let bias = Vector3::new(0.2, 0.0, 0.0);
        let mut state = FastState::new();
        state.resync(
            &WindowTail {
                pose: Pose::identity(),
                velocity: Vector3::zeros(),
                accel_bias: bias,
                gyro_bias: Vector3::zeros(),
            },
            GRAVITY + bias,
            Vector3::zeros(),
            GRAVITY,
            Some(0.0),
        );
        for k in 1..=10 {
            state.propagate(&sample(k as f64 * 0.01, GRAVITY + bias, Vector3::zeros()));
        }
        assert!(state.velocity.norm() < 1e-12);
    }
}
