use nalgebra::Vector3;

use crate::clock::Timestamp;

/// Single IMU measurement: specific force and angular rate in the body frame.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    pub t: Timestamp,
    /// Linear acceleration (m/s²).
    pub accel: Vector3<f64>,
    /// Angular velocity (rad/s).
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    pub fn new(t: Timestamp, accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self { t, accel, gyro }
    }
}
