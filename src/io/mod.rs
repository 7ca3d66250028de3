//! Recorded-log loading for offline replay.

pub mod replay;

pub use replay::{load_feature_log, load_imu_log};
