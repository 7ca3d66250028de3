//! Bounded-by-transport FIFO queues for the three sensor streams.
//!
//! All three queues live under the single queue mutex owned by
//! [`NodeShared`](super::NodeShared); the ingress guards (out-of-order IMU
//! rejection, first-feature drop) are applied here so that guard state and
//! queue state stay consistent under one lock.

use std::collections::VecDeque;

use tracing::warn;

use crate::msg::{FeatureBundle, ImuSample, ReloBundle};

pub struct SensorQueues {
    pub(crate) imu: VecDeque<ImuSample>,
    pub(crate) features: VecDeque<FeatureBundle>,
    pub(crate) relo: VecDeque<ReloBundle>,

    /// Timestamp of the newest accepted IMU sample, seconds.
    t_last_imu: f64,
    /// The very first feature bundle carries no optical-flow velocities
    /// and is dropped.
    seen_first_feature: bool,
    /// Times the alignment engine stalled waiting for IMU to cover the
    /// oldest feature frame.
    pub(crate) wait_count: u64,
}

impl SensorQueues {
    pub fn new() -> Self {
        Self {
            imu: VecDeque::new(),
            features: VecDeque::new(),
            relo: VecDeque::new(),
            t_last_imu: 0.0,
            seen_first_feature: false,
            wait_count: 0,
        }
    }

    /// Enqueue an IMU sample. Samples at or before the newest accepted
    /// timestamp are rejected; returns whether the sample was accepted.
    pub fn push_imu(&mut self, sample: ImuSample) -> bool {
        let t = sample.t.as_secs();
        if t <= self.t_last_imu {
            warn!(t, t_last = self.t_last_imu, "imu sample out of order, dropping");
            return false;
        }
        self.t_last_imu = t;
        self.imu.push_back(sample);
        true
    }

    /// Enqueue a feature bundle. The first bundle ever seen is dropped;
    /// returns whether the bundle was accepted.
    pub fn push_feature(&mut self, bundle: FeatureBundle) -> bool {
        if !self.seen_first_feature {
            self.seen_first_feature = true;
            return false;
        }
        self.features.push_back(bundle);
        true
    }

    pub fn push_relo(&mut self, bundle: ReloBundle) {
        self.relo.push_back(bundle);
    }

    /// Drain the relocalization queue, keeping only the newest bundle.
    pub fn take_last_relo(&mut self) -> Option<ReloBundle> {
        let last = self.relo.pop_back();
        self.relo.clear();
        last
    }

    /// Restart: drop buffered IMU and feature data and reset the
    /// out-of-order guard. Relocalization bundles are kept.
    pub fn clear_measurements(&mut self) {
        self.imu.clear();
        self.features.clear();
        self.t_last_imu = 0.0;
    }

    pub fn imu_len(&self) -> usize {
        self.imu.len()
    }

    pub fn feature_len(&self) -> usize {
        self.features.len()
    }

    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }
}

impl Default for SensorQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::clock::Timestamp;

    fn imu(t: f64) -> ImuSample {
        ImuSample::new(Timestamp::from_secs(t), Vector3::zeros(), Vector3::zeros())
    }

    fn bundle(t: f64) -> FeatureBundle {
        FeatureBundle {
            t: Timestamp::from_secs(t),
            points: Vec::new(),
        }
    }

    #[test]
    fn test_out_of_order_imu_rejected() {
        let mut queues = SensorQueues::new();
        assert!(queues.push_imu(imu(1.0)));
        assert!(!queues.push_imu(imu(0.9)));
        assert!(!queues.push_imu(imu(1.0)));
        assert_eq!(queues.imu_len(), 1);
        assert!(queues.push_imu(imu(1.01)));
        assert_eq!(queues.imu_len(), 2);
    }

    #[test]
    fn test_first_feature_bundle_dropped() {
        let mut queues = SensorQueues::new();
        assert!(!queues.push_feature(bundle(0.1)));
        assert_eq!(queues.feature_len(), 0);
        assert!(queues.push_feature(bundle(0.2)));
        assert_eq!(queues.feature_len(), 1);
    }

    #[test]
    fn test_clear_measurements_resets_imu_guard_keeps_relo() {
        let mut queues = SensorQueues::new();
        queues.push_imu(imu(5.0));
        queues.push_feature(bundle(0.0));
        queues.push_feature(bundle(5.0));
        queues.push_relo(ReloBundle::from_cloud(
            Timestamp::from_secs(4.0),
            Vec::new(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 3.0],
        ));

        queues.clear_measurements();
        assert_eq!(queues.imu_len(), 0);
        assert_eq!(queues.feature_len(), 0);
        assert_eq!(queues.relo.len(), 1);
        // Guard reset: pre-restart timestamps are acceptable again.
        assert!(queues.push_imu(imu(0.5)));
        // But the first-feature drop does not repeat.
        assert!(queues.push_feature(bundle(5.5)));
    }

    #[test]
    fn test_take_last_relo_keeps_only_newest() {
        let mut queues = SensorQueues::new();
        for i in 0..3 {
            queues.push_relo(ReloBundle::from_cloud(
                Timestamp::from_secs(i as f64),
                Vec::new(),
                &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, i as f64],
            ));
        }
        let last = queues.take_last_relo().unwrap();
        assert_eq!(last.frame_index, 2);
        assert!(queues.relo.is_empty());
        assert!(queues.take_last_relo().is_none());
    }
}
