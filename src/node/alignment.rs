//! Time alignment of feature frames with the IMU samples spanning them.

use tracing::warn;

use crate::msg::{FeatureBundle, ImuSample};

use super::queues::SensorQueues;

/// One feature frame paired with the IMU samples spanning it.
///
/// Every sample but the last precedes the td-adjusted feature timestamp;
/// the last one straddles it and is left in the queue so the next batch
/// can reuse it as its leading sample.
#[derive(Debug, Clone)]
pub struct Batch {
    pub imus: Vec<ImuSample>,
    pub features: FeatureBundle,
}

/// Drain the queues into as many time-aligned batches as the buffered data
/// allows. Must be called with the queue mutex held.
pub fn align_batches(queues: &mut SensorQueues, td: f64) -> Vec<Batch> {
    let mut batches = Vec::new();

    loop {
        let (Some(newest_imu), Some(oldest_bundle)) =
            (queues.imu.back(), queues.features.front())
        else {
            break;
        };
        let tf = oldest_bundle.t + td;

        // All buffered IMU precedes the oldest feature frame: wait for
        // more IMU to cover it.
        if newest_imu.t <= tf {
            queues.wait_count += 1;
            break;
        }

        // The oldest feature frame precedes all buffered IMU and can never
        // be covered: drop it. Only expected near startup.
        if queues.imu[0].t >= tf {
            warn!(t = oldest_bundle.t.as_secs(), "feature frame older than all buffered imu, dropping");
            queues.features.pop_front();
            continue;
        }

        let Some(bundle) = queues.features.pop_front() else {
            break;
        };

        let mut imus = Vec::new();
        while queues.imu.front().is_some_and(|s| s.t < tf) {
            if let Some(sample) = queues.imu.pop_front() {
                imus.push(sample);
            }
        }
        if imus.is_empty() {
            warn!(t = bundle.t.as_secs(), "no imu between two feature frames");
        }

        // The straddle sample: first IMU at or beyond tf. Copied, not
        // popped, so the next batch reads it again.
        if let Some(&straddle) = queues.imu.front() {
            imus.push(straddle);
        }

        batches.push(Batch {
            imus,
            features: bundle,
        });
    }

    batches
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

    fn queues_with(imu_times: &[f64], feature_times: &[f64]) -> SensorQueues {
        let mut queues = SensorQueues::new();
        queues.imu.extend(imu_times.iter().map(|&t| imu(t)));
        queues.features.extend(feature_times.iter().map(|&t| bundle(t)));
        queues
    }

    #[test]
    fn test_basic_alignment() {
        let mut queues = queues_with(&[0.00, 0.01, 0.02, 0.03, 0.04], &[0.025]);
        let batches = align_batches(&mut queues, 0.0);

        assert_eq!(batches.len(), 1);
        let times: Vec<f64> = batches[0].imus.iter().map(|s| s.t.as_secs()).collect();
        assert_eq!(times, vec![0.00, 0.01, 0.02, 0.03]);
        // The straddle sample stays at the head of the queue.
        assert_eq!(queues.imu[0].t.as_secs(), 0.03);
        assert_eq!(queues.feature_len(), 0);
    }

    #[test]
    fn test_batch_ordering_invariant() {
        let mut queues = queues_with(&[0.0, 0.004, 0.011, 0.019, 0.027, 0.034], &[0.01, 0.03]);
        let td = 0.002;
        let batches = align_batches(&mut queues, td);

        assert_eq!(batches.len(), 2);
        for batch in &batches {
            let tf = batch.features.t + td;
            let (straddle, before) = batch.imus.split_last().unwrap();
            for sample in before {
                assert!(sample.t < tf);
            }
            assert!(straddle.t >= tf);
        }
    }

    #[test]
    fn test_straddle_sample_reused_across_batches() {
        let mut queues = queues_with(&[0.0, 0.01, 0.02, 0.03, 0.04, 0.05], &[0.015, 0.035]);
        let batches = align_batches(&mut queues, 0.0);

        assert_eq!(batches.len(), 2);
        let last_of_first = batches[0].imus.last().unwrap().t;
        let first_of_second = batches[1].imus.first().unwrap().t;
        assert_eq!(last_of_first, first_of_second);
    }

    #[test]
    fn test_premature_feature_dropped() {
        let mut queues = queues_with(&[1.00, 1.01], &[0.50, 1.005]);
        let batches = align_batches(&mut queues, 0.0);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].features.t.as_secs(), 1.005);
        let times: Vec<f64> = batches[0].imus.iter().map(|s| s.t.as_secs()).collect();
        assert_eq!(times, vec![1.00, 1.01]);
    }

    #[test]
    fn test_waits_for_imu_past_feature() {
        let mut queues = queues_with(&[0.00, 0.01], &[0.02]);
        let batches = align_batches(&mut queues, 0.0);

        assert!(batches.is_empty());
        assert_eq!(queues.wait_count(), 1);
        // Nothing was consumed while waiting.
        assert_eq!(queues.imu_len(), 2);
        assert_eq!(queues.feature_len(), 1);
    }

    #[test]
    fn test_td_shifts_the_alignment_window() {
        // With td = 0.015 the frame at 0.01 aligns to 0.025; the straddle
        // moves from 0.02 to 0.03.
        let mut queues = queues_with(&[0.00, 0.01, 0.02, 0.03, 0.04], &[0.01]);
        let batches = align_batches(&mut queues, 0.015);

        assert_eq!(batches.len(), 1);
        let times: Vec<f64> = batches[0].imus.iter().map(|s| s.t.as_secs()).collect();
        assert_eq!(times, vec![0.00, 0.01, 0.02, 0.03]);
    }

    #[test]
    fn test_empty_queue_produces_nothing() {
        let mut queues = SensorQueues::new();
        assert!(align_batches(&mut queues, 0.0).is_empty());
        assert_eq!(queues.wait_count(), 0);
    }
}
