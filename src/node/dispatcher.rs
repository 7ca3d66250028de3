//! The batch dispatcher thread.
//!
//! Single consumer of the sensor queues: sleeps on the batch condition
//! variable, pulls time-aligned batches, feeds the back-end one IMU step
//! at a time (interpolating the measurement at the feature epoch), installs
//! pending relocalization frames, hands over the feature frame, emits the
//! per-frame events, and reseeds the fast path from the optimized window
//! tail.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::backend::{Backend, SolverFlag, WindowTail};
use crate::clock::Timestamp;

use super::alignment::{align_batches, Batch};
use super::events::{OutputEvent, WORLD_FRAME};
use super::{EstimatorCell, NodeShared};

pub(crate) struct Dispatcher<B: Backend> {
    shared: Arc<NodeShared<B>>,
}

/// Everything resync needs from the back-end, captured under the
/// estimator mutex so the fast path never touches it directly.
struct ResyncSnapshot {
    tail: WindowTail,
    accel: Vector3<f64>,
    gyro: Vector3<f64>,
    gravity: Vector3<f64>,
    t_latest: Option<f64>,
}

impl<B: Backend> Dispatcher<B> {
    pub(crate) fn new(shared: Arc<NodeShared<B>>) -> Self {
        Self { shared }
    }

    pub(crate) fn run(&self) {
        info!("dispatcher thread started");
        while let Some(batches) = self.wait_for_batches() {
            if let Some(snapshot) = self.process_batches(batches) {
                self.resync_fast_path(&snapshot);
            }
        }
        info!("dispatcher thread exiting");
    }

    /// Block until the alignment engine yields at least one batch, or
    /// shutdown is requested (`None`). Batch production and queue drainage
    /// are atomic with respect to ingress: both happen under the queue
    /// mutex.
    fn wait_for_batches(&self) -> Option<Vec<Batch>> {
        let mut queues = self.shared.queues.lock();
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            let batches = align_batches(&mut queues, self.shared.td.get());
            if !batches.is_empty() {
                return Some(batches);
            }
            self.shared.batch_ready.wait(&mut queues);
        }
    }

    /// Feed every batch to the back-end, then republish the advisory
    /// cells. Returns the resync snapshot when the back-end is optimized.
    fn process_batches(&self, batches: Vec<Batch>) -> Option<ResyncSnapshot> {
        let mut est = self.shared.estimator.lock();
        for batch in batches {
            self.process_batch(&mut est, batch);
        }

        self.shared.td.set(est.backend.time_offset());
        let optimized = est.backend.solver_flag() == SolverFlag::NonLinear;
        self.shared.optimized.store(optimized, Ordering::SeqCst);

        optimized.then(|| {
            let (accel, gyro) = est.backend.last_imu();
            ResyncSnapshot {
                tail: est.backend.window_tail(),
                accel,
                gyro,
                gravity: est.backend.gravity(),
                t_latest: est.t_current,
            }
        })
    }

    fn process_batch(&self, est: &mut EstimatorCell<B>, batch: Batch) {
        let tf = batch.features.t + est.backend.time_offset();

        let mut last_accel = Vector3::zeros();
        let mut last_gyro = Vector3::zeros();
        for sample in &batch.imus {
            let t = sample.t.as_secs();
            if sample.t <= tf {
                let t_prev = *est.t_current.get_or_insert(t);
                let dt = t - t_prev;
                assert!(dt >= 0.0);
                est.t_current = Some(t);
                est.backend.process_imu(dt, sample.accel, sample.gyro);
                last_accel = sample.accel;
                last_gyro = sample.gyro;
            } else {
                // Straddle sample: advance only to the feature epoch,
                // with the measurement linearly interpolated at tf. The
                // sample itself stays in the queue for the next batch.
                let t_prev = est.t_current.unwrap_or(tf.as_secs());
                let dt_1 = tf.as_secs() - t_prev;
                let dt_2 = t - tf.as_secs();
                assert!(dt_1 >= 0.0);
                assert!(dt_2 >= 0.0);
                assert!(dt_1 + dt_2 > 0.0);
                let w1 = dt_2 / (dt_1 + dt_2);
                let w2 = dt_1 / (dt_1 + dt_2);
                let accel = w1 * last_accel + w2 * sample.accel;
                let gyro = w1 * last_gyro + w2 * sample.gyro;
                est.backend.process_imu(dt_1, accel, gyro);
                est.t_current = Some(tf.as_secs());
            }
        }

        // Only the newest pending relocalization frame is worth
        // installing; older ones are superseded.
        let relo = self.shared.queues.lock().take_last_relo();
        let relo_frame = relo.as_ref().map(|r| r.frame_index);
        if let Some(r) = relo {
            est.backend.set_relo_frame(
                r.t,
                r.frame_index,
                r.match_points,
                r.translation,
                r.rotation.to_rotation_matrix().into_inner(),
            );
        }

        debug!(t = batch.features.t.as_secs(), "processing feature frame");
        est.backend
            .process_image(batch.features.feature_map(), batch.features.t);

        self.publish_frame_events(&est.backend, batch.features.t, relo_frame);
    }

    fn publish_frame_events(&self, backend: &B, t: Timestamp, relo_frame: Option<u64>) {
        let tail = backend.window_tail();
        let events = &self.shared.events;
        let _ = events.send(OutputEvent::Odometry {
            t,
            frame_id: WORLD_FRAME,
            pose: tail.pose,
            velocity: tail.velocity,
        });
        let _ = events.send(OutputEvent::KeyPoses {
            t,
            poses: backend.key_poses(),
        });
        let _ = events.send(OutputEvent::CameraPose {
            t,
            pose: backend.camera_pose(),
        });
        let _ = events.send(OutputEvent::PointCloud {
            t,
            points: backend.marginal_cloud(),
        });
        let _ = events.send(OutputEvent::Transform {
            t,
            frame_id: WORLD_FRAME,
            pose: tail.pose,
        });
        let _ = events.send(OutputEvent::Keyframe { t, pose: tail.pose });
        if let Some(frame_index) = relo_frame {
            let _ = events.send(OutputEvent::Relocalization { t, frame_index });
        }
    }

    /// Reseed the fast path from the optimized tail, then replay every
    /// still-buffered IMU sample over it. The queue is read in place and
    /// left untouched.
    fn resync_fast_path(&self, snapshot: &ResyncSnapshot) {
        let queues = self.shared.queues.lock();
        let mut fast = self.shared.fast.lock();
        fast.resync(
            &snapshot.tail,
            snapshot.accel,
            snapshot.gyro,
            snapshot.gravity,
            snapshot.t_latest,
        );
        for sample in queues.imu.iter() {
            fast.propagate(sample);
        }
    }
}
