//! The VIO front-end node.
//!
//! `VioNode` owns the shared state and the dispatcher thread, and exposes
//! the four ingress endpoints the transport layer calls from its own
//! threads: IMU, feature bundles, relocalization bundles, and restart.
//!
//! Lock order, for any thread that needs more than one: estimator mutex,
//! then queue mutex, then fast-state mutex. The estimator mutex is never
//! taken while the fast-state mutex is held.

pub mod alignment;
mod dispatcher;
pub mod events;
pub mod propagator;
pub mod queues;

pub use alignment::{align_batches, Batch};
pub use events::{EventReceiver, EventSender, OutputEvent, WORLD_FRAME};
pub use propagator::FastState;
pub use queues::SensorQueues;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::backend::Backend;
use crate::clock::TimeOffsetCell;
use crate::msg::{FeatureBundle, ImuSample, ReloBundle};

use dispatcher::Dispatcher;

/// The back-end plus the dispatcher's IMU clock, under one mutex.
///
/// `t_current` is the timestamp of the last IMU step fed to the back-end;
/// `None` until the first sample of the first batch, and again after a
/// restart.
pub(crate) struct EstimatorCell<B> {
    pub(crate) backend: B,
    pub(crate) t_current: Option<f64>,
}

/// State shared between the ingress threads and the dispatcher.
pub(crate) struct NodeShared<B: Backend> {
    pub(crate) estimator: Mutex<EstimatorCell<B>>,
    pub(crate) queues: Mutex<SensorQueues>,
    /// Notified whenever a queue gains an element the dispatcher may be
    /// waiting for.
    pub(crate) batch_ready: Condvar,
    pub(crate) fast: Mutex<FastState>,
    /// Mirrors `solver_flag == NonLinear` for the ingress path, which must
    /// not take the estimator mutex.
    pub(crate) optimized: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    /// Advisory `td` mirror read by the alignment engine.
    pub(crate) td: TimeOffsetCell,
    pub(crate) events: EventSender,
}

impl<B: Backend> NodeShared<B> {
    pub(crate) fn new(backend: B, events: EventSender) -> Self {
        let td = backend.time_offset();
        Self {
            estimator: Mutex::new(EstimatorCell {
                backend,
                t_current: None,
            }),
            queues: Mutex::new(SensorQueues::new()),
            batch_ready: Condvar::new(),
            fast: Mutex::new(FastState::new()),
            optimized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            td: TimeOffsetCell::new(td),
            events,
        }
    }
}

/// Handle to a running front-end node.
pub struct VioNode<B: Backend + 'static> {
    shared: Arc<NodeShared<B>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<B: Backend + 'static> VioNode<B> {
    /// Spawn the dispatcher thread over an already-parameterized back-end.
    /// Returns the node handle and the receiving end of the output event
    /// channel.
    pub fn spawn(backend: B) -> (Self, EventReceiver) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(NodeShared::new(backend, tx));
        let dispatcher = Dispatcher::new(shared.clone());
        let handle = thread::spawn(move || dispatcher.run());
        (
            Self {
                shared,
                dispatcher: Some(handle),
            },
            rx,
        )
    }

    /// IMU ingress. Out-of-order samples are dropped; accepted samples
    /// wake the dispatcher and advance the fast path, publishing a
    /// propagated-odometry event once the back-end is optimized.
    pub fn on_imu(&self, sample: ImuSample) {
        let accepted = self.shared.queues.lock().push_imu(sample);
        if !accepted {
            return;
        }
        self.shared.batch_ready.notify_one();

        let mut fast = self.shared.fast.lock();
        fast.propagate(&sample);
        if self.shared.optimized.load(Ordering::SeqCst) {
            let _ = self.shared.events.send(OutputEvent::PropagatedOdometry {
                t: sample.t,
                frame_id: WORLD_FRAME,
                pose: fast.pose(),
                velocity: fast.velocity,
            });
        }
    }

    /// Feature ingress. The very first bundle is dropped (it carries no
    /// optical-flow velocities).
    pub fn on_feature(&self, bundle: FeatureBundle) {
        let accepted = self.shared.queues.lock().push_feature(bundle);
        if accepted {
            self.shared.batch_ready.notify_one();
        }
    }

    /// Relocalization ingress. No wakeup: relo frames ride along with the
    /// next dispatched batch.
    pub fn on_relocalization(&self, bundle: ReloBundle) {
        self.shared.queues.lock().push_relo(bundle);
    }

    /// Restart: drop buffered measurements, reset the back-end, reset the
    /// clocks. In-flight back-end work completes first; this does not
    /// preempt the dispatcher.
    pub fn on_restart(&self, restart: bool) {
        if !restart {
            return;
        }
        warn!("restarting the estimator");
        self.shared.queues.lock().clear_measurements();
        {
            let mut est = self.shared.estimator.lock();
            est.backend.clear_state();
            est.backend.set_parameter();
            est.t_current = None;
        }
        self.shared.optimized.store(false, Ordering::SeqCst);
    }

    /// Buffered (imu, feature) counts.
    pub fn queue_depths(&self) -> (usize, usize) {
        let queues = self.shared.queues.lock();
        (queues.imu_len(), queues.feature_len())
    }

    /// How often the alignment engine has stalled waiting for IMU.
    pub fn wait_count(&self) -> u64 {
        self.shared.queues.lock().wait_count()
    }

    /// Stop and join the dispatcher thread.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.batch_ready.notify_all();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl<B: Backend + 'static> Drop for VioNode<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
