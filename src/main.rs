use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use tracing::{debug, info};

use rust_vio::backend::{Backend, SolverFlag, WindowTail, WINDOW_SIZE};
use rust_vio::clock::Timestamp;
use rust_vio::io::{load_feature_log, load_imu_log};
use rust_vio::msg::FeatureMap;
use rust_vio::node::VioNode;

/// Minimal stand-in back-end: dead-reckons the window tail from the IMU
/// steps it is fed and reports `NonLinear` once the window has filled.
/// Lets the node run end-to-end against recorded logs without a solver.
struct DeadReckoningBackend {
    tail: WindowTail,
    acc_0: Vector3<f64>,
    gyr_0: Vector3<f64>,
    frames: usize,
}

impl DeadReckoningBackend {
    fn new() -> Self {
        Self {
            tail: WindowTail::identity(),
            acc_0: Vector3::zeros(),
            gyr_0: Vector3::zeros(),
            frames: 0,
        }
    }
}

impl Backend for DeadReckoningBackend {
    fn process_imu(&mut self, dt: f64, accel: Vector3<f64>, gyro: Vector3<f64>) {
        let g = self.gravity();
        let q = self.tail.pose.orientation;
        let un_acc_0 = q * (self.acc_0 - self.tail.accel_bias) - g;
        let un_gyr = 0.5 * (self.gyr_0 + gyro) - self.tail.gyro_bias;
        let q_next = q * UnitQuaternion::from_scaled_axis(un_gyr * dt);
        let un_acc_1 = q_next * (accel - self.tail.accel_bias) - g;
        let un_acc = 0.5 * (un_acc_0 + un_acc_1);

        self.tail.pose.orientation = q_next;
        self.tail.pose.position += dt * self.tail.velocity + 0.5 * dt * dt * un_acc;
        self.tail.velocity += dt * un_acc;
        self.acc_0 = accel;
        self.gyr_0 = gyro;
    }

    fn process_image(&mut self, features: FeatureMap, t: Timestamp) {
        self.frames += 1;
        debug!(
            t = t.as_secs(),
            n_features = features.len(),
            "frame {} absorbed",
            self.frames
        );
    }

    fn set_relo_frame(
        &mut self,
        _stamp: Timestamp,
        frame_index: u64,
        _match_points: Vec<Vector3<f64>>,
        _translation: Vector3<f64>,
        _rotation: Matrix3<f64>,
    ) {
        debug!(frame_index, "relocalization frame installed");
    }

    fn clear_state(&mut self) {
        *self = Self::new();
    }

    fn set_parameter(&mut self) {}

    fn solver_flag(&self) -> SolverFlag {
        if self.frames > WINDOW_SIZE {
            SolverFlag::NonLinear
        } else {
            SolverFlag::Initial
        }
    }

    fn window_tail(&self) -> WindowTail {
        self.tail
    }

    fn last_imu(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.acc_0, self.gyr_0)
    }

    fn gravity(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, 9.81)
    }

    fn time_offset(&self) -> f64 {
        0.0
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let log_dir = std::env::args().nth(1).unwrap_or_else(|| "data/log".to_string());
    let log_dir = Path::new(&log_dir);

    let imu_samples = load_imu_log(log_dir.join("imu.csv"))?;
    let feature_bundles = load_feature_log(log_dir.join("features.csv"))?;
    info!(
        "Loaded {} imu samples, {} feature frames",
        imu_samples.len(),
        feature_bundles.len()
    );

    let mut backend = DeadReckoningBackend::new();
    backend.set_parameter();
    let (mut node, events) = VioNode::spawn(backend);
    info!("waiting for image and imu...");

    // Feed the streams in timestamp order, the way the transport would.
    let mut imu_iter = imu_samples.into_iter().peekable();
    for bundle in feature_bundles {
        while imu_iter.peek().is_some_and(|s| s.t <= bundle.t) {
            if let Some(sample) = imu_iter.next() {
                node.on_imu(sample);
            }
        }
        node.on_feature(bundle);
    }
    for sample in imu_iter {
        node.on_imu(sample);
    }

    // Let the dispatcher catch up before tearing down. A trailing frame
    // the IMU log never covers stays queued; don't wait on it forever.
    for _ in 0..500 {
        if node.queue_depths().1 == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    node.shutdown();

    let n_events = events.try_iter().count();
    info!(
        "Done! Published {} events, alignment waited {} times",
        n_events,
        node.wait_count()
    );

    Ok(())
}
