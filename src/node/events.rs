//! Typed output events.
//!
//! Publication transport is not the node's concern; events go out on an
//! unbounded channel and whatever sits on the receiving end (a ROS bridge,
//! a visualizer, a log) forwards them. Sends never block the ingress or
//! dispatcher threads.

use crossbeam_channel::{Receiver, Sender};
use nalgebra::Vector3;

use crate::backend::Pose;
use crate::clock::Timestamp;

/// Coordinate frame all world-referenced events are labeled with.
pub const WORLD_FRAME: &str = "world";

#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// High-rate pose from the fast path, one per accepted IMU sample
    /// once the back-end is optimized.
    PropagatedOdometry {
        t: Timestamp,
        frame_id: &'static str,
        pose: Pose,
        velocity: Vector3<f64>,
    },
    /// Optimized odometry, one per processed feature frame.
    Odometry {
        t: Timestamp,
        frame_id: &'static str,
        pose: Pose,
        velocity: Vector3<f64>,
    },
    /// Poses of the keyframes currently in the sliding window.
    KeyPoses { t: Timestamp, poses: Vec<Pose> },
    CameraPose { t: Timestamp, pose: Pose },
    /// Landmarks of the marginalized frame.
    PointCloud {
        t: Timestamp,
        points: Vec<Vector3<f64>>,
    },
    /// Body-in-world transform for the frame tree.
    Transform {
        t: Timestamp,
        frame_id: &'static str,
        pose: Pose,
    },
    Keyframe { t: Timestamp, pose: Pose },
    /// Emitted when a relocalization frame was installed this batch.
    Relocalization { t: Timestamp, frame_index: u64 },
}

pub type EventSender = Sender<OutputEvent>;
pub type EventReceiver = Receiver<OutputEvent>;
