//! Message bus boundary - orientation feed in, telemetry out

use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use crate::attitude::OrientationSample;

/// Wire name of the orientation topic this process subscribes to.
pub const IMU_TOPIC: &str = "imu_readings";
/// Wire name of the telemetry topic this process publishes on.
pub const TELEMETRY_TOPIC: &str = "remote_readings";

/// One telemetry record per control cycle.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryRecord {
    pub timestamp: Instant,
    pub throttle_us: u16,
    pub desired_roll_deg: f32,
}

/// Communication endpoints between the sensor feed, the control thread and
/// the outside transport.
#[derive(Clone)]
pub struct BusChannels {
    pub imu_tx: Sender<OrientationSample>,
    pub imu_rx: Arc<Receiver<OrientationSample>>,

    pub telemetry_tx: Sender<TelemetryRecord>,
    pub telemetry_rx: Arc<Receiver<TelemetryRecord>>,
}

impl BusChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (imu_tx, imu_rx) = bounded(buffer_size);
        let (telemetry_tx, telemetry_rx) = bounded(buffer_size);

        Self {
            imu_tx,
            imu_rx: Arc::new(imu_rx),
            telemetry_tx,
            telemetry_rx: Arc::new(telemetry_rx),
        }
    }
}
