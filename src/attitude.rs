//! Attitude feed - two-sample orientation history and sample-interval derivation

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One orientation observation from the external estimator. The timestamp is
/// a single monotonic count since an arbitrary epoch, so interval derivation
/// is an ordinary subtraction with no sub-second wrap handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub roll_deg: f32,
    pub timestamp: Duration,
}

#[derive(Debug, Default)]
struct SampleHistory {
    current: Option<OrientationSample>,
    previous: Option<OrientationSample>,
}

impl SampleHistory {
    fn push(&mut self, sample: OrientationSample) {
        self.previous = self.current.take();
        self.current = Some(sample);
    }

    fn snapshot(&self) -> (f32, f32) {
        let roll_deg = self.current.map(|s| s.roll_deg).unwrap_or(0.0);
        let dt_s = match (self.current, self.previous) {
            (Some(cur), Some(prev)) => cur
                .timestamp
                .checked_sub(prev.timestamp)
                .map(|d| d.as_secs_f32())
                .unwrap_or(0.0),
            _ => 0.0,
        };
        (roll_deg, dt_s)
    }
}

/// The orientation sample pair, updated by the sensor-feed thread and read
/// by the control thread. The pair is guarded as one unit so a reader never
/// observes a new angle paired with an old timestamp.
#[derive(Clone, Default)]
pub struct SharedAttitude {
    inner: Arc<Mutex<SampleHistory>>,
}

impl SharedAttitude {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new observation, shifting the prior current sample to
    /// previous. Older samples are discarded.
    pub fn push(&self, sample: OrientationSample) {
        self.inner.lock().push(sample);
    }

    /// Latest `(measured_roll_deg, dt_seconds)`. Until two samples have
    /// arrived, `dt` is 0 and the controller holds its derivative. A
    /// non-monotonic timestamp also yields 0 rather than a negative interval.
    pub fn snapshot(&self) -> (f32, f32) {
        self.inner.lock().snapshot()
    }
}
