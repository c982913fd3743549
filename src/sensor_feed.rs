//! Orientation feed - asynchronous delivery into the shared sample pair

use crossbeam::channel::RecvTimeoutError;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::attitude::{OrientationSample, SharedAttitude};
use crate::bus::BusChannels;

pub struct FeedStats {
    pub samples: AtomicU64,
    pub shutdown: AtomicBool,
}

impl FeedStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            samples: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }
}

/// Drain the orientation channel into the shared attitude state. Updates may
/// interleave arbitrarily with the control thread; the shared pair keeps
/// each update atomic.
pub fn spawn_feed_thread(
    channels: BusChannels,
    attitude: SharedAttitude,
) -> (thread::JoinHandle<()>, Arc<FeedStats>) {
    let stats = FeedStats::new();
    let stats_clone = stats.clone();

    let handle = thread::spawn(move || loop {
        if stats_clone.shutdown.load(Ordering::Relaxed) {
            break;
        }

        // Timeout so the shutdown flag is observed even on a quiet feed.
        match channels.imu_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                attitude.push(sample);
                let n = stats_clone.samples.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 500 == 0 {
                    debug!(
                        "[FEED] sample #{}: roll {:.2} deg at {:?}",
                        n, sample.roll_deg, sample.timestamp
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    });

    (handle, stats)
}

// ============================================================================
// SIMULATED ORIENTATION SOURCE
// ============================================================================

/// Seeded roll-angle source standing in for the external estimator.
pub struct SimulatedImu {
    rng: StdRng,
    epoch: Instant,
    base_roll_deg: f32,
    noise_amplitude: f32,
}

impl SimulatedImu {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            epoch: Instant::now(),
            base_roll_deg: 0.0,
            noise_amplitude: 1.5,
        }
    }

    pub fn sample(&mut self) -> OrientationSample {
        let noise = self.rng.gen_range(-self.noise_amplitude..self.noise_amplitude);
        OrientationSample {
            roll_deg: self.base_roll_deg + noise,
            timestamp: self.epoch.elapsed(),
        }
    }

    /// Shift the underlying attitude, e.g. to emulate a gust.
    pub fn inject_disturbance(&mut self, roll_delta_deg: f32) {
        self.base_roll_deg += roll_delta_deg;
    }
}
