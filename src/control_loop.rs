//! Control loop - fixed-rate cycle tying RC input, PID correction and PWM output

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::attitude::SharedAttitude;
use crate::bus::{BusChannels, TelemetryRecord};
use crate::config::ControlConfig;
use crate::controller::RollPid;
use crate::device::{
    ActuatorPort, DeviceError, ReceiverPort, PWM_REFRESH_HZ, RC_NEUTRAL_US, ROLL_RC_CHANNEL,
    THROTTLE_RC_CHANNEL,
};
use crate::metrics::LoopMetrics;

const RC_HALF_RANGE_US: f32 = 250.0;
/// Full stick deflection commands this many degrees of roll.
const ROLL_COMMAND_RANGE_DEG: f32 = 30.0;

/// Map a desired-roll pulse width onto a commanded angle. The stick range
/// 1250..=1750 us maps to +30..=-30 deg; the sign inversion makes a
/// rightward stick a negative commanded angle. Neutral maps to exactly 0.
pub fn pulse_to_desired_roll(pulse_us: u16) -> f32 {
    -(pulse_us as f32 - RC_NEUTRAL_US as f32) * ROLL_COMMAND_RANGE_DEG / RC_HALF_RANGE_US
}

/// Throttle passes straight through below the ceiling and is clamped to it
/// above. No closed-loop correction on this path.
pub fn saturate_throttle(pulse_us: u16, ceiling_us: u16) -> u16 {
    pulse_us.min(ceiling_us)
}

/// Enable both outputs and set their refresh period. This must succeed
/// before any command is written; a failure here is fatal to startup and is
/// never retried.
pub fn init_actuator_ports<A: ActuatorPort>(
    motor: &mut A,
    servo: &mut A,
) -> Result<(), DeviceError> {
    motor.enable()?;
    servo.enable()?;
    motor.set_period(PWM_REFRESH_HZ)?;
    servo.set_period(PWM_REFRESH_HZ)?;
    Ok(())
}

pub struct ControlStats {
    pub cycles: AtomicU64,
    pub telemetry_drops: AtomicU64,
    pub shutdown: AtomicBool,
}

impl ControlStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cycles: AtomicU64::new(0),
            telemetry_drops: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }
}

/// Run the actuation cycle at the configured frequency until shut down.
///
/// Each cycle polls the receiver, runs the PID on the most recently cached
/// attitude snapshot (stale data is tolerated; the loop never waits for a
/// fresh sample), writes both actuator commands as duty-cycle fractions and
/// publishes one telemetry record. The ports must already be enabled with
/// their refresh period set.
pub fn spawn_control_thread<R, A>(
    config: ControlConfig,
    receiver: R,
    mut motor: A,
    mut servo: A,
    attitude: SharedAttitude,
    channels: BusChannels,
    metrics: LoopMetrics,
) -> (thread::JoinHandle<()>, Arc<ControlStats>)
where
    R: ReceiverPort + Send + 'static,
    A: ActuatorPort + Send + 'static,
{
    let stats = ControlStats::new();
    let stats_clone = stats.clone();

    let handle = thread::spawn(move || {
        let mut pid = RollPid::new(config.gains, config.servo_trim_us);
        let interval = Duration::from_secs_f64(1.0 / config.frequency_hz as f64);
        let period_us = 1_000_000.0 / PWM_REFRESH_HZ as f32;

        loop {
            if stats_clone.shutdown.load(Ordering::Relaxed) {
                debug!("[CONTROL] loop shutting down");
                break;
            }

            let cycle_start = Instant::now();

            let throttle_us =
                saturate_throttle(receiver.read(THROTTLE_RC_CHANNEL), config.saturation_us);

            let roll_pulse_us = receiver.read(ROLL_RC_CHANNEL);
            let desired_roll_deg = pulse_to_desired_roll(roll_pulse_us);

            let (measured_roll_deg, dt_s) = attitude.snapshot();
            let servo_us = pid.compute(desired_roll_deg, measured_roll_deg, dt_s);

            if let Err(e) = motor.set_duty_cycle(throttle_us as f32 / period_us) {
                warn!("[CONTROL] motor write failed: {e}");
            }
            if let Err(e) = servo.set_duty_cycle(servo_us as f32 / period_us) {
                warn!("[CONTROL] servo write failed: {e}");
            }

            let record = TelemetryRecord {
                timestamp: Instant::now(),
                throttle_us,
                desired_roll_deg,
            };
            // Telemetry is lossy rather than blocking the cycle.
            if channels.telemetry_tx.try_send(record).is_err() {
                stats_clone.telemetry_drops.fetch_add(1, Ordering::Relaxed);
            }

            let cycle = stats_clone.cycles.fetch_add(1, Ordering::Relaxed) + 1;
            if cycle % 100 == 0 {
                debug!(
                    "[CONTROL] cycle #{}: throttle {} us, desired roll {:.1} deg, \
                     measured {:.1} deg, servo {} us",
                    cycle, throttle_us, desired_roll_deg, measured_roll_deg, servo_us
                );
            }

            let elapsed = cycle_start.elapsed();
            metrics.record_cycle(elapsed);
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            } else {
                metrics.record_overrun();
            }
        }
    });

    (handle, stats)
}
