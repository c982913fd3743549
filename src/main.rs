use anyhow::Context;
use log::{debug, error, info};
use std::env;
use std::thread;
use std::time::Duration;

use roll_stabilizer::bus::{BusChannels, IMU_TOPIC, TELEMETRY_TOPIC};
use roll_stabilizer::config::{self, ControlConfig};
use roll_stabilizer::control_loop::{init_actuator_ports, spawn_control_thread};
use roll_stabilizer::device::{
    SimPwm, SimReceiver, MOTOR_PWM_CHANNEL, ROLL_RC_CHANNEL, SERVO_PWM_CHANNEL,
    THROTTLE_RC_CHANNEL,
};
use roll_stabilizer::metrics::LoopMetrics;
use roll_stabilizer::sensor_feed::{spawn_feed_thread, SimulatedImu};
use roll_stabilizer::SharedAttitude;

const CONFIG_FILE: &str = "config/stabilizer.toml";
const IMU_FEED_INTERVAL: Duration = Duration::from_millis(10);
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Configuration first; nothing else is created until it resolves.
    let args: Vec<String> = env::args().skip(1).collect();
    let overrides = config::load_overrides(CONFIG_FILE);
    let config = match ControlConfig::default().merged(&overrides).apply_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("[CONFIG] {e}");
            return Err(e.into());
        }
    };
    info!(
        "[CONFIG] frequency {} Hz, saturation {} us, gains Kp {} Ki {} Kd {}, trim {} us",
        config.frequency_hz,
        config.saturation_us,
        config.gains.kp,
        config.gains.ki,
        config.gains.kd,
        config.servo_trim_us
    );

    // Sticks at neutral, throttle low, until a real receiver replaces the sim.
    let receiver = SimReceiver::new();
    receiver.set_channel(THROTTLE_RC_CHANNEL, 1300);
    receiver.set_channel(ROLL_RC_CHANNEL, 1500);

    let mut motor = SimPwm::new(MOTOR_PWM_CHANNEL);
    let mut servo = SimPwm::new(SERVO_PWM_CHANNEL);

    // Outputs must be enabled with a refresh period before the first
    // command; any failure here ends the process.
    init_actuator_ports(&mut motor, &mut servo)
        .context("actuator port initialization failed")?;
    info!(
        "[DEVICE] motor on PWM channel {}, servo on PWM channel {}",
        motor.channel(),
        servo.channel()
    );

    let channels = BusChannels::new(256);
    let attitude = SharedAttitude::new();
    let metrics = LoopMetrics::new();

    let (_feed_handle, _feed_stats) = spawn_feed_thread(channels.clone(), attitude.clone());
    info!("[BUS] subscribed to {IMU_TOPIC}");

    // Simulated orientation source standing in for the external estimator.
    let imu_tx = channels.imu_tx.clone();
    thread::spawn(move || {
        let mut imu = SimulatedImu::new(42);
        while imu_tx.send(imu.sample()).is_ok() {
            thread::sleep(IMU_FEED_INTERVAL);
        }
    });

    // Drain the telemetry side of the bus.
    let telemetry_rx = channels.telemetry_rx.clone();
    thread::spawn(move || {
        let mut published = 0u64;
        while let Ok(record) = telemetry_rx.recv() {
            published += 1;
            if published % 200 == 0 {
                debug!(
                    "[BUS] {TELEMETRY_TOPIC} #{}: throttle {} us, desired roll {:.1} deg",
                    published, record.throttle_us, record.desired_roll_deg
                );
            }
        }
    });

    let (_control_handle, control_stats) = spawn_control_thread(
        config,
        receiver,
        motor,
        servo,
        attitude,
        channels,
        metrics.clone(),
    );
    info!("[CONTROL] loop running, publishing on {TELEMETRY_TOPIC}");

    // Runs until externally stopped.
    loop {
        thread::sleep(REPORT_INTERVAL);
        let report = metrics.report();
        info!(
            "[PERF] cycles {}, cycle p50 {:?} p99 {:?}, jitter p50 {:?} p99 {:?}, \
             overruns {}, telemetry drops {}",
            control_stats
                .cycles
                .load(std::sync::atomic::Ordering::Relaxed),
            report.cycle_p50,
            report.cycle_p99,
            report.jitter_p50,
            report.jitter_p99,
            report.overruns,
            control_stats
                .telemetry_drops
                .load(std::sync::atomic::Ordering::Relaxed)
        );
    }
}
