//! Integration tests for the roll stabilization loop

use roll_stabilizer::attitude::{OrientationSample, SharedAttitude};
use roll_stabilizer::bus::BusChannels;
use roll_stabilizer::config::{ConfigError, ConfigOverrides, ControlConfig};
use roll_stabilizer::control_loop::{
    init_actuator_ports, pulse_to_desired_roll, saturate_throttle, spawn_control_thread,
};
use roll_stabilizer::controller::{
    PidGains, RollPid, MAX_INTEGRAL, SERVO_PULSE_MAX_US, SERVO_PULSE_MIN_US,
};
use roll_stabilizer::device::{
    ActuatorPort, DeviceError, ReceiverPort, SimPwm, SimReceiver, MOTOR_PWM_CHANNEL,
    ROLL_RC_CHANNEL, SERVO_PWM_CHANNEL, THROTTLE_RC_CHANNEL,
};
use roll_stabilizer::metrics::LoopMetrics;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn default_pid() -> RollPid {
    RollPid::new(PidGains::default(), 1500)
}

// ============================================================================
// PID CONTROLLER TESTS
// ============================================================================

#[test]
fn test_pid_holds_neutral_with_zero_error() {
    let mut pid = default_pid();

    for _ in 0..5 {
        let pulse = pid.compute(0.0, 0.0, 0.01);
        assert_eq!(pulse, 1500, "No error should command the trim pulse");
    }
    assert_eq!(pid.integral(), 0.0, "Zero error should not accumulate");
    assert_eq!(pid.filtered_derivative(), 0.0);
}

#[test]
fn test_pid_step_response_hits_the_servo_floor() {
    let mut pid = default_pid();

    let pulse = pid.compute(30.0, 0.0, 0.01);

    assert_eq!(pid.last_error(), 30.0);
    // The proportional term alone (u = 18) would map to 1295; the
    // derivative kick of the first step pushes the raw command below the
    // floor, which the clamp absorbs.
    assert_eq!(pulse, SERVO_PULSE_MIN_US, "Command must respect the 1250 floor");
}

#[test]
fn test_pid_integral_stays_bounded() {
    let mut pid = default_pid();

    // Long one-sided error run, then the other side.
    for _ in 0..200 {
        pid.compute(30.0, 0.0, 0.02);
        assert!(
            pid.integral().abs() <= MAX_INTEGRAL,
            "Integral {} escaped the clamp",
            pid.integral()
        );
    }
    for _ in 0..200 {
        pid.compute(-30.0, 0.0, 0.02);
        assert!(pid.integral().abs() <= MAX_INTEGRAL);
    }
}

#[test]
fn test_pid_derivative_held_when_no_time_passes() {
    let mut pid = default_pid();
    pid.compute(10.0, 0.0, 0.01);

    let derivative_before = pid.filtered_derivative();
    let integral_before = pid.integral();
    assert!(derivative_before != 0.0, "Setup should leave derivative state");

    pid.compute(25.0, 0.0, 0.0);

    assert_eq!(
        pid.filtered_derivative(),
        derivative_before,
        "A zero interval must hold the filtered derivative"
    );
    assert_eq!(
        pid.integral(),
        integral_before,
        "A zero interval must not accumulate"
    );
}

#[test]
fn test_pid_idempotent_at_rest() {
    let mut pid = default_pid();

    for _ in 0..3 {
        let pulse = pid.compute(0.0, 0.0, 0.0);
        assert_eq!(pulse, 1500);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.filtered_derivative(), 0.0);
    }
}

#[test]
fn test_pid_output_always_within_servo_range() {
    let mut pid = default_pid();

    for desired in (-60..=60).step_by(15) {
        for measured in (-60..=60).step_by(15) {
            let pulse = pid.compute(desired as f32, measured as f32, 0.01);
            assert!(
                (SERVO_PULSE_MIN_US..=SERVO_PULSE_MAX_US).contains(&pulse),
                "Pulse {} out of range for desired {} measured {}",
                pulse,
                desired,
                measured
            );
        }
    }
}

// ============================================================================
// ATTITUDE / SAMPLE-TIMER TESTS
// ============================================================================

#[test]
fn test_attitude_derives_interval_from_sample_pair() {
    let attitude = SharedAttitude::new();

    attitude.push(OrientationSample {
        roll_deg: 1.0,
        timestamp: Duration::from_millis(100),
    });
    attitude.push(OrientationSample {
        roll_deg: 2.5,
        timestamp: Duration::from_millis(110),
    });

    let (roll, dt) = attitude.snapshot();
    assert_eq!(roll, 2.5, "Snapshot should carry the latest angle");
    assert!((dt - 0.01).abs() < 1e-6, "dt should be 10 ms, got {dt}");
}

#[test]
fn test_attitude_reports_zero_interval_until_two_samples() {
    let attitude = SharedAttitude::new();
    assert_eq!(attitude.snapshot(), (0.0, 0.0));

    attitude.push(OrientationSample {
        roll_deg: 4.0,
        timestamp: Duration::from_millis(50),
    });
    let (roll, dt) = attitude.snapshot();
    assert_eq!(roll, 4.0);
    assert_eq!(dt, 0.0, "One sample cannot yield an interval");
}

#[test]
fn test_attitude_monotonic_feed_never_yields_nonpositive_dt() {
    let attitude = SharedAttitude::new();
    let spacings_ms = [3u64, 17, 250, 999, 1, 640, 80];

    let mut now_ms = 0u64;
    attitude.push(OrientationSample {
        roll_deg: 0.0,
        timestamp: Duration::from_millis(now_ms),
    });
    for spacing in spacings_ms {
        now_ms += spacing;
        attitude.push(OrientationSample {
            roll_deg: 0.0,
            timestamp: Duration::from_millis(now_ms),
        });
        let (_, dt) = attitude.snapshot();
        assert!(dt > 0.0, "Monotonic timestamps produced dt = {dt}");
    }
}

#[test]
fn test_attitude_backwards_timestamp_is_corrected_to_zero() {
    let attitude = SharedAttitude::new();
    attitude.push(OrientationSample {
        roll_deg: 0.0,
        timestamp: Duration::from_millis(200),
    });
    attitude.push(OrientationSample {
        roll_deg: 0.0,
        timestamp: Duration::from_millis(150),
    });

    let (_, dt) = attitude.snapshot();
    assert_eq!(dt, 0.0, "A backwards step must not produce a negative dt");
}

// ============================================================================
// INPUT MAPPING TESTS
// ============================================================================

#[test]
fn test_neutral_stick_commands_exactly_zero_degrees() {
    assert_eq!(pulse_to_desired_roll(1500), 0.0);
}

#[test]
fn test_stick_extremes_map_to_inverted_thirty_degrees() {
    assert_eq!(pulse_to_desired_roll(1250), 30.0);
    assert_eq!(pulse_to_desired_roll(1750), -30.0);
}

#[test]
fn test_throttle_saturation() {
    assert_eq!(saturate_throttle(2200, 2000), 2000);
    assert_eq!(saturate_throttle(1400, 2000), 1400);
    assert_eq!(saturate_throttle(2000, 2000), 2000);
}

// ============================================================================
// CONFIGURATION TESTS
// ============================================================================

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_config_defaults_with_no_arguments() {
    let config = ControlConfig::default().apply_args(&[]).unwrap();
    assert_eq!(config, ControlConfig::default());
    assert_eq!(config.frequency_hz, 100);
    assert_eq!(config.saturation_us, 2000);
    assert_eq!(config.servo_trim_us, 1500);
}

#[test]
fn test_config_accepts_known_group_sizes() {
    let config = ControlConfig::default().apply_args(&args(&["50"])).unwrap();
    assert_eq!(config.frequency_hz, 50);

    let config = ControlConfig::default()
        .apply_args(&args(&["50", "1800"]))
        .unwrap();
    assert_eq!(config.saturation_us, 1800);

    let config = ControlConfig::default()
        .apply_args(&args(&["50", "1800", "0.8", "1.5", "0.02"]))
        .unwrap();
    assert_eq!(config.gains, PidGains { kp: 0.8, ki: 1.5, kd: 0.02 });

    let config = ControlConfig::default()
        .apply_args(&args(&["50", "1800", "0.8", "1.5", "0.02", "1480"]))
        .unwrap();
    assert_eq!(config.servo_trim_us, 1480);
}

#[test]
fn test_config_rejects_partial_groups() {
    for count in [3usize, 4, 7] {
        let values: Vec<String> = (0..count).map(|_| "1".to_string()).collect();
        let err = ControlConfig::default().apply_args(&values).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedArgCount(count));
    }
}

#[test]
fn test_config_rejects_nonpositive_frequency() {
    let err = ControlConfig::default().apply_args(&args(&["0"])).unwrap_err();
    assert_eq!(err, ConfigError::NonPositiveFrequency);

    let err = ControlConfig::default()
        .apply_args(&args(&["-5"]))
        .unwrap_err();
    assert_eq!(err, ConfigError::NonPositiveFrequency);
}

#[test]
fn test_config_rejects_malformed_values() {
    let err = ControlConfig::default()
        .apply_args(&args(&["fast"]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Malformed { name: "frequency", .. }));
}

#[test]
fn test_config_clamps_unreasonable_saturation() {
    let config = ControlConfig::default()
        .apply_args(&args(&["100", "2500"]))
        .unwrap();
    assert_eq!(config.saturation_us, 2000, "Ceiling is capped at the fixed maximum");
}

#[test]
fn test_config_file_overrides_are_independently_optional() {
    let overrides = ConfigOverrides {
        kp: Some(1.2),
        saturation_us: Some(3000),
        ..Default::default()
    };
    let config = ControlConfig::default().merged(&overrides);

    assert_eq!(config.gains.kp, 1.2);
    assert_eq!(config.gains.ki, 2.0, "Untouched fields keep their defaults");
    assert_eq!(config.saturation_us, 2000, "File values are clamped too");
}

// ============================================================================
// DEVICE PORT TESTS
// ============================================================================

#[test]
fn test_pwm_rejects_commands_before_enable() {
    let mut pwm = SimPwm::new(SERVO_PWM_CHANNEL);

    assert_eq!(
        pwm.set_duty_cycle(0.075),
        Err(DeviceError::NotEnabled(SERVO_PWM_CHANNEL))
    );
    assert_eq!(
        pwm.set_period(50),
        Err(DeviceError::NotEnabled(SERVO_PWM_CHANNEL))
    );
}

#[test]
fn test_pwm_rejects_duty_cycle_without_period() {
    let mut pwm = SimPwm::new(SERVO_PWM_CHANNEL);
    pwm.enable().unwrap();

    assert_eq!(
        pwm.set_duty_cycle(0.075),
        Err(DeviceError::NoRefreshPeriod(SERVO_PWM_CHANNEL))
    );
}

#[test]
fn test_pwm_round_trips_pulse_width() {
    let mut pwm = SimPwm::new(MOTOR_PWM_CHANNEL);
    pwm.enable().unwrap();
    pwm.set_period(50).unwrap();
    pwm.set_duty_cycle(1500.0 / 20_000.0).unwrap();

    assert_eq!(pwm.pulse_width_us(), Some(1500));
}

#[test]
fn test_actuator_init_fails_fast_on_enable_failure() {
    let mut motor = SimPwm::failing(MOTOR_PWM_CHANNEL);
    let mut servo = SimPwm::new(SERVO_PWM_CHANNEL);

    let err = init_actuator_ports(&mut motor, &mut servo).unwrap_err();
    assert_eq!(err, DeviceError::EnableFailed(MOTOR_PWM_CHANNEL));
    assert!(!servo.is_enabled(), "Init must stop at the first failure");
}

#[test]
fn test_receiver_returns_latest_sample_per_channel() {
    let receiver = SimReceiver::new();
    receiver.set_channel(THROTTLE_RC_CHANNEL, 1650);

    assert_eq!(receiver.read(THROTTLE_RC_CHANNEL), 1650);
    assert_eq!(receiver.read(ROLL_RC_CHANNEL), 1500);
}

// ============================================================================
// CONTROL LOOP TESTS
// ============================================================================

#[test]
fn test_control_loop_drives_both_actuators_and_publishes_telemetry() {
    let config = ControlConfig {
        frequency_hz: 200,
        ..Default::default()
    };

    let receiver = SimReceiver::new();
    receiver.set_channel(THROTTLE_RC_CHANNEL, 2200);
    receiver.set_channel(ROLL_RC_CHANNEL, 1500);

    let mut motor = SimPwm::new(MOTOR_PWM_CHANNEL);
    let mut servo = SimPwm::new(SERVO_PWM_CHANNEL);
    init_actuator_ports(&mut motor, &mut servo).unwrap();
    let motor_probe = motor.clone();
    let servo_probe = servo.clone();

    let channels = BusChannels::new(64);
    let attitude = SharedAttitude::new();

    for i in 0..10u64 {
        attitude.push(OrientationSample {
            roll_deg: 2.0,
            timestamp: Duration::from_millis(i * 10),
        });
    }

    let (handle, stats) = spawn_control_thread(
        config,
        receiver,
        motor,
        servo,
        attitude,
        channels.clone(),
        LoopMetrics::new(),
    );

    std::thread::sleep(Duration::from_millis(100));
    stats.shutdown.store(true, Ordering::Relaxed);
    handle.join().expect("Control thread should exit cleanly");

    assert!(stats.cycles.load(Ordering::Relaxed) > 0, "Loop should have cycled");

    // Throttle path: raw 2200 clamped to the 2000 ceiling.
    assert_eq!(motor_probe.pulse_width_us(), Some(2000));

    // Servo path: whatever the PID commanded is within the clamp range.
    let servo_us = servo_probe.pulse_width_us().expect("Servo was written");
    assert!((SERVO_PULSE_MIN_US..=SERVO_PULSE_MAX_US).contains(&servo_us));

    let record = channels
        .telemetry_rx
        .recv_timeout(Duration::from_millis(100))
        .expect("Telemetry should have been published");
    assert_eq!(record.throttle_us, 2000);
    assert_eq!(record.desired_roll_deg, 0.0);
}

// ============================================================================
// BUS CHANNEL TESTS
// ============================================================================

#[test]
fn test_bus_transmits_orientation_samples_in_order() {
    let channels = BusChannels::new(16);

    for i in 0..5u64 {
        channels
            .imu_tx
            .send(OrientationSample {
                roll_deg: i as f32,
                timestamp: Duration::from_millis(i * 10),
            })
            .expect("Send should succeed");
    }

    for i in 0..5u64 {
        let sample = channels
            .imu_rx
            .recv_timeout(Duration::from_millis(100))
            .expect("Receive should succeed");
        assert_eq!(sample.roll_deg, i as f32);
    }
}
