//! Device ports - PWM actuator and RC receiver capability traits with
//! in-memory simulated implementations

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// PWM output channel driving the motor ESC.
pub const MOTOR_PWM_CHANNEL: u8 = 9;
/// PWM output channel driving the roll servo.
pub const SERVO_PWM_CHANNEL: u8 = 0;
/// RC receiver channel carrying the throttle stick.
pub const THROTTLE_RC_CHANNEL: usize = 3;
/// RC receiver channel carrying the desired-roll stick.
pub const ROLL_RC_CHANNEL: usize = 2;
/// Refresh rate applied to both PWM outputs.
pub const PWM_REFRESH_HZ: u32 = 50;

pub const RC_CHANNEL_COUNT: usize = 16;
pub const RC_NEUTRAL_US: u16 = 1500;

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("output enable not set for PWM channel {0} (are you root?)")]
    EnableFailed(u8),

    #[error("PWM channel {0} is not enabled")]
    NotEnabled(u8),

    #[error("no refresh period set on PWM channel {0}")]
    NoRefreshPeriod(u8),

    #[error("invalid refresh period {hz} Hz on PWM channel {channel}")]
    InvalidPeriod { channel: u8, hz: u32 },

    #[error("duty cycle {fraction} out of [0, 1] on PWM channel {channel}")]
    InvalidDutyCycle { channel: u8, fraction: f32 },
}

/// A PWM-capable output channel. Must be enabled and given a refresh period
/// before any duty cycle is written.
pub trait ActuatorPort {
    fn enable(&mut self) -> Result<(), DeviceError>;
    fn set_period(&mut self, hz: u32) -> Result<(), DeviceError>;
    /// Commanded value as a fraction of the configured refresh period.
    fn set_duty_cycle(&mut self, fraction: f32) -> Result<(), DeviceError>;
}

/// A multi-channel RC input. `read` is non-blocking and returns the latest
/// sampled pulse width in microseconds for the channel.
pub trait ReceiverPort {
    fn read(&self, channel: usize) -> u16;
}

// ============================================================================
// SIMULATED PWM OUTPUT
// ============================================================================

#[derive(Debug, Default)]
struct PwmChannelState {
    enabled: bool,
    period_hz: u32,
    duty_cycle: f32,
}

/// In-memory PWM channel. Clones share state, so a test or supervisor can
/// keep a handle while the control thread owns the port.
#[derive(Clone)]
pub struct SimPwm {
    channel: u8,
    fail_enable: bool,
    state: Arc<Mutex<PwmChannelState>>,
}

impl SimPwm {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            fail_enable: false,
            state: Arc::new(Mutex::new(PwmChannelState::default())),
        }
    }

    /// A port whose enable always fails, for exercising the fatal startup path.
    pub fn failing(channel: u8) -> Self {
        Self {
            fail_enable: true,
            ..Self::new(channel)
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn period_hz(&self) -> u32 {
        self.state.lock().period_hz
    }

    pub fn duty_cycle(&self) -> f32 {
        self.state.lock().duty_cycle
    }

    /// Last commanded value converted back to a pulse width, if a refresh
    /// period has been set.
    pub fn pulse_width_us(&self) -> Option<u16> {
        let state = self.state.lock();
        if state.period_hz == 0 {
            return None;
        }
        let period_us = 1_000_000.0 / state.period_hz as f32;
        Some((state.duty_cycle * period_us).round() as u16)
    }
}

impl ActuatorPort for SimPwm {
    fn enable(&mut self) -> Result<(), DeviceError> {
        if self.fail_enable {
            return Err(DeviceError::EnableFailed(self.channel));
        }
        self.state.lock().enabled = true;
        Ok(())
    }

    fn set_period(&mut self, hz: u32) -> Result<(), DeviceError> {
        if hz == 0 {
            return Err(DeviceError::InvalidPeriod {
                channel: self.channel,
                hz,
            });
        }
        let mut state = self.state.lock();
        if !state.enabled {
            return Err(DeviceError::NotEnabled(self.channel));
        }
        state.period_hz = hz;
        Ok(())
    }

    fn set_duty_cycle(&mut self, fraction: f32) -> Result<(), DeviceError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(DeviceError::InvalidDutyCycle {
                channel: self.channel,
                fraction,
            });
        }
        let mut state = self.state.lock();
        if !state.enabled {
            return Err(DeviceError::NotEnabled(self.channel));
        }
        if state.period_hz == 0 {
            return Err(DeviceError::NoRefreshPeriod(self.channel));
        }
        state.duty_cycle = fraction;
        Ok(())
    }
}

// ============================================================================
// SIMULATED RC RECEIVER
// ============================================================================

/// In-memory RC receiver. Clones share the channel array, so stick positions
/// can be moved while the control thread polls.
#[derive(Clone)]
pub struct SimReceiver {
    channels: Arc<Mutex<[u16; RC_CHANNEL_COUNT]>>,
}

impl Default for SimReceiver {
    fn default() -> Self {
        Self {
            channels: Arc::new(Mutex::new([RC_NEUTRAL_US; RC_CHANNEL_COUNT])),
        }
    }
}

impl SimReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_channel(&self, channel: usize, pulse_us: u16) {
        self.channels.lock()[channel] = pulse_us;
    }
}

impl ReceiverPort for SimReceiver {
    fn read(&self, channel: usize) -> u16 {
        self.channels.lock()[channel]
    }
}
