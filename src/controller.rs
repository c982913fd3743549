//! Roll PID controller - filtered-derivative PID with clamped integral

/// Integral term bound (anti-windup by clamping).
pub const MAX_INTEGRAL: f32 = 4.0;

/// Servo pulse width floor/ceiling in microseconds.
pub const SERVO_PULSE_MIN_US: u16 = 1250;
pub const SERVO_PULSE_MAX_US: u16 = 1750;

// Derivative low-pass: alpha = FILTER_DT / (FILTER_DT + TAU), fixed at build.
const DERIVATIVE_TAU_S: f32 = 0.025;
const DERIVATIVE_FILTER_DT_S: f32 = 0.01;

// The control signal spans roughly +-22 deg of actuation, mapped onto
// +-250 us of servo travel around the trim point.
const CONTROL_RANGE_DEG: f32 = 22.0;
const SERVO_HALF_RANGE_US: f32 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.6,
            ki: 2.0,
            kd: 0.01,
        }
    }
}

/// Closed-loop roll controller. Owns the integral and filtered-derivative
/// state across invocations; state is reset only at construction.
pub struct RollPid {
    gains: PidGains,
    trim_us: u16,
    integral: f32,
    filtered_derivative: f32,
    previous_error: f32,
    last_error: f32,
}

impl RollPid {
    pub fn new(gains: PidGains, trim_us: u16) -> Self {
        Self {
            gains,
            trim_us,
            integral: 0.0,
            filtered_derivative: 0.0,
            previous_error: 0.0,
            last_error: 0.0,
        }
    }

    /// One controller invocation: angles in degrees, sample interval in
    /// seconds. Returns the servo pulse width in microseconds, always within
    /// [`SERVO_PULSE_MIN_US`, `SERVO_PULSE_MAX_US`].
    ///
    /// A non-positive `dt` holds the filtered derivative and contributes
    /// nothing to the integral; no division occurs.
    pub fn compute(&mut self, desired_deg: f32, measured_deg: f32, dt: f32) -> u16 {
        let error = desired_deg - measured_deg;
        self.last_error = error;

        if dt > 0.0 {
            let raw_derivative = (error - self.previous_error) / dt;
            let alpha = DERIVATIVE_FILTER_DT_S / (DERIVATIVE_FILTER_DT_S + DERIVATIVE_TAU_S);
            self.filtered_derivative =
                alpha * raw_derivative + (1.0 - alpha) * self.filtered_derivative;

            // Integral accumulates even while the output saturates; the
            // clamp bounds the stored value, it does not freeze it.
            self.integral += self.gains.ki * error * dt;
            self.integral = self.integral.clamp(-MAX_INTEGRAL, MAX_INTEGRAL);
        }

        let control = self.gains.kp * error + self.integral + self.gains.kd * self.filtered_derivative;

        self.previous_error = error;

        let pulse = (-(control * SERVO_HALF_RANGE_US) / CONTROL_RANGE_DEG
            + self.trim_us as f32)
            .round() as i32;
        pulse.clamp(SERVO_PULSE_MIN_US as i32, SERVO_PULSE_MAX_US as i32) as u16
    }

    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn filtered_derivative(&self) -> f32 {
        self.filtered_derivative
    }
}
