pub mod attitude;
pub mod bus;
pub mod config;
pub mod control_loop;
pub mod controller;
pub mod device;
pub mod metrics;
pub mod sensor_feed;

pub use attitude::{OrientationSample, SharedAttitude};
pub use bus::{BusChannels, TelemetryRecord};
pub use config::{ConfigError, ConfigOverrides, ControlConfig};
pub use control_loop::{
    init_actuator_ports, pulse_to_desired_roll, saturate_throttle, spawn_control_thread,
};
pub use controller::{PidGains, RollPid};
pub use device::{ActuatorPort, DeviceError, ReceiverPort, SimPwm, SimReceiver};
pub use metrics::LoopMetrics;
pub use sensor_feed::{spawn_feed_thread, SimulatedImu};
