//! Sensor module - presence input, debouncing and simulation

mod traits;
mod gpio;
mod detector;
mod simulator;

pub use traits::{EdgeToken, InputPin, Level};
pub use gpio::{poll_edges, SimulatedPin, SysfsPin};
pub use detector::{
    edge_channel, DetectionNotice, DetectionStatistics, EdgeTrigger, MotionDetector,
    PresenceTracker,
};
pub use simulator::SensorSimulator;
