//! Core module - event fan-out, recapture scheduling, state cache and the
//! node that wires them together

mod engine;
mod event_bus;
mod scheduler;
mod state;

pub use engine::MonitorNode;
pub use event_bus::{EventChannel, EventReceiver, EventSender, RecvOutcome, ServerEvent, ServerEventKind};
pub use scheduler::{RecaptureScheduler, SchedulerStats, TickOutcome};
pub use state::{ServerStateSnapshot, StateCache};
