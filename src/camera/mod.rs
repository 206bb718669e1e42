//! Camera module - capture devices and the current-photo store

mod device;
mod simulated;
mod command;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{CaptureDevice, ExposurePreset, FrameSize, TuneParam};
pub use simulated::SimulatedCamera;
pub use command::CommandCamera;
pub use store::{CameraInfo, CaptureMeta, CaptureReason, CaptureStore, Photo};
