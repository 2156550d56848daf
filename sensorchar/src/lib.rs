//! Camera sensor characterization: drive a camera through a plan of
//! gain/exposure settings, store every acquisition as an array file and log
//! mean and temporal variance per entry.

pub mod camera;
pub mod config;
pub mod frame;
pub mod plan;
pub mod runlog;
pub mod runner;
pub mod stats;
mod error;
mod utils;

pub use crate::camera::{DeviceSelector, GainMode, Session};
pub use crate::error::{Error, SensorResult};
pub use crate::frame::FrameSet;
pub use crate::utils::Stopwatch;
