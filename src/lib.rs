//! # mvcam - control facade for USB machine-vision cameras
//!
//! Wraps a vendor camera SDK behind one small surface:
//! - SDK lifecycle and device enumeration (every camera opened and streaming)
//! - Typed parameter access (integer, float, bool, string, enumeration)
//! - Frame grabbing with conversion to packed BGR/RGB
//! - C FFI for integration with C/C++ callers
//!
//! The SDK is reached through the [`CameraSdk`] trait. [`sim::SimSdk`]
//! simulates cameras in memory; the `hikvision` feature adds a backend for
//! the Hikvision MVS SDK.
//!
//! ## Quick Start
//! ```
//! use mvcam::{sim::SimSdk, Cameras};
//!
//! let mut cams = Cameras::new(SimSdk::with_devices(1));
//! cams.initialize().unwrap();
//! let count = cams.enumerate_devices().unwrap();
//! for index in 0..count {
//!     cams.set_float(index, "ExposureTime", 5000.0).unwrap();
//!     let mut frame = vec![0u8; cams.frame_len(index).unwrap()];
//!     let info = cams.acquire_frame(index, &mut frame).unwrap();
//!     println!("{}x{}", info.width, info.height);
//! }
//! cams.finalize().unwrap();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod sdk;
pub mod registry;
pub mod params;
mod frame;
pub mod cameras;
pub mod sim;
#[cfg(feature = "hikvision")]
pub mod hikvision;
pub mod ffi;

pub use cameras::Cameras;
pub use config::{CameraProfile, Config, Control};
pub use error::{ApiOutcome, CameraError};
pub use registry::{DeviceRegistry, DeviceSession};
pub use sdk::CameraSdk;
pub use types::*;

/// Result type alias for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
