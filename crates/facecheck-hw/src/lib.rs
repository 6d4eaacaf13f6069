//! facecheck-hw — Camera capture for the attendance kiosk.
//!
//! Provides V4L2-based camera access and conversion of raw camera buffers
//! into upright RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
