//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use image::RgbImage;
use std::io;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// Linux `EBUSY`.
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("stream error: {0}")]
    Stream(#[source] io::Error),
    #[error("frame conversion failed: {0}")]
    Frame(#[from] frame::FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel formats the camera can deliver, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// NV21 4:2:0 semi-planar, 1.5 bytes/pixel.
    Nv21,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    pub const PREFERRED: [PixelFormat; 3] = [PixelFormat::Yuyv, PixelFormat::Nv21, PixelFormat::Grey];

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Nv21 => FourCC::new(b"NV21"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERRED.into_iter().find(|f| f.fourcc() == fourcc)
    }

    /// Decode one raw buffer of this format to RGB.
    pub fn to_rgb(self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, frame::FrameError> {
        match self {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
            PixelFormat::Nv21 => frame::nv21_to_rgb(buf, width, height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and negotiate
    /// a 640×480 capture format the frame decoder understands.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            Some(EBUSY) => CameraError::Busy(device_path.to_string()),
            _ => CameraError::Open {
                path: device_path.to_string(),
                source: e,
            },
        })?;

        let caps = device.query_caps().map_err(|e| CameraError::Open {
            path: device_path.to_string(),
            source: e,
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(device_path.to_string()));
        }

        let (pixel_format, width, height) = negotiate(&device)?;
        tracing::info!(
            device = device_path,
            card = %caps.card,
            width,
            height,
            format = ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            width,
            height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Start a memory-mapped capture stream.
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::Stream)?;
        Ok(FrameStream { camera: self, stream })
    }

    /// Capture a single frame on a short-lived stream.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        self.stream()?.next_frame()
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Try each preferred format in turn; keep the first the driver accepts as-is.
fn negotiate(device: &Device) -> Result<(PixelFormat, u32, u32), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::Format(format!("failed to read current format: {e}")))?;

    for wanted in PixelFormat::PREFERRED {
        fmt.fourcc = wanted.fourcc();
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        match device.set_format(&fmt) {
            Ok(got) => match PixelFormat::from_fourcc(got.fourcc) {
                Some(format) => return Ok((format, got.width, got.height)),
                None => tracing::debug!(wanted = ?wanted, got = ?got.fourcc, "driver substituted format"),
            },
            Err(e) => tracing::debug!(wanted = ?wanted, error = %e, "format rejected"),
        }
    }

    Err(CameraError::Format(
        "driver offers none of YUYV, NV21, GREY".to_string(),
    ))
}

/// Continuous capture from an open camera.
pub struct FrameStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Block until the next frame is available and convert it to RGB.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self.stream.next().map_err(CameraError::Stream)?;
        let sequence = meta.sequence;
        let cam = self.camera;
        let image = cam.pixel_format.to_rgb(buf, cam.width, cam.height)?;

        Ok(Frame {
            image,
            timestamp: Instant::now(),
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        for format in PixelFormat::PREFERRED {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_yuyv_preferred_first() {
        assert_eq!(PixelFormat::PREFERRED[0], PixelFormat::Yuyv);
    }

    #[test]
    fn test_to_rgb_checks_buffer_length() {
        assert!(PixelFormat::Grey.to_rgb(&[0u8; 4], 2, 2).is_ok());
        assert!(matches!(
            PixelFormat::Nv21.to_rgb(&[0u8; 4], 2, 2),
            Err(frame::FrameError::InvalidLength { expected: 6, .. })
        ));
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/video-does-not-exist"),
            Err(CameraError::NotFound(_))
        ));
    }
}
