//! Raw buffers, conversion to arrays and multi-frame acquisition.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use ndarray_npy::{read_npy, write_npy};

use crate::camera::Session;
use crate::error::{Error, SensorResult};

/// GenICam PFNC pixel format code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const MONO8: PixelFormat = PixelFormat(0x0108_0001);
    pub const MONO12: PixelFormat = PixelFormat(0x0110_0005);
    pub const MONO16: PixelFormat = PixelFormat(0x0110_0007);

    /// Bits occupied by one pixel, including padding.
    pub fn bits_per_pixel(&self) -> u32 {
        (self.0 >> 16) & 0xff
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel() as usize).div_ceil(8)
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Self::MONO8 => "Mono8",
            Self::MONO12 => "Mono12",
            Self::MONO16 => "Mono16",
            _ => "Unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Mono8" => Some(Self::MONO8),
            "Mono12" => Some(Self::MONO12),
            "Mono16" => Some(Self::MONO16),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferStatus {
    Success,
    Timeout,
    MissingPackets,
    Aborted,
}

/// A frame exactly as the camera delivered it.
#[derive(Debug, Clone)]
pub struct RawBuffer {
    pub status: BufferStatus,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawBuffer {
    pub fn empty(status: BufferStatus) -> Self {
        Self {
            status,
            pixel_format: PixelFormat::MONO16,
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }
}

/// Reinterpret a raw buffer as a (height, width) array of samples.
///
/// Returns `None` for anything that isn't a complete 8- or 16-bit frame.
pub fn buffer_to_array(buf: &RawBuffer) -> Option<Array2<u16>> {
    if buf.status != BufferStatus::Success || buf.data.is_empty() {
        return None;
    }
    let (w, h) = (buf.width as usize, buf.height as usize);
    let n = w.checked_mul(h)?;
    if n == 0 {
        return None;
    }
    let samples: Vec<u16> = match buf.pixel_format.bits_per_pixel() {
        8 => buf.data.get(..n)?.iter().map(|&v| u16::from(v)).collect(),
        16 => buf
            .data
            .get(..n * 2)?
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect(),
        bpp => {
            warn!("Unsupported bit depth {bpp}");
            return None;
        }
    };
    Array2::from_shape_vec((h, w), samples).ok()
}

/// Frames from one acquisition: a lone frame, or a (frames, height, width) cube.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSet {
    Single(Array2<u16>),
    Stack(Array3<u16>),
}

impl FrameSet {
    pub fn shape(&self) -> &[usize] {
        match self {
            FrameSet::Single(a) => a.shape(),
            FrameSet::Stack(a) => a.shape(),
        }
    }

    pub fn frame_count(&self) -> usize {
        match self {
            FrameSet::Single(_) => 1,
            FrameSet::Stack(a) => a.len_of(Axis(0)),
        }
    }

    /// Write as a `.npy` array, at exactly `path`.
    pub fn save(&self, path: &Path) -> SensorResult<()> {
        match self {
            FrameSet::Single(a) => write_npy(path, a),
            FrameSet::Stack(a) => write_npy(path, a),
        }
        .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> SensorResult<Self> {
        let arr: ArrayD<u16> =
            read_npy(path).with_context(|| format!("reading {}", path.display()))?;
        let set = match arr.ndim() {
            2 => FrameSet::Single(arr.into_dimensionality::<Ix2>().context("2-D frame")?),
            3 => FrameSet::Stack(arr.into_dimensionality::<Ix3>().context("3-D stack")?),
            n => {
                return Err(anyhow::anyhow!("{} holds a {n}-D array", path.display()).into())
            }
        };
        Ok(set)
    }
}

/// Wait between captures to let the sensor settle.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Capture `frame_count` frames, pausing `frame_wait` between consecutive
/// captures. Acquisition is stopped on every exit path.
pub fn acquire(
    session: &mut Session,
    frame_count: usize,
    frame_wait: Duration,
    timeout: Option<Duration>,
    pause: &mut dyn Pause,
) -> SensorResult<FrameSet> {
    if frame_count == 0 {
        return Err(anyhow::anyhow!("need at least one frame").into());
    }
    debug!("Starting acquisition of {frame_count} frame(s)");
    let device = session.device_mut();
    device.start_acquisition()?;
    let frames = capture_frames(device, frame_count, frame_wait, timeout, pause);
    let stopped = device.stop_acquisition();
    let mut frames = frames?;
    stopped?;

    let set = if frame_count == 1 {
        // length checked by capture_frames
        FrameSet::Single(frames.remove(0))
    } else {
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        let stack = ndarray::stack(Axis(0), &views).context("frames changed size")?;
        FrameSet::Stack(stack)
    };
    info!("Acquired frame data with shape {:?}", set.shape());
    Ok(set)
}

fn capture_frames(
    device: &mut dyn crate::camera::Device,
    frame_count: usize,
    frame_wait: Duration,
    timeout: Option<Duration>,
    pause: &mut dyn Pause,
) -> SensorResult<Vec<Array2<u16>>> {
    let mut frames = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        if i > 0 {
            pause.pause(frame_wait);
        }
        debug!("Frame {}", i + 1);
        let raw = device.capture(timeout)?;
        let frame = buffer_to_array(&raw).ok_or(Error::EmptyCaptureBuffer { frame: i + 1 })?;
        frames.push(frame);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{GainMode, SimCamera};

    #[derive(Default)]
    struct CountingPause(Vec<Duration>);

    impl Pause for CountingPause {
        fn pause(&mut self, duration: Duration) {
            self.0.push(duration);
        }
    }

    fn session() -> Session {
        let mut s = Session::from_device(SimCamera::with_sensor(16, 8).seeded(1));
        s.apply_standard_config().unwrap();
        s.set_exposure_and_gain(GainMode::Hcg, 5.0, 1000.0).unwrap();
        s
    }

    #[test]
    fn mono16_buffer_converts_little_endian() {
        let buf = RawBuffer {
            status: BufferStatus::Success,
            pixel_format: PixelFormat::MONO16,
            width: 3,
            height: 2,
            data: vec![1, 0, 0, 1, 255, 255, 4, 0, 5, 0, 6, 0],
        };
        let arr = buffer_to_array(&buf).unwrap();
        assert_eq!(arr.shape(), &[2, 3]);
        assert_eq!(arr.len(), 6);
        assert_eq!(arr[[0, 0]], 1);
        assert_eq!(arr[[0, 1]], 256);
        assert_eq!(arr[[0, 2]], u16::MAX);
        assert_eq!(arr[[1, 2]], 6);
    }

    #[test]
    fn mono8_buffer_is_widened() {
        let buf = RawBuffer {
            status: BufferStatus::Success,
            pixel_format: PixelFormat::MONO8,
            width: 2,
            height: 2,
            data: vec![0, 7, 128, 255],
        };
        let arr = buffer_to_array(&buf).unwrap();
        assert_eq!(arr, ndarray::arr2(&[[0u16, 7], [128, 255]]));
    }

    #[test]
    fn bad_buffers_give_none() {
        assert!(buffer_to_array(&RawBuffer::empty(BufferStatus::Timeout)).is_none());
        assert!(buffer_to_array(&RawBuffer::empty(BufferStatus::Success)).is_none());
        let short = RawBuffer {
            status: BufferStatus::Success,
            pixel_format: PixelFormat::MONO16,
            width: 4,
            height: 4,
            data: vec![0; 10],
        };
        assert!(buffer_to_array(&short).is_none());
        let odd = RawBuffer {
            pixel_format: PixelFormat(0x010C_0047),
            data: vec![0; 64],
            ..short
        };
        assert!(buffer_to_array(&odd).is_none());
    }

    #[test]
    fn single_frame_is_2d_without_pause() {
        let mut s = session();
        let mut pause = CountingPause::default();
        let set = acquire(&mut s, 1, Duration::from_secs(1), None, &mut pause).unwrap();
        assert!(matches!(set, FrameSet::Single(_)));
        assert_eq!(set.shape(), &[8, 16]);
        assert!(pause.0.is_empty());
    }

    #[test]
    fn stack_pauses_between_frames_only() {
        let mut s = session();
        let mut pause = CountingPause::default();
        let wait = Duration::from_millis(250);
        let set = acquire(&mut s, 4, wait, None, &mut pause).unwrap();
        assert_eq!(set.shape(), &[4, 8, 16]);
        assert_eq!(set.frame_count(), 4);
        assert_eq!(pause.0, vec![wait; 3]);
    }

    #[test]
    fn empty_capture_is_an_error_and_stops_acquisition() {
        let mut s = Session::from_device(SimCamera::with_sensor(16, 8).drop_frame(2));
        s.apply_standard_config().unwrap();
        let err = acquire(&mut s, 3, Duration::ZERO, None, &mut CountingPause::default())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyCaptureBuffer { frame: 2 }));
        // a second run must be able to start again
        let set = acquire(&mut s, 1, Duration::ZERO, None, &mut CountingPause::default());
        assert!(set.is_ok());
    }

    #[test]
    fn npy_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session();
        for n in [1, 3] {
            let set = acquire(&mut s, n, Duration::ZERO, None, &mut CountingPause::default())
                .unwrap();
            let path = dir.path().join(format!("frames_{n}.dat"));
            set.save(&path).unwrap();
            assert!(path.exists());
            assert_eq!(FrameSet::load(&path).unwrap(), set);
        }
    }
}
