//! Physical cameras through V4L2.
//!
//! Gain, exposure and flips map onto the standard V4L2 controls. Everything
//! GenICam-specific (gain conversion, telemetry) is looked up by control
//! name and reported unavailable when the driver doesn't expose it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::{debug, warn};

use super::{features as f, Bounds, Device, DeviceInfo, FeatureValue};
use crate::error::{Error, SensorResult};
use crate::frame::{BufferStatus, PixelFormat, RawBuffer};

const CID_BASE: u32 = 0x0098_0900;
const CID_AUTOGAIN: u32 = CID_BASE + 18;
const CID_GAIN: u32 = CID_BASE + 19;
const CID_HFLIP: u32 = CID_BASE + 20;
const CID_VFLIP: u32 = CID_BASE + 21;
const CID_CAMERA_CLASS_BASE: u32 = 0x009a_0900;
const CID_EXPOSURE_AUTO: u32 = CID_CAMERA_CLASS_BASE + 1;
const CID_EXPOSURE_ABSOLUTE: u32 = CID_CAMERA_CLASS_BASE + 2;
const EXPOSURE_MANUAL: i32 = 1;
const EXPOSURE_APERTURE_PRIORITY: i32 = 3;
/// V4L2 absolute exposure is in units of 100µs
const EXPOSURE_UNIT_US: f64 = 100.0;

const Y16: [u8; 4] = *b"Y16 ";
const GREY: [u8; 4] = *b"GREY";

/// Video capture nodes, sorted.
pub fn enumerate() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return Vec::new();
    };
    let mut devices: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("video"))
        })
        .collect();
    devices.sort();
    devices
}

pub struct V4l2Camera {
    cam: rscam::Camera,
    path: PathBuf,
    sensor: (u32, u32),
    formats: Vec<[u8; 4]>,
    /// Features with no V4L2 control, kept so reads return what was written.
    shadow: BTreeMap<String, FeatureValue>,
    acquiring: bool,
}

impl V4l2Camera {
    pub fn open(path: &Path) -> SensorResult<Self> {
        let device = path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid camera path {}", path.display()))?;
        let cam = rscam::Camera::new(device).map_err(|source| Error::DeviceOpen {
            device: device.to_string(),
            source,
        })?;
        let formats: Vec<[u8; 4]> = cam
            .formats()
            .filter_map(|fmt| fmt.ok())
            .map(|fmt| fmt.format)
            .filter(|fmt| *fmt == Y16 || *fmt == GREY)
            .collect();
        let best = if formats.contains(&Y16) { Y16 } else { GREY };
        if !formats.contains(&best) {
            return Err(anyhow!("{} offers no grey pixel format", path.display()).into());
        }
        let sensor = match cam
            .resolutions(&best)
            .with_context(|| format!("format {}", String::from_utf8_lossy(&best)))?
        {
            rscam::ResolutionInfo::Discretes(v) => v
                .into_iter()
                .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h))
                .ok_or_else(|| anyhow!("No resolutions!"))?,
            rscam::ResolutionInfo::Stepwise { max, .. } => max,
        };
        let (w, h) = sensor;
        let shadow = [
            (f::OFFSET_X, FeatureValue::Int(0)),
            (f::OFFSET_Y, FeatureValue::Int(0)),
            (f::WIDTH, FeatureValue::Int(w.into())),
            (f::HEIGHT, FeatureValue::Int(h.into())),
            (f::BINNING_H, FeatureValue::Int(1)),
            (f::BINNING_V, FeatureValue::Int(1)),
            (f::ACQUISITION_MODE, FeatureValue::Str("SingleFrame".into())),
            (
                f::PIXEL_FORMAT,
                FeatureValue::Str(Self::format_name(best).into()),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Ok(Self {
            cam,
            path: path.to_path_buf(),
            sensor,
            formats,
            shadow,
            acquiring: false,
        })
    }

    fn format_name(fourcc: [u8; 4]) -> &'static str {
        if fourcc == Y16 {
            PixelFormat::MONO16.name()
        } else {
            PixelFormat::MONO8.name()
        }
    }

    fn control(&self, id: u32, name: &str) -> SensorResult<rscam::Control> {
        self.cam
            .get_control(id)
            .map_err(|e| control_error(id, name, e))
    }

    fn named_control(&self, label: &str) -> SensorResult<rscam::Control> {
        self.cam
            .controls()
            .filter_map(|c| c.ok())
            .find(|c| c.name.eq_ignore_ascii_case(label))
            .ok_or_else(|| Error::FeatureUnavailable(label.to_string()))
    }

    fn set_control<T: rscam::Settable>(&self, id: u32, name: &str, value: &T) -> SensorResult<()> {
        self.cam
            .set_control(id, value)
            .map_err(|e| control_error(id, name, e))
    }

    /// A driver without the flip control never flips.
    fn flip(&self, id: u32, name: &str) -> SensorResult<FeatureValue> {
        match self.control(id, name) {
            Err(Error::FeatureUnavailable(_)) => Ok(FeatureValue::Bool(false)),
            control => Self::value_of(&control?, name),
        }
    }

    fn set_flip(&self, id: u32, name: &str, on: bool) -> SensorResult<()> {
        match self.set_control(id, name, &on) {
            Err(Error::FeatureUnavailable(_)) if !on => {
                debug!("{name}: no flip control, image is unflipped");
                Ok(())
            }
            res => res,
        }
    }

    fn value_of(control: &rscam::Control, name: &str) -> SensorResult<FeatureValue> {
        match &control.data {
            rscam::CtlData::Integer { value, .. } => Ok(FeatureValue::Int((*value).into())),
            rscam::CtlData::Integer64 { value, .. } => Ok(FeatureValue::Int(*value)),
            rscam::CtlData::Boolean { value, .. } => Ok(FeatureValue::Bool(*value)),
            rscam::CtlData::Menu { value, items, .. } => items
                .iter()
                .find(|item| item.index == *value)
                .map(|item| FeatureValue::Str(item.name.clone()))
                .ok_or_else(|| anyhow!("{name}: menu value {value} not listed").into()),
            _ => Err(Error::FeatureType {
                name: name.to_string(),
                expected: "integer, boolean or menu",
            }),
        }
    }

    fn int_bounds(control: &rscam::Control) -> Option<Bounds> {
        match control.data {
            rscam::CtlData::Integer {
                minimum, maximum, ..
            } => Some(Bounds {
                min: minimum.into(),
                max: maximum.into(),
            }),
            _ => None,
        }
    }

    fn set_menu(&self, label: &str, choice: &str) -> SensorResult<()> {
        let control = self.named_control(label)?;
        let rscam::CtlData::Menu { items, .. } = &control.data else {
            return Err(Error::FeatureType {
                name: label.to_string(),
                expected: "menu",
            });
        };
        let item = items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(choice))
            .ok_or_else(|| anyhow!("{label} has no option {choice}"))?;
        self.set_control(control.id, label, &(item.index as i32))
    }

    fn float_control(&self, label: &str) -> SensorResult<FeatureValue> {
        let control = self.named_control(label)?;
        let v = Self::value_of(&control, label)?.as_float(label)?;
        Ok(FeatureValue::Float(v))
    }
}

/// Drivers answer EINVAL for control ids they don't implement.
fn control_error(id: u32, name: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::InvalidInput {
        Error::FeatureUnavailable(name.to_string())
    } else {
        anyhow!("V4L2 control {id:#x} ({name}): {e}").into()
    }
}

impl Device for V4l2Camera {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor: "V4L2".to_string(),
            model: self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            id: self.path.display().to_string(),
        }
    }

    fn get_feature(&self, name: &str) -> SensorResult<FeatureValue> {
        match name {
            f::VENDOR | f::MODEL | f::DEVICE_ID => {
                let info = self.info();
                Ok(FeatureValue::Str(match name {
                    f::VENDOR => info.vendor,
                    f::MODEL => info.model,
                    _ => info.id,
                }))
            }
            f::SENSOR_WIDTH => Ok(FeatureValue::Int(self.sensor.0.into())),
            f::SENSOR_HEIGHT => Ok(FeatureValue::Int(self.sensor.1.into())),
            f::GAIN => {
                let v = Self::value_of(&self.control(CID_GAIN, name)?, name)?.as_float(name)?;
                Ok(FeatureValue::Float(v))
            }
            f::EXPOSURE_TIME => {
                let control = self.control(CID_EXPOSURE_ABSOLUTE, name)?;
                let v = Self::value_of(&control, name)?.as_float(name)?;
                Ok(FeatureValue::Float(v * EXPOSURE_UNIT_US))
            }
            f::EXPOSURE_AUTO => {
                let control = self.control(CID_EXPOSURE_AUTO, name)?;
                let manual = matches!(
                    control.data,
                    rscam::CtlData::Menu { value, .. } if value as i32 == EXPOSURE_MANUAL
                );
                Ok(FeatureValue::Str(if manual { "Off" } else { "Continuous" }.into()))
            }
            f::GAIN_AUTO => {
                let on = Self::value_of(&self.control(CID_AUTOGAIN, name)?, name)?.as_bool(name)?;
                Ok(FeatureValue::Str(if on { "Continuous" } else { "Off" }.into()))
            }
            f::REVERSE_X => self.flip(CID_HFLIP, name),
            f::REVERSE_Y => self.flip(CID_VFLIP, name),
            f::GAIN_CONVERSION => Self::value_of(&self.named_control("Gain Conversion")?, name),
            f::TEMPERATURE => self.float_control("Temperature"),
            f::SUPPLY_VOLTAGE => self.float_control("Power Supply Voltage"),
            f::SUPPLY_CURRENT => self.float_control("Power Supply Current"),
            _ => self
                .shadow
                .get(name)
                .cloned()
                .ok_or_else(|| Error::FeatureUnavailable(name.to_string())),
        }
    }

    fn set_feature(&mut self, name: &str, value: FeatureValue) -> SensorResult<()> {
        match name {
            f::GAIN => {
                let v = value.as_float(name)?.round() as i32;
                self.set_control(CID_GAIN, name, &v)
            }
            f::EXPOSURE_TIME => {
                let v = (value.as_float(name)? / EXPOSURE_UNIT_US).round().max(1.0) as i32;
                self.set_control(CID_EXPOSURE_ABSOLUTE, name, &v)
            }
            f::EXPOSURE_AUTO => {
                let mode = if value.as_str(name)? == "Off" {
                    EXPOSURE_MANUAL
                } else {
                    EXPOSURE_APERTURE_PRIORITY
                };
                self.set_control(CID_EXPOSURE_AUTO, name, &mode)
            }
            f::GAIN_AUTO => {
                let on = value.as_str(name)? != "Off";
                self.set_control(CID_AUTOGAIN, name, &on)
            }
            f::REVERSE_X => self.set_flip(CID_HFLIP, name, value.as_bool(name)?),
            f::REVERSE_Y => self.set_flip(CID_VFLIP, name, value.as_bool(name)?),
            f::GAIN_CONVERSION => self.set_menu("Gain Conversion", value.as_str(name)?),
            f::PIXEL_FORMAT => {
                let wanted = value.as_str(name)?;
                let available = self
                    .formats
                    .iter()
                    .any(|fmt| Self::format_name(*fmt) == wanted);
                if !available {
                    return Err(anyhow!("{} does not offer {wanted}", self.path.display()).into());
                }
                self.shadow.insert(name.to_string(), value);
                Ok(())
            }
            f::OFFSET_X | f::OFFSET_Y | f::BINNING_H | f::BINNING_V | f::WIDTH | f::HEIGHT => {
                let v = value.as_int(name)?;
                let full = match name {
                    f::WIDTH => i64::from(self.sensor.0),
                    f::HEIGHT => i64::from(self.sensor.1),
                    f::BINNING_H | f::BINNING_V => 1,
                    _ => 0,
                };
                if v != full {
                    return Err(anyhow!("{name}={v} not supported, V4L2 reads full frames").into());
                }
                Ok(())
            }
            f::ACQUISITION_MODE => {
                self.shadow.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(Error::FeatureUnavailable(name.to_string())),
        }
    }

    fn pixel_formats(&self) -> Vec<PixelFormat> {
        self.formats
            .iter()
            .filter_map(|fmt| PixelFormat::from_name(Self::format_name(*fmt)))
            .collect()
    }

    fn float_bounds(&self, name: &str) -> SensorResult<Bounds> {
        let (id, scale) = match name {
            f::GAIN => (CID_GAIN, 1.0),
            f::EXPOSURE_TIME => (CID_EXPOSURE_ABSOLUTE, EXPOSURE_UNIT_US),
            _ => return Err(Error::FeatureUnavailable(name.to_string())),
        };
        let b = Self::int_bounds(&self.control(id, name)?)
            .ok_or_else(|| Error::FeatureUnavailable(name.to_string()))?;
        Ok(Bounds {
            min: b.min * scale,
            max: b.max * scale,
        })
    }

    fn execute(&mut self, command: &str) -> SensorResult<()> {
        Err(Error::FeatureUnavailable(command.to_string()))
    }

    fn start_acquisition(&mut self) -> SensorResult<()> {
        let name = self.get_feature(f::PIXEL_FORMAT)?;
        let format = if name.as_str(f::PIXEL_FORMAT)? == PixelFormat::MONO16.name() {
            Y16
        } else {
            GREY
        };
        let interval = match self.cam.intervals(&format, self.sensor) {
            Ok(rscam::IntervalInfo::Discretes(v)) => v.first().copied(),
            _ => None,
        };
        let mut config = rscam::Config {
            resolution: self.sensor,
            format: &format,
            ..Default::default()
        };
        if let Some(interval) = interval {
            config.interval = interval;
        }
        self.cam.start(&config).context("camera start")?;
        self.acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> SensorResult<()> {
        if self.acquiring {
            self.acquiring = false;
            self.cam.stop().context("camera stop")?;
        }
        Ok(())
    }

    fn capture(&mut self, timeout: Option<Duration>) -> SensorResult<RawBuffer> {
        if !self.acquiring {
            return Err(Error::NotAcquiring);
        }
        if timeout.is_some() {
            debug!("V4L2 capture ignores timeouts, waiting for frame");
        }
        let frame = match self.cam.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Capture failed: {e}");
                return Ok(RawBuffer::empty(BufferStatus::Aborted));
            }
        };
        let pixel_format = if frame.format == Y16 {
            PixelFormat::MONO16
        } else {
            PixelFormat::MONO8
        };
        Ok(RawBuffer {
            status: BufferStatus::Success,
            pixel_format,
            width: frame.resolution.0,
            height: frame.resolution.1,
            data: frame.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Session;

    #[test]
    fn unknown_control_is_unavailable() {
        let missing = control_error(CID_HFLIP, f::REVERSE_X, io::Error::from_raw_os_error(22));
        assert!(matches!(missing, Error::FeatureUnavailable(name) if name == f::REVERSE_X));
        let busy = control_error(CID_GAIN, f::GAIN, io::Error::from_raw_os_error(16));
        assert!(matches!(busy, Error::Other(_)));
    }

    #[test]
    #[ignore = "needs a V4L2 camera"]
    fn stream() {
        let path = enumerate().into_iter().next().expect("no camera");
        let mut session = Session::from_device(V4l2Camera::open(&path).expect("open"));
        session.apply_standard_config().expect("standard config");
        let frames = crate::frame::acquire(
            &mut session,
            10,
            Duration::ZERO,
            None,
            &mut crate::frame::ThreadSleep,
        )
        .expect("frame err");
        assert_eq!(frames.frame_count(), 10);
    }
}
