//! Camera session: device selection, the fixed characterization profile,
//! exposure/gain control and telemetry.
//!
//! Backends implement [`Device`], a GenICam-style feature interface. The
//! session only talks to features by name so the simulated camera and real
//! hardware are driven by the same code.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, SensorResult};
use crate::frame::{PixelFormat, RawBuffer};

pub mod sim;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub mod v4l2;

pub use sim::SimCamera;

/// Feature names understood by every backend.
pub mod features {
    pub const VENDOR: &str = "DeviceVendorName";
    pub const MODEL: &str = "DeviceModelName";
    pub const DEVICE_ID: &str = "DeviceID";
    pub const SENSOR_WIDTH: &str = "SensorWidth";
    pub const SENSOR_HEIGHT: &str = "SensorHeight";
    pub const OFFSET_X: &str = "OffsetX";
    pub const OFFSET_Y: &str = "OffsetY";
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const BINNING_H: &str = "BinningHorizontal";
    pub const BINNING_V: &str = "BinningVertical";
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const ACQUISITION_MODE: &str = "AcquisitionMode";
    pub const FRAME_RATE: &str = "AcquisitionFrameRate";
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    pub const GAIN_AUTO: &str = "GainAuto";
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    pub const GAIN: &str = "Gain";
    pub const GAIN_CONVERSION: &str = "GainConversion";
    pub const GAMMA_ENABLE: &str = "GammaEnable";
    pub const GAMMA: &str = "Gamma";
    pub const REVERSE_X: &str = "ReverseX";
    pub const REVERSE_Y: &str = "ReverseY";
    pub const ADC_BIT_DEPTH: &str = "AdcBitDepth";
    pub const TEMPERATURE_SELECTOR: &str = "DeviceTemperatureSelector";
    pub const DEFECT_CORRECTION: &str = "DefectCorrectStaticEnable";
    pub const BLACK_LEVEL_CLAMPING: &str = "BlackLevelClampingEnable";
    pub const TEMPERATURE: &str = "DeviceTemperature";
    pub const SUPPLY_VOLTAGE: &str = "PowerSupplyVoltage";
    pub const SUPPLY_CURRENT: &str = "PowerSupplyCurrent";

    pub const DEVICE_RESET: &str = "DeviceReset";
    pub const FACTORY_RESET: &str = "FactoryReset";
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FeatureValue {
    pub fn as_bool(&self, name: &str) -> SensorResult<bool> {
        match self {
            FeatureValue::Bool(v) => Ok(*v),
            _ => Err(type_error(name, "boolean")),
        }
    }

    pub fn as_int(&self, name: &str) -> SensorResult<i64> {
        match self {
            FeatureValue::Int(v) => Ok(*v),
            _ => Err(type_error(name, "integer")),
        }
    }

    /// Integers are accepted where a float is expected.
    pub fn as_float(&self, name: &str) -> SensorResult<f64> {
        match self {
            FeatureValue::Float(v) => Ok(*v),
            FeatureValue::Int(v) => Ok(*v as f64),
            _ => Err(type_error(name, "float")),
        }
    }

    pub fn as_str(&self, name: &str) -> SensorResult<&str> {
        match self {
            FeatureValue::Str(v) => Ok(v),
            _ => Err(type_error(name, "string")),
        }
    }
}

fn type_error(name: &str, expected: &'static str) -> Error {
    Error::FeatureType {
        name: name.to_string(),
        expected,
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.min, self.max)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Sensor amplification regime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GainMode {
    Hcg,
    Lcg,
}

impl GainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GainMode::Hcg => "HCG",
            GainMode::Lcg => "LCG",
        }
    }
}

impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GainMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HCG" => Ok(GainMode::Hcg),
            "LCG" => Ok(GainMode::Lcg),
            _ => anyhow::bail!("unknown gain mode {s:?}, expected HCG or LCG"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PowerReading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub temperature_c: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub id: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResetKind {
    /// Reboot the device, keeping stored settings
    Device,
    /// Restore factory defaults. Use with caution!
    Factory,
}

/// GenICam-style camera boundary.
pub trait Device {
    fn info(&self) -> DeviceInfo;
    fn get_feature(&self, name: &str) -> SensorResult<FeatureValue>;
    fn set_feature(&mut self, name: &str, value: FeatureValue) -> SensorResult<()>;
    /// Formats the camera can deliver, for `PixelFormat` writes.
    fn pixel_formats(&self) -> Vec<PixelFormat>;
    fn float_bounds(&self, name: &str) -> SensorResult<Bounds>;
    fn execute(&mut self, command: &str) -> SensorResult<()>;
    fn start_acquisition(&mut self) -> SensorResult<()>;
    fn stop_acquisition(&mut self) -> SensorResult<()>;
    /// Block until a frame arrives. `None` waits forever.
    fn capture(&mut self, timeout: Option<Duration>) -> SensorResult<RawBuffer>;
}

/// Which camera a session should bind to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Simulated,
    FirstPhysical,
    Path(PathBuf),
}

/// Acquisition parameters as last written to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub gain_mode: Option<GainMode>,
    pub gain: f64,
    pub exposure_us: f64,
    pub region: Region,
    pub binning: (u32, u32),
    pub pixel_format: PixelFormat,
    pub reverse_x: bool,
    pub reverse_y: bool,
}

pub struct Session {
    device: Box<dyn Device>,
    config: Option<CameraConfig>,
}

impl Session {
    pub fn open(selector: &DeviceSelector) -> SensorResult<Self> {
        let session = match selector {
            DeviceSelector::Simulated => {
                info!("Instantiated simulated camera");
                Self::from_device(SimCamera::new())
            }
            DeviceSelector::FirstPhysical => {
                let devices = enumerate_physical();
                debug!("Found {} physical camera(s)", devices.len());
                let first = devices.first().ok_or(Error::NoDeviceFound)?;
                open_physical(first)?
            }
            DeviceSelector::Path(path) => {
                if !path.exists() {
                    warn!("{} does not exist", path.display());
                    return Err(Error::NoDeviceFound);
                }
                open_physical(path)?
            }
        };
        Ok(session)
    }

    pub fn from_device(device: impl Device + 'static) -> Self {
        Self {
            device: Box::new(device),
            config: None,
        }
    }

    pub fn info(&self) -> DeviceInfo {
        self.device.info()
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Configuration applied by the last [`Session::apply_standard_config`],
    /// updated by [`Session::set_exposure_and_gain`].
    pub fn config(&self) -> Option<&CameraConfig> {
        self.config.as_ref()
    }

    pub fn get_bool(&self, name: &str) -> SensorResult<bool> {
        self.device.get_feature(name)?.as_bool(name)
    }

    pub fn get_int(&self, name: &str) -> SensorResult<i64> {
        self.device.get_feature(name)?.as_int(name)
    }

    pub fn get_float(&self, name: &str) -> SensorResult<f64> {
        self.device.get_feature(name)?.as_float(name)
    }

    pub fn get_string(&self, name: &str) -> SensorResult<String> {
        Ok(self.device.get_feature(name)?.as_str(name)?.to_string())
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> SensorResult<()> {
        self.device.set_feature(name, FeatureValue::Bool(value))
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> SensorResult<()> {
        self.device.set_feature(name, FeatureValue::Int(value))
    }

    pub fn set_float(&mut self, name: &str, value: f64) -> SensorResult<()> {
        self.device.set_feature(name, FeatureValue::Float(value))
    }

    pub fn set_string(&mut self, name: &str, value: &str) -> SensorResult<()> {
        self.device
            .set_feature(name, FeatureValue::Str(value.to_string()))
    }

    pub fn sensor_size(&self) -> SensorResult<(u32, u32)> {
        let w = self.get_int(features::SENSOR_WIDTH)?;
        let h = self.get_int(features::SENSOR_HEIGHT)?;
        Ok((to_u32(features::SENSOR_WIDTH, w)?, to_u32(features::SENSOR_HEIGHT, h)?))
    }

    pub fn region(&self) -> SensorResult<Region> {
        Ok(Region {
            x: to_u32(features::OFFSET_X, self.get_int(features::OFFSET_X)?)?,
            y: to_u32(features::OFFSET_Y, self.get_int(features::OFFSET_Y)?)?,
            width: to_u32(features::WIDTH, self.get_int(features::WIDTH)?)?,
            height: to_u32(features::HEIGHT, self.get_int(features::HEIGHT)?)?,
        })
    }

    pub fn pixel_format(&self) -> SensorResult<PixelFormat> {
        let name = self.get_string(features::PIXEL_FORMAT)?;
        PixelFormat::from_name(&name).ok_or_else(|| {
            anyhow::anyhow!("camera reports unsupported pixel format {name}").into()
        })
    }

    /// Settings that never change during characterization: single frames,
    /// full sensor, no binning, 16-bit pixels, nothing automatic, no pixel
    /// correction, no flips.
    pub fn apply_standard_config(&mut self) -> SensorResult<CameraConfig> {
        let (width, height) = self.sensor_size()?;

        self.set_string(features::ACQUISITION_MODE, "SingleFrame")?;
        self.set_int(features::BINNING_H, 1)?;
        self.set_int(features::BINNING_V, 1)?;
        self.set_int(features::OFFSET_X, 0)?;
        self.set_int(features::OFFSET_Y, 0)?;
        self.set_int(features::WIDTH, i64::from(width))?;
        self.set_int(features::HEIGHT, i64::from(height))?;
        self.set_string(features::PIXEL_FORMAT, PixelFormat::MONO16.name())?;
        self.set_string(features::EXPOSURE_AUTO, "Off")?;
        self.set_string(features::GAIN_AUTO, "Off")?;
        self.set_bool(features::REVERSE_X, false)?;
        self.set_bool(features::REVERSE_Y, false)?;

        // Vendor extensions. Not every camera has these.
        self.optional(features::FRAME_RATE, FeatureValue::Float(1.0))?;
        self.optional(features::GAMMA_ENABLE, FeatureValue::Bool(false))?;
        self.optional(features::ADC_BIT_DEPTH, FeatureValue::Str("Bit12".into()))?;
        self.optional(
            features::TEMPERATURE_SELECTOR,
            FeatureValue::Str("Sensor".into()),
        )?;
        // The static defect table interpolates over factory-measured bad pixels
        self.optional(features::DEFECT_CORRECTION, FeatureValue::Bool(false))?;
        self.optional(features::BLACK_LEVEL_CLAMPING, FeatureValue::Bool(false))?;

        info!("Set RoI to full frame {width} x {height}, binning 1 x 1");
        info!("Auto-exposure off, single frame mode, no X or Y flips");

        let config = CameraConfig {
            gain_mode: self.gain_mode().ok(),
            gain: self.get_float(features::GAIN)?,
            exposure_us: self.get_float(features::EXPOSURE_TIME)?,
            region: self.region()?,
            binning: (1, 1),
            pixel_format: self.pixel_format()?,
            reverse_x: false,
            reverse_y: false,
        };
        self.config = Some(config.clone());
        Ok(config)
    }

    fn optional(&mut self, name: &str, value: FeatureValue) -> SensorResult<()> {
        match self.device.set_feature(name, value) {
            Err(Error::FeatureUnavailable(_)) => {
                warn!("Camera has no {name}, skipping");
                Ok(())
            }
            r => r,
        }
    }

    pub fn gain_mode(&self) -> SensorResult<GainMode> {
        let mode = self.get_string(features::GAIN_CONVERSION)?;
        Ok(mode.parse()?)
    }

    /// Write gain mode, gain (dB) and exposure time (µs) after checking them
    /// against the bounds the camera reports.
    pub fn set_exposure_and_gain(
        &mut self,
        gain_mode: GainMode,
        gain: f64,
        exposure_us: f64,
    ) -> SensorResult<()> {
        self.check_bounds(features::GAIN, gain)?;
        self.check_bounds(features::EXPOSURE_TIME, exposure_us)?;

        self.set_float(features::GAIN, gain)?;
        self.set_float(features::EXPOSURE_TIME, exposure_us)?;
        self.set_string(features::GAIN_CONVERSION, gain_mode.as_str())?;
        debug!("GainMode {gain_mode} Gain {gain} ExposureTime {exposure_us}us");

        if let Some(config) = self.config.as_mut() {
            config.gain_mode = Some(gain_mode);
            config.gain = gain;
            config.exposure_us = exposure_us;
        }
        Ok(())
    }

    fn check_bounds(&self, name: &'static str, value: f64) -> SensorResult<()> {
        let bounds = match self.device.float_bounds(name) {
            Ok(b) => b,
            Err(Error::FeatureUnavailable(_)) => {
                debug!("No bounds reported for {name}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !bounds.contains(value) {
            return Err(Error::OutOfBounds {
                name,
                value,
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(())
    }

    pub fn read_power(&self) -> SensorResult<PowerReading> {
        let voltage = self.get_float(features::SUPPLY_VOLTAGE)?;
        let current = self.get_float(features::SUPPLY_CURRENT)?;
        let temperature_c = self.get_float(features::TEMPERATURE)?;
        Ok(PowerReading {
            voltage,
            current,
            power: voltage * current,
            temperature_c,
        })
    }

    pub fn status(&self) -> SensorResult<CameraStatus> {
        let info = self.device.info();
        let region = self.region()?;
        let pixel_format = self.pixel_format()?;
        let payload =
            u64::from(region.width) * u64::from(region.height) * pixel_format.bytes_per_pixel() as u64;
        Ok(CameraStatus {
            info,
            pixel_format,
            available_formats: self.device.pixel_formats(),
            sensor: self.sensor_size()?,
            region,
            payload,
            frame_rate: self.get_float(features::FRAME_RATE).ok(),
            exposure_us: self.get_float(features::EXPOSURE_TIME)?,
            gain: self.get_float(features::GAIN)?,
            gain_conversion: self.get_string(features::GAIN_CONVERSION).ok(),
            gamma_enable: self.get_bool(features::GAMMA_ENABLE).ok(),
            gamma: self.get_float(features::GAMMA).ok(),
            acquisition_mode: self.get_string(features::ACQUISITION_MODE).ok(),
            frame_rate_bounds: self.device.float_bounds(features::FRAME_RATE).ok(),
            exposure_bounds: self.device.float_bounds(features::EXPOSURE_TIME).ok(),
            gain_bounds: self.device.float_bounds(features::GAIN).ok(),
            power: self.read_power().ok(),
        })
    }

    pub fn reset(&mut self, kind: ResetKind) -> SensorResult<()> {
        let command = match kind {
            ResetKind::Device => features::DEVICE_RESET,
            ResetKind::Factory => features::FACTORY_RESET,
        };
        info!("Issuing {command} command");
        self.device.execute(command)?;
        self.config = None;
        Ok(())
    }
}

fn to_u32(name: &str, v: i64) -> SensorResult<u32> {
    u32::try_from(v).map_err(|_| anyhow::anyhow!("{name} out of range: {v}").into())
}

#[cfg(all(feature = "v4l2", target_os = "linux"))]
fn enumerate_physical() -> Vec<PathBuf> {
    v4l2::enumerate()
}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
fn enumerate_physical() -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(all(feature = "v4l2", target_os = "linux"))]
fn open_physical(path: &std::path::Path) -> SensorResult<Session> {
    let cam = v4l2::V4l2Camera::open(path)?;
    info!("Instantiated camera at {}", path.display());
    Ok(Session::from_device(cam))
}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
fn open_physical(path: &std::path::Path) -> SensorResult<Session> {
    Err(anyhow::anyhow!(
        "cannot open {}: built without physical camera support (enable the v4l2 feature)",
        path.display()
    )
    .into())
}

/// Snapshot of everything worth knowing about the camera.
#[derive(Debug, Clone)]
pub struct CameraStatus {
    pub info: DeviceInfo,
    pub pixel_format: PixelFormat,
    pub available_formats: Vec<PixelFormat>,
    pub sensor: (u32, u32),
    pub region: Region,
    pub payload: u64,
    pub frame_rate: Option<f64>,
    pub exposure_us: f64,
    pub gain: f64,
    pub gain_conversion: Option<String>,
    pub gamma_enable: Option<bool>,
    pub gamma: Option<f64>,
    pub acquisition_mode: Option<String>,
    pub frame_rate_bounds: Option<Bounds>,
    pub exposure_bounds: Option<Bounds>,
    pub gain_bounds: Option<Bounds>,
    pub power: Option<PowerReading>,
}

struct Opt<'a, T>(&'a Option<T>);

impl<T: fmt::Display> fmt::Display for Opt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => fmt::Display::fmt(v, f),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.region;
        writeln!(f, "Camera vendor : {}", self.info.vendor)?;
        writeln!(f, "Camera model  : {}", self.info.model)?;
        writeln!(f, "Camera id     : {}", self.info.id)?;
        writeln!(f, "Pixel format  : {}", self.pixel_format.name())?;
        let formats: Vec<&str> = self.available_formats.iter().map(|p| p.name()).collect();
        writeln!(f, "Available Formats : {}", formats.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Full Frame is : {}x{}", self.sensor.0, self.sensor.1)?;
        writeln!(f, "ROI           : {}x{} at {},{}", r.width, r.height, r.x, r.y)?;
        writeln!(f, "Frame size    : {} Bytes", self.payload)?;
        writeln!(f)?;
        writeln!(f, "Framerate     : {} Hz", Opt(&self.frame_rate))?;
        writeln!(f, "Exposure time : {} seconds", self.exposure_us / 1.0e6)?;
        writeln!(f, "Gain          : {}", self.gain)?;
        writeln!(f, "Gain Conv.    : {}", Opt(&self.gain_conversion))?;
        writeln!(f, "Gamma enable  : {}", Opt(&self.gamma_enable))?;
        writeln!(f, "Gamma value   : {}", Opt(&self.gamma))?;
        writeln!(f)?;
        writeln!(f, "Acquisition mode : {}", Opt(&self.acquisition_mode))?;
        writeln!(f, "Framerate bounds : {}", Opt(&self.frame_rate_bounds))?;
        writeln!(f, "Exp. Time bounds : {}", Opt(&self.exposure_bounds))?;
        writeln!(f, "Gain bounds      : {}", Opt(&self.gain_bounds))?;
        if let Some(p) = &self.power {
            writeln!(f)?;
            writeln!(f, "Power Supply Voltage   : {} V", p.voltage)?;
            writeln!(f, "Power Supply Current   : {} A", p.current)?;
            writeln!(f, "Total Dissipated Power : {} W", p.power)?;
            writeln!(f, "Camera Temperature     : {} C", p.temperature_c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::from_device(SimCamera::with_sensor(64, 48).seeded(7))
    }

    #[test]
    fn gain_mode_round_trips_through_text() {
        assert_eq!("HCG".parse::<GainMode>().unwrap(), GainMode::Hcg);
        assert_eq!("LCG".parse::<GainMode>().unwrap(), GainMode::Lcg);
        assert!("hcg".parse::<GainMode>().is_err());
        assert_eq!(GainMode::Lcg.to_string(), "LCG");
    }

    #[test]
    fn standard_config_covers_full_sensor() {
        let mut s = session();
        let config = s.apply_standard_config().unwrap();
        assert_eq!(
            config.region,
            Region {
                x: 0,
                y: 0,
                width: 64,
                height: 48
            }
        );
        assert_eq!(config.binning, (1, 1));
        assert_eq!(config.pixel_format, PixelFormat::MONO16);
        assert_eq!(s.get_string(features::ACQUISITION_MODE).unwrap(), "SingleFrame");
        assert_eq!(s.get_string(features::EXPOSURE_AUTO).unwrap(), "Off");
        assert!(!s.get_bool(features::DEFECT_CORRECTION).unwrap());
        assert!(!s.get_bool(features::BLACK_LEVEL_CLAMPING).unwrap());
        assert!(!s.get_bool(features::REVERSE_X).unwrap());
    }

    #[test]
    fn exposure_and_gain_are_written() {
        let mut s = session();
        s.apply_standard_config().unwrap();
        s.set_exposure_and_gain(GainMode::Lcg, 15.0, 50_000.0).unwrap();
        assert_eq!(s.get_float(features::GAIN).unwrap(), 15.0);
        assert_eq!(s.get_float(features::EXPOSURE_TIME).unwrap(), 50_000.0);
        assert_eq!(s.gain_mode().unwrap(), GainMode::Lcg);
        let config = s.config().unwrap();
        assert_eq!(config.gain_mode, Some(GainMode::Lcg));
        assert_eq!(config.exposure_us, 50_000.0);
    }

    #[test]
    fn gain_outside_bounds_is_rejected() {
        let mut s = session();
        let err = s
            .set_exposure_and_gain(GainMode::Hcg, 99.0, 1000.0)
            .unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { name: "Gain", .. }));
        // nothing was written
        assert_eq!(s.get_float(features::GAIN).unwrap(), 0.0);
    }

    #[test]
    fn power_is_voltage_times_current() {
        let s = session();
        let p = s.read_power().unwrap();
        assert!((p.power - p.voltage * p.current).abs() < 1e-12);
        assert!(p.temperature_c > 0.0);
    }

    #[test]
    fn status_reports_payload_and_bounds() {
        let mut s = session();
        s.apply_standard_config().unwrap();
        let status = s.status().unwrap();
        assert_eq!(status.payload, 64 * 48 * 2);
        assert!(status.gain_bounds.is_some());
        let text = status.to_string();
        assert!(text.contains("Full Frame is : 64x48"));
        assert!(text.contains("Gain Conv.    : HCG"));
        assert_eq!(status.available_formats, [PixelFormat::MONO8, PixelFormat::MONO16]);
        assert!(text.contains("Available Formats : Mono8, Mono16\n"));
    }

    #[test]
    fn missing_physical_camera_is_no_device_found() {
        let err = Session::open(&DeviceSelector::Path("/nonexistent/video9".into()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::NoDeviceFound));
    }

    #[test]
    #[cfg(not(all(feature = "v4l2", target_os = "linux")))]
    fn first_physical_without_backend_is_no_device_found() {
        let err = Session::open(&DeviceSelector::FirstPhysical).err().unwrap();
        assert!(matches!(err, Error::NoDeviceFound));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = session();
        s.apply_standard_config().unwrap();
        s.set_exposure_and_gain(GainMode::Lcg, 10.0, 2000.0).unwrap();
        s.reset(ResetKind::Factory).unwrap();
        assert!(s.config().is_none());
        assert_eq!(s.get_float(features::GAIN).unwrap(), 0.0);
        assert_eq!(s.gain_mode().unwrap(), GainMode::Hcg);
    }
}
