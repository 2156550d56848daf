//! Software camera standing in for real hardware.
//!
//! Produces Mono16 dark frames from a simple sensor model: fixed bias,
//! dark current doubling every few degrees, shot noise on the dark signal
//! and a read noise that depends on the gain conversion mode. Gain is in dB,
//! like the FLIR sensors this mimics.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{features as f, Bounds, Device, DeviceInfo, FeatureValue, GainMode};
use crate::error::{Error, SensorResult};
use crate::frame::{BufferStatus, PixelFormat, RawBuffer};

const DEFAULT_SENSOR: (u32, u32) = (1600, 1100);
const MAX_GAIN_DB: f64 = 47.994294;

/// Electrons-per-DN and read noise (e-) for one conversion mode.
#[derive(Debug, Copy, Clone)]
struct ModeModel {
    e_per_dn: f64,
    read_noise_e: f64,
}

#[derive(Debug, Clone)]
pub struct SensorModel {
    pub bias_dn: f64,
    /// e-/pixel/s at the reference temperature
    pub dark_current: f64,
    pub reference_temp_c: f64,
    pub doubling_temp_c: f64,
    hcg: ModeModel,
    lcg: ModeModel,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self {
            bias_dn: 240.0,
            dark_current: 5.0,
            reference_temp_c: 25.0,
            doubling_temp_c: 6.5,
            hcg: ModeModel {
                e_per_dn: 0.9,
                read_noise_e: 2.5,
            },
            lcg: ModeModel {
                e_per_dn: 3.6,
                read_noise_e: 7.0,
            },
        }
    }
}

impl SensorModel {
    fn dark_rate(&self, temp_c: f64) -> f64 {
        self.dark_current * 2f64.powf((temp_c - self.reference_temp_c) / self.doubling_temp_c)
    }

    fn mode(&self, mode: GainMode) -> ModeModel {
        match mode {
            GainMode::Hcg => self.hcg,
            GainMode::Lcg => self.lcg,
        }
    }
}

pub struct SimCamera {
    sensor: (u32, u32),
    model: SensorModel,
    features: BTreeMap<String, FeatureValue>,
    bounds: BTreeMap<&'static str, Bounds>,
    read_only: BTreeSet<&'static str>,
    acquiring: bool,
    captures: usize,
    dropped: BTreeSet<usize>,
    base_temp_c: f64,
    rng: StdRng,
}

impl SimCamera {
    pub fn new() -> Self {
        Self::with_sensor(DEFAULT_SENSOR.0, DEFAULT_SENSOR.1)
    }

    pub fn with_sensor(width: u32, height: u32) -> Self {
        let mut cam = Self {
            sensor: (width, height),
            model: SensorModel::default(),
            features: BTreeMap::new(),
            bounds: BTreeMap::from([
                (f::GAIN, Bounds { min: 0.0, max: MAX_GAIN_DB }),
                (f::EXPOSURE_TIME, Bounds { min: 18.0, max: 30.0e6 }),
                (f::FRAME_RATE, Bounds { min: 1.0, max: 60.0 }),
            ]),
            read_only: BTreeSet::from([
                f::VENDOR,
                f::MODEL,
                f::DEVICE_ID,
                f::SENSOR_WIDTH,
                f::SENSOR_HEIGHT,
                f::TEMPERATURE,
                f::SUPPLY_VOLTAGE,
                f::SUPPLY_CURRENT,
            ]),
            acquiring: false,
            captures: 0,
            dropped: BTreeSet::new(),
            base_temp_c: 35.0,
            rng: StdRng::from_os_rng(),
        };
        cam.load_defaults();
        cam
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_model(mut self, model: SensorModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temp_c: f64) -> Self {
        self.base_temp_c = temp_c;
        self
    }

    /// Make the `n`th capture (1-based, counted over the camera's lifetime)
    /// come back empty, like a timed-out transfer.
    pub fn drop_frame(mut self, n: usize) -> Self {
        self.dropped.insert(n);
        self
    }

    fn load_defaults(&mut self) {
        let (w, h) = self.sensor;
        let defaults = [
            (f::VENDOR, FeatureValue::Str("Sensorchar".into())),
            (f::MODEL, FeatureValue::Str("Simulated Mono16".into())),
            (f::DEVICE_ID, FeatureValue::Str("sim-0".into())),
            (f::SENSOR_WIDTH, FeatureValue::Int(w.into())),
            (f::SENSOR_HEIGHT, FeatureValue::Int(h.into())),
            (f::OFFSET_X, FeatureValue::Int(0)),
            (f::OFFSET_Y, FeatureValue::Int(0)),
            (f::WIDTH, FeatureValue::Int(w.into())),
            (f::HEIGHT, FeatureValue::Int(h.into())),
            (f::BINNING_H, FeatureValue::Int(1)),
            (f::BINNING_V, FeatureValue::Int(1)),
            (f::PIXEL_FORMAT, FeatureValue::Str("Mono8".into())),
            (f::ACQUISITION_MODE, FeatureValue::Str("Continuous".into())),
            (f::FRAME_RATE, FeatureValue::Float(10.0)),
            (f::EXPOSURE_AUTO, FeatureValue::Str("Continuous".into())),
            (f::GAIN_AUTO, FeatureValue::Str("Continuous".into())),
            (f::EXPOSURE_TIME, FeatureValue::Float(10_000.0)),
            (f::GAIN, FeatureValue::Float(0.0)),
            (f::GAIN_CONVERSION, FeatureValue::Str("HCG".into())),
            (f::GAMMA_ENABLE, FeatureValue::Bool(true)),
            (f::GAMMA, FeatureValue::Float(0.8)),
            (f::REVERSE_X, FeatureValue::Bool(false)),
            (f::REVERSE_Y, FeatureValue::Bool(false)),
            (f::ADC_BIT_DEPTH, FeatureValue::Str("Bit12".into())),
            (f::TEMPERATURE_SELECTOR, FeatureValue::Str("Sensor".into())),
            (f::DEFECT_CORRECTION, FeatureValue::Bool(true)),
            (f::BLACK_LEVEL_CLAMPING, FeatureValue::Bool(true)),
        ];
        self.features = defaults
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
    }

    fn temperature(&self) -> f64 {
        // slow warm-up while running
        self.base_temp_c + 0.01 * self.captures as f64
    }

    fn float(&self, name: &str) -> SensorResult<f64> {
        self.get_feature(name)?.as_float(name)
    }

    fn int(&self, name: &str) -> SensorResult<i64> {
        self.get_feature(name)?.as_int(name)
    }

    fn check_value(&self, name: &str, value: &FeatureValue) -> SensorResult<()> {
        let allowed: &[&str] = match name {
            f::GAIN_CONVERSION => &["HCG", "LCG"],
            f::PIXEL_FORMAT => &["Mono8", "Mono16"],
            f::EXPOSURE_AUTO | f::GAIN_AUTO => &["Off", "Once", "Continuous"],
            f::ACQUISITION_MODE => &["SingleFrame", "MultiFrame", "Continuous"],
            f::ADC_BIT_DEPTH => &["Bit12"],
            f::TEMPERATURE_SELECTOR => &["Sensor"],
            _ => &[],
        };
        if !allowed.is_empty() {
            let v = value.as_str(name)?;
            if !allowed.contains(&v) {
                return Err(anyhow::anyhow!("{v} is not a valid {name}").into());
            }
        }
        if let Some((&key, b)) = self.bounds.get_key_value(name) {
            let v = value.as_float(name)?;
            if !b.contains(v) {
                return Err(Error::OutOfBounds {
                    name: key,
                    value: v,
                    min: b.min,
                    max: b.max,
                });
            }
        }
        let (w, h) = (i64::from(self.sensor.0), i64::from(self.sensor.1));
        let limit = |offset: &str, size: &str, max: i64| -> SensorResult<()> {
            let (o, s) = match name {
                n if n == offset => (value.as_int(name)?, self.int(size)?),
                n if n == size => (self.int(offset)?, value.as_int(name)?),
                _ => return Ok(()),
            };
            if o < 0 || s < 1 || o + s > max {
                return Err(anyhow::anyhow!("region {name}={} exceeds sensor", o.max(s)).into());
            }
            Ok(())
        };
        limit(f::OFFSET_X, f::WIDTH, w)?;
        limit(f::OFFSET_Y, f::HEIGHT, h)?;
        if matches!(name, f::BINNING_H | f::BINNING_V) && value.as_int(name)? != 1 {
            return Err(anyhow::anyhow!("simulated camera only supports 1x1 binning").into());
        }
        Ok(())
    }

    fn render(&mut self) -> SensorResult<RawBuffer> {
        let width = u32::try_from(self.int(f::WIDTH)?).map_err(anyhow::Error::from)?;
        let height = u32::try_from(self.int(f::HEIGHT)?).map_err(anyhow::Error::from)?;
        let format_name = self.get_feature(f::PIXEL_FORMAT)?.as_str(f::PIXEL_FORMAT)?.to_string();
        let pixel_format = PixelFormat::from_name(&format_name).unwrap_or(PixelFormat::MONO16);
        let mode: GainMode = self
            .get_feature(f::GAIN_CONVERSION)?
            .as_str(f::GAIN_CONVERSION)?
            .parse()?;
        let exposure_s = self.float(f::EXPOSURE_TIME)? / 1.0e6;
        let gain = 10f64.powf(self.float(f::GAIN)? / 20.0);

        let mode = self.model.mode(mode);
        let dark_e = self.model.dark_rate(self.temperature()) * exposure_s;
        let noise_e = (dark_e + mode.read_noise_e.powi(2)).sqrt();
        let mean_dn = self.model.bias_dn + gain * dark_e / mode.e_per_dn;
        let sigma_dn = gain * noise_e / mode.e_per_dn;
        let dist = Normal::new(mean_dn, sigma_dn).map_err(anyhow::Error::from)?;

        let n = width as usize * height as usize;
        let data = match pixel_format.bits_per_pixel() {
            8 => (0..n)
                .map(|_| {
                    let v = dist.sample(&mut self.rng).clamp(0.0, 65535.0) as u16;
                    (v >> 8) as u8
                })
                .collect(),
            _ => {
                let mut data = Vec::with_capacity(n * 2);
                for _ in 0..n {
                    let v = dist.sample(&mut self.rng).clamp(0.0, 65535.0) as u16;
                    data.extend_from_slice(&v.to_le_bytes());
                }
                data
            }
        };
        Ok(RawBuffer {
            status: BufferStatus::Success,
            pixel_format,
            width,
            height,
            data,
        })
    }
}

impl Default for SimCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for SimCamera {
    fn info(&self) -> DeviceInfo {
        let s = |name: &str| {
            self.features
                .get(name)
                .and_then(|v| v.as_str(name).ok())
                .unwrap_or_default()
                .to_string()
        };
        DeviceInfo {
            vendor: s(f::VENDOR),
            model: s(f::MODEL),
            id: s(f::DEVICE_ID),
        }
    }

    fn get_feature(&self, name: &str) -> SensorResult<FeatureValue> {
        match name {
            f::TEMPERATURE => Ok(FeatureValue::Float(self.temperature())),
            f::SUPPLY_VOLTAGE => Ok(FeatureValue::Float(12.0)),
            f::SUPPLY_CURRENT => Ok(FeatureValue::Float(if self.acquiring { 0.27 } else { 0.22 })),
            _ => self
                .features
                .get(name)
                .cloned()
                .ok_or_else(|| Error::FeatureUnavailable(name.to_string())),
        }
    }

    fn set_feature(&mut self, name: &str, value: FeatureValue) -> SensorResult<()> {
        if self.read_only.contains(name) {
            return Err(anyhow::anyhow!("{name} is read-only").into());
        }
        let current = self
            .features
            .get(name)
            .ok_or_else(|| Error::FeatureUnavailable(name.to_string()))?;
        let value = match (current, value) {
            (FeatureValue::Float(_), FeatureValue::Int(i)) => FeatureValue::Float(i as f64),
            (FeatureValue::Bool(_), v @ FeatureValue::Bool(_))
            | (FeatureValue::Int(_), v @ FeatureValue::Int(_))
            | (FeatureValue::Float(_), v @ FeatureValue::Float(_))
            | (FeatureValue::Str(_), v @ FeatureValue::Str(_)) => v,
            (current, _) => {
                return Err(Error::FeatureType {
                    name: name.to_string(),
                    expected: match current {
                        FeatureValue::Bool(_) => "boolean",
                        FeatureValue::Int(_) => "integer",
                        FeatureValue::Float(_) => "float",
                        FeatureValue::Str(_) => "string",
                    },
                })
            }
        };
        self.check_value(name, &value)?;
        self.features.insert(name.to_string(), value);
        Ok(())
    }

    fn pixel_formats(&self) -> Vec<PixelFormat> {
        vec![PixelFormat::MONO8, PixelFormat::MONO16]
    }

    fn float_bounds(&self, name: &str) -> SensorResult<Bounds> {
        self.bounds
            .get(name)
            .copied()
            .ok_or_else(|| Error::FeatureUnavailable(name.to_string()))
    }

    fn execute(&mut self, command: &str) -> SensorResult<()> {
        match command {
            f::DEVICE_RESET | f::FACTORY_RESET => {
                debug!("Simulated {command}");
                self.acquiring = false;
                self.load_defaults();
                Ok(())
            }
            _ => Err(Error::FeatureUnavailable(command.to_string())),
        }
    }

    fn start_acquisition(&mut self) -> SensorResult<()> {
        self.acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> SensorResult<()> {
        self.acquiring = false;
        Ok(())
    }

    fn capture(&mut self, _timeout: Option<Duration>) -> SensorResult<RawBuffer> {
        if !self.acquiring {
            return Err(Error::NotAcquiring);
        }
        self.captures += 1;
        if self.dropped.contains(&self.captures) {
            debug!("Dropping capture {}", self.captures);
            return Ok(RawBuffer::empty(BufferStatus::Timeout));
        }
        self.render()
    }
}
