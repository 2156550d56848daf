//! The run log: a space-separated text table, one line per completed entry.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::camera::GainMode;
use crate::error::{Error, SensorResult};

pub const HEADER: &str = "Filename GainMode Gain ExpTime nFrames Temperature Mean Variance";

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub output_name: String,
    pub gain_mode: GainMode,
    pub gain: f64,
    pub exposure_secs: f64,
    pub frame_count: usize,
    pub temperature_c: f64,
    pub mean: f64,
    pub variance: Option<f64>,
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {:.3} {} {}",
            self.output_name,
            self.gain_mode,
            format_gain(self.gain),
            format_sci(self.exposure_secs),
            self.frame_count,
            self.temperature_c,
            format_sci(self.mean),
            format_sci(self.variance.unwrap_or(f64::NAN)),
        )
    }
}

/// Scientific notation with 3 decimals and an exponent of at least two
/// digits, e.g. `5.000e-02`.
pub fn format_sci(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{v:.3e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

/// Shortest form that reads back to the same value, always with a decimal point.
pub fn format_gain(v: f64) -> String {
    let s = v.to_string();
    if v.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}

pub struct RunLog {
    path: PathBuf,
    out: BufWriter<File>,
}

impl RunLog {
    /// Open for appending. The header goes in only when the file is new or empty.
    pub fn open(path: &Path) -> SensorResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        let empty = file.metadata().map_err(|e| Error::io(path, e))?.len() == 0;
        let mut log = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        };
        if empty {
            log.write_line(HEADER)?;
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record and flush it to disk.
    pub fn append(&mut self, record: &RunRecord) -> SensorResult<()> {
        self.write_line(&record.to_string())
    }

    fn write_line(&mut self, line: &str) -> SensorResult<()> {
        writeln!(self.out, "{line}")
            .and_then(|_| self.out.flush())
            .map_err(|e| Error::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RunRecord {
        RunRecord {
            output_name: "test1.dat".into(),
            gain_mode: GainMode::Hcg,
            gain: 10.0,
            exposure_secs: 0.05,
            frame_count: 3,
            temperature_c: 41.25,
            mean: 262.4375,
            variance: Some(12.5),
        }
    }

    #[test]
    fn sci_has_two_digit_signed_exponent() {
        assert_eq!(format_sci(0.05), "5.000e-02");
        assert_eq!(format_sci(50000.0), "5.000e+04");
        assert_eq!(format_sci(18.0), "1.800e+01");
        assert_eq!(format_sci(1.0), "1.000e+00");
        assert_eq!(format_sci(0.0), "0.000e+00");
        assert_eq!(format_sci(-2.5e-7), "-2.500e-07");
        assert_eq!(format_sci(1.0e123), "1.000e+123");
        assert_eq!(format_sci(f64::NAN), "nan");
    }

    #[test]
    fn gain_keeps_decimal_point() {
        assert_eq!(format_gain(10.0), "10.0");
        assert_eq!(format_gain(0.0), "0.0");
        assert_eq!(format_gain(47.994294), "47.994294");
        assert_eq!(format_gain(2.5), "2.5");
    }

    #[test]
    fn record_line() {
        assert_eq!(
            record().to_string(),
            "test1.dat HCG 10.0 5.000e-02 3 41.250 2.624e+02 1.250e+01"
        );
        let single = RunRecord {
            frame_count: 1,
            variance: None,
            ..record()
        };
        assert!(single.to_string().ends_with(" 1 41.250 2.624e+02 nan"));
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut log = RunLog::open(&path).unwrap();
        log.append(&record()).unwrap();
        // flushed without dropping the log
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        drop(log);

        let mut log = RunLog::open(&path).unwrap();
        log.append(&record()).unwrap();
        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.iter().filter(|l| **l == HEADER).count(), 1);
    }
}
