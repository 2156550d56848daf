//! Plan files: one acquisition per line,
//! `outputName gainMode gain exposureMicroseconds frameCount`.

use std::fmt::Write as _;
use std::path::Path;

use crate::camera::GainMode;
use crate::error::{Error, SensorResult};
use crate::runlog::{format_gain, format_sci};

#[derive(Debug, Clone, PartialEq)]
pub struct TestPlanEntry {
    pub output_name: String,
    pub gain_mode: GainMode,
    /// dB
    pub gain: f64,
    pub exposure_us: f64,
    pub frame_count: usize,
}

impl TestPlanEntry {
    pub fn exposure_secs(&self) -> f64 {
        self.exposure_us / 1.0e6
    }
}

pub fn parse_plan(text: &str) -> SensorResult<Vec<TestPlanEntry>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty() && !l.starts_with('#'))
        .map(|(i, l)| parse_line(i + 1, l))
        .collect()
}

pub fn read_plan(path: &Path) -> SensorResult<Vec<TestPlanEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_plan(&text)
}

fn parse_line(line: usize, text: &str) -> SensorResult<TestPlanEntry> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let &[name, mode, gain, exposure, frames] = tokens.as_slice() else {
        return Err(Error::MalformedPlanLine {
            line,
            found: tokens.len(),
        });
    };
    let invalid = |field, value: &str| Error::InvalidFieldFormat {
        line,
        field,
        value: value.to_string(),
    };
    let frame_count = frames
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid("frame count", frames))?;
    Ok(TestPlanEntry {
        output_name: name.to_string(),
        gain_mode: mode.parse().map_err(|_| invalid("gain mode", mode))?,
        gain: parse_finite(gain).ok_or_else(|| invalid("gain", gain))?,
        exposure_us: parse_finite(exposure).ok_or_else(|| invalid("exposure", exposure))?,
        frame_count,
    })
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Exposure sweep per gain setting, for generating plan files.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSweep {
    /// Prefix of every output file name
    pub root: String,
    pub frame_count: usize,
    /// Exposure times per gain, evenly spaced from `t_min` up to the max
    pub steps: usize,
    /// Seconds
    pub t_min: f64,
    pub gains: Vec<f64>,
    /// Longest usable exposure in seconds, one per entry of `gains`
    pub hcg_max: Vec<f64>,
    pub lcg_max: Vec<f64>,
}

impl PlanSweep {
    /// Darks: the camera stays unsaturated up to 30s at low gain.
    pub fn darks(root: &str) -> Self {
        Self {
            root: root.to_string(),
            frame_count: 5,
            steps: 5,
            t_min: 18.0e-6,
            gains: vec![0.0, 5.0, 15.0, 25.0, 35.0, 45.0, 47.994294],
            hcg_max: vec![30.0, 30.0, 30.0, 30.0, 5.0, 1.0, 1.0],
            lcg_max: vec![30.0, 30.0, 30.0, 30.0, 25.0, 8.0, 5.0],
        }
    }

    /// Illuminated mean-variance sweep, limits measured with black level
    /// clamping off. Twenty frames at each of twenty exposures.
    pub fn mean_variance(root: &str) -> Self {
        Self {
            frame_count: 20,
            steps: 20,
            hcg_max: vec![3.5, 2.0, 0.6, 0.2, 0.06, 0.015, 0.01],
            lcg_max: vec![20.0, 10.0, 3.5, 1.0, 0.35, 0.1, 0.07],
            ..Self::darks(root)
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.gains.len() != self.hcg_max.len() || self.gains.len() != self.lcg_max.len() {
            anyhow::bail!(
                "{} gains but {} HCG and {} LCG exposure limits",
                self.gains.len(),
                self.hcg_max.len(),
                self.lcg_max.len()
            );
        }
        if self.steps == 0 || self.frame_count == 0 {
            anyhow::bail!("Need at least one step and one frame");
        }
        if self.root.contains(char::is_whitespace) {
            anyhow::bail!("Name root {:?} can't contain whitespace", self.root);
        }
        if let Some(max) = self
            .hcg_max
            .iter()
            .chain(&self.lcg_max)
            .find(|m| **m < self.t_min)
        {
            anyhow::bail!("Max exposure {max}s is below the minimum {}s", self.t_min);
        }
        Ok(())
    }

    /// Low conversion gain first, then high.
    pub fn entries(&self) -> SensorResult<Vec<TestPlanEntry>> {
        self.validate()?;
        let mut entries = Vec::new();
        for (mode, maxes) in [(GainMode::Lcg, &self.lcg_max), (GainMode::Hcg, &self.hcg_max)] {
            let tag = match mode {
                GainMode::Hcg => "H",
                GainMode::Lcg => "L",
            };
            for (gain, max) in self.gains.iter().zip(maxes) {
                for (step, t) in linspace(self.t_min, *max, self.steps).enumerate() {
                    entries.push(TestPlanEntry {
                        output_name: format!(
                            "{}_{tag}_{}_{step}.dat",
                            self.root,
                            format_gain(*gain)
                        ),
                        gain_mode: mode,
                        gain: *gain,
                        exposure_us: t * 1.0e6,
                        frame_count: self.frame_count,
                    });
                }
            }
        }
        Ok(entries)
    }

    pub fn render(&self) -> SensorResult<String> {
        let mut out = String::new();
        for e in self.entries()? {
            writeln!(
                out,
                "{} {} {} {} {}",
                e.output_name,
                e.gain_mode,
                format_gain(e.gain),
                format_sci(e.exposure_us),
                e.frame_count
            )
            .map_err(anyhow::Error::from)?;
        }
        Ok(out)
    }
}

fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (end - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| {
        if i + 1 == n && n > 1 {
            end
        } else {
            start + step * i as f64
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_match_tokens() {
        let plan = parse_plan("test1.dat HCG 10.0 50000 3\nD1_L_5.0_2.dat\tLCG 5 1.800e+01  7\n")
            .unwrap();
        assert_eq!(
            plan[0],
            TestPlanEntry {
                output_name: "test1.dat".into(),
                gain_mode: GainMode::Hcg,
                gain: 10.0,
                exposure_us: 50_000.0,
                frame_count: 3,
            }
        );
        assert_eq!(plan[1].output_name, "D1_L_5.0_2.dat");
        assert_eq!(plan[1].gain_mode, GainMode::Lcg);
        assert_eq!(plan[1].exposure_us, 18.0);
        assert_eq!(plan[1].frame_count, 7);
        assert_eq!(plan[0].exposure_secs(), 0.05);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "# name mode gain exp n\n\n   \ntest1.dat HCG 10.0 50000 3\n#test2.dat HCG 1 1 1\n";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(parse_plan("# only\n# comments\n").unwrap().is_empty());
    }

    #[test]
    fn short_lines_are_malformed() {
        let err = parse_plan("ok.dat HCG 1 1 1\nbad.dat HCG 10.0 50000\n").unwrap_err();
        assert!(matches!(err, Error::MalformedPlanLine { line: 2, found: 4 }));
        let err = parse_plan("a b c d e f").unwrap_err();
        assert!(matches!(err, Error::MalformedPlanLine { line: 1, found: 6 }));
    }

    #[test]
    fn trailing_notes_are_malformed() {
        let err = parse_plan("a.dat HCG 1 1 1 # note").unwrap_err();
        assert!(matches!(err, Error::MalformedPlanLine { line: 1, found: 7 }));
    }

    #[test]
    fn bad_fields_name_the_field() {
        let cases = [
            ("x.dat HCG ten 1 1", "gain"),
            ("x.dat HCG 1 fast 1", "exposure"),
            ("x.dat HCG 1 1 2.5", "frame count"),
            ("x.dat HCG 1 1 0", "frame count"),
            ("x.dat MCG 1 1 1", "gain mode"),
            ("x.dat HCG nan 1 1", "gain"),
        ];
        for (line, expected) in cases {
            match parse_plan(line) {
                Err(Error::InvalidFieldFormat { line: 1, field, .. }) => {
                    assert_eq!(field, expected, "{line}")
                }
                other => panic!("{line}: {other:?}"),
            }
        }
    }

    #[test]
    fn linspace_hits_both_ends() {
        let v: Vec<f64> = linspace(18.0e-6, 30.0, 5).collect();
        assert_eq!(v.len(), 5);
        assert_eq!(v[0], 18.0e-6);
        assert_eq!(v[4], 30.0);
        assert!((v[2] - (18.0e-6 + 30.0) / 2.0).abs() < 1e-9);
        assert_eq!(linspace(1.0, 2.0, 1).collect::<Vec<_>>(), vec![1.0]);
    }

    #[test]
    fn sweep_renders_a_parsable_plan() {
        let sweep = PlanSweep::darks("D1");
        let text = sweep.render().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 * 7 * 5);
        assert_eq!(lines[0], "D1_L_0.0_0.dat LCG 0.0 1.800e+01 5");
        assert_eq!(lines[4], "D1_L_0.0_4.dat LCG 0.0 3.000e+07 5");
        assert!(lines[35].starts_with("D1_H_0.0_0.dat HCG 0.0 "));

        let plan = parse_plan(&text).unwrap();
        assert_eq!(plan.len(), 70);
        assert!(plan[..35].iter().all(|e| e.gain_mode == GainMode::Lcg));
        assert_eq!(plan[69].gain, 47.994294);
        assert_eq!(plan[69].exposure_us, 1.0e6);
    }

    #[test]
    fn mean_variance_sweep_uses_twenty_frames_and_steps() {
        let sweep = PlanSweep::mean_variance("V1");
        assert_eq!((sweep.frame_count, sweep.steps), (20, 20));
        let text = sweep.render().unwrap();
        assert_eq!(text.lines().count(), 2 * 7 * 20);
        let plan = parse_plan(&text).unwrap();
        assert!(plan.iter().all(|e| e.frame_count == 20));
        assert_eq!(plan[19].output_name, "V1_L_0.0_19.dat");
        assert_eq!(plan[19].exposure_us, 20.0e6);
        assert_eq!(plan[279].exposure_us, 0.01e6);
    }

    #[test]
    fn sweep_rejects_mismatched_limits() {
        let mut sweep = PlanSweep::mean_variance("MV");
        sweep.hcg_max.pop();
        assert!(sweep.render().is_err());
    }
}
