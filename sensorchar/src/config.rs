use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;

use crate::camera::DeviceSelector;

#[derive(Debug, Clone)]
pub struct RunConfig {
    plan_file: PathBuf,
    log_file: PathBuf,
    /// Frame artifacts are written here, under the names the plan gives
    output_dir: PathBuf,
    /// Pause between consecutive frames of one entry, lets the sensor settle
    frame_wait: Duration,
    /// `None` blocks until the camera delivers
    pub(crate) capture_timeout: Option<Duration>,
    device: DeviceSelector,
    /// Skip failed entries instead of aborting the run
    keep_going: bool,
}

impl RunConfig {
    pub fn new(
        plan_file: PathBuf,
        log_file: PathBuf,
        output_dir: PathBuf,
        frame_wait: Duration,
        capture_timeout: Option<Duration>,
        device: DeviceSelector,
        keep_going: bool,
    ) -> anyhow::Result<Self> {
        if !plan_file.is_file() {
            bail!("Plan file {} not found", plan_file.display());
        }
        if log_file.is_dir() {
            bail!("Log file should not be a dir!");
        }
        if output_dir.is_file() {
            bail!("Output dir {} is a file", output_dir.display());
        }
        if capture_timeout.is_some_and(|t| t.is_zero()) {
            bail!("Capture timeout must be positive, leave it unset to wait forever");
        }
        Ok(Self {
            plan_file,
            log_file,
            output_dir,
            frame_wait,
            capture_timeout,
            device,
            keep_going,
        })
    }

    pub fn plan_file(&self) -> &Path {
        &self.plan_file
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn device(&self) -> &DeviceSelector {
        &self.device
    }

    pub fn frame_wait(&self) -> Duration {
        self.frame_wait
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(plan: PathBuf, log: PathBuf, out: PathBuf) -> anyhow::Result<RunConfig> {
        RunConfig::new(
            plan,
            log,
            out,
            Duration::from_secs(1),
            None,
            DeviceSelector::Simulated,
            false,
        )
    }

    #[test]
    fn validates_paths() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let plan = d.join("plan.txt");
        std::fs::write(&plan, "test1.dat HCG 10.0 50000 3\n").unwrap();

        let ok = config(plan.clone(), d.join("run.log"), d.join("out")).unwrap();
        assert_eq!(ok.frame_wait(), Duration::from_secs(1));
        assert!(!ok.keep_going());
        assert_eq!(ok.device(), &DeviceSelector::Simulated);

        assert!(config(d.join("missing.txt"), d.join("run.log"), d.to_path_buf()).is_err());
        assert!(config(plan.clone(), d.to_path_buf(), d.to_path_buf()).is_err());
        assert!(config(plan.clone(), d.join("run.log"), plan.clone()).is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.txt");
        std::fs::write(&plan, "").unwrap();
        let err = RunConfig::new(
            plan,
            dir.path().join("run.log"),
            dir.path().to_path_buf(),
            Duration::ZERO,
            Some(Duration::ZERO),
            DeviceSelector::Simulated,
            true,
        );
        assert!(err.is_err());
    }
}
