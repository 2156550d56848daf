//! Executes a plan against a camera, one entry at a time.

use log::{info, warn};

use crate::camera::Session;
use crate::config::RunConfig;
use crate::error::{Error, SensorResult};
use crate::frame::{self, Pause, ThreadSleep};
use crate::plan::TestPlanEntry;
use crate::runlog::{RunLog, RunRecord};
use crate::stats::summarize;
use crate::Stopwatch;

/// An entry that failed while the run kept going.
#[derive(Debug)]
pub struct FailedEntry {
    /// 1-based position in the plan
    pub index: usize,
    pub output_name: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub records: Vec<RunRecord>,
    pub failed: Vec<FailedEntry>,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Runner {
    session: Session,
    config: RunConfig,
    pause: Box<dyn Pause>,
}

impl Runner {
    pub fn new(session: Session, config: RunConfig) -> Self {
        Self {
            session,
            config,
            pause: Box::new(ThreadSleep),
        }
    }

    pub fn with_pause(mut self, pause: impl Pause + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Acquire every entry in order, writing its frames and a log record.
    ///
    /// The first failure ends the run unless the config asks to keep going,
    /// in which case failed entries are reported in the outcome and get no
    /// log record.
    pub fn run(&mut self, plan: &[TestPlanEntry]) -> SensorResult<RunOutcome> {
        let _sw = Stopwatch::new("run");
        let out_dir = self.config.output_dir();
        std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
        let mut log = RunLog::open(self.config.log_file())?;
        self.session.apply_standard_config()?;
        info!(
            "Running {} entries from {}",
            plan.len(),
            self.config.plan_file().display()
        );

        let mut outcome = RunOutcome::default();
        for (i, entry) in plan.iter().enumerate() {
            info!(
                "Working on file {} with {} frames and output {}",
                i + 1,
                entry.frame_count,
                entry.output_name
            );
            info!(
                "  GainMode: {}  Gain: {}  Exposure Time: {} sec",
                entry.gain_mode,
                entry.gain,
                entry.exposure_secs()
            );
            let record = match self.run_entry(entry) {
                Ok(record) => record,
                Err(e) if self.config.keep_going() => {
                    warn!("Skipping {}: {e}", entry.output_name);
                    outcome.failed.push(FailedEntry {
                        index: i + 1,
                        output_name: entry.output_name.clone(),
                        error: e,
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            log.append(&record)?;
            println!("  {record}");
            outcome.records.push(record);
        }
        Ok(outcome)
    }

    fn run_entry(&mut self, entry: &TestPlanEntry) -> SensorResult<RunRecord> {
        self.session
            .set_exposure_and_gain(entry.gain_mode, entry.gain, entry.exposure_us)?;
        let power = self.session.read_power()?;

        let frames = frame::acquire(
            &mut self.session,
            entry.frame_count,
            self.config.frame_wait(),
            self.config.capture_timeout,
            self.pause.as_mut(),
        )?;
        frames.save(&self.config.output_dir().join(&entry.output_name))?;
        let summary = summarize(&frames);

        Ok(RunRecord {
            output_name: entry.output_name.clone(),
            gain_mode: entry.gain_mode,
            gain: entry.gain,
            exposure_secs: entry.exposure_secs(),
            frame_count: entry.frame_count,
            temperature_c: power.temperature_c,
            mean: summary.mean,
            variance: summary.variance,
        })
    }
}
