use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use sensorchar::camera::{features, ResetKind};
use sensorchar::config::RunConfig;
use sensorchar::frame::{acquire, FrameSet, ThreadSleep};
use sensorchar::plan::{read_plan, PlanSweep};
use sensorchar::runner::Runner;
use sensorchar::stats::{write_fits, write_png, FrameStats, Histogram};
use sensorchar::{DeviceSelector, GainMode, Session, Stopwatch};

#[derive(Debug, Parser, Clone)]
#[command(name = "sensorchar")]
#[command(about = "Camera sensor characterization", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Use the simulated camera
    #[arg(long, global = true, conflicts_with = "device")]
    sim: bool,
    /// Camera device node. Defaults to the first camera found.
    #[arg(long, global = true)]
    device: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Commands {
    /// Execute a plan file
    Run {
        plan: PathBuf,
        #[arg(long, default_value = "run.log")]
        log: PathBuf,
        /// Where frame files are written
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Pause between frames of one entry
        #[arg(long, default_value = "1s")]
        frame_wait: humantime::Duration,
        /// Give up on a capture after this long. Waits forever unless specified.
        #[arg(long)]
        timeout: Option<humantime::Duration>,
        /// Record failed entries and continue with the rest of the plan
        #[arg(long)]
        keep_going: bool,
    },
    /// Apply the standard settings and print the camera status
    Status,
    /// Take a single frame and print quick-look statistics
    Snap {
        #[arg(long, default_value = "HCG")]
        mode: GainMode,
        /// dB
        #[arg(long, default_value_t = 5.0)]
        gain: f64,
        #[arg(long, default_value = "70ms")]
        exposure: humantime::Duration,
        #[arg(long, default_value = "temp.npy")]
        npy: PathBuf,
        /// Also save the frame as a 16-bit PNG
        #[arg(long)]
        png: Option<PathBuf>,
        /// Also save the frame as a FITS image
        #[arg(long)]
        fits: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        bins: usize,
    },
    /// Reboot the camera
    Reset {
        /// Restore factory defaults instead. Overwrites any stored settings!
        #[arg(long)]
        factory: bool,
        /// How long the camera takes to come back
        #[arg(long, default_value = "5s")]
        settle: humantime::Duration,
    },
    /// Write an exposure sweep plan
    GenPlan {
        out: PathBuf,
        /// Prefix of the frame file names. D1 for darks, V1 for mean-variance.
        #[arg(long)]
        root: Option<String>,
        /// Use the illuminated mean-variance exposure limits instead of darks
        #[arg(long)]
        mean_variance: bool,
        #[arg(long)]
        frames: Option<usize>,
        /// Exposure times per gain
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        t_min: Option<humantime::Duration>,
        #[arg(long, value_delimiter = ',')]
        gains: Option<Vec<f64>>,
        /// Longest HCG exposure per gain, in seconds
        #[arg(long, value_delimiter = ',')]
        hcg_max: Option<Vec<f64>>,
        /// Longest LCG exposure per gain, in seconds
        #[arg(long, value_delimiter = ',')]
        lcg_max: Option<Vec<f64>>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .parse_default_env()
        .init();
    let selector = if args.sim {
        DeviceSelector::Simulated
    } else if let Some(path) = args.device {
        DeviceSelector::Path(path)
    } else {
        DeviceSelector::FirstPhysical
    };
    match args.command {
        Commands::Run {
            plan,
            log,
            out,
            frame_wait,
            timeout,
            keep_going,
        } => {
            let config = RunConfig::new(
                plan,
                log,
                out,
                frame_wait.into(),
                timeout.map(|t| t.into()),
                selector,
                keep_going,
            )?;
            handle_run(config)?
        }
        Commands::Status => handle_status(&selector)?,
        Commands::Snap {
            mode,
            gain,
            exposure,
            npy,
            png,
            fits,
            bins,
        } => handle_snap(
            &selector,
            mode,
            gain,
            exposure.into(),
            npy,
            png,
            fits,
            bins,
        )?,
        Commands::Reset { factory, settle } => {
            let kind = if factory {
                ResetKind::Factory
            } else {
                ResetKind::Device
            };
            handle_reset(&selector, kind, settle.into())?
        }
        Commands::GenPlan {
            out,
            root,
            mean_variance,
            frames,
            steps,
            t_min,
            gains,
            hcg_max,
            lcg_max,
        } => {
            let mut sweep = if mean_variance {
                PlanSweep::mean_variance(root.as_deref().unwrap_or("V1"))
            } else {
                PlanSweep::darks(root.as_deref().unwrap_or("D1"))
            };
            sweep.frame_count = frames.unwrap_or(sweep.frame_count);
            sweep.steps = steps.unwrap_or(sweep.steps);
            if let Some(t) = t_min {
                sweep.t_min = t.as_secs_f64();
            }
            sweep.gains = gains.unwrap_or(sweep.gains);
            sweep.hcg_max = hcg_max.unwrap_or(sweep.hcg_max);
            sweep.lcg_max = lcg_max.unwrap_or(sweep.lcg_max);
            let text = sweep.render()?;
            std::fs::write(&out, &text).with_context(|| format!("writing {}", out.display()))?;
            info!("Wrote {} plan lines to {}", text.lines().count(), out.display());
        }
    }
    Ok(())
}

fn handle_run(config: RunConfig) -> anyhow::Result<()> {
    let _sw = Stopwatch::new("total");
    let plan = read_plan(config.plan_file())?;
    if plan.is_empty() {
        bail!("Nothing to do in {}", config.plan_file().display());
    }
    let session = Session::open(config.device())?;
    let info = session.info();
    info!("Using {} {} ({})", info.vendor, info.model, info.id);
    let log_file = config.log_file().to_path_buf();
    let mut runner = Runner::new(session, config);
    let outcome = runner.run(&plan)?;
    info!(
        "Logged {} of {} entries to {}",
        outcome.records.len(),
        plan.len(),
        log_file.display()
    );
    if !outcome.is_complete() {
        for failed in &outcome.failed {
            warn!(
                "Entry {} ({}) failed: {}",
                failed.index, failed.output_name, failed.error
            );
        }
        bail!("{} entries failed", outcome.failed.len());
    }
    Ok(())
}

fn handle_status(selector: &DeviceSelector) -> anyhow::Result<()> {
    let mut session = Session::open(selector)?;
    session.apply_standard_config()?;
    print!("{}", session.status()?);
    Ok(())
}

fn handle_snap(
    selector: &DeviceSelector,
    mode: GainMode,
    gain: f64,
    exposure: Duration,
    npy: PathBuf,
    png: Option<PathBuf>,
    fits: Option<PathBuf>,
    bins: usize,
) -> anyhow::Result<()> {
    let mut session = Session::open(selector)?;
    session.apply_standard_config()?;
    session.set_exposure_and_gain(mode, gain, exposure.as_secs_f64() * 1.0e6)?;
    print!("{}", session.status()?);

    let set = acquire(&mut session, 1, Duration::ZERO, None, &mut ThreadSleep)?;
    set.save(&npy)?;
    let FrameSet::Single(frame) = set else {
        bail!("expected a single frame");
    };
    println!();
    println!("Dimensions of image : {:?}", frame.shape());
    println!("Gain Conv.    : {}", session.gain_mode()?);
    println!("Gain Setting  : {}", session.get_float(features::GAIN)?);
    println!(
        "Exposure time : {} seconds",
        session.get_float(features::EXPOSURE_TIME)? / 1.0e6
    );
    if let Some(png) = png {
        write_png(&frame, &png)?;
        info!("Wrote {}", png.display());
    }
    if let Some(fits) = fits {
        write_fits(&frame, &fits)?;
        info!("Wrote {}", fits.display());
    }
    if let Some(stats) = FrameStats::of(frame.view()) {
        println!("{stats}");
    }
    if let Some(hist) = Histogram::new(frame.view(), bins) {
        print!("{hist}");
    }
    Ok(())
}

fn handle_reset(selector: &DeviceSelector, kind: ResetKind, settle: Duration) -> anyhow::Result<()> {
    let mut session = Session::open(selector)?;
    print!("{}", session.status()?);
    session.reset(kind)?;
    drop(session);
    info!("Waiting {:?} for the camera to come back", settle);
    std::thread::sleep(settle);
    match Session::open(selector).and_then(|s| s.status()) {
        Ok(status) => print!("{status}"),
        Err(e) => warn!("Camera not back yet: {e}"),
    }
    Ok(())
}
