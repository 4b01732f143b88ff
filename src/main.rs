use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dashcam::config::DashcamConfig;
use dashcam::orchestrator::Orchestrator;
use dashcam::status::{DashcamState, NoStatus, Report, StatusLink};
use dashcam::storage::Storage;
use dashcam_av::frame::VideoFrame;
use dashcam_av::packet::EncodedPacket;

type Recorder = Orchestrator<EncodedPacket, VideoFrame>;

#[derive(Parser, Debug)]
#[command(name = "dashcam", version, about = "Loop recorder for an always-on dashcam")]
struct Args {
    /// Capture frame rate, between 1 and 60
    frame_rate: Option<u32>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory recordings are written to
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Don't report state to the watchdog
    #[arg(long)]
    no_watchdog: bool,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("dashcam", log::LevelFilter::Info)
        .filter_module("dashcam_av", log::LevelFilter::Info)
        .init();
}

fn load_config(args: Args) -> anyhow::Result<DashcamConfig> {
    let mut config = DashcamConfig::load(args.config.as_deref())?;
    if let Some(frame_rate) = args.frame_rate {
        config.frame_rate = frame_rate;
    }
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if args.no_watchdog {
        config.watchdog = false;
    }
    config.validate()?;
    Ok(config)
}

fn build(config: &DashcamConfig, status: Arc<dyn Report>) -> anyhow::Result<Recorder> {
    dashcam_av::init()?;
    let pipeline = dashcam::av::open_pipeline(config)?;
    let storage = Storage::new(
        &config.storage_dir,
        config.max_file_size,
        config.safety_margin,
        &config.extension,
    )?;
    log::info!(
        "recording {} fps from {} into {}",
        config.frame_rate,
        config.device,
        storage.dir().display()
    );
    Ok(Orchestrator::new(pipeline, storage, status, config.pipeline_settings()))
}

async fn record(mut orchestrator: Recorder) -> anyhow::Result<()> {
    let stop = orchestrator.stop_handle();
    let mut recording = tokio::task::spawn_blocking(move || orchestrator.run());

    loop {
        tokio::select! {
            result = &mut recording => {
                result??;
                return Ok(());
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("stop requested, finishing current recording");
                stop.stop();
            },
        }
    }
}

#[tokio::main]
async fn main() -> ! {
    init_logging();

    let config = load_config(Args::parse()).unwrap_or_else(|e| {
        eprintln!("{:#}", e);
        std::process::exit(1);
    });

    let status: Arc<dyn Report> = if config.watchdog {
        Arc::new(StatusLink::connect(config.watchdog_port))
    } else {
        Arc::new(NoStatus)
    };

    let orchestrator = build(&config, status.clone()).unwrap_or_else(|e| {
        log::error!("setup failed: {:#}", e);
        status.report(DashcamState::Error);
        std::process::exit(1);
    });

    let code = match record(orchestrator).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}
