use env_logger::Env;
use gazecast::{
    gaze::UdpGazeDevice, screen_capture::ScrapScreen, sink::FileSinks, Config, Recorder,
};

use std::{env, error::Error, io, path::PathBuf, sync::Arc};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::load(&Config::default_path())?;
    let output_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.recording.output_path.clone());

    let mut device = UdpGazeDevice::new(config.gaze.bind_addr.clone());
    if let Some(bridge) = &config.gaze.bridge_addr {
        device = device.with_bridge(bridge.clone());
    }

    let mut recorder = Recorder::new(
        Arc::new(ScrapScreen::new()),
        Arc::new(device),
        Arc::new(FileSinks::new(config.recording.clone())),
        config,
    )?;
    let size = recorder.screen_size();
    log::info!("Primary screen is {}x{}", size.width, size.height);

    recorder.start_recording(&output_path)?;
    println!("Recording to {:?}. Press Enter to stop.", output_path);

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let summary = recorder.end_recording()?;
    println!(
        "Saved {:?} ({} frames) and {:?} ({} gaze samples) in {:.1}s",
        summary.video_path,
        summary.frames_written,
        summary.log_path,
        summary.samples_logged,
        summary.duration.as_secs_f64()
    );
    if summary.frames_skipped + summary.frames_failed > 0 {
        log::warn!(
            "{} frames skipped, {} frames failed to encode",
            summary.frames_skipped,
            summary.frames_failed
        );
    }
    if summary.samples_failed > 0 {
        log::warn!("{} gaze samples could not be logged", summary.samples_failed);
    }
    if summary.device_disconnected {
        log::warn!("Gaze device disconnected during the recording");
    }
    Ok(())
}
