// SPDX-License-Identifier: GPL-3.0-only

//! Demo commands: host-lifecycle glue around the pipeline

use camera_stream::constants::{ResolutionPreset, defaults, timing};
use camera_stream::{
    LoggingGpuSurface, PipelineConfig, PipelineEvent, PreviewPipeline, SyntheticProvider,
};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Stream the synthetic camera into a logging GPU surface
///
/// Plays the host's part end to end: grant permission, report the surface,
/// bind the target, open the device, and poll the event stream until the
/// duration elapses or Ctrl+C.
pub fn run_preview(
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::load();
    if let Some(device) = device {
        config.device_id = device;
    }
    if let Some(width) = width {
        config.width = width;
    }
    if let Some(height) = height {
        config.height = height;
    }
    if let Err(e) = config.save() {
        warn!(error = %e, "Could not persist configuration");
    }

    let provider = Arc::new(SyntheticProvider::new());
    let (pipeline, mut events) = PreviewPipeline::new(
        provider,
        Box::new(LoggingGpuSurface::new()),
        config.parameters,
    );

    // The demo host grants camera access itself; a real host would wait for
    // its permission collaborator.
    pipeline.set_permission(true);
    pipeline.surface_resized(config.width, config.height);
    let target = pipeline.bind_capture_target(config.width, config.height)?;
    pipeline.open(&config.device_id, target)?;

    println!(
        "Streaming {}x{} from camera {} for {}s (press Ctrl+C to stop)",
        config.width, config.height, config.device_id, duration
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        while let Ok(Some(event)) = events.try_next() {
            match event {
                PipelineEvent::StateChanged(state) => {
                    println!("Session state: {}", state);
                }
                PipelineEvent::Error(e) => {
                    println!();
                    eprintln!("Pipeline error: {}", e);
                    stop_flag.store(true, Ordering::SeqCst);
                }
            }
        }

        let frames = pipeline.acquire_latest().map(|f| f.sequence).unwrap_or(0);
        print!("\rFrames: {}", frames);
        std::io::stdout().flush()?;

        std::thread::sleep(timing::DEMO_POLL_INTERVAL);
    }
    println!();

    pipeline.close();
    pipeline.shutdown();
    println!("Session closed");

    Ok(())
}

/// Print the available presets and configuration location
pub fn show_info() -> Result<(), Box<dyn std::error::Error>> {
    println!("Resolution presets:");
    for preset in ResolutionPreset::ALL {
        println!("  {}", preset);
    }
    println!("Default device: {}", defaults::DEVICE_ID);
    match PipelineConfig::config_path() {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: (no config directory available)"),
    }
    Ok(())
}
