// cmosbench capture demo: connect to the first available backend, stream
// frames for a few seconds, exercise an AOI reconfiguration and print pixel
// statistics along the way.

use anyhow::{Context, Result};
use cmosbench::analysis::{display_histogram, sample_neighborhood};
use cmosbench::config::BenchConfig;
use cmosbench::{
    first_backend_with_device, AcquisitionController, AoiRect, CameraBackend, ConnectOptions,
    FrameQueue, SimulatedBackend,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    cmosbench::init_logging();

    let save_last_frame = std::env::args().any(|arg| arg == "--save");

    let config = BenchConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;

    // Vendor backends would be registered ahead of the simulated one here.
    let backends: Vec<Box<dyn CameraBackend>> = vec![Box::new(SimulatedBackend::new())];
    let (backend, devices) =
        first_backend_with_device(backends).context("no camera detected")?;

    println!("Cameras on {} backend:", backend.name());
    for device in &devices {
        println!("  {}. {} (SN {})", device.index, device.model, device.serial);
    }

    let controller =
        AcquisitionController::connect(backend, ConnectOptions::from(&config.camera))?;
    let geometry = controller.geometry()?;
    println!(
        "Connected: {} sensor, {} ({} bits/pixel)",
        geometry,
        controller.color_mode()?,
        controller.color_mode()?.bits_per_pixel()
    );
    let (min_fps, max_fps) = controller.fps_range()?;
    println!("FPS range {min_fps}..{max_fps}, exposure {} us", controller.exposure_us()?);

    let queue = Arc::new(FrameQueue::new(config.capture.queue_capacity));
    controller.add_sink(queue.clone());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let mut last_frame = None;
    let mut reconfigured = false;
    while running.load(Ordering::SeqCst) {
        let Some(frame) = queue.pop_timeout(Duration::from_millis(500)) else {
            if controller.frames_pulled() > 0 {
                break;
            }
            continue;
        };

        if frame.sequence % 25 == 0 {
            let bins = display_histogram(&frame);
            let pixels = u64::from(frame.width) * u64::from(frame.height);
            let sum: u64 = bins
                .iter()
                .enumerate()
                .map(|(value, &count)| value as u64 * u64::from(count))
                .sum();
            println!(
                "frame {:>5}  {}x{}  mean {:.1}  dropped {}",
                frame.sequence,
                frame.width,
                frame.height,
                sum as f64 / pixels as f64,
                queue.dropped()
            );

            let raw = controller.pull_frame()?;
            let values = sample_neighborhood(&raw, config.capture.neighborhood_offset)?;
            println!("        center neighborhood: {values:?}");
        }

        // after a little while, narrow down to a quarter-sensor AOI
        if !reconfigured && frame.sequence >= 100 {
            let rect = AoiRect::new(
                geometry.max_width / 4,
                geometry.max_height / 4,
                geometry.max_width / 2,
                geometry.max_height / 2,
            );
            println!("Reconfiguring AOI to {rect}...");
            controller.reconfigure_aoi(rect, false)?;
            reconfigured = true;
        }

        let done = frame.sequence >= 300;
        last_frame = Some(frame);
        if done {
            break;
        }
    }

    if save_last_frame {
        if let Some(frame) = &last_frame {
            let path = format!("frame_{}.png", frame.sequence);
            frame.save_png(&path)?;
            println!("Saved {path}");
        }
    }

    println!(
        "Done: {} frames pulled, {} dropped by the queue",
        controller.frames_pulled(),
        queue.dropped()
    );
    controller.disconnect();
    Ok(())
}
