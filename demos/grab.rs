//! Grab frames from the first camera and report the achieved rate.
//!
//! Usage: cargo run --features hikvision --example grab -- [frames] [exposure_us]
//!
//! MVCAM_EXPOSURE / MVCAM_GAIN / MVCAM_WIDTH / MVCAM_HEIGHT set a profile
//! that is applied to the camera before grabbing.

use mvcam::hikvision::HikSdk;
use mvcam::{CameraError, Cameras, Config};
use std::time::Instant;

fn run(frames: usize, exposure: Option<f32>) -> mvcam::Result<()> {
    let mut cams = Cameras::with_config(HikSdk, Config::from_env());
    cams.initialize()?;
    cams.require_devices(None)?;
    cams.apply_configured_profile()?;

    if let Some(exposure) = exposure {
        cams.set_enum(0, "ExposureAuto", "Off")?;
        cams.set_float(0, "ExposureTime", exposure)?;
    }
    let exposure = cams.get_float(0, "ExposureTime")?;
    println!(
        "Exposure {:.0} us (range {:.0}..{:.0})",
        exposure.current, exposure.min, exposure.max
    );

    let mut buf = vec![0u8; cams.frame_len(0)?];
    let start = Instant::now();
    let mut grabbed = 0usize;
    let mut timeouts = 0usize;
    for _ in 0..frames {
        match cams.acquire_frame(0, &mut buf) {
            Ok(info) => {
                grabbed += 1;
                if grabbed == 1 {
                    println!(
                        "First frame: {}x{} pixel type 0x{:08X}",
                        info.width, info.height, info.pixel_type
                    );
                }
            }
            Err(e) if e.is_timeout() => timeouts += 1,
            Err(CameraError::BufferTooSmall { required, .. }) => {
                // Resolution changed under us.
                buf.resize(required, 0);
            }
            Err(e) => return Err(e),
        }
    }

    let secs = start.elapsed().as_secs_f64();
    println!(
        "{} frames in {:.2}s ({:.1} fps), {} timeouts",
        grabbed,
        secs,
        grabbed as f64 / secs.max(f64::EPSILON),
        timeouts
    );
    cams.finalize()
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let frames = args.next().and_then(|a| a.parse().ok()).unwrap_or(100);
    let exposure = args.next().and_then(|a| a.parse().ok());

    if let Err(e) = run(frames, exposure) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
