//! List all connected USB cameras with a few identifying parameters.
//!
//! Usage: MVCAM_SDK_LIB=/opt/MVS/lib/64 cargo run --features hikvision --example enumerate

use mvcam::hikvision::HikSdk;
use mvcam::{Cameras, Config};

fn main() {
    env_logger::init();

    let mut cams = Cameras::with_config(HikSdk, Config::from_env());
    if let Err(e) = cams.initialize() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match cams.enumerate_devices() {
        Ok(count) => {
            println!("Found {} camera(s):", count);
            for i in 0..count {
                let serial = cams
                    .get_string(i, "DeviceSerialNumber")
                    .map(|s| s.current)
                    .unwrap_or_else(|e| format!("<{}>", e));
                let width = cams.get_int(i, "Width").map(|w| w.current).unwrap_or(0);
                let height = cams.get_int(i, "Height").map(|h| h.current).unwrap_or(0);
                let format = cams
                    .get_enum(i, "PixelFormat")
                    .map(|f| f.current)
                    .unwrap_or_default();
                println!("  [{}] Serial={}  {}x{}  Format={}", i, serial, width, height, format);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = cams.finalize() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
