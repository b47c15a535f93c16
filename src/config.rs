use crate::types::PixelFormat;
use std::str::FromStr;
use std::time::Duration;

/// Image buffers the SDK keeps per device: enough for the grabber thread
/// to fill one while the caller converts the other.
pub const DEFAULT_BUFFER_DEPTH: u32 = 2;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(1000);

/// An automatic-or-manual camera control such as exposure or gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    /// Let the camera regulate continuously.
    Auto,
    /// Fixed value in the node's unit (microseconds, decibels).
    Manual(f32),
}

impl Control {
    /// Parse `auto` or a number.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("auto") {
            return Some(Control::Auto);
        }
        name.parse::<f32>().ok().filter(|v| v.is_finite()).map(Control::Manual)
    }
}

/// Settings applied to a camera after enumeration. `None` leaves the
/// camera's current setting alone.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraProfile {
    pub exposure: Option<Control>,
    pub gain: Option<Control>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

impl CameraProfile {
    pub fn is_empty(&self) -> bool {
        *self == CameraProfile::default()
    }
}

/// Tunables applied at enumeration and frame acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SDK image buffer pool size per device.
    pub buffer_depth: u32,
    /// Upper bound on the wait for one frame.
    pub acquire_timeout: Duration,
    /// Encoding frames are converted into.
    pub pixel_format: PixelFormat,
    /// Applied by [`crate::Cameras::apply_configured_profile`].
    pub profile: CameraProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_depth: DEFAULT_BUFFER_DEPTH,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            pixel_format: PixelFormat::default(),
            profile: CameraProfile::default(),
        }
    }
}

impl Config {
    /// Build a configuration from the environment, falling back to the
    /// defaults for unset or unparseable values.
    ///
    /// | variable | meaning |
    /// |----------|---------|
    /// | `MVCAM_BUFFER_DEPTH` | SDK buffers per camera |
    /// | `MVCAM_ACQUIRE_TIMEOUT_MS` | frame wait |
    /// | `MVCAM_PIXEL_FORMAT` | `bgr8` or `rgb8` |
    /// | `MVCAM_EXPOSURE` | `auto` or microseconds |
    /// | `MVCAM_GAIN` | `auto` or decibels |
    /// | `MVCAM_WIDTH`, `MVCAM_HEIGHT` | image size in pixels |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let buffer_depth = match read_parsed::<u32>(&lookup, "MVCAM_BUFFER_DEPTH") {
            Some(0) => {
                log::warn!("MVCAM_BUFFER_DEPTH=0 is invalid, using {}", defaults.buffer_depth);
                defaults.buffer_depth
            }
            Some(n) => n,
            None => defaults.buffer_depth,
        };

        let acquire_timeout = read_parsed::<u32>(&lookup, "MVCAM_ACQUIRE_TIMEOUT_MS")
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(defaults.acquire_timeout);

        let pixel_format = match lookup("MVCAM_PIXEL_FORMAT") {
            Some(raw) => PixelFormat::from_name(raw.trim()).unwrap_or_else(|| {
                log::warn!(
                    "Unknown MVCAM_PIXEL_FORMAT='{}', using {:?} (supported: bgr8|rgb8)",
                    raw,
                    defaults.pixel_format
                );
                defaults.pixel_format
            }),
            None => defaults.pixel_format,
        };

        let profile = CameraProfile {
            exposure: read_control(&lookup, "MVCAM_EXPOSURE"),
            gain: read_control(&lookup, "MVCAM_GAIN"),
            width: read_parsed::<i64>(&lookup, "MVCAM_WIDTH"),
            height: read_parsed::<i64>(&lookup, "MVCAM_HEIGHT"),
        };

        Config {
            buffer_depth,
            acquire_timeout,
            pixel_format,
            profile,
        }
    }

    /// Frame wait in whole milliseconds, saturating at `u32::MAX`.
    pub fn acquire_timeout_ms(&self) -> u32 {
        u32::try_from(self.acquire_timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

fn read_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Invalid {}='{}', using default", key, raw);
            None
        }
    }
}

fn read_control(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Control> {
    let raw = lookup(key)?;
    let control = Control::from_name(&raw);
    if control.is_none() {
        log::warn!("Invalid {}='{}' (expected auto or a number), leaving it unset", key, raw);
    }
    control
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.buffer_depth, 2);
        assert_eq!(cfg.acquire_timeout_ms(), 1000);
        assert_eq!(cfg.pixel_format, PixelFormat::Bgr8);
        assert!(cfg.profile.is_empty());
    }

    #[test]
    fn test_profile_from_env() {
        let cfg = Config::from_lookup(lookup(&[
            ("MVCAM_EXPOSURE", "8000"),
            ("MVCAM_GAIN", "Auto"),
            ("MVCAM_WIDTH", "640"),
        ]));
        assert_eq!(
            cfg.profile,
            CameraProfile {
                exposure: Some(Control::Manual(8000.0)),
                gain: Some(Control::Auto),
                width: Some(640),
                height: None,
            }
        );

        let cfg = Config::from_lookup(lookup(&[("MVCAM_EXPOSURE", "bright"), ("MVCAM_GAIN", "NaN")]));
        assert!(cfg.profile.is_empty());
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("MVCAM_BUFFER_DEPTH", "4"),
            ("MVCAM_ACQUIRE_TIMEOUT_MS", " 100 "),
            ("MVCAM_PIXEL_FORMAT", "rgb8"),
        ]));
        assert_eq!(cfg.buffer_depth, 4);
        assert_eq!(cfg.acquire_timeout, Duration::from_millis(100));
        assert_eq!(cfg.pixel_format, PixelFormat::Rgb8);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("MVCAM_BUFFER_DEPTH", "0"),
            ("MVCAM_ACQUIRE_TIMEOUT_MS", "soon"),
            ("MVCAM_PIXEL_FORMAT", "yuv422"),
        ]));
        assert_eq!(cfg, Config::default());
    }
}
