use crate::error::Classify;
use crate::registry::DeviceSession;
use crate::sdk::CameraSdk;
use crate::types::{FrameInfo, PixelFormat};
use crate::{CameraError, Result};

impl<S: CameraSdk> DeviceSession<S> {
    /// Grab one frame and convert it into `dst`.
    ///
    /// Waits at most `timeout_ms` for a buffer; a timeout or acquisition error
    /// is returned as is, with nothing to release. Otherwise the buffer is
    /// checked against `dst`, converted to `format`, and handed back to the
    /// SDK exactly once whatever happened in between. The first error wins.
    pub fn acquire_frame(
        &self,
        timeout_ms: u32,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> Result<FrameInfo> {
        let sdk = self.sdk();
        let handle = self.raw();
        let frame = sdk.acquire_frame(handle, timeout_ms).classify()?;
        let info = sdk.frame_info(&frame);
        log::trace!(
            "Frame {}x{} type 0x{:08X} ({} bytes)",
            info.width,
            info.height,
            info.pixel_type,
            info.len
        );

        let required = info.converted_len(format);
        let converted = if dst.len() < required {
            Err(CameraError::BufferTooSmall {
                required,
                capacity: dst.len(),
            })
        } else {
            sdk.convert_frame(handle, &frame, format, dst).classify()
        };

        let released = sdk.release_frame(handle, frame).classify();
        if let Err(e) = &released {
            log::warn!("Failed to release frame buffer: {}", e);
        }

        converted.and(released).map(|()| info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::{Call, Op, SimSdk, E_ACCESS, E_NODATA, E_PARAMETER};
    use std::sync::Arc;

    const WAIT: u32 = 100;

    fn open(sdk: SimSdk) -> (Arc<SimSdk>, DeviceSession<SimSdk>) {
        let sdk = Arc::new(sdk);
        sdk.initialize().unwrap();
        let session = DeviceSession::open(Arc::clone(&sdk), &0, &Config::default()).unwrap();
        sdk.clear_calls();
        (sdk, session)
    }

    #[test]
    fn test_acquire_convert_release_in_order() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        let mut buf = vec![0u8; 64 * 48 * 3];

        let info = s.acquire_frame(WAIT, PixelFormat::Rgb8, &mut buf).unwrap();
        assert_eq!((info.width, info.height), (64, 48));
        assert_eq!(
            sdk.calls(),
            vec![
                Call::AcquireFrame { device: 0, timeout_ms: 100 },
                Call::ConvertFrame { device: 0, format: PixelFormat::Rgb8 },
                Call::ReleaseFrame { device: 0 },
            ]
        );
        assert_eq!(sdk.frames_out(), 0);
        // Mono source: every pixel has equal channels.
        assert!(buf.chunks_exact(3).all(|px| px[0] == px[1] && px[1] == px[2]));
    }

    #[test]
    fn test_timeout_skips_convert_and_release() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        sdk.set_frame_size(0, None);
        let mut buf = vec![0u8; 16];

        let err = s.acquire_frame(WAIT, PixelFormat::Bgr8, &mut buf).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err, CameraError::Sdk(E_NODATA));
        assert_eq!(sdk.count(Op::ConvertFrame), 0);
        assert_eq!(sdk.count(Op::ReleaseFrame), 0);
    }

    #[test]
    fn test_convert_failure_still_releases() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        sdk.fail(Op::ConvertFrame, None, E_PARAMETER);
        let mut buf = vec![0u8; 64 * 48 * 3];

        let err = s.acquire_frame(WAIT, PixelFormat::Bgr8, &mut buf).unwrap_err();
        assert_eq!(err, CameraError::Sdk(E_PARAMETER));
        let ops: Vec<Op> = sdk.calls().iter().map(Call::op).collect();
        assert_eq!(ops, vec![Op::AcquireFrame, Op::ConvertFrame, Op::ReleaseFrame]);
        assert_eq!(sdk.frames_out(), 0);
    }

    #[test]
    fn test_first_error_wins_over_release_error() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        sdk.fail(Op::ConvertFrame, None, E_PARAMETER);
        sdk.fail(Op::ReleaseFrame, None, E_ACCESS);
        let mut buf = vec![0u8; 64 * 48 * 3];
        assert_eq!(
            s.acquire_frame(WAIT, PixelFormat::Bgr8, &mut buf),
            Err(CameraError::Sdk(E_PARAMETER))
        );
    }

    #[test]
    fn test_release_error_reported_after_clean_convert() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        sdk.fail(Op::ReleaseFrame, None, E_ACCESS);
        let mut buf = vec![0u8; 64 * 48 * 3];
        assert_eq!(
            s.acquire_frame(WAIT, PixelFormat::Bgr8, &mut buf),
            Err(CameraError::Sdk(E_ACCESS))
        );
    }

    #[test]
    fn test_small_buffer_is_rejected_before_convert() {
        let (sdk, s) = open(SimSdk::with_devices(1));
        let mut buf = vec![0u8; 64 * 48];

        assert_eq!(
            s.acquire_frame(WAIT, PixelFormat::Bgr8, &mut buf),
            Err(CameraError::BufferTooSmall {
                required: 64 * 48 * 3,
                capacity: 64 * 48
            })
        );
        assert_eq!(sdk.count(Op::ConvertFrame), 0);
        assert_eq!(sdk.count(Op::ReleaseFrame), 1);
    }
}
