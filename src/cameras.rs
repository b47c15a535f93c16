use crate::config::{CameraProfile, Config};
use crate::error::Classify;
use crate::registry::{DeviceRegistry, DeviceSession};
use crate::sdk::CameraSdk;
use crate::types::{
    EnumParamInfo, FloatParamInfo, FrameInfo, IntParamInfo, ParamGroup, ParamValue, StringParamInfo,
};
use crate::{CameraError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entry point: SDK lifecycle plus indexed access to every enumerated
/// camera.
///
/// Indices come from [`Cameras::enumerate_devices`] and are invalidated by
/// the next enumeration. Every indexed call checks the index before it
/// reaches the SDK.
pub struct Cameras<S: CameraSdk> {
    sdk: Arc<S>,
    config: Config,
    initialized: bool,
    registry: DeviceRegistry<S>,
}

impl<S: CameraSdk> Cameras<S> {
    pub fn new(sdk: S) -> Self {
        Self::with_config(sdk, Config::default())
    }

    pub fn with_config(sdk: S, config: Config) -> Self {
        Cameras {
            sdk: Arc::new(sdk),
            config,
            initialized: false,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the SDK. Calling this twice is an error, not a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(CameraError::AlreadyInitialized);
        }
        self.sdk.initialize().classify()?;
        self.initialized = true;
        log::info!("Camera SDK initialized");
        Ok(())
    }

    /// Release every camera, then finalize the SDK.
    ///
    /// If releasing the cameras fails, that error is returned and the SDK
    /// stays initialized.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(CameraError::NotInitialized);
        }
        self.registry.teardown()?;
        self.sdk.finalize().classify()?;
        self.initialized = false;
        log::info!("Camera SDK finalized");
        Ok(())
    }

    /// Open and start streaming every attached USB camera, replacing the
    /// previous generation. Returns the device count.
    pub fn enumerate_devices(&mut self) -> Result<usize> {
        if !self.initialized {
            return Err(CameraError::NotInitialized);
        }
        self.registry.enumerate(&self.sdk, &self.config)
    }

    /// Enumerate and insist on finding cameras: none at all, or a count
    /// different from `expected`, is [`CameraError::DeviceNotFound`].
    pub fn require_devices(&mut self, expected: Option<usize>) -> Result<usize> {
        let count = self.enumerate_devices()?;
        if count == 0 {
            return Err(CameraError::DeviceNotFound);
        }
        if let Some(expected) = expected {
            if count != expected {
                log::warn!("Found {} camera(s), expected {}", count, expected);
                return Err(CameraError::DeviceNotFound);
            }
        }
        Ok(count)
    }

    /// Devices in the current generation.
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Session at `index` for direct use.
    pub fn device(&self, index: usize) -> Result<&DeviceSession<S>> {
        self.registry.session(index)
    }

    pub fn get_int(&self, index: usize, name: &str) -> Result<IntParamInfo> {
        self.device(index)?.get_int(name)
    }

    pub fn get_float(&self, index: usize, name: &str) -> Result<FloatParamInfo> {
        self.device(index)?.get_float(name)
    }

    pub fn get_bool(&self, index: usize, name: &str) -> Result<bool> {
        self.device(index)?.get_bool(name)
    }

    pub fn get_string(&self, index: usize, name: &str) -> Result<StringParamInfo> {
        self.device(index)?.get_string(name)
    }

    pub fn get_enum(&self, index: usize, name: &str) -> Result<EnumParamInfo> {
        self.device(index)?.get_enum(name)
    }

    pub fn set_int(&self, index: usize, name: &str, value: i64) -> Result<()> {
        self.device(index)?.set_int(name, value)
    }

    pub fn set_float(&self, index: usize, name: &str, value: f32) -> Result<()> {
        self.device(index)?.set_float(name, value)
    }

    pub fn set_bool(&self, index: usize, name: &str, value: bool) -> Result<()> {
        self.device(index)?.set_bool(name, value)
    }

    pub fn set_string(&self, index: usize, name: &str, value: &str) -> Result<()> {
        self.device(index)?.set_string(name, value)
    }

    pub fn set_enum(&self, index: usize, name: &str, symbol: &str) -> Result<()> {
        self.device(index)?.set_enum(name, symbol)
    }

    /// Apply `profile` to camera `index`: exposure, gain, then image size.
    pub fn apply_profile(&self, index: usize, profile: &CameraProfile) -> Result<()> {
        self.device(index)?.apply_profile(profile)
    }

    /// Apply the configured profile to every camera of the current
    /// generation, stopping at the first failure.
    pub fn apply_configured_profile(&self) -> Result<()> {
        if self.config.profile.is_empty() {
            return Ok(());
        }
        for index in 0..self.device_count() {
            self.apply_profile(index, &self.config.profile).map_err(|e| {
                log::warn!("Applying profile to camera {} failed: {}", index, e);
                e
            })?;
        }
        log::info!("Applied profile to {} camera(s)", self.device_count());
        Ok(())
    }

    /// Typed snapshot of every parameter listed in `groups`, keyed by name.
    pub fn query_parameters(
        &self,
        index: usize,
        groups: &[ParamGroup],
    ) -> Result<BTreeMap<String, ParamValue>> {
        self.device(index)?.query(groups)
    }

    /// Grab one frame from camera `index` into `dst`, using the configured
    /// timeout and output format.
    pub fn acquire_frame(&self, index: usize, dst: &mut [u8]) -> Result<FrameInfo> {
        let session = self.device(index)?;
        session.acquire_frame(self.config.acquire_timeout_ms(), self.config.pixel_format, dst)
    }

    /// Bytes a converted frame from camera `index` needs, from its current
    /// `Width` and `Height`.
    pub fn frame_len(&self, index: usize) -> Result<usize> {
        let session = self.device(index)?;
        let width = session.get_int("Width")?.current;
        let height = session.get_int("Height")?.current;
        let bad_size = || CameraError::InvalidArgument(format!("frame size {}x{}", width, height));
        let bytes = width
            .max(0)
            .checked_mul(height.max(0))
            .and_then(|pixels| usize::try_from(pixels).ok())
            .and_then(|pixels| pixels.checked_mul(self.config.pixel_format.bytes_per_pixel()))
            .ok_or_else(bad_size)?;
        Ok(bytes)
    }
}

impl<S: CameraSdk> Drop for Cameras<S> {
    fn drop(&mut self) {
        if self.initialized {
            if let Err(e) = self.finalize() {
                log::warn!("Camera SDK finalize on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Control;
    use crate::sim::{Op, SimDevice, SimSdk, SimValue, E_ACCESS};
    use crate::types::{AccessMode, ParamKind, ParamSpec, PixelFormat};
    use std::time::Duration;

    fn ready(devices: usize) -> Cameras<SimSdk> {
        let mut cams = Cameras::new(SimSdk::with_devices(devices));
        cams.initialize().unwrap();
        cams.enumerate_devices().unwrap();
        cams.sdk().clear_calls();
        cams
    }

    #[test]
    fn test_double_initialize_rejected() {
        let mut cams = Cameras::new(SimSdk::with_devices(0));
        cams.initialize().unwrap();
        assert_eq!(cams.initialize(), Err(CameraError::AlreadyInitialized));
        assert_eq!(cams.sdk().count(Op::Initialize), 1);
    }

    #[test]
    fn test_finalize_without_initialize() {
        let mut cams = Cameras::new(SimSdk::with_devices(0));
        assert_eq!(cams.finalize(), Err(CameraError::NotInitialized));
        assert!(cams.sdk().calls().is_empty());
    }

    #[test]
    fn test_initialize_failure_leaves_uninitialized() {
        let mut cams = Cameras::new(SimSdk::with_devices(0));
        cams.sdk().fail(Op::Initialize, None, E_ACCESS);
        assert_eq!(cams.initialize(), Err(CameraError::Sdk(E_ACCESS)));
        assert!(!cams.is_initialized());
        cams.sdk().clear_failures();
        assert!(cams.initialize().is_ok());
    }

    #[test]
    fn test_enumerate_requires_initialize() {
        let mut cams = Cameras::new(SimSdk::with_devices(2));
        assert_eq!(cams.enumerate_devices(), Err(CameraError::NotInitialized));
        assert!(cams.sdk().calls().is_empty());
    }

    #[test]
    fn test_require_devices() {
        let mut cams = Cameras::new(SimSdk::with_devices(0));
        cams.initialize().unwrap();
        assert_eq!(cams.require_devices(None), Err(CameraError::DeviceNotFound));

        let mut cams = Cameras::new(SimSdk::with_devices(2));
        cams.initialize().unwrap();
        assert_eq!(cams.require_devices(Some(2)), Ok(2));
        assert_eq!(cams.require_devices(Some(1)), Err(CameraError::DeviceNotFound));
    }

    #[test]
    fn test_finalize_tears_down_then_finalizes() {
        let mut cams = ready(2);
        cams.finalize().unwrap();
        assert!(!cams.is_initialized());
        assert_eq!(cams.device_count(), 0);
        assert_eq!(cams.sdk().live_handles(), 0);
        let calls = cams.sdk().calls();
        assert_eq!(calls.last().map(|c| c.op()), Some(Op::Finalize));
    }

    #[test]
    fn test_finalize_surfaces_teardown_failure() {
        let mut cams = ready(2);
        cams.sdk().fail(Op::DestroyHandle, Some(1), E_ACCESS);

        assert_eq!(cams.finalize(), Err(CameraError::Sdk(E_ACCESS)));
        assert!(cams.is_initialized());
        assert_eq!(cams.sdk().count(Op::Finalize), 0);
        assert_eq!(cams.sdk().count(Op::CloseDevice), 2);

        cams.sdk().clear_failures();
        assert!(cams.finalize().is_ok());
        assert!(!cams.sdk().is_initialized());
    }

    #[test]
    fn test_sdk_finalize_failure_keeps_initialized() {
        let mut cams = ready(1);
        cams.sdk().fail(Op::Finalize, None, E_ACCESS);

        assert_eq!(cams.finalize(), Err(CameraError::Sdk(E_ACCESS)));
        assert!(cams.is_initialized());
        assert_eq!(cams.device_count(), 0);
        assert_eq!(cams.sdk().live_handles(), 0);

        cams.sdk().clear_failures();
        assert!(cams.finalize().is_ok());
        assert!(!cams.is_initialized());
    }

    #[test]
    fn test_frame_len_rejects_overflowing_size() {
        let mut dev = SimDevice::new("HUGE");
        dev.insert(
            "Width",
            SimValue::Int(IntParamInfo { current: i64::MAX / 2, min: 0, max: i64::MAX, inc: 1 }),
            AccessMode::READ,
        );
        let mut cams = Cameras::new(SimSdk::new(vec![dev]));
        cams.initialize().unwrap();
        cams.enumerate_devices().unwrap();

        assert!(matches!(cams.frame_len(0), Err(CameraError::InvalidArgument(_))));
    }

    #[test]
    fn test_apply_configured_profile_to_every_camera() {
        let config = Config {
            profile: CameraProfile {
                gain: Some(Control::Manual(6.0)),
                width: Some(128),
                ..CameraProfile::default()
            },
            ..Config::default()
        };
        let mut cams = Cameras::with_config(SimSdk::with_devices(2), config);
        cams.initialize().unwrap();
        cams.enumerate_devices().unwrap();

        cams.apply_configured_profile().unwrap();
        for index in 0..2 {
            assert_eq!(cams.get_float(index, "Gain").unwrap().current, 6.0);
            assert_eq!(cams.get_int(index, "Width").unwrap().current, 128);
            assert_eq!(cams.frame_len(index).unwrap(), 128 * 48 * 3);
        }
    }

    #[test]
    fn test_query_parameters_through_facade() {
        let cams = ready(1);
        let groups = [ParamGroup {
            name: "Info".into(),
            parameters: vec![ParamSpec::new("DeviceSerialNumber", ParamKind::String)],
        }];
        let table = cams.query_parameters(0, &groups).unwrap();
        assert!(matches!(&table["DeviceSerialNumber"], ParamValue::String(s) if s.current == "SIM000"));
    }

    #[test]
    fn test_out_of_range_index_never_reaches_sdk() {
        let cams = ready(2);
        let mut buf = [0u8; 8];
        let bad = CameraError::InvalidDeviceIndex { index: 2, count: 2 };

        assert_eq!(cams.get_int(2, "Width").err(), Some(bad.clone()));
        assert_eq!(cams.get_float(2, "Gain").err(), Some(bad.clone()));
        assert_eq!(cams.get_bool(2, "ReverseX").err(), Some(bad.clone()));
        assert_eq!(cams.get_string(2, "DeviceUserID").err(), Some(bad.clone()));
        assert_eq!(cams.get_enum(2, "ExposureAuto").err(), Some(bad.clone()));
        assert_eq!(cams.set_int(2, "Width", 8).err(), Some(bad.clone()));
        assert_eq!(cams.set_float(2, "Gain", 1.0).err(), Some(bad.clone()));
        assert_eq!(cams.set_bool(2, "ReverseX", true).err(), Some(bad.clone()));
        assert_eq!(cams.set_string(2, "DeviceUserID", "x").err(), Some(bad.clone()));
        assert_eq!(cams.set_enum(2, "ExposureAuto", "Off").err(), Some(bad.clone()));
        assert_eq!(cams.acquire_frame(2, &mut buf).err(), Some(bad.clone()));
        assert_eq!(cams.frame_len(2).err(), Some(bad.clone()));
        assert_eq!(cams.apply_profile(2, &CameraProfile::default()).err(), Some(bad.clone()));
        assert_eq!(cams.query_parameters(2, &[]).err(), Some(bad));
        assert!(cams.get_int(usize::MAX, "Width").is_err());

        assert!(cams.sdk().calls().is_empty());
    }

    #[test]
    fn test_indices_invalid_before_enumerate() {
        let mut cams = Cameras::new(SimSdk::with_devices(1));
        cams.initialize().unwrap();
        assert_eq!(
            cams.get_int(0, "Width").err(),
            Some(CameraError::InvalidDeviceIndex { index: 0, count: 0 })
        );
    }

    #[test]
    fn test_acquire_uses_config() {
        let config = Config {
            acquire_timeout: Duration::from_millis(10),
            pixel_format: PixelFormat::Rgb8,
            ..Config::default()
        };
        let mut cams = Cameras::with_config(SimSdk::with_devices(1), config);
        cams.initialize().unwrap();
        cams.enumerate_devices().unwrap();

        let mut buf = vec![0u8; cams.frame_len(0).unwrap()];
        let info = cams.acquire_frame(0, &mut buf).unwrap();
        assert_eq!(buf.len(), info.converted_len(PixelFormat::Rgb8));
        assert!(cams.sdk().calls().contains(&crate::sim::Call::AcquireFrame {
            device: 0,
            timeout_ms: 10
        }));
    }

    #[test]
    fn test_drop_finalizes() {
        let sdk = {
            let cams = ready(1);
            // Move the SDK handle out before the facade drops.
            Arc::clone(&cams.sdk)
        };
        assert_eq!(sdk.live_handles(), 0);
        assert!(!sdk.is_initialized());
    }
}
