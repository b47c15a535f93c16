use crate::config::Config;
use crate::error::Classify;
use crate::sdk::CameraSdk;
use crate::{CameraError, Result};
use std::sync::Arc;

/// One opened, streaming camera.
///
/// Created by [`DeviceSession::open`], which performs create → open →
/// buffer depth → start streaming. The handle is closed and destroyed
/// exactly once: by [`DeviceSession::close`], or on drop if `close` was
/// never called.
pub struct DeviceSession<S: CameraSdk> {
    sdk: Arc<S>,
    handle: Option<S::Handle>,
}

impl<S: CameraSdk> DeviceSession<S> {
    /// Bring one device up. On failure the device's own partial state is
    /// undone before the error is returned.
    pub fn open(sdk: Arc<S>, device: &S::Device, config: &Config) -> Result<Self> {
        let handle = sdk.create_handle(device).classify()?;

        if let Err(e) = sdk.open_device(&handle).classify() {
            if let Err(destroy_err) = sdk.destroy_handle(handle).classify() {
                log::warn!("Failed to destroy handle after open failure: {}", destroy_err);
            }
            return Err(e);
        }

        // From here on the device is open: dropping the session closes it.
        let session = DeviceSession {
            sdk,
            handle: Some(handle),
        };
        let handle = session.raw();
        session
            .sdk
            .set_buffer_depth(handle, config.buffer_depth)
            .classify()?;
        session.sdk.start_streaming(handle).classify()?;
        Ok(session)
    }

    pub(crate) fn sdk(&self) -> &S {
        &self.sdk
    }

    /// The live handle. Only `close`/`Drop` take it out, and both consume
    /// the session, so it is always present here.
    pub(crate) fn raw(&self) -> &S::Handle {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("session used after close"),
        }
    }

    /// Close the device and destroy its handle. Both steps always run;
    /// the first failure is returned.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let closed = self.sdk.close_device(&handle).classify();
        let destroyed = self.sdk.destroy_handle(handle).classify();
        closed.and(destroyed)
    }
}

impl<S: CameraSdk> Drop for DeviceSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Failed to release camera session: {}", e);
        }
    }
}

/// The current generation of opened devices.
///
/// Indices handed out by [`DeviceRegistry::enumerate`] stay valid until the
/// next enumerate or teardown.
pub struct DeviceRegistry<S: CameraSdk> {
    sessions: Vec<DeviceSession<S>>,
}

impl<S: CameraSdk> Default for DeviceRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }
}

impl<S: CameraSdk> DeviceRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of devices in the current generation.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Replace the current generation with every attached USB camera,
    /// each opened and streaming. Returns the device count.
    ///
    /// If the previous generation cannot be torn down cleanly, its error is
    /// returned and nothing new is enumerated. If device `i` fails to come
    /// up, devices `[0, i)` are closed again, later devices are never
    /// touched, and the registry is left empty.
    pub fn enumerate(&mut self, sdk: &Arc<S>, config: &Config) -> Result<usize> {
        if !self.is_empty() {
            log::info!("Re-enumerating, releasing {} camera(s)", self.len());
            self.teardown()?;
        }

        let devices = sdk.enumerate_usb().classify()?;
        log::info!("Found {} USB camera(s)", devices.len());

        let mut sessions = Vec::with_capacity(devices.len());
        for (index, device) in devices.iter().enumerate() {
            match DeviceSession::open(Arc::clone(sdk), device, config) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    log::warn!(
                        "Camera {} failed to start ({}), rolling back {} camera(s)",
                        index,
                        e,
                        sessions.len()
                    );
                    if let Err(rollback_err) = drain(sessions) {
                        log::warn!("Rollback after camera {} failed: {}", index, rollback_err);
                    }
                    return Err(e);
                }
            }
        }

        self.sessions = sessions;
        Ok(self.len())
    }

    /// Close and destroy every session. Keeps going past failures and
    /// returns the first one; the registry is empty afterwards.
    pub fn teardown(&mut self) -> Result<()> {
        let sessions = std::mem::take(&mut self.sessions);
        let count = sessions.len();
        let result = drain(sessions);
        match &result {
            Ok(()) => log::debug!("Released {} camera(s)", count),
            Err(e) => log::warn!("Releasing {} camera(s) failed: {}", count, e),
        }
        result
    }

    /// Session at `index`. Fails before any SDK call when the index is out
    /// of range for the current generation.
    pub fn session(&self, index: usize) -> Result<&DeviceSession<S>> {
        self.sessions
            .get(index)
            .ok_or(CameraError::InvalidDeviceIndex {
                index,
                count: self.sessions.len(),
            })
    }
}

fn drain<S: CameraSdk>(sessions: Vec<DeviceSession<S>>) -> Result<()> {
    let mut first_err = None;
    for session in sessions {
        if let Err(e) = session.close() {
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Call, Op, SimDevice, SimSdk, E_ACCESS, E_HANDLE, E_PARAMETER};

    fn setup(devices: usize) -> (Arc<SimSdk>, DeviceRegistry<SimSdk>) {
        let sdk = Arc::new(SimSdk::with_devices(devices));
        sdk.initialize().unwrap();
        sdk.clear_calls();
        (sdk, DeviceRegistry::new())
    }

    #[test]
    fn test_enumerate_brings_up_in_order() {
        let (sdk, mut reg) = setup(2);
        assert_eq!(reg.enumerate(&sdk, &Config::default()).unwrap(), 2);
        let calls = sdk.calls();
        assert_eq!(calls[0], Call::Enumerate);
        assert_eq!(calls[1], Call::CreateHandle { device: 0 });
        assert_eq!(calls[2], Call::OpenDevice { device: 0, handle: 1 });
        assert_eq!(calls[3], Call::SetBufferDepth { device: 0, depth: 2 });
        assert_eq!(calls[4], Call::StartStreaming { device: 0 });
        assert_eq!(calls[5], Call::CreateHandle { device: 1 });
        assert_eq!(calls.len(), 9);
        assert_eq!(sdk.live_handles(), 2);
    }

    #[test]
    fn test_enumerate_uses_configured_depth() {
        let (sdk, mut reg) = setup(1);
        let config = Config {
            buffer_depth: 5,
            ..Config::default()
        };
        reg.enumerate(&sdk, &config).unwrap();
        assert!(sdk.calls().contains(&Call::SetBufferDepth { device: 0, depth: 5 }));
    }

    #[test]
    fn test_reenumerate_tears_down_previous_generation_first() {
        let (sdk, mut reg) = setup(3);
        reg.enumerate(&sdk, &Config::default()).unwrap();
        sdk.clear_calls();

        assert_eq!(reg.enumerate(&sdk, &Config::default()).unwrap(), 3);
        let calls = sdk.calls();
        let first_create = calls
            .iter()
            .position(|c| c.op() == Op::CreateHandle)
            .unwrap();
        for handle in 1..=3u64 {
            let closes = calls[..first_create]
                .iter()
                .filter(|c| matches!(c, Call::CloseDevice { handle: h, .. } if *h == handle))
                .count();
            let destroys = calls[..first_create]
                .iter()
                .filter(|c| matches!(c, Call::DestroyHandle { handle: h, .. } if *h == handle))
                .count();
            assert_eq!((closes, destroys), (1, 1), "generation-1 handle {}", handle);
        }
        assert_eq!(sdk.count(Op::CloseDevice), 3);
        assert_eq!(sdk.count(Op::DestroyHandle), 3);
        assert_eq!(sdk.live_handles(), 3);
    }

    #[test]
    fn test_bringup_failure_rolls_back_earlier_devices() {
        let (sdk, mut reg) = setup(4);
        sdk.fail(Op::StartStreaming, Some(2), E_ACCESS);

        let err = reg.enumerate(&sdk, &Config::default()).unwrap_err();
        assert_eq!(err, CameraError::Sdk(E_ACCESS));
        assert!(reg.is_empty());
        assert_eq!(sdk.live_handles(), 0);

        let calls = sdk.calls();
        for device in 0..3 {
            assert_eq!(
                calls
                    .iter()
                    .filter(|c| c.op() == Op::CloseDevice && c.device() == Some(device))
                    .count(),
                1
            );
            assert_eq!(
                calls
                    .iter()
                    .filter(|c| c.op() == Op::DestroyHandle && c.device() == Some(device))
                    .count(),
                1
            );
        }
        assert!(!calls.iter().any(|c| c.device() == Some(3)));
    }

    #[test]
    fn test_open_failure_destroys_without_close() {
        let (sdk, mut reg) = setup(2);
        sdk.fail(Op::OpenDevice, Some(1), E_HANDLE);

        assert_eq!(reg.enumerate(&sdk, &Config::default()), Err(CameraError::Sdk(E_HANDLE)));
        let calls = sdk.calls();
        assert!(!calls.contains(&Call::CloseDevice { device: 1, handle: 2 }));
        assert!(calls.contains(&Call::DestroyHandle { device: 1, handle: 2 }));
        assert!(calls.contains(&Call::CloseDevice { device: 0, handle: 1 }));
        assert_eq!(sdk.live_handles(), 0);
    }

    #[test]
    fn test_open_failure_keeps_open_error_when_destroy_fails() {
        let (sdk, mut reg) = setup(1);
        sdk.fail(Op::OpenDevice, None, E_HANDLE);
        sdk.fail(Op::DestroyHandle, None, E_ACCESS);

        assert_eq!(reg.enumerate(&sdk, &Config::default()), Err(CameraError::Sdk(E_HANDLE)));
        assert_eq!(sdk.count(Op::DestroyHandle), 1);
        assert_eq!(sdk.count(Op::CloseDevice), 0);
    }

    #[test]
    fn test_rollback_failure_keeps_bringup_error() {
        let (sdk, mut reg) = setup(2);
        sdk.fail(Op::CloseDevice, Some(0), E_ACCESS);
        sdk.fail(Op::SetBufferDepth, Some(1), E_PARAMETER);

        assert_eq!(reg.enumerate(&sdk, &Config::default()), Err(CameraError::Sdk(E_PARAMETER)));
        assert!(reg.is_empty());
        // Device 0 is still destroyed after its close failed.
        assert!(sdk.calls().contains(&Call::DestroyHandle { device: 0, handle: 1 }));
        assert_eq!(sdk.live_handles(), 0);
    }

    #[test]
    fn test_reenumerate_stops_when_teardown_fails() {
        let (sdk, mut reg) = setup(2);
        reg.enumerate(&sdk, &Config::default()).unwrap();
        sdk.clear_calls();
        sdk.fail(Op::CloseDevice, Some(1), E_ACCESS);

        assert_eq!(reg.enumerate(&sdk, &Config::default()), Err(CameraError::Sdk(E_ACCESS)));
        assert!(reg.is_empty());
        assert_eq!(sdk.count(Op::CloseDevice), 2);
        assert_eq!(sdk.count(Op::DestroyHandle), 2);
        assert_eq!(sdk.count(Op::Enumerate), 0);
        assert_eq!(sdk.count(Op::CreateHandle), 0);
        assert_eq!(reg.session(0).err(), Some(CameraError::InvalidDeviceIndex { index: 0, count: 0 }));
    }

    #[test]
    fn test_reenumerate_follows_device_changes() {
        let (sdk, mut reg) = setup(3);
        assert_eq!(reg.enumerate(&sdk, &Config::default()).unwrap(), 3);
        assert!(reg.session(2).is_ok());

        sdk.set_devices(vec![SimDevice::new("ONLY")]);
        assert_eq!(reg.enumerate(&sdk, &Config::default()).unwrap(), 1);
        assert!(reg.session(0).is_ok());
        assert_eq!(
            reg.session(2).err(),
            Some(CameraError::InvalidDeviceIndex { index: 2, count: 1 })
        );
        assert_eq!(sdk.live_handles(), 1);
        assert_eq!(reg.session(0).unwrap().get_string("DeviceSerialNumber").unwrap().current, "ONLY");
    }

    #[test]
    fn test_create_failure_touches_nothing_else() {
        let (sdk, mut reg) = setup(1);
        sdk.fail(Op::CreateHandle, None, E_PARAMETER);
        assert!(reg.enumerate(&sdk, &Config::default()).is_err());
        assert_eq!(sdk.count(Op::DestroyHandle), 0);
        assert_eq!(sdk.count(Op::CloseDevice), 0);
    }

    #[test]
    fn test_teardown_drains_past_failures() {
        let (sdk, mut reg) = setup(3);
        reg.enumerate(&sdk, &Config::default()).unwrap();
        sdk.fail(Op::CloseDevice, Some(0), E_ACCESS);

        assert_eq!(reg.teardown(), Err(CameraError::Sdk(E_ACCESS)));
        assert!(reg.is_empty());
        assert_eq!(sdk.count(Op::CloseDevice), 3);
        assert_eq!(sdk.count(Op::DestroyHandle), 3);
        assert_eq!(sdk.live_handles(), 0);
    }

    #[test]
    fn test_session_index_checked() {
        let (sdk, mut reg) = setup(1);
        reg.enumerate(&sdk, &Config::default()).unwrap();
        assert!(reg.session(0).is_ok());
        assert_eq!(
            reg.session(1).err(),
            Some(CameraError::InvalidDeviceIndex { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_dropped_registry_releases_handles() {
        let (sdk, mut reg) = setup(2);
        reg.enumerate(&sdk, &Config::default()).unwrap();
        drop(reg);
        assert_eq!(sdk.live_handles(), 0);
        assert_eq!(sdk.count(Op::CloseDevice), 2);
    }
}
