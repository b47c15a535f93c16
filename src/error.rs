use crate::sdk::{NativeResult, SDK_OK};

/// Vendor SDK status for "no data", returned when a frame wait times out.
pub const SDK_NO_DATA: i32 = 0x8000_0007_u32 as i32;

/// Vendor status for an unspecified failure. Stands in for a backend that
/// reports failure while returning the success code.
pub const SDK_UNKNOWN: i32 = 0x8000_00FF_u32 as i32;

/// Errors reported by the camera facade.
///
/// `Sdk` carries a status code from the vendor library unchanged; every
/// other variant originates locally and never collides with vendor codes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("camera SDK error 0x{0:08X}")]
    Sdk(i32),

    #[error("camera API already initialized")]
    AlreadyInitialized,

    #[error("camera API not initialized")]
    NotInitialized,

    #[error("no camera found")]
    DeviceNotFound,

    #[error("device index {index} out of range ({count} devices)")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("out of memory")]
    OutOfMemory,

    #[error("parameter `{0}` is not writable")]
    NotWritable(String),

    #[error("frame needs {required} bytes, buffer holds {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CameraError {
    /// True for vendor-originated errors.
    pub fn is_sdk(&self) -> bool {
        matches!(self, CameraError::Sdk(_))
    }

    /// True when a bounded frame wait expired without data.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CameraError::Sdk(SDK_NO_DATA))
    }

    /// Local error code, or `None` for vendor errors.
    pub fn local_code(&self) -> Option<LocalCode> {
        let code = match self {
            CameraError::Sdk(_) => return None,
            CameraError::AlreadyInitialized => LocalCode::AlreadyInitialized,
            CameraError::NotInitialized => LocalCode::NotInitialized,
            CameraError::DeviceNotFound => LocalCode::DeviceNotFound,
            CameraError::InvalidDeviceIndex { .. } => LocalCode::InvalidDeviceIndex,
            CameraError::OutOfMemory => LocalCode::OutOfMemory,
            CameraError::NotWritable(_) => LocalCode::NotWritable,
            CameraError::BufferTooSmall { .. } => LocalCode::BufferTooSmall,
            CameraError::InvalidArgument(_) => LocalCode::InvalidArgument,
        };
        Some(code)
    }
}

/// Local error codes as seen by C callers.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCode {
    Ok = 0,
    AlreadyInitialized = 1,
    NotInitialized = 2,
    DeviceNotFound = 3,
    InvalidDeviceIndex = 4,
    OutOfMemory = 5,
    NotWritable = 6,
    BufferTooSmall = 7,
    InvalidArgument = 8,
}

/// Tagged result code handed across the C boundary.
///
/// `code == 0` means success. `from_vendor` tells which code space
/// `code` belongs to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiOutcome {
    pub from_vendor: bool,
    pub code: i32,
}

impl ApiOutcome {
    pub const OK: ApiOutcome = ApiOutcome {
        from_vendor: false,
        code: LocalCode::Ok as i32,
    };

    pub fn is_ok(&self) -> bool {
        self.code == SDK_OK
    }
}

impl From<&CameraError> for ApiOutcome {
    fn from(err: &CameraError) -> Self {
        match (err, err.local_code()) {
            (CameraError::Sdk(code), _) => ApiOutcome {
                from_vendor: true,
                code: if *code == SDK_OK { SDK_UNKNOWN } else { *code },
            },
            (_, Some(local)) => ApiOutcome {
                from_vendor: false,
                code: local as i32,
            },
            (_, None) => ApiOutcome::OK,
        }
    }
}

impl<T> From<&crate::Result<T>> for ApiOutcome {
    fn from(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => ApiOutcome::OK,
            Err(e) => e.into(),
        }
    }
}

/// Translate a raw vendor status into a result.
pub fn classify(code: i32) -> crate::Result<()> {
    if code == SDK_OK {
        Ok(())
    } else {
        Err(CameraError::Sdk(code))
    }
}

/// Route a backend result through [`classify`].
pub trait Classify<T> {
    fn classify(self) -> crate::Result<T>;
}

impl<T> Classify<T> for NativeResult<T> {
    fn classify(self) -> crate::Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(SDK_OK) => {
                log::warn!("Camera SDK reported failure with the success status");
                Err(CameraError::Sdk(SDK_UNKNOWN))
            }
            Err(code) => Err(CameraError::Sdk(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ok_and_vendor() {
        assert_eq!(classify(0), Ok(()));
        assert_eq!(classify(0x8000_0001_u32 as i32), Err(CameraError::Sdk(0x8000_0001_u32 as i32)));
    }

    #[test]
    fn test_native_result_classify() {
        let ok: NativeResult<u32> = Ok(7);
        assert_eq!(ok.classify(), Ok(7));
        let err: NativeResult<u32> = Err(SDK_NO_DATA);
        let err = err.classify().unwrap_err();
        assert!(err.is_sdk());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_failure_with_ok_status_never_reaches_c_as_success() {
        let result: NativeResult<()> = Err(SDK_OK);
        let result = result.classify();
        assert_eq!(result, Err(CameraError::Sdk(SDK_UNKNOWN)));
        let outcome = ApiOutcome::from(&result);
        assert!(!outcome.is_ok());
        assert_eq!(outcome, ApiOutcome { from_vendor: true, code: SDK_UNKNOWN });

        let direct = ApiOutcome::from(&CameraError::Sdk(SDK_OK));
        assert!(!direct.is_ok());
    }

    #[test]
    fn test_outcome_tags_code_spaces() {
        // Vendor code 4 and local InvalidDeviceIndex share a number but not a tag.
        let vendor = ApiOutcome::from(&CameraError::Sdk(4));
        let local = ApiOutcome::from(&CameraError::InvalidDeviceIndex { index: 9, count: 1 });
        assert_eq!(vendor, ApiOutcome { from_vendor: true, code: 4 });
        assert_eq!(local, ApiOutcome { from_vendor: false, code: 4 });
        assert_ne!(vendor, local);
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: crate::Result<()> = Ok(());
        assert!(ApiOutcome::from(&ok).is_ok());
        let err: crate::Result<()> = Err(CameraError::NotWritable("Width".into()));
        let outcome = ApiOutcome::from(&err);
        assert!(!outcome.from_vendor);
        assert_eq!(outcome.code, LocalCode::NotWritable as i32);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            CameraError::Sdk(SDK_NO_DATA).to_string(),
            "camera SDK error 0x80000007"
        );
        assert_eq!(
            CameraError::InvalidDeviceIndex { index: 3, count: 2 }.to_string(),
            "device index 3 out of range (2 devices)"
        );
    }
}
