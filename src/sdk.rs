//! Capability set the facade needs from a vendor camera SDK.

use crate::types::{
    AccessMode, EnumValues, FloatParamInfo, FrameInfo, IntParamInfo, PixelFormat, StringParamInfo,
};

/// Vendor status for success.
pub const SDK_OK: i32 = 0;

/// Result of one SDK call; the error is the vendor status code unchanged.
pub type NativeResult<T> = std::result::Result<T, i32>;

/// Vendor camera SDK.
///
/// All methods take `&self`: sessions share the SDK through an `Arc` and
/// implementations must use internal mutability. Nothing here checks
/// device indices or initialization state; that is the facade's job.
pub trait CameraSdk: Send + Sync {
    /// Enumerated device descriptor.
    type Device: Send;
    /// Handle of a created device session.
    type Handle: Send;
    /// An acquired image buffer owned by the SDK until released.
    type Frame;

    fn initialize(&self) -> NativeResult<()>;
    fn finalize(&self) -> NativeResult<()>;

    /// List the USB cameras currently attached.
    fn enumerate_usb(&self) -> NativeResult<Vec<Self::Device>>;

    fn create_handle(&self, device: &Self::Device) -> NativeResult<Self::Handle>;
    fn open_device(&self, handle: &Self::Handle) -> NativeResult<()>;
    fn close_device(&self, handle: &Self::Handle) -> NativeResult<()>;
    fn destroy_handle(&self, handle: Self::Handle) -> NativeResult<()>;

    fn set_buffer_depth(&self, handle: &Self::Handle, depth: u32) -> NativeResult<()>;
    fn start_streaming(&self, handle: &Self::Handle) -> NativeResult<()>;

    fn get_int(&self, handle: &Self::Handle, name: &str) -> NativeResult<IntParamInfo>;
    fn get_float(&self, handle: &Self::Handle, name: &str) -> NativeResult<FloatParamInfo>;
    fn get_bool(&self, handle: &Self::Handle, name: &str) -> NativeResult<bool>;
    fn get_string(&self, handle: &Self::Handle, name: &str) -> NativeResult<StringParamInfo>;
    fn get_enum(&self, handle: &Self::Handle, name: &str) -> NativeResult<EnumValues>;
    /// Symbolic name of one numeric enumeration value.
    fn enum_symbol(&self, handle: &Self::Handle, name: &str, value: u32) -> NativeResult<String>;
    fn access_mode(&self, handle: &Self::Handle, name: &str) -> NativeResult<AccessMode>;

    fn set_int(&self, handle: &Self::Handle, name: &str, value: i64) -> NativeResult<()>;
    fn set_float(&self, handle: &Self::Handle, name: &str, value: f32) -> NativeResult<()>;
    fn set_bool(&self, handle: &Self::Handle, name: &str, value: bool) -> NativeResult<()>;
    fn set_string(&self, handle: &Self::Handle, name: &str, value: &str) -> NativeResult<()>;
    fn set_enum_symbol(&self, handle: &Self::Handle, name: &str, symbol: &str) -> NativeResult<()>;

    /// Wait up to `timeout_ms` for the next image buffer.
    fn acquire_frame(&self, handle: &Self::Handle, timeout_ms: u32) -> NativeResult<Self::Frame>;
    fn frame_info(&self, frame: &Self::Frame) -> FrameInfo;
    /// Convert `frame` into `format`, writing at most `dst.len()` bytes.
    fn convert_frame(
        &self,
        handle: &Self::Handle,
        frame: &Self::Frame,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> NativeResult<()>;
    fn release_frame(&self, handle: &Self::Handle, frame: Self::Frame) -> NativeResult<()>;
}
