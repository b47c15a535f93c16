//! Backend for the Hikvision MVS SDK (`libMvCameraControl`).
//!
//! Only USB3 Vision cameras are enumerated. Structures mirror
//! `CameraParams.h`; where only a prefix of a vendor structure is read,
//! the remainder is covered by padding larger than the vendor definition.

use crate::sdk::{CameraSdk, NativeResult, SDK_OK};
use crate::types::{
    AccessMode, EnumValues, FloatParamInfo, FrameInfo, IntParamInfo, PixelFormat, StringParamInfo,
};
use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};

const MV_USB_DEVICE: c_uint = 0x0000_0004;
const MV_MAX_DEVICE_NUM: usize = 256;
const MV_MAX_SYMBOLIC_NUM: usize = 64;
const MV_MAX_SYMBOLIC_LEN: usize = 64;

/// `MV_E_PARAMETER`, reported for names the SDK could never accept.
pub const MV_E_PARAMETER: i32 = 0x8000_0004_u32 as i32;

const PIXEL_RGB8_PACKED: c_uint = 0x0218_0014;
const PIXEL_BGR8_PACKED: c_uint = 0x0218_0015;

// MV_XML_AccessMode
const AM_WO: c_int = 2;
const AM_RO: c_int = 3;
const AM_RW: c_int = 4;

#[allow(dead_code)]
#[repr(C)]
struct DeviceInfoList {
    device_num: c_uint,
    device_info: [*mut c_void; MV_MAX_DEVICE_NUM],
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Default)]
struct IntValueEx {
    current: i64,
    max: i64,
    min: i64,
    inc: i64,
    reserved: [c_uint; 16],
}

#[allow(dead_code)]
#[repr(C)]
#[derive(Default)]
struct FloatValue {
    current: f32,
    max: f32,
    min: f32,
    reserved: [c_uint; 4],
}

#[allow(dead_code)]
#[repr(C)]
struct EnumValue {
    current: c_uint,
    supported_num: c_uint,
    supported: [c_uint; MV_MAX_SYMBOLIC_NUM],
    reserved: [c_uint; 4],
}

#[allow(dead_code)]
#[repr(C)]
struct EnumEntry {
    value: c_uint,
    symbolic: [u8; MV_MAX_SYMBOLIC_LEN],
    reserved: [c_uint; 4],
}

#[allow(dead_code)]
#[repr(C)]
struct StringValue {
    current: [u8; 256],
    max_length: i64,
    reserved: [c_uint; 2],
}

/// Leading fields of `MV_FRAME_OUT_INFO_EX`.
#[allow(dead_code)]
#[repr(C)]
struct FrameOutInfo {
    width: u16,
    height: u16,
    pixel_type: c_uint,
    frame_num: c_uint,
    dev_timestamp_high: c_uint,
    dev_timestamp_low: c_uint,
    reserved0: c_uint,
    host_timestamp: i64,
    frame_len: c_uint,
    tail: [u8; 1024],
}

#[allow(dead_code)]
#[repr(C)]
struct FrameOut {
    buf_addr: *mut u8,
    info: FrameOutInfo,
    reserved: [c_uint; 16],
}

#[allow(dead_code)]
#[repr(C)]
struct PixelConvertParamEx {
    width: c_uint,
    height: c_uint,
    src_pixel_type: c_uint,
    src_data: *mut u8,
    src_data_len: c_uint,
    dst_pixel_type: c_uint,
    dst_buffer: *mut u8,
    dst_len: c_uint,
    dst_buffer_size: c_uint,
    reserved: [c_uint; 4],
}

/// Zero-initialized vendor structure, as the SDK expects on input.
fn zeroed<T>() -> T {
    // SAFETY: only used for the plain-data repr(C) structures above, for
    // which all-zero bytes are a valid value.
    unsafe { std::mem::zeroed() }
}

// Linked by build.rs against the MVS runtime.
extern "C" {
    fn MV_CC_Initialize() -> c_int;
    fn MV_CC_Finalize() -> c_int;
    fn MV_CC_EnumDevices(layer_type: c_uint, list: *mut DeviceInfoList) -> c_int;
    fn MV_CC_CreateHandle(handle: *mut *mut c_void, device_info: *const c_void) -> c_int;
    fn MV_CC_OpenDevice(handle: *mut c_void, access_mode: c_uint, switchover_key: u16) -> c_int;
    fn MV_CC_CloseDevice(handle: *mut c_void) -> c_int;
    fn MV_CC_DestroyHandle(handle: *mut c_void) -> c_int;
    fn MV_CC_SetImageNodeNum(handle: *mut c_void, num: c_uint) -> c_int;
    fn MV_CC_StartGrabbing(handle: *mut c_void) -> c_int;

    fn MV_CC_GetIntValueEx(handle: *mut c_void, key: *const c_char, value: *mut IntValueEx) -> c_int;
    fn MV_CC_SetIntValueEx(handle: *mut c_void, key: *const c_char, value: i64) -> c_int;
    fn MV_CC_GetFloatValue(handle: *mut c_void, key: *const c_char, value: *mut FloatValue) -> c_int;
    fn MV_CC_SetFloatValue(handle: *mut c_void, key: *const c_char, value: f32) -> c_int;
    fn MV_CC_GetBoolValue(handle: *mut c_void, key: *const c_char, value: *mut bool) -> c_int;
    fn MV_CC_SetBoolValue(handle: *mut c_void, key: *const c_char, value: bool) -> c_int;
    fn MV_CC_GetStringValue(handle: *mut c_void, key: *const c_char, value: *mut StringValue) -> c_int;
    fn MV_CC_SetStringValue(handle: *mut c_void, key: *const c_char, value: *const c_char) -> c_int;
    fn MV_CC_GetEnumValue(handle: *mut c_void, key: *const c_char, value: *mut EnumValue) -> c_int;
    fn MV_CC_GetEnumEntrySymbolic(handle: *mut c_void, key: *const c_char, entry: *mut EnumEntry) -> c_int;
    fn MV_CC_SetEnumValueByString(handle: *mut c_void, key: *const c_char, value: *const c_char) -> c_int;
    fn MV_XML_GetNodeAccessMode(handle: *mut c_void, name: *const c_char, mode: *mut c_int) -> c_int;

    fn MV_CC_GetImageBuffer(handle: *mut c_void, frame: *mut FrameOut, msec: c_uint) -> c_int;
    fn MV_CC_FreeImageBuffer(handle: *mut c_void, frame: *mut FrameOut) -> c_int;
    fn MV_CC_ConvertPixelTypeEx(handle: *mut c_void, param: *mut PixelConvertParamEx) -> c_int;
}

/// Call an SDK function and turn its status into a [`NativeResult`].
macro_rules! mvcall {
    ($func:ident $(, $arg:expr)*) => {{
        // SAFETY: arguments are valid handles, NUL-terminated names, or
        // pointers to live structures of the declared layout.
        let code = unsafe { $func($($arg),*) };
        if code == SDK_OK { Ok(()) } else { Err(code) }
    }};
}

/// Device descriptor owned by the SDK, valid until the next enumeration.
#[derive(Debug)]
pub struct DeviceInfo(*mut c_void);

// SAFETY: the descriptor is read-only SDK memory; it is only passed back to
// the SDK, which synchronizes internally.
unsafe impl Send for DeviceInfo {}

/// Handle returned by `MV_CC_CreateHandle`.
#[derive(Debug)]
pub struct HikHandle(*mut c_void);

// SAFETY: MVS handles may be used from any thread; `DeviceSession` owns each
// handle exclusively.
unsafe impl Send for HikHandle {}

/// Image buffer lent by `MV_CC_GetImageBuffer`.
pub struct HikFrame(Box<FrameOut>);

fn key(name: &str) -> NativeResult<CString> {
    CString::new(name).map_err(|_| MV_E_PARAMETER)
}

fn symbol_from(bytes: &[u8]) -> String {
    CStr::from_bytes_until_nul(bytes)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn access_from(mode: c_int) -> AccessMode {
    match mode {
        AM_RW => AccessMode::READ_WRITE,
        AM_RO => AccessMode::READ,
        AM_WO => AccessMode::WRITE,
        _ => AccessMode::empty(),
    }
}

fn pixel_type(format: PixelFormat) -> c_uint {
    match format {
        PixelFormat::Bgr8 => PIXEL_BGR8_PACKED,
        PixelFormat::Rgb8 => PIXEL_RGB8_PACKED,
    }
}

/// The MVS SDK. All state lives inside the vendor library.
#[derive(Debug, Default, Clone, Copy)]
pub struct HikSdk;

impl CameraSdk for HikSdk {
    type Device = DeviceInfo;
    type Handle = HikHandle;
    type Frame = HikFrame;

    fn initialize(&self) -> NativeResult<()> {
        mvcall!(MV_CC_Initialize)
    }

    fn finalize(&self) -> NativeResult<()> {
        mvcall!(MV_CC_Finalize)
    }

    fn enumerate_usb(&self) -> NativeResult<Vec<DeviceInfo>> {
        let mut list: Box<DeviceInfoList> = Box::new(zeroed());
        mvcall!(MV_CC_EnumDevices, MV_USB_DEVICE, &mut *list)?;
        let count = (list.device_num as usize).min(MV_MAX_DEVICE_NUM);
        log::debug!("MVS reports {} USB device(s)", count);
        Ok(list.device_info[..count].iter().map(|p| DeviceInfo(*p)).collect())
    }

    fn create_handle(&self, device: &DeviceInfo) -> NativeResult<HikHandle> {
        let mut handle: *mut c_void = std::ptr::null_mut();
        mvcall!(MV_CC_CreateHandle, &mut handle, device.0)?;
        Ok(HikHandle(handle))
    }

    fn open_device(&self, handle: &HikHandle) -> NativeResult<()> {
        mvcall!(MV_CC_OpenDevice, handle.0, 0, 0)
    }

    fn close_device(&self, handle: &HikHandle) -> NativeResult<()> {
        mvcall!(MV_CC_CloseDevice, handle.0)
    }

    fn destroy_handle(&self, handle: HikHandle) -> NativeResult<()> {
        mvcall!(MV_CC_DestroyHandle, handle.0)
    }

    fn set_buffer_depth(&self, handle: &HikHandle, depth: u32) -> NativeResult<()> {
        mvcall!(MV_CC_SetImageNodeNum, handle.0, depth)
    }

    fn start_streaming(&self, handle: &HikHandle) -> NativeResult<()> {
        mvcall!(MV_CC_StartGrabbing, handle.0)
    }

    fn get_int(&self, handle: &HikHandle, name: &str) -> NativeResult<IntParamInfo> {
        let key = key(name)?;
        let mut value = IntValueEx::default();
        mvcall!(MV_CC_GetIntValueEx, handle.0, key.as_ptr(), &mut value)?;
        Ok(IntParamInfo {
            current: value.current,
            min: value.min,
            max: value.max,
            inc: value.inc,
        })
    }

    fn get_float(&self, handle: &HikHandle, name: &str) -> NativeResult<FloatParamInfo> {
        let key = key(name)?;
        let mut value = FloatValue::default();
        mvcall!(MV_CC_GetFloatValue, handle.0, key.as_ptr(), &mut value)?;
        Ok(FloatParamInfo {
            current: value.current,
            min: value.min,
            max: value.max,
        })
    }

    fn get_bool(&self, handle: &HikHandle, name: &str) -> NativeResult<bool> {
        let key = key(name)?;
        let mut value = false;
        mvcall!(MV_CC_GetBoolValue, handle.0, key.as_ptr(), &mut value)?;
        Ok(value)
    }

    fn get_string(&self, handle: &HikHandle, name: &str) -> NativeResult<StringParamInfo> {
        let key = key(name)?;
        let mut value: StringValue = zeroed();
        mvcall!(MV_CC_GetStringValue, handle.0, key.as_ptr(), &mut value)?;
        Ok(StringParamInfo {
            current: symbol_from(&value.current),
            max_length: value.max_length,
        })
    }

    fn get_enum(&self, handle: &HikHandle, name: &str) -> NativeResult<EnumValues> {
        let key = key(name)?;
        let mut value: EnumValue = zeroed();
        mvcall!(MV_CC_GetEnumValue, handle.0, key.as_ptr(), &mut value)?;
        let count = (value.supported_num as usize).min(MV_MAX_SYMBOLIC_NUM);
        Ok(EnumValues {
            current: value.current,
            supported: value.supported[..count].to_vec(),
        })
    }

    fn enum_symbol(&self, handle: &HikHandle, name: &str, value: u32) -> NativeResult<String> {
        let key = key(name)?;
        let mut entry: EnumEntry = zeroed();
        entry.value = value;
        mvcall!(MV_CC_GetEnumEntrySymbolic, handle.0, key.as_ptr(), &mut entry)?;
        Ok(symbol_from(&entry.symbolic))
    }

    fn access_mode(&self, handle: &HikHandle, name: &str) -> NativeResult<AccessMode> {
        let key = key(name)?;
        let mut mode: c_int = 0;
        mvcall!(MV_XML_GetNodeAccessMode, handle.0, key.as_ptr(), &mut mode)?;
        Ok(access_from(mode))
    }

    fn set_int(&self, handle: &HikHandle, name: &str, value: i64) -> NativeResult<()> {
        let key = key(name)?;
        mvcall!(MV_CC_SetIntValueEx, handle.0, key.as_ptr(), value)
    }

    fn set_float(&self, handle: &HikHandle, name: &str, value: f32) -> NativeResult<()> {
        let key = key(name)?;
        mvcall!(MV_CC_SetFloatValue, handle.0, key.as_ptr(), value)
    }

    fn set_bool(&self, handle: &HikHandle, name: &str, value: bool) -> NativeResult<()> {
        let key = key(name)?;
        mvcall!(MV_CC_SetBoolValue, handle.0, key.as_ptr(), value)
    }

    fn set_string(&self, handle: &HikHandle, name: &str, value: &str) -> NativeResult<()> {
        let key = key(name)?;
        let value = CString::new(value).map_err(|_| MV_E_PARAMETER)?;
        mvcall!(MV_CC_SetStringValue, handle.0, key.as_ptr(), value.as_ptr())
    }

    fn set_enum_symbol(&self, handle: &HikHandle, name: &str, symbol: &str) -> NativeResult<()> {
        let key = key(name)?;
        let symbol = CString::new(symbol).map_err(|_| MV_E_PARAMETER)?;
        mvcall!(MV_CC_SetEnumValueByString, handle.0, key.as_ptr(), symbol.as_ptr())
    }

    fn acquire_frame(&self, handle: &HikHandle, timeout_ms: u32) -> NativeResult<HikFrame> {
        let mut frame: Box<FrameOut> = Box::new(zeroed());
        mvcall!(MV_CC_GetImageBuffer, handle.0, &mut *frame, timeout_ms)?;
        Ok(HikFrame(frame))
    }

    fn frame_info(&self, frame: &HikFrame) -> FrameInfo {
        let info = &frame.0.info;
        FrameInfo {
            width: u32::from(info.width),
            height: u32::from(info.height),
            pixel_type: info.pixel_type,
            len: info.frame_len,
        }
    }

    fn convert_frame(
        &self,
        handle: &HikHandle,
        frame: &HikFrame,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> NativeResult<()> {
        let info = &frame.0.info;
        let mut param = PixelConvertParamEx {
            width: c_uint::from(info.width),
            height: c_uint::from(info.height),
            src_pixel_type: info.pixel_type,
            src_data: frame.0.buf_addr,
            src_data_len: info.frame_len,
            dst_pixel_type: pixel_type(format),
            dst_buffer: dst.as_mut_ptr(),
            dst_len: 0,
            dst_buffer_size: c_uint::try_from(dst.len()).unwrap_or(c_uint::MAX),
            reserved: [0; 4],
        };
        mvcall!(MV_CC_ConvertPixelTypeEx, handle.0, &mut param)
    }

    fn release_frame(&self, handle: &HikHandle, mut frame: HikFrame) -> NativeResult<()> {
        mvcall!(MV_CC_FreeImageBuffer, handle.0, &mut *frame.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_layouts_match_vendor_headers() {
        assert_eq!(size_of::<IntValueEx>(), 96);
        assert_eq!(size_of::<FloatValue>(), 28);
        assert_eq!(size_of::<EnumValue>(), 4 * (2 + 64 + 4));
        assert_eq!(size_of::<EnumEntry>(), 4 + 64 + 16);
        assert_eq!(offset_of!(StringValue, max_length), 256);
        assert_eq!(offset_of!(FrameOutInfo, host_timestamp), 24);
        assert_eq!(offset_of!(FrameOutInfo, frame_len), 32);
        assert_eq!(offset_of!(DeviceInfoList, device_info), size_of::<usize>());
    }

    #[test]
    fn test_access_mode_mapping() {
        assert!(access_from(AM_RW).is_read_write());
        assert_eq!(access_from(AM_RO), AccessMode::READ);
        assert_eq!(access_from(AM_WO), AccessMode::WRITE);
        assert!(access_from(0).is_empty());
    }

    #[test]
    fn test_symbol_stops_at_nul() {
        let mut raw = [0u8; 8];
        raw[..3].copy_from_slice(b"Off");
        assert_eq!(symbol_from(&raw), "Off");
        assert_eq!(symbol_from(b"Full"), "Full");
    }

    #[test]
    fn test_key_rejects_interior_nul() {
        assert_eq!(key("Wid\0th").unwrap_err(), MV_E_PARAMETER);
        assert!(key("Width").is_ok());
    }
}
