//! C FFI layer for mvcam.
//!
//! Every exported call returns an [`ApiOutcome`]. Strings handed to C
//! (`CStringParamInfo::current`, every string in a `CEnumStringList`) are
//! owned by the caller and must be released with `mvcam_free_string` /
//! `mvcam_free_enum_list`.
//! The generated C header is written to `include/mvcam.h` by cbindgen.

use crate::cameras::Cameras;
use crate::error::ApiOutcome;
use crate::sdk::CameraSdk;
use crate::types::{EnumParamInfo, FloatParamInfo, FrameInfo, IntParamInfo, StringParamInfo};
use crate::{CameraError, Result};
use std::ffi::{c_char, CStr, CString};
use std::sync::{Mutex, MutexGuard};

/// String parameter in C-compatible layout.
#[repr(C)]
#[derive(Debug)]
pub struct CStringParamInfo {
    /// Caller-owned, null-terminated. Release with `mvcam_free_string`.
    pub current: *mut c_char,
    pub max_length: i64,
}

/// Enumeration parameter in C-compatible layout.
#[repr(C)]
#[derive(Debug)]
pub struct CEnumStringList {
    /// Symbol of the current value.
    pub current: *mut c_char,
    /// `count` symbols, in the device's order. Null when `count` is 0.
    pub supported: *mut *mut c_char,
    pub count: u32,
}

impl CEnumStringList {
    pub const fn empty() -> Self {
        CEnumStringList {
            current: std::ptr::null_mut(),
            supported: std::ptr::null_mut(),
            count: 0,
        }
    }
}

/// Allocator for strings handed to C.
pub trait CStrAlloc {
    /// Copy `s` (up to its first NUL) into a new C string; `None` when
    /// out of memory.
    fn alloc(&mut self, s: &str) -> Option<*mut c_char>;

    /// Release a string returned by `alloc`.
    ///
    /// # Safety
    /// `ptr` must come from `alloc` on the same allocator and not have been
    /// freed already.
    unsafe fn free(&mut self, ptr: *mut c_char);
}

/// Heap allocator backing the exported functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapCStr;

impl CStrAlloc for HeapCStr {
    fn alloc(&mut self, s: &str) -> Option<*mut c_char> {
        let text = &s[..s.find('\0').unwrap_or(s.len())];
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(text.len() + 1).ok()?;
        bytes.extend_from_slice(text.as_bytes());
        CString::new(bytes).ok().map(CString::into_raw)
    }

    unsafe fn free(&mut self, ptr: *mut c_char) {
        if !ptr.is_null() {
            drop(CString::from_raw(ptr));
        }
    }
}

/// Strings allocated so far; freed on drop unless handed out.
struct Pending<'a, A: CStrAlloc> {
    alloc: &'a mut A,
    current: Option<*mut c_char>,
    supported: Vec<*mut c_char>,
}

impl<A: CStrAlloc> Pending<'_, A> {
    fn push(&mut self, s: &str) -> Result<*mut c_char> {
        self.alloc.alloc(s).ok_or(CameraError::OutOfMemory)
    }
}

impl<A: CStrAlloc> Drop for Pending<'_, A> {
    fn drop(&mut self) {
        for ptr in self.current.take().into_iter().chain(self.supported.drain(..)) {
            // SAFETY: every pointer here came from `self.alloc` and was never
            // handed out.
            unsafe { self.alloc.free(ptr) };
        }
    }
}

/// Copy a string parameter into C-owned memory.
pub fn string_param_to_c<A: CStrAlloc>(
    info: &StringParamInfo,
    alloc: &mut A,
) -> Result<CStringParamInfo> {
    let current = alloc.alloc(&info.current).ok_or(CameraError::OutOfMemory)?;
    Ok(CStringParamInfo {
        current,
        max_length: info.max_length,
    })
}

/// Copy an enumeration into C-owned memory: the current symbol, then one
/// string per supported symbol. If any allocation fails, everything
/// allocated so far is freed and `OutOfMemory` is returned.
pub fn enum_list_to_c<A: CStrAlloc>(info: &EnumParamInfo, alloc: &mut A) -> Result<CEnumStringList> {
    let count = u32::try_from(info.supported.len())
        .map_err(|_| CameraError::InvalidArgument("too many enumeration entries".into()))?;

    let mut pending = Pending {
        alloc,
        current: None,
        supported: Vec::new(),
    };
    pending
        .supported
        .try_reserve_exact(info.supported.len())
        .map_err(|_| CameraError::OutOfMemory)?;

    let current = pending.push(&info.current)?;
    pending.current = Some(current);
    for symbol in &info.supported {
        let ptr = pending.push(symbol)?;
        pending.supported.push(ptr);
    }

    let current = pending.current.take().unwrap_or(std::ptr::null_mut());
    let supported = std::mem::take(&mut pending.supported);
    let supported = if supported.is_empty() {
        std::ptr::null_mut()
    } else {
        Box::into_raw(supported.into_boxed_slice()) as *mut *mut c_char
    };
    Ok(CEnumStringList {
        current,
        supported,
        count,
    })
}

/// Release everything in `list` and reset it to empty.
///
/// # Safety
/// `list` must have been filled by [`enum_list_to_c`] with the same
/// allocator, or be empty.
pub unsafe fn free_enum_list<A: CStrAlloc>(list: &mut CEnumStringList, alloc: &mut A) {
    alloc.free(list.current);
    if !list.supported.is_null() {
        let slice = std::ptr::slice_from_raw_parts_mut(list.supported, list.count as usize);
        let symbols: Box<[*mut c_char]> = Box::from_raw(slice);
        for ptr in symbols.iter() {
            alloc.free(*ptr);
        }
    }
    *list = CEnumStringList::empty();
}

/// Read a parameter name or value passed from C.
///
/// # Safety
/// `ptr` must be null or point to a null-terminated string.
unsafe fn c_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(CameraError::InvalidArgument("null string".into()));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| CameraError::InvalidArgument("string is not UTF-8".into()))
}

/// Process-wide camera instance behind the exported functions.
///
/// Every call locks the slot, so enumeration can never race an indexed
/// call from another thread.
pub struct CameraSlot<S: CameraSdk> {
    inner: Mutex<Option<Cameras<S>>>,
}

impl<S: CameraSdk> Default for CameraSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CameraSdk> CameraSlot<S> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Cameras<S>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with<T>(&self, f: impl FnOnce(&mut Cameras<S>) -> Result<T>) -> Result<T> {
        match self.lock().as_mut() {
            Some(cams) => f(cams),
            None => Err(CameraError::NotInitialized),
        }
    }

    /// Initialize, creating the instance with `make` on first use.
    pub fn init(&self, make: impl FnOnce() -> Cameras<S>) -> ApiOutcome {
        let mut slot = self.lock();
        let cams = slot.get_or_insert_with(make);
        (&cams.initialize()).into()
    }

    pub fn finalize(&self) -> ApiOutcome {
        (&self.with(|cams| cams.finalize())).into()
    }

    /// # Safety
    /// `device_num` must be null or valid for writes.
    pub unsafe fn enumerate(&self, device_num: *mut u32) -> ApiOutcome {
        let result = self.with(|cams| cams.enumerate_devices()).map(|count| {
            if !device_num.is_null() {
                device_num.write(count as u32);
            }
        });
        (&result).into()
    }

    /// Look up `name`, run `get`, and write its result to `out`.
    ///
    /// # Safety
    /// `name` must be null or a null-terminated string; `out` must be null
    /// or valid for writes.
    unsafe fn get_into<T>(
        &self,
        cam_idx: u32,
        name: *const c_char,
        out: *mut T,
        get: impl FnOnce(&Cameras<S>, usize, &str) -> Result<T>,
    ) -> ApiOutcome {
        let result = self.with(|cams| {
            // The index is checked before the name is even looked at.
            cams.device(cam_idx as usize)?;
            if out.is_null() {
                return Err(CameraError::InvalidArgument("null output pointer".into()));
            }
            let name = c_str(name)?;
            let value = get(&*cams, cam_idx as usize, name)?;
            out.write(value);
            Ok(())
        });
        (&result).into()
    }

    /// # Safety
    /// See [`CameraSlot::get_into`].
    pub unsafe fn get_int(&self, cam_idx: u32, name: *const c_char, out: *mut IntParamInfo) -> ApiOutcome {
        self.get_into(cam_idx, name, out, |c, i, n| c.get_int(i, n))
    }

    /// # Safety
    /// See [`CameraSlot::get_into`].
    pub unsafe fn get_float(&self, cam_idx: u32, name: *const c_char, out: *mut FloatParamInfo) -> ApiOutcome {
        self.get_into(cam_idx, name, out, |c, i, n| c.get_float(i, n))
    }

    /// # Safety
    /// See [`CameraSlot::get_into`].
    pub unsafe fn get_bool(&self, cam_idx: u32, name: *const c_char, out: *mut bool) -> ApiOutcome {
        self.get_into(cam_idx, name, out, |c, i, n| c.get_bool(i, n))
    }

    /// # Safety
    /// See [`CameraSlot::get_into`].
    pub unsafe fn get_string(
        &self,
        cam_idx: u32,
        name: *const c_char,
        out: *mut CStringParamInfo,
    ) -> ApiOutcome {
        self.get_into(cam_idx, name, out, |c, i, n| {
            string_param_to_c(&c.get_string(i, n)?, &mut HeapCStr)
        })
    }

    /// # Safety
    /// See [`CameraSlot::get_into`].
    pub unsafe fn get_enum(
        &self,
        cam_idx: u32,
        name: *const c_char,
        out: *mut CEnumStringList,
    ) -> ApiOutcome {
        self.get_into(cam_idx, name, out, |c, i, n| {
            enum_list_to_c(&c.get_enum(i, n)?, &mut HeapCStr)
        })
    }

    /// Validate the index, convert `name`, and run `set`.
    ///
    /// # Safety
    /// `name` must be null or a null-terminated string.
    pub unsafe fn set_with(
        &self,
        cam_idx: u32,
        name: *const c_char,
        set: impl FnOnce(&Cameras<S>, usize, &str) -> Result<()>,
    ) -> ApiOutcome {
        let result = self.with(|cams| {
            cams.device(cam_idx as usize)?;
            let name = c_str(name)?;
            set(&*cams, cam_idx as usize, name)
        });
        (&result).into()
    }

    /// Grab one frame into `mem[..buffer_size]`; `info` may be null.
    ///
    /// # Safety
    /// `mem` must be valid for `buffer_size` bytes of writes; `info` must be
    /// null or valid for writes.
    pub unsafe fn get_frame(
        &self,
        cam_idx: u32,
        mem: *mut u8,
        buffer_size: u32,
        info: *mut FrameInfo,
    ) -> ApiOutcome {
        let result = self.with(|cams| {
            cams.device(cam_idx as usize)?;
            if mem.is_null() {
                return Err(CameraError::InvalidArgument("null frame buffer".into()));
            }
            let dst = std::slice::from_raw_parts_mut(mem, buffer_size as usize);
            let frame = cams.acquire_frame(cam_idx as usize, dst)?;
            if !info.is_null() {
                info.write(frame);
            }
            Ok(())
        });
        (&result).into()
    }
}

/// Release a string returned through `CStringParamInfo::current`.
///
/// # Safety
/// `s` must be null or a string returned by this library, not yet freed.
#[no_mangle]
pub unsafe extern "C" fn mvcam_free_string(s: *mut c_char) {
    HeapCStr.free(s);
}

/// Release every string in an enumeration list and reset it to empty.
///
/// # Safety
/// `list` must be null or point to a list filled by `mvcam_get_enum_param`.
#[no_mangle]
pub unsafe extern "C" fn mvcam_free_enum_list(list: *mut CEnumStringList) {
    if let Some(list) = list.as_mut() {
        free_enum_list(list, &mut HeapCStr);
    }
}

#[cfg(feature = "hikvision")]
pub use self::exports::*;

#[cfg(feature = "hikvision")]
mod exports {
    use super::*;
    use crate::hikvision::HikSdk;
    use crate::Config;

    static CAMERAS: CameraSlot<HikSdk> = CameraSlot::new();

    /// Initialize the camera API. Only one initialization per process is
    /// accepted; a second call reports AlreadyInitialized.
    #[no_mangle]
    pub extern "C" fn mvcam_init() -> ApiOutcome {
        CAMERAS.init(|| Cameras::with_config(HikSdk, Config::from_env()))
    }

    /// Release every camera and finalize the SDK.
    #[no_mangle]
    pub extern "C" fn mvcam_final() -> ApiOutcome {
        CAMERAS.finalize()
    }

    /// Enumerate USB cameras, opening and streaming each one. Previously
    /// returned indices become invalid.
    ///
    /// # Safety
    /// `device_num` must be null or valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_enumerate_devices(device_num: *mut u32) -> ApiOutcome {
        CAMERAS.enumerate(device_num)
    }

    /// # Safety
    /// `param_name` must be a null-terminated string; `out_info` valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_int_param(
        cam_idx: u32,
        param_name: *const c_char,
        out_info: *mut IntParamInfo,
    ) -> ApiOutcome {
        CAMERAS.get_int(cam_idx, param_name, out_info)
    }

    /// # Safety
    /// `param_name` must be a null-terminated string; `out_info` valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_float_param(
        cam_idx: u32,
        param_name: *const c_char,
        out_info: *mut FloatParamInfo,
    ) -> ApiOutcome {
        CAMERAS.get_float(cam_idx, param_name, out_info)
    }

    /// # Safety
    /// `param_name` must be a null-terminated string; `out_value` valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_bool_param(
        cam_idx: u32,
        param_name: *const c_char,
        out_value: *mut bool,
    ) -> ApiOutcome {
        CAMERAS.get_bool(cam_idx, param_name, out_value)
    }

    /// The string in `out_info` must be released with `mvcam_free_string`.
    ///
    /// # Safety
    /// `param_name` must be a null-terminated string; `out_info` valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_string_param(
        cam_idx: u32,
        param_name: *const c_char,
        out_info: *mut CStringParamInfo,
    ) -> ApiOutcome {
        CAMERAS.get_string(cam_idx, param_name, out_info)
    }

    /// `out_list` must be released with `mvcam_free_enum_list`.
    ///
    /// # Safety
    /// `param_name` must be a null-terminated string; `out_list` valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_enum_param(
        cam_idx: u32,
        param_name: *const c_char,
        out_list: *mut CEnumStringList,
    ) -> ApiOutcome {
        CAMERAS.get_enum(cam_idx, param_name, out_list)
    }

    /// # Safety
    /// `param_name` must be a null-terminated string.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_set_int_param(
        cam_idx: u32,
        param_name: *const c_char,
        value: i64,
    ) -> ApiOutcome {
        CAMERAS.set_with(cam_idx, param_name, |c, i, n| c.set_int(i, n, value))
    }

    /// # Safety
    /// `param_name` must be a null-terminated string.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_set_float_param(
        cam_idx: u32,
        param_name: *const c_char,
        value: f32,
    ) -> ApiOutcome {
        CAMERAS.set_with(cam_idx, param_name, |c, i, n| c.set_float(i, n, value))
    }

    /// # Safety
    /// `param_name` must be a null-terminated string.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_set_bool_param(
        cam_idx: u32,
        param_name: *const c_char,
        value: bool,
    ) -> ApiOutcome {
        CAMERAS.set_with(cam_idx, param_name, |c, i, n| c.set_bool(i, n, value))
    }

    /// # Safety
    /// `param_name` and `value` must be null-terminated strings.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_set_string_param(
        cam_idx: u32,
        param_name: *const c_char,
        value: *const c_char,
    ) -> ApiOutcome {
        CAMERAS.set_with(cam_idx, param_name, |c, i, n| c.set_string(i, n, c_str(value)?))
    }

    /// Select an enumeration entry by its symbol.
    ///
    /// # Safety
    /// `param_name` and `value` must be null-terminated strings.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_set_enum_param(
        cam_idx: u32,
        param_name: *const c_char,
        value: *const c_char,
    ) -> ApiOutcome {
        CAMERAS.set_with(cam_idx, param_name, |c, i, n| c.set_enum(i, n, c_str(value)?))
    }

    /// Grab one frame, converted to the configured packed 3-channel format.
    /// `info` may be null.
    ///
    /// # Safety
    /// `mem` must be valid for `buffer_size` bytes; `info` null or valid for writes.
    #[no_mangle]
    pub unsafe extern "C" fn mvcam_get_frame(
        cam_idx: u32,
        mem: *mut u8,
        buffer_size: u32,
        info: *mut FrameInfo,
    ) -> ApiOutcome {
        CAMERAS.get_frame(cam_idx, mem, buffer_size, info)
    }
}
