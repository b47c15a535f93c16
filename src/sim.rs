//! In-memory camera SDK for tests and for running without hardware.
//!
//! `SimSdk` keeps a list of attached devices with their parameter nodes,
//! journals every call it receives, and can be told to fail any call for
//! any device with a chosen vendor code.

use crate::error::SDK_NO_DATA;
use crate::sdk::{CameraSdk, NativeResult};
use crate::types::{
    AccessMode, EnumValues, FloatParamInfo, FrameInfo, IntParamInfo, PixelFormat, StringParamInfo,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

// -- Vendor-style status codes used by the simulator --
pub const E_HANDLE: i32 = 0x8000_0000_u32 as i32;
pub const E_CALL_ORDER: i32 = 0x8000_0003_u32 as i32;
pub const E_PARAMETER: i32 = 0x8000_0004_u32 as i32;
pub const E_NODATA: i32 = SDK_NO_DATA;
pub const E_NOT_IMPLEMENTED: i32 = 0x8000_0100_u32 as i32;
pub const E_OUT_OF_RANGE: i32 = 0x8000_0102_u32 as i32;
pub const E_ACCESS: i32 = 0x8000_0106_u32 as i32;

/// Source pixel type of simulated frames (GigE Vision Mono8).
pub const PIXEL_MONO8: u32 = 0x0108_0001;

/// SDK operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Initialize,
    Finalize,
    Enumerate,
    CreateHandle,
    OpenDevice,
    CloseDevice,
    DestroyHandle,
    SetBufferDepth,
    StartStreaming,
    GetParam,
    EnumSymbol,
    AccessMode,
    SetParam,
    AcquireFrame,
    ConvertFrame,
    ReleaseFrame,
}

/// One journaled SDK call. `handle` is the simulator's handle id.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    Finalize,
    Enumerate,
    CreateHandle { device: usize },
    OpenDevice { device: usize, handle: u64 },
    CloseDevice { device: usize, handle: u64 },
    DestroyHandle { device: usize, handle: u64 },
    SetBufferDepth { device: usize, depth: u32 },
    StartStreaming { device: usize },
    GetParam { device: usize, name: String },
    EnumSymbol { device: usize, name: String, value: u32 },
    AccessMode { device: usize, name: String },
    SetParam { device: usize, name: String },
    AcquireFrame { device: usize, timeout_ms: u32 },
    ConvertFrame { device: usize, format: PixelFormat },
    ReleaseFrame { device: usize },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Initialize => Op::Initialize,
            Call::Finalize => Op::Finalize,
            Call::Enumerate => Op::Enumerate,
            Call::CreateHandle { .. } => Op::CreateHandle,
            Call::OpenDevice { .. } => Op::OpenDevice,
            Call::CloseDevice { .. } => Op::CloseDevice,
            Call::DestroyHandle { .. } => Op::DestroyHandle,
            Call::SetBufferDepth { .. } => Op::SetBufferDepth,
            Call::StartStreaming { .. } => Op::StartStreaming,
            Call::GetParam { .. } => Op::GetParam,
            Call::EnumSymbol { .. } => Op::EnumSymbol,
            Call::AccessMode { .. } => Op::AccessMode,
            Call::SetParam { .. } => Op::SetParam,
            Call::AcquireFrame { .. } => Op::AcquireFrame,
            Call::ConvertFrame { .. } => Op::ConvertFrame,
            Call::ReleaseFrame { .. } => Op::ReleaseFrame,
        }
    }

    /// Device the call was addressed to, if any.
    pub fn device(&self) -> Option<usize> {
        match self {
            Call::Initialize | Call::Finalize | Call::Enumerate => None,
            Call::CreateHandle { device }
            | Call::OpenDevice { device, .. }
            | Call::CloseDevice { device, .. }
            | Call::DestroyHandle { device, .. }
            | Call::SetBufferDepth { device, .. }
            | Call::StartStreaming { device }
            | Call::GetParam { device, .. }
            | Call::EnumSymbol { device, .. }
            | Call::AccessMode { device, .. }
            | Call::SetParam { device, .. }
            | Call::AcquireFrame { device, .. }
            | Call::ConvertFrame { device, .. }
            | Call::ReleaseFrame { device } => Some(*device),
        }
    }
}

/// Value of a simulated parameter node.
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    Int(IntParamInfo),
    Float(FloatParamInfo),
    Bool(bool),
    Str(StringParamInfo),
    /// Current numeric value and the `(value, symbol)` entries in device order.
    Enum { current: u32, entries: Vec<(u32, String)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimParam {
    pub value: SimValue,
    pub access: AccessMode,
}

/// A simulated USB camera.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub serial: String,
    pub params: BTreeMap<String, SimParam>,
    /// Frames are produced only while streaming and when this is set.
    pub frame_size: Option<(u32, u32)>,
}

impl SimDevice {
    /// A Mono8 camera with a typical set of nodes.
    pub fn new(serial: &str) -> Self {
        let rw = AccessMode::READ_WRITE;
        let ro = AccessMode::READ;
        let mut dev = SimDevice {
            serial: serial.to_string(),
            params: BTreeMap::new(),
            frame_size: Some((64, 48)),
        };
        dev.insert("Width", SimValue::Int(IntParamInfo { current: 64, min: 8, max: 1280, inc: 8 }), rw);
        dev.insert("Height", SimValue::Int(IntParamInfo { current: 48, min: 8, max: 1024, inc: 2 }), rw);
        dev.insert(
            "PayloadSize",
            SimValue::Int(IntParamInfo { current: 64 * 48, min: 0, max: i64::from(u32::MAX) * 4, inc: 1 }),
            ro,
        );
        dev.insert(
            "ExposureTime",
            SimValue::Float(FloatParamInfo { current: 10_000.0, min: 15.0, max: 9_999_500.0 }),
            rw,
        );
        dev.insert("Gain", SimValue::Float(FloatParamInfo { current: 0.0, min: 0.0, max: 23.98 }), rw);
        dev.insert(
            "GainAuto",
            SimValue::Enum {
                current: 0,
                entries: vec![(0, "Off".into()), (1, "Once".into()), (2, "Continuous".into())],
            },
            rw,
        );
        dev.insert(
            "DeviceTemperature",
            SimValue::Float(FloatParamInfo { current: 41.5, min: -40.0, max: 120.0 }),
            ro,
        );
        dev.insert("ReverseX", SimValue::Bool(false), rw);
        dev.insert(
            "DeviceUserID",
            SimValue::Str(StringParamInfo { current: String::new(), max_length: 16 }),
            rw,
        );
        dev.insert(
            "DeviceSerialNumber",
            SimValue::Str(StringParamInfo { current: serial.to_string(), max_length: 64 }),
            ro,
        );
        dev.insert(
            "ExposureAuto",
            SimValue::Enum {
                current: 0,
                entries: vec![(0, "Off".into()), (1, "Once".into()), (2, "Continuous".into())],
            },
            rw,
        );
        dev.insert(
            "PixelFormat",
            SimValue::Enum {
                current: PIXEL_MONO8,
                entries: vec![
                    (PIXEL_MONO8, "Mono8".into()),
                    (0x0108_0009, "BayerRG8".into()),
                    (0x0218_0014, "RGB8Packed".into()),
                ],
            },
            ro,
        );
        dev
    }

    pub fn insert(&mut self, name: &str, value: SimValue, access: AccessMode) {
        self.params.insert(name.to_string(), SimParam { value, access });
    }
}

/// Handle issued by [`SimSdk`].
#[derive(Debug, PartialEq, Eq)]
pub struct SimHandle {
    pub device: usize,
    pub id: u64,
}

/// Frame issued by [`SimSdk`].
#[derive(Debug)]
pub struct SimFrame {
    info: FrameInfo,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct HandleState {
    device: usize,
    open: bool,
    streaming: bool,
}

#[derive(Debug, Default)]
struct SimState {
    initialized: bool,
    devices: Vec<SimDevice>,
    handles: BTreeMap<u64, HandleState>,
    next_handle: u64,
    frames_out: usize,
    frame_counter: u8,
    journal: Vec<Call>,
    failures: Vec<(Op, Option<usize>, i32)>,
}

impl SimState {
    fn record(&mut self, call: Call) -> NativeResult<()> {
        let op = call.op();
        let device = call.device();
        self.journal.push(call);
        let injected = self
            .failures
            .iter()
            .find(|(f_op, f_dev, _)| *f_op == op && (f_dev.is_none() || *f_dev == device))
            .map(|(_, _, code)| *code);
        match injected {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    fn live(&self, handle: &SimHandle) -> NativeResult<&HandleState> {
        self.handles.get(&handle.id).ok_or(E_HANDLE)
    }

    fn param(&self, handle: &SimHandle, name: &str) -> NativeResult<&SimParam> {
        let state = self.live(handle)?;
        if !state.open {
            return Err(E_CALL_ORDER);
        }
        self.devices
            .get(state.device)
            .and_then(|d| d.params.get(name))
            .ok_or(E_NOT_IMPLEMENTED)
    }

    fn param_mut(&mut self, handle: &SimHandle, name: &str) -> NativeResult<&mut SimParam> {
        let device = self.live(handle)?.device;
        let param = self
            .devices
            .get_mut(device)
            .and_then(|d| d.params.get_mut(name))
            .ok_or(E_NOT_IMPLEMENTED)?;
        if !param.access.contains(AccessMode::WRITE) {
            return Err(E_ACCESS);
        }
        Ok(param)
    }
}

/// Simulated SDK. See the module docs.
#[derive(Debug, Default)]
pub struct SimSdk {
    state: Mutex<SimState>,
}

impl SimSdk {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        SimSdk {
            state: Mutex::new(SimState {
                devices,
                next_handle: 1,
                ..SimState::default()
            }),
        }
    }

    /// `count` default devices with serials `SIM000`, `SIM001`, ...
    pub fn with_devices(count: usize) -> Self {
        Self::new((0..count).map(|i| SimDevice::new(&format!("SIM{:03}", i))).collect())
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every `op` call for `device` (or for any device when `None`)
    /// fail with `code` until [`SimSdk::clear_failures`].
    pub fn fail(&self, op: Op, device: Option<usize>, code: i32) {
        self.state().failures.push((op, device, code));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Replace the attached devices; takes effect at the next enumeration.
    pub fn set_devices(&self, devices: Vec<SimDevice>) {
        self.state().devices = devices;
    }

    pub fn set_frame_size(&self, device: usize, size: Option<(u32, u32)>) {
        if let Some(dev) = self.state().devices.get_mut(device) {
            dev.frame_size = size;
        }
    }

    /// Current value of a node, bypassing the journal.
    pub fn param(&self, device: usize, name: &str) -> Option<SimValue> {
        self.state()
            .devices
            .get(device)
            .and_then(|d| d.params.get(name))
            .map(|p| p.value.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().journal.clone()
    }

    pub fn clear_calls(&self) {
        self.state().journal.clear();
    }

    /// Number of journaled calls of kind `op`.
    pub fn count(&self, op: Op) -> usize {
        self.state().journal.iter().filter(|c| c.op() == op).count()
    }

    /// Handles created and not yet destroyed.
    pub fn live_handles(&self) -> usize {
        self.state().handles.len()
    }

    /// Frames acquired and not yet released.
    pub fn frames_out(&self) -> usize {
        self.state().frames_out
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }
}

impl CameraSdk for SimSdk {
    type Device = usize;
    type Handle = SimHandle;
    type Frame = SimFrame;

    fn initialize(&self) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::Initialize)?;
        st.initialized = true;
        Ok(())
    }

    fn finalize(&self) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::Finalize)?;
        st.initialized = false;
        Ok(())
    }

    fn enumerate_usb(&self) -> NativeResult<Vec<usize>> {
        let mut st = self.state();
        st.record(Call::Enumerate)?;
        if !st.initialized {
            return Err(E_CALL_ORDER);
        }
        Ok((0..st.devices.len()).collect())
    }

    fn create_handle(&self, device: &usize) -> NativeResult<SimHandle> {
        let mut st = self.state();
        st.record(Call::CreateHandle { device: *device })?;
        if *device >= st.devices.len() {
            return Err(E_PARAMETER);
        }
        let id = st.next_handle;
        st.next_handle += 1;
        st.handles.insert(
            id,
            HandleState {
                device: *device,
                ..HandleState::default()
            },
        );
        Ok(SimHandle { device: *device, id })
    }

    fn open_device(&self, handle: &SimHandle) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::OpenDevice { device: handle.device, handle: handle.id })?;
        let state = st.handles.get_mut(&handle.id).ok_or(E_HANDLE)?;
        if state.open {
            return Err(E_CALL_ORDER);
        }
        state.open = true;
        Ok(())
    }

    fn close_device(&self, handle: &SimHandle) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::CloseDevice { device: handle.device, handle: handle.id })?;
        let state = st.handles.get_mut(&handle.id).ok_or(E_HANDLE)?;
        state.open = false;
        state.streaming = false;
        Ok(())
    }

    fn destroy_handle(&self, handle: SimHandle) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::DestroyHandle { device: handle.device, handle: handle.id })?;
        st.handles.remove(&handle.id).map(|_| ()).ok_or(E_HANDLE)
    }

    fn set_buffer_depth(&self, handle: &SimHandle, depth: u32) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetBufferDepth { device: handle.device, depth })?;
        if !st.live(handle)?.open || depth == 0 {
            return Err(E_PARAMETER);
        }
        Ok(())
    }

    fn start_streaming(&self, handle: &SimHandle) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::StartStreaming { device: handle.device })?;
        let state = st.handles.get_mut(&handle.id).ok_or(E_HANDLE)?;
        if !state.open {
            return Err(E_CALL_ORDER);
        }
        state.streaming = true;
        Ok(())
    }

    fn get_int(&self, handle: &SimHandle, name: &str) -> NativeResult<IntParamInfo> {
        let mut st = self.state();
        st.record(Call::GetParam { device: handle.device, name: name.into() })?;
        match &st.param(handle, name)?.value {
            SimValue::Int(info) => Ok(*info),
            _ => Err(E_PARAMETER),
        }
    }

    fn get_float(&self, handle: &SimHandle, name: &str) -> NativeResult<FloatParamInfo> {
        let mut st = self.state();
        st.record(Call::GetParam { device: handle.device, name: name.into() })?;
        match &st.param(handle, name)?.value {
            SimValue::Float(info) => Ok(*info),
            _ => Err(E_PARAMETER),
        }
    }

    fn get_bool(&self, handle: &SimHandle, name: &str) -> NativeResult<bool> {
        let mut st = self.state();
        st.record(Call::GetParam { device: handle.device, name: name.into() })?;
        match &st.param(handle, name)?.value {
            SimValue::Bool(v) => Ok(*v),
            _ => Err(E_PARAMETER),
        }
    }

    fn get_string(&self, handle: &SimHandle, name: &str) -> NativeResult<StringParamInfo> {
        let mut st = self.state();
        st.record(Call::GetParam { device: handle.device, name: name.into() })?;
        match &st.param(handle, name)?.value {
            SimValue::Str(info) => Ok(info.clone()),
            _ => Err(E_PARAMETER),
        }
    }

    fn get_enum(&self, handle: &SimHandle, name: &str) -> NativeResult<EnumValues> {
        let mut st = self.state();
        st.record(Call::GetParam { device: handle.device, name: name.into() })?;
        match &st.param(handle, name)?.value {
            SimValue::Enum { current, entries } => Ok(EnumValues {
                current: *current,
                supported: entries.iter().map(|(v, _)| *v).collect(),
            }),
            _ => Err(E_PARAMETER),
        }
    }

    fn enum_symbol(&self, handle: &SimHandle, name: &str, value: u32) -> NativeResult<String> {
        let mut st = self.state();
        st.record(Call::EnumSymbol { device: handle.device, name: name.into(), value })?;
        match &st.param(handle, name)?.value {
            SimValue::Enum { entries, .. } => entries
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, symbol)| symbol.clone())
                .ok_or(E_OUT_OF_RANGE),
            _ => Err(E_PARAMETER),
        }
    }

    fn access_mode(&self, handle: &SimHandle, name: &str) -> NativeResult<AccessMode> {
        let mut st = self.state();
        st.record(Call::AccessMode { device: handle.device, name: name.into() })?;
        match st.param(handle, name) {
            Ok(param) => Ok(param.access),
            Err(E_NOT_IMPLEMENTED) => Ok(AccessMode::empty()),
            Err(code) => Err(code),
        }
    }

    fn set_int(&self, handle: &SimHandle, name: &str, value: i64) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetParam { device: handle.device, name: name.into() })?;
        match &mut st.param_mut(handle, name)?.value {
            SimValue::Int(info) => {
                if value < info.min || value > info.max {
                    return Err(E_OUT_OF_RANGE);
                }
                if info.inc > 0 && (value - info.min) % info.inc != 0 {
                    return Err(E_OUT_OF_RANGE);
                }
                info.current = value;
                Ok(())
            }
            _ => Err(E_PARAMETER),
        }
    }

    fn set_float(&self, handle: &SimHandle, name: &str, value: f32) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetParam { device: handle.device, name: name.into() })?;
        match &mut st.param_mut(handle, name)?.value {
            SimValue::Float(info) => {
                if value < info.min || value > info.max {
                    return Err(E_OUT_OF_RANGE);
                }
                info.current = value;
                Ok(())
            }
            _ => Err(E_PARAMETER),
        }
    }

    fn set_bool(&self, handle: &SimHandle, name: &str, value: bool) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetParam { device: handle.device, name: name.into() })?;
        match &mut st.param_mut(handle, name)?.value {
            SimValue::Bool(v) => {
                *v = value;
                Ok(())
            }
            _ => Err(E_PARAMETER),
        }
    }

    fn set_string(&self, handle: &SimHandle, name: &str, value: &str) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetParam { device: handle.device, name: name.into() })?;
        match &mut st.param_mut(handle, name)?.value {
            SimValue::Str(info) => {
                if value.len() as i64 > info.max_length {
                    return Err(E_OUT_OF_RANGE);
                }
                info.current = value.to_string();
                Ok(())
            }
            _ => Err(E_PARAMETER),
        }
    }

    fn set_enum_symbol(&self, handle: &SimHandle, name: &str, symbol: &str) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::SetParam { device: handle.device, name: name.into() })?;
        match &mut st.param_mut(handle, name)?.value {
            SimValue::Enum { current, entries } => {
                let (value, _) = entries
                    .iter()
                    .find(|(_, s)| s == symbol)
                    .ok_or(E_OUT_OF_RANGE)?;
                *current = *value;
                Ok(())
            }
            _ => Err(E_PARAMETER),
        }
    }

    fn acquire_frame(&self, handle: &SimHandle, timeout_ms: u32) -> NativeResult<SimFrame> {
        let mut st = self.state();
        st.record(Call::AcquireFrame { device: handle.device, timeout_ms })?;
        if !st.live(handle)?.streaming {
            return Err(E_CALL_ORDER);
        }
        let (width, height) = st
            .devices
            .get(handle.device)
            .and_then(|d| d.frame_size)
            .ok_or(E_NODATA)?;
        st.frame_counter = st.frame_counter.wrapping_add(1);
        let seed = st.frame_counter;
        let data: Vec<u8> = (0..width * height)
            .map(|i| (i as u8).wrapping_add(seed))
            .collect();
        st.frames_out += 1;
        Ok(SimFrame {
            info: FrameInfo {
                width,
                height,
                pixel_type: PIXEL_MONO8,
                len: width * height,
            },
            data,
        })
    }

    fn frame_info(&self, frame: &SimFrame) -> FrameInfo {
        frame.info
    }

    fn convert_frame(
        &self,
        handle: &SimHandle,
        frame: &SimFrame,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::ConvertFrame { device: handle.device, format })?;
        if dst.len() < frame.info.converted_len(format) {
            return Err(E_PARAMETER);
        }
        // Mono8 expands to identical channels in either channel order.
        for (px, out) in frame.data.iter().zip(dst.chunks_exact_mut(3)) {
            out.fill(*px);
        }
        Ok(())
    }

    fn release_frame(&self, handle: &SimHandle, frame: SimFrame) -> NativeResult<()> {
        let mut st = self.state();
        st.record(Call::ReleaseFrame { device: handle.device })?;
        drop(frame);
        st.frames_out = st.frames_out.saturating_sub(1);
        Ok(())
    }
}
