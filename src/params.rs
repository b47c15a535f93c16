//! Typed parameter access on an open session.
//!
//! Each parameter kind is a marker type implementing [`Param`]; the
//! read-back / access-mode / write sequence is shared by all of them in
//! [`DeviceSession::set`].

use crate::config::{CameraProfile, Control};
use crate::error::Classify;
use crate::registry::DeviceSession;
use crate::sdk::{CameraSdk, NativeResult};
use crate::types::{
    EnumParamInfo, EnumValues, FloatParamInfo, IntParamInfo, ParamGroup, ParamKind, ParamSpec,
    ParamValue, StringParamInfo,
};
use crate::{CameraError, Result};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// One kind of parameter node.
pub trait Param {
    /// Snapshot returned by a raw read.
    type Info: Debug;
    /// Value accepted by a write.
    type Value: Debug + ?Sized;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<Self::Info>;
    fn write<S: CameraSdk>(
        sdk: &S,
        handle: &S::Handle,
        name: &str,
        value: &Self::Value,
    ) -> NativeResult<()>;
}

pub struct IntParam;
pub struct FloatParam;
pub struct BoolParam;
pub struct StringParam;
/// Enumeration nodes. Raw reads return numeric values, writes take a symbol.
pub struct EnumParam;

impl Param for IntParam {
    type Info = IntParamInfo;
    type Value = i64;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<IntParamInfo> {
        sdk.get_int(handle, name)
    }

    fn write<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str, value: &i64) -> NativeResult<()> {
        sdk.set_int(handle, name, *value)
    }
}

impl Param for FloatParam {
    type Info = FloatParamInfo;
    type Value = f32;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<FloatParamInfo> {
        sdk.get_float(handle, name)
    }

    fn write<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str, value: &f32) -> NativeResult<()> {
        sdk.set_float(handle, name, *value)
    }
}

impl Param for BoolParam {
    type Info = bool;
    type Value = bool;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<bool> {
        sdk.get_bool(handle, name)
    }

    fn write<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str, value: &bool) -> NativeResult<()> {
        sdk.set_bool(handle, name, *value)
    }
}

impl Param for StringParam {
    type Info = StringParamInfo;
    type Value = str;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<StringParamInfo> {
        sdk.get_string(handle, name)
    }

    fn write<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str, value: &str) -> NativeResult<()> {
        sdk.set_string(handle, name, value)
    }
}

impl Param for EnumParam {
    type Info = EnumValues;
    type Value = str;

    fn read<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str) -> NativeResult<EnumValues> {
        sdk.get_enum(handle, name)
    }

    fn write<S: CameraSdk>(sdk: &S, handle: &S::Handle, name: &str, value: &str) -> NativeResult<()> {
        sdk.set_enum_symbol(handle, name, value)
    }
}

impl<S: CameraSdk> DeviceSession<S> {
    /// Raw read of a node of kind `P`.
    pub fn get<P: Param>(&self, name: &str) -> Result<P::Info> {
        P::read(self.sdk(), self.raw(), name).classify()
    }

    /// Write a node of kind `P`.
    ///
    /// The current value is read back first (for the log only; a failed
    /// read is returned), then the access mode is checked. Nodes that are
    /// not read-write are refused with [`CameraError::NotWritable`] and no
    /// write is issued.
    pub fn set<P: Param>(&self, name: &str, value: &P::Value) -> Result<()> {
        let sdk = self.sdk();
        let handle = self.raw();

        let current = P::read(sdk, handle, name).classify()?;
        log::debug!("{} = {:?}, setting {:?}", name, current, value);

        let mode = sdk.access_mode(handle, name).classify()?;
        if !mode.is_read_write() {
            log::warn!("Parameter {} is not writable (access {:?})", name, mode);
            return Err(CameraError::NotWritable(name.to_string()));
        }

        P::write(sdk, handle, name, value).classify()?;
        log::debug!("Set {} = {:?}", name, value);
        Ok(())
    }

    pub fn get_int(&self, name: &str) -> Result<IntParamInfo> {
        self.get::<IntParam>(name)
    }

    pub fn get_float(&self, name: &str) -> Result<FloatParamInfo> {
        self.get::<FloatParam>(name)
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get::<BoolParam>(name)
    }

    pub fn get_string(&self, name: &str) -> Result<StringParamInfo> {
        self.get::<StringParam>(name)
    }

    /// Read an enumeration node and resolve its current and supported
    /// values to symbols, keeping the device's order.
    pub fn get_enum(&self, name: &str) -> Result<EnumParamInfo> {
        let values = self.get::<EnumParam>(name)?;
        let current = self.enum_symbol(name, values.current)?;
        let supported = values
            .supported
            .iter()
            .map(|value| self.enum_symbol(name, *value))
            .collect::<Result<Vec<_>>>()?;
        Ok(EnumParamInfo { current, supported })
    }

    fn enum_symbol(&self, name: &str, value: u32) -> Result<String> {
        self.sdk().enum_symbol(self.raw(), name, value).classify()
    }

    pub fn set_int(&self, name: &str, value: i64) -> Result<()> {
        self.set::<IntParam>(name, &value)
    }

    pub fn set_float(&self, name: &str, value: f32) -> Result<()> {
        self.set::<FloatParam>(name, &value)
    }

    pub fn set_bool(&self, name: &str, value: bool) -> Result<()> {
        self.set::<BoolParam>(name, &value)
    }

    pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
        self.set::<StringParam>(name, value)
    }

    /// Select an enumeration entry by symbol.
    pub fn set_enum(&self, name: &str, symbol: &str) -> Result<()> {
        self.set::<EnumParam>(name, symbol)
    }

    /// Read one node as the kind `param` names.
    pub fn read(&self, param: &ParamSpec) -> Result<ParamValue> {
        let name = param.name.as_str();
        Ok(match param.kind {
            ParamKind::Integer => ParamValue::Int(self.get_int(name)?),
            ParamKind::Float => ParamValue::Float(self.get_float(name)?),
            ParamKind::Bool => ParamValue::Bool(self.get_bool(name)?),
            ParamKind::String => ParamValue::String(self.get_string(name)?),
            ParamKind::Enum => ParamValue::Enum(self.get_enum(name)?),
        })
    }

    /// Read every node of every group, keyed by node name. The first
    /// failing read aborts the query.
    pub fn query(&self, groups: &[ParamGroup]) -> Result<BTreeMap<String, ParamValue>> {
        let mut table = BTreeMap::new();
        for group in groups {
            for param in &group.parameters {
                let value = self.read(param).inspect_err(|e| {
                    log::warn!("Query of {}/{} failed: {}", group.name, param.name, e)
                })?;
                table.insert(param.name.clone(), value);
            }
        }
        Ok(table)
    }

    /// Switch `auto_node` to continuous, or off followed by writing the
    /// manual value to `value_node`.
    pub fn set_control(&self, auto_node: &str, value_node: &str, control: Control) -> Result<()> {
        match control {
            Control::Auto => self.set_enum(auto_node, "Continuous"),
            Control::Manual(value) => {
                self.set_enum(auto_node, "Off")?;
                self.set_float(value_node, value)
            }
        }
    }

    /// Apply exposure, gain, then image size. Stops at the first failure.
    pub fn apply_profile(&self, profile: &CameraProfile) -> Result<()> {
        if let Some(exposure) = profile.exposure {
            self.set_control("ExposureAuto", "ExposureTime", exposure)?;
        }
        if let Some(gain) = profile.gain {
            self.set_control("GainAuto", "Gain", gain)?;
        }
        if let Some(width) = profile.width {
            self.set_int("Width", width)?;
        }
        if let Some(height) = profile.height {
            self.set_int("Height", height)?;
        }
        Ok(())
    }
}
