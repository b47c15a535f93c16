/// Integer parameter snapshot. Ranges are 64-bit because several SDK
/// nodes exceed the 32-bit range.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntParamInfo {
    pub current: i64,
    pub min: i64,
    pub max: i64,
    /// Step between valid values.
    pub inc: i64,
}

/// Float parameter snapshot, single precision like the SDK.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatParamInfo {
    pub current: f32,
    pub min: f32,
    pub max: f32,
}

/// String parameter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringParamInfo {
    pub current: String,
    pub max_length: i64,
}

/// Enumeration parameter with every numeric value resolved to its symbol.
///
/// `supported[i]` is the symbol of the i-th supported numeric value, in
/// the order the device reports them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumParamInfo {
    pub current: String,
    pub supported: Vec<String>,
}

/// Raw enumeration state as reported by the SDK, before symbol lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumValues {
    pub current: u32,
    pub supported: Vec<u32>,
}

/// Kind of a parameter node, as named in parameter listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Float,
    Bool,
    String,
    Enum,
}

impl ParamKind {
    /// Parse `integer`, `float`, `bool`, `string` or `enum`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Some(ParamKind::Integer),
            "float" => Some(ParamKind::Float),
            "bool" | "boolean" => Some(ParamKind::Bool),
            "string" => Some(ParamKind::String),
            "enum" | "enumeration" => Some(ParamKind::Enum),
            _ => None,
        }
    }
}

/// One node to read in a batch query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        ParamSpec {
            name: name.into(),
            kind,
        }
    }
}

/// Named group of nodes, e.g. "Acquisition" or "Image Format".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamGroup {
    pub name: String,
    pub parameters: Vec<ParamSpec>,
}

/// Snapshot of any kind of parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(IntParamInfo),
    Float(FloatParamInfo),
    Bool(bool),
    String(StringParamInfo),
    Enum(EnumParamInfo),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Integer,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::String(_) => ParamKind::String,
            ParamValue::Enum(_) => ParamKind::Enum,
        }
    }
}

bitflags::bitflags! {
    /// Access mode of a parameter node.
    ///
    /// Not-implemented and not-available nodes report the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl AccessMode {
    pub fn is_read_write(self) -> bool {
        self.contains(AccessMode::READ_WRITE)
    }
}

/// Packed 3-channel output encodings a frame can be converted to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Bgr8 = 0,
    Rgb8 = 1,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        3
    }

    /// Parse a configuration token (`bgr8` / `rgb8`, case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bgr8" | "bgr" => Some(PixelFormat::Bgr8),
            "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
            _ => None,
        }
    }
}

/// Metadata of one acquired frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    /// Source pixel type as reported by the SDK.
    pub pixel_type: u32,
    /// Length of the source buffer in bytes.
    pub len: u32,
}

impl FrameInfo {
    /// Bytes needed to hold this frame after conversion to `format`.
    pub fn converted_len(&self, format: PixelFormat) -> usize {
        self.width as usize * self.height as usize * format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::READ_WRITE.is_read_write());
        assert!(!AccessMode::READ.is_read_write());
        assert!(!AccessMode::WRITE.is_read_write());
        assert!(!AccessMode::empty().is_read_write());
    }

    #[test]
    fn test_pixel_format_from_name() {
        assert_eq!(PixelFormat::from_name("RGB8"), Some(PixelFormat::Rgb8));
        assert_eq!(PixelFormat::from_name("bgr"), Some(PixelFormat::Bgr8));
        assert_eq!(PixelFormat::from_name("mono8"), None);
    }

    #[test]
    fn test_param_kind_from_name() {
        assert_eq!(ParamKind::from_name("integer"), Some(ParamKind::Integer));
        assert_eq!(ParamKind::from_name(" Enum "), Some(ParamKind::Enum));
        assert_eq!(ParamKind::from_name("command"), None);
    }

    #[test]
    fn test_converted_len() {
        let info = FrameInfo {
            width: 640,
            height: 480,
            pixel_type: 0,
            len: 640 * 480,
        };
        assert_eq!(info.converted_len(PixelFormat::Bgr8), 640 * 480 * 3);
    }
}
