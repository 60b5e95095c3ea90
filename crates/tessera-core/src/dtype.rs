use std::fmt;
use std::str::FromStr;

use num_traits::NumCast;

use crate::error::{Error, Result};

// DType — The closed set of element types an array can hold
//
// Devices only ever see raw bytes; the DType stored in every array tells the
// front end how to size allocations and how to interpret those bytes when
// they come back to the host. The set is deliberately closed:
//
//   I8  I16  I32  I64   — signed integers
//   U8  U16  U32  U64   — unsigned integers
//   F32 F64             — IEEE floats
//
// Anything else (half floats, booleans, complex) is rejected with
// `Error::UnknownDataType` at the point where a name is turned into a DType.

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl DType {
    /// Every supported dtype, in declaration order.
    pub const ALL: [DType; 10] = [
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::F32,
        DType::F64,
    ];

    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Short lowercase name (`"i32"`, `"f64"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DType::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| Error::UnknownDataType(s.to_string()))
    }
}

// with_dtype! — The single dispatch point from a runtime DType to a Rust type
//
// Instead of repeating a ten-armed match at every site that needs to know the
// concrete element type (scalar reads, scalar writes, casts, printing, copies),
// callers write:
//
//   with_dtype!(dtype, T => T::read_ne(bytes).to_f64())
//
// and the macro expands to a match that binds `T` to the matching primitive.

/// Dispatch on a [`DType`], binding the given identifier to the matching
/// Rust element type inside the body.
#[macro_export]
macro_rules! with_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DType::I8 => {
                type $t = i8;
                $body
            }
            $crate::DType::I16 => {
                type $t = i16;
                $body
            }
            $crate::DType::I32 => {
                type $t = i32;
                $body
            }
            $crate::DType::I64 => {
                type $t = i64;
                $body
            }
            $crate::DType::U8 => {
                type $t = u8;
                $body
            }
            $crate::DType::U16 => {
                type $t = u16;
                $body
            }
            $crate::DType::U32 => {
                type $t = u32;
                $body
            }
            $crate::DType::U64 => {
                type $t = u64;
                $body
            }
            $crate::DType::F32 => {
                type $t = f32;
                $body
            }
            $crate::DType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Trait implemented by Rust types that can be stored in an array.
///
/// Provides the mapping between the concrete Rust type and the DType enum,
/// plus the byte codec used for host/device transfers.
pub trait WithDType:
    Copy + Send + Sync + 'static + NumCast + fmt::Debug + fmt::Display + PartialOrd
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64 (`as` semantics: truncating, saturating).
    fn from_f64(v: f64) -> Self;

    /// Write the native-endian bytes of this value into `dst`
    /// (`dst.len()` must equal the element size).
    fn write_ne(self, dst: &mut [u8]);

    /// Read a value from native-endian bytes.
    fn read_ne(src: &[u8]) -> Self;

    /// Wrap this value in the tagged [`HostValue`] union.
    fn into_host_value(self) -> HostValue;
}

macro_rules! impl_with_dtype {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl WithDType for $ty {
                const DTYPE: DType = DType::$variant;

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(v: f64) -> Self {
                    v as $ty
                }

                fn write_ne(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_ne_bytes());
                }

                fn read_ne(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(src);
                    <$ty>::from_ne_bytes(raw)
                }

                fn into_host_value(self) -> HostValue {
                    HostValue::$variant(self)
                }
            }

            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::$variant(v)
                }
            }
        )*
    };
}

impl_with_dtype!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

// HostValue — A single host-side number tagged with its DType
//
// Used for literal operands inside expression trees (`x * 10`), for scalar
// reads/writes, and by the host backend when it decodes device bytes.

/// A host-side scalar of one of the supported dtypes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! match_host_value {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            HostValue::I8($v) => $body,
            HostValue::I16($v) => $body,
            HostValue::I32($v) => $body,
            HostValue::I64($v) => $body,
            HostValue::U8($v) => $body,
            HostValue::U16($v) => $body,
            HostValue::U32($v) => $body,
            HostValue::U64($v) => $body,
            HostValue::F32($v) => $body,
            HostValue::F64($v) => $body,
        }
    };
}

impl HostValue {
    /// The dtype carried by this value.
    pub fn dtype(&self) -> DType {
        match self {
            HostValue::I8(_) => DType::I8,
            HostValue::I16(_) => DType::I16,
            HostValue::I32(_) => DType::I32,
            HostValue::I64(_) => DType::I64,
            HostValue::U8(_) => DType::U8,
            HostValue::U16(_) => DType::U16,
            HostValue::U32(_) => DType::U32,
            HostValue::U64(_) => DType::U64,
            HostValue::F32(_) => DType::F32,
            HostValue::F64(_) => DType::F64,
        }
    }

    pub fn to_f64(self) -> f64 {
        match_host_value!(self, v => v.to_f64())
    }

    /// Build a value of `dtype` from an f64 with `as` semantics.
    pub fn from_f64(dtype: DType, v: f64) -> Self {
        with_dtype!(dtype, T => T::from_f64(v).into_host_value())
    }

    /// Convert to a concrete Rust type. Fails if the value is not
    /// representable in `T` (e.g. a negative value into an unsigned type).
    pub fn cast<T: WithDType>(self) -> Result<T> {
        let converted: Option<T> = match_host_value!(self, v => <T as NumCast>::from(v));
        converted.ok_or_else(|| {
            Error::msg(format!("value {self} is not representable as {}", T::DTYPE))
        })
    }

    /// Decode one element of `dtype` from native-endian bytes.
    pub fn read_ne(dtype: DType, src: &[u8]) -> Self {
        with_dtype!(dtype, T => T::read_ne(src).into_host_value())
    }

    /// Encode this value as native-endian bytes into `dst`.
    pub fn write_ne(self, dst: &mut [u8]) {
        match_host_value!(self, v => v.write_ne(dst))
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match_host_value!(self, v => write!(f, "{v}"))
    }
}
