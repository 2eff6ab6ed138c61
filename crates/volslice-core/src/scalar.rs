//! Typed scalar storage.
//!
//! Volume samples arrive in one of eleven layouts. [`ScalarArray`] owns them
//! as a tagged union of typed vectors, and [`ScalarView`] is the borrowed
//! counterpart passed across trait boundaries. Numeric code is written once,
//! generic over the [`Scalar`] trait, and reached through a single `match`
//! on the tag.

use std::fmt;
use std::str::FromStr;

use num_traits::AsPrimitive;

use crate::error::{Result, VolsliceError};

/// Scalar sample type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Packed bitmap, most significant bit first.
    Bit,
}

impl ScalarType {
    /// Size of one sample in bytes. Packed bits report 0.
    #[must_use]
    pub fn size_in_bytes(self) -> usize {
        match self {
            ScalarType::Bit => 0,
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    /// Returns the canonical name used in logs and config files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::I8 => "int8",
            ScalarType::U8 => "uint8",
            ScalarType::I16 => "int16",
            ScalarType::U16 => "uint16",
            ScalarType::I32 => "int32",
            ScalarType::U32 => "uint32",
            ScalarType::I64 => "int64",
            ScalarType::U64 => "uint64",
            ScalarType::F32 => "float32",
            ScalarType::F64 => "float64",
            ScalarType::Bit => "bit",
        }
    }

    /// Whether the fixed-point conversion path applies (8 and 16 bit integers).
    #[must_use]
    pub fn is_small_integer(self) -> bool {
        matches!(
            self,
            ScalarType::I8 | ScalarType::U8 | ScalarType::I16 | ScalarType::U16
        )
    }

    /// Whether samples are integral.
    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(self, ScalarType::F32 | ScalarType::F64)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarType {
    type Err = VolsliceError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.to_ascii_lowercase().as_str() {
            "int8" | "i8" | "char" | "signed char" => ScalarType::I8,
            "uint8" | "u8" | "unsigned char" => ScalarType::U8,
            "int16" | "i16" | "short" => ScalarType::I16,
            "uint16" | "u16" | "unsigned short" => ScalarType::U16,
            "int32" | "i32" | "int" => ScalarType::I32,
            "uint32" | "u32" | "unsigned int" => ScalarType::U32,
            "int64" | "i64" | "long long" => ScalarType::I64,
            "uint64" | "u64" | "unsigned long long" => ScalarType::U64,
            "float32" | "f32" | "float" => ScalarType::F32,
            "float64" | "f64" | "double" => ScalarType::F64,
            "bit" => ScalarType::Bit,
            _ => return Err(VolsliceError::UnsupportedScalarType(s.to_string())),
        };
        Ok(ty)
    }
}

mod private {
    pub trait Sealed {}
}

/// A numeric sample type that can be stored in a [`ScalarArray`].
pub trait Scalar:
    private::Sealed + bytemuck::Pod + AsPrimitive<f64> + PartialOrd + fmt::Debug + Send + Sync
{
    /// The runtime tag for this type.
    const TYPE: ScalarType;

    #[doc(hidden)]
    fn into_data(values: Vec<Self>) -> ScalarData;

    #[doc(hidden)]
    fn view(values: &[Self]) -> ScalarView<'_>;

    /// Converts a double into this type, rounding integers and saturating at
    /// the type's bounds. NaN becomes zero.
    fn from_f64_saturating(value: f64) -> Self;
}

macro_rules! impl_scalar {
    ($t:ty, $variant:ident, integer) => {
        impl_scalar!(@impl $t, $variant, |value: f64| value.round() as $t);
    };
    ($t:ty, $variant:ident, float) => {
        impl_scalar!(@impl $t, $variant, |value: f64| value as $t);
    };
    (@impl $t:ty, $variant:ident, $convert:expr) => {
        impl private::Sealed for $t {}

        impl Scalar for $t {
            const TYPE: ScalarType = ScalarType::$variant;

            fn into_data(values: Vec<Self>) -> ScalarData {
                ScalarData::$variant(values)
            }

            fn view(values: &[Self]) -> ScalarView<'_> {
                ScalarView::$variant(values)
            }

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::redundant_closure_call
            )]
            fn from_f64_saturating(value: f64) -> Self {
                ($convert)(value)
            }
        }
    };
}

impl_scalar!(i8, I8, integer);
impl_scalar!(u8, U8, integer);
impl_scalar!(i16, I16, integer);
impl_scalar!(u16, U16, integer);
impl_scalar!(i32, I32, integer);
impl_scalar!(u32, U32, integer);
impl_scalar!(i64, I64, integer);
impl_scalar!(u64, U64, integer);
impl_scalar!(f32, F32, float);
impl_scalar!(f64, F64, float);

/// Owned sample storage, one variant per scalar type.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Packed bits plus the number of valid bits.
    Bit { bytes: Vec<u8>, len: usize },
}

/// Borrowed samples, one variant per scalar type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarView<'a> {
    I8(&'a [i8]),
    U8(&'a [u8]),
    I16(&'a [i16]),
    U16(&'a [u16]),
    I32(&'a [i32]),
    U32(&'a [u32]),
    I64(&'a [i64]),
    U64(&'a [u64]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    /// Packed bits starting `offset` bits into `bytes`.
    Bit {
        bytes: &'a [u8],
        offset: usize,
        len: usize,
    },
}

/// Applies an expression to the typed slice inside a [`ScalarView`].
///
/// The `Bit` variant is not numeric and must be handled by the caller first.
#[macro_export]
macro_rules! with_scalar_slice {
    ($view:expr, $slice:ident => $body:expr, bits => $bits:expr) => {
        match $view {
            $crate::ScalarView::I8($slice) => $body,
            $crate::ScalarView::U8($slice) => $body,
            $crate::ScalarView::I16($slice) => $body,
            $crate::ScalarView::U16($slice) => $body,
            $crate::ScalarView::I32($slice) => $body,
            $crate::ScalarView::U32($slice) => $body,
            $crate::ScalarView::I64($slice) => $body,
            $crate::ScalarView::U64($slice) => $body,
            $crate::ScalarView::F32($slice) => $body,
            $crate::ScalarView::F64($slice) => $body,
            $crate::ScalarView::Bit { .. } => $bits,
        }
    };
}

fn bit_at(bytes: &[u8], index: usize) -> u8 {
    (bytes[index / 8] >> (7 - index % 8)) & 1
}

impl<'a> ScalarView<'a> {
    /// Returns the runtime type tag.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarView::I8(_) => ScalarType::I8,
            ScalarView::U8(_) => ScalarType::U8,
            ScalarView::I16(_) => ScalarType::I16,
            ScalarView::U16(_) => ScalarType::U16,
            ScalarView::I32(_) => ScalarType::I32,
            ScalarView::U32(_) => ScalarType::U32,
            ScalarView::I64(_) => ScalarType::I64,
            ScalarView::U64(_) => ScalarType::U64,
            ScalarView::F32(_) => ScalarType::F32,
            ScalarView::F64(_) => ScalarType::F64,
            ScalarView::Bit { .. } => ScalarType::Bit,
        }
    }

    /// Number of values (not tuples) in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        with_scalar_slice!(self, s => s.len(), bits => match self {
            ScalarView::Bit { len, .. } => *len,
            _ => 0,
        })
    }

    /// Whether the view holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sub-view of `len` values starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> ScalarView<'a> {
        let end = start + len;
        match *self {
            ScalarView::I8(s) => ScalarView::I8(&s[start..end]),
            ScalarView::U8(s) => ScalarView::U8(&s[start..end]),
            ScalarView::I16(s) => ScalarView::I16(&s[start..end]),
            ScalarView::U16(s) => ScalarView::U16(&s[start..end]),
            ScalarView::I32(s) => ScalarView::I32(&s[start..end]),
            ScalarView::U32(s) => ScalarView::U32(&s[start..end]),
            ScalarView::I64(s) => ScalarView::I64(&s[start..end]),
            ScalarView::U64(s) => ScalarView::U64(&s[start..end]),
            ScalarView::F32(s) => ScalarView::F32(&s[start..end]),
            ScalarView::F64(s) => ScalarView::F64(&s[start..end]),
            ScalarView::Bit {
                bytes,
                offset,
                len: total,
            } => {
                assert!(end <= total, "bit range {start}..{end} out of bounds");
                ScalarView::Bit {
                    bytes,
                    offset: offset + start,
                    len,
                }
            }
        }
    }

    /// Reads one value as a double.
    #[must_use]
    pub fn get_f64(&self, index: usize) -> f64 {
        with_scalar_slice!(self, s => AsPrimitive::<f64>::as_(s[index]), bits => match self {
            ScalarView::Bit { bytes, offset, .. } => f64::from(bit_at(bytes, offset + index)),
            _ => 0.0,
        })
    }

    /// Returns the bytes when the view holds unsigned bytes.
    #[must_use]
    pub fn as_u8(&self) -> Option<&'a [u8]> {
        match *self {
            ScalarView::U8(s) => Some(s),
            _ => None,
        }
    }
}

/// An array of samples with interleaved components.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarArray {
    data: ScalarData,
    components: usize,
}

impl ScalarArray {
    /// Wraps a typed vector of interleaved values.
    pub fn from_vec<T: Scalar>(values: Vec<T>, components: usize) -> Result<Self> {
        Self::check_layout(values.len(), components)?;
        Ok(Self {
            data: T::into_data(values),
            components,
        })
    }

    /// Wraps a packed bitmap holding `len` bits.
    pub fn from_bits(bytes: Vec<u8>, len: usize, components: usize) -> Result<Self> {
        Self::check_layout(len, components)?;
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(VolsliceError::SizeMismatch {
                expected: needed,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            data: ScalarData::Bit { bytes, len },
            components,
        })
    }

    /// Decodes native-endian raw bytes of the given type.
    pub fn from_bytes(scalar_type: ScalarType, components: usize, bytes: &[u8]) -> Result<Self> {
        fn typed<T: Scalar>(bytes: &[u8], components: usize) -> Result<ScalarArray> {
            let size = std::mem::size_of::<T>();
            if bytes.len() % size != 0 {
                return Err(VolsliceError::SizeMismatch {
                    expected: bytes.len() / size * size,
                    actual: bytes.len(),
                });
            }
            ScalarArray::from_vec(bytemuck::pod_collect_to_vec::<u8, T>(bytes), components)
        }

        match scalar_type {
            ScalarType::I8 => typed::<i8>(bytes, components),
            ScalarType::U8 => typed::<u8>(bytes, components),
            ScalarType::I16 => typed::<i16>(bytes, components),
            ScalarType::U16 => typed::<u16>(bytes, components),
            ScalarType::I32 => typed::<i32>(bytes, components),
            ScalarType::U32 => typed::<u32>(bytes, components),
            ScalarType::I64 => typed::<i64>(bytes, components),
            ScalarType::U64 => typed::<u64>(bytes, components),
            ScalarType::F32 => typed::<f32>(bytes, components),
            ScalarType::F64 => typed::<f64>(bytes, components),
            ScalarType::Bit => Self::from_bits(bytes.to_vec(), bytes.len() * 8, components),
        }
    }

    fn check_layout(len: usize, components: usize) -> Result<()> {
        if components == 0 {
            return Err(VolsliceError::UnsupportedColorFormat(0));
        }
        if len % components != 0 {
            return Err(VolsliceError::SizeMismatch {
                expected: len / components * components,
                actual: len,
            });
        }
        Ok(())
    }

    /// Returns the runtime type tag.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        self.view().scalar_type()
    }

    /// Components per tuple.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.components
    }

    /// Number of tuples.
    #[must_use]
    pub fn num_tuples(&self) -> usize {
        self.len() / self.components
    }

    /// Number of values (tuples times components).
    #[must_use]
    pub fn len(&self) -> usize {
        self.view().len()
    }

    /// Whether the array holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a borrowed view of all values.
    #[must_use]
    pub fn view(&self) -> ScalarView<'_> {
        match &self.data {
            ScalarData::I8(v) => ScalarView::I8(v),
            ScalarData::U8(v) => ScalarView::U8(v),
            ScalarData::I16(v) => ScalarView::I16(v),
            ScalarData::U16(v) => ScalarView::U16(v),
            ScalarData::I32(v) => ScalarView::I32(v),
            ScalarData::U32(v) => ScalarView::U32(v),
            ScalarData::I64(v) => ScalarView::I64(v),
            ScalarData::U64(v) => ScalarView::U64(v),
            ScalarData::F32(v) => ScalarView::F32(v),
            ScalarData::F64(v) => ScalarView::F64(v),
            ScalarData::Bit { bytes, len } => ScalarView::Bit {
                bytes,
                offset: 0,
                len: *len,
            },
        }
    }

    /// Returns the owned storage.
    #[must_use]
    pub fn data(&self) -> &ScalarData {
        &self.data
    }

    /// Returns mutable access to the typed storage.
    pub fn data_mut(&mut self) -> &mut ScalarData {
        &mut self.data
    }

    /// Returns the raw bytes when the samples are unsigned bytes.
    #[must_use]
    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.data {
            ScalarData::U8(v) => Some(v),
            _ => None,
        }
    }

    /// Reads component `component` of tuple `tuple` as a double.
    #[must_use]
    pub fn component_f64(&self, tuple: usize, component: usize) -> f64 {
        self.view().get_f64(tuple * self.components + component)
    }

    /// Minimum and maximum of one component over all tuples.
    ///
    /// Returns `[0.0, 0.0]` for an empty array.
    pub fn range(&self, component: usize) -> Result<[f64; 2]> {
        if component >= self.components {
            return Err(VolsliceError::ComponentOutOfRange {
                component,
                components: self.components,
            });
        }
        let view = self.view();
        let mut range = [f64::INFINITY, f64::NEG_INFINITY];
        for tuple in 0..self.num_tuples() {
            let v = view.get_f64(tuple * self.components + component);
            range[0] = range[0].min(v);
            range[1] = range[1].max(v);
        }
        if range[0] > range[1] {
            return Ok([0.0, 0.0]);
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_parse() {
        assert_eq!("uint16".parse::<ScalarType>().unwrap(), ScalarType::U16);
        assert_eq!("double".parse::<ScalarType>().unwrap(), ScalarType::F64);
        let err = "int128".parse::<ScalarType>().unwrap_err();
        assert!(matches!(err, VolsliceError::UnsupportedScalarType(ref s) if s == "int128"));
    }

    #[test]
    fn test_small_integer_classification() {
        assert!(ScalarType::I8.is_small_integer());
        assert!(ScalarType::U16.is_small_integer());
        assert!(!ScalarType::I32.is_small_integer());
        assert!(!ScalarType::F32.is_small_integer());
    }

    #[test]
    fn test_from_vec_checks_components() {
        assert!(ScalarArray::from_vec(vec![1u8, 2, 3], 2).is_err());
        let array = ScalarArray::from_vec(vec![1i16, 2, 3, 4], 2).unwrap();
        assert_eq!(array.num_tuples(), 2);
        assert_eq!(array.scalar_type(), ScalarType::I16);
        assert!((array.component_f64(1, 0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let values = [1.5f32, -2.0, 8.25];
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        let array = ScalarArray::from_bytes(ScalarType::F32, 1, bytes).unwrap();
        assert_eq!(array.data(), &ScalarData::F32(values.to_vec()));
    }

    #[test]
    fn test_bit_view_reads_msb_first() {
        let array = ScalarArray::from_bits(vec![0b1010_0000, 0b0000_0001], 16, 1).unwrap();
        let view = array.view();
        assert!((view.get_f64(0) - 1.0).abs() < 1e-12);
        assert!(view.get_f64(1).abs() < 1e-12);
        assert!((view.get_f64(2) - 1.0).abs() < 1e-12);
        assert!((view.get_f64(15) - 1.0).abs() < 1e-12);

        let tail = view.slice(8, 8);
        assert_eq!(tail.len(), 8);
        assert!((tail.get_f64(7) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bits_require_enough_bytes() {
        assert!(ScalarArray::from_bits(vec![0], 9, 1).is_err());
    }

    #[test]
    fn test_saturating_conversion() {
        assert_eq!(u8::from_f64_saturating(300.0), 255);
        assert_eq!(u8::from_f64_saturating(-3.0), 0);
        assert_eq!(i16::from_f64_saturating(2.5), 3);
        assert_eq!(i8::from_f64_saturating(f64::NAN), 0);
        assert!((f32::from_f64_saturating(0.25) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_component_range() {
        let array = ScalarArray::from_vec(vec![5u16, 1, 9, 4, 2, 7], 2).unwrap();
        assert_eq!(array.range(0).unwrap(), [2.0, 9.0]);
        assert_eq!(array.range(1).unwrap(), [1.0, 7.0]);
        assert!(array.range(2).is_err());
    }
}
