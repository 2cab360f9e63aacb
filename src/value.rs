use crate::datetime::{automation_date_to_datetime, CimDateTime};
use crate::safearray::{safe_array_to_bytes, safe_array_to_strings};
use crate::WbemError;
use log::{error, warn};
use serde::Serialize;
use std::convert::TryFrom;
use std::ptr::NonNull;
use windows::Win32::Foundation::VARIANT_TRUE;
use windows::Win32::System::Variant::*;
use windows::Win32::System::Wmi::CIM_DATETIME;

/// A single WMI property value, decoded to an owning Rust representation.
///
/// Signed and unsigned native integers of the same width collapse to the one
/// signed kind of that width (`VT_UI4` becomes [`WbemValue::I4`]), so large
/// unsigned values reinterpret the top bit. Do not assume unsigned range
/// preservation.
#[derive(Debug, PartialEq, Serialize, Clone)]
#[serde(untagged)]
pub enum WbemValue {
    Null,

    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),

    R4(f32),
    R8(f64),

    Bool(bool),

    String(String),

    Datetime(CimDateTime),

    Array(Vec<WbemValue>),
}

/// The scalar kinds a wire type can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    String,
    Date,
}

impl WbemValue {
    /// Decode a raw `VARIANT` (plus the property's CIM type hint) into a
    /// [`WbemValue`].
    ///
    /// This never fails: wire types the bridge does not support produce a
    /// [`WbemValue::Null`] and a diagnostic, so that one odd property cannot
    /// abort a whole row.
    pub fn from_variant(vt: &VARIANT, cim_type: i32) -> WbemValue {
        let variant_type = unsafe { vt.Anonymous.Anonymous.vt };

        // The type field has two forms: a plain type like `VT_BSTR`, or an
        // array of some base type like `VT_ARRAY | VT_BSTR`.
        let is_array = (variant_type & VT_ARRAY) == VT_ARRAY;
        let base_type = variant_type & VT_TYPEMASK;

        let kind = match base_type {
            VT_EMPTY | VT_NULL | VT_VOID => return WbemValue::Null,

            VT_I1 | VT_UI1 => ValueKind::Byte,
            VT_I2 | VT_UI2 => ValueKind::Short,
            VT_I4 | VT_UI4 | VT_INT | VT_UINT => ValueKind::Int,
            VT_I8 | VT_UI8 => ValueKind::Long,
            VT_R4 => ValueKind::Float,
            VT_R8 => ValueKind::Double,
            VT_DATE => ValueKind::Date,
            VT_BOOL => ValueKind::Bool,
            VT_BSTR => ValueKind::String,

            // Decimal, nested variant and friends are not part of the value
            // model.
            other => {
                warn!("Unsupported VARIANT type {:?}", other);
                return WbemValue::Null;
            }
        };

        if is_array {
            let parray = unsafe { vt.Anonymous.Anonymous.Anonymous.parray };

            let Some(parray) = NonNull::new(parray) else {
                warn!("Array-typed VARIANT holds no array data");
                return WbemValue::Null;
            };

            Self::from_safe_array(parray, kind)
        } else {
            Self::from_scalar(vt, kind, base_type, cim_type)
        }
    }

    fn from_scalar(vt: &VARIANT, kind: ValueKind, base_type: VARENUM, cim_type: i32) -> WbemValue {
        match kind {
            ValueKind::Byte => {
                let num = if base_type == VT_I1 {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.cVal as i8 }
                } else {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.bVal as i8 }
                };

                WbemValue::I1(num)
            }
            ValueKind::Short => {
                let num = if base_type == VT_I2 {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.iVal }
                } else {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.uiVal as i16 }
                };

                WbemValue::I2(num)
            }
            ValueKind::Int => {
                let num = match base_type {
                    VT_I4 => unsafe { vt.Anonymous.Anonymous.Anonymous.lVal },
                    VT_UI4 => unsafe { vt.Anonymous.Anonymous.Anonymous.ulVal as i32 },
                    VT_INT => unsafe { vt.Anonymous.Anonymous.Anonymous.intVal },
                    _ => unsafe { vt.Anonymous.Anonymous.Anonymous.uintVal as i32 },
                };

                WbemValue::I4(num)
            }
            ValueKind::Long => {
                let num = if base_type == VT_I8 {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.llVal }
                } else {
                    unsafe { vt.Anonymous.Anonymous.Anonymous.ullVal as i64 }
                };

                WbemValue::I8(num)
            }
            ValueKind::Float => {
                let num = unsafe { vt.Anonymous.Anonymous.Anonymous.fltVal };

                WbemValue::R4(num)
            }
            ValueKind::Double => {
                let num = unsafe { vt.Anonymous.Anonymous.Anonymous.dblVal };

                WbemValue::R8(num)
            }
            ValueKind::Bool => {
                let value = unsafe { vt.Anonymous.Anonymous.Anonymous.boolVal };

                WbemValue::Bool(value == VARIANT_TRUE)
            }
            ValueKind::Date => {
                let days = unsafe { vt.Anonymous.Anonymous.Anonymous.date };

                match automation_date_to_datetime(days) {
                    Some(dt) => WbemValue::Datetime(dt),
                    None => {
                        warn!("DATE value {} is out of the representable range", days);
                        WbemValue::Null
                    }
                }
            }
            ValueKind::String => {
                let bstr = unsafe { &vt.Anonymous.Anonymous.Anonymous.bstrVal };
                let text = bstr.to_string();

                // Strings carrying a CIM datetime hint are really timestamps.
                if cim_type == CIM_DATETIME.0 {
                    match text.parse::<CimDateTime>() {
                        Ok(dt) => WbemValue::Datetime(dt),
                        Err(e) => {
                            warn!("Failed to decode CIM datetime: {}", e);
                            WbemValue::Null
                        }
                    }
                } else {
                    WbemValue::String(text)
                }
            }
        }
    }

    /// Only byte and string element kinds have first-class array conversions.
    /// The remaining kinds are left unimplemented on purpose: completing them
    /// would change observed behavior for existing callers.
    fn from_safe_array(
        parray: NonNull<windows::Win32::System::Com::SAFEARRAY>,
        kind: ValueKind,
    ) -> WbemValue {
        let converted = match kind {
            ValueKind::Byte => unsafe {
                safe_array_to_bytes(parray)
                    .map(|items| items.into_iter().map(WbemValue::I1).collect())
            },
            ValueKind::String => unsafe {
                safe_array_to_strings(parray)
                    .map(|items| items.into_iter().map(WbemValue::String).collect())
            },
            other => {
                error!("{:?} arrays not implemented", other);
                return WbemValue::Null;
            }
        };

        match converted {
            Ok(items) => WbemValue::Array(items),
            Err(e) => {
                error!("Can't access safe array data: {}", e);
                WbemValue::Null
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WbemValue::Null)
    }
}

macro_rules! impl_try_from_value {
    ($target_type:ty, $value_type:ident) => {
        impl TryFrom<WbemValue> for $target_type {
            type Error = WbemError;

            fn try_from(value: WbemValue) -> Result<$target_type, Self::Error> {
                match value {
                    WbemValue::$value_type(item) => Ok(item),
                    other => Err(WbemError::ConvertValueError(format!(
                        "Value {:?} cannot be turned into a {}",
                        &other,
                        stringify!($target_type)
                    ))),
                }
            }
        }
    };
}

impl_try_from_value!(i8, I1);
impl_try_from_value!(i16, I2);
impl_try_from_value!(i32, I4);
impl_try_from_value!(i64, I8);
impl_try_from_value!(f32, R4);
impl_try_from_value!(f64, R8);
impl_try_from_value!(bool, Bool);
impl_try_from_value!(String, String);
impl_try_from_value!(CimDateTime, Datetime);

#[cfg(test)]
mod tests {
    use super::*;
    use windows::core::BSTR;
    use windows::Win32::System::Com::SAFEARRAYBOUND;
    use windows::Win32::System::Ole::{SafeArrayCreate, SafeArrayPutElement};
    use windows::Win32::System::Wmi::{CIM_STRING, CIM_UINT32};

    const NO_HINT: i32 = 0;

    fn array_variant<T: Copy>(element_type: VARENUM, items: &[T]) -> VARIANT {
        let bounds = SAFEARRAYBOUND {
            cElements: items.len() as u32,
            lLbound: 0,
        };

        unsafe {
            let sa = SafeArrayCreate(element_type, 1, &bounds);
            assert!(!sa.is_null());

            for (i, item) in items.iter().enumerate() {
                let index = i as i32;
                let hr = SafeArrayPutElement(sa, &index, item as *const T as *const _);
                assert!(hr.is_ok());
            }

            let mut variant = VARIANT::default();
            (*variant.Anonymous.Anonymous).vt = VT_ARRAY | element_type;
            (*variant.Anonymous.Anonymous).Anonymous.parray = sa;

            variant
        }
    }

    fn string_array_variant(items: &[&str]) -> VARIANT {
        let bounds = SAFEARRAYBOUND {
            cElements: items.len() as u32,
            lLbound: 0,
        };

        unsafe {
            let sa = SafeArrayCreate(VT_BSTR, 1, &bounds);
            assert!(!sa.is_null());

            for (i, item) in items.iter().enumerate() {
                let index = i as i32;
                let bstr = BSTR::from(*item);
                let hr = SafeArrayPutElement(sa, &index, bstr.into_raw() as *const _);
                assert!(hr.is_ok());
            }

            let mut variant = VARIANT::default();
            (*variant.Anonymous.Anonymous).vt = VT_ARRAY | VT_BSTR;
            (*variant.Anonymous.Anonymous).Anonymous.parray = sa;

            variant
        }
    }

    #[test]
    fn it_decodes_scalars() {
        let variant = VARIANT::from(42i32);
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::I4(42));

        let variant = VARIANT::from(7i16);
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::I2(7));

        let variant = VARIANT::from(true);
        assert_eq!(
            WbemValue::from_variant(&variant, NO_HINT),
            WbemValue::Bool(true)
        );

        let variant = VARIANT::from(0.5f64);
        assert_eq!(
            WbemValue::from_variant(&variant, NO_HINT),
            WbemValue::R8(0.5)
        );

        let variant = VARIANT::from(BSTR::from("hello"));
        assert_eq!(
            WbemValue::from_variant(&variant, CIM_STRING.0),
            WbemValue::String("hello".to_string())
        );
    }

    #[test]
    fn it_collapses_unsigned_widths_to_signed() {
        // 200 does not fit an i8; the top bit is reinterpreted.
        let variant = VARIANT::from(200u8);
        assert_eq!(
            WbemValue::from_variant(&variant, NO_HINT),
            WbemValue::I1(200u8 as i8)
        );

        let mut variant = VARIANT::default();
        unsafe {
            (*variant.Anonymous.Anonymous).vt = VT_UI4;
            (*variant.Anonymous.Anonymous).Anonymous.ulVal = 3_000_000_000u32;
        }
        assert_eq!(
            WbemValue::from_variant(&variant, CIM_UINT32.0),
            WbemValue::I4(3_000_000_000u32 as i32)
        );
    }

    #[test]
    fn it_decodes_empty_and_null_to_null() {
        let variant = VARIANT::default();
        assert_eq!(
            WbemValue::from_variant(&variant, CIM_STRING.0),
            WbemValue::Null
        );

        let mut variant = VARIANT::default();
        unsafe {
            (*variant.Anonymous.Anonymous).vt = VT_NULL;
        }
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::Null);
    }

    #[test]
    fn it_reinterprets_datetime_hinted_strings() {
        let variant = VARIANT::from(BSTR::from("20190113200517.500000+060"));
        let value = WbemValue::from_variant(&variant, CIM_DATETIME.0);

        match value {
            WbemValue::Datetime(dt) => {
                assert_eq!(dt.0.to_rfc3339(), "2019-01-13T20:05:17.000500+01:00")
            }
            other => panic!("expected a datetime, got {:?}", other),
        }

        // Without the hint the exact same payload stays a string.
        let variant = VARIANT::from(BSTR::from("20190113200517.500000+060"));
        let value = WbemValue::from_variant(&variant, CIM_STRING.0);
        assert_eq!(
            value,
            WbemValue::String("20190113200517.500000+060".to_string())
        );
    }

    #[test]
    fn it_yields_null_for_invalid_datetime_strings() {
        let variant = VARIANT::from(BSTR::from("not a datetime"));
        assert_eq!(
            WbemValue::from_variant(&variant, CIM_DATETIME.0),
            WbemValue::Null
        );
    }

    #[test]
    fn it_decodes_byte_arrays() {
        let variant = array_variant(VT_UI1, &[1u8, 2, 255]);
        assert_eq!(
            WbemValue::from_variant(&variant, NO_HINT),
            WbemValue::Array(vec![
                WbemValue::I1(1),
                WbemValue::I1(2),
                WbemValue::I1(-1)
            ])
        );
    }

    #[test]
    fn it_decodes_string_arrays() {
        let variant = string_array_variant(&["a", "b"]);
        assert_eq!(
            WbemValue::from_variant(&variant, NO_HINT),
            WbemValue::Array(vec![
                WbemValue::String("a".to_string()),
                WbemValue::String("b".to_string())
            ])
        );
    }

    #[test]
    fn it_does_not_decode_other_array_kinds() {
        let variant = array_variant(VT_I2, &[1i16, 2]);
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::Null);

        let variant = array_variant(VT_I4, &[1i32, 2]);
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::Null);

        let variant = array_variant(VT_R8, &[1.0f64]);
        assert_eq!(WbemValue::from_variant(&variant, NO_HINT), WbemValue::Null);
    }

    #[test]
    fn it_extracts_native_types() {
        let num: i32 = WbemValue::I4(42).try_into().unwrap();
        assert_eq!(num, 42);

        let text: String = WbemValue::String("x".to_string()).try_into().unwrap();
        assert_eq!(text, "x");

        let res: Result<i32, _> = WbemValue::Bool(true).try_into();
        assert!(res.is_err());
    }
}
