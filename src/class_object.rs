use crate::safearray::safe_array_to_strings;
use crate::value::WbemValue;
use crate::{WbemError, WbemResult};
use log::trace;
use std::ptr::NonNull;
use windows::core::{BSTR, PCWSTR};
use windows::Win32::System::Ole::SafeArrayDestroy;
use windows::Win32::System::Variant::VARIANT;
use windows::Win32::System::Wmi::{
    IEnumWbemClassObject, IWbemClassObject, WBEM_FLAG_ALWAYS, WBEM_FLAG_NONSYSTEM_ONLY,
    WBEM_INFINITE,
};

/// A wrapper around a WMI class object pointer, which releases the underlying
/// object when dropped.
#[derive(Debug, Clone)]
pub struct ClassObject {
    pub(crate) inner: IWbemClassObject,
}

impl ClassObject {
    pub(crate) fn new(inner: IWbemClassObject) -> Self {
        Self { inner }
    }

    /// The names of the object's non-system properties, in the provider's
    /// enumeration order.
    pub fn list_properties(&self) -> WbemResult<Vec<String>> {
        // This will store the property names from the GetNames call.
        let mut p_names = std::ptr::null_mut();

        unsafe {
            self.inner.GetNames(
                PCWSTR::null(),
                WBEM_FLAG_ALWAYS | WBEM_FLAG_NONSYSTEM_ONLY,
                None,
                &mut p_names,
            )?;
        }

        let p_names = NonNull::new(p_names).ok_or(WbemError::NullPointerResult)?;

        // The names array must be destroyed on every path, including when the
        // extraction fails.
        let names = unsafe { safe_array_to_strings(p_names) };

        unsafe {
            SafeArrayDestroy(p_names.as_ptr())?;
        }

        names
    }

    /// Fetch a single property and decode it.
    pub fn get_property(&self, name: &str) -> WbemResult<WbemValue> {
        let name_prop = BSTR::from(name);

        let mut vt_prop = VARIANT::default();
        let mut cim_type = 0i32;

        unsafe {
            self.inner
                .Get(&name_prop, 0, &mut vt_prop, Some(&mut cim_type), None)?;
        }

        Ok(WbemValue::from_variant(&vt_prop, cim_type))
    }

    /// The object's WMI class name.
    pub fn class(&self) -> WbemResult<String> {
        self.get_property("__CLASS")?.try_into()
    }
}

/// A forward-only iterator over a query's result objects.
///
/// Each `next` call blocks with an unbounded wait until the provider hands
/// over an object or reports exhaustion. A hung provider hangs the caller.
pub(crate) struct ResultEnumerator {
    p_enumerator: IEnumWbemClassObject,
}

impl ResultEnumerator {
    pub fn new(p_enumerator: IEnumWbemClassObject) -> Self {
        Self { p_enumerator }
    }
}

impl Iterator for ResultEnumerator {
    type Item = WbemResult<ClassObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut objs: [Option<IWbemClassObject>; 1] = [None];
        let mut return_value = 0u32;

        let res = unsafe {
            self.p_enumerator
                .Next(WBEM_INFINITE, &mut objs, &mut return_value)
        };

        // Zero remaining objects terminates the enumeration, regardless of
        // the status code.
        if return_value == 0 {
            return None;
        }

        if res.is_err() {
            return Some(Err(WbemError::HResultError { hres: res.0 }));
        }

        trace!("Got enumerator {:?} and obj {:?}", self.p_enumerator, objs[0]);

        match objs[0].take() {
            Some(obj) => Some(Ok(ClassObject::new(obj))),
            None => Some(Err(WbemError::NullPointerResult)),
        }
    }
}
