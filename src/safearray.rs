use crate::WbemResult;
use std::ptr::NonNull;
use windows::core::BSTR;
use windows::Win32::System::Com::SAFEARRAY;
use windows::Win32::System::Ole::{
    SafeArrayAccessData, SafeArrayGetLBound, SafeArrayGetUBound, SafeArrayUnaccessData,
};

/// An accessor to a SAFEARRAY, which:
/// 1. Locks the array so the data can be read.
/// 2. Unlocks the array once dropped.
///
/// Pointers to a SAFEARRAY can come from different places (like `GetNames`,
/// or a WMI property value), which have different deallocation rules
/// (`GetNames` requires the caller to destroy the array, while a property
/// value's array is owned by its VARIANT). For this reason there is no owned
/// `SafeArray` type here, only the lock guard.
#[derive(Debug)]
pub(crate) struct SafeArrayAccessor<T> {
    arr: NonNull<SAFEARRAY>,
    p_data: *mut T,
    lower_bound: i32,
    upper_bound: i32,
}

impl<T> SafeArrayAccessor<T> {
    /// # Safety
    ///
    /// The caller must make sure the array is valid, single-dimensional, and
    /// holds items of type `T`.
    pub unsafe fn new(arr: NonNull<SAFEARRAY>) -> WbemResult<Self> {
        let mut p_data = std::ptr::null_mut();

        let lower_bound = unsafe { SafeArrayGetLBound(arr.as_ptr(), 1)? };
        let upper_bound = unsafe { SafeArrayGetUBound(arr.as_ptr(), 1)? };
        unsafe { SafeArrayAccessData(arr.as_ptr(), &mut p_data)? };

        Ok(Self {
            arr,
            p_data: p_data.cast(),
            lower_bound,
            upper_bound,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        // `upper_bound` is -1 for an empty array, making the slice empty.
        let data_slice = unsafe {
            std::slice::from_raw_parts(self.p_data, (self.upper_bound + 1) as usize)
        };

        data_slice[(self.lower_bound as usize)..].iter()
    }
}

impl<T> Drop for SafeArrayAccessor<T> {
    fn drop(&mut self) {
        unsafe {
            let _result = SafeArrayUnaccessData(self.arr.as_ptr());
        }
    }
}

/// Copies out a byte-kind (`VT_UI1` / `VT_I1`) array.
///
/// # Safety
///
/// `arr` must be a valid single-dimensional array of 1-byte elements.
pub(crate) unsafe fn safe_array_to_bytes(arr: NonNull<SAFEARRAY>) -> WbemResult<Vec<i8>> {
    let accessor = unsafe { SafeArrayAccessor::<i8>::new(arr)? };

    Ok(accessor.iter().copied().collect())
}

/// Copies out a `VT_BSTR` array as owned strings.
///
/// # Safety
///
/// `arr` must be a valid single-dimensional array of `BSTR` elements.
pub(crate) unsafe fn safe_array_to_strings(arr: NonNull<SAFEARRAY>) -> WbemResult<Vec<String>> {
    let accessor = unsafe { SafeArrayAccessor::<BSTR>::new(arr)? };

    Ok(accessor.iter().map(|item| item.to_string()).collect())
}
