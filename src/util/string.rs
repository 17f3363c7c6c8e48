//! C string helpers used when copying create-info data off the application's pointers.

use std::ffi::CStr;

/// Copy a nul-terminated C string pointer into an owned `String`. Returns an empty
/// string for a null pointer, since some optional debug-info fields may be unset.
///
/// # Safety
/// `ptr` must either be null or point to a valid nul-terminated C string.
pub unsafe fn copy_c_str(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Copy a driver-provided array of `count` elements into an owned `Vec`, cloning
/// each element. Create-info pointers are never retained past the call that copies
/// them (§4.2).
///
/// # Safety
/// `ptr` must be valid for reads of `count` contiguous `T` values, or `count` must
/// be zero.
pub unsafe fn copy_array<T: Clone>(ptr: *const T, count: usize) -> Vec<T> {
    if ptr.is_null() || count == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, count).to_vec()
    }
}
