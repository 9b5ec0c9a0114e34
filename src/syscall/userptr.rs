//! Userspace pointer validation and copy helpers.
//!
//! Every pointer crossing the syscall boundary goes through these before it
//! is dereferenced: non-null, below the canonical kernel split, and the full
//! object must fit without overflowing into kernel space. Validation cannot
//! prove the page is mapped; a fault on an unmapped-but-canonical address is
//! the page fault handler's problem.

use crate::signal::SignalError;

/// On x86_64 the canonical address split is at 0x0000_8000_0000_0000;
/// addresses at or above it are kernel addresses.
const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

/// Validate that `ptr` points at a whole `T` inside userspace.
pub fn validate_user_ptr<T>(ptr: *const T) -> Result<(), SignalError> {
    let addr = ptr as u64;
    let size = core::mem::size_of::<T>() as u64;

    if ptr.is_null() {
        return Err(SignalError::CopyFault);
    }
    if addr >= USER_SPACE_END {
        return Err(SignalError::CopyFault);
    }
    // end address must not overflow or cross into kernel space
    if addr.checked_add(size).map_or(true, |end| end > USER_SPACE_END) {
        return Err(SignalError::CopyFault);
    }
    Ok(())
}

/// Copy a `T` in from userspace.
pub fn copy_from_user<T: Copy>(ptr: *const T) -> Result<T, SignalError> {
    validate_user_ptr(ptr)?;
    // SAFETY: validated non-null, in userspace range, no overflow. An
    // unmapped address still faults; see module docs.
    Ok(unsafe { core::ptr::read_volatile(ptr) })
}

/// Copy a `T` out to userspace.
pub fn copy_to_user<T: Copy>(ptr: *mut T, value: &T) -> Result<(), SignalError> {
    validate_user_ptr(ptr as *const T)?;
    // SAFETY: same validation as copy_from_user
    unsafe { core::ptr::write_volatile(ptr, *value) };
    Ok(())
}
