//! # estream-abi
//!
//! `extern "C"` boundary for estream. Builds `libestream.so`, exposing the
//! `es_*` stream functions over opaque stream pointers.
//!
//! ```text
//! C caller -> es_* entry (this crate) -> estream-core Stream -> backend callbacks
//! ```
//!
//! Failures return `-1`, `EOF` or a null pointer and set `errno`.

pub mod cookie;
pub mod stream_abi;

pub use cookie::{CookieBackend, CookieIoFunctions};

use std::ffi::c_int;

/// Set the calling thread's `errno`.
pub(crate) unsafe fn set_abi_errno(val: c_int) {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    // SAFETY: __errno_location returns a valid TLS pointer for this thread.
    let p = unsafe { libc::__errno_location() };
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    // SAFETY: __error returns a valid TLS pointer for this thread.
    let p = unsafe { libc::__error() };
    // SAFETY: pointer is valid for write per errno ABI contract.
    unsafe { *p = val };
}
