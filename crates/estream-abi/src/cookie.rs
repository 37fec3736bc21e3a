//! Backend over C callback functions and an opaque cookie.
//!
//! A callback reports failure by returning `-1` with `errno` set; the
//! error is captured immediately after the call.

use std::ffi::{c_int, c_void};
use std::io;

use estream_core::{Backend, Capabilities, Result, StreamError, Whence};

pub type CookieReadFn = unsafe extern "C" fn(cookie: *mut c_void, buf: *mut c_void, size: usize) -> isize;
pub type CookieWriteFn =
    unsafe extern "C" fn(cookie: *mut c_void, buf: *const c_void, size: usize) -> isize;
pub type CookieSeekFn = unsafe extern "C" fn(cookie: *mut c_void, pos: *mut i64, whence: c_int) -> c_int;
pub type CookieCloseFn = unsafe extern "C" fn(cookie: *mut c_void) -> c_int;

/// Callback table passed to `es_fopencookie`. Missing entries make the
/// stream lack that capability.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieIoFunctions {
    pub func_read: Option<CookieReadFn>,
    pub func_write: Option<CookieWriteFn>,
    pub func_seek: Option<CookieSeekFn>,
    pub func_close: Option<CookieCloseFn>,
}

pub struct CookieBackend {
    cookie: *mut c_void,
    functions: CookieIoFunctions,
}

// SAFETY: the cookie is only touched through the callbacks, and the stream
// lock serializes every call. Callers of es_fopencookie hand over the
// cookie for the stream's lifetime.
unsafe impl Send for CookieBackend {}

impl CookieBackend {
    /// # Safety
    ///
    /// `cookie` must remain valid for every callback in `functions` until
    /// `func_close` has been called.
    pub unsafe fn new(cookie: *mut c_void, functions: CookieIoFunctions) -> Self {
        Self { cookie, functions }
    }
}

fn callback_error() -> StreamError {
    StreamError::Io(io::Error::last_os_error())
}

impl Backend for CookieBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: self.functions.func_read.is_some(),
            write: self.functions.func_write.is_some(),
            seek: self.functions.func_seek.is_some(),
            close: self.functions.func_close.is_some(),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(f) = self.functions.func_read else {
            return Err(StreamError::Unsupported("read"));
        };
        // SAFETY: buf is valid for buf.len() bytes; cookie validity per `new`.
        let n = unsafe { f(self.cookie, buf.as_mut_ptr().cast(), buf.len()) };
        usize::try_from(n).map_err(|_| callback_error())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(f) = self.functions.func_write else {
            return Err(StreamError::Unsupported("write"));
        };
        // SAFETY: buf is valid for buf.len() bytes; cookie validity per `new`.
        let n = unsafe { f(self.cookie, buf.as_ptr().cast(), buf.len()) };
        usize::try_from(n).map_err(|_| callback_error())
    }

    /// Zero-length write with a null buffer.
    fn flush(&mut self) -> Result<()> {
        let Some(f) = self.functions.func_write else {
            return Ok(());
        };
        // SAFETY: a zero-length request never dereferences the buffer.
        let n = unsafe { f(self.cookie, std::ptr::null(), 0) };
        if n < 0 {
            return Err(callback_error());
        }
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let Some(f) = self.functions.func_seek else {
            return Err(StreamError::Unsupported("seek"));
        };
        let mut pos = offset;
        // SAFETY: pos is a valid i64 for the duration of the call.
        let rc = unsafe { f(self.cookie, &mut pos, whence.as_posix()) };
        if rc != 0 {
            return Err(callback_error());
        }
        u64::try_from(pos).map_err(|_| StreamError::InvalidArgument("negative seek result"))
    }

    fn close(&mut self) -> Result<()> {
        let Some(f) = self.functions.func_close.take() else {
            return Ok(());
        };
        // SAFETY: cookie validity per `new`; take() guarantees a single call.
        if unsafe { f(self.cookie) } != 0 {
            return Err(callback_error());
        }
        Ok(())
    }
}
