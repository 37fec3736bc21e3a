//! ABI layer for the `es_*` stream functions.
//!
//! An `estream_t` is a pointer to a boxed [`Stream`] registered in the
//! process-wide registry. Every entry point accepts a null stream by
//! failing with `EBADF`, except `es_fflush` (null flushes every stream)
//! and `es_fclose` (null is a no-op).

use std::ffi::{CStr, c_char, c_int, c_long, c_void};

use estream_core::errno;
use estream_core::{BufMode, Result, Stream, StreamError, StreamRegistry, Whence};
use tracing::debug;

use crate::cookie::{CookieBackend, CookieIoFunctions};
use crate::set_abi_errno;

/// Opaque stream handle as seen from C.
pub type EStream = *mut Stream;

unsafe fn fail(err: &StreamError) {
    unsafe { set_abi_errno(err.errno()) };
}

/// Borrow the stream behind a handle, or set `EBADF`.
unsafe fn stream_ref<'a>(stream: EStream) -> Option<&'a Stream> {
    if stream.is_null() {
        unsafe { set_abi_errno(errno::EBADF) };
        return None;
    }
    // SAFETY: non-null handles come from `into_handle` and stay valid
    // until es_fclose.
    Some(unsafe { &*stream })
}

unsafe fn mode_str<'a>(mode: *const c_char) -> Option<&'a str> {
    if mode.is_null() {
        unsafe { set_abi_errno(errno::EINVAL) };
        return None;
    }
    // SAFETY: caller passes a nul-terminated mode string.
    match unsafe { CStr::from_ptr(mode) }.to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            unsafe { set_abi_errno(errno::EINVAL) };
            None
        }
    }
}

unsafe fn into_handle(result: Result<Stream>) -> EStream {
    match result {
        Ok(stream) => Box::into_raw(Box::new(stream)),
        Err(e) => {
            unsafe { fail(&e) };
            std::ptr::null_mut()
        }
    }
}

unsafe fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            unsafe { fail(&e) };
            -1
        }
    }
}

fn mem_limit(memlimit: usize) -> Option<usize> {
    (memlimit != 0).then_some(memlimit)
}

/// Copy `data` into a malloc'd, nul-terminated buffer, reusing `*bufptr`
/// when it is large enough.
unsafe fn store_line(bufptr: *mut *mut c_char, size: *mut usize, data: &[u8]) -> Option<()> {
    let needed = data.len().checked_add(1)?;
    // SAFETY: caller passed valid out-pointers.
    let (mut buf, mut cap) = unsafe { (*bufptr, *size) };
    if buf.is_null() || cap < needed {
        // SAFETY: buf is null or came from malloc/realloc.
        let grown = unsafe { libc::realloc(buf.cast(), needed) }.cast::<c_char>();
        if grown.is_null() {
            return None;
        }
        buf = grown;
        cap = needed;
    }
    // SAFETY: buf holds at least `needed` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), buf.cast::<u8>(), data.len());
        *buf.add(data.len()) = 0;
        *bufptr = buf;
        *size = cap;
    }
    Some(())
}

// ---------------------------------------------------------------------------
// Creation / destruction
// ---------------------------------------------------------------------------

/// Create a stream over caller-supplied callbacks.
///
/// # Safety
///
/// `mode` must be a nul-terminated string; `cookie` must stay valid for the
/// callbacks until `func_close` is called.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fopencookie(
    cookie: *mut c_void,
    mode: *const c_char,
    functions: CookieIoFunctions,
) -> EStream {
    let Some(mode) = (unsafe { mode_str(mode) }) else {
        return std::ptr::null_mut();
    };
    // SAFETY: forwarded caller contract.
    let backend = unsafe { CookieBackend::new(cookie, functions) };
    unsafe { into_handle(Stream::open(StreamRegistry::global(), backend, mode)) }
}

/// Create a growable memory stream; `memlimit` 0 means unlimited.
///
/// # Safety
///
/// `mode` must be a nul-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fopenmem(memlimit: usize, mode: *const c_char) -> EStream {
    let Some(mode) = (unsafe { mode_str(mode) }) else {
        return std::ptr::null_mut();
    };
    unsafe {
        into_handle(Stream::open_memory(
            StreamRegistry::global(),
            mem_limit(memlimit),
            mode,
        ))
    }
}

/// Memory stream preloaded with `datalen` bytes and positioned at the start.
///
/// # Safety
///
/// `mode` must be a nul-terminated string; `data` must be valid for
/// `datalen` bytes unless `datalen` is 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fopenmem_init(
    memlimit: usize,
    mode: *const c_char,
    data: *const c_void,
    datalen: usize,
) -> EStream {
    let Some(mode) = (unsafe { mode_str(mode) }) else {
        return std::ptr::null_mut();
    };
    let init: &[u8] = if data.is_null() || datalen == 0 {
        &[]
    } else {
        // SAFETY: caller contract.
        unsafe { std::slice::from_raw_parts(data.cast(), datalen) }
    };
    unsafe {
        into_handle(Stream::open_memory_init(
            StreamRegistry::global(),
            mem_limit(memlimit),
            mode,
            init,
        ))
    }
}

/// Close a stream. Returns 0, or `EOF` if flushing or closing failed.
///
/// # Safety
///
/// `stream` must be null or a live handle; it is invalid afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fclose(stream: EStream) -> c_int {
    if stream.is_null() {
        return 0;
    }
    // SAFETY: handle came from Box::into_raw and is consumed here.
    let stream = unsafe { Box::from_raw(stream) };
    match stream.close() {
        Ok(()) => 0,
        Err(e) => {
            unsafe { fail(&e) };
            libc::EOF
        }
    }
}

/// Close a memory stream and hand its contents to the caller as a
/// malloc'd buffer (to be released with `free`). With a null `r_buffer`
/// this is `es_fclose`.
///
/// # Safety
///
/// `stream` must be a live handle; `r_buffer` and `r_buflen` must be null
/// or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fclose_snatch(
    stream: EStream,
    r_buffer: *mut *mut c_void,
    r_buflen: *mut usize,
) -> c_int {
    if stream.is_null() {
        unsafe { set_abi_errno(errno::EBADF) };
        return libc::EOF;
    }
    if r_buffer.is_null() {
        return unsafe { es_fclose(stream) };
    }
    // SAFETY: handle came from Box::into_raw and is consumed here.
    let stream = unsafe { Box::from_raw(stream) };
    let data = match stream.close_snatch() {
        Ok(data) => data,
        Err(e) => {
            unsafe { fail(&e) };
            return libc::EOF;
        }
    };
    let buffer = if data.is_empty() {
        std::ptr::null_mut()
    } else {
        // SAFETY: plain allocation; checked for null below.
        let p = unsafe { libc::malloc(data.len()) };
        if p.is_null() {
            unsafe { set_abi_errno(errno::ENOMEM) };
            return libc::EOF;
        }
        // SAFETY: p holds data.len() bytes.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), p.cast::<u8>(), data.len()) };
        p
    };
    // SAFETY: out-pointers valid per caller contract.
    unsafe {
        *r_buffer = buffer;
        if !r_buflen.is_null() {
            *r_buflen = data.len();
        }
    }
    debug!(bytes = data.len(), "memory stream snatched");
    0
}

// ---------------------------------------------------------------------------
// Data transfer
// ---------------------------------------------------------------------------

/// Read up to `bytes_to_read` bytes. Returns 0 or -1; the count goes to
/// `bytes_read` when non-null.
///
/// # Safety
///
/// `buffer` must be valid for `bytes_to_read` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_read(
    stream: EStream,
    buffer: *mut c_void,
    bytes_to_read: usize,
    bytes_read: *mut usize,
) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    let buf: &mut [u8] = if bytes_to_read == 0 || buffer.is_null() {
        &mut []
    } else {
        // SAFETY: caller contract.
        unsafe { std::slice::from_raw_parts_mut(buffer.cast(), bytes_to_read) }
    };
    let (n, rc) = match stream.read(buf) {
        Ok(n) => (n, 0),
        Err(e) => {
            unsafe { fail(&e) };
            (0, -1)
        }
    };
    if !bytes_read.is_null() {
        // SAFETY: caller contract.
        unsafe { *bytes_read = n };
    }
    rc
}

/// Write `bytes_to_write` bytes. Returns 0 or -1; the count goes to
/// `bytes_written` when non-null.
///
/// # Safety
///
/// `buffer` must be valid for `bytes_to_write` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_write(
    stream: EStream,
    buffer: *const c_void,
    bytes_to_write: usize,
    bytes_written: *mut usize,
) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    let buf: &[u8] = if bytes_to_write == 0 || buffer.is_null() {
        &[]
    } else {
        // SAFETY: caller contract.
        unsafe { std::slice::from_raw_parts(buffer.cast(), bytes_to_write) }
    };
    let (n, rc) = match stream.write(buf) {
        Ok(n) => (n, 0),
        Err(e) => {
            unsafe { fail(&e) };
            (0, -1)
        }
    };
    if !bytes_written.is_null() {
        // SAFETY: caller contract.
        unsafe { *bytes_written = n };
    }
    rc
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fgetc(stream: EStream) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return libc::EOF;
    };
    match stream.getc() {
        Ok(Some(b)) => c_int::from(b),
        Ok(None) => libc::EOF,
        Err(e) => {
            unsafe { fail(&e) };
            libc::EOF
        }
    }
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fputc(c: c_int, stream: EStream) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return libc::EOF;
    };
    let byte = c as u8;
    match stream.putc(byte) {
        Ok(()) => c_int::from(byte),
        Err(e) => {
            unsafe { fail(&e) };
            libc::EOF
        }
    }
}

/// Push one byte back. Returns it, or `EOF` if `c` is `EOF` or the
/// pushback area is full.
///
/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_ungetc(c: c_int, stream: EStream) -> c_int {
    if c == libc::EOF {
        return libc::EOF;
    }
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return libc::EOF;
    };
    let byte = c as u8;
    match stream.unread(&[byte]) {
        Ok(1) => c_int::from(byte),
        Ok(_) => libc::EOF,
        Err(e) => {
            unsafe { fail(&e) };
            libc::EOF
        }
    }
}

/// Expose buffered input without consuming it. `*data` stays valid until
/// the next operation on the stream.
///
/// # Safety
///
/// `data` and `datalen` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_peek(
    stream: EStream,
    data: *mut *const u8,
    datalen: *mut usize,
) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    if data.is_null() || datalen.is_null() {
        unsafe { set_abi_errno(errno::EINVAL) };
        return -1;
    }
    let mut core = stream.lock();
    match core.peek() {
        Ok(view) => {
            // SAFETY: out-pointers checked above.
            unsafe {
                *data = view.as_ptr();
                *datalen = view.len();
            }
            0
        }
        Err(e) => {
            unsafe { fail(&e) };
            -1
        }
    }
}

/// Consume `size` bytes of what `es_peek` exposed.
///
/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_skip(stream: EStream, size: usize) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    unsafe { status(stream.lock().skip(size)) }
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

/// POSIX-style `getline`: `*lineptr` is a malloc'd buffer of `*n` bytes,
/// grown as needed. Returns the line length, or -1 at end of input or on
/// error.
///
/// # Safety
///
/// `lineptr` and `n` must be valid; `*lineptr` must be null or malloc'd.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_getline(
    lineptr: *mut *mut c_char,
    n: *mut usize,
    stream: EStream,
) -> isize {
    unsafe { es_read_line(stream, 0, lineptr, n) }
}

/// Like `es_getline` with at most `max_length - 1` bytes stored per call
/// (0 means unbounded).
///
/// # Safety
///
/// Same as `es_getline`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_read_line(
    stream: EStream,
    max_length: usize,
    lineptr: *mut *mut c_char,
    n: *mut usize,
) -> isize {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    if lineptr.is_null() || n.is_null() {
        unsafe { set_abi_errno(errno::EINVAL) };
        return -1;
    }
    let mut line = Vec::new();
    match stream.read_line(max_length, &mut line) {
        Ok(0) => -1,
        Ok(len) => {
            if unsafe { store_line(lineptr, n, &line) }.is_none() {
                unsafe { set_abi_errno(errno::ENOMEM) };
                return -1;
            }
            len as isize
        }
        Err(e) => {
            unsafe { fail(&e) };
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Positioning and flushing
// ---------------------------------------------------------------------------

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fseek(stream: EStream, offset: c_long, whence: c_int) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    let Some(whence) = Whence::from_posix(whence) else {
        unsafe { set_abi_errno(errno::EINVAL) };
        return -1;
    };
    unsafe { status(stream.seek(i64::from(offset), whence).map(|_| ())) }
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_ftell(stream: EStream) -> c_long {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    match c_long::try_from(stream.tell()) {
        Ok(pos) => pos,
        Err(_) => {
            unsafe { set_abi_errno(errno::EOVERFLOW) };
            -1
        }
    }
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_rewind(stream: EStream) {
    if let Some(stream) = unsafe { stream_ref(stream) }
        && let Err(e) = stream.rewind()
    {
        unsafe { fail(&e) };
    }
}

/// Flush one stream, or every open stream when `stream` is null.
///
/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_fflush(stream: EStream) -> c_int {
    let result = if stream.is_null() {
        StreamRegistry::global().flush_all()
    } else {
        // SAFETY: non-null live handle.
        unsafe { &*stream }.flush()
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            unsafe { fail(&e) };
            libc::EOF
        }
    }
}

/// Select the buffering strategy (`_IOFBF`, `_IOLBF`, `_IONBF`). The buffer
/// capacity is fixed at creation; `buf` and `size` are ignored.
///
/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_setvbuf(
    stream: EStream,
    _buf: *mut c_char,
    mode: c_int,
    _size: usize,
) -> c_int {
    let Some(stream) = (unsafe { stream_ref(stream) }) else {
        return -1;
    };
    let Some(mode) = BufMode::from_posix(mode) else {
        unsafe { set_abi_errno(errno::EINVAL) };
        return -1;
    };
    unsafe { status(stream.set_buffering(mode)) }
}

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_feof(stream: EStream) -> c_int {
    match unsafe { stream_ref(stream) } {
        Some(stream) => c_int::from(stream.is_eof()),
        None => 0,
    }
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_ferror(stream: EStream) -> c_int {
    match unsafe { stream_ref(stream) } {
        Some(stream) => c_int::from(stream.is_error()),
        None => 0,
    }
}

/// # Safety
///
/// `stream` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn es_clearerr(stream: EStream) {
    if let Some(stream) = unsafe { stream_ref(stream) } {
        stream.clear_error();
    }
}
