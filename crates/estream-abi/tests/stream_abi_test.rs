//! Integration tests for the es_* ABI surface.
//!
//! Cookie streams are driven by Rust `extern "C"` callbacks over a
//! heap-allocated [`Cookie`].

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::{Mutex, MutexGuard};

use estream_abi::CookieIoFunctions;
use estream_abi::stream_abi::*;

// es_fflush(NULL) walks the process-wide registry, so tests must not see
// each other's streams.
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Cookie {
    data: Vec<u8>,
    pos: usize,
    flushes: usize,
    closed: bool,
    fail_writes: bool,
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

unsafe fn cookie<'a>(c: *mut c_void) -> &'a mut Cookie {
    // SAFETY: tests pass a pointer obtained from Box::into_raw.
    unsafe { &mut *c.cast::<Cookie>() }
}

unsafe extern "C" fn cookie_read(c: *mut c_void, buf: *mut c_void, size: usize) -> isize {
    let c = unsafe { cookie(c) };
    let n = size.min(c.data.len() - c.pos);
    unsafe { ptr::copy_nonoverlapping(c.data[c.pos..].as_ptr(), buf.cast::<u8>(), n) };
    c.pos += n;
    n as isize
}

unsafe extern "C" fn cookie_write(c: *mut c_void, buf: *const c_void, size: usize) -> isize {
    let c = unsafe { cookie(c) };
    if buf.is_null() && size == 0 {
        c.flushes += 1;
        return 0;
    }
    if c.fail_writes {
        unsafe { *libc::__errno_location() = libc::EIO };
        return -1;
    }
    let src = unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), size) };
    let end = c.pos + size;
    if c.data.len() < end {
        c.data.resize(end, 0);
    }
    c.data[c.pos..end].copy_from_slice(src);
    c.pos = end;
    size as isize
}

unsafe extern "C" fn cookie_seek(c: *mut c_void, pos: *mut i64, whence: c_int) -> c_int {
    let c = unsafe { cookie(c) };
    let base = match whence {
        libc::SEEK_SET => 0,
        libc::SEEK_CUR => c.pos as i64,
        libc::SEEK_END => c.data.len() as i64,
        _ => return -1,
    };
    let target = base + unsafe { *pos };
    if target < 0 {
        unsafe { *libc::__errno_location() = libc::EINVAL };
        return -1;
    }
    c.pos = target as usize;
    unsafe { *pos = target };
    0
}

unsafe extern "C" fn cookie_close(c: *mut c_void) -> c_int {
    unsafe { cookie(c) }.closed = true;
    0
}

fn all_functions() -> CookieIoFunctions {
    CookieIoFunctions {
        func_read: Some(cookie_read),
        func_write: Some(cookie_write),
        func_seek: Some(cookie_seek),
        func_close: Some(cookie_close),
    }
}

fn mode(m: &str) -> CString {
    CString::new(m).unwrap()
}

#[test]
fn cookie_stream_write_seek_read() {
    let _guard = serial();
    let raw = Box::into_raw(Box::new(Cookie::default()));
    let m = mode("w+");
    unsafe {
        let s = es_fopencookie(raw.cast(), m.as_ptr(), all_functions());
        assert!(!s.is_null());

        let mut written = 0usize;
        assert_eq!(es_write(s, b"hello world".as_ptr().cast(), 11, &mut written), 0);
        assert_eq!(written, 11);
        assert!((*raw).data.is_empty());
        assert_eq!(es_ftell(s), 11);

        assert_eq!(es_fseek(s, 6, libc::SEEK_SET), 0);
        assert_eq!((*raw).data, b"hello world");
        assert_eq!((*raw).flushes, 1);

        let mut buf = [0u8; 16];
        let mut got = 0usize;
        assert_eq!(es_read(s, buf.as_mut_ptr().cast(), buf.len(), &mut got), 0);
        assert_eq!(&buf[..got], b"world");
        assert_eq!(es_feof(s), 1);

        assert_eq!(es_fclose(s), 0);
        assert!((*raw).closed);
        drop(Box::from_raw(raw));
    }
}

#[test]
fn cookie_write_failure_sets_errno_and_error_indicator() {
    let _guard = serial();
    let raw = Box::into_raw(Box::new(Cookie {
        fail_writes: true,
        ..Cookie::default()
    }));
    let m = mode("w");
    unsafe {
        let s = es_fopencookie(raw.cast(), m.as_ptr(), all_functions());
        assert_eq!(es_fputc(c_int::from(b'x'), s), c_int::from(b'x'));
        assert_eq!(es_fflush(s), libc::EOF);
        assert_eq!(last_errno(), libc::EIO);
        assert_eq!(es_ferror(s), 1);
        es_clearerr(s);
        assert_eq!(es_ferror(s), 0);
        assert_eq!(es_fclose(s), libc::EOF);
        assert!((*raw).closed);
        drop(Box::from_raw(raw));
    }
}

#[test]
fn missing_read_function_is_unsupported() {
    let _guard = serial();
    let raw = Box::into_raw(Box::new(Cookie::default()));
    let functions = CookieIoFunctions {
        func_read: None,
        ..all_functions()
    };
    let m = mode("r");
    unsafe {
        let s = es_fopencookie(raw.cast(), m.as_ptr(), functions);
        assert_eq!(es_fgetc(s), libc::EOF);
        assert_eq!(last_errno(), libc::EOPNOTSUPP);
        assert_eq!(es_ferror(s), 1);
        es_fclose(s);
        drop(Box::from_raw(raw));
    }
}

#[test]
fn bad_mode_returns_null_with_einval() {
    let _guard = serial();
    let m = mode("q");
    unsafe {
        assert!(es_fopenmem(0, m.as_ptr()).is_null());
        assert_eq!(last_errno(), libc::EINVAL);
        assert!(es_fopenmem(0, ptr::null()).is_null());
        assert_eq!(last_errno(), libc::EINVAL);
    }
}

#[test]
fn memory_stream_snatch() {
    let _guard = serial();
    let m = mode("w");
    unsafe {
        let s = es_fopenmem(0, m.as_ptr());
        let mut n = 0usize;
        assert_eq!(es_write(s, b"abc".as_ptr().cast(), 3, &mut n), 0);
        let mut buf: *mut c_void = ptr::null_mut();
        let mut len = 0usize;
        assert_eq!(es_fclose_snatch(s, &mut buf, &mut len), 0);
        assert_eq!(len, 3);
        assert_eq!(std::slice::from_raw_parts(buf.cast::<u8>(), len), b"abc");
        libc::free(buf);
    }
}

#[test]
fn memory_limit_is_enforced() {
    let _guard = serial();
    let m = mode("w");
    unsafe {
        let s = es_fopenmem(4, m.as_ptr());
        assert_eq!(es_setvbuf(s, ptr::null_mut(), libc::_IONBF, 0), 0);
        let mut n = 0usize;
        assert_eq!(es_write(s, b"abcdef".as_ptr().cast(), 6, &mut n), -1);
        assert_eq!(last_errno(), libc::ENOSPC);
        assert_eq!(es_setvbuf(s, ptr::null_mut(), 42, 0), -1);
        assert_eq!(last_errno(), libc::EINVAL);
        es_fclose(s);
    }
}

#[test]
fn getline_peek_skip_ungetc() {
    let _guard = serial();
    let m = mode("r");
    let text = b"first\nsecond\nend";
    unsafe {
        let s = es_fopenmem_init(0, m.as_ptr(), text.as_ptr().cast(), text.len());
        assert!(!s.is_null());

        let mut data: *const u8 = ptr::null();
        let mut datalen = 0usize;
        assert_eq!(es_peek(s, &mut data, &mut datalen), 0);
        assert_eq!(std::slice::from_raw_parts(data, datalen), text);
        assert_eq!(es_skip(s, 1), 0);
        assert_eq!(es_ungetc(c_int::from(b'F'), s), c_int::from(b'F'));

        let mut line: *mut c_char = ptr::null_mut();
        let mut cap = 0usize;
        assert_eq!(es_getline(&mut line, &mut cap, s), 6);
        assert_eq!(std::ffi::CStr::from_ptr(line).to_bytes(), b"First\n");
        assert_eq!(es_read_line(s, 4, &mut line, &mut cap), 3);
        assert_eq!(std::ffi::CStr::from_ptr(line).to_bytes(), b"sec");
        assert_eq!(es_getline(&mut line, &mut cap, s), 4);
        assert_eq!(es_getline(&mut line, &mut cap, s), 3);
        assert_eq!(std::ffi::CStr::from_ptr(line).to_bytes(), b"end");
        assert_eq!(es_getline(&mut line, &mut cap, s), -1);
        assert_eq!(es_feof(s), 1);
        libc::free(line.cast());

        es_rewind(s);
        assert_eq!(es_feof(s), 0);
        assert_eq!(es_fgetc(s), c_int::from(b'f'));
        assert_eq!(es_fclose(s), 0);
    }
}

#[test]
fn null_stream_handling() {
    let _guard = serial();
    unsafe {
        assert_eq!(es_fclose(ptr::null_mut()), 0);
        assert_eq!(es_fgetc(ptr::null_mut()), libc::EOF);
        assert_eq!(last_errno(), libc::EBADF);
        assert_eq!(es_fflush(ptr::null_mut()), 0);
    }
}
