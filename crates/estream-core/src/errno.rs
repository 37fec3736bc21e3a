//! Error number definitions.
//!
//! The POSIX errno values a stream can report. Core code never touches the
//! thread-local `errno`; the ABI layer stores [`crate::StreamError::errno`]
//! there when it returns a failure to a C caller.

pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const ENOMEM: i32 = 12;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
pub const ESPIPE: i32 = 29;
pub const EOVERFLOW: i32 = 75;
pub const EOPNOTSUPP: i32 = 95;

/// Short symbolic name for an errno value, used in diagnostics.
pub fn name(errno: i32) -> &'static str {
    match errno {
        EIO => "EIO",
        EBADF => "EBADF",
        ENOMEM => "ENOMEM",
        EEXIST => "EEXIST",
        EINVAL => "EINVAL",
        ENOSPC => "ENOSPC",
        ESPIPE => "ESPIPE",
        EOVERFLOW => "EOVERFLOW",
        EOPNOTSUPP => "EOPNOTSUPP",
        _ => "E?",
    }
}
