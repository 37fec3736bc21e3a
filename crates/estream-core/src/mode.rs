//! Mode string interpretation.
//!
//! Grammar: a base character `r`, `w` or `a`, then any of `+` (read-write),
//! `b` (binary) and `x` (exclusive create) in any order. Unknown modifier
//! characters are ignored.

use crate::error::{Result, StreamError};

/// Direction(s) a stream was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Result of parsing a mode string: access mode plus creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub access: AccessMode,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    pub exclusive: bool,
    pub binary: bool,
}

impl OpenFlags {
    pub const READ: Self = Self::with_access(AccessMode::ReadOnly);
    pub const READ_WRITE: Self = Self::with_access(AccessMode::ReadWrite);

    const fn with_access(access: AccessMode) -> Self {
        Self {
            access,
            create: false,
            truncate: false,
            append: false,
            exclusive: false,
            binary: false,
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(self.access, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.access, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }

    /// Equivalent `std::fs::OpenOptions` for file-backed streams.
    pub fn to_open_options(&self) -> std::fs::OpenOptions {
        let mut opts = std::fs::OpenOptions::new();
        opts.read(self.is_readable())
            .write(self.is_writable() && !self.append)
            .append(self.append)
            .truncate(self.truncate);
        if self.exclusive && self.create {
            opts.create_new(true);
        } else {
            opts.create(self.create);
        }
        opts
    }
}

/// Parse a mode string (e.g. "r", "w+", "rb", "a+x").
pub fn parse_mode(mode: &str) -> Result<OpenFlags> {
    let bytes = mode.as_bytes();
    let Some((&base, modifiers)) = bytes.split_first() else {
        return Err(StreamError::InvalidArgument("empty mode string"));
    };

    let mut flags = match base {
        b'r' => OpenFlags::with_access(AccessMode::ReadOnly),
        b'w' => OpenFlags {
            create: true,
            truncate: true,
            ..OpenFlags::with_access(AccessMode::WriteOnly)
        },
        b'a' => OpenFlags {
            create: true,
            append: true,
            ..OpenFlags::with_access(AccessMode::WriteOnly)
        },
        _ => return Err(StreamError::InvalidArgument("mode must start with r, w or a")),
    };

    for &m in modifiers {
        match m {
            b'+' => flags.access = AccessMode::ReadWrite,
            b'b' => flags.binary = true,
            b'x' => flags.exclusive = true,
            _ => {}
        }
    }

    Ok(flags)
}
