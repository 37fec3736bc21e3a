//! Shared fixtures for the estream benchmarks.

/// Text of `lines` lines, each `width` bytes including the newline.
pub fn line_payload(lines: usize, width: usize) -> Vec<u8> {
    let width = width.max(1);
    let mut out = Vec::with_capacity(lines * width);
    for i in 0..lines {
        out.extend((0..width - 1).map(|j| b'a' + ((i + j) % 26) as u8));
        out.push(b'\n');
    }
    out
}
