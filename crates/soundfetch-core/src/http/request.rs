use core::fmt::Write;

use heapless::String as HeaplessString;

use crate::config::FetchTarget;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequestError {
    InvalidTarget,
    TooLong,
}

/// Renders the GET request for `target` into `out`, replacing its contents.
pub fn write_get_request<const N: usize>(
    out: &mut HeaplessString<N>,
    target: &FetchTarget,
) -> Result<(), RequestError> {
    if target.host.is_empty() || !target.path.starts_with('/') {
        return Err(RequestError::InvalidTarget);
    }
    if has_line_break(target.host) || has_line_break(target.path) {
        return Err(RequestError::InvalidTarget);
    }

    out.clear();
    write!(
        out,
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        target.path, target.host
    )
    .map_err(|_| RequestError::TooLong)
}

fn has_line_break(value: &str) -> bool {
    value.bytes().any(|b| b == b'\r' || b == b'\n')
}
