use heapless::Vec as HeaplessVec;

/// Longest head line kept for parsing. Longer lines are still skipped
/// correctly, only their tail is ignored.
const LINE_BYTES: usize = 128;

/// Result of feeding one chunk to the scanner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeadProgress {
    /// Bytes of the chunk that belonged to the response head.
    pub consumed: usize,
    /// The blank line ending the head has been seen.
    pub complete: bool,
}

/// Incremental scanner for the status line and header block.
///
/// The head ends at the first line that is empty or holds a lone `\r`.
/// Everything after that line is body, even inside the same chunk.
#[derive(Debug, Clone)]
pub struct ResponseHeadScanner {
    line: HeaplessVec<u8, LINE_BYTES>,
    line_overflow: bool,
    lines_seen: u16,
    head_bytes: u32,
    complete: bool,
    status: Option<u16>,
    content_length: Option<u32>,
    chunked: bool,
}

impl Default for ResponseHeadScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseHeadScanner {
    pub const fn new() -> Self {
        Self {
            line: HeaplessVec::new(),
            line_overflow: false,
            lines_seen: 0,
            head_bytes: 0,
            complete: false,
            status: None,
            content_length: None,
            chunked: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> HeadProgress {
        if self.complete {
            return HeadProgress {
                consumed: 0,
                complete: true,
            };
        }

        for (index, byte) in chunk.iter().copied().enumerate() {
            self.head_bytes = self.head_bytes.saturating_add(1);
            if byte == b'\n' {
                if self.finish_line() {
                    self.complete = true;
                    return HeadProgress {
                        consumed: index + 1,
                        complete: true,
                    };
                }
            } else if self.line.push(byte).is_err() {
                self.line_overflow = true;
            }
        }

        HeadProgress {
            consumed: chunk.len(),
            complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn content_length(&self) -> Option<u32> {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn head_bytes(&self) -> u32 {
        self.head_bytes
    }

    /// Returns `true` when the finished line was the blank separator.
    fn finish_line(&mut self) -> bool {
        let mut line: &[u8] = &self.line;
        if let Some((&b'\r', rest)) = line.split_last() {
            line = rest;
        }

        let blank = line.is_empty() && !self.line_overflow;
        if !blank {
            if self.lines_seen == 0 {
                self.status = parse_status_line(line);
            } else {
                match parse_header(line) {
                    Some(Header::ContentLength(len)) => self.content_length = Some(len),
                    Some(Header::Chunked) => self.chunked = true,
                    None => {}
                }
            }
        }

        self.lines_seen = self.lines_seen.saturating_add(1);
        self.line.clear();
        self.line_overflow = false;
        blank
    }
}

enum Header {
    ContentLength(u32),
    Chunked,
}

fn parse_status_line(line: &[u8]) -> Option<u16> {
    let text = core::str::from_utf8(line).ok()?;
    let mut parts = text.split_ascii_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

fn parse_header(line: &[u8]) -> Option<Header> {
    let colon = line.iter().position(|b| *b == b':')?;
    let name = line[..colon].trim_ascii();
    let value = line[colon + 1..].trim_ascii();

    if name.eq_ignore_ascii_case(b"content-length") {
        let text = core::str::from_utf8(value).ok()?;
        return text.parse().ok().map(Header::ContentLength);
    }
    if name.eq_ignore_ascii_case(b"transfer-encoding")
        && value
            .windows(b"chunked".len())
            .any(|w| w.eq_ignore_ascii_case(b"chunked"))
    {
        return Some(Header::Chunked);
    }
    None
}
