//! Copies an HTTP response body from a byte transport into a file.
//!
//! The transport is polled the way the device's socket is: every call either
//! yields bytes, reports that nothing arrived within one idle poll, or reports
//! that the peer closed. Idle reads are tolerated; a transport failure after
//! the head has been read ends the body early instead of failing the run.

use log::{debug, info, warn};

use crate::{config::DownloadSettings, http::ResponseHeadScanner};


/// Outcome of one transport poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadStatus {
    Data(usize),
    Idle,
    Closed,
}

/// Byte transport carrying the response.
pub trait BodySource {
    type Error: core::fmt::Debug;

    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<ReadStatus, Self::Error>;
}

/// Why the body copy stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyEnd {
    /// Peer closed the connection.
    Closed,
    /// Transport failed mid-body; whatever arrived was kept.
    ConnectionError,
    /// The configured idle limit was hit mid-body.
    IdleLimit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DownloadReport {
    pub status: Option<u16>,
    pub content_length: Option<u32>,
    pub head_bytes: u32,
    pub body_bytes: u32,
    pub idle_polls: u32,
    pub end: BodyEnd,
}

impl DownloadReport {
    /// Fewer body bytes than the advertised length arrived.
    pub fn is_truncated(&self) -> bool {
        self.content_length
            .is_some_and(|expected| self.body_bytes < expected)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DownloadError<ReadErr, WriteErr> {
    Read(ReadErr),
    Write(WriteErr),
    /// Connection closed before the blank line ending the head.
    HeadIncomplete,
    /// Idle limit hit before the head completed.
    IdleTimeout,
    EmptyBuffer,
}

/// Reads the response from `source`, skips its head and writes the body to `sink`.
pub async fn download_body<S, W>(
    source: &mut S,
    sink: &mut W,
    buf: &mut [u8],
    settings: &DownloadSettings,
) -> Result<DownloadReport, DownloadError<S::Error, W::Error>>
where
    S: BodySource,
    W: embedded_io::Write,
{
    if buf.is_empty() {
        return Err(DownloadError::EmptyBuffer);
    }

    let mut scanner = ResponseHeadScanner::new();
    let mut body_bytes = 0u32;
    let mut idle_polls = 0u32;
    let mut idle_streak = 0u32;
    let mut next_progress_at = settings.progress_log_bytes.max(1);

    let end = loop {
        let status = match source.read_chunk(buf).await {
            Ok(status) => status,
            Err(err) if scanner.is_complete() => {
                warn!(
                    "download: transport error after {} body bytes: {:?}",
                    body_bytes, err
                );
                break BodyEnd::ConnectionError;
            }
            Err(err) => return Err(DownloadError::Read(err)),
        };

        let len = match status {
            ReadStatus::Closed => {
                if !scanner.is_complete() {
                    return Err(DownloadError::HeadIncomplete);
                }
                break BodyEnd::Closed;
            }
            ReadStatus::Idle | ReadStatus::Data(0) => {
                idle_polls = idle_polls.saturating_add(1);
                idle_streak = idle_streak.saturating_add(1);
                if let Some(max) = settings.max_idle_polls
                    && idle_streak >= max
                {
                    if !scanner.is_complete() {
                        return Err(DownloadError::IdleTimeout);
                    }
                    warn!(
                        "download: no data for {} polls; keeping {} body bytes",
                        idle_streak, body_bytes
                    );
                    break BodyEnd::IdleLimit;
                }
                continue;
            }
            ReadStatus::Data(len) => len.min(buf.len()),
        };
        idle_streak = 0;

        let mut body = &buf[..len];
        if !scanner.is_complete() {
            let progress = scanner.feed(body);
            body = &body[progress.consumed..];
            if progress.complete {
                info!(
                    "download: response status={:?} content_length={:?} head_bytes={}",
                    scanner.status(),
                    scanner.content_length(),
                    scanner.head_bytes()
                );
                if scanner.is_chunked() {
                    warn!("download: chunked transfer encoding is stored undecoded");
                }
            }
        }

        if body.is_empty() {
            continue;
        }

        sink.write_all(body).map_err(DownloadError::Write)?;
        body_bytes = body_bytes.saturating_add(body.len() as u32);

        if body_bytes >= next_progress_at {
            debug!(
                "download: {} body bytes (expected {:?})",
                body_bytes,
                scanner.content_length()
            );
            next_progress_at = body_bytes.saturating_add(settings.progress_log_bytes.max(1));
        }
    };

    sink.flush().map_err(DownloadError::Write)?;

    let report = DownloadReport {
        status: scanner.status(),
        content_length: scanner.content_length(),
        head_bytes: scanner.head_bytes(),
        body_bytes,
        idle_polls,
        end,
    };
    if report.is_truncated() {
        warn!(
            "download: body truncated {} of {:?} bytes",
            report.body_bytes, report.content_length
        );
    }
    Ok(report)
}
