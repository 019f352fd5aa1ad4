use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Take};

use crate::chunked::ChunkedDecoder;
use crate::headers::Headers;
use crate::socket::Connection;

/// Longest status or header line accepted.
const MAX_HEAD_LINE: u64 = 8192;
const MAX_HEADERS: usize = 128;

type ConnReader = BufReader<Box<dyn Connection>>;

/// Status line and headers of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub code: u16,
    pub msg: String,
    pub headers: Headers,
}

/// Read the status line and headers, leaving the reader at the first body
/// byte.
pub fn read_head<R: BufRead>(reader: &mut R) -> io::Result<ResponseHead> {
    let status = read_line(reader)?;
    let mut parts = status.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(invalid(format!("invalid status line {status:?}")));
    }
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| invalid(format!("invalid status code in {status:?}")))?;
    let msg = parts.next().unwrap_or_default().trim().to_string();

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(invalid("too many response headers".into()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid(format!("invalid header line {line:?}")))?;
        headers.set(name.trim(), value.trim());
    }
    Ok(ResponseHead { code, msg, headers })
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let read = reader.by_ref().take(MAX_HEAD_LINE).read_line(&mut line)?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before end of response head",
        ));
    }
    if !line.ends_with('\n') {
        if read as u64 >= MAX_HEAD_LINE {
            return Err(invalid("response head line too long".into()));
        }
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside response head",
        ));
    }
    let trimmed = line.trim_end_matches(&['\r', '\n'][..]).len();
    line.truncate(trimmed);
    Ok(line)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Body framing derived from the response head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    Empty,
    Fixed(u64),
    Chunked,
    UntilEof,
}

impl Framing {
    fn of(head: &ResponseHead) -> io::Result<Self> {
        if (100..200).contains(&head.code) || head.code == 204 || head.code == 304 {
            return Ok(Self::Empty);
        }
        let chunked = head
            .headers
            .get("Transfer-Encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Ok(Self::Chunked);
        }
        match head.headers.get("Content-Length") {
            Some(len) => len
                .trim()
                .parse::<u64>()
                .map(Self::Fixed)
                .map_err(|_| invalid(format!("invalid Content-Length {len:?}"))),
            None => Ok(Self::UntilEof),
        }
    }
}

/// Response body reader.
pub enum Body {
    Empty(ConnReader),
    Fixed(Take<ConnReader>),
    Chunked(ChunkedDecoder<ConnReader>),
    UntilEof(ConnReader),
}

impl Body {
    fn new(framing: Framing, reader: ConnReader) -> Self {
        match framing {
            Framing::Empty => Self::Empty(reader),
            Framing::Fixed(len) => Self::Fixed(reader.take(len)),
            Framing::Chunked => Self::Chunked(ChunkedDecoder::new(reader)),
            Framing::UntilEof => Self::UntilEof(reader),
        }
    }

    fn into_connection(self) -> Box<dyn Connection> {
        match self {
            Self::Empty(r) | Self::UntilEof(r) => r.into_inner(),
            Self::Fixed(r) => r.into_inner().into_inner(),
            Self::Chunked(r) => r.into_inner().into_inner(),
        }
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Empty(_) => Ok(0),
            Self::Fixed(r) => r.read(buf),
            Self::Chunked(r) => r.read(buf),
            Self::UntilEof(r) => r.read(buf),
        }
    }
}

/// An HTTP response whose body is still on the wire.
///
/// The caller owns the response and must [`close`](Response::close) it.
pub struct Response {
    head: ResponseHead,
    body: Body,
}

impl Response {
    /// Read a response head from `reader` and frame its body.
    ///
    /// On failure the connection is handed back so the caller can close it.
    pub fn read_from(mut reader: ConnReader) -> Result<Self, (io::Error, Box<dyn Connection>)> {
        let head = match read_head(&mut reader) {
            Ok(head) => head,
            Err(e) => return Err((e, reader.into_inner())),
        };
        let framing = match Framing::of(&head) {
            Ok(framing) => framing,
            Err(e) => return Err((e, reader.into_inner())),
        };
        Ok(Self {
            body: Body::new(framing, reader),
            head,
        })
    }

    pub fn code(&self) -> u16 {
        self.head.code
    }

    pub fn msg(&self) -> &str {
        &self.head.msg
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name)
    }

    pub fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Release the response. With `discard`, the unread body is drained and
    /// thrown away before the connection is dropped.
    pub fn close(self, discard: bool) {
        let mut body = self.body;
        if discard {
            if let Err(e) = io::copy(&mut body, &mut io::sink()) {
                tracing::debug!(error = %e, "failed to drain response body");
            }
        }
        drop(body.into_connection());
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.head.code)
            .field("msg", &self.head.msg)
            .field("headers", &self.head.headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Canned {
        input: Cursor<Vec<u8>>,
        dropped: Arc<AtomicUsize>,
    }

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for Canned {
        fn set_timeout(&mut self, _: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn shutdown_input(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for Canned {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn response(wire: &[u8]) -> (Response, Arc<AtomicUsize>) {
        let dropped = Arc::new(AtomicUsize::new(0));
        let conn: Box<dyn Connection> = Box::new(Canned {
            input: Cursor::new(wire.to_vec()),
            dropped: Arc::clone(&dropped),
        });
        let resp = Response::read_from(BufReader::new(conn)).map_err(|(e, _)| e).unwrap();
        (resp, dropped)
    }

    fn body_of(resp: &mut Response) -> Vec<u8> {
        let mut out = Vec::new();
        resp.body().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn parses_status_and_headers() {
        let (resp, _) = response(
            b"HTTP/1.1 201 Created\r\nX-oio-Chunk-Meta-Chunk-Hash: ABCD\r\nContent-Length: 0\r\n\r\n",
        );
        assert_eq!(resp.code(), 201);
        assert_eq!(resp.msg(), "Created");
        assert_eq!(resp.header("x-oio-chunk-meta-chunk-hash"), Some("ABCD"));
        assert_eq!(resp.headers().len(), 2);
    }

    #[test]
    fn status_message_may_contain_spaces() {
        let (resp, _) = response(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(resp.code(), 404);
        assert_eq!(resp.msg(), "Not Found");
    }

    #[test]
    fn fixed_length_body_stops_at_length() {
        let (mut resp, _) = response(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello world");
        assert_eq!(body_of(&mut resp), b"hello");
    }

    #[test]
    fn chunked_body_is_decoded() {
        let (mut resp, _) = response(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n",
        );
        assert_eq!(body_of(&mut resp), b"abcde");
    }

    #[test]
    fn body_without_framing_reads_until_eof() {
        let (mut resp, _) = response(b"HTTP/1.0 200 OK\r\n\r\nall of it");
        assert_eq!(body_of(&mut resp), b"all of it");
    }

    #[test]
    fn no_content_has_empty_body() {
        let (mut resp, _) = response(b"HTTP/1.1 204 No Content\r\n\r\ntrailing");
        assert!(body_of(&mut resp).is_empty());
    }

    #[test]
    fn close_discard_drains_and_drops_connection() {
        let (resp, dropped) = response(b"HTTP/1.1 500 Oops\r\nContent-Length: 3\r\n\r\nerr");
        resp.close(true);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn garbage_status_line_is_rejected() {
        let conn: Box<dyn Connection> = Box::new(Canned {
            input: Cursor::new(b"SSH-2.0-OpenSSH\r\n\r\n".to_vec()),
            dropped: Arc::new(AtomicUsize::new(0)),
        });
        let (err, _conn) = Response::read_from(BufReader::new(conn)).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_head_is_unexpected_eof() {
        let mut reader = &b"HTTP/1.1 200 OK\r\nContent-Le"[..];
        let err = read_head(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn invalid_content_length_is_rejected() {
        let conn: Box<dyn Connection> = Box::new(Canned {
            input: Cursor::new(b"HTTP/1.1 200 OK\r\nContent-Length: lots\r\n\r\n".to_vec()),
            dropped: Arc::new(AtomicUsize::new(0)),
        });
        assert!(Response::read_from(BufReader::new(conn)).is_err());
    }
}
