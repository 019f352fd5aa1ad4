//! Chunked transfer-coding.
//!
//! Wire format of a body:
//! ```text
//! <hex length>CRLF<bytes>CRLF     (repeated, length > 0)
//! 0CRLF CRLF                      (terminal chunk, no trailers written)
//! ```

use std::io::{self, BufRead, Read, Write};

pub const CRLF: &[u8] = b"\r\n";

/// Terminal zero-length chunk followed by the empty trailer section.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Longest size or trailer line accepted by [`ChunkedDecoder`].
const MAX_LINE: u64 = 4096;

/// Write one data chunk. Empty blocks are skipped, since a zero length
/// would terminate the body.
pub fn write_chunk<W: Write + ?Sized>(out: &mut W, block: &[u8]) -> io::Result<()> {
    if block.is_empty() {
        return Ok(());
    }
    write!(out, "{:x}", block.len())?;
    out.write_all(CRLF)?;
    out.write_all(block)?;
    out.write_all(CRLF)
}

pub fn write_last_chunk<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    out.write_all(LAST_CHUNK)
}

/// Copy `source` to `out` as a chunked body, reading at most `block_size`
/// bytes per chunk, until the source is exhausted. Returns the payload size.
pub fn encode_stream<R, W>(source: &mut R, out: &mut W, block_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let read = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        write_chunk(out, &buf[..read])?;
        total += read as u64;
    }
    write_last_chunk(out)?;
    Ok(total)
}

/// Encode a whole buffer, splitting it into chunks of `block_size`.
pub fn encode(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + LAST_CHUNK.len() + 16);
    for block in data.chunks(block_size.max(1)) {
        // Writes into a Vec cannot fail.
        let _ = write_chunk(&mut out, block);
    }
    out.extend_from_slice(LAST_CHUNK);
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Size,
    Data(u64),
    DataEnd,
    Done,
}

/// Reader decoding a chunked body from the underlying buffered reader.
///
/// Reports end-of-stream once the terminal chunk and the trailer section
/// have been consumed; a truncated body yields `UnexpectedEof`.
#[derive(Debug)]
pub struct ChunkedDecoder<R> {
    inner: R,
    state: State,
}

impl<R: BufRead> ChunkedDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: State::Size,
        }
    }

    /// Returns `true` once the terminal chunk has been read.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let read = self.inner.by_ref().take(MAX_LINE).read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated chunked body",
            ));
        }
        if !line.ends_with('\n') {
            if read as u64 >= MAX_LINE {
                return Err(invalid("chunk line too long"));
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated chunked body",
            ));
        }
        let trimmed = line.trim_end_matches(&['\r', '\n'][..]).len();
        line.truncate(trimmed);
        Ok(line)
    }

    fn read_size(&mut self) -> io::Result<u64> {
        let line = self.read_line()?;
        // Chunk extensions are ignored.
        let size = line.split(';').next().unwrap_or_default().trim();
        u64::from_str_radix(size, 16).map_err(|_| invalid("invalid chunk size"))
    }

    fn skip_trailers(&mut self) -> io::Result<()> {
        while !self.read_line()?.is_empty() {}
        Ok(())
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl<R: BufRead> Read for ChunkedDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.state {
                State::Size => {
                    let size = self.read_size()?;
                    if size == 0 {
                        self.skip_trailers()?;
                        self.state = State::Done;
                    } else {
                        self.state = State::Data(size);
                    }
                }
                State::Data(remaining) => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let max = remaining.min(buf.len() as u64) as usize;
                    let read = self.inner.read(&mut buf[..max])?;
                    if read == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "truncated chunk data",
                        ));
                    }
                    let left = remaining - read as u64;
                    self.state = if left == 0 {
                        State::DataEnd
                    } else {
                        State::Data(left)
                    };
                    return Ok(read);
                }
                State::DataEnd => {
                    if !self.read_line()?.is_empty() {
                        return Err(invalid("missing CRLF after chunk data"));
                    }
                    self.state = State::Size;
                }
                State::Done => return Ok(0),
            }
        }
    }
}
