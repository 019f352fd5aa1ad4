//! Bounded fan-out of one byte stream to several readers.
//!
//! A [`FeedGroup`] holds one bounded queue per reader. Every block fed to the
//! group is pushed to each queue in turn, so the producer is never more than
//! the queue capacity ahead of the slowest reader.

use std::io::{self, Read};

use bytes::{Buf, Bytes};
use crossbeam::channel::{self, Receiver, Sender};

/// Blocks a queue holds before the producer blocks.
pub const FEED_CAPACITY: usize = 5;

#[derive(Debug)]
struct Block {
    data: Bytes,
    last: bool,
}

/// Producer side of a single feed queue.
#[derive(Debug)]
pub struct FeedWriter {
    tx: Sender<Block>,
}

impl FeedWriter {
    /// Queue `block`, waiting while the queue is full. `is_last` ends the
    /// stream after this block.
    ///
    /// Fails with `BrokenPipe` once the reader is gone.
    pub fn feed(&self, block: Bytes, is_last: bool) -> io::Result<()> {
        self.tx
            .send(Block {
                data: block,
                last: is_last,
            })
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "feed reader dropped"))
    }
}

/// Consumer side of a feed queue.
#[derive(Debug)]
pub struct FeedReader {
    rx: Receiver<Block>,
    current: Bytes,
    eof: bool,
}

impl FeedReader {
    /// Blocks queued and not yet taken.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// The next block, or `None` at end of stream. Bytes of a block already
    /// partly consumed through [`Read`] come first.
    pub fn next_block(&mut self) -> io::Result<Option<Bytes>> {
        if !self.current.is_empty() {
            return Ok(Some(std::mem::take(&mut self.current)));
        }
        while !self.eof {
            let block = self.recv()?;
            if !block.is_empty() {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    fn recv(&mut self) -> io::Result<Bytes> {
        match self.rx.recv() {
            Ok(block) => {
                self.eof = block.last;
                Ok(block.data)
            }
            Err(_) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "feed interrupted",
            )),
        }
    }
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            if self.eof {
                return Ok(0);
            }
            self.current = self.recv()?;
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// A single queue holding at most `capacity` blocks.
pub fn channel(capacity: usize) -> (FeedWriter, FeedReader) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (
        FeedWriter { tx },
        FeedReader {
            rx,
            current: Bytes::new(),
            eof: false,
        },
    )
}

/// Writers of every queue of a group.
#[derive(Debug)]
pub struct FeedGroup {
    writers: Vec<Option<FeedWriter>>,
}

impl FeedGroup {
    /// Feed `block` to every queue whose reader is still alive and return how
    /// many accepted it. Queues whose reader was dropped are skipped from then
    /// on.
    pub fn feed(&mut self, block: Bytes, is_last: bool) -> usize {
        let mut delivered = 0;
        for slot in &mut self.writers {
            let Some(writer) = slot else { continue };
            match writer.feed(block.clone(), is_last) {
                Ok(()) => delivered += 1,
                Err(_) => *slot = None,
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Number of queues still read from.
    pub fn live(&self) -> usize {
        self.writers.iter().flatten().count()
    }
}

/// `n` queues of `capacity` blocks fed together.
pub fn group(n: usize, capacity: usize) -> (FeedGroup, Vec<FeedReader>) {
    let (writers, readers) = (0..n)
        .map(|_| {
            let (writer, reader) = channel(capacity);
            (Some(writer), reader)
        })
        .unzip();
    (FeedGroup { writers }, readers)
}
