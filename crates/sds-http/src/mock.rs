//! In-memory socket provider for exercising the transport without a network.
//!
//! Each target address is given a [`MockBehavior`]; addresses without one act
//! as a chunk store keyed by request path. Uploads are acknowledged with the
//! BLAKE3 hash of the body received and can be read back with GET. Every
//! connection attempt and every request written is recorded for inspection.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use sds_types::constants::CHUNK_META_CHUNK_HASH;

use crate::chunked::ChunkedDecoder;
use crate::socket::{Connection, SocketProvider};

/// How a mocked host answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockBehavior {
    /// Connection attempts fail with `ConnectionRefused`.
    Refuse,
    /// The connection accepts the request, then resets when the response is
    /// read.
    Reset,
    /// Answer with a fixed response.
    Respond {
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    /// Keep request bodies by path: GET returns the stored bytes or 404,
    /// DELETE removes them, other methods store the decoded body and answer
    /// `201 Created` with its hash.
    StoreChunk,
}

impl MockBehavior {
    /// A fixed response with an empty body.
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self::Respond {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// One request as written by the transport.
#[derive(Clone, Debug)]
pub struct MockExchange {
    pub addr: SocketAddr,
    pub request: Vec<u8>,
    /// Last timeout applied to the connection.
    pub timeout: Option<Duration>,
}

impl MockExchange {
    fn target(&self) -> &str {
        self.request_line().split(' ').nth(1).unwrap_or_default()
    }

    fn method(&self) -> &str {
        self.request_line().split(' ').next().unwrap_or_default()
    }

    fn head(&self) -> &str {
        let end = find_head_end(&self.request).unwrap_or(self.request.len());
        std::str::from_utf8(&self.request[..end]).unwrap_or_default()
    }

    pub fn request_line(&self) -> &str {
        self.head().lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head().lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// The request body, de-chunked when sent with chunked encoding.
    pub fn body(&self) -> io::Result<Vec<u8>> {
        let start = find_head_end(&self.request)
            .map(|end| end + 4)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete request head"))?;
        let raw = &self.request[start..];
        let chunked = self
            .header("Transfer-Encoding")
            .is_some_and(|te| te.eq_ignore_ascii_case("chunked"));
        if chunked {
            let mut out = Vec::new();
            ChunkedDecoder::new(raw).read_to_end(&mut out)?;
            return Ok(out);
        }
        let len = match self.header("Content-Length") {
            Some(len) => len
                .parse::<usize>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            None => raw.len(),
        };
        if raw.len() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "request body shorter than Content-Length",
            ));
        }
        Ok(raw[..len].to_vec())
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[derive(Debug, Default)]
struct Journal {
    connects: Vec<SocketAddr>,
    exchanges: Vec<MockExchange>,
    closed: usize,
    chunks: HashMap<(SocketAddr, String), Vec<u8>>,
}

/// [`SocketProvider`] serving in-memory connections.
pub struct MockSocketProvider {
    behaviors: RwLock<HashMap<SocketAddr, MockBehavior>>,
    fallback: MockBehavior,
    reusable: bool,
    journal: Arc<Mutex<Journal>>,
}

impl MockSocketProvider {
    pub fn new() -> Self {
        Self {
            behaviors: RwLock::new(HashMap::new()),
            fallback: MockBehavior::StoreChunk,
            reusable: false,
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    pub fn with_behavior(self, addr: SocketAddr, behavior: MockBehavior) -> Self {
        self.set_behavior(addr, behavior);
        self
    }

    /// Behaviour of addresses without a specific one.
    pub fn with_fallback(mut self, behavior: MockBehavior) -> Self {
        self.fallback = behavior;
        self
    }

    /// Seed the chunk store of `addr` with `data` under `path`.
    pub fn with_stored(self, addr: SocketAddr, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.journal
            .lock()
            .expect("lock poisoned")
            .chunks
            .insert((addr, path.to_owned()), data.into());
        self
    }

    /// Bytes stored on `addr` under `path`.
    pub fn stored(&self, addr: SocketAddr, path: &str) -> Option<Vec<u8>> {
        self.journal
            .lock()
            .expect("lock poisoned")
            .chunks
            .get(&(addr, path.to_owned()))
            .cloned()
    }

    pub fn with_reusable(mut self, reusable: bool) -> Self {
        self.reusable = reusable;
        self
    }

    pub fn set_behavior(&self, addr: SocketAddr, behavior: MockBehavior) {
        self.behaviors
            .write()
            .expect("lock poisoned")
            .insert(addr, behavior);
    }

    /// Every address a connection was requested for, in order.
    pub fn connects(&self) -> Vec<SocketAddr> {
        self.journal.lock().expect("lock poisoned").connects.clone()
    }

    pub fn exchanges(&self) -> Vec<MockExchange> {
        self.journal.lock().expect("lock poisoned").exchanges.clone()
    }

    pub fn exchanges_for(&self, addr: SocketAddr) -> Vec<MockExchange> {
        self.exchanges()
            .into_iter()
            .filter(|ex| ex.addr == addr)
            .collect()
    }

    /// Number of connections dropped so far.
    pub fn closed(&self) -> usize {
        self.journal.lock().expect("lock poisoned").closed
    }

    fn behavior_for(&self, addr: &SocketAddr) -> MockBehavior {
        self.behaviors
            .read()
            .expect("lock poisoned")
            .get(addr)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for MockSocketProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketProvider for MockSocketProvider {
    fn get_socket(&self, addr: &SocketAddr) -> io::Result<Box<dyn Connection>> {
        self.journal
            .lock()
            .expect("lock poisoned")
            .connects
            .push(*addr);
        match self.behavior_for(addr) {
            MockBehavior::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection refused by {addr}"),
            )),
            behavior => Ok(Box::new(MockConnection {
                addr: *addr,
                behavior,
                request: Vec::new(),
                response: None,
                timeout: None,
                recorded: false,
                journal: Arc::clone(&self.journal),
            })),
        }
    }

    fn reusable_socket(&self) -> bool {
        self.reusable
    }
}

struct MockConnection {
    addr: SocketAddr,
    behavior: MockBehavior,
    request: Vec<u8>,
    response: Option<Cursor<Vec<u8>>>,
    timeout: Option<Duration>,
    recorded: bool,
    journal: Arc<Mutex<Journal>>,
}

impl MockConnection {
    fn exchange(&self) -> MockExchange {
        MockExchange {
            addr: self.addr,
            request: self.request.clone(),
            timeout: self.timeout,
        }
    }

    fn record(&mut self) -> MockExchange {
        let exchange = self.exchange();
        if !self.recorded {
            self.recorded = true;
            self.journal
                .lock()
                .expect("lock poisoned")
                .exchanges
                .push(exchange.clone());
        }
        exchange
    }

    fn build_response(&self, exchange: &MockExchange) -> io::Result<Vec<u8>> {
        let (status, reason, headers, body) = match &self.behavior {
            MockBehavior::Refuse | MockBehavior::Reset => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ))
            }
            MockBehavior::Respond {
                status,
                reason,
                headers,
                body,
            } => (*status, reason.clone(), headers.clone(), body.clone()),
            MockBehavior::StoreChunk => self.store(exchange),
        };
        let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
        for (name, value) in &headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

impl MockConnection {
    fn store(&self, exchange: &MockExchange) -> (u16, String, Vec<(String, String)>, Vec<u8>) {
        let key = (self.addr, exchange.target().to_owned());
        let mut journal = self.journal.lock().expect("lock poisoned");
        match exchange.method() {
            "GET" => match journal.chunks.get(&key) {
                Some(data) => (200, "OK".into(), Vec::new(), data.clone()),
                None => (404, "Not Found".into(), Vec::new(), Vec::new()),
            },
            "DELETE" => match journal.chunks.remove(&key) {
                Some(_) => (204, "No Content".into(), Vec::new(), Vec::new()),
                None => (404, "Not Found".into(), Vec::new(), Vec::new()),
            },
            _ => match exchange.body() {
                Ok(data) => {
                    let hash = hex::encode_upper(blake3::hash(&data).as_bytes());
                    journal.chunks.insert(key, data);
                    (
                        201,
                        "Created".into(),
                        vec![(CHUNK_META_CHUNK_HASH.to_string(), hash)],
                        Vec::new(),
                    )
                }
                Err(e) => (400, e.to_string(), Vec::new(), Vec::new()),
            },
        }
    }
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.response.is_none() {
            let exchange = self.record();
            self.response = Some(Cursor::new(self.build_response(&exchange)?));
        }
        match self.response.as_mut() {
            Some(response) => response.read(buf),
            None => Ok(0),
        }
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.request.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn shutdown_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.record();
        self.journal.lock().expect("lock poisoned").closed += 1;
    }
}
