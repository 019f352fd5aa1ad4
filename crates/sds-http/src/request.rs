use std::collections::BTreeMap;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use sds_types::constants::{
    CONTENT_LENGTH_HEADER, CONTENT_TYPE_HEADER, DELETE_METHOD, GET_METHOD, JSON_CONTENT_TYPE,
    OCTET_STREAM_CONTENT_TYPE, OIO_TIMEOUT_HEADER, POST_METHOD, PUT_METHOD,
    TRANSFER_ENCODING_HEADER,
};
use sds_types::{SdsError, SdsResult};

use crate::chunked;
use crate::deadline::{Deadline, DeadlineManager};
use crate::headers::Headers;
use crate::response::Response;
use crate::settings::HttpSettings;
use crate::socket::{Connection, SocketProvider, TcpSocketProvider};
use crate::verifier::ResponseVerifier;

/// HTTP/1.1 client: settings, a socket provider and a deadline clock.
///
/// Requests are built with [`Http::get`], [`Http::put`], [`Http::post`] or
/// [`Http::delete`] and sent with [`RequestBuilder::execute`].
pub struct Http {
    settings: HttpSettings,
    sockets: Arc<dyn SocketProvider>,
    deadlines: Arc<DeadlineManager>,
}

impl Http {
    pub fn new(
        settings: HttpSettings,
        sockets: Arc<dyn SocketProvider>,
        deadlines: Arc<DeadlineManager>,
    ) -> Self {
        Self {
            settings,
            sockets,
            deadlines,
        }
    }

    /// Client opening a plain TCP connection per request.
    pub fn with_tcp(settings: HttpSettings, deadlines: Arc<DeadlineManager>) -> Self {
        let sockets = Arc::new(TcpSocketProvider::new(settings.clone()));
        Self::new(settings, sockets, deadlines)
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    pub fn deadlines(&self) -> &Arc<DeadlineManager> {
        &self.deadlines
    }

    pub fn get(&self, uri: &str) -> SdsResult<RequestBuilder<'_>> {
        self.request(GET_METHOD, uri)
    }

    pub fn put(&self, uri: &str) -> SdsResult<RequestBuilder<'_>> {
        self.request(PUT_METHOD, uri)
    }

    pub fn post(&self, uri: &str) -> SdsResult<RequestBuilder<'_>> {
        self.request(POST_METHOD, uri)
    }

    pub fn delete(&self, uri: &str) -> SdsResult<RequestBuilder<'_>> {
        self.request(DELETE_METHOD, uri)
    }

    /// Start a request with an arbitrary method.
    pub fn request(&self, method: &'static str, uri: &str) -> SdsResult<RequestBuilder<'_>> {
        let url = Url::parse(uri)
            .map_err(|e| SdsError::invalid_argument(format!("Invalid uri {uri}")).with_source(e))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SdsError::invalid_argument(format!("No host in uri {uri}")))?
            .to_owned();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| SdsError::invalid_argument(format!("No port in uri {uri}")))?;
        Ok(RequestBuilder {
            http: self,
            method,
            url,
            host,
            port,
            headers: Headers::new(),
            query: BTreeMap::new(),
            body: RequestBody::None,
            verifier: ResponseVerifier::Passthrough,
            hosts: None,
            deadline: None,
        })
    }
}

enum RequestBody<'a> {
    None,
    Literal(Vec<u8>),
    Stream { source: Box<dyn Read + 'a>, len: u64 },
    Chunked(Box<dyn Read + 'a>),
}

impl RequestBody<'_> {
    fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(_))
    }
}

/// A request under construction. [`execute`](RequestBuilder::execute)
/// consumes it.
pub struct RequestBuilder<'a> {
    http: &'a Http,
    method: &'static str,
    url: Url,
    host: String,
    port: u16,
    headers: Headers,
    query: BTreeMap<String, String>,
    body: RequestBody<'a>,
    verifier: ResponseVerifier,
    hosts: Option<Vec<SocketAddr>>,
    deadline: Option<Deadline>,
}

impl<'a> RequestBuilder<'a> {
    /// Set a header. Empty names or values are ignored; names or values
    /// holding a line break make [`execute`](RequestBuilder::execute) fail.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if !name.is_empty() && !value.is_empty() {
            self.headers.set(name, value);
        }
        self
    }

    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |req, (name, value)| req.header(name, value))
    }

    /// Add a query parameter, appended form-urlencoded after any query
    /// already present in the URI.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if !name.is_empty() && !value.is_empty() {
            self.query.insert(name, value);
        }
        self
    }

    /// Send `body` as a JSON document. An empty body leaves the request
    /// unchanged.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        if body.is_empty() {
            return self;
        }
        self.headers.set(CONTENT_LENGTH_HEADER, body.len().to_string());
        self.headers.set(CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE);
        self.body = RequestBody::Literal(body.into_bytes());
        self
    }

    /// Stream exactly `len` bytes read from `source`.
    pub fn body_stream(mut self, source: impl Read + 'a, len: u64) -> Self {
        self.headers.set(CONTENT_LENGTH_HEADER, len.to_string());
        if !self.headers.contains(CONTENT_TYPE_HEADER) {
            self.headers.set(CONTENT_TYPE_HEADER, OCTET_STREAM_CONTENT_TYPE);
        }
        self.body = RequestBody::Stream {
            source: Box::new(source),
            len,
        };
        self
    }

    /// Stream `source` with chunked transfer-encoding until it is exhausted.
    pub fn body_chunked(self, source: impl Read + 'a) -> Self {
        self.body_stream(source, 0).chunked()
    }

    /// Switch the current body to chunked transfer-encoding.
    pub fn chunked(mut self) -> Self {
        self.body = match std::mem::replace(&mut self.body, RequestBody::None) {
            RequestBody::None => RequestBody::Chunked(Box::new(io::empty())),
            RequestBody::Literal(data) => RequestBody::Chunked(Box::new(Cursor::new(data))),
            RequestBody::Stream { source, .. } | RequestBody::Chunked(source) => {
                RequestBody::Chunked(source)
            }
        };
        self
    }

    pub fn verifier(mut self, verifier: ResponseVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Candidate hosts, tried in order instead of resolving the URI host. An
    /// empty list resolves the URI host.
    pub fn hosts(mut self, hosts: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.hosts = Some(hosts.into_iter().collect());
        self
    }

    /// Send the request and read the response head.
    ///
    /// With a host list, an attempt failing on an I/O error moves on to the
    /// next host; any other error is returned as is.
    pub fn execute(mut self) -> SdsResult<Response> {
        self.check_headers()?;
        let Some(hosts) = self.hosts.take().filter(|hosts| !hosts.is_empty()) else {
            let addr = self.resolve()?;
            let authority = format!("{}:{}", self.host, self.port);
            return self.execute_on(addr, &authority);
        };

        let mut last = None;
        for (attempt, addr) in hosts.iter().enumerate() {
            if attempt > 0 {
                info!(%addr, "retrying on next host");
            }
            match self.execute_on(*addr, &addr.to_string()) {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transport() => {
                    warn!(%addr, error = %e, "request attempt failed");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        let err = SdsError::system("HTTP request execution error");
        Err(match last {
            Some(last) => err.with_source(last),
            None => err,
        })
    }

    fn check_headers(&self) -> SdsResult<()> {
        match self
            .headers
            .iter()
            .find(|&(name, value)| breaks_line(name) || breaks_line(value))
        {
            Some((name, _)) => Err(SdsError::invalid_argument(format!(
                "Line break in header {:?}",
                name.trim()
            ))),
            None => Ok(()),
        }
    }

    fn resolve(&self) -> SdsResult<SocketAddr> {
        let unresolved = || SdsError::system(format!("Unable to resolve {}", self.host));
        self.url
            .socket_addrs(|| Some(self.port))
            .map_err(|e| unresolved().with_source(e))?
            .into_iter()
            .next()
            .ok_or_else(unresolved)
    }

    fn execute_on(&mut self, addr: SocketAddr, authority: &str) -> SdsResult<Response> {
        let deadlines = Arc::clone(&self.http.deadlines);
        if let Some(deadline) = self.deadline {
            deadlines.check_deadline(deadline, deadlines.now())?;
        }

        let mut conn = self.http.sockets.get_socket(&addr).map_err(|e| {
            SdsError::system(format!("Unable to get a socket to {addr}")).with_source(e)
        })?;

        if let Some(deadline) = self.deadline {
            let timeout = deadlines.deadline_to_timeout(deadline, deadlines.now());
            if let Err(e) = conn.set_timeout(Some(timeout)) {
                return Err(abort(conn, addr, e));
            }
            self.headers.set(
                OIO_TIMEOUT_HEADER,
                DeadlineManager::timeout_header_value(timeout),
            );
        }

        debug!(method = self.method, %addr, path = self.url.path(), "sending request");
        if let Err(e) = self.send(conn.as_mut(), authority) {
            return Err(abort(conn, addr, e));
        }

        let reader = BufReader::with_capacity(self.http.settings.receive_buffer_size, conn);
        let resp = Response::read_from(reader).map_err(|(e, conn)| abort(conn, addr, e))?;
        debug!(%addr, code = resp.code(), "response received");

        if let Err(e) = self.verifier.verify(&resp) {
            resp.close(true);
            return Err(e);
        }
        Ok(resp)
    }

    /// Request target: path plus the merged query string.
    fn target(&self) -> String {
        let mut target = match self.url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        let mut query = self.url.query().unwrap_or_default().to_string();
        if !self.query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&encoded);
        }
        if !query.is_empty() {
            target.push('?');
            target.push_str(&query);
        }
        target
    }

    fn head_headers(&self, authority: &str) -> Headers {
        let keep_alive = if self.http.sockets.reusable_socket() {
            "keep-alive"
        } else {
            "close"
        };
        let mut headers: Headers = [
            ("Host", authority),
            ("Connection", keep_alive),
            ("Accept", "*/*"),
            ("Accept-Encoding", "gzip, deflate"),
            ("User-Agent", self.http.settings.user_agent.as_str()),
        ]
        .into_iter()
        .collect();
        headers.extend(self.headers.iter());
        if self.body.is_chunked() {
            headers.remove(CONTENT_LENGTH_HEADER);
            headers.set(TRANSFER_ENCODING_HEADER, "chunked");
        } else if !headers.contains(CONTENT_LENGTH_HEADER) {
            headers.set(CONTENT_LENGTH_HEADER, "0");
        }
        headers
    }

    fn send(&mut self, conn: &mut dyn Connection, authority: &str) -> io::Result<()> {
        let block_size = self.http.settings.send_buffer_size.max(1);
        let mut out = BufWriter::with_capacity(block_size, conn);

        write!(out, "{} {} HTTP/1.1\r\n", self.method, self.target())?;
        for (name, value) in self.head_headers(authority).iter() {
            write!(out, "{name}: {value}\r\n")?;
        }
        out.write_all(chunked::CRLF)?;

        match &mut self.body {
            RequestBody::None => {}
            RequestBody::Literal(data) => out.write_all(data)?,
            RequestBody::Stream { source, len } => copy_exact(source, &mut out, *len, block_size)?,
            RequestBody::Chunked(source) => {
                chunked::encode_stream(source, &mut out, block_size)?;
            }
        }
        out.flush()
    }
}

fn breaks_line(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Copy exactly `len` bytes from `source` in blocks of `block_size`.
fn copy_exact<R, W>(source: &mut R, out: &mut W, len: u64, block_size: usize) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; block_size];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(block_size as u64) as usize;
        let read = match source.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of source stream",
                ))
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..read])?;
        remaining -= read as u64;
    }
    Ok(())
}

/// Release a connection after an I/O failure and wrap the cause.
fn abort(mut conn: Box<dyn Connection>, addr: SocketAddr, cause: io::Error) -> SdsError {
    if let Err(e) = conn.shutdown_input() {
        debug!(%addr, error = %e, "failed to shut down socket input");
    }
    if let Err(e) = conn.close() {
        warn!(%addr, error = %e, "failed to close socket");
    }
    SdsError::system(format!("HTTP request to {addr} failed")).with_source(cause)
}
