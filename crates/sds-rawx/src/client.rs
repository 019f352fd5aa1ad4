use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};

use sds_http::{Deadline, DeadlineManager, Http, Response, ResponseVerifier, SocketProvider};
use sds_types::constants::{
    CHUNK_META_CHUNK_HASH, CHUNK_META_CHUNK_ID, CHUNK_META_CHUNK_POS, CHUNK_META_CONTAINER_ID,
    CHUNK_META_CONTENT_CHUNKSNB, CHUNK_META_CONTENT_CHUNK_METHOD, CHUNK_META_CONTENT_ID,
    CHUNK_META_CONTENT_MIME_TYPE, CHUNK_META_CONTENT_PATH, CHUNK_META_CONTENT_POLICY,
    CHUNK_META_CONTENT_SIZE, CHUNK_META_CONTENT_VERSION,
};
use sds_types::{ChunkInfo, ObjectInfo, SdsError, SdsResult};

use crate::feed::{self, FeedGroup, FeedReader, FEED_CAPACITY};
use crate::pool::{TaskHandle, WorkerPool};
use crate::settings::{ClientSettings, RawxSettings};

/// Uploads object data to the rawx services holding its chunks.
///
/// Positions are uploaded one after the other. Within a position every
/// replica is written concurrently from the same source bytes, and the
/// position fails if any replica fails.
pub struct RawxClient {
    http: Arc<Http>,
    pool: Arc<WorkerPool>,
    settings: RawxSettings,
}

impl RawxClient {
    pub fn new(http: Arc<Http>, pool: Arc<WorkerPool>, settings: RawxSettings) -> Self {
        Self {
            http,
            pool,
            settings,
        }
    }

    /// Client built from loaded settings: the rawx HTTP settings drive the
    /// transport and the pool section sizes the upload workers.
    pub fn from_settings(
        settings: &ClientSettings,
        sockets: Arc<dyn SocketProvider>,
        deadlines: Arc<DeadlineManager>,
    ) -> Self {
        let http = Http::new(settings.rawx.http.clone(), sockets, deadlines);
        let pool = WorkerPool::new(settings.pool.clone());
        Self::new(Arc::new(http), Arc::new(pool), settings.rawx.clone())
    }

    pub fn settings(&self) -> &RawxSettings {
        &self.settings
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }

    /// Upload `data` to every chunk of `oinf`, recording on each chunk the
    /// bytes written and the hash reported by its rawx.
    pub fn upload_chunks<R: Read>(&self, oinf: &mut ObjectInfo, data: R) -> SdsResult<()> {
        self.upload(oinf, data, None)
    }

    /// Same as [`upload_chunks`](Self::upload_chunks), every replica request
    /// carrying `deadline`.
    pub fn upload_chunks_with_deadline<R: Read>(
        &self,
        oinf: &mut ObjectInfo,
        data: R,
        deadline: Deadline,
    ) -> SdsResult<()> {
        self.upload(oinf, data, Some(deadline))
    }

    pub fn upload_chunks_from_bytes(&self, oinf: &mut ObjectInfo, data: &[u8]) -> SdsResult<()> {
        self.upload(oinf, data, None)
    }

    pub fn upload_chunks_from_file(
        &self,
        oinf: &mut ObjectInfo,
        path: impl AsRef<Path>,
    ) -> SdsResult<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            let message = match e.kind() {
                io::ErrorKind::NotFound => format!("File not found: {}", path.display()),
                _ => format!("Unable to open {}", path.display()),
            };
            SdsError::invalid_argument(message).with_source(e)
        })?;
        self.upload(oinf, BufReader::new(file), None)
    }

    /// Stream the object content back, position by position.
    ///
    /// Each position is read from its first replica that answers; replicas
    /// failing on I/O are skipped, any other error ends the stream.
    pub fn download_object(&self, oinf: &ObjectInfo) -> SdsResult<ObjectReader> {
        let capacity = oinf.declared_capacity();
        if capacity < oinf.size {
            return Err(SdsError::invalid_argument(format!(
                "Object size {} exceeds declared chunk capacity {capacity}",
                oinf.size
            )));
        }
        let mut remaining = oinf.size;
        let mut positions = Vec::new();
        for (meta, chunks) in oinf.sorted_chunks() {
            let size = remaining.min(oinf.chunk_size(meta));
            remaining -= size;
            if size > 0 {
                let urls = chunks.iter().map(|c| c.url().to_owned()).collect();
                positions.push(PositionSource { meta, size, urls });
            }
        }
        Ok(ObjectReader {
            http: Arc::clone(&self.http),
            positions: positions.into_iter(),
            current: None,
        })
    }

    fn upload<R: Read>(
        &self,
        oinf: &mut ObjectInfo,
        mut data: R,
        deadline: Option<Deadline>,
    ) -> SdsResult<()> {
        let capacity = oinf.declared_capacity();
        if capacity < oinf.size {
            return Err(SdsError::invalid_argument(format!(
                "Object size {} exceeds declared chunk capacity {capacity}",
                oinf.size
            )));
        }

        let positions = oinf.sorted_chunk_indices();
        let max_workers = self.pool.config().max_workers;
        if let Some(replicas) = positions.values().map(Vec::len).find(|&n| n > max_workers) {
            return Err(SdsError::invalid_argument(format!(
                "{replicas} replicas exceed the {max_workers} upload workers"
            )));
        }

        let mut remaining = oinf.size;
        for (meta, replicas) in positions {
            let size = remaining.min(oinf.chunk_size(meta));
            self.upload_position(oinf, meta, &replicas, size, &mut data, deadline)?;
            remaining -= size;
        }
        debug!(oid = %oinf.oid, size = oinf.size, "object uploaded");
        Ok(())
    }

    fn upload_position<R: Read + ?Sized>(
        &self,
        oinf: &mut ObjectInfo,
        meta: u32,
        replicas: &[usize],
        size: u64,
        data: &mut R,
        deadline: Option<Deadline>,
    ) -> SdsResult<()> {
        debug!(meta, size, replicas = replicas.len(), "uploading position");
        let (mut group, readers) = match size {
            0 => (None, Vec::new()),
            _ => {
                let (group, readers) = feed::group(replicas.len(), FEED_CAPACITY);
                (Some(group), readers)
            }
        };
        let mut readers = readers.into_iter();

        let mut handles: Vec<TaskHandle<Option<String>>> = Vec::with_capacity(replicas.len());
        for &idx in replicas {
            let upload = ReplicaUpload::new(oinf, &oinf.chunks[idx], size, deadline);
            let body = readers.next();
            let http = Arc::clone(&self.http);
            match self.pool.submit(move || upload.run(&http, body)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    abandon(group, handles);
                    return Err(e);
                }
            }
        }

        if let Some(feeds) = group.as_mut() {
            if let Err(e) = pump(data, size, self.settings.bufsize, feeds) {
                error!(meta, error = %e, "failed to read upload source");
                abandon(group, handles);
                return Err(SdsError::stream_consumption(e));
            }
        }
        drop(group);

        let mut first_error = None;
        for (&idx, handle) in replicas.iter().zip(handles) {
            match handle.join() {
                Ok(hash) => {
                    let chunk = &mut oinf.chunks[idx];
                    chunk.set_size(size);
                    chunk.set_hash(hash);
                }
                Err(e) => {
                    warn!(chunk = oinf.chunks[idx].url(), error = %e, "replica upload failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Stop the replica tasks of a failed position and wait for them to release
/// their connections. Dropping the feeds interrupts the bodies still being
/// sent.
fn abandon<T>(group: Option<FeedGroup>, handles: Vec<TaskHandle<T>>) {
    handles.iter().for_each(TaskHandle::cancel);
    drop(group);
    for handle in handles {
        if let Err(e) = handle.join() {
            debug!(error = %e, "abandoned replica upload ended");
        }
    }
}

/// Read `size` bytes from `data` in blocks of at most `bufsize` and feed each
/// block to the whole group, flagging the last one.
pub fn pump<R: Read + ?Sized>(
    data: &mut R,
    size: u64,
    bufsize: usize,
    group: &mut FeedGroup,
) -> io::Result<()> {
    let bufsize = bufsize.max(1) as u64;
    let mut done = 0u64;
    while done < size {
        let len = (size - done).min(bufsize) as usize;
        let mut block = vec![0u8; len];
        data.read_exact(&mut block).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of stream")
            }
            _ => e,
        })?;
        done += len as u64;
        group.feed(Bytes::from(block), done >= size);
    }
    Ok(())
}

/// PUT of one replica, detached from the object descriptor so it can run on
/// a pool worker.
struct ReplicaUpload {
    url: String,
    headers: Vec<(&'static str, String)>,
    size: u64,
    deadline: Option<Deadline>,
}

impl ReplicaUpload {
    fn new(oinf: &ObjectInfo, chunk: &ChunkInfo, size: u64, deadline: Option<Deadline>) -> Self {
        let headers = vec![
            (CHUNK_META_CONTAINER_ID, oinf.url.cid.clone()),
            (CHUNK_META_CONTENT_ID, oinf.oid.clone()),
            (CHUNK_META_CONTENT_VERSION, oinf.version.to_string()),
            (CHUNK_META_CONTENT_POLICY, oinf.policy.clone()),
            (CHUNK_META_CONTENT_MIME_TYPE, oinf.mime_type.clone()),
            (CHUNK_META_CONTENT_CHUNK_METHOD, oinf.chunk_method.clone()),
            (CHUNK_META_CONTENT_CHUNKSNB, oinf.nb_chunks().to_string()),
            (CHUNK_META_CONTENT_SIZE, oinf.size.to_string()),
            (CHUNK_META_CONTENT_PATH, oinf.url.object.clone()),
            (CHUNK_META_CHUNK_ID, chunk.id().to_owned()),
            (CHUNK_META_CHUNK_POS, chunk.pos().to_string()),
        ];
        Self {
            url: chunk.url().to_owned(),
            headers,
            size,
            deadline,
        }
    }

    /// Returns the chunk hash reported by the rawx.
    fn run(self, http: &Http, body: Option<FeedReader>) -> SdsResult<Option<String>> {
        let mut request = http
            .put(&self.url)?
            .headers(self.headers)
            .verifier(ResponseVerifier::StrictChunk);
        if let Some(body) = body {
            request = request.body_stream(body, self.size);
        }
        if let Some(deadline) = self.deadline {
            request = request.with_deadline(deadline);
        }
        let resp = request.execute()?;
        let hash = resp.header(CHUNK_META_CHUNK_HASH).map(str::to_owned);
        resp.close(false);
        Ok(hash)
    }
}

struct PositionSource {
    meta: u32,
    size: u64,
    urls: Vec<String>,
}

struct OpenChunk {
    meta: u32,
    response: Response,
    remaining: u64,
}

/// Object content returned by [`RawxClient::download_object`].
///
/// Positions are fetched lazily, one GET at a time. A chunk body shorter than
/// its position fails the read with `UnexpectedEof`.
pub struct ObjectReader {
    http: Arc<Http>,
    positions: std::vec::IntoIter<PositionSource>,
    current: Option<OpenChunk>,
}

impl ObjectReader {
    fn open(&self, position: PositionSource) -> SdsResult<OpenChunk> {
        let mut last = None;
        for url in &position.urls {
            let attempt = self
                .http
                .get(url)
                .and_then(|req| req.verifier(ResponseVerifier::StrictChunk).execute());
            match attempt {
                Ok(response) => {
                    debug!(meta = position.meta, chunk = url.as_str(), "reading chunk");
                    return Ok(OpenChunk {
                        meta: position.meta,
                        response,
                        remaining: position.size,
                    });
                }
                Err(e) if e.is_transport() => {
                    warn!(chunk = url.as_str(), error = %e, "chunk download failed");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        let err = SdsError::system(format!("No replica available for position {}", position.meta));
        Err(match last {
            Some(last) => err.with_source(last),
            None => err,
        })
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                let Some(position) = self.positions.next() else {
                    return Ok(0);
                };
                self.current = Some(self.open(position).map_err(io::Error::other)?);
            }
            let Some(chunk) = self.current.as_mut() else {
                continue;
            };
            if chunk.remaining == 0 {
                if let Some(done) = self.current.take() {
                    done.response.close(true);
                }
                continue;
            }
            let want = chunk.remaining.min(buf.len() as u64) as usize;
            let read = chunk.response.body().read(&mut buf[..want])?;
            if read == 0 {
                let meta = chunk.meta;
                if let Some(done) = self.current.take() {
                    done.response.close(false);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("chunk of position {meta} ended early"),
                ));
            }
            chunk.remaining -= read as u64;
            return Ok(read);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use sds_http::mock::{MockBehavior, MockSocketProvider};
    use sds_http::HttpSettings;
    use sds_types::constants::OIO_TIMEOUT_HEADER;
    use sds_types::{ErrorKind, ObjectUrl, Position};
    use std::io::Write;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn rawx(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, port as u8], 6000))
    }

    fn hash_of(data: &[u8]) -> String {
        hex::encode_upper(blake3::hash(data).as_bytes())
    }

    fn client_with(mock: MockSocketProvider, bufsize: usize, pool: PoolConfig) -> (RawxClient, Arc<MockSocketProvider>) {
        let mock = Arc::new(mock);
        let http = Http::new(
            HttpSettings::default(),
            Arc::clone(&mock) as Arc<dyn SocketProvider>,
            Arc::new(DeadlineManager::new()),
        );
        let settings = RawxSettings {
            bufsize,
            ..RawxSettings::default()
        };
        let client = RawxClient::new(Arc::new(http), Arc::new(WorkerPool::new(pool)), settings);
        (client, mock)
    }

    fn client(mock: MockSocketProvider, bufsize: usize) -> (RawxClient, Arc<MockSocketProvider>) {
        client_with(mock, bufsize, PoolConfig::default())
    }

    /// `positions` metas of `chunk_size` bytes, each replicated on the given
    /// rawx hosts.
    fn object(size: u64, chunk_size: u64, positions: u32, hosts: &[u16]) -> ObjectInfo {
        let mut chunks = Vec::new();
        for meta in 0..positions {
            for &host in hosts {
                let url = format!("http://{}/C{meta}R{host}", rawx(host));
                chunks.push(ChunkInfo::new(url, Position::simple(meta), chunk_size).unwrap());
            }
        }
        let mut oinf = ObjectInfo::new(
            ObjectUrl::new("OPENIO", "acct", "photos", "cat.jpg", "CID0"),
            "OID0",
            size,
        )
        .with_chunks(chunks);
        oinf.version = 42;
        oinf.policy = "THREECOPIES".into();
        oinf.chunk_method = "plain".into();
        oinf
    }

    fn body_sent_to(mock: &MockSocketProvider, host: u16) -> Vec<Vec<u8>> {
        mock.exchanges_for(rawx(host))
            .iter()
            .map(|ex| ex.body().unwrap())
            .collect()
    }

    #[test]
    fn replicas_receive_identical_bytes() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let data = b"0123456789";
        let mut oinf = object(10, 10, 1, &[1, 2]);
        client.upload_chunks(&mut oinf, &data[..]).unwrap();

        assert_eq!(body_sent_to(&mock, 1), vec![data.to_vec()]);
        assert_eq!(body_sent_to(&mock, 2), vec![data.to_vec()]);
        for chunk in &oinf.chunks {
            assert_eq!(chunk.size(), 10);
            assert_eq!(chunk.hash(), Some(hash_of(data).as_str()));
        }
    }

    #[test]
    fn pump_splits_source_in_bufsize_blocks() {
        let (mut group, mut readers) = feed::group(1, FEED_CAPACITY);
        pump(&mut &b"0123456789"[..], 10, 4, &mut group).unwrap();
        let mut reader = readers.remove(0);
        let mut sizes = Vec::new();
        while let Some(block) = reader.next_block().unwrap() {
            sizes.push(block.len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn requests_carry_chunk_metadata() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let mut oinf = object(6, 10, 1, &[1]);
        client.upload_chunks_from_bytes(&mut oinf, b"abcdef").unwrap();

        let ex = &mock.exchanges_for(rawx(1))[0];
        assert_eq!(ex.request_line(), "PUT /C0R1 HTTP/1.1");
        assert_eq!(ex.header(CHUNK_META_CONTAINER_ID), Some("CID0"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_ID), Some("OID0"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_VERSION), Some("42"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_POLICY), Some("THREECOPIES"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_MIME_TYPE), Some("application/octet-stream"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_CHUNK_METHOD), Some("plain"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_CHUNKSNB), Some("1"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_SIZE), Some("6"));
        assert_eq!(ex.header(CHUNK_META_CONTENT_PATH), Some("cat.jpg"));
        assert_eq!(ex.header(CHUNK_META_CHUNK_ID), Some("C0R1"));
        assert_eq!(ex.header(CHUNK_META_CHUNK_POS), Some("0"));
        assert_eq!(ex.header("Content-Length"), Some("6"));
        assert!(ex.header(OIO_TIMEOUT_HEADER).is_none());
        assert_eq!(oinf.chunks[0].size(), 6);
    }

    #[test]
    fn positions_split_the_object() {
        let (client, mock) = client(MockSocketProvider::new(), 3);
        let data: Vec<u8> = (0..25u8).collect();
        let mut oinf = object(25, 10, 3, &[1, 2]);
        client.upload_chunks(&mut oinf, &data[..]).unwrap();

        let expected = vec![data[..10].to_vec(), data[10..20].to_vec(), data[20..].to_vec()];
        for host in [1, 2] {
            let mut bodies: Vec<(String, Vec<u8>)> = mock
                .exchanges_for(rawx(host))
                .iter()
                .map(|ex| {
                    let pos = ex.header(CHUNK_META_CHUNK_POS).unwrap().to_owned();
                    (pos, ex.body().unwrap())
                })
                .collect();
            bodies.sort();
            let sent: Vec<Vec<u8>> = bodies.into_iter().map(|(_, body)| body).collect();
            assert_eq!(sent, expected);
        }
        let sizes: Vec<u64> = oinf.sorted_chunks().values().map(|c| c[0].size()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(sizes.iter().sum::<u64>(), oinf.size);
    }

    #[test]
    fn failed_replica_fails_position_after_siblings_finish() {
        let mock = MockSocketProvider::new()
            .with_behavior(rawx(1), MockBehavior::status(404, "Not Found"));
        let (client, mock) = client(mock, 4);
        let data = b"0123456789";
        let mut oinf = object(10, 10, 1, &[1, 2]);
        let err = client.upload_chunks(&mut oinf, &data[..]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ChunkNotFound);
        assert_eq!(oinf.chunks[0].hash(), None);
        assert_eq!(oinf.chunks[1].hash(), Some(hash_of(data).as_str()));
        assert_eq!(oinf.chunks[1].size(), 10);
        assert_eq!(body_sent_to(&mock, 2), vec![data.to_vec()]);
    }

    #[test]
    fn first_error_in_replica_order_wins() {
        let mock = MockSocketProvider::new()
            .with_behavior(rawx(1), MockBehavior::status(400, "Bad Request"))
            .with_behavior(rawx(2), MockBehavior::status(500, "Boom"));
        let (client, _mock) = client(mock, 4);
        let mut oinf = object(4, 10, 1, &[1, 2]);
        let err = client.upload_chunks_from_bytes(&mut oinf, b"abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn short_source_is_stream_consumption_error() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let mut oinf = object(10, 10, 1, &[1, 2]);
        let err = client.upload_chunks(&mut oinf, &b"012345"[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamConsumption);
        assert_eq!(err.message(), "Stream consumption error");
        assert_eq!(
            err.io_cause().map(io::Error::kind),
            Some(io::ErrorKind::UnexpectedEof)
        );
        assert!(oinf.chunks.iter().all(|c| c.hash().is_none()));

        // A replica either never started or had its body cut short, and every
        // socket opened was released before the error was returned.
        let exchanges = mock.exchanges();
        assert!(exchanges.len() <= 2);
        for ex in &exchanges {
            let err = ex.body().unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        }
        assert_eq!(mock.closed(), mock.connects().len());
        assert_eq!(mock.closed(), exchanges.len());
        for host in [1, 2] {
            assert_eq!(mock.stored(rawx(host), &format!("/C0R{host}")), None);
        }
    }

    fn sds_kind(err: &io::Error) -> Option<ErrorKind> {
        err.get_ref()?.downcast_ref::<SdsError>().map(SdsError::kind)
    }

    #[test]
    fn download_reads_back_every_position() {
        let (client, _mock) = client(MockSocketProvider::new(), 3);
        let data: Vec<u8> = (0..25u8).collect();
        let mut oinf = object(25, 10, 3, &[1, 2]);
        client.upload_chunks(&mut oinf, &data[..]).unwrap();

        let mut out = Vec::new();
        client.download_object(&oinf).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn download_skips_unreachable_replica() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let mut oinf = object(8, 10, 1, &[1, 2]);
        client.upload_chunks_from_bytes(&mut oinf, b"abcdefgh").unwrap();
        mock.set_behavior(rawx(1), MockBehavior::Refuse);

        let mut out = Vec::new();
        client.download_object(&oinf).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdefgh");
        let get = mock.exchanges().pop().unwrap();
        assert_eq!(get.addr, rawx(2));
        assert_eq!(get.request_line(), "GET /C0R2 HTTP/1.1");
    }

    #[test]
    fn download_stops_on_missing_chunk() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let oinf = object(8, 10, 1, &[1, 2]);
        let err = client
            .download_object(&oinf)
            .unwrap()
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert_eq!(sds_kind(&err), Some(ErrorKind::ChunkNotFound));
        assert_eq!(mock.connects(), vec![rawx(1)]);
    }

    #[test]
    fn download_fails_when_every_replica_is_down() {
        let mock = MockSocketProvider::new().with_fallback(MockBehavior::Refuse);
        let (client, mock) = client(mock, 4);
        let oinf = object(8, 10, 1, &[1, 2]);
        let err = client
            .download_object(&oinf)
            .unwrap()
            .read_to_end(&mut Vec::new())
            .unwrap_err();
        assert_eq!(sds_kind(&err), Some(ErrorKind::System));
        assert_eq!(mock.connects(), vec![rawx(1), rawx(2)]);
    }

    #[test]
    fn truncated_chunk_is_unexpected_eof() {
        let mock = MockSocketProvider::new().with_stored(rawx(1), "/C0R1", b"abc".to_vec());
        let (client, _mock) = client(mock, 4);
        let oinf = object(10, 10, 1, &[1]);
        let mut out = Vec::new();
        let err = client
            .download_object(&oinf)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn empty_object_downloads_without_requests() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let oinf = object(0, 10, 2, &[1]);
        let mut out = Vec::new();
        client.download_object(&oinf).unwrap().read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(mock.connects().is_empty());
    }

    #[test]
    fn client_follows_loaded_settings() {
        let settings = ClientSettings::from_toml_str(
            r#"
            [rawx]
            bufsize = 3

            [rawx.http]
            user_agent = "sds-test"

            [pool]
            max_workers = 2
            "#,
        )
        .unwrap();
        let mock = Arc::new(MockSocketProvider::new());
        let client = RawxClient::from_settings(
            &settings,
            Arc::clone(&mock) as Arc<dyn SocketProvider>,
            Arc::new(DeadlineManager::new()),
        );
        assert_eq!(client.settings().bufsize, 3);
        assert_eq!(client.http().settings().user_agent, "sds-test");

        let mut oinf = object(4, 10, 1, &[1, 2]);
        client.upload_chunks_from_bytes(&mut oinf, b"abcd").unwrap();
        for ex in mock.exchanges() {
            assert_eq!(ex.header("User-Agent"), Some("sds-test"));
        }

        let mut wide = object(4, 10, 1, &[1, 2, 3]);
        let err = client.upload_chunks_from_bytes(&mut wide, b"abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_object_sends_empty_bodies() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let mut oinf = object(0, 10, 1, &[1, 2]);
        client.upload_chunks(&mut oinf, io::empty()).unwrap();
        for host in [1, 2] {
            let ex = &mock.exchanges_for(rawx(host))[0];
            assert_eq!(ex.header("Content-Length"), Some("0"));
            assert!(ex.body().unwrap().is_empty());
        }
        for chunk in &oinf.chunks {
            assert_eq!(chunk.size(), 0);
            assert_eq!(chunk.hash(), Some(hash_of(b"").as_str()));
        }
    }

    #[test]
    fn undersized_chunks_are_rejected_before_io() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let mut oinf = object(30, 10, 2, &[1]);
        let err = client.upload_chunks(&mut oinf, &[0u8; 30][..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(mock.connects().is_empty());
    }

    #[test]
    fn more_replicas_than_workers_are_rejected() {
        let pool = PoolConfig {
            max_workers: 1,
            ..PoolConfig::default()
        };
        let (client, mock) = client_with(MockSocketProvider::new(), 4, pool);
        let mut oinf = object(4, 10, 1, &[1, 2]);
        let err = client.upload_chunks_from_bytes(&mut oinf, b"abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(mock.connects().is_empty());
    }

    #[test]
    fn deadline_reaches_every_replica() {
        let (client, mock) = client(MockSocketProvider::new(), 4);
        let deadline = client.http().deadlines().deadline_in(Duration::from_secs(30));
        let mut oinf = object(4, 10, 1, &[1, 2]);
        client
            .upload_chunks_with_deadline(&mut oinf, &b"abcd"[..], deadline)
            .unwrap();
        for ex in mock.exchanges() {
            assert!(ex.header(OIO_TIMEOUT_HEADER).is_some());
            assert!(ex.timeout.is_some());
        }
    }

    #[test]
    fn upload_from_file() {
        let (client, mock) = client(MockSocketProvider::new(), 1024);
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let mut oinf = object(5000, 4096, 2, &[1]);
        client.upload_chunks_from_file(&mut oinf, file.path()).unwrap();
        let mut sent = body_sent_to(&mock, 1);
        sent.sort_by_key(|body| std::cmp::Reverse(body.len()));
        assert_eq!(sent, vec![data[..4096].to_vec(), data[4096..].to_vec()]);
    }

    #[test]
    fn missing_file_is_invalid_argument() {
        let (client, mock) = client(MockSocketProvider::new(), 1024);
        let dir = tempfile::tempdir().unwrap();
        let mut oinf = object(10, 10, 1, &[1]);
        let err = client
            .upload_chunks_from_file(&mut oinf, dir.path().join("missing.bin"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(mock.connects().is_empty());
    }
}
