//! Header names and well-known values of the SDS wire protocol.

pub const CONTENT_LENGTH_HEADER: &str = "Content-Length";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const TRANSFER_ENCODING_HEADER: &str = "Transfer-Encoding";

/// Request budget forwarded to the remote side, in microseconds.
pub const OIO_TIMEOUT_HEADER: &str = "X-oio-timeout";

pub const CHUNK_META_CONTAINER_ID: &str = "X-oio-Chunk-Meta-Container-Id";
pub const CHUNK_META_CONTENT_ID: &str = "X-oio-Chunk-Meta-Content-Id";
pub const CHUNK_META_CONTENT_VERSION: &str = "X-oio-Chunk-Meta-Content-Version";
pub const CHUNK_META_CONTENT_POLICY: &str = "X-oio-Chunk-Meta-Content-Storage-Policy";
pub const CHUNK_META_CONTENT_MIME_TYPE: &str = "X-oio-Chunk-Meta-Content-Mime-Type";
pub const CHUNK_META_CONTENT_CHUNK_METHOD: &str = "X-oio-Chunk-Meta-Content-Chunk-Method";
pub const CHUNK_META_CONTENT_CHUNKSNB: &str = "X-oio-Chunk-Meta-Content-Chunksnb";
pub const CHUNK_META_CONTENT_SIZE: &str = "X-oio-Chunk-Meta-Content-Size";
pub const CHUNK_META_CONTENT_PATH: &str = "X-oio-Chunk-Meta-Content-Path";
pub const CHUNK_META_CHUNK_ID: &str = "X-oio-Chunk-Meta-Chunk-Id";
pub const CHUNK_META_CHUNK_POS: &str = "X-oio-Chunk-Meta-Chunk-Pos";
/// Response header carrying the hash computed by the storage target.
pub const CHUNK_META_CHUNK_HASH: &str = "X-oio-Chunk-Meta-Chunk-Hash";

pub const GET_METHOD: &str = "GET";
pub const PUT_METHOD: &str = "PUT";
pub const POST_METHOD: &str = "POST";
pub const DELETE_METHOD: &str = "DELETE";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";
