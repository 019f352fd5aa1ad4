use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SdsError, SdsResult};
use crate::position::Position;

/// Logical location of an object: namespace, account, container and path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectUrl {
    pub ns: String,
    pub account: String,
    pub container: String,
    pub object: String,
    /// Container identifier, as computed by the directory.
    pub cid: String,
}

impl ObjectUrl {
    pub fn new(
        ns: impl Into<String>,
        account: impl Into<String>,
        container: impl Into<String>,
        object: impl Into<String>,
        cid: impl Into<String>,
    ) -> Self {
        Self {
            ns: ns.into(),
            account: account.into(),
            container: container.into(),
            object: object.into(),
            cid: cid.into(),
        }
    }
}

/// One replica target of a position.
///
/// The directory fills `url`, `pos` and the declared `size`; an upload
/// overwrites `size` with the effective byte count and sets `hash` to the
/// value reported by the storage target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    url: String,
    id: String,
    pos: Position,
    size: u64,
    hash: Option<String>,
}

impl ChunkInfo {
    /// Build a chunk target. The chunk id is the last path segment of `url`.
    pub fn new(url: impl Into<String>, pos: Position, size: u64) -> SdsResult<Self> {
        let url = url.into();
        let parsed = Url::parse(&url).map_err(|e| {
            SdsError::invalid_argument(format!("Invalid chunk url {url}")).with_source(e)
        })?;
        let id = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| SdsError::invalid_argument(format!("No chunk id in url {url}")))?;
        Ok(Self {
            url,
            id,
            pos,
            size,
            hash: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pos(&self) -> Position {
        self.pos
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn set_hash(&mut self, hash: Option<String>) {
        self.hash = hash;
    }
}

/// Object descriptor as returned by the directory before an upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub url: ObjectUrl,
    /// Content identifier.
    pub oid: String,
    pub version: i64,
    pub policy: String,
    pub mime_type: String,
    pub chunk_method: String,
    /// Total object size in bytes.
    pub size: u64,
    pub chunks: Vec<ChunkInfo>,
}

impl ObjectInfo {
    pub fn new(url: ObjectUrl, oid: impl Into<String>, size: u64) -> Self {
        Self {
            url,
            oid: oid.into(),
            version: 0,
            policy: String::new(),
            mime_type: "application/octet-stream".into(),
            chunk_method: String::new(),
            size,
            chunks: Vec::new(),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<ChunkInfo>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Chunk indices grouped by meta position, in ascending order.
    ///
    /// Within a group, replicas are ordered by full position, then by their
    /// order in [`ObjectInfo::chunks`].
    pub fn sorted_chunk_indices(&self) -> BTreeMap<u32, Vec<usize>> {
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, chunk) in self.chunks.iter().enumerate() {
            groups.entry(chunk.pos.meta()).or_default().push(idx);
        }
        for indices in groups.values_mut() {
            indices.sort_by_key(|&idx| (self.chunks[idx].pos, idx));
        }
        groups
    }

    /// Chunks grouped by meta position, in ascending order.
    pub fn sorted_chunks(&self) -> BTreeMap<u32, Vec<&ChunkInfo>> {
        self.sorted_chunk_indices()
            .into_iter()
            .map(|(meta, indices)| (meta, indices.into_iter().map(|i| &self.chunks[i]).collect()))
            .collect()
    }

    /// Number of meta positions.
    pub fn nb_chunks(&self) -> usize {
        self.sorted_chunk_indices().len()
    }

    /// Declared size of the meta position, 0 if it has no chunk.
    pub fn chunk_size(&self, meta: u32) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.pos.meta() == meta)
            .map(|c| c.size)
            .max()
            .unwrap_or(0)
    }

    /// Total bytes the declared positions can hold.
    pub fn declared_capacity(&self) -> u64 {
        self.sorted_chunk_indices()
            .keys()
            .map(|&meta| self.chunk_size(meta))
            .sum()
    }
}
