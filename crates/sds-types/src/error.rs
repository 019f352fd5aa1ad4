use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Boxed cause attached to an [`SdsError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classification of every failure the client can report.
///
/// Protocol-level kinds come from response verification; `System` covers
/// socket and I/O failures (including host-list exhaustion).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A caller-supplied value is malformed (URI, position, settings).
    InvalidArgument,
    /// The target answered 400.
    BadRequest,
    /// The target answered 404.
    ChunkNotFound,
    /// The target answered 500.
    InternalError,
    /// The target answered a status the verifier does not handle.
    UnmanagedResponse,
    /// Socket or I/O failure, or every candidate host failed.
    System,
    /// The request deadline was reached before any I/O.
    DeadlineExceeded,
    /// The caller's source stream ended early or failed while pumping.
    StreamConsumption,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::BadRequest => "bad request",
            Self::ChunkNotFound => "chunk not found",
            Self::InternalError => "internal error",
            Self::UnmanagedResponse => "unmanaged response",
            Self::System => "system error",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::StreamConsumption => "stream consumption error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error value returned by SDS operations.
///
/// Callers branch on [`SdsError::kind`]; the underlying failure, when there is
/// one, is kept as the error source.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SdsError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SdsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn chunk_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ChunkNotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn unmanaged(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnmanagedResponse, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn stream_consumption(cause: io::Error) -> Self {
        Self::new(ErrorKind::StreamConsumption, "Stream consumption error").with_source(cause)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The direct cause, if it is an I/O error.
    pub fn io_cause(&self) -> Option<&io::Error> {
        self.source.as_deref()?.downcast_ref::<io::Error>()
    }

    /// Returns `true` if the direct cause is a transport (I/O) failure.
    ///
    /// Host-list failover only moves to the next host for these errors.
    pub fn is_transport(&self) -> bool {
        self.io_cause().is_some()
    }
}

/// Result alias for SDS operations.
pub type SdsResult<T> = Result<T, SdsError>;
