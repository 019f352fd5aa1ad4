use sds_types::{SdsError, SdsResult};

use crate::response::Response;

/// Status-code checks applied to a response before it is handed back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseVerifier {
    /// Accept every status.
    #[default]
    Passthrough,
    /// Chunk PUT/GET semantics of a rawx service.
    StrictChunk,
}

impl ResponseVerifier {
    pub fn verify(&self, resp: &Response) -> SdsResult<()> {
        self.verify_status(resp.code(), resp.msg())
    }

    /// Classify a status line.
    pub fn verify_status(&self, code: u16, msg: &str) -> SdsResult<()> {
        match self {
            Self::Passthrough => Ok(()),
            Self::StrictChunk => match code {
                200 | 201 | 204 => Ok(()),
                400 => Err(SdsError::bad_request(msg)),
                404 => Err(SdsError::chunk_not_found(msg)),
                500 => Err(SdsError::internal(format!("Internal error ({code} {msg})"))),
                _ => Err(SdsError::unmanaged(format!(
                    "Unmanaged response code ({code} {msg})"
                ))),
            },
        }
    }
}
