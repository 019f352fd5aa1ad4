use std::path::Path;

use serde::{Deserialize, Serialize};

use sds_http::HttpSettings;
use sds_types::{SdsError, SdsResult};

use crate::pool::PoolConfig;

/// Upload settings of the [`crate::RawxClient`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawxSettings {
    /// Size of the blocks read from the source and fed to every replica.
    pub bufsize: usize,
    pub http: HttpSettings,
}

impl Default for RawxSettings {
    fn default() -> Self {
        Self {
            bufsize: 65_536,
            http: HttpSettings::default(),
        }
    }
}

/// Client configuration, loadable from TOML. See
/// [`RawxClient::from_settings`](crate::RawxClient::from_settings).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub rawx: RawxSettings,
    pub pool: PoolConfig,
}

impl ClientSettings {
    pub fn from_toml_str(text: &str) -> SdsResult<Self> {
        toml::from_str(text)
            .map_err(|e| SdsError::invalid_argument("Invalid client settings").with_source(e))
    }

    /// Read settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SdsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SdsError::invalid_argument(format!("Unable to read {}", path.display())).with_source(e)
        })?;
        Self::from_toml_str(&text)
    }
}
