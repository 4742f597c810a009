//! Bootstrap ("common") code
//!
//! The bootstrap is prepended to every module and implements the module
//! side of the protocol. One script exists per format version. It is
//! either embedded in the binary or read from a directory holding
//! `common_v{N}.js` files, and it is cached for the life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

use crate::core::error::{BridgeError, ErrorContext, Result};
use crate::protocol::FormatVersion;

const COMMON_V1: &str = include_str!("js/common_v1.js");
const COMMON_V2: &str = include_str!("js/common_v2.js");

/// Script run once per page before the bootstrap, installing `NativeBridge`
pub(crate) const PRELUDE: &str = include_str!("js/prelude.js");

/// Where bootstrap code comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum BootstrapSource {
    #[default]
    Embedded,
    /// Directory containing `common_v1.js` / `common_v2.js`
    Directory(PathBuf),
}

impl BootstrapSource {
    /// Directory source when a path is configured, embedded otherwise
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        dir.map(BootstrapSource::Directory).unwrap_or_default()
    }

    fn read(&self, version: FormatVersion) -> Result<Arc<str>> {
        match self {
            BootstrapSource::Embedded => Ok(Arc::from(match version {
                FormatVersion::V1 => COMMON_V1,
                FormatVersion::V2 => COMMON_V2,
            })),
            BootstrapSource::Directory(dir) => {
                let path = dir.join(format!("common_v{}.js", version.number()));
                let code = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read bootstrap code {}", path.display()))?;
                Ok(Arc::from(code))
            }
        }
    }
}

type CacheKey = (BootstrapSource, FormatVersion);

fn cache() -> &'static RwLock<HashMap<CacheKey, Arc<str>>> {
    static CACHE: OnceLock<RwLock<HashMap<CacheKey, Arc<str>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get the bootstrap code for a format version, reading it at most once
pub fn common_code(source: &BootstrapSource, version: FormatVersion) -> Result<Arc<str>> {
    let key = (source.clone(), version);

    {
        let cached = cache()
            .read()
            .map_err(|_| BridgeError::Initialization("bootstrap cache poisoned".to_string()))?;
        if let Some(code) = cached.get(&key) {
            return Ok(code.clone());
        }
    }

    let code = source.read(version)?;
    debug!(?source, %version, len = code.len(), "Loaded bootstrap code");

    let mut cached = cache()
        .write()
        .map_err(|_| BridgeError::Initialization("bootstrap cache poisoned".to_string()))?;
    Ok(cached.entry(key).or_insert(code).clone())
}
