//! Artifact acquisition for new servers.
//!
//! Before a server can be started its directory has to be populated with
//! the server software. The fleet manager only depends on the
//! [`ArtifactProvider`] trait; [`HttpArtifactProvider`] is the stock
//! implementation that downloads version jars and mod-pack archives.
//!
//! # Examples
//!
//! ```
//! use mc_runner::artifact::SourceSpec;
//!
//! let spec: SourceSpec = "1.20.4".parse().unwrap();
//! assert_eq!(spec, SourceSpec::Version { version: "1.20.4".to_string() });
//!
//! let spec: SourceSpec = "https://www.curseforge.com/minecraft/modpacks/demo".parse().unwrap();
//! assert!(matches!(spec, SourceSpec::PackPage { .. }));
//! ```
mod http;
pub mod page;

pub use http::HttpArtifactProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Where a server's files come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Vanilla server identified by a version tag.
    Version { version: String },
    /// Third-party mod-pack page; the archive link is resolved from its content.
    PackPage { url: String },
    /// Direct link to a server-pack zip archive.
    PackArchive { url: String },
}

impl SourceSpec {
    /// Short label used in listings.
    pub fn label(&self) -> &str {
        match self {
            SourceSpec::Version { version } => version,
            SourceSpec::PackPage { url } | SourceSpec::PackArchive { url } => url,
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Version { version } => write!(f, "version {}", version),
            SourceSpec::PackPage { url } => write!(f, "mod-pack page {}", url),
            SourceSpec::PackArchive { url } => write!(f, "server pack {}", url),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidArgument(
                "Source must be a version or a URL".to_string(),
            ));
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            let path = s.split(['?', '#']).next().unwrap_or(s);
            if path.to_ascii_lowercase().ends_with(".zip") {
                return Ok(SourceSpec::PackArchive { url: s.to_string() });
            }
            return Ok(SourceSpec::PackPage { url: s.to_string() });
        }

        Ok(SourceSpec::Version {
            version: s.to_string(),
        })
    }
}

/// Files written by a successful acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquiredArtifact {
    /// Paths written into the server directory.
    pub files: Vec<PathBuf>,
}

/// Reasons an acquisition fails.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// The mod-pack page yielded no server-pack link.
    #[error("Could not find server pack on page {page}")]
    PageUnresolved { page: String },

    /// A request returned a non-success status.
    #[error("Failed to download {url}: HTTP {status}")]
    Http { url: String, status: u16 },

    /// The request itself failed.
    #[error("Download failed: {0}")]
    Transfer(String),

    /// The downloaded archive could not be unpacked.
    #[error("Failed to extract server pack: {0}")]
    Extract(String),

    /// Writing into the server directory failed.
    #[error("Failed to write server files: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquireError {
    /// Whether the operator should retry with a more specific source,
    /// such as a direct server-pack archive URL.
    pub fn needs_specific_source(&self) -> bool {
        matches!(self, AcquireError::PageUnresolved { .. })
    }
}

/// Populates a server directory from a [`SourceSpec`].
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Fetch the server files for `source` into `server_dir`.
    ///
    /// `server_dir` already exists when this is called.
    async fn acquire(
        &self,
        server_dir: &Path,
        source: &SourceSpec,
    ) -> Result<AcquiredArtifact, AcquireError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_spec_shapes() {
        assert_eq!(
            "1.20.1".parse::<SourceSpec>().unwrap(),
            SourceSpec::Version { version: "1.20.1".to_string() }
        );
        assert_eq!(
            "https://example.com/packs/server.ZIP".parse::<SourceSpec>().unwrap(),
            SourceSpec::PackArchive { url: "https://example.com/packs/server.ZIP".to_string() }
        );
        assert_eq!(
            "https://example.com/dl/pack.zip?token=1".parse::<SourceSpec>().unwrap(),
            SourceSpec::PackArchive { url: "https://example.com/dl/pack.zip?token=1".to_string() }
        );
        assert_eq!(
            "http://example.com/minecraft/modpacks/demo".parse::<SourceSpec>().unwrap(),
            SourceSpec::PackPage { url: "http://example.com/minecraft/modpacks/demo".to_string() }
        );
        assert!("   ".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn test_source_spec_serde_shape() {
        let spec = SourceSpec::Version { version: "1.19".to_string() };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "version", "version": "1.19"}));
    }

    #[test]
    fn test_only_unresolved_pages_need_specific_source() {
        assert!(AcquireError::PageUnresolved { page: "p".to_string() }.needs_specific_source());
        assert!(!AcquireError::Http { url: "u".to_string(), status: 404 }.needs_specific_source());
    }
}
