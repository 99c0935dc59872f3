use super::page::resolve_download_link;
use super::{AcquireError, AcquiredArtifact, ArtifactProvider, SourceSpec};
use crate::config::ArtifactsConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const ARCHIVE_NAME: &str = "server.zip";
const JAR_NAME: &str = "server.jar";

/// Downloads server artifacts over HTTP.
///
/// - Version tags fetch a single jar from the configured URL template.
/// - Mod-pack pages are fetched, the server-pack link is resolved from the
///   page content, and the archive is downloaded and extracted.
/// - Direct archive links skip the resolution step.
#[derive(Debug, Clone)]
pub struct HttpArtifactProvider {
    client: reqwest::Client,
    config: ArtifactsConfig,
}

impl HttpArtifactProvider {
    /// Create a provider with a fresh HTTP client.
    pub fn new(config: ArtifactsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, AcquireError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquireError::Transfer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AcquireError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    async fn download_to(&self, url: &str, target: &Path) -> Result<(), AcquireError> {
        tracing::info!(url = %url, target = %target.display(), "Downloading");
        let bytes = self
            .fetch(url)
            .await?
            .bytes()
            .await
            .map_err(|e| AcquireError::Transfer(e.to_string()))?;
        tokio::fs::write(target, &bytes).await?;
        tracing::debug!(bytes = bytes.len(), "Download complete");
        Ok(())
    }

    async fn resolve_page(&self, page: &str) -> Result<String, AcquireError> {
        let html = self
            .fetch(page)
            .await?
            .text()
            .await
            .map_err(|e| AcquireError::Transfer(e.to_string()))?;

        resolve_download_link(&html, &self.config.page_base_url).ok_or_else(|| {
            tracing::warn!(page = %page, "No server pack link found on page");
            AcquireError::PageUnresolved {
                page: page.to_string(),
            }
        })
    }

    async fn install_archive(
        &self,
        url: &str,
        server_dir: &Path,
    ) -> Result<AcquiredArtifact, AcquireError> {
        let archive = server_dir.join(ARCHIVE_NAME);
        self.download_to(url, &archive).await?;

        let dir = server_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || extract_archive(&archive, &dir))
            .await
            .map_err(|e| AcquireError::Extract(format!("Task join error: {}", e)))??;

        Ok(AcquiredArtifact { files })
    }
}

#[async_trait]
impl ArtifactProvider for HttpArtifactProvider {
    #[tracing::instrument(skip(self), fields(server_dir = %server_dir.display()))]
    async fn acquire(
        &self,
        server_dir: &Path,
        source: &SourceSpec,
    ) -> Result<AcquiredArtifact, AcquireError> {
        match source {
            SourceSpec::Version { version } => {
                let url = self.config.version_url.replace("{version}", version);
                let jar = server_dir.join(JAR_NAME);
                self.download_to(&url, &jar).await?;
                Ok(AcquiredArtifact { files: vec![jar] })
            }
            SourceSpec::PackPage { url } => {
                let download = self.resolve_page(url).await?;
                self.install_archive(&download, server_dir).await
            }
            SourceSpec::PackArchive { url } => self.install_archive(url, server_dir).await,
        }
    }
}

/// Unpack `archive` into `dir` and delete the archive afterwards.
fn extract_archive(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>, AcquireError> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| AcquireError::Extract(e.to_string()))?;

    let files = zip
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(|name| dir.join(name))
        .collect::<Vec<_>>();

    zip.extract(dir)
        .map_err(|e| AcquireError::Extract(e.to_string()))?;
    std::fs::remove_file(archive)?;

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_archive_removes_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_NAME);

        {
            let file = std::fs::File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            writer.start_file("server.jar", options).unwrap();
            writer.write_all(b"jar").unwrap();
            writer.add_directory("mods/", options).unwrap();
            writer.start_file("mods/a.jar", options).unwrap();
            writer.write_all(b"mod").unwrap();
            writer.finish().unwrap();
        }

        let files = extract_archive(&archive, dir.path()).unwrap();

        assert!(!archive.exists());
        assert_eq!(files.len(), 2);
        assert_eq!(std::fs::read(dir.path().join("mods/a.jar")).unwrap(), b"mod");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_NAME);
        std::fs::write(&archive, b"not a zip").unwrap();

        let err = extract_archive(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, AcquireError::Extract(_)));
    }
}
