//! Download of source tarballs into the shared downloads folder.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::core::errors::BuildError;
use crate::util::shell::{Shell, Status};

/// Fetches URLs to local files, with a progress bar.
#[derive(Debug, Clone)]
pub struct Downloader {
    shell: Arc<Shell>,
    offline: bool,
    timeout: Option<Duration>,
}

impl Downloader {
    pub fn new(shell: Arc<Shell>) -> Self {
        Downloader {
            shell,
            offline: false,
            timeout: None,
        }
    }

    /// Refuse any network access.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Download `url` to `dest`.
    ///
    /// The body is streamed into a temporary file next to `dest` and only
    /// moved into place once complete, so an interrupted download never
    /// leaves a truncated tarball in the cache.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let fail = |message: String| BuildError::FetchFailure {
            url: url.to_string(),
            message,
        };

        if self.offline {
            return Err(fail("offline mode is enabled".to_string()).into());
        }

        let parent = dest
            .parent()
            .with_context(|| format!("invalid download destination: {}", dest.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;

        self.shell.status(Status::Fetching, url);
        tracing::debug!("Downloading {} -> {}", url, dest.display());

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| fail(e.to_string()))?;

        let mut response = client.get(url).send().map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())).into());
        }

        let label = basename(url).unwrap_or_else(|| url.to_string());
        let mut progress = self
            .shell
            .bytes_progress(label, response.content_length().unwrap_or(0));

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|e| fail(e.to_string()))?;
            if read == 0 {
                break;
            }
            tmp.write_all(&buffer[..read])
                .context("failed to write download")?;
            progress.inc(read as u64);
        }
        progress.finish();

        tmp.persist(dest)
            .with_context(|| format!("failed to save download to {}", dest.display()))?;
        tracing::debug!("Downloaded {} bytes", progress.position());

        Ok(())
    }
}

/// Last path segment of `url`, used as the cache file name.
pub fn basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(
            basename("https://www.python.org/ftp/python/3.9.6/Python-3.9.6.tgz").as_deref(),
            Some("Python-3.9.6.tgz")
        );
        assert_eq!(
            basename("https://zlib.net/fossils/zlib-1.2.11.tar.gz?x=1").as_deref(),
            Some("zlib-1.2.11.tar.gz")
        );
        assert_eq!(basename("not a url"), None);
    }

    #[test]
    fn test_offline_refuses_to_fetch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let downloader = Downloader::new(Arc::new(Shell::default())).offline(true);

        let err = downloader
            .fetch("https://zlib.net/zlib-1.2.11.tar.gz", &tmp.path().join("zlib.tar.gz"))
            .unwrap_err();
        let build_err = err.downcast_ref::<BuildError>().unwrap();
        assert!(matches!(build_err, BuildError::FetchFailure { .. }));
        assert!(!tmp.path().join("zlib.tar.gz").exists());
    }
}
