use crate::AdapterError;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Fetch a single URL into a local file.
pub trait Fetcher {
    /// Returns the number of body bytes written to `dest`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AdapterError>;
}

/// Plain blocking GET with a fixed `User-Agent`.
///
/// No request timeout is configured; a stalled server blocks the caller.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(None)
            .build()
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("build http client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, AdapterError> {
        let http_err = |e: reqwest::Error| AdapterError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;

        let io_err = |source| AdapterError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut out = BufWriter::new(File::create(dest).map_err(io_err)?);
        let written = response.copy_to(&mut out).map_err(http_err)?;
        out.flush().map_err(io_err)?;

        tracing::debug!(url, bytes = written, dest = %dest.display(), "fetched");
        Ok(written)
    }
}
