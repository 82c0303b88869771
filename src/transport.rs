use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Opens resources relative to a repository root.
pub trait ResourceFetcher {
    fn location(&self, name: &str) -> String;

    fn open(&self, name: &str) -> Result<Box<dyn Read>>;
}

/// Picks the fetcher for a repository URL: `file://` URLs read from disk,
/// everything else goes over HTTP.
pub fn fetcher_for(repository_url: &str) -> Result<Box<dyn ResourceFetcher>> {
    if let Some(path) = repository_url.strip_prefix("file://") {
        return Ok(Box::new(FileFetcher::new(PathBuf::from(path))));
    }
    Ok(Box::new(HttpFetcher::new(repository_url)?))
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("mvn-query/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|err| Error::fetch_caused_by(base_url, "failed to create HTTP client", err))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn location(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read>> {
        let url = self.location(name);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| Error::fetch_caused_by(&url, "request failed", err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(&url, format!("server answered {status}")));
        }
        Ok(Box::new(response))
    }
}

#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ResourceFetcher for FileFetcher {
    fn location(&self, name: &str) -> String {
        self.root.join(name).display().to_string()
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read>> {
        let path = self.root.join(name);
        let file = File::open(&path)
            .map_err(|err| Error::fetch_caused_by(path.display().to_string(), "cannot open", err))?;
        Ok(Box::new(file))
    }
}
