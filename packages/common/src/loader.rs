use crate::error::CommonError;
use crate::result::CommonResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Source of serialized documents, addressed by path or URL
pub trait ResourceLoader: Send + Sync {
    /// Read the raw bytes behind `reference`
    fn fetch(&self, reference: &str) -> CommonResult<Vec<u8>>;
}

/// Loads plain paths and `file:` URLs from the local file system
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl ResourceLoader for FileLoader {
    fn fetch(&self, reference: &str) -> CommonResult<Vec<u8>> {
        let path = local_path(reference)?;
        debug!(path = %path.display(), "reading document source");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CommonError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

const USER_AGENT: &str = concat!("timeline/", env!("CARGO_PKG_VERSION"));

/// Loads `http:` and `https:` URLs
#[derive(Debug, Clone, Copy)]
pub struct HttpLoader {
    pub timeout: Duration,
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl ResourceLoader for HttpLoader {
    fn fetch(&self, reference: &str) -> CommonResult<Vec<u8>> {
        let url = Url::parse(reference)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CommonError::unsupported_scheme(url.scheme(), reference));
        }
        debug!(url = %url, "fetching document source");
        let timeout = self.timeout;
        // the blocking client panics when driven from an async worker thread
        std::thread::scope(|s| s.spawn(move || http_get(&url, timeout)).join())
            .unwrap_or_else(|_| Err(CommonError::http(reference, "request thread panicked")))
    }
}

fn http_get(url: &Url, timeout: Duration) -> CommonResult<Vec<u8>> {
    let reference = url.as_str();
    let mut builder = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT);
    if matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) {
        builder = builder.no_proxy();
    }
    let client = builder.build().map_err(|e| CommonError::http(reference, e))?;
    let response = client.get(reference).send().map_err(|e| CommonError::http(reference, e))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CommonError::NotFound(reference.to_string()));
    }
    if !status.is_success() {
        warn!(url = %reference, status = status.as_u16(), "document fetch refused");
        return Err(CommonError::http(reference, format!("HTTP status {}", status)));
    }
    let body = response.bytes().map_err(|e| CommonError::http(reference, e))?;
    Ok(body.to_vec())
}

/// Default loader of a document: web URLs go over HTTP, everything else
/// to the file system
#[derive(Clone)]
pub struct UrlLoader {
    http: Arc<dyn ResourceLoader>,
}

impl UrlLoader {
    pub fn new() -> Self {
        Self::with_http(Arc::new(HttpLoader::default()))
    }

    pub fn with_http(http: Arc<dyn ResourceLoader>) -> Self {
        Self { http }
    }
}

impl Default for UrlLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLoader for UrlLoader {
    fn fetch(&self, reference: &str) -> CommonResult<Vec<u8>> {
        if has_scheme(reference) {
            let url = Url::parse(reference)?;
            match url.scheme() {
                "http" | "https" => return self.http.fetch(reference),
                "file" => {}
                other => return Err(CommonError::unsupported_scheme(other, reference)),
            }
        }
        FileLoader.fetch(reference)
    }
}

/// In-memory loader for tests
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    pub resources: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reference: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.resources.insert(reference.into(), data.into());
    }
}

impl ResourceLoader for MemoryLoader {
    fn fetch(&self, reference: &str) -> CommonResult<Vec<u8>> {
        self.resources
            .get(reference)
            .cloned()
            .ok_or_else(|| CommonError::NotFound(reference.to_string()))
    }
}

fn has_scheme(reference: &str) -> bool {
    // a single letter before the colon is a drive letter, not a scheme
    matches!(reference.find(':'), Some(i) if i > 1 && reference[..i].chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)))
}

/// File system path behind a plain path or `file:` URL
pub fn local_path(reference: &str) -> CommonResult<PathBuf> {
    if !has_scheme(reference) {
        return Ok(PathBuf::from(reference));
    }
    let url = Url::parse(reference)?;
    if url.scheme() != "file" {
        return Err(CommonError::unsupported_scheme(url.scheme(), reference));
    }
    url.to_file_path()
        .map_err(|_| CommonError::NotFound(reference.to_string()))
}

/// Canonical URL for a document reference. Relative paths are taken from
/// the current directory.
pub fn document_url(reference: &str) -> CommonResult<Url> {
    if has_scheme(reference) {
        return Ok(Url::parse(reference)?);
    }
    let path = Path::new(reference);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| CommonError::NotFound(reference.to_string()))
}

/// Resolve `reference` against `base`. Unparseable bases leave the
/// reference as it is.
pub fn join_reference(base: Option<&str>, reference: &str) -> String {
    let Some(base) = base else {
        return reference.to_string();
    };
    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(url) => url.to_string(),
        Err(_) => reference.to_string(),
    }
}
