//! Fetching and evaluating external references.
//!
//! All I/O goes through two small traits so engines can run against an
//! in-memory tree in tests and a sandboxed filesystem in tools:
//!
//! - [`VirtualFs`] for file reads (and Localize's writes)
//! - [`HttpClient`] for `http(s)://` references
//!
//! [`Resolver`] sits on top and fetches each distinct document at most once
//! per engine run.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::{Mutex, PoisonError};

use oaskit_core::pointer::Location;
use oaskit_core::reference::{looks_like_url, normalize_location, normalize_path, split_fragment};
use oaskit_core::CancelToken;
use percent_encoding::percent_decode_str;
use serde_yaml_ng::Value;
use tracing::debug;

use crate::error::ResolveError;

/// Filesystem access used by the engines.
///
/// Paths are plain strings in root-document coordinates (see
/// [`oaskit_core::reference`]).
pub trait VirtualFs {
    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Any I/O failure, including a missing file.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or replace a file.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    /// Create a directory and its parents.
    ///
    /// # Errors
    ///
    /// Any I/O failure.
    fn create_dir_all(&self, path: &str) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl VirtualFs for OsFs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

/// An in-memory filesystem keyed by normalized path.
///
/// Directories are implicit; [`create_dir_all`](VirtualFs::create_dir_all)
/// always succeeds.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFs {
    /// An empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder style).
    #[must_use]
    pub fn with_file(self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add or replace a file.
    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        self.lock().insert(Self::key(path), contents.into());
    }

    /// Contents of a file, if present.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().get(&Self::key(path)).cloned()
    }

    /// Contents of a file as UTF-8 text, if present.
    #[must_use]
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// All stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn key(path: &str) -> String {
        normalize_path(path, oaskit_core::reference::PathStyle::Posix)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VirtualFs for MemoryFs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
        })
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn create_dir_all(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Fetches remote documents.
pub trait HttpClient {
    /// GET `url` and return the response body.
    ///
    /// # Errors
    ///
    /// [`ResolveError::Http`] on transport failure or a non-success status.
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Refuses every request; the default when remote references are not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHttp;

impl HttpClient for NoHttp {
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        Err(ResolveError::Http {
            url: url.to_string(),
            message: "remote references are disabled".to_string(),
        })
    }
}

/// Blocking `reqwest` client.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl ReqwestClient {
    /// Wrap a configured client (timeouts, proxies, headers).
    #[must_use]
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let http_err = |e: reqwest::Error| ResolveError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(http_err)?;
        Ok(response.bytes().map_err(http_err)?.to_vec())
    }
}

/// Where the root document lives and how to reach the documents it references.
#[derive(Clone, Copy)]
pub struct ResolveOptions<'a> {
    target_location: &'a str,
    fs: &'a dyn VirtualFs,
    http: &'a dyn HttpClient,
    cancel: Option<&'a CancelToken>,
}

impl std::fmt::Debug for ResolveOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("target_location", &self.target_location)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Default for ResolveOptions<'_> {
    fn default() -> Self {
        Self::new("")
    }
}

impl<'a> ResolveOptions<'a> {
    /// Resolve relative to the root document at `target_location`, on the
    /// real filesystem, with remote references disabled.
    ///
    /// An empty location means "the current directory".
    #[must_use]
    pub fn new(target_location: &'a str) -> Self {
        Self {
            target_location,
            fs: &OsFs,
            http: &NoHttp,
            cancel: None,
        }
    }

    /// Use a different filesystem.
    #[must_use]
    pub fn fs(mut self, fs: &'a dyn VirtualFs) -> Self {
        self.fs = fs;
        self
    }

    /// Use an HTTP client for URL references.
    #[must_use]
    pub fn http(mut self, http: &'a dyn HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Cancel traversal and I/O once `token` fires.
    #[must_use]
    pub fn cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Root document location, normalized, without a fragment.
    #[must_use]
    pub fn root_location(&self) -> String {
        let (uri, _) = split_fragment(self.target_location);
        if uri.is_empty() {
            String::new()
        } else {
            normalize_location(uri)
        }
    }

    /// The filesystem engines read from and write to.
    #[must_use]
    pub fn filesystem(&self) -> &'a dyn VirtualFs {
        self.fs
    }

    /// The cancellation token, if any.
    #[must_use]
    pub fn cancel_token(&self) -> Option<&'a CancelToken> {
        self.cancel
    }

    fn check_cancelled(&self) -> Result<(), ResolveError> {
        if let Some(token) = self.cancel {
            token.check()?;
        }
        Ok(())
    }
}

/// A resolved reference target.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Copy of the target node.
    pub value: Value,
    /// Normalized location of the document it came from (no fragment).
    pub document: String,
}

/// Per-run document cache on top of [`ResolveOptions`].
#[derive(Debug)]
pub struct Resolver<'a> {
    options: ResolveOptions<'a>,
    raw: HashMap<String, Vec<u8>>,
    parsed: HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    /// A resolver with an empty cache.
    #[must_use]
    pub fn new(options: ResolveOptions<'a>) -> Self {
        Self {
            options,
            raw: HashMap::new(),
            parsed: HashMap::new(),
        }
    }

    /// The options this resolver was built from.
    #[must_use]
    pub fn options(&self) -> &ResolveOptions<'a> {
        &self.options
    }

    /// Number of distinct documents fetched so far.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.raw.len()
    }

    /// Raw bytes of the document at `location` (root coordinates).
    ///
    /// # Errors
    ///
    /// [`ResolveError::Io`], [`ResolveError::Http`], or cancellation.
    pub fn raw(&mut self, location: &str) -> Result<&[u8], ResolveError> {
        let key = normalize_location(split_fragment(location).0);
        if !self.raw.contains_key(&key) {
            let bytes = fetch(&self.options, &key)?;
            debug!(target: "oaskit::resolve", location = %key, bytes = bytes.len(), "fetched");
            self.raw.insert(key.clone(), bytes);
        }
        Ok(self.raw[&key].as_slice())
    }

    /// Parsed document at `location` (root coordinates).
    ///
    /// # Errors
    ///
    /// Fetch failures as in [`raw`](Self::raw), or [`ResolveError::Parse`].
    pub fn document(&mut self, location: &str) -> Result<&Value, ResolveError> {
        let key = normalize_location(split_fragment(location).0);
        if !self.parsed.contains_key(&key) {
            let value = parse(&key, self.raw(&key)?)?;
            self.parsed.insert(key.clone(), value);
        }
        Ok(&self.parsed[&key])
    }

    /// Fetch the document named by `reference` (root coordinates) and
    /// evaluate its fragment.
    ///
    /// # Errors
    ///
    /// Fetch and parse failures, or [`ResolveError::FragmentNotFound`].
    pub fn resolve(&mut self, reference: &str) -> Result<Resolved, ResolveError> {
        let (uri, fragment) = split_fragment(reference);
        if uri.is_empty() {
            return Err(ResolveError::InvalidUrl(format!(
                "'{reference}' has no document part"
            )));
        }
        let document = normalize_location(uri);
        let root = self.document(&document)?;

        let value = match fragment.filter(|f| !f.is_empty()) {
            None => root.clone(),
            Some(fragment) => {
                Location::from_fragment(fragment)
                    .get(root)
                    .cloned()
                    .ok_or_else(|| ResolveError::FragmentNotFound {
                        location: document.clone(),
                        fragment: fragment.to_string(),
                    })?
            }
        };

        Ok(Resolved { value, document })
    }
}

fn fetch(options: &ResolveOptions<'_>, location: &str) -> Result<Vec<u8>, ResolveError> {
    options.check_cancelled()?;

    if !looks_like_url(location) {
        return read_file(options, location);
    }

    let url = url::Url::parse(location)
        .map_err(|e| ResolveError::InvalidUrl(format!("{location}: {e}")))?;
    match url.scheme() {
        "file" => {
            let path = percent_decode_str(url.path()).decode_utf8_lossy();
            read_file(options, &path)
        }
        "http" | "https" => options.http.get(location),
        other => Err(ResolveError::InvalidUrl(format!(
            "unsupported scheme '{other}' in {location}"
        ))),
    }
}

fn read_file(options: &ResolveOptions<'_>, path: &str) -> Result<Vec<u8>, ResolveError> {
    options.fs.read(path).map_err(|source| ResolveError::Io {
        path: path.to_string(),
        source,
    })
}

fn parse(location: &str, bytes: &[u8]) -> Result<Value, ResolveError> {
    serde_yaml_ng::from_slice(bytes).map_err(|source| ResolveError::Parse {
        location: location.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn fs() -> MemoryFs {
        MemoryFs::new()
            .with_file(
                "specs/schemas/pet.yaml",
                indoc! {r"
                    Pet:
                      type: object
                      properties:
                        a~b:
                          type: string
                "},
            )
            .with_file("specs/data.json", r#"{"Tag": {"type": "string"}}"#)
    }

    #[test]
    fn resolves_fragment_and_whole_document() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));

        let pet = resolver.resolve("specs/schemas/pet.yaml#/Pet").unwrap();
        assert_eq!(pet.document, "specs/schemas/pet.yaml");
        assert_eq!(pet.value["type"].as_str(), Some("object"));

        let whole = resolver.resolve("specs/data.json").unwrap();
        assert_eq!(whole.value["Tag"]["type"].as_str(), Some("string"));
    }

    #[test]
    fn decodes_escaped_and_percent_encoded_pointers() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));
        let prop = resolver
            .resolve("specs/schemas/pet.yaml#/Pet/properties/a~0b")
            .unwrap();
        assert_eq!(prop.value["type"].as_str(), Some("string"));

        let encoded = resolver
            .resolve("specs/schemas/pet.yaml#/Pet/properties/a%7E0b")
            .unwrap();
        assert_eq!(encoded.value, prop.value);
    }

    #[test]
    fn caches_each_document_once() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));
        resolver.resolve("specs/schemas/pet.yaml#/Pet").unwrap();
        resolver
            .resolve("specs/schemas/../schemas/pet.yaml#/Pet/type")
            .unwrap();
        assert_eq!(resolver.fetched(), 1);
    }

    #[test]
    fn missing_fragment_is_reported() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));
        let err = resolver
            .resolve("specs/schemas/pet.yaml#/Dog")
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::FragmentNotFound { ref fragment, .. } if fragment == "/Dog"
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));
        let err = resolver.resolve("specs/nope.yaml").unwrap_err();
        assert!(matches!(err, ResolveError::Io { ref path, .. } if path == "specs/nope.yaml"));
    }

    #[test]
    fn remote_refs_disabled_by_default() {
        let fs = fs();
        let mut resolver = Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs));
        let err = resolver
            .resolve("https://example.com/pet.yaml#/Pet")
            .unwrap_err();
        assert!(matches!(err, ResolveError::Http { .. }));
    }

    #[test]
    fn file_urls_read_through_filesystem() {
        let fs = MemoryFs::new().with_file("/abs/pet.yaml", "Pet: {type: string}\n");
        let mut resolver = Resolver::new(ResolveOptions::new("/abs/root.yaml").fs(&fs));
        let pet = resolver.resolve("file:///abs/pet.yaml#/Pet").unwrap();
        assert_eq!(pet.value["type"].as_str(), Some("string"));
    }

    #[test]
    fn cancelled_before_io() {
        let fs = fs();
        let token = CancelToken::new();
        token.cancel();
        let mut resolver =
            Resolver::new(ResolveOptions::new("specs/root.yaml").fs(&fs).cancel(&token));
        let err = resolver.resolve("specs/data.json").unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled(_)));
    }

    #[test]
    fn root_location_strips_fragment_and_normalizes() {
        assert_eq!(
            ResolveOptions::new("./specs/../specs/root.yaml#/x").root_location(),
            "specs/root.yaml"
        );
        assert_eq!(ResolveOptions::new("").root_location(), "");
    }

    #[test]
    fn os_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let nested = nested.to_string_lossy();
        OsFs.create_dir_all(&nested).unwrap();
        let file = format!("{nested}/x.yaml");
        OsFs.write(&file, b"x: 1\n").unwrap();
        assert_eq!(OsFs.read(&file).unwrap(), b"x: 1\n");
    }
}
