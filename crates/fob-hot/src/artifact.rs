//! Compiled output files and the generation sets that group them.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One compiled output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Normalized serving path (e.g. "/main.js")
    pub path: String,
    /// File content
    pub content: Bytes,
    /// blake3 hex digest of `content`
    pub hash: String,
    /// MIME type hint
    pub content_type: &'static str,
}

impl Artifact {
    /// Create an artifact, deriving its hash and content type.
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            hash: content_hash(&content),
            content_type: content_type_for(&path),
            path,
            content,
        }
    }

    /// Whether this artifact is an HTML document.
    pub fn is_html(&self) -> bool {
        self.content_type.starts_with("text/html")
    }
}

/// The complete output of one successful build.
///
/// Sets are immutable once built; the store swaps whole sets.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    generation: u64,
    files: HashMap<String, Arc<Artifact>>,
}

impl ArtifactSet {
    /// The empty set visible before the first successful build.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect artifacts into a set stamped with `generation`.
    ///
    /// A later artifact with the same path replaces an earlier one.
    pub fn new(generation: u64, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        let files = artifacts
            .into_iter()
            .map(|artifact| (artifact.path.clone(), Arc::new(artifact)))
            .collect();
        Self { generation, files }
    }

    /// Build generation these artifacts belong to (0 for the empty set).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up an artifact by store key.
    pub fn get(&self, key: &str) -> Option<Arc<Artifact>> {
        self.files.get(key).cloned()
    }

    /// Check whether a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    /// Get number of artifacts.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Content hash of every artifact, ordered by path.
    pub fn hashes(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, artifact)| (path.clone(), artifact.hash.clone()))
            .collect()
    }
}

/// Compute the content hash used for change detection and `ETag`s.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Determine content type from file extension.
pub fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".d.ts") {
        return "text/plain; charset=utf-8";
    }

    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "wasm" => "application/wasm",
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}
