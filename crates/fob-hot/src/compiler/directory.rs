//! A pass-through compiler over a directory.
//!
//! Every file under the root is emitted unchanged and counts as one module
//! (identity = relative path, hash = content hash). Watch mode uses `notify`
//! with debouncing, so editing a file produces one begin/end pair.

use super::{BuildOutput, Compiler, CompilerEvent, EmittedFile, ModuleRecord};
use crate::artifact::content_hash;
use crate::error::{HotError, Result};
use async_trait::async_trait;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Security: Limit file size (10MB max)
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Options for [`DirectoryCompiler`].
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Patterns to ignore ("node_modules", "*.log")
    pub ignore: Vec<String>,
    /// Quiet period before a change triggers a rebuild
    pub debounce_ms: u64,
    /// Files larger than this are skipped
    pub max_file_size: u64,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            ignore: vec![
                "node_modules".to_string(),
                "target".to_string(),
                "*.log".to_string(),
            ],
            debounce_ms: 100,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// Compiler that serves a directory's files as build output.
pub struct DirectoryCompiler {
    root: PathBuf,
    options: DirectoryOptions,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl DirectoryCompiler {
    /// Create a compiler for `root`.
    pub fn new(root: impl Into<PathBuf>, options: DirectoryOptions) -> Self {
        Self {
            root: root.into(),
            options,
            watcher: None,
            task: None,
        }
    }

    /// Root directory being compiled.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root once and describe it as a build.
    pub fn scan(root: &Path, options: &DirectoryOptions) -> BuildOutput {
        let mut output = BuildOutput::default();

        let walker = walkdir::WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !should_ignore(entry.path(), root, &options.ignore)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    output.errors.push(e.to_string());
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(rel_path) = relative_id(entry.path(), root) else {
                continue;
            };

            match entry.metadata() {
                Ok(metadata) if metadata.len() > options.max_file_size => {
                    tracing::warn!(
                        "Skipping large file {}: {} bytes",
                        rel_path,
                        metadata.len()
                    );
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    output.errors.push(format!("{}: {}", rel_path, e));
                    continue;
                }
            }

            match std::fs::read(entry.path()) {
                Ok(content) => {
                    output
                        .modules
                        .push(ModuleRecord::new(rel_path.clone(), content_hash(&content)));
                    output.emitted.push(EmittedFile::new(rel_path, content));
                }
                Err(e) => output.errors.push(format!("{}: {}", rel_path, e)),
            }
        }

        output
    }
}

#[async_trait]
impl Compiler for DirectoryCompiler {
    async fn watch(&mut self) -> Result<mpsc::Receiver<CompilerEvent>> {
        if self.task.is_some() {
            return Err(HotError::CompilerStart(
                "compiler is already in watch mode".to_string(),
            ));
        }

        if !self.root.is_dir() {
            return Err(HotError::CompilerStart(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let root = self
            .root
            .canonicalize()
            .map_err(|e| HotError::CompilerStart(format!("{}: {}", self.root.display(), e)))?;

        let (change_tx, mut change_rx) = mpsc::channel::<PathBuf>(256);
        let ignore = self.options.ignore.clone();
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            if !(event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove()) {
                return;
            }
            for path in event.paths {
                if should_ignore(&path, &watch_root, &ignore) {
                    continue;
                }
                // A full queue already guarantees a rebuild
                let _ = change_tx.try_send(path);
            }
        })
        .map_err(|e| HotError::CompilerStart(format!("file watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| HotError::CompilerStart(format!("file watcher: {}", e)))?;

        let (tx, rx) = mpsc::channel(16);
        let options = self.options.clone();
        let debounce = Duration::from_millis(options.debounce_ms);

        let task = tokio::spawn(async move {
            if !run_build(&root, &options, &tx).await {
                return;
            }

            while let Some(path) = change_rx.recv().await {
                tracing::debug!("File changed: {}", path.display());

                // Debounce: collapse bursts of changes into one rebuild
                tokio::time::sleep(debounce).await;
                while change_rx.try_recv().is_ok() {}

                if !run_build(&root, &options, &tx).await {
                    break;
                }
            }
        });

        self.watcher = Some(watcher);
        self.task = Some(task);
        Ok(rx)
    }

    async fn close(&mut self) {
        // Dropping the watcher stops notifications
        self.watcher.take();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

/// Report one begin/end pair. Returns `false` once nobody listens.
async fn run_build(
    root: &Path,
    options: &DirectoryOptions,
    tx: &mpsc::Sender<CompilerEvent>,
) -> bool {
    if tx.send(CompilerEvent::BuildBegin).await.is_err() {
        return false;
    }

    let scan_root = root.to_path_buf();
    let scan_options = options.clone();
    let output = match tokio::task::spawn_blocking(move || {
        DirectoryCompiler::scan(&scan_root, &scan_options)
    })
    .await
    {
        Ok(output) => output,
        Err(e) => BuildOutput::failure(vec![format!("scan task failed: {}", e)]),
    };

    tx.send(CompilerEvent::BuildEnd(output)).await.is_ok()
}

/// Relative path with forward slashes, used as module id and output path.
fn relative_id(path: &Path, root: &Path) -> Option<String> {
    let rel_path = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel_path
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Check if a path should be ignored.
///
/// # Security
///
/// - Only paths within root are considered
/// - Hidden files and directories are skipped
fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let rel_path = match path.strip_prefix(root) {
        Ok(p) => p,
        Err(_) => return true,
    };

    let path_str = rel_path.to_string_lossy();

    for pattern in ignore_patterns {
        if let Some(ext) = pattern.strip_prefix('*') {
            // Extension pattern like "*.log"
            if path_str.ends_with(ext) {
                return true;
            }
        } else if rel_path
            .components()
            .any(|component| component.as_os_str() == pattern.as_str())
        {
            // Directory pattern like "node_modules"
            return true;
        }
    }

    rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}
