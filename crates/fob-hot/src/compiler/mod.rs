//! The compiler seam.
//!
//! A compiler in watch mode is reduced to two event kinds: a build began, and
//! a build ended with either errors or emitted files. The coordinator drives
//! its state machine from these alone, so any bundler that can report them
//! plugs in.

pub mod directory;

pub use directory::{DirectoryCompiler, DirectoryOptions};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// One module in the compiler's graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRecord {
    /// Stable module identity (e.g. "./src/app.ts")
    pub id: String,
    /// Hash of the module's compiled form
    pub hash: String,
}

impl ModuleRecord {
    /// Create a module record.
    pub fn new(id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hash: hash.into(),
        }
    }
}

/// A file the compiler emitted, keyed by output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    /// Output path relative to the public root (e.g. "main.js" or "/main.js")
    pub path: String,
    /// File content
    pub content: Bytes,
}

impl EmittedFile {
    /// Create an emitted file.
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything a "build end" signal carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Raw error messages; non-empty means the build failed
    pub errors: Vec<String>,
    /// Module graph snapshot
    pub modules: Vec<ModuleRecord>,
    /// Emitted files
    pub emitted: Vec<EmittedFile>,
}

impl BuildOutput {
    /// A successful build.
    pub fn success(modules: Vec<ModuleRecord>, emitted: Vec<EmittedFile>) -> Self {
        Self {
            errors: Vec::new(),
            modules,
            emitted,
        }
    }

    /// A failed build.
    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Check if the build reported errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Events reported by a compiler in watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerEvent {
    /// A rebuild started
    BuildBegin,
    /// A rebuild finished
    BuildEnd(BuildOutput),
}

/// A bundler that can run in watch mode.
#[async_trait]
pub trait Compiler: Send + 'static {
    /// Put the compiler into watch mode.
    ///
    /// # Errors
    ///
    /// Returns `HotError::CompilerStart` if watch mode cannot start.
    async fn watch(&mut self) -> Result<mpsc::Receiver<CompilerEvent>>;

    /// Leave watch mode and release resources. Must tolerate repeated calls.
    async fn close(&mut self);
}
