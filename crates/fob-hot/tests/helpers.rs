//! Shared test utilities for fob-hot integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use fob_hot::{BuildOutput, BuildState, Compiler, CompilerEvent, EmittedFile, HotError, ModuleRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Compiler driven by the test through a [`Script`].
pub struct ScriptedCompiler {
    events: Option<mpsc::Receiver<CompilerEvent>>,
    fail_start: bool,
    closes: Arc<AtomicUsize>,
}

/// Test side of a [`ScriptedCompiler`].
pub struct Script {
    tx: mpsc::Sender<CompilerEvent>,
    closes: Arc<AtomicUsize>,
}

/// A compiler plus the script that feeds it events.
pub fn scripted() -> (ScriptedCompiler, Script) {
    let (tx, rx) = mpsc::channel(16);
    let closes = Arc::new(AtomicUsize::new(0));
    (
        ScriptedCompiler {
            events: Some(rx),
            fail_start: false,
            closes: Arc::clone(&closes),
        },
        Script { tx, closes },
    )
}

/// A compiler whose watch mode never starts.
pub fn broken() -> (ScriptedCompiler, Script) {
    let (mut compiler, script) = scripted();
    compiler.fail_start = true;
    (compiler, script)
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn watch(&mut self) -> fob_hot::Result<mpsc::Receiver<CompilerEvent>> {
        if self.fail_start {
            return Err(HotError::CompilerStart("entry ./src/index.ts not found".to_string()));
        }
        self.events
            .take()
            .ok_or_else(|| HotError::CompilerStart("already watching".to_string()))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Script {
    pub async fn begin(&self) {
        self.tx.send(CompilerEvent::BuildBegin).await.unwrap();
    }

    pub async fn end(&self, output: BuildOutput) {
        self.tx.send(CompilerEvent::BuildEnd(output)).await.unwrap();
    }

    pub async fn succeed(&self, files: &[(&str, &str)]) {
        self.end(success(files)).await;
    }

    pub async fn fail(&self, message: &str) {
        self.end(BuildOutput::failure(vec![message.to_string()])).await;
    }

    /// How many times the compiler was closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Build output emitting `files`, one module per file.
pub fn success(files: &[(&str, &str)]) -> BuildOutput {
    BuildOutput::success(
        files
            .iter()
            .map(|(path, body)| ModuleRecord::new(*path, fob_hot::artifact::content_hash(body.as_bytes())))
            .collect(),
        files
            .iter()
            .map(|(path, body)| EmittedFile::new(*path, body.to_string()))
            .collect(),
    )
}

/// Poll `condition` until it holds; panics after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

/// Wait until build state reaches `state` at `generation`.
pub async fn wait_for(hot: &fob_hot::HotBridge, state: BuildState, generation: u64) {
    wait_until(|| {
        let status = hot.state().status();
        status.state == state && status.generation == generation
    })
    .await;
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
