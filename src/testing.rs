//! in-memory model for tests: replays a fixed script of chunks.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_lite::{StreamExt, stream};

use crate::conversation::Message;
use crate::error::ModelError;
use crate::model::{ChatModel, ChunkStream};

enum Script {
    Chunks(Vec<Result<String, ModelError>>),
    /// replays the chunks, then never finishes.
    Stall(Vec<String>),
    /// silent for a while before the chunks arrive.
    Delayed(Duration, Vec<String>),
    /// the request itself fails.
    Fail(String),
    /// the request never opens a stream.
    Hang,
    Panic,
}

pub struct ScriptedModel {
    name: String,
    script: Script,
    calls: AtomicUsize,
    last_history: Mutex<Vec<Message>>,
}

impl ScriptedModel {
    fn with(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
            last_history: Mutex::new(Vec::new()),
        }
    }

    pub fn chunks(name: &str, chunks: &[&str]) -> Self {
        Self::script(name, chunks.iter().map(|c| Ok(c.to_string())).collect())
    }

    pub fn script(name: &str, items: Vec<Result<String, ModelError>>) -> Self {
        Self::with(name, Script::Chunks(items))
    }

    pub fn stalling(name: &str, chunks: &[&str]) -> Self {
        Self::with(name, Script::Stall(chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub fn delayed(name: &str, delay: Duration, chunks: &[&str]) -> Self {
        Self::with(name, Script::Delayed(delay, chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub fn hanging(name: &str) -> Self {
        Self::with(name, Script::Hang)
    }

    pub fn panicking(name: &str) -> Self {
        Self::with(name, Script::Panic)
    }

    pub fn failing(name: &str, error: &str) -> Self {
        Self::with(name, Script::Fail(error.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Vec<Message> {
        self.last_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, history: &[Message]) -> Result<ChunkStream, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_history.lock().unwrap() = history.to_vec();
        match &self.script {
            Script::Chunks(items) => Ok(Box::pin(stream::iter(items.clone()))),
            Script::Stall(items) => {
                let head = stream::iter(items.clone().into_iter().map(Ok));
                Ok(Box::pin(head.chain(stream::pending())))
            }
            Script::Delayed(delay, items) => {
                let delay = *delay;
                let silence = stream::once_future(async move {
                    tokio::time::sleep(delay).await;
                    None::<Result<String, ModelError>>
                })
                .filter_map(|item| item);
                Ok(Box::pin(silence.chain(stream::iter(items.clone().into_iter().map(Ok)))))
            }
            Script::Fail(error) => Err(ModelError::new(error.clone())),
            Script::Hang => futures_lite::future::pending().await,
            Script::Panic => panic!("model backend crashed"),
        }
    }
}
