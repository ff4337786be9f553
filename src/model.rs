//! the model client seam: a boxed stream of text chunks per request.
//!
//! `LlmChatModel` drives any `llm` provider. the `llm` crate keeps the system
//! instruction on the provider (builder `.system(..)`), so system messages in
//! the history are not sent as chat messages.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bevy::log::{debug, info, warn};
use futures_lite::{Stream, StreamExt, stream};

use crate::conversation::{Message, Role, SYSTEM_PROMPT};
use crate::error::ModelError;

pub use llm::{
    LLMProvider,
    builder::{LLMBackend, LLMBuilder},
    chat::{ChatMessage, StreamChoice, StreamDelta, StreamResponse},
};

/// lazy, finite, non-restartable sequence of text fragments.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// start a streamed completion over the full `history`.
    async fn stream(&self, history: &[Message]) -> Result<ChunkStream, ModelError>;
}

/// `ChatModel` over an `llm` provider.
#[derive(Clone)]
pub struct LlmChatModel {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl LlmChatModel {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self { name: name.into(), provider }
    }
}

fn to_llm_messages(history: &[Message]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|m| match m.role() {
            Role::System => None,
            Role::User => Some(ChatMessage::user().content(m.content()).build()),
            Role::Assistant => Some(ChatMessage::assistant().content(m.content()).build()),
        })
        .collect()
}

#[async_trait]
impl ChatModel for LlmChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, history: &[Message]) -> Result<ChunkStream, ModelError> {
        let messages = to_llm_messages(history);
        debug!(target: "bevy_llm_chat", "stream: model={} msgs={}", self.name, messages.len());

        match self.provider.chat_stream_struct(&messages).await {
            Ok(s) => {
                let chunks = s.map(|item| match item {
                    Ok(StreamResponse { choices, .. }) => Ok(choices
                        .into_iter()
                        .filter_map(|StreamChoice { delta: StreamDelta { content, .. } }| content)
                        .collect::<String>()),
                    Err(err) => Err(ModelError::from(err)),
                });
                Ok(Box::pin(chunks))
            }
            Err(err) => {
                warn!(target: "bevy_llm_chat",
                    "structured streaming failed for model {}: {err}. falling back to one-shot chat()",
                    self.name
                );
                let resp = self.provider.chat(&messages).await?;
                let text = resp.text().unwrap_or_default();
                info!(target: "bevy_llm_chat", "chat (fallback) completed: final_len={}", text.len());
                Ok(Box::pin(stream::once(Ok(text))))
            }
        }
    }
}

/// google gemini provider for `model`, authenticated with `api_key`.
pub fn build_gemini_model(model: &str, api_key: &str) -> Result<Arc<dyn ChatModel>, ModelError> {
    info!(target: "bevy_llm_chat", "build_gemini_model: model='{}', key_present={}", model, !api_key.is_empty());
    let provider: Arc<dyn LLMProvider> = LLMBuilder::new()
        .backend(LLMBackend::Google)
        .model(model)
        .api_key(api_key)
        .system(SYSTEM_PROMPT)
        .build()?
        .into();
    Ok(Arc::new(LlmChatModel::new(model, provider)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_not_forwarded() {
        let history = [Message::system(SYSTEM_PROMPT), Message::user("hi"), Message::assistant("yo")];
        let out = to_llm_messages(&history);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "hi");
        assert_eq!(out[1].content, "yo");
    }
}
