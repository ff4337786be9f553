//! one prompt in, at most one assistant reply out.
//!
//! `submit` appends the user message, streams the model reply into a buffer
//! and commits it only once the stream ends cleanly with content. timeouts,
//! empty replies and model errors leave the history as it was right after the
//! user message.

use std::time::Duration;

use bevy::log::{debug, info, warn};
use futures_lite::StreamExt;

use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::model::{ChatModel, ChunkStream};

/// budget for a whole streamed reply, measured from the model call; covers
/// both waiting for the response to open and reading it to the end.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(30);

/// per-turn lifecycle. terminal phases hand control back to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingModel,
    Streaming,
    Committed,
    EmptyResponse,
    TimedOut,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnPhase::Committed | TurnPhase::EmptyResponse | TurnPhase::TimedOut | TurnPhase::Failed
        )
    }

    /// a turn is in flight between the model call and a terminal phase.
    pub fn is_busy(self) -> bool {
        matches!(self, TurnPhase::AwaitingModel | TurnPhase::Streaming)
    }

    fn after(result: &Result<String, TurnError>) -> Self {
        match result {
            Ok(_) => TurnPhase::Committed,
            Err(TurnError::EmptyResponse) => TurnPhase::EmptyResponse,
            Err(TurnError::TimedOut) => TurnPhase::TimedOut,
            Err(_) => TurnPhase::Failed,
        }
    }
}

/// progress callbacks for a running turn.
pub trait TurnObserver {
    fn on_phase(&mut self, _phase: TurnPhase) {}
    /// `delta` just arrived; `so_far` is everything received this turn.
    fn on_partial(&mut self, _delta: &str, _so_far: &str) {}
}

impl TurnObserver for () {}

#[derive(Clone, Copy, Debug)]
pub struct TurnController {
    pub timeout: Duration,
}

impl Default for TurnController {
    fn default() -> Self {
        Self { timeout: DEFAULT_TURN_TIMEOUT }
    }
}

impl TurnController {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// run one turn. returns the committed assistant text.
    pub async fn submit(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        model: &dyn ChatModel,
        observer: &mut impl TurnObserver,
    ) -> Result<String, TurnError> {
        if prompt.trim().is_empty() {
            warn!(target: "bevy_llm_chat", "submit: empty prompt, nothing sent");
            return Err(TurnError::EmptyPrompt);
        }

        conversation.push_user(prompt);
        info!(target: "bevy_llm_chat",
            "submit: model={} prompt_len={} history={}",
            model.name(), prompt.len(), conversation.len()
        );

        observer.on_phase(TurnPhase::AwaitingModel);
        let result = self.run(conversation, model, observer).await;
        match &result {
            Ok(text) => {
                conversation.push_assistant(text.as_str());
                info!(target: "bevy_llm_chat", "turn committed: final_len={}", text.len());
            }
            Err(err) => warn!(target: "bevy_llm_chat", "turn ended without reply: {err}"),
        }
        observer.on_phase(TurnPhase::after(&result));
        observer.on_phase(TurnPhase::Idle);
        result
    }

    async fn run(
        &self,
        conversation: &Conversation,
        model: &dyn ChatModel,
        observer: &mut impl TurnObserver,
    ) -> Result<String, TurnError> {
        let deadline = Deadline::after(self.timeout);
        let Some(opened) = before(model.stream(conversation.history()), &deadline).await else {
            warn!(target: "bevy_llm_chat", "model call exceeded {:?}, aborting", self.timeout);
            return Err(TurnError::TimedOut);
        };
        let mut chunks: ChunkStream = opened.map_err(|e| TurnError::classify(&e))?;

        observer.on_phase(TurnPhase::Streaming);
        let mut buf = String::new();
        loop {
            let Some(next) = before(chunks.next(), &deadline).await else {
                warn!(target: "bevy_llm_chat", "stream exceeded {:?}, aborting", self.timeout);
                return Err(TurnError::TimedOut);
            };
            match next {
                None => break,
                Some(Ok(delta)) if delta.is_empty() => continue,
                Some(Ok(delta)) => {
                    buf.push_str(&delta);
                    debug!(target: "bevy_llm_chat", "delta len={} total={}", delta.len(), buf.len());
                    observer.on_partial(&delta, &buf);
                }
                Some(Err(err)) => return Err(TurnError::classify(&err)),
            }
        }

        if buf.trim().is_empty() { Err(TurnError::EmptyResponse) } else { Ok(buf) }
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct Deadline(tokio::time::Instant);

#[cfg(not(target_arch = "wasm32"))]
impl Deadline {
    fn after(budget: Duration) -> Self {
        Self(tokio::time::Instant::now() + budget)
    }
}

/// `None` once the deadline has passed, otherwise the future's output.
#[cfg(not(target_arch = "wasm32"))]
async fn before<F: Future>(fut: F, deadline: &Deadline) -> Option<F::Output> {
    tokio::time::timeout_at(deadline.0, fut).await.ok()
}

// no timer on the browser event loop; the budget is checked as results land.
#[cfg(target_arch = "wasm32")]
struct Deadline(bevy::platform::time::Instant);

#[cfg(target_arch = "wasm32")]
impl Deadline {
    fn after(budget: Duration) -> Self {
        Self(bevy::platform::time::Instant::now() + budget)
    }
}

#[cfg(target_arch = "wasm32")]
async fn before<F: Future>(fut: F, deadline: &Deadline) -> Option<F::Output> {
    let out = fut.await;
    (bevy::platform::time::Instant::now() <= deadline.0).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Message, Role};
    use crate::error::ModelError;
    use crate::testing::ScriptedModel;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        phases: Vec<TurnPhase>,
        partials: Vec<String>,
    }

    impl TurnObserver for Recorder {
        fn on_phase(&mut self, phase: TurnPhase) {
            self.phases.push(phase);
        }
        fn on_partial(&mut self, _delta: &str, so_far: &str) {
            self.partials.push(so_far.to_string());
        }
    }

    async fn run(model: &ScriptedModel, prompt: &str) -> (Conversation, Result<String, TurnError>, Recorder) {
        let mut conversation = Conversation::new();
        let mut rec = Recorder::default();
        let out = TurnController::default().submit(&mut conversation, prompt, model, &mut rec).await;
        (conversation, out, rec)
    }

    #[tokio::test]
    async fn chunks_are_concatenated_and_committed_once() {
        let model = ScriptedModel::chunks("m", &["Hel", "lo"]);
        let (c, out, rec) = run(&model, "hi").await;
        assert_eq!(out, Ok("Hello".to_string()));
        assert_eq!(c.len(), 3);
        assert_eq!(c.history()[1], Message::user("hi"));
        assert_eq!(c.history()[2], Message::assistant("Hello"));
        assert_eq!(rec.partials, vec!["Hel".to_string(), "Hello".to_string()]);
        assert_eq!(
            rec.phases,
            vec![TurnPhase::AwaitingModel, TurnPhase::Streaming, TurnPhase::Committed, TurnPhase::Idle]
        );
    }

    #[tokio::test]
    async fn model_sees_full_history_including_prompt() {
        let model = ScriptedModel::chunks("m", &["ok"]);
        let _ = run(&model, "question").await;
        let seen = model.last_history();
        let roles: Vec<Role> = seen.iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(seen[1].content(), "question");
    }

    // rejected before any timer is armed, so no runtime is needed
    #[test]
    fn empty_prompt_is_a_warning_without_model_call() {
        let model = ScriptedModel::chunks("m", &["never"]);
        let (c, out, rec) = pollster::block_on(run(&model, ""));
        assert_eq!(out, Err(TurnError::EmptyPrompt));
        assert_eq!(c, Conversation::new());
        assert_eq!(model.calls(), 0);
        assert!(rec.phases.is_empty());

        let (c, out, _) = pollster::block_on(run(&model, "   \n"));
        assert_eq!(out, Err(TurnError::EmptyPrompt));
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn no_chunks_is_empty_response() {
        let model = ScriptedModel::chunks("m", &[]);
        let (c, out, rec) = run(&model, "hi").await;
        assert_eq!(out, Err(TurnError::EmptyResponse));
        assert_eq!(c.len(), 2);
        assert_eq!(rec.phases[2], TurnPhase::EmptyResponse);
    }

    #[tokio::test]
    async fn blank_chunks_are_empty_response() {
        let model = ScriptedModel::chunks("m", &["", "  ", ""]);
        let (c, out, _) = run(&model, "hi").await;
        assert_eq!(out, Err(TurnError::EmptyResponse));
        assert_eq!(c.len(), 2);
        assert_eq!(c.last(), Some(&Message::user("hi")));
    }

    #[tokio::test]
    async fn quota_error_is_rate_limited_and_not_committed() {
        let model = ScriptedModel::failing("m", "429: Quota exceeded for project");
        let (c, out, rec) = run(&model, "hi").await;
        assert!(matches!(out, Err(TurnError::RateLimited(_))));
        assert_eq!(c.len(), 2);
        assert_eq!(rec.phases, vec![TurnPhase::AwaitingModel, TurnPhase::Failed, TurnPhase::Idle]);
    }

    #[tokio::test]
    async fn mid_stream_error_discards_partial_text() {
        let model = ScriptedModel::script(
            "m",
            vec![Ok("par".into()), Err(ModelError::new("permission denied"))],
        );
        let (c, out, rec) = run(&model, "hi").await;
        assert!(matches!(out, Err(TurnError::AuthorizationFailure(_))));
        assert_eq!(c.len(), 2);
        assert_eq!(rec.partials, vec!["par".to_string()]);
    }

    #[tokio::test]
    async fn stalled_stream_times_out_without_commit() {
        let model = ScriptedModel::stalling("m", &["partial"]);
        let mut c = Conversation::new();
        let mut rec = Recorder::default();
        let out = TurnController::new(Duration::from_millis(50))
            .submit(&mut c, "hi", &model, &mut rec)
            .await;
        assert_eq!(out, Err(TurnError::TimedOut));
        assert_eq!(c.len(), 2);
        assert_eq!(c.last(), Some(&Message::user("hi")));
        assert!(rec.phases.contains(&TurnPhase::TimedOut));
    }

    #[tokio::test]
    async fn model_call_that_never_opens_times_out() {
        let model = ScriptedModel::hanging("m");
        let mut c = Conversation::new();
        let mut rec = Recorder::default();
        let out = tokio::time::timeout(
            Duration::from_secs(2),
            TurnController::new(Duration::from_millis(50)).submit(&mut c, "hi", &model, &mut rec),
        )
        .await
        .expect("submit returns once the budget expires");
        assert_eq!(out, Err(TurnError::TimedOut));
        assert_eq!(c.len(), 2);
        assert_eq!(rec.phases, vec![TurnPhase::AwaitingModel, TurnPhase::TimedOut, TurnPhase::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn default_budget_is_thirty_seconds_from_the_model_call() {
        let model = ScriptedModel::hanging("m");
        let mut c = Conversation::new();
        let started = tokio::time::Instant::now();
        let out = TurnController::default().submit(&mut c, "hi", &model, &mut ()).await;
        assert_eq!(out, Err(TurnError::TimedOut));
        let waited = started.elapsed();
        assert!(waited >= DEFAULT_TURN_TIMEOUT && waited < Duration::from_secs(31), "{waited:?}");
        assert_eq!(c.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_29s_stall_still_commits() {
        let model = ScriptedModel::delayed("m", Duration::from_secs(29), &["late ", "reply"]);
        let (c, out, _) = run(&model, "hi").await;
        assert_eq!(out, Ok("late reply".to_string()));
        assert_eq!(c.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_past_30s_times_out() {
        let model = ScriptedModel::delayed("m", Duration::from_secs(31), &["too late"]);
        let (c, out, rec) = run(&model, "hi").await;
        assert_eq!(out, Err(TurnError::TimedOut));
        assert_eq!(c.len(), 2);
        assert!(rec.partials.is_empty());
    }

    #[test]
    fn phases() {
        assert!(TurnPhase::Streaming.is_busy());
        assert!(!TurnPhase::Idle.is_busy());
        assert!(TurnPhase::TimedOut.is_terminal());
        assert!(!TurnPhase::AwaitingModel.is_terminal());
    }
}
