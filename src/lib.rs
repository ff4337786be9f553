//! bevy_llm_chat: a bevy chat front-end for hosted llms (gemini by default).
//!
//! - a `Session` component holds the conversation, model pick and api key.
//! - `send_user_text` queues a prompt; one turn runs per session at a time.
//! - replies stream in as events and accumulate in `Session::partial`; the
//!   finished conversation is written back to the session when the turn ends.
//! - never blocks the main thread: on native turns run on a small tokio
//!   runtime; on wasm we use bevy's async pool, which yields to the browser.
//!
//! the model client is the `llm` crate (`LlmChatModel`); anything that
//! implements `ChatModel` can be plugged in through `ModelCache::new`.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::Arc;

pub mod cache;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod export;
pub mod model;
pub mod session;
pub mod turn;

#[cfg(test)]
mod testing;

pub use cache::ModelCache;
pub use catalog::{ModelCategory, ModelSelection, ModelStatus, default_model};
pub use config::ChatConfig;
pub use conversation::{Conversation, Message, Role, SYSTEM_PROMPT, transcript_file_name};
pub use credential::{Credential, CredentialCheck, check_credential};
pub use error::{ExportError, ModelError, TurnError};
pub use export::export_transcript;
pub use model::{ChatModel, ChunkStream, LlmChatModel, build_gemini_model};
pub use session::Session;
pub use turn::{DEFAULT_TURN_TIMEOUT, TurnController, TurnObserver, TurnPhase};

/// on native we keep a tiny tokio runtime to drive `llm` futures and the
/// turn timer. we spawn onto this rt from compute tasks so neither the main
/// thread nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_llm_chat", "BevyLlmChat: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum LlmChatSet {
    /// bevy_llm_chat writes sessions back and emits Turn* events here (in `Update`)
    Drain,
}

/// insert this component to submit a prompt for the session entity.
#[derive(Component, Clone, Debug)]
pub struct PendingPrompt(pub String);

/// helper to enqueue a user prompt on a session entity.
pub fn send_user_text(commands: &mut Commands, target: Entity, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_llm_chat", "send_user_text -> len={}", text.len());
    commands.entity(target).insert(PendingPrompt(text));
}

/// session-level commands from the ui.
#[derive(Event, Debug, Clone, Copy)]
pub enum SessionCommand {
    /// reset the conversation to the system instruction.
    ClearChat(Entity),
    /// drop every memoized model handle.
    ClearCache,
    /// write or download the transcript.
    ExportTranscript(Entity),
}

/// events emitted during/after a turn.
#[derive(Event, Debug)]
pub struct TurnStarted {
    pub entity: Entity,
}
#[derive(Event, Debug)]
pub struct TurnDeltaEvt {
    pub entity: Entity,
    pub text: String,
}
#[derive(Event, Debug)]
pub struct TurnCompletedEvt {
    pub entity: Entity,
    /// the committed assistant text.
    pub reply: String,
}
#[derive(Event, Debug)]
pub struct TurnFailedEvt {
    pub entity: Entity,
    pub error: TurnError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// user-facing status line (cache cleared, transcript written, ...).
#[derive(Event, Debug, Clone)]
pub struct ChatNoticeEvt {
    pub entity: Option<Entity>,
    pub level: NoticeLevel,
    pub text: String,
}

/// cross-thread inbox for streaming; producers send, main thread drains.
/// bounded to avoid unbounded growth when the frame stalls briefly.
#[derive(Resource, Clone)]
struct StreamInbox {
    tx: Sender<StreamMsg>,
    rx: Receiver<StreamMsg>,
}

impl Default for StreamInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(2048);
        Self { tx, rx }
    }
}

#[derive(Debug)]
enum StreamMsg {
    Phase { entity: Entity, generation: u64, phase: TurnPhase },
    Delta { entity: Entity, generation: u64, text: String },
    Done {
        entity: Entity,
        generation: u64,
        conversation: Conversation,
        result: Result<String, TurnError>,
    },
}

/// send to inbox (ignore full/disconnected)
fn push_inbox(tx: &Sender<StreamMsg>, msg: StreamMsg) {
    let _ = tx.send(msg);
}

// coalesce tiny deltas to ~60hz or >=64 chars
#[cfg(not(target_arch = "wasm32"))]
const MIN_CHARS: usize = 64;
#[cfg(not(target_arch = "wasm32"))]
const MAX_LATENCY: std::time::Duration = std::time::Duration::from_millis(16);

/// forwards turn progress into the inbox.
struct InboxObserver {
    entity: Entity,
    generation: u64,
    tx: Sender<StreamMsg>,
    buf: String,
    #[cfg(not(target_arch = "wasm32"))]
    last_flush: std::time::Instant,
}

impl InboxObserver {
    fn new(entity: Entity, generation: u64, tx: Sender<StreamMsg>) -> Self {
        Self {
            entity,
            generation,
            tx,
            buf: String::new(),
            #[cfg(not(target_arch = "wasm32"))]
            last_flush: std::time::Instant::now(),
        }
    }

    fn due(&self) -> bool {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.buf.len() >= MIN_CHARS || self.last_flush.elapsed() >= MAX_LATENCY
        }
        #[cfg(target_arch = "wasm32")]
        {
            !self.buf.is_empty()
        }
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            let text = std::mem::take(&mut self.buf);
            push_inbox(&self.tx, StreamMsg::Delta { entity: self.entity, generation: self.generation, text });
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.last_flush = std::time::Instant::now();
        }
    }
}

impl TurnObserver for InboxObserver {
    fn on_phase(&mut self, phase: TurnPhase) {
        if phase.is_terminal() {
            self.flush();
        }
        push_inbox(&self.tx, StreamMsg::Phase { entity: self.entity, generation: self.generation, phase });
    }

    fn on_partial(&mut self, delta: &str, _so_far: &str) {
        self.buf.push_str(delta);
        if self.due() {
            self.flush();
        }
    }
}

/// bevy plugin: wires systems, events, resources.
/// inserts a gemini-backed `ModelCache` and an env-seeded `ChatConfig`
/// unless the app already has them. on native, also inserts a tiny tokio
/// runtime resource by default.
pub struct BevyLlmChatPlugin;

impl Plugin for BevyLlmChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_llm_chat", "BevyLlmChatPlugin: build()");
        app.init_resource::<StreamInbox>()
            .init_resource::<ModelCache>()
            .add_event::<SessionCommand>()
            .add_event::<TurnStarted>()
            .add_event::<TurnDeltaEvt>()
            .add_event::<TurnCompletedEvt>()
            .add_event::<TurnFailedEvt>()
            .add_event::<ChatNoticeEvt>()
            // write + read events in the same schedule (Update)
            .configure_sets(Update, LlmChatSet::Drain)
            .add_systems(Update, drain_stream_inbox.in_set(LlmChatSet::Drain))
            // commands first so a clear lands before a prompt queued the same frame
            .add_systems(Update, (apply_session_commands, spawn_turns).chain());

        if app.world().get_resource::<ChatConfig>().is_none() {
            app.insert_resource(ChatConfig::from_env());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

fn reject(
    entity: Entity,
    session: &mut Session,
    error: TurnError,
    ev_failed: &mut EventWriter<TurnFailedEvt>,
) {
    warn!(target: "bevy_llm_chat", "turn rejected: entity={:?} {}", entity, error);
    session.notice = Some(error.notice());
    ev_failed.write(TurnFailedEvt { entity, error });
}

/// spawns async tasks for sessions with a pending prompt.
fn spawn_turns(
    mut commands: Commands,
    mut cache: ResMut<ModelCache>,
    config: Res<ChatConfig>,
    inbox: Res<StreamInbox>,
    mut q: Query<(Entity, &mut Session, &PendingPrompt)>,
    mut ev_start: EventWriter<TurnStarted>,
    mut ev_failed: EventWriter<TurnFailedEvt>,

    // native-only: small runtime to drive network futures from `llm`
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for (e, mut session, PendingPrompt(prompt)) in q.iter_mut() {
        // one-shot marker removal
        commands.entity(e).remove::<PendingPrompt>();

        // validation failures never reach the model or the history
        if prompt.trim().is_empty() {
            reject(e, &mut session, TurnError::EmptyPrompt, &mut ev_failed);
            continue;
        }
        if session.is_busy() {
            reject(e, &mut session, TurnError::Busy, &mut ev_failed);
            continue;
        }
        let Some(credential) = session.credential().cloned() else {
            reject(e, &mut session, TurnError::MissingCredential, &mut ev_failed);
            continue;
        };
        let model = match cache.get_or_build(session.model.name(), &credential) {
            Ok(m) => m,
            Err(err) => {
                let error = TurnError::classify(&err);
                reject(e, &mut session, error, &mut ev_failed);
                continue;
            }
        };

        info!(target: "bevy_llm_chat",
            "spawn_turns: entity={:?} model={} history={}",
            e, model.name(), session.conversation.len()
        );

        session.phase = TurnPhase::AwaitingModel;
        session.pending_prompt = Some(prompt.clone());
        session.partial.clear();
        session.notice = None;
        ev_start.write(TurnStarted { entity: e });

        let inbox_tx = inbox.tx.clone();
        let generation = session.generation;
        let mut conversation = session.conversation.clone();
        #[cfg(not(target_arch = "wasm32"))]
        let (fallback, crash_tx) = (session.conversation.clone(), inbox.tx.clone());
        let prompt = prompt.clone();
        let controller = TurnController::new(config.turn_timeout);

        let pool = AsyncComputeTaskPool::get();
        #[cfg(not(target_arch = "wasm32"))]
        let rt = rt.0.clone();

        pool.spawn(async move {
            let run = async move {
                let mut observer = InboxObserver::new(e, generation, inbox_tx.clone());
                let result = controller
                    .submit(&mut conversation, &prompt, model.as_ref(), &mut observer)
                    .await;
                push_inbox(&inbox_tx, StreamMsg::Done { entity: e, generation, conversation, result });
            };

            #[cfg(target_arch = "wasm32")]
            {
                // wasm path: just await directly (no tokio).
                run.await;
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                // native: hand off to tokio so bevy pools stay free.
                if let Err(err) = rt.spawn(run).await {
                    // the session must not stay busy when the task dies
                    error!(target: "bevy_llm_chat", "turn task failed: entity={:?} {}", e, err);
                    push_inbox(&crash_tx, StreamMsg::Done {
                        entity: e,
                        generation,
                        conversation: fallback,
                        result: Err(TurnError::Generic(format!("turn task failed: {err}"))),
                    });
                }
            }
        })
        .detach();
    }
}

/// drains the inbox, writes results back to sessions and emits user-facing events.
fn drain_stream_inbox(
    inbox: Res<StreamInbox>,
    mut sessions: Query<&mut Session>,
    mut ev_delta: EventWriter<TurnDeltaEvt>,
    mut ev_done: EventWriter<TurnCompletedEvt>,
    mut ev_failed: EventWriter<TurnFailedEvt>,
) {
    // drain up to a cap per frame to avoid long frames on bursty streams
    const MAX_PER_FRAME: usize = 512;
    let mut drained = Vec::with_capacity(64);
    for _ in 0..MAX_PER_FRAME {
        match inbox.rx.try_recv() {
            Ok(m) => drained.push(m),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    if drained.is_empty() {
        return;
    }

    // aggregate deltas per entity so ui applies a single push per entity per frame
    let mut delta_map: HashMap<Entity, String> = HashMap::new();
    let mut phases: Vec<(Entity, u64, TurnPhase)> = Vec::new();
    let mut dones = Vec::new();

    for ev in drained {
        match ev {
            StreamMsg::Phase { entity, generation, phase } => phases.push((entity, generation, phase)),
            StreamMsg::Delta { entity, generation, text } => {
                let current = sessions.get(entity).is_ok_and(|s| s.generation == generation);
                if current {
                    delta_map.entry(entity).or_default().push_str(&text);
                }
            }
            StreamMsg::Done { entity, generation, conversation, result } => {
                dones.push((entity, generation, conversation, result))
            }
        }
    }

    for (entity, generation, phase) in phases {
        if let Ok(mut s) = sessions.get_mut(entity) {
            // the session stays busy until Done hands the conversation back
            if s.generation == generation && phase.is_busy() {
                s.phase = phase;
            }
        }
    }
    for (entity, text) in delta_map {
        if let Ok(mut s) = sessions.get_mut(entity) {
            s.partial.push_str(&text);
        }
        ev_delta.write(TurnDeltaEvt { entity, text });
    }
    // ensure deltas land before "done" for the same frame
    for (entity, generation, conversation, result) in dones {
        let Ok(mut s) = sessions.get_mut(entity) else {
            warn!(target: "bevy_llm_chat", "turn finished for missing session {:?}", entity);
            continue;
        };
        if s.generation != generation {
            info!(target: "bevy_llm_chat", "discarding turn result for cleared session {:?}", entity);
            continue;
        }
        s.phase = TurnPhase::Idle;
        s.pending_prompt = None;
        s.partial.clear();
        s.conversation = conversation;
        match result {
            Ok(reply) => {
                info!(target: "bevy_llm_chat", "turn completed: entity={:?} final_len={}", entity, reply.len());
                ev_done.write(TurnCompletedEvt { entity, reply });
            }
            Err(error) => {
                error!(target: "bevy_llm_chat", "turn failed: entity={:?} {}", entity, error);
                s.notice = Some(error.notice());
                ev_failed.write(TurnFailedEvt { entity, error });
            }
        }
    }
}

/// clear chat / clear cache / export.
fn apply_session_commands(
    mut ev_cmd: EventReader<SessionCommand>,
    mut sessions: Query<&mut Session>,
    mut cache: ResMut<ModelCache>,
    config: Res<ChatConfig>,
    mut ev_notice: EventWriter<ChatNoticeEvt>,
) {
    for cmd in ev_cmd.read() {
        match *cmd {
            SessionCommand::ClearChat(entity) => {
                if let Ok(mut s) = sessions.get_mut(entity) {
                    info!(target: "bevy_llm_chat", "clear chat: entity={:?}", entity);
                    s.clear_chat();
                }
            }
            SessionCommand::ClearCache => {
                cache.clear();
                ev_notice.write(ChatNoticeEvt {
                    entity: None,
                    level: NoticeLevel::Success,
                    text: "Cache cleared!".into(),
                });
            }
            SessionCommand::ExportTranscript(entity) => {
                let Ok(s) = sessions.get(entity) else { continue };
                let (level, text) = match export_transcript(&s, &config.export_dir) {
                    Ok(path) => (NoticeLevel::Success, format!("Transcript saved: {}", path.display())),
                    Err(ExportError::Empty) => (NoticeLevel::Info, ExportError::Empty.to_string()),
                    Err(err) => {
                        error!(target: "bevy_llm_chat", "export failed: {}", err);
                        (NoticeLevel::Error, err.to_string())
                    }
                };
                ev_notice.write(ChatNoticeEvt { entity: Some(entity), level, text });
            }
        }
    }
}
