use bevy::prelude::Component;

use crate::catalog::ModelSelection;
use crate::conversation::Conversation;
use crate::credential::{Credential, CredentialCheck, check_credential};
use crate::turn::TurnPhase;

/// per-user chat state: history, the selected model and the api key.
///
/// while a turn runs, the conversation is owned by the turn task and handed
/// back when it finishes; `phase` tracks that hand-off.
#[derive(Component, Clone, Debug, Default)]
pub struct Session {
    pub conversation: Conversation,
    pub model: ModelSelection,
    credential: Option<Credential>,
    pub phase: TurnPhase,
    /// prompt of the in-flight turn, shown until the conversation comes back.
    pub pending_prompt: Option<String>,
    /// text streamed so far for the in-flight turn.
    pub partial: String,
    /// last user-facing notice (warning or error), cleared on the next turn.
    pub notice: Option<String>,
    /// bumped on every clear so results of older turns are dropped.
    pub(crate) generation: u64,
}

impl Session {
    pub fn new(model: ModelSelection, credential: Option<Credential>) -> Self {
        Self { model, credential, ..Self::default() }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// replace the key; blank input clears it. returns the heuristic verdict.
    pub fn set_credential(&mut self, key: &str) -> CredentialCheck {
        self.credential = Credential::new(key);
        check_credential(key)
    }

    pub fn credential_check(&self) -> CredentialCheck {
        self.credential.as_ref().map_or(CredentialCheck::Missing, Credential::check)
    }

    /// a turn is in flight until its conversation has been handed back.
    pub fn is_busy(&self) -> bool {
        self.phase.is_busy() || self.pending_prompt.is_some()
    }

    /// chat input is disabled until a key is present.
    pub fn input_enabled(&self) -> bool {
        self.credential.is_some() && !self.is_busy()
    }

    pub fn clear_chat(&mut self) {
        self.generation += 1;
        self.conversation.reset();
        self.phase = TurnPhase::Idle;
        self.pending_prompt = None;
        self.partial.clear();
        self.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_needs_key_and_idle() {
        let mut s = Session::default();
        assert!(!s.input_enabled());
        assert_eq!(s.credential_check(), CredentialCheck::Missing);
        assert_eq!(s.set_credential("short"), CredentialCheck::TooShort);
        assert!(s.input_enabled());
        s.phase = TurnPhase::Streaming;
        assert!(!s.input_enabled());
        s.phase = TurnPhase::Committed;
        s.pending_prompt = Some("hi".into());
        assert!(s.is_busy());
    }

    #[test]
    fn clear_chat_resets_history() {
        let mut s = Session::default();
        s.conversation.push_user("hi");
        s.notice = Some("x".into());
        s.clear_chat();
        assert_eq!(s.conversation.len(), 1);
        assert_eq!(s.generation, 1);
        assert!(s.notice.is_none());
    }

    #[test]
    fn clear_chat_mid_turn_drops_pending_prompt() {
        let mut s = Session::default();
        s.set_credential("AIzaSyA0123456789abcdefgh");
        s.phase = TurnPhase::Streaming;
        s.pending_prompt = Some("hi".into());
        s.partial.push_str("hal");
        s.clear_chat();
        assert!(s.pending_prompt.is_none());
        assert_eq!(s.phase, TurnPhase::Idle);
        assert!(s.partial.is_empty());
        assert!(s.input_enabled());
    }
}
