//! Per-actor conversation state and per-actor serialization.
//!
//! Every multi-step flow (create team, collect cards, join, block)
//! tracks exactly one state per actor. States live only in process
//! memory. A restart drops every in-progress conversation, which is
//! fine: the user starts the step over.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Where collected cards go when the user presses "done".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardTarget {
    /// Participant is created on completion, then the cards.
    NewParticipant { org_id: i64, fio: String },
    /// Cards are appended to an existing participant.
    Existing { participant_id: i64 },
}

/// One state per actor, mutually exclusive. Entering a state replaces
/// whatever was there; navigation clears it entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// Waiting for a name for a new team
    CreatingOrg,
    /// Waiting for a new name for an existing team
    RenamingOrg { org_id: i64 },
    /// Waiting for the FIO of a new participant
    AddingParticipant { org_id: i64 },
    /// Waiting for a replacement FIO
    EditingFio { participant_id: i64 },
    /// Collecting card numbers until the "done" button
    CollectingCards { target: CardTarget, cards: Vec<String> },
    /// Waiting for a 16-char team id to join
    JoiningOrg,
    /// Super-admin: waiting for a numeric id to block
    BlockingUser,
}

impl ConversationState {
    /// Short step name for log lines.
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::CreatingOrg => "creating_org",
            Self::RenamingOrg { .. } => "renaming_org",
            Self::AddingParticipant { .. } => "adding_participant",
            Self::EditingFio { .. } => "editing_fio",
            Self::CollectingCards { .. } => "collecting_cards",
            Self::JoiningOrg => "joining_org",
            Self::BlockingUser => "blocking_user",
        }
    }
}

/// In-memory conversation state store, keyed by actor id.
#[derive(Default)]
pub struct StateStore {
    states: DashMap<i64, ConversationState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of an actor, if any.
    pub fn get(&self, actor_id: i64) -> Option<ConversationState> {
        self.states.get(&actor_id).map(|entry| entry.value().clone())
    }

    /// Enters a state, replacing any previous one.
    pub fn set(&self, actor_id: i64, state: ConversationState) {
        log::debug!("actor {} -> state {}", actor_id, state.step_name());
        self.states.insert(actor_id, state);
    }

    /// Resets the actor to idle. Safe to call when already idle.
    pub fn clear(&self, actor_id: i64) {
        if self.states.remove(&actor_id).is_some() {
            log::debug!("actor {} -> idle", actor_id);
        }
    }
}

/// Serializes event handling per actor.
///
/// The dispatcher runs one task per update; two rapid messages from the
/// same actor would otherwise race the state read-modify-write (e.g.
/// both passing the duplicate-card check before either records the
/// card). Handlers acquire the actor's gate for the whole event.
/// Distinct actors proceed concurrently, and an event never takes
/// another actor's gate.
#[derive(Default)]
pub struct ActorGate {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ActorGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the actor's gate, creating it on first use.
    pub async fn acquire(&self, actor_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let entry = self.locks.entry(actor_id).or_default();
            Arc::clone(entry.value())
        };
        lock.lock_owned().await
    }
}
