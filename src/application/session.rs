//! Per-session load generations.
//!
//! The document-loaded condition is per load, not one-shot for the session's
//! whole lifetime: every load attempt replaces the generation deferred so
//! document swaps work without recreating the engine instance. Holders of a
//! previous generation keep observing that generation's settled outcome.

use std::sync::Mutex;

use crate::domain::types::SessionPhase;
use crate::util::Deferred;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::session";

/// Generation of the document-loaded condition: resolves when the load
/// sequence completes, rejects with the stage message when it fails.
pub type LoadGeneration = Deferred<(), String>;

/// Tracks one engine session's lifecycle and its current load generation.
pub struct ScoreSession {
    phase: Mutex<SessionPhase>,
    loaded: Mutex<LoadGeneration>,
}

impl Default for ScoreSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreSession {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(SessionPhase::Uninitialized),
            loaded: Mutex::new(Deferred::new()),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *mutex_lock(&self.phase, SOURCE, "phase")
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        *mutex_lock(&self.phase, SOURCE, "set_phase") = phase;
    }

    /// Start a new load generation, making earlier generation handles stale
    /// (they keep whatever outcome they already had, or stay pending
    /// forever if their load was abandoned).
    pub(crate) fn begin_load(&self) -> LoadGeneration {
        let fresh = LoadGeneration::new();
        *mutex_lock(&self.loaded, SOURCE, "begin_load") = fresh.clone();
        fresh
    }

    /// Handle on the current load generation.
    pub fn loaded(&self) -> LoadGeneration {
        mutex_lock(&self.loaded, SOURCE, "loaded").clone()
    }

    /// Whether the current generation completed successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded().peek(), Some(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generations_replace_without_disturbing_older_holders() {
        let session = ScoreSession::new();

        let first = session.begin_load();
        first.resolve(());
        assert!(session.is_loaded());

        let second = session.begin_load();
        assert!(!session.is_loaded());
        second.reject("fetch failed".to_string());

        // The first generation's holders still see their success.
        assert_eq!(first.wait().await, Ok(()));
        assert_eq!(session.loaded().wait().await, Err("fetch failed".to_string()));
    }

    #[test]
    fn phase_transitions_are_observable() {
        let session = ScoreSession::new();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);

        session.set_phase(SessionPhase::ModuleReady);
        assert_eq!(session.phase(), SessionPhase::ModuleReady);

        session.set_phase(SessionPhase::Error);
        assert_eq!(session.phase(), SessionPhase::Error);
    }
}
