use crate::{diffusion::GeneratedImage, ollama::ModelInfo};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    RwLock,
};

/// Reachability of the language-model service, derived from the most recent
/// model-listing probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    #[default]
    Offline,
}

/// Everything the view renders. Created with defaults at startup and
/// discarded on exit; mutated only on the UI thread through [`SessionStore`].
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub raw_prompt: String,
    pub enhanced_prompt: Option<String>,
    pub is_enhancing: bool,
    pub is_generating: bool,
    pub image: Option<GeneratedImage>,
    pub error: Option<String>,
    pub connectivity: Connectivity,
    pub models: Vec<ModelInfo>,
}

impl SessionState {
    /// The prompt a generation request actually carries: the enhanced prompt
    /// when it has content, else the raw prompt. `None` when both trim to
    /// empty, in which case the generate action is a no-op.
    pub fn effective_prompt(&self) -> Option<String> {
        self.enhanced_prompt
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .or_else(|| Some(self.raw_prompt.trim()).filter(|text| !text.is_empty()))
            .map(str::to_string)
    }

    pub fn can_enhance(&self, model: Option<&str>) -> bool {
        !self.raw_prompt.trim().is_empty()
            && !self.is_enhancing
            && self.connectivity == Connectivity::Online
            && model.is_some()
    }

    pub fn can_generate(&self) -> bool {
        !self.is_generating && self.effective_prompt().is_some()
    }
}

/// Single-writer store for [`SessionState`], mirroring [`SettingsStore`].
///
/// [`SettingsStore`]: crate::config::SettingsStore
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().expect("session lock poisoned").clone()
    }

    pub fn update<F>(&self, mutate: F) -> SessionState
    where
        F: FnOnce(&mut SessionState),
    {
        let mut guard = self
            .state
            .write()
            .expect("session lock poisoned for write");
        mutate(&mut guard);
        guard.clone()
    }
}

/// Monotonically increasing id per action type. Each trigger takes a fresh
/// id; a completion whose id is no longer current belongs to a superseded
/// request and is discarded. This makes re-triggering an action while one is
/// in flight, and probing a URL that has since been edited, last-wins.
#[derive(Debug, Default)]
pub struct RequestSeq(AtomicU64);

impl RequestSeq {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.0.load(Ordering::SeqCst) == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_prompt_is_none_for_empty_or_whitespace_input() {
        let mut state = SessionState::default();
        assert_eq!(state.effective_prompt(), None);

        state.raw_prompt = "   \n\t".to_string();
        assert_eq!(state.effective_prompt(), None);
    }

    #[test]
    fn effective_prompt_prefers_the_enhancement() {
        let state = SessionState {
            raw_prompt: "a cat".to_string(),
            enhanced_prompt: Some("A fluffy orange cat...".to_string()),
            ..Default::default()
        };
        assert_eq!(
            state.effective_prompt().as_deref(),
            Some("A fluffy orange cat...")
        );
    }

    #[test]
    fn clearing_the_enhancement_falls_back_to_the_raw_prompt() {
        let mut state = SessionState {
            raw_prompt: "a cat".to_string(),
            enhanced_prompt: Some("A fluffy orange cat...".to_string()),
            ..Default::default()
        };
        state.enhanced_prompt = None;
        assert_eq!(state.effective_prompt().as_deref(), Some("a cat"));
    }

    #[test]
    fn whitespace_only_enhancement_falls_back_to_the_raw_prompt() {
        let state = SessionState {
            raw_prompt: "a cat".to_string(),
            enhanced_prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(state.effective_prompt().as_deref(), Some("a cat"));
    }

    #[test]
    fn enhance_requires_text_model_and_connectivity() {
        let mut state = SessionState {
            raw_prompt: "a cat".to_string(),
            connectivity: Connectivity::Online,
            ..Default::default()
        };
        assert!(state.can_enhance(Some("llama3")));
        assert!(!state.can_enhance(None));

        state.connectivity = Connectivity::Offline;
        assert!(!state.can_enhance(Some("llama3")));

        state.connectivity = Connectivity::Online;
        state.is_enhancing = true;
        assert!(!state.can_enhance(Some("llama3")));

        state.is_enhancing = false;
        state.raw_prompt = "  ".to_string();
        assert!(!state.can_enhance(Some("llama3")));
    }

    #[test]
    fn generate_works_offline_from_the_raw_prompt() {
        let state = SessionState {
            raw_prompt: "a cat".to_string(),
            connectivity: Connectivity::Offline,
            ..Default::default()
        };
        assert!(state.can_generate());
    }

    #[test]
    fn generate_is_blocked_while_a_request_is_in_flight() {
        let state = SessionState {
            raw_prompt: "a cat".to_string(),
            is_generating: true,
            ..Default::default()
        };
        assert!(!state.can_generate());
    }

    #[test]
    fn stale_request_ids_are_not_current() {
        let seq = RequestSeq::default();
        let first = seq.next();
        assert!(seq.is_current(first));

        let second = seq.next();
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }

    #[test]
    fn store_updates_are_visible_in_later_snapshots() {
        let store = SessionStore::new();
        store.update(|state| {
            state.is_generating = true;
            state.error = None;
        });
        assert!(store.snapshot().is_generating);
    }
}
