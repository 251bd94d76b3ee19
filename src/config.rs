use std::sync::RwLock;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_SD_URL: &str = "http://127.0.0.1:7860";

/// User-configurable endpoints and the selected enhancement model.
///
/// Settings live only for the current session; there is no on-disk
/// persistence. The endpoint values are plain strings and are handed to the
/// HTTP clients as-is.
#[derive(Clone, Debug)]
pub struct Settings {
    pub ollama_url: String,
    pub sd_url: String,
    pub model: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: resolve_env_url("LUMINAGEN_OLLAMA_URL", DEFAULT_OLLAMA_URL),
            sd_url: resolve_env_url("LUMINAGEN_SD_URL", DEFAULT_SD_URL),
            model: None,
        }
    }
}

/// Single-writer store for [`Settings`]; every mutation goes through
/// [`SettingsStore::update`] on the UI thread.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Settings {
        self.settings
            .read()
            .expect("settings lock poisoned")
            .clone()
    }

    pub fn update<F>(&self, mutate: F) -> Settings
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self
            .settings
            .write()
            .expect("settings lock poisoned for write");
        mutate(&mut guard);
        guard.clone()
    }
}

fn resolve_env_url(var: &str, fallback: &str) -> String {
    if let Ok(value) = std::env::var(var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_services() {
        let settings = Settings::default();
        assert!(settings.ollama_url.starts_with("http"));
        assert!(settings.sd_url.starts_with("http"));
        assert_eq!(settings.model, None);
    }

    #[test]
    fn update_returns_the_mutated_snapshot() {
        let store = SettingsStore::new();
        let updated = store.update(|settings| {
            settings.model = Some("llama3".to_string());
            settings.ollama_url = "http://10.0.0.5:11434".to_string();
        });
        assert_eq!(updated.model.as_deref(), Some("llama3"));
        assert_eq!(store.snapshot().ollama_url, "http://10.0.0.5:11434");
    }

    #[test]
    fn env_fallback_is_used_when_variable_is_absent() {
        assert_eq!(
            resolve_env_url("LUMINAGEN_TEST_UNSET_URL", DEFAULT_SD_URL),
            DEFAULT_SD_URL
        );
    }
}
