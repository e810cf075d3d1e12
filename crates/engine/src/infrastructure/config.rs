//! Engine configuration read from the environment.

/// Runtime settings for the engine binary.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    /// SQLite file path, or `:memory:`
    pub database_path: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    /// When false the arc generator runs in placeholder mode
    pub llm_enabled: bool,
    pub llm_max_retries: u32,
    pub cors_allowed_origins: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            database_path: "arcs.db".into(),
            ollama_base_url: super::ollama::DEFAULT_OLLAMA_BASE_URL.into(),
            ollama_model: super::ollama::DEFAULT_OLLAMA_MODEL.into(),
            llm_enabled: true,
            llm_max_retries: 3,
            cors_allowed_origins: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        Self {
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: first(&["SERVER_PORT", "PORT"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            database_path: lookup("ARC_DB").unwrap_or(defaults.database_path),
            ollama_base_url: first(&["OLLAMA_BASE_URL", "OLLAMA_URL"])
                .unwrap_or(defaults.ollama_base_url),
            ollama_model: lookup("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            llm_enabled: lookup("ARC_LLM_ENABLED")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.llm_enabled),
            llm_max_retries: lookup("LLM_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.llm_max_retries),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(EngineConfig::from_lookup(|_| None), EngineConfig::default());
    }

    #[test]
    fn port_falls_back_to_generic_variable() {
        let config = EngineConfig::from_lookup(lookup_from(&[("PORT", "8080")]));
        assert_eq!(config.server_port, 8080);

        let config = EngineConfig::from_lookup(lookup_from(&[("SERVER_PORT", "not-a-port")]));
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn llm_can_be_disabled() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("ARC_LLM_ENABLED", "false"),
            ("LLM_MAX_RETRIES", "0"),
        ]));
        assert!(!config.llm_enabled);
        assert_eq!(config.llm_max_retries, 0);
    }

    #[test]
    fn blank_cors_is_ignored() {
        let config = EngineConfig::from_lookup(lookup_from(&[("CORS_ALLOWED_ORIGINS", "  ")]));
        assert!(config.cors_allowed_origins.is_none());
    }
}
