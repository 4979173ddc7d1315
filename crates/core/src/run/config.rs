//! Per-run configuration

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{LeetCodeSite, ModelId};

/// Per-user secrets forwarded to the tool gateway
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCredentials {
    pub site: LeetCodeSite,
    pub leetcode_session: String,
    pub github_token: String,
}

/// Everything a single agent run is parameterised by
#[derive(Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub user_id: String,
    pub session_id: String,
    pub model: ModelId,
    pub debug_mode: bool,
    pub model_api_key: String,
    pub credentials: ToolCredentials,
}

impl RunConfig {
    /// Names of the required values that are empty
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.model_api_key.trim().is_empty() {
            missing.push("Gemini API key");
        }
        if self.credentials.leetcode_session.trim().is_empty() {
            missing.push("LeetCode session token");
        }
        if self.credentials.github_token.trim().is_empty() {
            missing.push("GitHub token");
        }
        missing
    }
}

fn mask(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "***"
    }
}

impl fmt::Debug for ToolCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCredentials")
            .field("site", &self.site)
            .field("leetcode_session", &mask(&self.leetcode_session))
            .field("github_token", &mask(&self.github_token))
            .finish()
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("model", &self.model)
            .field("debug_mode", &self.debug_mode)
            .field("model_api_key", &mask(&self.model_api_key))
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            user_id: "user-1".to_string(),
            session_id: "session-1".to_string(),
            model: ModelId::default(),
            debug_mode: false,
            model_api_key: "gk".to_string(),
            credentials: ToolCredentials {
                site: LeetCodeSite::Global,
                leetcode_session: "lc-secret".to_string(),
                github_token: "ghp-secret".to_string(),
            },
        }
    }

    #[test]
    fn complete_config_has_no_missing_credentials() {
        assert!(config().missing_credentials().is_empty());
    }

    #[test]
    fn blank_credentials_are_reported_in_order() {
        let mut config = config();
        config.model_api_key = " ".to_string();
        config.credentials.github_token.clear();
        assert_eq!(
            config.missing_credentials(),
            vec!["Gemini API key", "GitHub token"]
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", config());
        assert!(rendered.contains("user-1"));
        assert!(!rendered.contains("lc-secret"));
        assert!(!rendered.contains("ghp-secret"));
    }
}
