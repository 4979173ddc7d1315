//! Chat client configuration

use dsa_core::config::Settings;
use dsa_core::model::{LeetCodeSite, ModelId};
use dsa_core::run::ToolCredentials;

pub const PAGE_TITLE: &str = "DSA Notes Agent";

pub const MAIN_DESCRIPTION: &str = "\
Your personal assistant for creating organized Data Structures & Algorithms notes.
Tell me about a problem you solved on LeetCode and I will write the notes and
save them to GitHub.";

pub const USAGE_INSTRUCTIONS: &str = "\
Quick setup:
  1. Set GEMINI_API_KEY (or pass --gemini-api-key)
  2. Set LC_SESSION to your LEETCODE_SESSION cookie (or --lc-session)
  3. Set GH_TOKEN to a GitHub personal access token (or --gh-token)

Examples:
  I solved LeetCode #1 Two Sum
  Help me create notes for problem 206 Reverse Linked List
  Just completed Binary Search problem #704

Commands:
  /new      start a new session
  /clear    clear execution status from all messages
  /stats    show session statistics
  /history  show past messages with their processing log
  /info     show user, session and configuration
  /help     show this help
  /quit     exit";

pub const INPUT_PROMPT: &str = "you> ";

/// Settings the chat loop runs with
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: ModelId,
    pub debug_mode: bool,
    pub show_events: bool,
    pub gemini_api_key: String,
    pub credentials: ToolCredentials,
    pub confirm_tools: Vec<String>,
}

/// Values given on the command line; anything unset falls back to the environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub model: ModelId,
    pub no_debug: bool,
    pub show_events: bool,
    pub lc_site: Option<LeetCodeSite>,
    pub lc_session: Option<String>,
    pub gh_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub confirm_tools: Vec<String>,
}

fn pick(value: Option<String>, fallback: &Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.clone())
        .unwrap_or_default()
}

impl ChatConfig {
    pub fn resolve(overrides: Overrides, settings: &Settings) -> Self {
        Self {
            model: overrides.model,
            debug_mode: !overrides.no_debug && settings.debug_mode,
            show_events: overrides.show_events,
            gemini_api_key: pick(overrides.gemini_api_key, &settings.model_api_key),
            credentials: ToolCredentials {
                site: overrides.lc_site.unwrap_or(settings.leetcode_site),
                leetcode_session: pick(overrides.lc_session, &settings.leetcode_session),
                github_token: pick(overrides.gh_token, &settings.github_token),
            },
            confirm_tools: overrides.confirm_tools,
        }
    }

    /// Required values that are still empty
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.gemini_api_key.is_empty() {
            missing.push("Gemini API key");
        }
        if self.credentials.leetcode_session.is_empty() {
            missing.push("LeetCode session token");
        }
        if self.credentials.github_token.is_empty() {
            missing.push("GitHub token");
        }
        missing
    }

    pub fn is_valid(&self) -> bool {
        self.missing().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned()).unwrap()
    }

    #[test]
    fn environment_fills_unset_values() {
        let settings = settings(&[
            ("GEMINI_API_KEY", "gk"),
            ("LC_SESSION", "lc"),
            ("GH_TOKEN", "ghp"),
            ("LC_SITE", "cn"),
        ]);
        let config = ChatConfig::resolve(Overrides::default(), &settings);
        assert!(config.is_valid());
        assert_eq!(config.credentials.site, LeetCodeSite::Cn);
        assert_eq!(config.gemini_api_key, "gk");
        assert!(config.debug_mode);
    }

    #[test]
    fn flags_win_over_environment() {
        let settings = settings(&[("GH_TOKEN", "env-token")]);
        let overrides = Overrides {
            model: ModelId::Gemini25Pro,
            no_debug: true,
            gh_token: Some("flag-token".to_string()),
            lc_site: Some(LeetCodeSite::Global),
            ..Overrides::default()
        };
        let config = ChatConfig::resolve(overrides, &settings);
        assert_eq!(config.credentials.github_token, "flag-token");
        assert_eq!(config.model, ModelId::Gemini25Pro);
        assert!(!config.debug_mode);
    }

    #[test]
    fn missing_values_are_listed_in_order() {
        let config = ChatConfig::resolve(Overrides::default(), &settings(&[("LC_SESSION", "lc")]));
        assert_eq!(config.missing(), vec!["Gemini API key", "GitHub token"]);
        assert!(!config.is_valid());
    }

    #[test]
    fn blank_flag_falls_back_to_environment() {
        let settings = settings(&[("GEMINI_API_KEY", "gk")]);
        let overrides = Overrides {
            gemini_api_key: Some("  ".to_string()),
            ..Overrides::default()
        };
        assert_eq!(ChatConfig::resolve(overrides, &settings).gemini_api_key, "gk");
    }
}
