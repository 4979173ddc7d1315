//! System message assembly

use chrono::{DateTime, Utc};

use super::AgentConfig;
use crate::memory::UserMemory;
use crate::tools::THINKING_INSTRUCTIONS;

/// Build the system message for one run
pub fn system_message(config: &AgentConfig, memories: &[UserMemory], now: DateTime<Utc>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !config.description.trim().is_empty() {
        sections.push(config.description.trim().to_string());
    }

    let mut instructions: Vec<&str> = config
        .instructions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    instructions.push(THINKING_INSTRUCTIONS);
    sections.push(format!(
        "<instructions>\n{}\n</instructions>",
        instructions.join("\n\n")
    ));

    let mut additional = Vec::new();
    if config.markdown {
        additional.push("- Use markdown to format your answers.".to_string());
    }
    if config.add_datetime_to_instructions {
        additional.push(format!(
            "- The current time is {}.",
            now.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if !additional.is_empty() {
        sections.push(format!(
            "<additional_information>\n{}\n</additional_information>",
            additional.join("\n")
        ));
    }

    if config.enable_user_memories {
        if memories.is_empty() {
            sections.push(
                "You have no memories of this user from previous interactions.".to_string(),
            );
        } else {
            let lines: Vec<String> = memories.iter().map(|m| format!("- {}", m.memory)).collect();
            sections.push(format!(
                "You have access to memories from previous interactions with the user:\n\
                 <memories_from_previous_interactions>\n{}\n</memories_from_previous_interactions>\n\
                 Note: this information is from previous interactions and may be updated in this \
                 conversation. Prefer information from this conversation over past memories.",
                lines.join("\n")
            ));
        }
    }

    sections.join("\n\n")
}
