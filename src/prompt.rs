//! System prompt assembly
//!
//! The base persona prompt is augmented per session with the user's selected
//! response language and the full memory list as a bulleted addendum.

use crate::memory::MemoryStore;

const BASE_PROMPT: &str = "\
You are NIA, a warm and attentive companion. You speak naturally and \
concisely, the way a close friend would on a call. You can see occasional \
snapshots from the user's camera; refer to what you see only when it is \
relevant. When the user shares a personal detail worth keeping, save it \
with the save_memory tool.";

/// Build the per-session system prompt.
///
/// `language` is a display name like "English" or "Deutsch"; all replies are
/// forced into it regardless of the language the user speaks.
pub fn build_system_prompt(language: &str, memory: &MemoryStore) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    prompt.push_str(&format!(
        "\n\nAlways respond in {}, even if the user speaks another language.",
        language
    ));

    if !memory.is_empty() {
        prompt.push_str("\n\nThings you know about the user:");
        for fact in memory.facts() {
            prompt.push_str("\n- ");
            prompt.push_str(fact);
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_store() -> MemoryStore {
        let dir = std::env::temp_dir().join(format!("nia-prompt-{}", uuid::Uuid::new_v4()));
        MemoryStore::load_from(dir.join("memories.json"))
    }

    #[test]
    fn test_prompt_includes_language_directive() {
        let store = empty_store();
        let prompt = build_system_prompt("Deutsch", &store);
        assert!(prompt.contains("Always respond in Deutsch"));
    }

    #[test]
    fn test_prompt_omits_memory_section_when_empty() {
        let store = empty_store();
        let prompt = build_system_prompt("English", &store);
        assert!(!prompt.contains("Things you know about the user"));
    }

    #[test]
    fn test_prompt_lists_memories_as_bullets() {
        let mut store = empty_store();
        store.save_fact("likes tea");
        store.save_fact("plays guitar");

        let prompt = build_system_prompt("English", &store);
        assert!(prompt.contains("Things you know about the user:"));
        assert!(prompt.contains("\n- plays guitar"));
        assert!(prompt.contains("\n- likes tea"));
    }
}
