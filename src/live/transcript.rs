//! Live transcript accumulation
//!
//! The live API streams transcription fragments for both sides of the
//! conversation. The user's side arrives as whole utterances that replace
//! the previous one; NIA's side arrives as deltas that append until the
//! turn completes.

/// Rolling transcripts for the current conversation turn.
#[derive(Debug, Default, Clone)]
pub struct TranscriptBuffers {
    user: String,
    nia: String,
}

impl TranscriptBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the user transcript with the latest utterance.
    pub fn set_user(&mut self, text: &str) {
        self.user.clear();
        self.user.push_str(text);
    }

    /// Append a model transcript delta.
    pub fn append_nia(&mut self, delta: &str) {
        self.nia.push_str(delta);
    }

    /// Clear NIA's transcript at a turn boundary.
    pub fn clear_nia(&mut self) {
        self.nia.clear();
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn nia(&self) -> &str {
        &self.nia
    }
}
