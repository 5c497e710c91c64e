//! Token counting using tiktoken-rs for Claude-compatible token estimation.
//!
//! Uses cl100k_base encoding. The encoder is built once per counter; if it
//! fails to initialize, counting falls back to a chars/4 estimate.

use tiktoken_rs::{cl100k_base, CoreBPE};

/// Counts tokens for prompt budgeting.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self {
            bpe: cl100k_base().ok(),
        }
    }

    /// Count tokens in text.
    pub fn count(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
            None => estimate_tokens_quick(text),
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate tokens without an encoder (~4 chars per token on average).
pub fn estimate_tokens_quick(text: &str) -> u32 {
    (text.len() as f64 / 4.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens_empty() {
        assert_eq!(TokenCounter::new().count(""), 0);
    }

    #[test]
    fn test_count_tokens_simple() {
        let count = TokenCounter::new().count("Hello, world!");
        assert!(count > 0);
        assert!(count < 10);
    }

    #[test]
    fn test_estimate_tokens_quick() {
        assert_eq!(estimate_tokens_quick(""), 0);
        assert_eq!(estimate_tokens_quick("abcd"), 1);
        assert_eq!(estimate_tokens_quick("abcde"), 2);
    }
}
