//! Question validation gate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of the oracle's answer to "can this KG answer the question?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionVerdict {
    Valid,
    Invalid,
    /// Both tokens, or neither.
    Ambiguous,
}

impl QuestionVerdict {
    /// Token match on the lowercased reply: `true` alone is valid, `false`
    /// alone is invalid. Substrings such as `untrue` do not count.
    pub fn classify(reply: &str) -> Self {
        let lower = reply.to_lowercase();
        let mut has_true = false;
        let mut has_false = false;
        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            match token {
                "true" => has_true = true,
                "false" => has_false = true,
                _ => {}
            }
        }
        match (has_true, has_false) {
            (true, false) => QuestionVerdict::Valid,
            (false, true) => QuestionVerdict::Invalid,
            _ => QuestionVerdict::Ambiguous,
        }
    }

    pub fn proceeds(self) -> bool {
        self == QuestionVerdict::Valid
    }
}

impl fmt::Display for QuestionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestionVerdict::Valid => "valid",
            QuestionVerdict::Invalid => "invalid",
            QuestionVerdict::Ambiguous => "ambiguous",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_answers() {
        assert_eq!(QuestionVerdict::classify("true"), QuestionVerdict::Valid);
        assert_eq!(QuestionVerdict::classify("  False.\n"), QuestionVerdict::Invalid);
        assert_eq!(QuestionVerdict::classify("\"TRUE\""), QuestionVerdict::Valid);
    }

    #[test]
    fn both_or_neither_is_ambiguous() {
        assert_eq!(
            QuestionVerdict::classify("It could be true or false."),
            QuestionVerdict::Ambiguous
        );
        assert_eq!(QuestionVerdict::classify("Yes."), QuestionVerdict::Ambiguous);
        assert!(!QuestionVerdict::Ambiguous.proceeds());
    }

    #[test]
    fn substrings_are_not_tokens() {
        assert_eq!(QuestionVerdict::classify("untrue"), QuestionVerdict::Ambiguous);
        assert_eq!(
            QuestionVerdict::classify("falsehood aside, true"),
            QuestionVerdict::Valid
        );
    }
}
