use serde::{Deserialize, Serialize};

/// One training row after column selection and renaming.
/// Both fields are non-empty once the loader has dropped missing rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPair {
    pub input:  String,
    pub target: String,
}

impl TextPair {
    pub fn new(input: impl Into<String>, target: impl Into<String>) -> Self {
        Self { input: input.into(), target: target.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.input.trim().is_empty() && !self.target.trim().is_empty()
    }
}
