use serde::{Deserialize, Serialize};

use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Dead link pointed at a live successor form.
    Replaced,
    /// Dead link replaced with the placeholder.
    Blanked,
    /// Link removed because the other language has none.
    ParityBlanked,
}

/// One cell mutation, written to the change log as a JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub form: String,
    pub year: String,
    pub column: usize,
    pub language: Language,
    pub action: ChangeAction,
    pub removed_href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_href: Option<String>,
}
