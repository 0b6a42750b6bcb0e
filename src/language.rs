use serde::{Deserialize, Serialize};

/// One of the two published languages of a form table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Fr];

    /// Suffix letter used in `<slug>-table-<suffix>.htm`.
    pub fn suffix(self) -> char {
        match self {
            Language::En => 'e',
            Language::Fr => 'f',
        }
    }

    /// Inert markup substituted for a link that must not be published.
    pub fn placeholder(self) -> &'static str {
        match self {
            Language::En => r#"<span class="small text-muted">Not available</span>"#,
            Language::Fr => r#"<span class="small text-muted">Pas disponible</span>"#,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::En => f.write_str("en"),
            Language::Fr => f.write_str("fr"),
        }
    }
}
