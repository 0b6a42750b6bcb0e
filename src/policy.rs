//! Per-document link repair: keep live links, point dead ones at a
//! successor form when one exists, and blank the rest.

use std::str::FromStr;

use serde::Serialize;

use crate::cli::RepairTrigger;
use crate::formats::{ChangeAction, ChangeRecord};
use crate::language::Language;
use crate::probe::LinkProbe;
use crate::table::TableBlock;

/// File-name prefix rewrite, e.g. `5000-` → `5100-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstitutionParseError {
    #[error("expected FROM=TO, got {0:?}")]
    MissingSeparator(String),
    #[error("substitution prefix must not be empty: {0:?}")]
    EmptyPrefix(String),
}

impl FromStr for Substitution {
    type Err = SubstitutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('=')
            .ok_or_else(|| SubstitutionParseError::MissingSeparator(s.to_owned()))?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(SubstitutionParseError::EmptyPrefix(s.to_owned()));
        }
        Ok(Self {
            from: from.to_owned(),
            to: to.to_owned(),
        })
    }
}

/// Rewrites the file-name prefix of `href` with the first matching rule.
/// Only the file-name component is considered; the rest of the URL is kept.
pub fn alternate_href(href: &str, rules: &[Substitution]) -> Option<String> {
    let path_end = href.find(['?', '#']).unwrap_or(href.len());
    let name_start = href[..path_end].rfind('/').map_or(0, |slash| slash + 1);
    let file_name = &href[name_start..path_end];

    let rule = rules.iter().find(|rule| file_name.starts_with(&rule.from))?;
    let mut alternate = String::with_capacity(href.len() + rule.to.len());
    alternate.push_str(&href[..name_start]);
    alternate.push_str(&rule.to);
    alternate.push_str(&href[name_start + rule.from.len()..]);
    Some(alternate)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the cell alone. `live` is false when the probe failed in a way
    /// the trigger does not act on.
    Keep { live: bool },
    Replace(String),
    Blank,
}

#[derive(Debug, Clone)]
pub struct RepairPolicy {
    pub trigger: RepairTrigger,
    pub substitutions: Vec<Substitution>,
}

impl RepairPolicy {
    pub fn decide(&self, href: &str, prober: &mut dyn LinkProbe) -> Decision {
        let result = prober.probe(href);
        if result.is_live {
            return Decision::Keep { live: true };
        }

        let triggered = match self.trigger {
            RepairTrigger::NotFound => result.is_not_found(),
            RepairTrigger::AnyFailure => true,
        };
        if !triggered {
            tracing::warn!(
                href,
                status = ?result.status,
                error = ?result.error,
                "link could not be verified; keeping it"
            );
            return Decision::Keep { live: false };
        }

        if let Some(alternate) = alternate_href(href, &self.substitutions) {
            if prober.probe(&alternate).is_live {
                return Decision::Replace(alternate);
            }
            tracing::debug!(href, %alternate, "alternate is not live either");
        }
        Decision::Blank
    }
}

/// Counters for one repair pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairTally {
    pub checked: usize,
    pub live: usize,
    pub unverified: usize,
    pub replaced: usize,
    pub blanked: usize,
}

impl RepairTally {
    pub fn changed(&self) -> usize {
        self.replaced + self.blanked
    }
}

#[derive(Debug, Default)]
pub struct RepairOutcome {
    pub tally: RepairTally,
    pub changes: Vec<ChangeRecord>,
}

/// Applies the policy to every linked cell of `block`. Cells without a link
/// are never probed.
pub fn repair_table(
    block: &mut TableBlock,
    form: &str,
    language: Language,
    policy: &RepairPolicy,
    prober: &mut dyn LinkProbe,
) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();

    for row in block.rows_mut() {
        let year = row.year().unwrap_or_else(|| row.label());
        for cell in row.cells_mut() {
            let Some(href) = cell.href().map(str::to_owned) else {
                continue;
            };
            outcome.tally.checked += 1;

            match policy.decide(&href, prober) {
                Decision::Keep { live: true } => outcome.tally.live += 1,
                Decision::Keep { live: false } => outcome.tally.unverified += 1,
                Decision::Replace(alternate) => {
                    cell.replace_href(&alternate);
                    tracing::info!(
                        form,
                        %language,
                        %year,
                        column = cell.column(),
                        %href,
                        %alternate,
                        "replaced dead link"
                    );
                    outcome.tally.replaced += 1;
                    outcome.changes.push(ChangeRecord {
                        form: form.to_owned(),
                        year: year.clone(),
                        column: cell.column(),
                        language,
                        action: ChangeAction::Replaced,
                        removed_href: href,
                        replacement_href: Some(alternate),
                    });
                }
                Decision::Blank => {
                    cell.blank(language);
                    tracing::info!(
                        form,
                        %language,
                        %year,
                        column = cell.column(),
                        %href,
                        "blanked dead link"
                    );
                    outcome.tally.blanked += 1;
                    outcome.changes.push(ChangeRecord {
                        form: form.to_owned(),
                        year: year.clone(),
                        column: cell.column(),
                        language,
                        action: ChangeAction::Blanked,
                        removed_href: href,
                        replacement_href: None,
                    });
                }
            }
        }
    }

    outcome
}
