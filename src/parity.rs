//! Cross-language link parity for a form's EN/FR table pair. No network.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context as _;

use crate::cli::{CommonArgs, ParityArgs};
use crate::formats::{ChangeAction, ChangeRecord};
use crate::language::Language;
use crate::manifest::document_path;
use crate::store::Document;
use crate::summary::RunSummary;
use crate::table::TableBlock;
use crate::validate::RevisedText;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParityWarning {
    #[error("year {year} is missing from the {missing_from} table")]
    MissingYear { year: String, missing_from: Language },
    #[error("year {year} appears more than once in the {language} table")]
    DuplicateYear { year: String, language: Language },
    #[error("row {label:?} in the {language} table has no year")]
    NoYear { label: String, language: Language },
}

#[derive(Debug, Default)]
pub struct ParityOutcome {
    pub changes: Vec<ChangeRecord>,
    pub warnings: Vec<ParityWarning>,
}

struct PlannedBlank {
    language: Language,
    row: usize,
    column: usize,
    year: String,
}

/// Blanks every link that only one language has, joining rows on year.
///
/// Column 0 holds the year and is never compared. Each year is judged from
/// the tables as they were passed in, so row order has no effect.
pub fn reconcile(form: &str, en: &mut TableBlock, fr: &mut TableBlock) -> ParityOutcome {
    let mut outcome = ParityOutcome::default();
    let en_index = index_years(form, en, Language::En, &mut outcome.warnings);
    let fr_index = index_years(form, fr, Language::Fr, &mut outcome.warnings);

    let mut planned = Vec::new();
    {
        let en_rows = en.rows().collect::<Vec<_>>();
        let fr_rows = fr.rows().collect::<Vec<_>>();

        for (year, &en_pos) in &en_index {
            let Some(&fr_pos) = fr_index.get(year) else {
                push_warning(
                    form,
                    &mut outcome.warnings,
                    ParityWarning::MissingYear {
                        year: year.clone(),
                        missing_from: Language::Fr,
                    },
                );
                continue;
            };

            let (en_cells, fr_cells) = (en_rows[en_pos].cells(), fr_rows[fr_pos].cells());
            let width = en_cells.len().min(fr_cells.len());
            for column in 1..width {
                let linked = match (en_cells[column].has_link(), fr_cells[column].has_link()) {
                    (true, false) => (Language::En, en_pos),
                    (false, true) => (Language::Fr, fr_pos),
                    _ => continue,
                };
                planned.push(PlannedBlank {
                    language: linked.0,
                    row: linked.1,
                    column,
                    year: year.clone(),
                });
            }
        }

        for year in fr_index.keys().filter(|year| !en_index.contains_key(*year)) {
            push_warning(
                form,
                &mut outcome.warnings,
                ParityWarning::MissingYear {
                    year: year.clone(),
                    missing_from: Language::En,
                },
            );
        }
    }

    for blank in planned {
        let block = match blank.language {
            Language::En => &mut *en,
            Language::Fr => &mut *fr,
        };
        let Some(cell) = block
            .rows_mut()
            .nth(blank.row)
            .and_then(|row| row.cell_mut(blank.column))
        else {
            continue;
        };
        let removed_href = cell.blank(blank.language).unwrap_or_default();
        tracing::info!(
            form,
            year = %blank.year,
            column = blank.column,
            language = %blank.language,
            href = %removed_href,
            "blanked link missing from the other language"
        );
        outcome.changes.push(ChangeRecord {
            form: form.to_owned(),
            year: blank.year,
            column: blank.column,
            language: blank.language,
            action: ChangeAction::ParityBlanked,
            removed_href,
            replacement_href: None,
        });
    }

    outcome
}

/// Year → position among the block's rows. Rows without a year and years
/// that occur more than once are left out.
fn index_years(
    form: &str,
    block: &TableBlock,
    language: Language,
    warnings: &mut Vec<ParityWarning>,
) -> BTreeMap<String, usize> {
    let mut index = BTreeMap::new();
    let mut duplicates = HashSet::new();

    for (pos, row) in block.rows().enumerate() {
        let Some(year) = row.year() else {
            push_warning(
                form,
                warnings,
                ParityWarning::NoYear {
                    label: row.label(),
                    language,
                },
            );
            continue;
        };
        if duplicates.contains(&year) {
            continue;
        }
        if index.remove(&year).is_some() {
            push_warning(
                form,
                warnings,
                ParityWarning::DuplicateYear {
                    year: year.clone(),
                    language,
                },
            );
            duplicates.insert(year);
            continue;
        }
        index.insert(year, pos);
    }

    index
}

fn push_warning(form: &str, warnings: &mut Vec<ParityWarning>, warning: ParityWarning) {
    tracing::warn!(form, "{warning}; skipping");
    warnings.push(warning);
}

pub fn run(args: ParityArgs) -> anyhow::Result<RunSummary> {
    let manifest = crate::manifest::read(Path::new(&args.common.manifest))?;
    let mut summary = RunSummary {
        forms: manifest.forms.len(),
        warnings: manifest.rejected.len(),
        ..RunSummary::default()
    };

    reconcile_forms(&manifest.forms, &args.common, &RevisedText::new(), &mut summary);

    if let Some(path) = args.common.change_log.as_deref() {
        summary.append_change_log(Path::new(path))?;
    }
    Ok(summary)
}

/// Runs [`reconcile`] over each form's document pair. A document with an
/// entry in `revised` is reconciled from that text instead of the file
/// contents. A form whose documents cannot be read or parsed is counted as
/// fatal and skipped.
pub fn reconcile_forms(
    forms: &[String],
    common: &CommonArgs,
    revised: &RevisedText,
    summary: &mut RunSummary,
) {
    for form in forms {
        if let Err(err) = reconcile_form(form, common, revised, summary) {
            tracing::warn!(form = %form, "parity skipped: {err:#}");
            summary.fatal_errors += 1;
        }
    }
}

fn reconcile_form(
    form: &str,
    common: &CommonArgs,
    revised: &RevisedText,
    summary: &mut RunSummary,
) -> anyhow::Result<()> {
    let results_dir = common.results_dir();
    let en_doc = load_revised(&document_path(&results_dir, form, Language::En), revised)?;
    let fr_doc = load_revised(&document_path(&results_dir, form, Language::Fr), revised)?;
    let mut en = TableBlock::parse(&en_doc.text, common.min_cells)
        .with_context(|| format!("parse table: {}", en_doc.path.display()))?;
    let mut fr = TableBlock::parse(&fr_doc.text, common.min_cells)
        .with_context(|| format!("parse table: {}", fr_doc.path.display()))?;
    summary.documents_processed += 2;

    let outcome = reconcile(form, &mut en, &mut fr);
    summary.warnings += outcome.warnings.len();
    if outcome.changes.is_empty() {
        tracing::info!(form, "parity: no changes");
        return Ok(());
    }

    tracing::info!(
        form,
        changes = outcome.changes.len(),
        dry_run = common.dry_run,
        "parity: changes"
    );
    if !common.dry_run {
        en_doc.save(&en.splice_into(&en_doc.text))?;
        fr_doc.save(&fr.splice_into(&fr_doc.text))?;
        summary.documents_written += 2;
    }
    summary.changes.extend(outcome.changes);
    Ok(())
}

fn load_revised(path: &Path, revised: &RevisedText) -> anyhow::Result<Document> {
    let mut doc = Document::load(path)?;
    if let Some(text) = revised.get(path) {
        doc.text.clone_from(text);
    }
    Ok(doc)
}
