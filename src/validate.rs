use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{CommonArgs, ValidateArgs};
use crate::language::Language;
use crate::manifest::document_path;
use crate::policy::{RepairPolicy, repair_table};
use crate::probe::{HttpProber, LinkProbe};
use crate::store::Document;
use crate::summary::RunSummary;
use crate::table::TableBlock;

pub fn run(args: ValidateArgs) -> anyhow::Result<RunSummary> {
    let manifest = crate::manifest::read(Path::new(&args.common.manifest))?;
    let mut prober = HttpProber::new(args.probe.probe_config()?)?;
    let policy = args.probe.policy();

    let mut summary = RunSummary {
        forms: manifest.forms.len(),
        warnings: manifest.rejected.len(),
        ..RunSummary::default()
    };
    validate_forms(&manifest.forms, &args.common, &policy, &mut prober, &mut summary);
    tracing::info!(
        requests = prober.requests_sent(),
        urls = prober.cached_urls(),
        "validate: done"
    );

    if let Some(path) = args.common.change_log.as_deref() {
        summary.append_change_log(Path::new(path))?;
    }
    Ok(summary)
}

/// Repaired text of each changed document, keyed by path. Holds the
/// changes a dry run did not write so later passes can build on them.
pub type RevisedText = BTreeMap<PathBuf, String>;

/// Repairs every document of every form independently. A document that
/// cannot be read, parsed, or written is counted as fatal and skipped.
pub fn validate_forms(
    forms: &[String],
    common: &CommonArgs,
    policy: &RepairPolicy,
    prober: &mut dyn LinkProbe,
    summary: &mut RunSummary,
) -> RevisedText {
    let results_dir = common.results_dir();
    let mut revised = RevisedText::new();
    for form in forms {
        for language in Language::ALL {
            let path = document_path(&results_dir, form, language);
            match validate_document(&path, form, language, common, policy, prober, summary) {
                Ok(Some(text)) => {
                    revised.insert(path, text);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(form = %form, %language, "validate skipped: {err:#}");
                    summary.fatal_errors += 1;
                }
            }
        }
    }
    revised
}

fn validate_document(
    path: &Path,
    form: &str,
    language: Language,
    common: &CommonArgs,
    policy: &RepairPolicy,
    prober: &mut dyn LinkProbe,
    summary: &mut RunSummary,
) -> anyhow::Result<Option<String>> {
    let doc = Document::load(path)?;
    let mut block = TableBlock::parse(&doc.text, common.min_cells)
        .with_context(|| format!("parse table: {}", path.display()))?;
    if block.skipped_rows() > 0 {
        tracing::debug!(
            form,
            %language,
            skipped = block.skipped_rows(),
            "under-sized rows ignored"
        );
    }
    summary.documents_processed += 1;

    let outcome = repair_table(&mut block, form, language, policy, prober);
    summary.links_checked += outcome.tally.checked;
    summary.warnings += outcome.tally.unverified;
    tracing::info!(
        form,
        %language,
        checked = outcome.tally.checked,
        replaced = outcome.tally.replaced,
        blanked = outcome.tally.blanked,
        unverified = outcome.tally.unverified,
        "validate: document"
    );

    if outcome.changes.is_empty() {
        return Ok(None);
    }
    let text = block.splice_into(&doc.text);
    if !common.dry_run {
        let backup = doc.save(&text)?;
        tracing::info!(path = %path.display(), backup = %backup.display(), "document repaired");
        summary.documents_written += 1;
    }
    summary.changes.extend(outcome.changes);
    Ok(Some(text))
}
