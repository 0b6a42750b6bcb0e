use std::path::Path;

use crate::cli::RepairArgs;
use crate::probe::HttpProber;
use crate::summary::RunSummary;

/// `validate` followed by `parity`, sharing one probe cache and one summary.
/// Parity sees the validated text even when a dry run left the files alone.
pub fn run(args: RepairArgs) -> anyhow::Result<RunSummary> {
    let manifest = crate::manifest::read(Path::new(&args.common.manifest))?;
    let mut prober = HttpProber::new(args.probe.probe_config()?)?;
    let policy = args.probe.policy();

    let mut summary = RunSummary {
        forms: manifest.forms.len(),
        warnings: manifest.rejected.len(),
        ..RunSummary::default()
    };

    tracing::info!(forms = manifest.forms.len(), "repair: validate");
    let revised = crate::validate::validate_forms(
        &manifest.forms,
        &args.common,
        &policy,
        &mut prober,
        &mut summary,
    );

    tracing::info!("repair: parity");
    crate::parity::reconcile_forms(&manifest.forms, &args.common, &revised, &mut summary);

    if let Some(path) = args.common.change_log.as_deref() {
        summary.append_change_log(Path::new(path))?;
    }
    Ok(summary)
}
