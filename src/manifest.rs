use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;

use crate::language::Language;

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid pattern"));

/// Form slugs listed in a manifest, in file order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub forms: Vec<String>,
    /// Lines that were neither blank, comments, nor usable slugs.
    pub rejected: Vec<String>,
}

pub fn read(path: &Path) -> anyhow::Result<Manifest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest: {}", path.display()))?;
    Ok(parse(&contents))
}

pub fn parse(contents: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut seen = HashSet::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !SLUG.is_match(line) {
            tracing::warn!(line = index + 1, slug = line, "invalid form slug; skipping");
            manifest.rejected.push(line.to_owned());
            continue;
        }
        if !seen.insert(line.to_owned()) {
            tracing::warn!(line = index + 1, slug = line, "duplicate form slug; skipping");
            manifest.rejected.push(line.to_owned());
            continue;
        }
        manifest.forms.push(line.to_owned());
    }

    manifest
}

/// `<results>/<slug>-table-<e|f>.htm`
pub fn document_path(results_dir: &Path, slug: &str, language: Language) -> PathBuf {
    results_dir.join(format!("{slug}-table-{}.htm", language.suffix()))
}
