use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use anyhow::Context as _;

use crate::formats::ChangeRecord;

/// Running totals for one invocation, threaded through every pass.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub forms: usize,
    pub documents_processed: usize,
    pub documents_written: usize,
    pub links_checked: usize,
    pub warnings: usize,
    pub fatal_errors: usize,
    pub changes: Vec<ChangeRecord>,
}

impl RunSummary {
    pub fn cells_changed(&self) -> usize {
        self.changes.len()
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.fatal_errors > 0
    }

    /// Appends the change records as JSON Lines.
    pub fn append_change_log(&self, path: &Path) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open change log: {}", path.display()))?;
        let mut out = BufWriter::new(file);
        for record in &self.changes {
            serde_json::to_writer(&mut out, record).context("serialize change record")?;
            out.write_all(b"\n").context("write change record newline")?;
        }
        out.flush().context("flush change log")?;
        Ok(())
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "forms={} documents={} written={} links_checked={} cells_changed={} warnings={} fatal_errors={}",
            self.forms,
            self.documents_processed,
            self.documents_written,
            self.links_checked,
            self.cells_changed(),
            self.warnings,
            self.fatal_errors,
        )
    }
}
