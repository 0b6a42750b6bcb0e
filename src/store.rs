use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};

/// How the bytes on disk map to the in-memory text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// Any non-UTF-8 input. Each byte is held as the char with the same
    /// value, so writing back reproduces the original bytes exactly.
    SingleByte,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub encoding: TextEncoding,
}

impl Document {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read document: {}", path.display()))?;
        let (text, encoding) = match String::from_utf8(bytes) {
            Ok(text) => (text, TextEncoding::Utf8),
            Err(err) => {
                let text = err.into_bytes().into_iter().map(char::from).collect();
                (text, TextEncoding::SingleByte)
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            text,
            encoding,
        })
    }

    pub fn encode(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        match self.encoding {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::SingleByte => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch)).map_err(|_| {
                        anyhow::anyhow!(
                            "character {ch:?} cannot be written to single-byte document: {}",
                            self.path.display()
                        )
                    })
                })
                .collect(),
        }
    }

    /// Backs up the current file, then replaces it with `text` in the
    /// document's original encoding. Returns the backup path.
    pub fn save(&self, text: &str) -> anyhow::Result<PathBuf> {
        let bytes = self.encode(text)?;
        let backup = backup(&self.path, Utc::now())?;
        write_replacing(&self.path, &bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            backup = %backup.display(),
            "document written"
        );
        Ok(backup)
    }
}

/// `<path>.bak-YYYYMMDDTHHMMSSZ`, with `-N` appended if that name is taken.
pub fn backup_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    let base = format!("{}.bak-{stamp}", path.display());
    let mut candidate = PathBuf::from(&base);
    let mut n = 1usize;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

pub fn backup(path: &Path, now: DateTime<Utc>) -> anyhow::Result<PathBuf> {
    let backup = backup_path(path, now);
    std::fs::copy(path, &backup)
        .with_context(|| format!("back up {} to {}", path.display(), backup.display()))?;
    Ok(backup)
}

fn write_replacing(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path)
        .with_context(|| format!("stat document: {}", path.display()))?
        .permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("create temp file in {}", parent_dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.flush().context("flush temp file")?;
    std::fs::set_permissions(tmp.path(), permissions)
        .with_context(|| format!("copy permissions for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("replace document: {}", path.display()))?;
    Ok(())
}
