/// Corpus file — newline-delimited tokenized messages on disk.
///
/// Every write goes through a temporary file in the corpus directory that
/// is renamed over the corpus, so a failed write leaves the previous
/// content intact. Callers serialize writers (the harvest run lock).
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus not found at {0}")]
    NotFound(PathBuf),
    #[error("corpus IO error: {0}")]
    Io(#[from] io::Error),
}

/// Owner of the on-disk corpus.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the whole corpus.
    pub fn read_all(&self) -> Result<String, CorpusError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CorpusError::NotFound(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Number of non-empty lines in the corpus.
    pub fn line_count(&self) -> Result<usize, CorpusError> {
        Ok(self.read_all()?.lines().filter(|l| !l.trim().is_empty()).count())
    }

    /// Append `lines`, each terminated by a single newline.
    ///
    /// Creates the corpus if it does not exist yet. The whole file is
    /// rewritten through a temporary copy, so each call costs one read and
    /// one write of the full corpus.
    pub fn append_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), CorpusError> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut tmp = self.temp_file()?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let existing = match fs::read(&self.path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            writer.write_all(&existing)?;
            // Keep line boundaries intact if the old file lacks a final newline.
            if existing.last().is_some_and(|b| *b != b'\n') {
                writer.write_all(b"\n")?;
            }
            for line in lines {
                writer.write_all(line.as_ref().as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        self.commit(tmp)?;
        debug!(path = %self.path.display(), lines = lines.len(), "appended to corpus");
        Ok(())
    }

    /// Replace the entire corpus with `text`.
    pub fn replace_all(&self, text: &str) -> Result<(), CorpusError> {
        let mut tmp = self.temp_file()?;
        tmp.write_all(text.as_bytes())?;
        self.commit(tmp)?;
        debug!(path = %self.path.display(), bytes = text.len(), "replaced corpus");
        Ok(())
    }

    /// Replace the corpus with `lines`, each newline-terminated.
    pub fn replace_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), CorpusError> {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
            text.push('\n');
        }
        self.replace_all(&text)
    }

    fn temp_file(&self) -> Result<NamedTempFile, CorpusError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        Ok(NamedTempFile::new_in(dir)?)
    }

    /// Rename `tmp` over the corpus, keeping the old file's permissions.
    fn commit(&self, tmp: NamedTempFile) -> Result<(), CorpusError> {
        match fs::metadata(&self.path) {
            Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
