use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile};

use crate::domain::{QueryId, Source};
use crate::error::KiraError;

/// Directory holding one output file per successful query.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn from_path(path: &Path) -> Result<Self, KiraError> {
        let root = Utf8PathBuf::from_path_buf(path.to_path_buf())
            .map_err(|_| KiraError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn output_path(&self, id: &QueryId, source: Source) -> Utf8PathBuf {
        self.root
            .join(format!("{}.{}", id.as_str(), source.result_suffix()))
    }

    pub fn ensure(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// Hidden temp file next to the final outputs so the promotion is a
    /// same-filesystem rename. Removed on drop unless persisted.
    pub fn temp_file(&self, id: &QueryId) -> Result<NamedTempFile, KiraError> {
        Builder::new()
            .prefix(&format!(".{}.", id.as_str()))
            .suffix(".tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn persist(temp: NamedTempFile, destination: &Utf8Path) -> Result<(), KiraError> {
        temp.persist(destination.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("persist {destination}: {}", err.error)))?;
        Ok(())
    }

    /// Existing outputs for `source`, sorted by file name.
    pub fn list_outputs(&self, source: Source) -> Result<Vec<Utf8PathBuf>, KiraError> {
        let suffix = format!(".{}", source.result_suffix());
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", self.root)))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let is_output = path
                .file_name()
                .map(|name| name.ends_with(&suffix) && !name.starts_with('.'))
                .unwrap_or(false);
            if is_output && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Query id encoded in an output file name, e.g. `id1` for `id1.read_run.tsv`.
pub fn query_id_from_output(path: &Utf8Path, source: Source) -> Option<String> {
    let suffix = format!(".{}", source.result_suffix());
    path.file_name()
        .and_then(|name| name.strip_suffix(&suffix))
        .map(|id| id.to_string())
}

/// Number of non-blank lines. A header-only response counts as one.
pub fn count_lines(path: &Path) -> Result<usize, KiraError> {
    let file = File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut count = 0usize;
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if line.iter().any(|byte| !byte.is_ascii_whitespace()) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = OutputLayout::new(Utf8PathBuf::from("raw_data/ena/per_query"));
        let id: QueryId = "gut_wgs".parse().unwrap();
        assert_eq!(
            layout.output_path(&id, Source::Ena),
            Utf8PathBuf::from("raw_data/ena/per_query/gut_wgs.read_run.tsv")
        );
        assert!(
            layout
                .output_path(&id, Source::Sra)
                .ends_with("gut_wgs.runinfo.csv")
        );
    }

    #[test]
    fn count_lines_ignores_blank_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("runinfo.csv");
        fs::write(&path, "Run,spots\nSRR1,10\n\nSRR2,20\n\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 3);
        fs::write(&path, "Run,spots\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 1);
        fs::write(&path, "").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 0);
    }

    #[test]
    fn list_outputs_skips_temp_and_foreign_files() {
        let temp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_path(temp.path()).unwrap();
        fs::write(temp.path().join("b.read_run.tsv"), "h\n").unwrap();
        fs::write(temp.path().join("a.read_run.tsv"), "h\n").unwrap();
        fs::write(temp.path().join(".c.read_run.tsv"), "h\n").unwrap();
        fs::write(temp.path().join("d.runinfo.csv"), "h\n").unwrap();

        let outputs = layout.list_outputs(Source::Ena).unwrap();
        let ids: Vec<_> = outputs
            .iter()
            .filter_map(|path| query_id_from_output(path, Source::Ena))
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
