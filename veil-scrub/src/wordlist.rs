//! Word-list loading: allowlists and denylists from the filesystem.
//!
//! One entry per line; blank lines and `#` comments are ignored; entries are
//! lowercased for case-insensitive membership tests.

use std::path::Path;

use veil_core::errors::ScrubError;
use veil_core::FxHashSet;

/// Load one file of entries.
pub fn load_file(path: &Path) -> Result<Vec<String>, ScrubError> {
    let text = std::fs::read_to_string(path).map_err(|e| ScrubError::WordList {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(parse(&text))
}

/// Load several files into one de-duplicated, order-preserving list.
pub fn load_files(paths: &[String]) -> Result<Vec<String>, ScrubError> {
    let mut seen = FxHashSet::default();
    let mut entries = Vec::new();
    for path in paths {
        for entry in load_file(Path::new(path))? {
            if seen.insert(entry.clone()) {
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}

/// Load several files into a membership set.
pub fn load_set(paths: &[String]) -> Result<FxHashSet<String>, ScrubError> {
    Ok(load_files(paths)?.into_iter().collect())
}

fn parse(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_skips_comments_and_lowercases() {
        let entries = parse("# allowlist\nThe\n\nand\nWard\n");
        assert_eq!(entries, vec!["the", "and", "ward"]);
    }

    #[test]
    fn files_merge_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        writeln!(std::fs::File::create(&a).unwrap(), "alpha\nbeta").unwrap();
        writeln!(std::fs::File::create(&b).unwrap(), "BETA\ngamma").unwrap();

        let entries = load_files(&[
            a.display().to_string(),
            b.display().to_string(),
        ])
        .unwrap();
        assert_eq!(entries, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_file(Path::new("/nonexistent/words.txt")).is_err());
    }
}
