//! 🏋️ The huge-files report — which artifacts are eating the disk.
//!
//! Walks the extracts tree, collects every `.xml` artifact, and hands back
//! the N largest. Useful after a sync to sanity-check the size cap, or to
//! discover that one country has *opinions* about business-card volume.
//!
//! 🧠 The walk is plain recursive std::fs — the tree is two levels deep
//! (country dirs, then artifacts), so anything fancier would be cosplay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// 📦 One oversized-artifact candidate: size first, because that's what
/// everyone sorts by anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HugeFile {
    pub size: u64,
    pub path: PathBuf,
}

fn collect_xml(dir: &Path, into: &mut Vec<HugeFile>) -> Result<()> {
    let entries = std::fs::read_dir(dir).context(format!(
        "💀 Could not read '{}'. The extracts tree is playing hard to get.",
        dir.display()
    ))?;
    for entry in entries {
        let entry = entry.context(format!(
            "💀 A directory entry under '{}' refused to identify itself.",
            dir.display()
        ))?;
        let path = entry.path();
        if path.is_dir() {
            collect_xml(&path, into)?;
        } else if path.extension().is_some_and(|ext| ext == "xml") {
            let size = entry
                .metadata()
                .context(format!("💀 No metadata for '{}'. Rude.", path.display()))?
                .len();
            into.push(HugeFile { size, path });
        }
    }
    Ok(())
}

/// 🔍 The `n` largest `.xml` files under `extracts_dir`, biggest first.
/// Ties break on path so the output is stable run to run.
pub(crate) fn largest_files(extracts_dir: &Path, n: usize) -> Result<Vec<HugeFile>> {
    if !extracts_dir.exists() {
        // no extracts yet is an answer, not an error
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    collect_xml(extracts_dir, &mut files)?;
    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    files.truncate(n);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(dir: &Path, rel: &str, len: usize) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "x".repeat(len)).expect("write");
        path
    }

    #[test]
    fn the_one_where_the_biggest_artifacts_float_to_the_top() {
        let dir = tempfile::tempdir().expect("tempdir");
        let big = seed(dir.path(), "DE/business-cards.000001.xml", 300);
        let medium = seed(dir.path(), "BE/business-cards.000002.xml", 200);
        seed(dir.path(), "BE/business-cards.000001.xml", 100);
        // non-xml debris must not show up in the report
        seed(dir.path(), "BE/notes.txt", 9000);

        let report = largest_files(dir.path(), 2).expect("walk should succeed");
        assert_eq!(report.len(), 2);
        assert_eq!(report[0], HugeFile { size: 300, path: big });
        assert_eq!(report[1], HugeFile { size: 200, path: medium });
    }

    #[test]
    fn the_one_where_an_absent_tree_reports_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report =
            largest_files(&dir.path().join("never-synced"), 10).expect("absent tree is fine");
        assert!(report.is_empty());
    }
}
