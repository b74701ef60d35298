use std::path::{Path, PathBuf};

use eyre::Result;
use futures::future::join_all;
use tokio::fs::create_dir_all;

/// Maps logical artifact names onto the filesystem.
///
/// Shared artifacts (the combined table, aggregate charts) live under
/// `shared`, per-run artifacts under `runs/<result id>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLayout {
    pub shared: PathBuf,
    pub runs: PathBuf,
}

impl ResultLayout {
    pub fn new(shared: impl Into<PathBuf>, runs: impl Into<PathBuf>) -> Self {
        Self {
            shared: shared.into(),
            runs: runs.into(),
        }
    }

    /// Layout of a results folder, ie. `<folder>/plots` and `<folder>/data`
    pub fn for_folder(folder: &Path) -> Self {
        Self::new(folder.join("plots"), folder.join("data"))
    }

    pub fn common_file(&self, name: &str) -> PathBuf {
        self.shared.join(name)
    }

    pub fn result_file(&self, id: &str, name: &str) -> PathBuf {
        self.runs.join(id).join(name)
    }
}

pub async fn ensure_dirs(dirs: &[PathBuf]) -> Result<()> {
    let create_jobs = dirs.iter().map(create_dir_all);
    for res in join_all(create_jobs).await {
        res?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_and_run_namespaces() {
        let layout = ResultLayout::for_folder(Path::new("results/ssd"));
        assert_eq!(
            layout.common_file("allresults.tsv"),
            PathBuf::from("results/ssd/plots/allresults.tsv")
        );
        assert_eq!(
            layout.result_file("run-3", "iostat.tsv"),
            PathBuf::from("results/ssd/data/run-3/iostat.tsv")
        );
    }

    #[tokio::test]
    async fn creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().join("a/b"), dir.path().join("c")];
        ensure_dirs(&dirs).await.unwrap();
        assert!(dirs.iter().all(|x| x.is_dir()));
    }
}
