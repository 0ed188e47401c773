use crate::ports::DiffProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::{Diff, DiffFormat, DiffOptions, Repository, Tree};
use std::path::{Path, PathBuf};

/// Unified diffs straight from the repository through libgit2.
///
/// - staged only: HEAD against the index
/// - base branch: the branch tip against working tree and index
/// - otherwise: HEAD against working tree and index, untracked files included
#[derive(Debug, Clone, Copy, Default)]
pub struct GitDiffProvider;

impl GitDiffProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiffProvider for GitDiffProvider {
    async fn diff(
        &self,
        path: &Path,
        staged_only: bool,
        base_branch: Option<&str>,
    ) -> Result<String> {
        let path: PathBuf = path.to_path_buf();
        let base_branch = base_branch.map(str::to_string);

        tokio::task::spawn_blocking(move || unified_diff(&path, staged_only, base_branch.as_deref()))
            .await
            .context("Diff task panicked")?
    }
}

/// Synchronous diff used by [`GitDiffProvider`].
pub fn unified_diff(path: &Path, staged_only: bool, base_branch: Option<&str>) -> Result<String> {
    let repo = Repository::discover(path)
        .with_context(|| format!("Failed to open git repository at {}", path.display()))?;

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);

    let diff = if staged_only {
        let head = head_tree(&repo);
        repo.diff_tree_to_index(head.as_ref(), None, Some(&mut opts))
            .context("Failed to diff HEAD against the index")?
    } else if let Some(branch) = base_branch {
        let tree = repo
            .revparse_single(branch)
            .and_then(|object| object.peel_to_tree())
            .with_context(|| format!("Unknown base branch '{}'", branch))?;
        repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))
            .with_context(|| format!("Failed to diff against {}", branch))?
    } else {
        let head = head_tree(&repo);
        repo.diff_tree_to_workdir_with_index(head.as_ref(), Some(&mut opts))
            .context("Failed to diff HEAD against the working tree")?
    };

    render_patch(&diff)
}

/// HEAD's tree, or `None` on an unborn branch.
fn head_tree(repo: &Repository) -> Option<Tree<'_>> {
    repo.head().ok().and_then(|head| head.peel_to_tree().ok())
}

fn render_patch(diff: &Diff<'_>) -> Result<String> {
    let mut buf = Vec::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if let origin @ ('+' | '-' | ' ') = line.origin() {
            buf.push(origin as u8);
        }
        buf.extend_from_slice(line.content());
        true
    })
    .context("Failed to render diff")?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{IndexAddOption, Signature};
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (Repository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        (repo, dir)
    }

    fn stage_all(repo: &Repository) {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
    }

    fn commit_all(repo: &Repository, message: &str) {
        stage_all(repo);
        let mut index = repo.index().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("test", "test@test.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }

    #[test]
    fn test_diff_shows_working_tree_changes() {
        let (repo, dir) = setup_repo();
        fs::write(dir.path().join("lib.rs"), "fn old() {}\n").unwrap();
        commit_all(&repo, "initial");

        fs::write(dir.path().join("lib.rs"), "fn new() {}\n").unwrap();
        fs::write(dir.path().join("added.rs"), "fn added() {}\n").unwrap();

        let diff = unified_diff(dir.path(), false, None).unwrap();

        assert!(diff.contains("-fn old() {}"));
        assert!(diff.contains("+fn new() {}"));
        assert!(diff.contains("+fn added() {}"));
    }

    #[test]
    fn test_staged_only_ignores_unstaged_edits() {
        let (repo, dir) = setup_repo();
        fs::write(dir.path().join("lib.rs"), "one\n").unwrap();
        commit_all(&repo, "initial");

        fs::write(dir.path().join("lib.rs"), "two\n").unwrap();
        assert_eq!(unified_diff(dir.path(), true, None).unwrap(), "");

        stage_all(&repo);
        let staged = unified_diff(dir.path(), true, None).unwrap();
        assert!(staged.contains("+two"));
    }

    #[test]
    fn test_base_branch_diff_includes_committed_work() {
        let (repo, dir) = setup_repo();
        fs::write(dir.path().join("lib.rs"), "base\n").unwrap();
        commit_all(&repo, "initial");
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("base", &head, false).unwrap();

        fs::write(dir.path().join("lib.rs"), "feature\n").unwrap();
        commit_all(&repo, "feature work");

        assert_eq!(unified_diff(dir.path(), false, None).unwrap(), "");
        let diff = unified_diff(dir.path(), false, Some("base")).unwrap();
        assert!(diff.contains("-base"));
        assert!(diff.contains("+feature"));
    }

    #[test]
    fn test_unknown_base_branch_is_error() {
        let (repo, dir) = setup_repo();
        fs::write(dir.path().join("lib.rs"), "x\n").unwrap();
        commit_all(&repo, "initial");

        let err = unified_diff(dir.path(), false, Some("nope")).unwrap_err();
        assert!(err.to_string().contains("Unknown base branch 'nope'"));
    }

    #[test]
    fn test_unborn_branch_diffs_everything() {
        let (_repo, dir) = setup_repo();
        fs::write(dir.path().join("first.txt"), "hello\n").unwrap();

        let diff = unified_diff(dir.path(), false, None).unwrap();
        assert!(diff.contains("+hello"));
    }

    #[tokio::test]
    async fn test_provider_fails_outside_repository() {
        let dir = tempdir().unwrap();
        let result = GitDiffProvider::new().diff(dir.path(), false, None).await;
        assert!(result.is_err());
    }
}
