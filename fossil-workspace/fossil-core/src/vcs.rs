//! Version-control collaborator.
//!
//! The store never shells out directly; it asks a [`VersionControl`] for the
//! commit, branch, author and working-tree changes. [`GitCli`] is the real
//! implementation, [`StaticVcs`] an in-memory one for tests and dry runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use crate::error::{FossilError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Untracked => "untracked",
        }
    }

    /// Map a `git diff --name-status` letter (`A`, `M`, `R100`, …).
    fn from_status(status: &str) -> ChangeKind {
        match status.chars().next() {
            Some('A') | Some('C') => ChangeKind::Added,
            Some('D') => ChangeKind::Deleted,
            Some('R') => ChangeKind::Renamed,
            _ => ChangeKind::Modified,
        }
    }
}

/// One changed path, repository-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

pub trait VersionControl: Send + Sync {
    fn current_commit_hash(&self) -> Result<String>;
    fn current_branch(&self) -> Result<String>;
    fn author(&self) -> Result<Author>;
    /// Paths are relative to the repository top.
    fn staged_files(&self) -> Result<Vec<FileChange>>;
    /// Unstaged modifications plus untracked files, repository-relative.
    fn unstaged_files(&self) -> Result<Vec<FileChange>>;

    /// Repository-relative path of the working directory, when the
    /// collaborator knows it. `None` leaves the choice to the caller.
    fn workdir_prefix(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// `git` subprocess implementation rooted at a working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.workdir)
            .args(args)
            .output()
            .map_err(|e| FossilError::io(&self.workdir, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FossilError::io(
                &self.workdir,
                std::io::Error::other(format!(
                    "git {} failed ({}): {}",
                    args.join(" "),
                    output.status,
                    stderr.trim()
                )),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitCli {
    fn current_commit_hash(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn author(&self) -> Result<Author> {
        Ok(Author {
            name: self.run(&["config", "user.name"])?,
            email: self.run(&["config", "user.email"])?,
        })
    }

    fn staged_files(&self) -> Result<Vec<FileChange>> {
        Ok(parse_name_status(&self.run(&["diff", "--cached", "--name-status"])?))
    }

    fn unstaged_files(&self) -> Result<Vec<FileChange>> {
        let mut out = parse_name_status(&self.run(&["diff", "--name-status"])?);
        // ls-files is cwd-relative unless asked for full names; diff never is.
        let untracked = self.run(&["ls-files", "--others", "--exclude-standard", "--full-name"])?;
        out.extend(
            untracked
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| FileChange::new(l, ChangeKind::Untracked)),
        );
        Ok(out)
    }

    fn workdir_prefix(&self) -> Result<Option<PathBuf>> {
        let prefix = self.run(&["rev-parse", "--show-prefix"])?;
        Ok(Some(PathBuf::from(prefix.trim_end_matches('/'))))
    }
}

/// Parse `git diff --name-status` output. Renames report the destination path.
pub fn parse_name_status(text: &str) -> Vec<FileChange> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split('\t');
        let status = parts.next().unwrap_or_default().trim();
        let Some(path) = parts.last() else { continue };
        if status.is_empty() || path.is_empty() {
            continue;
        }
        out.push(FileChange::new(path, ChangeKind::from_status(status)));
    }
    out
}

/// In-memory collaborator with settable state.
#[derive(Debug)]
pub struct StaticVcs {
    state: Mutex<StaticState>,
}

#[derive(Debug, Clone)]
struct StaticState {
    commit: Option<String>,
    branch: Option<String>,
    author: Option<Author>,
    staged: Vec<FileChange>,
    unstaged: Vec<FileChange>,
}

impl StaticVcs {
    pub fn new(commit: &str, branch: &str) -> Self {
        Self {
            state: Mutex::new(StaticState {
                commit: Some(commit.to_string()),
                branch: Some(branch.to_string()),
                author: Some(Author {
                    name: "Fossil Tester".to_string(),
                    email: "tester@example.com".to_string(),
                }),
                staged: Vec::new(),
                unstaged: Vec::new(),
            }),
        }
    }

    /// A collaborator where every lookup fails, as outside a git checkout.
    pub fn unavailable() -> Self {
        Self {
            state: Mutex::new(StaticState {
                commit: None,
                branch: None,
                author: None,
                staged: Vec::new(),
                unstaged: Vec::new(),
            }),
        }
    }

    pub fn set_commit(&self, commit: &str) {
        self.lock().commit = Some(commit.to_string());
    }

    pub fn set_staged(&self, changes: Vec<FileChange>) {
        self.lock().staged = changes;
    }

    pub fn set_unstaged(&self, changes: Vec<FileChange>) {
        self.lock().unstaged = changes;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StaticState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn missing(what: &str) -> FossilError {
        FossilError::io(
            PathBuf::from("<static-vcs>"),
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no {what} available")),
        )
    }
}

impl VersionControl for StaticVcs {
    fn current_commit_hash(&self) -> Result<String> {
        self.lock().commit.clone().ok_or_else(|| Self::missing("commit"))
    }

    fn current_branch(&self) -> Result<String> {
        self.lock().branch.clone().ok_or_else(|| Self::missing("branch"))
    }

    fn author(&self) -> Result<Author> {
        self.lock().author.clone().ok_or_else(|| Self::missing("author"))
    }

    fn staged_files(&self) -> Result<Vec<FileChange>> {
        Ok(self.lock().staged.clone())
    }

    fn unstaged_files(&self) -> Result<Vec<FileChange>> {
        Ok(self.lock().unstaged.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_status_maps_kinds_and_rename_targets() {
        let text = "M\t.fossils/canonical/test.json\nA\tsrc/new.rs\nR087\told/a.json\tnew/a.json\nD\tgone.txt\n";
        let got = parse_name_status(text);
        assert_eq!(
            got,
            vec![
                FileChange::new(".fossils/canonical/test.json", ChangeKind::Modified),
                FileChange::new("src/new.rs", ChangeKind::Added),
                FileChange::new("new/a.json", ChangeKind::Renamed),
                FileChange::new("gone.txt", ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn unavailable_vcs_errors_but_lists_nothing() {
        let vcs = StaticVcs::unavailable();
        assert!(vcs.current_commit_hash().is_err());
        assert!(vcs.staged_files().unwrap().is_empty());
    }
}
