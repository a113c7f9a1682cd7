//! Disposable working copy.
//!
//! A [`WorkingCopy`] owns an exclusively-created temporary directory and the
//! git handle bound to it. The directory is removed by [`WorkingCopy::release`]
//! on the normal path and by `Drop` on every other path (early `?` returns,
//! panics), so no run leaves a checkout behind.

use std::path::Path;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::io::git::Git;

const DIR_PREFIX: &str = "clone-";

#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
    git: Git,
}

impl WorkingCopy {
    /// Create a fresh `clone-*` directory under `root` (system temp dir if `None`).
    ///
    /// `make_git` binds the git handle (timeouts, credential) to the new path.
    pub fn acquire<F>(root: Option<&Path>, make_git: F) -> Result<Self>
    where
        F: FnOnce(&Path) -> Git,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder
                .tempdir_in(root)
                .with_context(|| format!("create working copy under {}", root.display()))?,
            None => builder.tempdir().context("create working copy")?,
        };
        debug!(path = %dir.path().display(), "working copy acquired");
        let git = make_git(dir.path());
        Ok(Self { dir, git })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Shallow-clone `branch` of `url` and return the commit it landed on.
    #[instrument(skip_all, fields(branch))]
    pub fn populate(&self, url: &str, branch: &str) -> Result<String> {
        info!(branch, "cloning working copy");
        self.git.clone_shallow(url, branch)?;
        self.git.head_commit()
    }

    /// Remove the directory now, logging (not failing) if removal fails.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "working copy removed"),
            Err(e) => warn!(path = %path.display(), err = %e, "failed to remove working copy"),
        }
    }
}
