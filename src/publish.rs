use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Whether this run produced anything worth delivering.
pub fn should_publish(new_count: usize) -> bool {
    new_count > 0
}

/// Hands a freshly written feed document over to wherever subscribers read it from.
pub trait Delivery {
    async fn deliver(&mut self, path: &Path) -> Result<()>;
}

/// Publishes the feed by committing it to a git repository and pushing it to its remote.
pub struct GitDelivery {
    repo_dir: PathBuf,
}

impl GitDelivery {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    async fn git<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_dir).args(args);
        debug!(?cmd, "Running git");

        let output = cmd
            .output()
            .await
            .with_context(|| anyhow!("could not run {cmd:?}"))?;

        if !output.status.success() {
            bail!(
                "{cmd:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

impl Delivery for GitDelivery {
    #[instrument(level = "DEBUG", skip_all, fields(path = %path.display()))]
    async fn deliver(&mut self, path: &Path) -> Result<()> {
        let path = tokio::fs::canonicalize(path)
            .await
            .with_context(|| anyhow!("could not resolve `{}`", path.display()))?;
        let repo_dir = tokio::fs::canonicalize(&self.repo_dir)
            .await
            .with_context(|| {
                anyhow!(
                    "could not resolve the repository directory `{}`",
                    self.repo_dir.display()
                )
            })?;
        let file = path.strip_prefix(&repo_dir).unwrap_or(&path);
        let file_name = file.display().to_string();
        let message = format!("Actualización {file_name}");

        self.git(["pull"]).await?;
        self.git([OsStr::new("add"), file.as_os_str()]).await?;
        self.git(["commit", "-m", message.as_str()]).await?;
        self.git(["push"]).await?;

        info!("Published `{file_name}`");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_only_when_something_is_new() {
        assert!(!should_publish(0));
        assert!(should_publish(1));
        assert!(should_publish(42));
    }

    #[tokio::test]
    async fn git_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, "<rss/>").unwrap();
        let mut delivery = GitDelivery::new(dir.path());

        // not a repository, so the very first command fails.
        let result = delivery.deliver(&path).await;

        assert!(result.is_err());
    }
}
