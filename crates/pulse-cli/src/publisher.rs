//! Publishes artifacts as markdown files under the reports directory.

use std::{
  future::Future,
  path::{Path, PathBuf},
};

use pulse_core::{
  collab::{ArtifactPublisher, CollabError},
  lineage::Artifact,
};

pub struct DirectoryPublisher {
  reports_dir: PathBuf,
}

impl DirectoryPublisher {
  pub fn new(reports_dir: PathBuf) -> Self { Self { reports_dir } }

  /// `{reports_dir}/{tier}/{tier}_report_{period}.md`
  pub fn path_for(&self, artifact: &Artifact) -> PathBuf {
    let tier = artifact.tier();
    self
      .reports_dir
      .join(tier.to_string())
      .join(format!("{tier}_report_{}.md", artifact.period))
  }
}

async fn write(path: &Path, content: &str) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(path, content).await
}

impl ArtifactPublisher for DirectoryPublisher {
  fn publish<'a>(
    &'a self,
    artifact: &'a Artifact,
  ) -> impl Future<Output = Result<(), CollabError>> + Send + 'a {
    async move {
      let path = self.path_for(artifact);
      write(&path, &artifact.content)
        .await
        .map_err(|e| CollabError::Unavailable(format!("{}: {e}", path.display())))?;
      tracing::info!(path = %path.display(), "report written");
      Ok(())
    }
  }
}
