// ============================================================
// Layer 2 — Upload Use Case
// ============================================================
// Publishes trained model directories to the model registry.
//
// For each (local dir, repo id) target:
//   missing dir      → warning, skipped
//   otherwise        → list files (checkpoints and training
//                      args excluded), print them with sizes,
//                      upload in one commit

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::domain::traits::ModelRegistry;
use crate::infra::hub::list_upload_files;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub local_path: PathBuf,
    pub repo_id:    String,
}

impl From<&Config> for UploadTarget {
    fn from(cfg: &Config) -> Self {
        Self {
            local_path: PathBuf::from(&cfg.paths.model_dir),
            repo_id:    cfg.paths.hf_repo_id(),
        }
    }
}

pub struct UploadUseCase {
    targets: Vec<UploadTarget>,
}

impl UploadUseCase {
    pub fn new(targets: Vec<UploadTarget>) -> Self {
        Self { targets }
    }

    /// Upload every target that exists. Returns how many were uploaded.
    pub fn execute(&self, registry: &dyn ModelRegistry) -> Result<usize> {
        let mut uploaded = 0usize;

        for target in &self.targets {
            let dir = &target.local_path;
            if !dir.is_dir() {
                tracing::warn!("Model directory '{}' not found, skipping", dir.display());
                continue;
            }

            let files = list_upload_files(dir)?;
            println!("\nUploading '{}' → {}", dir.display(), target.repo_id);
            for f in &files {
                println!("  {:<40} {:>10.2} MB", f.relative, f.size as f64 / (1024.0 * 1024.0));
            }

            registry.upload_folder(dir, &target.repo_id, &files)?;
            tracing::info!("Uploaded {} files to '{}'", files.len(), target.repo_id);
            uploaded += 1;
        }

        Ok(uploaded)
    }
}
