// ============================================================
// Layer 6 — Hugging Face Hub Client
// ============================================================
// Implements `ModelRegistry` against the Hugging Face Hub.
//
// Download: hf-hub's sync API, which caches snapshots under
//           ~/.cache/huggingface and returns local paths.
//
// Upload:   the Hub's HTTP commit API, in three steps
//             1. preupload   — Hub decides "regular" vs "lfs" per file
//             2. LFS batch   — large files are PUT straight to storage
//                              (sha256 oid), then verified
//             3. commit      — one NDJSON request listing every file;
//                              small files inline as base64,
//                              LFS files by oid
//
// Authentication: `HF_TOKEN` (required for upload, optional for
// public downloads).

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::traits::{ModelRegistry, UploadFile};
use crate::infra::checkpoint::CHECKPOINT_PREFIX;

const HF_ENDPOINT:    &str = "https://huggingface.co";
const REVISION:       &str = "main";
const SAMPLE_BYTES:   usize = 512;
const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Training-state files never published with a model.
const SKIPPED_FILES: &[&str] = &["training_args.json", "training_args.bin"];

pub struct HubClient {
    endpoint: String,
    token:    Option<String>,
    http:     reqwest::blocking::Client,
}

impl HubClient {
    /// Endpoint from `HF_ENDPOINT` (default huggingface.co), token from
    /// `HF_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("HF_ENDPOINT").unwrap_or_else(|_| HF_ENDPOINT.to_string());
        let token    = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
        Self::new(endpoint, token)
    }

    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(3600))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .context("HF_TOKEN is not set; an access token with write permission is required")
    }

    fn preupload(&self, repo_id: &str, files: &[UploadFile]) -> Result<HashMap<String, UploadMode>> {
        let mut entries = Vec::with_capacity(files.len());
        for f in files {
            entries.push(serde_json::json!({
                "path":   f.relative,
                "size":   f.size,
                "sample": base64_sample(&f.absolute)?,
            }));
        }

        let url  = format!("{}/api/models/{}/preupload/{}", self.endpoint, repo_id, REVISION);
        let resp: PreuploadResponse = self
            .http
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&serde_json::json!({ "files": entries }))
            .send()
            .with_context(|| format!("preupload request to '{url}' failed"))?
            .error_for_status()
            .with_context(|| format!("preupload rejected for '{repo_id}'"))?
            .json()
            .context("invalid preupload response")?;

        Ok(resp.files.into_iter().map(|f| (f.path, f.upload_mode)).collect())
    }

    fn upload_lfs(&self, repo_id: &str, file: &UploadFile, oid: &str) -> Result<()> {
        let url  = format!("{}/{}.git/info/lfs/objects/batch", self.endpoint, repo_id);
        let body = serde_json::json!({
            "operation": "upload",
            "transfers": ["basic"],
            "hash_algo": "sha256",
            "objects":   [{ "oid": oid, "size": file.size }],
        });

        let resp: LfsBatchResponse = self
            .http
            .post(&url)
            .bearer_auth(self.token()?)
            .header(reqwest::header::ACCEPT, LFS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_MEDIA_TYPE)
            .body(body.to_string())
            .send()
            .with_context(|| format!("LFS batch request for '{}' failed", file.relative))?
            .error_for_status()
            .with_context(|| format!("LFS batch rejected for '{}'", file.relative))?
            .json()
            .context("invalid LFS batch response")?;

        let Some(object) = resp.objects.into_iter().next() else {
            bail!("LFS batch response for '{}' has no objects", file.relative);
        };
        if let Some(err) = object.error {
            bail!("LFS error for '{}': {} ({})", file.relative, err.message, err.code);
        }

        // No actions means the object is already stored
        let Some(actions) = object.actions else {
            tracing::info!("'{}' already on the Hub, skipping transfer", file.relative);
            return Ok(());
        };

        if let Some(upload) = actions.upload {
            let bytes = fs::read(&file.absolute)
                .with_context(|| format!("Cannot read '{}'", file.absolute.display()))?;
            let mut req = self.http.put(&upload.href).body(bytes);
            for (k, v) in &upload.header {
                req = req.header(k.as_str(), v.as_str());
            }
            req.send()
                .with_context(|| format!("LFS upload of '{}' failed", file.relative))?
                .error_for_status()
                .with_context(|| format!("LFS upload of '{}' rejected", file.relative))?;
        }

        if let Some(verify) = actions.verify {
            let mut req = self
                .http
                .post(&verify.href)
                .bearer_auth(self.token()?)
                .json(&serde_json::json!({ "oid": oid, "size": file.size }));
            for (k, v) in &verify.header {
                req = req.header(k.as_str(), v.as_str());
            }
            req.send()
                .with_context(|| format!("LFS verify of '{}' failed", file.relative))?
                .error_for_status()
                .with_context(|| format!("LFS verify of '{}' rejected", file.relative))?;
        }
        Ok(())
    }

    fn commit(&self, repo_id: &str, payload: String) -> Result<()> {
        let url = format!("{}/api/models/{}/commit/{}", self.endpoint, repo_id, REVISION);
        self.http
            .post(&url)
            .bearer_auth(self.token()?)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()
            .with_context(|| format!("commit request to '{url}' failed"))?
            .error_for_status()
            .with_context(|| format!("commit rejected for '{repo_id}'"))?;
        Ok(())
    }
}

impl ModelRegistry for HubClient {
    fn fetch(&self, repo_id: &str, files: &[&str]) -> Result<PathBuf> {
        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_token(self.token.clone())
            .build()
            .context("Failed to initialise the Hugging Face Hub API")?;
        let repo = api.model(repo_id.to_string());

        let mut snapshot: Option<PathBuf> = None;
        for name in files {
            let path = repo
                .get(name)
                .with_context(|| format!("Cannot download '{name}' from '{repo_id}'"))?;
            tracing::debug!("Fetched {}/{} → {}", repo_id, name, path.display());
            if snapshot.is_none() {
                snapshot = path.parent().map(Path::to_path_buf);
            }
        }
        snapshot.with_context(|| format!("No files requested from '{repo_id}'"))
    }

    fn upload_folder(&self, folder: &Path, repo_id: &str, files: &[UploadFile]) -> Result<()> {
        if files.is_empty() {
            bail!("nothing to upload from '{}'", folder.display());
        }

        let modes = self.preupload(repo_id, files)?;
        let mut ops = Vec::with_capacity(files.len());

        for f in files {
            let mode = modes.get(&f.relative).copied().unwrap_or(UploadMode::Regular);
            match mode {
                UploadMode::Lfs => {
                    let oid = sha256_file(&f.absolute)?;
                    tracing::info!("Uploading '{}' via LFS ({})", f.relative, &oid[..12]);
                    self.upload_lfs(repo_id, f, &oid)?;
                    ops.push(CommitOp::Lfs { path: f.relative.clone(), oid, size: f.size });
                }
                UploadMode::Regular => {
                    let bytes = fs::read(&f.absolute)
                        .with_context(|| format!("Cannot read '{}'", f.absolute.display()))?;
                    ops.push(CommitOp::Inline { path: f.relative.clone(), content: bytes });
                }
            }
        }

        let summary = format!("Upload model from {}", folder.display());
        self.commit(repo_id, commit_payload(&summary, &ops))?;
        Ok(())
    }
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
struct PreuploadFile {
    path:        String,
    #[serde(rename = "uploadMode")]
    upload_mode: UploadMode,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    actions: Option<LfsActions>,
    error:   Option<LfsError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href:   String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsError {
    code:    i64,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommitOp {
    Inline { path: String, content: Vec<u8> },
    Lfs { path: String, oid: String, size: u64 },
}

/// NDJSON body of a commit: a header line, then one line per file.
fn commit_payload(summary: &str, ops: &[CommitOp]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut lines = vec![serde_json::json!({
        "key":   "header",
        "value": { "summary": summary, "description": "" },
    })];

    for op in ops {
        lines.push(match op {
            CommitOp::Inline { path, content } => serde_json::json!({
                "key":   "file",
                "value": { "path": path, "content": b64.encode(content), "encoding": "base64" },
            }),
            CommitOp::Lfs { path, oid, size } => serde_json::json!({
                "key":   "lfsFile",
                "value": { "path": path, "algo": "sha256", "oid": oid, "size": size },
            }),
        });
    }

    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn base64_sample(path: &Path) -> Result<String> {
    use std::io::Read;
    let mut buf = Vec::with_capacity(SAMPLE_BYTES);
    fs::File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?
        .take(SAMPLE_BYTES as u64)
        .read_to_end(&mut buf)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

// ─── Model Resolution ────────────────────────────────────────────────────────

/// A model reference is either a local directory or a hub repo id
/// ("gpt2", "org/name"). Local directories win; anything else is
/// fetched through `registry`.
pub fn resolve_model_dir(reference: &str, files: &[&str], registry: &dyn ModelRegistry) -> Result<PathBuf> {
    let local = Path::new(reference);
    if local.is_dir() {
        let missing: Vec<&str> = files
            .iter()
            .copied()
            .filter(|f| !local.join(f).exists())
            .collect();
        if !missing.is_empty() {
            bail!("'{}' is missing {}", local.display(), missing.join(", "));
        }
        tracing::info!("Using local model directory '{}'", local.display());
        return Ok(local.to_path_buf());
    }

    tracing::info!("Fetching '{}' from the model hub", reference);
    registry.fetch(reference, files)
}

// ─── Upload File Listing ─────────────────────────────────────────────────────

/// Every file under `folder` that should be published, skipping
/// `checkpoint-*` directories and training-state files. Sorted by
/// relative path, which always uses `/` separators.
pub fn list_upload_files(folder: &Path) -> Result<Vec<UploadFile>> {
    let mut out = Vec::new();
    walk(folder, folder, &mut out)?;
    out.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<UploadFile>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read '{}'", dir.display()))? {
        let entry = entry?;
        let path  = entry.path();
        let name  = entry.file_name().to_string_lossy().to_string();

        if entry.file_type()?.is_dir() {
            if name.starts_with(CHECKPOINT_PREFIX) {
                continue;
            }
            walk(root, &path, out)?;
            continue;
        }
        if SKIPPED_FILES.contains(&name.as_str()) {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        out.push(UploadFile {
            relative,
            size: entry.metadata()?.len(),
            absolute: path,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_skips_checkpoints_and_training_args() {
        let tmp  = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("config.json"), "{}").unwrap();
        fs::write(root.join("rust_model.ot"), vec![0u8; 2048]).unwrap();
        fs::write(root.join("training_args.json"), "{}").unwrap();
        fs::write(root.join("training_args.bin"), "x").unwrap();
        fs::create_dir_all(root.join("checkpoint-500")).unwrap();
        fs::write(root.join("checkpoint-500/rust_model.ot"), "x").unwrap();
        fs::create_dir_all(root.join("extra")).unwrap();
        fs::write(root.join("extra/notes.txt"), "hi").unwrap();

        let files = list_upload_files(root).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["config.json", "extra/notes.txt", "rust_model.ot"]);
        assert_eq!(files[2].size, 2048);
    }

    #[test]
    fn test_commit_payload_lines() {
        let ops = vec![
            CommitOp::Inline { path: "config.json".into(), content: b"{}".to_vec() },
            CommitOp::Lfs { path: "rust_model.ot".into(), oid: "abc".into(), size: 3 },
        ];
        let payload = commit_payload("msg", &ops);
        let lines: Vec<serde_json::Value> = payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[0]["value"]["summary"], "msg");
        assert_eq!(lines[1]["key"], "file");
        assert_eq!(lines[1]["value"]["content"], "e30=");
        assert_eq!(lines[2]["key"], "lfsFile");
        assert_eq!(lines[2]["value"]["oid"], "abc");
    }

    #[test]
    fn test_sha256_file() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    struct FakeRegistry {
        snapshot: PathBuf,
    }

    impl ModelRegistry for FakeRegistry {
        fn fetch(&self, _repo_id: &str, _files: &[&str]) -> Result<PathBuf> {
            Ok(self.snapshot.clone())
        }
        fn upload_folder(&self, _: &Path, _: &str, _: &[UploadFile]) -> Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn test_resolve_prefers_local_dir() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.json"), "{}").unwrap();
        let reg = FakeRegistry { snapshot: PathBuf::from("/nowhere") };

        let dir = resolve_model_dir(tmp.path().to_str().unwrap(), &["config.json"], &reg).unwrap();
        assert_eq!(dir, tmp.path());

        let err = resolve_model_dir(tmp.path().to_str().unwrap(), &["rust_model.ot"], &reg).unwrap_err();
        assert!(err.to_string().contains("rust_model.ot"));
    }

    #[test]
    fn test_resolve_falls_back_to_registry() {
        let reg = FakeRegistry { snapshot: PathBuf::from("/cache/snap") };
        let dir = resolve_model_dir("org/not-a-local-dir", &["config.json"], &reg).unwrap();
        assert_eq!(dir, PathBuf::from("/cache/snap"));
    }

    #[test]
    fn test_upload_without_token_fails() {
        let tmp  = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.json"), "{}").unwrap();
        let files  = list_upload_files(tmp.path()).unwrap();
        let client = HubClient::new("http://127.0.0.1:9", None).unwrap();
        let err    = client.upload_folder(tmp.path(), "me/repo", &files).unwrap_err();
        assert!(err.to_string().contains("HF_TOKEN"));
    }
}
