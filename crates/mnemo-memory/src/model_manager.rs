// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download and caching of the local embedding model.
//!
//! paraphrase-multilingual-MiniLM-L12-v2 is on the order of a hundred
//! megabytes, so each file is streamed to a `.part` sibling and renamed
//! into place only when complete: a crash or lost connection mid-download
//! never leaves a half-written model that the embedder would then try to
//! load. Responses shorter than a per-file floor are treated as failures
//! (hosting errors arrive as small HTML bodies with status 200 behind
//! some proxies). Concurrent callers collapse onto a single fetch.

use std::path::{Path, PathBuf};

use mnemo_core::MnemoError;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::info;

/// One file of the model bundle.
struct ModelFile {
    name: &'static str,
    url: &'static str,
    /// Anything shorter than this is a truncated download or an error
    /// page, not the artifact.
    min_bytes: u64,
}

/// The files the embedder needs on disk.
const MODEL_FILES: &[ModelFile] = &[
    ModelFile {
        name: "model.onnx",
        url: "https://huggingface.co/onnx-models/paraphrase-multilingual-MiniLM-L12-v2-onnx/resolve/main/model_quantized.onnx",
        min_bytes: 10 * 1024 * 1024,
    },
    ModelFile {
        name: "tokenizer.json",
        url: "https://huggingface.co/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2/resolve/main/tokenizer.json",
        min_bytes: 1024 * 1024,
    },
];

/// Directory name under `{data_dir}/models/` for this model.
const MODEL_DIR_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Manages model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    /// Collapses concurrent `ensure_model` calls onto one download.
    ready: OnceCell<PathBuf>,
}

impl ModelManager {
    /// Creates a new ModelManager rooted at the given data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ready: OnceCell::new(),
        }
    }

    /// Returns the directory where model files are stored.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(MODEL_DIR_NAME)
    }

    /// Returns the path to the ONNX model file.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    /// Returns the path to the tokenizer.json file.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// Returns true when every bundle file is present.
    ///
    /// `.part` leftovers do not count: only a completed download is ever
    /// renamed to the final name.
    pub fn is_model_available(&self) -> bool {
        let dir = self.model_dir();
        MODEL_FILES.iter().all(|file| dir.join(file.name).exists())
    }

    /// Ensures the model is on disk, downloading missing files on first
    /// call. Subsequent and concurrent calls share the first result.
    pub async fn ensure_model(&self) -> Result<PathBuf, MnemoError> {
        let path = self
            .ready
            .get_or_try_init(|| async {
                self.fetch_missing().await?;
                Ok::<_, MnemoError>(self.model_path())
            })
            .await?;
        Ok(path.clone())
    }

    async fn fetch_missing(&self) -> Result<(), MnemoError> {
        if self.is_model_available() {
            return Ok(());
        }

        let dir = self.model_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MnemoError::Internal(format!("failed to create model directory: {e}")))?;

        for file in MODEL_FILES {
            if dir.join(file.name).exists() {
                continue;
            }
            fetch_one(file, &dir).await?;
        }

        info!("embedding model ready at: {}", dir.display());
        Ok(())
    }
}

/// Stream one file to `<name>.part`, then rename it into place.
async fn fetch_one(file: &ModelFile, dir: &Path) -> Result<(), MnemoError> {
    let final_path = dir.join(file.name);
    let part_path = dir.join(format!("{}.part", file.name));

    info!(url = file.url, "downloading {}", file.name);
    let result = stream_to_part(file, &part_path).await;

    let written = match result {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e);
        }
    };

    if written < file.min_bytes {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(MnemoError::Internal(format!(
            "download of {} stopped at {written} bytes (expected at least {}); \
             refusing truncated artifact",
            file.name, file.min_bytes
        )));
    }

    tokio::fs::rename(&part_path, &final_path)
        .await
        .map_err(|e| MnemoError::Internal(format!("failed to finalize {}: {e}", file.name)))?;

    info!(bytes = written, "downloaded {}", file.name);
    Ok(())
}

/// Write the response body to the part file chunk by chunk; the model is
/// too large to buffer whole on small hosts.
async fn stream_to_part(file: &ModelFile, part_path: &Path) -> Result<u64, MnemoError> {
    let mut response = reqwest::get(file.url)
        .await
        .map_err(|e| MnemoError::Internal(format!("failed to download {}: {e}", file.url)))?;

    if !response.status().is_success() {
        return Err(MnemoError::Internal(format!(
            "download of {} failed with status {}",
            file.url,
            response.status()
        )));
    }

    let mut out = tokio::fs::File::create(part_path)
        .await
        .map_err(|e| MnemoError::Internal(format!("failed to create {}: {e}", part_path.display())))?;

    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MnemoError::Internal(format!("download of {} interrupted: {e}", file.url)))?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| MnemoError::Internal(format!("failed to write {}: {e}", part_path.display())))?;
        written += chunk.len() as u64;
    }

    out.flush()
        .await
        .map_err(|e| MnemoError::Internal(format!("failed to flush {}: {e}", part_path.display())))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_in_the_data_dir() {
        let mgr = ModelManager::new(PathBuf::from("/var/lib/mnemo"));
        assert_eq!(
            mgr.model_path(),
            PathBuf::from("/var/lib/mnemo/models/paraphrase-multilingual-MiniLM-L12-v2/model.onnx")
        );
        assert_eq!(
            mgr.tokenizer_path(),
            mgr.model_dir().join("tokenizer.json")
        );
    }

    #[test]
    fn model_not_available_when_missing() {
        let mgr = ModelManager::new(PathBuf::from("/nonexistent/path"));
        assert!(!mgr.is_model_available());
    }

    #[tokio::test]
    async fn part_files_do_not_count_as_available() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(dir.path().to_path_buf());
        tokio::fs::create_dir_all(mgr.model_dir()).await.unwrap();
        // A crashed download leaves only .part siblings behind.
        tokio::fs::write(mgr.model_dir().join("model.onnx.part"), b"partial")
            .await
            .unwrap();
        tokio::fs::write(mgr.model_dir().join("tokenizer.json.part"), b"partial")
            .await
            .unwrap();
        assert!(!mgr.is_model_available());
    }

    #[tokio::test]
    async fn ensure_model_short_circuits_when_files_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(dir.path().to_path_buf());
        tokio::fs::create_dir_all(mgr.model_dir()).await.unwrap();
        for file in MODEL_FILES {
            tokio::fs::write(mgr.model_dir().join(file.name), b"cached")
                .await
                .unwrap();
        }

        // No network: the cached bundle satisfies the call, and repeated
        // calls reuse the memoized path.
        let first = mgr.ensure_model().await.unwrap();
        let second = mgr.ensure_model().await.unwrap();
        assert_eq!(first, mgr.model_path());
        assert_eq!(first, second);
    }
}
