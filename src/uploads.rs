// ABOUTME: PDF upload and download handlers backed by a local file store
// ABOUTME: Files live under <upload_dir>/<vault_id>/<key>.pdf and are served back to vault members

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::path::{Path as FsPath, PathBuf};
use uuid::Uuid;

use crate::auth_helpers::{require_permission, AuthUser};
use crate::error::{AppError, Result};
use crate::permissions::Permission;
use crate::types::{ok, ApiResponse, UploadResponse};
use crate::AppState;

pub const PDF_MIME_TYPE: &str = "application/pdf";
const FILE_EXTENSION: &str = "pdf";

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!("Storing uploads under {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    pub async fn save(&self, vault_id: Uuid, bytes: &[u8]) -> Result<String> {
        let dir = self.root.join(vault_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let key = format!("{}.{}", Uuid::new_v4(), FILE_EXTENSION);
        tokio::fs::write(dir.join(&key), bytes).await?;
        Ok(key)
    }

    pub async fn read(&self, vault_id: Uuid, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(vault_id, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Best effort: a missing file is not an error.
    pub async fn remove(&self, vault_id: Uuid, key: &str) {
        let Ok(path) = self.path_for(vault_id, key) else {
            return;
        };
        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), err);
            }
        }
    }

    pub async fn remove_vault(&self, vault_id: Uuid) {
        let dir = self.root.join(vault_id.to_string());
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", dir.display(), err);
            }
        }
    }

    // Keys are always "<uuid>.pdf", which rules out path traversal.
    fn path_for(&self, vault_id: Uuid, key: &str) -> Result<PathBuf> {
        let valid = key
            .strip_suffix(".pdf")
            .map(|stem| Uuid::parse_str(stem).is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Ok(self.root.join(vault_id.to_string()).join(key))
    }
}

fn size_limit_message(max_bytes: usize) -> String {
    format!("File size exceeds {}MB limit", max_bytes / (1024 * 1024))
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::InvalidInput(size_limit_message(max_bytes))
    } else {
        AppError::InvalidInput(format!("Invalid upload: {}", err.body_text()))
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(vault_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>> {
    let access = require_permission(&state, &user, &vault_id, Permission::SourceCreate).await?;
    let max_bytes = state.config.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| multipart_error(err, max_bytes))?;
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    if content_type.as_deref() != Some(PDF_MIME_TYPE) {
        return Err(AppError::InvalidInput("Only PDF files are allowed".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::InvalidInput(size_limit_message(max_bytes)));
    }

    let vault_id = access.vault.id;
    let file_key = state.files.save(vault_id, &bytes).await?;
    tracing::info!(
        "User {} uploaded {} ({} bytes) to vault {}",
        user.user_id,
        file_key,
        bytes.len(),
        vault_id
    );

    Ok(ok(UploadResponse {
        url: format!("/api/vaults/{}/files/{}", vault_id, file_key),
        file_key,
        file_size: bytes.len() as u64,
        mime_type: PDF_MIME_TYPE.to_string(),
    }))
}

pub async fn download_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path((vault_id, file_key)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let access = require_permission(&state, &user, &vault_id, Permission::SourceRead).await?;
    let bytes = state.files.read(access.vault.id, &file_key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, PDF_MIME_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file_key),
            ),
        ],
        bytes,
    ))
}
