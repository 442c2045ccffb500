use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

use crate::error::AppError;

/// Name of the multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Pulls the `file` field out of a multipart body. Other fields are skipped.
pub async fn receive(mut multipart: Multipart) -> Result<UploadedImage, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => return Err(AppError::MissingFile),
        };
        let bytes = field.bytes().await?.to_vec();
        return Ok(UploadedImage { filename, bytes });
    }

    Err(AppError::MissingFile)
}

/// Reduces a client-supplied filename to a flat, ASCII-only name safe to join onto
/// the upload directory. Accents fold to their base letter before non-ASCII is
/// dropped. Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let ascii: String = raw
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Writes the upload unmodified under its sanitized name. An existing file with the
/// same name is overwritten.
pub async fn store(upload_dir: &Path, upload: &UploadedImage) -> Result<PathBuf, AppError> {
    let filename = sanitize_filename(&upload.filename)
        .ok_or_else(|| AppError::InvalidFilename(upload.filename.clone()))?;
    let path = upload_dir.join(&filename);
    tokio::fs::write(&path, &upload.bytes).await?;
    info!(path = %path.display(), bytes = upload.bytes.len(), "stored upload");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_plain_names_unchanged() {
        assert_eq!(sanitize_filename("lesion.jpg").as_deref(), Some("lesion.jpg"));
        assert_eq!(
            sanitize_filename("ISIC_0024306-v2.png").as_deref(),
            Some("ISIC_0024306-v2.png")
        );
    }

    #[test]
    fn test_sanitize_whitespace_becomes_underscore() {
        assert_eq!(
            sanitize_filename("my  skin photo.png").as_deref(),
            Some("my_skin_photo.png")
        );
    }

    #[test]
    fn test_sanitize_strips_path_traversal() {
        assert_eq!(
            sanitize_filename("../../../etc/passwd").as_deref(),
            Some("etc_passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\mole.jpg").as_deref(),
            Some("CUsersmemole.jpg")
        );
        assert_eq!(
            sanitize_filename("..\\..\\boot.ini").as_deref(),
            Some("boot.ini")
        );
    }

    #[test]
    fn test_sanitize_drops_non_ascii_and_symbols() {
        assert_eq!(sanitize_filename("naïve<>mole?.jpg").as_deref(), Some("naivemole.jpg"));
        assert_eq!(sanitize_filename("Ångström été.png").as_deref(), Some("Angstrom_ete.png"));
    }

    #[test]
    fn test_sanitize_rejects_empty_results() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("../.."), None);
        assert_eq!(sanitize_filename("日本語"), None);
    }

    #[tokio::test]
    async fn test_store_round_trips_bytes() {
        let dir = TempDir::new().unwrap();
        let upload = UploadedImage {
            filename: "../lesion 1.png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G', 0, 1, 2, 255],
        };

        let path = store(dir.path(), &upload).await.unwrap();

        assert_eq!(path, dir.path().join("lesion_1.png"));
        assert_eq!(std::fs::read(&path).unwrap(), upload.bytes);
    }

    #[tokio::test]
    async fn test_store_overwrites_same_name() {
        let dir = TempDir::new().unwrap();
        let first = UploadedImage {
            filename: "a.png".to_string(),
            bytes: vec![1, 2, 3],
        };
        let second = UploadedImage {
            filename: "a.png".to_string(),
            bytes: vec![9],
        };

        store(dir.path(), &first).await.unwrap();
        let path = store(dir.path(), &second).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_store_rejects_unusable_name() {
        let dir = TempDir::new().unwrap();
        let upload = UploadedImage {
            filename: "..".to_string(),
            bytes: vec![1],
        };
        assert!(matches!(
            store(dir.path(), &upload).await,
            Err(AppError::InvalidFilename(_))
        ));
    }
}
