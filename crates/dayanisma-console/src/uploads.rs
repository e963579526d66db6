use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error};
use uuid::Uuid;

use dayanisma_core::StoreError;
use dayanisma_core::attachment::OutgoingFile;
use dayanisma_core::store::FileUploader;
use dayanisma_types::models::FileRef;

/// Stores uploads as `{dir}/{id}` on local disk.
pub struct DiskUploader {
    dir: PathBuf,
}

impl DiskUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileUploader for DiskUploader {
    fn upload(&self, file: &OutgoingFile) -> Result<FileRef, StoreError> {
        let Some(bytes) = &file.bytes else {
            return Err(StoreError::ValidationFailed(format!("no contents for {}", file.name)));
        };

        fs::create_dir_all(&self.dir).map_err(|e| {
            error!("Failed to create uploads directory: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        let id = Uuid::new_v4();
        let path = self.dir.join(id.to_string());
        fs::write(&path, bytes).map_err(|e| {
            error!("Failed to write upload {}: {}", path.display(), e);
            StoreError::Unavailable(e.to_string())
        })?;
        debug!(file = %file.name, size = file.size, "stored upload {}", id);

        Ok(FileRef {
            url: format!("file://{}", path.display()),
            name: file.name.clone(),
            size: file.size,
        })
    }
}

/// Best-effort MIME type from the file extension. Unknown extensions map to
/// `application/octet-stream`, which the attachment check rejects.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_bytes_under_dir() {
        let dir = std::env::temp_dir().join(format!("dayanisma_uploads_{}", Uuid::new_v4()));
        let uploader = DiskUploader::new(&dir);
        let file = OutgoingFile::with_bytes("not.txt", "text/plain", b"merhaba".to_vec());

        let stored = uploader.upload(&file).unwrap();
        assert_eq!(stored.name, "not.txt");
        assert_eq!(stored.size, 7);
        let path = stored.url.trim_start_matches("file://");
        assert_eq!(fs::read(path).unwrap(), b"merhaba");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn refuses_metadata_only_files() {
        let uploader = DiskUploader::new(std::env::temp_dir());
        let err = uploader.upload(&OutgoingFile::new("a.pdf", "application/pdf", 10)).unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(guess_mime(Path::new("rapor.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("foto.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("setup.exe")), "application/octet-stream");
        assert_eq!(guess_mime(Path::new("README")), "application/octet-stream");
    }
}
