//! Local file helpers: counting and mime classification

use std::path::Path;

use walkdir::WalkDir;

use crate::core::error::Result;

/// Mime type reported for directories
pub const FOLDER_MIME: &str = "Folder";

/// Count `(folders, files)` below `root`, the root itself excluded
pub fn count_files_and_folders(root: &Path) -> Result<(usize, usize)> {
    let mut folders = 0;
    let mut files = 0;
    for entry in WalkDir::new(root).min_depth(1) {
        let entry =
            entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        if entry.file_type().is_dir() {
            folders += 1;
        } else {
            files += 1;
        }
    }
    Ok((folders, files))
}

/// Async wrapper running the walk on the blocking pool
pub async fn count_files_and_folders_async(root: &Path) -> Result<(usize, usize)> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || count_files_and_folders(&root))
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

/// Detect a file's mime type from its magic bytes
///
/// Falls back to the extension for formats without a signature (text,
/// subtitles) and to `application/octet-stream` when both fail.
pub fn mime_type(path: &Path) -> String {
    if let Some(kind) = infer::get_from_path(path).ok().flatten() {
        return kind.mime_type().to_string();
    }
    mime_from_extension(path).to_string()
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/x-wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "iso" => "application/x-iso9660-image",
        "json" => "application/json",
        "txt" | "log" | "nfo" => "text/plain",
        "srt" => "application/x-subrip",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}
