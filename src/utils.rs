//! Utility functions for filename handling and disk space checks

use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Extensions longer than this are treated as junk left over from query
/// strings or script URLs
const MAX_SANE_EXTENSION_LEN: usize = 5;

/// Derive a safe on-disk filename from an episode title or URL segment.
///
/// Strips path separators and other characters that are unsafe in
/// filenames, collapsing to "episode" if nothing survives.
pub fn sanitize_media_filename(name: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name.trim());
    if cleaned.is_empty() {
        "episode".to_string()
    } else {
        cleaned
    }
}

/// Map a media mimetype to its customary file extension.
///
/// Returns None for unknown or non-media types; callers keep the existing
/// extension in that case.
pub fn extension_for_mimetype(mimetype: &str) -> Option<&'static str> {
    // Parameters like "audio/mpeg; charset=..." are not part of the type
    let essence = mimetype.split(';').next().unwrap_or("").trim();

    match essence {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/aac" => Some("aac"),
        "video/mp4" => Some("mp4"),
        "video/x-m4v" => Some("m4v"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "video/x-matroska" => Some("mkv"),
        _ => None,
    }
}

/// Whether an extension names a known audio or video container.
///
/// Used to decide if a bare feed link (no enclosure element) plausibly
/// points at a media file.
pub fn is_media_extension(extension: &str) -> bool {
    matches!(
        extension.to_ascii_lowercase().as_str(),
        "mp3" | "m4a" | "ogg" | "opus" | "flac" | "wav" | "aac" | "mp4" | "m4v" | "webm" | "mov"
            | "mkv"
    )
}

/// Whether a filename extension is unusable and should be replaced when a
/// better one is known from the server's mimetype or a redirect target.
///
/// An extension is junk when it is empty, longer than 5 characters,
/// contains whitespace, or contains characters outside [A-Za-z0-9].
/// Media URLs behind redirectors routinely produce names like
/// "watch?v=abc123" whose "extension" is query-string debris.
pub fn is_junk_extension(extension: &str) -> bool {
    extension.is_empty()
        || extension.len() > MAX_SANE_EXTENSION_LEN
        || extension.chars().any(|c| !c.is_ascii_alphanumeric())
}

/// Extract a filename from a `Content-Disposition` header value.
///
/// Handles both the plain `filename="..."` form and the RFC 5987
/// `filename*=charset''encoded` form. Returns None when the header names
/// no usable file.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(raw) = part.strip_prefix("filename*=") {
            // Format is: charset'lang'encoded-filename
            if let Some(idx) = raw.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&raw[idx + 1..])
            {
                let name = sanitize_media_filename(&decoded);
                if name != "episode" {
                    return Some(name);
                }
            }
        } else if let Some(raw) = part.strip_prefix("filename=") {
            let name = raw.trim_matches('"').trim();
            if !name.is_empty() {
                let name = sanitize_media_filename(name);
                if name != "episode" {
                    return Some(name);
                }
            }
        }
    }
    None
}

/// Extract the last path segment of a URL as a candidate filename.
pub fn filename_from_url(url: &url::Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    // Percent-decode so "My%20Show.mp3" becomes "My Show.mp3"
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(sanitize_media_filename(&decoded))
}

/// Get a unique path for a file, appending " (1)", " (2)", ... to the stem
/// until the name does not collide with an existing file.
pub fn get_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("episode");
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return new_path;
        }
    }

    // Every candidate existed; the final write will overwrite the last one
    path.to_path_buf()
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Arguments
///
/// * `path` - The path to check (typically the download directory)
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string; stat is
        // zero-initialized before the call; the return value is checked
        // before the struct is read.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is blocks available to unprivileged users;
            // f_frsize is the fragment size (preferred over f_bsize)
            let available_bytes = stat.f_bavail.saturating_mul(stat.f_frsize);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0)) // null terminator
            .collect();

        // SAFETY: wide_path is a valid, null-terminated wide string; the
        // output pointers reference valid u64s; the return value is checked
        // before the outputs are read.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
