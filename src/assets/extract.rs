//! Extract toolkit executables from downloaded artifacts
//!
//! Artifacts come as a ZIP archive, a gzip-compressed tarball, a single
//! gzip-compressed executable, or a bare executable.

use flate2::read::GzDecoder;
use log::debug;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Gzip,
    Raw,
}

impl ArchiveKind {
    /// Detect the artifact kind from its magic bytes, falling back to the mime type
    pub fn detect(data: &[u8], mime_type: &str) -> Self {
        if data.starts_with(b"PK\x03\x04") {
            return ArchiveKind::Zip;
        }
        if data.starts_with(&[0x1f, 0x8b]) {
            return ArchiveKind::Gzip;
        }
        match mime_type {
            "application/zip" => ArchiveKind::Zip,
            "application/gzip" | "application/x-gzip" => ArchiveKind::Gzip,
            _ => ArchiveKind::Raw,
        }
    }
}

/// Write the executable `binary_name` found in `data` to `target_dir`
pub fn extract_executable(
    data: &[u8],
    mime_type: &str,
    binary_name: &str,
    target_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(target_dir)?;
    let target_path = target_dir.join(platform_binary_name(binary_name));

    let mut kind = ArchiveKind::detect(data, mime_type);
    let decompressed;
    let mut payload = data;

    if kind == ArchiveKind::Gzip {
        let mut decoder = GzDecoder::new(Cursor::new(data));
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|e| EngineError::Archive(format!("Failed to decompress gzip: {}", e)))?;
        decompressed = buf;
        payload = &decompressed;
        kind = if is_tar(payload) {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Raw
        };
    }

    debug!("Extracting {} from {:?} artifact", binary_name, kind);
    match kind {
        ArchiveKind::Zip => extract_zip(payload, binary_name, &target_path)?,
        ArchiveKind::TarGz => extract_tar(payload, binary_name, &target_path)?,
        ArchiveKind::Raw | ArchiveKind::Gzip => write_executable(payload, &target_path)?,
    }
    Ok(target_path)
}

fn platform_binary_name(binary_name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", binary_name)
    } else {
        binary_name.to_string()
    }
}

fn is_tar(data: &[u8]) -> bool {
    data.len() > 262 && &data[257..262] == b"ustar"
}

fn matches_binary(entry_name: &str, binary_name: &str) -> bool {
    let file_name = entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name);
    file_name == binary_name || file_name == format!("{}.exe", binary_name)
}

fn extract_zip(data: &[u8], binary_name: &str, target_path: &Path) -> Result<()> {
    use zip::ZipArchive;

    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| EngineError::Archive(format!("Failed to open ZIP: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| EngineError::Archive(format!("Failed to read ZIP entry: {}", e)))?;
        if file.is_dir() || !matches_binary(file.name(), binary_name) {
            continue;
        }
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| EngineError::Archive(format!("Failed to extract file: {}", e)))?;
        return write_executable(&buf, target_path);
    }

    Err(EngineError::Archive(format!(
        "Binary {} not found in archive",
        binary_name
    )))
}

fn extract_tar(data: &[u8], binary_name: &str, target_path: &Path) -> Result<()> {
    use tar::Archive;

    let mut archive = Archive::new(Cursor::new(data));
    let entries = archive
        .entries()
        .map_err(|e| EngineError::Archive(format!("Failed to read tar: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| EngineError::Archive(format!("Failed to read tar entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| EngineError::Archive(format!("Invalid path: {}", e)))?
            .to_string_lossy()
            .to_string();
        if !matches_binary(&path, binary_name) {
            continue;
        }
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| EngineError::Archive(format!("Failed to extract: {}", e)))?;
        return write_executable(&buf, target_path);
    }

    Err(EngineError::Archive(format!(
        "Binary {} not found in archive",
        binary_name
    )))
}

fn write_executable(data: &[u8], target_path: &Path) -> Result<()> {
    let mut outfile = File::create(target_path)?;
    outfile.write_all(data)?;

    // Make executable on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = outfile.metadata()?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(target_path, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn zipball(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detects_kinds() {
        assert_eq!(ArchiveKind::detect(b"PK\x03\x04rest", ""), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::detect(&gzip(b"x"), ""), ArchiveKind::Gzip);
        assert_eq!(
            ArchiveKind::detect(b"\x7fELF", "application/octet-stream"),
            ArchiveKind::Raw
        );
    }

    #[test]
    fn test_extracts_single_gzip_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path =
            extract_executable(&gzip(b"ffmpeg-bytes"), "application/gzip", "ffmpeg", dir.path())
                .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"ffmpeg-bytes");
    }

    #[test]
    fn test_extracts_from_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let tar = tarball(&[
            ("ffmpeg-7.1-static/readme.txt", b"docs"),
            ("ffmpeg-7.1-static/ffprobe", b"probe-bytes"),
            ("ffmpeg-7.1-static/ffmpeg", b"ffmpeg-bytes"),
        ]);
        let path = extract_executable(&gzip(&tar), "application/gzip", "ffprobe", dir.path())
            .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"probe-bytes");
    }

    #[test]
    fn test_extracts_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let zip = zipball(&[("bin/ffmpeg.exe", b"win-ffmpeg"), ("bin/ffprobe.exe", b"win-probe")]);
        let path = extract_executable(&zip, "application/zip", "ffmpeg", dir.path()).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"win-ffmpeg");
    }

    #[test]
    fn test_missing_binary_in_zip() {
        let dir = tempfile::tempdir().unwrap();
        let zip = zipball(&[("readme.txt", b"docs")]);
        let err = extract_executable(&zip, "application/zip", "ffmpeg", dir.path()).unwrap_err();
        assert_eq!(err.code(), "archive_error");
    }

    #[cfg(unix)]
    #[test]
    fn test_extracted_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = extract_executable(b"#!/bin/sh\n", "", "ffmpeg", dir.path()).unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
