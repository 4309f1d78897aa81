//! Directory entries
//!
//! Raw listing records are decoded here into a tagged `DirectoryEntry` and
//! never passed further as loose JSON. The content `kind` of a file is always
//! inferred on the client.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::providers::RawEntry;

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Extensions previewed as editable text when the MIME type does not say so
const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".json", ".js", ".ts", ".css", ".html", ".csv", ".xml", ".yml", ".yaml",
];

/// Client-inferred content category of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Audio,
    Video,
    Pdf,
    Text,
    Binary,
}

impl FileKind {
    /// Infer the kind from a MIME type and file name.
    ///
    /// MIME prefixes win; the name is consulted for PDFs and text-like files.
    pub fn infer(mime: Option<&str>, name: &str) -> FileKind {
        let mime = mime.unwrap_or_default().trim().to_ascii_lowercase();
        let name = name.to_lowercase();

        if mime.starts_with("image/") {
            FileKind::Image
        } else if mime.starts_with("audio/") {
            FileKind::Audio
        } else if mime.starts_with("video/") {
            FileKind::Video
        } else if mime == "application/pdf" || name.ends_with(".pdf") {
            FileKind::Pdf
        } else if mime.starts_with("text/") || TEXT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            FileKind::Text
        } else {
            FileKind::Binary
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Pdf => "pdf",
            FileKind::Text => "text",
            FileKind::Binary => "binary",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folder or file, as shown in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectoryEntry {
    Folder {
        name: String,
    },
    File {
        name: String,
        size: u64,
        mime: String,
        kind: FileKind,
    },
}

impl DirectoryEntry {
    pub fn name(&self) -> &str {
        match self {
            DirectoryEntry::Folder { name } | DirectoryEntry::File { name, .. } => name,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, DirectoryEntry::Folder { .. })
    }

    pub fn kind(&self) -> Option<FileKind> {
        match self {
            DirectoryEntry::File { kind, .. } => Some(*kind),
            DirectoryEntry::Folder { .. } => None,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            DirectoryEntry::File { size, .. } => *size,
            DirectoryEntry::Folder { .. } => 0,
        }
    }
}

/// Folders first, then by name.
pub fn listing_order(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_folder()
        .cmp(&a.is_folder())
        .then_with(|| a.name().cmp(b.name()))
}

/// Decode one raw listing record. Never fails: unknown content is `binary`.
pub fn normalize(raw: RawEntry) -> DirectoryEntry {
    if raw.is_dir == Some(false) {
        let kind = FileKind::infer(raw.mime.as_deref(), &raw.name);
        let mime = raw
            .mime
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        DirectoryEntry::File {
            name: raw.name,
            size: raw.size.unwrap_or(0),
            mime,
            kind,
        }
    } else {
        DirectoryEntry::Folder { name: raw.name }
    }
}

/// Decode and sort a whole listing.
pub fn normalize_listing(raw: Vec<RawEntry>) -> Vec<DirectoryEntry> {
    let mut entries: Vec<DirectoryEntry> = raw.into_iter().map(normalize).collect();
    entries.sort_by(listing_order);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mime_prefix() {
        assert_eq!(FileKind::infer(Some("video/mp4"), "clip.bin"), FileKind::Video);
        assert_eq!(FileKind::infer(Some("image/png"), "a"), FileKind::Image);
        assert_eq!(FileKind::infer(Some("AUDIO/mpeg"), "a"), FileKind::Audio);
        assert_eq!(FileKind::infer(Some("text/plain"), "noext"), FileKind::Text);
        assert_eq!(FileKind::infer(Some("application/pdf"), "doc"), FileKind::Pdf);
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(FileKind::infer(Some(""), "notes.md"), FileKind::Text);
        assert_eq!(FileKind::infer(None, "config.YAML"), FileKind::Text);
        assert_eq!(FileKind::infer(None, "report.pdf"), FileKind::Pdf);
        assert_eq!(
            FileKind::infer(Some("application/octet-stream"), "data.json"),
            FileKind::Text
        );
    }

    #[test]
    fn test_kind_mime_beats_extension() {
        assert_eq!(FileKind::infer(Some("image/jpeg"), "weird.txt"), FileKind::Image);
    }

    #[test]
    fn test_kind_unknown_is_binary() {
        assert_eq!(FileKind::infer(Some("application/zip"), "a.zip"), FileKind::Binary);
        assert_eq!(FileKind::infer(None, ""), FileKind::Binary);
    }

    #[test]
    fn test_normalize_file_defaults() {
        let entry = normalize(RawEntry {
            name: "blob".into(),
            is_dir: Some(false),
            size: None,
            mime: Some(String::new()),
        });
        assert_eq!(
            entry,
            DirectoryEntry::File {
                name: "blob".into(),
                size: 0,
                mime: DEFAULT_MIME.into(),
                kind: FileKind::Binary,
            }
        );
    }

    #[test]
    fn test_normalize_folder_when_flag_missing() {
        let entry = normalize(RawEntry {
            name: "docs".into(),
            is_dir: None,
            size: Some(12),
            mime: None,
        });
        assert_eq!(entry, DirectoryEntry::Folder { name: "docs".into() });
    }

    #[test]
    fn test_listing_sorted_folders_first() {
        let listing = normalize_listing(vec![
            RawEntry::file("b.txt", 1, "text/plain"),
            RawEntry::folder("zeta"),
            RawEntry::file("a.png", 2, "image/png"),
            RawEntry::folder("alpha"),
        ]);
        let names: Vec<&str> = listing.iter().map(DirectoryEntry::name).collect();
        assert_eq!(names, vec!["alpha", "zeta", "a.png", "b.txt"]);
    }

    #[test]
    fn test_entry_serializes_tagged() {
        let json = serde_json::to_value(DirectoryEntry::File {
            name: "a.md".into(),
            size: 3,
            mime: "text/markdown".into(),
            kind: FileKind::Text,
        })
        .unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["kind"], "text");
    }
}
