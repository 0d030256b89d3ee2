use std::{fs::Metadata, path::Path, time::SystemTime};

use chrono::prelude::*;
use serde::Serialize;
use tokio::fs;
use tracing::{error, warn};

use crate::classify::Classifier;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SIZE_UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];

/// One rendered line of a directory listing.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EntryRow {
    pub name: String,
    pub is_dir: bool,
    pub byte_size: u64,
    pub formatted_size: String, // "--" for directories
    pub modified_at: String,
    pub kind: String,
    pub icon: String,
    pub href: String,
    /// `href` without the list-state query string; used as the operation target.
    pub path: String,
    pub preview_url: String,
}

/// Reads the immediate children of `dir`.
///
/// An unreadable directory (missing, not a directory, permission denied) yields
/// an empty listing, the same as an empty directory. Rows come back in byte-wise
/// name order.
pub async fn list_dir(
    dir: &Path,
    nav_prefix: &str,
    raw_query: &str,
    classifier: &Classifier,
) -> Vec<EntryRow> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) => {
            warn!("Listing {} as empty: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let base = nav_prefix.trim_end_matches('/');
    let mut rows = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Listing of {} cut short: {}", dir.display(), e);
                break;
            }
        };
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => {
                error!("Skipping entry with non-UTF8 filename in {}", dir.display());
                continue;
            }
        };

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to get metadata for {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let is_dir = metadata.is_dir();
        let byte_size = if is_dir { 0 } else { metadata.len() };
        let path = format!("{}/{}", base, urlencoding::encode(&name));
        let href = if is_dir && !raw_query.is_empty() {
            format!("{path}?{raw_query}")
        } else {
            path.clone()
        };
        let class = classifier.classify(&entry.path(), is_dir, byte_size, &path);

        rows.push(EntryRow {
            name,
            is_dir,
            byte_size,
            formatted_size: if is_dir {
                "--".to_string()
            } else {
                format_size(byte_size)
            },
            modified_at: modified_string(&metadata),
            kind: class.kind,
            icon: class.icon,
            href,
            path,
            preview_url: class.preview_url,
        });
    }

    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// 1024-based size with two decimals, or whole bytes below 1 KB.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = SIZE_UNITS[0];
    for &next in &SIZE_UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.2} {unit}")
}

/// Local time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_time(time: SystemTime) -> String {
    let datetime: DateTime<Local> = time.into();
    datetime.format(TIME_FORMAT).to_string()
}

fn modified_string(metadata: &Metadata) -> String {
    metadata
        .modified()
        .map(format_time)
        .unwrap_or_else(|_| "--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(1 << 30), "1.00 GB");
        assert_eq!(format_size(3 << 40), "3.00 TB");
        assert_eq!(format_size(u64::MAX), "16.00 EB");
    }

    #[test]
    fn time_format_is_fixed_width() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let s = format_time(t);
        assert_eq!(s.len(), 19);
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[10..11], " ");
        assert_eq!(&s[13..14], ":");
    }

    #[tokio::test]
    async fn lists_children_with_hrefs() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), vec![0u8; 1536]).unwrap();
        std::fs::create_dir(tmp.path().join("a dir")).unwrap();

        let rows = list_dir(tmp.path(), "/home/x", "s=name&o=asc", &Classifier::default()).await;
        assert_eq!(rows.len(), 2);

        let dir = &rows[0];
        assert_eq!(dir.name, "a dir");
        assert!(dir.is_dir);
        assert_eq!(dir.byte_size, 0);
        assert_eq!(dir.formatted_size, "--");
        assert_eq!(dir.href, "/home/x/a%20dir?s=name&o=asc");
        assert_eq!(dir.path, "/home/x/a%20dir");
        assert_eq!(dir.kind, "Folder");

        let file = &rows[1];
        assert_eq!(file.name, "b.txt");
        assert!(!file.is_dir);
        assert_eq!(file.byte_size, 1536);
        assert_eq!(file.formatted_size, "1.50 KB");
        // files never carry the query
        assert_eq!(file.href, "/home/x/b.txt");
        assert_eq!(file.kind, "File");
        assert_eq!(file.modified_at.len(), 19);
    }

    #[tokio::test]
    async fn root_prefix_does_not_double_slash() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f"), b"x").unwrap();
        let rows = list_dir(tmp.path(), "/home/", "", &Classifier::default()).await;
        assert_eq!(rows[0].href, "/home/f");
    }

    #[tokio::test]
    async fn unreadable_directory_lists_empty() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing");
        assert!(list_dir(&missing, "/home", "", &Classifier::default()).await.is_empty());

        let file = tmp.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(list_dir(&file, "/home", "", &Classifier::default()).await.is_empty());
    }

    #[tokio::test]
    async fn empty_directory_lists_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(list_dir(tmp.path(), "/home", "", &Classifier::default()).await.is_empty());
    }
}
