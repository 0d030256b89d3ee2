use std::{collections::HashMap, path::Path};

use serde::Deserialize;

const DIR_LABEL: &str = "Folder";
const FILE_LABEL: &str = "File";
const DIR_ICON: &str = "fa-folder-o";
const FILE_ICON: &str = "fa-file-o";

// --- Descriptor file layout ---
#[derive(Deserialize, Debug, Default)]
struct Descriptor {
    #[serde(default)]
    nameicon: Vec<NameIcon>,
    #[serde(default)]
    extname: Vec<ExtName>,
    #[serde(default)]
    preview: PreviewRules,
}

#[derive(Deserialize, Debug)]
struct NameIcon {
    name: String,
    icon: String,
}

#[derive(Deserialize, Debug)]
struct ExtName {
    ext: String,
    name: String,
}

#[derive(Deserialize, Debug, Default)]
struct PreviewRules {
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    list: Vec<String>,
    #[serde(default)]
    prefix: String,
}

/// Result of classifying one directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: String,
    pub icon: String,
    pub preview_url: String,
}

/// Extension → type label → icon lookup, plus the preview allow-list.
#[derive(Debug, Default)]
pub struct Classifier {
    ext_names: HashMap<String, String>,
    name_icons: HashMap<String, String>,
    preview_limit: u64,
    preview_exts: Vec<String>,
    preview_prefix: String,
}

impl Classifier {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let descriptor: Descriptor = serde_json::from_str(json)?;
        Ok(Self {
            ext_names: descriptor
                .extname
                .into_iter()
                .map(|e| (normalize_ext(&e.ext), e.name))
                .collect(),
            name_icons: descriptor
                .nameicon
                .into_iter()
                .map(|n| (n.name, n.icon))
                .collect(),
            preview_limit: descriptor.preview.limit,
            preview_exts: descriptor
                .preview
                .list
                .iter()
                .map(|e| normalize_ext(e))
                .collect(),
            preview_prefix: descriptor.preview.prefix,
        })
    }

    /// Classifies an entry. `href` is the entry's public URL, used to build the
    /// preview link when the extension and size allow one.
    pub fn classify(&self, path: &Path, is_dir: bool, size: u64, href: &str) -> Classification {
        if is_dir {
            return Classification {
                kind: DIR_LABEL.to_string(),
                icon: self.icon_for(DIR_LABEL, DIR_ICON),
                preview_url: String::new(),
            };
        }

        let ext = path
            .extension()
            .map(|e| normalize_ext(&e.to_string_lossy()))
            .unwrap_or_default();
        let kind = self
            .ext_names
            .get(&ext)
            .cloned()
            .unwrap_or_else(|| FILE_LABEL.to_string());
        let icon = self.icon_for(&kind, FILE_ICON);
        let preview_url = if !ext.is_empty()
            && size < self.preview_limit
            && self.preview_exts.contains(&ext)
        {
            format!("{}{}", self.preview_prefix, href)
        } else {
            String::new()
        };

        Classification {
            kind,
            icon,
            preview_url,
        }
    }

    fn icon_for(&self, kind: &str, fallback: &str) -> String {
        self.name_icons
            .get(kind)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Lower-cased with a leading dot, so `PNG`, `.png` and `.PNG` all match.
fn normalize_ext(ext: &str) -> String {
    let lower = ext.to_lowercase();
    if lower.is_empty() || lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}
