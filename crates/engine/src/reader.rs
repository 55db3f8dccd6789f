//! Document discovery, reading, and text normalization.
//!
//! Documents are addressed by their path relative to the ingestion root,
//! with `/` separators on every platform. Normalization happens before
//! chunking, so chunk offsets always refer to the normalized text.

use std::fs;
use std::path::{Path, PathBuf};

use quarry_core::{AppError, AppResult};
use walkdir::{DirEntry, WalkDir};

/// How many leading bytes to inspect when sniffing for binary content.
const BINARY_SNIFF_BYTES: usize = 8192;

/// Document format classification by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Markdown,
    Html,
    Text,
}

impl DocumentFormat {
    /// Detects the format from the file extension. `None` means the file
    /// is not ingestable.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("md") | Some("markdown") => Some(Self::Markdown),
            Some("html") | Some("htm") => Some(Self::Html),
            Some("txt") | Some("text") => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "markdown" => Some(Self::Markdown),
            "html" => Some(Self::Html),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A document read from disk, normalized and ready to chunk.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: String,
    pub source_path: PathBuf,
    pub format: DocumentFormat,
    pub text: String,
    /// Size of the file on disk, before normalization.
    pub byte_count: u64,
}

/// Walks `input_dir` and returns ingestable files in sorted order.
///
/// Hidden files and directories are skipped, as are files with
/// extensions no format claims.
pub fn discover_documents(input_dir: &Path) -> AppResult<Vec<PathBuf>> {
    if !input_dir.is_dir() {
        return Err(AppError::InvalidConfiguration(format!(
            "Input directory {} does not exist or is not a directory",
            input_dir.display()
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(input_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|e| {
            AppError::Other(format!("Failed to walk {}: {}", input_dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if DocumentFormat::from_path(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Reads and normalizes one document.
pub fn read_document(input_dir: &Path, path: &Path) -> AppResult<RawDocument> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        AppError::Other(format!("Unsupported file type: {}", path.display()))
    })?;

    let bytes = fs::read(path)
        .map_err(|e| AppError::Other(format!("Failed to read {}: {}", path.display(), e)))?;
    if is_likely_binary(&bytes) {
        return Err(AppError::Other(format!(
            "Skipping likely binary file: {}",
            path.display()
        )));
    }
    let byte_count = bytes.len() as u64;
    let raw = String::from_utf8(bytes)
        .map_err(|_| AppError::Other(format!("File is not valid UTF-8: {}", path.display())))?;

    let cleaned = match format {
        DocumentFormat::Markdown => clean_markdown(&raw),
        DocumentFormat::Html => clean_html(&raw),
        DocumentFormat::Text => raw,
    };

    Ok(RawDocument {
        id: document_id(input_dir, path),
        source_path: path.to_path_buf(),
        format,
        text: normalize_whitespace(&cleaned),
        byte_count,
    })
}

/// Relative path with `/` separators, used as the document identity.
pub fn document_id(input_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(input_dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Null bytes in the leading window mean the file is almost certainly
/// not text.
fn is_likely_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_SNIFF_BYTES)
        .any(|&b| b == 0)
}

/// Strips markdown syntax down to its prose: headers lose their marker,
/// fenced code blocks and horizontal rules are dropped, inline links keep
/// their label.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed == "---" || trimmed == "***" || trimmed == "___" {
            continue;
        }

        let without_header = trimmed.trim_start_matches('#').trim_start();
        let flattened = flatten_links(without_header);
        result.push_str(flattened.trim_end());
        result.push('\n');
    }

    result.trim().to_string()
}

/// Rewrites `[label](url)` as `label`, leaving everything else intact.
fn flatten_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find("](") else {
            break;
        };
        let close = open + close;
        let Some(end) = rest[close..].find(')') else {
            break;
        };
        let end = close + end;
        out.push_str(&rest[..open]);
        out.push_str(&rest[open + 1..close]);
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Strips HTML tags, dropping script and style bodies entirely, then
/// collapses the remaining whitespace.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (offset, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = &text[offset..];
            if starts_with_ignore_case(rest, "<script") {
                in_script = true;
            } else if starts_with_ignore_case(rest, "</script") {
                in_script = false;
            } else if starts_with_ignore_case(rest, "<style") {
                in_style = true;
            } else if starts_with_ignore_case(rest, "</style") {
                in_style = false;
            }
        } else if ch == '>' {
            in_tag = false;
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    let collapsed = result.split_whitespace().collect::<Vec<_>>().join(" ");
    decode_entities(&collapsed)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Unifies line endings, trims trailing spaces per line, and collapses
/// runs of blank lines into a single paragraph break.
fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let mut result = String::with_capacity(unified.len());
    let mut blank_run = 0;

    for line in unified.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
            if blank_run > 0 {
                result.push('\n');
            }
        }
        blank_run = 0;
        result.push_str(trimmed);
    }

    result
}
