//! Walking the design tree: skip rules, titles and lexical relative paths
//! shared by the index and cross-reference generators.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::{DirEntry, WalkDir};

/// Generated per-directory index names, never indexed themselves.
pub const INDEX_FILES: [&str; 2] = ["INDEX.md", "00_INDEX.md"];

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)\s*$").expect("static regex"));
static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>[ \t]*(.+?)\s*$").expect("static regex"));

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.'))
}

/// Every `*.md` file below `root`, sorted, outside dot-directories.
pub fn markdown_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|e| e == "md"))
        .collect()
}

pub fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| INDEX_FILES.contains(&n))
}

/// First `# ` heading, else the file stem with underscores as spaces.
pub fn doc_title(content: &str, path: &Path) -> String {
    H1_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().replace('_', " "))
                .unwrap_or_default()
        })
}

pub fn first_blockquote(content: &str) -> Option<String> {
    BLOCKQUOTE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First line of plain prose after any frontmatter: not a heading, list,
/// table, quote, comment, fence or rule.
pub fn first_paragraph(content: &str) -> Option<String> {
    let (_, body) = crate::toc::split_frontmatter(content);
    let mut in_fence = false;
    for line in body.lines() {
        let t = line.trim();
        if t.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || t.is_empty() {
            continue;
        }
        let structural = ["#", "-", "*", "|", ">", "<", "=", "+", "!["]
            .iter()
            .any(|p| t.starts_with(p))
            || t.chars().next().is_some_and(|c| c.is_ascii_digit());
        if !structural {
            return Some(t.to_string());
        }
    }
    None
}

/// Python-style title case: the first letter of every alphabetic run is
/// uppercased, the rest lowercased.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Resolves `.` and `..` without touching the filesystem. Returns `None`
/// when `..` climbs above the start of a relative path.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Relative link from directory `from` to `to`, both relative to the same base.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<_> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<_> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
