//! # mermaid: ASCII box diagrams to Mermaid `flowchart LR`
//!
//! Boxes drawn with `┌ ┐ └ ┘ │ ─` are located by their top-left corner, grouped
//! into horizontal rows by the line they start on, and wired together
//! left-to-right within a row and rightmost-to-leftmost between rows. Arrow
//! glyphs between boxes are ignored; direction is always implied by layout.
//!
//! ## Major Types
//! - [`AsciiBox`]: one extracted box with its label, sublabels and position.
//! - [`NodeShape`]: the Mermaid node shape picked from the box's wording.
//!
//! ## Error Handling
//! Text conversion never fails: input without a complete box is returned
//! unchanged (`None`). Only [`rewrite_yaml_file`] can fail, with [`MermaidError`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::atomic::{write_if_changed, WriteError, WriteOutcome};

/// Per-subject YAML fields that may hold ASCII diagrams.
pub const DIAGRAM_FIELDS: [&str; 4] = [
    "architecture_diagram",
    "data_flow_diagram",
    "component_description",
    "database_schema",
];

const BOX_DRAWING: [char; 11] = ['┌', '┐', '└', '┘', '│', '─', '├', '┤', '┬', '┴', '┼'];
const NOISE: &str = "┌┐└┘├┤┬┴┼─━═║╔╗╚╝╠╣╦╩╬│▶◀▼▲►◄→←↓↑";
const PALETTE: [&str; 5] = ["#1976D2", "#388E3C", "#7B1FA2", "#F57C00", "#C2185B"];

const DATABASE_TOKENS: [&str; 8] = [
    "POSTGRES", "DATABASE", "DB", "CACHE", "REDIS", "DRAGONFLY", "STORAGE", "SQL",
];
const EXTERNAL_TOKENS: [&str; 8] = [
    "EXTERNAL", "THIRD-PARTY", "PROVIDER", "CLIENT", "WEB", "MOBILE", "APP", "BROWSER",
];
const SERVICE_TOKENS: [&str; 8] = [
    "SERVICE", "API", "HANDLER", "ENGINE", "MANAGER", "CONTROLLER", "MODULE", "WORKER",
];

static LAYER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(LAYER|TIER|LEVEL)S?\b").expect("static regex"));
static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*?)```[^\n]*\n(.*?)```(.*)$").expect("static regex"));

#[derive(Debug, thiserror::Error)]
pub enum MermaidError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsciiBox {
    pub id: String,
    pub label: String,
    pub sublabels: Vec<String>,
    /// Line index of the top border.
    pub row: usize,
    /// Column (in chars) of the top-left corner.
    pub col: usize,
}

impl AsciiBox {
    pub fn is_layer(&self) -> bool {
        is_layer_label(&self.label)
    }

    pub fn shape(&self) -> NodeShape {
        NodeShape::for_label(&self.label, self.sublabels.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Cylinder,
    Stadium,
    Subroutine,
    Rectangle,
}

impl NodeShape {
    /// Database wording wins over external, external over service.
    pub fn for_label(label: &str, first_sublabel: Option<&str>) -> NodeShape {
        let combined = format!("{} {}", label, first_sublabel.unwrap_or_default()).to_uppercase();
        let words: Vec<&str> = combined
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();
        let has = |tokens: &[&str]| {
            tokens
                .iter()
                .any(|t| words.iter().any(|w| w.starts_with(t)))
        };
        if has(&DATABASE_TOKENS) {
            NodeShape::Cylinder
        } else if has(&EXTERNAL_TOKENS) {
            NodeShape::Stadium
        } else if has(&SERVICE_TOKENS) {
            NodeShape::Subroutine
        } else {
            NodeShape::Rectangle
        }
    }

    fn brackets(&self) -> (&'static str, &'static str) {
        match self {
            NodeShape::Cylinder => ("[(", ")]"),
            NodeShape::Stadium => ("([", "])"),
            NodeShape::Subroutine => ("[[", "]]"),
            NodeShape::Rectangle => ("[", "]"),
        }
    }
}

/// A directed `from --> to` edge between box ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

pub fn has_box_drawing(text: &str) -> bool {
    text.chars().any(|c| BOX_DRAWING.contains(&c))
}

pub fn is_layer_label(label: &str) -> bool {
    LAYER_RE.is_match(&label.to_uppercase())
}

fn clean_text(chars: &[char]) -> String {
    let replaced: String = chars
        .iter()
        .map(|c| if NOISE.contains(*c) { ' ' } else { *c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Found {
    end_col: usize,
    texts: Vec<String>,
}

fn box_at(lines: &[Vec<char>], row: usize, col: usize) -> Option<Found> {
    let line = &lines[row];

    // Matching ┐ on the top border, skipping nested corners.
    let mut depth = 1;
    let mut end_col = col + 1;
    while end_col < line.len() {
        match line[end_col] {
            '┌' => depth += 1,
            '┐' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        end_col += 1;
    }
    if depth != 0 {
        return None;
    }

    let bottom_row = (row + 1..lines.len()).find(|&r| lines[r].get(col) == Some(&'└'))?;

    let bottom = &lines[bottom_row];
    if bottom.get(end_col) != Some(&'┘') {
        let lo = end_col.saturating_sub(2).max(col);
        let hi = (end_col + 3).min(bottom.len());
        if let Some(ec) = (lo..hi).find(|&ec| bottom[ec] == '┘') {
            end_col = ec;
        }
    }

    let mut texts = Vec::new();
    for content in &lines[row + 1..bottom_row] {
        if content.len() <= col {
            continue;
        }
        let segment = &content[col..(end_col + 1).min(content.len())];
        let first = segment.iter().position(|c| *c == '│');
        let last = segment.iter().rposition(|c| *c == '│');
        let inner = match (first, last) {
            (Some(f), Some(l)) if f != l => &segment[f + 1..l],
            (Some(_), _) => segment,
            _ => continue,
        };
        let cleaned = clean_text(inner);
        if !cleaned.is_empty() {
            texts.push(cleaned);
        }
    }
    (!texts.is_empty()).then_some(Found { end_col, texts })
}

/// Every complete box with at least one line of text, in reading order.
pub fn extract_boxes(text: &str) -> Vec<AsciiBox> {
    let lines: Vec<Vec<char>> = text.split('\n').map(|l| l.chars().collect()).collect();
    let mut boxes = Vec::new();
    for (row, line) in lines.iter().enumerate() {
        let mut col = 0;
        while col < line.len() {
            if line[col] != '┌' {
                col += 1;
                continue;
            }
            match box_at(&lines, row, col) {
                Some(found) => {
                    let mut texts = found.texts.into_iter();
                    boxes.push(AsciiBox {
                        id: format!("node{}", boxes.len() + 1),
                        label: texts.next().unwrap_or_default(),
                        sublabels: texts.collect(),
                        row,
                        col,
                    });
                    col = found.end_col + 1;
                }
                None => col += 1,
            }
        }
    }
    boxes
}

/// Boxes grouped by top-border line, rows top to bottom, boxes left to right.
pub fn group_rows(boxes: &[AsciiBox]) -> Vec<Vec<&AsciiBox>> {
    let mut rows: BTreeMap<usize, Vec<&AsciiBox>> = BTreeMap::new();
    for b in boxes {
        rows.entry(b.row).or_default().push(b);
    }
    rows.into_values()
        .map(|mut row| {
            row.sort_by_key(|b| b.col);
            row
        })
        .collect()
}

pub fn infer_connections(boxes: &[AsciiBox]) -> Vec<Connection> {
    let rows = group_rows(boxes);
    let edge = |a: &AsciiBox, b: &AsciiBox| Connection {
        from: a.id.clone(),
        to: b.id.clone(),
    };
    let mut connections: Vec<Connection> = rows
        .iter()
        .flat_map(|row| row.windows(2).map(|pair| edge(pair[0], pair[1])))
        .collect();
    for pair in rows.windows(2) {
        if let (Some(last), Some(first)) = (pair[0].last(), pair[1].first()) {
            connections.push(edge(last, first));
        }
    }
    connections
}

fn escape_label(text: &str) -> String {
    text.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn node_line(b: &AsciiBox) -> String {
    let mut label = escape_label(&b.label);
    for sub in b.sublabels.iter().take(2) {
        label.push_str("<br/>");
        label.push_str(&escape_label(sub));
    }
    let shape = if b.is_layer() {
        NodeShape::Rectangle
    } else {
        b.shape()
    };
    let (open, close) = shape.brackets();
    format!("        {}{open}\"{label}\"{close}", b.id)
}

/// Mermaid source (without fence) for the given boxes, or an empty string.
pub fn generate_mermaid(boxes: &[AsciiBox], connections: &[Connection]) -> String {
    if boxes.is_empty() {
        return String::new();
    }
    let mut lines = vec!["flowchart LR".to_string()];
    let rows = group_rows(boxes);
    for (i, row) in rows.iter().enumerate() {
        let title = row
            .iter()
            .find(|b| b.is_layer())
            .map(|b| escape_label(&b.label))
            .unwrap_or_else(|| format!("Tier {}", i + 1));
        lines.push(format!("    subgraph tier{}[\"{title}\"]", i + 1));
        lines.extend(row.iter().map(|b| node_line(b)));
        lines.push("    end".to_string());
    }
    for c in connections {
        lines.push(format!("    {} --> {}", c.from, c.to));
    }
    for i in 0..rows.len() {
        lines.push(format!(
            "    style tier{} fill:{},stroke:#fff,stroke-width:2px,color:#fff",
            i + 1,
            PALETTE[i % PALETTE.len()]
        ));
    }
    lines.join("\n")
}

/// Fenced Mermaid block for a bare ASCII diagram; `None` when it has no boxes.
pub fn convert_diagram(text: &str) -> Option<String> {
    let boxes = extract_boxes(text);
    if boxes.is_empty() {
        return None;
    }
    let connections = infer_connections(&boxes);
    debug!(boxes = boxes.len(), edges = connections.len(), "Converted ASCII diagram");
    Some(format!("```mermaid\n{}\n```", generate_mermaid(&boxes, &connections)))
}

/// Converts a field value. Only the first fenced block is converted when one
/// exists, keeping the text around it. Returns `None` for values with nothing
/// to convert or already holding Mermaid.
pub fn convert_field(value: &str) -> Option<String> {
    if !has_box_drawing(value) || value.contains("```mermaid") {
        return None;
    }
    let Some(caps) = FENCED_RE.captures(value) else {
        return convert_diagram(value);
    };
    let before = caps.get(1).map_or("", |m| m.as_str()).trim();
    let diagram = caps.get(2).map_or("", |m| m.as_str());
    let after = caps.get(3).map_or("", |m| m.as_str()).trim();
    let mermaid = convert_diagram(diagram)?;
    let parts: Vec<&str> = [before, mermaid.as_str(), after]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    Some(parts.join("\n\n"))
}

/// Converts every diagram field of a per-subject mapping in place and returns
/// the names of the converted fields.
pub fn convert_mapping(doc: &mut serde_yaml::Mapping) -> Vec<&'static str> {
    let mut converted = Vec::new();
    for field in DIAGRAM_FIELDS {
        let Some(serde_yaml::Value::String(value)) = doc.get_mut(field) else {
            continue;
        };
        if let Some(new_value) = convert_field(value) {
            *value = new_value;
            converted.push(field);
        }
    }
    converted
}

/// Rewrites the diagram fields of one per-subject YAML file.
pub fn rewrite_yaml_file(
    path: &Path,
    apply: bool,
) -> Result<(Vec<&'static str>, WriteOutcome), MermaidError> {
    let text = std::fs::read_to_string(path).map_err(|source| MermaidError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut doc: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| MermaidError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    let Some(map) = doc.as_mapping_mut() else {
        return Ok((Vec::new(), WriteOutcome::Unchanged));
    };
    let fields = convert_mapping(map);
    if fields.is_empty() {
        return Ok((fields, WriteOutcome::Unchanged));
    }
    let rendered = serde_yaml::to_string(&doc).map_err(|source| MermaidError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let outcome = write_if_changed(path, &rendered, apply)?;
    info!(path = %path.display(), fields = ?fields, outcome = outcome.as_str(), "Diagram fields converted");
    Ok((fields, outcome))
}
