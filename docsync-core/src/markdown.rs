//! Small Markdown scanning helpers shared by the parsers and generators.

use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.+?\]\(([^)]+)\)").expect("static regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("static regex"));

/// Returns the text after the heading whose title is exactly `title`
/// (any of the given `levels`), up to the next `---` rule, the next `##`
/// heading, or end of input.
pub fn section_body<'a>(content: &'a str, title: &str, levels: &[usize]) -> Option<&'a str> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim_end();
        let hashes = trimmed.chars().take_while(|c| *c == '#').count();
        if !levels.contains(&hashes) {
            continue;
        }
        let rest = &trimmed[hashes..];
        if !rest.starts_with(char::is_whitespace) || rest.trim() != title {
            continue;
        }
        let body = &content[offset..];
        let end = [body.find("\n---"), body.find("\n##")]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(body.len());
        return Some(&body[..end]);
    }
    None
}

/// Splits one pipe-table line into trimmed cells, dropping the empty
/// cells produced by the leading and trailing `|`.
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|c| c.trim().to_string()).collect()
}

/// Data rows of the first pipe table in `block`: header and separator are skipped.
pub fn table_rows(block: &str) -> Vec<Vec<String>> {
    let lines: Vec<&str> = block
        .lines()
        .filter(|l| l.trim_start().starts_with('|'))
        .collect();
    if lines.len() < 3 {
        return Vec::new();
    }
    lines[2..]
        .iter()
        .filter(|l| !is_separator(l))
        .map(|l| split_row(l))
        .collect()
}

fn is_separator(line: &str) -> bool {
    let cells = split_row(line);
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

/// `[text](url)` yields `url`; any other cell is passed through trimmed.
pub fn extract_link(cell: &str) -> String {
    LINK_RE
        .captures(cell)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| cell.trim().to_string())
}

pub fn strip_backticks(cell: &str) -> String {
    cell.replace('`', "")
}

/// Text of the first `# ` heading.
pub fn first_title(content: &str) -> Option<String> {
    TITLE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Contents of the first fenced block that follows `### <title>`, with the
/// given info string (`yaml`, or empty for a bare fence).
pub fn fenced_block_after(content: &str, title: &str, info: &str) -> Option<String> {
    let heading = format!("### {title}\n\n```{info}\n");
    let start = content.find(&heading)? + heading.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(rest[..end].to_string())
}
