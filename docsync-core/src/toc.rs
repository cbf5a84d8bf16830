//! Table-of-contents generation with GitHub-flavored anchor slugs.
//!
//! [`add_toc`] is a fixed point: running it on its own output changes nothing.

use std::sync::LazyLock;

use regex::Regex;

pub const TOC_HEADING: &str = "Table of Contents";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+)$").expect("static regex"));

static TOC_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*- \[.*\]\(#[^)]*\)[ \t]*$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub level: usize,
    pub text: String,
    pub anchor: String,
}

/// GitHub heading anchor slug.
///
/// - lowercase
/// - drop everything that is not a word character, whitespace or hyphen
/// - whitespace runs become a single hyphen
/// - hyphen runs collapse, leading and trailing hyphens are trimmed
pub fn github_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        } else if c.is_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        }
    }
    slug
}

/// All level 1-6 headers except the TOC's own heading.
pub fn extract_headers(markdown: &str) -> Vec<Header> {
    HEADER_RE
        .captures_iter(markdown)
        .filter_map(|caps| {
            let level = caps.get(1)?.as_str().len();
            let text = caps.get(2)?.as_str().trim().to_string();
            if text == TOC_HEADING {
                return None;
            }
            Some(Header {
                level,
                anchor: github_slug(&text),
                text,
            })
        })
        .collect()
}

/// `## Table of Contents` plus one bullet per header, or `None` without headers.
pub fn generate_toc(markdown: &str) -> Option<String> {
    let headers = extract_headers(markdown);
    if headers.is_empty() {
        return None;
    }
    let mut toc = format!("## {TOC_HEADING}\n\n");
    for header in &headers {
        toc.push_str(&"  ".repeat(header.level - 1));
        toc.push_str(&format!("- [{}](#{})\n", header.text, header.anchor));
    }
    Some(toc)
}

/// Splits off a leading `---` fenced frontmatter block, fences included.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    if !content.starts_with("---\n") {
        return (None, content);
    }
    match content[4..].find("---\n") {
        Some(close) => {
            let end = 4 + close + 4;
            (Some(&content[..end]), &content[end..])
        }
        None => (None, content),
    }
}

/// Removes an existing TOC: its heading plus the run of anchor bullets and
/// blank lines below it. The first other line ends the TOC, so a preamble or
/// a deeper first header after it is kept.
pub fn remove_existing_toc(body: &str) -> String {
    let marker = format!("## {TOC_HEADING}");
    let start = if body.starts_with(&marker) {
        0
    } else {
        match body.find(&format!("\n{marker}")) {
            Some(pos) => pos + 1,
            None => return body.to_string(),
        }
    };
    let mut end = body.len();
    let mut offset = start;
    for (i, line) in body[start..].split_inclusive('\n').enumerate() {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if i > 0 && !trimmed.trim().is_empty() && !TOC_BULLET_RE.is_match(trimmed) {
            end = offset;
            break;
        }
        offset += line.len();
    }
    format!("{}{}", &body[..start], &body[end..])
}

/// Inserts (or refreshes) the TOC right after the frontmatter.
pub fn add_toc(content: &str) -> String {
    let (frontmatter, body) = split_frontmatter(content);
    let body = remove_existing_toc(body);
    let Some(toc) = generate_toc(&body) else {
        return content.to_string();
    };
    let body = body.trim_start_matches('\n');
    match frontmatter {
        Some(fm) => format!("{fm}\n{toc}\n{body}"),
        None => format!("{toc}\n{body}"),
    }
}

/// Number of bullets in the TOC section of `content`.
pub fn toc_bullet_count(content: &str) -> usize {
    let marker = format!("## {TOC_HEADING}");
    let Some(start) = content.find(&marker) else {
        return 0;
    };
    content[start + marker.len()..]
        .lines()
        .skip_while(|l| l.trim().is_empty())
        .take_while(|l| l.trim_start().starts_with("- ["))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slug_rules() {
        assert_eq!(github_slug("Hello World"), "hello-world");
        assert_eq!(github_slug("Phase 1: Core Infrastructure"), "phase-1-core-infrastructure");
        assert_eq!(github_slug("API & Handlers"), "api-handlers");
        assert_eq!(github_slug("  -- Leading -- and trailing --  "), "leading-and-trailing");
        assert_eq!(github_slug("snake_case stays"), "snake_case-stays");
        assert_eq!(github_slug("Café Ünïcode"), "café-ünïcode");
    }

    #[test]
    fn slug_is_idempotent() {
        for text in [
            "Hello World",
            "Phase 1: Core Infrastructure",
            "  weird -- spacing\tand\ttabs ",
            "Sources & Cross-References",
            "Ünïcode — dashes",
            "___",
            "",
        ] {
            let once = github_slug(text);
            assert_eq!(github_slug(&once), once, "input {text:?}");
        }
    }

    #[test]
    fn toc_indents_by_level_and_skips_itself() {
        let md = "# Title\n## Table of Contents\n## Status\n### Phase 1: Core Infrastructure\n";
        let toc = generate_toc(md).unwrap();
        assert_eq!(
            toc,
            "## Table of Contents\n\n- [Title](#title)\n  - [Status](#status)\n    - [Phase 1: Core Infrastructure](#phase-1-core-infrastructure)\n"
        );
        assert!(generate_toc("no headers at all").is_none());
    }

    #[test]
    fn toc_goes_after_frontmatter() {
        let md = "---\ntitle: X\n---\n\n# X\n\n## Status\n\nok\n";
        let out = add_toc(md);
        assert_eq!(
            out,
            "---\ntitle: X\n---\n\n## Table of Contents\n\n- [X](#x)\n  - [Status](#status)\n\n# X\n\n## Status\n\nok\n"
        );
        assert_eq!(toc_bullet_count(&out), 2);
    }

    #[test]
    fn toc_goes_on_top_without_frontmatter() {
        let out = add_toc("# Doc\n\n## A\n");
        assert!(out.starts_with("## Table of Contents\n\n- [Doc](#doc)\n"));
        assert!(out.ends_with("# Doc\n\n## A\n"));
    }

    #[test]
    fn add_toc_is_a_fixed_point() {
        for md in [
            "---\ntitle: X\n---\n\n# X\n\n## Status\n\n### Deep\n\ntext\n",
            "# Doc\n\n## A\n\n---\n\n## B\n",
            "---\nk: v\n---\n# Only\n",
        ] {
            let once = add_toc(md);
            let twice = add_toc(&once);
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn text_around_the_toc_survives_a_refresh() {
        let cases = [
            (
                "Intro paragraph\n\n# Doc\n\n## A\n\ntext\n",
                "## Table of Contents\n\n- [Doc](#doc)\n  - [A](#a)\n\nIntro paragraph\n\n# Doc\n\n## A\n\ntext\n",
            ),
            (
                "### Deep first\n\nbody text\n",
                "## Table of Contents\n\n    - [Deep first](#deep-first)\n\n### Deep first\n\nbody text\n",
            ),
        ];
        for (md, expected) in cases {
            let once = add_toc(md);
            assert_eq!(once, expected);
            assert_eq!(add_toc(&once), once);
        }
    }

    #[test]
    fn only_anchor_bullets_belong_to_the_toc() {
        let body = "## Table of Contents\n\n- [A](#a)\n\n- [Site](https://example.com)\n\n# A\n";
        assert_eq!(
            remove_existing_toc(body),
            "- [Site](https://example.com)\n\n# A\n"
        );
    }

    #[test]
    fn existing_toc_is_replaced() {
        let md = "# Doc\n\n## Table of Contents\n\n- [Stale](#stale)\n\n## Fresh\n";
        let out = add_toc(md);
        assert!(!out.contains("Stale"));
        assert!(out.contains("- [Fresh](#fresh)"));
        assert_eq!(out.matches("## Table of Contents").count(), 1);
    }

    #[test]
    fn text_without_headers_is_unchanged() {
        assert_eq!(add_toc("plain text\n"), "plain text\n");
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let (fm, body) = split_frontmatter("---\nno closing fence\n# H\n");
        assert!(fm.is_none());
        assert!(body.starts_with("---\n"));
    }
}
