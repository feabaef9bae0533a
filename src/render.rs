//! Render pipeline: model text to display HTML

use pulldown_cmark::{html, CowStr, Event, Options, Parser};
use regex::Regex;
use std::sync::OnceLock;

/// Warning attached when the diagram reply had no fence to strip
pub const UNFENCED_WARNING: &str = "Diagram response was not fenced; rendering raw output";

/// Warning attached when the opening fence was never closed
pub const UNTERMINATED_WARNING: &str =
    "Diagram response had no closing fence; rendering everything after the opening fence";

/// Escape text for placement inside HTML element content or attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// CommonMark to HTML. Raw HTML in the input is shown as text, not injected.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(CowStr::from(raw.into_string())),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Diagram text extracted from a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    pub body: String,
    pub warning: Option<&'static str>,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"^\s*(`{3,}|~{3,})\s*([\w+.-]*)\s*$").expect("valid regex"))
}

/// Pull the diagram out of the first fenced block in `reply`.
///
/// A fence-shaped line only opens a block when something follows it, it carries
/// an info string, or nothing but blank lines precedes it. Otherwise it is a stray
/// closing fence, and the reply is used raw (minus fence lines) with a warning.
/// Returns `None` when nothing is left to draw.
pub fn extract_diagram(reply: &str) -> Option<DiagramSource> {
    let lines: Vec<&str> = reply.lines().collect();
    let fence = fence_regex();

    let open = lines.iter().enumerate().find_map(|(idx, line)| {
        fence
            .captures(line)
            .map(|caps| (idx, caps[1].to_string(), caps[2].is_empty()))
    });

    let fenced = open.and_then(|(start, marker, bare)| {
        let close = lines[start + 1..].iter().position(|line| {
            fence
                .captures(line)
                .map(|caps| {
                    caps[2].is_empty()
                        && caps[1].starts_with(&marker[..1])
                        && caps[1].len() >= marker.len()
                })
                .unwrap_or(false)
        });
        let opens_block = close.is_some()
            || !bare
            || lines[..start].iter().all(|line| line.trim().is_empty());
        if !opens_block {
            return None;
        }
        let (body, warning) = match close {
            Some(offset) => (lines[start + 1..start + 1 + offset].join("\n"), None),
            None => (lines[start + 1..].join("\n"), Some(UNTERMINATED_WARNING)),
        };
        let body = tidy(&body);
        (!body.is_empty()).then_some(DiagramSource { body, warning })
    });

    fenced.or_else(|| {
        let raw: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|line| !fence.is_match(line))
            .collect();
        let body = tidy(&raw.join("\n"));
        (!body.is_empty()).then_some(DiagramSource {
            body,
            warning: Some(UNFENCED_WARNING),
        })
    })
}

fn tidy(body: &str) -> String {
    body.trim_matches('\n').trim_end().to_string()
}

/// Container the page's Mermaid script picks up and draws
pub fn render_diagram(body: &str) -> String {
    format!("<div class=\"mermaid\">{}</div>", escape_html(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_reply_yields_inner_lines() {
        let reply = ["```mermaid", "erDiagram", "A ||--o{ B : has", "```"].join("\n");
        let source = extract_diagram(&reply).unwrap();
        assert_eq!(source.body, "erDiagram\nA ||--o{ B : has");
        assert_eq!(source.warning, None);
    }

    #[test]
    fn test_prose_around_fence_is_dropped() {
        let reply = "Here is your diagram:\n\n```\nerDiagram\n  CUSTOMER ||--o{ ORDERS : places\n```\nLet me know!";
        let source = extract_diagram(reply).unwrap();
        assert_eq!(source.body, "erDiagram\n  CUSTOMER ||--o{ ORDERS : places");
    }

    #[test]
    fn test_unfenced_reply_renders_raw_with_warning() {
        let reply = "erDiagram\n    A ||--|| B : owns\n";
        let source = extract_diagram(reply).unwrap();
        assert_eq!(source.body, "erDiagram\n    A ||--|| B : owns");
        assert_eq!(source.warning, Some(UNFENCED_WARNING));
    }

    #[test]
    fn test_trailing_fence_only_renders_raw() {
        let source = extract_diagram("erDiagram\nCUSTOMER ||--o{ ORDERS : places\n```").unwrap();
        assert_eq!(source.body, "erDiagram\nCUSTOMER ||--o{ ORDERS : places");
        assert_eq!(source.warning, Some(UNFENCED_WARNING));
    }

    #[test]
    fn test_trailing_fence_with_newline() {
        let source = extract_diagram("erDiagram\nA ||--o{ B : has\n```\n").unwrap();
        assert_eq!(source.body, "erDiagram\nA ||--o{ B : has");
        assert_eq!(source.warning, Some(UNFENCED_WARNING));
    }

    #[test]
    fn test_unterminated_fence() {
        let source = extract_diagram("~~~mermaid\nerDiagram\nA ||--o{ B : has").unwrap();
        assert_eq!(source.body, "erDiagram\nA ||--o{ B : has");
        assert_eq!(source.warning, Some(UNTERMINATED_WARNING));
    }

    #[test]
    fn test_empty_block_is_nothing() {
        assert_eq!(extract_diagram("```mermaid\n```"), None);
        assert_eq!(extract_diagram("   "), None);
    }

    #[test]
    fn test_render_diagram_escapes() {
        assert_eq!(
            render_diagram("A ||--o{ B : \"x<y\""),
            "<div class=\"mermaid\">A ||--o{ B : &quot;x&lt;y&quot;</div>"
        );
    }

    #[test]
    fn test_markdown_renders_code_block() {
        let html = markdown_to_html("# Overview\n\n```sql\nSELECT 1;\n```\n");
        assert!(html.contains("<h1>Overview</h1>"));
        assert!(html.contains("<code class=\"language-sql\">SELECT 1;\n</code>"));
    }

    #[test]
    fn test_markdown_neutralizes_raw_html() {
        let html = markdown_to_html("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }
}
