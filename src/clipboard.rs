use std::sync::LazyLock;

use regex::Regex;

static ANCHOR_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a\b").expect("invalid anchor regex"));
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a\s*>"#)
        .expect("invalid anchor regex")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("invalid tag regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastedTodo {
    pub text: String,
    pub url: Option<String>,
}

/// Splits a paste into title text and an optional link.
///
/// Only a paste whose HTML holds exactly one anchor yields a link; anything
/// else falls back to the plain text.
pub fn parse_paste(html: Option<&str>, text: &str) -> PastedTodo {
    if let Some(link) = html.and_then(single_link) {
        return link;
    }

    PastedTodo {
        text: text.trim().to_string(),
        url: None,
    }
}

fn single_link(html: &str) -> Option<PastedTodo> {
    if ANCHOR_OPEN.find_iter(html).count() != 1 {
        return None;
    }

    let captures = ANCHOR.captures(html)?;
    let href = captures
        .get(1)
        .or_else(|| captures.get(2))
        .or_else(|| captures.get(3))
        .map(|value| decode_entities(value.as_str().trim()))
        .filter(|href| !href.is_empty())?;
    let inner = captures.get(4).map(|value| value.as_str()).unwrap_or_default();
    let visible = TAG.replace_all(inner, "");
    let visible = decode_entities(WHITESPACE.replace_all(&visible, " ").trim());

    Some(PastedTodo {
        text: if visible.is_empty() { href.clone() } else { visible },
        url: Some(href),
    })
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_link_splits_text_and_url() {
        let html = r#"<meta charset="utf-8"><a href="https://example.com/issues/1?a=1&amp;b=2">Fix <b>login</b>
            bug</a>"#;
        let pasted = parse_paste(Some(html), "Fix login bug");
        assert_eq!(
            pasted,
            PastedTodo {
                text: "Fix login bug".to_string(),
                url: Some("https://example.com/issues/1?a=1&b=2".to_string()),
            }
        );
    }

    #[test]
    fn multiple_links_fall_back_to_plain_text() {
        let html = r#"<a href="https://a.example">a</a> and <a href="https://b.example">b</a>"#;
        let pasted = parse_paste(Some(html), "  a and b \n");
        assert_eq!(pasted.text, "a and b");
        assert_eq!(pasted.url, None);
    }

    #[test]
    fn plain_text_without_html() {
        let pasted = parse_paste(None, "write report");
        assert_eq!(pasted.text, "write report");
        assert_eq!(pasted.url, None);
    }

    #[test]
    fn single_quoted_href_and_empty_text_use_the_url() {
        let html = "<A HREF='https://example.com/x'><img src='x.png'></A>";
        let pasted = parse_paste(Some(html), "");
        assert_eq!(pasted.text, "https://example.com/x");
        assert_eq!(pasted.url.as_deref(), Some("https://example.com/x"));
    }

    #[test]
    fn anchor_without_href_is_plain_text() {
        let pasted = parse_paste(Some("<a name=\"top\">Top</a>"), "Top");
        assert_eq!(pasted.url, None);
        assert_eq!(pasted.text, "Top");
    }
}
