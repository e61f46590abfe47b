//! Output rendering: HTML renderer, plain-text renderer, escaping
//!
//! The [`Renderer`] trait is the per-kind formatting surface. The parser
//! resolves each token kind through its override chains first and only then
//! calls the configured base renderer, so these methods are always the final
//! fallback of a chain.
//!
//! A renderer method returns the finished fragment as a `String`; declining
//! is expressed at the chain level (`Option`), never here. Empty output is
//! an empty string.

use crate::token::Align;

/// Escape HTML-significant characters.
///
/// With `encode` set, every `&` is escaped; otherwise pre-existing entities
/// are left alone.
pub fn escape(text: &str, encode: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    for (i, ch) in text.char_indices() {
        match ch {
            '&' => {
                if encode || !is_entity_start(&bytes[i..]) {
                    out.push_str("&amp;");
                } else {
                    out.push('&');
                }
            }
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Whether the byte slice starts with a character entity like `&amp;` or `&#39;`
fn is_entity_start(bytes: &[u8]) -> bool {
    debug_assert_eq!(bytes.first(), Some(&b'&'));
    let mut i = 1;
    if bytes.get(i) == Some(&b'#') {
        i += 1;
        if bytes.get(i).map_or(false, |b| *b == b'x' || *b == b'X') {
            i += 1;
        }
        let digits = bytes[i..].iter().take_while(|b| b.is_ascii_hexdigit()).count();
        digits > 0 && bytes.get(i + digits) == Some(&b';')
    } else {
        let letters = bytes[i..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        letters > 0 && bytes.get(i + letters) == Some(&b';')
    }
}

/// Per-kind output formatting, selected per token by the parser
pub trait Renderer: Send + Sync {
    fn code(&self, text: &str, lang: Option<&str>, escaped: bool) -> String;
    fn blockquote(&self, body: &str) -> String;
    fn html(&self, html: &str) -> String;
    fn heading(&self, body: &str, depth: u8) -> String;
    fn hr(&self) -> String;
    fn list(&self, body: &str, ordered: bool, start: Option<u32>) -> String;
    fn list_item(&self, body: &str) -> String;
    fn checkbox(&self, checked: bool) -> String;
    fn paragraph(&self, body: &str) -> String;
    fn table(&self, header: &str, body: &str) -> String;
    fn table_row(&self, body: &str) -> String;
    fn table_cell(&self, body: &str, header: bool, align: Align) -> String;
    fn strong(&self, body: &str) -> String;
    fn em(&self, body: &str) -> String;
    fn codespan(&self, text: &str) -> String;
    fn br(&self) -> String;
    fn del(&self, body: &str) -> String;
    fn link(&self, href: &str, title: Option<&str>, body: &str) -> String;
    fn image(&self, href: &str, title: Option<&str>, alt: &str) -> String;
    fn text(&self, text: &str) -> String;
}

/// The default HTML renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn code(&self, text: &str, lang: Option<&str>, escaped: bool) -> String {
        // Enriched code already carries markup; escape only raw source text
        let escaped = if escaped {
            text.to_string()
        } else {
            escape(text, true)
        };
        match lang.and_then(|l| l.split_whitespace().next()) {
            Some(lang) => format!(
                "<pre><code class=\"language-{}\">{}\n</code></pre>\n",
                escape(lang, true),
                escaped
            ),
            None => format!("<pre><code>{}\n</code></pre>\n", escaped),
        }
    }

    fn blockquote(&self, body: &str) -> String {
        format!("<blockquote>\n{}</blockquote>\n", body)
    }

    fn html(&self, html: &str) -> String {
        html.to_string()
    }

    fn heading(&self, body: &str, depth: u8) -> String {
        format!("<h{depth}>{body}</h{depth}>\n")
    }

    fn hr(&self) -> String {
        "<hr>\n".to_string()
    }

    fn list(&self, body: &str, ordered: bool, start: Option<u32>) -> String {
        if ordered {
            match start {
                Some(n) if n != 1 => format!("<ol start=\"{}\">\n{}</ol>\n", n, body),
                _ => format!("<ol>\n{}</ol>\n", body),
            }
        } else {
            format!("<ul>\n{}</ul>\n", body)
        }
    }

    fn list_item(&self, body: &str) -> String {
        format!("<li>{}</li>\n", body)
    }

    fn checkbox(&self, checked: bool) -> String {
        if checked {
            "<input checked=\"\" disabled=\"\" type=\"checkbox\"> ".to_string()
        } else {
            "<input disabled=\"\" type=\"checkbox\"> ".to_string()
        }
    }

    fn paragraph(&self, body: &str) -> String {
        format!("<p>{}</p>\n", body)
    }

    fn table(&self, header: &str, body: &str) -> String {
        if body.is_empty() {
            format!("<table>\n<thead>\n{}</thead>\n</table>\n", header)
        } else {
            format!(
                "<table>\n<thead>\n{}</thead>\n<tbody>\n{}</tbody>\n</table>\n",
                header, body
            )
        }
    }

    fn table_row(&self, body: &str) -> String {
        format!("<tr>\n{}</tr>\n", body)
    }

    fn table_cell(&self, body: &str, header: bool, align: Align) -> String {
        let tag = if header { "th" } else { "td" };
        match align {
            Align::None => format!("<{tag}>{body}</{tag}>\n"),
            Align::Left => format!("<{tag} align=\"left\">{body}</{tag}>\n"),
            Align::Center => format!("<{tag} align=\"center\">{body}</{tag}>\n"),
            Align::Right => format!("<{tag} align=\"right\">{body}</{tag}>\n"),
        }
    }

    fn strong(&self, body: &str) -> String {
        format!("<strong>{}</strong>", body)
    }

    fn em(&self, body: &str) -> String {
        format!("<em>{}</em>", body)
    }

    fn codespan(&self, text: &str) -> String {
        format!("<code>{}</code>", escape(text, true))
    }

    fn br(&self) -> String {
        "<br>".to_string()
    }

    fn del(&self, body: &str) -> String {
        format!("<del>{}</del>", body)
    }

    fn link(&self, href: &str, title: Option<&str>, body: &str) -> String {
        match title {
            Some(title) => format!(
                "<a href=\"{}\" title=\"{}\">{}</a>",
                escape(href, false),
                escape(title, false),
                body
            ),
            None => format!("<a href=\"{}\">{}</a>", escape(href, false), body),
        }
    }

    fn image(&self, href: &str, title: Option<&str>, alt: &str) -> String {
        match title {
            Some(title) => format!(
                "<img src=\"{}\" alt=\"{}\" title=\"{}\">",
                escape(href, false),
                escape(alt, false),
                escape(title, false)
            ),
            None => format!("<img src=\"{}\" alt=\"{}\">", escape(href, false), escape(alt, false)),
        }
    }

    fn text(&self, text: &str) -> String {
        escape(text, false)
    }
}

/// Plain-text renderer, used where markup is not allowed (image alt text)
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn code(&self, text: &str, _lang: Option<&str>, _escaped: bool) -> String {
        text.to_string()
    }

    fn blockquote(&self, body: &str) -> String {
        body.to_string()
    }

    fn html(&self, html: &str) -> String {
        html.to_string()
    }

    fn heading(&self, body: &str, _depth: u8) -> String {
        body.to_string()
    }

    fn hr(&self) -> String {
        String::new()
    }

    fn list(&self, body: &str, _ordered: bool, _start: Option<u32>) -> String {
        body.to_string()
    }

    fn list_item(&self, body: &str) -> String {
        body.to_string()
    }

    fn checkbox(&self, _checked: bool) -> String {
        String::new()
    }

    fn paragraph(&self, body: &str) -> String {
        body.to_string()
    }

    fn table(&self, _header: &str, _body: &str) -> String {
        String::new()
    }

    fn table_row(&self, _body: &str) -> String {
        String::new()
    }

    fn table_cell(&self, _body: &str, _header: bool, _align: Align) -> String {
        String::new()
    }

    fn strong(&self, body: &str) -> String {
        body.to_string()
    }

    fn em(&self, body: &str) -> String {
        body.to_string()
    }

    fn codespan(&self, text: &str) -> String {
        text.to_string()
    }

    fn br(&self) -> String {
        String::new()
    }

    fn del(&self, body: &str) -> String {
        body.to_string()
    }

    fn link(&self, _href: &str, _title: Option<&str>, body: &str) -> String {
        body.to_string()
    }

    fn image(&self, _href: &str, _title: Option<&str>, alt: &str) -> String {
        alt.to_string()
    }

    fn text(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_basic() {
        assert_eq!(escape("<b> & \"q\"", true), "&lt;b&gt; &amp; &quot;q&quot;");
    }

    #[test]
    fn test_escape_preserves_entities_without_encode() {
        assert_eq!(escape("a &amp; b", false), "a &amp; b");
        assert_eq!(escape("a & b", false), "a &amp; b");
        assert_eq!(escape("&#39; &#x27;", false), "&#39; &#x27;");
        assert_eq!(escape("&bogus", false), "&amp;bogus");
    }

    #[test]
    fn test_code_with_language() {
        let r = HtmlRenderer;
        assert_eq!(
            r.code("let x = 1;", Some("rust"), false),
            "<pre><code class=\"language-rust\">let x = 1;\n</code></pre>\n"
        );
    }

    #[test]
    fn test_code_escapes_contents() {
        let r = HtmlRenderer;
        assert_eq!(
            r.code("<script>", None, false),
            "<pre><code>&lt;script&gt;\n</code></pre>\n"
        );
    }

    #[test]
    fn test_code_escaped_flag_passes_markup_through() {
        let r = HtmlRenderer;
        assert_eq!(
            r.code("<span class=\"kw\">let</span>", Some("rust"), true),
            "<pre><code class=\"language-rust\"><span class=\"kw\">let</span>\n</code></pre>\n"
        );
    }

    #[test]
    fn test_ordered_list_start() {
        let r = HtmlRenderer;
        assert_eq!(
            r.list("<li>a</li>\n", true, Some(3)),
            "<ol start=\"3\">\n<li>a</li>\n</ol>\n"
        );
        assert_eq!(r.list("<li>a</li>\n", true, Some(1)), "<ol>\n<li>a</li>\n</ol>\n");
    }

    #[test]
    fn test_link_with_title() {
        let r = HtmlRenderer;
        assert_eq!(
            r.link("http://x.invalid", Some("t"), "body"),
            "<a href=\"http://x.invalid\" title=\"t\">body</a>"
        );
    }

    #[test]
    fn test_text_renderer_strips_markup() {
        let r = TextRenderer;
        assert_eq!(r.strong("bold"), "bold");
        assert_eq!(r.image("x", None, "alt"), "alt");
        assert_eq!(r.br(), "");
    }
}
