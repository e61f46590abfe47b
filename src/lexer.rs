//! Block and inline lexing of markdown source into a token tree
//!
//! The lexer runs in two passes:
//! 1. The block pass splits source into block tokens (paragraphs, headings,
//!    code, lists, tables, ...) and collects link-reference definitions into
//!    a side table.
//! 2. The inline pass fills the `tokens` fields of text-bearing blocks with
//!    inline tokens (emphasis, links, code spans, ...), once the full side
//!    table is known.
//!
//! Extension rules registered in the configuration are tried before every
//! built-in rule at their level, giving them first refusal. Built-in rules
//! can additionally be wrapped per rule name by whole-tokenizer override
//! packs; an override returning `None` falls back to the implementation
//! below it.
//!
//! Rules advance the cursor by the exact length of the token's `raw` text,
//! so every rule must consume at least one byte.

use crate::config::Config;
use crate::error::CompileError;
use crate::extensions::{StartFn, TokenizerFn};
use crate::token::{Align, LinkRef, TableCell, Token, TokenList};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[ \t]*\n)+").unwrap());
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})[ \t]+([^\n]*)(?:\n+|$)").unwrap());
static HR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}(?:(?:- *){3,}|(?:_ *){3,}|(?:\* *){3,})(?:\n+|$)").unwrap()
});
static DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^ {0,3}\[([^\]\n]+)\]: *<?([^\s>]+)>?(?: +(?:"([^"\n]*)"|'([^'\n]*)'|\(([^)\n]*)\)))? *(?:\n+|$)"#)
        .unwrap()
});
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^( {0,3})([*+-]|[0-9]{1,9}[.)])( +|\n|$)").unwrap());
static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^( {0,3})(`{3,}|~{3,})([^\n]*)(?:\n|$)").unwrap());
static TABLE_DELIM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ *\|? *:?-+:? *(?:\| *:?-+:? *)*\|? *$").unwrap());
static HTML_BLOCK_OPEN: Lazy<Regex> = Lazy::new(|| {
    // The tag name must be followed by whitespace, `>`, `/>`, or the end of
    // the line, so `<scheme:...>` autolinks stay out of the block rule.
    Regex::new(r"^ {0,3}<(?:/?[a-zA-Z][a-zA-Z0-9-]*(?:[ \t>\n]|/>|$)|!--)").unwrap()
});

static ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"^\\([!"#$%&'()*+,\-./:;<=>?@\[\]\\^_`{|}~])"##).unwrap());
static AUTOLINK_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<(https?://[^\s<>]+)>").unwrap());
static AUTOLINK_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([^\s<>@]+@[^\s<>]+\.[a-zA-Z0-9]+)>").unwrap());
static INLINE_HTML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</?[a-zA-Z][a-zA-Z0-9-]*(?:\s[^<>\n]*)?/?>").unwrap());
static STRONG_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*([^*\n]+)\*\*").unwrap());
static STRONG_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^__([^_\n]+)__").unwrap());
static EM_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*([^*\n]+)\*").unwrap());
static EM_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_([^_\n]+)_").unwrap());
static DEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^~~([^~\n]+)~~").unwrap());
static HARD_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?: {2,}|\\)\n").unwrap());

/// The markdown lexer: one instance per compilation call
pub struct Lexer {
    config: Arc<Config>,
    /// Link-reference definitions collected during the block pass
    pub links: HashMap<String, LinkRef>,
    block_rules: Vec<TokenizerFn>,
    inline_rules: Vec<TokenizerFn>,
    overrides: HashMap<String, Vec<TokenizerFn>>,
    start_block: Vec<StartFn>,
    start_inline: Vec<StartFn>,
}

impl Lexer {
    pub fn new(config: Arc<Config>) -> Self {
        Lexer {
            block_rules: config.registry.block.clone(),
            inline_rules: config.registry.inline.clone(),
            overrides: config.tokenizer_overrides.clone(),
            start_block: config.registry.start_block.clone(),
            start_inline: config.registry.start_inline.clone(),
            links: HashMap::new(),
            config,
        }
    }

    /// Lex a full document: block pass, then inline fill
    pub fn lex(config: Arc<Config>, src: &str) -> Result<TokenList, CompileError> {
        let mut lexer = Lexer::new(config);
        let src = normalize_source(src);
        let mut tokens = lexer.block_tokens(&src);
        lexer.fill_inline(&mut tokens);
        Ok(TokenList {
            tokens,
            links: std::mem::take(&mut lexer.links),
        })
    }

    /// Lex inline constructs only (no block structure, no side table)
    pub fn lex_inline(config: Arc<Config>, src: &str) -> Result<Vec<Token>, CompileError> {
        let mut lexer = Lexer::new(config);
        let src = normalize_source(src);
        Ok(lexer.inline_tokens(src.trim_end_matches('\n')))
    }

    fn gfm(&self) -> bool {
        self.config.options.gfm
    }

    /// Run a built-in rule through its override chain, if any
    fn run_rule<F>(&mut self, name: &str, src: &str, builtin: F) -> Option<Token>
    where
        F: FnOnce(&mut Self, &str) -> Option<Token>,
    {
        if let Some(chain) = self.overrides.get(name).cloned() {
            for f in &chain {
                if let Some(token) = f(self, src) {
                    return Some(token);
                }
            }
        }
        builtin(self, src)
    }

    // ==================== block pass ====================

    /// Split source into block tokens. Public so extension tokenizers can
    /// lex nested block content.
    pub fn block_tokens(&mut self, src: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut rest = src;
        'outer: while !rest.is_empty() {
            // Extension rules get first refusal
            for i in 0..self.block_rules.len() {
                let rule = self.block_rules[i].clone();
                if let Some(token) = rule(self, rest) {
                    let consumed = token.raw().len();
                    debug_assert!(consumed > 0, "block extension consumed nothing");
                    if consumed == 0 {
                        break;
                    }
                    rest = &rest[consumed..];
                    tokens.push(token);
                    continue 'outer;
                }
            }

            let token = self
                .run_rule("space", rest, Self::space)
                .or_else(|| self.run_rule("fences", rest, Self::fences))
                .or_else(|| self.run_rule("code", rest, Self::indented_code))
                .or_else(|| self.run_rule("heading", rest, Self::heading))
                .or_else(|| self.run_rule("hr", rest, Self::hr))
                .or_else(|| self.run_rule("blockquote", rest, Self::blockquote))
                .or_else(|| self.run_rule("list", rest, Self::list))
                .or_else(|| self.run_rule("html", rest, Self::html_block))
                .or_else(|| self.run_rule("def", rest, Self::def))
                .or_else(|| self.run_rule("table", rest, Self::table))
                .or_else(|| self.run_rule("paragraph", rest, Self::paragraph));

            match token {
                Some(token) => {
                    let consumed = token.raw().len();
                    debug_assert!(consumed > 0, "block rule consumed nothing");
                    if consumed == 0 {
                        break;
                    }
                    rest = &rest[consumed..];
                    tokens.push(token);
                }
                // Paragraph accepts anything non-empty, so this is unreachable;
                // bail rather than spin if a broken override declined everything.
                None => break,
            }
        }
        tokens
    }

    fn space(&mut self, src: &str) -> Option<Token> {
        let m = BLANK.find(src)?;
        Some(Token::Space {
            raw: m.as_str().to_string(),
        })
    }

    fn fences(&mut self, src: &str) -> Option<Token> {
        let caps = FENCE_OPEN.captures(src)?;
        let opening = caps.get(0).unwrap().as_str();
        let fence = caps.get(2).unwrap().as_str();
        let fence_char = fence.chars().next().unwrap();
        let info = caps.get(3).unwrap().as_str().trim();
        let lang = info.split_whitespace().next().map(|s| s.to_string());

        let mut consumed = opening.len();
        let mut body = String::new();
        let mut rest = &src[consumed..];
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            let trimmed = line.trim();
            let closes = trimmed.len() >= fence.len()
                && trimmed.chars().all(|c| c == fence_char)
                && line.len() - line.trim_start().len() <= 3;
            consumed += line_len;
            rest = &rest[line_len..];
            if closes {
                break;
            }
            body.push_str(line);
            body.push('\n');
        }

        Some(Token::Code {
            raw: src[..consumed].to_string(),
            text: body.trim_end_matches('\n').to_string(),
            lang,
            escaped: false,
        })
    }

    fn indented_code(&mut self, src: &str) -> Option<Token> {
        if !src.starts_with("    ") {
            return None;
        }
        let mut consumed = 0;
        let mut body = String::new();
        let mut rest = src;
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            if let Some(stripped) = line.strip_prefix("    ") {
                body.push_str(stripped);
                body.push('\n');
            } else {
                break;
            }
            consumed += line_len;
            rest = &rest[line_len..];
        }
        if consumed == 0 {
            return None;
        }
        Some(Token::Code {
            raw: src[..consumed].to_string(),
            text: body.trim_end_matches('\n').to_string(),
            lang: None,
            escaped: false,
        })
    }

    fn heading(&mut self, src: &str) -> Option<Token> {
        let caps = HEADING.captures(src)?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let depth = caps.get(1).unwrap().as_str().len() as u8;
        // Strip an optional closing hash run
        let mut text = caps.get(2).unwrap().as_str().trim_end();
        let without_hashes = text.trim_end_matches('#');
        if without_hashes.len() < text.len()
            && (without_hashes.is_empty() || without_hashes.ends_with(' '))
        {
            text = without_hashes.trim_end();
        }
        Some(Token::Heading {
            raw,
            depth,
            text: text.to_string(),
            tokens: Vec::new(),
        })
    }

    fn hr(&mut self, src: &str) -> Option<Token> {
        let m = HR.find(src)?;
        Some(Token::Hr {
            raw: m.as_str().to_string(),
        })
    }

    fn blockquote(&mut self, src: &str) -> Option<Token> {
        let mut consumed = 0;
        let mut inner = String::new();
        let mut rest = src;
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            let stripped = line.trim_start_matches(' ');
            if line.len() - stripped.len() > 3 || !stripped.starts_with('>') {
                break;
            }
            let content = stripped[1..].strip_prefix(' ').unwrap_or(&stripped[1..]);
            inner.push_str(content);
            inner.push('\n');
            consumed += line_len;
            rest = &rest[line_len..];
        }
        if consumed == 0 {
            return None;
        }
        let tokens = self.block_tokens(&inner);
        Some(Token::Blockquote {
            raw: src[..consumed].to_string(),
            text: inner.trim_end_matches('\n').to_string(),
            tokens,
        })
    }

    fn list(&mut self, src: &str) -> Option<Token> {
        let caps = BULLET.captures(src)?;
        let ordered = is_ordered_marker(caps.get(2).unwrap().as_str());
        let start = if ordered {
            let marker = caps.get(2).unwrap().as_str();
            marker[..marker.len() - 1].parse::<u32>().ok()
        } else {
            None
        };

        let mut items: Vec<(String, String)> = Vec::new(); // (raw, dedented source)
        let mut loose = false;
        let mut pos = 0;

        while pos < src.len() {
            let rest = &src[pos..];
            let Some(c) = BULLET.captures(rest) else { break };
            if is_ordered_marker(c.get(2).unwrap().as_str()) != ordered {
                break;
            }
            let indent = c.get(1).unwrap().as_str().len();
            let marker_len = c.get(2).unwrap().as_str().len();
            let spacing = c.get(3).unwrap().as_str();
            let content_offset = indent + marker_len + if spacing.starts_with(' ') { spacing.len() } else { 1 };

            let (first_line, first_len) = take_line(rest);
            let mut item_raw = String::from(&rest[..first_len]);
            let mut item_src = String::new();
            if first_line.len() > content_offset.min(first_line.len()) {
                item_src.push_str(&first_line[content_offset.min(first_line.len())..]);
            }
            item_src.push('\n');

            let mut cursor = first_len;
            let mut saw_blank = false;
            while pos + cursor < src.len() {
                let line_rest = &src[pos + cursor..];
                let (line, line_len) = take_line(line_rest);
                if line.trim().is_empty() {
                    // Blank line: the item continues only if indented content
                    // or another bullet follows
                    let after = &line_rest[line_len..];
                    let continues = after
                        .lines()
                        .next()
                        .map(|next| {
                            indent_of(next) >= content_offset
                                || BULLET
                                    .captures(next)
                                    .map(|b| is_ordered_marker(b.get(2).unwrap().as_str()) == ordered)
                                    .unwrap_or(false)
                        })
                        .unwrap_or(false);
                    if !continues {
                        break;
                    }
                    loose = true;
                    saw_blank = true;
                    item_raw.push_str(&line_rest[..line_len]);
                    item_src.push('\n');
                    cursor += line_len;
                    continue;
                }
                if saw_blank && indent_of(line) < content_offset {
                    break;
                }
                if !saw_blank && BULLET.is_match(line) && indent_of(line) < content_offset {
                    break;
                }
                if indent_of(line) < content_offset && !saw_blank {
                    // Lazy continuation of the first paragraph
                    if BULLET.is_match(line) {
                        break;
                    }
                    item_src.push_str(line.trim_start());
                } else {
                    item_src.push_str(&line[content_offset.min(line.len())..]);
                }
                item_src.push('\n');
                item_raw.push_str(&line_rest[..line_len]);
                cursor += line_len;
                saw_blank = false;
            }

            pos += cursor;
            items.push((item_raw, item_src));
        }

        if items.is_empty() {
            return None;
        }

        let raw = src[..pos].to_string();
        let item_tokens: Vec<Token> = items
            .into_iter()
            .map(|(item_raw, item_src)| {
                let mut text = item_src.trim_end_matches('\n').to_string();
                let mut task = false;
                let mut checked = None;
                if self.gfm() {
                    if let Some(rest) = strip_task_marker(&text) {
                        task = true;
                        checked = Some(rest.0);
                        text = rest.1;
                    }
                }
                let tokens = self.block_tokens(&format!("{}\n", text));
                Some(Token::ListItem {
                    raw: item_raw,
                    task,
                    checked: if task { checked } else { None },
                    loose,
                    text,
                    tokens,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Token::List {
            raw,
            ordered,
            start,
            loose,
            items: item_tokens,
        })
    }

    fn html_block(&mut self, src: &str) -> Option<Token> {
        HTML_BLOCK_OPEN.find(src)?;
        let mut consumed = 0;
        let mut rest = src;
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            if line.trim().is_empty() {
                break;
            }
            consumed += line_len;
            rest = &rest[line_len..];
        }
        let raw = src[..consumed].to_string();
        Some(Token::Html {
            text: raw.clone(),
            raw,
        })
    }

    fn def(&mut self, src: &str) -> Option<Token> {
        let caps = DEF.captures(src)?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let tag = normalize_label(caps.get(1).unwrap().as_str());
        let href = caps.get(2).unwrap().as_str().to_string();
        let title = caps
            .get(3)
            .or_else(|| caps.get(4))
            .or_else(|| caps.get(5))
            .map(|m| m.as_str().to_string());
        // First definition for a label wins
        self.links.entry(tag.clone()).or_insert_with(|| LinkRef {
            href: href.clone(),
            title: title.clone(),
        });
        Some(Token::Def {
            raw,
            tag,
            href,
            title,
        })
    }

    fn table(&mut self, src: &str) -> Option<Token> {
        if !self.gfm() {
            return None;
        }
        let (header_line, header_len) = take_line(src);
        if !header_line.contains('|') || header_line.trim().is_empty() {
            return None;
        }
        let delim_rest = &src[header_len..];
        let (delim_line, delim_len) = take_line(delim_rest);
        if !TABLE_DELIM.is_match(delim_line) || !delim_line.contains('-') {
            return None;
        }

        let header_texts = split_cells(header_line);
        let aligns: Vec<Align> = split_cells(delim_line)
            .iter()
            .map(|c| parse_align(c))
            .collect::<Option<Vec<_>>>()?;
        if header_texts.len() != aligns.len() {
            return None;
        }

        let mut consumed = header_len + delim_len;
        let mut rows = Vec::new();
        let mut rest = &src[consumed..];
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            if line.trim().is_empty() {
                break;
            }
            let mut cells = split_cells(line);
            cells.resize(header_texts.len(), String::new());
            rows.push(cells);
            consumed += line_len;
            rest = &rest[line_len..];
        }

        let header = header_texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| TableCell {
                text,
                tokens: Vec::new(),
                header: true,
                align: aligns[i],
            })
            .collect();
        let rows = rows
            .into_iter()
            .map(|cells| {
                cells
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| TableCell {
                        text,
                        tokens: Vec::new(),
                        header: false,
                        align: aligns[i],
                    })
                    .collect()
            })
            .collect();

        Some(Token::Table {
            raw: src[..consumed].to_string(),
            header,
            align: aligns,
            rows,
        })
    }

    fn paragraph(&mut self, src: &str) -> Option<Token> {
        let mut consumed = 0;
        let mut rest = src;
        let mut first = true;
        while !rest.is_empty() {
            let (line, line_len) = take_line(rest);
            if line.trim().is_empty() {
                break;
            }
            if !first && self.interrupts_paragraph(rest) {
                break;
            }
            consumed += line_len;
            rest = &rest[line_len..];
            first = false;
        }
        if consumed == 0 {
            // Nothing matched anything else either; consume one line defensively
            let (_, line_len) = take_line(src);
            consumed = line_len;
        }
        let raw = src[..consumed].to_string();
        Some(Token::Paragraph {
            text: raw.trim_end_matches('\n').to_string(),
            raw,
            tokens: Vec::new(),
        })
    }

    /// Whether the remaining source starts a construct that interrupts a paragraph
    fn interrupts_paragraph(&self, rest: &str) -> bool {
        let (line, _) = take_line(rest);
        if HEADING.is_match(line)
            || HR.is_match(rest)
            || FENCE_OPEN.is_match(line)
            || BULLET.is_match(line)
            || line.trim_start().starts_with('>')
            || HTML_BLOCK_OPEN.is_match(line)
        {
            return true;
        }
        // Extension start probes can cut a paragraph short too
        self.start_block.iter().any(|probe| probe(rest) == Some(0))
    }

    // ==================== inline pass ====================

    /// Fill the inline `tokens` fields across a block token tree
    fn fill_inline(&mut self, tokens: &mut Vec<Token>) {
        for token in tokens.iter_mut() {
            match token {
                Token::Paragraph { text, tokens, .. }
                | Token::Heading { text, tokens, .. }
                | Token::Text { text, tokens, .. } => {
                    let text = text.clone();
                    *tokens = self.inline_tokens(&text);
                }
                Token::Blockquote { tokens, .. } => self.fill_inline(tokens),
                Token::List { items, .. } => {
                    for item in items.iter_mut() {
                        if let Token::ListItem { tokens, .. } = item {
                            self.fill_inline(tokens);
                        }
                    }
                }
                Token::Table { header, rows, .. } => {
                    for cell in header.iter_mut() {
                        let text = cell.text.clone();
                        cell.tokens = self.inline_tokens(&text);
                    }
                    for row in rows.iter_mut() {
                        for cell in row.iter_mut() {
                            let text = cell.text.clone();
                            cell.tokens = self.inline_tokens(&text);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Lex inline constructs from a text run. Public so extension tokenizers
    /// can lex nested inline content.
    pub fn inline_tokens(&mut self, src: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut rest = src;
        'outer: while !rest.is_empty() {
            for i in 0..self.inline_rules.len() {
                let rule = self.inline_rules[i].clone();
                if let Some(token) = rule(self, rest) {
                    let consumed = token.raw().len();
                    debug_assert!(consumed > 0, "inline extension consumed nothing");
                    if consumed == 0 {
                        break;
                    }
                    rest = &rest[consumed..];
                    tokens.push(token);
                    continue 'outer;
                }
            }

            let token = self
                .run_rule("escape", rest, Self::escape_rule)
                .or_else(|| self.run_rule("autolink", rest, Self::autolink))
                .or_else(|| self.run_rule("inline_html", rest, Self::inline_html))
                .or_else(|| self.run_rule("link", rest, Self::link))
                .or_else(|| self.run_rule("strong", rest, Self::strong))
                .or_else(|| self.run_rule("em", rest, Self::em))
                .or_else(|| self.run_rule("codespan", rest, Self::codespan))
                .or_else(|| self.run_rule("del", rest, Self::del))
                .or_else(|| self.run_rule("br", rest, Self::br))
                .or_else(|| self.run_rule("inline_text", rest, Self::inline_text));

            match token {
                Some(token) => {
                    let consumed = token.raw().len();
                    debug_assert!(consumed > 0, "inline rule consumed nothing");
                    if consumed == 0 {
                        break;
                    }
                    rest = &rest[consumed..];
                    tokens.push(token);
                }
                None => break,
            }
        }
        tokens
    }

    fn escape_rule(&mut self, src: &str) -> Option<Token> {
        let caps = ESCAPE.captures(src)?;
        Some(Token::Escape {
            raw: caps.get(0).unwrap().as_str().to_string(),
            text: caps.get(1).unwrap().as_str().to_string(),
        })
    }

    fn autolink(&mut self, src: &str) -> Option<Token> {
        if let Some(caps) = AUTOLINK_URL.captures(src) {
            let raw = caps.get(0).unwrap().as_str().to_string();
            let href = caps.get(1).unwrap().as_str().to_string();
            return Some(make_autolink(raw, href.clone(), href));
        }
        let caps = AUTOLINK_EMAIL.captures(src)?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let text = caps.get(1).unwrap().as_str().to_string();
        Some(make_autolink(raw, format!("mailto:{}", text), text))
    }

    fn inline_html(&mut self, src: &str) -> Option<Token> {
        let m = INLINE_HTML.find(src)?;
        Some(Token::Html {
            raw: m.as_str().to_string(),
            text: m.as_str().to_string(),
        })
    }

    fn link(&mut self, src: &str) -> Option<Token> {
        let image = src.starts_with("![");
        let label_open = if image { 1 } else { 0 };
        if src.as_bytes().get(label_open) != Some(&b'[') {
            return None;
        }
        let label_end = matching_bracket(&src[label_open..], b'[', b']')? + label_open;
        let label = &src[label_open + 1..label_end];
        let after = &src[label_end + 1..];

        let (href, title, consumed_after) = if after.starts_with('(') {
            let close = matching_bracket(after, b'(', b')')?;
            let inside = after[1..close].trim();
            let (href, title) = split_href_title(inside);
            (href, title, close + 1)
        } else {
            // Reference form: [label][ref], or collapsed [label]
            let (tag, extra) = if after.starts_with('[') {
                let close = matching_bracket(after, b'[', b']')?;
                let tag = after[1..close].trim();
                (
                    if tag.is_empty() { label } else { &after[1..close] },
                    close + 1,
                )
            } else {
                (label, 0)
            };
            let link = self.links.get(&normalize_label(tag))?;
            (link.href.clone(), link.title.clone(), extra)
        };

        let raw = src[..label_end + 1 + consumed_after].to_string();
        let tokens = self.inline_tokens(label);
        if image {
            Some(Token::Image {
                raw,
                href,
                title,
                text: label.to_string(),
                tokens,
            })
        } else {
            Some(Token::Link {
                raw,
                href,
                title,
                text: label.to_string(),
                tokens,
            })
        }
    }

    fn strong(&mut self, src: &str) -> Option<Token> {
        let caps = STRONG_STAR
            .captures(src)
            .or_else(|| STRONG_UNDER.captures(src))?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let text = caps.get(1).unwrap().as_str().to_string();
        let tokens = self.inline_tokens(&text);
        Some(Token::Strong { raw, text, tokens })
    }

    fn em(&mut self, src: &str) -> Option<Token> {
        let caps = EM_STAR.captures(src).or_else(|| EM_UNDER.captures(src))?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let text = caps.get(1).unwrap().as_str().to_string();
        let tokens = self.inline_tokens(&text);
        Some(Token::Em { raw, text, tokens })
    }

    fn codespan(&mut self, src: &str) -> Option<Token> {
        let ticks = src.bytes().take_while(|b| *b == b'`').count();
        if ticks == 0 {
            return None;
        }
        let body = &src[ticks..];
        let mut search = 0;
        while let Some(found) = body[search..].find('`') {
            let at = search + found;
            let run = body[at..].bytes().take_while(|b| *b == b'`').count();
            if run == ticks {
                let inner = &body[..at];
                let mut text = inner.replace('\n', " ");
                if text.len() > 1
                    && text.starts_with(' ')
                    && text.ends_with(' ')
                    && text.trim().len() > 0
                {
                    text = text[1..text.len() - 1].to_string();
                }
                return Some(Token::Codespan {
                    raw: src[..ticks + at + run].to_string(),
                    text,
                });
            }
            search = at + run;
        }
        None
    }

    fn del(&mut self, src: &str) -> Option<Token> {
        if !self.gfm() {
            return None;
        }
        let caps = DEL.captures(src)?;
        let raw = caps.get(0).unwrap().as_str().to_string();
        let text = caps.get(1).unwrap().as_str().to_string();
        let tokens = self.inline_tokens(&text);
        Some(Token::Del { raw, text, tokens })
    }

    fn br(&mut self, src: &str) -> Option<Token> {
        if let Some(m) = HARD_BREAK.find(src) {
            return Some(Token::Br {
                raw: m.as_str().to_string(),
            });
        }
        if src.starts_with('\n') {
            return Some(if self.config.options.breaks {
                Token::Br { raw: "\n".into() }
            } else {
                Token::Text {
                    raw: "\n".into(),
                    text: "\n".into(),
                    tokens: Vec::new(),
                }
            });
        }
        None
    }

    fn inline_text(&mut self, src: &str) -> Option<Token> {
        let mut limit = src.len();
        for (i, ch) in src.char_indices().skip(1) {
            let special = match ch {
                '\\' | '<' | '[' | '`' | '*' | '_' | '\n' => true,
                '~' => self.gfm(),
                '!' => src[i..].starts_with("!["),
                _ => false,
            };
            if special {
                limit = i;
                break;
            }
        }
        // Extension start probes stop plain-text scanning early
        for probe in &self.start_inline {
            if let Some(i) = probe(src) {
                if i > 0 && i < limit {
                    limit = i;
                }
            }
        }
        // Leave trailing spaces before a newline for the hard-break rule
        if src[limit..].starts_with('\n') {
            let trimmed = src[..limit].trim_end_matches(' ');
            if limit - trimmed.len() >= 2 && !trimmed.is_empty() {
                limit = trimmed.len();
            }
        }
        if limit == 0 {
            return None;
        }
        let raw = src[..limit].to_string();
        Some(Token::Text {
            text: raw.clone(),
            raw,
            tokens: Vec::new(),
        })
    }
}

// ==================== helpers ====================

/// Normalize line endings and tabs before lexing
fn normalize_source(src: &str) -> String {
    src.replace("\r\n", "\n").replace('\r', "\n").replace('\t', "    ")
}

/// One line (without its newline) and the byte length including the newline
fn take_line(src: &str) -> (&str, usize) {
    match src.find('\n') {
        Some(i) => (&src[..i], i + 1),
        None => (src, src.len()),
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_ordered_marker(marker: &str) -> bool {
    marker.ends_with('.') || marker.ends_with(')')
}

/// Normalize a link label for side-table lookup
fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn make_autolink(raw: String, href: String, text: String) -> Token {
    Token::Link {
        raw,
        href,
        title: None,
        tokens: vec![Token::Text {
            raw: text.clone(),
            text: text.clone(),
            tokens: Vec::new(),
        }],
        text,
    }
}

/// `[ ]` / `[x]` task-list marker: returns (checked, remaining text)
fn strip_task_marker(text: &str) -> Option<(bool, String)> {
    let checked = if text.starts_with("[ ] ") {
        false
    } else if text.starts_with("[x] ") || text.starts_with("[X] ") {
        true
    } else {
        return None;
    };
    Some((checked, text[4..].to_string()))
}

/// Byte offset of the bracket closing the one at offset 0, nesting-aware
fn matching_bracket(src: &str, open: u8, close: u8) -> Option<usize> {
    debug_assert_eq!(src.as_bytes().first(), Some(&open));
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, b) in src.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        if b == b'\\' {
            escaped = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Split the inside of an inline link `(...)` into href and optional title
fn split_href_title(inside: &str) -> (String, Option<String>) {
    for quote in ['"', '\''] {
        if inside.ends_with(quote) {
            if let Some(open) = inside[..inside.len() - 1].rfind(quote) {
                let href = inside[..open].trim();
                let title = &inside[open + 1..inside.len() - 1];
                return (
                    href.trim_matches(|c| c == '<' || c == '>').to_string(),
                    Some(title.to_string()),
                );
            }
        }
    }
    (
        inside.trim_matches(|c| c == '<' || c == '>').to_string(),
        None,
    )
}

/// Split a table line into trimmed cell texts, honoring `\|` escapes
fn split_cells(line: &str) -> Vec<String> {
    let line = line.trim().trim_start_matches('|');
    let line = line.strip_suffix('|').unwrap_or(line);
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            if ch != '|' {
                current.push('\\');
            }
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '|' {
            cells.push(current.trim().to_string());
            current = String::new();
        } else {
            current.push(ch);
        }
    }
    if escaped {
        current.push('\\');
    }
    cells.push(current.trim().to_string());
    cells
}

/// Alignment from one delimiter cell like `:---:`; `None` if malformed
fn parse_align(cell: &str) -> Option<Align> {
    let cell = cell.trim();
    let left = cell.starts_with(':');
    let right = cell.ends_with(':');
    let dashes = cell.trim_matches(':');
    if dashes.is_empty() || !dashes.bytes().all(|b| b == b'-') {
        return None;
    }
    Some(match (left, right) {
        (true, true) => Align::Center,
        (true, false) => Align::Left,
        (false, true) => Align::Right,
        (false, false) => Align::None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> TokenList {
        Lexer::lex(Arc::new(Config::default()), src).unwrap()
    }

    #[test]
    fn test_heading_and_paragraph() {
        let list = lex("# Title\n\nhello world\n");
        assert_eq!(list.tokens.len(), 2);
        match &list.tokens[0] {
            Token::Heading { raw, depth, text, .. } => {
                // The heading consumes the blank line that follows it
                assert_eq!(raw, "# Title\n\n");
                assert_eq!(*depth, 1);
                assert_eq!(text, "Title");
            }
            other => panic!("expected heading, got {:?}", other),
        }
        assert_eq!(list.tokens[1].kind(), "paragraph");
    }

    #[test]
    fn test_heading_closing_hashes_stripped() {
        let list = lex("## Section ##\n");
        match &list.tokens[0] {
            Token::Heading { text, .. } => assert_eq!(text, "Section"),
            other => panic!("expected heading, got {:?}", other),
        }
    }

    #[test]
    fn test_fenced_code_with_language() {
        let list = lex("```rust\nlet x = 1;\n```\n");
        match &list.tokens[0] {
            Token::Code { text, lang, .. } => {
                assert_eq!(text, "let x = 1;");
                assert_eq!(lang.as_deref(), Some("rust"));
            }
            other => panic!("expected code, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let list = lex("```\ncode\n");
        match &list.tokens[0] {
            Token::Code { text, .. } => assert_eq!(text, "code"),
            other => panic!("expected code, got {:?}", other),
        }
    }

    #[test]
    fn test_indented_code() {
        let list = lex("    a\n    b\n");
        match &list.tokens[0] {
            Token::Code { text, lang, .. } => {
                assert_eq!(text, "a\nb");
                assert!(lang.is_none());
            }
            other => panic!("expected code, got {:?}", other),
        }
    }

    #[test]
    fn test_blockquote_recurses() {
        let list = lex("> quoted\n");
        match &list.tokens[0] {
            Token::Blockquote { tokens, .. } => {
                assert_eq!(tokens[0].kind(), "paragraph");
            }
            other => panic!("expected blockquote, got {:?}", other),
        }
    }

    #[test]
    fn test_unordered_list_items() {
        let list = lex("- one\n- two\n- three\n");
        match &list.tokens[0] {
            Token::List { ordered, items, loose, .. } => {
                assert!(!ordered);
                assert!(!loose);
                assert_eq!(items.len(), 3);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_ordered_list_start() {
        let list = lex("3. three\n4. four\n");
        match &list.tokens[0] {
            Token::List { ordered, start, items, .. } => {
                assert!(ordered);
                assert_eq!(*start, Some(3));
                assert_eq!(items.len(), 2);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_task_list_markers() {
        let list = lex("- [ ] todo\n- [x] done\n");
        match &list.tokens[0] {
            Token::List { items, .. } => {
                match (&items[0], &items[1]) {
                    (
                        Token::ListItem { task: t1, checked: c1, .. },
                        Token::ListItem { task: t2, checked: c2, .. },
                    ) => {
                        assert!(*t1 && *t2);
                        assert_eq!(*c1, Some(false));
                        assert_eq!(*c2, Some(true));
                    }
                    _ => panic!("expected list items"),
                }
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_hr_wins_over_list() {
        let list = lex("---\n");
        assert_eq!(list.tokens[0].kind(), "hr");
    }

    #[test]
    fn test_link_definition_collected() {
        let list = lex("[Ref]: http://x.invalid \"T\"\n\n[text][ref]\n");
        assert_eq!(list.links.len(), 1);
        let def = &list.links["ref"];
        assert_eq!(def.href, "http://x.invalid");
        assert_eq!(def.title.as_deref(), Some("T"));
        // The definition consumed the blank line; the paragraph follows it
        // directly and resolved the reference
        match &list.tokens[1] {
            Token::Paragraph { tokens, .. } => match &tokens[0] {
                Token::Link { href, .. } => assert_eq!(href, "http://x.invalid"),
                other => panic!("expected link, got {:?}", other),
            },
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_reference_stays_text() {
        let list = lex("[text][nope]\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => {
                assert!(tokens.iter().all(|t| t.kind() != "link"));
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_table_shape() {
        let list = lex("| a | b |\n| :-- | --: |\n| 1 | 2 |\n| 3 | 4 |\n");
        match &list.tokens[0] {
            Token::Table { header, align, rows, .. } => {
                assert_eq!(header.len(), 2);
                assert_eq!(align, &vec![Align::Left, Align::Right]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1][1].text, "4");
                assert!(header[0].header);
                assert!(!rows[0][0].header);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_table_requires_gfm() {
        let config = Config {
            options: crate::config::Options {
                gfm: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let list = Lexer::lex(Arc::new(config), "| a |\n| - |\n").unwrap();
        assert_eq!(list.tokens[0].kind(), "paragraph");
    }

    #[test]
    fn test_inline_emphasis_nesting() {
        let list = lex("**bold** and *em* and `code`\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => {
                let kinds: Vec<_> = tokens.iter().map(|t| t.kind()).collect();
                assert_eq!(kinds, vec!["strong", "text", "em", "text", "codespan"]);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_codespan_handles_longer_fences() {
        let list = lex("``a ` b``\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => match &tokens[0] {
                Token::Codespan { text, .. } => assert_eq!(text, "a ` b"),
                other => panic!("expected codespan, got {:?}", other),
            },
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_escape_token() {
        let list = lex("\\*not em\\*\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => {
                assert_eq!(tokens[0].kind(), "escape");
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_autolink() {
        let list = lex("<http://x.invalid/a>\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => match &tokens[0] {
                Token::Link { href, .. } => assert_eq!(href, "http://x.invalid/a"),
                other => panic!("expected link, got {:?}", other),
            },
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_hard_break_two_spaces() {
        let list = lex("a  \nb\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => {
                let kinds: Vec<_> = tokens.iter().map(|t| t.kind()).collect();
                assert_eq!(kinds, vec!["text", "br", "text"]);
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_breaks_option_turns_newlines_into_br() {
        let config = Config {
            options: crate::config::Options {
                breaks: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let list = Lexer::lex(Arc::new(config), "a\nb\n").unwrap();
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => {
                assert!(tokens.iter().any(|t| t.kind() == "br"));
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_image() {
        let list = lex("![alt](img.png \"t\")\n");
        match &list.tokens[0] {
            Token::Paragraph { tokens, .. } => match &tokens[0] {
                Token::Image { href, title, text, .. } => {
                    assert_eq!(href, "img.png");
                    assert_eq!(title.as_deref(), Some("t"));
                    assert_eq!(text, "alt");
                }
                other => panic!("expected image, got {:?}", other),
            },
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn test_lex_inline_skips_block_structure() {
        let tokens = Lexer::lex_inline(Arc::new(Config::default()), "**hi**").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind(), "strong");
    }

    #[test]
    fn test_raw_roundtrip_covers_source() {
        // Block tokens must consume the source exactly
        let src = "# h\n\npara *em*\n\n- a\n- b\n";
        let list = lex(src);
        let total: usize = list.tokens.iter().map(|t| t.raw().len()).sum();
        assert_eq!(total, src.len());
    }

    #[test]
    fn test_split_cells_escaped_pipe() {
        assert_eq!(split_cells("| a \\| b | c |"), vec!["a | b", "c"]);
    }

    #[test]
    fn test_normalize_label_collapses_whitespace() {
        assert_eq!(normalize_label("  Foo   Bar "), "foo bar");
    }
}
