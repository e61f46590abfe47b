//! Rendering of token trees into output strings
//!
//! For every token the parser consults, in order:
//! 1. Per-kind renderer chains registered by syntax extensions (newest pack
//!    first). The first chain entry returning `Some` wins.
//! 2. Per-method override chains for the built-in renderer vocabulary, same
//!    newest-first discipline.
//! 3. The base renderer (the built-in HTML renderer unless a pack replaced
//!    it wholesale).
//!
//! Chain entries receive a [`RenderContext`] so they can render child tokens
//! through the same dispatch.

use crate::config::Config;
use crate::error::CompileError;
use crate::renderer::{Renderer, TextRenderer};
use crate::token::{Align, TableCell, Token};

/// Renders token trees against one configuration snapshot
pub struct Parser<'a> {
    config: &'a Config,
}

/// Handed to extension renderers so they can render nested tokens
pub struct RenderContext<'a> {
    parser: &'a Parser<'a>,
}

impl<'a> RenderContext<'a> {
    pub fn new(parser: &'a Parser<'a>) -> Self {
        RenderContext { parser }
    }

    /// Render block-level child tokens
    pub fn parse(&self, tokens: &[Token]) -> Result<String, CompileError> {
        self.parser.parse(tokens)
    }

    /// Render inline child tokens
    pub fn parse_inline(&self, tokens: &[Token]) -> Result<String, CompileError> {
        self.parser.parse_inline(tokens)
    }
}

impl<'a> Parser<'a> {
    pub fn new(config: &'a Config) -> Self {
        Parser { config }
    }

    /// Render a block token list into the output document
    pub fn parse(&self, tokens: &[Token]) -> Result<String, CompileError> {
        let mut out = String::new();
        for token in tokens {
            out.push_str(&self.render_block(token)?);
        }
        Ok(out)
    }

    /// Render an inline token list
    pub fn parse_inline(&self, tokens: &[Token]) -> Result<String, CompileError> {
        let mut out = String::new();
        for token in tokens {
            out.push_str(&self.render_inline(token)?);
        }
        Ok(out)
    }

    /// Render inline tokens to plain text, for alt text and similar sinks
    pub fn parse_inline_plain(&self, tokens: &[Token]) -> String {
        let renderer = TextRenderer;
        let mut out = String::new();
        for token in tokens {
            let piece = match token {
                Token::Text { text, .. } | Token::Escape { text, .. } | Token::Html { text, .. } => {
                    renderer.text(text)
                }
                Token::Codespan { text, .. } => renderer.codespan(text),
                Token::Strong { tokens, .. }
                | Token::Em { tokens, .. }
                | Token::Del { tokens, .. }
                | Token::Link { tokens, .. } => self.parse_inline_plain(tokens),
                Token::Image { text, .. } => renderer.text(text),
                Token::Br { .. } => renderer.br(),
                _ => String::new(),
            };
            out.push_str(&piece);
        }
        out
    }

    /// Extension chains, then method override chains, for one token.
    /// `None` means every layer declined and the built-in output applies.
    fn run_chains(&self, token: &Token) -> Option<String> {
        let kind = token.kind();
        let ctx = RenderContext::new(self);
        if let Some(out) = self.config.registry.run_renderers(kind, token, &ctx) {
            return Some(out);
        }
        if let Some(chain) = self.config.renderer_overrides.get(kind) {
            if let Some(out) = chain.iter().find_map(|f| f(token, &ctx)) {
                return Some(out);
            }
        }
        None
    }

    fn render_block(&self, token: &Token) -> Result<String, CompileError> {
        if let Some(out) = self.run_chains(token) {
            return Ok(out);
        }
        let r = self.config.base_renderer();
        match token {
            Token::Space { .. } | Token::Def { .. } => Ok(String::new()),
            Token::Hr { .. } => Ok(r.hr()),
            Token::Heading { depth, tokens, .. } => {
                Ok(r.heading(&self.parse_inline(tokens)?, *depth))
            }
            Token::Code {
                text,
                lang,
                escaped,
                ..
            } => Ok(r.code(text, lang.as_deref(), *escaped)),
            Token::Blockquote { tokens, .. } => Ok(r.blockquote(&self.parse(tokens)?)),
            Token::List {
                ordered,
                start,
                items,
                ..
            } => {
                let mut body = String::new();
                for item in items {
                    body.push_str(&self.render_list_item(item)?);
                }
                Ok(r.list(&body, *ordered, *start))
            }
            Token::Html { text, .. } => Ok(r.html(text)),
            Token::Table {
                header,
                align,
                rows,
                ..
            } => self.render_table(header, align, rows),
            Token::Paragraph { tokens, .. } => Ok(r.paragraph(&self.parse_inline(tokens)?)),
            Token::Text { text, tokens, .. } => {
                if tokens.is_empty() {
                    Ok(r.text(text))
                } else {
                    self.parse_inline(tokens)
                }
            }
            // Inline tokens showing up at block level render through the
            // inline path rather than erroring
            Token::Escape { .. }
            | Token::Link { .. }
            | Token::Image { .. }
            | Token::Strong { .. }
            | Token::Em { .. }
            | Token::Codespan { .. }
            | Token::Br { .. }
            | Token::Del { .. } => self.render_inline(token),
            Token::ListItem { .. } => self.render_list_item(token),
            Token::Custom { kind, .. } => Err(CompileError::UnknownToken(kind.clone())),
        }
    }

    fn render_inline(&self, token: &Token) -> Result<String, CompileError> {
        if let Some(out) = self.run_chains(token) {
            return Ok(out);
        }
        let r = self.config.base_renderer();
        match token {
            Token::Escape { text, .. } | Token::Text { text, .. } => Ok(r.text(text)),
            Token::Html { text, .. } => Ok(r.html(text)),
            Token::Link {
                href,
                title,
                tokens,
                ..
            } => Ok(r.link(href, title.as_deref(), &self.parse_inline(tokens)?)),
            Token::Image {
                href,
                title,
                text,
                tokens,
                ..
            } => {
                // Alt text must stay markup-free even when the label carries it
                let alt = if tokens.is_empty() {
                    text.clone()
                } else {
                    self.parse_inline_plain(tokens)
                };
                Ok(r.image(href, title.as_deref(), &alt))
            }
            Token::Strong { tokens, .. } => Ok(r.strong(&self.parse_inline(tokens)?)),
            Token::Em { tokens, .. } => Ok(r.em(&self.parse_inline(tokens)?)),
            Token::Codespan { text, .. } => Ok(r.codespan(text)),
            Token::Br { .. } => Ok(r.br()),
            Token::Del { tokens, .. } => Ok(r.del(&self.parse_inline(tokens)?)),
            Token::Custom { kind, .. } => Err(CompileError::UnknownToken(kind.clone())),
            other => self.render_block(other),
        }
    }

    fn render_list_item(&self, item: &Token) -> Result<String, CompileError> {
        let Token::ListItem {
            task,
            checked,
            loose,
            tokens,
            ..
        } = item
        else {
            return Err(CompileError::UnknownToken(item.kind().to_string()));
        };
        let r = self.config.base_renderer();
        let mut body = String::new();
        if *task {
            body.push_str(&r.checkbox(checked.unwrap_or(false)));
        }
        for child in tokens {
            match child {
                // Tight items unwrap their paragraph
                Token::Paragraph { tokens: inline, .. } if !loose => {
                    body.push_str(&self.parse_inline(inline)?);
                }
                Token::Space { .. } => {}
                _ => body.push_str(&self.render_block(child)?),
            }
        }
        Ok(r.list_item(&body))
    }

    fn render_table(
        &self,
        header: &[TableCell],
        align: &[Align],
        rows: &[Vec<TableCell>],
    ) -> Result<String, CompileError> {
        let r = self.config.base_renderer();
        let mut header_cells = String::new();
        for (i, cell) in header.iter().enumerate() {
            header_cells.push_str(&r.table_cell(
                &self.parse_inline(&cell.tokens)?,
                true,
                align.get(i).copied().unwrap_or(Align::None),
            ));
        }
        let header_row = r.table_row(&header_cells);

        let mut body = String::new();
        for row in rows {
            let mut cells = String::new();
            for (i, cell) in row.iter().enumerate() {
                cells.push_str(&r.table_cell(
                    &self.parse_inline(&cell.tokens)?,
                    false,
                    align.get(i).copied().unwrap_or(Align::None),
                ));
            }
            body.push_str(&r.table_row(&cells));
        }
        Ok(r.table(&header_row, &body))
    }
}
