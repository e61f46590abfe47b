//! Token model for the compilation pipeline
//!
//! Lexing produces a tree of [`Token`] values that the walker mutates and the
//! parser renders. The design follows three rules:
//!
//! 1. Every token is a tagged variant; the kind tag uniquely determines which
//!    fields (if any) hold nested tokens.
//! 2. Nesting is irregular: most container tokens nest through a generic
//!    `tokens` field, lists nest through `items`, and tables nest through a
//!    header row plus body rows of cells. The walker special-cases these.
//! 3. Extension-declared token kinds use [`Token::Custom`] with a named
//!    child-field map, so third-party kinds can participate in the generic
//!    walk without the walker knowing about them statically. The explicit
//!    [`Token::named_children_mut`] accessor replaces field reflection.

use serde::Serialize;
use std::collections::HashMap;

/// Column alignment for GFM tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    None,
    Left,
    Center,
    Right,
}

/// One table cell: raw text plus its inline tokens
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCell {
    pub text: String,
    pub tokens: Vec<Token>,
    pub header: bool,
    pub align: Align,
}

/// A link reference definition collected during block lexing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRef {
    pub href: String,
    pub title: Option<String>,
}

/// One recognized syntactic unit of the source document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    Space {
        raw: String,
    },
    Code {
        raw: String,
        text: String,
        lang: Option<String>,
        /// Set when enrichment replaced `text` with ready-made markup that
        /// must not be escaped again at render time
        escaped: bool,
    },
    Heading {
        raw: String,
        depth: u8,
        text: String,
        tokens: Vec<Token>,
    },
    Hr {
        raw: String,
    },
    Blockquote {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    List {
        raw: String,
        ordered: bool,
        start: Option<u32>,
        loose: bool,
        items: Vec<Token>,
    },
    ListItem {
        raw: String,
        task: bool,
        checked: Option<bool>,
        loose: bool,
        text: String,
        tokens: Vec<Token>,
    },
    Html {
        raw: String,
        text: String,
    },
    Def {
        raw: String,
        tag: String,
        href: String,
        title: Option<String>,
    },
    Table {
        raw: String,
        header: Vec<TableCell>,
        align: Vec<Align>,
        rows: Vec<Vec<TableCell>>,
    },
    Paragraph {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    Text {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    Escape {
        raw: String,
        text: String,
    },
    Link {
        raw: String,
        href: String,
        title: Option<String>,
        text: String,
        tokens: Vec<Token>,
    },
    Image {
        raw: String,
        href: String,
        title: Option<String>,
        text: String,
        tokens: Vec<Token>,
    },
    Strong {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    Em {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    Codespan {
        raw: String,
        text: String,
    },
    Br {
        raw: String,
    },
    Del {
        raw: String,
        text: String,
        tokens: Vec<Token>,
    },
    /// An extension-declared token kind with named child-token fields
    Custom {
        kind: String,
        raw: String,
        text: String,
        children: HashMap<String, Vec<Token>>,
    },
}

impl Token {
    /// The kind discriminant, as extension registries key on it
    pub fn kind(&self) -> &str {
        match self {
            Token::Space { .. } => "space",
            Token::Code { .. } => "code",
            Token::Heading { .. } => "heading",
            Token::Hr { .. } => "hr",
            Token::Blockquote { .. } => "blockquote",
            Token::List { .. } => "list",
            Token::ListItem { .. } => "list_item",
            Token::Html { .. } => "html",
            Token::Def { .. } => "def",
            Token::Table { .. } => "table",
            Token::Paragraph { .. } => "paragraph",
            Token::Text { .. } => "text",
            Token::Escape { .. } => "escape",
            Token::Link { .. } => "link",
            Token::Image { .. } => "image",
            Token::Strong { .. } => "strong",
            Token::Em { .. } => "em",
            Token::Codespan { .. } => "codespan",
            Token::Br { .. } => "br",
            Token::Del { .. } => "del",
            Token::Custom { kind, .. } => kind,
        }
    }

    /// The raw source text this token consumed
    pub fn raw(&self) -> &str {
        match self {
            Token::Space { raw }
            | Token::Code { raw, .. }
            | Token::Heading { raw, .. }
            | Token::Hr { raw }
            | Token::Blockquote { raw, .. }
            | Token::List { raw, .. }
            | Token::ListItem { raw, .. }
            | Token::Html { raw, .. }
            | Token::Def { raw, .. }
            | Token::Table { raw, .. }
            | Token::Paragraph { raw, .. }
            | Token::Text { raw, .. }
            | Token::Escape { raw, .. }
            | Token::Link { raw, .. }
            | Token::Image { raw, .. }
            | Token::Strong { raw, .. }
            | Token::Em { raw, .. }
            | Token::Codespan { raw, .. }
            | Token::Br { raw }
            | Token::Del { raw, .. }
            | Token::Custom { raw, .. } => raw,
        }
    }

    /// The generic nested-tokens field, if this kind has one.
    ///
    /// Lists and tables nest through `items`/cells instead and return `None`;
    /// the walker special-cases them.
    pub fn nested_tokens_mut(&mut self) -> Option<&mut Vec<Token>> {
        match self {
            Token::Heading { tokens, .. }
            | Token::Blockquote { tokens, .. }
            | Token::Paragraph { tokens, .. }
            | Token::Text { tokens, .. }
            | Token::Link { tokens, .. }
            | Token::Image { tokens, .. }
            | Token::Strong { tokens, .. }
            | Token::Em { tokens, .. }
            | Token::Del { tokens, .. }
            | Token::ListItem { tokens, .. } => Some(tokens),
            _ => None,
        }
    }

    /// Resolve a child-token field by name, for extension-declared traversal.
    ///
    /// Built-in kinds expose their nesting fields under their own names;
    /// custom kinds resolve against their child map.
    pub fn named_children_mut(&mut self, field: &str) -> Option<&mut Vec<Token>> {
        if let Token::Custom { children, .. } = self {
            return children.get_mut(field);
        }
        match field {
            "items" => match self {
                Token::List { items, .. } => Some(items),
                _ => None,
            },
            "tokens" => self.nested_tokens_mut(),
            _ => None,
        }
    }
}

/// The ordered output of block lexing: top-level tokens plus the
/// link-reference side table collected along the way
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenList {
    pub tokens: Vec<Token>,
    pub links: HashMap<String, LinkRef>,
}
