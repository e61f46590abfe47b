//! Extension surface: packs, syntax extensions, and the composed registry
//!
//! Third parties extend the compiler by registering [`ExtensionPack`]s:
//! 1. Named syntax extensions add tokenizer rules (tried before built-ins),
//!    start probes, per-kind renderers, and child-token declarations.
//! 2. Whole-renderer / whole-tokenizer override maps wrap the corresponding
//!    built-in method with sentinel fallback.
//! 3. Hooks layers, walk-token callbacks, an enrichment hook, and the async
//!    flag round out a pack.
//!
//! A pack is consumed once by the composer (`Compiler::register`) and its
//! pieces are copied into a fresh [`ExtensionRegistry`] snapshot; the pack is
//! never mutated and never consulted again.

use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::parser::RenderContext;
use crate::token::Token;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A tokenizer rule: inspect the remaining source, produce a token or decline.
///
/// Extension rules receive the lexer so they can tokenize nested content
/// (e.g. inline children of a custom block).
pub type TokenizerFn = Arc<dyn Fn(&mut Lexer, &str) -> Option<Token> + Send + Sync>;

/// A start probe: the offset at which a rule of this kind could start in the
/// given source, or `None` if it cannot. Used to stop plain-text scanning early.
pub type StartFn = Arc<dyn Fn(&str) -> Option<usize> + Send + Sync>;

/// A per-kind renderer override. `None` is the no-output sentinel: defer to
/// the previous implementation in the chain. Empty output is `Some(String::new())`.
pub type RendererFn = Arc<dyn Fn(&Token, &RenderContext) -> Option<String> + Send + Sync>;

/// A future produced by an asynchronous walk-token callback
pub type WalkFuture = Pin<Box<dyn Future<Output = Result<(), CompileError>> + Send>>;

/// A per-token mutation callback run during the tree-mutation stage.
///
/// May return a future; in async mode every returned future is awaited
/// before rendering begins. Sync and callback modes drop returned futures.
pub type WalkFn = Arc<dyn Fn(&mut Token) -> Option<WalkFuture> + Send + Sync>;

/// Completion handle for one enrichment request; must be invoked exactly once.
/// `Ok(Some(text))` replaces the token text, `Ok(None)` leaves it unchanged.
pub type EnrichDone = Box<dyn FnOnce(Result<Option<String>, CompileError>) + Send>;

/// An out-of-band, possibly asynchronous augmentation of a code token's text
/// (e.g. syntax highlighting), performed between lexing and rendering.
pub trait Enrich: Send + Sync {
    fn enrich(&self, text: &str, lang: Option<&str>, done: EnrichDone);
}

/// Whether a tokenizer extension participates in block or inline lexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Block,
    Inline,
}

/// One named syntax extension inside a pack
#[derive(Clone, Default)]
pub struct SyntaxExtension {
    /// Token kind this extension handles; required
    pub name: Option<String>,
    /// Required when a tokenizer rule is supplied
    pub level: Option<Level>,
    pub tokenizer: Option<TokenizerFn>,
    pub start: Option<StartFn>,
    pub renderer: Option<RendererFn>,
    /// Field names on this kind that hold nested tokens needing traversal
    pub child_tokens: Option<Vec<String>>,
}

/// An externally supplied bundle of overrides and additions
#[derive(Clone, Default)]
pub struct ExtensionPack {
    pub extensions: Vec<SyntaxExtension>,
    /// Whole-renderer override: method name (token kind) to implementation
    pub renderer: HashMap<String, RendererFn>,
    /// Whole-tokenizer override: rule name to implementation
    pub tokenizer: HashMap<String, TokenizerFn>,
    pub hooks: Option<Arc<dyn crate::hooks::Hooks>>,
    pub walk_tokens: Option<WalkFn>,
    pub enrich: Option<Arc<dyn Enrich>>,
    pub async_mode: bool,
}

/// The composed, ordered view of all registered extensions
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    /// Per-kind renderer chains, newest registration first
    pub renderers: HashMap<String, Vec<RendererFn>>,
    /// Per-kind child-token field declarations, last registration wins
    pub child_tokens: HashMap<String, Vec<String>>,
    /// Extension block rules, tried before built-in rules
    pub block: Vec<TokenizerFn>,
    /// Extension inline rules, tried before built-in rules
    pub inline: Vec<TokenizerFn>,
    pub start_block: Vec<StartFn>,
    pub start_inline: Vec<StartFn>,
}

impl ExtensionRegistry {
    /// Declared child-token fields for a kind, if any extension registered them
    pub fn child_fields(&self, kind: &str) -> Option<&[String]> {
        self.child_tokens.get(kind).map(|v| v.as_slice())
    }

    /// Run the renderer chain for a kind: newest first, first non-sentinel wins
    pub fn run_renderers(&self, kind: &str, token: &Token, ctx: &RenderContext) -> Option<String> {
        let chain = self.renderers.get(kind)?;
        chain.iter().find_map(|f| f(token, ctx))
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("renderers", &self.renderers.keys().collect::<Vec<_>>())
            .field("child_tokens", &self.child_tokens)
            .field("block_rules", &self.block.len())
            .field("inline_rules", &self.inline.len())
            .field("start_block", &self.start_block.len())
            .field("start_inline", &self.start_inline.len())
            .finish()
    }
}
