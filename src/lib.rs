//! # marq
//!
//! A pluggable markdown compiler.
//!
//! The [`Compiler`] holds an immutable configuration snapshot and exposes
//! three execution channels: synchronous [`Compiler::compile`], the
//! callback-based [`Compiler::compile_with_callback`], and the async
//! [`Compiler::compile_async`]. Extension packs registered through
//! [`Compiler::register`] can add syntax rules, override renderers and
//! tokenizers, layer lifecycle hooks, and attach tree-walk callbacks and
//! code-block enrichment.
//!
//! ```no_run
//! use marq::Compiler;
//!
//! let compiler = Compiler::new();
//! let html = compiler.compile("# Hello\n")?;
//! # Ok::<(), marq::CompileError>(())
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod extensions;
pub mod hooks;
pub mod lexer;
pub mod parser;
pub mod renderer;
pub mod token;
pub mod walker;

pub use compiler::Compiler;
pub use config::{Config, Options};
pub use error::{CompileError, BUG_REPORT_SUFFIX};
pub use extensions::{
    Enrich, EnrichDone, ExtensionPack, Level, RendererFn, StartFn, SyntaxExtension, TokenizerFn,
    WalkFn, WalkFuture,
};
pub use hooks::{HookChain, HookFuture, Hooks};
pub use lexer::Lexer;
pub use parser::{Parser, RenderContext};
pub use renderer::{escape, HtmlRenderer, Renderer, TextRenderer};
pub use token::{Align, LinkRef, TableCell, Token, TokenList};
pub use walker::walk;

/// Compile a document with default options through a throwaway compiler
pub fn to_html(src: &str) -> Result<String, CompileError> {
    Compiler::new().compile(src)
}
