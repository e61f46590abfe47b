//! Compiler configuration and the extension composer
//!
//! A [`Config`] is one immutable snapshot of everything a compilation call
//! needs: scalar options, the extension registry, override chains, the hook
//! stack, walk callbacks, and the enrichment hook. The orchestrator owns the
//! current snapshot behind an `Arc` and replaces it wholesale through
//! [`compose`] on every registration; in-flight calls keep the snapshot they
//! captured at entry, so no locking is needed.
//!
//! Composition rules (in `compose`):
//! 1. Tokenizer extensions must carry a name and a block/inline level; their
//!    rules are prepended (first refusal over built-ins) and their start
//!    probes appended.
//! 2. Renderer-kind extensions layer on top of any previous registration:
//!    the new function runs first and the `None` sentinel falls through to
//!    the previous one.
//! 3. Child-token declarations are recorded verbatim, last wins.
//! 4. Whole-renderer / whole-tokenizer override maps wrap the corresponding
//!    built-in method with the same sentinel fallback; a default renderer
//!    instance is created lazily if none exists yet.
//! 5. Hook layers stack; pass-through hooks chain new-then-old, the rest
//!    compose by sentinel fallback (see [`crate::hooks`]).
//! 6. Walk-token callbacks accumulate, newest first.
//! 7. The async flag is sticky: once any pack sets it, it stays set.
//!
//! Re-applying a pack with override chains deepens them; chains are
//! order-sensitive by design and are never collapsed.

use crate::error::CompileError;
use crate::extensions::{
    Enrich, ExtensionPack, ExtensionRegistry, Level, RendererFn, TokenizerFn, WalkFn,
};
use crate::hooks::HookChain;
use crate::renderer::{HtmlRenderer, Renderer};
use std::collections::HashMap;
use std::sync::Arc;

/// Scalar compilation options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Enable GFM constructs (tables, strikethrough, task lists, autolinks)
    pub gfm: bool,
    /// Render single newlines inside paragraphs as `<br>`
    pub breaks: bool,
    /// Disable indented-code lookahead refinements; kept for compatibility
    pub pedantic: bool,
    /// Route stage failures into an inline error document instead of raising
    pub silent: bool,
    /// Deliver results over the asynchronous channel; sticky once set
    pub async_mode: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            gfm: true,
            breaks: false,
            pedantic: false,
            silent: false,
            async_mode: false,
        }
    }
}

static DEFAULT_RENDERER: HtmlRenderer = HtmlRenderer;

/// One immutable configuration snapshot
#[derive(Clone, Default)]
pub struct Config {
    pub options: Options,
    pub registry: ExtensionRegistry,
    /// Whole-renderer override chains keyed by method name, newest first
    pub renderer_overrides: HashMap<String, Vec<RendererFn>>,
    /// Whole-tokenizer override chains keyed by rule name, newest first
    pub tokenizer_overrides: HashMap<String, Vec<TokenizerFn>>,
    pub hooks: HookChain,
    /// Per-token mutation callbacks, newest first; all of them run
    pub walk_callbacks: Vec<WalkFn>,
    pub enrich: Option<Arc<dyn Enrich>>,
    /// Base renderer instance; `None` until an override pack forces creation
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl Config {
    /// The base renderer every override chain ultimately falls back to
    pub fn base_renderer(&self) -> &dyn Renderer {
        match &self.renderer {
            Some(renderer) => renderer.as_ref(),
            None => &DEFAULT_RENDERER,
        }
    }

    /// Snapshot with per-call option overrides applied
    pub fn with_call_options(&self, options: Option<Options>) -> Config {
        match options {
            Some(options) => {
                let mut cfg = self.clone();
                // The sticky async flag survives per-call overrides too
                let sticky_async = cfg.options.async_mode;
                cfg.options = options;
                cfg.options.async_mode = cfg.options.async_mode || sticky_async;
                cfg
            }
            None => self.clone(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field(
                "renderer_overrides",
                &self.renderer_overrides.keys().collect::<Vec<_>>(),
            )
            .field(
                "tokenizer_overrides",
                &self.tokenizer_overrides.keys().collect::<Vec<_>>(),
            )
            .field("walk_callbacks", &self.walk_callbacks.len())
            .field("enrich", &self.enrich.is_some())
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Merge one extension pack into a configuration, producing the new snapshot.
///
/// Pure with respect to `pack` and `base`: on error the caller keeps the old
/// configuration, so a failing pack is atomic.
pub fn compose(base: &Config, pack: &ExtensionPack) -> Result<Config, CompileError> {
    let mut cfg = base.clone();

    // Rule 7: sticky async flag
    cfg.options.async_mode = base.options.async_mode || pack.async_mode;

    for ext in &pack.extensions {
        let name = ext.name.clone().ok_or(CompileError::ExtensionNameRequired)?;

        // Rule 1: tokenizer rules and start probes, keyed by level
        if ext.tokenizer.is_some() || ext.start.is_some() {
            let level = ext.level.ok_or_else(|| {
                CompileError::InvalidExtensionLevel("missing".to_string())
            })?;
            let (rules, probes) = match level {
                Level::Block => (&mut cfg.registry.block, &mut cfg.registry.start_block),
                Level::Inline => (&mut cfg.registry.inline, &mut cfg.registry.start_inline),
            };
            if let Some(tokenizer) = &ext.tokenizer {
                rules.insert(0, tokenizer.clone());
            }
            if let Some(start) = &ext.start {
                probes.push(start.clone());
            }
        }

        // Rule 2: renderer chains, newest first
        if let Some(renderer) = &ext.renderer {
            cfg.registry
                .renderers
                .entry(name.clone())
                .or_default()
                .insert(0, renderer.clone());
        }

        // Rule 3: child-token declarations, last registration wins
        if let Some(fields) = &ext.child_tokens {
            cfg.registry.child_tokens.insert(name, fields.clone());
        }
    }

    // Rule 4: whole-renderer / whole-tokenizer overrides
    if !pack.renderer.is_empty() && cfg.renderer.is_none() {
        cfg.renderer = Some(Arc::new(HtmlRenderer));
    }
    for (method, f) in &pack.renderer {
        cfg.renderer_overrides
            .entry(method.clone())
            .or_default()
            .insert(0, f.clone());
    }
    for (rule, f) in &pack.tokenizer {
        cfg.tokenizer_overrides
            .entry(rule.clone())
            .or_default()
            .insert(0, f.clone());
    }

    // Rule 5: hook layers
    if let Some(hooks) = &pack.hooks {
        cfg.hooks.push(hooks.clone());
    }

    // Rule 6: walk callbacks accumulate
    if let Some(walk) = &pack.walk_tokens {
        cfg.walk_callbacks.insert(0, walk.clone());
    }

    if let Some(enrich) = &pack.enrich {
        cfg.enrich = Some(enrich.clone());
    }

    log::debug!(
        "composed extension pack: {} block rules, {} inline rules, {} renderer kinds, {} hook layers",
        cfg.registry.block.len(),
        cfg.registry.inline.len(),
        cfg.registry.renderers.len(),
        cfg.hooks.len()
    );

    Ok(cfg)
}
