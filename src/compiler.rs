//! The compiler facade and execution dispatcher
//!
//! A [`Compiler`] owns an immutable configuration snapshot behind an `Arc`.
//! Registration composes a new snapshot and swaps the pointer, so calls in
//! flight keep the configuration they started with and never observe a
//! half-merged pack.
//!
//! Every compilation runs the same staged pipeline:
//! preprocess -> lex -> process tokens -> mutate tree -> enrich -> render
//! -> postprocess, exposed over three channels:
//! 1. `compile` / `compile_inline`: synchronous. Walk futures are dropped
//!    and enrichment is skipped; calling these while the async flag is set
//!    is an error routed through the gate.
//! 2. `compile_with_callback`: synchronous staging, then enrichment fans
//!    out through completion handles and the callback fires exactly once
//!    when the last one lands (or immediately on failure).
//! 3. `compile_async` / `compile_inline_async`: async hooks and walk
//!    futures are awaited, enrichment completions are bridged over oneshot
//!    channels.
//!
//! A stage failure is caught once per call and routed through the error
//! policy gate: with `silent` set the error renders as an HTML error
//! document on the success path; otherwise it surfaces as a reported error.

use crate::config::{compose, Config, Options};
use crate::error::CompileError;
use crate::extensions::{EnrichDone, ExtensionPack};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::renderer::escape;
use crate::token::{Token, TokenList};
use crate::walker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy)]
enum LexMode {
    Block,
    Inline,
}

/// The markdown compiler: configuration plus the three execution channels
#[derive(Clone, Default)]
pub struct Compiler {
    config: Arc<Config>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::default()
    }

    /// Merge an extension pack into the configuration.
    ///
    /// On error nothing changes; a failing pack is atomic.
    pub fn register(&mut self, pack: ExtensionPack) -> Result<(), CompileError> {
        let next = compose(&self.config, &pack)?;
        self.config = Arc::new(next);
        Ok(())
    }

    /// Replace the stored options wholesale
    pub fn set_options(&mut self, options: Options) {
        let mut cfg = (*self.config).clone();
        cfg.options = options;
        self.config = Arc::new(cfg);
    }

    pub fn options(&self) -> Options {
        self.config.options
    }

    /// Walk a token tree with every registered child-field declaration applied
    pub fn walk_tokens<T, F>(&self, tokens: &mut [Token], visit: &mut F) -> Vec<T>
    where
        F: FnMut(&mut Token) -> T,
    {
        walker::walk(tokens, &self.config.registry, visit)
    }

    // ==================== synchronous channel ====================

    pub fn compile(&self, src: &str) -> Result<String, CompileError> {
        self.compile_with(src, None)
    }

    pub fn compile_with(&self, src: &str, options: Option<Options>) -> Result<String, CompileError> {
        self.sync_entry(src, options, LexMode::Block)
    }

    pub fn compile_inline(&self, src: &str) -> Result<String, CompileError> {
        self.sync_entry(src, None, LexMode::Inline)
    }

    pub fn compile_inline_with(
        &self,
        src: &str,
        options: Option<Options>,
    ) -> Result<String, CompileError> {
        self.sync_entry(src, options, LexMode::Inline)
    }

    fn sync_entry(
        &self,
        src: &str,
        options: Option<Options>,
        mode: LexMode,
    ) -> Result<String, CompileError> {
        let cfg = Arc::new(self.config.with_call_options(options));
        if cfg.options.async_mode {
            return gate(&cfg.options, CompileError::AsyncRequired);
        }
        run_sync(&cfg, mode, src).or_else(|err| gate(&cfg.options, err))
    }

    // ==================== callback channel ====================

    /// Compile with completion delivered to `callback`, which fires exactly
    /// once. Enrichment requests fan out first; rendering is deferred until
    /// the last completion handle lands.
    pub fn compile_with_callback<F>(&self, src: &str, options: Option<Options>, callback: F)
    where
        F: FnOnce(Result<String, CompileError>) + Send + 'static,
    {
        let cfg = Arc::new(self.config.with_call_options(options));
        let staged = (|| -> Result<TokenList, CompileError> {
            let mut list = lex_stage(&cfg, LexMode::Block, src)?;
            mutate_sync(&cfg, &mut list.tokens);
            Ok(list)
        })();
        let mut list = match staged {
            Ok(list) => list,
            Err(err) => return callback(gate(&cfg.options, err)),
        };

        let Some(enrich) = cfg.enrich.clone() else {
            return callback(finish_render(&cfg, list));
        };
        let requests = collect_code(&cfg, &mut list.tokens);
        if requests.is_empty() {
            return callback(finish_render(&cfg, list));
        }

        let batch = EnrichBatch::new(
            requests.len(),
            BatchPayload {
                list,
                cfg: cfg.clone(),
                deliver: Box::new(callback),
            },
        );
        for (index, (text, lang)) in requests.iter().enumerate() {
            enrich.enrich(text, lang.as_deref(), batch.done_handle(index));
        }
        batch.finish_dispatch();
    }

    // ==================== async channel ====================

    pub async fn compile_async(
        &self,
        src: &str,
        options: Option<Options>,
    ) -> Result<String, CompileError> {
        let cfg = Arc::new(self.config.with_call_options(options));
        match run_async(&cfg, LexMode::Block, src).await {
            Ok(html) => Ok(html),
            Err(err) => gate(&cfg.options, err),
        }
    }

    pub async fn compile_inline_async(
        &self,
        src: &str,
        options: Option<Options>,
    ) -> Result<String, CompileError> {
        let cfg = Arc::new(self.config.with_call_options(options));
        match run_async(&cfg, LexMode::Inline, src).await {
            Ok(html) => Ok(html),
            Err(err) => gate(&cfg.options, err),
        }
    }
}

// ==================== staged pipeline ====================

fn lex_stage(cfg: &Arc<Config>, mode: LexMode, src: &str) -> Result<TokenList, CompileError> {
    let src = cfg.hooks.preprocess(src.to_string())?;
    let list = match mode {
        LexMode::Block => Lexer::lex(cfg.clone(), &src)?,
        LexMode::Inline => TokenList {
            tokens: Lexer::lex_inline(cfg.clone(), &src)?,
            links: HashMap::new(),
        },
    };
    cfg.hooks.process_tokens(list)
}

/// Tree-mutation stage outside async mode: walk futures are dropped
fn mutate_sync(cfg: &Config, tokens: &mut [Token]) {
    if cfg.walk_callbacks.is_empty() {
        return;
    }
    walker::walk(tokens, &cfg.registry, &mut |token| {
        for cb in &cfg.walk_callbacks {
            if cb(token).is_some() {
                log::trace!("walk callback returned a future outside async mode; dropped");
            }
        }
    });
}

fn render_stage(cfg: &Config, mode: LexMode, list: &TokenList) -> Result<String, CompileError> {
    let parser = Parser::new(cfg);
    let html = match mode {
        LexMode::Block => parser.parse(&list.tokens)?,
        LexMode::Inline => parser.parse_inline(&list.tokens)?,
    };
    cfg.hooks.postprocess(html)
}

fn run_sync(cfg: &Arc<Config>, mode: LexMode, src: &str) -> Result<String, CompileError> {
    let mut list = lex_stage(cfg, mode, src)?;
    mutate_sync(cfg, &mut list.tokens);
    render_stage(cfg, mode, &list)
}

async fn run_async(cfg: &Arc<Config>, mode: LexMode, src: &str) -> Result<String, CompileError> {
    let src = cfg.hooks.preprocess_async(src.to_string()).await?;
    let list = match mode {
        LexMode::Block => Lexer::lex(cfg.clone(), &src)?,
        LexMode::Inline => TokenList {
            tokens: Lexer::lex_inline(cfg.clone(), &src)?,
            links: HashMap::new(),
        },
    };
    let mut list = cfg.hooks.process_tokens(list)?;

    // Tree mutation, with every returned future awaited before rendering
    let mut futures = Vec::new();
    walker::walk(&mut list.tokens, &cfg.registry, &mut |token| {
        for cb in &cfg.walk_callbacks {
            if let Some(future) = cb(token) {
                futures.push(future);
            }
        }
    });
    for future in futures {
        future.await?;
    }

    enrich_async(cfg, &mut list).await?;

    let parser = Parser::new(cfg);
    let html = match mode {
        LexMode::Block => parser.parse(&list.tokens)?,
        LexMode::Inline => parser.parse_inline(&list.tokens)?,
    };
    cfg.hooks.postprocess_async(html).await
}

/// Await every enrichment completion over oneshot bridges, then apply the
/// replacements in walk order
async fn enrich_async(cfg: &Arc<Config>, list: &mut TokenList) -> Result<(), CompileError> {
    let Some(enrich) = cfg.enrich.clone() else {
        return Ok(());
    };
    let requests = collect_code(cfg, &mut list.tokens);
    if requests.is_empty() {
        return Ok(());
    }

    let mut receivers = Vec::with_capacity(requests.len());
    for (text, lang) in &requests {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let done: EnrichDone = Box::new(move |result| {
            let _ = tx.send(result);
        });
        enrich.enrich(text, lang.as_deref(), done);
        receivers.push(rx);
    }

    let mut slots = Vec::with_capacity(receivers.len());
    for rx in receivers {
        let replacement = rx
            .await
            .map_err(|_| CompileError::Enrich("completion handle dropped".into()))??;
        slots.push(replacement);
    }
    apply_enrichment(cfg, &mut list.tokens, &slots);
    Ok(())
}

/// Code-token texts in walk order, the shared schedule for enrichment
fn collect_code(cfg: &Config, tokens: &mut [Token]) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    walker::walk(tokens, &cfg.registry, &mut |token| {
        if let Token::Code { text, lang, .. } = token {
            out.push((text.clone(), lang.clone()));
        }
    });
    out
}

/// Apply enrichment replacements by walk position; `None` leaves a token as-is
fn apply_enrichment(cfg: &Config, tokens: &mut [Token], slots: &[Option<String>]) {
    let mut index = 0;
    walker::walk(tokens, &cfg.registry, &mut |token| {
        if let Token::Code { text, escaped, .. } = token {
            if let Some(Some(replacement)) = slots.get(index) {
                *text = replacement.clone();
                // Replacements are ready-made markup; the renderer must not
                // escape them a second time
                *escaped = true;
            }
            index += 1;
        }
    });
}

fn finish_render(cfg: &Config, list: TokenList) -> Result<String, CompileError> {
    render_stage(cfg, LexMode::Block, &list).or_else(|err| gate(&cfg.options, err))
}

// ==================== error policy gate ====================

/// Route one stage failure: silent mode renders an error document on the
/// success path, otherwise the reported error surfaces
fn gate(options: &Options, err: CompileError) -> Result<String, CompileError> {
    let err = err.reported();
    log::error!("compilation failed: {}", err);
    if options.silent {
        Ok(error_markup(&err))
    } else {
        Err(err)
    }
}

fn error_markup(err: &CompileError) -> String {
    format!(
        "<p>An error occurred:</p><pre>{}</pre>",
        escape(&err.to_string(), true)
    )
}

// ==================== callback-mode enrichment batch ====================

type DeliverFn = Box<dyn FnOnce(Result<String, CompileError>) + Send>;

struct BatchPayload {
    list: TokenList,
    cfg: Arc<Config>,
    deliver: DeliverFn,
}

struct BatchState {
    remaining: usize,
    /// True while the dispatch loop is still handing out requests; handles
    /// completing synchronously must not deliver under our feet
    dispatching: bool,
    completed: Vec<bool>,
    slots: Vec<Option<String>>,
    /// Taken exactly once, by whichever path delivers
    payload: Option<BatchPayload>,
}

struct EnrichBatch {
    state: Mutex<BatchState>,
}

impl EnrichBatch {
    fn new(count: usize, payload: BatchPayload) -> Arc<Self> {
        Arc::new(EnrichBatch {
            state: Mutex::new(BatchState {
                remaining: count,
                dispatching: true,
                completed: vec![false; count],
                slots: vec![None; count],
                payload: Some(payload),
            }),
        })
    }

    fn done_handle(self: &Arc<Self>, index: usize) -> EnrichDone {
        let batch = Arc::clone(self);
        Box::new(move |result| batch.complete(index, result))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BatchState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn complete(&self, index: usize, result: Result<Option<String>, CompileError>) {
        let mut state = self.lock();
        if state.payload.is_none() || state.completed.get(index).copied().unwrap_or(true) {
            // Already delivered, or a handle fired twice
            return;
        }
        state.completed[index] = true;
        state.remaining -= 1;

        match result {
            Err(err) => {
                // One failure aborts the batch; later completions are ignored
                if let Some(payload) = state.payload.take() {
                    drop(state);
                    deliver(payload, Err(err));
                }
            }
            Ok(replacement) => {
                state.slots[index] = replacement;
                if state.remaining == 0 && !state.dispatching {
                    if let Some(payload) = state.payload.take() {
                        let slots = std::mem::take(&mut state.slots);
                        drop(state);
                        finish_batch(payload, slots);
                    }
                }
            }
        }
    }

    /// Called once dispatch is over; delivers if every handle already landed
    fn finish_dispatch(&self) {
        let mut state = self.lock();
        state.dispatching = false;
        if state.remaining == 0 {
            if let Some(payload) = state.payload.take() {
                let slots = std::mem::take(&mut state.slots);
                drop(state);
                finish_batch(payload, slots);
            }
        }
    }
}

fn finish_batch(mut payload: BatchPayload, slots: Vec<Option<String>>) {
    apply_enrichment(&payload.cfg, &mut payload.list.tokens, &slots);
    let result = finish_render(&payload.cfg, payload.list);
    (payload.deliver)(result);
}

fn deliver(payload: BatchPayload, result: Result<String, CompileError>) {
    let outcome = result.or_else(|err| gate(&payload.cfg.options, err));
    (payload.deliver)(outcome);
}
