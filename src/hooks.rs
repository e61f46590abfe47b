//! Pre- and post-processing hooks
//!
//! Hooks come in two composition flavors:
//! 1. Pass-through hooks (`preprocess`, `postprocess`) are chained
//!    functionally: the newest layer runs first and the previous layer runs
//!    on its result. When the configuration is async the chain is built over
//!    the asynchronous value channel (`*_async` variants), so it still
//!    composes when any layer is itself asynchronous.
//! 2. `process_tokens` sits outside the pass-through set and composes with
//!    sentinel fallback like renderer overrides: the newest layer runs and
//!    `None` defers to the previous layer; if every layer declines the token
//!    list passes through unchanged.

use crate::error::CompileError;
use crate::token::TokenList;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future type for asynchronous hook variants
pub type HookFuture = Pin<Box<dyn Future<Output = Result<String, CompileError>> + Send>>;

/// One hooks layer. All methods have pass-through defaults, so a layer
/// overrides only what it cares about; the async variants default to the
/// synchronous body.
pub trait Hooks: Send + Sync {
    /// Transform the source before lexing
    fn preprocess(&self, src: String) -> Result<String, CompileError> {
        Ok(src)
    }

    /// Transform the rendered output after parsing
    fn postprocess(&self, output: String) -> Result<String, CompileError> {
        Ok(output)
    }

    /// Rewrite the lexed token list before mutation, or decline with `None`
    fn process_tokens(&self, _tokens: &TokenList) -> Option<Result<TokenList, CompileError>> {
        None
    }

    fn preprocess_async(&self, src: String) -> HookFuture {
        let result = self.preprocess(src);
        Box::pin(async move { result })
    }

    fn postprocess_async(&self, output: String) -> HookFuture {
        let result = self.postprocess(output);
        Box::pin(async move { result })
    }
}

/// The composed hook stack, newest layer first
#[derive(Clone, Default)]
pub struct HookChain {
    layers: Vec<Arc<dyn Hooks>>,
}

impl HookChain {
    /// Push a new layer on top of the chain
    pub fn push(&mut self, layer: Arc<dyn Hooks>) {
        self.layers.insert(0, layer);
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Run every layer's preprocess, newest first
    pub fn preprocess(&self, mut src: String) -> Result<String, CompileError> {
        for layer in &self.layers {
            src = layer.preprocess(src)?;
        }
        Ok(src)
    }

    /// Run every layer's postprocess, newest first
    pub fn postprocess(&self, mut output: String) -> Result<String, CompileError> {
        for layer in &self.layers {
            output = layer.postprocess(output)?;
        }
        Ok(output)
    }

    /// Sentinel-fallback composition: the newest layer that returns a result wins
    pub fn process_tokens(&self, tokens: TokenList) -> Result<TokenList, CompileError> {
        for layer in &self.layers {
            if let Some(result) = layer.process_tokens(&tokens) {
                return result;
            }
        }
        Ok(tokens)
    }

    /// Asynchronous pass-through chain over the same layer order
    pub async fn preprocess_async(&self, mut src: String) -> Result<String, CompileError> {
        for layer in &self.layers {
            src = layer.preprocess_async(src).await?;
        }
        Ok(src)
    }

    pub async fn postprocess_async(&self, mut output: String) -> Result<String, CompileError> {
        for layer in &self.layers {
            output = layer.postprocess_async(output).await?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(&'static str);

    impl Hooks for Tag {
        fn preprocess(&self, src: String) -> Result<String, CompileError> {
            Ok(format!("{}{}", self.0, src))
        }

        fn postprocess(&self, output: String) -> Result<String, CompileError> {
            Ok(format!("{}{}", output, self.0))
        }
    }

    #[test]
    fn test_preprocess_newest_layer_runs_first() {
        let mut chain = HookChain::default();
        chain.push(Arc::new(Tag("a")));
        chain.push(Arc::new(Tag("b")));
        // b registered last, so it runs first; a then prefixes b's result
        assert_eq!(chain.preprocess("x".into()).unwrap(), "abx");
    }

    #[test]
    fn test_postprocess_chains_in_same_order() {
        let mut chain = HookChain::default();
        chain.push(Arc::new(Tag("a")));
        chain.push(Arc::new(Tag("b")));
        assert_eq!(chain.postprocess("x".into()).unwrap(), "xba");
    }

    #[test]
    fn test_empty_chain_passes_through() {
        let chain = HookChain::default();
        assert_eq!(chain.preprocess("x".into()).unwrap(), "x");
        assert_eq!(chain.postprocess("x".into()).unwrap(), "x");
    }

    struct DropTokens;

    impl Hooks for DropTokens {
        fn process_tokens(&self, _tokens: &TokenList) -> Option<Result<TokenList, CompileError>> {
            Some(Ok(TokenList::default()))
        }
    }

    struct Decline;

    impl Hooks for Decline {}

    #[test]
    fn test_process_tokens_falls_back_past_declining_layer() {
        let mut chain = HookChain::default();
        chain.push(Arc::new(DropTokens));
        chain.push(Arc::new(Decline));

        let tokens = TokenList {
            tokens: vec![crate::token::Token::Hr { raw: "---\n".into() }],
            links: Default::default(),
        };
        // Decline is newest and defers; DropTokens handles it
        let result = chain.process_tokens(tokens).unwrap();
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn test_process_tokens_all_decline_passes_through() {
        let mut chain = HookChain::default();
        chain.push(Arc::new(Decline));
        let tokens = TokenList {
            tokens: vec![crate::token::Token::Hr { raw: "---\n".into() }],
            links: Default::default(),
        };
        let result = chain.process_tokens(tokens.clone()).unwrap();
        assert_eq!(result, tokens);
    }
}
