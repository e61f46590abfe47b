//! Property tests for the compiler
//!
//! The compiler must never panic on arbitrary input, must be deterministic,
//! and in silent mode must always resolve on the success path.

use marq::{Compiler, Options};
use proptest::prelude::*;

/// Markdown-ish lines that exercise most block rules
fn markdown_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,30}",
        Just("# heading".to_string()),
        Just("## other heading ##".to_string()),
        Just("- item".to_string()),
        Just("1. item".to_string()),
        Just("> quote".to_string()),
        Just("```".to_string()),
        Just("    indented".to_string()),
        Just("---".to_string()),
        Just("| a | b |".to_string()),
        Just("| - | - |".to_string()),
        Just("**bold** *em* `code` ~~del~~".to_string()),
        Just("[x](http://a.invalid) ![i](b.png)".to_string()),
        Just("[ref]: http://c.invalid".to_string()),
        Just("".to_string()),
    ]
}

fn markdown_document() -> impl Strategy<Value = String> {
    prop::collection::vec(markdown_line(), 0..20).prop_map(|lines| {
        let mut doc = lines.join("\n");
        doc.push('\n');
        doc
    })
}

proptest! {
    #[test]
    fn compile_never_panics_on_arbitrary_input(src in "\\PC{0,400}") {
        let compiler = Compiler::new();
        let _ = compiler.compile(&src);
    }

    #[test]
    fn compile_never_panics_on_structured_documents(src in markdown_document()) {
        let compiler = Compiler::new();
        let _ = compiler.compile(&src);
    }

    #[test]
    fn compile_is_deterministic(src in markdown_document()) {
        let compiler = Compiler::new();
        let first = compiler.compile(&src);
        let second = compiler.compile(&src);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn silent_mode_always_resolves(src in "\\PC{0,200}") {
        let compiler = Compiler::new();
        let options = Options { silent: true, ..Default::default() };
        prop_assert!(compiler.compile_with(&src, Some(options)).is_ok());
    }

    #[test]
    fn inline_compile_never_panics(src in "\\PC{0,200}") {
        let compiler = Compiler::new();
        let _ = compiler.compile_inline(&src);
    }

    #[test]
    fn escaped_text_roundtrips_without_markup(src in "[a-z0-9][a-z0-9 ]{0,39}") {
        // Plain alphanumeric text passes through paragraph rendering intact
        let compiler = Compiler::new();
        let html = compiler.compile(&format!("{}\n", src)).unwrap();
        let trimmed = src.trim_end();
        if !trimmed.is_empty() {
            prop_assert!(html.contains(trimmed), "html: {html:?}, src: {src:?}");
        }
    }
}
