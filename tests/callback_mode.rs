//! Integration tests for the callback execution channel
//!
//! These tests validate the enrichment batch state machine:
//! 1. The callback fires exactly once, after the last completion lands
//! 2. Completions arriving from other threads, in any order, are applied
//!    by document position
//! 3. A failing completion aborts the batch and later completions are ignored

use marq::{CompileError, Compiler, Enrich, EnrichDone, ExtensionPack, Options};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Completes every request on its own thread; the nth request sleeps so
/// completions land out of dispatch order
struct ThreadedHighlighter {
    delays: Vec<u64>,
    seen: Arc<Mutex<usize>>,
}

impl Enrich for ThreadedHighlighter {
    fn enrich(&self, text: &str, _lang: Option<&str>, done: EnrichDone) {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            let i = *seen;
            *seen += 1;
            i
        };
        let delay = self.delays.get(index).copied().unwrap_or(0);
        let text = text.to_string();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay));
            done(Ok(Some(format!("hl({})", text))));
        });
    }
}

fn three_blocks() -> &'static str {
    "```\none\n```\n\n```\ntwo\n```\n\n```\nthree\n```\n"
}

#[test]
fn test_callback_waits_for_out_of_order_completions() {
    let mut compiler = Compiler::new();
    compiler
        .register(ExtensionPack {
            enrich: Some(Arc::new(ThreadedHighlighter {
                // The middle block lands last
                delays: vec![5, 60, 5],
                seen: Arc::new(Mutex::new(0)),
            })),
            ..Default::default()
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    compiler.compile_with_callback(three_blocks(), None, move |result| {
        tx.send(result).unwrap();
    });

    let html = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback must fire")
        .unwrap();
    // Replacements land by document position, not completion order
    let one = html.find("hl(one)").expect("first block");
    let two = html.find("hl(two)").expect("second block");
    let three = html.find("hl(three)").expect("third block");
    assert!(one < two && two < three, "got: {html}");
    // Exactly once
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

struct FailSecond {
    seen: Arc<Mutex<usize>>,
}

impl Enrich for FailSecond {
    fn enrich(&self, text: &str, _lang: Option<&str>, done: EnrichDone) {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            let i = *seen;
            *seen += 1;
            i
        };
        let text = text.to_string();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5 + 5 * index as u64));
            if index == 1 {
                done(Err(CompileError::Enrich("second block refused".into())));
            } else {
                done(Ok(Some(text)));
            }
        });
    }
}

#[test]
fn test_failing_completion_aborts_batch_once() {
    let mut compiler = Compiler::new();
    compiler
        .register(ExtensionPack {
            enrich: Some(Arc::new(FailSecond {
                seen: Arc::new(Mutex::new(0)),
            })),
            ..Default::default()
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    compiler.compile_with_callback(three_blocks(), None, move |result| {
        tx.send(result).unwrap();
    });

    let result = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback must fire");
    let err = result.unwrap_err();
    assert!(
        matches!(err.inner(), CompileError::Enrich(msg) if msg == "second block refused"),
        "got: {err}"
    );
    // The third completion must not trigger a second delivery
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_failing_completion_with_silent_resolves_error_document() {
    let mut compiler = Compiler::new();
    compiler
        .register(ExtensionPack {
            enrich: Some(Arc::new(FailSecond {
                seen: Arc::new(Mutex::new(0)),
            })),
            ..Default::default()
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let silent = Options {
        silent: true,
        ..Default::default()
    };
    compiler.compile_with_callback(three_blocks(), Some(silent), move |result| {
        tx.send(result).unwrap();
    });

    let html = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback must fire")
        .unwrap();
    assert!(html.starts_with("<p>An error occurred:</p><pre>"), "got: {html}");
    assert!(html.contains("second block refused"), "got: {html}");
}

#[test]
fn test_enriched_markup_is_not_escaped_again() {
    struct SpanWrapper;
    impl Enrich for SpanWrapper {
        fn enrich(&self, text: &str, lang: Option<&str>, done: EnrichDone) {
            let lang = lang.unwrap_or("plain").to_string();
            done(Ok(Some(format!(
                "<span class=\"{}\">{}</span>",
                lang,
                text.trim_end()
            ))));
        }
    }
    let mut compiler = Compiler::new();
    compiler
        .register(ExtensionPack {
            enrich: Some(Arc::new(SpanWrapper)),
            ..Default::default()
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    compiler.compile_with_callback("```rust\nlet x = 1;\n```\n", None, move |result| {
        tx.send(result).unwrap();
    });
    let html = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    // The highlighter's markup survives rendering verbatim
    assert!(
        html.contains("<span class=\"rust\">let x = 1;</span>"),
        "got: {html}"
    );
    assert!(!html.contains("&lt;span"), "got: {html}");
}

#[test]
fn test_callback_without_code_blocks_skips_enrichment() {
    let counter = Arc::new(Mutex::new(0));
    struct Counting(Arc<Mutex<usize>>);
    impl Enrich for Counting {
        fn enrich(&self, _text: &str, _lang: Option<&str>, done: EnrichDone) {
            *self.0.lock().unwrap() += 1;
            done(Ok(None));
        }
    }
    let mut compiler = Compiler::new();
    compiler
        .register(ExtensionPack {
            enrich: Some(Arc::new(Counting(counter.clone()))),
            ..Default::default()
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    compiler.compile_with_callback("no code here\n", None, move |result| {
        tx.send(result).unwrap();
    });
    let html = rx.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(html, "<p>no code here</p>\n");
    assert_eq!(*counter.lock().unwrap(), 0);
}
