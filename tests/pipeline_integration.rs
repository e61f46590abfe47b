//! Integration tests for the synchronous compilation pipeline
//!
//! These tests validate that the compiler:
//! 1. Produces the expected HTML for representative documents
//! 2. Honors per-call options without mutating the stored configuration

use marq::{Compiler, Options};

#[test]
fn test_compile_mixed_document() {
    let compiler = Compiler::new();
    let source = "\
# Title

Intro with **bold**, *emphasis*, and `code`.

- first
- second

> quoted text
";
    let html = compiler.compile(source).unwrap();
    insta::assert_snapshot!(html, @r###"
    <h1>Title</h1>
    <p>Intro with <strong>bold</strong>, <em>emphasis</em>, and <code>code</code>.</p>
    <ul>
    <li>first</li>
    <li>second</li>
    </ul>
    <blockquote>
    <p>quoted text</p>
    </blockquote>
    "###);
}

#[test]
fn test_compile_code_and_table() {
    let compiler = Compiler::new();
    let source = "\
```rust
fn main() {}
```

| name | value |
| :--- | ----: |
| a | 1 |
";
    let html = compiler.compile(source).unwrap();
    insta::assert_snapshot!(html, @r###"
    <pre><code class="language-rust">fn main() {}
    </code></pre>
    <table>
    <thead>
    <tr>
    <th align="left">name</th>
    <th align="right">value</th>
    </tr>
    </thead>
    <tbody>
    <tr>
    <td align="left">a</td>
    <td align="right">1</td>
    </tr>
    </tbody>
    </table>
    "###);
}

#[test]
fn test_compile_reference_links() {
    let compiler = Compiler::new();
    let source = "[docs]: https://example.invalid \"Docs\"\n\nSee [the docs][docs].\n";
    let html = compiler.compile(source).unwrap();
    assert_eq!(
        html,
        "<p>See <a href=\"https://example.invalid\" title=\"Docs\">the docs</a>.</p>\n"
    );
}

#[test]
fn test_autolink_at_block_start_becomes_link() {
    let compiler = Compiler::new();
    // A leading `<scheme:...>` must reach the inline autolink rule, not the
    // block HTML rule
    let html = compiler.compile("<http://x.invalid/a>\n").unwrap();
    assert_eq!(
        html,
        "<p><a href=\"http://x.invalid/a\">http://x.invalid/a</a></p>\n"
    );
    // Real tags still pass through as raw HTML blocks
    let html = compiler.compile("<div class=\"x\">\nbody\n</div>\n").unwrap();
    assert!(html.starts_with("<div class=\"x\">"), "got: {html}");
}

#[test]
fn test_compile_empty_source() {
    let compiler = Compiler::new();
    assert_eq!(compiler.compile("").unwrap(), "");
}

#[test]
fn test_compile_inline_strips_block_structure() {
    let compiler = Compiler::new();
    assert_eq!(
        compiler.compile_inline("a **b** c").unwrap(),
        "a <strong>b</strong> c"
    );
}

#[test]
fn test_per_call_options_do_not_stick() {
    let compiler = Compiler::new();
    let breaks = Options {
        breaks: true,
        ..Default::default()
    };
    let with_breaks = compiler.compile_with("a\nb\n", Some(breaks)).unwrap();
    assert!(with_breaks.contains("<br>"), "got: {with_breaks}");

    // The stored configuration is untouched by the override
    let without = compiler.compile("a\nb\n").unwrap();
    assert!(!without.contains("<br>"), "got: {without}");
    assert!(!compiler.options().breaks);
}

#[test]
fn test_gfm_strikethrough_and_tasks() {
    let compiler = Compiler::new();
    let html = compiler.compile("~~gone~~\n\n- [x] done\n").unwrap();
    assert!(html.contains("<del>gone</del>"), "got: {html}");
    assert!(html.contains("checked=\"\""), "got: {html}");
}

#[test]
fn test_no_gfm_disables_strikethrough() {
    let compiler = Compiler::new();
    let plain = Options {
        gfm: false,
        ..Default::default()
    };
    let html = compiler.compile_with("~~kept~~\n", Some(plain)).unwrap();
    assert!(!html.contains("<del>"), "got: {html}");
}

#[test]
fn test_crlf_and_tabs_normalized() {
    let compiler = Compiler::new();
    let html = compiler.compile("# A\r\n\r\n\tcode\r\n").unwrap();
    assert!(html.contains("<h1>A</h1>"), "got: {html}");
    assert!(html.contains("<pre><code>code"), "got: {html}");
}

#[test]
fn test_to_html_convenience() {
    assert_eq!(marq::to_html("*x*\n").unwrap(), "<p><em>x</em></p>\n");
}
