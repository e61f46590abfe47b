//! Command-line interface for marq
//! This binary compiles markdown files (or stdin) to HTML, and can dump the
//! lexed token tree as JSON for debugging.
//!
//! Usage:
//!   marq compile [`<path>`] [--breaks] [--no-gfm] [--silent]  - Compile markdown to HTML
//!   marq tokens [`<path>`]                                  - Dump the token tree as JSON

use clap::{Arg, ArgAction, Command};
use marq::{Compiler, Lexer, Options};
use std::io::Read;
use std::sync::Arc;

fn main() {
    env_logger::init();

    let matches = Command::new("marq")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A pluggable markdown compiler")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("compile")
                .about("Compile a markdown file to HTML")
                .arg(
                    Arg::new("path")
                        .help("Path to the markdown file; reads stdin when omitted")
                        .index(1),
                )
                .arg(
                    Arg::new("breaks")
                        .long("breaks")
                        .help("Render single newlines inside paragraphs as <br>")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-gfm")
                        .long("no-gfm")
                        .help("Disable GFM constructs (tables, strikethrough, task lists)")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("silent")
                        .long("silent")
                        .help("Render failures as an inline error document instead of exiting")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("tokens")
                .about("Dump the lexed token tree as JSON")
                .arg(
                    Arg::new("path")
                        .help("Path to the markdown file; reads stdin when omitted")
                        .index(1),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("compile", sub)) => {
            let source = read_source(sub.get_one::<String>("path"));
            let options = Options {
                gfm: !sub.get_flag("no-gfm"),
                breaks: sub.get_flag("breaks"),
                silent: sub.get_flag("silent"),
                ..Default::default()
            };
            handle_compile_command(&source, options);
        }
        Some(("tokens", sub)) => {
            let source = read_source(sub.get_one::<String>("path"));
            handle_tokens_command(&source);
        }
        _ => unreachable!(),
    }
}

fn read_source(path: Option<&String>) -> String {
    match path {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).unwrap_or_else(|e| {
                eprintln!("Error reading stdin: {}", e);
                std::process::exit(1);
            });
            buf
        }
    }
}

/// Handle the compile command
fn handle_compile_command(source: &str, options: Options) {
    let compiler = Compiler::new();
    let html = compiler.compile_with(source, Some(options)).unwrap_or_else(|e| {
        eprintln!("Compilation error: {}", e);
        std::process::exit(1);
    });
    print!("{}", html);
}

/// Handle the tokens command
fn handle_tokens_command(source: &str) {
    let config = Arc::new(marq::Config::default());
    let list = Lexer::lex(config, source).unwrap_or_else(|e| {
        eprintln!("Lexing error: {}", e);
        std::process::exit(1);
    });
    let json = serde_json::to_string_pretty(&list.tokens).unwrap_or_else(|e| {
        eprintln!("Serialization error: {}", e);
        std::process::exit(1);
    });
    println!("{}", json);
}
