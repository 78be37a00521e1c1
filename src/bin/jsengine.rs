//! CLI wrapper for the jsengine script engine.
//!
//! Usage:
//!   jsengine <file.js>              # Execute a script file
//!   jsengine -e "code"              # Evaluate code
//!   jsengine                        # Start REPL (interactive mode)

use jsengine::runner::ds::source::ScriptSource;
use jsengine::runner::ds::value::JsValue;
use jsengine::runner::engine::ScriptEngine;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => {
            // No arguments: start REPL
            run_repl();
        }
        2 => {
            let arg = &args[1];
            if arg == "-h" || arg == "--help" {
                print_usage();
                process::exit(0);
            }
            run_file(arg);
        }
        3 if args[1] == "-e" || args[1] == "--eval" => {
            eval_code(&args[2]);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("jsengine - embeddable script engine");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  jsengine <file.js>              Execute a script file");
    eprintln!("  jsengine -e \"code\"              Evaluate code");
    eprintln!("  jsengine --eval \"code\"          Evaluate code");
    eprintln!("  jsengine                        Start REPL (interactive mode)");
}

fn run_file(filename: &str) {
    let text = match fs::read_to_string(filename) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", filename, e);
            process::exit(1);
        }
    };

    let mut engine = ScriptEngine::new();
    let source = ScriptSource::with_path(text, filename);
    if let Err(e) = engine.execute(&source) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn eval_code(code: &str) {
    let mut engine = ScriptEngine::new();
    match engine.evaluate_str(code) {
        Ok(value) => {
            if !matches!(value, JsValue::Undefined) {
                println!("{}", value.to_display_string());
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_repl() {
    println!("jsengine v0.1.0");
    println!("Type code and press Enter. Type .exit to quit.");
    println!();

    let mut engine = ScriptEngine::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().unwrap();

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }

        let input = input.trim();

        if input == ".exit" || input == ".quit" {
            break;
        }

        if input.is_empty() {
            continue;
        }

        let source = ScriptSource::with_path(input, "repl");
        match engine.evaluate(&source) {
            Ok(value) => {
                if !matches!(value, JsValue::Undefined) {
                    println!("{}", value.to_display_string());
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    println!("Goodbye!");
}
