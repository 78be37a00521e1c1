//! # jsengine - An embeddable script engine in Rust
//!
//! A compile-and-run engine for a JavaScript-like language:
//! - PEG parser producing a compact AST
//! - Scope/binding resolver that lowers references to slot accesses
//! - Bytecode compiler with structured exception regions
//! - Stack VM with hidden-class (shape) backed objects
//!
//! ## Quick Start
//!
//! ```
//! use jsengine::runner::engine::ScriptEngine;
//!
//! let mut engine = ScriptEngine::new();
//! let result = engine.evaluate_str("var x = 5 + 3; x").unwrap();
//! assert_eq!(result.to_display_string(), "8");
//! ```
//!
//! ## Embedding
//!
//! Hosts push values in with [`runner::engine::ScriptEngine::set_global_value`],
//! read them back with `get_global_value`, and expose native functions with
//! `register_function`. Work can be deferred onto the engine's post-execute
//! queue (drained after each top-level run) or pushed from other threads via
//! the event queue handle and pumped with `pump_event_queue`.
//!
//! ## Architecture
//!
//! - **[`parser`]** - PEG grammar, AST types and the pest-to-AST builder
//! - **[`runner`]** - Everything past parsing
//!   - **[`runner::ds`]** - Values, shapes, objects, scopes, errors
//!   - **[`runner::codegen`]** - Bytecode compiler and the VM
//!   - **[`runner::engine`]** - The embedding facade

#[macro_use]
extern crate lazy_static;

pub mod parser;
pub mod runner;
