pub mod codegen;
pub mod ds;
pub mod engine;
pub mod resolver;
