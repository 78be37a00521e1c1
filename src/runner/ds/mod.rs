pub mod error;
pub mod function;
pub mod object;
pub mod scope;
pub mod shape;
pub mod source;
pub mod value;
