//! A small interpreter for a subset of JVM bytecode.
//!
//! Classes are read from `.class` files on a class path and executed
//! starting from the `main` method of a main class. Only `int` arithmetic,
//! control flow, static calls and printing through `System.out` are
//! supported.
pub mod bytecode;
pub mod classpath;
pub mod error;
pub mod intrinsics;
pub mod jvm;
pub mod program;
pub mod runtime;

pub use classpath::ClassPath;
pub use error::{RuntimeError, RuntimeErrorKind};
pub use runtime::{Runtime, RuntimeOptions};
