//! Error types shared by the class-file reader and the runtime.
use std::io;

use thiserror::Error;

use crate::bytecode::OPCode;

/// A constant pool lookup hit an index that is out of range or holds an
/// entry of the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("constant pool entry #{index} is not a valid {expected}")]
pub struct ConstantPoolError {
    pub index: u16,
    pub expected: &'static str,
}

/// Failures while reading or decoding a class file.
#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("truncated class file: {0}")]
    Io(#[from] io::Error),

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unknown constant pool tag {tag} at #{index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("two-slot constant at #{index} runs past the end of the pool")]
    ConstantPoolOverflow { index: u16 },

    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolError),

    #[error("malformed method descriptor `{0}`")]
    MalformedDescriptor(String),

    #[error("invalid opcode {opcode:#04x} at pc {pc}")]
    InvalidOpcode { opcode: u8, pc: usize },

    #[error("truncated instruction at pc {pc}")]
    TruncatedInstruction { pc: usize },

    #[error("branch at pc {pc} jumps outside the method to {target}")]
    BranchOutOfRange { pc: usize, target: i64 },
}

/// `RuntimeErrorKind` groups runtime failures by what went wrong, it is
/// what callers should match on when they only care about the category.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// A class, method or constant could not be resolved.
    Resolution,
    /// The program needs an opcode or library call we don't implement.
    Unsupported,
    /// Operand stack, locals or call stack were used inconsistently.
    Invariant,
    /// Division or remainder by zero.
    Arithmetic,
    /// A class file on the class path is malformed.
    Format,
    /// Writing program output failed.
    Io,
}

/// `RuntimeError` is the terminal outcome of a failed run, every variant
/// aborts execution.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("no method {name}{descriptor} in class {class}")]
    NoSuchMethod {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error(transparent)]
    ConstantPool(#[from] ConstantPoolError),

    #[error("unsupported opcode {opcode} at pc {pc}")]
    UnsupportedOpcode { opcode: OPCode, pc: usize },

    #[error("unsupported static field {class}.{name}")]
    UnsupportedField { class: String, name: String },

    #[error("unsupported method {class}.{name}{descriptor}")]
    UnsupportedMethod {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("unsupported constant #{0} for ldc")]
    UnsupportedConstant(u16),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("local variable {0} is out of range")]
    InvalidLocal(usize),

    #[error("no instruction at byte offset {0}")]
    InvalidBranchTarget(usize),

    #[error("call stack is empty")]
    EmptyCallStack,

    #[error("stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),

    #[error("ArithmeticException: / by zero")]
    DivisionByZero,

    #[error(transparent)]
    Format(#[from] ClassFormatError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            Self::ClassNotFound(_)
            | Self::NoSuchMethod { .. }
            | Self::ConstantPool(_) => RuntimeErrorKind::Resolution,
            Self::UnsupportedOpcode { .. }
            | Self::UnsupportedField { .. }
            | Self::UnsupportedMethod { .. }
            | Self::UnsupportedConstant(_) => RuntimeErrorKind::Unsupported,
            Self::StackUnderflow
            | Self::TypeMismatch { .. }
            | Self::InvalidLocal(_)
            | Self::InvalidBranchTarget(_)
            | Self::EmptyCallStack
            | Self::StackOverflow(_) => RuntimeErrorKind::Invariant,
            Self::DivisionByZero => RuntimeErrorKind::Arithmetic,
            Self::Format(_) => RuntimeErrorKind::Format,
            Self::Io(_) => RuntimeErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        assert_eq!(
            RuntimeError::ClassNotFound("a.B".into()).kind(),
            RuntimeErrorKind::Resolution
        );
        assert_eq!(
            RuntimeError::DivisionByZero.kind(),
            RuntimeErrorKind::Arithmetic
        );
        assert_eq!(
            RuntimeError::InvalidBranchTarget(3).kind(),
            RuntimeErrorKind::Invariant
        );
        let opcode = RuntimeError::UnsupportedOpcode {
            opcode: OPCode::FAdd,
            pc: 0,
        };
        assert_eq!(opcode.kind(), RuntimeErrorKind::Unsupported);
        assert_eq!(opcode.to_string(), "unsupported opcode fadd at pc 0");
    }

    #[test]
    fn constant_pool_errors_name_the_index() {
        let err: RuntimeError = ConstantPoolError {
            index: 7,
            expected: "Methodref",
        }
        .into();
        assert_eq!(err.kind(), RuntimeErrorKind::Resolution);
        assert_eq!(
            err.to_string(),
            "constant pool entry #7 is not a valid Methodref"
        );
    }
}
