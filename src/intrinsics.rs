//! Library calls that are executed natively instead of being loaded from a
//! class file. Only console output through `System.out` is supported.
use std::io::{self, Write};

use crate::jvm::MemberRef;
use crate::runtime::Value;

const SYSTEM: &str = "java/lang/System";
const PRINT_STREAM: &str = "java/io/PrintStream";

/// Resolve a `getstatic` target to its value, if it is a known static field.
pub fn static_field(field: &MemberRef) -> Option<Value> {
    match (field.class_name.as_str(), field.name.as_str()) {
        (SYSTEM, "out") => Some(Value::PrintStream),
        _ => None,
    }
}

/// `PrintStream` methods the runtime knows how to execute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Intrinsic {
    /// `println(int)`
    PrintlnInt,
    /// `println(boolean)`
    PrintlnBoolean,
    /// `println(char)`
    PrintlnChar,
    /// `println()`
    Println,
    /// `print(int)`
    PrintInt,
}

impl Intrinsic {
    /// Look up the intrinsic implementing `method`.
    pub fn resolve(method: &MemberRef) -> Option<Self> {
        if method.class_name != PRINT_STREAM {
            return None;
        }
        match (method.name.as_str(), method.descriptor.as_str()) {
            ("println", "(I)V") => Some(Self::PrintlnInt),
            ("println", "(Z)V") => Some(Self::PrintlnBoolean),
            ("println", "(C)V") => Some(Self::PrintlnChar),
            ("println", "()V") => Some(Self::Println),
            ("print", "(I)V") => Some(Self::PrintInt),
            _ => None,
        }
    }

    /// Number of int arguments popped before the receiver.
    pub fn arity(self) -> usize {
        match self {
            Self::Println => 0,
            _ => 1,
        }
    }

    /// Perform the call. `arg` is ignored by `println()`.
    pub fn invoke(self, out: &mut dyn Write, arg: i32) -> io::Result<()> {
        match self {
            Self::PrintlnInt => print_int(out, arg),
            Self::PrintlnBoolean => writeln!(out, "{}", arg != 0),
            Self::PrintlnChar => {
                let c = char::from_u32(arg as u16 as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                writeln!(out, "{c}")
            }
            Self::Println => writeln!(out),
            Self::PrintInt => write!(out, "{arg}"),
        }
    }
}

/// Write `value` in decimal followed by a line terminator.
pub fn print_int(out: &mut dyn Write, value: i32) -> io::Result<()> {
    writeln!(out, "{value}")
}
