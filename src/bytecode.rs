//! JVM opcodes and the decoder that turns a method's code array into a
//! sequence of instructions.
//!
//! JVM instructions are variable width, a `bipush` takes two bytes while a
//! `tableswitch` can take hundreds. Branches encode their targets as byte
//! offsets into the method's code array, so every decoded instruction keeps
//! the offset (`pc`) it was read from.
use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::ClassFormatError;

macro_rules! opcodes {
    ($($name:ident = $byte:literal => $mnemonic:literal,)*) => {
        /// Every opcode defined by the JVM specification.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OPCode {
            $($name = $byte,)*
        }

        impl OPCode {
            /// Returns the mnemonic used by `javap` for this opcode.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }
        }

        impl TryFrom<u8> for OPCode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $($byte => Ok(Self::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    NOP = 0x00 => "nop",
    AConstNull = 0x01 => "aconst_null",
    IconstM1 = 0x02 => "iconst_m1",
    Iconst0 = 0x03 => "iconst_0",
    Iconst1 = 0x04 => "iconst_1",
    Iconst2 = 0x05 => "iconst_2",
    Iconst3 = 0x06 => "iconst_3",
    Iconst4 = 0x07 => "iconst_4",
    Iconst5 = 0x08 => "iconst_5",
    LConst0 = 0x09 => "lconst_0",
    LConst1 = 0x0a => "lconst_1",
    FConst0 = 0x0b => "fconst_0",
    FConst1 = 0x0c => "fconst_1",
    FConst2 = 0x0d => "fconst_2",
    DConst0 = 0x0e => "dconst_0",
    DConst1 = 0x0f => "dconst_1",
    BiPush = 0x10 => "bipush",
    SiPush = 0x11 => "sipush",
    Ldc = 0x12 => "ldc",
    LdcW = 0x13 => "ldc_w",
    Ldc2W = 0x14 => "ldc2_w",
    ILoad = 0x15 => "iload",
    LLoad = 0x16 => "lload",
    FLoad = 0x17 => "fload",
    DLoad = 0x18 => "dload",
    ALoad = 0x19 => "aload",
    ILoad0 = 0x1a => "iload_0",
    ILoad1 = 0x1b => "iload_1",
    ILoad2 = 0x1c => "iload_2",
    ILoad3 = 0x1d => "iload_3",
    LLoad0 = 0x1e => "lload_0",
    LLoad1 = 0x1f => "lload_1",
    LLoad2 = 0x20 => "lload_2",
    LLoad3 = 0x21 => "lload_3",
    FLoad0 = 0x22 => "fload_0",
    FLoad1 = 0x23 => "fload_1",
    FLoad2 = 0x24 => "fload_2",
    FLoad3 = 0x25 => "fload_3",
    DLoad0 = 0x26 => "dload_0",
    DLoad1 = 0x27 => "dload_1",
    DLoad2 = 0x28 => "dload_2",
    DLoad3 = 0x29 => "dload_3",
    ALoad0 = 0x2a => "aload_0",
    ALoad1 = 0x2b => "aload_1",
    ALoad2 = 0x2c => "aload_2",
    ALoad3 = 0x2d => "aload_3",
    IALoad = 0x2e => "iaload",
    LALoad = 0x2f => "laload",
    FALoad = 0x30 => "faload",
    DALoad = 0x31 => "daload",
    AALoad = 0x32 => "aaload",
    BALoad = 0x33 => "baload",
    CALoad = 0x34 => "caload",
    SALoad = 0x35 => "saload",
    IStore = 0x36 => "istore",
    LStore = 0x37 => "lstore",
    FStore = 0x38 => "fstore",
    DStore = 0x39 => "dstore",
    AStore = 0x3a => "astore",
    IStore0 = 0x3b => "istore_0",
    IStore1 = 0x3c => "istore_1",
    IStore2 = 0x3d => "istore_2",
    IStore3 = 0x3e => "istore_3",
    LStore0 = 0x3f => "lstore_0",
    LStore1 = 0x40 => "lstore_1",
    LStore2 = 0x41 => "lstore_2",
    LStore3 = 0x42 => "lstore_3",
    FStore0 = 0x43 => "fstore_0",
    FStore1 = 0x44 => "fstore_1",
    FStore2 = 0x45 => "fstore_2",
    FStore3 = 0x46 => "fstore_3",
    DStore0 = 0x47 => "dstore_0",
    DStore1 = 0x48 => "dstore_1",
    DStore2 = 0x49 => "dstore_2",
    DStore3 = 0x4a => "dstore_3",
    AStore0 = 0x4b => "astore_0",
    AStore1 = 0x4c => "astore_1",
    AStore2 = 0x4d => "astore_2",
    AStore3 = 0x4e => "astore_3",
    IAStore = 0x4f => "iastore",
    LAStore = 0x50 => "lastore",
    FAStore = 0x51 => "fastore",
    DAStore = 0x52 => "dastore",
    AAStore = 0x53 => "aastore",
    BAStore = 0x54 => "bastore",
    CAStore = 0x55 => "castore",
    SAStore = 0x56 => "sastore",
    Pop = 0x57 => "pop",
    Pop2 = 0x58 => "pop2",
    Dup = 0x59 => "dup",
    DupX1 = 0x5a => "dup_x1",
    DupX2 = 0x5b => "dup_x2",
    Dup2 = 0x5c => "dup2",
    Dup2X1 = 0x5d => "dup2_x1",
    Dup2X2 = 0x5e => "dup2_x2",
    Swap = 0x5f => "swap",
    IAdd = 0x60 => "iadd",
    LAdd = 0x61 => "ladd",
    FAdd = 0x62 => "fadd",
    DAdd = 0x63 => "dadd",
    ISub = 0x64 => "isub",
    LSub = 0x65 => "lsub",
    FSub = 0x66 => "fsub",
    DSub = 0x67 => "dsub",
    IMul = 0x68 => "imul",
    LMul = 0x69 => "lmul",
    FMul = 0x6a => "fmul",
    DMul = 0x6b => "dmul",
    IDiv = 0x6c => "idiv",
    LDiv = 0x6d => "ldiv",
    FDiv = 0x6e => "fdiv",
    DDiv = 0x6f => "ddiv",
    IRem = 0x70 => "irem",
    LRem = 0x71 => "lrem",
    FRem = 0x72 => "frem",
    DRem = 0x73 => "drem",
    INeg = 0x74 => "ineg",
    LNeg = 0x75 => "lneg",
    FNeg = 0x76 => "fneg",
    DNeg = 0x77 => "dneg",
    IShl = 0x78 => "ishl",
    LShl = 0x79 => "lshl",
    IShr = 0x7a => "ishr",
    LShr = 0x7b => "lshr",
    IUShr = 0x7c => "iushr",
    LUShr = 0x7d => "lushr",
    IAnd = 0x7e => "iand",
    LAnd = 0x7f => "land",
    IOr = 0x80 => "ior",
    LOr = 0x81 => "lor",
    IXor = 0x82 => "ixor",
    LXor = 0x83 => "lxor",
    IInc = 0x84 => "iinc",
    I2L = 0x85 => "i2l",
    I2F = 0x86 => "i2f",
    I2D = 0x87 => "i2d",
    L2I = 0x88 => "l2i",
    L2F = 0x89 => "l2f",
    L2D = 0x8a => "l2d",
    F2I = 0x8b => "f2i",
    F2L = 0x8c => "f2l",
    F2D = 0x8d => "f2d",
    D2I = 0x8e => "d2i",
    D2L = 0x8f => "d2l",
    D2F = 0x90 => "d2f",
    I2B = 0x91 => "i2b",
    I2C = 0x92 => "i2c",
    I2S = 0x93 => "i2s",
    LCmp = 0x94 => "lcmp",
    FCmpL = 0x95 => "fcmpl",
    FCmpG = 0x96 => "fcmpg",
    DCmpL = 0x97 => "dcmpl",
    DCmpG = 0x98 => "dcmpg",
    IfEq = 0x99 => "ifeq",
    IfNe = 0x9a => "ifne",
    IfLt = 0x9b => "iflt",
    IfGe = 0x9c => "ifge",
    IfGt = 0x9d => "ifgt",
    IfLe = 0x9e => "ifle",
    IfICmpEq = 0x9f => "if_icmpeq",
    IfICmpNe = 0xa0 => "if_icmpne",
    IfICmpLt = 0xa1 => "if_icmplt",
    IfICmpGe = 0xa2 => "if_icmpge",
    IfICmpGt = 0xa3 => "if_icmpgt",
    IfICmpLe = 0xa4 => "if_icmple",
    IfACmpEq = 0xa5 => "if_acmpeq",
    IfACmpNe = 0xa6 => "if_acmpne",
    Goto = 0xa7 => "goto",
    Jsr = 0xa8 => "jsr",
    Ret = 0xa9 => "ret",
    TableSwitch = 0xaa => "tableswitch",
    LookupSwitch = 0xab => "lookupswitch",
    IReturn = 0xac => "ireturn",
    LReturn = 0xad => "lreturn",
    FReturn = 0xae => "freturn",
    DReturn = 0xaf => "dreturn",
    AReturn = 0xb0 => "areturn",
    Return = 0xb1 => "return",
    GetStatic = 0xb2 => "getstatic",
    PutStatic = 0xb3 => "putstatic",
    GetField = 0xb4 => "getfield",
    PutField = 0xb5 => "putfield",
    InvokeVirtual = 0xb6 => "invokevirtual",
    InvokeSpecial = 0xb7 => "invokespecial",
    InvokeStatic = 0xb8 => "invokestatic",
    InvokeInterface = 0xb9 => "invokeinterface",
    InvokeDynamic = 0xba => "invokedynamic",
    New = 0xbb => "new",
    NewArray = 0xbc => "newarray",
    ANewArray = 0xbd => "anewarray",
    ArrayLength = 0xbe => "arraylength",
    AThrow = 0xbf => "athrow",
    CheckCast = 0xc0 => "checkcast",
    InstanceOf = 0xc1 => "instanceof",
    MonitorEnter = 0xc2 => "monitorenter",
    MonitorExit = 0xc3 => "monitorexit",
    Wide = 0xc4 => "wide",
    MultiANewArray = 0xc5 => "multianewarray",
    IfNull = 0xc6 => "ifnull",
    IfNonNull = 0xc7 => "ifnonnull",
    GotoW = 0xc8 => "goto_w",
    JsrW = 0xc9 => "jsr_w",
}

impl OPCode {
    /// Number of operand bytes following a fixed width opcode. `wide` and
    /// the two switch instructions are variable width and report zero here.
    fn operand_width(self) -> usize {
        match self {
            Self::BiPush
            | Self::Ldc
            | Self::ILoad
            | Self::LLoad
            | Self::FLoad
            | Self::DLoad
            | Self::ALoad
            | Self::IStore
            | Self::LStore
            | Self::FStore
            | Self::DStore
            | Self::AStore
            | Self::Ret
            | Self::NewArray => 1,
            Self::SiPush
            | Self::LdcW
            | Self::Ldc2W
            | Self::IInc
            | Self::IfEq
            | Self::IfNe
            | Self::IfLt
            | Self::IfGe
            | Self::IfGt
            | Self::IfLe
            | Self::IfICmpEq
            | Self::IfICmpNe
            | Self::IfICmpLt
            | Self::IfICmpGe
            | Self::IfICmpGt
            | Self::IfICmpLe
            | Self::IfACmpEq
            | Self::IfACmpNe
            | Self::Goto
            | Self::Jsr
            | Self::GetStatic
            | Self::PutStatic
            | Self::GetField
            | Self::PutField
            | Self::InvokeVirtual
            | Self::InvokeSpecial
            | Self::InvokeStatic
            | Self::New
            | Self::ANewArray
            | Self::CheckCast
            | Self::InstanceOf
            | Self::IfNull
            | Self::IfNonNull => 2,
            Self::MultiANewArray => 3,
            Self::InvokeInterface | Self::InvokeDynamic | Self::GotoW | Self::JsrW => 4,
            _ => 0,
        }
    }
}

impl fmt::Display for OPCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Integer binary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Branch conditions, shared by the compare-with-zero (`ifeq`...) and the
/// compare-two-ints (`if_icmpeq`...) families.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    /// Whether the branch is taken given how the left operand compares to
    /// the right one.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Ge => ordering != Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

/// The operation an instruction performs. Opcodes the runtime does not
/// execute decode to `Unsupported` so that a method containing them can
/// still be loaded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    Nop,
    /// `iconst_<n>`, `bipush` and `sipush`.
    Push(i32),
    Ldc(u16),
    ILoad(u16),
    IStore(u16),
    IInc { index: u16, delta: i32 },
    Arith(ArithOp),
    INeg,
    Pop,
    Dup,
    /// Compare the popped int against zero. `target` is an absolute byte
    /// offset into the method's code.
    If { cond: Condition, target: usize },
    IfICmp { cond: Condition, target: usize },
    Goto(usize),
    GetStatic(u16),
    InvokeVirtual(u16),
    InvokeStatic(u16),
    IReturn,
    Return,
    Unsupported,
}

/// A decoded instruction and the byte offset it starts at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub mnemonic: OPCode,
    pub op: Op,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.pc, self.mnemonic)
    }
}

/// Decode a method's code array into instructions.
///
/// # Errors
/// Fails on reserved opcode bytes, on code that ends in the middle of an
/// instruction and on branches whose target falls outside the code array.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, ClassFormatError> {
    let mut reader = CodeReader {
        cursor: Cursor::new(code),
        pc: 0,
    };
    let mut instructions = Vec::new();
    while reader.offset() < code.len() {
        reader.pc = reader.offset();
        instructions.push(reader.instruction()?);
    }
    Ok(instructions)
}

/// Reads the operands of the instruction starting at `pc`.
struct CodeReader<'a> {
    cursor: Cursor<&'a [u8]>,
    pc: usize,
}

impl<'a> CodeReader<'a> {
    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn truncated(&self) -> ClassFormatError {
        ClassFormatError::TruncatedInstruction { pc: self.pc }
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    fn i8(&mut self) -> Result<i8, ClassFormatError> {
        self.cursor.read_i8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn i16(&mut self) -> Result<i16, ClassFormatError> {
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn i32(&mut self) -> Result<i32, ClassFormatError> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn skip(&mut self, count: usize) -> Result<(), ClassFormatError> {
        let end = self.offset() + count;
        if end > self.cursor.get_ref().len() {
            return Err(self.truncated());
        }
        self.cursor.set_position(end as u64);
        Ok(())
    }

    fn target(&self, offset: i64) -> Result<usize, ClassFormatError> {
        let target = self.pc as i64 + offset;
        if target < 0 || target >= self.cursor.get_ref().len() as i64 {
            return Err(ClassFormatError::BranchOutOfRange {
                pc: self.pc,
                target,
            });
        }
        Ok(target as usize)
    }

    fn branch(&mut self) -> Result<usize, ClassFormatError> {
        let offset = self.i16()?;
        self.target(offset as i64)
    }

    /// Switch operands are aligned to a multiple of four bytes from the
    /// start of the code array.
    fn skip_switch_padding(&mut self) -> Result<(), ClassFormatError> {
        let padding = (4 - self.offset() % 4) % 4;
        self.skip(padding)
    }

    fn instruction(&mut self) -> Result<Instruction, ClassFormatError> {
        let byte = self.u8()?;
        let mnemonic = OPCode::try_from(byte).map_err(|opcode| {
            ClassFormatError::InvalidOpcode {
                opcode,
                pc: self.pc,
            }
        })?;
        let (mnemonic, op) = match mnemonic {
            OPCode::Wide => self.wide()?,
            other => (other, self.op(other)?),
        };
        Ok(Instruction {
            pc: self.pc,
            mnemonic,
            op,
        })
    }

    fn op(&mut self, mnemonic: OPCode) -> Result<Op, ClassFormatError> {
        let op = match mnemonic {
            OPCode::NOP => Op::Nop,
            OPCode::IconstM1 => Op::Push(-1),
            OPCode::Iconst0 => Op::Push(0),
            OPCode::Iconst1 => Op::Push(1),
            OPCode::Iconst2 => Op::Push(2),
            OPCode::Iconst3 => Op::Push(3),
            OPCode::Iconst4 => Op::Push(4),
            OPCode::Iconst5 => Op::Push(5),
            OPCode::BiPush => Op::Push(self.i8()? as i32),
            OPCode::SiPush => Op::Push(self.i16()? as i32),
            OPCode::Ldc => Op::Ldc(self.u8()? as u16),
            OPCode::LdcW => Op::Ldc(self.u16()?),
            OPCode::ILoad => Op::ILoad(self.u8()? as u16),
            OPCode::ILoad0 => Op::ILoad(0),
            OPCode::ILoad1 => Op::ILoad(1),
            OPCode::ILoad2 => Op::ILoad(2),
            OPCode::ILoad3 => Op::ILoad(3),
            OPCode::IStore => Op::IStore(self.u8()? as u16),
            OPCode::IStore0 => Op::IStore(0),
            OPCode::IStore1 => Op::IStore(1),
            OPCode::IStore2 => Op::IStore(2),
            OPCode::IStore3 => Op::IStore(3),
            OPCode::IInc => Op::IInc {
                index: self.u8()? as u16,
                delta: self.i8()? as i32,
            },
            OPCode::IAdd => Op::Arith(ArithOp::Add),
            OPCode::ISub => Op::Arith(ArithOp::Sub),
            OPCode::IMul => Op::Arith(ArithOp::Mul),
            OPCode::IDiv => Op::Arith(ArithOp::Div),
            OPCode::IRem => Op::Arith(ArithOp::Rem),
            OPCode::INeg => Op::INeg,
            OPCode::Pop => Op::Pop,
            OPCode::Dup => Op::Dup,
            OPCode::IfEq => self.if_zero(Condition::Eq)?,
            OPCode::IfNe => self.if_zero(Condition::Ne)?,
            OPCode::IfLt => self.if_zero(Condition::Lt)?,
            OPCode::IfGe => self.if_zero(Condition::Ge)?,
            OPCode::IfGt => self.if_zero(Condition::Gt)?,
            OPCode::IfLe => self.if_zero(Condition::Le)?,
            OPCode::IfICmpEq => self.if_icmp(Condition::Eq)?,
            OPCode::IfICmpNe => self.if_icmp(Condition::Ne)?,
            OPCode::IfICmpLt => self.if_icmp(Condition::Lt)?,
            OPCode::IfICmpGe => self.if_icmp(Condition::Ge)?,
            OPCode::IfICmpGt => self.if_icmp(Condition::Gt)?,
            OPCode::IfICmpLe => self.if_icmp(Condition::Le)?,
            OPCode::Goto => Op::Goto(self.branch()?),
            OPCode::GotoW => {
                let offset = self.i32()?;
                Op::Goto(self.target(offset as i64)?)
            }
            OPCode::GetStatic => Op::GetStatic(self.u16()?),
            OPCode::InvokeVirtual => Op::InvokeVirtual(self.u16()?),
            OPCode::InvokeStatic => Op::InvokeStatic(self.u16()?),
            OPCode::IReturn => Op::IReturn,
            OPCode::Return => Op::Return,
            OPCode::TableSwitch => {
                self.skip_switch_padding()?;
                let _default = self.i32()?;
                let low = self.i32()? as i64;
                let high = self.i32()? as i64;
                let count = (high - low + 1).max(0) as usize;
                self.skip(count * 4)?;
                Op::Unsupported
            }
            OPCode::LookupSwitch => {
                self.skip_switch_padding()?;
                let _default = self.i32()?;
                let pairs = self.i32()?.max(0) as usize;
                self.skip(pairs * 8)?;
                Op::Unsupported
            }
            other => {
                self.skip(other.operand_width())?;
                Op::Unsupported
            }
        };
        Ok(op)
    }

    fn if_zero(&mut self, cond: Condition) -> Result<Op, ClassFormatError> {
        Ok(Op::If {
            cond,
            target: self.branch()?,
        })
    }

    fn if_icmp(&mut self, cond: Condition) -> Result<Op, ClassFormatError> {
        Ok(Op::IfICmp {
            cond,
            target: self.branch()?,
        })
    }

    /// `wide` widens the local index of the following load, store or
    /// `ret` to two bytes, and for `iinc` the increment as well.
    fn wide(&mut self) -> Result<(OPCode, Op), ClassFormatError> {
        let byte = self.u8()?;
        let pc = self.pc;
        let invalid = move || ClassFormatError::InvalidOpcode { opcode: byte, pc };
        let mnemonic = OPCode::try_from(byte).map_err(|_| invalid())?;
        let op = match mnemonic {
            OPCode::ILoad => Op::ILoad(self.u16()?),
            OPCode::IStore => Op::IStore(self.u16()?),
            OPCode::IInc => Op::IInc {
                index: self.u16()?,
                delta: self.i16()? as i32,
            },
            OPCode::LLoad
            | OPCode::FLoad
            | OPCode::DLoad
            | OPCode::ALoad
            | OPCode::LStore
            | OPCode::FStore
            | OPCode::DStore
            | OPCode::AStore
            | OPCode::Ret => {
                self.skip(2)?;
                Op::Unsupported
            }
            _ => return Err(invalid()),
        };
        Ok((mnemonic, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_decode_factorial() {
        // static int factorial(int n) {
        //     if (n - 1 == 0) return 1;
        //     return n * factorial(n - 1);
        // }
        let code = [
            0x1a, 0x04, 0x64, 0x9a, 0x00, 0x05, 0x04, 0xac, 0x1a, 0x1a, 0x04,
            0x64, 0xb8, 0x00, 0x0d, 0x68, 0xac,
        ];
        let instructions = decode(&code).unwrap();
        let pcs: Vec<usize> = instructions.iter().map(|i| i.pc).collect();
        assert_eq!(pcs, vec![0, 1, 2, 3, 6, 7, 8, 9, 10, 11, 12, 15, 16]);
        assert_eq!(
            instructions[3].op,
            Op::If {
                cond: Condition::Ne,
                target: 8
            }
        );
        assert_eq!(instructions[10].op, Op::InvokeStatic(13));
        assert_eq!(instructions[11].op, Op::Arith(ArithOp::Mul));
        assert_eq!(instructions[12].mnemonic, OPCode::IReturn);
    }

    #[test]
    fn push_operands_are_sign_extended() {
        let code = [0x10, 0xff, 0x11, 0x80, 0x00, 0x02];
        let ops: Vec<Op> = decode(&code).unwrap().iter().map(|i| i.op).collect();
        assert_eq!(ops, vec![Op::Push(-1), Op::Push(-32768), Op::Push(-1)]);
    }

    #[test]
    fn backward_branches_resolve_to_absolute_offsets() {
        // 0: iconst_1, 1: pop, 2: goto -2
        let code = [0x04, 0x57, 0xa7, 0xff, 0xfe];
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions[2].op, Op::Goto(0));
    }

    #[test]
    fn unsupported_opcodes_keep_offsets_aligned() {
        // 0: aload_0, 1: invokespecial #1, 4: ldc2_w #2, 7: return
        let code = [0x2a, 0xb7, 0x00, 0x01, 0x14, 0x00, 0x02, 0xb1];
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].op, Op::Unsupported);
        assert_eq!(instructions[3].pc, 7);
        assert_eq!(instructions[3].op, Op::Return);
    }

    #[test]
    fn switch_padding_is_relative_to_code_start() {
        // 0: iconst_0, 1: tableswitch, 2-3: padding, 4: default, 8: low = 0,
        // 12: high = 1, 16: two jump offsets, 24: return
        let mut code = vec![0x03, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.extend_from_slice(&23i32.to_be_bytes());
        code.push(0xb1);
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[1].mnemonic, OPCode::TableSwitch);
        assert_eq!(instructions[2].pc, 24);
    }

    #[test]
    fn lookupswitch_padding_keeps_offsets() {
        // 0: nop, 1: iconst_0, 2: lookupswitch, 3: padding, 4: default,
        // 8: npairs = 2, 12: two match/offset pairs, 28: return
        let mut code = vec![0x00, 0x03, 0xab, 0x00];
        code.extend_from_slice(&26i32.to_be_bytes());
        code.extend_from_slice(&2i32.to_be_bytes());
        for (key, offset) in [(1i32, 26i32), (5, 26)] {
            code.extend_from_slice(&key.to_be_bytes());
            code.extend_from_slice(&offset.to_be_bytes());
        }
        code.push(0xb1);
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[2].mnemonic, OPCode::LookupSwitch);
        assert_eq!(instructions[2].op, Op::Unsupported);
        assert_eq!(instructions[3].pc, 28);
        assert_eq!(instructions[3].op, Op::Return);
    }

    #[test]
    fn goto_w_jumps_backward() {
        // 0: iconst_0, 1: pop, 2: goto_w 0, 7: return
        let mut code = vec![0x03, 0x57, 0xc8];
        code.extend_from_slice(&(-2i32).to_be_bytes());
        code.push(0xb1);
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions[2].mnemonic, OPCode::GotoW);
        assert_eq!(instructions[2].op, Op::Goto(0));
        assert_eq!(instructions[3].pc, 7);
    }

    #[test]
    fn wide_widens_local_index() {
        // wide iload 300, wide iinc 300 -1000
        let code = [0xc4, 0x15, 0x01, 0x2c, 0xc4, 0x84, 0x01, 0x2c, 0xfc, 0x18];
        let instructions = decode(&code).unwrap();
        assert_eq!(instructions[0].op, Op::ILoad(300));
        assert_eq!(instructions[0].mnemonic, OPCode::ILoad);
        assert_eq!(
            instructions[1].op,
            Op::IInc {
                index: 300,
                delta: -1000
            }
        );
        assert_eq!(instructions[1].pc, 4);
    }

    #[test]
    fn rejects_malformed_code() {
        assert!(matches!(
            decode(&[0xca]),
            Err(ClassFormatError::InvalidOpcode { opcode: 0xca, pc: 0 })
        ));
        assert!(matches!(
            decode(&[0x04, 0x10]),
            Err(ClassFormatError::TruncatedInstruction { pc: 1 })
        ));
        assert!(matches!(
            decode(&[0xa7, 0x00, 0x10]),
            Err(ClassFormatError::BranchOutOfRange { pc: 0, target: 16 })
        ));
    }

    #[test]
    fn conditions_compare_left_to_right() {
        assert!(Condition::Lt.holds(1.cmp(&2)));
        assert!(!Condition::Gt.holds(1.cmp(&2)));
        assert!(Condition::Ge.holds(2.cmp(&2)));
        assert!(Condition::Ne.holds((-3).cmp(&0)));
        assert!(Condition::Le.holds(0.cmp(&0)));
    }
}
