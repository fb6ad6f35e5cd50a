//! JVM runtime module responsible for creating a new runtime
//! environment and running programs.
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, trace};

use crate::bytecode::{ArithOp, Instruction, Op};
use crate::classpath::{binary_name, ClassLoader, ClassPath, ClassPathLoader, ClassProvider};
use crate::error::{ConstantPoolError, RuntimeError};
use crate::intrinsics::{self, Intrinsic};
use crate::jvm::{CPInfo, MemberRef};
use crate::program::{ClassDefinition, MethodDefinition};

type Result<T> = std::result::Result<T, RuntimeError>;

/// Values held by the operand stack and local variables.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    /// The `System.out` stream.
    PrintStream,
}

impl Value {
    /// Returns the int held by this value.
    pub fn as_int(self) -> Result<i32> {
        match self {
            Self::Int(value) => Ok(value),
            other => Err(RuntimeError::TypeMismatch {
                expected: "int",
                found: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "int {value}"),
            Self::PrintStream => f.write_str("java.io.PrintStream"),
        }
    }
}

/// Execution state of a single method invocation. We create a new frame
/// each time we start executing a method and destroy it once we leave it.
#[derive(Debug, Clone)]
pub struct Frame {
    class: Rc<ClassDefinition>,
    method: Rc<MethodDefinition>,
    // `None` marks a slot nothing was stored in yet.
    locals: Vec<Option<Value>>,
    stack: Vec<Value>,
    // Position of the next instruction in `method.instructions()`.
    cursor: usize,
}

impl Frame {
    /// Create a frame with `args` in the first local variable slots.
    pub fn new(
        class: Rc<ClassDefinition>,
        method: Rc<MethodDefinition>,
        args: Vec<Value>,
    ) -> Self {
        let size = (method.max_locals() as usize).max(args.len());
        let mut locals = vec![None; size];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        Self {
            stack: Vec::with_capacity(method.max_stack() as usize),
            class,
            method,
            locals,
            cursor: 0,
        }
    }

    pub fn class(&self) -> &ClassDefinition {
        &self.class
    }

    pub fn method(&self) -> &MethodDefinition {
        &self.method
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn locals(&self) -> &[Option<Value>] {
        &self.locals
    }

    /// Returns the instruction under the cursor and moves past it.
    pub fn next_instruction(&mut self) -> Option<Instruction> {
        let instruction = self.method.instructions().get(self.cursor).copied()?;
        self.cursor += 1;
        Some(instruction)
    }

    /// Move the cursor to the instruction starting at byte `offset`.
    pub fn set_pc_to_offset(&mut self, offset: usize) -> Result<()> {
        self.cursor = self
            .method
            .index_of(offset)
            .ok_or(RuntimeError::InvalidBranchTarget(offset))?;
        Ok(())
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_int(&mut self) -> Result<i32> {
        self.pop()?.as_int()
    }

    pub fn peek(&self) -> Result<Value> {
        self.stack.last().copied().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop `count` values, the deepest one ends up first.
    pub fn pop_arguments(&mut self, count: usize) -> Result<Vec<Value>> {
        if count > self.stack.len() {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Read the int in local variable `index`.
    pub fn load(&self, index: usize) -> Result<i32> {
        match self.locals.get(index) {
            Some(Some(value)) => value.as_int(),
            Some(None) => Err(RuntimeError::TypeMismatch {
                expected: "int",
                found: format!("uninitialized local {index}"),
            }),
            None => Err(RuntimeError::InvalidLocal(index)),
        }
    }

    pub fn store(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or(RuntimeError::InvalidLocal(index))?;
        *slot = Some(value);
        Ok(())
    }
}

/// Chain of active frames, the last one is executing.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn push(&mut self, frame: Frame) -> Result<()> {
        if self.frames.len() >= self.max_depth {
            return Err(RuntimeError::StackOverflow(self.max_depth));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Frame> {
        self.frames.pop().ok_or(RuntimeError::EmptyCallStack)
    }

    pub fn top(&self) -> Result<&Frame> {
        self.frames.last().ok_or(RuntimeError::EmptyCallStack)
    }

    pub fn top_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or(RuntimeError::EmptyCallStack)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Tunables for a `Runtime`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Maximum number of frames on the call stack.
    pub max_call_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
        }
    }
}

/// `Runtime` executes a program starting from the `main` method of its
/// main class.
///
/// Execution is a fetch, decode and execute loop over the top frame of
/// the call stack. The loop stops when the top frame runs out of
/// instructions or the last frame returns, and on the first error.
/// Program output goes to `out`.
pub struct Runtime<W: Write = io::Stdout> {
    classes: ClassProvider,
    main_class: String,
    frames: CallStack,
    out: W,
}

impl Runtime<io::Stdout> {
    /// Create a runtime loading classes from `class_path` and printing to
    /// stdout.
    pub fn new(class_path: ClassPath, main_class: &str) -> Self {
        Self::with_loader(ClassPathLoader::new(class_path), main_class, io::stdout())
    }
}

impl<W: Write> Runtime<W> {
    pub fn with_loader(loader: impl ClassLoader + 'static, main_class: &str, out: W) -> Self {
        Self {
            classes: ClassProvider::new(loader),
            main_class: main_class.to_string(),
            frames: CallStack::new(RuntimeOptions::default().max_call_depth),
            out,
        }
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.frames = CallStack::new(options.max_call_depth);
        self
    }

    /// Load the main class and run its `main` method to completion.
    pub fn start(&mut self) -> Result<()> {
        // Frames left behind by a failed run must not resume.
        self.frames.clear();
        let class = self.classes.load(&self.main_class)?;
        let main = match class.method("main") {
            Some(method) => Rc::clone(method),
            None => {
                return Err(RuntimeError::NoSuchMethod {
                    class: binary_name(class.name()),
                    name: "main".to_string(),
                    descriptor: String::new(),
                })
            }
        };
        debug!("starting {}.main", class.name());
        // The argument array is never materialized, slot 0 stays empty.
        self.frames.push(Frame::new(class, main, Vec::new()))?;
        let result = self.run();
        self.out.flush()?;
        result
    }

    /// Execute instructions until the program halts.
    pub fn run(&mut self) -> Result<()> {
        while let Some(instruction) = self.next() {
            self.eval(instruction)?;
        }
        Ok(())
    }

    /// Returns the next instruction to execute.
    fn next(&mut self) -> Option<Instruction> {
        let frame = self.frames.top_mut().ok()?;
        let instruction = frame.next_instruction()?;
        trace!(
            "{}.{} {}",
            frame.class.name(),
            frame.method.name(),
            instruction
        );
        Some(instruction)
    }

    /// Evaluate a given instruction.
    fn eval(&mut self, instruction: Instruction) -> Result<()> {
        let frame = self.frames.top_mut()?;
        match instruction.op {
            Op::Nop => (),
            Op::Push(value) => frame.push(Value::Int(value)),
            Op::Ldc(index) => {
                let value = match frame.class.constant_pool().get(index) {
                    Some(CPInfo::ConstantInteger { value }) => *value,
                    None | Some(CPInfo::Unusable) => {
                        return Err(ConstantPoolError {
                            index,
                            expected: "loadable constant",
                        }
                        .into())
                    }
                    Some(_) => return Err(RuntimeError::UnsupportedConstant(index)),
                };
                frame.push(Value::Int(value));
            }
            Op::ILoad(index) => {
                let value = frame.load(index as usize)?;
                frame.push(Value::Int(value));
            }
            Op::IStore(index) => {
                let value = frame.pop_int()?;
                frame.store(index as usize, Value::Int(value))?;
            }
            Op::IInc { index, delta } => {
                let value = frame.load(index as usize)?;
                frame.store(index as usize, Value::Int(value.wrapping_add(delta)))?;
            }
            Op::Arith(op) => {
                let right = frame.pop_int()?;
                let left = frame.pop_int()?;
                frame.push(Value::Int(arithmetic(op, left, right)?));
            }
            Op::INeg => {
                let value = frame.pop_int()?;
                frame.push(Value::Int(value.wrapping_neg()));
            }
            Op::Pop => {
                frame.pop()?;
            }
            Op::Dup => {
                let value = frame.peek()?;
                frame.push(value);
            }
            Op::If { cond, target } => {
                let value = frame.pop_int()?;
                if cond.holds(value.cmp(&0)) {
                    frame.set_pc_to_offset(target)?;
                }
            }
            Op::IfICmp { cond, target } => {
                let right = frame.pop_int()?;
                let left = frame.pop_int()?;
                if cond.holds(left.cmp(&right)) {
                    frame.set_pc_to_offset(target)?;
                }
            }
            Op::Goto(target) => frame.set_pc_to_offset(target)?,
            Op::GetStatic(index) => {
                let field = frame.class.constant_pool().field_ref(index)?;
                match intrinsics::static_field(&field) {
                    Some(value) => frame.push(value),
                    None => {
                        return Err(RuntimeError::UnsupportedField {
                            class: binary_name(&field.class_name),
                            name: field.name,
                        })
                    }
                }
            }
            Op::InvokeStatic(index) => self.invoke_static(index)?,
            Op::InvokeVirtual(index) => self.invoke_virtual(index)?,
            Op::IReturn => {
                let value = frame.pop()?;
                self.pop_frame()?;
                // The entry method's result has nowhere to go.
                if let Ok(caller) = self.frames.top_mut() {
                    caller.push(value);
                }
            }
            Op::Return => self.pop_frame()?,
            Op::Unsupported => {
                return Err(RuntimeError::UnsupportedOpcode {
                    opcode: instruction.mnemonic,
                    pc: instruction.pc,
                })
            }
        }
        Ok(())
    }

    fn invoke_static(&mut self, index: u16) -> Result<()> {
        let method_ref = self.frames.top()?.class.constant_pool().method_ref(index)?;
        let class = self.classes.load(&method_ref.class_name)?;
        let method = match class.find_method(&method_ref.name, &method_ref.descriptor) {
            Some(method) if method.has_code() => Rc::clone(method),
            Some(_) => return Err(unsupported_method(method_ref)),
            None => {
                return Err(RuntimeError::NoSuchMethod {
                    class: binary_name(&method_ref.class_name),
                    name: method_ref.name,
                    descriptor: method_ref.descriptor,
                })
            }
        };
        let args = self
            .frames
            .top_mut()?
            .pop_arguments(method.parameter_count())?;
        debug!("invoking {method_ref} with {args:?}");
        self.frames.push(Frame::new(class, method, args))
    }

    fn invoke_virtual(&mut self, index: u16) -> Result<()> {
        let frame = self.frames.top_mut()?;
        let method_ref = frame.class.constant_pool().method_ref(index)?;
        let intrinsic = match Intrinsic::resolve(&method_ref) {
            Some(intrinsic) => intrinsic,
            None => return Err(unsupported_method(method_ref)),
        };
        let arg = match intrinsic.arity() {
            0 => 0,
            _ => frame.pop_int()?,
        };
        let receiver = frame.pop()?;
        if receiver != Value::PrintStream {
            return Err(RuntimeError::TypeMismatch {
                expected: "java.io.PrintStream",
                found: receiver.to_string(),
            });
        }
        intrinsic.invoke(&mut self.out, arg)?;
        Ok(())
    }

    fn pop_frame(&mut self) -> Result<()> {
        let frame = self.frames.pop()?;
        debug!(
            "leaving {}.{}, depth {}",
            frame.class.name(),
            frame.method.name(),
            self.frames.depth()
        );
        Ok(())
    }

    /// Returns the program output written so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

fn unsupported_method(method_ref: MemberRef) -> RuntimeError {
    RuntimeError::UnsupportedMethod {
        class: binary_name(&method_ref.class_name),
        name: method_ref.name,
        descriptor: method_ref.descriptor,
    }
}

/// Integer arithmetic with JVM semantics: overflow wraps and division
/// truncates toward zero.
fn arithmetic(op: ArithOp, left: i32, right: i32) -> Result<i32> {
    let value = match op {
        ArithOp::Add => left.wrapping_add(right),
        ArithOp::Sub => left.wrapping_sub(right),
        ArithOp::Mul => left.wrapping_mul(right),
        ArithOp::Div | ArithOp::Rem if right == 0 => return Err(RuntimeError::DivisionByZero),
        ArithOp::Div => left.wrapping_div(right),
        ArithOp::Rem => left.wrapping_rem(right),
    };
    Ok(value)
}
