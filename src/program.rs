//! Loaded classes and methods as seen by the interpreter.
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;

use crate::bytecode::{self, Instruction};
use crate::error::ClassFormatError;
use crate::jvm::{AttributeInfo, ConstantPool, JVMClassFile, MethodInfo};

pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// Primitive types supported by the JVM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BaseTypeKind {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

/// JVM value type as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Base(BaseTypeKind),
    /// Internal name of the referenced class.
    Reference(String),
    Array(Box<Type>),
    Void,
}

impl Type {
    /// Decode the field type at the start of `s` and return the rest.
    fn decode(s: &str) -> Option<(Type, &str)> {
        let base = |kind| Some((Type::Base(kind), &s[1..]));
        match s.as_bytes().first()? {
            b'B' => base(BaseTypeKind::Byte),
            b'C' => base(BaseTypeKind::Char),
            b'D' => base(BaseTypeKind::Double),
            b'F' => base(BaseTypeKind::Float),
            b'I' => base(BaseTypeKind::Int),
            b'J' => base(BaseTypeKind::Long),
            b'S' => base(BaseTypeKind::Short),
            b'Z' => base(BaseTypeKind::Boolean),
            b'L' => {
                let end = s.find(';')?;
                if end == 1 {
                    return None;
                }
                Some((Type::Reference(s[1..end].to_string()), &s[end + 1..]))
            }
            b'[' => {
                let (component, rest) = Self::decode(&s[1..])?;
                Some((Type::Array(Box::new(component)), rest))
            }
            _ => None,
        }
    }
}

fn descriptor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // A literal pattern, it only fails to compile if it was mistyped.
    PATTERN.get_or_init(|| {
        Regex::new(r"^\(([^)]*)\)(.+)$").expect("invalid descriptor pattern")
    })
}

/// Parsed method descriptor, e.g. `(II)I`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub arg_types: Vec<Type>,
    pub return_type: Type,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, ClassFormatError> {
        let malformed = || ClassFormatError::MalformedDescriptor(descriptor.to_string());
        let caps = descriptor_pattern()
            .captures(descriptor)
            .ok_or_else(malformed)?;
        let mut args = caps.get(1).map_or("", |m| m.as_str());
        let ret = caps.get(2).map_or("", |m| m.as_str());

        let mut arg_types = Vec::new();
        while !args.is_empty() {
            let (t, rest) = Type::decode(args).ok_or_else(malformed)?;
            arg_types.push(t);
            args = rest;
        }
        let return_type = if ret == "V" {
            Type::Void
        } else {
            match Type::decode(ret) {
                Some((t, "")) => t,
                _ => return Err(malformed()),
            }
        };
        Ok(Self {
            arg_types,
            return_type,
        })
    }
}

/// Java class method representation for the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    name: String,
    descriptor: String,
    access_flags: u16,
    signature: MethodDescriptor,
    max_stack: u16,
    max_locals: u16,
    // `None` for native and abstract methods.
    code: Option<Vec<Instruction>>,
    // Byte offset to position in `code`, branch targets are byte offsets.
    offsets: HashMap<usize, usize>,
}

impl MethodDefinition {
    /// Build a method from its raw code array.
    pub fn new(
        name: &str,
        descriptor: &str,
        access_flags: u16,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) -> Result<Self, ClassFormatError> {
        let instructions = bytecode::decode(code)?;
        let offsets = instructions
            .iter()
            .enumerate()
            .map(|(index, inst)| (inst.pc, index))
            .collect();
        Ok(Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            signature: MethodDescriptor::parse(descriptor)?,
            max_stack,
            max_locals,
            code: Some(instructions),
            offsets,
        })
    }

    /// Build a method that has no `Code` attribute.
    pub fn without_code(
        name: &str,
        descriptor: &str,
        access_flags: u16,
    ) -> Result<Self, ClassFormatError> {
        Ok(Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            signature: MethodDescriptor::parse(descriptor)?,
            max_stack: 0,
            max_locals: 0,
            code: None,
            offsets: HashMap::new(),
        })
    }

    fn from_method_info(
        method_info: &MethodInfo,
        constants: &ConstantPool,
    ) -> Result<Self, ClassFormatError> {
        let name = constants.utf8(method_info.name_index())?;
        let descriptor = constants.utf8(method_info.descriptor_index())?;
        let access_flags = method_info.access_flags();
        match method_info.attributes().get("Code") {
            Some(AttributeInfo::CodeAttribute {
                max_stack,
                max_locals,
                code,
                ..
            }) => Self::new(name, descriptor, access_flags, *max_stack, *max_locals, code),
            _ => Self::without_code(name, descriptor, access_flags),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn arg_types(&self) -> &[Type] {
        &self.signature.arg_types
    }

    pub fn return_type(&self) -> &Type {
        &self.signature.return_type
    }

    /// Number of arguments taken off the caller's operand stack. This comes
    /// from the descriptor, `max_locals` also counts the method's own
    /// local variables.
    pub fn parameter_count(&self) -> usize {
        self.signature.arg_types.len()
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.code.as_deref().unwrap_or(&[])
    }

    /// Returns the position of the instruction starting at `offset`.
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        self.offsets.get(&offset).copied()
    }
}

/// A loaded class, immutable once built and shared by every frame running
/// one of its methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    name: String,
    super_name: Option<String>,
    constant_pool: ConstantPool,
    methods: Vec<Rc<MethodDefinition>>,
}

impl ClassDefinition {
    pub fn new(name: &str, constant_pool: ConstantPool, methods: Vec<MethodDefinition>) -> Self {
        Self {
            name: name.to_string(),
            super_name: None,
            constant_pool,
            methods: methods.into_iter().map(Rc::new).collect(),
        }
    }

    /// Build a class definition from a parsed class file.
    pub fn from_class_file(class_file: &JVMClassFile) -> Result<Self, ClassFormatError> {
        let constants = class_file.constant_pool();
        let methods = class_file
            .methods()
            .iter()
            .map(|m| MethodDefinition::from_method_info(m, constants).map(Rc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: class_file.class_name()?.to_string(),
            super_name: class_file.super_class_name()?.map(str::to_string),
            constant_pool: constants.clone(),
            methods,
        })
    }

    /// Internal name, e.g. `samples/SimpleClass`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn methods(&self) -> &[Rc<MethodDefinition>] {
        &self.methods
    }

    /// Returns the first method called `name`.
    pub fn method(&self, name: &str) -> Option<&Rc<MethodDefinition>> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Returns the method matching both name and descriptor.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Rc<MethodDefinition>> {
        self.methods
            .iter()
            .find(|m| m.name() == name && m.descriptor() == descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bytecode::{Condition, Op};
    use crate::jvm::{read_class_file, JVMParser};
    use std::env;
    use std::path::Path;

    fn load(name: &str) -> ClassDefinition {
        let env_var = env::var("CARGO_MANIFEST_DIR").unwrap();
        let path = Path::new(&env_var)
            .join("support/samples")
            .join(format!("{name}.class"));
        let class_file_bytes = read_class_file(&path).unwrap();
        let class_file = JVMParser::parse(&class_file_bytes).unwrap();
        ClassDefinition::from_class_file(&class_file).unwrap()
    }

    #[test]
    fn can_build_program() {
        let class = load("RecursiveClass");
        assert_eq!(class.name(), "samples/RecursiveClass");
        assert_eq!(class.super_name(), Some("java/lang/Object"));
        let names: Vec<&str> = class.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["<init>", "main", "factorial"]);

        let main = class.method("main").unwrap();
        assert!(main.is_static());
        assert_eq!(main.parameter_count(), 1);
        assert_eq!(main.return_type(), &Type::Void);

        let factorial = class.find_method("factorial", "(I)I").unwrap();
        assert!(factorial.is_static());
        assert_eq!(factorial.parameter_count(), 1);
        assert_eq!(factorial.return_type(), &Type::Base(BaseTypeKind::Int));
        assert_eq!(factorial.max_locals(), 1);
        assert_eq!(factorial.instructions().len(), 13);
        assert_eq!(
            factorial.instructions()[3].op,
            Op::If {
                cond: Condition::Ne,
                target: 8
            }
        );
        assert_eq!(factorial.index_of(8), Some(6));
        assert_eq!(factorial.index_of(4), None);
        assert!(class.find_method("factorial", "(J)I").is_none());
    }

    #[test]
    fn parameter_count_ignores_extra_locals() {
        // static int f(int n) { int a = n; int b = a; return b; }
        let code = [0x1a, 0x3c, 0x1b, 0x3d, 0x1c, 0xac];
        let method = MethodDefinition::new("f", "(I)I", ACC_STATIC, 1, 3, &code).unwrap();
        assert_eq!(method.max_locals(), 3);
        assert_eq!(method.parameter_count(), 1);
    }

    #[test]
    fn parses_method_descriptors() {
        let main = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(
            main.arg_types,
            vec![Type::Array(Box::new(Type::Reference(
                "java/lang/String".to_string()
            )))]
        );
        assert_eq!(main.return_type, Type::Void);

        let mixed = MethodDescriptor::parse("(IJLjava/lang/Object;[[ZC)Ljava/lang/String;")
            .unwrap();
        assert_eq!(mixed.arg_types.len(), 5);
        assert_eq!(mixed.arg_types[1], Type::Base(BaseTypeKind::Long));
        assert_eq!(
            mixed.arg_types[3],
            Type::Array(Box::new(Type::Array(Box::new(Type::Base(
                BaseTypeKind::Boolean
            )))))
        );
        assert_eq!(
            mixed.return_type,
            Type::Reference("java/lang/String".to_string())
        );

        assert!(MethodDescriptor::parse("()I").unwrap().arg_types.is_empty());
    }

    #[test]
    fn descriptor_pattern_splits_arguments_and_return() {
        let caps = descriptor_pattern().captures("(I[JLa/B;)V").unwrap();
        assert_eq!(&caps[1], "I[JLa/B;");
        assert_eq!(&caps[2], "V");
        assert!(descriptor_pattern().captures("II)I").is_none());
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in ["(I", "I)V", "(Q)V", "(L;)V", "(Ljava/lang/Object)V", "()", "()II", "(V)V"] {
            assert!(
                matches!(
                    MethodDescriptor::parse(descriptor),
                    Err(ClassFormatError::MalformedDescriptor(_))
                ),
                "{descriptor} should be rejected"
            );
        }
    }

    #[test]
    fn methods_without_code_are_empty() {
        let method =
            MethodDefinition::without_code("hashCode", "()I", ACC_NATIVE).unwrap();
        assert!(!method.has_code());
        assert!(method.instructions().is_empty());
        assert_eq!(method.index_of(0), None);
    }
}
