//! Lightweight implementation of a parser and decoder for JVM bytecode
//! class files.
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{ClassFormatError, ConstantPoolError};

const MAGIC: u32 = 0xCAFE_BABE;

/// Entries of the constant pool, see JVMS §4.4.
#[derive(Debug, Clone, PartialEq)]
pub enum CPInfo {
    /// Index 0 and the slot following a long or double.
    Unusable,
    ConstantUtf8 {
        bytes: String,
    },
    ConstantInteger {
        value: i32,
    },
    ConstantFloat {
        value: f32,
    },
    ConstantLong {
        value: i64,
    },
    ConstantDouble {
        value: f64,
    },
    ConstantClass {
        name_index: u16,
    },
    ConstantString {
        string_index: u16,
    },
    ConstantFieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    ConstantMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    ConstantInterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    ConstantNameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    ConstantMethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    ConstantMethodType {
        descriptor_index: u16,
    },
    ConstantDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    ConstantInvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    ConstantModule {
        name_index: u16,
    },
    ConstantPackage {
        name_index: u16,
    },
}

/// A symbolic reference to a field or method, resolved to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class_name, self.name, self.descriptor)
    }
}

/// The constant pool of a class, indexed from 1 like in the class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<CPInfo>,
}

impl ConstantPool {
    /// Build a pool from the entries starting at index 1. Longs and doubles
    /// must be followed by `CPInfo::Unusable`.
    pub fn new(entries: Vec<CPInfo>) -> Self {
        let mut pool = Vec::with_capacity(entries.len() + 1);
        pool.push(CPInfo::Unusable);
        pool.extend(entries);
        Self { entries: pool }
    }

    /// Returns the entry at `index`, if any.
    pub fn get(&self, index: u16) -> Option<&CPInfo> {
        self.entries.get(index as usize)
    }

    /// Number of slots, including the unused slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    fn error(index: u16, expected: &'static str) -> ConstantPoolError {
        ConstantPoolError { index, expected }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantUtf8 { bytes }) => Ok(bytes),
            _ => Err(Self::error(index, "Utf8")),
        }
    }

    /// Returns the internal (slash separated) name of a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str, ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantClass { name_index }) => self.utf8(*name_index),
            _ => Err(Self::error(index, "Class")),
        }
    }

    /// Returns the `(name, descriptor)` pair of a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantNameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(Self::error(index, "NameAndType")),
        }
    }

    /// Resolve a `Methodref` or `InterfaceMethodref` entry.
    pub fn method_ref(&self, index: u16) -> Result<MemberRef, ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantMethodRef {
                class_index,
                name_and_type_index,
            })
            | Some(CPInfo::ConstantInterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => self.member_ref(*class_index, *name_and_type_index),
            _ => Err(Self::error(index, "Methodref")),
        }
    }

    /// Resolve a `Fieldref` entry.
    pub fn field_ref(&self, index: u16) -> Result<MemberRef, ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantFieldRef {
                class_index,
                name_and_type_index,
            }) => self.member_ref(*class_index, *name_and_type_index),
            _ => Err(Self::error(index, "Fieldref")),
        }
    }

    pub fn integer(&self, index: u16) -> Result<i32, ConstantPoolError> {
        match self.get(index) {
            Some(CPInfo::ConstantInteger { value }) => Ok(*value),
            _ => Err(Self::error(index, "Integer")),
        }
    }

    fn member_ref(
        &self,
        class_index: u16,
        name_and_type_index: u16,
    ) -> Result<MemberRef, ConstantPoolError> {
        let class_name = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Attributes we decode, anything else is kept as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    CodeAttribute {
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        exception_table: Vec<ExceptionTableEntry>,
        attributes: HashMap<String, AttributeInfo>,
    },
    ConstantValueAttribute {
        constant_value_index: u16,
    },
    SourceFileAttribute {
        sourcefile_index: u16,
    },
    Other {
        info: Vec<u8>,
    },
}

/// `field_info` and `method_info` share the same layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: HashMap<String, AttributeInfo>,
}

pub type FieldInfo = MemberInfo;
pub type MethodInfo = MemberInfo;

impl MemberInfo {
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn name_index(&self) -> u16 {
        self.name_index
    }

    pub fn descriptor_index(&self) -> u16 {
        self.descriptor_index
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeInfo> {
        &self.attributes
    }
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq)]
pub struct JVMClassFile {
    minor_version: u16,
    major_version: u16,
    constant_pool: ConstantPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: HashMap<String, AttributeInfo>,
}

impl JVMClassFile {
    pub fn version(&self) -> (u16, u16) {
        (self.major_version, self.minor_version)
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Returns the internal name of this class, e.g. `java/lang/Object`.
    pub fn class_name(&self) -> Result<&str, ConstantPoolError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Returns the internal name of the super class, `None` for
    /// `java/lang/Object`.
    pub fn super_class_name(&self) -> Result<Option<&str>, ConstantPoolError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interfaces(&self) -> &[u16] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeInfo> {
        &self.attributes
    }
}

/// Read a class file from disk.
pub fn read_class_file(path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Class file parser, see JVMS §4.1 for the layout.
pub struct JVMParser;

type Reader<'a> = Cursor<&'a [u8]>;

impl JVMParser {
    /// Parse the raw bytes of a class file.
    pub fn parse(bytes: &[u8]) -> Result<JVMClassFile, ClassFormatError> {
        let mut reader = Cursor::new(bytes);
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = reader.read_u16::<BigEndian>()?;
        let major_version = reader.read_u16::<BigEndian>()?;
        let constant_pool = Self::parse_constant_pool(&mut reader)?;
        let access_flags = reader.read_u16::<BigEndian>()?;
        let this_class = reader.read_u16::<BigEndian>()?;
        let super_class = reader.read_u16::<BigEndian>()?;

        let interfaces_count = reader.read_u16::<BigEndian>()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u16::<BigEndian>()?);
        }
        let fields = Self::parse_members(&mut reader, &constant_pool)?;
        let methods = Self::parse_members(&mut reader, &constant_pool)?;
        let attributes = Self::parse_attributes(&mut reader, &constant_pool)?;

        Ok(JVMClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_constant_pool(reader: &mut Reader) -> Result<ConstantPool, ClassFormatError> {
        let count = reader.read_u16::<BigEndian>()? as usize;
        let mut entries = Vec::with_capacity(count);
        let mut index = 1usize;
        while index < count {
            let tag = reader.read_u8()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u16::<BigEndian>()?;
                    let mut bytes = vec![0u8; length as usize];
                    reader.read_exact(&mut bytes)?;
                    // Class files use modified UTF-8, the differences only
                    // matter for NUL and supplementary characters.
                    let bytes = match String::from_utf8(bytes) {
                        Ok(s) => s,
                        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    };
                    CPInfo::ConstantUtf8 { bytes }
                }
                3 => CPInfo::ConstantInteger {
                    value: reader.read_i32::<BigEndian>()?,
                },
                4 => CPInfo::ConstantFloat {
                    value: reader.read_f32::<BigEndian>()?,
                },
                5 => CPInfo::ConstantLong {
                    value: reader.read_i64::<BigEndian>()?,
                },
                6 => CPInfo::ConstantDouble {
                    value: reader.read_f64::<BigEndian>()?,
                },
                7 => CPInfo::ConstantClass {
                    name_index: reader.read_u16::<BigEndian>()?,
                },
                8 => CPInfo::ConstantString {
                    string_index: reader.read_u16::<BigEndian>()?,
                },
                9 => CPInfo::ConstantFieldRef {
                    class_index: reader.read_u16::<BigEndian>()?,
                    name_and_type_index: reader.read_u16::<BigEndian>()?,
                },
                10 => CPInfo::ConstantMethodRef {
                    class_index: reader.read_u16::<BigEndian>()?,
                    name_and_type_index: reader.read_u16::<BigEndian>()?,
                },
                11 => CPInfo::ConstantInterfaceMethodRef {
                    class_index: reader.read_u16::<BigEndian>()?,
                    name_and_type_index: reader.read_u16::<BigEndian>()?,
                },
                12 => CPInfo::ConstantNameAndType {
                    name_index: reader.read_u16::<BigEndian>()?,
                    descriptor_index: reader.read_u16::<BigEndian>()?,
                },
                15 => CPInfo::ConstantMethodHandle {
                    reference_kind: reader.read_u8()?,
                    reference_index: reader.read_u16::<BigEndian>()?,
                },
                16 => CPInfo::ConstantMethodType {
                    descriptor_index: reader.read_u16::<BigEndian>()?,
                },
                17 => CPInfo::ConstantDynamic {
                    bootstrap_method_attr_index: reader.read_u16::<BigEndian>()?,
                    name_and_type_index: reader.read_u16::<BigEndian>()?,
                },
                18 => CPInfo::ConstantInvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u16::<BigEndian>()?,
                    name_and_type_index: reader.read_u16::<BigEndian>()?,
                },
                19 => CPInfo::ConstantModule {
                    name_index: reader.read_u16::<BigEndian>()?,
                },
                20 => CPInfo::ConstantPackage {
                    name_index: reader.read_u16::<BigEndian>()?,
                },
                tag => {
                    return Err(ClassFormatError::UnknownConstantTag {
                        tag,
                        index: index as u16,
                    })
                }
            };
            // Longs and doubles take up two slots.
            let wide = matches!(
                entry,
                CPInfo::ConstantLong { .. } | CPInfo::ConstantDouble { .. }
            );
            if wide && index + 1 >= count {
                return Err(ClassFormatError::ConstantPoolOverflow {
                    index: index as u16,
                });
            }
            entries.push(entry);
            index += 1;
            if wide {
                entries.push(CPInfo::Unusable);
                index += 1;
            }
        }
        Ok(ConstantPool::new(entries))
    }

    fn parse_members(
        reader: &mut Reader,
        constant_pool: &ConstantPool,
    ) -> Result<Vec<MemberInfo>, ClassFormatError> {
        let count = reader.read_u16::<BigEndian>()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access_flags = reader.read_u16::<BigEndian>()?;
            let name_index = reader.read_u16::<BigEndian>()?;
            let descriptor_index = reader.read_u16::<BigEndian>()?;
            let attributes = Self::parse_attributes(reader, constant_pool)?;
            members.push(MemberInfo {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }
        Ok(members)
    }

    fn parse_attributes(
        reader: &mut Reader,
        constant_pool: &ConstantPool,
    ) -> Result<HashMap<String, AttributeInfo>, ClassFormatError> {
        let count = reader.read_u16::<BigEndian>()?;
        let mut attributes = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.read_u16::<BigEndian>()?;
            let name = constant_pool.utf8(name_index)?;
            let length = reader.read_u32::<BigEndian>()?;
            let mut info = vec![0u8; length as usize];
            reader.read_exact(&mut info)?;
            let attribute = Self::parse_attribute(name, info, constant_pool)?;
            attributes.insert(name.to_string(), attribute);
        }
        Ok(attributes)
    }

    fn parse_attribute(
        name: &str,
        info: Vec<u8>,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo, ClassFormatError> {
        let mut reader = Cursor::new(info.as_slice());
        let attribute = match name {
            "Code" => {
                let max_stack = reader.read_u16::<BigEndian>()?;
                let max_locals = reader.read_u16::<BigEndian>()?;
                let code_length = reader.read_u32::<BigEndian>()?;
                let mut code = vec![0u8; code_length as usize];
                reader.read_exact(&mut code)?;
                let exception_table_length = reader.read_u16::<BigEndian>()?;
                let mut exception_table =
                    Vec::with_capacity(exception_table_length as usize);
                for _ in 0..exception_table_length {
                    exception_table.push(ExceptionTableEntry {
                        start_pc: reader.read_u16::<BigEndian>()?,
                        end_pc: reader.read_u16::<BigEndian>()?,
                        handler_pc: reader.read_u16::<BigEndian>()?,
                        catch_type: reader.read_u16::<BigEndian>()?,
                    });
                }
                let attributes = Self::parse_attributes(&mut reader, constant_pool)?;
                AttributeInfo::CodeAttribute {
                    max_stack,
                    max_locals,
                    code,
                    exception_table,
                    attributes,
                }
            }
            "ConstantValue" => AttributeInfo::ConstantValueAttribute {
                constant_value_index: reader.read_u16::<BigEndian>()?,
            },
            "SourceFile" => AttributeInfo::SourceFileAttribute {
                sourcefile_index: reader.read_u16::<BigEndian>()?,
            },
            _ => AttributeInfo::Other { info },
        };
        Ok(attribute)
    }
}
