// https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html

mod access_flags;
pub mod annotation;
pub mod assembler;
pub mod attributes;
mod class_file;
pub mod code_builder;
#[macro_use]
pub mod constant_pool;
pub mod descriptor;
mod edit;
mod error;
pub mod instruction;
pub mod opcode;
mod parser;
pub mod pool_builder;
pub mod queries;
mod transform;
mod writer;

pub use self::class_file::{ClassFile, FieldInfo, MethodInfo};
pub use access_flags::AccessFlags;
pub use attributes::{Attribute, AttributeInfo, Attributes, CodeAttribute};
pub use code_builder::{CodeBuilder, Label};
pub use constant_pool::{ConstantPool, CpInfo};
pub use edit::{ClassBuilder, CodeFn, MemberKey};
pub use error::ClassFileError;
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use parser::Parser;
pub use pool_builder::ConstantPoolBuilder;
pub use writer::Writer;

pub type Result<T, E = ClassFileError> = std::result::Result<T, E>;

/// Highest major version the codec understands (Java 25).
pub const MAX_MAJOR_VERSION: u16 = 69;

pub const MAGIC: u32 = 0xCAFEBABE;
