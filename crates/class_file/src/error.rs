use thiserror::Error;

use crate::constant_pool;

#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Invalid magic identifier: 0x{0:X}")]
    InvalidMagic(u32),
    #[error("Unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("Input truncated at byte offset {offset}")]
    TruncatedInput { offset: usize },
    #[error("Unexpected trailing data at byte offset {offset}")]
    TrailingData { offset: usize },
    #[error("Malformed constant pool entry #{index}: {reason}")]
    MalformedPoolEntry { index: u16, reason: String },
    #[error("Expected {0}, found {1:?}")]
    UnexpectedConstantPoolEntry(&'static str, constant_pool::CpInfo),
    #[error("Malformed {name} attribute: {reason}")]
    MalformedAttribute { name: String, reason: String },
    #[error("Unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },
    #[error("Instruction at offset {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: u32, target: i64 },
    #[error("Branch at offset {offset} cannot reach its target (delta {delta})")]
    BranchOutOfRange { offset: u32, delta: i64 },
    #[error("Unbalanced stack at offset {offset}: {opcode} pops {needed} slots but only {available} are available")]
    UnbalancedStack {
        offset: u32,
        opcode: &'static str,
        needed: u16,
        available: u16,
    },
    #[error("Member not found: {name} {descriptor}")]
    MemberNotFound { name: String, descriptor: String },
    #[error("Duplicate member: {name} {descriptor}")]
    DuplicateMember { name: String, descriptor: String },
    #[error("Invalid descriptor: {0:?}")]
    InvalidDescriptor(String),
    #[error("Label {0} is used but never bound")]
    UnboundLabel(u32),
    #[error("Constant pool overflow: more than 65535 slots")]
    PoolOverflow,
    #[error("Utf8 constant is {0} bytes long, the limit is 65535")]
    Utf8TooLong(usize),
    #[error("Too many entries in {table}: {count}")]
    TooManyEntries { table: &'static str, count: usize },
}
