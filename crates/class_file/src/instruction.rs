use std::collections::HashSet;

use byteorder::{BigEndian, WriteBytesExt};

use crate::{parser::Parser, ClassFileError, ConstantPool, CpInfo, Opcode, Result};

/// A decoded instruction. Branch and switch targets are absolute offsets from
/// the start of the method's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// No operands.
    Op(Opcode),
    /// Loads, stores and `ret`. For the `_<n>` forms `slot` is the implicit slot.
    Local {
        opcode: Opcode,
        slot: u16,
        wide: bool,
    },
    Increment {
        slot: u16,
        delta: i16,
        wide: bool,
    },
    /// `bipush` and `sipush`.
    Push {
        opcode: Opcode,
        value: i16,
    },
    /// `ldc`, `ldc_w` and `ldc2_w`.
    Constant {
        opcode: Opcode,
        index: u16,
    },
    Field {
        opcode: Opcode,
        index: u16,
    },
    /// `invokevirtual`, `invokespecial` and `invokestatic`.
    Invoke {
        opcode: Opcode,
        index: u16,
    },
    InvokeInterface {
        index: u16,
        count: u8,
    },
    InvokeDynamic {
        index: u16,
    },
    /// `new`, `anewarray`, `checkcast` and `instanceof`.
    Type {
        opcode: Opcode,
        index: u16,
    },
    NewArray(ArrayType),
    MultiANewArray {
        index: u16,
        dimensions: u8,
    },
    Branch {
        opcode: Opcode,
        target: u32,
    },
    TableSwitch {
        default: u32,
        low: i32,
        high: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
}

/// Element type operand of `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayType {
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl ArrayType {
    pub fn from_u8(atype: u8) -> Option<ArrayType> {
        Some(match atype {
            4 => ArrayType::Boolean,
            5 => ArrayType::Char,
            6 => ArrayType::Float,
            7 => ArrayType::Double,
            8 => ArrayType::Byte,
            9 => ArrayType::Short,
            10 => ArrayType::Int,
            11 => ArrayType::Long,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ArrayType::Boolean => "boolean",
            ArrayType::Char => "char",
            ArrayType::Float => "float",
            ArrayType::Double => "double",
            ArrayType::Byte => "byte",
            ArrayType::Short => "short",
            ArrayType::Int => "int",
            ArrayType::Long => "long",
        }
    }
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Op(opcode)
            | Instruction::Local { opcode, .. }
            | Instruction::Push { opcode, .. }
            | Instruction::Constant { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Branch { opcode, .. } => *opcode,
            Instruction::Increment { .. } => Opcode::Iinc,
            Instruction::InvokeInterface { .. } => Opcode::Invokeinterface,
            Instruction::InvokeDynamic { .. } => Opcode::Invokedynamic,
            Instruction::NewArray(_) => Opcode::Newarray,
            Instruction::MultiANewArray { .. } => Opcode::Multianewarray,
            Instruction::TableSwitch { .. } => Opcode::Tableswitch,
            Instruction::LookupSwitch { .. } => Opcode::Lookupswitch,
        }
    }

    /// Every jump target, switch defaults included.
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Instruction::Branch { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns a copy with every target passed through `f`.
    pub fn map_targets(&self, mut f: impl FnMut(u32) -> Result<u32>) -> Result<Instruction> {
        Ok(match self {
            Instruction::Branch { opcode, target } => Instruction::Branch {
                opcode: *opcode,
                target: f(*target)?,
            },
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => Instruction::TableSwitch {
                default: f(*default)?,
                low: *low,
                high: *high,
                targets: targets.iter().map(|t| f(*t)).collect::<Result<Vec<_>>>()?,
            },
            Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                default: f(*default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, t)| Ok((*key, f(*t)?)))
                    .collect::<Result<Vec<_>>>()?,
            },
            other => other.clone(),
        })
    }

    /// The constant pool entry referenced by the instruction, if any.
    pub fn pool_index(&self) -> Option<u16> {
        match self {
            Instruction::Constant { index, .. }
            | Instruction::Field { index, .. }
            | Instruction::Invoke { index, .. }
            | Instruction::InvokeInterface { index, .. }
            | Instruction::InvokeDynamic { index }
            | Instruction::Type { index, .. }
            | Instruction::MultiANewArray { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Encoded size in bytes when the instruction starts at `offset`.
    pub fn encoded_len(&self, offset: u32) -> u32 {
        match self {
            Instruction::Op(_) => 1,
            Instruction::Local { opcode, wide, .. } => {
                if opcode.implicit_slot().is_some() {
                    1
                } else if *wide {
                    4
                } else {
                    2
                }
            }
            Instruction::Increment { wide, .. } => {
                if *wide {
                    6
                } else {
                    3
                }
            }
            Instruction::Push { opcode, .. } => {
                if *opcode == Opcode::Bipush {
                    2
                } else {
                    3
                }
            }
            Instruction::Constant { opcode, .. } => {
                if *opcode == Opcode::Ldc {
                    2
                } else {
                    3
                }
            }
            Instruction::Field { .. } | Instruction::Invoke { .. } | Instruction::Type { .. } => 3,
            Instruction::InvokeInterface { .. } | Instruction::InvokeDynamic { .. } => 5,
            Instruction::NewArray(_) => 2,
            Instruction::MultiANewArray { .. } => 4,
            Instruction::Branch { opcode, .. } => {
                if opcode.is_wide_branch() {
                    5
                } else {
                    3
                }
            }
            Instruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Instruction::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
        }
    }

    /// Appends the instruction, assumed to start at `offset`, to `out`.
    pub fn encode(&self, offset: u32, out: &mut Vec<u8>) -> Result<()> {
        let opcode = self.opcode();
        if let Instruction::Local { wide: true, .. } | Instruction::Increment { wide: true, .. } =
            self
        {
            out.write_u8(Opcode::Wide.code())?;
        }
        out.write_u8(opcode.code())?;

        match self {
            Instruction::Op(_) => {}
            Instruction::Local { opcode, slot, wide } => {
                if opcode.implicit_slot().is_none() {
                    if *wide {
                        out.write_u16::<BigEndian>(*slot)?;
                    } else {
                        out.write_u8(narrow(*slot, offset)?)?;
                    }
                }
            }
            Instruction::Increment { slot, delta, wide } => {
                if *wide {
                    out.write_u16::<BigEndian>(*slot)?;
                    out.write_i16::<BigEndian>(*delta)?;
                } else {
                    out.write_u8(narrow(*slot, offset)?)?;
                    let delta = i8::try_from(*delta)
                        .map_err(|_| malformed_code(offset, "iinc delta does not fit in a byte"))?;
                    out.write_i8(delta)?;
                }
            }
            Instruction::Push { opcode, value } => {
                if *opcode == Opcode::Bipush {
                    let value = i8::try_from(*value)
                        .map_err(|_| malformed_code(offset, "bipush value does not fit in a byte"))?;
                    out.write_i8(value)?;
                } else {
                    out.write_i16::<BigEndian>(*value)?;
                }
            }
            Instruction::Constant { opcode, index } => {
                if *opcode == Opcode::Ldc {
                    out.write_u8(narrow(*index, offset)?)?;
                } else {
                    out.write_u16::<BigEndian>(*index)?;
                }
            }
            Instruction::Field { index, .. }
            | Instruction::Invoke { index, .. }
            | Instruction::Type { index, .. } => out.write_u16::<BigEndian>(*index)?,
            Instruction::InvokeInterface { index, count } => {
                out.write_u16::<BigEndian>(*index)?;
                out.write_u8(*count)?;
                out.write_u8(0)?;
            }
            Instruction::InvokeDynamic { index } => {
                out.write_u16::<BigEndian>(*index)?;
                out.write_u16::<BigEndian>(0)?;
            }
            Instruction::NewArray(atype) => out.write_u8(atype.code())?,
            Instruction::MultiANewArray { index, dimensions } => {
                out.write_u16::<BigEndian>(*index)?;
                out.write_u8(*dimensions)?;
            }
            Instruction::Branch { opcode, target } => {
                let delta = *target as i64 - offset as i64;
                if opcode.is_wide_branch() {
                    out.write_i32::<BigEndian>(delta as i32)?;
                } else {
                    let delta = i16::try_from(delta)
                        .map_err(|_| ClassFileError::BranchOutOfRange { offset, delta })?;
                    out.write_i16::<BigEndian>(delta)?;
                }
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                (0..switch_padding(offset)).try_for_each(|_| out.write_u8(0))?;
                out.write_i32::<BigEndian>(relative(*default, offset))?;
                out.write_i32::<BigEndian>(*low)?;
                out.write_i32::<BigEndian>(*high)?;
                for target in targets {
                    out.write_i32::<BigEndian>(relative(*target, offset))?;
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                (0..switch_padding(offset)).try_for_each(|_| out.write_u8(0))?;
                out.write_i32::<BigEndian>(relative(*default, offset))?;
                out.write_i32::<BigEndian>(pairs.len() as i32)?;
                for (key, target) in pairs {
                    out.write_i32::<BigEndian>(*key)?;
                    out.write_i32::<BigEndian>(relative(*target, offset))?;
                }
            }
        }
        Ok(())
    }
}

/// Padding bytes after a switch opcode at `offset`, aligning its operands to
/// a multiple of four.
fn switch_padding(offset: u32) -> u32 {
    3 - offset % 4
}

fn relative(target: u32, offset: u32) -> i32 {
    (target as i64 - offset as i64) as i32
}

fn narrow(value: u16, offset: u32) -> Result<u8> {
    u8::try_from(value).map_err(|_| malformed_code(offset, "operand needs the wide form"))
}

fn malformed_code(offset: u32, reason: &str) -> ClassFileError {
    ClassFileError::MalformedAttribute {
        name: "Code".into(),
        reason: format!("{} at offset {}", reason, offset),
    }
}

/// Start offset of every instruction, followed by the offset just past the
/// last one.
pub fn offsets(instructions: &[Instruction]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0;
    offsets.push(offset);
    for instruction in instructions {
        offset += instruction.encoded_len(offset);
        offsets.push(offset);
    }
    offsets
}

/// Decodes a method body. Operands that reference the constant pool are
/// checked against the kind of entry the opcode expects, and every jump must
/// land on an instruction boundary.
pub fn decode(code: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    let mut starts = Vec::new();
    while parser.remaining() > 0 {
        let offset = parser.offset() as u32;
        starts.push(offset);
        instructions.push(decode_instruction(&mut parser, offset, pool)?);
    }

    let boundaries = starts.iter().copied().collect::<HashSet<_>>();
    for (instruction, offset) in instructions.iter().zip(&starts) {
        if let Some(target) = instruction
            .targets()
            .into_iter()
            .find(|target| !boundaries.contains(target))
        {
            return Err(ClassFileError::InvalidBranchTarget {
                offset: *offset,
                target: target as i64,
            });
        }
    }

    Ok(instructions)
}

fn decode_instruction(
    parser: &mut Parser<'_>,
    offset: u32,
    pool: &ConstantPool,
) -> Result<Instruction> {
    let byte = parser.read_u8()?;
    let opcode = Opcode::from_u8(byte).ok_or(ClassFileError::UnknownOpcode {
        opcode: byte,
        offset,
    })?;

    Ok(match opcode {
        Opcode::Bipush => Instruction::Push {
            opcode,
            value: parser.read_i8()? as i16,
        },
        Opcode::Sipush => Instruction::Push {
            opcode,
            value: parser.read_i16()?,
        },
        Opcode::Ldc | Opcode::LdcW => {
            let index = if opcode == Opcode::Ldc {
                parser.read_u8()? as u16
            } else {
                parser.read_u16()?
            };
            Instruction::Constant {
                opcode,
                index: expect_entry(pool, index, opcode, CpInfo::is_loadable)?,
            }
        }
        Opcode::Ldc2W => Instruction::Constant {
            opcode,
            index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::Long(_) | CpInfo::Double(_) | CpInfo::Dynamic(_))
            })?,
        },
        _ if opcode.implicit_slot().is_some() => Instruction::Local {
            opcode,
            slot: opcode.implicit_slot().unwrap_or_default(),
            wide: false,
        },
        _ if opcode.local_slots().is_some() => Instruction::Local {
            opcode,
            slot: parser.read_u8()? as u16,
            wide: false,
        },
        Opcode::Iinc => Instruction::Increment {
            slot: parser.read_u8()? as u16,
            delta: parser.read_i8()? as i16,
            wide: false,
        },
        Opcode::Wide => decode_wide(parser, offset)?,
        Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
            Instruction::Field {
                opcode,
                index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                    matches!(c, CpInfo::FieldRef(_))
                })?,
            }
        }
        Opcode::Invokevirtual => Instruction::Invoke {
            opcode,
            index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::MethodRef(_))
            })?,
        },
        Opcode::Invokespecial | Opcode::Invokestatic => Instruction::Invoke {
            opcode,
            index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::MethodRef(_) | CpInfo::InterfaceMethodRef(_))
            })?,
        },
        Opcode::Invokeinterface => {
            let index = expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::InterfaceMethodRef(_))
            })?;
            let count = parser.read_u8()?;
            parser.read_u8()?;
            Instruction::InvokeInterface { index, count }
        }
        Opcode::Invokedynamic => {
            let index = expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::InvokeDynamic(_))
            })?;
            parser.read_u16()?;
            Instruction::InvokeDynamic { index }
        }
        Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof => {
            Instruction::Type {
                opcode,
                index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                    matches!(c, CpInfo::Class(_))
                })?,
            }
        }
        Opcode::Multianewarray => Instruction::MultiANewArray {
            index: expect_entry(pool, parser.read_u16()?, opcode, |c| {
                matches!(c, CpInfo::Class(_))
            })?,
            dimensions: parser.read_u8()?,
        },
        Opcode::Newarray => {
            let atype = parser.read_u8()?;
            Instruction::NewArray(
                ArrayType::from_u8(atype)
                    .ok_or_else(|| malformed_code(offset, &format!("unknown array type {}", atype)))?,
            )
        }
        _ if opcode.is_branch() => {
            let delta = if opcode.is_wide_branch() {
                parser.read_i32()?
            } else {
                parser.read_i16()? as i32
            };
            Instruction::Branch {
                opcode,
                target: absolute(offset, delta)?,
            }
        }
        Opcode::Tableswitch => {
            parser.take(switch_padding(offset) as usize)?;
            let default = absolute(offset, parser.read_i32()?)?;
            let low = parser.read_i32()?;
            let high = parser.read_i32()?;
            if high < low {
                return Err(malformed_code(offset, "tableswitch high is below low"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            parser.ensure_remaining(count.saturating_mul(4))?;
            let targets = (0..count)
                .map(|_| absolute(offset, parser.read_i32()?))
                .collect::<Result<Vec<_>>>()?;
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        Opcode::Lookupswitch => {
            parser.take(switch_padding(offset) as usize)?;
            let default = absolute(offset, parser.read_i32()?)?;
            let npairs = parser.read_i32()?;
            if npairs < 0 {
                return Err(malformed_code(offset, "negative lookupswitch pair count"));
            }
            parser.ensure_remaining(npairs as usize * 8)?;
            let pairs = (0..npairs)
                .map(|_| {
                    let key = parser.read_i32()?;
                    Ok((key, absolute(offset, parser.read_i32()?)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Instruction::LookupSwitch { default, pairs }
        }
        _ => Instruction::Op(opcode),
    })
}

fn decode_wide(parser: &mut Parser<'_>, offset: u32) -> Result<Instruction> {
    let byte = parser.read_u8()?;
    let opcode = Opcode::from_u8(byte).ok_or(ClassFileError::UnknownOpcode {
        opcode: byte,
        offset: offset + 1,
    })?;

    match opcode {
        Opcode::Iinc => Ok(Instruction::Increment {
            slot: parser.read_u16()?,
            delta: parser.read_i16()?,
            wide: true,
        }),
        _ if opcode.local_slots().is_some() && opcode.implicit_slot().is_none() => {
            Ok(Instruction::Local {
                opcode,
                slot: parser.read_u16()?,
                wide: true,
            })
        }
        _ => Err(malformed_code(
            offset,
            &format!("wide cannot modify {}", opcode),
        )),
    }
}

fn absolute(offset: u32, delta: i32) -> Result<u32> {
    let target = offset as i64 + delta as i64;
    u32::try_from(target).map_err(|_| ClassFileError::InvalidBranchTarget { offset, target })
}

fn expect_entry(
    pool: &ConstantPool,
    index: u16,
    opcode: Opcode,
    is_expected: impl Fn(&CpInfo) -> bool,
) -> Result<u16> {
    let entry = pool.get(index)?;
    if !is_expected(entry) {
        return Err(ClassFileError::MalformedPoolEntry {
            index,
            reason: format!("{} cannot use a {} entry", opcode, entry.kind_name()),
        });
    }
    Ok(index)
}
