use std::collections::HashMap;

use crate::{
    descriptor::{parse_field_descriptor, MethodDescriptor},
    instruction::{self, Instruction},
    ClassFileError, ConstantPool, CpInfo, Opcode, Result,
};

/// Output of [`assemble`].
#[derive(Debug)]
pub struct Assembled {
    pub code: Vec<u8>,
    /// Start offset of every instruction, followed by the code length.
    pub offsets: Vec<u32>,
    /// The input with every target rewritten to its new absolute offset.
    pub instructions: Vec<Instruction>,
}

/// Lays `instructions` out from offset 0 and encodes them.
///
/// Targets in the input are keys that `resolve` turns into the index of the
/// instruction they designate: decoded offsets for copied code, label ids for
/// code emitted through a `CodeBuilder`.
pub fn assemble(
    instructions: &[Instruction],
    resolve: impl Fn(u32) -> Result<usize>,
) -> Result<Assembled> {
    let offsets = instruction::offsets(instructions);
    let code_length = offsets.last().copied().unwrap_or_default() as usize;
    if code_length > u16::MAX as usize {
        return Err(ClassFileError::TooManyEntries {
            table: "code",
            count: code_length,
        });
    }

    let resolved = instructions
        .iter()
        .zip(&offsets)
        .map(|(instruction, offset)| {
            instruction.map_targets(|key| {
                let index = resolve(key)?;
                if index >= instructions.len() {
                    return Err(ClassFileError::InvalidBranchTarget {
                        offset: *offset,
                        target: key as i64,
                    });
                }
                Ok(offsets[index])
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut code = Vec::with_capacity(code_length);
    for (instruction, offset) in resolved.iter().zip(&offsets) {
        instruction.encode(*offset, &mut code)?;
    }

    Ok(Assembled {
        code,
        offsets,
        instructions: resolved,
    })
}

/// Maps the offset of every instruction, and the end of the code, to its index.
pub fn index_by_offset(instructions: &[Instruction]) -> HashMap<u32, usize> {
    instruction::offsets(instructions)
        .into_iter()
        .enumerate()
        .map(|(index, offset)| (offset, index))
        .collect()
}

/// Re-encodes decoded instructions whose targets are their own offsets.
pub fn reassemble(instructions: &[Instruction]) -> Result<Assembled> {
    let index = index_by_offset(instructions);
    assemble(instructions, |target| {
        index
            .get(&target)
            .copied()
            .ok_or(ClassFileError::InvalidBranchTarget {
                offset: 0,
                target: target as i64,
            })
    })
}

/// Computes `(max_stack, max_locals)` for assembled code by following every
/// path from the entry point and from each exception handler, which starts
/// with the caught exception on the stack.
///
/// This is a bookkeeping pass, not a verifier: an instruction reached with
/// several depths keeps the first one seen.
pub fn compute_maxs(
    instructions: &[Instruction],
    offsets: &[u32],
    handlers: &[u32],
    pool: &ConstantPool,
    initial_locals: u16,
) -> Result<(u16, u16)> {
    let index = offsets
        .iter()
        .enumerate()
        .map(|(index, offset)| (*offset, index))
        .collect::<HashMap<_, _>>();
    let index_of = |from: u32, target: u32| {
        index
            .get(&target)
            .copied()
            .filter(|i| *i < instructions.len())
            .ok_or(ClassFileError::InvalidBranchTarget {
                offset: from,
                target: target as i64,
            })
    };

    let mut depths: Vec<Option<u16>> = vec![None; instructions.len()];
    let mut worklist = Vec::new();
    if !instructions.is_empty() {
        worklist.push((0, 0));
    }
    for handler in handlers {
        worklist.push((index_of(*handler, *handler)?, 1));
    }

    let mut max_stack = 0;
    while let Some((i, depth)) = worklist.pop() {
        if depths[i].is_some() {
            continue;
        }
        depths[i] = Some(depth);

        let instruction = &instructions[i];
        let opcode = instruction.opcode();
        let (pop, push) = stack_effect(instruction, pool)?;
        if pop > depth {
            return Err(ClassFileError::UnbalancedStack {
                offset: offsets[i],
                opcode: opcode.mnemonic(),
                needed: pop,
                available: depth,
            });
        }
        let after = (depth - pop)
            .checked_add(push)
            .ok_or(ClassFileError::TooManyEntries {
                table: "operand stack",
                count: (depth - pop) as usize + push as usize,
            })?;
        max_stack = max_stack.max(depth).max(after);

        for target in instruction.targets() {
            worklist.push((index_of(offsets[i], target)?, after));
        }
        // A subroutine's return address is gone by the time `ret` comes back.
        let fallthrough = match opcode {
            Opcode::Jsr | Opcode::JsrW => depth,
            _ => after,
        };
        if !opcode.ends_block() && i + 1 < instructions.len() {
            worklist.push((i + 1, fallthrough));
        }
    }

    let mut max_locals = initial_locals;
    for instruction in instructions {
        let end = match instruction {
            Instruction::Local { opcode, slot, .. } => {
                slot.checked_add(opcode.local_slots().unwrap_or(1))
            }
            Instruction::Increment { slot, .. } => slot.checked_add(1),
            _ => continue,
        };
        let end = end.ok_or(ClassFileError::TooManyEntries {
            table: "local variables",
            count: 1 << 16,
        })?;
        max_locals = max_locals.max(end);
    }

    Ok((max_stack, max_locals))
}

/// Slots popped and pushed by `instruction`.
fn stack_effect(instruction: &Instruction, pool: &ConstantPool) -> Result<(u16, u16)> {
    Ok(match instruction {
        Instruction::Field { opcode, index } => {
            let member = pool.member_ref(*index)?;
            let slots = parse_field_descriptor(member.descriptor)?.slots();
            match opcode {
                Opcode::Getstatic => (0, slots),
                Opcode::Putstatic => (slots, 0),
                Opcode::Getfield => (1, slots),
                _ => (1 + slots, 0),
            }
        }
        Instruction::Invoke { opcode, index } => {
            let method = MethodDescriptor::parse(pool.member_ref(*index)?.descriptor)?;
            let receiver = u16::from(*opcode != Opcode::Invokestatic);
            (method.parameter_slots() + receiver, method.return_slots())
        }
        Instruction::InvokeInterface { index, .. } => {
            let method = MethodDescriptor::parse(pool.member_ref(*index)?.descriptor)?;
            (method.parameter_slots() + 1, method.return_slots())
        }
        Instruction::InvokeDynamic { index } => {
            let name_and_type_index = match pool.get(*index)? {
                CpInfo::InvokeDynamic(d) => d.name_and_type_index,
                c => {
                    return Err(ClassFileError::UnexpectedConstantPoolEntry(
                        "InvokeDynamic",
                        c.clone(),
                    ))
                }
            };
            let (_, descriptor) = pool.name_and_type(name_and_type_index)?;
            let method = MethodDescriptor::parse(descriptor)?;
            (method.parameter_slots(), method.return_slots())
        }
        Instruction::MultiANewArray { dimensions, .. } => (*dimensions as u16, 1),
        other => other.opcode().stack_effect().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstantPoolBuilder;

    fn local(opcode: Opcode, slot: u16) -> Instruction {
        Instruction::Local {
            opcode,
            slot,
            wide: false,
        }
    }

    #[test]
    fn test_straight_line_max_stack() {
        let instructions = vec![
            Instruction::Op(Opcode::Iconst1),
            Instruction::Op(Opcode::Iconst2),
            Instruction::Op(Opcode::Iconst3),
            Instruction::Op(Opcode::Iadd),
            Instruction::Op(Opcode::Iadd),
            local(Opcode::Istore1, 1),
            Instruction::Op(Opcode::Return),
        ];
        let assembled = reassemble(&instructions).unwrap();
        let (max_stack, max_locals) = compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &[],
            &ConstantPool::default(),
            1,
        )
        .unwrap();

        assert_eq!(3, max_stack);
        assert_eq!(2, max_locals);
        assert_eq!(vec![0x04, 0x05, 0x06, 0x60, 0x60, 0x3c, 0xb1], assembled.code);
    }

    #[test]
    fn test_long_values_take_two_slots() {
        let instructions = vec![
            Instruction::Op(Opcode::Lconst1),
            Instruction::Op(Opcode::Dconst0),
            Instruction::Op(Opcode::Pop2),
            local(Opcode::Lstore, 4),
            Instruction::Op(Opcode::Return),
        ];
        let assembled = reassemble(&instructions).unwrap();
        let maxs = compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &[],
            &ConstantPool::default(),
            0,
        )
        .unwrap();
        assert_eq!((4, 6), maxs);
    }

    #[test]
    fn test_invoke_effect_comes_from_descriptor() {
        let mut pool = ConstantPoolBuilder::new();
        let println = pool
            .method_ref("java/io/PrintStream", "println", "(J)V")
            .unwrap();
        let out = pool
            .field_ref("java/lang/System", "out", "Ljava/io/PrintStream;")
            .unwrap();
        let instructions = vec![
            Instruction::Field {
                opcode: Opcode::Getstatic,
                index: out,
            },
            Instruction::Op(Opcode::Lconst0),
            Instruction::Invoke {
                opcode: Opcode::Invokevirtual,
                index: println,
            },
            Instruction::Op(Opcode::Return),
        ];
        let assembled = reassemble(&instructions).unwrap();
        let maxs = compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &[],
            pool.as_pool(),
            0,
        )
        .unwrap();
        assert_eq!((3, 0), maxs);
    }

    #[test]
    fn test_unbalanced_stack() {
        let instructions = vec![
            Instruction::Op(Opcode::Iconst0),
            Instruction::Op(Opcode::Iadd),
            Instruction::Op(Opcode::Ireturn),
        ];
        let assembled = reassemble(&instructions).unwrap();
        assert!(matches!(
            compute_maxs(
                &assembled.instructions,
                &assembled.offsets,
                &[],
                &ConstantPool::default(),
                0
            ),
            Err(ClassFileError::UnbalancedStack {
                offset: 1,
                opcode: "iadd",
                needed: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn test_handlers_start_with_one_value() {
        // 0: return; 1: athrow (handler)
        let instructions = vec![
            Instruction::Op(Opcode::Return),
            Instruction::Op(Opcode::Athrow),
        ];
        let assembled = reassemble(&instructions).unwrap();
        let maxs = compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &[1],
            &ConstantPool::default(),
            0,
        )
        .unwrap();
        assert_eq!((1, 0), maxs);
    }

    #[test]
    fn test_targets_follow_layout() {
        // Branch keys are instruction indices here.
        let instructions = vec![
            Instruction::Op(Opcode::Iconst0),
            Instruction::Branch {
                opcode: Opcode::Ifeq,
                target: 3,
            },
            Instruction::Push {
                opcode: Opcode::Sipush,
                value: 1000,
            },
            Instruction::Op(Opcode::Return),
        ];
        let assembled = assemble(&instructions, |key| Ok(key as usize)).unwrap();
        assert_eq!(vec![0, 1, 4, 7, 8], assembled.offsets);
        assert_eq!(
            Instruction::Branch {
                opcode: Opcode::Ifeq,
                target: 7
            },
            assembled.instructions[1]
        );
        assert_eq!(&[0x99, 0x00, 0x06], &assembled.code[1..4]);
    }

    #[test]
    fn test_subroutine_returns_without_its_address() {
        // 0: iconst_0; 1: jsr 8; 4: iconst_1; 5: iadd; 6: pop; 7: return;
        // 8: astore_1; 9: ret 1
        let instructions = vec![
            Instruction::Op(Opcode::Iconst0),
            Instruction::Branch {
                opcode: Opcode::Jsr,
                target: 6,
            },
            Instruction::Op(Opcode::Iconst1),
            Instruction::Op(Opcode::Iadd),
            Instruction::Op(Opcode::Pop),
            Instruction::Op(Opcode::Return),
            local(Opcode::Astore1, 1),
            local(Opcode::Ret, 1),
        ];
        let assembled = assemble(&instructions, |key| Ok(key as usize)).unwrap();
        assert_eq!(vec![0, 1, 4, 5, 6, 7, 8, 9, 11], assembled.offsets);
        let maxs = compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &[],
            &ConstantPool::default(),
            0,
        )
        .unwrap();
        assert_eq!((2, 2), maxs);
    }

    #[test]
    fn test_stack_depth_overflow() {
        let instructions = vec![Instruction::Op(Opcode::Lconst0); 32768];
        let assembled = reassemble(&instructions).unwrap();
        assert!(matches!(
            compute_maxs(
                &assembled.instructions,
                &assembled.offsets,
                &[],
                &ConstantPool::default(),
                0
            ),
            Err(ClassFileError::TooManyEntries {
                table: "operand stack",
                count: 65536
            })
        ));
    }

    #[test]
    fn test_last_local_slot_overflow() {
        let instructions = vec![
            Instruction::Local {
                opcode: Opcode::Lload,
                slot: u16::MAX,
                wide: true,
            },
            Instruction::Op(Opcode::Return),
        ];
        let assembled = reassemble(&instructions).unwrap();
        assert!(matches!(
            compute_maxs(
                &assembled.instructions,
                &assembled.offsets,
                &[],
                &ConstantPool::default(),
                0
            ),
            Err(ClassFileError::TooManyEntries {
                table: "local variables",
                ..
            })
        ));
    }
}
