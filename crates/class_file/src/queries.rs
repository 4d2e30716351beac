//! Read-only views over a parsed class, with every pool reference resolved.

use std::collections::BTreeSet;

use crate::{
    annotation::{Annotation, ResolvedAnnotation},
    attributes::Attributes,
    constant_pool::{DynamicInfo, MethodHandleInfo},
    instruction, AccessFlags, ClassFile, ConstantPool, CpInfo, FieldInfo, Instruction, MethodInfo,
    Result,
};

/// Names of every class the pool refers to, the class itself included.
/// Array classes appear under their descriptor, e.g. `[Ljava/lang/String;`.
pub fn dependencies(class: &ClassFile) -> Result<BTreeSet<String>> {
    let mut dependencies = BTreeSet::new();
    for (index, cp_info) in class.constant_pool.iter() {
        if let CpInfo::Class(_) = cp_info {
            dependencies.insert(class.constant_pool.class_name(index)?.to_owned());
        }
    }
    Ok(dependencies)
}

pub fn class_annotations(class: &ClassFile) -> Result<Vec<ResolvedAnnotation>> {
    resolve_annotations(&class.constant_pool, &class.attributes)
}

pub fn method_annotations(
    class: &ClassFile,
    method: &MethodInfo,
) -> Result<Vec<ResolvedAnnotation>> {
    resolve_annotations(&class.constant_pool, &method.attributes)
}

pub fn field_annotations(class: &ClassFile, field: &FieldInfo) -> Result<Vec<ResolvedAnnotation>> {
    resolve_annotations(&class.constant_pool, &field.attributes)
}

fn resolve_annotations(
    pool: &ConstantPool,
    attributes: &Attributes,
) -> Result<Vec<ResolvedAnnotation>> {
    attributes
        .runtime_visible_annotations()
        .unwrap_or_default()
        .iter()
        .map(|annotation: &Annotation| annotation.resolve(pool))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableView {
    pub name: String,
    pub descriptor: String,
    pub start_pc: u16,
    pub length: u16,
    pub slot: u16,
}

/// The LocalVariableTable of `method`'s code, empty when the class was
/// compiled without `-g`.
pub fn local_variables(class: &ClassFile, method: &MethodInfo) -> Result<Vec<LocalVariableView>> {
    let Some(code) = method.code() else {
        return Ok(Vec::new());
    };
    code.attributes
        .local_variable_table()
        .unwrap_or_default()
        .iter()
        .map(|variable| {
            Ok(LocalVariableView {
                name: class.constant_pool.utf8(variable.name_index)?.to_owned(),
                descriptor: class
                    .constant_pool
                    .utf8(variable.descriptor_index)?
                    .to_owned(),
                start_pc: variable.start_pc,
                length: variable.length,
                slot: variable.index,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    pub name: String,
    pub descriptor: String,
    pub access_flags: AccessFlags,
    /// `None` for methods without code.
    pub max_stack: Option<u16>,
    pub max_locals: Option<u16>,
    pub instruction_count: usize,
}

pub fn methods_info(class: &ClassFile) -> Result<Vec<MethodSummary>> {
    class
        .methods
        .iter()
        .map(|method| {
            let code = method.code();
            Ok(MethodSummary {
                name: class.method_name(method)?.to_owned(),
                descriptor: class.method_descriptor(method)?.to_owned(),
                access_flags: method.access_flags,
                max_stack: code.map(|code| code.max_stack),
                max_locals: code.map(|code| code.max_locals),
                instruction_count: code.map(|code| code.instructions.len()).unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntryView {
    pub index: u16,
    pub kind: &'static str,
    pub value: String,
}

/// One view per usable entry. The slot after a long or double is skipped,
/// so indices may jump by two.
pub fn constant_pool_entries(class: &ClassFile) -> Result<Vec<PoolEntryView>> {
    let pool = &class.constant_pool;
    pool.iter()
        .map(|(index, cp_info)| {
            Ok(PoolEntryView {
                index,
                kind: cp_info.kind_name(),
                value: render_entry(pool, cp_info)?,
            })
        })
        .collect()
}

fn render_entry(pool: &ConstantPool, cp_info: &CpInfo) -> Result<String> {
    Ok(match cp_info {
        CpInfo::Utf8(s) => s.clone(),
        CpInfo::Utf8Unpaired(units) => escape_units(units),
        CpInfo::Integer(i) => i.to_string(),
        CpInfo::Float(f) => format!("{}f", f),
        CpInfo::Long(l) => format!("{}L", l),
        CpInfo::Double(d) => format!("{}d", d),
        CpInfo::Class(class) => pool.utf8(class.name_index)?.to_owned(),
        CpInfo::String { string_index } => match pool.get(*string_index)? {
            CpInfo::Utf8Unpaired(units) => format!("\"{}\"", escape_units(units)),
            _ => format!("{:?}", pool.utf8(*string_index)?),
        },
        CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => {
            let (name, descriptor) = pool.name_and_type(r.name_and_type_index)?;
            format!(
                "{}.{}:{}",
                pool.class_name(r.class_index)?,
                name,
                descriptor
            )
        }
        CpInfo::NameAndType(nat) => format!(
            "{}:{}",
            pool.utf8(nat.name_index)?,
            pool.utf8(nat.descriptor_index)?
        ),
        CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind,
            reference_index,
        }) => format!(
            "{} {}",
            reference_kind_name(*reference_kind),
            render_entry(pool, pool.get(*reference_index)?)?
        ),
        CpInfo::MethodType(method_type) => pool.utf8(method_type.descriptor_index)?.to_owned(),
        CpInfo::Dynamic(DynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
        | CpInfo::InvokeDynamic(DynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        }) => {
            let (name, descriptor) = pool.name_and_type(*name_and_type_index)?;
            format!("#{}:{}:{}", bootstrap_method_attr_index, name, descriptor)
        }
        CpInfo::Module { name_index } | CpInfo::Package { name_index } => {
            pool.utf8(*name_index)?.to_owned()
        }
        CpInfo::Unusable => String::new(),
    })
}

/// Text with each unpaired surrogate written as `\u{XXXX}`.
fn escape_units(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|c| match c {
            Ok(c) => c.to_string(),
            Err(e) => format!("\\u{{{:04X}}}", e.unpaired_surrogate()),
        })
        .collect()
}

fn reference_kind_name(kind: u8) -> &'static str {
    match kind {
        1 => "REF_getField",
        2 => "REF_getStatic",
        3 => "REF_putField",
        4 => "REF_putStatic",
        5 => "REF_invokeVirtual",
        6 => "REF_invokeStatic",
        7 => "REF_invokeSpecial",
        8 => "REF_newInvokeSpecial",
        9 => "REF_invokeInterface",
        _ => "REF_unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inheritance {
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
}

pub fn inheritance(class: &ClassFile) -> Result<Inheritance> {
    Ok(Inheritance {
        super_class: class.super_class()?.map(str::to_owned),
        interfaces: class
            .interface_names()?
            .into_iter()
            .map(str::to_owned)
            .collect(),
    })
}

/// Renders the code of `method` one instruction per line, prefixed with its
/// offset:
///
/// ```text
///    0: aload_0
///    1: invokespecial #1 // java/lang/Object.<init>:()V
///    4: return
/// ```
pub fn disassemble(class: &ClassFile, method: &MethodInfo) -> Result<Vec<String>> {
    let Some(code) = method.code() else {
        return Ok(Vec::new());
    };
    let pool = &class.constant_pool;

    code.instructions
        .iter()
        .zip(instruction::offsets(&code.instructions))
        .map(|(instruction, offset)| {
            Ok(format!(
                "{:>4}: {}",
                offset,
                render_instruction(pool, instruction)?
            ))
        })
        .collect()
}

fn render_instruction(pool: &ConstantPool, instruction: &Instruction) -> Result<String> {
    let opcode = instruction.opcode();
    let with_entry = |operands: String, index: u16| -> Result<String> {
        Ok(format!(
            "{} {} // {}",
            opcode,
            operands,
            render_entry(pool, pool.get(index)?)?
        ))
    };

    match instruction {
        Instruction::Op(_) => Ok(opcode.to_string()),
        Instruction::Local { slot, .. } => Ok(match opcode.implicit_slot() {
            Some(_) => opcode.to_string(),
            None => format!("{} {}", opcode, slot),
        }),
        Instruction::Increment { slot, delta, .. } => {
            Ok(format!("{} {}, {}", opcode, slot, delta))
        }
        Instruction::Push { value, .. } => Ok(format!("{} {}", opcode, value)),
        Instruction::Constant { index, .. }
        | Instruction::Field { index, .. }
        | Instruction::Invoke { index, .. }
        | Instruction::InvokeDynamic { index }
        | Instruction::Type { index, .. } => with_entry(format!("#{}", index), *index),
        Instruction::InvokeInterface { index, count } => {
            with_entry(format!("#{}, {}", index, count), *index)
        }
        Instruction::MultiANewArray { index, dimensions } => {
            with_entry(format!("#{}, {}", index, dimensions), *index)
        }
        Instruction::NewArray(atype) => Ok(format!("{} {}", opcode, atype.name())),
        Instruction::Branch { target, .. } => Ok(format!("{} {}", opcode, target)),
        Instruction::TableSwitch {
            default,
            low,
            targets,
            ..
        } => {
            let cases = targets
                .iter()
                .enumerate()
                .map(|(i, target)| format!("{}: {}", *low as i64 + i as i64, target))
                .collect::<Vec<_>>();
            Ok(format!(
                "{} {{ {}, default: {} }}",
                opcode,
                cases.join(", "),
                default
            ))
        }
        Instruction::LookupSwitch { default, pairs } => {
            let cases = pairs
                .iter()
                .map(|(key, target)| format!("{}: {}", key, target))
                .collect::<Vec<_>>();
            if cases.is_empty() {
                return Ok(format!("{} {{ default: {} }}", opcode, default));
            }
            Ok(format!(
                "{} {{ {}, default: {} }}",
                opcode,
                cases.join(", "),
                default
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassBuilder;

    fn greeter() -> ClassFile {
        ClassBuilder::new("demo/Greeter")
            .interfaces(&["java/lang/Runnable"])
            .method(AccessFlags::PUBLIC, "run", "()V", |code| {
                code.getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
                    .ldc_string("hello")
                    .invokevirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
                    .return_();
            })
            .build_class()
            .unwrap()
    }

    #[test]
    fn test_dependencies() {
        let class = greeter();
        let dependencies = dependencies(&class).unwrap();
        assert_eq!(
            vec![
                "demo/Greeter",
                "java/io/PrintStream",
                "java/lang/Object",
                "java/lang/Runnable",
                "java/lang/System",
            ],
            dependencies.iter().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_inheritance() {
        let class = greeter();
        assert_eq!(
            Inheritance {
                super_class: Some("java/lang/Object".into()),
                interfaces: vec!["java/lang/Runnable".into()],
            },
            inheritance(&class).unwrap()
        );
    }

    #[test]
    fn test_disassemble() {
        let class = greeter();
        let run = class.find_method("run", "()V").unwrap();
        let lines = disassemble(&class, run).unwrap();
        assert_eq!(4, lines.len());
        assert!(lines[0].starts_with("   0: getstatic #"));
        assert!(lines[0].ends_with("// java/lang/System.out:Ljava/io/PrintStream;"));
        assert!(lines[1].starts_with("   3: ldc #"));
        assert!(lines[1].ends_with("// \"hello\""));
        assert_eq!("   8: return", lines[3]);
    }

    #[test]
    fn test_methods_info() {
        let class = ClassBuilder::new("demo/Shape")
            .flags(AccessFlags::PUBLIC | AccessFlags::ABSTRACT)
            .abstract_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "area", "()D")
            .build_class()
            .unwrap();
        let info = methods_info(&class).unwrap();
        assert_eq!(1, info.len());
        assert_eq!("area", info[0].name);
        assert_eq!(None, info[0].max_stack);
        assert_eq!(0, info[0].instruction_count);
    }

    #[test]
    fn test_long_entry_takes_two_indices() {
        let class = ClassBuilder::new("demo/Big")
            .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "big", "()J", |code| {
                code.ldc_long(1 << 40).op(crate::Opcode::Lreturn);
            })
            .abstract_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "after", "()V")
            .build_class()
            .unwrap();
        let entries = constant_pool_entries(&class).unwrap();
        let long = entries.iter().position(|e| e.kind == "Long").unwrap();
        assert_eq!("1099511627776L", entries[long].value);
        assert_eq!(entries[long].index + 2, entries[long + 1].index);
    }
}
