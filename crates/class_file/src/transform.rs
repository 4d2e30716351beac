use std::collections::HashMap;

use crate::{
    annotation::{Annotation, ElementValue, ElementValuePair},
    assembler,
    attributes::{
        frame_offsets, Attribute, AttributeInfo, Attributes, BootstrapMethod, CodeAttribute,
        ExceptionTableEntry, InnerClass, LineNumber, LocalVariable, MethodParameter,
        RecordComponent, StackMapFrame, VerificationType,
    },
    edit::{ClassBuilder, CodeFn, MemberEdit},
    instruction::Instruction,
    AccessFlags, ClassFile, ClassFileError, CodeBuilder, ConstantPool, ConstantPoolBuilder,
    FieldInfo, MethodInfo, Opcode, Result,
};

/// Runs an edit script, producing a class with a freshly allocated constant
/// pool.
///
/// Entries are allocated in the order they are first referenced while walking
/// the output: this class, its superclass and interfaces, then every field and
/// method, then the class attributes. Rebuilding the output of a rebuild
/// therefore reproduces it byte for byte.
pub(crate) fn build(builder: ClassBuilder<'_>) -> Result<ClassFile> {
    if let Some(e) = builder.error {
        return Err(e);
    }
    log::debug!(
        "Building {} ({} fields, {} methods)",
        builder.this_class,
        builder.fields.len(),
        builder.methods.len()
    );

    let mut pool = ConstantPoolBuilder::new();
    let this_class = pool.class(&builder.this_class)?;
    let super_class = match &builder.super_class {
        Some(name) => pool.class(name)?,
        None => 0,
    };
    let interfaces = builder
        .interfaces
        .iter()
        .map(|name| pool.class(name))
        .collect::<Result<Vec<_>>>()?;

    let base = builder.base;
    let mut fields = Vec::with_capacity(builder.fields.len());
    for edit in builder.fields {
        let (access_flags, name_index, descriptor_index, attributes) = match edit {
            MemberEdit::Copy { index, .. } => {
                let field = member_of(base, index, |class| &class.fields)?;
                copy_member(
                    &mut pool,
                    base,
                    field.access_flags,
                    field.name_index,
                    field.descriptor_index,
                    &field.attributes,
                )?
            }
            MemberEdit::Modify { index, flags, .. } => {
                let field = member_of(base, index, |class| &class.fields)?;
                copy_member(
                    &mut pool,
                    base,
                    flags.unwrap_or(field.access_flags),
                    field.name_index,
                    field.descriptor_index,
                    &field.attributes,
                )?
            }
            MemberEdit::Insert { key, flags, .. } => (
                flags,
                pool.utf8(&key.name)?,
                pool.utf8(&key.descriptor)?,
                Attributes::default(),
            ),
        };
        fields.push(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    let mut methods = Vec::with_capacity(builder.methods.len());
    for edit in builder.methods {
        log::trace!("Emitting method {}", edit.key());
        let (access_flags, name_index, descriptor_index, attributes) = match edit {
            MemberEdit::Copy { index, .. } => {
                let method = member_of(base, index, |class| &class.methods)?;
                copy_member(
                    &mut pool,
                    base,
                    method.access_flags,
                    method.name_index,
                    method.descriptor_index,
                    &method.attributes,
                )?
            }
            MemberEdit::Modify {
                index,
                key,
                flags,
                code,
            } => {
                let method = member_of(base, index, |class| &class.methods)?;
                let access_flags = flags.unwrap_or(method.access_flags);
                match code {
                    None => copy_member(
                        &mut pool,
                        base,
                        access_flags,
                        method.name_index,
                        method.descriptor_index,
                        &method.attributes,
                    )?,
                    Some(code) => {
                        let name_index = pool.utf8(&key.name)?;
                        let descriptor_index = pool.utf8(&key.descriptor)?;
                        let attributes = replace_code(
                            &mut pool,
                            base,
                            &method.attributes,
                            access_flags,
                            &key.descriptor,
                            code,
                        )?;
                        (access_flags, name_index, descriptor_index, attributes)
                    }
                }
            }
            MemberEdit::Insert { key, flags, code } => {
                let name_index = pool.utf8(&key.name)?;
                let descriptor_index = pool.utf8(&key.descriptor)?;
                let mut attributes = Attributes::default();
                if let Some(code) = code {
                    attributes
                        .0
                        .push(generate_code(&mut pool, flags, &key.descriptor, code)?);
                }
                (flags, name_index, descriptor_index, attributes)
            }
        };
        methods.push(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    let mut attributes = match base {
        Some(base) => Relocator::new(&mut pool, base).attributes(&base.attributes, None)?,
        None => Attributes::default(),
    };

    let bootstrap_methods_name = if pool.has_bootstrap_methods() {
        Some(pool.utf8("BootstrapMethods")?)
    } else {
        None
    };
    let (constant_pool, bootstrap_methods) = pool.finish();
    if let Some(name_index) = bootstrap_methods_name {
        attributes.0.push(Attribute {
            name_index,
            info: AttributeInfo::BootstrapMethods(bootstrap_methods),
        });
    }

    let (major_version, minor_version) = builder.version;
    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags: builder.flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

fn member_of<'a, T>(
    base: Option<&'a ClassFile>,
    index: usize,
    members: impl Fn(&'a ClassFile) -> &'a Vec<T>,
) -> Result<&'a T> {
    base.and_then(|class| members(class).get(index))
        .ok_or_else(|| ClassFileError::MalformedAttribute {
            name: "ClassFile".into(),
            reason: format!("member {} is not part of the base class", index),
        })
}

fn copy_member(
    pool: &mut ConstantPoolBuilder,
    base: Option<&ClassFile>,
    access_flags: AccessFlags,
    name_index: u16,
    descriptor_index: u16,
    attributes: &Attributes,
) -> Result<(AccessFlags, u16, u16, Attributes)> {
    let base = base.ok_or_else(|| ClassFileError::MalformedAttribute {
        name: "ClassFile".into(),
        reason: "copied member without a base class".into(),
    })?;
    let mut relocator = Relocator::new(pool, base);
    let name_index = relocator.index(name_index)?;
    let descriptor_index = relocator.index(descriptor_index)?;
    let attributes = relocator.attributes(attributes, None)?;
    Ok((access_flags, name_index, descriptor_index, attributes))
}

/// Copies the attributes of a method, swapping its Code attribute (or adding
/// one in front) for code emitted by `code`.
fn replace_code(
    pool: &mut ConstantPoolBuilder,
    base: Option<&ClassFile>,
    attributes: &Attributes,
    access_flags: AccessFlags,
    descriptor: &str,
    code: CodeFn<'_>,
) -> Result<Attributes> {
    let base = base.ok_or_else(|| ClassFileError::MalformedAttribute {
        name: "Code".into(),
        reason: "replaced code without a base class".into(),
    })?;

    let mut output = Vec::with_capacity(attributes.len() + 1);
    let mut code = Some(code);
    for attribute in attributes {
        if let AttributeInfo::Code(_) = attribute.info {
            if let Some(code) = code.take() {
                output.push(generate_code(pool, access_flags, descriptor, code)?);
            }
            continue;
        }
        if let Some(relocated) = Relocator::new(pool, base).attribute(attribute, None)? {
            output.push(relocated);
        }
    }
    if let Some(code) = code {
        output.insert(0, generate_code(pool, access_flags, descriptor, code)?);
    }

    Ok(Attributes(output))
}

fn generate_code(
    pool: &mut ConstantPoolBuilder,
    access_flags: AccessFlags,
    descriptor: &str,
    code: CodeFn<'_>,
) -> Result<Attribute> {
    let name_index = pool.utf8("Code")?;
    let mut builder = CodeBuilder::new(pool);
    code(&mut builder);
    let code = builder.finish(access_flags.contains(AccessFlags::STATIC), descriptor)?;
    Ok(Attribute {
        name_index,
        info: AttributeInfo::Code(code),
    })
}

/// Where the instructions of a relocated Code attribute moved to.
struct OffsetMap {
    index_by_offset: HashMap<u32, usize>,
    offsets: Vec<u32>,
}

impl OffsetMap {
    fn map(&self, offset: u16) -> Result<u16> {
        self.index_by_offset
            .get(&(offset as u32))
            .map(|index| self.offsets[*index] as u16)
            .ok_or_else(|| ClassFileError::MalformedAttribute {
                name: "Code".into(),
                reason: format!("offset {} is not an instruction boundary", offset),
            })
    }

    /// Maps the range `[start, start + length)`, returning the new start and
    /// length.
    fn map_range(&self, start: u16, length: u16) -> Result<(u16, u16)> {
        let new_start = self.map(start)?;
        let end = (start as u32 + length as u32) as u16;
        let new_end = self.map(end)?;
        Ok((new_start, new_end.saturating_sub(new_start)))
    }
}

/// Copies pool-dependent structures of a base class into a new pool.
struct Relocator<'p, 'a> {
    pool: &'p mut ConstantPoolBuilder,
    source: &'a ConstantPool,
    bootstrap_methods: &'a [BootstrapMethod],
}

impl<'p, 'a> Relocator<'p, 'a> {
    fn new(pool: &'p mut ConstantPoolBuilder, base: &'a ClassFile) -> Self {
        Self {
            pool,
            source: &base.constant_pool,
            bootstrap_methods: base.bootstrap_methods(),
        }
    }

    fn index(&mut self, index: u16) -> Result<u16> {
        self.pool.import(self.source, self.bootstrap_methods, index)
    }

    fn optional(&mut self, index: u16) -> Result<u16> {
        self.pool
            .import_optional(self.source, self.bootstrap_methods, index)
    }

    fn indices(&mut self, indices: &[u16]) -> Result<Vec<u16>> {
        indices.iter().map(|index| self.index(*index)).collect()
    }

    fn attributes(
        &mut self,
        attributes: &Attributes,
        offsets: Option<&OffsetMap>,
    ) -> Result<Attributes> {
        let mut output = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            if let Some(relocated) = self.attribute(attribute, offsets)? {
                output.push(relocated);
            }
        }
        Ok(Attributes(output))
    }

    /// `None` for attributes that are not carried over: BootstrapMethods is
    /// regenerated from the new pool and unknown payloads cannot be relocated.
    fn attribute(
        &mut self,
        attribute: &Attribute,
        offsets: Option<&OffsetMap>,
    ) -> Result<Option<Attribute>> {
        match &attribute.info {
            AttributeInfo::BootstrapMethods(_) => return Ok(None),
            AttributeInfo::Raw(payload) => {
                log::warn!(
                    "Dropping attribute {} ({} bytes): its payload may refer to the old constant pool",
                    self.source.utf8(attribute.name_index).unwrap_or("<invalid>"),
                    payload.len()
                );
                return Ok(None);
            }
            _ => {}
        }

        let name_index = self.index(attribute.name_index)?;
        let info = match &attribute.info {
            AttributeInfo::Code(code) => AttributeInfo::Code(self.code(code)?),
            AttributeInfo::ConstantValue {
                constantvalue_index,
            } => AttributeInfo::ConstantValue {
                constantvalue_index: self.index(*constantvalue_index)?,
            },
            AttributeInfo::Exceptions(exceptions) => {
                AttributeInfo::Exceptions(self.indices(exceptions)?)
            }
            AttributeInfo::SourceFile { sourcefile_index } => AttributeInfo::SourceFile {
                sourcefile_index: self.index(*sourcefile_index)?,
            },
            AttributeInfo::Signature { signature_index } => AttributeInfo::Signature {
                signature_index: self.index(*signature_index)?,
            },
            AttributeInfo::LineNumberTable(line_numbers) => AttributeInfo::LineNumberTable(
                line_numbers
                    .iter()
                    .map(|line| {
                        Ok(LineNumber {
                            start_pc: map_offset(offsets, line.start_pc)?,
                            line_number: line.line_number,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            AttributeInfo::LocalVariableTable(variables) => {
                AttributeInfo::LocalVariableTable(self.local_variables(variables, offsets)?)
            }
            AttributeInfo::LocalVariableTypeTable(variables) => {
                AttributeInfo::LocalVariableTypeTable(self.local_variables(variables, offsets)?)
            }
            AttributeInfo::StackMapTable(frames) => {
                AttributeInfo::StackMapTable(self.stack_map_frames(frames, offsets)?)
            }
            AttributeInfo::InnerClasses(classes) => AttributeInfo::InnerClasses(
                classes
                    .iter()
                    .map(|class| {
                        Ok(InnerClass {
                            inner_class_info_index: self.index(class.inner_class_info_index)?,
                            outer_class_info_index: self.optional(class.outer_class_info_index)?,
                            inner_name_index: self.optional(class.inner_name_index)?,
                            inner_class_access_flags: class.inner_class_access_flags,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            AttributeInfo::EnclosingMethod {
                class_index,
                method_index,
            } => AttributeInfo::EnclosingMethod {
                class_index: self.index(*class_index)?,
                method_index: self.optional(*method_index)?,
            },
            AttributeInfo::NestHost { host_class_index } => AttributeInfo::NestHost {
                host_class_index: self.index(*host_class_index)?,
            },
            AttributeInfo::NestMembers(classes) => {
                AttributeInfo::NestMembers(self.indices(classes)?)
            }
            AttributeInfo::PermittedSubclasses(classes) => {
                AttributeInfo::PermittedSubclasses(self.indices(classes)?)
            }
            AttributeInfo::MethodParameters(parameters) => AttributeInfo::MethodParameters(
                parameters
                    .iter()
                    .map(|parameter| {
                        Ok(MethodParameter {
                            name_index: self.optional(parameter.name_index)?,
                            access_flags: parameter.access_flags,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            AttributeInfo::Deprecated => AttributeInfo::Deprecated,
            AttributeInfo::Synthetic => AttributeInfo::Synthetic,
            AttributeInfo::RuntimeVisibleAnnotations(annotations) => {
                AttributeInfo::RuntimeVisibleAnnotations(self.annotations(annotations)?)
            }
            AttributeInfo::RuntimeInvisibleAnnotations(annotations) => {
                AttributeInfo::RuntimeInvisibleAnnotations(self.annotations(annotations)?)
            }
            AttributeInfo::RuntimeVisibleParameterAnnotations(parameters) => {
                AttributeInfo::RuntimeVisibleParameterAnnotations(
                    parameters
                        .iter()
                        .map(|annotations| self.annotations(annotations))
                        .collect::<Result<_>>()?,
                )
            }
            AttributeInfo::RuntimeInvisibleParameterAnnotations(parameters) => {
                AttributeInfo::RuntimeInvisibleParameterAnnotations(
                    parameters
                        .iter()
                        .map(|annotations| self.annotations(annotations))
                        .collect::<Result<_>>()?,
                )
            }
            AttributeInfo::AnnotationDefault(value) => {
                AttributeInfo::AnnotationDefault(self.element_value(value)?)
            }
            AttributeInfo::Record(components) => AttributeInfo::Record(
                components
                    .iter()
                    .map(|component| {
                        Ok(RecordComponent {
                            name_index: self.index(component.name_index)?,
                            descriptor_index: self.index(component.descriptor_index)?,
                            attributes: self.attributes(&component.attributes, None)?,
                        })
                    })
                    .collect::<Result<_>>()?,
            ),
            AttributeInfo::SourceDebugExtension(data) => {
                AttributeInfo::SourceDebugExtension(data.clone())
            }
            AttributeInfo::BootstrapMethods(_) | AttributeInfo::Raw(_) => unreachable!(),
        };

        Ok(Some(Attribute { name_index, info }))
    }

    /// Copies a Code attribute, keeping its maxima. Every `ldc` whose constant
    /// lands above index 255 becomes `ldc_w`, so offsets may shift; branch
    /// targets, the exception table and the offset-carrying attributes follow.
    fn code(&mut self, code: &CodeAttribute) -> Result<CodeAttribute> {
        let mut instructions = Vec::with_capacity(code.instructions.len());
        for instruction in &code.instructions {
            instructions.push(self.instruction(instruction)?);
        }

        let index_by_offset = assembler::index_by_offset(&code.instructions);
        let assembled = assembler::assemble(&instructions, |target| {
            index_by_offset
                .get(&target)
                .copied()
                .ok_or(ClassFileError::InvalidBranchTarget {
                    offset: 0,
                    target: target as i64,
                })
        })?;
        let offsets = OffsetMap {
            index_by_offset,
            offsets: assembled.offsets,
        };

        let mut exception_table = Vec::with_capacity(code.exception_table.len());
        for entry in &code.exception_table {
            exception_table.push(ExceptionTableEntry {
                start_pc: offsets.map(entry.start_pc)?,
                end_pc: offsets.map(entry.end_pc)?,
                handler_pc: offsets.map(entry.handler_pc)?,
                catch_type: self.optional(entry.catch_type)?,
            });
        }
        let attributes = self.attributes(&code.attributes, Some(&offsets))?;

        Ok(CodeAttribute {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            instructions: assembled.instructions,
            exception_table,
            attributes,
        })
    }

    /// The instruction with its pool index relocated. Targets are left alone.
    fn instruction(&mut self, instruction: &Instruction) -> Result<Instruction> {
        Ok(match instruction {
            Instruction::Constant { opcode, index } => {
                let index = self.index(*index)?;
                let opcode = match opcode {
                    Opcode::Ldc if index > u8::MAX as u16 => Opcode::LdcW,
                    _ => *opcode,
                };
                Instruction::Constant { opcode, index }
            }
            Instruction::Field { opcode, index } => Instruction::Field {
                opcode: *opcode,
                index: self.index(*index)?,
            },
            Instruction::Invoke { opcode, index } => Instruction::Invoke {
                opcode: *opcode,
                index: self.index(*index)?,
            },
            Instruction::InvokeInterface { index, count } => Instruction::InvokeInterface {
                index: self.index(*index)?,
                count: *count,
            },
            Instruction::InvokeDynamic { index } => Instruction::InvokeDynamic {
                index: self.index(*index)?,
            },
            Instruction::Type { opcode, index } => Instruction::Type {
                opcode: *opcode,
                index: self.index(*index)?,
            },
            Instruction::MultiANewArray { index, dimensions } => Instruction::MultiANewArray {
                index: self.index(*index)?,
                dimensions: *dimensions,
            },
            other => other.clone(),
        })
    }

    fn local_variables(
        &mut self,
        variables: &[LocalVariable],
        offsets: Option<&OffsetMap>,
    ) -> Result<Vec<LocalVariable>> {
        variables
            .iter()
            .map(|variable| {
                let (start_pc, length) = match offsets {
                    Some(offsets) => offsets.map_range(variable.start_pc, variable.length)?,
                    None => (variable.start_pc, variable.length),
                };
                Ok(LocalVariable {
                    start_pc,
                    length,
                    name_index: self.index(variable.name_index)?,
                    descriptor_index: self.index(variable.descriptor_index)?,
                    index: variable.index,
                })
            })
            .collect()
    }

    fn stack_map_frames(
        &mut self,
        frames: &[StackMapFrame],
        offsets: Option<&OffsetMap>,
    ) -> Result<Vec<StackMapFrame>> {
        let mut output = Vec::with_capacity(frames.len());
        let mut previous: Option<u16> = None;
        for (frame, offset) in frames.iter().zip(frame_offsets(frames)) {
            let offset = map_offset(offsets, offset as u16)?;
            let mut frame = frame.clone();
            frame.set_offset_delta(match previous {
                None => offset,
                Some(previous) => offset.wrapping_sub(previous).wrapping_sub(1),
            });
            for verification_type in frame.verification_types_mut() {
                match verification_type {
                    VerificationType::Object { cpool_index } => {
                        *cpool_index = self.index(*cpool_index)?;
                    }
                    VerificationType::Uninitialized { offset } => {
                        *offset = map_offset(offsets, *offset)?;
                    }
                    _ => {}
                }
            }
            output.push(frame);
            previous = Some(offset);
        }
        Ok(output)
    }

    fn annotations(&mut self, annotations: &[Annotation]) -> Result<Vec<Annotation>> {
        annotations
            .iter()
            .map(|annotation| self.annotation(annotation))
            .collect()
    }

    fn annotation(&mut self, annotation: &Annotation) -> Result<Annotation> {
        let type_index = self.index(annotation.type_index)?;
        let elements = annotation
            .elements
            .iter()
            .map(|pair| {
                Ok(ElementValuePair {
                    name_index: self.index(pair.name_index)?,
                    value: self.element_value(&pair.value)?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    fn element_value(&mut self, value: &ElementValue) -> Result<ElementValue> {
        Ok(match value {
            ElementValue::Const { tag, index } => ElementValue::Const {
                tag: *tag,
                index: self.index(*index)?,
            },
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => ElementValue::Enum {
                type_name_index: self.index(*type_name_index)?,
                const_name_index: self.index(*const_name_index)?,
            },
            ElementValue::Class { class_info_index } => ElementValue::Class {
                class_info_index: self.index(*class_info_index)?,
            },
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(self.annotation(annotation)?)
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| self.element_value(value))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

/// Offsets outside a Code attribute stay as they are.
fn map_offset(offsets: Option<&OffsetMap>, offset: u16) -> Result<u16> {
    match offsets {
        Some(offsets) => offsets.map(offset),
        None => Ok(offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassFile {
        ClassBuilder::new("demo/Counter")
            .field(AccessFlags::PRIVATE, "count", "I")
            .method(AccessFlags::PUBLIC, "<init>", "()V", |code| {
                code.aload(0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .return_();
            })
            .method(AccessFlags::PUBLIC, "next", "()I", |code| {
                code.aload(0)
                    .dup()
                    .getfield("demo/Counter", "count", "I")
                    .iconst(1)
                    .iadd()
                    .putfield("demo/Counter", "count", "I")
                    .aload(0)
                    .getfield("demo/Counter", "count", "I")
                    .ireturn();
            })
            .build_class()
            .unwrap()
    }

    #[test]
    fn test_new_class() {
        let class = sample();
        assert_eq!((49, 0), (class.major_version, class.minor_version));
        assert_eq!("demo/Counter", class.class_name().unwrap());
        assert_eq!(Some("java/lang/Object"), class.super_class().unwrap());

        let next = class.find_method("next", "()I").unwrap();
        let code = next.code().unwrap();
        assert_eq!(3, code.max_stack);
        assert_eq!(1, code.max_locals);
        assert!(class.constant_pool.validate().is_ok());
    }

    #[test]
    fn test_copy_is_a_fixed_point() {
        let class = sample();
        let copy = ClassBuilder::from_class(&class)
            .unwrap()
            .build_class()
            .unwrap();
        assert_eq!(class, copy);
    }

    #[test]
    fn test_method_code_replaces_body() {
        let class = sample();
        let edited = ClassBuilder::from_class(&class)
            .unwrap()
            .method_code("next", "()I", |code| {
                code.iconst(7).ireturn();
            })
            .build_class()
            .unwrap();

        let code = edited.find_method("next", "()I").unwrap().code().unwrap();
        assert_eq!(
            vec![
                Instruction::Push {
                    opcode: Opcode::Bipush,
                    value: 7
                },
                Instruction::Op(Opcode::Ireturn),
            ],
            code.instructions
        );
        assert_eq!(1, code.max_stack);
        // The unused field reference is gone from the pool.
        assert!(edited
            .constant_pool
            .iter()
            .all(|(_, c)| c.kind_name() != "FieldRef"));
    }

    #[test]
    fn test_remove_and_insert() {
        let class = sample();
        let edited = ClassBuilder::from_class(&class)
            .unwrap()
            .remove_field("count", "I")
            .remove_method("next", "()I")
            .abstract_method(
                AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
                "run",
                "()V",
            )
            .flags(AccessFlags::PUBLIC | AccessFlags::SUPER | AccessFlags::ABSTRACT)
            .build_class()
            .unwrap();

        assert!(edited.fields.is_empty());
        let names = edited
            .methods
            .iter()
            .map(|m| edited.method_name(m).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(vec!["<init>", "run"], names);
        assert!(edited.find_method("run", "()V").unwrap().code().is_none());
    }

    #[test]
    fn test_ldc_is_widened_when_constant_moves_up() {
        let mut pool = ConstantPoolBuilder::new();
        let class_index = pool.class("demo/Wide").unwrap();
        let super_index = pool.class("java/lang/Object").unwrap();
        let name = pool.utf8("value").unwrap();
        let descriptor = pool.utf8("()I").unwrap();
        let code_name = pool.utf8("Code").unwrap();
        let constant = pool.integer(123_456).unwrap();
        let (constant_pool, _) = pool.finish();

        let class = ClassFile {
            minor_version: 0,
            major_version: 49,
            constant_pool,
            access_flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            this_class: class_index,
            super_class: super_index,
            interfaces: vec![],
            fields: vec![],
            methods: vec![MethodInfo {
                access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC,
                name_index: name,
                descriptor_index: descriptor,
                attributes: Attributes(vec![Attribute {
                    name_index: code_name,
                    info: AttributeInfo::Code(CodeAttribute {
                        max_stack: 1,
                        max_locals: 0,
                        instructions: vec![
                            Instruction::Branch {
                                opcode: Opcode::Goto,
                                target: 5,
                            },
                            Instruction::Constant {
                                opcode: Opcode::Ldc,
                                index: constant,
                            },
                            Instruction::Op(Opcode::Ireturn),
                        ],
                        exception_table: vec![],
                        attributes: Attributes::default(),
                    }),
                }]),
            }],
            attributes: Attributes::default(),
        };

        // Fields are emitted before methods, so their names take the low indices.
        let mut builder = ClassBuilder::from_class(&class).unwrap();
        for i in 0..300 {
            builder = builder.field(AccessFlags::STATIC, &format!("f{}", i), "I");
        }
        let edited = builder.build_class().unwrap();

        let code = edited.find_method("value", "()I").unwrap().code().unwrap();
        let Instruction::Constant { opcode, index } = &code.instructions[1] else {
            panic!("expected a constant load");
        };
        assert_eq!(Opcode::LdcW, *opcode);
        assert!(*index > 255);
        assert_eq!(
            Instruction::Branch {
                opcode: Opcode::Goto,
                target: 6
            },
            code.instructions[0]
        );
        assert_eq!(1, code.max_stack);
    }
}
