use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use crate::{
    annotation::{Annotation, ElementValue},
    assembler,
    attributes::{
        Attribute, AttributeInfo, Attributes, CodeAttribute, LocalVariable, StackMapFrame,
        VerificationType,
    },
    class_file::{FieldInfo, MethodInfo},
    ClassFile, ClassFileError, Result, MAGIC,
};

type Endian = BigEndian;

/// Serialises a [`ClassFile`] in section order. Indices are written as they
/// are; code is re-encoded from its instructions.
pub struct Writer<W> {
    w: W,
}
impl<W: Write> Writer<W> {
    pub fn new(w: W) -> Self {
        Self { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    pub fn write(&mut self, class_file: &ClassFile) -> Result<()> {
        self.w.write_u32::<Endian>(MAGIC)?;
        self.w.write_u16::<Endian>(class_file.minor_version)?;
        self.w.write_u16::<Endian>(class_file.major_version)?;
        class_file.constant_pool.write_to(&mut self.w)?;
        self.w.write_u16::<Endian>(class_file.access_flags.bits())?;
        self.w.write_u16::<Endian>(class_file.this_class)?;
        self.w.write_u16::<Endian>(class_file.super_class)?;

        let mut buf = Vec::new();
        write_u16_table(&mut buf, "interfaces", &class_file.interfaces)?;

        buf.write_u16::<Endian>(count("fields", class_file.fields.len())?)?;
        for FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        } in &class_file.fields
        {
            buf.write_u16::<Endian>(access_flags.bits())?;
            buf.write_u16::<Endian>(*name_index)?;
            buf.write_u16::<Endian>(*descriptor_index)?;
            write_attributes(&mut buf, attributes)?;
        }

        buf.write_u16::<Endian>(count("methods", class_file.methods.len())?)?;
        for MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        } in &class_file.methods
        {
            buf.write_u16::<Endian>(access_flags.bits())?;
            buf.write_u16::<Endian>(*name_index)?;
            buf.write_u16::<Endian>(*descriptor_index)?;
            write_attributes(&mut buf, attributes)?;
        }

        write_attributes(&mut buf, &class_file.attributes)?;
        self.w.write_all(&buf)?;

        Ok(())
    }
}

fn count(table: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| ClassFileError::TooManyEntries { table, count: len })
}

fn write_u16_table(out: &mut Vec<u8>, table: &'static str, values: &[u16]) -> Result<()> {
    out.write_u16::<Endian>(count(table, values.len())?)?;
    for value in values {
        out.write_u16::<Endian>(*value)?;
    }
    Ok(())
}

fn write_attributes(out: &mut Vec<u8>, attributes: &Attributes) -> Result<()> {
    out.write_u16::<Endian>(count("attributes", attributes.len())?)?;
    let mut payload = Vec::new();
    for Attribute { name_index, info } in attributes {
        payload.clear();
        write_attribute_info(&mut payload, info)?;
        let length = u32::try_from(payload.len()).map_err(|_| ClassFileError::TooManyEntries {
            table: "attribute payload",
            count: payload.len(),
        })?;

        out.write_u16::<Endian>(*name_index)?;
        out.write_u32::<Endian>(length)?;
        out.extend_from_slice(&payload);
    }
    Ok(())
}

fn write_attribute_info(out: &mut Vec<u8>, info: &AttributeInfo) -> Result<()> {
    match info {
        AttributeInfo::Code(code) => write_code(out, code)?,
        AttributeInfo::ConstantValue {
            constantvalue_index: index,
        }
        | AttributeInfo::SourceFile {
            sourcefile_index: index,
        }
        | AttributeInfo::Signature {
            signature_index: index,
        }
        | AttributeInfo::NestHost {
            host_class_index: index,
        } => out.write_u16::<Endian>(*index)?,
        AttributeInfo::Exceptions(classes) => write_u16_table(out, "exceptions", classes)?,
        AttributeInfo::NestMembers(classes) => write_u16_table(out, "nest members", classes)?,
        AttributeInfo::PermittedSubclasses(classes) => {
            write_u16_table(out, "permitted subclasses", classes)?
        }
        AttributeInfo::LineNumberTable(lines) => {
            out.write_u16::<Endian>(count("line numbers", lines.len())?)?;
            for line in lines {
                out.write_u16::<Endian>(line.start_pc)?;
                out.write_u16::<Endian>(line.line_number)?;
            }
        }
        AttributeInfo::LocalVariableTable(vars) | AttributeInfo::LocalVariableTypeTable(vars) => {
            write_local_variables(out, vars)?
        }
        AttributeInfo::StackMapTable(frames) => {
            out.write_u16::<Endian>(count("stack map frames", frames.len())?)?;
            for frame in frames {
                write_stack_map_frame(out, frame)?;
            }
        }
        AttributeInfo::InnerClasses(classes) => {
            out.write_u16::<Endian>(count("inner classes", classes.len())?)?;
            for class in classes {
                out.write_u16::<Endian>(class.inner_class_info_index)?;
                out.write_u16::<Endian>(class.outer_class_info_index)?;
                out.write_u16::<Endian>(class.inner_name_index)?;
                out.write_u16::<Endian>(class.inner_class_access_flags.bits())?;
            }
        }
        AttributeInfo::EnclosingMethod {
            class_index,
            method_index,
        } => {
            out.write_u16::<Endian>(*class_index)?;
            out.write_u16::<Endian>(*method_index)?;
        }
        AttributeInfo::BootstrapMethods(methods) => {
            out.write_u16::<Endian>(count("bootstrap methods", methods.len())?)?;
            for method in methods {
                out.write_u16::<Endian>(method.bootstrap_method_ref)?;
                write_u16_table(out, "bootstrap arguments", &method.bootstrap_arguments)?;
            }
        }
        AttributeInfo::MethodParameters(parameters) => {
            let len = u8::try_from(parameters.len()).map_err(|_| {
                ClassFileError::TooManyEntries {
                    table: "method parameters",
                    count: parameters.len(),
                }
            })?;
            out.write_u8(len)?;
            for parameter in parameters {
                out.write_u16::<Endian>(parameter.name_index)?;
                out.write_u16::<Endian>(parameter.access_flags.bits())?;
            }
        }
        AttributeInfo::Deprecated | AttributeInfo::Synthetic => {}
        AttributeInfo::RuntimeVisibleAnnotations(annotations)
        | AttributeInfo::RuntimeInvisibleAnnotations(annotations) => {
            write_annotations(out, annotations)?
        }
        AttributeInfo::RuntimeVisibleParameterAnnotations(parameters)
        | AttributeInfo::RuntimeInvisibleParameterAnnotations(parameters) => {
            let len = u8::try_from(parameters.len()).map_err(|_| {
                ClassFileError::TooManyEntries {
                    table: "parameter annotations",
                    count: parameters.len(),
                }
            })?;
            out.write_u8(len)?;
            for annotations in parameters {
                write_annotations(out, annotations)?;
            }
        }
        AttributeInfo::AnnotationDefault(value) => write_element_value(out, value)?,
        AttributeInfo::Record(components) => {
            out.write_u16::<Endian>(count("record components", components.len())?)?;
            for component in components {
                out.write_u16::<Endian>(component.name_index)?;
                out.write_u16::<Endian>(component.descriptor_index)?;
                write_attributes(out, &component.attributes)?;
            }
        }
        AttributeInfo::SourceDebugExtension(bytes) | AttributeInfo::Raw(bytes) => {
            out.extend_from_slice(bytes)
        }
    }
    Ok(())
}

fn write_code(out: &mut Vec<u8>, code: &CodeAttribute) -> Result<()> {
    let assembled = assembler::reassemble(&code.instructions)?;

    out.write_u16::<Endian>(code.max_stack)?;
    out.write_u16::<Endian>(code.max_locals)?;
    out.write_u32::<Endian>(assembled.code.len() as u32)?;
    out.extend_from_slice(&assembled.code);
    out.write_u16::<Endian>(count("exception table", code.exception_table.len())?)?;
    for entry in &code.exception_table {
        out.write_u16::<Endian>(entry.start_pc)?;
        out.write_u16::<Endian>(entry.end_pc)?;
        out.write_u16::<Endian>(entry.handler_pc)?;
        out.write_u16::<Endian>(entry.catch_type)?;
    }
    write_attributes(out, &code.attributes)
}

fn write_local_variables(out: &mut Vec<u8>, vars: &[LocalVariable]) -> Result<()> {
    out.write_u16::<Endian>(count("local variables", vars.len())?)?;
    for var in vars {
        out.write_u16::<Endian>(var.start_pc)?;
        out.write_u16::<Endian>(var.length)?;
        out.write_u16::<Endian>(var.name_index)?;
        out.write_u16::<Endian>(var.descriptor_index)?;
        out.write_u16::<Endian>(var.index)?;
    }
    Ok(())
}

/// Compact frames whose delta no longer fits their type byte (after a
/// relocation) are promoted to the extended form; extended frames stay
/// extended.
fn write_stack_map_frame(out: &mut Vec<u8>, frame: &StackMapFrame) -> Result<()> {
    match frame {
        StackMapFrame::Same { offset_delta } if *offset_delta < 64 => {
            out.write_u8(*offset_delta as u8)?;
        }
        StackMapFrame::Same { offset_delta } | StackMapFrame::SameExtended { offset_delta } => {
            out.write_u8(251)?;
            out.write_u16::<Endian>(*offset_delta)?;
        }
        StackMapFrame::SameLocals1StackItem {
            offset_delta,
            stack,
        } if *offset_delta < 64 => {
            out.write_u8(64 + *offset_delta as u8)?;
            write_verification_type(out, stack)?;
        }
        StackMapFrame::SameLocals1StackItem {
            offset_delta,
            stack,
        }
        | StackMapFrame::SameLocals1StackItemExtended {
            offset_delta,
            stack,
        } => {
            out.write_u8(247)?;
            out.write_u16::<Endian>(*offset_delta)?;
            write_verification_type(out, stack)?;
        }
        StackMapFrame::Chop { offset_delta, k } => {
            if !(1..=3).contains(k) {
                return Err(malformed_frame(format!("chop frame removes {} locals", k)));
            }
            out.write_u8(251 - k)?;
            out.write_u16::<Endian>(*offset_delta)?;
        }
        StackMapFrame::Append {
            offset_delta,
            locals,
        } => {
            if !(1..=3).contains(&locals.len()) {
                return Err(malformed_frame(format!(
                    "append frame adds {} locals",
                    locals.len()
                )));
            }
            out.write_u8(251 + locals.len() as u8)?;
            out.write_u16::<Endian>(*offset_delta)?;
            for local in locals {
                write_verification_type(out, local)?;
            }
        }
        StackMapFrame::Full {
            offset_delta,
            locals,
            stack,
        } => {
            out.write_u8(255)?;
            out.write_u16::<Endian>(*offset_delta)?;
            for types in [locals, stack] {
                out.write_u16::<Endian>(count("verification types", types.len())?)?;
                for t in types {
                    write_verification_type(out, t)?;
                }
            }
        }
    }
    Ok(())
}

fn malformed_frame(reason: String) -> ClassFileError {
    ClassFileError::MalformedAttribute {
        name: "StackMapTable".into(),
        reason,
    }
}

fn write_verification_type(out: &mut Vec<u8>, t: &VerificationType) -> Result<()> {
    match t {
        VerificationType::Top => out.write_u8(0)?,
        VerificationType::Integer => out.write_u8(1)?,
        VerificationType::Float => out.write_u8(2)?,
        VerificationType::Double => out.write_u8(3)?,
        VerificationType::Long => out.write_u8(4)?,
        VerificationType::Null => out.write_u8(5)?,
        VerificationType::UninitializedThis => out.write_u8(6)?,
        VerificationType::Object { cpool_index } => {
            out.write_u8(7)?;
            out.write_u16::<Endian>(*cpool_index)?;
        }
        VerificationType::Uninitialized { offset } => {
            out.write_u8(8)?;
            out.write_u16::<Endian>(*offset)?;
        }
    }
    Ok(())
}

fn write_annotations(out: &mut Vec<u8>, annotations: &[Annotation]) -> Result<()> {
    out.write_u16::<Endian>(count("annotations", annotations.len())?)?;
    for annotation in annotations {
        write_annotation(out, annotation)?;
    }
    Ok(())
}

fn write_annotation(out: &mut Vec<u8>, annotation: &Annotation) -> Result<()> {
    out.write_u16::<Endian>(annotation.type_index)?;
    out.write_u16::<Endian>(count("element value pairs", annotation.elements.len())?)?;
    for pair in &annotation.elements {
        out.write_u16::<Endian>(pair.name_index)?;
        write_element_value(out, &pair.value)?;
    }
    Ok(())
}

fn write_element_value(out: &mut Vec<u8>, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Const { tag, index } => {
            out.write_u8(*tag)?;
            out.write_u16::<Endian>(*index)?;
        }
        ElementValue::Enum {
            type_name_index,
            const_name_index,
        } => {
            out.write_u8(b'e')?;
            out.write_u16::<Endian>(*type_name_index)?;
            out.write_u16::<Endian>(*const_name_index)?;
        }
        ElementValue::Class { class_info_index } => {
            out.write_u8(b'c')?;
            out.write_u16::<Endian>(*class_info_index)?;
        }
        ElementValue::Annotation(annotation) => {
            out.write_u8(b'@')?;
            write_annotation(out, annotation)?;
        }
        ElementValue::Array(values) => {
            out.write_u8(b'[')?;
            out.write_u16::<Endian>(count("element values", values.len())?)?;
            for value in values {
                write_element_value(out, value)?;
            }
        }
    }
    Ok(())
}
