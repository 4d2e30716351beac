use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    annotation::{self, Annotation, ElementValue, ElementValuePair},
    attributes::{
        Attribute, AttributeInfo, Attributes, BootstrapMethod, CodeAttribute,
        ExceptionTableEntry, InnerClass, LineNumber, LocalVariable, MethodParameter,
        RecordComponent, StackMapFrame, VerificationType,
    },
    class_file::{FieldInfo, MethodInfo},
    constant_pool::{
        self, tags, ClassInfo, CpInfo, DynamicInfo, MethodHandleInfo, MethodTypeInfo,
        NameAndTypeInfo, RefInfo,
    },
    instruction, AccessFlags, ClassFile, ClassFileError, ConstantPool, Result, MAGIC,
    MAX_MAJOR_VERSION,
};

type Endian = BigEndian;

const MIN_MAJOR_VERSION: u16 = 45;
/// Arrays and annotations inside an element value may nest this deep.
const MAX_ANNOTATION_NESTING: usize = 256;

/// Single-pass reader over a class file held in memory.
pub struct Parser<'a> {
    r: Cursor<&'a [u8]>,
    /// Offset of `r`'s first byte within the enclosing input, for error reporting.
    base: usize,
}
impl<'a> Parser<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    pub(crate) fn at(bytes: &'a [u8], base: usize) -> Self {
        Self {
            r: Cursor::new(bytes),
            base,
        }
    }

    pub fn parse(&mut self) -> Result<ClassFile> {
        self.parse_magic_identifier()?;
        let (major_version, minor_version) = self.parse_version()?;

        let constant_pool = self.parse_constant_pool()?;
        constant_pool.validate()?;

        let access_flags = AccessFlags::from_bits_truncate(self.read_u16()?);
        let this_class = self.read_u16()?;
        constant_pool.class_name(this_class)?;
        let super_class = self.read_u16()?;
        if super_class != 0 {
            constant_pool.class_name(super_class)?;
        }

        let interfaces = self.read_u16_table()?;

        let fields_count = self.read_u16()?;
        self.ensure_remaining(fields_count as usize * 8)?;
        let fields = (0..fields_count)
            .map(|_| self.parse_field_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let methods_count = self.read_u16()?;
        self.ensure_remaining(methods_count as usize * 8)?;
        let methods = (0..methods_count)
            .map(|_| self.parse_method_info(&constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let attributes = self.parse_attributes(&constant_pool)?;
        constant_pool
            .validate_bootstrap_methods(attributes.bootstrap_methods().unwrap_or_default())?;

        if self.remaining() > 0 {
            return Err(ClassFileError::TrailingData {
                offset: self.offset(),
            });
        }

        log::debug!(
            "Parsed {} (version {}.{}, {} pool slots, {} fields, {} methods)",
            constant_pool.class_name(this_class)?,
            major_version,
            minor_version,
            constant_pool.len(),
            fields.len(),
            methods.len()
        );

        Ok(ClassFile {
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

    fn parse_field_info(&mut self, constant_pool: &ConstantPool) -> Result<FieldInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.read_u16()?);
        let name_index = self.read_u16()?;
        let descriptor_index = self.read_u16()?;
        let attributes = self.parse_attributes(constant_pool)?;

        log::trace!(
            "Field {} {}",
            constant_pool.utf8_lossy(name_index)?,
            constant_pool.utf8_lossy(descriptor_index)?
        );

        Ok(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_method_info(&mut self, constant_pool: &ConstantPool) -> Result<MethodInfo> {
        let access_flags = AccessFlags::from_bits_truncate(self.read_u16()?);
        let name_index = self.read_u16()?;
        let descriptor_index = self.read_u16()?;
        let attributes = self.parse_attributes(constant_pool)?;

        log::trace!(
            "Method {}{}",
            constant_pool.utf8_lossy(name_index)?,
            constant_pool.utf8_lossy(descriptor_index)?
        );

        Ok(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    fn parse_magic_identifier(&mut self) -> Result<()> {
        match self.read_u32()? {
            MAGIC => Ok(()),
            magic_identifier => Err(ClassFileError::InvalidMagic(magic_identifier)),
        }
    }

    fn parse_version(&mut self) -> Result<(u16, u16)> {
        let minor = self.read_u16()?;
        let major = self.read_u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
            return Err(ClassFileError::UnsupportedVersion { major, minor });
        }
        Ok((major, minor))
    }

    pub(crate) fn parse_constant_pool(&mut self) -> Result<ConstantPool> {
        let constant_pool_count = self.read_u16()?;
        if constant_pool_count == 0 {
            return Err(ClassFileError::MalformedPoolEntry {
                index: 0,
                reason: "constant_pool_count must be at least 1".into(),
            });
        }
        // Every entry takes at least three bytes per slot.
        self.ensure_remaining((constant_pool_count as usize - 1) * 3)?;

        let mut res = ConstantPool::default();
        let mut index = 1;
        while index < constant_pool_count {
            let cp_info = self.parse_cp_info(index)?;
            let slots = cp_info.slots() as u16;
            if index as u32 + slots as u32 > constant_pool_count as u32 {
                return Err(ClassFileError::MalformedPoolEntry {
                    index,
                    reason: format!("{} entry in the last slot", cp_info.kind_name()),
                });
            }

            res.push(cp_info);
            if slots == 2 {
                res.push(CpInfo::Unusable);
            }
            index += slots;
        }
        Ok(res)
    }

    fn parse_cp_info(&mut self, index: u16) -> Result<CpInfo> {
        let tag = self.read_u8()?;
        let cp_info = match tag {
            tags::UTF8 => self.parse_utf8(index)?,
            tags::INTEGER => CpInfo::Integer(self.read_i32()?),
            tags::FLOAT => CpInfo::Float(f32::from_bits(self.read_u32()?)),
            tags::LONG => CpInfo::Long(self.read_i64()?),
            tags::DOUBLE => CpInfo::Double(f64::from_bits(self.read_u64()?)),
            tags::CLASS => CpInfo::Class(ClassInfo {
                name_index: self.read_u16()?,
            }),
            tags::STRING => CpInfo::String {
                string_index: self.read_u16()?,
            },
            tags::FIELD_REF => CpInfo::FieldRef(self.parse_ref_info()?),
            tags::METHOD_REF => CpInfo::MethodRef(self.parse_ref_info()?),
            tags::INTERFACE_METHOD_REF => CpInfo::InterfaceMethodRef(self.parse_ref_info()?),
            tags::NAME_AND_TYPE => CpInfo::NameAndType(NameAndTypeInfo {
                name_index: self.read_u16()?,
                descriptor_index: self.read_u16()?,
            }),
            tags::METHOD_HANDLE => CpInfo::MethodHandle(MethodHandleInfo {
                reference_kind: self.read_u8()?,
                reference_index: self.read_u16()?,
            }),
            tags::METHOD_TYPE => CpInfo::MethodType(MethodTypeInfo {
                descriptor_index: self.read_u16()?,
            }),
            tags::DYNAMIC => CpInfo::Dynamic(self.parse_dynamic_info()?),
            tags::INVOKE_DYNAMIC => CpInfo::InvokeDynamic(self.parse_dynamic_info()?),
            tags::MODULE => CpInfo::Module {
                name_index: self.read_u16()?,
            },
            tags::PACKAGE => CpInfo::Package {
                name_index: self.read_u16()?,
            },
            _ => {
                return Err(ClassFileError::MalformedPoolEntry {
                    index,
                    reason: format!("unknown tag {}", tag),
                })
            }
        };

        Ok(cp_info)
    }

    fn parse_utf8(&mut self, index: u16) -> Result<CpInfo> {
        let length = self.read_u16()?;
        let bytes = self.take(length as usize)?;
        if let Ok(s) = cesu8::from_java_cesu8(bytes) {
            return Ok(CpInfo::Utf8(s.into_owned()));
        }

        // Unpaired surrogates are legal here but have no `String` form.
        let units = constant_pool::decode_modified_utf8(bytes).ok_or_else(|| {
            ClassFileError::MalformedPoolEntry {
                index,
                reason: "invalid modified UTF-8".into(),
            }
        })?;
        match String::from_utf16(&units) {
            Ok(s) if *cesu8::to_java_cesu8(&s) == *bytes => Ok(CpInfo::Utf8(s)),
            _ => Ok(CpInfo::Utf8Unpaired(units)),
        }
    }

    fn parse_ref_info(&mut self) -> Result<RefInfo> {
        let class_index = self.read_u16()?;
        let name_and_type_index = self.read_u16()?;

        Ok(RefInfo {
            class_index,
            name_and_type_index,
        })
    }

    fn parse_dynamic_info(&mut self) -> Result<DynamicInfo> {
        let bootstrap_method_attr_index = self.read_u16()?;
        let name_and_type_index = self.read_u16()?;

        Ok(DynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
    }

    fn parse_attributes(&mut self, constant_pool: &ConstantPool) -> Result<Attributes> {
        let attributes_count = self.read_u16()?;
        self.ensure_remaining(attributes_count as usize * 6)?;
        (0..attributes_count)
            .map(|_| self.parse_attribute(constant_pool))
            .collect::<Result<Vec<_>>>()
            .map(Attributes)
    }

    fn parse_attribute(&mut self, constant_pool: &ConstantPool) -> Result<Attribute> {
        let name_index = self.read_u16()?;
        let attribute_length = self.read_u32()?;
        let payload_offset = self.offset();
        let payload = self.take(attribute_length as usize)?;
        let name = constant_pool.utf8(name_index)?;

        let info = Parser::at(payload, payload_offset)
            .parse_attribute_info(name, constant_pool)
            .map_err(|e| match e {
                ClassFileError::TruncatedInput { offset } => ClassFileError::MalformedAttribute {
                    name: name.to_owned(),
                    reason: format!("payload ends early at byte offset {}", offset),
                },
                e => e,
            })?;

        Ok(Attribute { name_index, info })
    }

    /// Decodes a whole attribute payload; known attributes must consume all of it.
    fn parse_attribute_info(
        &mut self,
        name: &str,
        constant_pool: &ConstantPool,
    ) -> Result<AttributeInfo> {
        let info = match name {
            "Code" => AttributeInfo::Code(self.parse_code_attribute(constant_pool)?),
            "ConstantValue" => AttributeInfo::ConstantValue {
                constantvalue_index: self.read_u16()?,
            },
            "Exceptions" => AttributeInfo::Exceptions(self.read_u16_table()?),
            "SourceFile" => AttributeInfo::SourceFile {
                sourcefile_index: self.read_u16()?,
            },
            "Signature" => AttributeInfo::Signature {
                signature_index: self.read_u16()?,
            },
            "LineNumberTable" => AttributeInfo::LineNumberTable(self.parse_line_numbers()?),
            "LocalVariableTable" => {
                AttributeInfo::LocalVariableTable(self.parse_local_variables()?)
            }
            "LocalVariableTypeTable" => {
                AttributeInfo::LocalVariableTypeTable(self.parse_local_variables()?)
            }
            "StackMapTable" => AttributeInfo::StackMapTable(self.parse_stack_map_frames()?),
            "InnerClasses" => AttributeInfo::InnerClasses(self.parse_inner_classes()?),
            "EnclosingMethod" => AttributeInfo::EnclosingMethod {
                class_index: self.read_u16()?,
                method_index: self.read_u16()?,
            },
            "BootstrapMethods" => {
                AttributeInfo::BootstrapMethods(self.parse_bootstrap_methods()?)
            }
            "NestHost" => AttributeInfo::NestHost {
                host_class_index: self.read_u16()?,
            },
            "NestMembers" => AttributeInfo::NestMembers(self.read_u16_table()?),
            "PermittedSubclasses" => AttributeInfo::PermittedSubclasses(self.read_u16_table()?),
            "MethodParameters" => {
                AttributeInfo::MethodParameters(self.parse_method_parameters()?)
            }
            "Deprecated" => AttributeInfo::Deprecated,
            "Synthetic" => AttributeInfo::Synthetic,
            "RuntimeVisibleAnnotations" => {
                AttributeInfo::RuntimeVisibleAnnotations(self.parse_annotations()?)
            }
            "RuntimeInvisibleAnnotations" => {
                AttributeInfo::RuntimeInvisibleAnnotations(self.parse_annotations()?)
            }
            "RuntimeVisibleParameterAnnotations" => {
                AttributeInfo::RuntimeVisibleParameterAnnotations(
                    self.parse_parameter_annotations()?,
                )
            }
            "RuntimeInvisibleParameterAnnotations" => {
                AttributeInfo::RuntimeInvisibleParameterAnnotations(
                    self.parse_parameter_annotations()?,
                )
            }
            "AnnotationDefault" => AttributeInfo::AnnotationDefault(self.parse_element_value(0)?),
            "Record" => AttributeInfo::Record(self.parse_record_components(constant_pool)?),
            "SourceDebugExtension" => {
                AttributeInfo::SourceDebugExtension(self.take(self.remaining())?.to_vec())
            }
            _ => {
                log::trace!("Keeping unknown attribute {} as raw bytes", name);
                let rest = self.take(self.remaining())?;
                return Ok(AttributeInfo::Raw(rest.to_vec()));
            }
        };

        if self.remaining() > 0 {
            return Err(ClassFileError::MalformedAttribute {
                name: name.to_owned(),
                reason: format!("{} unread bytes at offset {}", self.remaining(), self.offset()),
            });
        }
        Ok(info)
    }

    /// Parses the payload of a `Code` attribute (everything after
    /// `attribute_length`).
    pub fn parse_code_attribute(&mut self, constant_pool: &ConstantPool) -> Result<CodeAttribute> {
        let max_stack = self.read_u16()?;
        let max_locals = self.read_u16()?;
        let code_length = self.read_u32()?;
        let code = self.take(code_length as usize)?;
        let instructions = instruction::decode(code, constant_pool)?;
        let exception_table_length = self.read_u16()?;
        self.ensure_remaining(exception_table_length as usize * 8)?;
        let exception_table = (0..exception_table_length)
            .map(|_| self.parse_exception_table_entry())
            .collect::<Result<Vec<_>>>()?;
        let attributes = self.parse_attributes(constant_pool)?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
        })
    }

    fn parse_exception_table_entry(&mut self) -> Result<ExceptionTableEntry> {
        let start_pc = self.read_u16()?;
        let end_pc = self.read_u16()?;
        let handler_pc = self.read_u16()?;
        let catch_type = self.read_u16()?;

        Ok(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        })
    }

    fn parse_line_numbers(&mut self) -> Result<Vec<LineNumber>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 4)?;
        (0..count)
            .map(|_| {
                Ok(LineNumber {
                    start_pc: self.read_u16()?,
                    line_number: self.read_u16()?,
                })
            })
            .collect()
    }

    fn parse_local_variables(&mut self) -> Result<Vec<LocalVariable>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 10)?;
        (0..count)
            .map(|_| {
                Ok(LocalVariable {
                    start_pc: self.read_u16()?,
                    length: self.read_u16()?,
                    name_index: self.read_u16()?,
                    descriptor_index: self.read_u16()?,
                    index: self.read_u16()?,
                })
            })
            .collect()
    }

    fn parse_stack_map_frames(&mut self) -> Result<Vec<StackMapFrame>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize)?;
        (0..count).map(|_| self.parse_stack_map_frame()).collect()
    }

    fn parse_stack_map_frame(&mut self) -> Result<StackMapFrame> {
        let offset = self.offset();
        let frame_type = self.read_u8()?;
        let frame = match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type as u16,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: frame_type as u16 - 64,
                stack: self.parse_verification_type()?,
            },
            247 => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: self.read_u16()?,
                stack: self.parse_verification_type()?,
            },
            248..=250 => StackMapFrame::Chop {
                offset_delta: self.read_u16()?,
                k: 251 - frame_type,
            },
            251 => StackMapFrame::SameExtended {
                offset_delta: self.read_u16()?,
            },
            252..=254 => {
                let offset_delta = self.read_u16()?;
                let locals = (0..frame_type - 251)
                    .map(|_| self.parse_verification_type())
                    .collect::<Result<Vec<_>>>()?;
                StackMapFrame::Append {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = self.read_u16()?;
                let locals = self.parse_verification_types()?;
                let stack = self.parse_verification_types()?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            _ => {
                return Err(ClassFileError::MalformedAttribute {
                    name: "StackMapTable".into(),
                    reason: format!("reserved frame type {} at offset {}", frame_type, offset),
                })
            }
        };
        Ok(frame)
    }

    fn parse_verification_types(&mut self) -> Result<Vec<VerificationType>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize)?;
        (0..count).map(|_| self.parse_verification_type()).collect()
    }

    fn parse_verification_type(&mut self) -> Result<VerificationType> {
        let offset = self.offset();
        Ok(match self.read_u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object {
                cpool_index: self.read_u16()?,
            },
            8 => VerificationType::Uninitialized {
                offset: self.read_u16()?,
            },
            tag => {
                return Err(ClassFileError::MalformedAttribute {
                    name: "StackMapTable".into(),
                    reason: format!("unknown verification type {} at offset {}", tag, offset),
                })
            }
        })
    }

    fn parse_inner_classes(&mut self) -> Result<Vec<InnerClass>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 8)?;
        (0..count)
            .map(|_| {
                Ok(InnerClass {
                    inner_class_info_index: self.read_u16()?,
                    outer_class_info_index: self.read_u16()?,
                    inner_name_index: self.read_u16()?,
                    inner_class_access_flags: AccessFlags::from_bits_truncate(self.read_u16()?),
                })
            })
            .collect()
    }

    fn parse_bootstrap_methods(&mut self) -> Result<Vec<BootstrapMethod>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 4)?;
        (0..count)
            .map(|_| {
                Ok(BootstrapMethod {
                    bootstrap_method_ref: self.read_u16()?,
                    bootstrap_arguments: self.read_u16_table()?,
                })
            })
            .collect()
    }

    fn parse_record_components(
        &mut self,
        constant_pool: &ConstantPool,
    ) -> Result<Vec<RecordComponent>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 6)?;
        (0..count)
            .map(|_| {
                Ok(RecordComponent {
                    name_index: self.read_u16()?,
                    descriptor_index: self.read_u16()?,
                    attributes: self.parse_attributes(constant_pool)?,
                })
            })
            .collect()
    }

    fn parse_method_parameters(&mut self) -> Result<Vec<MethodParameter>> {
        let count = self.read_u8()?;
        self.ensure_remaining(count as usize * 4)?;
        (0..count)
            .map(|_| {
                Ok(MethodParameter {
                    name_index: self.read_u16()?,
                    access_flags: AccessFlags::from_bits_truncate(self.read_u16()?),
                })
            })
            .collect()
    }

    fn parse_parameter_annotations(&mut self) -> Result<Vec<Vec<Annotation>>> {
        let num_parameters = self.read_u8()?;
        (0..num_parameters)
            .map(|_| self.parse_annotations())
            .collect()
    }

    fn parse_annotations(&mut self) -> Result<Vec<Annotation>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 4)?;
        (0..count).map(|_| self.parse_annotation(0)).collect()
    }

    fn parse_annotation(&mut self, nesting: usize) -> Result<Annotation> {
        let type_index = self.read_u16()?;
        let num_element_value_pairs = self.read_u16()?;
        let elements = (0..num_element_value_pairs)
            .map(|_| {
                Ok(ElementValuePair {
                    name_index: self.read_u16()?,
                    value: self.parse_element_value(nesting)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Annotation {
            type_index,
            elements,
        })
    }

    fn parse_element_value(&mut self, nesting: usize) -> Result<ElementValue> {
        let offset = self.offset();
        let tag = self.read_u8()?;
        if matches!(tag, b'@' | b'[') && nesting >= MAX_ANNOTATION_NESTING {
            return Err(ClassFileError::MalformedAttribute {
                name: "annotation".into(),
                reason: format!(
                    "element values nested deeper than {} at offset {}",
                    MAX_ANNOTATION_NESTING, offset
                ),
            });
        }
        Ok(match tag {
            _ if annotation::is_const_tag(tag) => ElementValue::Const {
                tag,
                index: self.read_u16()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: self.read_u16()?,
                const_name_index: self.read_u16()?,
            },
            b'c' => ElementValue::Class {
                class_info_index: self.read_u16()?,
            },
            b'@' => ElementValue::Annotation(self.parse_annotation(nesting + 1)?),
            b'[' => {
                let num_values = self.read_u16()?;
                ElementValue::Array(
                    (0..num_values)
                        .map(|_| self.parse_element_value(nesting + 1))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            _ => {
                return Err(ClassFileError::MalformedAttribute {
                    name: "annotation".into(),
                    reason: format!(
                        "unknown element value tag {:?} at offset {}",
                        tag as char, offset
                    ),
                })
            }
        })
    }

    /// A `u2` count followed by that many `u2` values.
    fn read_u16_table(&mut self) -> Result<Vec<u16>> {
        let count = self.read_u16()?;
        self.ensure_remaining(count as usize * 2)?;
        (0..count).map(|_| self.read_u16()).collect()
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.r.position() as usize
    }

    pub(crate) fn remaining(&self) -> usize {
        self.r.get_ref().len().saturating_sub(self.r.position() as usize)
    }

    pub(crate) fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(ClassFileError::TruncatedInput {
                offset: self.offset(),
            });
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure_remaining(n)?;
        let bytes: &'a [u8] = *self.r.get_ref();
        let start = self.r.position() as usize;
        self.r.set_position((start + n) as u64);
        Ok(&bytes[start..start + n])
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let offset = self.offset();
        self.r
            .read_u64::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        let offset = self.offset();
        self.r
            .read_i64::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let offset = self.offset();
        self.r
            .read_u32::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        let offset = self.offset();
        self.r
            .read_i32::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let offset = self.offset();
        self.r
            .read_u16::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16> {
        let offset = self.offset();
        self.r
            .read_i16::<Endian>()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let offset = self.offset();
        self.r
            .read_u8()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        let offset = self.offset();
        self.r
            .read_i8()
            .map_err(|_| ClassFileError::TruncatedInput { offset })
    }
}
