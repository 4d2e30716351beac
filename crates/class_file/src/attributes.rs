use crate::{
    annotation::{Annotation, ElementValue},
    constant_pool::CpInfo,
    AccessFlags, ConstantPool, Instruction,
};

/// An attribute with its payload decoded. Names the codec does not know are
/// kept as [`AttributeInfo::Raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: AttributeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    ConstantValue { constantvalue_index: u16 },
    Exceptions(Vec<u16>),
    SourceFile { sourcefile_index: u16 },
    Signature { signature_index: u16 },
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    /// Same layout as `LocalVariableTable`; `descriptor_index` holds a signature.
    LocalVariableTypeTable(Vec<LocalVariable>),
    StackMapTable(Vec<StackMapFrame>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod { class_index: u16, method_index: u16 },
    BootstrapMethods(Vec<BootstrapMethod>),
    NestHost { host_class_index: u16 },
    NestMembers(Vec<u16>),
    PermittedSubclasses(Vec<u16>),
    MethodParameters(Vec<MethodParameter>),
    Deprecated,
    Synthetic,
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
    Record(Vec<RecordComponent>),
    /// Free-form debugging text; the payload holds no pool indices.
    SourceDebugExtension(Vec<u8>),
    Raw(Vec<u8>),
}

impl AttributeInfo {
    /// The attribute name the payload is stored under, `None` for raw payloads.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self {
            AttributeInfo::Code(_) => "Code",
            AttributeInfo::ConstantValue { .. } => "ConstantValue",
            AttributeInfo::Exceptions(_) => "Exceptions",
            AttributeInfo::SourceFile { .. } => "SourceFile",
            AttributeInfo::Signature { .. } => "Signature",
            AttributeInfo::LineNumberTable(_) => "LineNumberTable",
            AttributeInfo::LocalVariableTable(_) => "LocalVariableTable",
            AttributeInfo::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            AttributeInfo::StackMapTable(_) => "StackMapTable",
            AttributeInfo::InnerClasses(_) => "InnerClasses",
            AttributeInfo::EnclosingMethod { .. } => "EnclosingMethod",
            AttributeInfo::BootstrapMethods(_) => "BootstrapMethods",
            AttributeInfo::NestHost { .. } => "NestHost",
            AttributeInfo::NestMembers(_) => "NestMembers",
            AttributeInfo::PermittedSubclasses(_) => "PermittedSubclasses",
            AttributeInfo::MethodParameters(_) => "MethodParameters",
            AttributeInfo::Deprecated => "Deprecated",
            AttributeInfo::Synthetic => "Synthetic",
            AttributeInfo::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            AttributeInfo::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            AttributeInfo::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            AttributeInfo::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            AttributeInfo::AnnotationDefault(_) => "AnnotationDefault",
            AttributeInfo::Record(_) => "Record",
            AttributeInfo::SourceDebugExtension(_) => "SourceDebugExtension",
            AttributeInfo::Raw(_) => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(pub Vec<Attribute>);
impl Attributes {
    pub fn find_by_name(&self, name: &str, constant_pool: &ConstantPool) -> Option<&Attribute> {
        for a in &self.0 {
            let Ok(CpInfo::Utf8(ref s)) = constant_pool.get(a.name_index) else {
                continue;
            };

            if s == name {
                return Some(a);
            }
        }

        None
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn line_numbers(&self) -> Option<&[LineNumber]> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::LineNumberTable(lines) => Some(lines.as_slice()),
            _ => None,
        })
    }

    pub fn local_variable_table(&self) -> Option<&[LocalVariable]> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::LocalVariableTable(vars) => Some(vars.as_slice()),
            _ => None,
        })
    }

    pub fn runtime_visible_annotations(&self) -> Option<&[Annotation]> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::RuntimeVisibleAnnotations(annotations) => Some(annotations.as_slice()),
            _ => None,
        })
    }

    pub fn bootstrap_methods(&self) -> Option<&[BootstrapMethod]> {
        self.iter().find_map(|a| match &a.info {
            AttributeInfo::BootstrapMethods(methods) => Some(methods.as_slice()),
            _ => None,
        })
    }
}
impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Class entry of the caught type, 0 for a catch-all (`finally`) handler.
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// A `stack_map_frame`. Offsets are kept as deltas, the way they are stored.
///
/// The `*Extended` variants are the two-byte-delta encodings (frame types 251
/// and 247). They are kept apart from the compact ones so that a frame is
/// written back with the type byte it was read with, even when its delta
/// would fit the compact form.
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    Same {
        offset_delta: u16,
    },
    SameExtended {
        offset_delta: u16,
    },
    SameLocals1StackItem {
        offset_delta: u16,
        stack: VerificationType,
    },
    SameLocals1StackItemExtended {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        offset_delta: u16,
        k: u8,
    },
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub(crate) fn set_offset_delta(&mut self, delta: u16) {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. }
            | StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta = delta,
        }
    }

    pub(crate) fn verification_types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            StackMapFrame::Same { .. }
            | StackMapFrame::SameExtended { .. }
            | StackMapFrame::Chop { .. } => Vec::new(),
            StackMapFrame::SameLocals1StackItem { stack, .. }
            | StackMapFrame::SameLocals1StackItemExtended { stack, .. } => vec![stack],
            StackMapFrame::Append { locals, .. } => locals.iter_mut().collect(),
            StackMapFrame::Full { locals, stack, .. } => {
                locals.iter_mut().chain(stack.iter_mut()).collect()
            }
        }
    }
}

/// Absolute bytecode offsets of the frames of a StackMapTable.
pub fn frame_offsets(frames: &[StackMapFrame]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(frames.len());
    let mut previous: Option<u32> = None;
    for frame in frames {
        let offset = match previous {
            None => frame.offset_delta() as u32,
            Some(p) => p + frame.offset_delta() as u32 + 1,
        };
        offsets.push(offset);
        previous = Some(offset);
    }
    offsets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object { cpool_index: u16 },
    /// Offset of the `new` instruction that created the value.
    Uninitialized { offset: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: AccessFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodParameter {
    /// 0 when the parameter has no name.
    pub name_index: u16,
    pub access_flags: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    pub bootstrap_arguments: Vec<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_offsets() {
        let frames = vec![
            StackMapFrame::Same { offset_delta: 5 },
            StackMapFrame::Chop {
                offset_delta: 2,
                k: 1,
            },
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 0,
                stack: VerificationType::Integer,
            },
        ];
        assert_eq!(vec![5, 8, 9], frame_offsets(&frames));
    }

    #[test]
    fn test_find_by_name() {
        let pool = ConstantPool::new(vec![
            CpInfo::Utf8("Deprecated".into()),
            CpInfo::Utf8("Custom".into()),
        ]);
        let attributes = Attributes(vec![
            Attribute {
                name_index: 1,
                info: AttributeInfo::Deprecated,
            },
            Attribute {
                name_index: 2,
                info: AttributeInfo::Raw(vec![1, 2, 3]),
            },
        ]);

        let custom = attributes.find_by_name("Custom", &pool).unwrap();
        assert_eq!(AttributeInfo::Raw(vec![1, 2, 3]), custom.info);
        assert!(attributes.find_by_name("Code", &pool).is_none());
        assert!(attributes.code().is_none());
    }
}
