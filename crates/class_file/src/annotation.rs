use crate::{matches_cp_info, ClassFileError, ConstantPool, Result};

/// An `annotation` structure, holding pool indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Utf8 entry holding the annotation type as a field descriptor.
    pub type_index: u16,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
    pub name_index: u16,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Tags `B C D F I J S Z s`; `index` points at the constant (a Utf8 for `s`).
    Const { tag: u8, index: u16 },
    Enum {
        type_name_index: u16,
        const_name_index: u16,
    },
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

/// An annotation with every pool reference resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAnnotation {
    pub type_descriptor: String,
    pub elements: Vec<(String, AnnotationValue)>,
}

impl ResolvedAnnotation {
    pub fn element(&self, name: &str) -> Option<&AnnotationValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    /// A UTF-16 code unit, which may be a lone surrogate.
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    Enum { type_descriptor: String, constant: String },
    Annotation(ResolvedAnnotation),
    Array(Vec<AnnotationValue>),
}

impl std::fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationValue::Boolean(v) => write!(f, "{}", v),
            AnnotationValue::Byte(v) => write!(f, "{}", v),
            AnnotationValue::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "{:?}", c),
                None => write!(f, "'\\u{{{:04X}}}'", v),
            },
            AnnotationValue::Short(v) => write!(f, "{}", v),
            AnnotationValue::Int(v) => write!(f, "{}", v),
            AnnotationValue::Long(v) => write!(f, "{}L", v),
            AnnotationValue::Float(v) => write!(f, "{}f", v),
            AnnotationValue::Double(v) => write!(f, "{}", v),
            AnnotationValue::String(v) => write!(f, "{:?}", v),
            AnnotationValue::Class(v) => write!(f, "{}.class", v),
            AnnotationValue::Enum {
                type_descriptor,
                constant,
            } => write!(f, "{}.{}", type_descriptor, constant),
            AnnotationValue::Annotation(a) => write!(f, "@{}", a.type_descriptor),
            AnnotationValue::Array(values) => {
                f.write_str("{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Annotation {
    pub fn resolve(&self, pool: &ConstantPool) -> Result<ResolvedAnnotation> {
        let elements = self
            .elements
            .iter()
            .map(|pair| Ok((pool.utf8(pair.name_index)?.to_owned(), pair.value.resolve(pool)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedAnnotation {
            type_descriptor: pool.utf8(self.type_index)?.to_owned(),
            elements,
        })
    }
}

impl ElementValue {
    pub fn resolve(&self, pool: &ConstantPool) -> Result<AnnotationValue> {
        Ok(match self {
            ElementValue::Const { tag, index } => resolve_const(*tag, *index, pool)?,
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => AnnotationValue::Enum {
                type_descriptor: pool.utf8(*type_name_index)?.to_owned(),
                constant: pool.utf8(*const_name_index)?.to_owned(),
            },
            ElementValue::Class { class_info_index } => {
                AnnotationValue::Class(pool.utf8(*class_info_index)?.to_owned())
            }
            ElementValue::Annotation(annotation) => {
                AnnotationValue::Annotation(annotation.resolve(pool)?)
            }
            ElementValue::Array(values) => AnnotationValue::Array(
                values
                    .iter()
                    .map(|value| value.resolve(pool))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

fn resolve_const(tag: u8, index: u16, pool: &ConstantPool) -> Result<AnnotationValue> {
    let int = || -> Result<i32> { Ok(*matches_cp_info!(pool, index, Integer)?) };

    Ok(match tag {
        b'Z' => AnnotationValue::Boolean(int()? != 0),
        b'B' => AnnotationValue::Byte(int()? as i8),
        b'C' => AnnotationValue::Char(int()? as u16),
        b'S' => AnnotationValue::Short(int()? as i16),
        b'I' => AnnotationValue::Int(int()?),
        b'J' => AnnotationValue::Long(*matches_cp_info!(pool, index, Long)?),
        b'F' => AnnotationValue::Float(*matches_cp_info!(pool, index, Float)?),
        b'D' => AnnotationValue::Double(*matches_cp_info!(pool, index, Double)?),
        b's' => AnnotationValue::String(pool.utf8_lossy(index)?.into_owned()),
        _ => {
            return Err(ClassFileError::MalformedAttribute {
                name: "annotation".into(),
                reason: format!("unknown element value tag {:?}", tag as char),
            })
        }
    })
}

/// Whether `tag` introduces a constant element value.
pub(crate) fn is_const_tag(tag: u8) -> bool {
    matches!(
        tag,
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's'
    )
}
