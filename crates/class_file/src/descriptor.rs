use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::take_until,
    character::complete::char,
    combinator::{eof, map, value, verify},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

use crate::{ClassFileError, Result};

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    /// Local variable and operand stack slots taken by a value of this type.
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Source-level spelling, e.g. `int`, `java.lang.String[]`.
    pub fn display_name(&self) -> String {
        match self {
            FieldType::Byte => "byte".into(),
            FieldType::Char => "char".into(),
            FieldType::Double => "double".into(),
            FieldType::Float => "float".into(),
            FieldType::Int => "int".into(),
            FieldType::Long => "long".into(),
            FieldType::Short => "short".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Object(name) => name.replace('/', "."),
            FieldType::Array(component) => format!("{}[]", component.display_name()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        parse_method_descriptor(descriptor)
    }

    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.return_type.as_ref().map_or(0, FieldType::slots)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(return_type) => write!(f, "{}", return_type),
            None => f.write_str("V"),
        }
    }
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<FieldType> {
    terminated(field_type, eof)
        .parse(descriptor)
        .map(|(_, field_type)| field_type)
        .map_err(|_| ClassFileError::InvalidDescriptor(descriptor.to_owned()))
}

pub fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor> {
    terminated(method_descriptor, eof)
        .parse(descriptor)
        .map(|(_, method)| method)
        .map_err(|_| ClassFileError::InvalidDescriptor(descriptor.to_owned()))
}

fn method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, parameters) = delimited(char('('), many0(field_type), char(')')).parse(input)?;
    let (input, return_type) = alt((map(field_type, Some), value(None, char('V')))).parse(input)?;

    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

fn field_type(input: &str) -> IResult<&str, FieldType> {
    alt((base_type, object_type, array_type)).parse(input)
}

fn base_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        value(FieldType::Byte, char('B')),
        value(FieldType::Char, char('C')),
        value(FieldType::Double, char('D')),
        value(FieldType::Float, char('F')),
        value(FieldType::Int, char('I')),
        value(FieldType::Long, char('J')),
        value(FieldType::Short, char('S')),
        value(FieldType::Boolean, char('Z')),
    ))
    .parse(input)
}

fn object_type(input: &str) -> IResult<&str, FieldType> {
    map(
        delimited(
            char('L'),
            verify(take_until(";"), |name: &str| !name.is_empty()),
            char(';'),
        ),
        |name: &str| FieldType::Object(name.to_owned()),
    )
    .parse(input)
}

fn array_type(input: &str) -> IResult<&str, FieldType> {
    map(preceded(char('['), field_type), |component| {
        FieldType::Array(Box::new(component))
    })
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_descriptors() {
        assert_eq!(FieldType::Int, parse_field_descriptor("I").unwrap());
        assert_eq!(
            FieldType::Array(Box::new(FieldType::Object("java/lang/String".into()))),
            parse_field_descriptor("[Ljava/lang/String;").unwrap()
        );
        assert!(parse_field_descriptor("V").is_err());
        assert!(parse_field_descriptor("II").is_err());
        assert!(parse_field_descriptor("L;").is_err());
    }

    #[test]
    fn test_method_descriptor_slots() {
        let method = parse_method_descriptor("(IJLjava/lang/Object;[D)D").unwrap();
        assert_eq!(4, method.parameters.len());
        assert_eq!(5, method.parameter_slots());
        assert_eq!(2, method.return_slots());
        assert_eq!("(IJLjava/lang/Object;[D)D", method.to_string());
    }

    #[test]
    fn test_void_method() {
        let method = parse_method_descriptor("()V").unwrap();
        assert!(method.parameters.is_empty());
        assert_eq!(None, method.return_type);
        assert!(parse_method_descriptor("(V)V").is_err());
    }

    #[test]
    fn test_display_name() {
        let field_type = parse_field_descriptor("[[Ljava/util/List;").unwrap();
        assert_eq!("java.util.List[][]", field_type.display_name());
    }
}
