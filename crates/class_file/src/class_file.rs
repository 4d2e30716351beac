use std::io::Write;

use crate::{
    attributes::{AttributeInfo, Attributes, BootstrapMethod, CodeAttribute},
    constant_pool::ClassInfo,
    matches_cp_info,
    parser::Parser,
    writer::Writer,
    AccessFlags, ConstantPool, Result,
};

/// A parsed class file. Symbolic data stays in the constant pool and is
/// referenced by index, exactly as in the binary form.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Attributes,
}
impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<ClassFile> {
        Parser::new(bytes).parse()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.write(self)?;
        Ok(writer.into_inner())
    }

    pub fn write_to(&self, w: impl Write) -> Result<()> {
        Writer::new(w).write(self)
    }

    pub fn super_class(&self) -> Result<Option<&str>> {
        // If the value of the super_class item is zero, then this class file must represent the class Object,
        // the only class or interface without a direct superclass.
        if self.super_class == 0 {
            return Ok(None);
        }

        // Otherwise the constant_pool entry at that index must be a CONSTANT_Class_info structure
        // representing the direct superclass of the class defined by this class file.
        let ClassInfo { name_index } =
            matches_cp_info!(self.constant_pool, self.super_class, Class)?;

        Ok(Some(matches_cp_info!(
            self.constant_pool,
            *name_index,
            Utf8
        )?))
    }

    pub fn class_name(&self) -> Result<&str> {
        // The value of the this_class item must be a valid index into the constant_pool table.
        // The constant_pool entry at that index must be a CONSTANT_Class_info structure (§4.4.1)
        // representing the class or interface defined by this class file.

        let ClassInfo { name_index } =
            matches_cp_info!(self.constant_pool, self.this_class, Class)?;

        Ok(matches_cp_info!(self.constant_pool, *name_index, Utf8)?)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    pub fn field_name(&self, field: &FieldInfo) -> Result<&str> {
        self.constant_pool.utf8(field.name_index)
    }

    pub fn field_descriptor(&self, field: &FieldInfo) -> Result<&str> {
        self.constant_pool.utf8(field.descriptor_index)
    }

    pub fn method_name(&self, method: &MethodInfo) -> Result<&str> {
        self.constant_pool.utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<&str> {
        self.constant_pool.utf8(method.descriptor_index)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|method| {
            self.method_name(method).ok() == Some(name)
                && self.method_descriptor(method).ok() == Some(descriptor)
        })
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| {
            self.field_name(field).ok() == Some(name)
                && self.field_descriptor(field).ok() == Some(descriptor)
        })
    }

    pub fn source_file(&self) -> Result<Option<&str>> {
        self.attributes
            .iter()
            .find_map(|a| match a.info {
                AttributeInfo::SourceFile { sourcefile_index } => Some(sourcefile_index),
                _ => None,
            })
            .map(|index| self.constant_pool.utf8(index))
            .transpose()
    }

    /// The class's BootstrapMethods table, empty when it has none.
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        self.attributes.bootstrap_methods().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}
impl MethodInfo {
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.code()
    }
}
