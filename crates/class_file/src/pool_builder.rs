use std::collections::HashMap;

use crate::{
    attributes::BootstrapMethod,
    constant_pool::{
        encode_cp_info, ClassInfo, DynamicInfo, MethodHandleInfo, MethodTypeInfo,
        NameAndTypeInfo, RefInfo,
    },
    ClassFileError, ConstantPool, CpInfo, Result,
};

/// Longest chain of references [`ConstantPoolBuilder::import`] follows.
const MAX_IMPORT_DEPTH: usize = 256;

/// Builds a constant pool, handing out the existing index when an equal
/// entry is requested again.
///
/// Entries are compared on their encoded form, so `0.0` and `-0.0` (or two
/// NaNs with different payloads) stay distinct.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    pool: ConstantPool,
    lookup: HashMap<Vec<u8>, u16>,
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_lookup: HashMap<BootstrapMethod, u16>,
}
impl ConstantPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entries allocated so far.
    pub fn as_pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn has_bootstrap_methods(&self) -> bool {
        !self.bootstrap_methods.is_empty()
    }

    pub fn finish(self) -> (ConstantPool, Vec<BootstrapMethod>) {
        (self.pool, self.bootstrap_methods)
    }

    fn add(&mut self, cp_info: CpInfo) -> Result<u16> {
        let mut key = Vec::new();
        encode_cp_info(&cp_info, &mut key)?;
        if let Some(index) = self.lookup.get(&key) {
            return Ok(*index);
        }

        // constant_pool_count is a u2 holding the number of slots plus one.
        if self.pool.len() + cp_info.slots() >= u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow);
        }
        let index = self.pool.len() as u16 + 1;
        let slots = cp_info.slots();
        self.pool.push(cp_info);
        if slots == 2 {
            self.pool.push(CpInfo::Unusable);
        }
        self.lookup.insert(key, index);

        Ok(index)
    }

    pub fn utf8(&mut self, s: &str) -> Result<u16> {
        self.add(CpInfo::Utf8(s.to_owned()))
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.add(CpInfo::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16> {
        self.add(CpInfo::Float(value))
    }

    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.add(CpInfo::Long(value))
    }

    pub fn double(&mut self, value: f64) -> Result<u16> {
        self.add(CpInfo::Double(value))
    }

    /// A Class entry for an internal name such as `java/lang/String` or an
    /// array descriptor such as `[I`.
    pub fn class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        self.add(CpInfo::Class(ClassInfo { name_index }))
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.utf8(value)?;
        self.add(CpInfo::String { string_index })
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        let descriptor_index = self.utf8(descriptor)?;
        self.add(CpInfo::NameAndType(NameAndTypeInfo {
            name_index,
            descriptor_index,
        }))
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let ref_info = self.ref_info(owner, name, descriptor)?;
        self.add(CpInfo::FieldRef(ref_info))
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let ref_info = self.ref_info(owner, name, descriptor)?;
        self.add(CpInfo::MethodRef(ref_info))
    }

    pub fn interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let ref_info = self.ref_info(owner, name, descriptor)?;
        self.add(CpInfo::InterfaceMethodRef(ref_info))
    }

    fn ref_info(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<RefInfo> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        Ok(RefInfo {
            class_index,
            name_and_type_index,
        })
    }

    /// `reference_index` must already belong to this pool.
    pub fn method_handle(&mut self, reference_kind: u8, reference_index: u16) -> Result<u16> {
        self.add(CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind,
            reference_index,
        }))
    }

    pub fn method_type(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor_index = self.utf8(descriptor)?;
        self.add(CpInfo::MethodType(MethodTypeInfo { descriptor_index }))
    }

    pub fn dynamic(
        &mut self,
        bootstrap_method: BootstrapMethod,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let info = self.dynamic_info(bootstrap_method, name, descriptor)?;
        self.add(CpInfo::Dynamic(info))
    }

    pub fn invoke_dynamic(
        &mut self,
        bootstrap_method: BootstrapMethod,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let info = self.dynamic_info(bootstrap_method, name, descriptor)?;
        self.add(CpInfo::InvokeDynamic(info))
    }

    fn dynamic_info(
        &mut self,
        bootstrap_method: BootstrapMethod,
        name: &str,
        descriptor: &str,
    ) -> Result<DynamicInfo> {
        let bootstrap_method_attr_index = self.bootstrap_method(bootstrap_method)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        Ok(DynamicInfo {
            bootstrap_method_attr_index,
            name_and_type_index,
        })
    }

    pub fn module(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        self.add(CpInfo::Module { name_index })
    }

    pub fn package(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8(name)?;
        self.add(CpInfo::Package { name_index })
    }

    /// Index of `bootstrap_method` in the BootstrapMethods table, whose entries
    /// must already refer to this pool.
    pub fn bootstrap_method(&mut self, bootstrap_method: BootstrapMethod) -> Result<u16> {
        if let Some(index) = self.bootstrap_lookup.get(&bootstrap_method) {
            return Ok(*index);
        }
        let index = u16::try_from(self.bootstrap_methods.len()).map_err(|_| {
            ClassFileError::TooManyEntries {
                table: "BootstrapMethods",
                count: self.bootstrap_methods.len() + 1,
            }
        })?;
        self.bootstrap_methods.push(bootstrap_method.clone());
        self.bootstrap_lookup.insert(bootstrap_method, index);
        Ok(index)
    }

    /// Copies entry `index` of `pool`, and everything it refers to, into this
    /// pool. `bootstrap_methods` is the table of the class owning `pool`; the
    /// bootstrap methods of dynamic entries are copied along.
    pub fn import(
        &mut self,
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapMethod],
        index: u16,
    ) -> Result<u16> {
        self.import_nested(pool, bootstrap_methods, index, 0)
    }

    fn import_nested(
        &mut self,
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapMethod],
        index: u16,
        depth: usize,
    ) -> Result<u16> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(ClassFileError::MalformedPoolEntry {
                index,
                reason: format!("references nested deeper than {}", MAX_IMPORT_DEPTH),
            });
        }
        let depth = depth + 1;
        match pool.get(index)? {
            CpInfo::Utf8(s) => self.utf8(s),
            CpInfo::Utf8Unpaired(units) => self.add(CpInfo::Utf8Unpaired(units.clone())),
            CpInfo::Integer(i) => self.integer(*i),
            CpInfo::Float(f) => self.float(*f),
            CpInfo::Long(l) => self.long(*l),
            CpInfo::Double(d) => self.double(*d),
            CpInfo::Class(ClassInfo { name_index }) => self.class(pool.utf8(*name_index)?),
            CpInfo::String { string_index } => {
                let string_index = self.import_nested(pool, bootstrap_methods, *string_index, depth)?;
                self.add(CpInfo::String { string_index })
            }
            CpInfo::NameAndType(NameAndTypeInfo {
                name_index,
                descriptor_index,
            }) => self.name_and_type(pool.utf8(*name_index)?, pool.utf8(*descriptor_index)?),
            CpInfo::FieldRef(r) => {
                let r = self.import_ref(pool, bootstrap_methods, r, depth)?;
                self.add(CpInfo::FieldRef(r))
            }
            CpInfo::MethodRef(r) => {
                let r = self.import_ref(pool, bootstrap_methods, r, depth)?;
                self.add(CpInfo::MethodRef(r))
            }
            CpInfo::InterfaceMethodRef(r) => {
                let r = self.import_ref(pool, bootstrap_methods, r, depth)?;
                self.add(CpInfo::InterfaceMethodRef(r))
            }
            CpInfo::MethodHandle(MethodHandleInfo {
                reference_kind,
                reference_index,
            }) => {
                let reference_index = self.import_nested(pool, bootstrap_methods, *reference_index, depth)?;
                self.method_handle(*reference_kind, reference_index)
            }
            CpInfo::MethodType(MethodTypeInfo { descriptor_index }) => {
                self.method_type(pool.utf8(*descriptor_index)?)
            }
            CpInfo::Dynamic(d) => {
                let d = self.import_dynamic(pool, bootstrap_methods, index, d, depth)?;
                self.add(CpInfo::Dynamic(d))
            }
            CpInfo::InvokeDynamic(d) => {
                let d = self.import_dynamic(pool, bootstrap_methods, index, d, depth)?;
                self.add(CpInfo::InvokeDynamic(d))
            }
            CpInfo::Module { name_index } => self.module(pool.utf8(*name_index)?),
            CpInfo::Package { name_index } => self.package(pool.utf8(*name_index)?),
            CpInfo::Unusable => Err(ClassFileError::MalformedPoolEntry {
                index,
                reason: "second slot of a long or double".into(),
            }),
        }
    }

    /// Like [`import`](Self::import), with index 0 standing for "none".
    pub fn import_optional(
        &mut self,
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapMethod],
        index: u16,
    ) -> Result<u16> {
        if index == 0 {
            return Ok(0);
        }
        self.import(pool, bootstrap_methods, index)
    }

    fn import_ref(
        &mut self,
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapMethod],
        r: &RefInfo,
        depth: usize,
    ) -> Result<RefInfo> {
        Ok(RefInfo {
            class_index: self.import_nested(pool, bootstrap_methods, r.class_index, depth)?,
            name_and_type_index: self.import_nested(
                pool,
                bootstrap_methods,
                r.name_and_type_index,
                depth,
            )?,
        })
    }

    fn import_dynamic(
        &mut self,
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapMethod],
        index: u16,
        d: &DynamicInfo,
        depth: usize,
    ) -> Result<DynamicInfo> {
        let bootstrap_method = bootstrap_methods
            .get(d.bootstrap_method_attr_index as usize)
            .ok_or_else(|| ClassFileError::MalformedPoolEntry {
                index,
                reason: format!(
                    "bootstrap method {} is missing from BootstrapMethods",
                    d.bootstrap_method_attr_index
                ),
            })?;
        let imported = BootstrapMethod {
            bootstrap_method_ref: self.import_nested(
                pool,
                bootstrap_methods,
                bootstrap_method.bootstrap_method_ref,
                depth,
            )?,
            bootstrap_arguments: bootstrap_method
                .bootstrap_arguments
                .iter()
                .map(|argument| self.import_nested(pool, bootstrap_methods, *argument, depth))
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(DynamicInfo {
            bootstrap_method_attr_index: self.bootstrap_method(imported)?,
            name_and_type_index: self.import_nested(
                pool,
                bootstrap_methods,
                d.name_and_type_index,
                depth,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_constant_is_allocated_once() {
        let mut builder = ConstantPoolBuilder::new();
        let first = builder.string("hello").unwrap();
        let second = builder.string("hello").unwrap();

        assert_eq!(first, second);
        assert_eq!(2, builder.len());
        assert_eq!(1, builder.utf8("hello").unwrap());
    }

    #[test]
    fn test_kind_is_part_of_the_key() {
        let mut builder = ConstantPoolBuilder::new();
        let class = builder.class("java/lang/String").unwrap();
        let string = builder.string("java/lang/String").unwrap();
        assert_ne!(class, string);
        assert_eq!(3, builder.len());
    }

    #[test]
    fn test_long_takes_two_slots() {
        let mut builder = ConstantPoolBuilder::new();
        assert_eq!(1, builder.long(1).unwrap());
        assert_eq!(3, builder.integer(1).unwrap());
        assert_eq!(&CpInfo::Unusable, builder.as_pool().get(2).unwrap());
    }

    #[test]
    fn test_pool_overflow() {
        let mut builder = ConstantPoolBuilder::new();
        for i in 0..65534 {
            builder.integer(i).unwrap();
        }
        assert!(matches!(
            builder.integer(-1),
            Err(ClassFileError::PoolOverflow)
        ));
        // Already present entries are still found.
        assert_eq!(1, builder.integer(0).unwrap());
    }

    #[test]
    fn test_import_invoke_dynamic() {
        let mut source = ConstantPoolBuilder::new();
        source.utf8("padding").unwrap();
        let factory = source
            .method_ref(
                "java/lang/invoke/LambdaMetafactory",
                "metafactory",
                "()Ljava/lang/invoke/CallSite;",
            )
            .unwrap();
        let handle = source.method_handle(6, factory).unwrap();
        let argument = source.method_type("()V").unwrap();
        let call_site = source
            .invoke_dynamic(
                BootstrapMethod {
                    bootstrap_method_ref: handle,
                    bootstrap_arguments: vec![argument],
                },
                "run",
                "()Ljava/lang/Runnable;",
            )
            .unwrap();
        let (source_pool, source_bootstrap_methods) = source.finish();

        let mut target = ConstantPoolBuilder::new();
        let imported = target
            .import(&source_pool, &source_bootstrap_methods, call_site)
            .unwrap();
        let (pool, bootstrap_methods) = target.finish();

        let CpInfo::InvokeDynamic(info) = pool.get(imported).unwrap() else {
            panic!("expected an InvokeDynamic entry");
        };
        assert_eq!(
            ("run", "()Ljava/lang/Runnable;"),
            pool.name_and_type(info.name_and_type_index).unwrap()
        );
        assert_eq!(1, bootstrap_methods.len());
        let CpInfo::MethodHandle(handle) = pool.get(bootstrap_methods[0].bootstrap_method_ref).unwrap()
        else {
            panic!("expected a MethodHandle entry");
        };
        assert_eq!(
            "metafactory",
            pool.member_ref(handle.reference_index).unwrap().name
        );
        // "padding" was not imported.
        assert!(pool.iter().all(|(_, c)| c != &CpInfo::Utf8("padding".into())));
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_import_stops_on_self_reference() {
        // A dynamic constant whose bootstrap handle points back at it.
        let pool = ConstantPool::new(vec![
            CpInfo::Utf8("x".into()),
            CpInfo::Utf8("I".into()),
            CpInfo::NameAndType(NameAndTypeInfo {
                name_index: 1,
                descriptor_index: 2,
            }),
            CpInfo::Dynamic(DynamicInfo {
                bootstrap_method_attr_index: 0,
                name_and_type_index: 3,
            }),
            CpInfo::MethodHandle(MethodHandleInfo {
                reference_kind: 6,
                reference_index: 4,
            }),
        ]);
        let bootstrap_methods = [BootstrapMethod {
            bootstrap_method_ref: 5,
            bootstrap_arguments: vec![],
        }];

        let mut builder = ConstantPoolBuilder::new();
        assert!(matches!(
            builder.import(&pool, &bootstrap_methods, 4),
            Err(ClassFileError::MalformedPoolEntry { .. })
        ));
    }
}
