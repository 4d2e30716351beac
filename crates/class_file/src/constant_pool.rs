use std::{borrow::Cow, io::Write, ops::Index};

use byteorder::{BigEndian, WriteBytesExt};

use crate::{attributes::BootstrapMethod, parser::Parser, ClassFileError, Result};

#[macro_export]
macro_rules! matches_cp_info {
    ($cp:expr, $index:expr, $i:ident) => {
        match $cp.get($index) {
            Ok($crate::constant_pool::CpInfo::$i(ref n)) => Ok(n),
            Ok(c) => Err($crate::ClassFileError::UnexpectedConstantPoolEntry(
                stringify!($i),
                c.clone(),
            )),
            Err(e) => Err(e),
        }
    };
}

pub(crate) mod tags {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConstantPool {
    cp_infos: Vec<CpInfo>,
}
impl ConstantPool {
    pub fn new(cp_infos: Vec<CpInfo>) -> Self {
        Self { cp_infos }
    }

    /// Decodes `constant_pool_count` followed by the pool entries, returning the
    /// pool and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(ConstantPool, usize)> {
        let mut parser = Parser::new(bytes);
        let pool = parser.parse_constant_pool()?;
        pool.validate()?;

        Ok((pool, parser.offset()))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        w.write_u16::<BigEndian>(self.count())?;
        let mut buf = Vec::new();
        for cp_info in &self.cp_infos {
            buf.clear();
            encode_cp_info(cp_info, &mut buf)?;
            w.write_all(&buf)?;
        }
        Ok(())
    }

    /// The `constant_pool_count` item: number of slots plus one.
    pub fn count(&self) -> u16 {
        (self.cp_infos.len() + 1) as u16
    }

    /// Number of slots, including the unusable halves of long/double entries.
    pub fn len(&self) -> usize {
        self.cp_infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cp_infos.is_empty()
    }

    pub fn get(&self, index: u16) -> Result<&CpInfo> {
        if index == 0 || index as usize > self.cp_infos.len() {
            return Err(ClassFileError::MalformedPoolEntry {
                index,
                reason: format!("index out of range 1..={}", self.cp_infos.len()),
            });
        }
        Ok(&self.cp_infos[index as usize - 1])
    }

    /// Usable entries with their 1-based indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &CpInfo)> {
        self.cp_infos
            .iter()
            .enumerate()
            .filter(|(_, cp_info)| !matches!(cp_info, CpInfo::Unusable))
            .map(|(i, cp_info)| (i as u16 + 1, cp_info))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        Ok(matches_cp_info!(self, index, Utf8)?)
    }

    /// Like [`utf8`](Self::utf8), but also accepts entries with unpaired
    /// surrogates, which come back with U+FFFD in their place.
    pub fn utf8_lossy(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index)? {
            CpInfo::Utf8(s) => Ok(Cow::Borrowed(s)),
            CpInfo::Utf8Unpaired(units) => Ok(Cow::Owned(String::from_utf16_lossy(units))),
            c => Err(ClassFileError::UnexpectedConstantPoolEntry(
                "Utf8",
                c.clone(),
            )),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        let ClassInfo { name_index } = matches_cp_info!(self, index, Class)?;
        self.utf8(*name_index)
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        let NameAndTypeInfo {
            name_index,
            descriptor_index,
        } = matches_cp_info!(self, index, NameAndType)?;
        Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
    }

    /// Resolves a field, method or interface method reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let ref_info = match self.get(index)? {
            CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => r,
            c => {
                return Err(ClassFileError::UnexpectedConstantPoolEntry(
                    "FieldRef, MethodRef or InterfaceMethodRef",
                    c.clone(),
                ))
            }
        };
        let (name, descriptor) = self.name_and_type(ref_info.name_and_type_index)?;

        Ok(MemberRef {
            owner: self.class_name(ref_info.class_index)?,
            name,
            descriptor,
        })
    }

    /// Checks that every reference between entries targets an entry of the right kind.
    pub fn validate(&self) -> Result<()> {
        for (index, cp_info) in self.iter() {
            match cp_info {
                CpInfo::Utf8(_)
                | CpInfo::Utf8Unpaired(_)
                | CpInfo::Integer(_)
                | CpInfo::Float(_)
                | CpInfo::Long(_)
                | CpInfo::Double(_)
                | CpInfo::Unusable => {}
                CpInfo::Class(ClassInfo { name_index })
                | CpInfo::String {
                    string_index: name_index,
                }
                | CpInfo::Module { name_index }
                | CpInfo::Package { name_index }
                | CpInfo::MethodType(MethodTypeInfo {
                    descriptor_index: name_index,
                }) => self.expect(index, *name_index, "Utf8", is_utf8)?,
                CpInfo::FieldRef(r) | CpInfo::MethodRef(r) | CpInfo::InterfaceMethodRef(r) => {
                    self.expect(index, r.class_index, "Class", |c| {
                        matches!(c, CpInfo::Class(_))
                    })?;
                    self.expect(index, r.name_and_type_index, "NameAndType", |c| {
                        matches!(c, CpInfo::NameAndType(_))
                    })?;
                }
                CpInfo::NameAndType(NameAndTypeInfo {
                    name_index,
                    descriptor_index,
                }) => {
                    self.expect(index, *name_index, "Utf8", is_utf8)?;
                    self.expect(index, *descriptor_index, "Utf8", |c| {
                        matches!(c, CpInfo::Utf8(_))
                    })?;
                }
                CpInfo::MethodHandle(MethodHandleInfo {
                    reference_kind,
                    reference_index,
                }) => match reference_kind {
                    1..=4 => self.expect(index, *reference_index, "FieldRef", |c| {
                        matches!(c, CpInfo::FieldRef(_))
                    })?,
                    5 | 8 => self.expect(index, *reference_index, "MethodRef", |c| {
                        matches!(c, CpInfo::MethodRef(_))
                    })?,
                    6 | 7 => self.expect(
                        index,
                        *reference_index,
                        "MethodRef or InterfaceMethodRef",
                        |c| matches!(c, CpInfo::MethodRef(_) | CpInfo::InterfaceMethodRef(_)),
                    )?,
                    9 => self.expect(index, *reference_index, "InterfaceMethodRef", |c| {
                        matches!(c, CpInfo::InterfaceMethodRef(_))
                    })?,
                    kind => {
                        return Err(ClassFileError::MalformedPoolEntry {
                            index,
                            reason: format!("invalid method handle kind {}", kind),
                        })
                    }
                },
                CpInfo::Dynamic(d) | CpInfo::InvokeDynamic(d) => {
                    self.expect(index, d.name_and_type_index, "NameAndType", |c| {
                        matches!(c, CpInfo::NameAndType(_))
                    })?
                }
            }
        }
        Ok(())
    }

    /// Checks the bootstrap method table of the class owning this pool against
    /// the pool. A dynamic constant may not depend on itself through the
    /// arguments of its bootstrap method.
    pub fn validate_bootstrap_methods(&self, bootstrap_methods: &[BootstrapMethod]) -> Result<()> {
        for (index, cp_info) in self.iter() {
            if let CpInfo::Dynamic(d) | CpInfo::InvokeDynamic(d) = cp_info {
                if d.bootstrap_method_attr_index as usize >= bootstrap_methods.len() {
                    return Err(ClassFileError::MalformedPoolEntry {
                        index,
                        reason: format!(
                            "bootstrap method {} does not exist",
                            d.bootstrap_method_attr_index
                        ),
                    });
                }
            }
        }
        for method in bootstrap_methods {
            self.expect(0, method.bootstrap_method_ref, "MethodHandle", |c| {
                matches!(c, CpInfo::MethodHandle(_))
            })?;
            for argument in &method.bootstrap_arguments {
                self.expect(0, *argument, "loadable constant", |c| {
                    c.is_loadable() || matches!(c, CpInfo::Long(_) | CpInfo::Double(_))
                })?;
            }
        }

        // Dynamic constants form a graph through bootstrap arguments; walk it
        // depth first and fail on a back edge.
        let mut state = vec![Visit::New; self.cp_infos.len() + 1];
        for (root, cp_info) in self.iter() {
            if !matches!(cp_info, CpInfo::Dynamic(_)) || state[root as usize] != Visit::New {
                continue;
            }
            state[root as usize] = Visit::Active;
            let mut stack = vec![(root, 0)];
            while let Some(&(node, next)) = stack.last() {
                let Some(&argument) = dynamic_arguments(self, node, bootstrap_methods).get(next)
                else {
                    state[node as usize] = Visit::Done;
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if !matches!(self.get(argument), Ok(CpInfo::Dynamic(_))) {
                    continue;
                }
                match state[argument as usize] {
                    Visit::Active => {
                        return Err(ClassFileError::MalformedPoolEntry {
                            index: argument,
                            reason: "dynamic constant depends on itself".into(),
                        })
                    }
                    Visit::New => {
                        state[argument as usize] = Visit::Active;
                        stack.push((argument, 0));
                    }
                    Visit::Done => {}
                }
            }
        }
        Ok(())
    }

    fn expect(
        &self,
        from: u16,
        target: u16,
        expected: &'static str,
        is_expected: impl Fn(&CpInfo) -> bool,
    ) -> Result<()> {
        let found = self.get(target).map_err(|_| ClassFileError::MalformedPoolEntry {
            index: from,
            reason: format!("reference #{} is out of range", target),
        })?;
        if !is_expected(found) {
            return Err(ClassFileError::MalformedPoolEntry {
                index: from,
                reason: format!(
                    "reference #{} should be {}, found {}",
                    target,
                    expected,
                    found.kind_name()
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, cp_info: CpInfo) {
        self.cp_infos.push(cp_info);
    }
}
impl Index<u16> for ConstantPool {
    type Output = CpInfo;

    fn index(&self, index: u16) -> &Self::Output {
        &self.cp_infos[index as usize - 1]
    }
}
impl<'a> IntoIterator for &'a ConstantPool {
    type Item = &'a CpInfo;
    type IntoIter = std::slice::Iter<'a, CpInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.cp_infos.iter()
    }
}

fn is_utf8(cp_info: &CpInfo) -> bool {
    matches!(cp_info, CpInfo::Utf8(_) | CpInfo::Utf8Unpaired(_))
}

fn dynamic_arguments<'b>(
    pool: &ConstantPool,
    index: u16,
    bootstrap_methods: &'b [BootstrapMethod],
) -> &'b [u16] {
    match pool.get(index) {
        Ok(CpInfo::Dynamic(d)) => bootstrap_methods
            .get(d.bootstrap_method_attr_index as usize)
            .map(|method| method.bootstrap_arguments.as_slice())
            .unwrap_or_default(),
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Owner, name and descriptor of a resolved member reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub enum CpInfo {
    MethodRef(RefInfo),
    FieldRef(RefInfo),
    Float(f32),
    InterfaceMethodRef(RefInfo),
    Class(ClassInfo),
    NameAndType(NameAndTypeInfo),
    Utf8(String),
    /// A Utf8 entry holding unpaired surrogates, which a `String` cannot
    /// represent. Kept as UTF-16 code units; well-formed text is always `Utf8`.
    Utf8Unpaired(Vec<u16>),
    String { string_index: u16 },
    Dynamic(DynamicInfo),
    InvokeDynamic(DynamicInfo),
    Integer(i32),
    MethodHandle(MethodHandleInfo),
    MethodType(MethodTypeInfo),
    Long(i64),
    Double(f64),
    Module { name_index: u16 },
    Package { name_index: u16 },
    Unusable,
}
impl CpInfo {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CpInfo::MethodRef(_) => "MethodRef",
            CpInfo::FieldRef(_) => "FieldRef",
            CpInfo::Float(_) => "Float",
            CpInfo::InterfaceMethodRef(_) => "InterfaceMethodRef",
            CpInfo::Class(_) => "Class",
            CpInfo::NameAndType(_) => "NameAndType",
            CpInfo::Utf8(_) | CpInfo::Utf8Unpaired(_) => "Utf8",
            CpInfo::String { .. } => "String",
            CpInfo::Dynamic(_) => "Dynamic",
            CpInfo::InvokeDynamic(_) => "InvokeDynamic",
            CpInfo::Integer(_) => "Integer",
            CpInfo::MethodHandle(_) => "MethodHandle",
            CpInfo::MethodType(_) => "MethodType",
            CpInfo::Long(_) => "Long",
            CpInfo::Double(_) => "Double",
            CpInfo::Module { .. } => "Module",
            CpInfo::Package { .. } => "Package",
            CpInfo::Unusable => "Unusable",
        }
    }

    /// Number of pool slots the entry occupies.
    pub fn slots(&self) -> usize {
        match self {
            CpInfo::Long(_) | CpInfo::Double(_) => 2,
            _ => 1,
        }
    }

    /// Whether `ldc`/`ldc_w` may load the entry.
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            CpInfo::Integer(_)
                | CpInfo::Float(_)
                | CpInfo::String { .. }
                | CpInfo::Class(_)
                | CpInfo::MethodType(_)
                | CpInfo::MethodHandle(_)
                | CpInfo::Dynamic(_)
        )
    }
}

/// Appends the binary form of `cp_info` (tag and payload) to `out`.
/// `Unusable` slots have no binary form.
pub(crate) fn encode_cp_info(cp_info: &CpInfo, out: &mut Vec<u8>) -> Result<()> {
    match cp_info {
        CpInfo::Utf8(s) => {
            let bytes = cesu8::to_java_cesu8(s);
            if bytes.len() > u16::MAX as usize {
                return Err(ClassFileError::Utf8TooLong(bytes.len()));
            }
            out.write_u8(tags::UTF8)?;
            out.write_u16::<BigEndian>(bytes.len() as u16)?;
            out.write_all(&bytes)?;
        }
        CpInfo::Utf8Unpaired(units) => {
            let bytes = encode_modified_utf8(units);
            if bytes.len() > u16::MAX as usize {
                return Err(ClassFileError::Utf8TooLong(bytes.len()));
            }
            out.write_u8(tags::UTF8)?;
            out.write_u16::<BigEndian>(bytes.len() as u16)?;
            out.write_all(&bytes)?;
        }
        CpInfo::Integer(i) => {
            out.write_u8(tags::INTEGER)?;
            out.write_i32::<BigEndian>(*i)?;
        }
        CpInfo::Float(f) => {
            out.write_u8(tags::FLOAT)?;
            out.write_u32::<BigEndian>(f.to_bits())?;
        }
        CpInfo::Long(l) => {
            out.write_u8(tags::LONG)?;
            out.write_i64::<BigEndian>(*l)?;
        }
        CpInfo::Double(d) => {
            out.write_u8(tags::DOUBLE)?;
            out.write_u64::<BigEndian>(d.to_bits())?;
        }
        CpInfo::Class(ClassInfo { name_index }) => {
            out.write_u8(tags::CLASS)?;
            out.write_u16::<BigEndian>(*name_index)?;
        }
        CpInfo::String { string_index } => {
            out.write_u8(tags::STRING)?;
            out.write_u16::<BigEndian>(*string_index)?;
        }
        CpInfo::FieldRef(r) => encode_ref(tags::FIELD_REF, r, out)?,
        CpInfo::MethodRef(r) => encode_ref(tags::METHOD_REF, r, out)?,
        CpInfo::InterfaceMethodRef(r) => encode_ref(tags::INTERFACE_METHOD_REF, r, out)?,
        CpInfo::NameAndType(NameAndTypeInfo {
            name_index,
            descriptor_index,
        }) => {
            out.write_u8(tags::NAME_AND_TYPE)?;
            out.write_u16::<BigEndian>(*name_index)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
        }
        CpInfo::MethodHandle(MethodHandleInfo {
            reference_kind,
            reference_index,
        }) => {
            out.write_u8(tags::METHOD_HANDLE)?;
            out.write_u8(*reference_kind)?;
            out.write_u16::<BigEndian>(*reference_index)?;
        }
        CpInfo::MethodType(MethodTypeInfo { descriptor_index }) => {
            out.write_u8(tags::METHOD_TYPE)?;
            out.write_u16::<BigEndian>(*descriptor_index)?;
        }
        CpInfo::Dynamic(d) => encode_dynamic(tags::DYNAMIC, d, out)?,
        CpInfo::InvokeDynamic(d) => encode_dynamic(tags::INVOKE_DYNAMIC, d, out)?,
        CpInfo::Module { name_index } => {
            out.write_u8(tags::MODULE)?;
            out.write_u16::<BigEndian>(*name_index)?;
        }
        CpInfo::Package { name_index } => {
            out.write_u8(tags::PACKAGE)?;
            out.write_u16::<BigEndian>(*name_index)?;
        }
        CpInfo::Unusable => {}
    }
    Ok(())
}

/// Decodes modified UTF-8 into UTF-16 code units without pairing
/// surrogates. Overlong forms (other than the two-byte NUL), raw NUL bytes and
/// four-byte sequences are rejected, so encoding the result gives back
/// `bytes`.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Option<Vec<u16>> {
    let continuation = |b: Option<&u8>| match b {
        Some(b) if b & 0xC0 == 0x80 => Some((b & 0x3F) as u16),
        _ => None,
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        let unit = match b {
            0x01..=0x7F => b as u16,
            0xC0..=0xDF => {
                let unit = ((b & 0x1F) as u16) << 6 | continuation(iter.next())?;
                if unit != 0 && unit < 0x80 {
                    return None;
                }
                unit
            }
            0xE0..=0xEF => {
                let unit = ((b & 0x0F) as u16) << 12
                    | continuation(iter.next())? << 6
                    | continuation(iter.next())?;
                if unit < 0x800 {
                    return None;
                }
                unit
            }
            _ => return None,
        };
        units.push(unit);
    }
    Some(units)
}

pub(crate) fn encode_modified_utf8(units: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(units.len());
    for &unit in units {
        match unit {
            0x01..=0x7F => bytes.push(unit as u8),
            0x00 | 0x80..=0x7FF => {
                bytes.push(0xC0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

fn encode_ref(tag: u8, r: &RefInfo, out: &mut Vec<u8>) -> Result<()> {
    out.write_u8(tag)?;
    out.write_u16::<BigEndian>(r.class_index)?;
    out.write_u16::<BigEndian>(r.name_and_type_index)?;
    Ok(())
}

fn encode_dynamic(tag: u8, d: &DynamicInfo, out: &mut Vec<u8>) -> Result<()> {
    out.write_u8(tag)?;
    out.write_u16::<BigEndian>(d.bootstrap_method_attr_index)?;
    out.write_u16::<BigEndian>(d.name_and_type_index)?;
    Ok(())
}

#[derive(Debug, PartialEq, Clone)]
pub struct RefInfo {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClassInfo {
    // The constant_pool entry at name_index must be a CONSTANT_Utf8_info structure
    // representing a binary class or interface name encoded in internal form.
    pub name_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NameAndTypeInfo {
    pub name_index: u16,
    pub descriptor_index: u16,
}

/// Payload shared by `CONSTANT_Dynamic` and `CONSTANT_InvokeDynamic`.
#[derive(Debug, PartialEq, Clone)]
pub struct DynamicInfo {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MethodHandleInfo {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MethodTypeInfo {
    pub descriptor_index: u16,
}
