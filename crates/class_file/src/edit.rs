use std::fmt;

use crate::{
    descriptor::{parse_field_descriptor, parse_method_descriptor},
    transform, AccessFlags, ClassFile, ClassFileError, CodeBuilder, Result,
};

/// Emits a method body.
pub type CodeFn<'a> = Box<dyn FnOnce(&mut CodeBuilder<'_>) + 'a>;

/// Name and descriptor, which together identify a field or a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.descriptor)
    }
}

/// What happens to one field or method of the output.
pub(crate) enum MemberEdit<'a> {
    /// Member `index` of the base class, unchanged.
    Copy { index: usize, key: MemberKey },
    /// Member `index` of the base class with its flags and/or code replaced.
    Modify {
        index: usize,
        key: MemberKey,
        flags: Option<AccessFlags>,
        code: Option<CodeFn<'a>>,
    },
    Insert {
        key: MemberKey,
        flags: AccessFlags,
        code: Option<CodeFn<'a>>,
    },
}

impl MemberEdit<'_> {
    pub(crate) fn key(&self) -> &MemberKey {
        match self {
            MemberEdit::Copy { key, .. }
            | MemberEdit::Modify { key, .. }
            | MemberEdit::Insert { key, .. } => key,
        }
    }
}

/// An edit script producing a new class, either from scratch or from a base
/// class whose members are copied unless an edit says otherwise.
///
/// Nothing is resolved until [`build`](Self::build): a single pass then
/// allocates a fresh constant pool and emits every member in script order.
///
/// ```no_run
/// # use classkit_class_file::{AccessFlags, ClassBuilder};
/// let bytes = ClassBuilder::new("demo/Task")
///     .method(AccessFlags::PUBLIC, "run", "()V", |code| {
///         code.return_();
///     })
///     .build()?;
/// # Ok::<(), classkit_class_file::ClassFileError>(())
/// ```
pub struct ClassBuilder<'a> {
    pub(crate) base: Option<&'a ClassFile>,
    pub(crate) this_class: String,
    pub(crate) version: (u16, u16),
    pub(crate) flags: AccessFlags,
    pub(crate) super_class: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: Vec<MemberEdit<'a>>,
    pub(crate) methods: Vec<MemberEdit<'a>>,
    /// First edit that could not be applied, reported by `build`.
    pub(crate) error: Option<ClassFileError>,
}
impl<'a> ClassBuilder<'a> {
    /// An empty public class extending `java/lang/Object`, version 49.0 so that
    /// generated code needs no stack map frames.
    pub fn new(this_class: &str) -> Self {
        Self {
            base: None,
            this_class: this_class.to_owned(),
            version: (49, 0),
            flags: AccessFlags::PUBLIC | AccessFlags::SUPER,
            super_class: Some("java/lang/Object".to_owned()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            error: None,
        }
    }

    /// Starts from a copy of `base`.
    pub fn from_class(base: &'a ClassFile) -> Result<Self> {
        let fields = base
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                Ok(MemberEdit::Copy {
                    index,
                    key: MemberKey::new(base.field_name(field)?, base.field_descriptor(field)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let methods = base
            .methods
            .iter()
            .enumerate()
            .map(|(index, method)| {
                Ok(MemberEdit::Copy {
                    index,
                    key: MemberKey::new(
                        base.method_name(method)?,
                        base.method_descriptor(method)?,
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base: Some(base),
            this_class: base.class_name()?.to_owned(),
            version: (base.major_version, base.minor_version),
            flags: base.access_flags,
            super_class: base.super_class()?.map(str::to_owned),
            interfaces: base
                .interface_names()?
                .into_iter()
                .map(str::to_owned)
                .collect(),
            fields,
            methods,
            error: None,
        })
    }

    pub fn flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.super_class = Some(name.to_owned());
        self
    }

    pub fn interfaces(mut self, names: &[&str]) -> Self {
        self.interfaces = names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn field(mut self, flags: AccessFlags, name: &str, descriptor: &str) -> Self {
        if let Err(e) = parse_field_descriptor(descriptor) {
            self.fail(e);
        }
        let key = MemberKey::new(name, descriptor);
        if find(&self.fields, &key).is_some() {
            self.fail(duplicate(key));
            return self;
        }
        self.fields.push(MemberEdit::Insert {
            key,
            flags,
            code: None,
        });
        self
    }

    pub fn method(
        mut self,
        flags: AccessFlags,
        name: &str,
        descriptor: &str,
        code: impl FnOnce(&mut CodeBuilder<'_>) + 'a,
    ) -> Self {
        self.insert_method(flags, name, descriptor, Some(Box::new(code)));
        self
    }

    /// Inserts a method without a body (`abstract` or `native`).
    pub fn abstract_method(mut self, flags: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.insert_method(flags, name, descriptor, None);
        self
    }

    fn insert_method(
        &mut self,
        flags: AccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<CodeFn<'a>>,
    ) {
        if let Err(e) = parse_method_descriptor(descriptor) {
            self.fail(e);
        }
        let key = MemberKey::new(name, descriptor);
        if find(&self.methods, &key).is_some() {
            self.fail(duplicate(key));
            return;
        }
        self.methods.push(MemberEdit::Insert { key, flags, code });
    }

    pub fn method_flags(mut self, name: &str, descriptor: &str, flags: AccessFlags) -> Self {
        let key = MemberKey::new(name, descriptor);
        match find(&self.methods, &key) {
            Some(position) => set_flags(&mut self.methods[position], flags),
            None => self.fail(not_found(key)),
        }
        self
    }

    pub fn field_flags(mut self, name: &str, descriptor: &str, flags: AccessFlags) -> Self {
        let key = MemberKey::new(name, descriptor);
        match find(&self.fields, &key) {
            Some(position) => set_flags(&mut self.fields[position], flags),
            None => self.fail(not_found(key)),
        }
        self
    }

    /// Replaces the body of an existing method.
    pub fn method_code(
        mut self,
        name: &str,
        descriptor: &str,
        code: impl FnOnce(&mut CodeBuilder<'_>) + 'a,
    ) -> Self {
        let key = MemberKey::new(name, descriptor);
        let Some(position) = find(&self.methods, &key) else {
            self.fail(not_found(key));
            return self;
        };

        let code: CodeFn<'a> = Box::new(code);
        let edit = &mut self.methods[position];
        *edit = match std::mem::replace(edit, placeholder()) {
            MemberEdit::Copy { index, key } => MemberEdit::Modify {
                index,
                key,
                flags: None,
                code: Some(code),
            },
            MemberEdit::Modify {
                index, key, flags, ..
            } => MemberEdit::Modify {
                index,
                key,
                flags,
                code: Some(code),
            },
            MemberEdit::Insert { key, flags, .. } => MemberEdit::Insert {
                key,
                flags,
                code: Some(code),
            },
        };
        self
    }

    pub fn remove_method(mut self, name: &str, descriptor: &str) -> Self {
        let key = MemberKey::new(name, descriptor);
        match find(&self.methods, &key) {
            Some(position) => {
                self.methods.remove(position);
            }
            None => self.fail(not_found(key)),
        }
        self
    }

    pub fn remove_field(mut self, name: &str, descriptor: &str) -> Self {
        let key = MemberKey::new(name, descriptor);
        match find(&self.fields, &key) {
            Some(position) => {
                self.fields.remove(position);
            }
            None => self.fail(not_found(key)),
        }
        self
    }

    fn fail(&mut self, e: ClassFileError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    pub fn build_class(self) -> Result<ClassFile> {
        transform::build(self)
    }

    pub fn build(self) -> Result<Vec<u8>> {
        self.build_class()?.to_bytes()
    }
}

fn find(edits: &[MemberEdit<'_>], key: &MemberKey) -> Option<usize> {
    edits.iter().position(|edit| edit.key() == key)
}

fn set_flags(edit: &mut MemberEdit<'_>, new_flags: AccessFlags) {
    *edit = match std::mem::replace(edit, placeholder()) {
        MemberEdit::Copy { index, key } => MemberEdit::Modify {
            index,
            key,
            flags: Some(new_flags),
            code: None,
        },
        MemberEdit::Modify {
            index, key, code, ..
        } => MemberEdit::Modify {
            index,
            key,
            flags: Some(new_flags),
            code,
        },
        MemberEdit::Insert { key, code, .. } => MemberEdit::Insert {
            key,
            flags: new_flags,
            code,
        },
    };
}

fn placeholder<'a>() -> MemberEdit<'a> {
    MemberEdit::Copy {
        index: 0,
        key: MemberKey::new("", ""),
    }
}

fn not_found(key: MemberKey) -> ClassFileError {
    ClassFileError::MemberNotFound {
        name: key.name,
        descriptor: key.descriptor,
    }
}

fn duplicate(key: MemberKey) -> ClassFileError {
    ClassFileError::DuplicateMember {
        name: key.name,
        descriptor: key.descriptor,
    }
}
