bitflags::bitflags! {
    /// Access and property flags of classes, fields and methods.
    ///
    /// Some bits are shared between contexts: `0x0020` is `SUPER` on a class and
    /// `SYNCHRONIZED` on a method, `0x0040` is `VOLATILE` on a field and `BRIDGE`
    /// on a method, `0x0080` is `TRANSIENT` on a field and `VARARGS` on a method.
    /// Every one of the 16 bits has a name, so `from_bits_truncate` never loses
    /// information.
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

const CLASS_FLAG_NAMES: [(AccessFlags, &str); 9] = [
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::SUPER, "super"),
    (AccessFlags::INTERFACE, "interface"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::SYNTHETIC, "synthetic"),
    (AccessFlags::ANNOTATION, "annotation"),
    (AccessFlags::ENUM, "enum"),
    (AccessFlags::MODULE, "module"),
];

const METHOD_FLAG_NAMES: [(AccessFlags, &str); 12] = [
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::PRIVATE, "private"),
    (AccessFlags::PROTECTED, "protected"),
    (AccessFlags::STATIC, "static"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::SYNCHRONIZED, "synchronized"),
    (AccessFlags::BRIDGE, "bridge"),
    (AccessFlags::VARARGS, "varargs"),
    (AccessFlags::NATIVE, "native"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::STRICT, "strict"),
    (AccessFlags::SYNTHETIC, "synthetic"),
];

impl AccessFlags {
    /// Names of the set bits, read as class flags.
    pub fn class_modifiers(self) -> Vec<&'static str> {
        Self::names(self, &CLASS_FLAG_NAMES)
    }

    /// Names of the set bits, read as method flags.
    pub fn method_modifiers(self) -> Vec<&'static str> {
        Self::names(self, &METHOD_FLAG_NAMES)
    }

    fn names(self, table: &[(AccessFlags, &'static str)]) -> Vec<&'static str> {
        table
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}
