// https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-6.html

macro_rules! opcodes {
    ($($name:ident = $code:literal, $mnemonic:literal, $pop:literal, $push:literal;)*) => {
        /// A JVM instruction opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            pub fn from_u8(byte: u8) -> Option<Opcode> {
                match byte {
                    $($code => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Stack slots popped and pushed, as listed in the opcode table.
            /// Meaningless for the opcodes `stack_effect` reports as variable.
            fn table_effect(self) -> (u16, u16) {
                match self {
                    $(Opcode::$name => ($pop, $push),)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", 0, 0;
    AconstNull = 0x01, "aconst_null", 0, 1;
    IconstM1 = 0x02, "iconst_m1", 0, 1;
    Iconst0 = 0x03, "iconst_0", 0, 1;
    Iconst1 = 0x04, "iconst_1", 0, 1;
    Iconst2 = 0x05, "iconst_2", 0, 1;
    Iconst3 = 0x06, "iconst_3", 0, 1;
    Iconst4 = 0x07, "iconst_4", 0, 1;
    Iconst5 = 0x08, "iconst_5", 0, 1;
    Lconst0 = 0x09, "lconst_0", 0, 2;
    Lconst1 = 0x0a, "lconst_1", 0, 2;
    Fconst0 = 0x0b, "fconst_0", 0, 1;
    Fconst1 = 0x0c, "fconst_1", 0, 1;
    Fconst2 = 0x0d, "fconst_2", 0, 1;
    Dconst0 = 0x0e, "dconst_0", 0, 2;
    Dconst1 = 0x0f, "dconst_1", 0, 2;
    Bipush = 0x10, "bipush", 0, 1;
    Sipush = 0x11, "sipush", 0, 1;
    Ldc = 0x12, "ldc", 0, 1;
    LdcW = 0x13, "ldc_w", 0, 1;
    Ldc2W = 0x14, "ldc2_w", 0, 2;
    Iload = 0x15, "iload", 0, 1;
    Lload = 0x16, "lload", 0, 2;
    Fload = 0x17, "fload", 0, 1;
    Dload = 0x18, "dload", 0, 2;
    Aload = 0x19, "aload", 0, 1;
    Iload0 = 0x1a, "iload_0", 0, 1;
    Iload1 = 0x1b, "iload_1", 0, 1;
    Iload2 = 0x1c, "iload_2", 0, 1;
    Iload3 = 0x1d, "iload_3", 0, 1;
    Lload0 = 0x1e, "lload_0", 0, 2;
    Lload1 = 0x1f, "lload_1", 0, 2;
    Lload2 = 0x20, "lload_2", 0, 2;
    Lload3 = 0x21, "lload_3", 0, 2;
    Fload0 = 0x22, "fload_0", 0, 1;
    Fload1 = 0x23, "fload_1", 0, 1;
    Fload2 = 0x24, "fload_2", 0, 1;
    Fload3 = 0x25, "fload_3", 0, 1;
    Dload0 = 0x26, "dload_0", 0, 2;
    Dload1 = 0x27, "dload_1", 0, 2;
    Dload2 = 0x28, "dload_2", 0, 2;
    Dload3 = 0x29, "dload_3", 0, 2;
    Aload0 = 0x2a, "aload_0", 0, 1;
    Aload1 = 0x2b, "aload_1", 0, 1;
    Aload2 = 0x2c, "aload_2", 0, 1;
    Aload3 = 0x2d, "aload_3", 0, 1;
    Iaload = 0x2e, "iaload", 2, 1;
    Laload = 0x2f, "laload", 2, 2;
    Faload = 0x30, "faload", 2, 1;
    Daload = 0x31, "daload", 2, 2;
    Aaload = 0x32, "aaload", 2, 1;
    Baload = 0x33, "baload", 2, 1;
    Caload = 0x34, "caload", 2, 1;
    Saload = 0x35, "saload", 2, 1;
    Istore = 0x36, "istore", 1, 0;
    Lstore = 0x37, "lstore", 2, 0;
    Fstore = 0x38, "fstore", 1, 0;
    Dstore = 0x39, "dstore", 2, 0;
    Astore = 0x3a, "astore", 1, 0;
    Istore0 = 0x3b, "istore_0", 1, 0;
    Istore1 = 0x3c, "istore_1", 1, 0;
    Istore2 = 0x3d, "istore_2", 1, 0;
    Istore3 = 0x3e, "istore_3", 1, 0;
    Lstore0 = 0x3f, "lstore_0", 2, 0;
    Lstore1 = 0x40, "lstore_1", 2, 0;
    Lstore2 = 0x41, "lstore_2", 2, 0;
    Lstore3 = 0x42, "lstore_3", 2, 0;
    Fstore0 = 0x43, "fstore_0", 1, 0;
    Fstore1 = 0x44, "fstore_1", 1, 0;
    Fstore2 = 0x45, "fstore_2", 1, 0;
    Fstore3 = 0x46, "fstore_3", 1, 0;
    Dstore0 = 0x47, "dstore_0", 2, 0;
    Dstore1 = 0x48, "dstore_1", 2, 0;
    Dstore2 = 0x49, "dstore_2", 2, 0;
    Dstore3 = 0x4a, "dstore_3", 2, 0;
    Astore0 = 0x4b, "astore_0", 1, 0;
    Astore1 = 0x4c, "astore_1", 1, 0;
    Astore2 = 0x4d, "astore_2", 1, 0;
    Astore3 = 0x4e, "astore_3", 1, 0;
    Iastore = 0x4f, "iastore", 3, 0;
    Lastore = 0x50, "lastore", 4, 0;
    Fastore = 0x51, "fastore", 3, 0;
    Dastore = 0x52, "dastore", 4, 0;
    Aastore = 0x53, "aastore", 3, 0;
    Bastore = 0x54, "bastore", 3, 0;
    Castore = 0x55, "castore", 3, 0;
    Sastore = 0x56, "sastore", 3, 0;
    Pop = 0x57, "pop", 1, 0;
    Pop2 = 0x58, "pop2", 2, 0;
    Dup = 0x59, "dup", 1, 2;
    DupX1 = 0x5a, "dup_x1", 2, 3;
    DupX2 = 0x5b, "dup_x2", 3, 4;
    Dup2 = 0x5c, "dup2", 2, 4;
    Dup2X1 = 0x5d, "dup2_x1", 3, 5;
    Dup2X2 = 0x5e, "dup2_x2", 4, 6;
    Swap = 0x5f, "swap", 2, 2;
    Iadd = 0x60, "iadd", 2, 1;
    Ladd = 0x61, "ladd", 4, 2;
    Fadd = 0x62, "fadd", 2, 1;
    Dadd = 0x63, "dadd", 4, 2;
    Isub = 0x64, "isub", 2, 1;
    Lsub = 0x65, "lsub", 4, 2;
    Fsub = 0x66, "fsub", 2, 1;
    Dsub = 0x67, "dsub", 4, 2;
    Imul = 0x68, "imul", 2, 1;
    Lmul = 0x69, "lmul", 4, 2;
    Fmul = 0x6a, "fmul", 2, 1;
    Dmul = 0x6b, "dmul", 4, 2;
    Idiv = 0x6c, "idiv", 2, 1;
    Ldiv = 0x6d, "ldiv", 4, 2;
    Fdiv = 0x6e, "fdiv", 2, 1;
    Ddiv = 0x6f, "ddiv", 4, 2;
    Irem = 0x70, "irem", 2, 1;
    Lrem = 0x71, "lrem", 4, 2;
    Frem = 0x72, "frem", 2, 1;
    Drem = 0x73, "drem", 4, 2;
    Ineg = 0x74, "ineg", 1, 1;
    Lneg = 0x75, "lneg", 2, 2;
    Fneg = 0x76, "fneg", 1, 1;
    Dneg = 0x77, "dneg", 2, 2;
    Ishl = 0x78, "ishl", 2, 1;
    Lshl = 0x79, "lshl", 3, 2;
    Ishr = 0x7a, "ishr", 2, 1;
    Lshr = 0x7b, "lshr", 3, 2;
    Iushr = 0x7c, "iushr", 2, 1;
    Lushr = 0x7d, "lushr", 3, 2;
    Iand = 0x7e, "iand", 2, 1;
    Land = 0x7f, "land", 4, 2;
    Ior = 0x80, "ior", 2, 1;
    Lor = 0x81, "lor", 4, 2;
    Ixor = 0x82, "ixor", 2, 1;
    Lxor = 0x83, "lxor", 4, 2;
    Iinc = 0x84, "iinc", 0, 0;
    I2l = 0x85, "i2l", 1, 2;
    I2f = 0x86, "i2f", 1, 1;
    I2d = 0x87, "i2d", 1, 2;
    L2i = 0x88, "l2i", 2, 1;
    L2f = 0x89, "l2f", 2, 1;
    L2d = 0x8a, "l2d", 2, 2;
    F2i = 0x8b, "f2i", 1, 1;
    F2l = 0x8c, "f2l", 1, 2;
    F2d = 0x8d, "f2d", 1, 2;
    D2i = 0x8e, "d2i", 2, 1;
    D2l = 0x8f, "d2l", 2, 2;
    D2f = 0x90, "d2f", 2, 1;
    I2b = 0x91, "i2b", 1, 1;
    I2c = 0x92, "i2c", 1, 1;
    I2s = 0x93, "i2s", 1, 1;
    Lcmp = 0x94, "lcmp", 4, 1;
    Fcmpl = 0x95, "fcmpl", 2, 1;
    Fcmpg = 0x96, "fcmpg", 2, 1;
    Dcmpl = 0x97, "dcmpl", 4, 1;
    Dcmpg = 0x98, "dcmpg", 4, 1;
    Ifeq = 0x99, "ifeq", 1, 0;
    Ifne = 0x9a, "ifne", 1, 0;
    Iflt = 0x9b, "iflt", 1, 0;
    Ifge = 0x9c, "ifge", 1, 0;
    Ifgt = 0x9d, "ifgt", 1, 0;
    Ifle = 0x9e, "ifle", 1, 0;
    IfIcmpeq = 0x9f, "if_icmpeq", 2, 0;
    IfIcmpne = 0xa0, "if_icmpne", 2, 0;
    IfIcmplt = 0xa1, "if_icmplt", 2, 0;
    IfIcmpge = 0xa2, "if_icmpge", 2, 0;
    IfIcmpgt = 0xa3, "if_icmpgt", 2, 0;
    IfIcmple = 0xa4, "if_icmple", 2, 0;
    IfAcmpeq = 0xa5, "if_acmpeq", 2, 0;
    IfAcmpne = 0xa6, "if_acmpne", 2, 0;
    Goto = 0xa7, "goto", 0, 0;
    Jsr = 0xa8, "jsr", 0, 1;
    Ret = 0xa9, "ret", 0, 0;
    Tableswitch = 0xaa, "tableswitch", 1, 0;
    Lookupswitch = 0xab, "lookupswitch", 1, 0;
    Ireturn = 0xac, "ireturn", 1, 0;
    Lreturn = 0xad, "lreturn", 2, 0;
    Freturn = 0xae, "freturn", 1, 0;
    Dreturn = 0xaf, "dreturn", 2, 0;
    Areturn = 0xb0, "areturn", 1, 0;
    Return = 0xb1, "return", 0, 0;
    Getstatic = 0xb2, "getstatic", 0, 0;
    Putstatic = 0xb3, "putstatic", 0, 0;
    Getfield = 0xb4, "getfield", 0, 0;
    Putfield = 0xb5, "putfield", 0, 0;
    Invokevirtual = 0xb6, "invokevirtual", 0, 0;
    Invokespecial = 0xb7, "invokespecial", 0, 0;
    Invokestatic = 0xb8, "invokestatic", 0, 0;
    Invokeinterface = 0xb9, "invokeinterface", 0, 0;
    Invokedynamic = 0xba, "invokedynamic", 0, 0;
    New = 0xbb, "new", 0, 1;
    Newarray = 0xbc, "newarray", 1, 1;
    Anewarray = 0xbd, "anewarray", 1, 1;
    Arraylength = 0xbe, "arraylength", 1, 1;
    Athrow = 0xbf, "athrow", 1, 0;
    Checkcast = 0xc0, "checkcast", 1, 1;
    Instanceof = 0xc1, "instanceof", 1, 1;
    Monitorenter = 0xc2, "monitorenter", 1, 0;
    Monitorexit = 0xc3, "monitorexit", 1, 0;
    Wide = 0xc4, "wide", 0, 0;
    Multianewarray = 0xc5, "multianewarray", 0, 0;
    Ifnull = 0xc6, "ifnull", 1, 0;
    Ifnonnull = 0xc7, "ifnonnull", 1, 0;
    GotoW = 0xc8, "goto_w", 0, 0;
    JsrW = 0xc9, "jsr_w", 0, 1;
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Operand stack slots (long and double count twice) popped and pushed by
    /// the instruction, or `None` when the effect depends on a descriptor or an
    /// operand (field access, invocations, `multianewarray`).
    pub fn stack_effect(self) -> Option<(u16, u16)> {
        match self {
            Opcode::Getstatic
            | Opcode::Putstatic
            | Opcode::Getfield
            | Opcode::Putfield
            | Opcode::Invokevirtual
            | Opcode::Invokespecial
            | Opcode::Invokestatic
            | Opcode::Invokeinterface
            | Opcode::Invokedynamic
            | Opcode::Multianewarray
            | Opcode::Wide => None,
            _ => Some(self.table_effect()),
        }
    }

    /// Conditional and unconditional jumps with a single 16 or 32-bit offset.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Goto
                | Opcode::Jsr
                | Opcode::Ifnull
                | Opcode::Ifnonnull
                | Opcode::GotoW
                | Opcode::JsrW
        )
    }

    pub fn is_wide_branch(self) -> bool {
        matches!(self, Opcode::GotoW | Opcode::JsrW)
    }

    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Control never falls through to the next instruction.
    pub fn ends_block(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Opcode::Goto
                    | Opcode::GotoW
                    | Opcode::Athrow
                    | Opcode::Ret
                    | Opcode::Tableswitch
                    | Opcode::Lookupswitch
            )
    }

    /// For the `<x>load_<n>` / `<x>store_<n>` forms, the implicit slot.
    pub fn implicit_slot(self) -> Option<u16> {
        let code = self.code();
        match code {
            0x1a..=0x2d => Some(((code - 0x1a) % 4) as u16),
            0x3b..=0x4e => Some(((code - 0x3b) % 4) as u16),
            _ => None,
        }
    }

    /// Whether the opcode reads or writes a local variable, and how many slots
    /// the variable takes.
    pub fn local_slots(self) -> Option<u16> {
        match self {
            Opcode::Lload
            | Opcode::Dload
            | Opcode::Lstore
            | Opcode::Dstore
            | Opcode::Lload0
            | Opcode::Lload1
            | Opcode::Lload2
            | Opcode::Lload3
            | Opcode::Dload0
            | Opcode::Dload1
            | Opcode::Dload2
            | Opcode::Dload3
            | Opcode::Lstore0
            | Opcode::Lstore1
            | Opcode::Lstore2
            | Opcode::Lstore3
            | Opcode::Dstore0
            | Opcode::Dstore1
            | Opcode::Dstore2
            | Opcode::Dstore3 => Some(2),
            Opcode::Iload
            | Opcode::Fload
            | Opcode::Aload
            | Opcode::Istore
            | Opcode::Fstore
            | Opcode::Astore
            | Opcode::Ret => Some(1),
            _ if self.implicit_slot().is_some() => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
