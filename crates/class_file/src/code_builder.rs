use crate::{
    assembler,
    attributes::{
        Attribute, AttributeInfo, Attributes, CodeAttribute, ExceptionTableEntry, LineNumber,
        LocalVariable,
    },
    descriptor::MethodDescriptor,
    instruction::{ArrayType, Instruction},
    ClassFileError, ConstantPoolBuilder, Opcode, Result,
};

/// A position in the code of a method under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

struct LocalVariableDecl {
    slot: u16,
    name_index: u16,
    descriptor_index: u16,
    start: Label,
    end: Label,
}

/// Emits the body of one method. Symbolic operands are allocated in the
/// class's pool as they are emitted.
///
/// Emission methods chain; the first failure is kept and returned by
/// [`finish`](Self::finish), later calls are then ignored.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPoolBuilder,
    instructions: Vec<Instruction>,
    /// Instruction index each label is bound to.
    labels: Vec<Option<usize>>,
    handlers: Vec<Handler>,
    line_numbers: Vec<(usize, u16)>,
    local_variables: Vec<LocalVariableDecl>,
    error: Option<ClassFileError>,
}
impl<'a> CodeBuilder<'a> {
    pub fn new(pool: &'a mut ConstantPoolBuilder) -> Self {
        Self {
            pool,
            instructions: Vec::new(),
            labels: Vec::new(),
            handlers: Vec::new(),
            line_numbers: Vec::new(),
            local_variables: Vec::new(),
            error: None,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> &mut Self {
        if self.error.is_none() {
            self.instructions.push(instruction);
        }
        self
    }

    fn fail(&mut self, e: ClassFileError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn allocate(
        &mut self,
        f: impl FnOnce(&mut ConstantPoolBuilder) -> Result<u16>,
    ) -> Option<u16> {
        if self.error.is_some() {
            return None;
        }
        match f(self.pool) {
            Ok(index) => Some(index),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.emit(Instruction::Op(opcode))
    }

    /// Picks the `_<n>` form for slots 0-3 and `wide` above 255.
    fn local(&mut self, opcode: Opcode, short_form: Opcode, slot: u16) -> &mut Self {
        let instruction = match Opcode::from_u8(short_form.code() + slot.min(4) as u8) {
            Some(short) if slot < 4 => Instruction::Local {
                opcode: short,
                slot,
                wide: false,
            },
            _ => Instruction::Local {
                opcode,
                slot,
                wide: slot > u8::MAX as u16,
            },
        };
        self.emit(instruction)
    }

    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Aload, Opcode::Aload0, slot)
    }

    pub fn iload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Iload, Opcode::Iload0, slot)
    }

    pub fn lload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Lload, Opcode::Lload0, slot)
    }

    pub fn fload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Fload, Opcode::Fload0, slot)
    }

    pub fn dload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Dload, Opcode::Dload0, slot)
    }

    pub fn astore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Astore, Opcode::Astore0, slot)
    }

    pub fn istore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Istore, Opcode::Istore0, slot)
    }

    pub fn lstore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Lstore, Opcode::Lstore0, slot)
    }

    pub fn fstore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Fstore, Opcode::Fstore0, slot)
    }

    pub fn dstore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Dstore, Opcode::Dstore0, slot)
    }

    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        let wide = slot > u8::MAX as u16 || i8::try_from(delta).is_err();
        self.emit(Instruction::Increment { slot, delta, wide })
    }

    /// Pushes an int with the shortest instruction that holds it.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => match Opcode::from_u8((Opcode::Iconst0.code() as i32 + value) as u8) {
                Some(opcode) => self.op(opcode),
                None => self,
            },
            _ => match i16::try_from(value) {
                Ok(short) if i8::try_from(value).is_ok() => self.emit(Instruction::Push {
                    opcode: Opcode::Bipush,
                    value: short,
                }),
                Ok(short) => self.emit(Instruction::Push {
                    opcode: Opcode::Sipush,
                    value: short,
                }),
                Err(_) => self.ldc_int(value),
            },
        }
    }

    fn ldc(&mut self, index: Option<u16>) -> &mut Self {
        match index {
            Some(index) if index <= u8::MAX as u16 => self.emit(Instruction::Constant {
                opcode: Opcode::Ldc,
                index,
            }),
            Some(index) => self.emit(Instruction::Constant {
                opcode: Opcode::LdcW,
                index,
            }),
            None => self,
        }
    }

    fn ldc2(&mut self, index: Option<u16>) -> &mut Self {
        match index {
            Some(index) => self.emit(Instruction::Constant {
                opcode: Opcode::Ldc2W,
                index,
            }),
            None => self,
        }
    }

    pub fn ldc_int(&mut self, value: i32) -> &mut Self {
        let index = self.allocate(|pool| pool.integer(value));
        self.ldc(index)
    }

    pub fn ldc_float(&mut self, value: f32) -> &mut Self {
        let index = self.allocate(|pool| pool.float(value));
        self.ldc(index)
    }

    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = self.allocate(|pool| pool.string(value));
        self.ldc(index)
    }

    pub fn ldc_class(&mut self, name: &str) -> &mut Self {
        let index = self.allocate(|pool| pool.class(name));
        self.ldc(index)
    }

    pub fn ldc_long(&mut self, value: i64) -> &mut Self {
        let index = self.allocate(|pool| pool.long(value));
        self.ldc2(index)
    }

    pub fn ldc_double(&mut self, value: f64) -> &mut Self {
        let index = self.allocate(|pool| pool.double(value));
        self.ldc2(index)
    }

    fn field(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        match self.allocate(|pool| pool.field_ref(owner, name, descriptor)) {
            Some(index) => self.emit(Instruction::Field { opcode, index }),
            None => self,
        }
    }

    pub fn getstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(Opcode::Getstatic, owner, name, descriptor)
    }

    pub fn putstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(Opcode::Putstatic, owner, name, descriptor)
    }

    pub fn getfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(Opcode::Getfield, owner, name, descriptor)
    }

    pub fn putfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field(Opcode::Putfield, owner, name, descriptor)
    }

    fn invoke(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        match self.allocate(|pool| pool.method_ref(owner, name, descriptor)) {
            Some(index) => self.emit(Instruction::Invoke { opcode, index }),
            None => self,
        }
    }

    pub fn invokevirtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor)
    }

    pub fn invokespecial(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor)
    }

    pub fn invokestatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor)
    }

    pub fn invokeinterface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let count = match MethodDescriptor::parse(descriptor) {
            Ok(method) => (method.parameter_slots() + 1) as u8,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        match self.allocate(|pool| pool.interface_method_ref(owner, name, descriptor)) {
            Some(index) => self.emit(Instruction::InvokeInterface { index, count }),
            None => self,
        }
    }

    fn type_insn(&mut self, opcode: Opcode, class: &str) -> &mut Self {
        match self.allocate(|pool| pool.class(class)) {
            Some(index) => self.emit(Instruction::Type { opcode, index }),
            None => self,
        }
    }

    pub fn new_(&mut self, class: &str) -> &mut Self {
        self.type_insn(Opcode::New, class)
    }

    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        self.type_insn(Opcode::Anewarray, class)
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        self.type_insn(Opcode::Checkcast, class)
    }

    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        self.type_insn(Opcode::Instanceof, class)
    }

    pub fn newarray(&mut self, atype: ArrayType) -> &mut Self {
        self.emit(Instruction::NewArray(atype))
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Binds `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(self.instructions.len());
        }
        self
    }

    pub fn branch(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.emit(Instruction::Branch {
            opcode,
            target: label.0,
        })
    }

    pub fn goto_(&mut self, label: Label) -> &mut Self {
        self.branch(Opcode::Goto, label)
    }

    pub fn ifeq(&mut self, label: Label) -> &mut Self {
        self.branch(Opcode::Ifeq, label)
    }

    pub fn ifne(&mut self, label: Label) -> &mut Self {
        self.branch(Opcode::Ifne, label)
    }

    /// `targets[i]` handles the value `low + i`; there must be at least one.
    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let high = targets
            .len()
            .checked_sub(1)
            .and_then(|last| i32::try_from(last).ok())
            .and_then(|last| low.checked_add(last));
        let Some(high) = high else {
            self.fail(ClassFileError::MalformedAttribute {
                name: "Code".into(),
                reason: format!(
                    "tableswitch from {} cannot hold {} targets",
                    low,
                    targets.len()
                ),
            });
            return self;
        };
        self.emit(Instruction::TableSwitch {
            default: default.0,
            low,
            high,
            targets: targets.iter().map(|label| label.0).collect(),
        })
    }

    pub fn lookupswitch(&mut self, default: Label, cases: &[(i32, Label)]) -> &mut Self {
        let mut pairs = cases
            .iter()
            .map(|(key, label)| (*key, label.0))
            .collect::<Vec<_>>();
        pairs.sort_by_key(|(key, _)| *key);
        self.emit(Instruction::LookupSwitch {
            default: default.0,
            pairs,
        })
    }

    pub fn return_(&mut self) -> &mut Self {
        self.op(Opcode::Return)
    }

    pub fn ireturn(&mut self) -> &mut Self {
        self.op(Opcode::Ireturn)
    }

    pub fn areturn(&mut self) -> &mut Self {
        self.op(Opcode::Areturn)
    }

    pub fn athrow(&mut self) -> &mut Self {
        self.op(Opcode::Athrow)
    }

    pub fn iadd(&mut self) -> &mut Self {
        self.op(Opcode::Iadd)
    }

    pub fn imul(&mut self) -> &mut Self {
        self.op(Opcode::Imul)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.op(Opcode::Dup)
    }

    pub fn pop(&mut self) -> &mut Self {
        self.op(Opcode::Pop)
    }

    /// Attributes the next emitted instruction to source line `line`.
    pub fn line_number(&mut self, line: u16) -> &mut Self {
        self.line_numbers.push((self.instructions.len(), line));
        self
    }

    pub fn local_variable(
        &mut self,
        slot: u16,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
    ) -> &mut Self {
        let Some(name_index) = self.allocate(|pool| pool.utf8(name)) else {
            return self;
        };
        let Some(descriptor_index) = self.allocate(|pool| pool.utf8(descriptor)) else {
            return self;
        };
        self.local_variables.push(LocalVariableDecl {
            slot,
            name_index,
            descriptor_index,
            start,
            end,
        });
        self
    }

    /// Covers `[start, end)` with a handler at `handler`; `None` catches everything.
    pub fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        let catch_type = match catch_type {
            Some(class) => match self.allocate(|pool| pool.class(class)) {
                Some(index) => index,
                None => return self,
            },
            None => 0,
        };
        self.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
        self
    }

    /// Lays the code out and computes its bounds. `descriptor` and
    /// `is_static` give the slots the parameters take.
    pub fn finish(self, is_static: bool, descriptor: &str) -> Result<CodeAttribute> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let labels = self.labels;
        let bound = |label: u32| -> Result<usize> {
            labels
                .get(label as usize)
                .copied()
                .flatten()
                .ok_or(ClassFileError::UnboundLabel(label))
        };
        let assembled = assembler::assemble(&self.instructions, bound)?;
        let offset_of = |label: Label| -> Result<u16> { Ok(assembled.offsets[bound(label.0)?] as u16) };

        let exception_table = self
            .handlers
            .iter()
            .map(|h| {
                Ok(ExceptionTableEntry {
                    start_pc: offset_of(h.start)?,
                    end_pc: offset_of(h.end)?,
                    handler_pc: offset_of(h.handler)?,
                    catch_type: h.catch_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let method = MethodDescriptor::parse(descriptor)?;
        let initial_locals = method.parameter_slots() + u16::from(!is_static);
        let handler_offsets = exception_table
            .iter()
            .map(|entry| entry.handler_pc as u32)
            .collect::<Vec<_>>();
        let (max_stack, max_locals) = assembler::compute_maxs(
            &assembled.instructions,
            &assembled.offsets,
            &handler_offsets,
            self.pool.as_pool(),
            initial_locals,
        )?;

        let mut attributes = Vec::new();
        let line_numbers = self
            .line_numbers
            .iter()
            .filter(|(index, _)| *index < assembled.instructions.len())
            .map(|(index, line)| LineNumber {
                start_pc: assembled.offsets[*index] as u16,
                line_number: *line,
            })
            .collect::<Vec<_>>();
        if !line_numbers.is_empty() {
            attributes.push(Attribute {
                name_index: self.pool.utf8("LineNumberTable")?,
                info: AttributeInfo::LineNumberTable(line_numbers),
            });
        }

        let local_variables = self
            .local_variables
            .iter()
            .map(|var| {
                let start_pc = offset_of(var.start)?;
                Ok(LocalVariable {
                    start_pc,
                    length: offset_of(var.end)?.saturating_sub(start_pc),
                    name_index: var.name_index,
                    descriptor_index: var.descriptor_index,
                    index: var.slot,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if !local_variables.is_empty() {
            attributes.push(Attribute {
                name_index: self.pool.utf8("LocalVariableTable")?,
                info: AttributeInfo::LocalVariableTable(local_variables),
            });
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            instructions: assembled.instructions,
            exception_table,
            attributes: Attributes(attributes),
        })
    }
}
