//! Straight-line bytecode assembler with operand-stack accounting.
//!
//! [`CodeBuilder`] appends instructions, interning their symbolic operands in the class's
//! [`ConstantPoolBuilder`], and tracks the operand-stack depth in slots as it goes. The highest
//! depth reached becomes `max_stack`; the highest local slot touched becomes `max_locals`. The
//! instruction set is limited to what runs without branches, so no stack map frames are needed.
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{CodeBuilder, ConstantPoolBuilder};
//!
//! let mut pool = ConstantPoolBuilder::new();
//! let mut code = CodeBuilder::new(&mut pool, 1);
//! code.aload(0)?
//!     .invokespecial("java/lang/Object", "<init>", "()V")?
//!     .return_void()?;
//!
//! let body = code.finish()?;
//! assert_eq!(body.max_stack, 1);
//! assert_eq!(body.max_locals, 1);
//! assert_eq!(body.bytecode.len(), 5);
//! # Ok::<(), dynsubclass::Error>(())
//! ```

use crate::{
    classfile::{
        attributes::Code,
        constpool::ConstantPoolBuilder,
        descriptor::{BaseType, FieldType, MethodType},
        opcodes,
    },
    file::io::write_be,
    Result,
};

/// Assembles the body of one method.
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPoolBuilder,
    bytecode: Vec<u8>,
    depth: usize,
    max_stack: usize,
    max_locals: usize,
}

/// Local-variable family of a type: selects between the `i`, `l`, `f`, `d` and `a` opcodes.
fn type_offset(field: &FieldType) -> u8 {
    match field {
        FieldType::Base(BaseType::Long) => 1,
        FieldType::Base(BaseType::Float) => 2,
        FieldType::Base(BaseType::Double) => 3,
        FieldType::Base(_) => 0,
        FieldType::Object(_) | FieldType::Array(_) => 4,
    }
}

impl<'a> CodeBuilder<'a> {
    /// Start an empty body whose first `parameter_slots` locals hold `this` and the parameters.
    pub fn new(pool: &'a mut ConstantPoolBuilder, parameter_slots: usize) -> Self {
        CodeBuilder {
            pool,
            bytecode: Vec::new(),
            depth: 0,
            max_stack: 0,
            max_locals: parameter_slots,
        }
    }

    /// Access the constant pool the body interns into.
    pub fn pool(&mut self) -> &mut ConstantPoolBuilder {
        self.pool
    }

    /// Current operand-stack depth in slots.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn push(&mut self, slots: usize) {
        self.depth += slots;
        self.max_stack = self.max_stack.max(self.depth);
    }

    fn pop(&mut self, slots: usize) -> Result<()> {
        if self.depth < slots {
            return Err(codegen_error!(
                "operand stack underflow at offset {}: need {} slots, have {}",
                self.bytecode.len(),
                slots,
                self.depth
            ));
        }
        self.depth -= slots;
        Ok(())
    }

    fn emit(&mut self, opcode: u8) {
        self.bytecode.push(opcode);
    }

    fn emit_u16(&mut self, opcode: u8, operand: u16) {
        self.bytecode.push(opcode);
        write_be(&mut self.bytecode, operand);
    }

    fn local(&mut self, slot: u16, width: usize) -> Result<u8> {
        let Ok(index) = u8::try_from(slot) else {
            return Err(codegen_error!("local slot {} needs a wide instruction", slot));
        };
        self.max_locals = self.max_locals.max(slot as usize + width);
        Ok(index)
    }

    /// Push `null`.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn aconst_null(&mut self) -> Result<&mut Self> {
        self.emit(opcodes::ACONST_NULL);
        self.push(1);
        Ok(self)
    }

    /// Push an `int` constant using the shortest encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn iconst(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1..=5 => {
                // iconst_m1 .. iconst_5 are contiguous
                let opcode = (i32::from(opcodes::ICONST_0) + value) as u8;
                self.emit(opcode);
            }
            -128..=127 => {
                self.emit(opcodes::BIPUSH);
                self.bytecode.push(value as i8 as u8);
            }
            -32768..=32767 => {
                self.emit(opcodes::SIPUSH);
                write_be(&mut self.bytecode, value as i16);
            }
            _ => {
                let index = self.pool.integer(value)?;
                self.ldc_index(index);
            }
        }
        self.push(1);
        Ok(self)
    }

    fn ldc_index(&mut self, index: u16) {
        match u8::try_from(index) {
            Ok(short) => {
                self.emit(opcodes::LDC);
                self.bytecode.push(short);
            }
            Err(_) => self.emit_u16(opcodes::LDC_W, index),
        }
    }

    /// Push a `long` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn lconst(&mut self, value: i64) -> Result<&mut Self> {
        match value {
            0 => self.emit(opcodes::LCONST_0),
            1 => self.emit(opcodes::LCONST_1),
            _ => {
                let index = self.pool.long(value)?;
                self.emit_u16(opcodes::LDC2_W, index);
            }
        }
        self.push(2);
        Ok(self)
    }

    /// Push a `float` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn fconst(&mut self, value: f32) -> Result<&mut Self> {
        if value.to_bits() == 0.0_f32.to_bits() {
            self.emit(opcodes::FCONST_0);
        } else if value == 1.0 {
            self.emit(opcodes::FCONST_1);
        } else if value == 2.0 {
            self.emit(opcodes::FCONST_2);
        } else {
            let index = self.pool.float(value)?;
            self.ldc_index(index);
        }
        self.push(1);
        Ok(self)
    }

    /// Push a `double` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn dconst(&mut self, value: f64) -> Result<&mut Self> {
        if value.to_bits() == 0.0_f64.to_bits() {
            self.emit(opcodes::DCONST_0);
        } else if value == 1.0 {
            self.emit(opcodes::DCONST_1);
        } else {
            let index = self.pool.double(value)?;
            self.emit_u16(opcodes::LDC2_W, index);
        }
        self.push(2);
        Ok(self)
    }

    /// Push a string literal.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn ldc_string(&mut self, value: &str) -> Result<&mut Self> {
        let index = self.pool.string(value)?;
        self.ldc_index(index);
        self.push(1);
        Ok(self)
    }

    /// Push a class literal for an internal name or array descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn ldc_class(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.class(class)?;
        self.ldc_index(index);
        self.push(1);
        Ok(self)
    }

    /// Load a local of the given type.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if `slot` does not fit a one-byte index.
    pub fn load(&mut self, field: &FieldType, slot: u16) -> Result<&mut Self> {
        let index = self.local(slot, field.slots())?;
        let offset = type_offset(field);
        if index <= 3 {
            self.emit(opcodes::ILOAD_0 + offset * 4 + index);
        } else {
            self.emit(opcodes::ILOAD + offset);
            self.bytecode.push(index);
        }
        self.push(field.slots());
        Ok(self)
    }

    /// Store the top of stack into a local of the given type.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or slot overflow.
    pub fn store(&mut self, field: &FieldType, slot: u16) -> Result<&mut Self> {
        let index = self.local(slot, field.slots())?;
        self.pop(field.slots())?;
        let offset = type_offset(field);
        if index <= 3 {
            self.emit(opcodes::ISTORE_0 + offset * 4 + index);
        } else {
            self.emit(opcodes::ISTORE + offset);
            self.bytecode.push(index);
        }
        Ok(self)
    }

    /// Load a reference local.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if `slot` does not fit a one-byte index.
    pub fn aload(&mut self, slot: u16) -> Result<&mut Self> {
        let index = self.local(slot, 1)?;
        if index <= 3 {
            self.emit(opcodes::ALOAD_0 + index);
        } else {
            self.emit(opcodes::ALOAD);
            self.bytecode.push(index);
        }
        self.push(1);
        Ok(self)
    }

    /// Duplicate the top single-slot value.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.pop(1)?;
        self.emit(opcodes::DUP);
        self.push(2);
        Ok(self)
    }

    /// Discard a value occupying `slots` slots (`pop` or `pop2`).
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or an invalid width.
    pub fn discard(&mut self, slots: usize) -> Result<&mut Self> {
        match slots {
            0 => {}
            1 => {
                self.pop(1)?;
                self.emit(opcodes::POP);
            }
            2 => {
                self.pop(2)?;
                self.emit(opcodes::POP2);
            }
            _ => return Err(codegen_error!("cannot discard {} slots at once", slots)),
        }
        Ok(self)
    }

    /// `iadd`, `isub` or `imul`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or a non-arithmetic opcode.
    pub fn int_arithmetic(&mut self, opcode: u8) -> Result<&mut Self> {
        if !matches!(opcode, opcodes::IADD | opcodes::ISUB | opcodes::IMUL) {
            return Err(codegen_error!("0x{:02x} is not an int arithmetic opcode", opcode));
        }
        self.pop(2)?;
        self.emit(opcode);
        self.push(1);
        Ok(self)
    }

    /// Allocate an uninitialized instance.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the constant pool overflows.
    pub fn new_object(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.class(class)?;
        self.emit_u16(opcodes::NEW, index);
        self.push(1);
        Ok(self)
    }

    /// Allocate a reference array; pops the length.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn anewarray(&mut self, component: &str) -> Result<&mut Self> {
        let index = self.pool.class(component)?;
        self.pop(1)?;
        self.emit_u16(opcodes::ANEWARRAY, index);
        self.push(1);
        Ok(self)
    }

    /// Store a reference into an array: `array, index, value ->`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn aastore(&mut self) -> Result<&mut Self> {
        self.pop(3)?;
        self.emit(opcodes::AASTORE);
        Ok(self)
    }

    /// Load a reference from an array: `array, index -> value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn aaload(&mut self) -> Result<&mut Self> {
        self.pop(2)?;
        self.emit(opcodes::AALOAD);
        self.push(1);
        Ok(self)
    }

    /// `array -> length`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn arraylength(&mut self) -> Result<&mut Self> {
        self.pop(1)?;
        self.emit(opcodes::ARRAYLENGTH);
        self.push(1);
        Ok(self)
    }

    fn field_access(
        &mut self,
        opcode: u8,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self> {
        let slots = FieldType::parse(descriptor)?.slots();
        let index = self.pool.field_ref(class, name, descriptor)?;
        match opcode {
            opcodes::GETSTATIC => self.push(slots),
            opcodes::PUTSTATIC => self.pop(slots)?,
            opcodes::GETFIELD => {
                self.pop(1)?;
                self.push(slots);
            }
            _ => self.pop(slots + 1)?,
        }
        self.emit_u16(opcode, index);
        Ok(self)
    }

    /// Read a static field.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on pool overflow, or
    /// [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.field_access(opcodes::GETSTATIC, class, name, descriptor)
    }

    /// Read an instance field: `object -> value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn getfield(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.field_access(opcodes::GETFIELD, class, name, descriptor)
    }

    /// Write an instance field: `object, value ->`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn putfield(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.field_access(opcodes::PUTFIELD, class, name, descriptor)
    }

    fn invoke(
        &mut self,
        opcode: u8,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self> {
        let method = MethodType::parse(descriptor)?;
        let receiver = usize::from(opcode != opcodes::INVOKESTATIC);
        let argument_slots = method.parameter_slots() + receiver;
        self.pop(argument_slots)?;

        if opcode == opcodes::INVOKEINTERFACE {
            let index = self.pool.interface_method_ref(class, name, descriptor)?;
            let Ok(count) = u8::try_from(argument_slots) else {
                return Err(codegen_error!("too many arguments for {}.{}", class, name));
            };
            self.emit_u16(opcode, index);
            self.bytecode.push(count);
            self.bytecode.push(0);
        } else {
            let index = self.pool.method_ref(class, name, descriptor)?;
            self.emit_u16(opcode, index);
        }

        if let Some(ret) = &method.return_type {
            self.push(ret.slots());
        }
        Ok(self)
    }

    /// `invokevirtual`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcodes::INVOKEVIRTUAL, class, name, descriptor)
    }

    /// `invokespecial`, used for constructors and super calls.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn invokespecial(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcodes::INVOKESPECIAL, class, name, descriptor)
    }

    /// `invokestatic`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcodes::INVOKESTATIC, class, name, descriptor)
    }

    /// `invokeinterface`; the argument count operand is derived from the descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn invokeinterface(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<&mut Self> {
        self.invoke(opcodes::INVOKEINTERFACE, class, name, descriptor)
    }

    /// Check that the top reference is assignable to `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn checkcast(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.class(class)?;
        self.pop(1)?;
        self.emit_u16(opcodes::CHECKCAST, index);
        self.push(1);
        Ok(self)
    }

    /// `object -> 1 or 0`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn instanceof(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.class(class)?;
        self.pop(1)?;
        self.emit_u16(opcodes::INSTANCEOF, index);
        self.push(1);
        Ok(self)
    }

    /// Box the primitive on top of the stack through its wrapper's `valueOf`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn box_primitive(&mut self, base: BaseType) -> Result<&mut Self> {
        self.invokestatic(base.wrapper_class(), "valueOf", &base.value_of_descriptor())
    }

    /// Cast the reference on top of the stack to `base`'s wrapper and unbox it.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow or pool overflow.
    pub fn unbox_primitive(&mut self, base: BaseType) -> Result<&mut Self> {
        self.checkcast(base.wrapper_class())?;
        self.invokevirtual(
            base.wrapper_class(),
            base.unbox_method(),
            &base.unbox_descriptor(),
        )
    }

    /// Return from a `void` method.
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn return_void(&mut self) -> Result<&mut Self> {
        self.emit(opcodes::RETURN);
        Ok(self)
    }

    /// Return the value on top of the stack with the opcode matching `ret`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn return_value(&mut self, ret: Option<&FieldType>) -> Result<&mut Self> {
        let Some(ret) = ret else {
            return self.return_void();
        };
        self.pop(ret.slots())?;
        self.emit(opcodes::IRETURN + type_offset(ret));
        Ok(self)
    }

    /// Throw the reference on top of the stack.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] on stack underflow.
    pub fn athrow(&mut self) -> Result<&mut Self> {
        self.pop(1)?;
        self.emit(opcodes::ATHROW);
        Ok(self)
    }

    /// Finish the body.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the body is empty or its limits overflow.
    pub fn finish(self) -> Result<Code> {
        if self.bytecode.is_empty() {
            return Err(codegen_error!("empty method body"));
        }
        let (Ok(max_stack), Ok(max_locals)) = (
            u16::try_from(self.max_stack),
            u16::try_from(self.max_locals),
        ) else {
            return Err(codegen_error!(
                "stack or local limits overflow ({} / {})",
                self.max_stack,
                self.max_locals
            ));
        };

        Ok(Code {
            max_stack,
            max_locals,
            bytecode: self.bytecode,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        })
    }
}
