//! A straight-line bytecode interpreter.
//!
//! The interpreter executes the instruction subset listed in [`crate::classfile::opcodes`]: enough
//! to run constructors and forwarding bodies produced by the synthesizer, and the small concrete
//! methods tests write by hand. Control flow never branches, so a frame is a simple loop over the
//! bytecode that ends at the first return or throw.
//!
//! Faults the JVM reports with exceptions (null dereference, failed casts, missing methods) are
//! raised as [`crate::runtime::Throwable`]s and surface as [`crate::Error::Thrown`]. Bytecode
//! outside the subset, and violations of the stack discipline, are [`crate::Error::Execution`].

use crate::{
    classfile::{opcodes, Code, Constant, ConstantPool, FieldType, MemberRef, MethodAccessFlags, MethodType},
    config::ExecutionLimits,
    runtime::{
        class::{ClassRef, ResolvedMethod, RuntimeClass},
        natives,
        value::{ArrayRef, Instance, ObjectRef, Reference, Throwable, Value},
        LoadingContext,
    },
    Error, Result,
};

/// Build a guest exception of class `class_name`.
pub(crate) fn throw(class_name: &str, message: &str) -> Error {
    Error::Thrown(Throwable::new(class_name, Some(message)))
}

/// Executes methods of classes linked in one loading context.
pub struct Interpreter<'c> {
    context: &'c dyn LoadingContext,
    limits: ExecutionLimits,
}

impl<'c> Interpreter<'c> {
    /// Interpreter over `context` with default limits.
    #[must_use]
    pub fn new(context: &'c dyn LoadingContext) -> Self {
        Interpreter {
            context,
            limits: ExecutionLimits::default(),
        }
    }

    /// Replace the execution limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Allocate an instance of `class` and run its constructor `descriptor` with `args`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Thrown`] if the class is abstract, has no such constructor or the
    /// constructor throws.
    pub fn instantiate(&self, class: &ClassRef, descriptor: &str, args: &[Value]) -> Result<ObjectRef> {
        if class.is_abstract() {
            return Err(throw("java/lang/InstantiationError", class.name()));
        }
        let Some(constructor) = RuntimeClass::find_declared_or_inherited(class, "<init>", descriptor)
            .filter(|m| m.class.name() == class.name())
        else {
            return Err(throw(
                "java/lang/NoSuchMethodError",
                &format!("{}.<init>{}", class.name(), descriptor),
            ));
        };

        let object = Instance::allocate(class);
        let mut locals = Vec::with_capacity(args.len() + 1);
        locals.push(Value::object(&object));
        locals.extend_from_slice(args);
        self.call(&constructor, locals, 0)?;
        Ok(object)
    }

    /// Call a method on `receiver` with virtual dispatch.
    ///
    /// `void` methods yield [`Value::Null`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Thrown`] for guest exceptions, including `AbstractMethodError`
    /// when the resolved method has no body.
    pub fn invoke_virtual(
        &self,
        receiver: &ObjectRef,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Value> {
        let Some(method) = RuntimeClass::find_method(receiver.class(), name, descriptor) else {
            return Err(throw(
                "java/lang/NoSuchMethodError",
                &format!("{}.{}{}", receiver.class().name(), name, descriptor),
            ));
        };

        let mut locals = Vec::with_capacity(args.len() + 1);
        locals.push(Value::object(receiver));
        locals.extend_from_slice(args);
        Ok(self.call(&method, locals, 0)?.unwrap_or(Value::Null))
    }

    /// Call a static method of `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Thrown`] for guest exceptions.
    pub fn invoke_static(
        &self,
        class: &ClassRef,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Value> {
        let Some(method) = RuntimeClass::find_declared_or_inherited(class, name, descriptor)
            .filter(|m| m.info().access_flags.contains(MethodAccessFlags::STATIC))
        else {
            return Err(throw(
                "java/lang/NoSuchMethodError",
                &format!("{}.{}{}", class.name(), name, descriptor),
            ));
        };
        Ok(self.call(&method, args.to_vec(), 0)?.unwrap_or(Value::Null))
    }

    fn call(&self, method: &ResolvedMethod, args: Vec<Value>, depth: usize) -> Result<Option<Value>> {
        if depth >= self.limits.max_call_depth {
            return Err(Error::RecursionLimit(self.limits.max_call_depth));
        }

        let info = method.info();
        tracing::trace!(
            class = method.class.name(),
            method = %info.name,
            descriptor = %info.descriptor,
            depth,
            "interpreting"
        );

        let Some(code) = &info.code else {
            if info.access_flags.contains(MethodAccessFlags::ABSTRACT) {
                return Err(throw(
                    "java/lang/AbstractMethodError",
                    &format!("{}.{}{}", method.class.name(), info.name, info.descriptor),
                ));
            }
            return Err(throw(
                "java/lang/UnsatisfiedLinkError",
                &format!("{}.{}{}", method.class.name(), info.name, info.descriptor),
            ));
        };

        let mut locals = vec![Value::Null; code.max_locals as usize];
        let mut slot = 0;
        for arg in args {
            let wide = arg.is_wide();
            let Some(local) = locals.get_mut(slot) else {
                return Err(Error::Execution(format!(
                    "{}.{} declares {} locals, too few for its arguments",
                    method.class.name(),
                    info.name,
                    code.max_locals
                )));
            };
            *local = arg;
            slot += if wide { 2 } else { 1 };
        }

        let mut frame = Frame {
            class: &method.class,
            pool: &method.class.file().constant_pool,
            code,
            locals,
            stack: Vec::with_capacity(code.max_stack as usize),
            pc: 0,
        };
        self.run(&mut frame, depth)
    }

    #[allow(clippy::too_many_lines)]
    fn run(&self, frame: &mut Frame<'_>, depth: usize) -> Result<Option<Value>> {
        let pool = frame.pool;
        loop {
            let opcode = frame.u8()?;
            match opcode {
                opcodes::NOP => {}
                opcodes::ACONST_NULL => frame.push(Value::Null),
                opcodes::ICONST_M1..=opcodes::ICONST_5 => {
                    frame.push(Value::Int(i32::from(opcode) - i32::from(opcodes::ICONST_0)));
                }
                opcodes::LCONST_0 | opcodes::LCONST_1 => {
                    frame.push(Value::Long(i64::from(opcode - opcodes::LCONST_0)));
                }
                opcodes::FCONST_0..=opcodes::FCONST_2 => {
                    frame.push(Value::Float(f32::from(opcode - opcodes::FCONST_0)));
                }
                opcodes::DCONST_0 | opcodes::DCONST_1 => {
                    frame.push(Value::Double(f64::from(opcode - opcodes::DCONST_0)));
                }
                opcodes::BIPUSH => {
                    let value = frame.u8()? as i8;
                    frame.push(Value::Int(i32::from(value)));
                }
                opcodes::SIPUSH => {
                    let value = frame.u16()? as i16;
                    frame.push(Value::Int(i32::from(value)));
                }
                opcodes::LDC => {
                    let index = u16::from(frame.u8()?);
                    let value = frame.constant(index)?;
                    frame.push(value);
                }
                opcodes::LDC_W | opcodes::LDC2_W => {
                    let index = frame.u16()?;
                    let value = frame.constant(index)?;
                    frame.push(value);
                }
                opcodes::ILOAD..=opcodes::ALOAD => {
                    let index = frame.u8()?;
                    frame.load(index as usize)?;
                }
                opcodes::ILOAD_0..=0x2D => {
                    frame.load(((opcode - opcodes::ILOAD_0) % 4) as usize)?;
                }
                opcodes::ISTORE..=opcodes::ASTORE => {
                    let index = frame.u8()?;
                    frame.store(index as usize)?;
                }
                opcodes::ISTORE_0..=0x4E => {
                    frame.store(((opcode - opcodes::ISTORE_0) % 4) as usize)?;
                }
                opcodes::AALOAD => {
                    let index = frame.pop_int()?;
                    let array = frame.pop_array()?;
                    let Some(value) = usize::try_from(index)
                        .ok()
                        .map(|i| array.get(i))
                        .transpose()?
                        .flatten()
                    else {
                        return Err(throw(
                            "java/lang/ArrayIndexOutOfBoundsException",
                            &index.to_string(),
                        ));
                    };
                    frame.push(value);
                }
                opcodes::AASTORE => {
                    let value = frame.pop()?;
                    let index = frame.pop_int()?;
                    let array = frame.pop_array()?;
                    let stored = match usize::try_from(index) {
                        Ok(i) => array.set(i, value)?,
                        Err(_) => false,
                    };
                    if !stored {
                        return Err(throw(
                            "java/lang/ArrayIndexOutOfBoundsException",
                            &index.to_string(),
                        ));
                    }
                }
                opcodes::POP => {
                    frame.pop()?;
                }
                opcodes::POP2 => {
                    if !frame.pop()?.is_wide() {
                        frame.pop()?;
                    }
                }
                opcodes::DUP => {
                    let top = frame.pop()?;
                    frame.push(top.clone());
                    frame.push(top);
                }
                opcodes::IADD | opcodes::ISUB | opcodes::IMUL => {
                    let b = frame.pop_int()?;
                    let a = frame.pop_int()?;
                    let result = match opcode {
                        opcodes::IADD => a.wrapping_add(b),
                        opcodes::ISUB => a.wrapping_sub(b),
                        _ => a.wrapping_mul(b),
                    };
                    frame.push(Value::Int(result));
                }
                opcodes::IRETURN..=opcodes::ARETURN => return Ok(Some(frame.pop()?)),
                opcodes::RETURN => return Ok(None),
                opcodes::GETSTATIC => {
                    let index = frame.u16()?;
                    let member = pool.member_ref(index)?;
                    let Some(value) = natives::get_static(&member) else {
                        return Err(Error::Execution(format!(
                            "static field {}.{} is not supported",
                            member.class, member.name
                        )));
                    };
                    frame.push(value);
                }
                opcodes::GETFIELD => {
                    let index = frame.u16()?;
                    let member = pool.member_ref(index)?;
                    let object = frame.pop_object(&member)?;
                    let owner = field_owner(&object, &member)?;
                    frame.push(Instance::get_field(&object, &owner, member.name)?);
                }
                opcodes::PUTFIELD => {
                    let index = frame.u16()?;
                    let member = pool.member_ref(index)?;
                    let value = frame.pop()?;
                    let object = frame.pop_object(&member)?;
                    let owner = field_owner(&object, &member)?;
                    Instance::put_field(&object, &owner, member.name, value)?;
                }
                opcodes::INVOKEVIRTUAL
                | opcodes::INVOKESPECIAL
                | opcodes::INVOKESTATIC
                | opcodes::INVOKEINTERFACE => {
                    let index = frame.u16()?;
                    if opcode == opcodes::INVOKEINTERFACE {
                        // count and the reserved zero byte
                        frame.u16()?;
                    }
                    let member = pool.member_ref(index)?;
                    if let Some(result) = self.invoke(frame, opcode, &member, depth)? {
                        frame.push(result);
                    }
                }
                opcodes::NEW => {
                    let index = frame.u16()?;
                    let name = pool.class_name(index)?;
                    let class = self.class(name)?;
                    if class.is_abstract() {
                        return Err(throw("java/lang/InstantiationError", name));
                    }
                    frame.push(Value::object(&Instance::allocate(&class)));
                }
                opcodes::ANEWARRAY => {
                    let index = frame.u16()?;
                    let component = FieldType::from_class_constant_name(pool.class_name(index)?)?;
                    let count = frame.pop_int()?;
                    let Ok(len) = usize::try_from(count) else {
                        return Err(throw(
                            "java/lang/NegativeArraySizeException",
                            &count.to_string(),
                        ));
                    };
                    frame.push(Value::Ref(Reference::Array(ArrayRef::new(component, len))));
                }
                opcodes::ARRAYLENGTH => {
                    let array = frame.pop_array()?;
                    let len = i32::try_from(array.len()).unwrap_or(i32::MAX);
                    frame.push(Value::Int(len));
                }
                opcodes::ATHROW => {
                    return Err(match frame.pop()? {
                        Value::Ref(Reference::Throwable(throwable)) => Error::Thrown(throwable),
                        Value::Ref(Reference::Object(object)) => {
                            Error::Thrown(Throwable::new(object.class().name(), None))
                        }
                        Value::Null => throw("java/lang/NullPointerException", "athrow null"),
                        other => Error::Execution(format!("athrow of {other:?}")),
                    });
                }
                opcodes::CHECKCAST => {
                    let index = frame.u16()?;
                    let target = pool.class_name(index)?;
                    let top = frame.peek()?;
                    if let Value::Ref(reference) = top {
                        if !is_instance_of(reference, target) {
                            return Err(throw(
                                "java/lang/ClassCastException",
                                &format!("{} cannot be cast to {}", reference.class_name(), target),
                            ));
                        }
                    }
                }
                opcodes::INSTANCEOF => {
                    let index = frame.u16()?;
                    let target = pool.class_name(index)?;
                    let result = match frame.pop()? {
                        Value::Ref(reference) => is_instance_of(&reference, target),
                        _ => false,
                    };
                    frame.push(Value::Int(i32::from(result)));
                }
                other => {
                    return Err(Error::Execution(format!(
                        "unsupported opcode {} (0x{:02x}) at {} in {}",
                        opcodes::mnemonic(other),
                        other,
                        frame.pc - 1,
                        frame.class.name()
                    )))
                }
            }
        }
    }

    fn class(&self, name: &str) -> Result<ClassRef> {
        match self.context.lookup(name)? {
            Some(class) => Ok(class),
            None => Err(throw("java/lang/NoClassDefFoundError", name)),
        }
    }

    fn invoke(
        &self,
        frame: &mut Frame<'_>,
        opcode: u8,
        member: &MemberRef<'_>,
        depth: usize,
    ) -> Result<Option<Value>> {
        let method_type = MethodType::parse(member.descriptor)?;
        let mut args = Vec::with_capacity(method_type.parameters.len() + 1);
        for _ in 0..method_type.parameters.len() {
            args.push(frame.pop()?);
        }
        args.reverse();

        let receiver = if opcode == opcodes::INVOKESTATIC {
            None
        } else {
            Some(frame.pop()?)
        };

        if let Some(result) =
            natives::invoke_native(self.context, opcode, member, receiver.as_ref(), &args)?
        {
            return Ok(result);
        }

        let Some(receiver) = receiver else {
            let class = self.class(member.class)?;
            let Some(method) = RuntimeClass::find_declared_or_inherited(&class, member.name, member.descriptor)
                .filter(|m| m.info().access_flags.contains(MethodAccessFlags::STATIC))
            else {
                return Err(throw(
                    "java/lang/NoSuchMethodError",
                    &format!("{}.{}{}", member.class, member.name, member.descriptor),
                ));
            };
            return self.call(&method, args, depth + 1);
        };

        let object = match &receiver {
            Value::Ref(Reference::Object(object)) => object.clone(),
            Value::Null => {
                return Err(throw(
                    "java/lang/NullPointerException",
                    &format!("{}.{}", member.class, member.name),
                ))
            }
            other => {
                return Err(Error::Execution(format!(
                    "cannot call {}.{}{} on {:?}",
                    member.class, member.name, member.descriptor, other
                )))
            }
        };

        let method = if opcode == opcodes::INVOKESPECIAL {
            let class = match RuntimeClass::ancestor(object.class(), member.class) {
                Some(class) => class,
                None => self.class(member.class)?,
            };
            RuntimeClass::find_declared_or_inherited(&class, member.name, member.descriptor)
        } else {
            RuntimeClass::find_method(object.class(), member.name, member.descriptor)
        };

        let Some(method) = method else {
            let error = if opcode == opcodes::INVOKEINTERFACE {
                "java/lang/AbstractMethodError"
            } else {
                "java/lang/NoSuchMethodError"
            };
            return Err(throw(
                error,
                &format!("{}.{}{}", object.class().name(), member.name, member.descriptor),
            ));
        };

        let mut locals = Vec::with_capacity(args.len() + 1);
        locals.push(receiver);
        locals.extend(args);
        self.call(&method, locals, depth + 1)
    }
}

/// Declaring class of the field `member` as seen from `object`.
fn field_owner(object: &ObjectRef, member: &MemberRef<'_>) -> Result<String> {
    let Some(start) = RuntimeClass::ancestor(object.class(), member.class) else {
        return Err(throw(
            "java/lang/IncompatibleClassChangeError",
            &format!("{} is not a {}", object.class().name(), member.class),
        ));
    };
    match RuntimeClass::field_owner(&start, member.name) {
        Some(owner) => Ok(owner.name().to_string()),
        None => Err(throw(
            "java/lang/NoSuchFieldError",
            &format!("{}.{}", member.class, member.name),
        )),
    }
}

/// `checkcast` / `instanceof` for a non-null reference.
pub(crate) fn is_instance_of(reference: &Reference, target: &str) -> bool {
    if target == "java/lang/Object" {
        return true;
    }
    match reference {
        Reference::Object(object) => RuntimeClass::is_assignable_to(object.class(), target),
        Reference::String(_) => matches!(
            target,
            "java/lang/String"
                | "java/lang/CharSequence"
                | "java/lang/Comparable"
                | "java/io/Serializable"
        ),
        Reference::Class(_) => target == "java/lang/Class",
        Reference::Method(_) => matches!(
            target,
            "java/lang/reflect/Method"
                | "java/lang/reflect/Executable"
                | "java/lang/reflect/AccessibleObject"
        ),
        Reference::Array(array) => match FieldType::from_class_constant_name(target) {
            Ok(FieldType::Array(component)) => {
                *component == *array.component()
                    || (component.as_ref() == &FieldType::object("java/lang/Object")
                        && array.component().is_reference())
            }
            _ => false,
        },
        Reference::Boxed(primitive) => {
            let base = primitive.base_type();
            target == base.wrapper_class()
                || target == "java/io/Serializable"
                || (target == "java/lang/Number"
                    && !matches!(
                        base,
                        crate::classfile::BaseType::Boolean | crate::classfile::BaseType::Char
                    ))
        }
        Reference::Handler(_) => target == crate::runtime::loader::INVOCATION_HANDLER,
        Reference::Throwable(throwable) => {
            target == throwable.class_name() || target == "java/lang/Throwable"
        }
    }
}

struct Frame<'f> {
    class: &'f ClassRef,
    pool: &'f ConstantPool,
    code: &'f Code,
    locals: Vec<Value>,
    stack: Vec<Value>,
    pc: usize,
}

impl Frame<'_> {
    fn u8(&mut self) -> Result<u8> {
        match self.code.bytecode.get(self.pc) {
            Some(&byte) => {
                self.pc += 1;
                Ok(byte)
            }
            None => Err(Error::Execution(format!(
                "fell off the end of code in {}",
                self.class.name()
            ))),
        }
    }

    fn u16(&mut self) -> Result<u16> {
        let high = self.u8()?;
        let low = self.u8()?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| {
            Error::Execution(format!(
                "operand stack underflow at {} in {}",
                self.pc,
                self.class.name()
            ))
        })
    }

    fn peek(&self) -> Result<&Value> {
        self.stack.last().ok_or_else(|| {
            Error::Execution(format!(
                "operand stack underflow at {} in {}",
                self.pc,
                self.class.name()
            ))
        })
    }

    fn pop_int(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(Error::Execution(format!("expected int, found {other:?}"))),
        }
    }

    fn pop_array(&mut self) -> Result<ArrayRef> {
        match self.pop()? {
            Value::Ref(Reference::Array(array)) => Ok(array),
            Value::Null => Err(throw("java/lang/NullPointerException", "array is null")),
            other => Err(Error::Execution(format!("expected array, found {other:?}"))),
        }
    }

    fn pop_object(&mut self, member: &MemberRef<'_>) -> Result<ObjectRef> {
        match self.pop()? {
            Value::Ref(Reference::Object(object)) => Ok(object),
            Value::Null => Err(throw(
                "java/lang/NullPointerException",
                &format!("{}.{}", member.class, member.name),
            )),
            other => Err(Error::Execution(format!(
                "field access {}.{} on {:?}",
                member.class, member.name, other
            ))),
        }
    }

    fn load(&mut self, index: usize) -> Result<()> {
        let Some(value) = self.locals.get(index) else {
            return Err(Error::Execution(format!(
                "local {} out of range in {}",
                index,
                self.class.name()
            )));
        };
        self.stack.push(value.clone());
        Ok(())
    }

    fn store(&mut self, index: usize) -> Result<()> {
        let value = self.pop()?;
        let width = if value.is_wide() { 2 } else { 1 };
        if index + width > self.locals.len() {
            return Err(Error::Execution(format!(
                "local {} out of range in {}",
                index,
                self.class.name()
            )));
        }
        self.locals[index] = value;
        if width == 2 {
            self.locals[index + 1] = Value::Null;
        }
        Ok(())
    }

    fn constant(&self, index: u16) -> Result<Value> {
        Ok(match self.pool.get(index)? {
            Constant::Integer(value) => Value::Int(*value),
            Constant::Float(value) => Value::Float(*value),
            Constant::Long(value) => Value::Long(*value),
            Constant::Double(value) => Value::Double(*value),
            Constant::String(utf8) => Value::string(self.pool.utf8(*utf8)?),
            Constant::Class(name) => Value::Ref(Reference::Class(
                FieldType::from_class_constant_name(self.pool.utf8(*name)?)?,
            )),
            other => {
                return Err(Error::Execution(format!(
                    "unsupported loadable constant {other:?}"
                )))
            }
        })
    }
}
