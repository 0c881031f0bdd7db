//! A minimal host runtime for generated types.
//!
//! The synthesizer produces class files; something has to define them and run them to show the
//! forwarding contract holds. This module is that something: a [`ClassPool`] that links classes
//! into [`RuntimeClass`]es, a heap of [`Instance`]s, and an [`Interpreter`] for the straight-line
//! bytecode the emitter writes. JDK methods referenced by generated code (boxing, reflection
//! lookup, `InvocationHandler.invoke`) are implemented natively, and `InvocationHandler`s are
//! plain Rust values implementing [`InvocationHandler`].
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{opcodes, BaseType, ClassFileBuilder, FieldType, MethodAccessFlags, MethodSpec};
//! use dynsubclass::runtime::{ClassPool, Interpreter, LoadingContext, Value};
//!
//! let int = FieldType::Base(BaseType::Int);
//! let bytes = ClassFileBuilder::new("com/example/Adder")
//!     .default_constructor()?
//!     .method(MethodSpec::new(MethodAccessFlags::PUBLIC, "add", "(II)I"), |code| {
//!         code.load(&int, 1)?
//!             .load(&int, 2)?
//!             .int_arithmetic(opcodes::IADD)?
//!             .return_value(Some(&int))?;
//!         Ok(())
//!     })?
//!     .build()?;
//!
//! let pool = ClassPool::new()?;
//! pool.add_class(bytes)?;
//! let class = pool.lookup("com/example/Adder")?.expect("linked");
//!
//! let interpreter = Interpreter::new(&pool);
//! let adder = interpreter.instantiate(&class, "()V", &[])?;
//! let sum = interpreter.invoke_virtual(&adder, "add", "(II)I", &[Value::Int(2), Value::Int(3)])?;
//! assert_eq!(sum, Value::Int(5));
//! # Ok::<(), dynsubclass::Error>(())
//! ```

mod class;
mod handler;
mod interpreter;
mod loader;
mod natives;
mod value;

pub use class::{ClassRef, ResolvedMethod, RuntimeClass};
pub use handler::InvocationHandler;
pub use interpreter::Interpreter;
pub use loader::{
    ClassPath, ClassPool, ContextId, LoadingContext, INVOCATION_HANDLER, INVOKE_DESCRIPTOR, OBJECT,
};
pub use value::{ArrayRef, Instance, MethodRef, ObjectRef, Primitive, Reference, Slot, Throwable, Value};
