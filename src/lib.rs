// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a class file into memory

//! # dynsubclass
//!
//! Run-time synthesis of concrete JVM subclasses.
//!
//! Given an abstract class or an interface, `dynsubclass` generates a concrete subtype in which
//! every abstract method (and, on request, every public overridable method) forwards its call
//! to an invocation handler bound to the instance. Annotations on the original type, its
//! methods, their parameters and its public constructors are copied onto the generated type,
//! so code that discovers behavior reflectively treats the generated type like the original.
//! Generated types are installed through a loading context at most once per original type and
//! context, however many threads ask concurrently.
//!
//! ## Features
//!
//! - **Class-file codec** - Bounds-checked reader and writer for JVM class files, including
//!   the constant pool, annotations and the `Code` attribute
//! - **Dispatch resolution** - Override-aware selection of the methods to forward
//! - **Metadata copying** - Most specific annotated declaration wins, per method
//! - **At-most-once installation** - Double-checked install guard over a sharded lock
//! - **Reference runtime** - A class pool and a small interpreter that load and run generated
//!   types, so the whole pipeline can be exercised without a JVM
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dynsubclass::prelude::*;
//!
//! // public interface Calculator { int add(int a, int b); }
//! let calculator = ClassFileBuilder::interface("com/example/Calculator")
//!     .declare(MethodSpec::new(
//!         MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
//!         "add",
//!         "(II)I",
//!     ))
//!     .build()?;
//!
//! let pool = ClassPool::new()?;
//! pool.add_class(calculator)?;
//!
//! let synthesizer = Synthesizer::default();
//! let generated = synthesizer.synthesize("com/example/Calculator", &pool, false)?;
//!
//! let handler = |_: &ObjectRef, _: &MethodRef, args: &[Value]| -> std::result::Result<Value, Throwable> {
//!     match (args[0].as_boxed(), args[1].as_boxed()) {
//!         (Some(Primitive::Int(a)), Some(Primitive::Int(b))) => Ok(Value::boxed(Primitive::Int(a + b))),
//!         _ => Err(Throwable::new("java/lang/IllegalArgumentException", None)),
//!     }
//! };
//! let instance = synthesizer.new_instance(&generated, &pool, "()V", &[], Some(Arc::new(handler)))?;
//!
//! let sum = Interpreter::new(&pool).invoke_virtual(
//!     &instance,
//!     "add",
//!     "(II)I",
//!     &[Value::Int(2), Value::Int(3)],
//! )?;
//! assert_eq!(sum, Value::Int(5));
//! # Ok::<(), dynsubclass::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] - Class-file model, reader and writer
//! - [`synth`] - Hierarchy model, resolver, emitter, metadata copier and install guard
//! - [`runtime`] - Loading contexts, handler contract and the reference interpreter
//! - [`config`] - Synthesizer and interpreter configuration
//! - [`prelude`] - Convenient re-exports of commonly used types
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Failures of the loading context, such as
//! [`Error::NotFound`], propagate unchanged; throwables raised by handlers arrive as
//! [`Error::Thrown`] carrying the very object that was raised.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` for synthesis requests and installations,
//! `trace` for resolver decisions and install-guard transitions. Install any subscriber to see
//! them, for example `tracing-subscriber` with `RUST_LOG=dynsubclass=debug`.
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run classfile --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dynsubclass::prelude::*;
///
/// let pool = ClassPool::new()?;
/// let synthesizer = Synthesizer::default();
/// assert!(synthesizer.synthesize("com/example/Missing", &pool, false).is_err());
/// # Ok::<(), dynsubclass::Error>(())
/// ```
pub mod prelude;

/// JVM class files: constant pool, descriptors, annotations and bytecode assembly.
///
/// # Key Types
///
/// - [`classfile::ClassFile`] - A decoded class file
/// - [`classfile::ClassFileBuilder`] - Encoder for new class files
/// - [`classfile::CodeBuilder`] - Bytecode assembler with stack-depth tracking
/// - [`classfile::MethodType`] and [`classfile::FieldType`] - Parsed descriptors
pub mod classfile;

/// Synthesizer and reference-runtime configuration.
pub mod config;

/// Loading contexts, the invocation-handler contract and the reference interpreter.
pub mod runtime;

/// Run-time synthesis of forwarding subtypes.
pub mod synth;

/// `dynsubclass` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dynsubclass` Error type
///
/// Every fallible operation of the crate reports one of its variants.
pub use error::Error;

/// Shared handle to the bytes of one class file.
pub use file::ClassBytes;

/// Low-level big-endian cursor over class-file bytes.
pub use file::parser::Parser;

/// Main entry point for generating subtypes.
///
/// # Example
///
/// ```rust
/// use dynsubclass::{runtime::ClassPool, Synthesizer, SynthesisConfig};
///
/// let synthesizer = Synthesizer::new(SynthesisConfig::default().with_suffix("$$Proxy"));
/// let pool = ClassPool::new()?;
/// assert!(synthesizer.synthesize("com/example/Missing", &pool, false).is_err());
/// assert_eq!(synthesizer.installed_count(), 0);
/// # Ok::<(), dynsubclass::Error>(())
/// ```
pub use synth::{bind, synthesize, GeneratedType, HandlerSlot, SynthesisRequest, Synthesizer};

/// Configuration types.
pub use config::{ExecutionLimits, SynthesisConfig};
