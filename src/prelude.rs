//! # dynsubclass Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dynsubclass library. Import it to get quick access to everything needed to
//! describe an original type, synthesize its subtype and drive instances of it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dynsubclass operations
pub use crate::Error;

/// The result type used throughout dynsubclass
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Generating and binding subtypes
pub use crate::{bind, synthesize, GeneratedType, HandlerSlot, SynthesisRequest, Synthesizer};

/// Configuration
pub use crate::{ExecutionLimits, SynthesisConfig};

/// Hierarchy model and dispatch resolution
pub use crate::synth::{model::MethodKey, resolver::DispatchSet};

// ================================================================================================
// Class Files
// ================================================================================================

/// Decoding and encoding class files
pub use crate::classfile::{
    Annotation, ClassAccessFlags, ClassFile, ClassFileBuilder, ElementValue, FieldAccessFlags, FieldSpec,
    MethodAccessFlags, MethodSpec, MethodType, ReadOptions,
};

/// Raw class-file bytes and the low-level cursor
pub use crate::{ClassBytes, Parser};

// ================================================================================================
// Runtime
// ================================================================================================

/// Loading contexts
pub use crate::runtime::{ClassPath, ClassPool, ContextId, LoadingContext};

/// Handler contract and values
pub use crate::runtime::{
    InvocationHandler, MethodRef, ObjectRef, Primitive, Reference, Throwable, Value,
};

/// Reference interpreter
pub use crate::runtime::Interpreter;
