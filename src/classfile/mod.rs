//! JVM class-file codec.
//!
//! This module reads and writes the binary type format the synthesizer consumes and produces:
//! the JVM class file as laid out in chapter 4 of the Java Virtual Machine Specification.
//!
//! # Architecture
//!
//! - **Read side** - [`crate::classfile::ClassFile::parse`] decodes a complete class file into
//!   a resolved model. Names, descriptors and annotations are decoded eagerly; method bodies are
//!   kept as raw bytecode that indexes the retained [`crate::classfile::ConstantPool`].
//! - **Write side** - [`crate::classfile::ClassFileBuilder`] encodes classes from symbolic
//!   declarations through a deduplicating [`crate::classfile::ConstantPoolBuilder`], with
//!   method bodies assembled by [`crate::classfile::CodeBuilder`].
//!
//! The two sides are intentionally asymmetric: nothing in the crate needs to re-encode a class
//! it has read, while everything it writes is authored symbolically.
//!
//! # Metadata-only reads
//!
//! Reading with [`crate::classfile::ReadOptions::metadata_only`] skips `Code` attributes
//! without decoding them. The metadata copier reads every class of a hierarchy this way.
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{ClassFile, ClassFileBuilder, ReadOptions};
//!
//! let bytes = ClassFileBuilder::new("com/example/Empty")
//!     .default_constructor()?
//!     .source_file("Empty.java")
//!     .build()?;
//!
//! let full = ClassFile::parse(&bytes)?;
//! assert!(full.methods[0].code.is_some());
//!
//! let metadata = ClassFile::parse_with(&bytes, ReadOptions::metadata_only())?;
//! assert!(metadata.methods[0].code.is_none());
//! assert_eq!(metadata.source_file.as_deref(), Some("Empty.java"));
//! # Ok::<(), dynsubclass::Error>(())
//! ```

mod access;
mod annotations;
mod attributes;
mod code;
mod constpool;
mod descriptor;
pub mod opcodes;
mod reader;
mod writer;

pub use access::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use annotations::{Annotation, ElementValue};
pub use attributes::{Code, ExceptionTableEntry, RawAttribute};
pub use code::CodeBuilder;
pub use constpool::{
    decode_modified_utf8, encode_modified_utf8, Constant, ConstantPool, ConstantPoolBuilder,
    ConstantTag, MemberRef,
};
pub use descriptor::{
    BaseType, FieldType, MethodType, MAX_ARRAY_DIMENSIONS, MAX_PARAMETER_SLOTS,
};
pub use writer::{ClassFileBuilder, FieldSpec, MethodSpec};

use crate::Result;

/// The class-file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Lowest major version accepted by the reader (Java 1.1).
pub const MIN_MAJOR_VERSION: u16 = 45;

/// Highest major version accepted by the reader (Java 21).
pub const MAX_MAJOR_VERSION: u16 = 65;

/// Major version written by default (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// Name of the constructor method.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static initializer.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// Options controlling what [`ClassFile::parse_with`] decodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Skip `Code` attributes without decoding them
    pub skip_code: bool,
    /// Keep annotation attributes as undecoded [`RawAttribute`]s
    pub skip_annotations: bool,
}

impl ReadOptions {
    /// Read declarations and attributes but not method bodies.
    #[must_use]
    pub fn metadata_only() -> Self {
        ReadOptions {
            skip_code: true,
            skip_annotations: false,
        }
    }

    /// Read declarations only: no method bodies, no annotations.
    #[must_use]
    pub fn structure_only() -> Self {
        ReadOptions {
            skip_code: true,
            skip_annotations: true,
        }
    }
}

/// A field as declared in a class file.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
    pub attributes: Vec<RawAttribute>,
}

/// A method as declared in a class file.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// Access flags
    pub access_flags: MethodAccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Classes named by the `Exceptions` attribute
    pub exceptions: Vec<String>,
    /// Visible and invisible method annotations
    pub annotations: Vec<Annotation>,
    /// Visible and invisible annotations per parameter
    pub parameter_annotations: Vec<Vec<Annotation>>,
    /// Method body; `None` for abstract and native methods, and for metadata-only reads
    pub code: Option<Code>,
    /// Attributes not decoded by the codec
    pub attributes: Vec<RawAttribute>,
}

impl MethodInfo {
    /// Parse the method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn method_type(&self) -> Result<MethodType> {
        MethodType::parse(&self.descriptor)
    }

    /// Returns `true` for `<init>` methods.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns `true` if any method or parameter annotation is present.
    #[must_use]
    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty() || self.parameter_annotations.iter().any(|p| !p.is_empty())
    }
}

/// A decoded class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// The constant pool, retained for resolving bytecode operands
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: ClassAccessFlags,
    /// Internal name of this class
    pub this_class: String,
    /// Internal name of the superclass; `None` only for `java/lang/Object`
    pub super_class: Option<String>,
    /// Direct superinterfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldInfo>,
    /// Declared methods and constructors
    pub methods: Vec<MethodInfo>,
    /// Visible and invisible class annotations
    pub annotations: Vec<Annotation>,
    /// The `SourceFile` attribute
    pub source_file: Option<String>,
    /// Class attributes not decoded by the codec
    pub attributes: Vec<RawAttribute>,
}

impl ClassFile {
    /// Decode a complete class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input
    /// and [`crate::Error::NotSupported`] for versions outside 45 to 65.
    pub fn parse(data: &[u8]) -> Result<ClassFile> {
        reader::read_class(data, ReadOptions::default())
    }

    /// Decode a class file with explicit [`ReadOptions`].
    ///
    /// # Errors
    /// See [`ClassFile::parse`].
    pub fn parse_with(data: &[u8], options: ReadOptions) -> Result<ClassFile> {
        reader::read_class(data, options)
    }

    /// Returns `true` if this class file declares an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a declared method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Find a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        ClassFileBuilder::new("com/example/Sample")
            .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT)
            .implements("java/io/Serializable")
            .annotation(Annotation::new("Lcom/example/Visible;"))
            .annotation(Annotation::new("Lcom/example/Hidden;").invisible())
            .field(FieldSpec::new(FieldAccessFlags::PRIVATE, "count", "I"))
            .default_constructor()
            .unwrap()
            .declare(
                MethodSpec::new(
                    MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                    "compute",
                    "(ILjava/lang/String;)J",
                )
                .throws("java/io/IOException")
                .annotated(Annotation::new("Lcom/example/Op;"))
                .parameter_annotated(1, Annotation::new("Lcom/example/NotNull;"))
                .parameter_annotated(1, Annotation::new("Lcom/example/Trim;").invisible()),
            )
            .source_file("Sample.java")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_output_parses() {
        let class = ClassFile::parse(&sample()).unwrap();

        assert_eq!(class.major_version, DEFAULT_MAJOR_VERSION);
        assert_eq!(class.this_class, "com/example/Sample");
        assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.interfaces, vec!["java/io/Serializable".to_string()]);
        assert_eq!(class.annotations.len(), 2);
        assert!(class.annotations[0].visible);
        assert!(!class.annotations[1].visible);
        assert_eq!(class.field("count").unwrap().descriptor, "I");
        assert_eq!(class.source_file.as_deref(), Some("Sample.java"));
        assert!(!class.is_interface());

        let ctor = class.method("<init>", "()V").unwrap();
        assert!(ctor.is_constructor());
        assert!(ctor.code.is_some());
        assert!(!ctor.has_annotations());

        let compute = class.method("compute", "(ILjava/lang/String;)J").unwrap();
        assert!(compute.code.is_none());
        assert_eq!(compute.exceptions, vec!["java/io/IOException".to_string()]);
        assert_eq!(compute.annotations.len(), 1);
        assert_eq!(compute.parameter_annotations.len(), 2);
        assert!(compute.parameter_annotations[0].is_empty());
        assert_eq!(compute.parameter_annotations[1].len(), 2);
        assert!(compute.has_annotations());
        assert_eq!(compute.method_type().unwrap().parameter_slots(), 2);
    }

    #[test]
    fn structure_only_keeps_annotations_raw() {
        let class = ClassFile::parse_with(&sample(), ReadOptions::structure_only()).unwrap();

        assert!(class.annotations.is_empty());
        assert!(class
            .attributes
            .iter()
            .any(|a| a.name == "RuntimeVisibleAnnotations"));
        let compute = class.method("compute", "(ILjava/lang/String;)J").unwrap();
        assert!(!compute.has_annotations());
        assert_eq!(compute.exceptions, vec!["java/io/IOException".to_string()]);
        assert_eq!(compute.attributes.len(), 3);
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = sample();
        bytes[0] = 0xCB;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(crate::Error::Malformed { .. })
        ));

        let bytes = ClassFileBuilder::new("A").version(99).build().unwrap();
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(crate::Error::NotSupported(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample();
        bytes.push(0);
        assert!(ClassFile::parse(&bytes).is_err());
    }

    #[test]
    fn every_truncation_is_an_error() {
        let bytes = sample();
        for len in 0..bytes.len() {
            assert!(
                ClassFile::parse(&bytes[..len]).is_err(),
                "prefix of {len} bytes parsed"
            );
        }
    }
}
