//! Encoding of complete class files.
//!
//! [`ClassFileBuilder`] is the authoring surface for class files: the type emitter lowers its
//! definitions through it, and tests use it to write the abstract types they synthesize from.
//! Method bodies are assembled eagerly against the builder's constant pool, everything else is
//! encoded by [`ClassFileBuilder::build`].
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{
//!     Annotation, ClassAccessFlags, ClassFile, ClassFileBuilder, MethodAccessFlags, MethodSpec,
//! };
//!
//! let bytes = ClassFileBuilder::new("com/example/Greeter")
//!     .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT)
//!     .annotation(Annotation::new("Ljavax/ejb/Stateless;"))
//!     .default_constructor()?
//!     .declare(MethodSpec::new(
//!         MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
//!         "greet",
//!         "(Ljava/lang/String;)Ljava/lang/String;",
//!     ))
//!     .build()?;
//!
//! let class = ClassFile::parse(&bytes)?;
//! assert_eq!(class.this_class, "com/example/Greeter");
//! assert_eq!(class.methods.len(), 2);
//! # Ok::<(), dynsubclass::Error>(())
//! ```

use crate::{
    classfile::{
        access::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        annotations::{write_annotations, Annotation},
        attributes::{names, write_attribute, Code},
        code::CodeBuilder,
        constpool::ConstantPoolBuilder,
        descriptor::MethodType,
        DEFAULT_MAJOR_VERSION, MAGIC,
    },
    file::io::write_be,
    Result,
};

/// Declaration of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Access flags
    pub access_flags: FieldAccessFlags,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Field annotations
    pub annotations: Vec<Annotation>,
}

impl FieldSpec {
    /// Declare a field.
    #[must_use]
    pub fn new(access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> Self {
        FieldSpec {
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            annotations: Vec::new(),
        }
    }
}

/// Declaration of a method or constructor, without its body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    /// Access flags
    pub access_flags: MethodAccessFlags,
    /// Method name; `<init>` for constructors
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Declared exception classes, by internal name
    pub exceptions: Vec<String>,
    /// Method annotations
    pub annotations: Vec<Annotation>,
    /// Annotations per parameter
    pub parameter_annotations: Vec<Vec<Annotation>>,
}

impl MethodSpec {
    /// Declare a method.
    #[must_use]
    pub fn new(access_flags: MethodAccessFlags, name: &str, descriptor: &str) -> Self {
        MethodSpec {
            access_flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: Vec::new(),
            annotations: Vec::new(),
            parameter_annotations: Vec::new(),
        }
    }

    /// Add a declared exception.
    #[must_use]
    pub fn throws(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.to_string());
        self
    }

    /// Add a method annotation.
    #[must_use]
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Add an annotation to parameter `index`, growing the table as needed.
    #[must_use]
    pub fn parameter_annotated(mut self, index: usize, annotation: Annotation) -> Self {
        if self.parameter_annotations.len() <= index {
            self.parameter_annotations.resize_with(index + 1, Vec::new);
        }
        self.parameter_annotations[index].push(annotation);
        self
    }
}

struct EncodedMethod {
    spec: MethodSpec,
    code: Option<Code>,
}

/// Builder for a complete class file.
pub struct ClassFileBuilder {
    pool: ConstantPoolBuilder,
    major_version: u16,
    access_flags: ClassAccessFlags,
    name: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<EncodedMethod>,
    annotations: Vec<Annotation>,
    source_file: Option<String>,
}

impl ClassFileBuilder {
    /// Start a public class extending `java/lang/Object`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassFileBuilder {
            pool: ConstantPoolBuilder::new(),
            major_version: DEFAULT_MAJOR_VERSION,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name: name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            source_file: None,
        }
    }

    /// Start a public abstract interface.
    #[must_use]
    pub fn interface(name: &str) -> Self {
        ClassFileBuilder::new(name).access(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        )
    }

    /// Set the class access flags.
    #[must_use]
    pub fn access(mut self, access_flags: ClassAccessFlags) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Set the major version.
    #[must_use]
    pub fn version(mut self, major_version: u16) -> Self {
        self.major_version = major_version;
        self
    }

    /// Set the superclass; `None` only for `java/lang/Object` itself.
    #[must_use]
    pub fn super_class(mut self, super_class: Option<&str>) -> Self {
        self.super_class = super_class.map(str::to_string);
        self
    }

    /// Add a direct superinterface.
    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Add a class annotation.
    #[must_use]
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Set the `SourceFile` attribute.
    #[must_use]
    pub fn source_file(mut self, source_file: &str) -> Self {
        self.source_file = Some(source_file.to_string());
        self
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method whose body is assembled immediately by `body`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the body fails to assemble, or
    /// [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn method<F>(mut self, spec: MethodSpec, body: F) -> Result<Self>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let method = MethodType::parse(&spec.descriptor)?;
        let receiver = usize::from(!spec.access_flags.contains(MethodAccessFlags::STATIC));
        let mut code = CodeBuilder::new(&mut self.pool, method.parameter_slots() + receiver);
        body(&mut code)?;
        let code = code.finish()?;

        self.methods.push(EncodedMethod {
            spec,
            code: Some(code),
        });
        Ok(self)
    }

    /// Add a method without code, such as an abstract or native method.
    #[must_use]
    pub fn declare(mut self, spec: MethodSpec) -> Self {
        self.methods.push(EncodedMethod { spec, code: None });
        self
    }

    /// Add a method with an already assembled body.
    ///
    /// The body's constant-pool indices must refer to [`ClassFileBuilder::pool`].
    #[must_use]
    pub fn method_with_code(mut self, spec: MethodSpec, code: Code) -> Self {
        self.methods.push(EncodedMethod {
            spec,
            code: Some(code),
        });
        self
    }

    /// Add `public <init>()V` calling the superclass's no-argument constructor.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if there is no superclass.
    pub fn default_constructor(self) -> Result<Self> {
        let Some(super_class) = self.super_class.clone() else {
            return Err(codegen_error!("{} has no superclass to construct", self.name));
        };
        self.method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "()V"),
            |code| {
                code.aload(0)?
                    .invokespecial(&super_class, "<init>", "()V")?
                    .return_void()?;
                Ok(())
            },
        )
    }

    /// The constant pool bodies are interned into.
    pub fn pool(&mut self) -> &mut ConstantPoolBuilder {
        &mut self.pool
    }

    /// Encode the class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if a table or the constant pool overflows.
    pub fn build(mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();

        write_be(&mut body, self.access_flags.bits());
        write_be(&mut body, self.pool.class(&self.name)?);
        match &self.super_class {
            Some(super_class) => write_be(&mut body, self.pool.class(super_class)?),
            None => write_be(&mut body, 0_u16),
        }

        write_be(&mut body, count_u16(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            write_be(&mut body, self.pool.class(interface)?);
        }

        write_be(&mut body, count_u16(self.fields.len(), "fields")?);
        for field in &self.fields {
            write_be(&mut body, field.access_flags.bits());
            write_be(&mut body, self.pool.utf8(&field.name)?);
            write_be(&mut body, self.pool.utf8(&field.descriptor)?);
            let count = annotation_attribute_count(&field.annotations);
            write_be(&mut body, count);
            write_annotation_attributes(&mut body, &mut self.pool, &field.annotations)?;
        }

        write_be(&mut body, count_u16(self.methods.len(), "methods")?);
        for method in &self.methods {
            write_method(&mut body, &mut self.pool, method)?;
        }

        let mut attribute_count = annotation_attribute_count(&self.annotations);
        if self.source_file.is_some() {
            attribute_count += 1;
        }
        write_be(&mut body, attribute_count);
        write_annotation_attributes(&mut body, &mut self.pool, &self.annotations)?;
        if let Some(source_file) = &self.source_file {
            write_attribute(&mut body, &mut self.pool, names::SOURCE_FILE, |out, pool| {
                write_be(out, pool.utf8(source_file)?);
                Ok(())
            })?;
        }

        let mut out = Vec::with_capacity(body.len() + 512);
        write_be(&mut out, MAGIC);
        write_be(&mut out, 0_u16);
        write_be(&mut out, self.major_version);
        self.pool.write(&mut out);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn count_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| codegen_error!("too many {} ({})", what, len))
}

fn annotation_attribute_count(annotations: &[Annotation]) -> u16 {
    u16::from(annotations.iter().any(|a| a.visible))
        + u16::from(annotations.iter().any(|a| !a.visible))
}

fn write_annotation_attributes(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    annotations: &[Annotation],
) -> Result<()> {
    for (visible, name) in [
        (true, names::RUNTIME_VISIBLE_ANNOTATIONS),
        (false, names::RUNTIME_INVISIBLE_ANNOTATIONS),
    ] {
        let selected: Vec<&Annotation> =
            annotations.iter().filter(|a| a.visible == visible).collect();
        if selected.is_empty() {
            continue;
        }
        write_attribute(out, pool, name, |body, pool| {
            write_annotations(body, pool, selected.iter().copied())
        })?;
    }
    Ok(())
}

fn write_parameter_annotation_attributes(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    parameters: &[Vec<Annotation>],
) -> Result<u16> {
    let mut written = 0;
    let Ok(parameter_count) = u8::try_from(parameters.len()) else {
        return Err(codegen_error!("too many annotated parameters ({})", parameters.len()));
    };

    for (visible, name) in [
        (true, names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS),
        (false, names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS),
    ] {
        if !parameters.iter().flatten().any(|a| a.visible == visible) {
            continue;
        }
        write_attribute(out, pool, name, |body, pool| {
            body.push(parameter_count);
            for parameter in parameters {
                let selected: Vec<&Annotation> =
                    parameter.iter().filter(|a| a.visible == visible).collect();
                write_annotations(body, pool, selected.iter().copied())?;
            }
            Ok(())
        })?;
        written += 1;
    }
    Ok(written)
}

fn write_method(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    method: &EncodedMethod,
) -> Result<()> {
    let spec = &method.spec;
    write_be(out, spec.access_flags.bits());
    write_be(out, pool.utf8(&spec.name)?);
    write_be(out, pool.utf8(&spec.descriptor)?);

    // attribute count is back-patched once the optional attributes are known
    let count_at = out.len();
    write_be(out, 0_u16);
    let mut count = 0_u16;

    if let Some(code) = &method.code {
        write_attribute(out, pool, names::CODE, |body, pool| code.write(body, pool))?;
        count += 1;
    }

    if !spec.exceptions.is_empty() {
        write_attribute(out, pool, names::EXCEPTIONS, |body, pool| {
            write_be(body, count_u16(spec.exceptions.len(), "exceptions")?);
            for exception in &spec.exceptions {
                write_be(body, pool.class(exception)?);
            }
            Ok(())
        })?;
        count += 1;
    }

    count += annotation_attribute_count(&spec.annotations);
    write_annotation_attributes(out, pool, &spec.annotations)?;
    count += write_parameter_annotation_attributes(out, pool, &spec.parameter_annotations)?;

    crate::file::io::patch_be_at(out, count_at, count)
}
