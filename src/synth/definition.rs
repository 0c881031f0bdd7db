//! Back-end independent description of a generated type.

use crate::{
    classfile::{Annotation, ClassAccessFlags, MethodAccessFlags, MethodType},
    synth::model::{MethodDescriptor, MethodKey},
};

/// Annotations attached to a generated member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberMetadata {
    /// Member-level annotations
    pub annotations: Vec<Annotation>,
    /// Annotations per parameter
    pub parameter_annotations: Vec<Vec<Annotation>>,
}

impl MemberMetadata {
    /// Returns `true` if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.parameter_annotations.iter().all(Vec::is_empty)
    }
}

/// A constructor that calls the superclass constructor with the same parameters and then
/// stores the new instance into its own handler slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingConstructor {
    /// Access flags of the generated constructor
    pub access_flags: MethodAccessFlags,
    /// Descriptor shared with the superclass constructor
    pub descriptor: String,
    /// Parsed descriptor
    pub method_type: MethodType,
    /// Declared exception classes
    pub exceptions: Vec<String>,
    /// Copied annotations
    pub metadata: MemberMetadata,
}

/// A method whose body hands every call to the bound invocation handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingMethod {
    /// Access flags of the generated method
    pub access_flags: MethodAccessFlags,
    /// The method being implemented
    pub target: MethodDescriptor,
    /// Copied annotations
    pub metadata: MemberMetadata,
}

/// Everything needed to lower a generated type to a concrete binary format.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Internal name of the generated type
    pub name: String,
    /// Internal name of the original type
    pub original: String,
    /// Direct superclass
    pub super_class: String,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Class access flags
    pub access_flags: ClassAccessFlags,
    /// Name of the handler-slot field
    pub handler_field: String,
    /// Forwarding constructors
    pub constructors: Vec<ForwardingConstructor>,
    /// Forwarding methods, in dispatch-set order
    pub methods: Vec<ForwardingMethod>,
    /// Type-level annotations
    pub annotations: Vec<Annotation>,
    /// `SourceFile` attribute value
    pub source_file: Option<String>,
    /// Class-file major version to emit
    pub major_version: u16,
}

impl TypeDefinition {
    /// The forwarding method with identity `key`.
    pub fn method_mut(&mut self, key: &MethodKey) -> Option<&mut ForwardingMethod> {
        self.methods.iter_mut().find(|m| m.target.key() == *key)
    }

    /// The forwarding constructor with `descriptor`.
    pub fn constructor_mut(&mut self, descriptor: &str) -> Option<&mut ForwardingConstructor> {
        self.constructors
            .iter_mut()
            .find(|c| c.descriptor == descriptor)
    }
}
