//! Copying declarative metadata from the original hierarchy onto a generated type.
//!
//! Reflection-driven frameworks look for annotations on the runtime class of an object. A
//! generated subtype declares every forwarded method anew, so without copying, annotations the
//! original hierarchy places on those methods would no longer be visible on the overriding
//! declarations. The copier re-reads the class files of the hierarchy with
//! [`ReadOptions::metadata_only`] and moves type, method, parameter and constructor annotations
//! onto the [`TypeDefinition`].
//!
//! # Precedence
//!
//! Each generated member takes its annotations from exactly one declaration: the most specific
//! type in the walk that declares the member *and* attaches at least one annotation to it. A
//! declaration without annotations does not shadow an annotated one further up.

use std::collections::HashSet;

use crate::{
    classfile::{ClassFile, MethodAccessFlags, ReadOptions},
    synth::{
        definition::{MemberMetadata, TypeDefinition},
        model::{AbstractTypeDescriptor, DeclaredType, MethodKey},
    },
    Error, Result,
};

/// Overlay the annotations of `descriptor`'s hierarchy onto `definition`.
///
/// # Errors
/// Returns [`crate::Error::MetadataCopy`] naming the type whose class file could not be read.
pub fn copy_metadata(descriptor: &AbstractTypeDescriptor, definition: &mut TypeDefinition) -> Result<()> {
    let original = read_metadata(descriptor.original())?;
    definition.annotations.extend(original.annotations.iter().cloned());

    let mut satisfied: HashSet<MethodKey> = HashSet::new();
    for declared in member_walk(descriptor) {
        let file = if declared.name() == original.this_class {
            original.clone()
        } else {
            read_metadata(declared)?
        };

        for method in file.methods.iter().filter(|m| !m.is_constructor() && m.has_annotations()) {
            let Some(key) = MethodKey::new(&method.name, &method.descriptor) else {
                continue;
            };
            if satisfied.contains(&key) {
                continue;
            }
            let Some(target) = definition.method_mut(&key) else {
                continue;
            };

            tracing::trace!(
                class = %file.this_class,
                method = %key,
                annotations = method.annotations.len(),
                "copying method metadata"
            );
            target.metadata = MemberMetadata {
                annotations: method.annotations.clone(),
                parameter_annotations: method.parameter_annotations.clone(),
            };
            satisfied.insert(key);
        }
    }

    if !descriptor.is_interface() {
        for method in original.methods.iter().filter(|m| {
            m.is_constructor()
                && m.access_flags.contains(MethodAccessFlags::PUBLIC)
                && m.has_annotations()
        }) {
            if let Some(constructor) = definition.constructor_mut(&method.descriptor) {
                tracing::trace!(
                    class = %original.this_class,
                    descriptor = %method.descriptor,
                    "copying constructor metadata"
                );
                constructor.metadata = MemberMetadata {
                    annotations: method.annotations.clone(),
                    parameter_annotations: method.parameter_annotations.clone(),
                };
            }
        }
    }

    Ok(())
}

/// Declaring types searched for member metadata, most specific first.
///
/// Classes walk their superclass chain; interfaces walk their superinterface closure.
fn member_walk(descriptor: &AbstractTypeDescriptor) -> Vec<&DeclaredType> {
    if descriptor.is_interface() {
        let mut visited = HashSet::new();
        visited.insert(descriptor.name().to_string());
        let mut walk = vec![descriptor.original()];
        walk.extend(descriptor.interface_closure(descriptor.original(), &mut visited));
        walk
    } else {
        descriptor.class_chain().collect()
    }
}

fn read_metadata(declared: &DeclaredType) -> Result<ClassFile> {
    ClassFile::parse_with(&declared.bytes, ReadOptions::metadata_only()).map_err(|source| {
        Error::MetadataCopy {
            class: declared.name().to_string(),
            source: Box::new(source),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SynthesisConfig,
        synth::{emitter::emit, resolver::resolve},
        test::fixtures,
    };

    fn definition(name: &str, proxy_concrete: bool) -> TypeDefinition {
        let pool = fixtures::hierarchy_pool();
        let descriptor = AbstractTypeDescriptor::read(name, &pool).unwrap();
        let dispatch = resolve(&descriptor, proxy_concrete).unwrap();
        let mut definition =
            emit(&descriptor, &dispatch, &[], &SynthesisConfig::default()).unwrap();
        copy_metadata(&descriptor, &mut definition).unwrap();
        definition
    }

    fn annotation_types(metadata: &MemberMetadata) -> Vec<&str> {
        metadata
            .annotations
            .iter()
            .map(|a| a.type_descriptor.as_str())
            .collect()
    }

    #[test]
    fn most_specific_annotated_declaration_wins() {
        let definition = definition("t/Leaf", true);

        let m = definition
            .methods
            .iter()
            .find(|m| m.target.name == "m")
            .unwrap();
        assert_eq!(annotation_types(&m.metadata), vec![fixtures::X]);

        let compute = definition
            .methods
            .iter()
            .find(|m| m.target.name == "compute")
            .unwrap();
        assert_eq!(annotation_types(&compute.metadata), vec![fixtures::Y]);
        assert_eq!(compute.metadata.parameter_annotations.len(), 1);
        assert_eq!(
            compute.metadata.parameter_annotations[0][0].type_descriptor,
            fixtures::NOT_NULL
        );
    }

    #[test]
    fn type_and_constructor_annotations() {
        let definition = definition("t/Leaf", false);

        let types: Vec<&str> = definition
            .annotations
            .iter()
            .map(|a| a.type_descriptor.as_str())
            .collect();
        assert_eq!(types, vec![fixtures::ENTITY, fixtures::INTERNAL]);
        assert!(!definition.annotations[1].visible);

        let ctor = definition
            .constructors
            .iter()
            .find(|c| c.descriptor == "(Ljava/lang/String;I)V")
            .unwrap();
        assert_eq!(annotation_types(&ctor.metadata), vec![fixtures::INJECT]);
        assert!(definition.constructors[0].metadata.is_empty());
    }

    #[test]
    fn interface_walk_uses_superinterfaces() {
        let definition = definition("t/Named", false);
        let tag = definition
            .methods
            .iter()
            .find(|m| m.target.name == "tag")
            .unwrap();
        assert_eq!(annotation_types(&tag.metadata), vec![fixtures::X]);
    }

    #[test]
    fn unreadable_metadata_is_reported_per_class() {
        let pool = fixtures::hierarchy_pool();
        let mut descriptor = AbstractTypeDescriptor::read("t/Leaf", &pool).unwrap();
        let dispatch = resolve(&descriptor, false).unwrap();
        let mut definition =
            emit(&descriptor, &dispatch, &[], &SynthesisConfig::default()).unwrap();

        descriptor.replace_bytes("t/Mid", vec![0xCA, 0xFE, 0xBA, 0xBE]);
        match copy_metadata(&descriptor, &mut definition) {
            Err(Error::MetadataCopy { class, .. }) => assert_eq!(class, "t/Mid"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
