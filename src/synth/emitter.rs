//! Construction of the [`TypeDefinition`] for a generated type.

use crate::{
    classfile::{
        ClassAccessFlags, MethodAccessFlags, MethodType, CONSTRUCTOR_NAME, MAX_PARAMETER_SLOTS,
        STATIC_INITIALIZER_NAME,
    },
    config::SynthesisConfig,
    runtime::{INVOCATION_HANDLER, OBJECT},
    synth::{
        definition::{ForwardingConstructor, ForwardingMethod, MemberMetadata, TypeDefinition},
        model::AbstractTypeDescriptor,
        resolver::DispatchSet,
    },
    Error, Result,
};

/// Visibility and modifier bits carried over from the implemented method.
const PRESERVED_METHOD_FLAGS: MethodAccessFlags = MethodAccessFlags::PUBLIC
    .union(MethodAccessFlags::PROTECTED)
    .union(MethodAccessFlags::VARARGS);

/// Describe the generated subtype of `descriptor` forwarding `dispatch`.
///
/// The definition carries no annotations yet; the metadata copier fills them in.
///
/// # Errors
/// - [`crate::Error::NotSupported`] if the original class is `final`
/// - [`crate::Error::NoAccessibleConstructor`] if a class original has no public constructor
/// - [`crate::Error::UnsupportedMethodShape`] if a constructor needs more than 255 local slots
/// - [`crate::Error::CodeGeneration`] if the dispatch set names a constructor or initializer
pub fn emit(
    descriptor: &AbstractTypeDescriptor,
    dispatch: &DispatchSet,
    extra_interfaces: &[String],
    config: &SynthesisConfig,
) -> Result<TypeDefinition> {
    let original = descriptor.name();
    if !descriptor.is_interface() && descriptor.access_flags().contains(ClassAccessFlags::FINAL) {
        return Err(Error::NotSupported(format!("{original} is final")));
    }

    let mut interfaces = Vec::new();
    let super_class = if descriptor.is_interface() {
        interfaces.push(original.to_string());
        OBJECT.to_string()
    } else {
        original.to_string()
    };
    for extra in extra_interfaces {
        if !descriptor.is_subtype_of(extra) && !interfaces.contains(extra) {
            interfaces.push(extra.clone());
        }
    }
    if !descriptor.is_subtype_of(INVOCATION_HANDLER)
        && !interfaces.iter().any(|i| i == INVOCATION_HANDLER)
    {
        interfaces.push(INVOCATION_HANDLER.to_string());
    }

    let mut access_flags = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
    if config.synthetic {
        access_flags |= ClassAccessFlags::SYNTHETIC;
    }

    let constructors = if descriptor.is_interface() {
        vec![ForwardingConstructor {
            access_flags: MethodAccessFlags::PUBLIC,
            descriptor: "()V".to_string(),
            method_type: MethodType::new(Vec::new(), None),
            exceptions: Vec::new(),
            metadata: MemberMetadata::default(),
        }]
    } else {
        let public = descriptor.public_constructors()?;
        if public.is_empty() {
            return Err(Error::NoAccessibleConstructor(original.to_string()));
        }
        public
            .into_iter()
            .map(|ctor| {
                if ctor.method_type.parameter_slots() + 1 > MAX_PARAMETER_SLOTS {
                    return Err(Error::UnsupportedMethodShape {
                        class: original.to_string(),
                        method: format!("{CONSTRUCTOR_NAME}{}", ctor.descriptor),
                        reason: format!(
                            "needs {} local slots",
                            ctor.method_type.parameter_slots() + 1
                        ),
                    });
                }
                Ok(ForwardingConstructor {
                    access_flags: MethodAccessFlags::PUBLIC
                        | (ctor.access_flags & MethodAccessFlags::VARARGS),
                    descriptor: ctor.descriptor,
                    method_type: ctor.method_type,
                    exceptions: ctor.exceptions,
                    metadata: MemberMetadata::default(),
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    let mut methods = Vec::with_capacity(dispatch.len());
    for target in dispatch.iter() {
        if target.name == CONSTRUCTOR_NAME || target.name == STATIC_INITIALIZER_NAME {
            return Err(codegen_error!(
                "{}.{} cannot be forwarded",
                target.declaring_class,
                target.name
            ));
        }
        methods.push(ForwardingMethod {
            access_flags: target.access_flags & PRESERVED_METHOD_FLAGS,
            target: target.clone(),
            metadata: MemberMetadata::default(),
        });
    }

    let source_file = if config.emit_source_file {
        descriptor.source_file().map(str::to_string)
    } else {
        None
    };

    Ok(TypeDefinition {
        name: config.generated_name(original),
        original: original.to_string(),
        super_class,
        interfaces,
        access_flags,
        handler_field: config.handler_field.clone(),
        constructors,
        methods,
        annotations: Vec::new(),
        source_file,
        major_version: config.major_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{ClassFileBuilder, MethodSpec},
        runtime::ClassPool,
        synth::resolver::resolve,
        test::fixtures,
    };

    fn definition_of(pool: &ClassPool, name: &str) -> Result<TypeDefinition> {
        let descriptor = AbstractTypeDescriptor::read(name, pool)?;
        let dispatch = resolve(&descriptor, false)?;
        emit(&descriptor, &dispatch, &[], &SynthesisConfig::default())
    }

    #[test]
    fn class_original() {
        let pool = fixtures::hierarchy_pool();
        let definition = definition_of(&pool, "t/Leaf").unwrap();

        assert_eq!(definition.name, "t/Leaf$$Impl");
        assert_eq!(definition.super_class, "t/Leaf");
        assert_eq!(definition.interfaces, vec![INVOCATION_HANDLER.to_string()]);
        assert!(definition.access_flags.contains(ClassAccessFlags::SYNTHETIC));
        assert_eq!(definition.handler_field, "this$handler");
        let ctors: Vec<&str> = definition.constructors.iter().map(|c| c.descriptor.as_str()).collect();
        assert_eq!(ctors, vec!["()V", "(Ljava/lang/String;I)V"]);
        assert_eq!(definition.methods.len(), 3);
        assert!(definition
            .methods
            .iter()
            .all(|m| !m.access_flags.contains(MethodAccessFlags::ABSTRACT)));
        assert_eq!(definition.source_file.as_deref(), Some("Leaf.java"));
    }

    #[test]
    fn interface_original() {
        let pool = fixtures::hierarchy_pool();
        let definition = definition_of(&pool, "t/Named").unwrap();

        assert_eq!(definition.super_class, OBJECT);
        assert_eq!(
            definition.interfaces,
            vec!["t/Named".to_string(), INVOCATION_HANDLER.to_string()]
        );
        assert_eq!(definition.constructors.len(), 1);
        assert_eq!(definition.constructors[0].descriptor, "()V");
    }

    #[test]
    fn no_public_constructor() {
        let pool = ClassPool::new().unwrap();
        let bytes = ClassFileBuilder::new("t/Hidden")
            .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT)
            .method(MethodSpec::new(MethodAccessFlags::PRIVATE, "<init>", "()V"), |code| {
                code.aload(0)?.invokespecial(OBJECT, "<init>", "()V")?.return_void()?;
                Ok(())
            })
            .unwrap()
            .build()
            .unwrap();
        pool.add_class(bytes).unwrap();

        assert!(matches!(
            definition_of(&pool, "t/Hidden"),
            Err(Error::NoAccessibleConstructor(name)) if name == "t/Hidden"
        ));
    }

    #[test]
    fn final_classes_are_rejected() {
        let pool = ClassPool::new().unwrap();
        let bytes = ClassFileBuilder::new("t/Sealed")
            .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
            .default_constructor()
            .unwrap()
            .build()
            .unwrap();
        pool.add_class(bytes).unwrap();

        assert!(matches!(
            definition_of(&pool, "t/Sealed"),
            Err(Error::NotSupported(_))
        ));
    }
}
