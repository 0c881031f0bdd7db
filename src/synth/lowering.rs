//! Lowering of a [`TypeDefinition`] to JVM class-file bytes.
//!
//! Every generated body is straight-line code. A forwarding method compiles to the equivalent
//! of
//!
//! ```java
//! return (R) this$handler.invoke(
//!     this,
//!     Declaring.class.getDeclaredMethod("name", new Class[] { P1.class, int.class }),
//!     new Object[] { p1, Integer.valueOf(p2) });
//! ```
//!
//! and a forwarding constructor to `super(p1, p2); this$handler = this;`.

use crate::{
    classfile::{
        ClassFileBuilder, CodeBuilder, FieldAccessFlags, FieldSpec, FieldType, MethodSpec,
        CONSTRUCTOR_NAME,
    },
    runtime::{INVOCATION_HANDLER, INVOKE_DESCRIPTOR, OBJECT},
    synth::definition::{ForwardingConstructor, ForwardingMethod, TypeDefinition},
    Result,
};

/// Field descriptor of the handler slot.
pub const HANDLER_DESCRIPTOR: &str = "Ljava/lang/reflect/InvocationHandler;";

const CLASS: &str = "java/lang/Class";
const GET_DECLARED_METHOD: &str = "getDeclaredMethod";
const GET_DECLARED_METHOD_DESCRIPTOR: &str =
    "(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;";

/// Encode `definition` as a class file.
///
/// # Errors
/// Returns [`crate::Error::CodeGeneration`] if a body fails to assemble or a table overflows.
pub fn lower(definition: &TypeDefinition) -> Result<Vec<u8>> {
    let mut builder = ClassFileBuilder::new(&definition.name)
        .access(definition.access_flags)
        .version(definition.major_version)
        .super_class(Some(&definition.super_class));

    for interface in &definition.interfaces {
        builder = builder.implements(interface);
    }
    for annotation in &definition.annotations {
        builder = builder.annotation(annotation.clone());
    }
    if let Some(source_file) = &definition.source_file {
        builder = builder.source_file(source_file);
    }

    builder = builder.field(FieldSpec::new(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC,
        &definition.handler_field,
        HANDLER_DESCRIPTOR,
    ));

    for constructor in &definition.constructors {
        let mut spec = MethodSpec::new(constructor.access_flags, CONSTRUCTOR_NAME, &constructor.descriptor);
        spec.exceptions.clone_from(&constructor.exceptions);
        spec.annotations.clone_from(&constructor.metadata.annotations);
        spec.parameter_annotations
            .clone_from(&constructor.metadata.parameter_annotations);
        builder = builder.method(spec, |code| constructor_body(code, definition, constructor))?;
    }

    for method in &definition.methods {
        let target = &method.target;
        let mut spec = MethodSpec::new(method.access_flags, &target.name, &target.descriptor);
        spec.exceptions.clone_from(&target.exceptions);
        spec.annotations.clone_from(&method.metadata.annotations);
        spec.parameter_annotations
            .clone_from(&method.metadata.parameter_annotations);
        builder = builder.method(spec, |code| forwarding_body(code, definition, method))?;
    }

    builder.build()
}

/// Load every parameter onto the stack, starting at local 1.
fn load_parameters(code: &mut CodeBuilder<'_>, parameters: &[FieldType]) -> Result<()> {
    let mut slot = 1_u16;
    for parameter in parameters {
        code.load(parameter, slot)?;
        slot = next_slot(slot, parameter)?;
    }
    Ok(())
}

fn next_slot(slot: u16, parameter: &FieldType) -> Result<u16> {
    // slots() is 1 or 2
    #[allow(clippy::cast_possible_truncation)]
    let width = parameter.slots() as u16;
    slot.checked_add(width)
        .ok_or_else(|| codegen_error!("local slot overflow"))
}

fn constructor_body(
    code: &mut CodeBuilder<'_>,
    definition: &TypeDefinition,
    constructor: &ForwardingConstructor,
) -> Result<()> {
    code.aload(0)?;
    load_parameters(code, &constructor.method_type.parameters)?;
    code.invokespecial(&definition.super_class, CONSTRUCTOR_NAME, &constructor.descriptor)?
        .aload(0)?
        .aload(0)?
        .putfield(&definition.name, &definition.handler_field, HANDLER_DESCRIPTOR)?
        .return_void()?;
    Ok(())
}

fn array_length(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| codegen_error!("{} array elements", len))
}

fn forwarding_body(
    code: &mut CodeBuilder<'_>,
    definition: &TypeDefinition,
    method: &ForwardingMethod,
) -> Result<()> {
    let target = &method.target;
    let parameters = &target.method_type.parameters;

    code.aload(0)?
        .getfield(&definition.name, &definition.handler_field, HANDLER_DESCRIPTOR)?
        .aload(0)?;

    // Declaring.class.getDeclaredMethod(name, parameterTypes)
    code.ldc_class(&target.declaring_class)?
        .ldc_string(&target.name)?
        .iconst(array_length(parameters.len())?)?
        .anewarray(CLASS)?;
    for (index, parameter) in parameters.iter().enumerate() {
        code.dup()?.iconst(array_length(index)?)?;
        match parameter {
            FieldType::Base(base) => {
                code.getstatic(base.wrapper_class(), "TYPE", "Ljava/lang/Class;")?;
            }
            other => {
                let Some(name) = other.class_constant_name() else {
                    return Err(codegen_error!("no class constant for {}", other));
                };
                code.ldc_class(&name)?;
            }
        }
        code.aastore()?;
    }
    code.invokevirtual(CLASS, GET_DECLARED_METHOD, GET_DECLARED_METHOD_DESCRIPTOR)?;

    // new Object[] { boxed arguments }
    code.iconst(array_length(parameters.len())?)?.anewarray(OBJECT)?;
    let mut slot = 1_u16;
    for (index, parameter) in parameters.iter().enumerate() {
        code.dup()?.iconst(array_length(index)?)?.load(parameter, slot)?;
        if let FieldType::Base(base) = parameter {
            code.box_primitive(*base)?;
        }
        code.aastore()?;
        slot = next_slot(slot, parameter)?;
    }

    code.invokeinterface(INVOCATION_HANDLER, "invoke", INVOKE_DESCRIPTOR)?;

    match &target.method_type.return_type {
        None => {
            code.discard(1)?.return_void()?;
        }
        Some(FieldType::Base(base)) => {
            code.unbox_primitive(*base)?
                .return_value(target.method_type.return_type.as_ref())?;
        }
        Some(reference) => {
            if *reference != FieldType::object(OBJECT) {
                let Some(name) = reference.class_constant_name() else {
                    return Err(codegen_error!("no class constant for {}", reference));
                };
                code.checkcast(&name)?;
            }
            code.return_value(Some(reference))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{opcodes, ClassFile, MethodAccessFlags},
        config::SynthesisConfig,
        synth::{emitter::emit, metadata::copy_metadata, model::AbstractTypeDescriptor, resolver::resolve},
        test::fixtures,
    };

    fn lowered(name: &str) -> ClassFile {
        let pool = fixtures::hierarchy_pool();
        let descriptor = AbstractTypeDescriptor::read(name, &pool).unwrap();
        let dispatch = resolve(&descriptor, false).unwrap();
        let mut definition =
            emit(&descriptor, &dispatch, &[], &SynthesisConfig::default()).unwrap();
        copy_metadata(&descriptor, &mut definition).unwrap();
        ClassFile::parse(&lower(&definition).unwrap()).unwrap()
    }

    #[test]
    fn handler_field_and_constructors() {
        let class = lowered("t/Leaf");

        let field = class.field("this$handler").unwrap();
        assert_eq!(field.descriptor, HANDLER_DESCRIPTOR);
        assert!(field.access_flags.contains(
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC
        ));
        assert_eq!(class.fields.len(), 1);

        let ctor = class.method("<init>", "(Ljava/lang/String;I)V").unwrap();
        let code = ctor.code.as_ref().unwrap();
        assert_eq!(
            code.bytecode[..4],
            [opcodes::ALOAD_0, 0x2B, opcodes::ILOAD_0 + 2, opcodes::INVOKESPECIAL]
        );
        assert_eq!(
            code.bytecode[code.bytecode.len() - 6..code.bytecode.len() - 3],
            [opcodes::ALOAD_0, opcodes::ALOAD_0, opcodes::PUTFIELD]
        );
        assert_eq!(code.max_locals, 3);
        assert_eq!(ctor.annotations.len(), 1);
    }

    #[test]
    fn forwarding_method_shape() {
        let class = lowered("t/Leaf");

        let compute = class.method("compute", "(I)I").unwrap();
        assert!(compute.access_flags.contains(MethodAccessFlags::PUBLIC));
        assert!(!compute.access_flags.contains(MethodAccessFlags::ABSTRACT));
        assert_eq!(compute.exceptions, vec!["java/io/IOException".to_string()]);
        assert_eq!(compute.parameter_annotations.len(), 1);

        let code = compute.code.as_ref().unwrap();
        assert!(code.exception_table.is_empty());
        assert_eq!(*code.bytecode.last().unwrap(), opcodes::IRETURN);
        assert_eq!(code.max_locals, 2);
        // handler, this, class, name, Class[], dup, index, int.class
        assert_eq!(code.max_stack, 8);
    }
}
