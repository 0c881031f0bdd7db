//! Library methods the reference runtime implements in Rust.
//!
//! Generated forwarding code calls a handful of JDK methods: the wrapper classes' `valueOf` and
//! `xxxValue`, `Class.getDeclaredMethod` and `InvocationHandler.invoke`. Guest classes cannot
//! supply these, so the interpreter asks [`invoke_native`] before resolving a call normally.

use crate::{
    classfile::{opcodes, BaseType, FieldType, MemberRef, MethodType},
    runtime::{
        interpreter::throw,
        loader::{INVOCATION_HANDLER, INVOKE_DESCRIPTOR},
        value::{MethodRef, Primitive, Reference, Value},
        LoadingContext,
    },
    Error, Result,
};

/// Outcome of a native call: `None` if the call is not native.
pub(crate) type NativeResult = Result<Option<Option<Value>>>;

/// Static field reads the runtime can satisfy: the wrappers' `TYPE` constants.
pub(crate) fn get_static(member: &MemberRef<'_>) -> Option<Value> {
    if member.name != "TYPE" || member.descriptor != "Ljava/lang/Class;" {
        return None;
    }
    BaseType::from_wrapper_class(member.class)
        .map(|base| Value::Ref(Reference::Class(FieldType::Base(base))))
}

pub(crate) fn invoke_native(
    context: &dyn LoadingContext,
    opcode: u8,
    member: &MemberRef<'_>,
    receiver: Option<&Value>,
    args: &[Value],
) -> NativeResult {
    if let Some(base) = BaseType::from_wrapper_class(member.class) {
        return wrapper_method(base, opcode, member, receiver, args);
    }

    match (member.class, member.name) {
        ("java/lang/Class", "getDeclaredMethod")
            if member.descriptor
                == "(Ljava/lang/String;[Ljava/lang/Class;)Ljava/lang/reflect/Method;" =>
        {
            get_declared_method(context, receiver, args).map(|v| Some(Some(v)))
        }
        (INVOCATION_HANDLER, "invoke") if member.descriptor == INVOKE_DESCRIPTOR => {
            match receiver {
                Some(Value::Ref(Reference::Handler(handler))) => {
                    let (proxy, method, values) = handler_arguments(args)?;
                    match handler.invoke(&proxy, &method, &values) {
                        Ok(value) => Ok(Some(Some(value.into_reference_value()))),
                        Err(throwable) => Err(Error::Thrown(throwable)),
                    }
                }
                Some(Value::Null) => Err(throw(
                    "java/lang/NullPointerException",
                    "invocation handler is null",
                )),
                // guest objects implementing the interface dispatch like any other call
                _ => Ok(None),
            }
        }
        ("java/lang/reflect/Method", "getName") if member.descriptor == "()Ljava/lang/String;" => {
            match receiver {
                Some(Value::Ref(Reference::Method(method))) => {
                    Ok(Some(Some(Value::string(&method.name))))
                }
                _ => Err(throw("java/lang/NullPointerException", "Method.getName")),
            }
        }
        _ => Ok(None),
    }
}

fn wrapper_method(
    base: BaseType,
    opcode: u8,
    member: &MemberRef<'_>,
    receiver: Option<&Value>,
    args: &[Value],
) -> NativeResult {
    if opcode == opcodes::INVOKESTATIC
        && member.name == "valueOf"
        && member.descriptor == base.value_of_descriptor()
    {
        let Some(primitive) = args.first().and_then(|v| Primitive::from_stack(base, v)) else {
            return Err(Error::Execution(format!(
                "{}.valueOf called with {:?}",
                member.class, args
            )));
        };
        return Ok(Some(Some(Value::boxed(primitive))));
    }

    if opcode == opcodes::INVOKEVIRTUAL
        && member.name == base.unbox_method()
        && member.descriptor == base.unbox_descriptor()
    {
        return match receiver {
            Some(Value::Ref(Reference::Boxed(primitive))) if primitive.base_type() == base => {
                Ok(Some(Some(primitive.to_stack())))
            }
            Some(Value::Null) | None => Err(throw(
                "java/lang/NullPointerException",
                &format!("{}.{}", member.class, member.name),
            )),
            Some(other) => Err(throw(
                "java/lang/ClassCastException",
                &format!("{other:?} is not a {}", member.class),
            )),
        };
    }

    Err(Error::Execution(format!(
        "unsupported wrapper method {}.{}{}",
        member.class, member.name, member.descriptor
    )))
}

fn get_declared_method(
    context: &dyn LoadingContext,
    receiver: Option<&Value>,
    args: &[Value],
) -> Result<Value> {
    let Some(Value::Ref(Reference::Class(FieldType::Object(class_name)))) = receiver else {
        return Err(throw(
            "java/lang/NoSuchMethodException",
            &format!("getDeclaredMethod on {receiver:?}"),
        ));
    };
    let Some(name) = args.first().and_then(Value::as_str) else {
        return Err(throw("java/lang/NullPointerException", "method name"));
    };

    let mut parameters = Vec::new();
    match args.get(1) {
        Some(Value::Ref(Reference::Array(array))) => {
            for element in array.to_vec()? {
                match element {
                    Value::Ref(Reference::Class(field)) => parameters.push(field),
                    other => {
                        return Err(throw(
                            "java/lang/NullPointerException",
                            &format!("parameter type {other:?}"),
                        ))
                    }
                }
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(Error::Execution(format!(
                "getDeclaredMethod parameter list {other:?}"
            )))
        }
    }

    let Some(class) = context.lookup(class_name)? else {
        return Err(throw("java/lang/NoClassDefFoundError", class_name));
    };

    let wanted = MethodType::new(parameters, None).parameter_descriptor();
    for method in &class.file().methods {
        if method.name != name || method.is_constructor() {
            continue;
        }
        let method_type = method.method_type()?;
        if method_type.parameter_descriptor() == wanted {
            return Ok(Value::Ref(Reference::Method(MethodRef {
                declaring_class: class_name.clone(),
                name: name.to_string(),
                descriptor: method_type,
            })));
        }
    }

    Err(throw(
        "java/lang/NoSuchMethodException",
        &format!("{class_name}.{name}{wanted}"),
    ))
}

fn handler_arguments(args: &[Value]) -> Result<(crate::runtime::ObjectRef, MethodRef, Vec<Value>)> {
    let [proxy, method, values] = args else {
        return Err(Error::Execution(format!(
            "InvocationHandler.invoke expects 3 arguments, got {}",
            args.len()
        )));
    };

    let Some(proxy) = proxy.as_object() else {
        return Err(Error::Execution(format!(
            "InvocationHandler.invoke proxy must be a guest object, got {proxy:?}"
        )));
    };
    let Value::Ref(Reference::Method(method)) = method else {
        return Err(Error::Execution(format!(
            "InvocationHandler.invoke method must be a Method, got {method:?}"
        )));
    };
    let values = match values {
        Value::Ref(Reference::Array(array)) => array.to_vec()?,
        Value::Null => Vec::new(),
        other => {
            return Err(Error::Execution(format!(
                "InvocationHandler.invoke arguments must be an array, got {other:?}"
            )))
        }
    };

    Ok((proxy.clone(), method.clone(), values))
}
