//! End-to-end tests for synthesizing, installing, binding and running generated subtypes.
//!
//! Every test builds its original types with the class-file builder, installs them into a
//! fresh [`ClassPool`] and drives the generated type through the reference interpreter.

use std::sync::{Arc, Barrier, Mutex};

use dynsubclass::{
    classfile::{ClassFile, ElementValue, FieldSpec, FieldType},
    prelude::*,
    runtime::Slot,
};

const REPOSITORY: &str = "com/acme/Repository";
const NAMED: &str = "com/acme/Named";
const MARKER: &str = "com/acme/Marker";
const PLAIN: &str = "com/acme/Plain";
const LABEL: &str = "Lcom/acme/Label;";
const STRING: &str = "java/lang/String";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn abstract_public() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT
}

/// ```java
/// public interface Named { String name(); }
/// public interface Marker {}
///
/// public abstract class Repository implements Named {
///     private String prefix;
///     public Repository() {}
///     public Repository(int weight) { this(); }
///     public Repository(String prefix, int weight) { this.prefix = prefix; }
///     public String describe() { return prefix; }
///     @Label("n\u0000l é 😀") public abstract Object find(long id);
///     public abstract int count();
///     public abstract void save(Object entity);
///     public abstract double ratio(double base);
///     public abstract boolean enabled();
/// }
///
/// public class Plain { public Plain() {} }
/// ```
fn repository_pool() -> Result<ClassPool> {
    let named = ClassFileBuilder::interface(NAMED)
        .declare(MethodSpec::new(abstract_public(), "name", "()Ljava/lang/String;"))
        .build()?;
    let marker = ClassFileBuilder::interface(MARKER).build()?;

    let string = FieldType::Object(STRING.to_string());
    let repository = ClassFileBuilder::new(REPOSITORY)
        .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT)
        .implements(NAMED)
        .field(FieldSpec::new(FieldAccessFlags::PRIVATE, "prefix", "Ljava/lang/String;"))
        .default_constructor()?
        .method(MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "(I)V"), |code| {
            code.aload(0)?
                .invokespecial(REPOSITORY, "<init>", "()V")?
                .return_void()?;
            Ok(())
        })?
        .method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "(Ljava/lang/String;I)V"),
            |code| {
                code.aload(0)?
                    .invokespecial("java/lang/Object", "<init>", "()V")?
                    .aload(0)?
                    .aload(1)?
                    .putfield(REPOSITORY, "prefix", "Ljava/lang/String;")?
                    .return_void()?;
                Ok(())
            },
        )?
        .method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "describe", "()Ljava/lang/String;"),
            |code| {
                code.aload(0)?
                    .getfield(REPOSITORY, "prefix", "Ljava/lang/String;")?
                    .return_value(Some(&string))?;
                Ok(())
            },
        )?
        .declare(
            MethodSpec::new(abstract_public(), "find", "(J)Ljava/lang/Object;").annotated(
                Annotation::new(LABEL)
                    .with("value", ElementValue::String("n\u{0}l é 😀".to_string())),
            ),
        )
        .declare(MethodSpec::new(abstract_public(), "count", "()I"))
        .declare(MethodSpec::new(abstract_public(), "save", "(Ljava/lang/Object;)V"))
        .declare(MethodSpec::new(abstract_public(), "ratio", "(D)D"))
        .declare(MethodSpec::new(abstract_public(), "enabled", "()Z"))
        .build()?;

    let plain = ClassFileBuilder::new(PLAIN)
        .field(FieldSpec::new(FieldAccessFlags::PRIVATE, "value", "I"))
        .default_constructor()?
        .build()?;

    let pool = ClassPool::new()?;
    for bytes in [named, marker, repository, plain] {
        pool.add_class(bytes)?;
    }
    Ok(pool)
}

type Calls = Arc<Mutex<Vec<(String, String, Vec<Value>)>>>;

/// A handler that records every call and answers by method name.
fn recording_handler(calls: &Calls) -> Arc<dyn InvocationHandler> {
    let calls = calls.clone();
    Arc::new(
        move |_: &ObjectRef, method: &MethodRef, args: &[Value]| -> std::result::Result<Value, Throwable> {
            calls.lock().unwrap().push((
                method.declaring_class.clone(),
                method.name.clone(),
                args.to_vec(),
            ));
            Ok(match method.name.as_str() {
                "find" => Value::string("found"),
                "count" => Value::boxed(Primitive::Int(7)),
                "ratio" => Value::boxed(Primitive::Double(0.5)),
                "enabled" => Value::boxed(Primitive::Boolean(true)),
                "name" => Value::string("repository"),
                "describe" => Value::string("proxied"),
                _ => Value::Null,
            })
        },
    )
}

fn constant_handler(answer: i32) -> Arc<dyn InvocationHandler> {
    Arc::new(
        move |_: &ObjectRef, _: &MethodRef, _: &[Value]| -> std::result::Result<Value, Throwable> {
            Ok(Value::Int(answer))
        },
    )
}

#[test]
fn every_abstract_method_reaches_the_handler() -> Result<()> {
    init_tracing();
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;
    assert_eq!(generated.name(), "com/acme/Repository$$Impl");
    assert_eq!(generated.original(), REPOSITORY);
    assert_eq!(generated.context(), pool.id());

    let calls: Calls = Arc::default();
    let instance =
        synthesizer.new_instance(&generated, &pool, "()V", &[], Some(recording_handler(&calls)))?;
    let vm = Interpreter::new(&pool);

    assert_eq!(
        vm.invoke_virtual(&instance, "find", "(J)Ljava/lang/Object;", &[Value::Long(42)])?
            .as_str(),
        Some("found")
    );
    assert_eq!(vm.invoke_virtual(&instance, "count", "()I", &[])?, Value::Int(7));
    assert_eq!(
        vm.invoke_virtual(&instance, "save", "(Ljava/lang/Object;)V", &[Value::Null])?,
        Value::Null
    );
    assert_eq!(
        vm.invoke_virtual(&instance, "ratio", "(D)D", &[Value::Double(2.0)])?,
        Value::Double(0.5)
    );
    assert_eq!(vm.invoke_virtual(&instance, "enabled", "()Z", &[])?, Value::Int(1));
    assert_eq!(
        vm.invoke_virtual(&instance, "name", "()Ljava/lang/String;", &[])?
            .as_str(),
        Some("repository")
    );

    let calls = calls.lock().unwrap();
    let names: Vec<&str> = calls.iter().map(|(_, name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["find", "count", "save", "ratio", "enabled", "name"]);

    let (declaring, _, args) = &calls[0];
    assert_eq!(declaring, REPOSITORY);
    assert_eq!(args[0].as_boxed(), Some(Primitive::Long(42)));
    assert_eq!(calls[2].2, vec![Value::Null]);
    assert_eq!(calls[3].2[0].as_boxed(), Some(Primitive::Double(2.0)));
    assert_eq!(calls[5].0, NAMED);
    Ok(())
}

#[test]
fn concrete_methods_keep_their_body_unless_proxied() -> Result<()> {
    let pool = repository_pool()?;
    let calls: Calls = Arc::default();

    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;
    let instance = synthesizer.new_instance(
        &generated,
        &pool,
        "(Ljava/lang/String;I)V",
        &[Value::string("acme"), Value::Int(3)],
        Some(recording_handler(&calls)),
    )?;
    let described =
        Interpreter::new(&pool).invoke_virtual(&instance, "describe", "()Ljava/lang/String;", &[])?;
    assert_eq!(described.as_str(), Some("acme"));
    assert!(calls.lock().unwrap().is_empty());

    // a fresh context, so the cache does not hand back the abstract-only type
    let proxied_pool = repository_pool()?;
    let generated = synthesizer.synthesize(REPOSITORY, &proxied_pool, true)?;
    let instance = synthesizer.new_instance(
        &generated,
        &proxied_pool,
        "()V",
        &[],
        Some(recording_handler(&calls)),
    )?;
    let described = Interpreter::new(&proxied_pool).invoke_virtual(
        &instance,
        "describe",
        "()Ljava/lang/String;",
        &[],
    )?;
    assert_eq!(described.as_str(), Some("proxied"));
    assert_eq!(calls.lock().unwrap()[0].1, "describe");
    Ok(())
}

#[test]
fn public_constructors_are_forwarded() -> Result<()> {
    let pool = repository_pool()?;
    let generated = Synthesizer::default().synthesize(REPOSITORY, &pool, false)?;

    let constructors: Vec<&str> = generated
        .class()
        .public_constructors()
        .map(|c| c.descriptor.as_str())
        .collect();
    assert_eq!(constructors, vec!["()V", "(I)V", "(Ljava/lang/String;I)V"]);
    assert!(generated
        .class()
        .declared_field("this$handler")
        .is_some());
    Ok(())
}

#[test]
fn unbound_instances_fail_until_bound_and_can_be_rebound() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;
    let instance = synthesizer.new_instance(&generated, &pool, "()V", &[], None)?;
    let vm = Interpreter::new(&pool);

    assert!(!synthesizer.handler_slot(&instance)?.is_bound());
    match vm.invoke_virtual(&instance, "count", "()I", &[]) {
        Err(Error::Thrown(throwable)) => {
            assert_eq!(throwable.class_name(), "java/lang/AbstractMethodError");
        }
        other => panic!("unexpected {other:?}"),
    }

    synthesizer.bind(&instance, constant_handler(1))?;
    assert!(synthesizer.handler_slot(&instance)?.is_bound());
    assert_eq!(vm.invoke_virtual(&instance, "count", "()I", &[])?, Value::Int(1));

    synthesizer.bind(&instance, constant_handler(2))?;
    assert_eq!(vm.invoke_virtual(&instance, "count", "()I", &[])?, Value::Int(2));
    Ok(())
}

#[test]
fn foreign_instances_are_rejected() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let plain = pool.lookup(PLAIN)?.unwrap();
    let instance = Interpreter::new(&pool).instantiate(&plain, "()V", &[])?;
    let before = instance.slot(PLAIN, "value")?;
    assert_eq!(before, Some(Slot::Value(Value::Int(0))));

    assert!(!synthesizer.is_generated(&plain));
    match synthesizer.bind(&instance, constant_handler(0)) {
        Err(Error::NotAGeneratedInstance(name)) => assert_eq!(name, PLAIN),
        other => panic!("unexpected {other:?}"),
    }
    // the failed bind leaves the object as it was
    assert_eq!(instance.slot(PLAIN, "value")?, before);
    assert_eq!(instance.slot(PLAIN, "this$handler")?, None);
    assert!(matches!(
        synthesizer.handler_slot(&instance),
        Err(Error::NotAGeneratedInstance(_))
    ));
    Ok(())
}

#[test]
fn handler_throwables_propagate_unchanged() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;

    let raised = Throwable::new("java/lang/IllegalStateException", Some("closed"));
    let thrown = raised.clone();
    let handler = move |_: &ObjectRef, _: &MethodRef, _: &[Value]| -> std::result::Result<Value, Throwable> {
        Err(thrown.clone())
    };
    let instance =
        synthesizer.new_instance(&generated, &pool, "()V", &[], Some(Arc::new(handler)))?;

    match Interpreter::new(&pool).invoke_virtual(&instance, "save", "(Ljava/lang/Object;)V", &[Value::Null]) {
        Err(Error::Thrown(caught)) => {
            assert!(caught.ptr_eq(&raised));
            assert_eq!(caught.message(), Some("closed"));
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn wrong_return_types_fail_the_cast() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;
    let instance = synthesizer.new_instance(&generated, &pool, "()V", &[], Some(constant_handler(3)))?;

    match Interpreter::new(&pool).invoke_virtual(&instance, "name", "()Ljava/lang/String;", &[]) {
        Err(Error::Thrown(throwable)) => {
            assert_eq!(throwable.class_name(), "java/lang/ClassCastException");
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn concurrent_requests_install_once_per_context() -> Result<()> {
    init_tracing();
    const THREADS: usize = 16;
    let pool = repository_pool()?;
    let other = repository_pool()?;
    let synthesizer = Synthesizer::new(SynthesisConfig::default().with_install_shards(4));
    let barrier = Barrier::new(THREADS);

    let generated: Vec<GeneratedType> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    synthesizer.synthesize(REPOSITORY, &pool, false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Result<_>>()
    })?;

    let first = generated[0].class();
    assert!(generated.iter().all(|g| Arc::ptr_eq(g.class(), first)));
    let counters = synthesizer.counters();
    assert_eq!(counters.installs, 1);
    assert_eq!(counters.installs + counters.probe_hits, THREADS);

    let elsewhere = synthesizer.synthesize(REPOSITORY, &other, false)?;
    assert!(!Arc::ptr_eq(elsewhere.class(), first));
    assert_eq!(elsewhere.context(), other.id());
    assert_eq!(synthesizer.installed_count(), 2);
    Ok(())
}

#[test]
fn batches_report_per_request() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let requests = [
        SynthesisRequest::new(REPOSITORY),
        SynthesisRequest::new("com/acme/Missing"),
        SynthesisRequest::new(NAMED).implementing(MARKER),
    ];

    let results = synthesizer.synthesize_all(&requests, &pool);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().name(), "com/acme/Repository$$Impl");
    assert!(matches!(&results[1], Err(Error::NotFound(name)) if name == "com/acme/Missing"));

    let named = results[2].as_ref().unwrap();
    let interfaces: Vec<&str> = named.class().interfaces().iter().map(|i| i.name()).collect();
    assert_eq!(
        interfaces,
        vec![NAMED, MARKER, "java/lang/reflect/InvocationHandler"]
    );
    Ok(())
}

#[test]
fn generated_bytes_decode_with_copied_metadata() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let bytes = synthesizer.generate(&SynthesisRequest::new(REPOSITORY), &pool)?;
    assert_eq!(synthesizer.installed_count(), 0);

    let class = ClassFile::parse(&bytes)?;
    assert_eq!(class.this_class, "com/acme/Repository$$Impl");
    assert_eq!(class.super_class.as_deref(), Some(REPOSITORY));
    assert!(class.access_flags.contains(ClassAccessFlags::SYNTHETIC));

    let find = class.method("find", "(J)Ljava/lang/Object;").unwrap();
    assert!(!find.access_flags.contains(MethodAccessFlags::ABSTRACT));
    assert_eq!(find.annotations.len(), 1);
    assert_eq!(
        find.annotations[0].get("value"),
        Some(&ElementValue::String("n\u{0}l é 😀".to_string()))
    );

    let handler = class.field("this$handler").unwrap();
    assert_eq!(handler.descriptor, "Ljava/lang/reflect/InvocationHandler;");
    Ok(())
}

#[test]
fn self_reference_reads_as_unbound() -> Result<()> {
    let pool = repository_pool()?;
    let synthesizer = Synthesizer::default();
    let generated = synthesizer.synthesize(REPOSITORY, &pool, false)?;
    for (descriptor, args) in [
        ("(I)V", vec![Value::Int(1)]),
        ("(Ljava/lang/String;I)V", vec![Value::string("x"), Value::Int(2)]),
    ] {
        let instance = synthesizer.new_instance(&generated, &pool, descriptor, &args, None)?;

        let slot = instance.slot(generated.name(), "this$handler")?;
        assert_eq!(slot, Some(Slot::This));
        assert!(matches!(synthesizer.handler_slot(&instance)?, HandlerSlot::Unbound));
    }
    Ok(())
}

#[test]
fn process_wide_functions_share_one_cache() -> Result<()> {
    let pool = repository_pool()?;
    let first = dynsubclass::synthesize(NAMED, &pool, false)?;
    let second = dynsubclass::synthesize(NAMED, &pool, true)?;
    assert!(Arc::ptr_eq(first.class(), second.class()));

    let instance = Interpreter::new(&pool).instantiate(first.class(), "()V", &[])?;
    dynsubclass::bind(&instance, constant_handler(0))?;
    assert!(Synthesizer::global().handler_slot(&instance)?.is_bound());
    Ok(())
}
