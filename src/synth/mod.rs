//! Run-time synthesis of forwarding subtypes.
//!
//! Given the internal name of an abstract class or an interface, the [`Synthesizer`] produces
//! and installs a concrete subtype whose abstract methods (and, on request, every public
//! overridable method) hand each call to an [`crate::runtime::InvocationHandler`]. The
//! generated type keeps the annotations of the original hierarchy so frameworks that discover
//! behavior through reflection see the same metadata on it.
//!
//! # Pipeline
//!
//! 1. [`model::AbstractTypeDescriptor::read`] reads the original and its hierarchy through the
//!    [`crate::runtime::LoadingContext`].
//! 2. [`resolver::resolve`] selects the methods to forward.
//! 3. [`emitter::emit`] describes the generated type as a [`definition::TypeDefinition`].
//! 4. [`metadata::copy_metadata`] copies annotations onto the definition.
//! 5. [`lowering::lower`] encodes the definition as a class file.
//! 6. The definition cache installs the bytes at most once per original type and loading
//!    context.
//!
//! Steps 1 to 5 are side-effect free and run without locks; only step 6 is serialized.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dynsubclass::classfile::{ClassAccessFlags, ClassFileBuilder, MethodAccessFlags, MethodSpec};
//! use dynsubclass::runtime::{ClassPool, Interpreter, MethodRef, ObjectRef, Throwable, Value};
//! use dynsubclass::Synthesizer;
//!
//! let greeter = ClassFileBuilder::new("com/example/Greeter")
//!     .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::ABSTRACT)
//!     .default_constructor()?
//!     .declare(MethodSpec::new(
//!         MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
//!         "greet",
//!         "(Ljava/lang/String;)Ljava/lang/String;",
//!     ))
//!     .build()?;
//!
//! let pool = ClassPool::new()?;
//! pool.add_class(greeter)?;
//!
//! let synthesizer = Synthesizer::default();
//! let generated = synthesizer.synthesize("com/example/Greeter", &pool, false)?;
//! assert_eq!(generated.name(), "com/example/Greeter$$Impl");
//!
//! let handler = |_: &ObjectRef, method: &MethodRef, args: &[Value]| -> Result<Value, Throwable> {
//!     Ok(Value::string(&format!("{} {}", method.name, args[0].as_str().unwrap_or("?"))))
//! };
//! let instance = synthesizer.new_instance(&generated, &pool, "()V", &[], Some(Arc::new(handler)))?;
//!
//! let reply = Interpreter::new(&pool).invoke_virtual(
//!     &instance,
//!     "greet",
//!     "(Ljava/lang/String;)Ljava/lang/String;",
//!     &[Value::string("world")],
//! )?;
//! assert_eq!(reply.as_str(), Some("greet world"));
//! # Ok::<(), dynsubclass::Error>(())
//! ```

pub mod binding;
mod cache;
pub mod definition;
pub mod emitter;
pub mod lowering;
pub mod metadata;
pub mod model;
pub mod resolver;

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;

pub use binding::HandlerSlot;
pub use cache::CacheStats;

use crate::{
    config::SynthesisConfig,
    runtime::{ClassRef, ContextId, Interpreter, InvocationHandler, LoadingContext, ObjectRef, RuntimeClass, Value},
    synth::{cache::DefinitionCache, model::AbstractTypeDescriptor},
    Result,
};

/// A request for a generated subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Internal name of the original type
    pub original: String,
    /// Forward every public overridable method, not only abstract ones
    pub proxy_concrete_methods: bool,
    /// Additional interfaces the generated type implements
    pub interfaces: Vec<String>,
}

impl SynthesisRequest {
    /// Request forwarding of the abstract methods of `original`.
    #[must_use]
    pub fn new(original: &str) -> Self {
        SynthesisRequest {
            original: original.to_string(),
            proxy_concrete_methods: false,
            interfaces: Vec::new(),
        }
    }

    /// Also forward concrete public methods.
    #[must_use]
    pub fn proxy_concrete(mut self, enabled: bool) -> Self {
        self.proxy_concrete_methods = enabled;
        self
    }

    /// Implement an additional interface.
    #[must_use]
    pub fn implementing(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }
}

/// An installed generated type.
#[derive(Debug, Clone)]
pub struct GeneratedType {
    original: String,
    class: ClassRef,
}

impl GeneratedType {
    /// Internal name of the generated type.
    #[must_use]
    pub fn name(&self) -> &str {
        self.class.name()
    }

    /// Internal name of the type it was generated from.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The linked class.
    #[must_use]
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// The loading context it is installed in.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.class.context()
    }
}

/// Generates, installs and binds forwarding subtypes.
///
/// A synthesizer owns the cache of installed types, so every caller that should observe one
/// generated type per original and loading context must share the same instance. The
/// free functions [`synthesize`] and [`bind`] use a process-wide one.
pub struct Synthesizer {
    config: SynthesisConfig,
    cache: DefinitionCache,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(SynthesisConfig::default())
    }
}

impl Synthesizer {
    /// Create a synthesizer with its own, empty cache.
    #[must_use]
    pub fn new(config: SynthesisConfig) -> Self {
        Synthesizer {
            cache: DefinitionCache::new(config.install_shards),
            config,
        }
    }

    /// The process-wide synthesizer with default configuration.
    pub fn global() -> &'static Synthesizer {
        static GLOBAL: OnceLock<Synthesizer> = OnceLock::new();
        GLOBAL.get_or_init(Synthesizer::default)
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Counters of the definition cache.
    #[must_use]
    pub fn counters(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of generated types this synthesizer has recorded.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.cache.len()
    }

    /// Obtain the generated subtype of `original` in `context`, creating it on first use.
    ///
    /// The cache is keyed by original type and loading context only: once a type is installed,
    /// later requests receive it whatever `proxy_concrete_methods` they pass.
    ///
    /// # Errors
    /// - [`crate::Error::NotFound`] if the original or one of its supertypes is unknown
    /// - [`crate::Error::UnsupportedMethodShape`] or [`crate::Error::NoAccessibleConstructor`]
    ///   if the original cannot be subclassed
    /// - [`crate::Error::MetadataCopy`] if annotations cannot be read
    /// - any error raised by the loading context while installing
    pub fn synthesize(
        &self,
        original: &str,
        context: &dyn LoadingContext,
        proxy_concrete_methods: bool,
    ) -> Result<GeneratedType> {
        self.synthesize_request(
            &SynthesisRequest::new(original).proxy_concrete(proxy_concrete_methods),
            context,
        )
    }

    /// [`Synthesizer::synthesize`] with the full set of request options.
    ///
    /// # Errors
    /// See [`Synthesizer::synthesize`].
    pub fn synthesize_request(
        &self,
        request: &SynthesisRequest,
        context: &dyn LoadingContext,
    ) -> Result<GeneratedType> {
        let generated_name = self.config.generated_name(&request.original);
        let class = self.cache.get_or_install(
            (request.original.clone(), context.id()),
            &generated_name,
            context,
            || self.generate(request, context),
        )?;
        Ok(GeneratedType {
            original: request.original.clone(),
            class,
        })
    }

    /// Produce the class-file bytes of the generated type without installing them.
    ///
    /// # Errors
    /// See [`Synthesizer::synthesize`].
    pub fn generate(&self, request: &SynthesisRequest, context: &dyn LoadingContext) -> Result<Vec<u8>> {
        tracing::debug!(
            original = %request.original,
            proxy_concrete = request.proxy_concrete_methods,
            "synthesizing"
        );

        let descriptor = AbstractTypeDescriptor::read(&request.original, context)?;
        let dispatch = resolver::resolve(&descriptor, request.proxy_concrete_methods)?;
        let mut definition =
            emitter::emit(&descriptor, &dispatch, &request.interfaces, &self.config)?;
        metadata::copy_metadata(&descriptor, &mut definition)?;
        lowering::lower(&definition)
    }

    /// Synthesize a batch of requests in parallel.
    ///
    /// Results are returned in request order; one failure does not affect the others.
    pub fn synthesize_all(
        &self,
        requests: &[SynthesisRequest],
        context: &dyn LoadingContext,
    ) -> Vec<Result<GeneratedType>> {
        requests
            .par_iter()
            .map(|request| self.synthesize_request(request, context))
            .collect()
    }

    /// Route every forwarded call on `instance` to `handler`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotAGeneratedInstance`] if `instance` was not produced by a
    /// synthesizer with this configuration; the instance is left unchanged.
    pub fn bind(&self, instance: &ObjectRef, handler: Arc<dyn InvocationHandler>) -> Result<()> {
        binding::bind(instance, handler, &self.config)
    }

    /// Current handler binding of `instance`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotAGeneratedInstance`] for foreign instances.
    pub fn handler_slot(&self, instance: &ObjectRef) -> Result<HandlerSlot> {
        binding::handler_slot(instance, &self.config)
    }

    /// Returns `true` if `class` is a generated type.
    #[must_use]
    pub fn is_generated(&self, class: &RuntimeClass) -> bool {
        binding::is_generated(class, &self.config)
    }

    /// Construct an instance of `generated` through its constructor `descriptor`, then bind
    /// `handler` if one is given.
    ///
    /// # Errors
    /// Returns [`crate::Error::Thrown`] if the constructor throws, or the errors of
    /// [`Synthesizer::bind`].
    pub fn new_instance(
        &self,
        generated: &GeneratedType,
        context: &dyn LoadingContext,
        descriptor: &str,
        args: &[Value],
        handler: Option<Arc<dyn InvocationHandler>>,
    ) -> Result<ObjectRef> {
        let interpreter = Interpreter::new(context).with_limits(self.config.execution_limits);
        let instance = interpreter.instantiate(generated.class(), descriptor, args)?;
        if let Some(handler) = handler {
            self.bind(&instance, handler)?;
        }
        Ok(instance)
    }
}

/// Obtain the generated subtype of `original` from the process-wide [`Synthesizer`].
///
/// # Errors
/// See [`Synthesizer::synthesize`].
pub fn synthesize(
    original: &str,
    context: &dyn LoadingContext,
    proxy_concrete_methods: bool,
) -> Result<GeneratedType> {
    Synthesizer::global().synthesize(original, context, proxy_concrete_methods)
}

/// Bind `handler` to `instance` through the process-wide [`Synthesizer`].
///
/// # Errors
/// See [`Synthesizer::bind`].
pub fn bind(instance: &ObjectRef, handler: Arc<dyn InvocationHandler>) -> Result<()> {
    Synthesizer::global().bind(instance, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::ClassFile,
        runtime::{MethodRef, Throwable},
        test::fixtures,
    };

    fn echo() -> Arc<dyn InvocationHandler> {
        Arc::new(
            |_: &ObjectRef, method: &MethodRef, _: &[Value]| -> std::result::Result<Value, Throwable> {
                Ok(Value::string(&method.name))
            },
        )
    }

    #[test]
    fn generate_does_not_install() {
        let pool = fixtures::hierarchy_pool();
        let synthesizer = Synthesizer::default();

        let bytes = synthesizer
            .generate(&SynthesisRequest::new("t/Leaf"), &pool)
            .unwrap();
        assert_eq!(ClassFile::parse(&bytes).unwrap().this_class, "t/Leaf$$Impl");
        assert!(pool.lookup("t/Leaf$$Impl").unwrap().is_none());
        assert_eq!(synthesizer.counters(), CacheStats::default());
    }

    #[test]
    fn first_request_fixes_the_mode() {
        let pool = fixtures::hierarchy_pool();
        let synthesizer = Synthesizer::default();

        let proxied = synthesizer.synthesize("t/Leaf", &pool, true).unwrap();
        let again = synthesizer.synthesize("t/Leaf", &pool, false).unwrap();
        assert!(Arc::ptr_eq(proxied.class(), again.class()));
        assert!(proxied.class().declared_method("greet", "()Ljava/lang/String;").is_some());
        assert_eq!(synthesizer.counters().probe_hits, 1);
    }

    #[test]
    fn override_precedence_reaches_the_installed_type() {
        let pool = fixtures::hierarchy_pool();
        let synthesizer = Synthesizer::default();
        let generated = synthesizer.synthesize("t/Leaf", &pool, true).unwrap();

        let m = generated.class().declared_method("m", "()V").unwrap();
        let types: Vec<&str> = m.annotations.iter().map(|a| a.type_descriptor.as_str()).collect();
        assert_eq!(types, vec![fixtures::X]);

        let instance = synthesizer
            .new_instance(&generated, &pool, "()V", &[], Some(echo()))
            .unwrap();
        let greeting = Interpreter::new(&pool)
            .invoke_virtual(&instance, "greet", "()Ljava/lang/String;", &[])
            .unwrap();
        assert_eq!(greeting.as_str(), Some("greet"));
    }

    #[test]
    fn custom_naming_is_honored() {
        let pool = fixtures::hierarchy_pool();
        let config = SynthesisConfig::default()
            .with_suffix("$$Proxy")
            .with_handler_field("delegate");
        let synthesizer = Synthesizer::new(config);

        let generated = synthesizer.synthesize("t/Named", &pool, false).unwrap();
        assert_eq!(generated.name(), "t/Named$$Proxy");
        assert!(synthesizer.is_generated(generated.class()));
        assert!(!Synthesizer::default().is_generated(generated.class()));

        let instance = synthesizer
            .new_instance(&generated, &pool, "()V", &[], Some(echo()))
            .unwrap();
        assert!(synthesizer.handler_slot(&instance).unwrap().is_bound());
        let tag = Interpreter::new(&pool)
            .invoke_virtual(&instance, "tag", "()Ljava/lang/String;", &[])
            .unwrap();
        assert_eq!(tag.as_str(), Some("tag"));
    }

    #[test]
    fn errors_are_not_cached() {
        let pool = fixtures::hierarchy_pool();
        let synthesizer = Synthesizer::default();

        assert!(synthesizer.synthesize("t/Late", &pool, false).unwrap_err().is_not_found());
        pool.add_class(
            crate::classfile::ClassFileBuilder::interface("t/Late")
                .build()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(synthesizer.synthesize("t/Late", &pool, false).unwrap().name(), "t/Late$$Impl");
    }
}
