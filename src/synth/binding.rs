//! Attaching invocation handlers to generated instances.

use std::{fmt, sync::Arc};

use crate::{
    config::SynthesisConfig,
    runtime::{InvocationHandler, Instance, ObjectRef, Reference, RuntimeClass, Slot, Value},
    synth::lowering::HANDLER_DESCRIPTOR,
    Error, Result,
};

/// The binding state of a generated instance's handler slot.
///
/// Freshly constructed instances hold a reference to themselves, which reads as
/// [`HandlerSlot::Unbound`]: calls reach the instance's own (absent) `invoke` and fail with
/// `AbstractMethodError`.
#[derive(Clone)]
pub enum HandlerSlot {
    /// No caller-supplied handler
    Unbound,
    /// Calls are forwarded to this handler
    Bound(Arc<dyn InvocationHandler>),
}

impl HandlerSlot {
    /// Returns `true` for [`HandlerSlot::Bound`].
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, HandlerSlot::Bound(_))
    }

    /// The bound handler, if any.
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn InvocationHandler>> {
        match self {
            HandlerSlot::Unbound => None,
            HandlerSlot::Bound(handler) => Some(handler),
        }
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerSlot::Unbound => f.write_str("Unbound"),
            HandlerSlot::Bound(handler) => write!(f, "Bound({:p})", Arc::as_ptr(handler)),
        }
    }
}

/// Returns `true` if `class` carries the generated suffix and declares the handler slot.
pub(crate) fn is_generated(class: &RuntimeClass, config: &SynthesisConfig) -> bool {
    class.name().ends_with(&config.suffix)
        && class
            .declared_field(&config.handler_field)
            .is_some_and(|f| f.descriptor == HANDLER_DESCRIPTOR)
}

fn ensure_generated(instance: &ObjectRef, config: &SynthesisConfig) -> Result<()> {
    if is_generated(instance.class(), config) {
        Ok(())
    } else {
        Err(Error::NotAGeneratedInstance(instance.class().name().to_string()))
    }
}

/// Point the handler slot of `instance` at `handler`, replacing any earlier binding.
pub(crate) fn bind(
    instance: &ObjectRef,
    handler: Arc<dyn InvocationHandler>,
    config: &SynthesisConfig,
) -> Result<()> {
    ensure_generated(instance, config)?;
    tracing::debug!(class = instance.class().name(), "binding handler");
    Instance::put_field(
        instance,
        instance.class().name(),
        &config.handler_field,
        Value::Ref(Reference::Handler(handler)),
    )
}

/// Read the handler slot of `instance`.
pub(crate) fn handler_slot(instance: &ObjectRef, config: &SynthesisConfig) -> Result<HandlerSlot> {
    ensure_generated(instance, config)?;
    Ok(
        match instance.slot(instance.class().name(), &config.handler_field)? {
            Some(Slot::Value(Value::Ref(Reference::Handler(handler)))) => HandlerSlot::Bound(handler),
            _ => HandlerSlot::Unbound,
        },
    )
}
