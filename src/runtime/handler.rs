//! The invocation-handler contract generated types forward to.

use std::result::Result as StdResult;

use crate::runtime::value::{MethodRef, ObjectRef, Throwable, Value};

/// Receives every call forwarded by a generated type.
///
/// `proxy` is the generated instance the call was made on, `method` the reflective method of the
/// declaring type, and `args` the call's arguments in order, with primitives boxed.
///
/// The returned value is converted back for the caller: ignored for `void` methods, unboxed for
/// primitive returns (a raw [`Value::Int`] and friends is accepted in place of a boxed value),
/// and cast-checked for reference returns. A returned `Err` is thrown to the caller unchanged.
///
/// Closures with the matching signature implement the trait:
///
/// ```rust
/// use std::sync::Arc;
/// use dynsubclass::runtime::{InvocationHandler, MethodRef, ObjectRef, Throwable, Value};
///
/// let handler: Arc<dyn InvocationHandler> = Arc::new(
///     |_proxy: &ObjectRef, method: &MethodRef, args: &[Value]| -> Result<Value, Throwable> {
///         Ok(Value::string(&format!("{} with {} args", method.name, args.len())))
///     },
/// );
/// # let _ = handler;
/// ```
pub trait InvocationHandler: Send + Sync {
    /// Handle one forwarded call.
    ///
    /// # Errors
    /// The returned throwable propagates to the caller of the forwarded method.
    fn invoke(
        &self,
        proxy: &ObjectRef,
        method: &MethodRef,
        args: &[Value],
    ) -> StdResult<Value, Throwable>;
}

impl<F> InvocationHandler for F
where
    F: Fn(&ObjectRef, &MethodRef, &[Value]) -> StdResult<Value, Throwable> + Send + Sync,
{
    fn invoke(
        &self,
        proxy: &ObjectRef,
        method: &MethodRef,
        args: &[Value],
    ) -> StdResult<Value, Throwable> {
        self(proxy, method, args)
    }
}
