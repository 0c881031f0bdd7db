//! Computation of the dispatch set: the methods a generated type forwards.

use std::collections::HashSet;

use crate::{
    classfile::{MethodAccessFlags, MethodInfo, MAX_ARRAY_DIMENSIONS, MAX_PARAMETER_SLOTS},
    synth::model::{AbstractTypeDescriptor, DeclaredType, MethodDescriptor, MethodKey},
    Error, Result,
};

/// Ordered, de-duplicated methods that receive forwarding bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchSet {
    methods: Vec<MethodDescriptor>,
}

impl DispatchSet {
    /// Number of forwarded methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if nothing is forwarded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Forwarded methods in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter()
    }

    /// The entry for `key`, if forwarded.
    #[must_use]
    pub fn get(&self, key: &MethodKey) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.key() == *key)
    }
}

impl IntoIterator for DispatchSet {
    type Item = MethodDescriptor;
    type IntoIter = std::vec::IntoIter<MethodDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.methods.into_iter()
    }
}

/// Select the methods of `descriptor` to forward.
///
/// Types are visited in [`AbstractTypeDescriptor::traversal`] order and the first declaration
/// of each identity key decides: a `final` declaration blocks the key, an abstract one (or, with
/// `proxy_concrete_methods`, a public one) is forwarded, anything else just marks it seen.
/// Constructors, static initializers, static and private methods are never considered. Bridge
/// methods, like `final` ones, only mark their key seen, so the erased signature they cover is
/// not forwarded a second time.
///
/// # Errors
/// Returns [`crate::Error::UnsupportedMethodShape`] if a considered descriptor does not parse,
/// or a forwarded method needs more than 255 local slots or 255 array dimensions.
pub fn resolve(descriptor: &AbstractTypeDescriptor, proxy_concrete_methods: bool) -> Result<DispatchSet> {
    let mut seen: HashSet<MethodKey> = HashSet::new();
    let mut methods = Vec::new();

    for declared in descriptor.traversal() {
        for method in declared.methods() {
            if !is_candidate(method) {
                continue;
            }

            let method_type = method
                .method_type()
                .map_err(|e| unsupported(declared, method, &e.to_string()))?;
            let key = MethodKey::from_type(&method.name, &method_type);

            if method.access_flags.contains(MethodAccessFlags::FINAL) {
                if seen.insert(key) {
                    tracing::trace!(class = declared.name(), method = %method.name, "final, not forwarded");
                }
                continue;
            }
            if method.access_flags.contains(MethodAccessFlags::BRIDGE) {
                if seen.insert(key) {
                    tracing::trace!(class = declared.name(), method = %method.name, "bridge, not forwarded");
                }
                continue;
            }
            if !seen.insert(key) {
                continue;
            }

            let forward = method.access_flags.contains(MethodAccessFlags::ABSTRACT)
                || (proxy_concrete_methods && method.access_flags.contains(MethodAccessFlags::PUBLIC));
            if !forward {
                tracing::trace!(class = declared.name(), method = %method.name, "concrete, inherited");
                continue;
            }

            if method_type.parameter_slots() + 1 > MAX_PARAMETER_SLOTS {
                return Err(unsupported(
                    declared,
                    method,
                    &format!("needs {} local slots", method_type.parameter_slots() + 1),
                ));
            }
            let too_deep = method_type
                .parameters
                .iter()
                .chain(method_type.return_type.as_ref())
                .any(|t| t.dimensions() > MAX_ARRAY_DIMENSIONS);
            if too_deep {
                return Err(unsupported(declared, method, "too many array dimensions"));
            }

            tracing::trace!(
                class = declared.name(),
                method = %method.name,
                descriptor = %method.descriptor,
                "forwarded"
            );
            methods.push(MethodDescriptor {
                declaring_class: declared.name().to_string(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                method_type,
                exceptions: method.exceptions.clone(),
                access_flags: method.access_flags,
            });
        }
    }

    Ok(DispatchSet { methods })
}

fn is_candidate(method: &MethodInfo) -> bool {
    !(method.name.starts_with('<')
        || method
            .access_flags
            .intersects(MethodAccessFlags::STATIC | MethodAccessFlags::PRIVATE))
}

fn unsupported(declared: &DeclaredType, method: &MethodInfo, reason: &str) -> Error {
    Error::UnsupportedMethodShape {
        class: declared.name().to_string(),
        method: format!("{}{}", method.name, method.descriptor),
        reason: reason.to_string(),
    }
}
