//! The synthesizer's view of an original type and its hierarchy.
//!
//! An [`AbstractTypeDescriptor`] is read once per synthesis request from the class-file bytes
//! the loading context hands out. It keeps the structure of every type in the hierarchy (the
//! original, its superclass chain and all reachable interfaces) together with the raw bytes,
//! which the metadata copier re-reads for annotations.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
};

use crate::{
    classfile::{
        ClassAccessFlags, ClassFile, MethodAccessFlags, MethodInfo, MethodType, ReadOptions,
        CONSTRUCTOR_NAME,
    },
    file::ClassBytes,
    runtime::{LoadingContext, OBJECT},
    Error, Result,
};

/// Longest superclass chain read before the hierarchy is declared too deep.
const MAX_HIERARCHY_DEPTH: usize = 256;

/// Identity of a method for overriding and de-duplication: name plus parameter types.
///
/// Return type and declared exceptions are not part of the key, so covariant overrides and
/// erasure duplicates collapse onto one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    /// Method name
    pub name: String,
    /// Parameter part of the descriptor, parentheses included
    pub parameters: String,
}

impl MethodKey {
    /// Key of a method given its name and full descriptor.
    ///
    /// Returns `None` if the descriptor has no parameter list.
    #[must_use]
    pub fn new(name: &str, descriptor: &str) -> Option<MethodKey> {
        if !descriptor.starts_with('(') {
            return None;
        }
        let end = descriptor.find(')')?;
        Some(MethodKey {
            name: name.to_string(),
            parameters: descriptor[..=end].to_string(),
        })
    }

    /// Key of a method with an already parsed type.
    #[must_use]
    pub fn from_type(name: &str, method_type: &MethodType) -> MethodKey {
        MethodKey {
            name: name.to_string(),
            parameters: method_type.parameter_descriptor(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.parameters)
    }
}

/// A method selected for forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    /// Internal name of the declaring type
    pub declaring_class: String,
    /// Method name
    pub name: String,
    /// Full descriptor
    pub descriptor: String,
    /// Parsed descriptor
    pub method_type: MethodType,
    /// Declared exception classes
    pub exceptions: Vec<String>,
    /// Access flags of the declaration
    pub access_flags: MethodAccessFlags,
}

impl MethodDescriptor {
    /// Identity key of this method.
    #[must_use]
    pub fn key(&self) -> MethodKey {
        MethodKey::from_type(&self.name, &self.method_type)
    }

    /// Returns `true` if the declaration has no body.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }
}

/// A public constructor of the original class.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDescriptor {
    /// Full descriptor, always returning `V`
    pub descriptor: String,
    /// Parsed descriptor
    pub method_type: MethodType,
    /// Declared exception classes
    pub exceptions: Vec<String>,
    /// Access flags of the declaration
    pub access_flags: MethodAccessFlags,
}

/// One type of the hierarchy: its structure and the bytes it was read from.
#[derive(Debug, Clone)]
pub struct DeclaredType {
    /// Structure-only decode of `bytes`; annotations are left undecoded
    pub file: ClassFile,
    /// Bytes as returned by the loading context
    pub bytes: ClassBytes,
}

impl DeclaredType {
    fn read(context: &dyn LoadingContext, name: &str) -> Result<DeclaredType> {
        let bytes = context.read_type_bytes(name)?;
        let file = ClassFile::parse_with(&bytes, ReadOptions::structure_only())?;
        if file.this_class != name {
            return Err(malformed_error!(
                "Bytes for {} declare {}",
                name,
                file.this_class
            ));
        }
        Ok(DeclaredType { file, bytes })
    }

    /// Internal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.file.this_class
    }

    /// Declared methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodInfo] {
        &self.file.methods
    }
}

/// The original type and everything it inherits from, excluding `java/lang/Object`.
#[derive(Debug, Clone)]
pub struct AbstractTypeDescriptor {
    name: String,
    types: HashMap<String, DeclaredType>,
    superclasses: Vec<String>,
}

impl AbstractTypeDescriptor {
    /// Read `name` and its hierarchy through `context`.
    ///
    /// # Errors
    /// Propagates [`crate::Error::NotFound`] from the loading context unchanged, returns
    /// decoding errors for damaged class files and [`crate::Error::Malformed`] for cyclic or
    /// inconsistent hierarchies.
    pub fn read(name: &str, context: &dyn LoadingContext) -> Result<Self> {
        let original = DeclaredType::read(context, name)?;
        let mut types = HashMap::new();
        let mut superclasses = Vec::new();
        let mut pending: VecDeque<String> = original.file.interfaces.iter().cloned().collect();
        let mut next_super = original.file.super_class.clone();
        types.insert(name.to_string(), original);

        while let Some(super_name) = next_super.take() {
            if super_name == OBJECT {
                break;
            }
            if types.contains_key(&super_name) {
                return Err(malformed_error!("Cyclic superclass chain through {}", super_name));
            }
            if superclasses.len() >= MAX_HIERARCHY_DEPTH {
                return Err(Error::RecursionLimit(MAX_HIERARCHY_DEPTH));
            }

            let declared = DeclaredType::read(context, &super_name)?;
            if declared.file.is_interface() {
                return Err(malformed_error!("Superclass {} is an interface", super_name));
            }
            pending.extend(declared.file.interfaces.iter().cloned());
            next_super = declared.file.super_class.clone();
            types.insert(super_name.clone(), declared);
            superclasses.push(super_name);
        }

        while let Some(interface) = pending.pop_front() {
            if types.contains_key(&interface) {
                continue;
            }
            let declared = DeclaredType::read(context, &interface)?;
            if !declared.file.is_interface() {
                return Err(malformed_error!("{} implements class {}", name, interface));
            }
            pending.extend(declared.file.interfaces.iter().cloned());
            types.insert(interface, declared);
        }

        Ok(AbstractTypeDescriptor {
            name: name.to_string(),
            types,
            superclasses,
        })
    }

    /// Internal name of the original type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The original type.
    ///
    /// # Panics
    /// Never; the original is inserted by [`AbstractTypeDescriptor::read`].
    #[must_use]
    pub fn original(&self) -> &DeclaredType {
        &self.types[&self.name]
    }

    /// A type of the hierarchy by internal name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DeclaredType> {
        self.types.get(name)
    }

    /// Access flags of the original type.
    #[must_use]
    pub fn access_flags(&self) -> ClassAccessFlags {
        self.original().file.access_flags
    }

    /// Returns `true` if the original type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.original().file.is_interface()
    }

    /// Superclasses, nearest first, `java/lang/Object` excluded.
    pub fn superclasses(&self) -> impl Iterator<Item = &DeclaredType> {
        self.superclasses.iter().filter_map(|name| self.types.get(name))
    }

    /// The original followed by its superclasses.
    pub fn class_chain(&self) -> impl Iterator<Item = &DeclaredType> {
        std::iter::once(self.original()).chain(self.superclasses())
    }

    /// Interfaces reachable from `start`'s direct superinterfaces, breadth first, skipping
    /// names already in `visited`. Every returned name is added to `visited`.
    pub fn interface_closure<'a>(
        &'a self,
        start: &DeclaredType,
        visited: &mut HashSet<String>,
    ) -> Vec<&'a DeclaredType> {
        let mut queue: VecDeque<&str> = start.file.interfaces.iter().map(String::as_str).collect();
        let mut closure = Vec::new();
        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.to_string()) {
                continue;
            }
            if let Some(declared) = self.types.get(name) {
                queue.extend(declared.file.interfaces.iter().map(String::as_str));
                closure.push(declared);
            }
        }
        closure
    }

    /// Types in resolution order: the original, its interface closure, then each superclass
    /// nearest first followed by its not yet visited interface closure.
    #[must_use]
    pub fn traversal(&self) -> Vec<&DeclaredType> {
        let mut visited = HashSet::new();
        visited.insert(self.name.clone());

        let mut order = vec![self.original()];
        order.extend(self.interface_closure(self.original(), &mut visited));
        for superclass in self.superclasses() {
            visited.insert(superclass.name().to_string());
            order.push(superclass);
            order.extend(self.interface_closure(superclass, &mut visited));
        }
        order
    }

    /// Returns `true` if the original type is, extends or implements `name`.
    #[must_use]
    pub fn is_subtype_of(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Public constructors of the original class, in declaration order.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedMethodShape`] if a constructor descriptor is invalid.
    pub fn public_constructors(&self) -> Result<Vec<ConstructorDescriptor>> {
        self.original()
            .methods()
            .iter()
            .filter(|m| m.name == CONSTRUCTOR_NAME && m.access_flags.contains(MethodAccessFlags::PUBLIC))
            .map(|m| -> Result<ConstructorDescriptor> {
                let method_type = m.method_type().map_err(|e| Error::UnsupportedMethodShape {
                    class: self.name.clone(),
                    method: format!("{}{}", m.name, m.descriptor),
                    reason: e.to_string(),
                })?;
                Ok(ConstructorDescriptor {
                    descriptor: m.descriptor.clone(),
                    method_type,
                    exceptions: m.exceptions.clone(),
                    access_flags: m.access_flags,
                })
            })
            .collect()
    }

    /// The original's `SourceFile` attribute.
    #[must_use]
    pub fn source_file(&self) -> Option<&str> {
        self.original().file.source_file.as_deref()
    }
    #[cfg(test)]
    pub(crate) fn replace_bytes(&mut self, name: &str, bytes: Vec<u8>) {
        if let Some(declared) = self.types.get_mut(name) {
            declared.bytes = ClassBytes::from_vec(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures;

    #[test]
    fn method_keys_ignore_return_types() {
        let a = MethodKey::new("get", "(ILjava/lang/String;)Ljava/lang/Object;").unwrap();
        let b = MethodKey::new("get", "(ILjava/lang/String;)Ljava/lang/String;").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "get(ILjava/lang/String;)");
        assert!(MethodKey::new("get", "I").is_none());
    }

    #[test]
    fn hierarchy_is_read_through_the_context() {
        let pool = fixtures::hierarchy_pool();
        let descriptor = AbstractTypeDescriptor::read("t/Leaf", &pool).unwrap();

        assert_eq!(descriptor.name(), "t/Leaf");
        let supers: Vec<&str> = descriptor.superclasses().map(DeclaredType::name).collect();
        assert_eq!(supers, vec!["t/Mid", "t/Base"]);
        assert!(descriptor.is_subtype_of("t/Named"));
        assert!(descriptor.is_subtype_of("t/Tagged"));
        assert!(!descriptor.is_subtype_of(OBJECT));

        let order: Vec<&str> = descriptor.traversal().into_iter().map(DeclaredType::name).collect();
        assert_eq!(order, vec!["t/Leaf", "t/Mid", "t/Base", "t/Named", "t/Tagged"]);
    }

    #[test]
    fn missing_types_propagate_not_found() {
        let pool = fixtures::hierarchy_pool();
        assert!(AbstractTypeDescriptor::read("t/Nope", &pool)
            .unwrap_err()
            .is_not_found());
    }
}
