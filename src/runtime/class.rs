//! Linked classes of the reference runtime.

use std::{fmt, sync::Arc};

use crate::{
    classfile::{ClassAccessFlags, ClassFile, FieldAccessFlags, FieldInfo, MethodAccessFlags, MethodInfo},
    file::ClassBytes,
    runtime::ContextId,
};

/// Shared handle to a linked class.
pub type ClassRef = Arc<RuntimeClass>;

/// A class defined in a loading context, linked to its superclass and superinterfaces.
pub struct RuntimeClass {
    file: ClassFile,
    bytes: ClassBytes,
    super_class: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    context: ContextId,
}

/// A method found by [`RuntimeClass::find_method`], with the class that declares it.
#[derive(Clone)]
pub struct ResolvedMethod {
    /// Declaring class
    pub class: ClassRef,
    index: usize,
}

impl ResolvedMethod {
    /// The method declaration.
    #[must_use]
    pub fn info(&self) -> &MethodInfo {
        &self.class.file.methods[self.index]
    }
}

impl RuntimeClass {
    /// Assemble a linked class. The caller has already linked `super_class` and `interfaces`.
    #[must_use]
    pub fn new(
        file: ClassFile,
        bytes: ClassBytes,
        super_class: Option<ClassRef>,
        interfaces: Vec<ClassRef>,
        context: ContextId,
    ) -> Self {
        RuntimeClass {
            file,
            bytes,
            super_class,
            interfaces,
            context,
        }
    }

    /// Internal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.file.this_class
    }

    /// The decoded class file.
    #[must_use]
    pub fn file(&self) -> &ClassFile {
        &self.file
    }

    /// The class-file bytes the class was defined from.
    #[must_use]
    pub fn bytes(&self) -> &ClassBytes {
        &self.bytes
    }

    /// The loading context that defined this class.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Linked superclass; `None` for `java/lang/Object`.
    #[must_use]
    pub fn super_class(&self) -> Option<&ClassRef> {
        self.super_class.as_ref()
    }

    /// Linked direct superinterfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[ClassRef] {
        &self.interfaces
    }

    /// Class access flags.
    #[must_use]
    pub fn access_flags(&self) -> ClassAccessFlags {
        self.file.access_flags
    }

    /// Returns `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.file.is_interface()
    }

    /// Returns `true` for classes that cannot be instantiated.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.file
            .access_flags
            .intersects(ClassAccessFlags::ABSTRACT | ClassAccessFlags::INTERFACE)
    }

    /// Method declared directly by this class.
    #[must_use]
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.file.method(name, descriptor)
    }

    /// Field declared directly by this class.
    #[must_use]
    pub fn declared_field(&self, name: &str) -> Option<&FieldInfo> {
        self.file.field(name)
    }

    /// Non-static fields declared directly by this class.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.file
            .fields
            .iter()
            .filter(|f| !f.access_flags.contains(FieldAccessFlags::STATIC))
    }

    /// Public constructors declared by this class.
    pub fn public_constructors(&self) -> impl Iterator<Item = &MethodInfo> {
        self.file
            .methods
            .iter()
            .filter(|m| m.is_constructor() && m.access_flags.contains(MethodAccessFlags::PUBLIC))
    }

    fn resolved(class: &ClassRef, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        class
            .file
            .methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
            .map(|index| ResolvedMethod {
                class: class.clone(),
                index,
            })
    }

    /// Virtual method lookup (JVMS §5.4.6).
    ///
    /// Searches the class chain first; if no class declares the method, the superinterfaces are
    /// searched for a non-abstract default and then for any declaration.
    #[must_use]
    pub fn find_method(class: &ClassRef, name: &str, descriptor: &str) -> Option<ResolvedMethod> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if let Some(found) = Self::resolved(&cls, name, descriptor) {
                let flags = found.info().access_flags;
                if !flags.contains(MethodAccessFlags::STATIC) {
                    return Some(found);
                }
            }
            current = cls.super_class.clone();
        }

        let interfaces = Self::interface_closure(class);
        interfaces
            .iter()
            .filter_map(|iface| Self::resolved(iface, name, descriptor))
            .find(|m| !m.info().access_flags.contains(MethodAccessFlags::ABSTRACT))
            .or_else(|| {
                interfaces
                    .iter()
                    .find_map(|iface| Self::resolved(iface, name, descriptor))
            })
    }

    /// Method declared by `class` or, failing that, its nearest superclass.
    ///
    /// Used for `invokespecial` and `invokestatic`, which are not dispatched on the receiver.
    #[must_use]
    pub fn find_declared_or_inherited(
        class: &ClassRef,
        name: &str,
        descriptor: &str,
    ) -> Option<ResolvedMethod> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if let Some(found) = Self::resolved(&cls, name, descriptor) {
                return Some(found);
            }
            current = cls.super_class.clone();
        }
        None
    }

    /// All superinterfaces of the class and its superclasses, breadth first, without repeats.
    #[must_use]
    pub fn interface_closure(class: &ClassRef) -> Vec<ClassRef> {
        let mut queue: std::collections::VecDeque<ClassRef> = std::collections::VecDeque::new();
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            queue.extend(cls.interfaces.iter().cloned());
            current = cls.super_class.clone();
        }

        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        while let Some(iface) = queue.pop_front() {
            if seen.insert(iface.name().to_string()) {
                queue.extend(iface.interfaces.iter().cloned());
                result.push(iface);
            }
        }
        result
    }

    /// Returns `true` if instances of `class` are assignable to `target`.
    #[must_use]
    pub fn is_assignable_to(class: &ClassRef, target: &str) -> bool {
        if target == "java/lang/Object" {
            return true;
        }

        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if cls.name() == target {
                return true;
            }
            current = cls.super_class.clone();
        }

        Self::interface_closure(class)
            .iter()
            .any(|iface| iface.name() == target)
    }

    /// Class in the chain of `class` (itself included) whose name is `name`.
    #[must_use]
    pub fn ancestor(class: &ClassRef, name: &str) -> Option<ClassRef> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if cls.name() == name {
                return Some(cls);
            }
            current = cls.super_class.clone();
        }
        None
    }

    /// Starting at `class`, the nearest class in the chain that declares field `name`.
    #[must_use]
    pub fn field_owner(class: &ClassRef, name: &str) -> Option<ClassRef> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if cls.declared_field(name).is_some() {
                return Some(cls);
            }
            current = cls.super_class.clone();
        }
        None
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
