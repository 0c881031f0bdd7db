//! Loading contexts: where class-file bytes come from and where types get installed.
//!
//! [`LoadingContext`] is the boundary to the host's class-loading subsystem. The synthesizer only
//! ever talks to it through four operations: read the bytes of a type, look a type up, install
//! new bytes, and identify the context. [`ClassPool`] is the in-memory implementation used by the
//! reference runtime and the tests; it can fall back to a [`ClassPath`] directory on disk.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    classfile::{ClassFile, ClassFileBuilder, MethodAccessFlags, MethodSpec},
    file::ClassBytes,
    runtime::class::{ClassRef, RuntimeClass},
    Error, Result,
};

/// Longest superclass/superinterface chain linked before the hierarchy is declared cyclic.
const MAX_LINK_DEPTH: usize = 256;

/// Internal name of the handler interface every generated type refers to.
pub const INVOCATION_HANDLER: &str = "java/lang/reflect/InvocationHandler";

/// Internal name of the root class.
pub const OBJECT: &str = "java/lang/Object";

/// Descriptor of `InvocationHandler.invoke`.
pub const INVOKE_DESCRIPTOR: &str =
    "(Ljava/lang/Object;Ljava/lang/reflect/Method;[Ljava/lang/Object;)Ljava/lang/Object;";

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a loading context; part of the generated-type cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the id.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// The host collaborator that reads and installs types.
pub trait LoadingContext: Send + Sync {
    /// Identity of this context.
    fn id(&self) -> ContextId;

    /// Class-file bytes of the named type.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if the type is unknown to this context.
    fn read_type_bytes(&self, name: &str) -> Result<ClassBytes>;

    /// The named type if it is loadable from this context.
    ///
    /// # Errors
    /// Returns an error if the type exists but cannot be linked.
    fn lookup(&self, name: &str) -> Result<Option<ClassRef>>;

    /// Define and link a new type from class-file bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateDefinition`] if a type of that name already exists, or
    /// any decoding and linking error.
    fn install(&self, bytes: ClassBytes) -> Result<ClassRef>;
}

/// Directories of `.class` files laid out by package.
#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    roots: Vec<PathBuf>,
}

impl ClassPath {
    /// An empty class path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a directory.
    #[must_use]
    pub fn with_directory(mut self, root: impl AsRef<Path>) -> Self {
        self.roots.push(root.as_ref().to_path_buf());
        self
    }

    /// Memory-map `name.class` from the first root that has it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a matching file cannot be mapped.
    pub fn find(&self, name: &str) -> Result<Option<ClassBytes>> {
        for root in &self.roots {
            let path = root.join(format!("{name}.class"));
            if path.is_file() {
                return ClassBytes::from_file(&path).map(Some);
            }
        }
        Ok(None)
    }
}

/// In-memory loading context.
///
/// Holds *sources*, bytes that are known but not yet linked, and *classes*, linked types.
/// Sources come from [`ClassPool::add_class`] or the class path and are linked lazily by
/// [`LoadingContext::lookup`]. [`LoadingContext::install`] defines and links in one step.
///
/// Every pool starts with `java/lang/Object` and `java/lang/reflect/InvocationHandler` linked.
pub struct ClassPool {
    id: ContextId,
    sources: DashMap<String, ClassBytes>,
    classes: DashMap<String, ClassRef>,
    class_path: ClassPath,
}

impl ClassPool {
    /// Create a pool holding only the bootstrap classes.
    ///
    /// # Errors
    /// Returns an error if the bootstrap classes fail to build.
    pub fn new() -> Result<Self> {
        Self::with_class_path(ClassPath::new())
    }

    /// Create a pool that falls back to `class_path` for unknown names.
    ///
    /// # Errors
    /// Returns an error if the bootstrap classes fail to build.
    pub fn with_class_path(class_path: ClassPath) -> Result<Self> {
        let pool = ClassPool {
            id: ContextId::next(),
            sources: DashMap::new(),
            classes: DashMap::new(),
            class_path,
        };

        let object = ClassFileBuilder::new(OBJECT)
            .super_class(None)
            .method(
                MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "()V"),
                |code| {
                    code.return_void()?;
                    Ok(())
                },
            )?
            .build()?;
        pool.install(ClassBytes::from_vec(object))?;

        let handler = ClassFileBuilder::interface(INVOCATION_HANDLER)
            .declare(
                MethodSpec::new(
                    MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                    "invoke",
                    INVOKE_DESCRIPTOR,
                )
                .throws("java/lang/Throwable"),
            )
            .build()?;
        pool.install(ClassBytes::from_vec(handler))?;

        Ok(pool)
    }

    /// Register class-file bytes without linking them; returns the class's internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateDefinition`] if the name is already known, or a
    /// decoding error.
    pub fn add_class(&self, bytes: impl Into<ClassBytes>) -> Result<String> {
        let bytes = bytes.into();
        let name = class_name(&bytes)?;
        if self.classes.contains_key(&name) {
            return Err(Error::DuplicateDefinition(name));
        }
        match self.sources.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateDefinition(name)),
            Entry::Vacant(slot) => {
                slot.insert(bytes);
                Ok(name)
            }
        }
    }

    /// Number of linked classes.
    #[must_use]
    pub fn linked_count(&self) -> usize {
        self.classes.len()
    }

    fn source(&self, name: &str) -> Result<Option<ClassBytes>> {
        if let Some(bytes) = self.sources.get(name) {
            return Ok(Some(bytes.clone()));
        }
        self.class_path.find(name)
    }

    fn link(&self, bytes: ClassBytes, depth: usize) -> Result<ClassRef> {
        if depth > MAX_LINK_DEPTH {
            return Err(Error::RecursionLimit(MAX_LINK_DEPTH));
        }

        let file = ClassFile::parse(&bytes)?;

        let super_class = match &file.super_class {
            Some(name) => Some(self.resolve(name, depth + 1)?),
            None => None,
        };
        let interfaces = file
            .interfaces
            .iter()
            .map(|name| self.resolve(name, depth + 1))
            .collect::<Result<Vec<_>>>()?;

        if let Some(super_class) = &super_class {
            if super_class.is_interface() {
                return Err(malformed_error!(
                    "{} extends interface {}",
                    file.this_class,
                    super_class.name()
                ));
            }
        }

        Ok(Arc::new(RuntimeClass::new(
            file,
            bytes,
            super_class,
            interfaces,
            self.id,
        )))
    }

    fn resolve(&self, name: &str, depth: usize) -> Result<ClassRef> {
        match self.lookup_at(name, depth)? {
            Some(class) => Ok(class),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    fn lookup_at(&self, name: &str, depth: usize) -> Result<Option<ClassRef>> {
        if let Some(class) = self.classes.get(name) {
            return Ok(Some(class.clone()));
        }

        let Some(bytes) = self.source(name)? else {
            return Ok(None);
        };

        let linked = self.link(bytes, depth)?;
        if linked.name() != name {
            return Err(malformed_error!(
                "Class file for {} declares {}",
                name,
                linked.name()
            ));
        }

        // concurrent linkers converge on the first class stored
        Ok(Some(
            self.classes
                .entry(name.to_string())
                .or_insert(linked)
                .clone(),
        ))
    }
}

impl LoadingContext for ClassPool {
    fn id(&self) -> ContextId {
        self.id
    }

    fn read_type_bytes(&self, name: &str) -> Result<ClassBytes> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class.bytes().clone());
        }
        match self.source(name)? {
            Some(bytes) => Ok(bytes),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    fn lookup(&self, name: &str) -> Result<Option<ClassRef>> {
        self.lookup_at(name, 0)
    }

    fn install(&self, bytes: ClassBytes) -> Result<ClassRef> {
        let name = class_name(&bytes)?;
        if self.classes.contains_key(&name) || self.source(&name)?.is_some() {
            return Err(Error::DuplicateDefinition(name));
        }

        let linked = self.link(bytes, 0)?;
        match self.classes.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateDefinition(name)),
            Entry::Vacant(slot) => {
                tracing::debug!(class = %name, context = self.id.value(), "installed class");
                Ok(slot.insert(linked).clone())
            }
        }
    }
}

impl std::fmt::Debug for ClassPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassPool")
            .field("id", &self.id)
            .field("sources", &self.sources.len())
            .field("classes", &self.classes.len())
            .finish_non_exhaustive()
    }
}

/// Read only the `this_class` name of a class file.
fn class_name(bytes: &[u8]) -> Result<String> {
    let file = ClassFile::parse_with(bytes, crate::classfile::ReadOptions::metadata_only())?;
    Ok(file.this_class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassAccessFlags;

    #[test]
    fn bootstrap_classes_are_linked() {
        let pool = ClassPool::new().unwrap();
        let object = pool.lookup(OBJECT).unwrap().unwrap();
        assert!(object.super_class().is_none());
        assert!(object.declared_method("<init>", "()V").is_some());

        let handler = pool.lookup(INVOCATION_HANDLER).unwrap().unwrap();
        assert!(handler.is_interface());
        assert_eq!(pool.linked_count(), 2);
        assert!(pool.lookup("com/example/Missing").unwrap().is_none());
    }

    #[test]
    fn sources_link_lazily_and_install_rejects_duplicates() {
        let pool = ClassPool::new().unwrap();
        let bytes = ClassFileBuilder::new("com/example/Base")
            .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT)
            .default_constructor()
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pool.add_class(bytes.clone()).unwrap(), "com/example/Base");
        assert!(matches!(
            pool.add_class(bytes.clone()),
            Err(Error::DuplicateDefinition(_))
        ));
        assert_eq!(pool.linked_count(), 2);
        assert_eq!(
            pool.read_type_bytes("com/example/Base").unwrap().len(),
            bytes.len()
        );

        let base = pool.lookup("com/example/Base").unwrap().unwrap();
        assert!(Arc::ptr_eq(
            &base,
            &pool.lookup("com/example/Base").unwrap().unwrap()
        ));
        assert!(matches!(
            pool.install(ClassBytes::from_vec(bytes)),
            Err(Error::DuplicateDefinition(_))
        ));
    }

    #[test]
    fn missing_super_is_not_found() {
        let pool = ClassPool::new().unwrap();
        let bytes = ClassFileBuilder::new("com/example/Orphan")
            .super_class(Some("com/example/Gone"))
            .build()
            .unwrap();
        pool.add_class(bytes).unwrap();

        assert!(matches!(
            pool.lookup("com/example/Orphan"),
            Err(Error::NotFound(name)) if name == "com/example/Gone"
        ));
        assert!(pool.read_type_bytes("com/example/Gone").unwrap_err().is_not_found());
    }

    #[test]
    fn cyclic_hierarchy_hits_recursion_limit() {
        let pool = ClassPool::new().unwrap();
        for (name, super_name) in [("c/A", "c/B"), ("c/B", "c/A")] {
            let bytes = ClassFileBuilder::new(name)
                .super_class(Some(super_name))
                .build()
                .unwrap();
            pool.add_class(bytes).unwrap();
        }
        assert!(matches!(
            pool.lookup("c/A"),
            Err(Error::RecursionLimit(_))
        ));
    }

    #[test]
    fn class_path_directory() {
        let root = std::env::temp_dir().join(format!("dynsubclass-cp-{}", std::process::id()));
        std::fs::create_dir_all(root.join("com/example")).unwrap();
        let bytes = ClassFileBuilder::new("com/example/OnDisk")
            .default_constructor()
            .unwrap()
            .build()
            .unwrap();
        std::fs::write(root.join("com/example/OnDisk.class"), &bytes).unwrap();

        let pool = ClassPool::with_class_path(ClassPath::new().with_directory(&root)).unwrap();
        let class = pool.lookup("com/example/OnDisk").unwrap().unwrap();
        assert_eq!(class.bytes().len(), bytes.len());
        assert_ne!(pool.id(), ClassPool::new().unwrap().id());

        drop(class);
        drop(pool);
        std::fs::remove_dir_all(&root).unwrap();
    }
}
