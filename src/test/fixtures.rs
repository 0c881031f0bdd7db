//! A small annotated hierarchy used across the synthesis tests.
//!
//! ```text
//! t/Tagged          interface   @X tag()
//! t/Named           interface   extends Tagged, name()
//! t/Base            abstract    implements Named, @Y compute(@NotNull int) throws IOException, @Y m()
//! t/Mid             abstract    extends Base, @X m(), greet(), final done(), protected hook()
//! t/Leaf            abstract    extends Mid, @Entity @Internal, <init>(), @Inject <init>(String, int)
//! ```

use crate::{
    classfile::{
        Annotation, ClassAccessFlags, ClassFileBuilder, FieldType, MethodAccessFlags, MethodSpec,
    },
    runtime::ClassPool,
};

pub(crate) const X: &str = "Lt/X;";
pub(crate) const Y: &str = "Lt/Y;";
pub(crate) const NOT_NULL: &str = "Lt/NotNull;";
pub(crate) const ENTITY: &str = "Lt/Entity;";
pub(crate) const INTERNAL: &str = "Lt/Internal;";
pub(crate) const INJECT: &str = "Lt/Inject;";

const ABSTRACT_CLASS: ClassAccessFlags = ClassAccessFlags::PUBLIC
    .union(ClassAccessFlags::SUPER)
    .union(ClassAccessFlags::ABSTRACT);

fn abstract_method(name: &str, descriptor: &str) -> MethodSpec {
    MethodSpec::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        name,
        descriptor,
    )
}

fn returning_void(access: MethodAccessFlags, name: &str) -> MethodSpec {
    MethodSpec::new(access, name, "()V")
}

pub(crate) fn tagged() -> Vec<u8> {
    ClassFileBuilder::interface("t/Tagged")
        .declare(abstract_method("tag", "()Ljava/lang/String;").annotated(Annotation::new(X)))
        .build()
        .unwrap()
}

pub(crate) fn named() -> Vec<u8> {
    ClassFileBuilder::interface("t/Named")
        .implements("t/Tagged")
        .declare(abstract_method("name", "()Ljava/lang/String;"))
        .build()
        .unwrap()
}

pub(crate) fn base() -> Vec<u8> {
    ClassFileBuilder::new("t/Base")
        .access(ABSTRACT_CLASS)
        .implements("t/Named")
        .default_constructor()
        .unwrap()
        .declare(
            abstract_method("compute", "(I)I")
                .throws("java/io/IOException")
                .annotated(Annotation::new(Y))
                .parameter_annotated(0, Annotation::new(NOT_NULL)),
        )
        .declare(abstract_method("m", "()V").annotated(Annotation::new(Y)))
        .build()
        .unwrap()
}

pub(crate) fn mid() -> Vec<u8> {
    ClassFileBuilder::new("t/Mid")
        .access(ABSTRACT_CLASS)
        .super_class(Some("t/Base"))
        .default_constructor()
        .unwrap()
        .method(
            returning_void(MethodAccessFlags::PUBLIC, "m").annotated(Annotation::new(X)),
            |code| {
                code.return_void()?;
                Ok(())
            },
        )
        .unwrap()
        .method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "greet", "()Ljava/lang/String;"),
            |code| {
                code.ldc_string("hello from Mid")?
                    .return_value(Some(&FieldType::Object("java/lang/String".to_string())))?;
                Ok(())
            },
        )
        .unwrap()
        .method(
            returning_void(MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL, "done"),
            |code| {
                code.return_void()?;
                Ok(())
            },
        )
        .unwrap()
        .method(returning_void(MethodAccessFlags::PROTECTED, "hook"), |code| {
            code.return_void()?;
            Ok(())
        })
        .unwrap()
        .build()
        .unwrap()
}

pub(crate) fn leaf() -> Vec<u8> {
    ClassFileBuilder::new("t/Leaf")
        .access(ABSTRACT_CLASS)
        .super_class(Some("t/Mid"))
        .annotation(Annotation::new(ENTITY))
        .annotation(Annotation::new(INTERNAL).invisible())
        .source_file("Leaf.java")
        .default_constructor()
        .unwrap()
        .method(
            MethodSpec::new(MethodAccessFlags::PUBLIC, "<init>", "(Ljava/lang/String;I)V")
                .annotated(Annotation::new(INJECT)),
            |code| {
                code.aload(0)?
                    .invokespecial("t/Mid", "<init>", "()V")?
                    .return_void()?;
                Ok(())
            },
        )
        .unwrap()
        .build()
        .unwrap()
}

/// A pool holding the whole fixture hierarchy.
pub(crate) fn hierarchy_pool() -> ClassPool {
    let pool = ClassPool::new().unwrap();
    for bytes in [tagged(), named(), base(), mid(), leaf()] {
        pool.add_class(bytes).unwrap();
    }
    pool
}
