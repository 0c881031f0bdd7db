//! Annotations and their element values (JVMS §4.7.16 – §4.7.19).
//!
//! Annotations are held fully resolved: element names, strings and constants are decoded out of
//! the source constant pool, so an [`Annotation`] can be moved between class files and written
//! again through a [`ConstantPoolBuilder`] of the destination.
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{Annotation, ElementValue};
//!
//! let secured = Annotation::new("Ljavax/annotation/security/RolesAllowed;")
//!     .with("value", ElementValue::Array(vec![ElementValue::String("admin".into())]));
//!
//! assert!(secured.visible);
//! assert_eq!(secured.type_name(), Some("javax/annotation/security/RolesAllowed"));
//! assert!(matches!(secured.get("value"), Some(ElementValue::Array(items)) if items.len() == 1));
//! ```

use crate::{
    classfile::constpool::{Constant, ConstantPool, ConstantPoolBuilder},
    file::{io::write_be, parser::Parser},
    Result,
};

/// Nesting limit for element values; deeper input is rejected as malformed.
const MAX_ELEMENT_DEPTH: usize = 64;

/// A single annotation with its element-value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface, e.g. `Ljavax/ejb/Local;`
    pub type_descriptor: String,
    /// `true` for runtime retention, `false` for class retention
    pub visible: bool,
    /// Element-value pairs in declaration order
    pub elements: Vec<(String, ElementValue)>,
}

/// The value of an annotation element.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ElementValue {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),
    /// An enum constant: the enum's field descriptor and the constant name
    Enum {
        type_descriptor: String,
        constant: String,
    },
    /// A class literal, as a return descriptor (`V` for `void.class`)
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Create a runtime-visible annotation without elements.
    #[must_use]
    pub fn new(type_descriptor: &str) -> Self {
        Annotation {
            type_descriptor: type_descriptor.to_string(),
            visible: true,
            elements: Vec::new(),
        }
    }

    /// Add an element-value pair.
    #[must_use]
    pub fn with(mut self, name: &str, value: ElementValue) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }

    /// Mark the annotation as class-retention (`RuntimeInvisible*`).
    #[must_use]
    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Look an element up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }

    /// Internal name of the annotation interface, if the descriptor names a class.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
    }

    fn read(parser: &mut Parser<'_>, pool: &ConstantPool, visible: bool, depth: usize) -> Result<Self> {
        let type_descriptor = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let pairs = parser.read_be::<u16>()?;

        let mut elements = Vec::with_capacity(pairs as usize);
        for _ in 0..pairs {
            let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
            let value = ElementValue::read(parser, pool, visible, depth + 1)?;
            elements.push((name, value));
        }

        Ok(Annotation {
            type_descriptor,
            visible,
            elements,
        })
    }

    fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPoolBuilder) -> Result<()> {
        write_be(out, pool.utf8(&self.type_descriptor)?);
        write_be(out, count_u16(self.elements.len(), "element-value pairs")?);
        for (name, value) in &self.elements {
            write_be(out, pool.utf8(name)?);
            value.write(out, pool)?;
        }
        Ok(())
    }
}

impl ElementValue {
    fn read(parser: &mut Parser<'_>, pool: &ConstantPool, visible: bool, depth: usize) -> Result<Self> {
        if depth > MAX_ELEMENT_DEPTH {
            return Err(malformed_error!("Annotation element values nested too deeply"));
        }

        let tag = parser.read_be::<u8>()?;
        let value = match tag {
            b'B' | b'C' | b'I' | b'S' | b'Z' => {
                let index = parser.read_be::<u16>()?;
                let Constant::Integer(raw) = pool.get(index)? else {
                    return Err(malformed_error!(
                        "Element tag '{}' must reference an Integer constant",
                        tag as char
                    ));
                };
                // narrowing mirrors the JVM's int-to-sub-word conversions
                match tag {
                    b'B' => ElementValue::Byte(*raw as i8),
                    b'C' => ElementValue::Char(*raw as u16),
                    b'S' => ElementValue::Short(*raw as i16),
                    b'Z' => ElementValue::Boolean(*raw != 0),
                    _ => ElementValue::Int(*raw),
                }
            }
            b'D' => match pool.get(parser.read_be::<u16>()?)? {
                Constant::Double(value) => ElementValue::Double(*value),
                other => return Err(malformed_error!("Expected Double, found {:?}", other)),
            },
            b'F' => match pool.get(parser.read_be::<u16>()?)? {
                Constant::Float(value) => ElementValue::Float(*value),
                other => return Err(malformed_error!("Expected Float, found {:?}", other)),
            },
            b'J' => match pool.get(parser.read_be::<u16>()?)? {
                Constant::Long(value) => ElementValue::Long(*value),
                other => return Err(malformed_error!("Expected Long, found {:?}", other)),
            },
            b's' => ElementValue::String(pool.utf8(parser.read_be::<u16>()?)?.to_string()),
            b'e' => ElementValue::Enum {
                type_descriptor: pool.utf8(parser.read_be::<u16>()?)?.to_string(),
                constant: pool.utf8(parser.read_be::<u16>()?)?.to_string(),
            },
            b'c' => ElementValue::Class(pool.utf8(parser.read_be::<u16>()?)?.to_string()),
            b'@' => ElementValue::Annotation(Box::new(Annotation::read(
                parser, pool, visible, depth,
            )?)),
            b'[' => {
                let count = parser.read_be::<u16>()?;
                let mut values = Vec::with_capacity(count.min(256) as usize);
                for _ in 0..count {
                    values.push(ElementValue::read(parser, pool, visible, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(malformed_error!(
                    "Invalid element value tag 0x{:02x}",
                    other
                ))
            }
        };

        Ok(value)
    }

    fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPoolBuilder) -> Result<()> {
        match self {
            ElementValue::Byte(value) => {
                out.push(b'B');
                write_be(out, pool.integer(i32::from(*value))?);
            }
            ElementValue::Char(value) => {
                out.push(b'C');
                write_be(out, pool.integer(i32::from(*value))?);
            }
            ElementValue::Short(value) => {
                out.push(b'S');
                write_be(out, pool.integer(i32::from(*value))?);
            }
            ElementValue::Boolean(value) => {
                out.push(b'Z');
                write_be(out, pool.integer(i32::from(*value))?);
            }
            ElementValue::Int(value) => {
                out.push(b'I');
                write_be(out, pool.integer(*value)?);
            }
            ElementValue::Double(value) => {
                out.push(b'D');
                write_be(out, pool.double(*value)?);
            }
            ElementValue::Float(value) => {
                out.push(b'F');
                write_be(out, pool.float(*value)?);
            }
            ElementValue::Long(value) => {
                out.push(b'J');
                write_be(out, pool.long(*value)?);
            }
            ElementValue::String(value) => {
                out.push(b's');
                write_be(out, pool.utf8(value)?);
            }
            ElementValue::Enum {
                type_descriptor,
                constant,
            } => {
                out.push(b'e');
                write_be(out, pool.utf8(type_descriptor)?);
                write_be(out, pool.utf8(constant)?);
            }
            ElementValue::Class(descriptor) => {
                out.push(b'c');
                write_be(out, pool.utf8(descriptor)?);
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(out, pool)?;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                write_be(out, count_u16(values.len(), "array element values")?);
                for value in values {
                    value.write(out, pool)?;
                }
            }
        }
        Ok(())
    }
}

fn count_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| codegen_error!("too many {} ({})", what, len))
}

/// Decode the body of a `Runtime{Visible,Invisible}Annotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
pub fn read_annotations(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    visible: bool,
) -> Result<Vec<Annotation>> {
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(count.min(256) as usize);
    for _ in 0..count {
        annotations.push(Annotation::read(parser, pool, visible, 0)?);
    }
    Ok(annotations)
}

/// Decode the body of a `Runtime{Visible,Invisible}ParameterAnnotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
pub fn read_parameter_annotations(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    visible: bool,
) -> Result<Vec<Vec<Annotation>>> {
    let parameters = parser.read_be::<u8>()?;
    let mut result = Vec::with_capacity(parameters as usize);
    for _ in 0..parameters {
        result.push(read_annotations(parser, pool, visible)?);
    }
    Ok(result)
}

/// Encode the body of an annotations attribute.
///
/// # Errors
/// Returns [`crate::Error::CodeGeneration`] if a count or the constant pool overflows.
pub fn write_annotations<'a>(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    annotations: impl ExactSizeIterator<Item = &'a Annotation>,
) -> Result<()> {
    write_be(out, count_u16(annotations.len(), "annotations")?);
    for annotation in annotations {
        annotation.write(out, pool)?;
    }
    Ok(())
}

/// Merge a visible and an invisible parameter-annotation table into one list per parameter.
///
/// The tables may disagree on their length; the longer one wins.
#[must_use]
pub fn merge_parameter_annotations(
    mut visible: Vec<Vec<Annotation>>,
    invisible: Vec<Vec<Annotation>>,
) -> Vec<Vec<Annotation>> {
    if visible.len() < invisible.len() {
        visible.resize_with(invisible.len(), Vec::new);
    }
    for (slot, extra) in visible.iter_mut().zip(invisible) {
        slot.extend(extra);
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Annotation {
        Annotation::new("Lcom/example/Everything;")
            .with("b", ElementValue::Byte(-3))
            .with("c", ElementValue::Char(0x20AC))
            .with("d", ElementValue::Double(0.5))
            .with("f", ElementValue::Float(-1.5))
            .with("i", ElementValue::Int(i32::MIN))
            .with("j", ElementValue::Long(i64::MAX))
            .with("s", ElementValue::Short(-2))
            .with("z", ElementValue::Boolean(true))
            .with("str", ElementValue::String("x\u{0}y".into()))
            .with(
                "e",
                ElementValue::Enum {
                    type_descriptor: "Ljava/lang/annotation/RetentionPolicy;".into(),
                    constant: "RUNTIME".into(),
                },
            )
            .with("cls", ElementValue::Class("V".into()))
            .with(
                "nested",
                ElementValue::Annotation(Box::new(
                    Annotation::new("Lcom/example/Inner;")
                        .with("value", ElementValue::Int(1)),
                )),
            )
            .with(
                "arr",
                ElementValue::Array(vec![ElementValue::Int(1), ElementValue::Int(1)]),
            )
    }

    #[test]
    fn element_values_survive_write_read() {
        let annotation = sample();
        let mut builder = ConstantPoolBuilder::new();
        let mut body = Vec::new();
        write_annotations(&mut body, &mut builder, std::iter::once(&annotation)).unwrap();

        let mut pool_bytes = Vec::new();
        builder.write(&mut pool_bytes);
        let pool = ConstantPool::read(&mut Parser::new(&pool_bytes)).unwrap();

        let read = read_annotations(&mut Parser::new(&body), &pool, true).unwrap();
        assert_eq!(read, vec![annotation]);
    }

    #[test]
    fn invisible_flag_is_taken_from_attribute() {
        let annotation = Annotation::new("Lcom/example/Marker;").invisible();
        let mut builder = ConstantPoolBuilder::new();
        let mut body = Vec::new();
        write_annotations(&mut body, &mut builder, std::iter::once(&annotation)).unwrap();

        let mut pool_bytes = Vec::new();
        builder.write(&mut pool_bytes);
        let pool = ConstantPool::read(&mut Parser::new(&pool_bytes)).unwrap();

        let read = read_annotations(&mut Parser::new(&body), &pool, false).unwrap();
        assert!(!read[0].visible);
        assert_eq!(read[0].type_name(), Some("com/example/Marker"));
    }

    #[test]
    fn rejects_bad_tags_and_truncation() {
        let mut builder = ConstantPoolBuilder::new();
        let type_index = builder.utf8("Lcom/example/A;").unwrap();
        let name_index = builder.utf8("v").unwrap();
        let mut pool_bytes = Vec::new();
        builder.write(&mut pool_bytes);
        let pool = ConstantPool::read(&mut Parser::new(&pool_bytes)).unwrap();

        let mut body = Vec::new();
        write_be(&mut body, 1_u16);
        write_be(&mut body, type_index);
        write_be(&mut body, 1_u16);
        write_be(&mut body, name_index);
        body.push(b'?');
        assert!(read_annotations(&mut Parser::new(&body), &pool, true).is_err());

        body.truncate(body.len() - 2);
        assert!(read_annotations(&mut Parser::new(&body), &pool, true).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut builder = ConstantPoolBuilder::new();
        let mut pool_bytes = Vec::new();
        builder.utf8("unused").unwrap();
        builder.write(&mut pool_bytes);
        let pool = ConstantPool::read(&mut Parser::new(&pool_bytes)).unwrap();

        let mut body = Vec::new();
        for _ in 0..=MAX_ELEMENT_DEPTH + 1 {
            body.push(b'[');
            write_be(&mut body, 1_u16);
        }
        assert!(ElementValue::read(&mut Parser::new(&body), &pool, true, 0).is_err());
    }

    #[test]
    fn merge_pads_to_longest() {
        let visible = vec![vec![Annotation::new("LA;")]];
        let invisible = vec![vec![], vec![Annotation::new("LB;").invisible()]];
        let merged = merge_parameter_annotations(visible, invisible);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].len(), 1);
        assert!(!merged[1][0].visible);
    }
}
