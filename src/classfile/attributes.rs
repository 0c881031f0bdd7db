//! Attributes understood by the codec (JVMS §4.7).
//!
//! Only the attributes the synthesizer reads or writes are decoded: `Code`, `Exceptions`,
//! `SourceFile` and the four annotation attributes. Everything else is carried along as a
//! [`RawAttribute`].

use crate::{
    classfile::constpool::{ConstantPool, ConstantPoolBuilder},
    file::{
        io::{patch_be_at, write_be},
        parser::Parser,
    },
    Result,
};

#[allow(missing_docs)]
pub mod names {
    pub const CODE: &str = "Code";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
}

/// An attribute kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute body, without the name index and length prefix
    pub data: Vec<u8>,
}

/// One entry of a `Code` attribute's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant-pool index of the caught class; 0 catches everything
    pub catch_type: u16,
}

/// The body of a method.
///
/// Constant-pool indices inside `bytecode` refer to the pool of the class file the body belongs
/// to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    /// Maximum depth of the operand stack, in slots
    pub max_stack: u16,
    /// Number of local-variable slots, parameters included
    pub max_locals: u16,
    /// The instructions
    pub bytecode: Vec<u8>,
    /// Exception handlers, in priority order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes such as `LineNumberTable`
    pub attributes: Vec<RawAttribute>,
}

impl Code {
    /// Decode the body of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
    pub fn read(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Self> {
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()?;
        if code_length == 0 || code_length >= 65536 {
            return Err(malformed_error!("Invalid code length {}", code_length));
        }
        let bytecode = parser.read_bytes(code_length as usize)?.to_vec();

        let table_length = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(table_length as usize);
        for _ in 0..table_length {
            exception_table.push(ExceptionTableEntry {
                start_pc: parser.read_be::<u16>()?,
                end_pc: parser.read_be::<u16>()?,
                handler_pc: parser.read_be::<u16>()?,
                catch_type: parser.read_be::<u16>()?,
            });
        }

        let attributes = read_raw_attributes(parser, pool)?;

        Ok(Code {
            max_stack,
            max_locals,
            bytecode,
            exception_table,
            attributes,
        })
    }

    /// Encode the body of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the bytecode or a table is too large.
    pub fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPoolBuilder) -> Result<()> {
        let Ok(code_length) = u32::try_from(self.bytecode.len()) else {
            return Err(codegen_error!("method body too large"));
        };
        if code_length == 0 || code_length >= 65536 {
            return Err(codegen_error!("invalid method body length {}", code_length));
        }

        write_be(out, self.max_stack);
        write_be(out, self.max_locals);
        write_be(out, code_length);
        out.extend_from_slice(&self.bytecode);

        write_be(out, count_u16(self.exception_table.len())?);
        for entry in &self.exception_table {
            write_be(out, entry.start_pc);
            write_be(out, entry.end_pc);
            write_be(out, entry.handler_pc);
            write_be(out, entry.catch_type);
        }

        write_be(out, count_u16(self.attributes.len())?);
        for attribute in &self.attributes {
            write_attribute(out, pool, &attribute.name, |body, _| {
                body.extend_from_slice(&attribute.data);
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn count_u16(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| codegen_error!("table of {} entries exceeds u16", len))
}

/// Read `attributes_count` followed by the attributes, undecoded.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
pub fn read_raw_attributes(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Vec<RawAttribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let length = parser.read_be::<u32>()?;
        let data = parser.read_bytes(length as usize)?.to_vec();
        attributes.push(RawAttribute { name, data });
    }
    Ok(attributes)
}

/// Decode the body of an `Exceptions` attribute to class names.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for damaged input.
pub fn read_exceptions(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Vec<String>> {
    let count = parser.read_be::<u16>()?;
    let mut exceptions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        exceptions.push(pool.class_name(parser.read_be::<u16>()?)?.to_string());
    }
    Ok(exceptions)
}

/// Write one attribute: name index, back-patched length, then the body produced by `body`.
///
/// # Errors
/// Propagates errors from `body` and from interning the name.
pub fn write_attribute<F>(
    out: &mut Vec<u8>,
    pool: &mut ConstantPoolBuilder,
    name: &str,
    body: F,
) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>, &mut ConstantPoolBuilder) -> Result<()>,
{
    write_be(out, pool.utf8(name)?);
    let length_at = out.len();
    write_be(out, 0_u32);

    body(out, pool)?;

    let Ok(length) = u32::try_from(out.len() - length_at - 4) else {
        return Err(codegen_error!("attribute {} too large", name));
    };
    patch_be_at(out, length_at, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_write_read() {
        let code = Code {
            max_stack: 2,
            max_locals: 1,
            bytecode: vec![0x2A, 0xB0],
            exception_table: vec![],
            attributes: vec![RawAttribute {
                name: "LineNumberTable".into(),
                data: vec![0, 0],
            }],
        };

        let mut builder = ConstantPoolBuilder::new();
        let mut body = Vec::new();
        code.write(&mut body, &mut builder).unwrap();

        let mut pool_bytes = Vec::new();
        builder.write(&mut pool_bytes);
        let pool = ConstantPool::read(&mut Parser::new(&pool_bytes)).unwrap();

        let mut parser = Parser::new(&body);
        assert_eq!(Code::read(&mut parser, &pool).unwrap(), code);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn empty_code_rejected() {
        let mut builder = ConstantPoolBuilder::new();
        assert!(Code::default().write(&mut Vec::new(), &mut builder).is_err());

        let body = [0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let pool = ConstantPool::default();
        assert!(Code::read(&mut Parser::new(&body), &pool).is_err());
    }

    #[test]
    fn attribute_length_is_patched() {
        let mut builder = ConstantPoolBuilder::new();
        let mut out = Vec::new();
        write_attribute(&mut out, &mut builder, "Custom", |body, _| {
            body.extend_from_slice(&[1, 2, 3]);
            Ok(())
        })
        .unwrap();

        assert_eq!(&out[2..6], &[0, 0, 0, 3]);
        assert_eq!(&out[6..], &[1, 2, 3]);
    }
}
