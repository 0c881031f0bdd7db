//! The constant pool (JVMS §4.4) and the modified UTF-8 string encoding (JVMS §4.4.7).
//!
//! [`ConstantPool`] is the read side: a decoded, index-addressable table with typed accessors
//! that validate cross references lazily. [`ConstantPoolBuilder`] is the write side: it hands
//! out indices for symbolic constants and deduplicates them, so a class written through it never
//! carries two identical entries.
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::classfile::{ConstantPool, ConstantPoolBuilder};
//! use dynsubclass::Parser;
//!
//! let mut builder = ConstantPoolBuilder::new();
//! let first = builder.method_ref("java/lang/Object", "<init>", "()V")?;
//! let second = builder.method_ref("java/lang/Object", "<init>", "()V")?;
//! assert_eq!(first, second);
//!
//! let mut bytes = Vec::new();
//! builder.write(&mut bytes);
//!
//! let pool = ConstantPool::read(&mut Parser::new(&bytes))?;
//! let method = pool.member_ref(first)?;
//! assert_eq!(method.class, "java/lang/Object");
//! assert_eq!(method.name, "<init>");
//! # Ok::<(), dynsubclass::Error>(())
//! ```

use std::collections::HashMap;

use strum::FromRepr;

use crate::{
    file::{io::write_be, parser::Parser},
    Result,
};

/// Tags of constant-pool entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// A decoded constant-pool entry.
///
/// Cross references are kept as raw indices; use the accessors on [`ConstantPool`] to follow
/// them with validation.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Constant {
    /// Slot 0, and the second slot of every `Long`/`Double` entry
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owning class
    pub class: &'a str,
    /// Member name
    pub name: &'a str,
    /// Field or method descriptor
    pub descriptor: &'a str,
    /// `true` if the reference is a `CONSTANT_InterfaceMethodref`
    pub interface: bool,
}

/// The constant pool of a parsed class file.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Read `constant_pool_count` followed by the pool entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags, invalid modified UTF-8 or an empty
    /// pool, and [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        while entries.len() < count as usize {
            let tag_byte = parser.read_be::<u8>()?;
            let Some(tag) = ConstantTag::from_repr(tag_byte) else {
                return Err(malformed_error!(
                    "Invalid constant pool tag {} at index {}",
                    tag_byte,
                    entries.len()
                ));
            };

            let entry = match tag {
                ConstantTag::Utf8 => {
                    let len = parser.read_be::<u16>()?;
                    Constant::Utf8(decode_modified_utf8(parser.read_bytes(len as usize)?)?)
                }
                ConstantTag::Integer => Constant::Integer(parser.read_be::<i32>()?),
                ConstantTag::Float => Constant::Float(parser.read_be::<f32>()?),
                ConstantTag::Long => Constant::Long(parser.read_be::<i64>()?),
                ConstantTag::Double => Constant::Double(parser.read_be::<f64>()?),
                ConstantTag::Class => Constant::Class(parser.read_be::<u16>()?),
                ConstantTag::String => Constant::String(parser.read_be::<u16>()?),
                ConstantTag::FieldRef => Constant::FieldRef {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                ConstantTag::MethodRef => Constant::MethodRef {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                ConstantTag::InterfaceMethodRef => Constant::InterfaceMethodRef {
                    class: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                ConstantTag::NameAndType => Constant::NameAndType {
                    name: parser.read_be::<u16>()?,
                    descriptor: parser.read_be::<u16>()?,
                },
                ConstantTag::MethodHandle => Constant::MethodHandle {
                    kind: parser.read_be::<u8>()?,
                    reference: parser.read_be::<u16>()?,
                },
                ConstantTag::MethodType => Constant::MethodType(parser.read_be::<u16>()?),
                ConstantTag::Dynamic => Constant::Dynamic {
                    bootstrap: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                ConstantTag::InvokeDynamic => Constant::InvokeDynamic {
                    bootstrap: parser.read_be::<u16>()?,
                    name_and_type: parser.read_be::<u16>()?,
                },
                ConstantTag::Module => Constant::Module(parser.read_be::<u16>()?),
                ConstantTag::Package => Constant::Package(parser.read_be::<u16>()?),
            };

            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            if wide {
                if entries.len() >= count as usize {
                    return Err(malformed_error!(
                        "Eight-byte constant occupies the last pool slot"
                    ));
                }
                entries.push(Constant::Unusable);
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Number of slots, including the unusable slot 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool has no usable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Look up an entry by index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is zero, out of range, or the second
    /// slot of an eight-byte constant.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {}",
                index
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Resolve a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a `CONSTANT_Class` entry to its internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Expected Class at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a `CONSTANT_NameAndType` entry to `(name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a field, method or interface-method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (class, name_and_type, interface) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at constant pool index {}, found {:?}",
                    index,
                    other
                ))
            }
        };

        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            class: self.class_name(class)?,
            name,
            descriptor,
            interface,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    NameAndType(u16, u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
}

/// Deduplicating constant-pool writer.
///
/// Floating-point constants are deduplicated by bit pattern, so `0.0` and `-0.0` (and distinct
/// NaN payloads) stay distinct entries.
#[derive(Debug, Clone)]
pub struct ConstantPoolBuilder {
    bytes: Vec<u8>,
    next_index: u32,
    lookup: HashMap<PoolKey, u16>,
}

impl Default for ConstantPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPoolBuilder {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        ConstantPoolBuilder {
            bytes: Vec::new(),
            next_index: 1,
            lookup: HashMap::new(),
        }
    }

    /// Value written as `constant_pool_count`: the number of slots plus one.
    #[must_use]
    pub fn count(&self) -> u16 {
        // next_index never exceeds u16::MAX, see `insert`
        u16::try_from(self.next_index).unwrap_or(u16::MAX)
    }

    /// Serialize `constant_pool_count` and all entries.
    pub fn write(&self, out: &mut Vec<u8>) {
        write_be(out, self.count());
        out.extend_from_slice(&self.bytes);
    }

    fn insert(&mut self, key: PoolKey, tag: ConstantTag, payload: &[u8]) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }

        let width = if matches!(tag, ConstantTag::Long | ConstantTag::Double) {
            2
        } else {
            1
        };
        let Ok(index) = u16::try_from(self.next_index) else {
            return Err(codegen_error!("constant pool overflow"));
        };
        if self.next_index + width > u32::from(u16::MAX) {
            return Err(codegen_error!("constant pool overflow"));
        }

        self.bytes.push(tag as u8);
        self.bytes.extend_from_slice(payload);
        self.next_index += width;
        self.lookup.insert(key, index);
        Ok(index)
    }

    /// Intern a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the encoded string exceeds 65535 bytes or
    /// the pool is full.
    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        let key = PoolKey::Utf8(value.to_string());
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }

        let encoded = encode_modified_utf8(value);
        let Ok(len) = u16::try_from(encoded.len()) else {
            return Err(codegen_error!(
                "string constant of {} bytes exceeds the class-file limit",
                encoded.len()
            ));
        };
        let mut payload = Vec::with_capacity(encoded.len() + 2);
        write_be(&mut payload, len);
        payload.extend_from_slice(&encoded);
        self.insert(key, ConstantTag::Utf8, &payload)
    }

    /// Intern a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.insert(
            PoolKey::Integer(value),
            ConstantTag::Integer,
            &value.to_be_bytes(),
        )
    }

    /// Intern a `CONSTANT_Float`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn float(&mut self, value: f32) -> Result<u16> {
        self.insert(
            PoolKey::Float(value.to_bits()),
            ConstantTag::Float,
            &value.to_be_bytes(),
        )
    }

    /// Intern a `CONSTANT_Long`, which occupies two slots.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.insert(PoolKey::Long(value), ConstantTag::Long, &value.to_be_bytes())
    }

    /// Intern a `CONSTANT_Double`, which occupies two slots.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn double(&mut self, value: f64) -> Result<u16> {
        self.insert(
            PoolKey::Double(value.to_bits()),
            ConstantTag::Double,
            &value.to_be_bytes(),
        )
    }

    /// Intern a `CONSTANT_Class` for an internal name or array descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.utf8(internal_name)?;
        self.insert(PoolKey::Class(name), ConstantTag::Class, &name.to_be_bytes())
    }

    /// Intern a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.utf8(value)?;
        self.insert(
            PoolKey::String(utf8),
            ConstantTag::String,
            &utf8.to_be_bytes(),
        )
    }

    /// Intern a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let descriptor = self.utf8(descriptor)?;
        let mut payload = [0_u8; 4];
        payload[..2].copy_from_slice(&name.to_be_bytes());
        payload[2..].copy_from_slice(&descriptor.to_be_bytes());
        self.insert(
            PoolKey::NameAndType(name, descriptor),
            ConstantTag::NameAndType,
            &payload,
        )
    }

    fn member(
        &mut self,
        tag: ConstantTag,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.class(class)?;
        let name_and_type = self.name_and_type(name, descriptor)?;
        let key = match tag {
            ConstantTag::FieldRef => PoolKey::FieldRef(class, name_and_type),
            ConstantTag::InterfaceMethodRef => PoolKey::InterfaceMethodRef(class, name_and_type),
            _ => PoolKey::MethodRef(class, name_and_type),
        };
        let mut payload = [0_u8; 4];
        payload[..2].copy_from_slice(&class.to_be_bytes());
        payload[2..].copy_from_slice(&name_and_type.to_be_bytes());
        self.insert(key, tag, &payload)
    }

    /// Intern a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        self.member(ConstantTag::FieldRef, class, name, descriptor)
    }

    /// Intern a `CONSTANT_Methodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        self.member(ConstantTag::MethodRef, class, name, descriptor)
    }

    /// Intern a `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeGeneration`] if the pool is full.
    pub fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        self.member(ConstantTag::InterfaceMethodRef, class, name, descriptor)
    }
}

/// Encode a string in the class file's modified UTF-8.
///
/// NUL is written as the two-byte form `C0 80` and supplementary characters as a pair of
/// three-byte encoded surrogates.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8.
///
/// Unpaired surrogates cannot be represented in a Rust string and decode to U+FFFD.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for bytes that are not valid modified UTF-8, including a
/// raw NUL byte and the four-byte forms of standard UTF-8.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let first = bytes[i];
        match first {
            0x01..=0x7F => {
                units.push(u16::from(first));
                i += 1;
            }
            0xC0..=0xDF => {
                let Some(&second) = bytes.get(i + 1) else {
                    return Err(malformed_error!("Truncated modified UTF-8 sequence"));
                };
                if second & 0xC0 != 0x80 {
                    return Err(malformed_error!("Invalid modified UTF-8 continuation byte"));
                }
                units.push((u16::from(first & 0x1F) << 6) | u16::from(second & 0x3F));
                i += 2;
            }
            0xE0..=0xEF => {
                let (Some(&second), Some(&third)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                    return Err(malformed_error!("Truncated modified UTF-8 sequence"));
                };
                if second & 0xC0 != 0x80 || third & 0xC0 != 0x80 {
                    return Err(malformed_error!("Invalid modified UTF-8 continuation byte"));
                }
                units.push(
                    (u16::from(first & 0x0F) << 12)
                        | (u16::from(second & 0x3F) << 6)
                        | u16::from(third & 0x3F),
                );
                i += 3;
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 lead byte 0x{:02x}",
                    first
                ))
            }
        }
    }

    Ok(char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_special_forms() {
        let value = "a\u{0}\u{e9}\u{20ac}\u{1F600}";
        let encoded = encode_modified_utf8(value);

        assert_eq!(
            encoded,
            vec![
                b'a', 0xC0, 0x80, 0xC3, 0xA9, 0xE2, 0x82, 0xAC, 0xED, 0xA0, 0xBD, 0xED, 0xB8,
                0x80
            ]
        );
        assert!(!encoded.contains(&0));
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), value);
    }

    #[test]
    fn modified_utf8_rejects_invalid() {
        assert!(decode_modified_utf8(&[0x00]).is_err());
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xE2, 0x82]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode_modified_utf8(&[0xC3, 0x29]).is_err());
    }

    #[test]
    fn lone_surrogate_is_replaced() {
        assert_eq!(
            decode_modified_utf8(&[0xED, 0xA0, 0xBD]).unwrap(),
            "\u{FFFD}"
        );
    }

    #[test]
    fn builder_deduplicates() {
        let mut builder = ConstantPoolBuilder::new();

        let utf8 = builder.utf8("java/lang/Object").unwrap();
        let class = builder.class("java/lang/Object").unwrap();
        assert_eq!(builder.class("java/lang/Object").unwrap(), class);
        assert_eq!(builder.utf8("java/lang/Object").unwrap(), utf8);

        let long = builder.long(7).unwrap();
        let after_long = builder.integer(7).unwrap();
        assert_eq!(after_long, long + 2);
        assert_eq!(builder.long(7).unwrap(), long);

        assert_ne!(builder.double(0.0).unwrap(), builder.double(-0.0).unwrap());
        assert_eq!(builder.count(), after_long + 5);
    }

    #[test]
    fn pool_round_trip() {
        let mut builder = ConstantPoolBuilder::new();
        let field = builder
            .field_ref("com/example/A", "x", "Ljava/lang/String;")
            .unwrap();
        let method = builder
            .interface_method_ref("com/example/I", "run", "()V")
            .unwrap();
        let text = builder.string("h\u{0}llo").unwrap();
        let wide = builder.double(2.5).unwrap();
        let float = builder.float(1.25).unwrap();

        let mut bytes = Vec::new();
        builder.write(&mut bytes);
        let pool = ConstantPool::read(&mut Parser::new(&bytes)).unwrap();

        assert_eq!(pool.len(), builder.count() as usize);
        let field = pool.member_ref(field).unwrap();
        assert_eq!(
            (field.class, field.name, field.descriptor, field.interface),
            ("com/example/A", "x", "Ljava/lang/String;", false)
        );
        assert!(pool.member_ref(method).unwrap().interface);
        match pool.get(text).unwrap() {
            Constant::String(utf8) => assert_eq!(pool.utf8(*utf8).unwrap(), "h\u{0}llo"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pool.get(wide).unwrap(), &Constant::Double(2.5));
        assert!(pool.get(wide + 1).is_err());
        assert_eq!(pool.get(float).unwrap(), &Constant::Float(1.25));
        assert!(pool.get(0).is_err());
        assert!(pool.utf8(float).is_err());
    }

    #[test]
    fn read_rejects_malformed() {
        // zero count
        assert!(ConstantPool::read(&mut Parser::new(&[0x00, 0x00])).is_err());
        // unknown tag
        assert!(ConstantPool::read(&mut Parser::new(&[0x00, 0x02, 0x02])).is_err());
        // truncated utf8
        assert!(ConstantPool::read(&mut Parser::new(&[0x00, 0x02, 0x01, 0x00, 0x05, b'a'])).is_err());
        // long in the last slot
        let mut bytes = vec![0x00, 0x02, 0x05];
        bytes.extend_from_slice(&7_i64.to_be_bytes());
        assert!(ConstantPool::read(&mut Parser::new(&bytes)).is_err());
    }
}
