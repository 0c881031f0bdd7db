//! Field and method descriptors (JVMS §4.3).
//!
//! Descriptors are parsed into [`FieldType`] and [`MethodType`] and rendered back with
//! [`std::fmt::Display`]. Parsing enforces the structural limits of the class-file format: at
//! most 255 array dimensions, and at most 255 parameter slots (including `this`) for a method.

use std::{fmt, str::FromStr};

use strum::{EnumIter, IntoEnumIterator};

use crate::Result;

/// Maximum number of array dimensions a descriptor may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Maximum number of local-variable slots a method's parameters may occupy, `this` included.
pub const MAX_PARAMETER_SLOTS: usize = 255;

/// Primitive types of the JVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum BaseType {
    /// `B`, signed byte
    Byte,
    /// `C`, UTF-16 code unit
    Char,
    /// `D`, double-precision float
    Double,
    /// `F`, single-precision float
    Float,
    /// `I`, 32-bit integer
    Int,
    /// `J`, 64-bit integer
    Long,
    /// `S`, signed short
    Short,
    /// `Z`, boolean
    Boolean,
}

impl BaseType {
    /// Descriptor character of this type.
    #[must_use]
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    /// Look a base type up by its descriptor character.
    #[must_use]
    pub fn from_descriptor_char(c: char) -> Option<BaseType> {
        BaseType::iter().find(|base| base.descriptor_char() == c)
    }

    /// Internal name of the wrapper class used when boxing this type.
    #[must_use]
    pub fn wrapper_class(self) -> &'static str {
        match self {
            BaseType::Byte => "java/lang/Byte",
            BaseType::Char => "java/lang/Character",
            BaseType::Double => "java/lang/Double",
            BaseType::Float => "java/lang/Float",
            BaseType::Int => "java/lang/Integer",
            BaseType::Long => "java/lang/Long",
            BaseType::Short => "java/lang/Short",
            BaseType::Boolean => "java/lang/Boolean",
        }
    }

    /// Look a base type up by the internal name of its wrapper class.
    #[must_use]
    pub fn from_wrapper_class(name: &str) -> Option<BaseType> {
        BaseType::iter().find(|base| base.wrapper_class() == name)
    }

    /// Name of the wrapper's unboxing accessor, e.g. `intValue`.
    #[must_use]
    pub fn unbox_method(self) -> &'static str {
        match self {
            BaseType::Byte => "byteValue",
            BaseType::Char => "charValue",
            BaseType::Double => "doubleValue",
            BaseType::Float => "floatValue",
            BaseType::Int => "intValue",
            BaseType::Long => "longValue",
            BaseType::Short => "shortValue",
            BaseType::Boolean => "booleanValue",
        }
    }

    /// Descriptor of the wrapper's static `valueOf` factory, e.g. `(I)Ljava/lang/Integer;`.
    #[must_use]
    pub fn value_of_descriptor(self) -> String {
        format!("({})L{};", self.descriptor_char(), self.wrapper_class())
    }

    /// Descriptor of the wrapper's unboxing accessor, e.g. `()I`.
    #[must_use]
    pub fn unbox_descriptor(self) -> String {
        format!("(){}", self.descriptor_char())
    }

    /// Number of local-variable and operand-stack slots a value of this type occupies.
    #[must_use]
    pub fn slots(self) -> usize {
        match self {
            BaseType::Long | BaseType::Double => 2,
            _ => 1,
        }
    }
}

/// The type of a field, parameter, local or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A primitive type
    Base(BaseType),
    /// A class or interface, by internal name (`java/lang/String`)
    Object(String),
    /// An array of the component type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut cursor = DescriptorCursor::new(descriptor);
        let field = cursor.field_type()?;
        if !cursor.is_done() {
            return Err(malformed_error!(
                "Trailing characters in field descriptor '{}'",
                descriptor
            ));
        }
        Ok(field)
    }

    /// Convenience constructor for a class type.
    #[must_use]
    pub fn object(internal_name: &str) -> FieldType {
        FieldType::Object(internal_name.to_string())
    }

    /// Number of slots a value of this type occupies.
    #[must_use]
    pub fn slots(&self) -> usize {
        match self {
            FieldType::Base(base) => base.slots(),
            _ => 1,
        }
    }

    /// Returns `true` for class, interface and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Base(_))
    }

    /// Number of array dimensions; zero for non-array types.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        let mut current = self;
        let mut dims = 0;
        while let FieldType::Array(component) = current {
            dims += 1;
            current = component;
        }
        dims
    }

    /// Name used for this type in a `CONSTANT_Class` entry.
    ///
    /// Classes use their internal name, arrays their full descriptor. Primitive types cannot be
    /// referenced through a class constant and yield `None`.
    #[must_use]
    pub fn class_constant_name(&self) -> Option<String> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
        }
    }

    /// Inverse of [`FieldType::class_constant_name`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an array name is not a valid descriptor.
    pub fn from_class_constant_name(name: &str) -> Result<FieldType> {
        if name.starts_with('[') {
            FieldType::parse(name)
        } else {
            Ok(FieldType::object(name))
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(base) => write!(f, "{}", base.descriptor_char()),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl FromStr for FieldType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldType::parse(s)
    }
}

/// The parameter and return types of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodType {
    /// Parameter types in declaration order
    pub parameters: Vec<FieldType>,
    /// Return type; `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodType {
    /// Build a method type from its parts.
    #[must_use]
    pub fn new(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> Self {
        MethodType {
            parameters,
            return_type,
        }
    }

    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well formed.
    pub fn parse(descriptor: &str) -> Result<MethodType> {
        let mut cursor = DescriptorCursor::new(descriptor);
        if cursor.next() != Some('(') {
            return Err(malformed_error!(
                "Method descriptor '{}' does not start with '('",
                descriptor
            ));
        }

        let mut parameters = Vec::new();
        loop {
            match cursor.peek() {
                Some(')') => {
                    cursor.next();
                    break;
                }
                Some(_) => parameters.push(cursor.field_type()?),
                None => {
                    return Err(malformed_error!(
                        "Unterminated parameter list in '{}'",
                        descriptor
                    ))
                }
            }
        }

        let return_type = if cursor.peek() == Some('V') {
            cursor.next();
            None
        } else {
            Some(cursor.field_type()?)
        };

        if !cursor.is_done() {
            return Err(malformed_error!(
                "Trailing characters in method descriptor '{}'",
                descriptor
            ));
        }

        Ok(MethodType {
            parameters,
            return_type,
        })
    }

    /// Slots occupied by the parameters alone, excluding `this`.
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    /// Descriptor of the parameter list only, `(IJ)`, used to form identity keys.
    #[must_use]
    pub fn parameter_descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            out.push_str(&parameter.to_string());
        }
        out.push(')');
        out
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parameter_descriptor())?;
        match &self.return_type {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}

impl FromStr for MethodType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodType::parse(s)
    }
}

struct DescriptorCursor<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> DescriptorCursor<'a> {
    fn new(source: &'a str) -> Self {
        DescriptorCursor {
            source,
            chars: source.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn is_done(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn field_type(&mut self) -> Result<FieldType> {
        let mut dims = 0_usize;
        while self.peek() == Some('[') {
            self.next();
            dims += 1;
            if dims > MAX_ARRAY_DIMENSIONS {
                return Err(malformed_error!(
                    "More than {} array dimensions in '{}'",
                    MAX_ARRAY_DIMENSIONS,
                    self.source
                ));
            }
        }

        let mut field = match self.next() {
            Some('L') => {
                let mut name = String::new();
                loop {
                    match self.next() {
                        Some(';') => break,
                        Some(c) if c == '.' || c == '[' || c == '(' || c == ')' => {
                            return Err(malformed_error!(
                                "Invalid character '{}' in class name of '{}'",
                                c,
                                self.source
                            ))
                        }
                        Some(c) => name.push(c),
                        None => {
                            return Err(malformed_error!(
                                "Unterminated class name in '{}'",
                                self.source
                            ))
                        }
                    }
                }
                if name.is_empty() {
                    return Err(malformed_error!("Empty class name in '{}'", self.source));
                }
                FieldType::Object(name)
            }
            Some(c) => match BaseType::from_descriptor_char(c) {
                Some(base) => FieldType::Base(base),
                None => {
                    return Err(malformed_error!(
                        "Invalid type character '{}' in '{}'",
                        c,
                        self.source
                    ))
                }
            },
            None => {
                return Err(malformed_error!(
                    "Unexpected end of descriptor '{}'",
                    self.source
                ))
            }
        };

        for _ in 0..dims {
            field = FieldType::Array(Box::new(field));
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_method_descriptor() {
        let method = MethodType::parse("(IJ[Ljava/lang/String;[[D)Ljava/lang/Object;").unwrap();

        assert_eq!(method.parameters.len(), 4);
        assert_eq!(method.parameters[0], FieldType::Base(BaseType::Int));
        assert_eq!(method.parameters[1], FieldType::Base(BaseType::Long));
        assert_eq!(method.parameters[2].dimensions(), 1);
        assert_eq!(method.parameters[3].dimensions(), 2);
        assert_eq!(method.parameter_slots(), 5);
        assert_eq!(method.return_type, Some(FieldType::object("java/lang/Object")));
        assert_eq!(
            method.to_string(),
            "(IJ[Ljava/lang/String;[[D)Ljava/lang/Object;"
        );
        assert_eq!(method.parameter_descriptor(), "(IJ[Ljava/lang/String;[[D)");
    }

    #[test]
    fn void_and_empty() {
        let method: MethodType = "()V".parse().unwrap();
        assert!(method.parameters.is_empty());
        assert!(method.return_type.is_none());
        assert_eq!(method.to_string(), "()V");
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "I",
            "(I",
            "(I)",
            "(Q)V",
            "(Ljava/lang/String)V",
            "(L;)V",
            "()VV",
            "(V)V",
            "(Ljava.lang.String;)V",
        ] {
            assert!(MethodType::parse(bad).is_err(), "accepted {bad:?}");
        }
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("V").is_err());
    }

    #[test]
    fn array_dimension_limit() {
        let ok = format!("{}I", "[".repeat(MAX_ARRAY_DIMENSIONS));
        assert_eq!(
            FieldType::parse(&ok).unwrap().dimensions(),
            MAX_ARRAY_DIMENSIONS
        );

        let too_deep = format!("{}I", "[".repeat(MAX_ARRAY_DIMENSIONS + 1));
        assert!(FieldType::parse(&too_deep).is_err());
    }

    #[test]
    fn base_type_tables_are_consistent() {
        for base in BaseType::iter() {
            assert_eq!(
                BaseType::from_descriptor_char(base.descriptor_char()),
                Some(base)
            );
            assert_eq!(BaseType::from_wrapper_class(base.wrapper_class()), Some(base));
            assert!(base.unbox_descriptor().ends_with(base.descriptor_char()));
        }
        assert_eq!(
            BaseType::Int.value_of_descriptor(),
            "(I)Ljava/lang/Integer;"
        );
    }

    #[test]
    fn class_constant_names() {
        let array = FieldType::parse("[Ljava/lang/Class;").unwrap();
        assert_eq!(
            array.class_constant_name().as_deref(),
            Some("[Ljava/lang/Class;")
        );
        assert_eq!(
            FieldType::from_class_constant_name("[Ljava/lang/Class;").unwrap(),
            array
        );
        assert_eq!(
            FieldType::from_class_constant_name("java/util/List").unwrap(),
            FieldType::object("java/util/List")
        );
        assert!(FieldType::Base(BaseType::Int).class_constant_name().is_none());
    }
}
