//! Values, references and heap objects of the reference runtime.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use crate::{
    classfile::{BaseType, FieldType, MethodType},
    runtime::{class::ClassRef, handler::InvocationHandler},
    Result,
};

/// A value on the operand stack, in a local, in a field or passed to a handler.
///
/// `boolean`, `byte`, `char` and `short` travel as [`Value::Int`], as they do on the JVM stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// 32-bit integer and its sub-word relatives
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// The null reference
    Null,
    /// A non-null reference
    Ref(Reference),
}

impl Value {
    /// Wrap a heap object.
    #[must_use]
    pub fn object(object: &ObjectRef) -> Value {
        Value::Ref(Reference::Object(object.clone()))
    }

    /// A `java/lang/String` value.
    #[must_use]
    pub fn string(value: &str) -> Value {
        Value::Ref(Reference::String(Arc::from(value)))
    }

    /// A boxed primitive, as handlers receive and return them.
    #[must_use]
    pub fn boxed(primitive: Primitive) -> Value {
        Value::Ref(Reference::Boxed(primitive))
    }

    /// Returns `true` for [`Value::Long`] and [`Value::Double`].
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// The reference held by this value, if any.
    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    /// The heap object held by this value, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Ref(Reference::Object(object)) => Some(object),
            _ => None,
        }
    }

    /// The boxed primitive held by this value, if any.
    #[must_use]
    pub fn as_boxed(&self) -> Option<Primitive> {
        match self {
            Value::Ref(Reference::Boxed(primitive)) => Some(*primitive),
            _ => None,
        }
    }

    /// The string held by this value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ref(Reference::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Convert a raw primitive into its boxed reference form; references pass through.
    ///
    /// Lets handlers return `Value::Int(3)` where an `Object` is expected.
    #[must_use]
    pub fn into_reference_value(self) -> Value {
        match self {
            Value::Int(value) => Value::boxed(Primitive::Int(value)),
            Value::Long(value) => Value::boxed(Primitive::Long(value)),
            Value::Float(value) => Value::boxed(Primitive::Float(value)),
            Value::Double(value) => Value::boxed(Primitive::Double(value)),
            other => other,
        }
    }

    /// Zero value of a field type: `0`, `0L`, `0.0f`, `0.0` or `null`.
    #[must_use]
    pub fn default_for(field: &FieldType) -> Value {
        match field {
            FieldType::Base(BaseType::Long) => Value::Long(0),
            FieldType::Base(BaseType::Float) => Value::Float(0.0),
            FieldType::Base(BaseType::Double) => Value::Double(0.0),
            FieldType::Base(_) => Value::Int(0),
            _ => Value::Null,
        }
    }
}

/// A boxed primitive, the payload of `java/lang/Integer` and friends.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Primitive {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Primitive {
    /// The primitive type of this value.
    #[must_use]
    pub fn base_type(&self) -> BaseType {
        match self {
            Primitive::Boolean(_) => BaseType::Boolean,
            Primitive::Byte(_) => BaseType::Byte,
            Primitive::Char(_) => BaseType::Char,
            Primitive::Short(_) => BaseType::Short,
            Primitive::Int(_) => BaseType::Int,
            Primitive::Long(_) => BaseType::Long,
            Primitive::Float(_) => BaseType::Float,
            Primitive::Double(_) => BaseType::Double,
        }
    }

    /// Box a stack value as `base`, as `valueOf` does.
    ///
    /// Returns `None` if the stack value has the wrong computational type.
    #[must_use]
    pub fn from_stack(base: BaseType, value: &Value) -> Option<Primitive> {
        // sub-word types are narrowed like the JVM's i2b / i2c / i2s
        #[allow(clippy::cast_possible_truncation)]
        let primitive = match (base, value) {
            (BaseType::Boolean, Value::Int(v)) => Primitive::Boolean(*v & 1 != 0),
            (BaseType::Byte, Value::Int(v)) => Primitive::Byte(*v as i8),
            (BaseType::Char, Value::Int(v)) => Primitive::Char(*v as u16),
            (BaseType::Short, Value::Int(v)) => Primitive::Short(*v as i16),
            (BaseType::Int, Value::Int(v)) => Primitive::Int(*v),
            (BaseType::Long, Value::Long(v)) => Primitive::Long(*v),
            (BaseType::Float, Value::Float(v)) => Primitive::Float(*v),
            (BaseType::Double, Value::Double(v)) => Primitive::Double(*v),
            _ => return None,
        };
        Some(primitive)
    }

    /// Unbox to a stack value.
    #[must_use]
    pub fn to_stack(self) -> Value {
        match self {
            Primitive::Boolean(v) => Value::Int(i32::from(v)),
            Primitive::Byte(v) => Value::Int(i32::from(v)),
            Primitive::Char(v) => Value::Int(i32::from(v)),
            Primitive::Short(v) => Value::Int(i32::from(v)),
            Primitive::Int(v) => Value::Int(v),
            Primitive::Long(v) => Value::Long(v),
            Primitive::Float(v) => Value::Float(v),
            Primitive::Double(v) => Value::Double(v),
        }
    }
}

/// A non-null reference.
#[derive(Clone)]
pub enum Reference {
    /// An instance of a class defined in a loading context
    Object(ObjectRef),
    /// A `java/lang/String`
    String(Arc<str>),
    /// A `java/lang/Class` literal; primitive types appear for `int.class` and friends
    Class(FieldType),
    /// A `java/lang/reflect/Method`
    Method(MethodRef),
    /// A reference array
    Array(ArrayRef),
    /// A boxed primitive
    Boxed(Primitive),
    /// A `java/lang/reflect/InvocationHandler` implemented in Rust
    Handler(Arc<dyn InvocationHandler>),
    /// A throwable raised by guest code, the runtime or a handler
    Throwable(Throwable),
}

impl Reference {
    /// Internal name of the runtime class of this reference.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            Reference::Object(object) => object.class().name().to_string(),
            Reference::String(_) => "java/lang/String".to_string(),
            Reference::Class(_) => "java/lang/Class".to_string(),
            Reference::Method(_) => "java/lang/reflect/Method".to_string(),
            Reference::Array(array) => format!("[{}", array.component()),
            Reference::Boxed(primitive) => primitive.base_type().wrapper_class().to_string(),
            Reference::Handler(_) => "java/lang/reflect/InvocationHandler".to_string(),
            Reference::Throwable(throwable) => throwable.class_name().to_string(),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reference::Object(a), Reference::Object(b)) => Arc::ptr_eq(a, b),
            (Reference::String(a), Reference::String(b)) => a == b,
            (Reference::Class(a), Reference::Class(b)) => a == b,
            (Reference::Method(a), Reference::Method(b)) => a == b,
            (Reference::Array(a), Reference::Array(b)) => a.ptr_eq(b),
            (Reference::Boxed(a), Reference::Boxed(b)) => a == b,
            (Reference::Handler(a), Reference::Handler(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Reference::Throwable(a), Reference::Throwable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Object(object) => write!(f, "Object({})", object.class().name()),
            Reference::String(value) => write!(f, "String({value:?})"),
            Reference::Class(field) => write!(f, "Class({field})"),
            Reference::Method(method) => write!(f, "Method({method})"),
            Reference::Array(array) => write!(f, "Array([{}; {}])", array.component(), array.len()),
            Reference::Boxed(primitive) => write!(f, "Boxed({primitive:?})"),
            Reference::Handler(_) => f.write_str("Handler"),
            Reference::Throwable(throwable) => write!(f, "Throwable({throwable})"),
        }
    }
}

/// A reflective method handle, the `Method` argument of
/// [`InvocationHandler::invoke`](crate::runtime::InvocationHandler::invoke).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the declaring type
    pub declaring_class: String,
    /// Method name
    pub name: String,
    /// Parameter and return types
    pub descriptor: MethodType,
}

impl MethodRef {
    /// Create a method reference from a descriptor string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is invalid.
    pub fn new(declaring_class: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(MethodRef {
            declaring_class: declaring_class.to_string(),
            name: name.to_string(),
            descriptor: MethodType::parse(descriptor)?,
        })
    }

    /// Name plus parameter types, the identity of the method within its hierarchy.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor.parameter_descriptor())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.declaring_class, self.name, self.descriptor)
    }
}

struct ThrowableData {
    class_name: String,
    message: Option<String>,
}

/// A throwable object.
///
/// Clones share identity: [`Throwable::ptr_eq`] tells whether two handles denote the very same
/// throwable, which is how callers verify that a handler's exception surfaced unchanged.
#[derive(Clone)]
pub struct Throwable {
    inner: Arc<ThrowableData>,
}

impl Throwable {
    /// Create a throwable of class `class_name` with an optional message.
    #[must_use]
    pub fn new(class_name: &str, message: Option<&str>) -> Self {
        Throwable {
            inner: Arc::new(ThrowableData {
                class_name: class_name.to_string(),
                message: message.map(str::to_string),
            }),
        }
    }

    /// Internal name of the throwable's class.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// The detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    /// Returns `true` if both handles denote the same throwable.
    #[must_use]
    pub fn ptr_eq(&self, other: &Throwable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.message {
            Some(message) => write!(f, "{}: {}", self.inner.class_name, message),
            None => f.write_str(&self.inner.class_name),
        }
    }
}

impl fmt::Debug for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Throwable({self})")
    }
}

/// A reference array.
pub struct Array {
    component: FieldType,
    elements: RwLock<Vec<Value>>,
}

/// Shared handle to a reference array.
#[derive(Clone)]
pub struct ArrayRef(Arc<Array>);

impl ArrayRef {
    /// Allocate an array of `len` nulls.
    #[must_use]
    pub fn new(component: FieldType, len: usize) -> Self {
        ArrayRef(Arc::new(Array {
            component,
            elements: RwLock::new(vec![Value::Null; len]),
        }))
    }

    /// Allocate an array holding `elements`.
    #[must_use]
    pub fn from_values(component: FieldType, elements: Vec<Value>) -> Self {
        ArrayRef(Arc::new(Array {
            component,
            elements: RwLock::new(elements),
        }))
    }

    /// Component type.
    #[must_use]
    pub fn component(&self) -> &FieldType {
        &self.0.component
    }

    /// Number of elements; a poisoned array reads as empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.elements.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns `true` if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read element `index`; `Ok(None)` if out of bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the array lock is poisoned.
    pub fn get(&self, index: usize) -> Result<Option<Value>> {
        let elements = read_lock!(self.0.elements);
        Ok(elements.get(index).cloned())
    }

    /// Write element `index`; returns `false` if out of bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the array lock is poisoned.
    pub fn set(&self, index: usize, value: Value) -> Result<bool> {
        let mut elements = write_lock!(self.0.elements);
        match elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy of all elements.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the array lock is poisoned.
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        Ok(read_lock!(self.0.elements).clone())
    }

    /// Returns `true` if both handles denote the same array.
    #[must_use]
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Content of an instance field.
///
/// A reference from an object to itself is kept as [`Slot::This`] rather than as a strong
/// pointer, so self-referential objects are freed when their last outside handle drops.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// The owning object itself
    This,
    /// Any other value
    Value(Value),
}

/// A heap object: its class and its instance fields.
pub struct Instance {
    class: ClassRef,
    fields: RwLock<HashMap<(String, String), Slot>>,
}

/// Shared handle to a heap object.
pub type ObjectRef = Arc<Instance>;

impl Instance {
    /// Allocate an instance of `class` with every instance field of its class chain zeroed.
    #[must_use]
    pub fn allocate(class: &ClassRef) -> ObjectRef {
        let mut fields = HashMap::new();
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            for field in cls.instance_fields() {
                let default = FieldType::parse(&field.descriptor)
                    .map(|ty| Value::default_for(&ty))
                    .unwrap_or(Value::Null);
                fields.insert(
                    (cls.name().to_string(), field.name.clone()),
                    Slot::Value(default),
                );
            }
            current = cls.super_class().cloned();
        }

        Arc::new(Instance {
            class: class.clone(),
            fields: RwLock::new(fields),
        })
    }

    /// The runtime class of this object.
    #[must_use]
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// Raw content of the field `name` declared by `owner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the field lock is poisoned.
    pub fn slot(&self, owner: &str, name: &str) -> Result<Option<Slot>> {
        let fields = read_lock!(self.fields);
        Ok(fields.get(&(owner.to_string(), name.to_string())).cloned())
    }

    /// Read the field `name` declared by `owner`, resolving [`Slot::This`] to `this`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Execution`] if the object has no such field.
    pub fn get_field(this: &ObjectRef, owner: &str, name: &str) -> Result<Value> {
        match this.slot(owner, name)? {
            Some(Slot::This) => Ok(Value::object(this)),
            Some(Slot::Value(value)) => Ok(value),
            None => Err(crate::Error::Execution(format!(
                "{} has no field {}.{}",
                this.class.name(),
                owner,
                name
            ))),
        }
    }

    /// Write the field `name` declared by `owner`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Execution`] if the object has no such field.
    pub fn put_field(this: &ObjectRef, owner: &str, name: &str, value: Value) -> Result<()> {
        let slot = match &value {
            Value::Ref(Reference::Object(target)) if Arc::ptr_eq(target, this) => Slot::This,
            _ => Slot::Value(value),
        };

        let mut fields = write_lock!(this.fields);
        match fields.get_mut(&(owner.to_string(), name.to_string())) {
            Some(existing) => {
                *existing = slot;
                Ok(())
            }
            None => Err(crate::Error::Execution(format!(
                "{} has no field {}.{}",
                this.class.name(),
                owner,
                name
            ))),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxing_narrows_like_the_jvm() {
        assert_eq!(
            Primitive::from_stack(BaseType::Byte, &Value::Int(0x1FF)),
            Some(Primitive::Byte(-1))
        );
        assert_eq!(
            Primitive::from_stack(BaseType::Boolean, &Value::Int(2)),
            Some(Primitive::Boolean(false))
        );
        assert_eq!(Primitive::from_stack(BaseType::Long, &Value::Int(1)), None);
        assert_eq!(Primitive::Char(65).to_stack(), Value::Int(65));
    }

    #[test]
    fn throwable_identity() {
        let a = Throwable::new("com/example/Failure", Some("boom"));
        let b = a.clone();
        let c = Throwable::new("com/example/Failure", Some("boom"));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.to_string(), "com/example/Failure: boom");
        assert_eq!(
            Reference::Throwable(a.clone()),
            Reference::Throwable(b)
        );
        assert_ne!(Reference::Throwable(a), Reference::Throwable(c));
    }

    #[test]
    fn arrays() {
        let array = ArrayRef::new(FieldType::object("java/lang/Object"), 2);
        assert!(array.set(1, Value::string("x")).unwrap());
        assert!(!array.set(2, Value::Null).unwrap());
        assert_eq!(array.get(1).unwrap(), Some(Value::string("x")));
        assert_eq!(array.get(5).unwrap(), None);
        assert_eq!(
            Reference::Array(array.clone()).class_name(),
            "[Ljava/lang/Object;"
        );
        assert_eq!(array.to_vec().unwrap().len(), 2);
    }

    #[test]
    fn raw_primitives_box_on_the_way_out() {
        assert_eq!(
            Value::Int(3).into_reference_value(),
            Value::boxed(Primitive::Int(3))
        );
        assert_eq!(Value::Null.into_reference_value(), Value::Null);
        assert_eq!(
            Value::default_for(&FieldType::Base(BaseType::Double)),
            Value::Double(0.0)
        );
    }
}
