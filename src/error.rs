use thiserror::Error;

use crate::runtime::Throwable;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! codegen_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::CodeGeneration(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the life cycle of a synthesis request: reading and decoding class files,
/// resolving and emitting the generated type, installing it through a
/// [`crate::runtime::LoadingContext`], and finally executing generated code in the reference
/// runtime.
///
/// # Error Categories
///
/// ## Class-file decoding
/// - [`Error::Malformed`] - Corrupted or invalid class-file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Class-file version or construct outside the supported range
///
/// ## Loading-context collaborator
/// - [`Error::NotFound`] - The bytes of a type could not be located
/// - [`Error::DuplicateDefinition`] - A type of that name is already installed
///
/// ## Synthesis
/// - [`Error::UnsupportedMethodShape`] - A method cannot be represented in a generated type
/// - [`Error::NoAccessibleConstructor`] - The original class has no public constructor
/// - [`Error::MetadataCopy`] - The annotations of the original type could not be read
/// - [`Error::CodeGeneration`] - Internal inconsistency between resolver and emitter
///
/// ## Binding and execution
/// - [`Error::NotAGeneratedInstance`] - `bind` was called on a foreign instance
/// - [`Error::Thrown`] - A throwable escaped guest code or an invocation handler
/// - [`Error::Execution`] - The reference interpreter met code it cannot execute
///
/// # Examples
///
/// ```rust
/// use dynsubclass::{runtime::ClassPool, Error, Synthesizer};
///
/// let pool = ClassPool::new()?;
/// match Synthesizer::default().synthesize("com/example/Missing", &pool, false) {
///     Err(Error::NotFound(name)) => assert_eq!(name, "com/example/Missing"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// # Ok::<(), dynsubclass::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Class-file decoding errors
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This class-file version or construct is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised while reading class files from a class path.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    // Loading-context errors
    /// The bytes of the named type could not be located by the loading context.
    ///
    /// Propagated unchanged from [`crate::runtime::LoadingContext::read_type_bytes`].
    #[error("Type not found - {0}")]
    NotFound(String),

    /// A type with this name has already been installed in the loading context.
    #[error("Duplicate definition of {0}")]
    DuplicateDefinition(String),

    // Synthesis errors
    /// A method of the original type cannot be represented in the generated type.
    ///
    /// Raised by the method-set resolver; fatal to the synthesis request.
    #[error("Unsupported method shape {class}.{method}: {reason}")]
    UnsupportedMethodShape {
        /// Internal name of the declaring type
        class: String,
        /// Method name and descriptor
        method: String,
        /// Why the method cannot be represented
        reason: String,
    },

    /// The original class declares no public constructor to forward to.
    #[error("No accessible constructor on {0}")]
    NoAccessibleConstructor(String),

    /// The declarative metadata of the original type could not be read.
    #[error("Failed to copy metadata of {class}: {source}")]
    MetadataCopy {
        /// Internal name of the type whose class file failed to parse
        class: String,
        /// The underlying read failure
        #[source]
        source: Box<Error>,
    },

    /// Internal inconsistency while generating code.
    ///
    /// Indicates a contract violation between the resolver and the emitter and should be
    /// treated as a defect rather than a recoverable condition.
    #[error("Code generation failed - {0}")]
    CodeGeneration(String),

    // Binding errors
    /// The instance was not produced by the synthesizer.
    #[error("{0} is not a generated type")]
    NotAGeneratedInstance(String),

    // Runtime errors
    /// A throwable escaped guest code or an invocation handler.
    ///
    /// The contained [`Throwable`] is the very object that was raised, so callers can compare
    /// identities with [`Throwable::ptr_eq`].
    #[error("{0}")]
    Thrown(Throwable),

    /// The reference interpreter met code it cannot execute.
    #[error("Execution failed - {0}")]
    Execution(String),

    /// Recursion limit reached.
    ///
    /// Guards hierarchy walks against cyclic inheritance and the interpreter against runaway
    /// call chains.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` for collaborator lookups that simply found nothing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
