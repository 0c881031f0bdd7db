//! Synthesizer and reference-runtime configuration.
//!
//! # Overview
//!
//! - [`SynthesisConfig`] - Naming, class-file version and locking of generated types
//! - [`ExecutionLimits`] - Limits for the reference interpreter
//!
//! Both types start from sensible defaults and are adjusted with `with_*` builders.
//!
//! # Example
//!
//! ```rust
//! use dynsubclass::{ExecutionLimits, SynthesisConfig};
//!
//! let config = SynthesisConfig::default()
//!     .with_suffix("$$Proxy")
//!     .with_install_shards(8)
//!     .with_execution_limits(ExecutionLimits::new().with_max_call_depth(64));
//!
//! assert_eq!(config.generated_name("com/example/Bean"), "com/example/Bean$$Proxy");
//! assert_eq!(config.handler_field, "this$handler");
//! assert_eq!(config.execution_limits.max_call_depth, 64);
//! ```

use crate::classfile::DEFAULT_MAJOR_VERSION;

/// Configuration of a [`crate::Synthesizer`].
///
/// # Default Values
///
/// | Setting | Default |
/// |---------|---------|
/// | `suffix` | `$$Impl` |
/// | `handler_field` | `this$handler` |
/// | `major_version` | 52 |
/// | `emit_source_file` | `true` |
/// | `synthetic` | `true` |
/// | `install_shards` | 1 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Appended to the original internal name to form the generated name.
    pub suffix: String,

    /// Name of the field holding the invocation handler.
    pub handler_field: String,

    /// Class-file major version of generated types.
    ///
    /// The emitted code never branches, so any version from 50 up verifies without
    /// stack map frames.
    pub major_version: u16,

    /// Copy the original's `SourceFile` attribute onto the generated type.
    pub emit_source_file: bool,

    /// Mark generated types `ACC_SYNTHETIC`.
    pub synthetic: bool,

    /// Number of install locks; keys are spread across them by hash.
    ///
    /// One shard serializes every installation in the process, which is what the host
    /// class-loading subsystem expects by default.
    pub install_shards: usize,

    /// Limits applied when [`crate::Synthesizer::new_instance`] runs constructors.
    pub execution_limits: ExecutionLimits,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            suffix: "$$Impl".to_string(),
            handler_field: "this$handler".to_string(),
            major_version: DEFAULT_MAJOR_VERSION,
            emit_source_file: true,
            synthetic: true,
            install_shards: 1,
            execution_limits: ExecutionLimits::default(),
        }
    }
}

impl SynthesisConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the generated-name suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    /// Sets the handler field name.
    #[must_use]
    pub fn with_handler_field(mut self, name: &str) -> Self {
        self.handler_field = name.to_string();
        self
    }

    /// Sets the class-file major version of generated types.
    #[must_use]
    pub fn with_major_version(mut self, major_version: u16) -> Self {
        self.major_version = major_version;
        self
    }

    /// Enables or disables the `SourceFile` attribute.
    #[must_use]
    pub fn with_source_file(mut self, emit: bool) -> Self {
        self.emit_source_file = emit;
        self
    }

    /// Enables or disables `ACC_SYNTHETIC` on generated types.
    #[must_use]
    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// Sets the number of install-lock shards; zero is treated as one.
    #[must_use]
    pub fn with_install_shards(mut self, shards: usize) -> Self {
        self.install_shards = shards.max(1);
        self
    }

    /// Sets the limits for constructor execution.
    #[must_use]
    pub fn with_execution_limits(mut self, limits: ExecutionLimits) -> Self {
        self.execution_limits = limits;
        self
    }

    /// Internal name of the type generated for `original`.
    #[must_use]
    pub fn generated_name(&self, original: &str) -> String {
        format!("{original}{}", self.suffix)
    }
}

/// Execution limits for the reference interpreter.
///
/// | Setting | Default |
/// |---------|---------|
/// | `max_call_depth` | 512 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Maximum call stack depth.
    ///
    /// Limits nested method calls to prevent stack overflow from infinite recursion.
    pub max_call_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_call_depth: 512,
        }
    }
}

impl ExecutionLimits {
    /// Creates the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SynthesisConfig::default();
        assert_eq!(config.suffix, "$$Impl");
        assert_eq!(config.major_version, 52);
        assert!(config.emit_source_file);
        assert!(config.synthetic);
        assert_eq!(config.install_shards, 1);
        assert_eq!(config.execution_limits.max_call_depth, 512);
    }

    #[test]
    fn builders() {
        let config = SynthesisConfig::new()
            .with_handler_field("handler")
            .with_major_version(61)
            .with_source_file(false)
            .with_synthetic(false)
            .with_install_shards(0);

        assert_eq!(config.handler_field, "handler");
        assert_eq!(config.major_version, 61);
        assert!(!config.emit_source_file);
        assert!(!config.synthetic);
        assert_eq!(config.install_shards, 1);
        assert_eq!(config.generated_name("a/B"), "a/B$$Impl");
    }
}
