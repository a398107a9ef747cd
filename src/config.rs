//! Configuration for a compilation run.
//!
//! A [`CompilerConfig`] is read from JSON (camel case keys, every key optional) and may be
//! assembled from several fragments: the user's configuration file plus a `jvmaot.json`
//! carried by any input archive. Fragments are combined with [`CompilerConfig::merge`].
//!
//! ```json
//! {
//!     "mainClass": "app.Main",
//!     "nonOptimized": ["app.plugins.**"],
//!     "reflective": ["app.model.*"],
//!     "intrinsics": ["java.lang.Math.sqrt(D)D"],
//!     "weakFields": ["app.Cache.owner"],
//!     "useValueChecks": true
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for a compilation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Glob patterns of classes retained even when nothing references them.
    pub non_optimized: Vec<String>,

    /// Glob patterns of classes that keep reflection metadata. Matching classes are retained.
    pub reflective: Vec<String>,

    /// Glob patterns of source files excluded from inline native code substitution.
    pub source_ignores: Vec<String>,

    /// Methods provided by the runtime, as `package.Class.method(descriptor)`.
    pub intrinsics: Vec<String>,

    /// Reference fields stored as weak references, as `package.Class.field`.
    pub weak_fields: Vec<String>,

    /// Extra `#define` lines for the generated configuration header.
    pub definitions: Vec<String>,

    /// Class whose static `main(String[])` starts the program.
    pub main_class: Option<String>,

    /// Write a build script next to the generated sources (default: false).
    pub generate_project_files: bool,

    /// Maintain a shadow call stack for exception stack traces (default: true).
    pub use_stack_traces: bool,

    /// Record line numbers in stack traces; requires stack traces (default: true).
    pub use_line_numbers: bool,

    /// Check frame cookies for stack corruption; requires stack traces (default: false).
    pub use_stack_cookies: bool,

    /// Emit null and type checks on every access (default: false).
    pub use_value_checks: bool,

    /// Report leaked objects on exit (default: false).
    pub use_leak_check: bool,

    /// Let the host platform override environment queries (default: false).
    pub platform_override: bool,

    /// Replace stack traffic with slots and temporaries (default: true).
    pub use_optimizations: bool,

    /// Worker threads for the per-method passes. `1` runs them on the calling thread, `0`
    /// uses one worker per core (default: 1).
    pub jobs: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            non_optimized: Vec::new(),
            reflective: Vec::new(),
            source_ignores: Vec::new(),
            intrinsics: Vec::new(),
            weak_fields: Vec::new(),
            definitions: Vec::new(),
            main_class: None,
            generate_project_files: false,
            use_stack_traces: true,
            use_line_numbers: true,
            use_stack_cookies: false,
            use_value_checks: false,
            use_leak_check: false,
            platform_override: false,
            use_optimizations: true,
            jobs: 1,
        }
    }
}

impl CompilerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the text is not a valid configuration object.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::Json`] if it is not a valid configuration object.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Sets the entry point class.
    #[must_use]
    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    /// Enables or disables stack slot allocation.
    #[must_use]
    pub fn with_optimizations(mut self, enable: bool) -> Self {
        self.use_optimizations = enable;
        self
    }

    /// Sets the number of worker threads for the per-method passes.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Enables or disables stack traces, and with them line numbers.
    #[must_use]
    pub fn with_stack_traces(mut self, enable: bool) -> Self {
        self.use_stack_traces = enable;
        self.use_line_numbers = enable;
        self
    }

    /// Combines a configuration fragment into this one.
    ///
    /// Pattern and entry lists are appended. The main class of `other` is adopted only if
    /// none is set, `platform_override` is enabled if either side enables it. The remaining
    /// switches stay as they are.
    pub fn merge(&mut self, other: CompilerConfig) {
        self.non_optimized.extend(other.non_optimized);
        self.reflective.extend(other.reflective);
        self.source_ignores.extend(other.source_ignores);
        self.intrinsics.extend(other.intrinsics);
        self.weak_fields.extend(other.weak_fields);
        self.definitions.extend(other.definitions);
        if self.main_class.is_none() {
            self.main_class = other.main_class;
        }
        self.platform_override |= other.platform_override;
    }

    /// Turns off switches whose prerequisites are off.
    pub fn validate(&mut self) {
        if !self.use_stack_traces {
            if self.use_line_numbers {
                log::warn!("line numbers require stack traces, disabling them");
                self.use_line_numbers = false;
            }
            if self.use_stack_cookies {
                log::warn!("stack cookies require stack traces, disabling them");
                self.use_stack_cookies = false;
            }
        }
    }

    /// Every pattern of classes retained regardless of references.
    pub fn retained_patterns(&self) -> impl Iterator<Item = &String> {
        self.non_optimized.iter().chain(self.reflective.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = CompilerConfig::from_json(
            r#"{ "mainClass": "app.Main", "reflective": ["app.*"], "useValueChecks": true }"#,
        )
        .unwrap();
        assert_eq!(config.main_class.as_deref(), Some("app.Main"));
        assert_eq!(config.reflective, vec!["app.*"]);
        assert!(config.use_value_checks);
        assert!(config.use_stack_traces);
        assert!(config.use_optimizations);
        assert!(!config.generate_project_files);
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_merge() {
        let mut config = CompilerConfig::new().with_main_class("app/Main");
        let mut fragment = CompilerConfig::new().with_main_class("lib/Other");
        fragment.intrinsics.push("lib.Native.call()V".into());
        fragment.platform_override = true;
        fragment.use_value_checks = true;
        config.merge(fragment);

        assert_eq!(config.main_class.as_deref(), Some("app/Main"));
        assert_eq!(config.intrinsics, vec!["lib.Native.call()V"]);
        assert!(config.platform_override);
        assert!(!config.use_value_checks);
    }

    #[test]
    fn test_validate_requires_stack_traces() {
        let mut config = CompilerConfig {
            use_stack_traces: false,
            use_stack_cookies: true,
            ..CompilerConfig::default()
        };
        config.validate();
        assert!(!config.use_line_numbers);
        assert!(!config.use_stack_cookies);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(CompilerConfig::from_json(r#"{ "nonOptimized": "app.*" }"#).is_err());
    }
}
