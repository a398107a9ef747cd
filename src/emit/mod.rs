//! Native source rendering.
//!
//! Every retained class is rendered into a declaration file (`<name>.h`) and an
//! implementation file (`<name>.cpp`) written against the runtime header `Clearwing.h`.
//! Rendering is a pure function of the analyzed pool: nothing computed by an earlier pass is
//! re-derived here, and the same pool always renders the same text.
//!
//! # Architecture
//!
//! ```text
//!  ClassDescriptor ──┬─▶ header  ─▶ struct layout, slot macros, typedefs, prototypes
//!                    └─▶ source  ─▶ statics, vtable, metadata, mark function,
//!                          │        class object, registration
//!                          └─▶ body ─▶ one function per method (MethodPlan driven)
//!
//!  CompilerConfig ──────▶ project ─▶ Config.h, main.cpp, CMakeLists.txt
//! ```
//!
//! The root object class is provided by the runtime itself (`java/lang/Object.h`), so it is
//! kept in the closure for dependency purposes but never rendered.
//!
//! # Key Components
//!
//! - [`Emitter`] - Renders classes and the project files of one run
//! - [`EmittedFile`] - A rendered file and its path relative to the output directory
//! - [`literal`] - Native spellings of constants

mod annotations;
mod body;
mod header;
mod ops;
pub mod literal;
mod project;
mod source;

use std::path::{Path, PathBuf};

use crate::{
    config::CompilerConfig,
    dependencies::DependencyClosure,
    hierarchy::ClassPool,
    ir::{names::file_name, ClassDescriptor, OBJECT_CLASS},
    Result,
};

/// Include path of the runtime's root object declarations.
pub const OBJECT_HEADER: &str = "java/lang/Object.h";

/// A rendered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    /// Path relative to the output directory
    pub path: PathBuf,
    /// File contents
    pub contents: String,
}

impl EmittedFile {
    fn new(path: impl Into<PathBuf>, contents: String) -> Self {
        EmittedFile {
            path: path.into(),
            contents,
        }
    }
}

/// The include path of a class's declaration file.
#[must_use]
pub fn header_path(name: &str) -> String {
    if name == OBJECT_CLASS {
        OBJECT_HEADER.to_string()
    } else {
        format!("{}.h", file_name(name))
    }
}

/// Renders the retained classes of a run.
pub struct Emitter<'a> {
    pool: &'a ClassPool,
    closure: &'a DependencyClosure,
    config: &'a CompilerConfig,
}

impl<'a> Emitter<'a> {
    /// Creates an emitter over an analyzed pool and its dependency closure.
    #[must_use]
    pub fn new(pool: &'a ClassPool, closure: &'a DependencyClosure, config: &'a CompilerConfig) -> Self {
        Emitter {
            pool,
            closure,
            config,
        }
    }

    /// `true` if `name` is rendered by this emitter.
    #[must_use]
    pub fn is_emitted(&self, name: &str) -> bool {
        name != OBJECT_CLASS && self.closure.contains(name) && self.pool.resolved(name).is_some()
    }

    /// `true` if `name` is available to generated code, rendered or provided by the runtime.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        name == OBJECT_CLASS || self.is_emitted(name)
    }

    /// Renders the declaration and implementation file of one class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unresolved`] if a method with code was never analyzed, and
    /// [`crate::Error::Format`] if rendering fails.
    pub fn emit_class(&self, class: &ClassDescriptor) -> Result<Vec<EmittedFile>> {
        let base = file_name(&class.name);
        let header = header::render(class)?;
        let source = source::render(self, class)?;
        log::debug!("rendered {} ({} methods)", class.name, class.methods.len());
        Ok(vec![
            EmittedFile::new(format!("{base}.h"), header),
            EmittedFile::new(format!("{base}.cpp"), source),
        ])
    }

    /// Renders every retained class plus the configuration header, the entry file when
    /// `main_class` is given, and the build script when project files are enabled.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Emitter::emit_class`].
    pub fn emit_all(&self, main_class: Option<&str>) -> Result<Vec<EmittedFile>> {
        let mut files = Vec::new();
        for name in &self.closure.classes {
            if !self.is_emitted(name) {
                continue;
            }
            if let Some(class) = self.pool.resolved(name) {
                files.extend(self.emit_class(class)?);
            }
        }

        files.push(EmittedFile::new(
            project::CONFIG_HEADER,
            project::config_header(self.config)?,
        ));
        if let Some(main) = main_class {
            files.push(EmittedFile::new(project::ENTRY_FILE, project::entry_file(main)?));
        }
        if self.config.generate_project_files {
            let sources: Vec<&Path> = files
                .iter()
                .map(|file| file.path.as_path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "cpp"))
                .collect();
            files.push(EmittedFile::new(
                project::BUILD_SCRIPT,
                project::build_script(&sources)?,
            ));
        }

        log::info!("rendered {} files", files.len());
        Ok(files)
    }

    fn pool(&self) -> &ClassPool {
        self.pool
    }

    fn config(&self) -> &CompilerConfig {
        self.config
    }
}

/// Writes rendered files below `directory`, creating it if needed.
///
/// # Errors
///
/// Returns [`crate::Error::FileError`] if a directory or file cannot be written.
pub fn write_files(files: &[EmittedFile], directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory)?;
    for file in files {
        let path = directory.join(&file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.contents)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_paths() {
        assert_eq!(header_path(OBJECT_CLASS), "java/lang/Object.h");
        assert_eq!(header_path("pkg/Outer$Inner"), "pkg_Outer_Inner.h");
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![EmittedFile::new("a.h", "// a\n".to_string())];
        write_files(&files, dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.h")).unwrap(), "// a\n");
    }
}
