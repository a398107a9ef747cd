//! The whole-run driver.

use std::{collections::BTreeMap, path::Path};

use serde::Serialize;

use crate::{
    classfile::parse_class,
    compiler::{context::CompilerContext, pass::MethodPass, scheduler::PassScheduler},
    config::CompilerConfig,
    dependencies::{collect, find_main_class, ClassPatterns, DependencyClosure, DependencyRoots},
    emit::{write_files, EmittedFile, Emitter},
    file::ClassSource,
    hierarchy::{
        bind_symbols,
        extras::{apply_annotation_defaults, apply_intrinsics, apply_weak_fields, mark_reflective},
        resolve_all, ClassPool,
    },
    Result,
};

/// Summary of a compilation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    /// Classes parsed, including synthesized ones
    pub parsed: usize,
    /// Classes excluded because their hierarchy could not be resolved
    pub excluded: Vec<String>,
    /// Classes in the dependency closure
    pub classes: usize,
    /// Referenced classes that were not available
    pub missing: Vec<String>,
    /// Files rendered
    pub files: usize,
    /// The entry point class, if any
    pub main_class: Option<String>,
    /// Non-zero pass counters by name
    pub stats: BTreeMap<&'static str, usize>,
}

/// The processed program, ready for emission.
#[derive(Debug)]
pub struct Compilation {
    /// Every parsed class, with passes applied to the resolved ones
    pub pool: ClassPool,
    /// The classes to emit
    pub closure: DependencyClosure,
    /// Configuration including fragments carried by the inputs
    pub config: CompilerConfig,
    /// What happened so far
    pub report: CompileReport,
}

impl Compilation {
    /// Renders every class of the closure plus the project files.
    ///
    /// # Errors
    ///
    /// Propagates rendering errors of the [`Emitter`].
    pub fn emit(&mut self) -> Result<Vec<EmittedFile>> {
        let emitter = Emitter::new(&self.pool, &self.closure, &self.config);
        let files = emitter.emit_all(self.report.main_class.as_deref())?;
        self.report.files = files.len();
        Ok(files)
    }
}

/// Drives a compilation from class sources to native sources.
///
/// # Usage Examples
///
/// ```rust,no_run
/// use jvmaot::{ClassSource, Compiler, CompilerConfig};
/// use std::path::Path;
///
/// let mut compiler = Compiler::new(CompilerConfig::default());
/// compiler.add_source(ClassSource::from_path(Path::new("app.jar")));
/// let report = compiler.run(Path::new("out"))?;
/// println!("{} classes, {} files", report.classes, report.files);
/// # Ok::<(), jvmaot::Error>(())
/// ```
pub struct Compiler {
    config: CompilerConfig,
    sources: Vec<ClassSource>,
    scheduler: PassScheduler,
}

impl Compiler {
    /// Creates a compiler with the built-in pass pipeline.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Compiler {
            config,
            sources: Vec::new(),
            scheduler: PassScheduler::default(),
        }
    }

    /// The configuration given to [`Compiler::new`].
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Adds an input. Classes of earlier sources win over same-named classes of later ones.
    pub fn add_source(&mut self, source: ClassSource) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// Appends a pass after the built-in pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn MethodPass>) -> &mut Self {
        self.scheduler.add(pass);
        self
    }

    /// Parses every source into a pool and merges the configuration fragments found along
    /// the way into `config`.
    ///
    /// Each source's files are released before the next source is opened.
    fn load(&self, config: &mut CompilerConfig) -> Result<ClassPool> {
        let mut pool = ClassPool::new();
        for source in &self.sources {
            let contents = source.expand()?;
            for entry in &contents.entries {
                log::trace!("parsing {}", entry.name);
                let parsed = parse_class(entry.backend.data()).inspect_err(|err| {
                    log::error!("failed to parse {}: {err}", entry.name);
                })?;
                for class in parsed.into_classes() {
                    pool.insert(class);
                }
            }
            if let Some(fragment) = &contents.config_fragment {
                log::debug!("merging configuration fragment of {source:?}");
                config.merge(CompilerConfig::from_json(fragment)?);
            }
        }
        config.validate();
        log::info!("parsed {} classes from {} sources", pool.len(), self.sources.len());
        Ok(pool)
    }

    /// Runs every phase up to, but excluding, emission.
    ///
    /// The phases are: parsing, hierarchy resolution with intrinsics, weak fields,
    /// annotation defaults and reflection flags, symbol binding, the method passes, entry
    /// point lookup and dependency collection.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of any phase: unparsable input, unsupported bytecode,
    /// an instruction the flow analysis could not resolve, or a required class missing from
    /// the closure.
    pub fn prepare(&mut self) -> Result<Compilation> {
        let mut config = self.config.clone();
        let mut pool = self.load(&mut config)?;
        let mut report = CompileReport {
            parsed: pool.len(),
            ..CompileReport::default()
        };

        let hierarchy = resolve_all(&mut pool);
        report.excluded = hierarchy.errored;

        let intrinsic_owners = apply_intrinsics(&mut pool, &config.intrinsics);
        apply_weak_fields(&mut pool, &config.weak_fields);
        apply_annotation_defaults(&mut pool);
        let reflective = ClassPatterns::compile(config.reflective.as_slice())?;
        let reflective_count = mark_reflective(&mut pool, |name| reflective.matches(name));
        let bound = bind_symbols(&mut pool);
        log::debug!("{reflective_count} reflective classes, {bound} member references bound");

        let ctx = CompilerContext::new(config);
        for outcome in self.scheduler.run(&mut pool, &ctx)? {
            log::debug!("pass {}: {} of {} methods changed", outcome.name, outcome.changed, outcome.visited);
        }
        report.stats = ctx.stats.snapshot();
        let CompilerContext { config, .. } = ctx;

        let main_class = find_main_class(&pool, config.main_class.as_deref())?;
        let retained: Vec<&String> = config.retained_patterns().collect();
        let roots = DependencyRoots {
            optional: intrinsic_owners,
            retained: ClassPatterns::compile(retained.as_slice())?,
            ..DependencyRoots::runtime(main_class.as_deref())
        };
        let closure = collect(&mut pool, &roots)?;
        report.classes = closure.classes.len();
        report.missing = closure.missing.iter().cloned().collect();
        report.main_class = main_class;

        log::info!(
            "{} of {} classes retained, {} excluded, {} missing",
            report.classes,
            report.parsed,
            report.excluded.len(),
            report.missing.len()
        );
        Ok(Compilation {
            pool,
            closure,
            config,
            report,
        })
    }

    /// Compiles without touching the disk.
    ///
    /// # Errors
    ///
    /// See [`Compiler::prepare`] and [`Compilation::emit`].
    pub fn compile_in_memory(&mut self) -> Result<(CompileReport, Vec<EmittedFile>)> {
        let mut compilation = self.prepare()?;
        let files = compilation.emit()?;
        Ok((compilation.report, files))
    }

    /// Compiles and writes the rendered files below `output`.
    ///
    /// # Errors
    ///
    /// See [`Compiler::compile_in_memory`]; additionally returns [`crate::Error::FileError`]
    /// if the output cannot be written.
    pub fn run(&mut self, output: &Path) -> Result<CompileReport> {
        let (report, files) = self.compile_in_memory()?;
        write_files(&files, output)?;
        log::info!("wrote {} files to {}", files.len(), output.display());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_empty_run_fails_on_runtime_roots() {
        // the runtime classes are required roots
        let mut compiler = Compiler::new(CompilerConfig::default());
        assert!(matches!(compiler.prepare(), Err(Error::MissingClass(_))));
    }

    #[test]
    fn test_unparsable_source_aborts() {
        let mut compiler = Compiler::new(CompilerConfig::default());
        compiler.add_source(ClassSource::Memory {
            name: "Broken.class".into(),
            data: vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00],
        });
        assert!(compiler.compile_in_memory().is_err());
    }

    #[test]
    fn test_missing_configured_main_class() {
        let config = CompilerConfig::default().with_main_class("app/Main");
        let mut compiler = Compiler::new(config);
        match compiler.prepare() {
            Err(Error::MissingClass(name)) => assert_eq!(name, "app/Main"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
