//! Pass scheduler for running method passes over a class pool.
//!
//! The `PassScheduler` runs each registered pass over every method of every resolved class
//! before moving on to the next pass. Methods are independent of each other during these
//! passes. With [`crate::CompilerConfig::jobs`] above one (or zero, for one worker per core)
//! a single pass processes them in parallel on a dedicated rayon pool; by default they run
//! one after another on the calling thread. Either way the outcome is the same.

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    compiler::{
        context::CompilerContext,
        pass::MethodPass,
        passes::{ExceptionRewritePass, FlowAnalysisPass, LabelTrimPass, SlotAllocationPass},
    },
    hierarchy::ClassPool,
    ir::{HierarchyState, MethodDescriptor},
    Error, Result,
};

/// What one pass did over the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// Name of the pass
    pub name: &'static str,
    /// Methods the pass ran on
    pub visited: usize,
    /// Methods the pass reported as changed
    pub changed: usize,
}

/// Orchestrates method pass execution.
///
/// Passes run in registration order. Each pass is initialized, applied to all eligible
/// methods and finalized before the next one starts.
pub struct PassScheduler {
    /// The passes, in execution order.
    pub passes: Vec<Box<dyn MethodPass>>,
}

impl Default for PassScheduler {
    /// The built-in pipeline: flow analysis, exception rewrite, label trimming and slot
    /// allocation.
    fn default() -> Self {
        Self::new(vec![
            Box::new(FlowAnalysisPass),
            Box::new(ExceptionRewritePass),
            Box::new(LabelTrimPass),
            Box::new(SlotAllocationPass::default()),
        ])
    }
}

impl PassScheduler {
    /// Creates a scheduler running `passes` in order.
    ///
    /// # Arguments
    ///
    /// * `passes` - The passes to run.
    ///
    /// # Returns
    ///
    /// A new `PassScheduler`.
    #[must_use]
    pub fn new(passes: Vec<Box<dyn MethodPass>>) -> Self {
        Self { passes }
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add(&mut self, pass: Box<dyn MethodPass>) {
        self.passes.push(pass);
    }

    /// Builds the worker pool for `jobs` threads, or `None` to stay on the calling thread.
    fn workers(jobs: usize) -> Result<Option<ThreadPool>> {
        if jobs == 1 {
            return Ok(None);
        }
        let workers = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|index| format!("jvmaot-pass-{index}"))
            .build()
            .map_err(|e| Error::Error(format!("failed to start pass workers: {e}")))?;
        log::debug!("running method passes on {} workers", workers.current_num_threads());
        Ok(Some(workers))
    }

    /// Runs one pass over the given methods.
    ///
    /// Per-method work runs on `workers` when given, sequentially otherwise. Results are
    /// gathered in method order, so the error reported for a failing pool is the same on
    /// every run.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The compiler context.
    /// * `pass` - The pass to run.
    /// * `methods` - Every method of the resolved classes.
    /// * `workers` - The thread pool, if the pass runs in parallel.
    ///
    /// # Returns
    ///
    /// The [`PassOutcome`] of the pass.
    fn run_pass(
        ctx: &CompilerContext,
        pass: &mut Box<dyn MethodPass>,
        methods: &mut [&mut MethodDescriptor],
        workers: Option<&ThreadPool>,
    ) -> Result<PassOutcome> {
        pass.initialize(ctx)?;

        let shared: &dyn MethodPass = pass.as_ref();
        let run_one = |method: &mut &mut MethodDescriptor| -> Result<Option<bool>> {
            if !shared.should_run(method, ctx) {
                return Ok(None);
            }
            shared.run_on_method(method, ctx).map(Some).inspect_err(|_| {
                log::debug!("{} failed on {}", shared.name(), method.display_name());
            })
        };
        let results: Vec<Result<Option<bool>>> = match workers {
            Some(workers) => workers.install(|| methods.par_iter_mut().map(run_one).collect()),
            None => methods.iter_mut().map(run_one).collect(),
        };

        let mut outcome = PassOutcome {
            name: shared.name(),
            visited: 0,
            changed: 0,
        };
        for result in results {
            if let Some(changed) = result? {
                outcome.visited += 1;
                if changed {
                    outcome.changed += 1;
                }
            }
        }

        pass.finalize(ctx)?;
        log::debug!(
            "{}: ran on {} methods, changed {}",
            outcome.name,
            outcome.visited,
            outcome.changed
        );
        Ok(outcome)
    }

    /// Runs the complete pipeline over every method of every resolved class.
    ///
    /// Classes excluded by hierarchy resolution are left untouched.
    ///
    /// # Arguments
    ///
    /// * `pool` - The class pool.
    /// * `ctx` - The compiler context.
    ///
    /// # Returns
    ///
    /// One [`PassOutcome`] per pass, in execution order.
    ///
    /// # Errors
    ///
    /// Returns the first error of the first failing pass, in method order, or
    /// [`crate::Error::Error`] if the worker threads cannot be started.
    pub fn run(&mut self, pool: &mut ClassPool, ctx: &CompilerContext) -> Result<Vec<PassOutcome>> {
        let workers = Self::workers(ctx.config.jobs)?;
        let mut methods: Vec<&mut MethodDescriptor> = pool
            .iter_mut()
            .filter(|class| class.state == HierarchyState::Resolved)
            .flat_map(|class| class.methods.iter_mut())
            .collect();

        let mut outcomes = Vec::with_capacity(self.passes.len());
        for pass in &mut self.passes {
            outcomes.push(Self::run_pass(ctx, pass, &mut methods, workers.as_ref())?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        error::Error,
        ir::{AccessFlags, ClassDescriptor, Instruction, InstructionKind, MethodSignature, Opcode},
    };

    struct TestPass {
        name: &'static str,
        fail_on: Option<&'static str>,
        initialized: bool,
        seen: AtomicUsize,
    }

    impl TestPass {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                fail_on: None,
                initialized: false,
                seen: AtomicUsize::new(0),
            }
        }
    }

    impl MethodPass for TestPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
            self.initialized = true;
            Ok(())
        }

        fn run_on_method(&self, method: &mut MethodDescriptor, _ctx: &CompilerContext) -> Result<bool> {
            assert!(self.initialized);
            self.seen.fetch_add(1, Ordering::Relaxed);
            if self
                .fail_on
                .is_some_and(|prefix| method.signature.name().starts_with(prefix))
            {
                return Err(Error::Error(format!("failed on {}", method.signature.name())));
            }
            Ok(method.signature.name().starts_with("change"))
        }
    }

    fn class(name: &str, state: HierarchyState, methods: &[&str]) -> ClassDescriptor {
        let mut class = ClassDescriptor::new(name, None, AccessFlags::PUBLIC);
        class.state = state;
        for method_name in methods {
            let signature = MethodSignature::new(method_name, "()V").unwrap();
            let mut method = MethodDescriptor::new(name, signature, AccessFlags::STATIC);
            method.instructions = vec![Instruction::new(InstructionKind::Simple(Opcode::Return))];
            class.methods.push(method);
        }
        class
    }

    fn pool() -> ClassPool {
        let mut pool = ClassPool::new();
        pool.insert(class("pkg/A", HierarchyState::Resolved, &["change1", "keep1", "change2"]));
        pool.insert(class("pkg/B", HierarchyState::Errored, &["change3"]));
        pool.insert(class("pkg/C", HierarchyState::Resolved, &["keep2", "fail1", "fail2"]));
        pool
    }

    #[test]
    fn test_default_pipeline_order() {
        let scheduler = PassScheduler::default();
        let names: Vec<&str> = scheduler.passes.iter().map(|pass| pass.name()).collect();
        assert_eq!(
            names,
            vec!["flow-analysis", "exception-rewrite", "label-trim", "slot-allocation"]
        );
    }

    #[test]
    fn test_scheduler_skips_errored_classes() {
        let mut scheduler = PassScheduler::new(vec![Box::new(TestPass::new("count"))]);
        let mut pool = pool();
        let outcomes = scheduler.run(&mut pool, &CompilerContext::default()).unwrap();
        assert_eq!(
            outcomes,
            vec![PassOutcome {
                name: "count",
                visited: 6,
                changed: 2,
            }]
        );
    }

    #[test]
    fn test_scheduler_reports_first_failure() {
        let mut failing = TestPass::new("failing");
        failing.fail_on = Some("fail1");
        let mut scheduler = PassScheduler::default();
        scheduler.passes = vec![Box::new(failing), Box::new(TestPass::new("never"))];

        let result = scheduler.run(&mut pool(), &CompilerContext::default());
        match result {
            Err(Error::Error(message)) => assert_eq!(message, "failed on fail1"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_default_pipeline_plans_every_method() {
        let mut scheduler = PassScheduler::default();
        let mut pool = pool();
        let outcomes = scheduler.run(&mut pool, &CompilerContext::default()).unwrap();
        assert_eq!(outcomes.len(), 4);
        // no method has a try region
        assert_eq!(outcomes[1].visited, 0);
        assert!(pool.get("pkg/A").unwrap().methods.iter().all(|method| method.plan.is_some()));
        assert!(pool.get("pkg/B").unwrap().methods.iter().all(|method| method.plan.is_none()));
    }

    #[test]
    fn test_worker_count_does_not_change_results() {
        let sequential_ctx = CompilerContext::default();
        let parallel_ctx = CompilerContext::new(crate::CompilerConfig::default().with_jobs(4));

        let mut sequential_pool = pool();
        let sequential = PassScheduler::default()
            .run(&mut sequential_pool, &sequential_ctx)
            .unwrap();
        let mut parallel_pool = pool();
        let parallel = PassScheduler::default()
            .run(&mut parallel_pool, &parallel_ctx)
            .unwrap();

        assert_eq!(sequential, parallel);
        for name in ["pkg/A", "pkg/B", "pkg/C"] {
            assert_eq!(sequential_pool.get(name), parallel_pool.get(name));
        }
    }

    #[test]
    fn test_parallel_failure_is_first_in_method_order() {
        let ctx = CompilerContext::new(crate::CompilerConfig::default().with_jobs(0));
        for _ in 0..8 {
            let mut failing = TestPass::new("failing");
            failing.fail_on = Some("fail");
            let mut scheduler = PassScheduler::new(vec![Box::new(failing)]);
            match scheduler.run(&mut pool(), &ctx) {
                Err(Error::Error(message)) => assert_eq!(message, "failed on fail1"),
                other => panic!("unexpected result {other:?}"),
            }
        }
    }
}
