//! The built-in method passes, in pipeline order.

use crate::{
    alloc::{allocate, raw_plan},
    analysis::analyze,
    compiler::{
        context::{CompilerContext, Counter},
        pass::MethodPass,
    },
    ir::MethodDescriptor,
    rewrite::{rewrite, trim_labels},
    Result,
};

/// Assigns typed inputs and outputs to every instruction.
#[derive(Debug, Default)]
pub struct FlowAnalysisPass;

impl MethodPass for FlowAnalysisPass {
    fn name(&self) -> &'static str {
        "flow-analysis"
    }

    fn run_on_method(&self, method: &mut MethodDescriptor, ctx: &CompilerContext) -> Result<bool> {
        let summary = analyze(method)?;
        ctx.stats.add(Counter::MethodsAnalyzed, 1);
        ctx.stats.add(Counter::InstructionsResolved, summary.resolved);
        ctx.stats.add(Counter::HandlersReached, summary.handlers);
        Ok(summary.resolved > 0)
    }

    fn description(&self) -> &'static str {
        "Simulates the operand stack over every control path"
    }
}

/// Inserts region markers and routes jumps that leave or enter protected regions.
#[derive(Debug, Default)]
pub struct ExceptionRewritePass;

impl MethodPass for ExceptionRewritePass {
    fn name(&self) -> &'static str {
        "exception-rewrite"
    }

    fn should_run(&self, method: &MethodDescriptor, _ctx: &CompilerContext) -> bool {
        method.has_code() && !method.regions.is_empty()
    }

    fn run_on_method(&self, method: &mut MethodDescriptor, ctx: &CompilerContext) -> Result<bool> {
        let summary = rewrite(method)?;
        ctx.stats.add(Counter::RegionsRewritten, summary.regions);
        ctx.stats.add(Counter::RoutedTransfers, summary.routed);
        ctx.stats.add(Counter::BypassFlags, usize::from(summary.flags));
        Ok(summary.regions > 0)
    }

    fn description(&self) -> &'static str {
        "Linearizes try regions into entry and exit markers with bypass routing"
    }
}

/// Removes labels that are no longer targeted once the markers are in place.
#[derive(Debug, Default)]
pub struct LabelTrimPass;

impl MethodPass for LabelTrimPass {
    fn name(&self) -> &'static str {
        "label-trim"
    }

    fn run_on_method(&self, method: &mut MethodDescriptor, ctx: &CompilerContext) -> Result<bool> {
        let removed = trim_labels(method);
        ctx.stats.add(Counter::LabelsTrimmed, removed);
        Ok(removed > 0)
    }
}

/// Computes the storage plan of every method.
///
/// With optimizations enabled, straight-line runs are lowered to slots, temporaries and
/// literals. Otherwise every operand stays in its positional stack slot.
#[derive(Debug)]
pub struct SlotAllocationPass {
    optimize: bool,
}

impl Default for SlotAllocationPass {
    fn default() -> Self {
        SlotAllocationPass { optimize: true }
    }
}

impl MethodPass for SlotAllocationPass {
    fn name(&self) -> &'static str {
        "slot-allocation"
    }

    fn initialize(&mut self, ctx: &CompilerContext) -> Result<()> {
        self.optimize = ctx.config.use_optimizations;
        Ok(())
    }

    fn run_on_method(&self, method: &mut MethodDescriptor, ctx: &CompilerContext) -> Result<bool> {
        let plan = if self.optimize {
            allocate(method)?
        } else {
            raw_plan(method)?
        };
        ctx.stats.add(Counter::RunsLowered, plan.runs.len());
        ctx.stats.add(Counter::Temporaries, plan.temps.len());
        method.plan = Some(plan);
        Ok(true)
    }

    fn description(&self) -> &'static str {
        "Replaces operand stack traffic with slots and temporaries"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CompilerConfig,
        ir::{AccessFlags, Instruction, InstructionKind, JumpTarget, MethodSignature, Opcode, TryCatchRegion},
    };

    /// `static int f(int x) { try { x = x / 2; } catch (Throwable t) { x = 0; } return x + 1; }`
    fn guarded() -> MethodDescriptor {
        let signature = MethodSignature::new("f", "(I)I").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        let load = InstructionKind::Variable { opcode: Opcode::Iload, local: 0 };
        let store = InstructionKind::Variable { opcode: Opcode::Istore, local: 0 };
        method.instructions = vec![
            InstructionKind::Label(0),
            load.clone(),
            InstructionKind::Simple(Opcode::Iconst2),
            InstructionKind::Simple(Opcode::Idiv),
            store.clone(),
            InstructionKind::Label(1),
            InstructionKind::Jump { opcode: Opcode::Goto, target: JumpTarget::new(3) },
            InstructionKind::Label(2),
            InstructionKind::Simple(Opcode::Pop),
            InstructionKind::Simple(Opcode::Iconst0),
            store,
            InstructionKind::Label(3),
            load,
            InstructionKind::Simple(Opcode::Iconst1),
            InstructionKind::Simple(Opcode::Iadd),
            InstructionKind::Simple(Opcode::Ireturn),
        ]
        .into_iter()
        .map(Instruction::new)
        .collect();
        method.regions.push(TryCatchRegion::new(0, 1, 2, None));
        method.reserve_label(4);
        method.max_locals = 1;
        method.max_stack = 2;
        method
    }

    fn pipeline(method: &mut MethodDescriptor, ctx: &CompilerContext) {
        let mut passes: Vec<Box<dyn MethodPass>> = vec![
            Box::new(FlowAnalysisPass),
            Box::new(ExceptionRewritePass),
            Box::new(LabelTrimPass),
            Box::new(SlotAllocationPass::default()),
        ];
        for pass in &mut passes {
            pass.initialize(ctx).unwrap();
            if pass.should_run(method, ctx) {
                pass.run_on_method(method, ctx).unwrap();
            }
        }
    }

    #[test]
    fn test_pipeline_fills_plan_and_stats() {
        let ctx = CompilerContext::default();
        let mut method = guarded();
        pipeline(&mut method, &ctx);

        assert!(method.plan.is_some());
        assert_eq!(ctx.stats.get(Counter::MethodsAnalyzed), 1);
        assert_eq!(ctx.stats.get(Counter::HandlersReached), 1);
        assert_eq!(ctx.stats.get(Counter::RegionsRewritten), 1);
        assert!(ctx.stats.get(Counter::LabelsTrimmed) > 0);
        assert!(method
            .instructions
            .iter()
            .any(|instruction| matches!(instruction.kind, InstructionKind::ScopeEnter(0))));
    }

    #[test]
    fn test_allocation_follows_configuration() {
        let ctx = CompilerContext::new(CompilerConfig::default().with_optimizations(false));
        let mut method = guarded();
        pipeline(&mut method, &ctx);

        let plan = method.plan.as_ref().unwrap();
        assert!(plan.runs.is_empty());
        assert_eq!(ctx.stats.get(Counter::RunsLowered), 0);
    }

    #[test]
    fn test_bodiless_methods_are_skipped() {
        let ctx = CompilerContext::default();
        let signature = MethodSignature::new("n", "()V").unwrap();
        let method = MethodDescriptor::new("pkg/A", signature, AccessFlags::NATIVE);
        assert!(!FlowAnalysisPass.should_run(&method, &ctx));
        assert!(!ExceptionRewritePass.should_run(&guarded_without_regions(), &ctx));
    }

    fn guarded_without_regions() -> MethodDescriptor {
        let mut method = guarded();
        method.regions.clear();
        method
    }
}
