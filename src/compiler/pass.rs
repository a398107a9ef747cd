//! The trait every per-method transformation implements.

use crate::{compiler::context::CompilerContext, ir::MethodDescriptor, Result};

/// A transformation applied to one method at a time.
///
/// All passes must be thread-safe (Send + Sync): the scheduler runs a pass over many methods
/// in parallel. A pass receives mutable access to the method it works on and shared access
/// to the [`CompilerContext`]; anything it wants to report goes into `ctx.stats`.
///
/// # Pipeline Integration
///
/// The scheduler runs its passes in registration order. Each pass sees every method before
/// the next pass starts, so a pass may rely on all earlier passes having completed for the
/// whole pool. The built-in pipeline is:
///
/// 1. **Flow analysis**: typed inputs and outputs for every instruction
/// 2. **Exception rewrite**: region markers and bypass routing
/// 3. **Label trimming**: drop labels nothing targets any more
/// 4. **Slot allocation**: the storage plan the emitter renders
pub trait MethodPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific method?
    ///
    /// Called before `run_on_method`. The default skips methods without a body, which
    /// includes native methods and intrinsics.
    fn should_run(&self, method: &MethodDescriptor, _ctx: &CompilerContext) -> bool {
        method.has_code()
    }

    /// Run the pass on a single method.
    ///
    /// Returns `true` if the method was changed, `false` otherwise.
    ///
    /// # Arguments
    ///
    /// * `method` - The method to transform.
    /// * `ctx` - The compiler context (thread-safe, uses shared reference).
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot process the method. The error aborts the run.
    fn run_on_method(&self, method: &mut MethodDescriptor, ctx: &CompilerContext) -> Result<bool>;

    /// Called once before the pass runs.
    ///
    /// Use this to pick up configuration from the context.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass has seen every method.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
