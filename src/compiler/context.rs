//! Shared state handed to every method pass.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::config::CompilerConfig;

/// Quantities the built-in passes accumulate while they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Counter {
    /// Methods whose stack flow was analyzed
    MethodsAnalyzed,
    /// Instructions that received inputs and outputs
    InstructionsResolved,
    /// Exception handlers reached by the analysis
    HandlersReached,
    /// Protected regions that received markers
    RegionsRewritten,
    /// Jumps and handler dispatches given a bypass route
    RoutedTransfers,
    /// Bypass flags allocated
    BypassFlags,
    /// Labels removed after the rewrite
    LabelsTrimmed,
    /// Straight-line runs lowered to slots and temporaries
    RunsLowered,
    /// Temporaries introduced by lowering
    Temporaries,
}

/// Thread-safe counters indexed by [`Counter`].
#[derive(Debug)]
pub struct PassStats {
    values: [AtomicUsize; Counter::COUNT],
}

impl Default for PassStats {
    fn default() -> Self {
        PassStats {
            values: std::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }
}

impl PassStats {
    /// Adds `amount` to a counter.
    pub fn add(&self, counter: Counter, amount: usize) {
        self.values[counter as usize].fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value of a counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> usize {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    /// Every non-zero counter by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<&'static str, usize> {
        Counter::iter()
            .map(|counter| (counter.into(), self.get(counter)))
            .filter(|(_, value)| *value > 0)
            .collect()
    }
}

/// Configuration and statistics shared by the passes of one run.
///
/// Passes only get a shared reference, so everything they write goes through atomics.
#[derive(Debug, Default)]
pub struct CompilerContext {
    /// The effective configuration, including merged fragments
    pub config: CompilerConfig,
    /// Counters filled by the passes
    pub stats: PassStats,
}

impl CompilerContext {
    /// Creates a context with zeroed counters.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        CompilerContext {
            config,
            stats: PassStats::default(),
        }
    }
}
