//! Linearization of protected regions into entry and exit markers with bypass routing.

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        Bypass, Destination, Instruction, InstructionKind, LabelId, MethodDescriptor, Route,
        ScopeId,
    },
    Result,
};

/// What the rewrite changed in one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Regions that received markers
    pub regions: usize,
    /// Regions dropped because they protect nothing
    pub empty_regions: usize,
    /// Jump targets and handler dispatches that needed a route
    pub routed: usize,
    /// Distinct bypass flags allocated
    pub flags: u16,
}

struct ActiveRegion {
    id: ScopeId,
    start: usize,
    end: usize,
}

/// Inserts region markers and routes every control transfer that crosses region boundaries.
///
/// Each non-empty region gets a [`InstructionKind::ScopeEnter`] right after its start label and
/// a [`InstructionKind::ScopeExit`] right after its end label. Where several markers follow the
/// same label, exits come first (innermost region first), then entries (outermost first), so
/// the markers nest in instruction order.
///
/// A jump whose source and target lie in different region stacks is given a [`Route`]: it
/// raises a bypass flag and jumps to the first marker on its way. The way leaves every region
/// the source is in but the target is not, innermost first, then enters every region the
/// target is in but the source is not, outermost first. Each marker on the way carries a
/// [`Bypass`] telling it where to continue while the flag is raised, and the last one clears
/// the flag. Flags are shared by all transfers with the same source region stack and target.
///
/// Handler dispatch is routed the same way, starting from the region stack outside the
/// catching region.
///
/// # Errors
/// Returns [`crate::Error::UnknownLabel`] for regions or jumps naming missing labels, and
/// [`crate::Error::NotSupported`] when regions overlap without nesting.
pub fn rewrite(method: &mut MethodDescriptor) -> Result<RewriteSummary> {
    let mut summary = RewriteSummary::default();
    if method.regions.is_empty() {
        return Ok(summary);
    }

    let positions = method.label_positions();
    let mut active = Vec::new();
    for (id, region) in method.regions.iter().enumerate() {
        let start = method.position_of(&positions, region.start)?;
        let end = method.position_of(&positions, region.end)?;
        let protects_code = start < end
            && method.instructions[start..end]
                .iter()
                .any(|instruction| !instruction.is_pseudo());
        if !protects_code {
            summary.empty_regions += 1;
            log::debug!(
                "{}: dropping empty region {} (L{}..L{})",
                method.display_name(),
                id,
                region.start,
                region.end
            );
            continue;
        }
        active.push(ActiveRegion {
            id: scope_id(id),
            start,
            end,
        });
    }
    summary.regions = active.len();

    insert_markers(method, &active);
    let scopes = scope_stacks(method)?;

    let mut router = Router::default();
    let positions = method.label_positions();

    let mut transfers: Vec<(usize, usize, LabelId, usize)> = Vec::new();
    for (index, instruction) in method.instructions.iter().enumerate() {
        for (slot, target) in instruction.targets().iter().enumerate() {
            let target_position = method.position_of(&positions, target.label)?;
            transfers.push((index, slot, target.label, target_position));
        }
    }

    let mut assignments: Vec<(usize, usize, Route)> = Vec::new();
    for (index, slot, label, target_position) in transfers {
        if let Some(route) =
            router.route(method, &scopes[index], label, &scopes[target_position])
        {
            assignments.push((index, slot, route));
        }
    }
    for (index, slot, route) in assignments {
        if let Some(target) = method.instructions[index].targets_mut().into_iter().nth(slot) {
            target.route = Some(route);
            summary.routed += 1;
        }
    }

    for region in &active {
        let enter_position = method
            .instructions
            .iter()
            .position(|instruction| instruction.kind == InstructionKind::ScopeEnter(region.id))
            .unwrap_or(0);
        let mut outside = scopes[enter_position].clone();
        outside.pop();

        let handler = method.regions[region.id as usize].handler;
        let handler_position = method.position_of(&positions, handler)?;
        let route = router.route(method, &outside, handler, &scopes[handler_position]);
        if route.is_some() {
            summary.routed += 1;
        }
        method.regions[region.id as usize].handler_route = route;
    }

    for region in &active {
        let entry = &mut method.regions[region.id as usize];
        entry.enter_bypasses = router
            .bypasses
            .remove(&Destination::Enter(region.id))
            .unwrap_or_default();
        entry.exit_bypasses = router
            .bypasses
            .remove(&Destination::Exit(region.id))
            .unwrap_or_default();
    }

    summary.flags = method.bypass_count;
    log::debug!(
        "{}: {} regions, {} routed transfers, {} bypass flags",
        method.display_name(),
        summary.regions,
        summary.routed,
        summary.flags
    );
    Ok(summary)
}

fn scope_id(index: usize) -> ScopeId {
    ScopeId::try_from(index).unwrap_or(ScopeId::MAX)
}

fn insert_markers(method: &mut MethodDescriptor, active: &[ActiveRegion]) {
    let mut enters: FxHashMap<usize, Vec<&ActiveRegion>> = FxHashMap::default();
    let mut exits: FxHashMap<usize, Vec<&ActiveRegion>> = FxHashMap::default();
    for region in active {
        enters.entry(region.start).or_default().push(region);
        exits.entry(region.end).or_default().push(region);
    }
    // Wider regions enter first; for identical ranges the earlier table entry is the inner one.
    for group in enters.values_mut() {
        group.sort_by(|a, b| b.end.cmp(&a.end).then(b.id.cmp(&a.id)));
    }
    for group in exits.values_mut() {
        group.sort_by(|a, b| b.start.cmp(&a.start).then(a.id.cmp(&b.id)));
    }

    let old = std::mem::take(&mut method.instructions);
    let mut instructions = Vec::with_capacity(old.len() + active.len() * 2);
    for (index, instruction) in old.into_iter().enumerate() {
        instructions.push(instruction);
        if let Some(group) = exits.get(&index) {
            instructions.extend(
                group
                    .iter()
                    .map(|region| Instruction::new(InstructionKind::ScopeExit(region.id))),
            );
        }
        if let Some(group) = enters.get(&index) {
            instructions.extend(
                group
                    .iter()
                    .map(|region| Instruction::new(InstructionKind::ScopeEnter(region.id))),
            );
        }
    }
    method.instructions = instructions;
}

/// The regions active at every instruction, outermost first.
///
/// An entry marker already counts as inside its region, an exit marker still does.
fn scope_stacks(method: &MethodDescriptor) -> Result<Vec<Vec<ScopeId>>> {
    let mut current: Vec<ScopeId> = Vec::new();
    let mut stacks = Vec::with_capacity(method.instructions.len());
    for instruction in &method.instructions {
        match instruction.kind {
            InstructionKind::ScopeEnter(scope) => {
                current.push(scope);
                stacks.push(current.clone());
            }
            InstructionKind::ScopeExit(scope) => {
                stacks.push(current.clone());
                if current.last() != Some(&scope) {
                    return Err(unsupported_error!(
                        "overlapping protected regions in {}: region {} ends inside {:?}",
                        method.display_name(),
                        scope,
                        current
                    ));
                }
                current.pop();
            }
            _ => stacks.push(current.clone()),
        }
    }
    Ok(stacks)
}

#[derive(Default)]
struct Router {
    routes: FxHashMap<(Vec<ScopeId>, LabelId), Route>,
    bypasses: FxHashMap<Destination, Vec<Bypass>>,
}

impl Router {
    fn route(
        &mut self,
        method: &mut MethodDescriptor,
        source: &[ScopeId],
        label: LabelId,
        target: &[ScopeId],
    ) -> Option<Route> {
        let common = source
            .iter()
            .zip(target)
            .take_while(|(a, b)| a == b)
            .count();
        if common == source.len() && common == target.len() {
            return None;
        }

        let key = (source.to_vec(), label);
        if let Some(route) = self.routes.get(&key) {
            return Some(*route);
        }

        let hops: Vec<Destination> = source[common..]
            .iter()
            .rev()
            .map(|scope| Destination::Exit(*scope))
            .chain(target[common..].iter().map(|scope| Destination::Enter(*scope)))
            .collect();

        let flag = method.new_bypass_flag();
        for (position, hop) in hops.iter().enumerate() {
            let next = hops
                .get(position + 1)
                .copied()
                .unwrap_or(Destination::Label(label));
            self.bypasses.entry(*hop).or_default().push(Bypass {
                flag,
                target: label,
                next,
                last: position + 1 == hops.len(),
            });
        }

        let route = Route { flag, via: hops[0] };
        self.routes.insert(key, route);
        Some(route)
    }
}
