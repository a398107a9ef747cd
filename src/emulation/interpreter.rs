//! The instruction interpreter.
//!
//! Executes method bodies exactly the way the generated functions do: operands are read from
//! and written to the locations a [`MethodPlan`] assigns, elided instructions do nothing,
//! runs flush their captures and moves at the same points as the rendered code, region
//! markers push and pop exception frames, and bypass flags steer jumps through the markers.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    alloc::{allocate, raw_plan, Literal, MethodPlan, Operand},
    analysis::stack_shuffle,
    emulation::{
        arith::{self, Arith},
        effects::{Effect, Execution, Outcome},
        frame::Frame,
        value::{EmValue, HeapRef, ManagedHeap, ObjectBody},
    },
    hierarchy::ClassPool,
    ir::{
        Bypass, Category, Constant, Destination, Dispatch, FieldRef, Instruction, InstructionKind,
        JavaType, JumpTarget, LabelId, LambdaSite, MethodDescriptor, MethodRef, Opcode, ScopeId,
        TryCatchRegion, TypeKind, CLASS_CLASS, OBJECT_CLASS, THROWABLE_CLASS,
    },
    Error, Result,
};

const NULL_POINTER: &str = "java/lang/NullPointerException";
const ARITHMETIC: &str = "java/lang/ArithmeticException";
const CLASS_CAST: &str = "java/lang/ClassCastException";
const ARRAY_INDEX: &str = "java/lang/ArrayIndexOutOfBoundsException";
const NEGATIVE_SIZE: &str = "java/lang/NegativeArraySizeException";
const EXCEPTION: &str = "java/lang/Exception";
const INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";

/// Superclasses of the exceptions the runtime raises, used when the pool lacks them.
const RUNTIME_EXCEPTIONS: &[(&str, &str)] = &[
    (NULL_POINTER, "java/lang/RuntimeException"),
    (ARITHMETIC, "java/lang/RuntimeException"),
    (CLASS_CAST, "java/lang/RuntimeException"),
    (ARRAY_INDEX, "java/lang/IndexOutOfBoundsException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    (NEGATIVE_SIZE, "java/lang/RuntimeException"),
    ("java/lang/RuntimeException", EXCEPTION),
    (EXCEPTION, THROWABLE_CLASS),
    (INITIALIZER_ERROR, "java/lang/LinkageError"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/Error", THROWABLE_CLASS),
    (THROWABLE_CLASS, OBJECT_CLASS),
];

/// Which storage plan method bodies execute with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Every operand in its positional slot
    Raw,
    /// Runs lowered into slots, temporaries and literals
    Allocated,
    /// Whatever plan the compiler stored on the method
    Stored,
}

/// Limits and plan selection of an [`Interpreter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationConfig {
    /// Storage plan to execute
    pub mode: PlanMode,
    /// Instructions executed across all calls before the run is aborted
    pub max_steps: usize,
    /// Nesting depth of emulated calls
    pub max_call_depth: usize,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        EmulationConfig {
            mode: PlanMode::Allocated,
            max_steps: 1_000_000,
            max_call_depth: 256,
        }
    }
}

impl EmulationConfig {
    /// Default limits with the given plan mode.
    #[must_use]
    pub fn with_mode(mode: PlanMode) -> Self {
        EmulationConfig {
            mode,
            ..Self::default()
        }
    }
}

/// Result of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StepResult {
    /// Continue with the next instruction
    Continue,
    /// Continue at the given instruction index
    Jump(usize),
    /// Leave the method normally
    Return(Option<EmValue>),
    /// Raise an exception at the current instruction
    Throw(HeapRef),
}

/// Position lookups of one method.
struct MethodContext<'m> {
    method: &'m MethodDescriptor,
    plan: &'m MethodPlan,
    labels: FxHashMap<LabelId, usize>,
    enters: FxHashMap<ScopeId, usize>,
    exits: FxHashMap<ScopeId, usize>,
}

impl<'m> MethodContext<'m> {
    fn new(method: &'m MethodDescriptor, plan: &'m MethodPlan) -> Self {
        let mut enters = FxHashMap::default();
        let mut exits = FxHashMap::default();
        for (index, instruction) in method.instructions.iter().enumerate() {
            match instruction.kind {
                InstructionKind::ScopeEnter(scope) => {
                    enters.insert(scope, index);
                }
                InstructionKind::ScopeExit(scope) => {
                    exits.insert(scope, index);
                }
                _ => {}
            }
        }
        MethodContext {
            method,
            plan,
            labels: method.label_positions(),
            enters,
            exits,
        }
    }

    fn destination(&self, destination: Destination) -> Result<usize> {
        let position = match destination {
            Destination::Label(label) => return self.method.position_of(&self.labels, label),
            Destination::Enter(scope) => self.enters.get(&scope),
            Destination::Exit(scope) => self.exits.get(&scope),
        };
        position.copied().ok_or_else(|| {
            Error::Emulation(format!(
                "no marker {destination} in {}",
                self.method.display_name()
            ))
        })
    }

    fn region(&self, scope: ScopeId) -> Result<&'m TryCatchRegion> {
        self.method.regions.get(scope as usize).ok_or_else(|| {
            Error::Emulation(format!(
                "unknown region {scope} in {}",
                self.method.display_name()
            ))
        })
    }

    fn unresolved(&self, index: usize, instruction: &Instruction) -> Error {
        Error::Unresolved {
            method: self.method.display_name(),
            index,
            instruction: instruction.to_string(),
        }
    }
}

/// Executes methods of an analyzed class pool.
///
/// One interpreter holds one heap and one set of static fields, so consecutive calls observe
/// each other's side effects. Static initializers run on first use, as in generated code.
pub struct Interpreter<'p> {
    pool: &'p ClassPool,
    config: EmulationConfig,
    heap: ManagedHeap,
    statics: FxHashMap<(String, String), EmValue>,
    initialized: FxHashSet<String>,
    class_objects: FxHashMap<String, HeapRef>,
    plans: FxHashMap<String, Rc<MethodPlan>>,
    effects: Vec<Effect>,
    steps: usize,
    depth: usize,
}

impl<'p> Interpreter<'p> {
    /// Creates an interpreter over `pool`.
    #[must_use]
    pub fn new(pool: &'p ClassPool, config: EmulationConfig) -> Self {
        Interpreter {
            pool,
            config,
            heap: ManagedHeap::new(),
            statics: FxHashMap::default(),
            initialized: FxHashSet::default(),
            class_objects: FxHashMap::default(),
            plans: FxHashMap::default(),
            effects: Vec::new(),
            steps: 0,
            depth: 0,
        }
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &ManagedHeap {
        &self.heap
    }

    /// Mutable access to the heap, to build arguments.
    pub fn heap_mut(&mut self) -> &mut ManagedHeap {
        &mut self.heap
    }

    /// Instructions executed so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Current value of a static field, if it was ever initialized or written.
    #[must_use]
    pub fn static_value(&self, owner: &str, name: &str) -> Option<EmValue> {
        self.statics
            .get(&(owner.to_string(), name.to_string()))
            .copied()
    }

    /// Objects referenced from static fields, the roots a collection starts from.
    #[must_use]
    pub fn static_roots(&self) -> Vec<HeapRef> {
        let mut entries: Vec<_> = self.statics.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .filter_map(|(_, value)| match value {
                EmValue::Ref(Some(object)) => Some(*object),
                _ => None,
            })
            .collect()
    }

    /// Allocates an instance of `class` with every instance field of its superclass chain
    /// zeroed. Does not run constructors.
    pub fn new_object(&mut self, class: &str) -> HeapRef {
        let pool = self.pool;
        let layout: Vec<(&str, &str, TypeKind)> = pool
            .super_chain(class)
            .flat_map(|descriptor| {
                descriptor
                    .instance_fields()
                    .map(move |field| (descriptor.name.as_str(), field.name.as_str(), field.ty.kind()))
            })
            .collect();
        self.heap.alloc_instance(class, layout)
    }

    /// Calls a method by owner, name and descriptor.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the method does not exist, the step budget or the call
    /// depth is exhausted, or the plan misbehaves (reads of unwritten temporaries, kind
    /// mismatches, unbalanced region markers).
    pub fn call(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: &[EmValue],
    ) -> Result<Execution> {
        let pool = self.pool;
        let method = pool
            .get(owner)
            .and_then(|class| class.find_method_by_name(name, descriptor))
            .ok_or_else(|| Error::Emulation(format!("no method {owner}.{name}{descriptor}")))?;

        self.effects.clear();
        let outcome = self.invoke(method, args.to_vec())?;
        Ok(Execution {
            outcome,
            effects: std::mem::take(&mut self.effects),
        })
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(Error::Emulation(format!(
                "step budget of {} exhausted",
                self.config.max_steps
            )));
        }
        Ok(())
    }

    fn plan(&mut self, method: &MethodDescriptor) -> Result<Rc<MethodPlan>> {
        let key = method.display_name();
        if let Some(plan) = self.plans.get(&key) {
            return Ok(plan.clone());
        }
        let plan = match self.config.mode {
            PlanMode::Raw => raw_plan(method)?,
            PlanMode::Allocated => allocate(method)?,
            PlanMode::Stored => method.plan.clone().ok_or_else(|| Error::Unresolved {
                method: key.clone(),
                index: 0,
                instruction: "method body was never analyzed".to_string(),
            })?,
        };
        let plan = Rc::new(plan);
        self.plans.insert(key, plan.clone());
        Ok(plan)
    }

    /// Superclass of `name`, falling back to the runtime's exception hierarchy.
    fn superclass(&self, name: &str) -> Option<String> {
        match self.pool.get(name) {
            Some(class) => class.super_name.clone(),
            None => RUNTIME_EXCEPTIONS
                .iter()
                .find(|(class, _)| *class == name)
                .map(|(_, parent)| (*parent).to_string()),
        }
    }

    /// `true` if an object of class `name` is an instance of class or interface `target`.
    fn is_instance(&self, name: &str, target: &str) -> bool {
        if target == OBJECT_CLASS {
            return true;
        }
        if name.starts_with('[') || target.starts_with('[') {
            return name == target;
        }
        let mut current = Some(name.to_string());
        while let Some(class) = current {
            if class == target {
                return true;
            }
            current = self.superclass(&class);
        }
        self.pool.all_interfaces(name).iter().any(|interface| interface == target)
    }

    fn type_matches(&self, object: HeapRef, ty: &JavaType) -> Result<bool> {
        let class = &self.heap.get(object)?.class;
        Ok(match ty {
            JavaType::Class(name) => self.is_instance(class, name),
            other => *class == other.descriptor(),
        })
    }

    fn raise(&mut self, class: &str) -> StepResult {
        StepResult::Throw(self.new_exception(class))
    }

    /// Allocates an exception the runtime raises itself and records the throw.
    fn new_exception(&mut self, class: &str) -> HeapRef {
        let exception = self.heap.alloc_instance(class, std::iter::empty());
        self.effects.push(Effect::Throw {
            class: class.to_string(),
        });
        exception
    }

    /// Runs the static initializers of `name` and its superclasses once. Returns the
    /// exception an initializer raised.
    ///
    /// An exception escaping an initializer is replaced by an `ExceptionInInitializerError`,
    /// errors propagate unchanged.
    fn ensure_initialized(&mut self, name: &str) -> Result<Option<HeapRef>> {
        if !self.initialized.insert(name.to_string()) {
            return Ok(None);
        }
        let pool = self.pool;
        let Some(class) = pool.get(name) else {
            return Ok(None);
        };
        if let Some(parent) = class.super_name.as_deref() {
            if let Some(exception) = self.ensure_initialized(parent)? {
                return Ok(Some(exception));
            }
        }
        for field in class.static_fields() {
            let value = match &field.constant {
                Some(Constant::Int(value)) => EmValue::Int(*value),
                Some(Constant::Long(value)) => EmValue::Long(*value),
                Some(Constant::Float(value)) => EmValue::Float(*value),
                Some(Constant::Double(value)) => EmValue::Double(*value),
                Some(Constant::String(text)) => EmValue::Ref(Some(self.heap.intern(text))),
                _ => EmValue::zero(field.ty.kind()),
            };
            self.statics
                .insert((class.name.clone(), field.name.clone()), value);
        }
        if let Some(initializer) = class.static_initializer().filter(|method| method.has_code()) {
            if let Outcome::Threw(exception) = self.invoke(initializer, Vec::new())? {
                let thrown = self.heap.get(exception)?.class.clone();
                if !self.is_instance(&thrown, EXCEPTION) {
                    return Ok(Some(exception));
                }
                log::trace!("{thrown} escaped the static initializer of {name}");
                return Ok(Some(self.new_exception(INITIALIZER_ERROR)));
            }
        }
        Ok(None)
    }

    fn invoke(&mut self, method: &'p MethodDescriptor, args: Vec<EmValue>) -> Result<Outcome> {
        if self.depth >= self.config.max_call_depth {
            return Err(Error::Emulation(format!(
                "call depth {} exceeded at {}",
                self.config.max_call_depth,
                method.display_name()
            )));
        }
        if method.is_static() && !method.signature.is_static_initializer() {
            if let Some(exception) = self.ensure_initialized(&method.owner)? {
                return Ok(Outcome::Threw(exception));
            }
        }
        if !method.has_code() {
            let value = method.signature.return_type();
            return Ok(Outcome::Returned(
                (!value.is_void()).then(|| EmValue::zero(value.kind())),
            ));
        }

        let plan = self.plan(method)?;
        self.depth += 1;
        let result = self.execute(method, &plan, args);
        self.depth -= 1;
        result
    }

    fn execute(
        &mut self,
        method: &'p MethodDescriptor,
        plan: &MethodPlan,
        args: Vec<EmValue>,
    ) -> Result<Outcome> {
        let context = MethodContext::new(method, plan);
        let stack_size = method.max_stack.max(plan.max_depth);
        let mut frame = Frame::new(method, stack_size, plan.temps.len());

        let mut local = 0u16;
        let mut args = args.into_iter();
        if !method.is_static() {
            frame.set_local(0, args.next().unwrap_or(EmValue::NULL))?;
            local = 1;
        }
        for param in method.signature.params() {
            let value = args.next().unwrap_or_else(|| EmValue::zero(param.kind()));
            frame.set_local(local, value)?;
            local += param.kind().local_size();
        }

        let mut pc = 0usize;
        loop {
            let Some(instruction) = method.instructions.get(pc) else {
                return Err(Error::Emulation(format!(
                    "control left the end of {}",
                    method.display_name()
                )));
            };
            self.tick()?;

            let run = plan.run_containing(pc);
            if let Some(run) = run.filter(|run| run.flushes_before(pc)) {
                frame.flush(run)?;
            }

            match self.step(&context, &mut frame, pc, instruction)? {
                StepResult::Continue => {
                    if let Some(run) = run.filter(|run| run.flushes_after(pc)) {
                        if instruction.falls_through() {
                            frame.flush(run)?;
                        }
                    }
                    pc += 1;
                }
                StepResult::Jump(target) => pc = target,
                StepResult::Return(value) => {
                    self.effects.push(Effect::Return(value));
                    return Ok(Outcome::Returned(value));
                }
                StepResult::Throw(exception) => {
                    match self.catch(&context, &mut frame, exception)? {
                        Some(target) => pc = target,
                        None => return Ok(Outcome::Threw(exception)),
                    }
                }
            }
        }
    }

    /// Unwinds the frame's exception frames to the innermost matching handler.
    fn catch(
        &mut self,
        context: &MethodContext<'_>,
        frame: &mut Frame,
        exception: HeapRef,
    ) -> Result<Option<usize>> {
        let class = self.heap.get(exception)?.class.clone();
        while let Some(scope) = frame.handlers.pop() {
            let region = context.region(scope)?;
            if !self.is_instance(&class, region.caught_class()) {
                continue;
            }
            frame.write(Operand::Slot(0), EmValue::Ref(Some(exception)))?;
            let target = match region.handler_route {
                Some(route) => {
                    frame.raise_bypass(route.flag)?;
                    context.destination(route.via)?
                }
                None => context.method.position_of(&context.labels, region.handler)?,
            };
            log::trace!("{} caught by region {scope}", class);
            return Ok(Some(target));
        }
        Ok(None)
    }

    fn jump(
        context: &MethodContext<'_>,
        frame: &mut Frame,
        target: &JumpTarget,
    ) -> Result<StepResult> {
        let position = match target.route {
            Some(route) => {
                frame.raise_bypass(route.flag)?;
                context.destination(route.via)?
            }
            None => context.method.position_of(&context.labels, target.label)?,
        };
        Ok(StepResult::Jump(position))
    }

    fn bypasses(
        context: &MethodContext<'_>,
        frame: &mut Frame,
        bypasses: &[Bypass],
    ) -> Result<StepResult> {
        for bypass in bypasses {
            if frame.take_bypass(bypass.flag, bypass.last)? {
                return Ok(StepResult::Jump(context.destination(bypass.next)?));
            }
        }
        Ok(StepResult::Continue)
    }

    fn step(
        &mut self,
        context: &MethodContext<'_>,
        frame: &mut Frame,
        index: usize,
        instruction: &'p Instruction,
    ) -> Result<StepResult> {
        match &instruction.kind {
            InstructionKind::Label(_) | InstructionKind::LineNumber(_) => {
                return Ok(StepResult::Continue)
            }
            InstructionKind::ScopeEnter(scope) => {
                let region = context.region(*scope)?;
                frame.handlers.push(*scope);
                self.effects.push(Effect::Enter(*scope));
                return Self::bypasses(context, frame, &region.enter_bypasses);
            }
            InstructionKind::ScopeExit(scope) => {
                let region = context.region(*scope)?;
                match frame.handlers.pop() {
                    Some(top) if top == *scope => {}
                    top => {
                        return Err(Error::Emulation(format!(
                            "exit of region {scope} in {} while {top:?} is innermost",
                            context.method.display_name()
                        )))
                    }
                }
                self.effects.push(Effect::Exit(*scope));
                return Self::bypasses(context, frame, &region.exit_bypasses);
            }
            _ => {}
        }

        // unreachable code has no plan entry
        let Some(Some(lowered)) = context.plan.lowered.get(index) else {
            return Ok(StepResult::Continue);
        };
        if lowered.elided {
            return Ok(StepResult::Continue);
        }
        let io = instruction
            .io()
            .ok_or_else(|| context.unresolved(index, instruction))?;
        if lowered.inputs.len() != io.inputs.len() || lowered.outputs.len() != io.outputs.len() {
            return Err(context.unresolved(index, instruction));
        }
        let inputs = lowered
            .inputs
            .iter()
            .zip(&io.inputs)
            .map(|(operand, ty)| frame.read(*operand, ty.stack_kind()))
            .collect::<Result<Vec<_>>>()?;

        let input = |position: usize| -> Result<EmValue> {
            inputs
                .get(position)
                .copied()
                .ok_or_else(|| context.unresolved(index, instruction))
        };
        let produced = match &instruction.kind {
            InstructionKind::Simple(opcode) => {
                if opcode.category() == Category::Stack {
                    for (output, source) in lowered
                        .outputs
                        .iter()
                        .zip(stack_shuffle(*opcode, &io.inputs))
                    {
                        frame.write(*output, input(source)?)?;
                    }
                    return Ok(StepResult::Continue);
                }
                self.simple(*opcode, &inputs)?
            }
            InstructionKind::Integer { opcode, value } => match opcode {
                Opcode::Newarray => {
                    let kind = TypeKind::from_array_code(*value)
                        .ok_or_else(|| malformed_error!("Invalid newarray type code {}", value))?;
                    self.new_array(JavaType::Primitive(kind), input(0)?)?
                }
                _ => Produced::Value(EmValue::Int(*value)),
            },
            InstructionKind::Constant(constant) => match Literal::of(&instruction.kind) {
                Some(literal) => Produced::Value(literal.into()),
                None => Produced::Value(self.constant(constant)),
            },
            InstructionKind::Variable { opcode, local } => {
                if opcode.category() == Category::Load {
                    let kind = io.outputs.first().map_or(TypeKind::Int, JavaType::stack_kind);
                    Produced::Value(frame.local(*local, kind)?)
                } else {
                    frame.set_local(*local, input(0)?)?;
                    Produced::Nothing
                }
            }
            InstructionKind::Increment { local, amount } => {
                let value = frame.local(*local, TypeKind::Int)?.as_int()?;
                frame.set_local(*local, EmValue::Int(value.wrapping_add(i32::from(*amount))))?;
                Produced::Nothing
            }
            InstructionKind::Type { opcode, ty } => self.type_operation(*opcode, ty, &inputs)?,
            InstructionKind::Field { opcode, field } => self.field_access(*opcode, field, &inputs)?,
            InstructionKind::Invoke { opcode, method } => self.invocation(*opcode, method, inputs.clone())?,
            InstructionKind::Lambda(site) => self.lambda(site, &inputs)?,
            InstructionKind::StringConcat { recipe, args } => {
                let text = self.concat(recipe, args, &inputs)?;
                Produced::Value(EmValue::Ref(Some(self.heap.alloc_string(text))))
            }
            InstructionKind::MultiArray { ty, .. } => {
                let counts = inputs
                    .iter()
                    .map(EmValue::as_int)
                    .collect::<Result<Vec<_>>>()?;
                if counts.iter().any(|count| *count < 0) {
                    Produced::Step(self.raise(NEGATIVE_SIZE))
                } else {
                    Produced::Value(EmValue::Ref(Some(self.multi_array(ty, &counts)?)))
                }
            }
            InstructionKind::Jump { opcode, target } => {
                if opcode.category() == Category::Goto || arith::condition(*opcode, &inputs)? {
                    return Self::jump(context, frame, target);
                }
                Produced::Nothing
            }
            InstructionKind::Switch {
                keys,
                targets,
                default,
            } => {
                let key = input(0)?.as_int()?;
                let target = keys
                    .iter()
                    .position(|candidate| *candidate == key)
                    .and_then(|position| targets.get(position))
                    .unwrap_or(default);
                return Self::jump(context, frame, target);
            }
            InstructionKind::Label(_)
            | InstructionKind::LineNumber(_)
            | InstructionKind::ScopeEnter(_)
            | InstructionKind::ScopeExit(_) => Produced::Nothing,
        };

        match produced {
            Produced::Nothing => Ok(StepResult::Continue),
            Produced::Value(value) => {
                if let Some(output) = lowered.outputs.first() {
                    frame.write(*output, value)?;
                }
                Ok(StepResult::Continue)
            }
            Produced::Step(step) => Ok(step),
        }
    }

    fn simple(&mut self, opcode: Opcode, inputs: &[EmValue]) -> Result<Produced> {
        let operand = |position: usize| {
            inputs.get(position).copied().ok_or_else(|| {
                Error::Emulation(format!("{} is missing an operand", opcode.mnemonic()))
            })
        };

        Ok(match opcode.category() {
            Category::Nop => Produced::Nothing,
            Category::Constant => match Literal::of(&InstructionKind::Simple(opcode)) {
                Some(literal) => Produced::Value(literal.into()),
                None => return Err(unsupported_error!("{} in emulation", opcode.mnemonic())),
            },
            Category::ArrayLoad => {
                let (array, index) = (operand(0)?.as_ref()?, operand(1)?.as_int()?);
                match self.element(array, index)? {
                    Ok(value) => {
                        if let Some(array) = array {
                            self.effects.push(Effect::ArrayRead { array, index, value });
                        }
                        Produced::Value(value)
                    }
                    Err(exception) => Produced::Step(self.raise(exception)),
                }
            }
            Category::ArrayStore => {
                let (array, index) = (operand(0)?.as_ref()?, operand(1)?.as_int()?);
                match self.set_element(array, index, operand(2)?)? {
                    Ok(value) => {
                        if let Some(array) = array {
                            self.effects.push(Effect::ArrayWrite { array, index, value });
                        }
                        Produced::Nothing
                    }
                    Err(exception) => Produced::Step(self.raise(exception)),
                }
            }
            Category::Binary => match arith::binary(opcode, operand(0)?, operand(1)?)? {
                Arith::Value(value) => Produced::Value(value),
                Arith::DivideByZero => Produced::Step(self.raise(ARITHMETIC)),
            },
            Category::Unary if opcode == Opcode::Arraylength => match operand(0)?.as_ref()? {
                Some(array) => match &self.heap.get(array)?.body {
                    ObjectBody::Array { elements, .. } => {
                        Produced::Value(EmValue::Int(i32::try_from(elements.len()).unwrap_or(i32::MAX)))
                    }
                    _ => return Err(Error::Emulation(format!("arraylength of non-array {array}"))),
                },
                None => Produced::Step(self.raise(NULL_POINTER)),
            },
            Category::Unary => Produced::Value(arith::unary(opcode, operand(0)?)?),
            Category::Return => Produced::Step(StepResult::Return(inputs.first().copied())),
            Category::Throw => match operand(0)?.as_ref()? {
                Some(exception) => {
                    let class = self.heap.get(exception)?.class.clone();
                    self.effects.push(Effect::Throw { class });
                    Produced::Step(StepResult::Throw(exception))
                }
                None => Produced::Step(self.raise(NULL_POINTER)),
            },
            Category::Monitor => match operand(0)?.as_ref()? {
                Some(_) => Produced::Nothing,
                None => Produced::Step(self.raise(NULL_POINTER)),
            },
            _ => return Err(unsupported_error!("{} in emulation", opcode.mnemonic())),
        })
    }

    /// Reads an element, or names the exception the access raises.
    fn element(&self, array: Option<HeapRef>, index: i32) -> Result<std::result::Result<EmValue, &'static str>> {
        let Some(array) = array else {
            return Ok(Err(NULL_POINTER));
        };
        match &self.heap.get(array)?.body {
            ObjectBody::Array { elements, .. } => Ok(usize::try_from(index)
                .ok()
                .and_then(|index| elements.get(index))
                .copied()
                .ok_or(ARRAY_INDEX)),
            _ => Err(Error::Emulation(format!("element read from non-array {array}"))),
        }
    }

    /// Writes an element and returns the stored value, or names the exception the access raises.
    fn set_element(
        &mut self,
        array: Option<HeapRef>,
        index: i32,
        value: EmValue,
    ) -> Result<std::result::Result<EmValue, &'static str>> {
        let Some(array) = array else {
            return Ok(Err(NULL_POINTER));
        };
        match &mut self.heap.get_mut(array)?.body {
            ObjectBody::Array { element, elements } => {
                let value = value.narrow(element.kind());
                match usize::try_from(index).ok().and_then(|index| elements.get_mut(index)) {
                    Some(slot) => {
                        *slot = value;
                        Ok(Ok(value))
                    }
                    None => Ok(Err(ARRAY_INDEX)),
                }
            }
            _ => Err(Error::Emulation(format!("element write to non-array {array}"))),
        }
    }

    fn new_array(&mut self, element: JavaType, length: EmValue) -> Result<Produced> {
        let length = length.as_int()?;
        Ok(match usize::try_from(length) {
            Ok(length) => Produced::Value(EmValue::Ref(Some(self.heap.alloc_array(element, length)))),
            Err(_) => Produced::Step(self.raise(NEGATIVE_SIZE)),
        })
    }

    fn multi_array(&mut self, ty: &JavaType, counts: &[i32]) -> Result<HeapRef> {
        let element = ty
            .element()
            .ok_or_else(|| Error::Emulation(format!("multianewarray of non-array {ty}")))?;
        let (first, rest) = counts
            .split_first()
            .ok_or_else(|| Error::Emulation("multianewarray without dimensions".to_string()))?;
        let length = usize::try_from(*first).unwrap_or(0);
        let array = self.heap.alloc_array(element.clone(), length);
        if !rest.is_empty() {
            for position in 0..length {
                let inner = self.multi_array(&element, rest)?;
                if let ObjectBody::Array { elements, .. } = &mut self.heap.get_mut(array)?.body {
                    elements[position] = EmValue::Ref(Some(inner));
                }
            }
        }
        Ok(array)
    }

    fn constant(&mut self, constant: &Constant) -> EmValue {
        match constant {
            Constant::Int(value) => EmValue::Int(*value),
            Constant::Long(value) => EmValue::Long(*value),
            Constant::Float(value) => EmValue::Float(*value),
            Constant::Double(value) => EmValue::Double(*value),
            Constant::String(text) => EmValue::Ref(Some(self.heap.intern(text))),
            Constant::Class(ty) => {
                let key = ty.descriptor();
                let object = match self.class_objects.get(&key) {
                    Some(object) => *object,
                    None => {
                        let object = self.heap.alloc_instance(CLASS_CLASS, std::iter::empty());
                        self.class_objects.insert(key, object);
                        object
                    }
                };
                EmValue::Ref(Some(object))
            }
        }
    }

    fn type_operation(&mut self, opcode: Opcode, ty: &JavaType, inputs: &[EmValue]) -> Result<Produced> {
        let operand = || {
            inputs.first().copied().ok_or_else(|| {
                Error::Emulation(format!("{} is missing an operand", opcode.mnemonic()))
            })
        };
        Ok(match opcode {
            Opcode::New => {
                let class = ty
                    .class_reference()
                    .ok_or_else(|| malformed_error!("new of non-class type {}", ty))?;
                if let Some(exception) = self.ensure_initialized(class)? {
                    return Ok(Produced::Step(StepResult::Throw(exception)));
                }
                Produced::Value(EmValue::Ref(Some(self.new_object(class))))
            }
            Opcode::Anewarray => self.new_array(ty.clone(), operand()?)?,
            Opcode::Checkcast => match operand()?.as_ref()? {
                Some(object) if !self.type_matches(object, ty)? => {
                    Produced::Step(self.raise(CLASS_CAST))
                }
                _ => Produced::Value(operand()?),
            },
            Opcode::Instanceof => {
                let matches = match operand()?.as_ref()? {
                    Some(object) => self.type_matches(object, ty)?,
                    None => false,
                };
                Produced::Value(EmValue::Int(i32::from(matches)))
            }
            other => return Err(unsupported_error!("{} with a type operand", other.mnemonic())),
        })
    }

    fn field_access(&mut self, opcode: Opcode, field: &FieldRef, inputs: &[EmValue]) -> Result<Produced> {
        let owner = field.declaring.as_deref().unwrap_or(&field.owner).to_string();
        let name = field.name.clone();
        let kind = field.ty.kind();
        let operand = |position: usize| {
            inputs.get(position).copied().ok_or_else(|| {
                Error::Emulation(format!("{} is missing an operand", opcode.mnemonic()))
            })
        };

        Ok(match opcode {
            Opcode::Getstatic | Opcode::Putstatic => {
                if let Some(exception) = self.ensure_initialized(&owner)? {
                    return Ok(Produced::Step(StepResult::Throw(exception)));
                }
                let key = (owner.clone(), name.clone());
                if opcode == Opcode::Getstatic {
                    let value = self
                        .statics
                        .get(&key)
                        .copied()
                        .unwrap_or_else(|| EmValue::zero(kind));
                    self.effects.push(Effect::StaticRead { owner, name, value });
                    Produced::Value(value)
                } else {
                    let value = operand(0)?.narrow(kind);
                    self.statics.insert(key, value);
                    self.effects.push(Effect::StaticWrite { owner, name, value });
                    Produced::Nothing
                }
            }
            Opcode::Getfield => match operand(0)?.as_ref()? {
                Some(object) => {
                    let value = self.heap.field(object, &owner, &name, kind)?;
                    self.effects.push(Effect::FieldRead { owner, name, object, value });
                    Produced::Value(value)
                }
                None => Produced::Step(self.raise(NULL_POINTER)),
            },
            Opcode::Putfield => match operand(0)?.as_ref()? {
                Some(object) => {
                    let value = operand(1)?.narrow(kind);
                    self.heap.set_field(object, &owner, &name, value)?;
                    self.effects.push(Effect::FieldWrite { owner, name, object, value });
                    Produced::Nothing
                }
                None => Produced::Step(self.raise(NULL_POINTER)),
            },
            other => return Err(unsupported_error!("{} with a field operand", other.mnemonic())),
        })
    }

    /// Finds the body a call site reaches for the given receiver class.
    fn dispatch(&self, method: &MethodRef, receiver: Option<&str>) -> Option<&'p MethodDescriptor> {
        let pool = self.pool;
        let signature = &method.signature;
        let declared_in_chain = |class: &str| {
            pool.super_chain(class)
                .find_map(|descriptor| descriptor.find_method(signature))
        };

        match (&method.dispatch, receiver) {
            (Some(Dispatch::Virtual { owner, slot }), receiver) => {
                let layout = receiver
                    .and_then(|name| pool.get(name))
                    .filter(|class| class.vtable.len() > *slot)
                    .or_else(|| pool.get(owner))?;
                let entry = layout.vtable.get(*slot)?;
                pool.get(&entry.owner)?.find_method(&entry.signature)
            }
            (Some(Dispatch::Interface { owner, .. }), receiver) => {
                let implementation = receiver.and_then(|name| {
                    pool.super_chain(name)
                        .filter_map(|class| class.find_method(signature))
                        .find(|candidate| !candidate.is_abstract())
                        .or_else(|| {
                            pool.all_interfaces(name).iter().find_map(|interface| {
                                pool.get(interface)
                                    .and_then(|class| class.find_method(signature))
                                    .filter(|candidate| candidate.has_code())
                            })
                        })
                });
                implementation.or_else(|| pool.get(owner)?.find_method(signature))
            }
            (Some(Dispatch::Direct { owner }), _) => declared_in_chain(owner),
            (None, _) => declared_in_chain(&method.owner),
        }
    }

    fn invocation(&mut self, opcode: Opcode, method: &MethodRef, args: Vec<EmValue>) -> Result<Produced> {
        let receiver = if opcode == Opcode::Invokestatic {
            None
        } else {
            match args.first().copied().map(|value| value.as_ref()).transpose()? {
                Some(Some(receiver)) => Some(receiver),
                _ if opcode == Opcode::Invokespecial => None,
                _ => return Ok(Produced::Step(self.raise(NULL_POINTER))),
            }
        };
        let receiver_class = receiver
            .map(|object| self.heap.get(object).map(|object| object.class.clone()))
            .transpose()?;

        let target = self.dispatch(method, receiver_class.as_deref());
        let name = target.map_or_else(
            || format!("{}.{}", method.owner, method.signature),
            MethodDescriptor::display_name,
        );
        self.effects.push(Effect::Call {
            method: name,
            args: args.clone(),
        });

        let outcome = match target {
            Some(target) => self.invoke(target, args)?,
            None => {
                log::trace!("no body for {}.{}", method.owner, method.signature);
                let ty = method.signature.return_type();
                Outcome::Returned((!ty.is_void()).then(|| EmValue::zero(ty.kind())))
            }
        };
        Ok(match outcome {
            Outcome::Returned(Some(value)) => Produced::Value(value),
            Outcome::Returned(None) => Produced::Nothing,
            Outcome::Threw(exception) => Produced::Step(StepResult::Throw(exception)),
        })
    }

    fn lambda(&mut self, site: &LambdaSite, inputs: &[EmValue]) -> Result<Produced> {
        if let Some(exception) = self.ensure_initialized(&site.proxy)? {
            return Ok(Produced::Step(StepResult::Throw(exception)));
        }
        let proxy = self.new_object(&site.proxy);
        for (position, value) in inputs.iter().enumerate() {
            self.heap
                .set_field(proxy, &site.proxy, &format!("field{position}"), *value)?;
        }
        Ok(Produced::Value(EmValue::Ref(Some(proxy))))
    }

    fn concat(&self, recipe: &str, args: &[JavaType], inputs: &[EmValue]) -> Result<String> {
        let mut text = String::new();
        let mut values = args.iter().zip(inputs);
        for c in recipe.chars() {
            if c != '\u{1}' {
                text.push(c);
                continue;
            }
            let Some((ty, value)) = values.next() else {
                return Err(Error::Emulation(format!("concat recipe {recipe:?} has too few arguments")));
            };
            match (ty.kind(), value) {
                (TypeKind::Boolean, EmValue::Int(value)) => text.push_str(if *value != 0 { "true" } else { "false" }),
                (TypeKind::Char, EmValue::Int(value)) => {
                    text.push(char::from_u32(*value as u32 & 0xffff).unwrap_or('\u{fffd}'));
                }
                (_, EmValue::Int(value)) => text.push_str(&value.to_string()),
                (_, EmValue::Long(value)) => text.push_str(&value.to_string()),
                (_, EmValue::Float(value)) => text.push_str(&format!("{value:?}")),
                (_, EmValue::Double(value)) => text.push_str(&format!("{value:?}")),
                (_, EmValue::Ref(None)) => text.push_str("null"),
                (_, EmValue::Ref(Some(object))) => match self.heap.text(*object) {
                    Some(string) => text.push_str(string),
                    None => text.push_str(&format!(
                        "{}@{}",
                        self.heap.get(*object)?.class.replace('/', "."),
                        object.index()
                    )),
                },
            }
        }
        Ok(text)
    }
}

/// What an operation produced.
enum Produced {
    Nothing,
    Value(EmValue),
    Step(StepResult),
}
