//! Method bodies.
//!
//! Each method with code becomes one native function. Locals and the operand stack share a
//! zeroed `jtype` array, `frame`, whose first `max_locals` entries are the locals and whose
//! remainder is addressed as `stack`. When the method registers a stack frame with the
//! runtime, that array is what the collector scans for roots and what `setjmp` landing pads
//! read the caught exception back from, so it is declared `volatile`.
//!
//! Operands come from the method's [`MethodPlan`]: positional slots (`stack[n]`), run-local
//! temporaries (`tN`, all declared at the top so no jump crosses an initialization) or
//! literals. Protected regions render as `try_N` / `exit_N` labels around the runtime's
//! exception frame stack, with bypass flags steering jumps through them.

use std::fmt::Write;

use crate::{
    alloc::{Literal, MethodPlan, Operand, RunPlan},
    analysis::stack_shuffle,
    config::CompilerConfig,
    emit::{
        header::prototype,
        literal::{constant_expression, int_literal, render_literal, string_literal, string_object},
        ops,
    },
    ir::{
        names::{
            class_object_symbol, field_symbol, function_type_symbol, interface_index_symbol,
            method_symbol, qualified_name, vtable_index_symbol,
        },
        Bypass, Category, ClassDescriptor, Constant, Dispatch, FieldRef, Instruction,
        InstructionIo, InstructionKind, JavaType, JumpTarget, LambdaSite, MethodDescriptor,
        MethodRef, MethodSignature, Opcode, ScopeId, TryCatchRegion, TypeKind, OBJECT_CLASS,
    },
    Error, Result,
};

/// Class whose instances a failing static initializer wraps.
pub(super) const INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";
/// Exceptions of this class escaping a static initializer are wrapped, errors pass through.
pub(super) const WRAPPED_EXCEPTION: &str = "java/lang/Exception";

/// Function holding the body of a class's `<clinit>`, called from `clinit_<class>`.
pub(super) fn initializer_body_symbol(class: &str) -> String {
    format!("clinitBody_{}", qualified_name(class))
}

/// Renders `clinit_<class>`.
///
/// The function runs once. It initializes the super class and the string constants of static
/// fields, then calls the `<clinit>` body if the class has one. Primitive constants are
/// initialized in the static field definitions instead.
///
/// With a body, everything after the guard runs under an exception frame: a
/// `java/lang/Exception` escaping it is rethrown as an `ExceptionInInitializerError` carrying
/// the original as its cause.
pub(super) fn write_clinit(out: &mut String, class: &ClassDescriptor, has_body: bool) -> Result<()> {
    let name = class.qualified_name();
    writeln!(out, "void clinit_{name}(jcontext ctx) {{")?;
    writeln!(out, "    static bool initialized;")?;
    writeln!(out, "    if (initialized) return;")?;
    writeln!(out, "    initialized = true;")?;
    if has_body {
        let error = qualified_name(INITIALIZER_ERROR);
        let constructor = MethodSignature::new("<init>", "(Ljava/lang/Throwable;)V")?;
        writeln!(out, "    volatile jtype frame[2] {{}};")?;
        writeln!(
            out,
            "    auto frameRef = pushStackFrame(ctx, 2, (const jtype *) frame, {}, nullptr);",
            string_literal(&format!("{}.<clinit>()V", class.name.replace('/', ".")))
        )?;
        writeln!(
            out,
            "    if (setjmp(*pushExceptionFrame(frameRef, &{}))) {{",
            class_object_symbol(WRAPPED_EXCEPTION)
        )?;
        writeln!(out, "        frame[0].o = popExceptionFrame(frameRef);")?;
        writeln!(
            out,
            "        frame[1].o = (clinit_{error}(ctx), gcAlloc(ctx, &class_{error}));"
        )?;
        writeln!(
            out,
            "        {}(ctx, frame[1].o, frame[0].o);",
            method_symbol(INITIALIZER_ERROR, &constructor, false)
        )?;
        writeln!(out, "        throwException(ctx, frame[1].o);")?;
        writeln!(out, "    }}")?;
    }
    if let Some(parent) = class.super_name.as_deref().filter(|name| *name != OBJECT_CLASS) {
        writeln!(out, "    clinit_{}(ctx);", qualified_name(parent))?;
    }
    for field in class.static_fields() {
        if let Some(Constant::String(text)) = &field.constant {
            writeln!(
                out,
                "    {} = {};",
                field_symbol(&class.name, &field.name, true),
                string_object(text)
            )?;
        }
    }
    if has_body {
        writeln!(out, "    {}(ctx);", initializer_body_symbol(&class.name))?;
        writeln!(out, "    popExceptionFrame(frameRef);")?;
        writeln!(out, "    popStackFrame(ctx);")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}

/// `true` if any local or stack value of the method can be a reference.
fn holds_references(method: &MethodDescriptor) -> bool {
    !method.is_static()
        || method.signature.params().iter().any(JavaType::is_reference)
        || method.instructions.iter().filter_map(Instruction::io).any(|io| {
            io.below.contains(&TypeKind::Object)
                || io.inputs.iter().chain(&io.outputs).any(JavaType::is_reference)
        })
}

/// `true` if the method registers its frame with the runtime.
///
/// A frame is needed for stack traces, for exception landing pads, to release the monitor of
/// a synchronized method during unwinding and to expose references to the collector.
pub(super) fn pushes_frame(config: &CompilerConfig, method: &MethodDescriptor) -> bool {
    config.use_stack_traces
        || !method.regions.is_empty()
        || method.is_synchronized()
        || holds_references(method)
}

/// Renders the native function of a method with code.
///
/// # Errors
///
/// Returns [`crate::Error::Unresolved`] if the method was never analyzed or an instruction
/// lacks resolved operands, and [`crate::Error::NotSupported`] for instructions that cannot be
/// rendered.
pub(super) fn render_method(
    out: &mut String,
    config: &CompilerConfig,
    class: &ClassDescriptor,
    method: &MethodDescriptor,
) -> Result<()> {
    let plan = method.plan.as_ref().ok_or_else(|| Error::Unresolved {
        method: method.display_name(),
        index: 0,
        instruction: "method body was never analyzed".to_string(),
    })?;

    let monitor = method.is_synchronized().then(|| {
        if method.is_static() {
            format!("(jobject) &{}", class_object_symbol(&method.owner))
        } else {
            "self".to_string()
        }
    });
    let writer = BodyWriter {
        config,
        method,
        plan,
        frame: pushes_frame(config, method),
        monitor,
    };

    if method.signature.is_static_initializer() {
        writeln!(out, "static void {}(jcontext ctx) {{", initializer_body_symbol(&class.name))?;
    } else {
        writeln!(out, "{} {{", prototype(method))?;
    }
    if method.is_static() && !method.signature.is_static_initializer() {
        writeln!(out, "    clinit_{}(ctx);", qualified_name(&method.owner))?;
    }
    writer.prologue(out)?;
    for (index, instruction) in method.instructions.iter().enumerate() {
        writer.instruction(out, index, instruction)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}

fn operand(operand: Operand, kind: TypeKind) -> String {
    match operand {
        Operand::Slot(slot) => format!("stack[{slot}].{}", kind.union_member()),
        Operand::Temp(temp) => format!("t{temp}"),
        Operand::Literal(literal) => render_literal(literal),
    }
}

fn jump(target: &JumpTarget) -> String {
    match target.route {
        Some(route) => format!("{{ bypasses[{}] = true; goto {}; }}", route.flag, route.via),
        None => format!("goto L{};", target.label),
    }
}

struct BodyWriter<'m> {
    config: &'m CompilerConfig,
    method: &'m MethodDescriptor,
    plan: &'m MethodPlan,
    frame: bool,
    monitor: Option<String>,
}

impl BodyWriter<'_> {
    fn stack_size(&self) -> u16 {
        self.method.max_stack.max(self.plan.max_depth).max(1)
    }

    fn prologue(&self, out: &mut String) -> Result<()> {
        let locals = self.method.max_locals;
        let size = u32::from(locals) + u32::from(self.stack_size());
        writeln!(out, "    volatile jtype frame[{size}] {{}};")?;
        writeln!(out, "    volatile jtype *stack = frame + {locals};")?;
        for (temp, kind) in self.plan.temps.iter().enumerate() {
            writeln!(out, "    {} t{temp};", kind.c_type())?;
        }
        if self.method.bypass_count > 0 {
            writeln!(out, "    volatile bool bypasses[{}] {{}};", self.method.bypass_count)?;
        }

        let mut local = 0u16;
        if !self.method.is_static() {
            writeln!(out, "    frame[0].o = self;")?;
            local = 1;
        }
        for (index, param) in self.method.signature.params().iter().enumerate() {
            writeln!(
                out,
                "    frame[{local}].{} = p{index};",
                param.kind().union_member()
            )?;
            local += param.kind().local_size();
        }

        if self.frame {
            let name = format!(
                "{}.{}{}",
                self.method.owner.replace('/', "."),
                self.method.signature.name(),
                self.method.signature.descriptor()
            );
            writeln!(
                out,
                "    auto frameRef = pushStackFrame(ctx, {size}, (const jtype *) frame, {}, {});",
                string_literal(&name),
                self.monitor.as_deref().unwrap_or("nullptr")
            )?;
        }
        if let Some(monitor) = &self.monitor {
            writeln!(out, "    monitorEnter(ctx, {monitor});")?;
        }
        Ok(())
    }

    fn unresolved(&self, index: usize, instruction: &Instruction) -> Error {
        Error::Unresolved {
            method: self.method.display_name(),
            index,
            instruction: instruction.to_string(),
        }
    }

    fn region(&self, scope: ScopeId) -> Result<&TryCatchRegion> {
        self.method.regions.get(scope as usize).ok_or_else(|| {
            Error::Error(format!(
                "Unknown protected region {scope} in {}",
                self.method.display_name()
            ))
        })
    }

    fn instruction(&self, out: &mut String, index: usize, instruction: &Instruction) -> Result<()> {
        let run = self.plan.run_containing(index);
        if let Some(run) = run.filter(|run| run.flushes_before(index)) {
            Self::flush(out, run)?;
        }

        match &instruction.kind {
            InstructionKind::Label(label) => writeln!(out, "L{label}:;")?,
            InstructionKind::LineNumber(line) => {
                if self.frame && self.config.use_line_numbers {
                    writeln!(out, "    frameRef->lineNumber = {line};")?;
                }
            }
            InstructionKind::ScopeEnter(scope) => self.scope_enter(out, *scope)?,
            InstructionKind::ScopeExit(scope) => self.scope_exit(out, *scope)?,
            _ => {
                // unreachable code has no plan entry and is dropped
                if let Some(Some(lowered)) = self.plan.lowered.get(index) {
                    if !lowered.elided {
                        let io = instruction
                            .io()
                            .ok_or_else(|| self.unresolved(index, instruction))?;
                        if lowered.inputs.len() != io.inputs.len()
                            || lowered.outputs.len() != io.outputs.len()
                        {
                            return Err(self.unresolved(index, instruction));
                        }
                        let inputs: Vec<String> = lowered
                            .inputs
                            .iter()
                            .zip(&io.inputs)
                            .map(|(op, ty)| operand(*op, ty.stack_kind()))
                            .collect();
                        let outputs: Vec<String> = lowered
                            .outputs
                            .iter()
                            .zip(&io.outputs)
                            .map(|(op, ty)| operand(*op, ty.stack_kind()))
                            .collect();
                        self.operation(out, index, instruction, io, &inputs, &outputs)?;
                    }
                }
            }
        }

        if let Some(run) = run.filter(|run| run.flushes_after(index)) {
            if instruction.falls_through() {
                Self::flush(out, run)?;
            }
        }
        Ok(())
    }

    /// Restores the positional layout at the end of a run.
    fn flush(out: &mut String, run: &RunPlan) -> Result<()> {
        for capture in &run.captures {
            writeln!(
                out,
                "    t{} = stack[{}].{};",
                capture.temp,
                capture.slot,
                capture.kind.union_member()
            )?;
        }
        for move_ in &run.moves {
            writeln!(
                out,
                "    stack[{}].{} = {};",
                move_.dest,
                move_.kind.union_member(),
                operand(move_.source, move_.kind)
            )?;
        }
        Ok(())
    }

    fn bypasses(out: &mut String, bypasses: &[Bypass]) -> Result<()> {
        for bypass in bypasses {
            if bypass.last {
                writeln!(
                    out,
                    "    if (bypasses[{flag}]) {{ bypasses[{flag}] = false; goto {}; }}",
                    bypass.next,
                    flag = bypass.flag
                )?;
            } else {
                writeln!(out, "    if (bypasses[{}]) goto {};", bypass.flag, bypass.next)?;
            }
        }
        Ok(())
    }

    fn scope_enter(&self, out: &mut String, scope: ScopeId) -> Result<()> {
        let region = self.region(scope)?;
        writeln!(out, "try_{scope}:")?;
        writeln!(
            out,
            "    if (setjmp(*pushExceptionFrame(frameRef, &{}))) {{",
            class_object_symbol(region.caught_class())
        )?;
        writeln!(out, "        stack[0].o = popExceptionFrame(frameRef);")?;
        match region.handler_route {
            Some(route) => writeln!(
                out,
                "        bypasses[{}] = true;\n        goto {};",
                route.flag, route.via
            )?,
            None => writeln!(out, "        goto L{};", region.handler)?,
        }
        writeln!(out, "    }}")?;
        Self::bypasses(out, &region.enter_bypasses)
    }

    fn scope_exit(&self, out: &mut String, scope: ScopeId) -> Result<()> {
        let region = self.region(scope)?;
        writeln!(out, "exit_{scope}:")?;
        writeln!(out, "    popExceptionFrame(frameRef);")?;
        Self::bypasses(out, &region.exit_bypasses)
    }

    fn assign(out: &mut String, outputs: &[String], expression: &str) -> Result<()> {
        match outputs.first() {
            Some(dest) => writeln!(out, "    {dest} = {expression};")?,
            None => writeln!(out, "    {expression};")?,
        }
        Ok(())
    }

    fn checked(&self, object: &str) -> String {
        if self.config.use_value_checks {
            format!("NULL_CHECK({object})")
        } else {
            object.to_string()
        }
    }

    fn operation(
        &self,
        out: &mut String,
        index: usize,
        instruction: &Instruction,
        io: &InstructionIo,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        let input = |position: usize| -> Result<&String> {
            inputs
                .get(position)
                .ok_or_else(|| self.unresolved(index, instruction))
        };

        match &instruction.kind {
            InstructionKind::Simple(opcode) => {
                self.simple(out, *opcode, io, inputs, outputs)
                    .and_then(|handled| {
                        if handled {
                            Ok(())
                        } else {
                            Err(unsupported_error!(
                                "{} in {}",
                                opcode.mnemonic(),
                                self.method.display_name()
                            ))
                        }
                    })
            }
            InstructionKind::Integer { opcode, value } => match opcode {
                Opcode::Newarray => {
                    let kind = TypeKind::from_array_code(*value)
                        .ok_or_else(|| malformed_error!("Invalid newarray type code {}", value))?;
                    Self::assign(
                        out,
                        outputs,
                        &format!(
                            "(jobject) createArray(ctx, &class_{}, {})",
                            kind.java_name(),
                            input(0)?
                        ),
                    )
                }
                _ => Self::assign(out, outputs, &int_literal(*value)),
            },
            InstructionKind::Constant(constant) => {
                let expression = match Literal::of(&instruction.kind) {
                    Some(literal) => render_literal(literal),
                    None => constant_expression(constant),
                };
                Self::assign(out, outputs, &expression)
            }
            InstructionKind::Variable { opcode, local } => {
                if opcode.category() == Category::Load {
                    let kind = io.outputs.first().map_or(TypeKind::Int, JavaType::stack_kind);
                    Self::assign(out, outputs, &format!("frame[{local}].{}", kind.union_member()))
                } else {
                    let kind = io.inputs.first().map_or(TypeKind::Int, JavaType::stack_kind);
                    writeln!(out, "    frame[{local}].{} = {};", kind.union_member(), input(0)?)?;
                    Ok(())
                }
            }
            InstructionKind::Increment { local, amount } => {
                writeln!(
                    out,
                    "    frame[{local}].i = (jint) ((uint32_t) frame[{local}].i + (uint32_t) {amount});"
                )?;
                Ok(())
            }
            InstructionKind::Type { opcode, ty } => self.type_operation(out, *opcode, ty, inputs, outputs),
            InstructionKind::Field { opcode, field } => {
                self.field_access(out, *opcode, field, inputs, outputs)
            }
            InstructionKind::Invoke { opcode, method } => {
                let call = Self::invocation(*opcode, method, inputs);
                Self::assign(out, outputs, &call)
            }
            InstructionKind::Lambda(site) => Self::lambda(out, site, io, inputs, outputs),
            InstructionKind::StringConcat { recipe, args } => {
                let mut call = format!(
                    "(jobject) concatStringsRecipe(ctx, {}, {}",
                    string_literal(recipe),
                    args.len()
                );
                for (ty, value) in args.iter().zip(inputs) {
                    call.push_str(", ");
                    call.push_str(&ops::concat_argument(ty, value));
                }
                call.push(')');
                Self::assign(out, outputs, &call)
            }
            InstructionKind::MultiArray { ty, dimensions } => {
                Self::multi_array(out, ty, *dimensions, inputs, outputs)
            }
            InstructionKind::Jump { opcode, target } => {
                if opcode.category() == Category::Goto {
                    writeln!(out, "    {}", jump(target))?;
                } else {
                    let condition = ops::condition(*opcode, inputs)
                        .ok_or_else(|| self.unresolved(index, instruction))?;
                    writeln!(out, "    if ({condition}) {}", jump(target))?;
                }
                Ok(())
            }
            InstructionKind::Switch {
                keys,
                targets,
                default,
            } => {
                writeln!(out, "    switch ({}) {{", input(0)?)?;
                for (key, target) in keys.iter().zip(targets) {
                    writeln!(out, "        case {}: {}", int_literal(*key), jump(target))?;
                }
                writeln!(out, "        default: {}", jump(default))?;
                writeln!(out, "    }}")?;
                Ok(())
            }
            InstructionKind::Label(_)
            | InstructionKind::LineNumber(_)
            | InstructionKind::ScopeEnter(_)
            | InstructionKind::ScopeExit(_) => Ok(()),
        }
    }

    /// Renders an operand-free opcode, `false` if the opcode has no rendering.
    fn simple(
        &self,
        out: &mut String,
        opcode: Opcode,
        io: &InstructionIo,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<bool> {
        let a = inputs.first().map_or("", String::as_str);
        let b = inputs.get(1).map_or("", String::as_str);

        match opcode.category() {
            Category::Nop => {}
            Category::Constant => match Literal::of(&InstructionKind::Simple(opcode)) {
                Some(literal) => Self::assign(out, outputs, &render_literal(literal))?,
                None => return Ok(false),
            },
            Category::ArrayLoad => {
                let array = io.inputs.first().cloned().unwrap_or_else(JavaType::object);
                let element = ops::element_type(opcode, &array);
                let value = ops::array_element(element, a, b, self.config.use_value_checks);
                Self::assign(out, outputs, &value)?;
            }
            Category::ArrayStore => {
                let array = io.inputs.first().cloned().unwrap_or_else(JavaType::object);
                let element = ops::element_type(opcode, &array);
                let value = inputs.get(2).map_or("", String::as_str);
                writeln!(
                    out,
                    "    {} = {value};",
                    ops::array_element(element, a, b, self.config.use_value_checks)
                )?;
            }
            Category::Stack => Self::shuffle(out, opcode, io, inputs, outputs)?,
            Category::Binary => {
                if ops::is_checked_division(opcode) {
                    let dest = outputs.first().map_or("", String::as_str);
                    out.push_str(&ops::checked_division(opcode, dest, a, b));
                } else {
                    match ops::binary(opcode, a, b) {
                        Some(expression) => Self::assign(out, outputs, &expression)?,
                        None => return Ok(false),
                    }
                }
            }
            Category::Unary => {
                if opcode == Opcode::Arraylength {
                    Self::assign(out, outputs, &format!("((jarray) nullCheck(ctx, {a}))->length"))?;
                } else {
                    match ops::unary(opcode, a) {
                        Some(expression) => Self::assign(out, outputs, &expression)?,
                        None => return Ok(false),
                    }
                }
            }
            Category::Return => self.write_return(out, inputs.first())?,
            Category::Throw => writeln!(out, "    throwException(ctx, nullCheck(ctx, {a}));")?,
            Category::Monitor => {
                let function = if opcode == Opcode::Monitorenter {
                    "monitorEnter"
                } else {
                    "monitorExit"
                };
                writeln!(out, "    {function}(ctx, {a});")?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// `dup*`, `swap` and `pop*` outside a lowered run.
    fn shuffle(
        out: &mut String,
        opcode: Opcode,
        io: &InstructionIo,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        if outputs.is_empty() {
            return Ok(());
        }
        writeln!(out, "    {{")?;
        for (position, (value, ty)) in inputs.iter().zip(&io.inputs).enumerate() {
            writeln!(out, "        {} v{position} = {value};", ty.stack_kind().c_type())?;
        }
        for (dest, source) in outputs.iter().zip(stack_shuffle(opcode, &io.inputs)) {
            writeln!(out, "        {dest} = v{source};")?;
        }
        writeln!(out, "    }}")?;
        Ok(())
    }

    fn write_return(&self, out: &mut String, value: Option<&String>) -> Result<()> {
        let mut epilogue = Vec::new();
        if let Some(monitor) = &self.monitor {
            epilogue.push(format!("monitorExit(ctx, {monitor});"));
        }
        if self.frame {
            epilogue.push("popStackFrame(ctx);".to_string());
        }

        match value {
            None => {
                for statement in &epilogue {
                    writeln!(out, "    {statement}")?;
                }
                writeln!(out, "    return;")?;
            }
            Some(value) if epilogue.is_empty() => writeln!(out, "    return {value};")?,
            Some(value) => {
                writeln!(out, "    {{")?;
                writeln!(
                    out,
                    "        {} result = {value};",
                    self.method.signature.return_type().c_type()
                )?;
                for statement in &epilogue {
                    writeln!(out, "        {statement}")?;
                }
                writeln!(out, "        return result;")?;
                writeln!(out, "    }}")?;
            }
        }
        Ok(())
    }

    fn type_operation(
        &self,
        out: &mut String,
        opcode: Opcode,
        ty: &JavaType,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        let a = inputs.first().map_or("", String::as_str);
        match opcode {
            Opcode::New => {
                let name = ty
                    .class_reference()
                    .map(qualified_name)
                    .ok_or_else(|| malformed_error!("new of non-class type {}", ty))?;
                Self::assign(
                    out,
                    outputs,
                    &format!("(clinit_{name}(ctx), gcAlloc(ctx, &class_{name}))"),
                )
            }
            Opcode::Anewarray => Self::assign(
                out,
                outputs,
                &format!("(jobject) createArray(ctx, {}, {a})", ty.class_fetch()),
            ),
            Opcode::Checkcast => {
                writeln!(
                    out,
                    "    if ({a} && !isInstance(ctx, {a}, {})) throwClassCast(ctx);",
                    ty.class_fetch()
                )?;
                match outputs.first() {
                    Some(dest) if dest != a => writeln!(out, "    {dest} = {a};")?,
                    _ => {}
                }
                Ok(())
            }
            Opcode::Instanceof => Self::assign(
                out,
                outputs,
                &format!("(jint) ({a} && isInstance(ctx, {a}, {}))", ty.class_fetch()),
            ),
            other => Err(unsupported_error!("{} with a type operand", other.mnemonic())),
        }
    }

    fn field_access(
        &self,
        out: &mut String,
        opcode: Opcode,
        field: &FieldRef,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        let declaring = field.declaring.as_deref().unwrap_or(&field.owner);
        let a = inputs.first().map_or("", String::as_str);
        match opcode {
            Opcode::Getstatic | Opcode::Putstatic => {
                if declaring != self.method.owner {
                    writeln!(out, "    clinit_{}(ctx);", qualified_name(declaring))?;
                }
                let symbol = field_symbol(declaring, &field.name, true);
                if opcode == Opcode::Getstatic {
                    Self::assign(out, outputs, &symbol)
                } else {
                    writeln!(out, "    {symbol} = {a};")?;
                    Ok(())
                }
            }
            Opcode::Getfield => {
                let access = format!(
                    "(({} *) {})->{}",
                    qualified_name(declaring),
                    self.checked(a),
                    field_symbol(declaring, &field.name, false)
                );
                if field.ty.is_reference() {
                    Self::assign(out, outputs, &format!("(jobject) {access}"))
                } else {
                    Self::assign(out, outputs, &access)
                }
            }
            Opcode::Putfield => {
                let value = inputs.get(1).map_or("", String::as_str);
                let value = if field.ty.is_reference() {
                    format!("(jref) {value}")
                } else {
                    value.to_string()
                };
                writeln!(
                    out,
                    "    (({} *) {})->{} = {value};",
                    qualified_name(declaring),
                    self.checked(a),
                    field_symbol(declaring, &field.name, false)
                )?;
                Ok(())
            }
            other => Err(unsupported_error!("{} with a field operand", other.mnemonic())),
        }
    }

    fn invocation(opcode: Opcode, method: &MethodRef, inputs: &[String]) -> String {
        let signature = &method.signature;
        let (receiver, args) = match inputs.split_first() {
            Some((receiver, args)) if opcode != Opcode::Invokestatic => (Some(receiver), args),
            _ => (None, inputs),
        };
        let mut tail = String::new();
        for arg in args {
            tail.push_str(", ");
            tail.push_str(arg);
        }

        match (&method.dispatch, receiver) {
            (Some(Dispatch::Virtual { owner, .. }), Some(receiver)) => format!(
                "INVOKE_VIRTUAL({}, {}, {receiver}{tail})",
                function_type_symbol(owner, signature),
                vtable_index_symbol(owner, signature)
            ),
            (Some(Dispatch::Interface { owner, .. }), Some(receiver)) => format!(
                "INVOKE_INTERFACE({}, &{}, {}, {receiver}{tail})",
                function_type_symbol(owner, signature),
                class_object_symbol(owner),
                interface_index_symbol(owner, signature)
            ),
            (dispatch, receiver) => {
                let owner = match dispatch {
                    Some(Dispatch::Direct { owner }) => owner,
                    _ => &method.owner,
                };
                let symbol = method_symbol(owner, signature, receiver.is_none());
                match receiver {
                    None => format!("{symbol}(ctx{tail})"),
                    Some(receiver) if opcode == Opcode::Invokespecial => {
                        format!("{symbol}(ctx, {receiver}{tail})")
                    }
                    Some(receiver) => format!("{symbol}(ctx, nullCheck(ctx, {receiver}){tail})"),
                }
            }
        }
    }

    fn lambda(
        out: &mut String,
        site: &LambdaSite,
        io: &InstructionIo,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        let proxy = qualified_name(&site.proxy);
        writeln!(out, "    {{")?;
        writeln!(
            out,
            "        jobject lambda = (clinit_{proxy}(ctx), gcAlloc(ctx, &class_{proxy}));"
        )?;
        for (position, (value, ty)) in inputs.iter().zip(&io.inputs).enumerate() {
            let value = if ty.is_reference() {
                format!("(jref) {value}")
            } else {
                value.clone()
            };
            writeln!(
                out,
                "        (({proxy} *) lambda)->{} = {value};",
                field_symbol(&site.proxy, &format!("field{position}"), false)
            )?;
        }
        if let Some(dest) = outputs.first() {
            writeln!(out, "        {dest} = lambda;")?;
        }
        writeln!(out, "    }}")?;
        Ok(())
    }

    fn multi_array(
        out: &mut String,
        ty: &JavaType,
        dimensions: u8,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<()> {
        // the runtime builds `getArrayClass(type, dimensions)`, so pass what remains below
        let mut element = ty.clone();
        for _ in 0..dimensions {
            if let Some(inner) = element.element() {
                element = inner;
            }
        }
        let count = inputs.len();
        writeln!(out, "    {{")?;
        writeln!(out, "        volatile jtype dims[{count}];")?;
        for (position, value) in inputs.iter().enumerate() {
            writeln!(out, "        dims[{position}].i = {value};")?;
        }
        writeln!(out, "        volatile jtype * volatile sp = dims + {count};")?;
        writeln!(
            out,
            "        instMultiANewArray(ctx, sp, {}, {count});",
            element.class_fetch()
        )?;
        if let Some(dest) = outputs.first() {
            writeln!(out, "        {dest} = dims[0].o;")?;
        }
        writeln!(out, "    }}")?;
        Ok(())
    }
}
