//! The core compiler: pass orchestration and shared emission helpers
//!
//! `CoreCompiler` owns every piece of cross-pass state (type store,
//! builder, symbol store, class/interface tables, diagnostics). The
//! discovery fixpoint repeatedly probes top-level declarations in dummy
//! mode, erasing probe output between rounds; once no declaration is
//! left unresolved, a single strict pass emits the definitive IR.

mod builtins;
mod class;
mod const_eval;
mod decl;
mod expr;
mod func;
mod generator;
mod iface;
mod narrow;
mod stmt;
mod types;

use crate::context::{CapturedVar, GenContext};
use crate::diag::{Diagnostic, DiagnosticHandler};
use crate::error::{LowerError, LowerResult};
use crate::model::{AdapterSlot, ClassInfo, InterfaceInfo};
use crate::options::CompilerOptions;
use crate::symbols::{
    ClassId, FunctionEntry, InterfaceId, Resolution, SymbolStore, VarStorage,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use tsir_ast::ast::SourceFile;
use tsir_ast::{Interner, Span};
use tsir_ir::{
    Attribute, BlockId, InsertPoint, IrBuilder, IrModule, OpId, OpKind, Value, ValueId,
};
use tsir_types::{
    find_base_type, is_castable, InterfaceLookup, InterfaceMemberShape, LiteralValue, Type,
    TypeId, TypeStore,
};

/// Compile a source file into an IR module.
///
/// The interner is the one the parser produced; lowering interns the
/// names it synthesizes (generator rewrites, narrowing redeclarations)
/// into it.
pub fn compile(
    source: &SourceFile,
    interner: &mut Interner,
    options: CompilerOptions,
) -> Result<IrModule, Vec<Diagnostic>> {
    compile_unit(source, interner, options).map(|out| out.module)
}

/// A finished compilation: the module plus the type store its type ids
/// resolve against.
#[derive(Debug)]
pub struct CompileOutput {
    pub module: IrModule,
    pub types: TypeStore,
}

/// Compile, keeping the type store alongside the module.
pub fn compile_unit(
    source: &SourceFile,
    interner: &mut Interner,
    options: CompilerOptions,
) -> Result<CompileOutput, Vec<Diagnostic>> {
    let mut module = IrModule::new("main", source.span);
    // The width of `number` is a whole-module codegen selection.
    module.attributes.push((
        "number_is_f64".to_string(),
        Attribute::Bool(options.number_is_f64),
    ));
    let compiler = CoreCompiler::new(interner, options, module);
    compiler.run(source)
}

/// One enclosing function activation during lowering.
#[derive(Debug)]
pub(crate) struct FuncFrame {
    pub name: String,
    pub func_op: OpId,
    pub entry_block: BlockId,
    pub return_ty: TypeId,
    /// Set by try/throw lowering; the func op gets a personality attr.
    pub has_personality: bool,
    pub is_generator: bool,
    /// `this` value (parameter 0 of instance methods).
    pub this_value: Option<ValueId>,
    /// Captured variables visible in this activation, keyed by name.
    pub captures: FxHashMap<String, FrameCapture>,
    /// The capture tuple parameter value, when `captures` is non-empty.
    pub capture_param: Option<ValueId>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameCapture {
    pub index: u32,
    pub ty: TypeId,
    pub by_ref: bool,
}

/// One enclosing breakable construct.
#[derive(Debug, Clone)]
pub(crate) struct LoopFrame {
    pub label: Option<String>,
    pub is_switch: bool,
}

/// The compiler core. All state transitions happen on one thread; no
/// operation suspends.
pub struct CoreCompiler<'a> {
    pub(crate) opts: CompilerOptions,
    pub(crate) types: TypeStore,
    pub(crate) builder: IrBuilder,
    pub(crate) interner: &'a mut Interner,
    pub(crate) symbols: SymbolStore,
    pub(crate) classes: Vec<ClassInfo>,
    pub(crate) interfaces: Vec<InterfaceInfo>,
    pub(crate) class_by_fqn: FxHashMap<String, ClassId>,
    pub(crate) iface_by_fqn: FxHashMap<String, InterfaceId>,
    pub(crate) enum_by_fqn: FxHashMap<String, crate::symbols::EnumEntry>,
    /// Adapter vtables built for structural casts, keyed by
    /// (tuple type, interface fqn).
    pub(crate) tuple_adapters: FxHashMap<(TypeId, String), Vec<AdapterSlot>>,
    pub(crate) diags: DiagnosticHandler,
    pub(crate) func_stack: Vec<FuncFrame>,
    pub(crate) loop_stack: Vec<LoopFrame>,
    /// Probe bookkeeping: a stack of scratch ops collecting output that
    /// is erased when the probe ends.
    dummy_scratch: Vec<(OpId, InsertPoint)>,
    /// Lazily-created module initializer for top-level statements.
    module_init: Option<OpId>,
    /// Label waiting to ride on the next loop op.
    pub(crate) pending_label: Option<String>,
    /// Task group collecting `for await` iteration bodies.
    pub(crate) async_group: Option<ValueId>,
    /// For-of element binding to establish in the next loop body.
    pub(crate) pending_element_binding: Option<stmt::ElementBinding>,
    /// Yield types observed per enclosing generator probe.
    pub(crate) yield_type_stack: Vec<Vec<TypeId>>,
    pub(crate) lambda_counter: u32,
}

impl<'a> CoreCompiler<'a> {
    pub fn new(interner: &'a mut Interner, opts: CompilerOptions, module: IrModule) -> Self {
        CoreCompiler {
            opts,
            types: TypeStore::new(),
            builder: IrBuilder::new(module),
            interner,
            symbols: SymbolStore::new(),
            classes: Vec::new(),
            interfaces: Vec::new(),
            class_by_fqn: FxHashMap::default(),
            iface_by_fqn: FxHashMap::default(),
            enum_by_fqn: FxHashMap::default(),
            tuple_adapters: FxHashMap::default(),
            diags: DiagnosticHandler::new(),
            func_stack: Vec::new(),
            loop_stack: Vec::new(),
            dummy_scratch: Vec::new(),
            module_init: None,
            pending_label: None,
            async_group: None,
            pending_element_binding: None,
            yield_type_stack: Vec::new(),
            lambda_counter: 0,
        }
    }

    /// Run discovery until fixpoint, then the definitive pass.
    pub fn run(mut self, source: &SourceFile) -> Result<CompileOutput, Vec<Diagnostic>> {
        let total = source.statements.len();
        debug!(statements = total, "starting discovery fixpoint");

        let mut processed = vec![false; total];
        let mut prev_unresolved = usize::MAX;

        loop {
            self.diags.clear_pending();
            let ctx = GenContext::dummy();
            self.begin_dummy_pass();

            let mut unresolved = 0usize;
            for (index, stmt) in source.statements.iter().enumerate() {
                if processed[index] {
                    continue;
                }
                match self.lower_top_statement(stmt, &ctx) {
                    Ok(()) => processed[index] = true,
                    Err(err) => {
                        trace!(index, %err, "top-level statement unresolved");
                        unresolved += 1;
                    }
                }
            }

            self.end_dummy_pass();

            if unresolved == 0 {
                break;
            }
            if unresolved == prev_unresolved {
                // The fixpoint stalled: surface what could not resolve.
                for unresolved_ref in ctx.unresolved_sink.borrow().iter() {
                    self.diags.report(Diagnostic::error(
                        unresolved_ref.span,
                        format!("cannot resolve name '{}'", unresolved_ref.name),
                    ));
                }
                if self.diags.pending_errors() == 0 {
                    self.diags.report(Diagnostic::error(
                        source.span,
                        format!("{} declarations could not be resolved", unresolved),
                    ));
                }
                self.diags.finalize_pass();
                return Err(self.diags.into_diagnostics());
            }
            prev_unresolved = unresolved;
            debug!(unresolved, "discovery pass rescheduled");
        }

        // Definitive pass: reset per-pass state and lower strictly.
        debug!("definitive pass");
        self.symbols.reset_scopes();
        for class in &mut self.classes {
            class.processed = false;
        }
        self.diags.clear_pending();
        let ctx = GenContext::strict();
        for stmt in &source.statements {
            if let Err(err) = self.lower_top_statement(stmt, &ctx) {
                if let LowerError::Unresolved { name, span } = err {
                    self.diags.report(Diagnostic::error(
                        span,
                        format!("cannot resolve name '{}'", name),
                    ));
                }
            }
        }
        self.diags.finalize_pass();

        if self.diags.has_errors() {
            return Err(self.diags.into_diagnostics());
        }

        let module = self.builder.finish();
        debug_assert!(
            tsir_ir::verify(&module).is_ok(),
            "lowered module failed verification: {:?}",
            tsir_ir::verify(&module).err()
        );
        Ok(CompileOutput {
            module,
            types: self.types,
        })
    }

    // ── Probe bookkeeping ───────────────────────────────────────────────

    /// Redirect emission into a scratch op whose contents are erased when
    /// the probe ends. Probes nest (function return-type discovery runs
    /// inside the module-level discovery pass).
    pub(crate) fn begin_probe(&mut self) {
        let saved = self.builder.insertion_point();
        let name = self.fresh_name("__probe_scratch");
        let scratch = self.builder.create_op(
            OpKind::Func,
            vec![],
            &[],
            vec![attr_str("sym_name", &name)],
            1,
            Span::synthetic(),
        );
        let region = self.builder.op(scratch).regions[0];
        let block = self.builder.create_block(region, &[]);
        self.builder.set_insertion_point_to_end(block);
        self.dummy_scratch.push((scratch, saved));
    }

    /// Erase the probe's output, detach its scratch op, and restore the
    /// insertion point.
    pub(crate) fn end_probe(&mut self) {
        if let Some((scratch, saved)) = self.dummy_scratch.pop() {
            self.builder.module_mut().erase_op(scratch);
            self.builder.module_mut().detach_op(saved.block, scratch);
            self.builder.set_insertion_point(saved);
        }
    }

    pub(crate) fn begin_dummy_pass(&mut self) {
        self.begin_probe();
    }

    pub(crate) fn end_dummy_pass(&mut self) {
        self.end_probe();
        self.symbols.reset_scopes();
    }

    /// The module initializer function; created on first use.
    pub(crate) fn module_init_block(&mut self) -> BlockId {
        if let Some(op) = self.module_init {
            let region = self.builder.op(op).regions[0];
            return self.builder.module().region(region).blocks[0];
        }
        let op = self.builder.create_op(
            OpKind::GlobalConstructor,
            vec![],
            &[],
            vec![attr_str("sym_name", "__module_init")],
            1,
            Span::synthetic(),
        );
        let region = self.builder.op(op).regions[0];
        let block = self.builder.create_block(region, &[]);
        self.module_init = Some(op);
        block
    }

    // ── Name resolution ─────────────────────────────────────────────────

    /// Resolve an identifier to a value. Records captures when the
    /// resolved variable lives outside the current function activation
    /// and the context carries a capture sink.
    pub(crate) fn resolve_identifier(
        &mut self,
        name: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        // Known built-in constants bypass the store.
        if let Some(value) = self.builtin_identifier(name, span) {
            return Ok(value);
        }

        // A captured variable resolves through the capture tuple param.
        if let Some(frame) = self.func_stack.last() {
            if let Some(capture) = frame.captures.get(name).copied() {
                let param = frame.capture_param.expect("capture without tuple param");
                return Ok(self.read_capture(param, name, capture, span));
            }
        }

        match self.symbols.lookup(name) {
            Some(Resolution::Variable(var)) => {
                let info = self.symbols.var(var).clone();
                self.note_capture(&info, ctx);
                self.read_variable(&info, span)
            }
            Some(Resolution::Function(entry)) => Ok(self.function_value(&entry, span, ctx)),
            Some(Resolution::Class(class_id)) => {
                let ty = self.classes[class_id.0 as usize].ty;
                let fqn = self.classes[class_id.0 as usize].full_name.clone();
                Ok(self.emit_symbol_ref(&fqn, ty, span))
            }
            Some(Resolution::Enum(entry)) => {
                let fqn = entry.full_name.clone();
                Ok(self.emit_symbol_ref(&fqn, entry.ty, span))
            }
            Some(Resolution::Namespace(ns)) => {
                let fqn = self.symbols.namespace(ns).full_name.clone();
                let ty = self.types.namespace(fqn.clone());
                Ok(self.emit_symbol_ref(&fqn, ty, span))
            }
            Some(Resolution::Interface(iface_id)) => {
                let ty = self.interfaces[iface_id.0 as usize].ty;
                let fqn = self.interfaces[iface_id.0 as usize].full_name.clone();
                Ok(self.emit_symbol_ref(&fqn, ty, span))
            }
            Some(Resolution::TypeAlias(_)) | None => self.unresolved(name, span, ctx),
        }
    }

    /// Recoverable unresolved-name outcome.
    pub(crate) fn unresolved(
        &mut self,
        name: &str,
        span: Span,
        ctx: &GenContext,
    ) -> LowerResult<Value> {
        ctx.record_unresolved(name, span);
        if !ctx.allow_partial_resolve {
            self.diags
                .report(Diagnostic::error(span, format!("cannot resolve name '{}'", name)));
            return Err(LowerError::Reported);
        }
        Err(LowerError::unresolved(name, span))
    }

    /// Structural error: diagnose and abort the current declaration.
    pub(crate) fn structural_error<T>(&mut self, span: Span, message: impl Into<String>) -> LowerResult<T> {
        self.diags.report(Diagnostic::error(span, message));
        Err(LowerError::Reported)
    }

    /// Load a variable's current value from its storage.
    pub(crate) fn read_variable(&mut self, info: &crate::symbols::VariableInfo, span: Span) -> LowerResult<Value> {
        match &info.storage {
            VarStorage::Value(value) => Ok(self.builder.module().value(*value)),
            VarStorage::Local(slot) | VarStorage::ConstRef(slot) => {
                Ok(self.emit_load(*slot, info.ty, span))
            }
            VarStorage::Global(sym) => {
                let ref_ty = self.types.reference(info.ty);
                let addr = self.emit_op(
                    OpKind::AddressOf,
                    vec![],
                    &[ref_ty],
                    vec![attr_str("sym_name", sym)],
                    span,
                );
                let addr = self.builder.result(addr);
                Ok(self.emit_load(addr.id, info.ty, span))
            }
            VarStorage::ThisField(field) => {
                let frame = self.func_stack.last().expect("this-field outside function");
                let this = frame.this_value.expect("this-field without this");
                let ref_ty = self.types.reference(info.ty);
                let field_ref = self.emit_op(
                    OpKind::PropertyRef,
                    vec![this],
                    &[ref_ty],
                    vec![attr_str("field", field)],
                    span,
                );
                let field_ref = self.builder.result(field_ref);
                Ok(self.emit_load(field_ref.id, info.ty, span))
            }
            VarStorage::Pending => Err(LowerError::unresolved(&info.name, span)),
        }
    }

    /// Address a variable's storage for a write.
    pub(crate) fn variable_ref(&mut self, info: &crate::symbols::VariableInfo, span: Span) -> LowerResult<Value> {
        match &info.storage {
            VarStorage::Local(slot) | VarStorage::ConstRef(slot) => {
                Ok(self.builder.module().value(*slot))
            }
            VarStorage::Global(sym) => {
                let ref_ty = self.types.reference(info.ty);
                let op = self.emit_op(
                    OpKind::AddressOf,
                    vec![],
                    &[ref_ty],
                    vec![attr_str("sym_name", sym)],
                    span,
                );
                Ok(self.builder.result(op))
            }
            VarStorage::ThisField(field) => {
                let frame = self.func_stack.last().expect("this-field outside function");
                let this = frame.this_value.expect("this-field without this");
                let ref_ty = self.types.reference(info.ty);
                let op = self.emit_op(
                    OpKind::PropertyRef,
                    vec![this],
                    &[ref_ty],
                    vec![attr_str("field", field)],
                    span,
                );
                Ok(self.builder.result(op))
            }
            VarStorage::Value(_) | VarStorage::Pending => {
                self.structural_error(span, format!("cannot assign to '{}'", info.name))
            }
        }
    }

    /// Read one captured variable out of the capture tuple parameter.
    fn read_capture(&mut self, param: ValueId, name: &str, capture: FrameCapture, span: Span) -> Value {
        if capture.by_ref {
            let ref_ty = self.types.reference(capture.ty);
            let field = self.emit_op(
                OpKind::ExtractField,
                vec![param],
                &[ref_ty],
                vec![attr_str("field", name)],
                span,
            );
            let field = self.builder.result(field);
            self.emit_load(field.id, capture.ty, span)
        } else {
            let field = self.emit_op(
                OpKind::ExtractField,
                vec![param],
                &[capture.ty],
                vec![attr_str("field", name)],
                span,
            );
            self.builder.result(field)
        }
    }

    /// Record a capture when the variable belongs to an enclosing
    /// function activation (namespace globals are never captured).
    pub(crate) fn note_capture(&self, info: &crate::symbols::VariableInfo, ctx: &GenContext) {
        let current_level = self.symbols.func_level();
        if info.func_level > 0 && info.func_level < current_level {
            ctx.record_capture(CapturedVar {
                name: info.name.clone(),
                ty: info.ty,
                by_ref: info.read_write,
            });
        }
    }

    /// Produce the operand for one capture-tuple field, resolving
    /// through the current frame's own captures so transitive closures
    /// chain correctly.
    pub(crate) fn capture_operand(
        &mut self,
        name: &str,
        field_ty: TypeId,
        span: Span,
        ctx: &GenContext,
    ) -> ValueId {
        let want_ref = matches!(self.types.get(field_ty), Type::Ref(_));

        if let Some(frame) = self.func_stack.last() {
            if let Some(capture) = frame.captures.get(name).copied() {
                let param = frame.capture_param.expect("capture without tuple param");
                if want_ref {
                    let ref_ty = self.types.reference(capture.ty);
                    let field = self.emit_op(
                        OpKind::ExtractField,
                        vec![param],
                        &[ref_ty],
                        vec![attr_str("field", name)],
                        span,
                    );
                    return self.builder.result(field).id;
                }
                return self.read_capture(param, name, capture, span).id;
            }
        }

        match self.symbols.lookup(name) {
            Some(Resolution::Variable(var)) => {
                let info = self.symbols.var(var).clone();
                self.note_capture(&info, ctx);
                if want_ref {
                    match &info.storage {
                        VarStorage::Local(slot) | VarStorage::ConstRef(slot) => *slot,
                        _ => match self.variable_ref(&info, span) {
                            Ok(slot) => slot.id,
                            Err(_) => self.emit_undef(field_ty, span).id,
                        },
                    }
                } else {
                    match self.read_variable(&info, span) {
                        Ok(value) => value.id,
                        Err(_) => self.emit_undef(field_ty, span).id,
                    }
                }
            }
            _ => self.emit_undef(field_ty, span).id,
        }
    }

    /// A function used as a value: plain symbol reference, or a
    /// trampoline/bound function materializing the capture tuple.
    pub(crate) fn function_value(&mut self, entry: &FunctionEntry, span: Span, ctx: &GenContext) -> Value {
        if entry.capture_fields.is_empty() {
            let op = self.emit_op(
                OpKind::SymbolRef,
                vec![],
                &[entry.ty],
                vec![attr_str("sym_name", &entry.full_name)],
                span,
            );
            return self.builder.result(op);
        }

        // Materialize the capture tuple from current storages.
        let mut operands = Vec::new();
        for field in &entry.capture_fields {
            let name = field.id.as_name().expect("capture fields are named").to_string();
            operands.push(self.capture_operand(&name, field.ty, span, ctx));
        }
        let capture_ty = self.types.tuple(entry.capture_fields.clone());
        let capture = self.emit_op(OpKind::Capture, operands, &[capture_ty], vec![], span);
        let capture = self.builder.result(capture);

        let (inputs, results) = match self.types.get(entry.ty).as_signature() {
            Some((i, r)) => (i.to_vec(), r.to_vec()),
            None => (vec![], vec![]),
        };
        // The public signature drops the leading capture input.
        let public_inputs: Vec<TypeId> = inputs.iter().skip(1).copied().collect();

        if self.opts.replace_trampoline_with_bound_function {
            let bound_ty = self.types.bound_function(public_inputs, results);
            let op = self.emit_op(
                OpKind::CreateBoundFunction,
                vec![capture.id],
                &[bound_ty],
                vec![attr_str("sym_name", &entry.full_name)],
                span,
            );
            self.builder.result(op)
        } else {
            let fn_ty = self.types.function(public_inputs, results);
            let op = self.emit_op(
                OpKind::Trampoline,
                vec![capture.id],
                &[fn_ty],
                vec![attr_str("sym_name", &entry.full_name)],
                span,
            );
            self.builder.result(op)
        }
    }

    // ── Castability with nominal knowledge ──────────────────────────────

    pub(crate) fn castable(&self, from: TypeId, to: TypeId) -> bool {
        let env = NominalEnv { compiler: self };
        is_castable(&self.types, from, to, &env)
    }

    pub(crate) fn base_type(&self, a: TypeId, b: TypeId, default: TypeId) -> TypeId {
        let env = NominalEnv { compiler: self };
        find_base_type(&self.types, a, b, default, &env)
    }

    /// Implicit conversion: identity when types match, `cast` when legal,
    /// structural error otherwise.
    pub(crate) fn coerce(&mut self, value: Value, to: TypeId, span: Span) -> LowerResult<Value> {
        if value.ty == to {
            return Ok(value);
        }
        if !self.castable(value.ty, to) {
            let from_name = self.types.display(value.ty);
            let to_name = self.types.display(to);
            return self.structural_error(
                span,
                format!("type '{}' is not assignable to type '{}'", from_name, to_name),
            );
        }
        let op = self.emit_op(OpKind::Cast, vec![value.id], &[to], vec![], span);
        Ok(self.builder.result(op))
    }

    // ── Emission helpers ────────────────────────────────────────────────

    pub(crate) fn emit_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: &[TypeId],
        attributes: Vec<(String, Attribute)>,
        span: Span,
    ) -> OpId {
        self.builder
            .create_op(kind, operands, result_types, attributes, 0, span)
    }

    pub(crate) fn emit_load(&mut self, slot: ValueId, ty: TypeId, span: Span) -> Value {
        let op = self.emit_op(OpKind::Load, vec![slot], &[ty], vec![], span);
        self.builder.result(op)
    }

    pub(crate) fn emit_store(&mut self, slot: ValueId, value: ValueId, span: Span) {
        self.emit_op(OpKind::Store, vec![value, slot], &[], vec![], span);
    }

    pub(crate) fn emit_undef(&mut self, ty: TypeId, span: Span) -> Value {
        let op = self.emit_op(OpKind::Undef, vec![], &[ty], vec![], span);
        self.builder.result(op)
    }

    pub(crate) fn emit_symbol_ref(&mut self, name: &str, ty: TypeId, span: Span) -> Value {
        let op = self.emit_op(
            OpKind::SymbolRef,
            vec![],
            &[ty],
            vec![attr_str("sym_name", name)],
            span,
        );
        self.builder.result(op)
    }

    pub(crate) fn emit_const_int(&mut self, value: i64, ty: TypeId, span: Span) -> Value {
        let op = self.emit_op(
            OpKind::Constant,
            vec![],
            &[ty],
            vec![("value".to_string(), Attribute::Int(value))],
            span,
        );
        self.builder.result(op)
    }

    pub(crate) fn emit_const_number(&mut self, value: f64, span: Span) -> Value {
        let ty = self.types.number();
        let op = self.emit_op(
            OpKind::Constant,
            vec![],
            &[ty],
            vec![("value".to_string(), Attribute::Float(value))],
            span,
        );
        self.builder.result(op)
    }

    pub(crate) fn emit_const_string(&mut self, value: &str, span: Span) -> Value {
        let ty = self.types.string();
        let op = self.emit_op(
            OpKind::Constant,
            vec![],
            &[ty],
            vec![attr_str("value", value)],
            span,
        );
        self.builder.result(op)
    }

    pub(crate) fn emit_const_bool(&mut self, value: bool, span: Span) -> Value {
        let ty = self.types.boolean();
        let op = self.emit_op(
            OpKind::Constant,
            vec![],
            &[ty],
            vec![("value".to_string(), Attribute::Bool(value))],
            span,
        );
        self.builder.result(op)
    }

    /// Literal type of a constant, for narrowing and const contexts.
    pub(crate) fn literal_type(&mut self, value: LiteralValue) -> TypeId {
        let base = match &value {
            LiteralValue::Int(_) => self.types.i32(),
            LiteralValue::Number(_) => self.types.number(),
            LiteralValue::Str(_) => self.types.string(),
            LiteralValue::Bool(_) => self.types.boolean(),
        };
        self.types.literal(value, base)
    }

    /// Fresh compiler-generated name.
    pub(crate) fn fresh_name(&mut self, prefix: &str) -> String {
        self.lambda_counter += 1;
        format!("{}_{}", prefix, self.lambda_counter)
    }

    /// Whether the op preceding the insertion point is a terminator.
    pub(crate) fn current_block_terminated(&self) -> bool {
        let point = self.builder.insertion_point();
        let ops = &self.builder.block(point.block).ops;
        if point.index == 0 {
            return false;
        }
        ops.get(point.index - 1)
            .map(|&op| {
                let op = self.builder.op(op);
                !op.erased && op.kind.is_terminator()
            })
            .unwrap_or(false)
    }

    pub(crate) fn current_frame(&self) -> Option<&FuncFrame> {
        self.func_stack.last()
    }

    pub(crate) fn current_frame_mut(&mut self) -> Option<&mut FuncFrame> {
        self.func_stack.last_mut()
    }

    pub(crate) fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.0 as usize]
    }

    pub(crate) fn interface(&self, id: InterfaceId) -> &InterfaceInfo {
        &self.interfaces[id.0 as usize]
    }

    pub(crate) fn interface_mut(&mut self, id: InterfaceId) -> &mut InterfaceInfo {
        &mut self.interfaces[id.0 as usize]
    }

    /// Diagnostics view for embedders.
    pub fn diagnostics(&self) -> &DiagnosticHandler {
        &self.diags
    }
}

/// `InterfaceLookup` view over the compiler's nominal tables.
pub(crate) struct NominalEnv<'c, 'a> {
    pub compiler: &'c CoreCompiler<'a>,
}

impl<'c, 'a> InterfaceLookup for NominalEnv<'c, 'a> {
    fn interface_members(&self, name: &str) -> Option<Vec<InterfaceMemberShape>> {
        let id = self.compiler.iface_by_fqn.get(name)?;
        let info = self.compiler.interface(*id);
        Some(
            self.compiler
                .collect_interface_members(info)
                .into_iter()
                .map(|m| InterfaceMemberShape {
                    id: tsir_types::FieldId::Name(m.name),
                    ty: m.ty,
                    optional: m.is_conditional,
                    is_method: m.is_method,
                })
                .collect(),
        )
    }

    fn is_subclass_of(&self, derived: &str, base: &str) -> bool {
        let Some(&derived_id) = self.compiler.class_by_fqn.get(derived) else {
            return false;
        };
        self.compiler.class_has_base(derived_id, base)
    }

    fn class_implements(&self, class_name: &str, iface_name: &str) -> bool {
        let Some(&class_id) = self.compiler.class_by_fqn.get(class_name) else {
            return false;
        };
        self.compiler.class_implements_iface(class_id, iface_name)
    }
}

impl<'a> CoreCompiler<'a> {
    /// Walk base classes for `base` (by fqn), transitively.
    pub(crate) fn class_has_base(&self, derived: ClassId, base: &str) -> bool {
        let info = self.class(derived);
        for &parent in &info.base_classes {
            let parent_info = self.class(parent);
            if parent_info.full_name == base || self.class_has_base(parent, base) {
                return true;
            }
        }
        false
    }

    pub(crate) fn class_implements_iface(&self, class_id: ClassId, iface_name: &str) -> bool {
        let info = self.class(class_id);
        for implement in &info.implements {
            if self.interface(implement.iface).full_name == iface_name {
                return true;
            }
        }
        info.base_classes
            .iter()
            .any(|&base| self.class_implements_iface(base, iface_name))
    }
}

pub(crate) fn attr_str(name: &str, value: &str) -> (String, Attribute) {
    (name.to_string(), Attribute::Str(value.to_string()))
}

pub(crate) fn attr_int(name: &str, value: i64) -> (String, Attribute) {
    (name.to_string(), Attribute::Int(value))
}

pub(crate) fn attr_bool(name: &str, value: bool) -> (String, Attribute) {
    (name.to_string(), Attribute::Bool(value))
}

pub(crate) fn attr_type(name: &str, value: TypeId) -> (String, Attribute) {
    (name.to_string(), Attribute::Type(value))
}
