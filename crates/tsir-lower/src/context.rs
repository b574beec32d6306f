//! Generation context
//!
//! An immutable value threaded through every lowering routine. Mutable
//! sub-channels (sinks, counters, generated statements) are shared
//! handles, so a child context cloned for a nested construct feeds the
//! same sinks as its parent.

use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tsir_ast::ast::Statement;
use tsir_ast::Span;
use tsir_ir::OpId;
use tsir_types::{TupleField, TypeId};

/// One captured variable discovered during resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedVar {
    pub name: String,
    pub ty: TypeId,
    /// Captured through its ref storage, so writes stay visible.
    pub by_ref: bool,
}

/// The capture-discovery sink: ordered, deduplicated by name.
#[derive(Debug, Default)]
pub struct CaptureSet {
    vars: Vec<CapturedVar>,
}

impl CaptureSet {
    pub fn record(&mut self, var: CapturedVar) {
        if !self.vars.iter().any(|v| v.name == var.name) {
            self.vars.push(var);
        }
    }

    pub fn vars(&self) -> &[CapturedVar] {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name == name)
    }
}

/// Accumulates the unified return type across a function's return sites.
#[derive(Debug, Default)]
pub struct ReturnTypeAcc {
    /// The unified type so far.
    pub ty: Option<TypeId>,
    /// True once any `return expr` occurred.
    pub required: bool,
    /// Set when two return sites had incompatible types.
    pub conflict: Option<(TypeId, TypeId, Span)>,
}

/// One unresolved name reference recorded during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRef {
    pub name: String,
    pub span: Span,
}

/// The generation context. Cloning is cheap; the `Rc` channels stay
/// shared between parent and child contexts.
#[derive(Debug, Clone, Default)]
pub struct GenContext {
    /// Unknown names yield placeholders instead of errors.
    pub allow_partial_resolve: bool,
    /// Emitted ops are probe output, deleted after the pass.
    pub dummy_run: bool,
    /// Constant folding is permitted on binary ops.
    pub allow_const_eval: bool,
    /// Type bound to `this` in the enclosing function or method.
    pub this_type: Option<TypeId>,
    /// Expected function type at a call site; parameter inference for
    /// lambdas reads it.
    pub arg_type_dest: Option<TypeId>,
    /// When present, any outer-scope identifier use records the variable
    /// here. This is the sole capture-discovery signal.
    pub captured_vars_sink: Option<Rc<RefCell<CaptureSet>>>,
    /// Fields implicitly added to `this` (generator locals).
    pub extra_fields_sink: Option<Rc<RefCell<Vec<TupleField>>>>,
    /// Accumulates the unified return type across return sites.
    pub return_type_sink: Option<Rc<RefCell<ReturnTypeAcc>>>,
    /// The op whose region local allocation escapes into when
    /// `alloc_vars_outside_current_op` is set.
    pub current_op: Option<OpId>,
    pub alloc_vars_outside_current_op: bool,
    /// Allocate locals as fields of `this` (generator lowering).
    pub alloc_vars_in_this_context: bool,
    /// Per-scope type-alias overrides (safe-cast narrowing and alias
    /// computation extend this).
    pub type_alias_map: Rc<RefCell<FxHashMap<String, TypeId>>>,
    /// Unresolved references recorded this pass.
    pub unresolved_sink: Rc<RefCell<Vec<UnresolvedRef>>>,
    /// Monotonic yield-state ordinal.
    pub state_counter: Option<Rc<Cell<u32>>>,
    /// AST nodes injected ahead of the next block body (safe-cast
    /// narrowing).
    pub generated_statements: Rc<RefCell<Vec<Statement>>>,
    /// Skip statements already marked processed (rescheduled passes).
    pub skip_processed: bool,
}

impl GenContext {
    /// The strict root context of a definitive pass.
    pub fn strict() -> Self {
        GenContext::default()
    }

    /// The permissive root context of a discovery pass.
    pub fn dummy() -> Self {
        GenContext {
            allow_partial_resolve: true,
            dummy_run: true,
            ..GenContext::default()
        }
    }

    /// Child context with a fresh `generated_statements` channel and its
    /// own view of the alias overrides (entering a new block body).
    pub fn for_block(&self) -> Self {
        GenContext {
            generated_statements: Rc::new(RefCell::new(Vec::new())),
            type_alias_map: Rc::new(RefCell::new(self.type_alias_map.borrow().clone())),
            ..self.clone()
        }
    }

    /// Child context for a nested function body: capture and return
    /// channels do not leak across function boundaries.
    pub fn for_function(&self, this_type: Option<TypeId>) -> Self {
        GenContext {
            this_type,
            arg_type_dest: None,
            captured_vars_sink: None,
            extra_fields_sink: None,
            return_type_sink: None,
            current_op: None,
            alloc_vars_outside_current_op: false,
            alloc_vars_in_this_context: false,
            state_counter: None,
            generated_statements: Rc::new(RefCell::new(Vec::new())),
            ..self.clone()
        }
    }

    pub fn record_unresolved(&self, name: impl Into<String>, span: Span) {
        self.unresolved_sink.borrow_mut().push(UnresolvedRef {
            name: name.into(),
            span,
        });
    }

    pub fn record_capture(&self, var: CapturedVar) {
        if let Some(sink) = &self.captured_vars_sink {
            sink.borrow_mut().record(var);
        }
    }

    /// Next yield-state ordinal.
    pub fn next_state(&self) -> Option<u32> {
        self.state_counter.as_ref().map(|counter| {
            let state = counter.get() + 1;
            counter.set(state);
            state
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_set_dedupes_by_name() {
        let mut set = CaptureSet::default();
        let ty = tsir_types::TypeStore::new().number();
        set.record(CapturedVar {
            name: "x".into(),
            ty,
            by_ref: false,
        });
        set.record(CapturedVar {
            name: "x".into(),
            ty,
            by_ref: true,
        });
        assert_eq!(set.vars().len(), 1);
        assert!(!set.vars()[0].by_ref);
    }

    #[test]
    fn state_counter_is_shared_across_clones() {
        let ctx = GenContext {
            state_counter: Some(Rc::new(Cell::new(0))),
            ..GenContext::strict()
        };
        let child = ctx.for_block();
        assert_eq!(child.next_state(), Some(1));
        assert_eq!(ctx.next_state(), Some(2));
    }
}
