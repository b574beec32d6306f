//! Operation definitions

use crate::module::{RegionId, ValueId};
use std::fmt;
use tsir_ast::Span;
use tsir_types::TypeId;

/// Unique identifier of an operation within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub(crate) u32);

impl OpId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn new(index: usize) -> Self {
        OpId(index as u32)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Arithmetic and comparison operators carried by a `Binary` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Shl,
    Shr,
    ShrU,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Operators carried by a `Unary` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Every operation kind the lowering core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Function definition; region 0 is the body. `sym_name` attribute.
    Func,
    /// Constant value; `value` attribute.
    Constant,
    /// Undefined value of the result type.
    Undef,
    /// Local variable slot; result is a ref; operand 0 (optional) is the
    /// initializer.
    Variable,
    /// Module-level global; `sym_name` attribute; optional init region.
    Global,
    /// Module-initialization function reference; `sym_name` attribute.
    GlobalConstructor,
    Store,
    Load,
    AddressOf,
    /// Ref to a named field of a tuple/object ref; `field` attribute.
    PropertyRef,
    /// Ref to an array element; operands: array ref, index.
    ElementRef,
    /// Read a field out of a tuple value; `field` attribute.
    ExtractField,
    /// Functional field update on a tuple value; `field` attribute.
    InsertProperty,
    Length,
    TypeOf,

    // ── Control flow (regions) ──────────────────────────────────────────
    /// Region 0 = then, region 1 = else (may be empty).
    If,
    /// Region 0 = condition, region 1 = body. `label` attribute optional.
    While,
    DoWhile,
    /// Regions: init, condition, body, increment.
    For,
    /// Operand 0 = discriminant; one region per case plus merge;
    /// `case_values` layout in attributes.
    Switch,
    /// Dispatch to the state label matching operand 0.
    SwitchState,
    /// Regions: body, one per catch, finally.
    Try,
    Throw,
    /// Binds the caught value inside a try catch region.
    Catch,
    ReturnVal,
    YieldReturnVal,
    /// Generator re-entry point; `state` attribute.
    StateLabel,
    /// Structured break; optional `label` attribute.
    Break,
    /// Structured continue; optional `label` attribute.
    Continue,
    /// Labeled wrapper op; region 0 = body, `label` attribute.
    Labeled,

    // ── Calls and references ────────────────────────────────────────────
    /// Direct call; `callee` attribute names the target symbol.
    Call,
    /// Indirect call; operand 0 is the callee value.
    CallIndirect,
    /// Reference to a symbol by name; `sym_name` attribute.
    SymbolRef,
    /// Method reference through `this`; `sym_name` attribute.
    ThisSymbolRef,
    /// Virtual method reference through `this`; `vtable_index` attribute.
    ThisVirtualSymbolRef,
    /// Interface member reference; `vtable_index` attribute.
    InterfaceSymbolRef,
    /// Offset of a field for an interface adapter slot; `field` attribute.
    VTableOffsetRef,

    // ── Objects ─────────────────────────────────────────────────────────
    New,
    NewArray,
    Delete,
    Cast,
    ExtractInterfaceThis,
    NewInterface,
    CreateBoundFunction,
    CreateTuple,
    CreateArray,
    /// Materializes a capture tuple; operands are the captured storages.
    Capture,
    /// Stack thunk binding a capture tuple to a function symbol.
    Trampoline,
    AccessorRead,
    AccessorWrite,

    // ── Arithmetic ──────────────────────────────────────────────────────
    /// `binop` attribute.
    Binary,
    /// `unop` attribute.
    Unary,

    // ── Async ───────────────────────────────────────────────────────────
    /// Region 0 = the awaited computation.
    AsyncExec,
    CreateTaskGroup,
    /// Operand 0 = group; region 0 = task body.
    SubmitAsync,
    AwaitAll,
}

impl OpKind {
    /// Ops that transfer control out of their enclosing region. A
    /// yield-return is not one: the generator resumes at the state
    /// label planted right after it.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpKind::ReturnVal | OpKind::Throw | OpKind::Break | OpKind::Continue
        )
    }

    /// Ops registered in the module symbol table.
    pub fn defines_symbol(self) -> bool {
        matches!(self, OpKind::Func | OpKind::Global | OpKind::GlobalConstructor)
    }
}

/// An attribute value attached to an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Type(TypeId),
    BinOp(BinOp),
    UnOp(UnOp),
    /// List attribute (switch case values, vtable entry descriptions).
    List(Vec<Attribute>),
    Unit,
}

impl Attribute {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attribute::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            Attribute::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Attribute::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One operation. Operands reference SSA values; regions hold nested
/// blocks; attributes carry compile-time payloads.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attributes: Vec<(String, Attribute)>,
    pub regions: Vec<RegionId>,
    pub location: Span,
    /// Tombstone set by `erase_op`; erased ops stay in the arena but are
    /// detached from every block.
    pub erased: bool,
}

impl Operation {
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }

    pub fn set_attr(&mut self, name: &str, value: Attribute) {
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    pub fn sym_name(&self) -> Option<&str> {
        self.attr("sym_name").and_then(|a| a.as_str())
    }

    pub fn result(&self, index: usize) -> ValueId {
        self.results[index]
    }
}
