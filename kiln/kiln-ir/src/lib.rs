#![forbid(unsafe_code)]

//! The program module model: orchestration functions that dispatch to kernel functions,
//! both stored as arena-allocated syntax trees.

use std::str::FromStr;

use arcstr::ArcStr;
use indexmap::IndexMap;
use thin_vec::ThinVec;

use crate::arena::{Arena, NodeRef};

pub mod arena;
pub mod display;
pub mod parse;
pub mod span;
pub mod structural;
pub mod visitor;


pub use parse::{ParseError, parse_module};

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(pub u32);

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Binder {
    pub var: Var,
}

/// The name of a function defined at module level.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalVar(ArcStr);

impl GlobalVar {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self(name.into())
    }

    /// The bare identifier, without the `@` sigil.
    pub fn name_hint(&self) -> &ArcStr {
        &self.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Node(u32);

/// The syntax kind of a node.
#[derive(Clone, Debug)]
pub enum Kind {
    /// A variable reference.
    Var(Var),
    /// A unit value.
    Unit,
    /// A 64 bit signed integer
    I64(i64),
    /// A 64 bit float
    F64(f64),
    /// Reference to a function in the enclosing module.
    Global(GlobalVar),
    /// A function living outside the module, opaque to analysis.
    Extern(ArcStr),
    /// An operator call.
    ///
    /// In orchestration functions the arguments are never calls themselves.
    Call(Op, ThinVec<Node>),
    Tuple(ThinVec<Node>),
    /// Binds the value to a variable for the rest of the enclosing block.
    Let(Binder, Node),
    /// A sequence of nodes. The value is the value of the last node.
    Block(ThinVec<Node>),
    If(Node, Node, Node),
    /// A serial loop over `min..min + extent`.
    /// The loop variable is only in scope in the body.
    For(Binder, Node, Node, ThinVec<Node>),
    /// Read an element of a buffer
    Load(Var, ThinVec<Node>),
    /// Write an element of a buffer
    Store(Var, ThinVec<Node>, Node),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    /// Dispatch to a kernel function. Argument 0 is the callee,
    /// either a [Kind::Global] or a [Kind::Extern].
    Dispatch,
    Builtin(Builtin),
    /// An orchestration level operator, like `nn.relu`.
    Named(ArcStr),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Builtin {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    Lt,
    Le,
    Eq,
    Select,
}

impl Builtin {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Min => "min",
            Self::Max => "max",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Select => "select",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "min" => Self::Min,
            "max" => Self::Max,
            "<" => Self::Lt,
            "<=" => Self::Le,
            "==" => Self::Eq,
            "select" => Self::Select,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DType {
    Bool,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl FromStr for DType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "f16" => Ok(Self::F16),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            _ => Err(()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    Scalar(DType),
    /// Element type and static shape
    Tensor(DType, ThinVec<i64>),
}

#[derive(Clone, Debug)]
pub struct Param {
    pub binder: Binder,
    pub ty: Type,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FuncKind {
    /// A flattened, let-bound function issuing dispatches to kernels.
    Orchestration,
    /// A tunable compute definition.
    Kernel,
}

#[derive(Clone, Debug)]
pub struct Function {
    kind: FuncKind,
    params: ThinVec<Param>,
    body: Node,
    arena: Arena,
}

impl Function {
    pub fn new(kind: FuncKind, params: ThinVec<Param>, body: Node, arena: Arena) -> Self {
        Self {
            kind,
            params,
            body,
            arena,
        }
    }

    pub fn kind(&self) -> FuncKind {
        self.kind
    }

    pub fn is_kernel(&self) -> bool {
        matches!(self.kind, FuncKind::Kernel)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn body(&self) -> NodeRef<'_> {
        self.arena.node_ref(self.body)
    }

    pub fn node_ref(&self, node: Node) -> NodeRef<'_> {
        self.arena.node_ref(node)
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

/// A compilation unit: named functions in definition order.
#[derive(Clone, Default, Debug)]
pub struct Module {
    functions: IndexMap<GlobalVar, Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a function, returning any previous definition with the same name.
    /// A replaced function keeps its position in module order.
    pub fn insert(&mut self, global: GlobalVar, func: Function) -> Option<Function> {
        self.functions.insert(global, func)
    }

    pub fn lookup(&self, global: &GlobalVar) -> Option<&Function> {
        self.functions.get(global)
    }

    pub fn contains(&self, global: &GlobalVar) -> bool {
        self.functions.contains_key(global)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GlobalVar, &Function)> {
        self.functions.iter()
    }

    pub fn orchestration_funcs(&self) -> impl Iterator<Item = (&GlobalVar, &Function)> {
        self.iter()
            .filter(|(_, func)| matches!(func.kind, FuncKind::Orchestration))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<'m> IntoIterator for &'m Module {
    type Item = (&'m GlobalVar, &'m Function);
    type IntoIter = indexmap::map::Iter<'m, GlobalVar, Function>;

    fn into_iter(self) -> Self::IntoIter {
        self.functions.iter()
    }
}
