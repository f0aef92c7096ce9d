use std::fmt::{Debug, Display, Formatter};

use crate::{
    DType, FuncKind, Function, GlobalVar, Kind, Module, Node, Op, Param, Type, Var,
    arena::{Arena, NodeRef},
};

type PrintResult = std::fmt::Result;

/// Prints the s-expression text format accepted by [crate::parse_module].
///
/// Control structures (`block`, `if`, `for`) put each child on its own line,
/// everything else is printed inline.
#[derive(Clone, Copy, Default)]
pub struct Printer {
    level: usize,
}

impl Printer {
    fn nested(self) -> Self {
        Self {
            level: self.level + 1,
        }
    }

    pub fn print_function(
        self,
        global: &GlobalVar,
        func: &Function,
        f: &mut Formatter,
    ) -> PrintResult {
        let keyword = match func.kind() {
            FuncKind::Orchestration => "func",
            FuncKind::Kernel => "kernel",
        };
        write!(f, "({keyword} {global} (")?;
        for (index, param) in func.params().iter().enumerate() {
            if index > 0 {
                write!(f, " ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")?;
        write!(f, "{}", Indent(self.level + 1))?;
        self.nested().print_node(func.body(), f)?;
        write!(f, "{})", Indent(self.level))
    }

    pub fn print_node(self, node_ref: NodeRef, f: &mut Formatter) -> PrintResult {
        let arena = node_ref.arena();
        match node_ref.kind() {
            Kind::Var(var) => write!(f, "{var}"),
            Kind::Unit => write!(f, "#u"),
            Kind::I64(int) => write!(f, "{int}"),
            Kind::F64(float) => write!(f, "{float:?}"),
            Kind::Global(global) => write!(f, "{global}"),
            Kind::Extern(name) => write!(f, "(extern {name})"),
            Kind::Call(op, args) => {
                match op {
                    Op::Dispatch => write!(f, "(dispatch")?,
                    Op::Builtin(builtin) => write!(f, "({}", builtin.symbol())?,
                    Op::Named(name) => write!(f, "(call {name}")?,
                }
                self.print_inline(arena, args, f)?;
                write!(f, ")")
            }
            Kind::Tuple(elements) => {
                write!(f, "(tuple")?;
                self.print_inline(arena, elements, f)?;
                write!(f, ")")
            }
            Kind::Let(binder, value) => {
                write!(f, "(let {} ", binder.var)?;
                self.print_node(arena.node_ref(*value), f)?;
                write!(f, ")")
            }
            Kind::Block(nodes) => {
                write!(f, "(block")?;
                self.print_lines(arena, nodes, f)?;
                write!(f, "{})", Indent(self.level))
            }
            Kind::If(cond, then, otherwise) => {
                write!(f, "(if ")?;
                self.print_node(arena.node_ref(*cond), f)?;
                self.print_lines(arena, &[*then, *otherwise], f)?;
                write!(f, "{})", Indent(self.level))
            }
            Kind::For(binder, min, extent, body) => {
                write!(f, "(for ({}) ", binder.var)?;
                self.print_node(arena.node_ref(*min), f)?;
                write!(f, " ")?;
                self.print_node(arena.node_ref(*extent), f)?;
                self.print_lines(arena, body, f)?;
                write!(f, "{})", Indent(self.level))
            }
            Kind::Load(buffer, indices) => {
                write!(f, "(load {buffer} ")?;
                self.print_indices(arena, indices, f)?;
                write!(f, ")")
            }
            Kind::Store(buffer, indices, value) => {
                write!(f, "(store {buffer} ")?;
                self.print_indices(arena, indices, f)?;
                write!(f, " ")?;
                self.print_node(arena.node_ref(*value), f)?;
                write!(f, ")")
            }
        }
    }

    fn print_inline(self, arena: &Arena, nodes: &[Node], f: &mut Formatter) -> PrintResult {
        for node_ref in arena.node_refs(nodes) {
            write!(f, " ")?;
            self.print_node(node_ref, f)?;
        }
        Ok(())
    }

    fn print_lines(self, arena: &Arena, nodes: &[Node], f: &mut Formatter) -> PrintResult {
        for node_ref in arena.node_refs(nodes) {
            write!(f, "{}", Indent(self.level + 1))?;
            self.nested().print_node(node_ref, f)?;
        }
        Ok(())
    }

    fn print_indices(self, arena: &Arena, indices: &[Node], f: &mut Formatter) -> PrintResult {
        write!(f, "[")?;
        for (index, node_ref) in arena.node_refs(indices).enumerate() {
            if index > 0 {
                write!(f, " ")?;
            }
            self.print_node(node_ref, f)?;
        }
        write!(f, "]")
    }
}

/// Newline followed by indentation
#[derive(Clone, Copy)]
struct Indent(usize);

impl Display for Indent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        for _ in 0..self.0 {
            write!(f, "    ")?;
        }
        Ok(())
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(module")?;
        for (global, func) in self {
            write!(f, "{}", Indent(1))?;
            Printer { level: 1 }.print_function(global, func, f)?;
        }
        write!(f, "{})", Indent(0))
    }
}

impl Display for NodeRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Printer::default().print_node(*self, f)
    }
}

impl Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} {})", self.binder.var, self.ty)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(dtype) => write!(f, "(scalar {dtype})"),
            Self::Tensor(dtype, shape) => {
                write!(f, "(tensor {dtype} [")?;
                for (index, dim) in shape.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{dim}")?;
                }
                write!(f, "])")
            }
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for GlobalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl Debug for GlobalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GlobalVar({})", self.0)
    }
}

pub struct AsAlpha(pub u32);

impl Display for AsAlpha {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 >= 26 {
            write!(f, "{}", AsAlpha((self.0 / 26) - 1))?;
        }

        let rem = self.0 % 26;
        write!(f, "{}", char::from(b'a' + rem as u8))
    }
}

impl Debug for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Var({})", AsAlpha(self.0))
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", AsAlpha(self.0))
    }
}

#[test]
fn test_as_alpha() {
    assert_eq!("a", format!("{}", AsAlpha(0)));
    assert_eq!("z", format!("{}", AsAlpha(25)));
    assert_eq!("aa", format!("{}", AsAlpha(26)));
    assert_eq!("az", format!("{}", AsAlpha(51)));
    assert_eq!("ba", format!("{}", AsAlpha(52)));
    assert_eq!("yq", format!("{}", AsAlpha(666)));
}
