use std::ops::ControlFlow;

use crate::{Function, GlobalVar, Kind, Node, Var, arena::Arena, arena::NodeRef};

/// Program order traversal of a function body.
///
/// Children are visited left to right: a `let` value before the binder it defines,
/// `if` as condition, then-branch, else-branch, and `for` as bounds, binder, body.
/// Returning [ControlFlow::Break] from any hook aborts the traversal.
pub trait IrVisitor<'a> {
    type Break;

    fn visit_function(&mut self, func: &'a Function) -> ControlFlow<Self::Break> {
        for param in func.params() {
            self.visit_binder(param.binder.var)?;
        }
        self.visit_node(0, func.body())
    }

    #[allow(unused_variables)]
    fn visit_node(&mut self, index: usize, node_ref: NodeRef<'a>) -> ControlFlow<Self::Break> {
        self.traverse_node(node_ref)
    }

    #[allow(unused_variables)]
    fn visit_binder(&mut self, var: Var) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    #[allow(unused_variables)]
    fn visit_var(&mut self, var: Var) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    #[allow(unused_variables)]
    fn visit_global(&mut self, global: &'a GlobalVar) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    fn traverse_node(&mut self, node_ref: NodeRef<'a>) -> ControlFlow<Self::Break> {
        let arena = node_ref.arena();
        match node_ref.kind() {
            Kind::Var(var) => self.visit_var(*var),
            Kind::Unit | Kind::I64(_) | Kind::F64(_) | Kind::Extern(_) => ControlFlow::Continue(()),
            Kind::Global(global) => self.visit_global(global),
            Kind::Call(_, nodes) | Kind::Tuple(nodes) | Kind::Block(nodes) => {
                self.traverse_nodes(0, nodes, arena)
            }
            Kind::Let(binder, value) => {
                self.visit_node(0, arena.node_ref(*value))?;
                self.visit_binder(binder.var)
            }
            Kind::If(cond, then, otherwise) => {
                self.visit_node(0, arena.node_ref(*cond))?;
                self.visit_node(1, arena.node_ref(*then))?;
                self.visit_node(2, arena.node_ref(*otherwise))
            }
            Kind::For(binder, min, extent, body) => {
                self.visit_node(0, arena.node_ref(*min))?;
                self.visit_node(1, arena.node_ref(*extent))?;
                self.visit_binder(binder.var)?;
                self.traverse_nodes(2, body, arena)
            }
            Kind::Load(buffer, indices) => {
                self.visit_var(*buffer)?;
                self.traverse_nodes(0, indices, arena)
            }
            Kind::Store(buffer, indices, value) => {
                self.visit_var(*buffer)?;
                self.traverse_nodes(0, indices, arena)?;
                self.visit_node(indices.len(), arena.node_ref(*value))
            }
        }
    }

    fn traverse_nodes(
        &mut self,
        offset: usize,
        nodes: &'a [Node],
        arena: &'a Arena,
    ) -> ControlFlow<Self::Break> {
        for (index, node_ref) in arena.node_refs(nodes).enumerate() {
            self.visit_node(offset + index, node_ref)?;
        }
        ControlFlow::Continue(())
    }
}
