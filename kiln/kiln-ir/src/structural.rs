//! Structural hashing and equality of functions, up to consistent renaming of bound variables.
//!
//! Binders get a canonical index in the order they are defined while walking the tree
//! in program order. Occurrences of bound variables are compared and hashed by that index,
//! free variables by identity. Two functions that differ only in the naming of their
//! parameters, `let` and loop variables are therefore equal and hash the same.

use std::hash::{Hash, Hasher};

use fnv::{FnvHashMap, FnvHasher};

use crate::{Function, Kind, Module, Node, Var, arena::Arena, arena::NodeRef};

/// Deterministic structural hash of a function.
///
/// `structural_eq(a, b)` implies `structural_hash(a) == structural_hash(b)`.
pub fn structural_hash(func: &Function) -> u64 {
    let mut hasher = StructuralHasher::default();
    hasher.hash_function(func);
    hasher.state.finish()
}

/// Deep structural equality of two functions, modulo alpha-renaming.
pub fn structural_eq(a: &Function, b: &Function) -> bool {
    StructuralEq::default().eq_function(a, b)
}

impl Module {
    /// Structural hash of all functions in module order, including their names.
    pub fn structural_hash(&self) -> u64 {
        let mut state = FnvHasher::default();
        state.write_usize(self.len());
        for (global, func) in self {
            global.name_hint().as_str().hash(&mut state);
            state.write_u64(structural_hash(func));
        }
        state.finish()
    }

    pub fn structural_eq(&self, other: &Module) -> bool {
        self.len() == other.len()
            && self.iter().zip(other.iter()).all(|((ga, fa), (gb, fb))| {
                ga == gb && structural_eq(fa, fb)
            })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum VarRef {
    Bound(u32),
    Free(Var),
}

/// Canonical binder numbering with lexical scoping.
#[derive(Default)]
struct BindOrder {
    next: u32,
    indices: FnvHashMap<Var, u32>,
    /// Shadowed definitions to restore when leaving a scope
    undo: Vec<(Var, Option<u32>)>,
}

impl BindOrder {
    fn define(&mut self, var: Var) {
        let index = self.next;
        self.next += 1;
        let shadowed = self.indices.insert(var, index);
        self.undo.push((var, shadowed));
    }

    fn resolve(&self, var: Var) -> VarRef {
        match self.indices.get(&var) {
            Some(index) => VarRef::Bound(*index),
            None => VarRef::Free(var),
        }
    }

    fn enter(&self) -> usize {
        self.undo.len()
    }

    fn exit(&mut self, scope: usize) {
        while self.undo.len() > scope {
            let Some((var, shadowed)) = self.undo.pop() else {
                break;
            };
            match shadowed {
                Some(index) => {
                    self.indices.insert(var, index);
                }
                None => {
                    self.indices.remove(&var);
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
#[repr(u8)]
enum Tag {
    Var,
    Unit,
    I64,
    F64,
    Global,
    Extern,
    Call,
    Tuple,
    Let,
    Block,
    If,
    For,
    Load,
    Store,
}

#[derive(Default)]
struct StructuralHasher {
    state: FnvHasher,
    binds: BindOrder,
}

impl StructuralHasher {
    fn hash_function(&mut self, func: &Function) {
        func.kind().hash(&mut self.state);
        self.state.write_usize(func.params().len());
        for param in func.params() {
            param.ty.hash(&mut self.state);
            self.binds.define(param.binder.var);
        }
        self.hash_node(func.body());
    }

    fn hash_node(&mut self, node_ref: NodeRef) {
        let arena = node_ref.arena();
        match node_ref.kind() {
            Kind::Var(var) => {
                self.tag(Tag::Var);
                self.hash_var(*var);
            }
            Kind::Unit => self.tag(Tag::Unit),
            Kind::I64(int) => {
                self.tag(Tag::I64);
                self.state.write_i64(*int);
            }
            Kind::F64(float) => {
                self.tag(Tag::F64);
                self.state.write_u64(float.to_bits());
            }
            Kind::Global(global) => {
                self.tag(Tag::Global);
                global.name_hint().as_str().hash(&mut self.state);
            }
            Kind::Extern(name) => {
                self.tag(Tag::Extern);
                name.as_str().hash(&mut self.state);
            }
            Kind::Call(op, args) => {
                self.tag(Tag::Call);
                op.hash(&mut self.state);
                self.hash_nodes(arena, args);
            }
            Kind::Tuple(elements) => {
                self.tag(Tag::Tuple);
                self.hash_nodes(arena, elements);
            }
            Kind::Let(binder, value) => {
                self.tag(Tag::Let);
                self.hash_node(arena.node_ref(*value));
                self.binds.define(binder.var);
            }
            Kind::Block(nodes) => {
                self.tag(Tag::Block);
                let scope = self.binds.enter();
                self.hash_nodes(arena, nodes);
                self.binds.exit(scope);
            }
            Kind::If(cond, then, otherwise) => {
                self.tag(Tag::If);
                self.hash_node(arena.node_ref(*cond));
                for branch in [then, otherwise] {
                    let scope = self.binds.enter();
                    self.hash_node(arena.node_ref(*branch));
                    self.binds.exit(scope);
                }
            }
            Kind::For(binder, min, extent, body) => {
                self.tag(Tag::For);
                self.hash_node(arena.node_ref(*min));
                self.hash_node(arena.node_ref(*extent));
                let scope = self.binds.enter();
                self.binds.define(binder.var);
                self.hash_nodes(arena, body);
                self.binds.exit(scope);
            }
            Kind::Load(buffer, indices) => {
                self.tag(Tag::Load);
                self.hash_var(*buffer);
                self.hash_nodes(arena, indices);
            }
            Kind::Store(buffer, indices, value) => {
                self.tag(Tag::Store);
                self.hash_var(*buffer);
                self.hash_nodes(arena, indices);
                self.hash_node(arena.node_ref(*value));
            }
        }
    }

    fn hash_nodes(&mut self, arena: &Arena, nodes: &[Node]) {
        self.state.write_usize(nodes.len());
        for node_ref in arena.node_refs(nodes) {
            self.hash_node(node_ref);
        }
    }

    fn hash_var(&mut self, var: Var) {
        self.binds.resolve(var).hash(&mut self.state);
    }

    fn tag(&mut self, tag: Tag) {
        self.state.write_u8(tag as u8);
    }
}

/// Walks two trees in lockstep, numbering binders on both sides in parallel.
#[derive(Default)]
struct StructuralEq {
    lhs: BindOrder,
    rhs: BindOrder,
}

impl StructuralEq {
    fn eq_function(&mut self, a: &Function, b: &Function) -> bool {
        if a.kind() != b.kind() || a.params().len() != b.params().len() {
            return false;
        }
        for (pa, pb) in a.params().iter().zip(b.params()) {
            if pa.ty != pb.ty {
                return false;
            }
            self.define(pa.binder.var, pb.binder.var);
        }
        self.eq_node(a.body(), b.body())
    }

    fn eq_node(&mut self, a: NodeRef, b: NodeRef) -> bool {
        let (aa, ab) = (a.arena(), b.arena());
        match (a.kind(), b.kind()) {
            (Kind::Var(va), Kind::Var(vb)) => self.eq_var(*va, *vb),
            (Kind::Unit, Kind::Unit) => true,
            (Kind::I64(ia), Kind::I64(ib)) => ia == ib,
            (Kind::F64(fa), Kind::F64(fb)) => fa.to_bits() == fb.to_bits(),
            (Kind::Global(ga), Kind::Global(gb)) => ga == gb,
            (Kind::Extern(na), Kind::Extern(nb)) => na == nb,
            (Kind::Call(op_a, args_a), Kind::Call(op_b, args_b)) => {
                op_a == op_b && self.eq_nodes(aa, args_a, ab, args_b)
            }
            (Kind::Tuple(ea), Kind::Tuple(eb)) => self.eq_nodes(aa, ea, ab, eb),
            (Kind::Let(ba, va), Kind::Let(bb, vb)) => {
                if !self.eq_node(aa.node_ref(*va), ab.node_ref(*vb)) {
                    return false;
                }
                self.define(ba.var, bb.var);
                true
            }
            (Kind::Block(na), Kind::Block(nb)) => {
                let scope = self.enter();
                let eq = self.eq_nodes(aa, na, ab, nb);
                self.exit(scope);
                eq
            }
            (Kind::If(ca, ta, ea), Kind::If(cb, tb, eb)) => {
                if !self.eq_node(aa.node_ref(*ca), ab.node_ref(*cb)) {
                    return false;
                }
                for (branch_a, branch_b) in [(ta, tb), (ea, eb)] {
                    let scope = self.enter();
                    let eq = self.eq_node(aa.node_ref(*branch_a), ab.node_ref(*branch_b));
                    self.exit(scope);
                    if !eq {
                        return false;
                    }
                }
                true
            }
            (Kind::For(ba, min_a, ext_a, body_a), Kind::For(bb, min_b, ext_b, body_b)) => {
                if !self.eq_node(aa.node_ref(*min_a), ab.node_ref(*min_b))
                    || !self.eq_node(aa.node_ref(*ext_a), ab.node_ref(*ext_b))
                {
                    return false;
                }
                let scope = self.enter();
                self.define(ba.var, bb.var);
                let eq = self.eq_nodes(aa, body_a, ab, body_b);
                self.exit(scope);
                eq
            }
            (Kind::Load(buf_a, idx_a), Kind::Load(buf_b, idx_b)) => {
                self.eq_var(*buf_a, *buf_b) && self.eq_nodes(aa, idx_a, ab, idx_b)
            }
            (Kind::Store(buf_a, idx_a, va), Kind::Store(buf_b, idx_b, vb)) => {
                self.eq_var(*buf_a, *buf_b)
                    && self.eq_nodes(aa, idx_a, ab, idx_b)
                    && self.eq_node(aa.node_ref(*va), ab.node_ref(*vb))
            }
            _ => false,
        }
    }

    fn eq_nodes(&mut self, aa: &Arena, na: &[Node], ab: &Arena, nb: &[Node]) -> bool {
        na.len() == nb.len()
            && aa
                .node_refs(na)
                .zip(ab.node_refs(nb))
                .all(|(a, b)| self.eq_node(a, b))
    }

    fn eq_var(&self, a: Var, b: Var) -> bool {
        self.lhs.resolve(a) == self.rhs.resolve(b)
    }

    fn define(&mut self, a: Var, b: Var) {
        self.lhs.define(a);
        self.rhs.define(b);
    }

    fn enter(&self) -> (usize, usize) {
        (self.lhs.enter(), self.rhs.enter())
    }

    fn exit(&mut self, (lhs, rhs): (usize, usize)) {
        self.lhs.exit(lhs);
        self.rhs.exit(rhs);
    }
}
