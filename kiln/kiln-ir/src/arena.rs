use crate::{Kind, Node};

#[derive(Clone, Default, Debug)]
pub struct Arena {
    nodes: Vec<Kind>,
}

impl Arena {
    pub fn add(&mut self, kind: Kind) -> Node {
        let idx = self.nodes.len();
        self.nodes.push(kind);
        Node(idx as u32)
    }

    pub fn node_ref(&self, node: Node) -> NodeRef<'_> {
        NodeRef { arena: self, node }
    }

    pub fn node_refs<'a>(&'a self, nodes: &'a [Node]) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        nodes.iter().map(|node| self.node_ref(*node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    arena: &'a Arena,
    node: Node,
}

impl<'a> NodeRef<'a> {
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn kind(&self) -> &'a Kind {
        &self.arena.nodes[self.node.0 as usize]
    }
}
