//! A thin handle bundling a root `Node` with the QID generator that
//! services its whole subtree.

use std::sync::Arc;

use crate::node::Node;
use crate::qid::QidGenerator;

/// A synthetic file tree: a root node plus the QID allocator shared by
/// every node reachable from it.
#[derive(Clone)]
pub struct Tree {
    root: Node,
}

impl Tree {
    /// A fresh, empty tree owned by `uid`/`gid`.
    pub fn new(uid: &str, gid: &str) -> Tree {
        Tree {
            root: Node::new_root(QidGenerator::new(), uid, gid),
        }
    }

    /// Wrap an already-constructed root node (e.g. one built up with
    /// `add_child` calls before the server starts).
    pub fn with_root(root: Node) -> Tree {
        Tree { root }
    }

    /// The tree's root node.
    pub fn root(&self) -> Node {
        self.root.clone()
    }

    /// The QID generator backing this tree, for building nodes destined
    /// to join it before the server starts.
    pub fn qid_generator(&self) -> Arc<QidGenerator> {
        self.root.qid_generator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcall::dm;
    use crate::node::Node;
    use crate::ops::Ops;

    #[test]
    fn root_is_reachable_and_self_parenting() {
        let tree = Tree::new("root", "root");
        let root = tree.root();
        assert!(root.is_dir());
        assert_eq!(root.parent(), root);
    }

    #[test]
    fn children_share_the_tree_qid_space() {
        let tree = Tree::new("root", "root");
        let root = tree.root();
        let a = Node::new(tree.qid_generator(), "a", 0o644, "root", "root", Ops::default());
        let b = Node::new(
            tree.qid_generator(),
            "b",
            dm::DIR | 0o755,
            "root",
            "root",
            Ops::default(),
        );
        root.add_child(a.clone()).unwrap();
        root.add_child(b.clone()).unwrap();
        assert_ne!(a.qid().path, b.qid().path);
    }
}
