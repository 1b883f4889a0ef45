//! The in-memory tree node.
//!
//! A `Node` is a cheaply-cloned handle (`Arc`) to shared, mutex-protected
//! state: its stat block, its parent (a `Weak` back-reference, `None`
//! meaning "I am the root and my own parent"), and its children. Locks
//! are plain `std::sync::Mutex` and are never held across an `.await`
//! point; capability invocations always happen with no lock held.

use std::sync::{Arc, Mutex, Weak};

use crate::error::Error;
use crate::fcall::{Qid, QidType, Stat, dm};
use crate::ops::Ops;
use crate::qid::QidGenerator;
use crate::utils::Result;

struct NodeState {
    stat: Stat,
    parent: Option<Weak<NodeInner>>,
    children: Vec<Node>,
}

struct NodeInner {
    state: Mutex<NodeState>,
    ops: Ops,
    qids: Arc<QidGenerator>,
}

/// A handle to a node in the tree. Cloning a `Node` is cheap and shares
/// the same underlying state.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Node {}

impl Node {
    /// Construct the self-parenting root of a tree.
    pub fn new_root(qids: Arc<QidGenerator>, uid: &str, gid: &str) -> Node {
        let stat = Stat {
            typ: 0,
            dev: 0,
            qid: Qid {
                typ: QidType::DIR,
                version: 0,
                path: 0,
            },
            mode: dm::DIR | 0o755,
            atime: 0,
            mtime: 0,
            length: 0,
            name: String::new(),
            uid: uid.to_owned(),
            gid: gid.to_owned(),
            muid: uid.to_owned(),
            extension: String::new(),
            n_uid: u32::MAX,
            n_gid: u32::MAX,
            n_muid: u32::MAX,
        };
        Node(Arc::new(NodeInner {
            state: Mutex::new(NodeState {
                stat,
                parent: None,
                children: Vec::new(),
            }),
            ops: Ops::default(),
            qids,
        }))
    }

    /// Construct a freestanding node (not yet attached to any parent)
    /// with a fresh QID path drawn from the same generator as the tree
    /// it will join.
    pub fn new(qids: Arc<QidGenerator>, name: &str, mode: u32, uid: &str, gid: &str, ops: Ops) -> Node {
        let path = qids.next_path();
        let stat = Stat {
            typ: 0,
            dev: 0,
            qid: Qid {
                typ: QidType::from_mode(mode),
                version: 0,
                path,
            },
            mode,
            atime: 0,
            mtime: 0,
            length: 0,
            name: name.to_owned(),
            uid: uid.to_owned(),
            gid: gid.to_owned(),
            muid: uid.to_owned(),
            extension: String::new(),
            n_uid: u32::MAX,
            n_gid: u32::MAX,
            n_muid: u32::MAX,
        };
        Node(Arc::new(NodeInner {
            state: Mutex::new(NodeState {
                stat,
                parent: None,
                children: Vec::new(),
            }),
            ops,
            qids,
        }))
    }

    /// The QID generator servicing this node's tree, for capability
    /// implementations (e.g. `CreateOp`) constructing new children.
    pub fn qid_generator(&self) -> Arc<QidGenerator> {
        self.0.qids.clone()
    }

    /// This node's capability record.
    pub fn ops(&self) -> &Ops {
        &self.0.ops
    }

    /// A snapshot of this node's stat block.
    pub fn stat(&self) -> Stat {
        self.0.state.lock().unwrap().stat.clone()
    }

    /// The node's QID, as it stands right now.
    pub fn qid(&self) -> Qid {
        self.0.state.lock().unwrap().stat.qid
    }

    /// True if this node's mode carries the directory bit.
    pub fn is_dir(&self) -> bool {
        self.0.state.lock().unwrap().stat.mode & dm::DIR != 0
    }

    /// This node's current name.
    pub fn name(&self) -> String {
        self.0.state.lock().unwrap().stat.name.clone()
    }

    /// Mutate the stored stat block, bumping `qid.version` so clients
    /// can observe the change.
    pub fn with_stat_mut<F: FnOnce(&mut Stat)>(&self, f: F) {
        let mut state = self.0.state.lock().unwrap();
        f(&mut state.stat);
        state.stat.qid.version = state.stat.qid.version.wrapping_add(1);
    }

    /// This node's parent, or itself if it is the root.
    pub fn parent(&self) -> Node {
        let state = self.0.state.lock().unwrap();
        match state.parent {
            Some(ref weak) => match weak.upgrade() {
                Some(inner) => Node(inner),
                None => self.clone(),
            },
            None => self.clone(),
        }
    }

    /// True if this node has no parent reference, i.e. is a tree root.
    pub fn is_root(&self) -> bool {
        self.0.state.lock().unwrap().parent.is_none()
    }

    /// A snapshot of this node's children.
    pub fn children(&self) -> Vec<Node> {
        self.0.state.lock().unwrap().children.clone()
    }

    /// Find a direct child by name.
    pub fn find(&self, name: &str) -> Option<Node> {
        self.0
            .state
            .lock()
            .unwrap()
            .children
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Attach `child` as a new last-ordered child of `self`, rejecting a
    /// duplicate name atomically against this node's own lock.
    pub fn add_child(&self, child: Node) -> Result<()> {
        let name = child.name();
        let mut state = self.0.state.lock().unwrap();
        if state.children.iter().any(|c| c.name() == name) {
            return Err(Error::eexist());
        }
        child.set_parent(self);
        state.children.push(child);
        Ok(())
    }

    fn set_parent(&self, parent: &Node) {
        let mut state = self.0.state.lock().unwrap();
        state.parent = Some(Arc::downgrade(&parent.0));
    }

    /// Detach this node from its parent's children list. Fails with
    /// `Enotempty` if this node is a non-empty directory, and is a
    /// no-op error for the root (which has no parent to detach from).
    pub fn detach(&self) -> Result<()> {
        if self.is_dir() && !self.children().is_empty() {
            return Err(Error::enotempty());
        }
        if self.is_root() {
            return Err(Error::eperm());
        }
        let parent = self.parent();
        let mut state = parent.0.state.lock().unwrap();
        let my_name = self.name();
        state.children.retain(|c| c.name() != my_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Node {
        Node::new_root(QidGenerator::new(), "root", "root")
    }

    fn file(root: &Node, name: &str) -> Node {
        Node::new(
            root.qid_generator(),
            name,
            0o644,
            "root",
            "root",
            Ops::default(),
        )
    }

    #[test]
    fn root_is_its_own_parent() {
        let r = root();
        assert_eq!(r.parent(), r);
        assert!(r.is_root());
    }

    #[test]
    fn add_child_sets_parent_back_reference() {
        let r = root();
        let f = file(&r, "a");
        r.add_child(f.clone()).unwrap();
        assert_eq!(f.parent(), r);
        assert_eq!(r.find("a"), Some(f));
    }

    #[test]
    fn duplicate_name_rejected() {
        let r = root();
        r.add_child(file(&r, "a")).unwrap();
        let err = r.add_child(file(&r, "a")).unwrap_err();
        assert_eq!(err.errno(), crate::error::errno::EEXIST);
    }

    #[test]
    fn detach_removes_from_parent() {
        let r = root();
        let f = file(&r, "a");
        r.add_child(f.clone()).unwrap();
        f.detach().unwrap();
        assert_eq!(r.find("a"), None);
    }

    #[test]
    fn detach_nonempty_directory_fails() {
        let r = root();
        let dir = Node::new(
            r.qid_generator(),
            "d",
            dm::DIR | 0o755,
            "root",
            "root",
            Ops::default(),
        );
        r.add_child(dir.clone()).unwrap();
        dir.add_child(file(&r, "inner")).unwrap();

        let err = dir.detach().unwrap_err();
        assert_eq!(err.errno(), crate::error::errno::EPERM);
    }
}
