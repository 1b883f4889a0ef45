//! A small demonstrator filesystem built on top of the `p9srv` library:
//! an in-memory tree with plain byte-backed files and directories that
//! support `Tcreate`/`Tremove`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Parser;
use log::info;

use p9srv::error::Error;
use p9srv::fcall::{Data, Stat, dm};
use p9srv::node::Node;
use p9srv::ops::{CreateOp, Ops, ReadOp, RemoveOp, WriteOp};
use p9srv::perm::Identity;
use p9srv::srv::Server;
use p9srv::tree::Tree;
use p9srv::utils::Result;

/// Byte-backed in-memory file content, shared between a node's
/// `ReadOp`/`WriteOp`.
struct MemFile {
    data: Mutex<Vec<u8>>,
}

impl MemFile {
    fn new(initial: Vec<u8>) -> Arc<MemFile> {
        Arc::new(MemFile {
            data: Mutex::new(initial),
        })
    }
}

#[async_trait]
impl ReadOp for MemFile {
    async fn read(&self, _node: &Node, offset: u64, count: u32) -> Result<Data> {
        let data = self.data.lock().unwrap();
        let start = offset as usize;
        if start >= data.len() {
            return Ok(Data(Vec::new()));
        }
        let end = std::cmp::min(data.len(), start + count as usize);
        Ok(Data(data[start..end].to_vec()))
    }
}

#[async_trait]
impl WriteOp for MemFile {
    async fn write(&self, node: &Node, offset: u64, buf: &Data) -> Result<u32> {
        let mut data = self.data.lock().unwrap();
        let start = offset as usize;
        if start > data.len() {
            data.resize(start, 0);
        }
        let end = start + buf.0.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(&buf.0);
        let len = data.len() as u64;
        drop(data);
        node.with_stat_mut(|s| s.length = len);
        Ok(buf.0.len() as u32)
    }
}

/// Detaches a child from its parent on `Tremove`. Installed on every
/// directory in this demonstrator (the parent owns the decision, not the
/// victim); all the structural work lives in `Node::detach`.
struct Unlink;

#[async_trait]
impl RemoveOp for Unlink {
    async fn remove(&self, node: &Node, _who: &dyn Identity) -> Result<()> {
        node.detach()
    }
}

/// Lets a directory serve `Tcreate` by minting a new plain file or
/// subdirectory underneath it.
struct MkChild;

#[async_trait]
impl CreateOp for MkChild {
    async fn create(
        &self,
        parent: &Node,
        name: &str,
        perm: u32,
        _mode: u8,
        who: &dyn Identity,
    ) -> Result<Node> {
        if parent.find(name).is_some() {
            return Err(Error::eexist());
        }

        let is_dir = perm & dm::DIR != 0;
        let ops = if is_dir {
            Ops {
                create: Some(Arc::new(MkChild)),
                remove: Some(Arc::new(Unlink)),
                ..Default::default()
            }
        } else {
            let file = MemFile::new(Vec::new());
            Ops {
                read: Some(file.clone()),
                write: Some(file),
                ..Default::default()
            }
        };

        let child = Node::new(parent.qid_generator(), name, perm, who.name(), "ramfs", ops);
        parent.add_child(child.clone())?;
        Ok(child)
    }
}

fn seed_file(tree: &Tree, parent: &Node, name: &str, contents: &[u8]) {
    let file = MemFile::new(contents.to_vec());
    let ops = Ops {
        read: Some(file.clone()),
        write: Some(file),
        ..Default::default()
    };
    let node = Node::new(tree.qid_generator(), name, 0o644, "root", "root", ops);
    node.with_stat_mut(|s: &mut Stat| s.length = contents.len() as u64);
    parent.add_child(node).expect("seed names are unique");
}

fn seed_dir(tree: &Tree, parent: &Node, name: &str) -> Node {
    let ops = Ops {
        create: Some(Arc::new(MkChild)),
        remove: Some(Arc::new(Unlink)),
        ..Default::default()
    };
    let node = Node::new(tree.qid_generator(), name, dm::DIR | 0o755, "root", "root", ops);
    parent.add_child(node.clone()).expect("seed names are unique");
    node
}

fn build_tree() -> Tree {
    let qids = p9srv::qid::QidGenerator::new();
    let root_ops = Ops {
        create: Some(Arc::new(MkChild)),
        remove: Some(Arc::new(Unlink)),
        ..Default::default()
    };
    // Root node built directly (not via Tree::new) so it can carry the
    // create capability that lets clients add top-level entries.
    let root = Node::new(qids, "", dm::DIR | 0o755, "root", "root", root_ops);
    let tree = Tree::with_root(root.clone());

    seed_file(
        &tree,
        &root,
        "readme",
        b"a synthetic 9P tree served by ramfs\n",
    );
    seed_file(&tree, &root, "scratch", b"");

    let docs = seed_dir(&tree, &root, "docs");
    seed_file(&tree, &docs, "notes", b"");

    tree
}

/// A demonstrator 9P server exposing a small in-memory tree.
#[derive(Parser, Debug)]
#[command(name = "ramfs", about = "Serve a synthetic in-memory 9P tree")]
struct Cli {
    /// Listen address in proto!addr!port form, e.g. tcp!127.0.0.1!564
    #[arg(default_value = "tcp!127.0.0.1!564")]
    address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let tree = build_tree();

    info!("serving synthetic tree on {}", cli.address);
    Server::new(tree).serve(&cli.address).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_file_read_write_roundtrip() {
        let file = MemFile::new(Vec::new());
        let tree = Tree::new("root", "root");
        let node = Node::new(
            tree.qid_generator(),
            "f",
            0o644,
            "root",
            "root",
            Ops::default(),
        );

        file.write(&node, 0, &Data(b"hello".to_vec())).await.unwrap();
        let got = file.read(&node, 0, 5).await.unwrap();
        assert_eq!(got.0, b"hello");
    }

    #[tokio::test]
    async fn mem_file_write_past_end_zero_fills() {
        let file = MemFile::new(Vec::new());
        let tree = Tree::new("root", "root");
        let node = Node::new(
            tree.qid_generator(),
            "f",
            0o644,
            "root",
            "root",
            Ops::default(),
        );

        file.write(&node, 3, &Data(b"x".to_vec())).await.unwrap();
        let got = file.read(&node, 0, 4).await.unwrap();
        assert_eq!(got.0, vec![0, 0, 0, b'x']);
    }

    #[tokio::test]
    async fn mkchild_rejects_duplicate_name() {
        let tree = Tree::new("root", "root");
        let root = tree.root();
        let who = p9srv::perm::SimpleIdentity {
            name: "root".to_owned(),
            id: 0,
            groups: Vec::new(),
        };

        let creator = MkChild;
        creator
            .create(&root, "a", 0o644, 0, &who)
            .await
            .unwrap();
        let err = creator.create(&root, "a", 0o644, 0, &who).await.unwrap_err();
        assert_eq!(err.errno(), p9srv::error::errno::EEXIST);
    }

    #[test]
    fn build_tree_has_seeded_entries() {
        let tree = build_tree();
        let root = tree.root();
        assert!(root.find("readme").is_some());
        assert!(root.find("scratch").is_some());
        assert!(root.find("docs").unwrap().find("notes").is_some());
    }
}
