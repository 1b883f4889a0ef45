//! Per-node capability traits.
//!
//! A node's behavior is a record of optional trait objects, one per
//! capability, rather than a single monolithic trait every node must
//! implement in full. A plain file only installs `ReadOp`/`WriteOp`; a
//! directory typically installs `CreateOp`/`RemoveOp` alongside the
//! common `StatOp`/`WstatOp`.

use async_trait::async_trait;

use crate::fcall::{Data, Stat};
use crate::node::Node;
use crate::perm::Identity;
use crate::utils::Result;

/// Produce or refresh the stat block backing `Tstat` / directory reads.
///
/// Most nodes don't need this: the node's own stored `Stat` is returned
/// as-is. Implement it when a node's metadata is computed on demand
/// (e.g. a length that reflects live data).
#[async_trait]
pub trait StatOp: Send + Sync {
    async fn stat(&self, node: &Node) -> Result<Stat>;
}

/// Validate and apply a `Twstat` request.
#[async_trait]
pub trait WstatOp: Send + Sync {
    async fn wstat(&self, node: &Node, stat: &Stat, who: &dyn Identity) -> Result<()>;
}

/// Serve `Tread` for this node (file contents, or packed directory
/// entries when the node is a directory).
#[async_trait]
pub trait ReadOp: Send + Sync {
    async fn read(&self, node: &Node, offset: u64, count: u32) -> Result<Data>;
}

/// Serve `Twrite` for this node.
#[async_trait]
pub trait WriteOp: Send + Sync {
    async fn write(&self, node: &Node, offset: u64, data: &Data) -> Result<u32>;
}

/// Serve `Tcreate` under this (necessarily directory) node.
#[async_trait]
pub trait CreateOp: Send + Sync {
    async fn create(
        &self,
        parent: &Node,
        name: &str,
        perm: u32,
        mode: u8,
        who: &dyn Identity,
    ) -> Result<Node>;
}

/// Serve `Tremove` for a child of this (necessarily directory) node: the
/// parent owns the decision and the directory mutation, so this is looked
/// up on the victim's parent, not the victim itself.
#[async_trait]
pub trait RemoveOp: Send + Sync {
    async fn remove(&self, node: &Node, who: &dyn Identity) -> Result<()>;
}

/// The capability record installed on a node. `None` fields mean the
/// node does not support that operation at all (the dispatcher replies
/// `Eperm`, since absence of a capability is a permission decision, not a
/// protocol one); `Some` fields may still refuse an individual call via
/// their own `Result`.
#[derive(Clone, Default)]
pub struct Ops {
    pub stat: Option<std::sync::Arc<dyn StatOp>>,
    pub wstat: Option<std::sync::Arc<dyn WstatOp>>,
    pub read: Option<std::sync::Arc<dyn ReadOp>>,
    pub write: Option<std::sync::Arc<dyn WriteOp>>,
    pub create: Option<std::sync::Arc<dyn CreateOp>>,
    pub remove: Option<std::sync::Arc<dyn RemoveOp>>,
}
