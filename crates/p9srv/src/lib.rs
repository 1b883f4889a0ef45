#![forbid(unsafe_code)]
//! Asynchronous 9P2000 (with optional 9P2000.u) synthetic file-service
//! framework for Rust.
//!
//! This crate lets an application expose an in-memory tree of synthetic
//! files and directories to 9P clients. Unlike a passthrough filesystem
//! server, nodes don't wrap real files: each node carries its own
//! per-node behavior (read/write/stat/wstat/create/remove) as a record
//! of capability trait objects, so a single tree can mix plain data
//! files, computed/virtual files, and directories with custom create
//! policies.
//!
//! # Getting Started
//!
//! 1. Build a [`tree::Tree`] by constructing [`node::Node`]s and wiring
//!    them together with [`node::Node::add_child`].
//! 2. Give nodes behavior by installing [`ops::Ops`] capability trait
//!    objects (`StatOp`, `ReadOp`, `WriteOp`, `CreateOp`, `RemoveOp`,
//!    `WstatOp`).
//! 3. Wrap the tree in a [`srv::Server`] and call
//!    [`srv::Server::serve`].
//!
//! # Example
//!
//! ```no_run
//! use p9srv::{node::Node, ops::Ops, srv::Server, tree::Tree};
//!
//! #[tokio::main]
//! async fn main() -> p9srv::Result<()> {
//!     let tree = Tree::new("root", "root");
//!     let root = tree.root();
//!     let readme = Node::new(tree.qid_generator(), "readme", 0o644, "root", "root", Ops::default());
//!     root.add_child(readme)?;
//!
//!     Server::new(tree).serve("tcp!127.0.0.1!564").await
//! }
//! ```
//!
//! # Protocol Details
//!
//! ## Message Flow
//!
//! 1. **Version negotiation**: `Tversion`/`Rversion` pick 9P2000 or
//!    9P2000.u (or `VERSION_UNKNOWN` for anything else).
//! 2. **Attach**: `Tattach` binds a fid to the tree root, establishing
//!    the caller's identity from `uname`/`n_uname`.
//! 3. **Navigation and operations**: `Twalk`, `Topen`, `Tcreate`,
//!    `Tread`, `Twrite`, `Tstat`, `Twstat`.
//! 4. **Cleanup**: `Tclunk` releases a fid; `Tremove` additionally
//!    detaches the node from its parent before clunking.
//!
//! ## Fid Lifecycle
//!
//! Each fid moves `Unopened -> Opened(mode)` on a successful `Topen` (or
//! `Tcreate`, which opens implicitly). `Twalk` requires its source fid
//! to be `Unopened`. `Tclunk` and a (successful or failed) `Tremove`
//! both drop the fid from the connection's table.
//!
//! # Error Handling
//!
//! Operations return [`error::Error`]; the dispatcher turns an `Err`
//! into an `Rerror` reply carrying both the message and (under
//! 9P2000.u) the numeric errno.
//!
//! # Transport
//!
//! - **TCP**: `"tcp!host!port"` (e.g. `"tcp!0.0.0.0!564"`)
//! - **Unix domain sockets**: `"unix!path!suffix"` (e.g.
//!   `"unix!/tmp/p9srv.sock!0"`, the suffix is unused but required by
//!   the mini-format)
//!
//! # Safety
//!
//! This crate forbids unsafe code (`#![forbid(unsafe_code)]`).
pub mod client;
pub mod error;
pub mod fcall;
pub mod node;
pub mod ops;
pub mod perm;
pub mod qid;
pub mod serialize;
pub mod srv;
pub mod tree;
#[macro_use]
pub mod utils;

pub use crate::error::Error;
pub use crate::error::errno;
pub use crate::fcall::*;
pub use crate::utils::Result;
