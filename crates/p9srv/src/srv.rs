//! Asynchronous server side 9P library.
//!
//! # Protocol
//! 9P2000, with optional 9P2000.u extension fields.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytes::buf::{Buf, BufMut};
use futures::sink::SinkExt;
use log::{error, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{Mutex, RwLock};
use tokio_stream::StreamExt;
use tokio_util::codec::length_delimited::LengthDelimitedCodec;

use crate::error::{Error, errno::*};
use crate::fcall::*;
use crate::io_err;
use crate::node::Node;
use crate::ops::{CreateOp, ReadOp, RemoveOp, StatOp, WriteOp, WstatOp};
use crate::perm::{self, Identity, Perm, SimpleIdentity};
use crate::serialize;
use crate::tree::Tree;
use crate::utils::{self, Result};

/// Where a client's fid currently stands in the dispatcher's state
/// machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FidState {
    Unopened,
    Opened(u8),
}

struct FidEntry {
    node: Node,
    state: FidState,
    identity: Arc<SimpleIdentity>,
    /// Packed directory entries for an in-progress `Tread` sequence,
    /// rebuilt whenever the client restarts the walk at offset 0.
    dir_cache: std::sync::Mutex<Option<Vec<u8>>>,
}

/// Per-connection dispatcher state.
struct Conn {
    tree: Tree,
    fids: RwLock<HashMap<u32, FidEntry>>,
    dotu: AtomicBool,
    msize: AtomicU32,
}

impl Conn {
    fn new(tree: Tree) -> Conn {
        Conn {
            tree,
            fids: RwLock::new(HashMap::new()),
            dotu: AtomicBool::new(false),
            msize: AtomicU32::new(8192),
        }
    }

    fn dotu(&self) -> bool {
        self.dotu.load(Ordering::Relaxed)
    }

    async fn handle(&self, msg: &Msg) -> Result<FCall> {
        use FCall::*;

        match msg.body {
            TVersion {
                msize,
                ref version,
            } => self.t_version(msize, version).await,
            TAuth { .. } => Err(Error::No(EOPNOTSUPP)),
            TAttach {
                fid,
                ref uname,
                ref aname,
                n_uname,
                ..
            } => self.t_attach(fid, uname, aname, n_uname).await,
            TFlush { .. } => Ok(RFlush),
            TWalk {
                fid,
                newfid,
                ref wnames,
            } => self.t_walk(fid, newfid, wnames).await,
            TOpen { fid, mode } => self.t_open(fid, mode).await,
            TCreate {
                fid,
                ref name,
                perm,
                mode,
            } => self.t_create(fid, name, perm, mode).await,
            TRead { fid, offset, count } => self.t_read(fid, offset, count).await,
            TWrite {
                fid,
                offset,
                ref data,
            } => self.t_write(fid, offset, data).await,
            TClunk { fid } => self.t_clunk(fid).await,
            TRemove { fid } => self.t_remove(fid).await,
            TStat { fid } => self.t_stat(fid).await,
            TWstat { fid, ref stat } => self.t_wstat(fid, stat).await,
            _ => Err(Error::No(EOPNOTSUPP)),
        }
    }

    async fn t_version(&self, msize: u32, version: &str) -> Result<FCall> {
        self.fids.write().await.clear();
        self.msize.store(msize, Ordering::Relaxed);

        let negotiated = match version {
            P92000U => {
                self.dotu.store(true, Ordering::Relaxed);
                P92000U.to_owned()
            }
            P92000 => {
                self.dotu.store(false, Ordering::Relaxed);
                P92000.to_owned()
            }
            _ => VERSION_UNKNOWN.to_owned(),
        };

        Ok(FCall::RVersion {
            msize,
            version: negotiated,
        })
    }

    async fn t_attach(&self, fid: u32, uname: &str, _aname: &str, n_uname: u32) -> Result<FCall> {
        let root = self.tree.root();
        let identity = Arc::new(SimpleIdentity {
            name: uname.to_owned(),
            id: if n_uname == NONUNAME { 0 } else { n_uname },
            groups: Vec::new(),
        });

        let qid = root.qid();
        self.fids.write().await.insert(
            fid,
            FidEntry {
                node: root,
                state: FidState::Unopened,
                identity,
                dir_cache: std::sync::Mutex::new(None),
            },
        );

        Ok(FCall::RAttach { qid })
    }

    async fn t_walk(&self, fid: u32, newfid: u32, wnames: &[String]) -> Result<FCall> {
        let (start_node, identity) = {
            let fids = self.fids.read().await;
            let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;
            if entry.state != FidState::Unopened {
                return Err(Error::eperm());
            }
            (entry.node.clone(), entry.identity.clone())
        };

        if wnames.is_empty() {
            self.fids.write().await.insert(
                newfid,
                FidEntry {
                    node: start_node,
                    state: FidState::Unopened,
                    identity,
                    dir_cache: std::sync::Mutex::new(None),
                },
            );
            return Ok(FCall::RWalk { wqids: Vec::new() });
        }

        let mut current = start_node;
        let mut wqids = Vec::with_capacity(wnames.len());
        for name in wnames {
            if name == ".." {
                current = current.parent();
                wqids.push(current.qid());
                continue;
            }
            if !perm::check(&current.stat(), identity.as_ref() as &dyn Identity, Perm::EXEC) {
                break;
            }
            match current.find(name) {
                Some(next) => {
                    wqids.push(next.qid());
                    current = next;
                }
                None => break,
            }
        }

        if wqids.is_empty() {
            return Err(Error::enoent());
        }

        // Bind newfid to the last reached node even on a short walk, per
        // the partial-walk rule.
        self.fids.write().await.insert(
            newfid,
            FidEntry {
                node: current,
                state: FidState::Unopened,
                identity,
                dir_cache: std::sync::Mutex::new(None),
            },
        );

        Ok(FCall::RWalk { wqids })
    }

    async fn t_open(&self, fid: u32, mode: u8) -> Result<FCall> {
        let mut fids = self.fids.write().await;
        let entry = fids.get_mut(&fid).ok_or(Error::No(EBADF))?;
        if entry.state != FidState::Unopened {
            return Err(Error::No(EINVAL));
        }

        let requested = open_mode_to_perm(mode);
        if !perm::check(&entry.node.stat(), entry.identity.as_ref() as &dyn Identity, requested) {
            return Err(Error::eperm());
        }

        if mode & om::TRUNC != 0 && !entry.node.is_dir() {
            entry.node.with_stat_mut(|s| s.length = 0);
        }

        entry.state = FidState::Opened(mode);
        let qid = entry.node.qid();

        Ok(FCall::ROpen { qid, iounit: 0 })
    }

    async fn t_create(&self, fid: u32, name: &str, perm_bits: u32, mode: u8) -> Result<FCall> {
        let (parent, identity) = {
            let fids = self.fids.read().await;
            let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;
            if entry.state != FidState::Unopened {
                return Err(Error::No(EINVAL));
            }
            if !entry.node.is_dir() {
                return Err(Error::No(ENOTDIR));
            }
            (entry.node.clone(), entry.identity.clone())
        };

        if !perm::check(&parent.stat(), identity.as_ref() as &dyn Identity, Perm::WRITE) {
            return Err(Error::eperm());
        }

        let creator = parent.ops().create.clone().ok_or(Error::eperm())?;
        let child = creator
            .create(&parent, name, perm_bits, mode, identity.as_ref() as &dyn Identity)
            .await?;
        let qid = child.qid();

        let mut fids = self.fids.write().await;
        fids.insert(
            fid,
            FidEntry {
                node: child,
                state: FidState::Opened(mode),
                identity,
                dir_cache: std::sync::Mutex::new(None),
            },
        );

        Ok(FCall::RCreate { qid, iounit: 0 })
    }

    async fn t_read(&self, fid: u32, offset: u64, count: u32) -> Result<FCall> {
        let node = {
            let fids = self.fids.read().await;
            let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;
            if !matches!(entry.state, FidState::Opened(_)) {
                return Err(Error::No(EINVAL));
            }
            entry.node.clone()
        };

        if node.is_dir() {
            return self.read_dir(fid, &node, offset, count).await;
        }

        let reader: Arc<dyn ReadOp> = node.ops().read.clone().ok_or(Error::eperm())?;
        let data = reader.read(&node, offset, count).await?;
        Ok(FCall::RRead { data })
    }

    async fn read_dir(&self, fid: u32, node: &Node, offset: u64, count: u32) -> Result<FCall> {
        let fids = self.fids.read().await;
        let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;

        let mut cache = entry.dir_cache.lock().unwrap();
        if offset == 0 || cache.is_none() {
            let mut buf = Vec::new();
            let dotu = self.dotu();
            for child in node.children() {
                serialize::encode_stat(&child.stat(), &mut buf, dotu)
                    .map_err(Error::from)?;
            }
            *cache = Some(buf);
        }
        let buf = cache.as_ref().unwrap();

        let start = offset as usize;
        if start > buf.len() {
            return Ok(FCall::RRead { data: Data(Vec::new()) });
        }
        let end = std::cmp::min(buf.len(), start + count as usize);
        Ok(FCall::RRead {
            data: Data(buf[start..end].to_vec()),
        })
    }

    async fn t_write(&self, fid: u32, offset: u64, data: &Data) -> Result<FCall> {
        let node = {
            let fids = self.fids.read().await;
            let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;
            if !matches!(entry.state, FidState::Opened(_)) {
                return Err(Error::No(EINVAL));
            }
            if entry.node.is_dir() {
                return Err(Error::eperm());
            }
            entry.node.clone()
        };

        let writer: Arc<dyn WriteOp> = node.ops().write.clone().ok_or(Error::eperm())?;
        let count = writer.write(&node, offset, data).await?;
        Ok(FCall::RWrite { count })
    }

    async fn t_clunk(&self, fid: u32) -> Result<FCall> {
        self.fids.write().await.remove(&fid);
        Ok(FCall::RClunk)
    }

    async fn t_remove(&self, fid: u32) -> Result<FCall> {
        let entry = self.fids.write().await.remove(&fid);
        let entry = entry.ok_or(Error::No(EBADF))?;

        // The parent owns the decision and the directory mutation, not the
        // victim itself.
        let parent = entry.node.parent();
        let remover: Arc<dyn RemoveOp> = parent.ops().remove.clone().ok_or(Error::eperm())?;
        remover
            .remove(&entry.node, entry.identity.as_ref() as &dyn Identity)
            .await?;

        Ok(FCall::RRemove)
    }

    async fn t_stat(&self, fid: u32) -> Result<FCall> {
        let node = {
            let fids = self.fids.read().await;
            fids.get(&fid).ok_or(Error::No(EBADF))?.node.clone()
        };

        let stat = match node.ops().stat.clone() {
            Some(op) => op.stat(&node).await?,
            None => node.stat(),
        };
        Ok(FCall::RStat { stat })
    }

    async fn t_wstat(&self, fid: u32, stat: &Stat) -> Result<FCall> {
        let (node, identity) = {
            let fids = self.fids.read().await;
            let entry = fids.get(&fid).ok_or(Error::No(EBADF))?;
            (entry.node.clone(), entry.identity.clone())
        };

        let wstat: Arc<dyn WstatOp> = node.ops().wstat.clone().ok_or(Error::eperm())?;
        wstat.wstat(&node, stat, identity.as_ref() as &dyn Identity).await?;

        Ok(FCall::RWstat)
    }
}

fn open_mode_to_perm(mode: u8) -> Perm {
    let mut perm = match mode & 0x3 {
        om::READ => Perm::READ,
        om::WRITE => Perm::WRITE,
        om::RDWR => Perm::READ | Perm::WRITE,
        om::EXEC => Perm::EXEC,
        _ => Perm::empty(),
    };
    if mode & om::TRUNC != 0 {
        perm |= Perm::WRITE;
    }
    perm
}

/// A running 9P service over a synthetic tree.
#[derive(Clone)]
pub struct Server {
    tree: Tree,
}

impl Server {
    /// Build a server rooted at `tree`.
    pub fn new(tree: Tree) -> Server {
        Server { tree }
    }

    /// Serve connections at `addr`, in the `proto!addr!port` mini-format
    /// (`tcp!host!port` or `unix!path!suffix`).
    pub async fn serve(self, addr: &str) -> Result<()> {
        let (proto, host, port) = utils::parse_proto(addr)
            .ok_or_else(|| io_err!(InvalidInput, "Invalid protocol or address"))?;

        match proto {
            "tcp" => self.serve_tcp(&format!("{host}:{port}")).await,
            "unix" => self.serve_unix(host).await,
            _ => Err(From::from(io_err!(InvalidInput, "Protocol not supported"))),
        }
    }

    async fn serve_tcp(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("accepted: {:?}", peer);

            let tree = self.tree.clone();
            tokio::spawn(async move {
                let (readhalf, writehalf) = stream.into_split();
                if let Err(e) = dispatch(tree, readhalf, writehalf).await {
                    error!("connection error: {}: {:?}", e, e);
                }
            });
        }
    }

    async fn serve_unix(self, path: impl AsRef<Path>) -> Result<()> {
        let listener = DeleteOnDrop::bind(path)?;

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("accepted: {:?}", peer);

            let tree = self.tree.clone();
            tokio::spawn(async move {
                let (readhalf, writehalf) = tokio::io::split(stream);
                if let Err(e) = dispatch(tree, readhalf, writehalf).await {
                    error!("connection error: {}: {:?}", e, e);
                }
            });
        }
    }
}

struct DeleteOnDrop {
    path: PathBuf,
    listener: UnixListener,
}

impl DeleteOnDrop {
    fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        UnixListener::bind(&path).map(|listener| DeleteOnDrop { path, listener })
    }
}

impl std::ops::Deref for DeleteOnDrop {
    type Target = UnixListener;
    fn deref(&self) -> &Self::Target {
        &self.listener
    }
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            error!("failed to remove socket file {:?}: {}", self.path, e);
        }
    }
}

async fn dispatch<Reader, Writer>(tree: Tree, reader: Reader, writer: Writer) -> Result<()>
where
    Reader: 'static + AsyncRead + Send + Unpin,
    Writer: 'static + AsyncWrite + Send + Unpin,
{
    let conn = Arc::new(Conn::new(tree));

    let mut framedread = LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_read(reader);
    let framedwrite = LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_write(writer);
    let framedwrite = Arc::new(Mutex::new(framedwrite));

    while let Some(bytes) = framedread.next().await {
        let bytes = bytes?;

        let msg = serialize::read_msg(&mut bytes.reader(), conn.dotu())?;
        info!("\t← {:?}", msg);

        let conn = conn.clone();
        let framedwrite = framedwrite.clone();

        tokio::spawn(async move {
            let dotu = conn.dotu();
            let response_fcall = conn.handle(&msg).await.unwrap_or_else(|e| {
                error!("{:?}: error: \"{}\": {:?}", MsgType::from(&msg.body), e, e);
                FCall::RError {
                    ename: e.message(),
                    errno: e.errno() as u32,
                }
            });

            let response = Msg {
                tag: msg.tag,
                body: response_fcall,
            };

            let mut w = bytes::BytesMut::with_capacity(4096).writer();
            if let Err(e) = serialize::write_msg(&mut w, &response, dotu) {
                error!("failed to serialize response for tag {}: {:?}", msg.tag, e);
                return;
            }

            let frozen = w.into_inner().freeze();
            let mut framedwrite = framedwrite.lock().await;
            if let Err(e) = framedwrite.send(frozen).await {
                error!("failed to send response for tag {}: {:?}", msg.tag, e);
                return;
            }
            info!("\t→ {:?}", response);
        });
    }

    Ok(())
}
