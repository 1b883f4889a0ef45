//! 9P protocol data types and constants.
//!
//! # Protocol
//! 9P2000, with the 9P2000.u extension fields carried optionally.

use bitflags::bitflags;
use enum_primitive::*;

/// 9P2000 version string
pub const P92000: &str = "9P2000";

/// 9P2000.u version string
pub const P92000U: &str = "9P2000.u";

/// The version string RVersion carries when the server does not
/// understand the client's version string
pub const VERSION_UNKNOWN: &str = "unknown";

/*
 * 9P magic numbers
 */
/// Special tag which `TVersion`/`RVersion` must use as `tag`
pub const NOTAG: u16 = !0;

/// Special value which `TAttach` with no auth must use as `afid`
pub const NOFID: u32 = !0;

/// Special uid which `TAuth`/`TAttach` use as `n_uname` to indicate no uid
/// is specified
pub const NONUNAME: u32 = !0;

/// Ample room for `TRead`/`TWrite` header: size[4] type[1] tag[2] fid[4]
/// offset[8] count[4]
pub const IOHDRSZ: u32 = 23;

/// v9fs default port
pub const V9FS_PORT: u16 = 564;

/// The type of I/O: open mode to be checked against the permissions for
/// the file.
pub mod om {
    /// Open for read
    pub const READ: u8 = 0;
    /// Open for write
    pub const WRITE: u8 = 1;
    /// Open for read and write
    pub const RDWR: u8 = 2;
    /// Execute, same as read but checks execute permission
    pub const EXEC: u8 = 3;
    /// Or'ed in (except for exec): truncate file first
    pub const TRUNC: u8 = 0x10;
    /// Or'ed in: close on exec
    pub const CEXEC: u8 = 0x20;
    /// Or'ed in: remove on close
    pub const RCLOSE: u8 = 0x40;
}

/// Bits in `Stat.mode` / `Node.mode`.
pub mod dm {
    /// Mode bit for directories
    pub const DIR: u32 = 0x8000_0000;
    /// Mode bit for append only files
    pub const APPEND: u32 = 0x4000_0000;
    /// Mode bit for exclusive use files
    pub const EXCL: u32 = 0x2000_0000;
    /// Mode bit for mounted channel
    pub const MOUNT: u32 = 0x1000_0000;
    /// Mode bit for authentication file
    pub const AUTH: u32 = 0x0800_0000;
    /// Mode bit for non-backed-up files
    pub const TMP: u32 = 0x0400_0000;
    /// Mode bit for symbolic links (9P2000.u)
    pub const SYMLINK: u32 = 0x0200_0000;
    /// Mode bit for read permission, owner class
    pub const READ: u32 = 0x4;
    /// Mode bit for write permission, owner class
    pub const WRITE: u32 = 0x2;
    /// Mode bit for execute permission, owner class
    pub const EXEC: u32 = 0x1;
}

bitflags! {
    /// Bits in `Qid.typ`.
    #[derive(Copy, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
    pub struct QidType: u8 {
        #[doc = "Type bit for directories"]
        const DIR       = 0x80;
        #[doc = "Type bit for append only files"]
        const APPEND    = 0x40;
        #[doc = "Type bit for exclusive use files"]
        const EXCL      = 0x20;
        #[doc = "Type bit for mounted channel"]
        const MOUNT     = 0x10;
        #[doc = "Type bit for authentication file"]
        const AUTH      = 0x08;
        #[doc = "Type bit for not-backed-up file"]
        const TMP       = 0x04;
        #[doc = "Type bit for symbolic links (9P2000.u)"]
        const SYMLINK   = 0x02;
        #[doc = "Type bit for hard links (9P2000.u)"]
        const LINK      = 0x01;
        #[doc = "Plain file"]
        const FILE      = 0x00;
    }
}

impl QidType {
    /// Derive the QID type bits from a mode word. Kept in sync with
    /// `Node`'s `mode` field whenever a node's mode changes.
    pub fn from_mode(mode: u32) -> QidType {
        let mut typ = QidType::FILE;
        if mode & dm::DIR != 0 {
            typ.insert(QidType::DIR);
        }
        if mode & dm::APPEND != 0 {
            typ.insert(QidType::APPEND);
        }
        if mode & dm::EXCL != 0 {
            typ.insert(QidType::EXCL);
        }
        if mode & dm::SYMLINK != 0 {
            typ.insert(QidType::SYMLINK);
        }
        typ
    }
}

/// Server-assigned file identity, stable across renames and sessions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Qid {
    /// Directory, append-only, etc.
    pub typ: QidType,
    /// Incremented whenever the file's contents change.
    pub version: u32,
    /// Unique among all files ever created in this tree.
    pub path: u64,
}

impl Qid {
    /// Encoded size in bytes: typ[1] version[4] path[8].
    pub const SIZE: usize = 1 + 4 + 8;
}

/// Plan 9 namespace metadata, extended with 9P2000.u's numeric id fields.
///
/// Also serves as the per-node stored stat block (see `node.rs`): rather
/// than keep a parallel struct of plain node fields and a separate wire
/// `Stat`, the node stores exactly this record and hands out clones of it
/// on `Tstat` and during directory reads.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stat {
    /// Server type, for kernel use; unused by this crate.
    pub typ: u16,
    /// Server subtype, for kernel use; unused by this crate.
    pub dev: u32,
    /// Unique id from server.
    pub qid: Qid,
    /// Permissions and type bits.
    pub mode: u32,
    /// Last read time (seconds since epoch).
    pub atime: u32,
    /// Last write time (seconds since epoch).
    pub mtime: u32,
    /// File length in bytes; unused for directories.
    pub length: u64,
    /// Last element of path; unique among siblings.
    pub name: String,
    /// Owner name.
    pub uid: String,
    /// Group name.
    pub gid: String,
    /// Name of the user who last modified the file.
    pub muid: String,
    /// 9P2000.u extension: symlink target / device string.
    pub extension: String,
    /// 9P2000.u extension: numeric uid.
    pub n_uid: u32,
    /// 9P2000.u extension: numeric gid.
    pub n_gid: u32,
    /// 9P2000.u extension: numeric uid of the last modifier.
    pub n_muid: u32,
}

impl Stat {
    /// Size in bytes this stat would occupy on the wire, not counting the
    /// leading 2-byte length prefix. `dotu` controls whether the
    /// extension fields are included.
    pub fn size(&self, dotu: bool) -> u16 {
        let fixed = 2 + 4 + Qid::SIZE + 4 + 4 + 4 + 8 + 4 * 2;
        let strings = self.name.len() + self.uid.len() + self.gid.len() + self.muid.len();
        let mut total = fixed + strings;
        if dotu {
            total += 2 + self.extension.len() + 4 + 4 + 4;
        }
        total as u16
    }
}

// Message type numbers as assigned by the 9P2000 protocol.
enum_from_primitive! {
    #[doc = "Message type, 9P operations"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub enum MsgType {
        TVersion    = 100,
        RVersion,
        TAuth       = 102,
        RAuth,
        TAttach     = 104,
        RAttach,
        RError      = 107,
        TFlush      = 108,
        RFlush,
        TWalk       = 110,
        RWalk,
        TOpen       = 112,
        ROpen,
        TCreate     = 114,
        RCreate,
        TRead       = 116,
        RRead,
        TWrite      = 118,
        RWrite,
        TClunk      = 120,
        RClunk,
        TRemove     = 122,
        RRemove,
        TStat       = 124,
        RStat,
        TWstat      = 126,
        RWstat,
    }
}

impl MsgType {
    /// If the message type is a T-message
    pub fn is_t(&self) -> bool {
        !self.is_r()
    }

    /// If the message type is an R-message
    pub fn is_r(&self) -> bool {
        use MsgType::*;

        matches!(
            *self,
            RVersion
                | RAuth
                | RAttach
                | RError
                | RFlush
                | RWalk
                | ROpen
                | RCreate
                | RRead
                | RWrite
                | RClunk
                | RRemove
                | RStat
                | RWstat
        )
    }
}

impl<'a> From<&'a FCall> for MsgType {
    fn from(fcall: &'a FCall) -> MsgType {
        match *fcall {
            FCall::TVersion { .. } => MsgType::TVersion,
            FCall::RVersion { .. } => MsgType::RVersion,
            FCall::TAuth { .. } => MsgType::TAuth,
            FCall::RAuth { .. } => MsgType::RAuth,
            FCall::TAttach { .. } => MsgType::TAttach,
            FCall::RAttach { .. } => MsgType::RAttach,
            FCall::RError { .. } => MsgType::RError,
            FCall::TFlush { .. } => MsgType::TFlush,
            FCall::RFlush => MsgType::RFlush,
            FCall::TWalk { .. } => MsgType::TWalk,
            FCall::RWalk { .. } => MsgType::RWalk,
            FCall::TOpen { .. } => MsgType::TOpen,
            FCall::ROpen { .. } => MsgType::ROpen,
            FCall::TCreate { .. } => MsgType::TCreate,
            FCall::RCreate { .. } => MsgType::RCreate,
            FCall::TRead { .. } => MsgType::TRead,
            FCall::RRead { .. } => MsgType::RRead,
            FCall::TWrite { .. } => MsgType::TWrite,
            FCall::RWrite { .. } => MsgType::RWrite,
            FCall::TClunk { .. } => MsgType::TClunk,
            FCall::RClunk => MsgType::RClunk,
            FCall::TRemove { .. } => MsgType::TRemove,
            FCall::RRemove => MsgType::RRemove,
            FCall::TStat { .. } => MsgType::TStat,
            FCall::RStat { .. } => MsgType::RStat,
            FCall::TWstat { .. } => MsgType::TWstat,
            FCall::RWstat => MsgType::RWstat,
        }
    }
}

/// Data type used in `RRead` and `TWrite`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Data(pub Vec<u8>);

/// A data type encapsulating the various 9P messages.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FCall {
    TVersion {
        msize: u32,
        version: String,
    },
    RVersion {
        msize: u32,
        version: String,
    },
    TAuth {
        afid: u32,
        uname: String,
        aname: String,
        n_uname: u32,
    },
    RAuth {
        aqid: Qid,
    },
    TAttach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
        n_uname: u32,
    },
    RAttach {
        qid: Qid,
    },
    RError {
        ename: String,
        errno: u32,
    },
    TFlush {
        oldtag: u16,
    },
    RFlush,
    TWalk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    RWalk {
        wqids: Vec<Qid>,
    },
    TOpen {
        fid: u32,
        mode: u8,
    },
    ROpen {
        qid: Qid,
        iounit: u32,
    },
    TCreate {
        fid: u32,
        name: String,
        perm: u32,
        mode: u8,
    },
    RCreate {
        qid: Qid,
        iounit: u32,
    },
    TRead {
        fid: u32,
        offset: u64,
        count: u32,
    },
    RRead {
        data: Data,
    },
    TWrite {
        fid: u32,
        offset: u64,
        data: Data,
    },
    RWrite {
        count: u32,
    },
    TClunk {
        fid: u32,
    },
    RClunk,
    TRemove {
        fid: u32,
    },
    RRemove,
    TStat {
        fid: u32,
    },
    RStat {
        stat: Stat,
    },
    TWstat {
        fid: u32,
        stat: Stat,
    },
    RWstat,
}

impl FCall {
    /// Get the fids which self contains.
    pub fn fids(&self) -> Vec<u32> {
        match *self {
            FCall::TAttach { afid, .. } if afid != NOFID => vec![afid],
            FCall::TWalk { fid, .. } => vec![fid],
            FCall::TOpen { fid, .. } => vec![fid],
            FCall::TCreate { fid, .. } => vec![fid],
            FCall::TRead { fid, .. } => vec![fid],
            FCall::TWrite { fid, .. } => vec![fid],
            FCall::TClunk { fid } => vec![fid],
            FCall::TRemove { fid } => vec![fid],
            FCall::TStat { fid } => vec![fid],
            FCall::TWstat { fid, .. } => vec![fid],
            _ => Vec::new(),
        }
    }

    /// Get the newfid this request introduces, if any.
    pub fn newfid(&self) -> Option<u32> {
        match *self {
            FCall::TAttach { fid, .. } => Some(fid),
            FCall::TWalk { newfid, .. } => Some(newfid),
            _ => None,
        }
    }

    /// Get the qids which self contains.
    pub fn qids(&self) -> Vec<Qid> {
        match *self {
            FCall::RAuth { aqid } => vec![aqid],
            FCall::RAttach { qid } => vec![qid],
            FCall::ROpen { qid, .. } => vec![qid],
            FCall::RCreate { qid, .. } => vec![qid],
            FCall::RWalk { ref wqids } => wqids.clone(),
            _ => Vec::new(),
        }
    }
}

/// Envelope for 9P messages.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Msg {
    /// Chosen by the client to identify the message; the reply uses the
    /// same tag.
    pub tag: u16,
    /// Message body.
    pub body: FCall,
}
