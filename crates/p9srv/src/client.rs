//! Minimal client-side primitives.
//!
//! The main payoff here is `Client::fremove`, which demonstrates the
//! fid lifecycle a well-behaved 9P client follows around `Tremove`: a
//! fid is always returned to the pool once the round trip completes,
//! regardless of whether the remove succeeded, and a `Tremove` that
//! itself failed is followed by a defensive `Tclunk` so the fid isn't
//! leaked on the wire.

use async_trait::async_trait;

use crate::error::{Error, errno::*};
use crate::fcall::{FCall, NOFID, NONUNAME, P92000U};
use crate::utils::Result;

/// Abstracts the wire round trip so fid-lifecycle logic can be tested
/// without a real socket. A real implementation sends `req` framed with
/// the codec in `serialize.rs` and returns the matching reply.
#[async_trait]
pub trait ClientConn: Send {
    async fn call(&mut self, req: FCall) -> Result<FCall>;
}

/// Allocates client-side fids, reusing released ones before minting new
/// numbers.
#[derive(Default)]
pub struct FidPool {
    next: u32,
    free: Vec<u32>,
}

impl FidPool {
    pub fn new() -> FidPool {
        FidPool::default()
    }

    pub fn acquire(&mut self) -> u32 {
        self.free.pop().unwrap_or_else(|| {
            let fid = self.next;
            self.next += 1;
            fid
        })
    }

    pub fn release(&mut self, fid: u32) {
        self.free.push(fid);
    }
}

/// A 9P client session over an abstract [`ClientConn`].
pub struct Client<C: ClientConn> {
    conn: C,
    fids: FidPool,
    root_fid: u32,
}

impl<C: ClientConn> Client<C> {
    /// Negotiate a version and attach to the tree root.
    pub async fn attach(mut conn: C, uname: &str, aname: &str) -> Result<Client<C>> {
        conn.call(FCall::TVersion {
            msize: 8192,
            version: P92000U.to_owned(),
        })
        .await?;

        let mut fids = FidPool::new();
        let root_fid = fids.acquire();
        conn.call(FCall::TAttach {
            fid: root_fid,
            afid: NOFID,
            uname: uname.to_owned(),
            aname: aname.to_owned(),
            n_uname: NONUNAME,
        })
        .await?;

        Ok(Client {
            conn,
            fids,
            root_fid,
        })
    }

    /// Walk from the root fid to `path`, yielding a freshly allocated
    /// fid positioned at the destination.
    async fn walk_from_root(&mut self, path: &[&str]) -> Result<u32> {
        let dest = self.fids.acquire();
        let wnames = path.iter().map(|s| s.to_string()).collect();

        let reply = self
            .conn
            .call(FCall::TWalk {
                fid: self.root_fid,
                newfid: dest,
                wnames,
            })
            .await;

        match reply {
            Ok(FCall::RWalk { wqids }) if wqids.len() == path.len() => Ok(dest),
            Ok(_) => {
                self.fids.release(dest);
                Err(Error::enoent())
            }
            Err(e) => {
                self.fids.release(dest);
                Err(e)
            }
        }
    }

    /// Remove the file at `fid`.
    ///
    /// The fid is returned to the pool no matter what the server says:
    /// a successful `Tremove` already invalidates the fid server-side,
    /// and a failed one still must not be reused locally for something
    /// else while its server-side state is unknown.
    pub async fn remove(&mut self, fid: u32) -> Result<()> {
        let result = self.conn.call(FCall::TRemove { fid }).await;
        self.fids.release(fid);

        match result {
            Ok(FCall::RRemove) => Ok(()),
            Ok(_) => Err(Error::No(EPROTO)),
            Err(e) => Err(e),
        }
    }

    /// Walk to `path` and remove it, clunking defensively if the remove
    /// itself fails (the walk already clunks its own fid via `remove`).
    pub async fn fremove(&mut self, path: &[&str]) -> Result<()> {
        let fid = self.walk_from_root(path).await?;

        match self.remove(fid).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.conn.call(FCall::TClunk { fid }).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct FakeConn {
        replies: VecDeque<Result<FCall>>,
        calls: Arc<Mutex<Vec<FCall>>>,
    }

    #[async_trait]
    impl ClientConn for FakeConn {
        async fn call(&mut self, req: FCall) -> Result<FCall> {
            self.calls.lock().unwrap().push(req);
            self.replies
                .pop_front()
                .unwrap_or(Err(Error::No(EIO_TEST)))
        }
    }

    const EIO_TEST: i32 = 5;

    fn fake_qid() -> crate::fcall::Qid {
        crate::fcall::Qid {
            typ: crate::fcall::QidType::FILE,
            version: 0,
            path: 7,
        }
    }

    #[tokio::test]
    async fn remove_releases_fid_even_on_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let conn = FakeConn {
            replies: VecDeque::from(vec![
                Ok(FCall::RVersion {
                    msize: 8192,
                    version: P92000U.to_owned(),
                }),
                Ok(FCall::RAttach { qid: fake_qid() }),
                Err(Error::eperm()),
            ]),
            calls: calls.clone(),
        };
        let mut client = Client::attach(conn, "alice", "").await.unwrap();

        let fid = client.fids.acquire();
        let err = client.remove(fid).await.unwrap_err();
        assert_eq!(err.errno(), crate::error::errno::EPERM);

        // the fid must be back in the pool: the next acquire reuses it
        let reused = client.fids.acquire();
        assert_eq!(reused, fid);
    }

    #[tokio::test]
    async fn fremove_clunks_after_failed_remove() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let conn = FakeConn {
            replies: VecDeque::from(vec![
                Ok(FCall::RVersion {
                    msize: 8192,
                    version: P92000U.to_owned(),
                }),
                Ok(FCall::RAttach { qid: fake_qid() }),
                Ok(FCall::RWalk {
                    wqids: vec![fake_qid()],
                }),
                Err(Error::eperm()),
                Ok(FCall::RClunk),
            ]),
            calls: calls.clone(),
        };
        let mut client = Client::attach(conn, "alice", "").await.unwrap();

        let err = client.fremove(&["foo"]).await.unwrap_err();
        assert_eq!(err.errno(), crate::error::errno::EPERM);

        let recorded = calls.lock().unwrap();
        assert!(matches!(recorded.last(), Some(FCall::TClunk { .. })));
    }
}
