//! Permission checking.
//!
//! 9P stat permission bits are three octal triplets (owner/group/other),
//! but unlike Unix access() this does *not* short-circuit on the first
//! matching class: the effective permission is the *union* of every
//! class the requester belongs to, or'd with the "other" bits.

use bitflags::bitflags;

use crate::fcall::Stat;

bitflags! {
    /// A single permission triplet's worth of bits.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Perm: u32 {
        const READ  = 0x4;
        const WRITE = 0x2;
        const EXEC  = 0x1;
    }
}

/// A group a user may belong to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub id: u32,
}

/// The caller performing an operation, as established by `Tattach`.
///
/// Per this crate's Non-goals, there is no real authentication
/// transaction: the `uname`/`n_uname` supplied by the client is trusted
/// as a capability token, and `Identity` is simply the resolved view of
/// it used for permission checks.
pub trait Identity: Send + Sync {
    /// The textual user name, as carried in `Stat.uid`/`Stat.muid`.
    fn name(&self) -> &str;
    /// The numeric uid, as carried in `Stat.n_uid` under 9P2000.u.
    fn id(&self) -> u32;
    /// Groups this identity belongs to.
    fn groups(&self) -> &[Group];
}

/// A trivial identity carrying exactly what `Tattach` provided, with no
/// group memberships. Suitable when the server doesn't model groups.
#[derive(Clone, Debug)]
pub struct SimpleIdentity {
    pub name: String,
    pub id: u32,
    pub groups: Vec<Group>,
}

impl Identity for SimpleIdentity {
    fn name(&self) -> &str {
        &self.name
    }
    fn id(&self) -> u32 {
        self.id
    }
    fn groups(&self) -> &[Group] {
        &self.groups
    }
}

fn triplet(mode: u32, shift: u32) -> Perm {
    Perm::from_bits_truncate((mode >> shift) & 0o7)
}

/// Check whether `who` may perform `requested` on a file carrying `stat`.
///
/// `eff = other | (owner if who owns the file) | (group if who is in the
/// file's group)`; the request is granted iff every requested bit is set
/// in `eff`.
pub fn check(stat: &Stat, who: &dyn Identity, requested: Perm) -> bool {
    let mut eff = triplet(stat.mode, 0);

    let owns = who.name() == stat.uid || (stat.n_uid != u32::MAX && who.id() == stat.n_uid);
    if owns {
        eff |= triplet(stat.mode, 6);
    }

    let in_group = who.groups().iter().any(|g| {
        g.name == stat.gid || (stat.n_gid != u32::MAX && g.id == stat.n_gid)
    });
    if in_group {
        eff |= triplet(stat.mode, 3);
    }

    eff.contains(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcall::{Qid, QidType};

    fn stat_with_mode(mode: u32) -> Stat {
        Stat {
            typ: 0,
            dev: 0,
            qid: Qid {
                typ: QidType::FILE,
                version: 0,
                path: 1,
            },
            mode,
            atime: 0,
            mtime: 0,
            length: 0,
            name: "f".to_owned(),
            uid: "alice".to_owned(),
            gid: "staff".to_owned(),
            muid: "alice".to_owned(),
            extension: String::new(),
            n_uid: 1000,
            n_gid: 100,
            n_muid: 1000,
        }
    }

    #[test]
    fn owner_gets_owner_bits_even_if_other_bits_are_empty() {
        let stat = stat_with_mode(0o600);
        let alice = SimpleIdentity {
            name: "alice".to_owned(),
            id: 1000,
            groups: vec![],
        };
        assert!(check(&stat, &alice, Perm::READ | Perm::WRITE));
    }

    #[test]
    fn union_of_classes_not_unix_short_circuit() {
        // owner bits deny write, but other bits allow it: a non-owner,
        // non-group requester should still get write via "other".
        let stat = stat_with_mode(0o402);
        let bob = SimpleIdentity {
            name: "bob".to_owned(),
            id: 2000,
            groups: vec![],
        };
        assert!(check(&stat, &bob, Perm::WRITE));

        // the owner, lacking an explicit owner-write bit, still gets write
        // through the "other" class under the union model.
        let alice = SimpleIdentity {
            name: "alice".to_owned(),
            id: 1000,
            groups: vec![],
        };
        assert!(check(&stat, &alice, Perm::WRITE));
    }

    #[test]
    fn group_membership_by_numeric_gid() {
        let stat = stat_with_mode(0o040);
        let carol = SimpleIdentity {
            name: "carol".to_owned(),
            id: 3000,
            groups: vec![Group {
                name: "other-group".to_owned(),
                id: 100,
            }],
        };
        assert!(check(&stat, &carol, Perm::READ));
    }

    #[test]
    fn no_matching_class_denies() {
        let stat = stat_with_mode(0o600);
        let bob = SimpleIdentity {
            name: "bob".to_owned(),
            id: 2000,
            groups: vec![],
        };
        assert!(!check(&stat, &bob, Perm::READ));
    }
}
