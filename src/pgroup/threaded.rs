//! A process group mapped onto OS threads in one address space.
//!
//! Each rank is a thread holding a [`ThreadGroup`] handle. Transfers go
//! through per-rank mailboxes guarded by a mutex and condition variable;
//! barriers are [`std::sync::Barrier`]s. The handles expose only the
//! blocking [`ProcessGroup`] API, so code written against it behaves the
//! same here as on any other transport.

use std::collections::VecDeque;
use std::sync::{Arc, Barrier, Condvar, Mutex};

use super::{GroupError, ProcessGroup, Role, Tag};

#[derive(Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    F64s,
    I32s,
    Str,
}

enum Payload {
    F64s(Vec<f64>),
    I32s(Vec<i32>),
    Str(String),
}

impl Payload {
    fn kind(&self) -> PayloadKind {
        match self {
            Payload::F64s(_) => PayloadKind::F64s,
            Payload::I32s(_) => PayloadKind::I32s,
            Payload::Str(_) => PayloadKind::Str,
        }
    }
}

struct Message {
    src: usize,
    tag: Tag,
    payload: Payload,
}

#[derive(Default)]
struct Mailbox {
    q: Mutex<VecDeque<Message>>,
    cv: Condvar,
}

struct GroupState {
    gid: usize,
    parent: usize,
    /// Global thread ids; position defines the local rank.
    members: Vec<usize>,
    barrier: Barrier,
    boxes: Vec<Mailbox>,
}

impl GroupState {
    fn new(gid: usize, parent: usize, members: Vec<usize>) -> Self {
        let n = members.len();
        Self {
            gid,
            parent,
            members,
            barrier: Barrier::new(n),
            boxes: (0..n).map(|_| Mailbox::default()).collect(),
        }
    }
}

struct FabricInner {
    root: Arc<GroupState>,
    registry: Mutex<Registry>,
}

struct Registry {
    next_gid: usize,
    groups: Vec<Arc<GroupState>>,
}

// =============================================================================
// ThreadFabric
// =============================================================================

/// The shared state behind a set of [`ThreadGroup`] handles.
///
/// # Example
///
/// ```
/// use windtraj::pgroup::{ProcessGroup, ThreadFabric};
/// use windtraj::pgroup::Tag;
///
/// let fabric = ThreadFabric::new(2);
/// let g0 = fabric.rank(0).unwrap();
/// let g1 = fabric.rank(1).unwrap();
///
/// let t = std::thread::spawn(move || {
///     g1.send_f64s(0, &[3.25], Tag::Recv).unwrap();
/// });
/// let mut buf = [0.0];
/// let src = g0.receive_f64s(None, &mut buf, Tag::Recv).unwrap();
/// assert_eq!((buf[0], src), (3.25, 1));
/// t.join().unwrap();
/// ```
pub struct ThreadFabric {
    inner: Arc<FabricInner>,
    size: usize,
}

impl ThreadFabric {
    /// A fabric of `size` ranks, all members of one root group.
    pub fn new(size: usize) -> Self {
        let root = Arc::new(GroupState::new(0, 0, (0..size).collect()));
        Self {
            inner: Arc::new(FabricInner {
                root,
                registry: Mutex::new(Registry {
                    next_gid: 1,
                    groups: Vec::new(),
                }),
            }),
            size,
        }
    }

    /// Number of ranks in the root group.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The handle a given rank's thread should own.
    pub fn rank(&self, rank: usize) -> Result<ThreadGroup, GroupError> {
        if rank >= self.size {
            return Err(GroupError::BadRank(rank));
        }
        Ok(ThreadGroup {
            inner: Arc::clone(&self.inner),
            group: Arc::clone(&self.inner.root),
            global: rank,
            local: rank,
            role: Role::All,
        })
    }
}

// =============================================================================
// ThreadGroup
// =============================================================================

/// One rank's handle onto a thread-backed process group.
pub struct ThreadGroup {
    inner: Arc<FabricInner>,
    group: Arc<GroupState>,
    /// Id within the root group.
    global: usize,
    /// Id within `group`.
    local: usize,
    role: Role,
}

impl Clone for ThreadGroup {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            group: Arc::clone(&self.group),
            global: self.global,
            local: self.local,
            role: self.role,
        }
    }
}

impl ThreadGroup {
    fn post(&self, dest: usize, tag: Tag, payload: Payload) -> Result<(), GroupError> {
        let mbox = self
            .group
            .boxes
            .get(dest)
            .ok_or(GroupError::BadRank(dest))?;
        let mut q = mbox.q.lock().map_err(|_| GroupError::Poisoned)?;
        q.push_back(Message {
            src: self.local,
            tag,
            payload,
        });
        mbox.cv.notify_all();
        Ok(())
    }

    fn collect(
        &self,
        src: Option<usize>,
        tag: Tag,
        kind: PayloadKind,
    ) -> Result<Message, GroupError> {
        if let Some(s) = src {
            if s >= self.group.members.len() {
                return Err(GroupError::BadRank(s));
            }
        }
        let mbox = &self.group.boxes[self.local];
        let mut q = mbox.q.lock().map_err(|_| GroupError::Poisoned)?;
        loop {
            let found = q.iter().position(|m| {
                m.tag == tag && m.payload.kind() == kind && src.map_or(true, |s| m.src == s)
            });
            if let Some(pos) = found {
                if let Some(m) = q.remove(pos) {
                    return Ok(m);
                }
            }
            q = mbox.cv.wait(q).map_err(|_| GroupError::Poisoned)?;
        }
    }
}

impl ProcessGroup for ThreadGroup {
    fn id(&self) -> usize {
        self.local
    }

    fn group_id(&self) -> usize {
        self.group.gid
    }

    fn size(&self) -> usize {
        self.group.members.len()
    }

    fn role(&self) -> Role {
        self.role
    }

    fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    fn duplicate(&self) -> Box<dyn ProcessGroup> {
        Box::new(self.clone())
    }

    fn subgroup(&self, members: &[usize]) -> Result<Box<dyn ProcessGroup>, GroupError> {
        if members.is_empty() {
            return Err(GroupError::BadSubgroup);
        }
        let globals = members
            .iter()
            .map(|&m| {
                self.group
                    .members
                    .get(m)
                    .copied()
                    .ok_or(GroupError::BadSubgroup)
            })
            .collect::<Result<Vec<usize>, GroupError>>()?;
        let local = globals
            .iter()
            .position(|&g| g == self.global)
            .ok_or(GroupError::BadSubgroup)?;

        let mut reg = self
            .inner
            .registry
            .lock()
            .map_err(|_| GroupError::Poisoned)?;

        // every member names the identical list; whoever arrives first
        // creates the group and the rest find it here
        let state = match reg
            .groups
            .iter()
            .find(|st| st.parent == self.group.gid && st.members == globals)
        {
            Some(st) => Arc::clone(st),
            None => {
                let gid = reg.next_gid;
                reg.next_gid += 1;
                let st = Arc::new(GroupState::new(gid, self.group.gid, globals));
                reg.groups.push(Arc::clone(&st));
                st
            }
        };

        Ok(Box::new(ThreadGroup {
            inner: Arc::clone(&self.inner),
            group: state,
            global: self.global,
            local,
            role: self.role,
        }))
    }

    fn sync(&self) {
        self.group.barrier.wait();
    }

    fn send_f64s(&self, dest: usize, vals: &[f64], tag: Tag) -> Result<(), GroupError> {
        self.post(dest, tag, Payload::F64s(vals.to_vec()))
    }

    fn receive_f64s(
        &self,
        src: Option<usize>,
        buf: &mut [f64],
        tag: Tag,
    ) -> Result<usize, GroupError> {
        let m = self.collect(src, tag, PayloadKind::F64s)?;
        if let Payload::F64s(vals) = m.payload {
            let n = buf.len().min(vals.len());
            buf[..n].copy_from_slice(&vals[..n]);
        }
        Ok(m.src)
    }

    fn send_i32s(&self, dest: usize, vals: &[i32], tag: Tag) -> Result<(), GroupError> {
        self.post(dest, tag, Payload::I32s(vals.to_vec()))
    }

    fn receive_i32s(
        &self,
        src: Option<usize>,
        buf: &mut [i32],
        tag: Tag,
    ) -> Result<usize, GroupError> {
        let m = self.collect(src, tag, PayloadKind::I32s)?;
        if let Payload::I32s(vals) = m.payload {
            let n = buf.len().min(vals.len());
            buf[..n].copy_from_slice(&vals[..n]);
        }
        Ok(m.src)
    }

    fn send_str(&self, dest: usize, s: &str, tag: Tag) -> Result<(), GroupError> {
        self.post(dest, tag, Payload::Str(s.to_string()))
    }

    fn receive_str(&self, src: Option<usize>, tag: Tag) -> Result<(String, usize), GroupError> {
        let m = self.collect(src, tag, PayloadKind::Str)?;
        match m.payload {
            Payload::Str(s) => Ok((s, m.src)),
            _ => Err(GroupError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn point_to_point_by_tag_and_source() {
        let fabric = ThreadFabric::new(3);
        let g0 = fabric.rank(0).unwrap();
        let g1 = fabric.rank(1).unwrap();
        let g2 = fabric.rank(2).unwrap();

        let t1 = thread::spawn(move || {
            g1.send_i32s(0, &[11], Tag::Req).unwrap();
        });
        let t2 = thread::spawn(move || {
            g2.send_i32s(0, &[22], Tag::Req).unwrap();
        });

        let mut a = [0i32];
        let mut b = [0i32];
        let s1 = g0.receive_i32s(Some(1), &mut a, Tag::Req).unwrap();
        let s2 = g0.receive_i32s(Some(2), &mut b, Tag::Req).unwrap();
        assert_eq!((a[0], s1), (11, 1));
        assert_eq!((b[0], s2), (22, 2));

        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    fn tags_do_not_cross() {
        let fabric = ThreadFabric::new(2);
        let g0 = fabric.rank(0).unwrap();
        let g1 = fabric.rank(1).unwrap();

        let t = thread::spawn(move || {
            g1.send_f64s(0, &[1.0], Tag::Time).unwrap();
            g1.send_f64s(0, &[2.0], Tag::Coords).unwrap();
        });

        // ask for the Coords message first; Time must still be waiting
        let mut c = [0.0f64];
        g0.receive_f64s(Some(1), &mut c, Tag::Coords).unwrap();
        assert_eq!(c[0], 2.0);
        let mut ti = [0.0f64];
        g0.receive_f64s(Some(1), &mut ti, Tag::Time).unwrap();
        assert_eq!(ti[0], 1.0);

        t.join().unwrap();
    }

    #[test]
    fn subgroup_renumbers_ranks() {
        let fabric = ThreadFabric::new(4);
        let mut handles = Vec::new();
        for rank in 0..4 {
            let g = fabric.rank(rank).unwrap();
            handles.push(thread::spawn(move || {
                // ranks 1 and 3 form a subgroup; 3 becomes local rank 1
                if rank == 1 || rank == 3 {
                    let sub = g.subgroup(&[1, 3]).unwrap();
                    assert_eq!(sub.size(), 2);
                    if rank == 1 {
                        assert_eq!(sub.id(), 0);
                        let mut buf = [0i32];
                        let src = sub.receive_i32s(None, &mut buf, Tag::Req).unwrap();
                        assert_eq!((buf[0], src), (7, 1));
                    } else {
                        assert_eq!(sub.id(), 1);
                        sub.send_i32s(0, &[7], Tag::Req).unwrap();
                    }
                    sub.sync();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn barrier_joins_all_ranks() {
        let fabric = ThreadFabric::new(3);
        let counter = Arc::new(Mutex::new(0usize));
        let mut handles = Vec::new();
        for rank in 0..3 {
            let g = fabric.rank(rank).unwrap();
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                {
                    let mut c = counter.lock().unwrap();
                    *c += 1;
                }
                g.sync();
                // after the barrier every rank must have incremented
                assert_eq!(*counter.lock().unwrap(), 3);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
