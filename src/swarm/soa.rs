//! The field-array collection.
//!
//! Same population and partition semantics as [`Flock`](super::Flock),
//! but each parcel field lives in its own parallel array, so the batched
//! integrator works on the storage directly with no gather or scatter.

use crate::integ::{Integrator, StepError};
use crate::met::TracingContext;
use crate::pgroup::{ProcessGroup, Tag};
use crate::types::{Parcel, ParcelFlags, ParcelStatus};

use super::{Authority, Partition, SwarmError};

/// A distributed parcel collection in structure-of-arrays layout.
///
/// Retired parcels are swapped to the tail of the local arrays by
/// [`arrange`](Swarm::arrange) before each advance, so the integrator
/// only ever sees a dense prefix of live parcels. The `ids` column keeps
/// each slot's global parcel index across those swaps.
pub struct Swarm {
    group: Box<dyn ProcessGroup>,
    plan: Partition,
    my_rank: usize,
    my_start: usize,
    is_met: bool,
    blocksize: Option<usize>,

    ids: Vec<usize>,
    lons: Vec<f64>,
    lats: Vec<f64>,
    zs: Vec<f64>,
    ts: Vec<f64>,
    tags: Vec<f64>,
    flags: Vec<ParcelFlags>,
    status: Vec<ParcelStatus>,

    traceflags: Vec<i32>,
}

impl Swarm {
    /// Create a collection of `n` copies of `seed` over `group`, with
    /// `ratio` tracing ranks per reserved met server (0 reserves none).
    pub fn new(
        seed: &Parcel,
        group: Box<dyn ProcessGroup>,
        n: usize,
        ratio: usize,
        ctx: &mut TracingContext,
    ) -> Result<Self, SwarmError> {
        let plan = Partition::plan(n, group.size(), ratio)?;
        let my_rank = group.id();
        let mine = plan.group_of(my_rank).ok_or(SwarmError::BadGeneration)?;

        if let Some(met_rank) = mine.met_rank {
            let sub = group.subgroup(&mine.members)?;
            ctx.met.bind(sub, met_rank);
        }

        let share = plan.shares[my_rank];
        let start = share.start.unwrap_or(0);
        let count = share.count;

        Ok(Self {
            group,
            my_rank,
            my_start: start,
            is_met: plan.is_met(my_rank),
            plan,
            blocksize: None,
            ids: (start..start + count).collect(),
            lons: vec![seed.lon; count],
            lats: vec![seed.lat; count],
            zs: vec![seed.z; count],
            ts: vec![seed.t; count],
            tags: vec![seed.tag; count],
            flags: vec![seed.flags; count],
            status: vec![seed.status; count],
            traceflags: Vec::with_capacity(count),
        })
    }

    /// Total parcels across all ranks.
    pub fn size(&self) -> usize {
        self.plan.total
    }

    /// Parcels owned by this rank; zero on a met server.
    pub fn local_count(&self) -> usize {
        self.ids.len()
    }

    /// True on the rank reserved to serve met data for this subgroup.
    pub fn is_met_rank(&self) -> bool {
        self.is_met
    }

    /// True on the group's root rank.
    pub fn is_root(&self) -> bool {
        self.group.is_root()
    }

    /// The partition this collection was built with.
    pub fn partition(&self) -> &Partition {
        &self.plan
    }

    /// Cap the number of parcels handed to the integrator per batch.
    pub fn set_blocksize(&mut self, blocksize: Option<usize>) {
        self.blocksize = blocksize;
    }

    /// Collective barrier over the whole group.
    pub fn sync(&self) {
        self.group.sync();
    }

    /// The locally-owned parcels, assembled from the field arrays and
    /// paired with their global indices. Empty on a met-server rank.
    ///
    /// A purely local view with no communication; met queries made per
    /// parcel outside [`advance`](Swarm::advance) need an explicit
    /// `serve()`/`signal_done()` pairing, as for
    /// [`Flock::iter_local`](crate::swarm::Flock::iter_local).
    pub fn iter_local(&self) -> impl Iterator<Item = (usize, Parcel)> + '_ {
        (0..self.ids.len()).map(move |i| (self.ids[i], self.assemble(i)))
    }

    fn assemble(&self, i: usize) -> Parcel {
        Parcel {
            lon: self.lons[i],
            lat: self.lats[i],
            z: self.zs[i],
            t: self.ts[i],
            tag: self.tags[i],
            flags: self.flags[i],
            status: self.status[i],
        }
    }

    fn store(&mut self, i: usize, p: &Parcel) {
        self.lons[i] = p.lon;
        self.lats[i] = p.lat;
        self.zs[i] = p.z;
        self.ts[i] = p.t;
        self.tags[i] = p.tag;
        self.flags[i] = p.flags;
        self.status[i] = p.status;
    }

    /// The local array slot currently holding global index `n`.
    fn slot_of(&self, n: usize) -> Option<usize> {
        self.ids.iter().position(|&id| id == n)
    }

    /// Collectively replace the parcel at global index `n`; same
    /// authority semantics as [`Flock::set`](super::Flock::set).
    pub fn set(&mut self, n: usize, p: &Parcel, auth: Authority) -> Result<(), SwarmError> {
        if self.is_met {
            return Ok(());
        }
        let owner = self.plan.owner_of(n)?;

        if owner == self.my_rank {
            let slot = self.slot_of(n).ok_or(SwarmError::BadParcelIndex(n))?;
            if auth == Authority::Root && !self.group.is_root() {
                let got = receive_parcel(&*self.group, Some(self.group.root_id()))?;
                self.store(slot, &got);
            } else {
                self.store(slot, p);
            }
        } else if auth == Authority::Root && self.group.is_root() {
            send_parcel(&*self.group, owner, p)?;
        }
        Ok(())
    }

    /// Collectively read the parcel at global index `n`; same authority
    /// semantics as [`Flock::parcel`](super::Flock::parcel).
    pub fn parcel(&self, n: usize, auth: Authority) -> Result<Option<Parcel>, SwarmError> {
        if self.is_met {
            return Ok(None);
        }
        let owner = self.plan.owner_of(n)?;
        let root = self.group.root_id();

        if auth == Authority::Owner {
            return match self.slot_of(n) {
                Some(slot) if owner == self.my_rank => Ok(Some(self.assemble(slot))),
                _ => Ok(None),
            };
        }

        if owner == self.my_rank {
            let slot = self.slot_of(n).ok_or(SwarmError::BadParcelIndex(n))?;
            let p = self.assemble(slot);
            if self.my_rank == root {
                self.broadcast_parcel(&p, owner)?;
            } else {
                send_parcel(&*self.group, root, &p)?;
            }
            Ok(Some(p))
        } else if self.my_rank == root {
            let p = receive_parcel(&*self.group, Some(owner))?;
            self.broadcast_parcel(&p, owner)?;
            Ok(Some(p))
        } else {
            Ok(Some(receive_parcel(&*self.group, Some(root))?))
        }
    }

    fn broadcast_parcel(&self, p: &Parcel, owner: usize) -> Result<(), SwarmError> {
        for (rank, share) in self.plan.shares.iter().enumerate() {
            if rank == self.my_rank || rank == owner || share.start.is_none() {
                continue;
            }
            send_parcel(&*self.group, rank, p)?;
        }
        Ok(())
    }

    /// Swap retired parcels to the tail of the local arrays and return
    /// the length of the live prefix.
    ///
    /// A parcel is live while both its flag and status words are clear.
    pub fn arrange(&mut self) -> usize {
        let n = self.ids.len();
        let live = |s: &Self, i: usize| {
            s.flags[i] == ParcelFlags::NONE && s.status[i] == ParcelStatus::NONE
        };

        let mut i = 0;
        let mut j = n;
        while i < j {
            if live(self, i) {
                i += 1;
                continue;
            }
            j -= 1;
            while j > i && !live(self, j) {
                j -= 1;
            }
            if j > i {
                self.swap(i, j);
                i += 1;
            }
        }
        i
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.ids.swap(a, b);
        self.lons.swap(a, b);
        self.lats.swap(a, b);
        self.zs.swap(a, b);
        self.ts.swap(a, b);
        self.tags.swap(a, b);
        self.flags.swap(a, b);
        self.status.swap(a, b);
    }

    /// Collectively advance every parcel by `dt` days.
    ///
    /// Tracing ranks first [`arrange`](Swarm::arrange) so the integrator
    /// runs over the dense live prefix of the arrays in place; a met
    /// server rank spends the call serving its subgroup.
    pub fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError> {
        if self.is_met {
            ctx.met.serve()?;
            return Ok(());
        }

        let live = self.arrange();
        if live > 0 {
            let tyme = self.ts[0];
            let blk = match self.blocksize {
                Some(b) if b > 0 && b < live => b,
                _ => live,
            };

            let mut i = 0;
            while i < live {
                let jmax = (i + blk).min(live);
                let count = jmax - i;

                self.traceflags.clear();
                self.traceflags.resize(count, 0);

                let mut t_chunk = tyme;
                ctx.integ
                    .go_batch(
                        &mut self.lons[i..jmax],
                        &mut self.lats[i..jmax],
                        &mut self.zs[i..jmax],
                        &mut self.traceflags[..count],
                        &mut t_chunk,
                        &ctx.met,
                        &ctx.nav,
                        dt,
                    )
                    .map_err(|e| match e {
                        StepError::Nav(e) => SwarmError::Nav(e),
                        StepError::Met(_) => SwarmError::BadGeneration,
                    })?;

                for j in i..jmax {
                    if self.traceflags[j - i] != 0 {
                        self.status[j] |= ParcelStatus::HIT_BAD;
                        self.flags[j] |= ParcelFlags::NO_TRACE;
                    } else {
                        self.ts[j] = t_chunk;
                    }
                }
                i = jmax;
            }
        }
        ctx.met.signal_done()?;
        Ok(())
    }
}

fn send_parcel(group: &dyn ProcessGroup, dest: usize, p: &Parcel) -> Result<(), SwarmError> {
    group.send_f64s(dest, &p.wire_reals(), Tag::Parcel)?;
    group.send_i32s(dest, &p.wire_ints(), Tag::Parcel)?;
    Ok(())
}

fn receive_parcel(group: &dyn ProcessGroup, src: Option<usize>) -> Result<Parcel, SwarmError> {
    let mut reals = [0.0f64; Parcel::WIRE_REALS];
    let actual = group.receive_f64s(src, &mut reals, Tag::Parcel)?;
    let mut ints = [0i32; Parcel::WIRE_INTS];
    group.receive_i32s(Some(actual), &mut ints, Tag::Parcel)?;
    Ok(Parcel::from_wire(&reals, &ints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::met::SolidBodyRotation;
    use crate::nav::SphereNav;
    use crate::pgroup::SerialGroup;
    use crate::swarm::Flock;

    fn serial_ctx() -> TracingContext {
        TracingContext::new(SphereNav::earth(), Box::new(SolidBodyRotation::new()))
    }

    #[test]
    fn arrange_packs_live_parcels_first() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(0.0, 0.0, 16.0);
        let mut swarm = Swarm::new(&seed, Box::new(SerialGroup::new()), 6, 0, &mut ctx).unwrap();

        let mut bad = seed;
        bad.mark_bad();
        swarm.set(1, &bad, Authority::Owner).unwrap();
        swarm.set(4, &bad, Authority::Owner).unwrap();

        assert_eq!(swarm.arrange(), 4);
        let live_ids: Vec<usize> = swarm.iter_local().take(4).map(|(id, _)| id).collect();
        assert!(!live_ids.contains(&1));
        assert!(!live_ids.contains(&4));
        // every global index is still present exactly once
        let mut all: Vec<usize> = swarm.iter_local().map(|(id, _)| id).collect();
        all.sort_unstable();
        assert_eq!(all, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn advance_skips_retired_parcels_in_place() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(0.0, 0.0, 16.0);
        let mut swarm = Swarm::new(&seed, Box::new(SerialGroup::new()), 3, 0, &mut ctx).unwrap();

        let mut bad = seed;
        bad.mark_bad();
        swarm.set(2, &bad, Authority::Owner).unwrap();
        swarm.advance(&ctx, 0.5).unwrap();

        let stuck = swarm.parcel(2, Authority::Owner).unwrap().unwrap();
        assert_eq!(stuck.lon, 0.0);
        assert_eq!(stuck.t, 0.0);
        let moved = swarm.parcel(0, Authority::Owner).unwrap().unwrap();
        assert!(moved.lon > 0.0);
        assert!((moved.t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn both_layouts_trace_identically() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(30.0, 45.0, 16.0);
        let mut flock = Flock::new(&seed, Box::new(SerialGroup::new()), 4, 0, &mut ctx).unwrap();
        let mut swarm = Swarm::new(&seed, Box::new(SerialGroup::new()), 4, 0, &mut ctx).unwrap();

        for _ in 0..10 {
            flock.advance(&ctx, 0.1).unwrap();
            swarm.advance(&ctx, 0.1).unwrap();
        }
        for ((_, a), (_, b)) in flock.iter_local().zip(swarm.iter_local()) {
            assert!((a.lon - b.lon).abs() < 1e-12);
            assert!((a.lat - b.lat).abs() < 1e-12);
        }
    }
}
