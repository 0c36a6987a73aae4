//! The record-per-parcel collection.

use crate::integ::{Integrator, StepError};
use crate::met::TracingContext;
use crate::pgroup::{ProcessGroup, Tag};
use crate::types::{Parcel, ParcelFlags, ParcelStatus};

use super::{Authority, Partition, SwarmError};

/// A distributed parcel collection storing whole [`Parcel`] records.
///
/// Construction is collective: every rank of the group calls
/// [`Flock::new`] with the same arguments, computes the same
/// [`Partition`], and keeps only the parcels it owns. A rank reserved as
/// met server owns none and spends each [`advance`](Flock::advance)
/// inside the serve loop instead.
pub struct Flock {
    group: Box<dyn ProcessGroup>,
    plan: Partition,
    my_rank: usize,
    my_start: usize,
    is_met: bool,
    parcels: Vec<Parcel>,
    blocksize: Option<usize>,
    batch: BatchScratch,
}

#[derive(Default)]
struct BatchScratch {
    lons: Vec<f64>,
    lats: Vec<f64>,
    zs: Vec<f64>,
    flags: Vec<i32>,
    skips: Vec<bool>,
}

impl Flock {
    /// Create a collection of `n` copies of `seed` over `group`, with
    /// `ratio` tracing ranks per reserved met server (0 reserves none).
    ///
    /// When a met server is reserved for this rank's subgroup, the
    /// context's met source is bound to it here, so queries made during
    /// [`advance`](Flock::advance) are served remotely.
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
        let parcels = vec![*seed; share.count];

        Ok(Self {
            group,
            my_rank,
            my_start: share.start.unwrap_or(0),
            is_met: plan.is_met(my_rank),
            plan,
            parcels,
            blocksize: None,
            batch: BatchScratch::default(),
        })
    }

    /// Total parcels across all ranks.
    pub fn size(&self) -> usize {
        self.plan.total
    }

    /// Parcels owned by this rank; zero on a met server.
    pub fn local_count(&self) -> usize {
        self.parcels.len()
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

    /// The locally-owned parcels, paired with their global indices.
    /// Empty on a met-server rank.
    ///
    /// This is a purely local view with no communication; the
    /// serve/signal-done handshake lives in [`advance`](Flock::advance).
    /// Code making met queries per parcel outside `advance` must pair
    /// them itself: the met rank runs `ctx.met.serve()` while each
    /// tracer loops and then calls `ctx.met.signal_done()`.
    pub fn iter_local(&self) -> impl Iterator<Item = (usize, &Parcel)> {
        let start = self.my_start;
        self.parcels.iter().enumerate().map(move |(i, p)| (start + i, p))
    }

    /// Mutable access to the locally-owned parcels.
    ///
    /// Fails with [`SwarmError::MetIsNotTracer`] on a met-server rank,
    /// which has no tracer's-eye view to offer.
    pub fn tracer_parcels_mut(&mut self) -> Result<&mut [Parcel], SwarmError> {
        if self.is_met {
            return Err(SwarmError::MetIsNotTracer);
        }
        Ok(&mut self.parcels)
    }

    /// Collectively replace the parcel at global index `n`.
    ///
    /// With [`Authority::Root`] the root rank's `p` is sent to the
    /// owner; with [`Authority::Owner`] each rank applies its own `p`
    /// only if it owns the index. Every rank of the group must make this
    /// call in the same order.
    pub fn set(&mut self, n: usize, p: &Parcel, auth: Authority) -> Result<(), SwarmError> {
        if self.is_met {
            return Ok(());
        }
        let owner = self.plan.owner_of(n)?;

        if owner == self.my_rank {
            let idx = n - self.my_start;
            if auth == Authority::Root && !self.group.is_root() {
                self.parcels[idx] = receive_parcel(&*self.group, Some(self.group.root_id()))?;
            } else {
                self.parcels[idx] = *p;
            }
        } else if auth == Authority::Root && self.group.is_root() {
            send_parcel(&*self.group, owner, p)?;
        }
        Ok(())
    }

    /// Collectively read the parcel at global index `n`.
    ///
    /// With [`Authority::Root`] the value travels from its owner to the
    /// root and is broadcast to every tracing rank, so all of them
    /// return it. With [`Authority::Owner`] no communication happens and
    /// only the owner returns a value. A met-server rank always returns
    /// `None`.
    pub fn parcel(&self, n: usize, auth: Authority) -> Result<Option<Parcel>, SwarmError> {
        if self.is_met {
            return Ok(None);
        }
        let owner = self.plan.owner_of(n)?;
        let root = self.group.root_id();

        if auth == Authority::Owner {
            return Ok((owner == self.my_rank).then(|| self.parcels[n - self.my_start]));
        }

        if owner == self.my_rank {
            let p = self.parcels[n - self.my_start];
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

    /// Collectively advance every parcel by `dt` days.
    ///
    /// A met-server rank serves wind queries for its subgroup until all
    /// its tracers signal done; tracing ranks push their parcels through
    /// the batched integrator and then signal. Parcels the integrator
    /// could not advance are retired with `HIT_BAD`.
    pub fn advance(&mut self, ctx: &TracingContext, dt: f64) -> Result<(), SwarmError> {
        if self.is_met {
            ctx.met.serve()?;
            return Ok(());
        }

        let n = self.parcels.len();
        if n > 0 {
            let tyme = self.parcels[0].t;
            let blk = match self.blocksize {
                Some(b) if b > 0 && b < n => b,
                _ => n,
            };

            let mut i = 0;
            while i < n {
                let jmax = (i + blk).min(n);
                let count = jmax - i;
                self.load_batch(i, jmax, tyme);
                let b = &mut self.batch;

                let mut t_chunk = tyme;
                ctx.integ
                    .go_batch(
                        &mut b.lons[..count],
                        &mut b.lats[..count],
                        &mut b.zs[..count],
                        &mut b.flags[..count],
                        &mut t_chunk,
                        &ctx.met,
                        &ctx.nav,
                        dt,
                    )
                    .map_err(|e| match e {
                        StepError::Nav(e) => SwarmError::Nav(e),
                        StepError::Met(_) => SwarmError::BadGeneration,
                    })?;

                self.store_batch(i, jmax, t_chunk);
                i = jmax;
            }
        }
        ctx.met.signal_done()?;
        Ok(())
    }

    fn load_batch(&mut self, from: usize, to: usize, tyme: f64) {
        let b = &mut self.batch;
        b.lons.clear();
        b.lats.clear();
        b.zs.clear();
        b.flags.clear();
        b.skips.clear();
        for p in &self.parcels[from..to] {
            b.lons.push(p.lon);
            b.lats.push(p.lat);
            b.zs.push(p.z);
            let skip = !p.is_traceable()
                || (p.flags.contains(ParcelFlags::SYNC_TRACE) && p.t >= tyme);
            b.flags.push(skip as i32);
            b.skips.push(skip);
        }
    }

    fn store_batch(&mut self, from: usize, to: usize, t_new: f64) {
        let b = &self.batch;
        for (j, p) in self.parcels[from..to].iter_mut().enumerate() {
            if b.skips[j] {
                continue;
            }
            p.lon = b.lons[j];
            p.lat = b.lats[j];
            p.z = b.zs[j];
            p.t = t_new;
            // a flag raised by the integrator retires the parcel
            if b.flags[j] != 0 {
                p.status |= ParcelStatus::HIT_BAD;
                p.flags |= ParcelFlags::NO_TRACE;
            }
        }
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

    fn serial_ctx() -> TracingContext {
        TracingContext::new(SphereNav::earth(), Box::new(SolidBodyRotation::new()))
    }

    #[test]
    fn serial_flock_owns_every_parcel() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(10.0, 20.0, 16.0);
        let flock = Flock::new(&seed, Box::new(SerialGroup::new()), 7, 0, &mut ctx).unwrap();
        assert_eq!(flock.size(), 7);
        assert_eq!(flock.local_count(), 7);
        assert!(!flock.is_met_rank());
        let indices: Vec<usize> = flock.iter_local().map(|(i, _)| i).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn set_and_read_back_by_index() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(0.0, 0.0, 16.0);
        let mut flock = Flock::new(&seed, Box::new(SerialGroup::new()), 3, 0, &mut ctx).unwrap();

        let p = Parcel::new(45.0, -30.0, 12.0);
        flock.set(1, &p, Authority::Root).unwrap();
        let got = flock.parcel(1, Authority::Root).unwrap().unwrap();
        assert_eq!(got.lon, 45.0);
        assert_eq!(got.lat, -30.0);

        assert!(flock.set(9, &p, Authority::Root).is_err());
        assert!(flock.parcel(9, Authority::Owner).is_err());
    }

    #[test]
    fn advance_moves_every_owned_parcel() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(0.0, 0.0, 16.0);
        let mut flock = Flock::new(&seed, Box::new(SerialGroup::new()), 4, 0, &mut ctx).unwrap();
        flock.advance(&ctx, 0.5).unwrap();
        for (_, p) in flock.iter_local() {
            assert!(p.lon > 0.0);
            assert!((p.t - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn retired_parcels_hold_still_under_advance() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(0.0, 0.0, 16.0);
        let mut flock = Flock::new(&seed, Box::new(SerialGroup::new()), 3, 0, &mut ctx).unwrap();
        flock.tracer_parcels_mut().unwrap()[1].mark_bad();
        flock.advance(&ctx, 0.5).unwrap();
        let stuck = flock.parcel(1, Authority::Owner).unwrap().unwrap();
        assert_eq!(stuck.lon, 0.0);
        let moved = flock.parcel(0, Authority::Owner).unwrap().unwrap();
        assert!(moved.lon > 0.0);
    }

    #[test]
    fn blocking_does_not_change_results() {
        let mut ctx = serial_ctx();
        let seed = Parcel::new(20.0, 35.0, 16.0);
        let mut whole = Flock::new(&seed, Box::new(SerialGroup::new()), 5, 0, &mut ctx).unwrap();
        let mut blocked = Flock::new(&seed, Box::new(SerialGroup::new()), 5, 0, &mut ctx).unwrap();
        blocked.set_blocksize(Some(2));
        whole.advance(&ctx, 0.25).unwrap();
        blocked.advance(&ctx, 0.25).unwrap();
        for ((_, a), (_, b)) in whole.iter_local().zip(blocked.iter_local()) {
            assert_eq!(a.lon, b.lon);
            assert_eq!(a.lat, b.lat);
        }
    }
}
