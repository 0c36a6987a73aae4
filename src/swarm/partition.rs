//! Static division of parcels and ranks, computed once at construction.

use super::SwarmError;

/// One rank's slice of the global parcel sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RankShare {
    /// First global index owned, `None` for a rank that owns nothing.
    pub start: Option<usize>,
    /// Number of parcels owned.
    pub count: usize,
}

impl RankShare {
    /// True if this rank owns the given global index.
    pub fn owns(&self, index: usize) -> bool {
        match self.start {
            Some(s) => index >= s && index < s + self.count,
            None => false,
        }
    }
}

/// One subgroup of ranks: its members in global-rank order and the local
/// rank reserved as met server, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupPlan {
    /// Global ranks belonging to this subgroup, in local-rank order.
    pub members: Vec<usize>,
    /// Local rank of the subgroup's met server.
    pub met_rank: Option<usize>,
}

/// The partition of N parcels over P ranks with met-reservation ratio r.
///
/// The ratio caps at P−1; with r > 0 and more than one rank, one rank
/// out of every r+1 becomes a dedicated met server and each server
/// anchors one subgroup of tracers. Within a subgroup the met server
/// sits at local rank 1 so that global rank 0 always traces parcels.
/// Parcels are dealt evenly to tracer slots in global-rank order, with
/// the remainder going one each to the earliest slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Total parcels in the collection.
    pub total: usize,
    /// Ranks reserved as met servers.
    pub num_met: usize,
    /// Ranks that trace parcels.
    pub num_tracers: usize,
    /// The subgroups, in order of their first global rank.
    pub groups: Vec<GroupPlan>,
    /// Per-global-rank ownership, indexed by rank.
    pub shares: Vec<RankShare>,
}

impl Partition {
    /// Plan a partition of `n` parcels over `p` ranks with ratio `r`
    /// tracers per met server (0 disables met reservation).
    ///
    /// `n == 0` asks for the default of one parcel per tracing rank.
    /// Fails with [`SwarmError::BadParcelCount`] when there are fewer
    /// parcels than tracing ranks.
    pub fn plan(n: usize, p: usize, r: usize) -> Result<Self, SwarmError> {
        let (num_met, num_tracers, num_groups) = if r > 0 && p > 1 {
            let r = r.min(p - 1);
            let num_met = p / (r + 1);
            (num_met, p - num_met, num_met.max(1))
        } else {
            (0, p, 1)
        };

        let (normal_group_size, mut extra_ranks) = if num_met > 0 {
            // one met slot plus an even share of the tracers
            let normal = num_tracers / num_groups;
            (normal + 1, num_tracers - normal * num_groups)
        } else {
            (p, 0)
        };

        let total = if n == 0 { num_tracers } else { n };
        if total < num_tracers {
            return Err(SwarmError::BadParcelCount {
                parcels: total,
                tracers: num_tracers,
            });
        }

        let normal_share = total / num_tracers;
        let mut extra_parcels = total - normal_share * num_tracers;

        let mut groups = Vec::with_capacity(num_groups);
        let mut shares = vec![RankShare::default(); p];

        let mut next_rank = 0usize;
        let mut next_parcel = 0usize;
        for _ in 0..num_groups {
            let mut group_size = normal_group_size;
            if extra_ranks > 0 {
                group_size += 1;
                extra_ranks -= 1;
            }

            let members: Vec<usize> = (next_rank..next_rank + group_size).collect();
            next_rank += group_size;
            let met_rank = (num_met > 0).then_some(1);

            for (slot, &rank) in members.iter().enumerate() {
                if Some(slot) == met_rank {
                    continue;
                }
                let mut count = normal_share;
                if extra_parcels > 0 {
                    count += 1;
                    extra_parcels -= 1;
                }
                shares[rank] = RankShare {
                    start: Some(next_parcel),
                    count,
                };
                next_parcel += count;
            }

            groups.push(GroupPlan { members, met_rank });
        }

        Ok(Self {
            total,
            num_met,
            num_tracers,
            groups,
            shares,
        })
    }

    /// The subgroup a global rank belongs to.
    pub fn group_of(&self, rank: usize) -> Option<&GroupPlan> {
        self.groups.iter().find(|g| g.members.contains(&rank))
    }

    /// True if the global rank is a reserved met server.
    pub fn is_met(&self, rank: usize) -> bool {
        self.group_of(rank)
            .and_then(|g| g.met_rank.map(|m| g.members[m] == rank))
            .unwrap_or(false)
    }

    /// The global rank owning a global parcel index.
    pub fn owner_of(&self, index: usize) -> Result<usize, SwarmError> {
        if index >= self.total {
            return Err(SwarmError::BadParcelIndex(index));
        }
        self.shares
            .iter()
            .position(|s| s.owns(index))
            .ok_or(SwarmError::BadParcelIndex(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_indices(plan: &Partition) -> Vec<usize> {
        let mut seen = Vec::new();
        for share in &plan.shares {
            if let Some(s) = share.start {
                seen.extend(s..s + share.count);
            }
        }
        seen.sort_unstable();
        seen
    }

    #[test]
    fn single_rank_owns_everything() {
        let plan = Partition::plan(10, 1, 0).unwrap();
        assert_eq!(plan.num_met, 0);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.shares[0], RankShare { start: Some(0), count: 10 });
    }

    #[test]
    fn remainder_parcels_go_to_the_first_tracers() {
        let plan = Partition::plan(11, 4, 0).unwrap();
        let counts: Vec<usize> = plan.shares.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![3, 3, 3, 2]);
        assert_eq!(owned_indices(&plan), (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn ratio_reserves_met_ranks_at_local_slot_one() {
        // 6 ranks, 2 tracers per met server: 2 servers, 4 tracers
        let plan = Partition::plan(8, 6, 2).unwrap();
        assert_eq!(plan.num_met, 2);
        assert_eq!(plan.num_tracers, 4);
        assert_eq!(plan.groups.len(), 2);
        for g in &plan.groups {
            assert_eq!(g.met_rank, Some(1));
        }
        // global ranks 1 and 4 are the servers; they own nothing
        assert!(plan.is_met(1));
        assert!(plan.is_met(4));
        assert_eq!(plan.shares[1].count, 0);
        assert_eq!(plan.shares[4].count, 0);
        assert_eq!(owned_indices(&plan), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn ratio_caps_at_group_size() {
        // r larger than p-1 still leaves one met server
        let plan = Partition::plan(0, 4, 100).unwrap();
        assert_eq!(plan.num_met, 1);
        assert_eq!(plan.num_tracers, 3);
        // default parcel count is one per tracer
        assert_eq!(plan.total, 3);
    }

    #[test]
    fn too_few_parcels_is_an_error() {
        assert!(matches!(
            Partition::plan(2, 4, 0),
            Err(SwarmError::BadParcelCount { parcels: 2, tracers: 4 })
        ));
    }

    #[test]
    fn owner_lookup_matches_shares() {
        let plan = Partition::plan(10, 3, 0).unwrap();
        assert_eq!(plan.owner_of(0).unwrap(), 0);
        assert_eq!(plan.owner_of(9).unwrap(), 2);
        assert!(plan.owner_of(10).is_err());
    }
}
