//! Partition invariants over the whole (N, P, r) space.

use proptest::prelude::*;

use windtraj::swarm::Partition;

proptest! {
    /// Every parcel index is owned exactly once: counts sum to N, no
    /// overlap, no gaps.
    #[test]
    fn ownership_covers_every_index_once(
        n in 0usize..5000,
        p in 1usize..64,
        r in 0usize..16,
    ) {
        let plan = match Partition::plan(n, p, r) {
            Ok(plan) => plan,
            // too few parcels for the tracer count is the only failure
            Err(_) => {
                prop_assume!(false);
                unreachable!()
            }
        };

        let mut owned = vec![0u32; plan.total];
        for share in &plan.shares {
            if let Some(start) = share.start {
                for i in start..start + share.count {
                    owned[i] += 1;
                }
            }
        }
        prop_assert!(owned.iter().all(|&c| c == 1));

        let total_count: usize = plan.shares.iter().map(|s| s.count).sum();
        prop_assert_eq!(total_count, plan.total);
    }

    /// Each rank belongs to exactly one subgroup, and subgroups tile the
    /// rank space in order.
    #[test]
    fn subgroups_tile_the_ranks(
        n in 0usize..5000,
        p in 1usize..64,
        r in 0usize..16,
    ) {
        prop_assume!(n == 0 || n >= p);
        let plan = Partition::plan(n, p, r).unwrap();

        let mut ranks: Vec<usize> = plan
            .groups
            .iter()
            .flat_map(|g| g.members.iter().copied())
            .collect();
        ranks.sort_unstable();
        prop_assert_eq!(ranks, (0..p).collect::<Vec<_>>());
    }

    /// A reserved met rank owns no parcels, and reservation only happens
    /// when asked for and possible.
    #[test]
    fn met_ranks_own_nothing(
        n in 0usize..5000,
        p in 1usize..64,
        r in 0usize..16,
    ) {
        prop_assume!(n == 0 || n >= p);
        let plan = Partition::plan(n, p, r).unwrap();

        if r == 0 || p == 1 {
            prop_assert_eq!(plan.num_met, 0);
        }
        for rank in 0..p {
            if plan.is_met(rank) {
                prop_assert_eq!(plan.shares[rank].count, 0);
                prop_assert!(plan.shares[rank].start.is_none());
            }
        }
        prop_assert_eq!(plan.num_met + plan.num_tracers, p);
    }

    /// Owner lookup agrees with the recorded shares.
    #[test]
    fn owner_lookup_is_consistent(
        n in 1usize..2000,
        p in 1usize..32,
        r in 0usize..8,
    ) {
        prop_assume!(n >= p);
        let plan = Partition::plan(n, p, r).unwrap();
        for i in 0..plan.total {
            let owner = plan.owner_of(i).unwrap();
            prop_assert!(plan.shares[owner].owns(i));
        }
        prop_assert!(plan.owner_of(plan.total).is_err());
    }
}

#[test]
fn global_rank_zero_always_traces() {
    // the root of the whole group must keep its tracer role
    for p in 1..20 {
        for r in 0..6 {
            let plan = Partition::plan(0, p, r).unwrap();
            assert!(!plan.is_met(0), "rank 0 became a server at p={p} r={r}");
        }
    }
}
