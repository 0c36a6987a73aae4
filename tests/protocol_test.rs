//! Multi-rank collections over the thread-backed process group:
//! collective set/get, the met client/server exchange, and lock-step
//! advancing.

use std::thread;

use windtraj::met::{MetSource, SolidBodyRotation, TracingContext};
use windtraj::nav::SphereNav;
use windtraj::swarm::{trace, Authority, Flock, Swarm};
use windtraj::types::Parcel;
use windtraj::ThreadFabric;

fn rank_ctx() -> TracingContext {
    TracingContext::new(
        SphereNav::earth(),
        Box::new(SolidBodyRotation::with_tilt(40.0, 30.0)),
    )
}

fn serial_reference(seed: Parcel, dt: f64, steps: usize) -> Parcel {
    let ctx = rank_ctx();
    let mut parcels = vec![seed];
    trace(&mut parcels, &ctx, dt, steps).unwrap();
    parcels[0]
}

#[test]
fn flock_with_dedicated_server_matches_serial_tracing() {
    // 3 ranks, ratio 2: rank 1 serves met data, ranks 0 and 2 trace
    let fabric = ThreadFabric::new(3);
    let seed = Parcel::new(0.0, 0.0, 16.0);
    let dt = 0.05;
    let steps = 20;

    let mut handles = Vec::new();
    for r in 0..3 {
        let group = fabric.rank(r).unwrap();
        handles.push(thread::spawn(move || {
            let mut ctx = rank_ctx();
            let mut flock = Flock::new(&seed, Box::new(group), 4, 2, &mut ctx).unwrap();
            for _ in 0..steps {
                flock.advance(&ctx, dt).unwrap();
            }
            (
                flock.is_met_rank(),
                flock
                    .iter_local()
                    .map(|(i, p)| (i, *p))
                    .collect::<Vec<(usize, Parcel)>>(),
            )
        }));
    }

    let mut gathered = Vec::new();
    let mut met_ranks = 0;
    for h in handles {
        let (is_met, local) = h.join().unwrap();
        if is_met {
            met_ranks += 1;
            // a server rank's local view is empty
            assert!(local.is_empty());
        }
        gathered.extend(local);
    }
    assert_eq!(met_ranks, 1);

    gathered.sort_by_key(|(i, _)| *i);
    let indices: Vec<usize> = gathered.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    let reference = serial_reference(seed, dt, steps);
    for (_, p) in &gathered {
        assert!((p.lon - reference.lon).abs() < 1e-12);
        assert!((p.lat - reference.lat).abs() < 1e-12);
        assert!((p.t - reference.t).abs() < 1e-12);
    }
}

#[test]
fn swarm_with_dedicated_server_matches_serial_tracing() {
    // 2 ranks, ratio 1: rank 1 serves, rank 0 traces everything
    let fabric = ThreadFabric::new(2);
    let seed = Parcel::new(30.0, 45.0, 16.0);
    let dt = 0.1;
    let steps = 10;

    let mut handles = Vec::new();
    for r in 0..2 {
        let group = fabric.rank(r).unwrap();
        handles.push(thread::spawn(move || {
            let mut ctx = rank_ctx();
            let mut swarm = Swarm::new(&seed, Box::new(group), 3, 1, &mut ctx).unwrap();
            for _ in 0..steps {
                swarm.advance(&ctx, dt).unwrap();
            }
            swarm.iter_local().collect::<Vec<(usize, Parcel)>>()
        }));
    }

    let mut gathered = Vec::new();
    for h in handles {
        gathered.extend(h.join().unwrap());
    }
    assert_eq!(gathered.len(), 3);

    let reference = serial_reference(seed, dt, steps);
    for (_, p) in &gathered {
        assert!((p.lon - reference.lon).abs() < 1e-12);
        assert!((p.lat - reference.lat).abs() < 1e-12);
    }
}

#[test]
fn per_parcel_queries_pair_with_an_explicit_serve() {
    // direct met access outside advance: the server rank runs serve(),
    // each tracer signals done after its local loop
    let fabric = ThreadFabric::new(3);
    let seed = Parcel::new(0.0, 0.0, 16.0);

    let mut handles = Vec::new();
    for r in 0..3 {
        let group = fabric.rank(r).unwrap();
        handles.push(thread::spawn(move || {
            let mut ctx = rank_ctx();
            let flock = Flock::new(&seed, Box::new(group), 4, 2, &mut ctx).unwrap();

            if flock.is_met_rank() {
                ctx.met.serve().unwrap();
                return Vec::new();
            }
            let mut alts = Vec::new();
            for (_, p) in flock.iter_local() {
                let alt = ctx
                    .met
                    .get_data("alt", p.t, p.lon, p.lat, p.z, windtraj::DataFlags::NONE)
                    .unwrap();
                alts.push(alt);
            }
            ctx.met.signal_done().unwrap();
            alts
        }));
    }

    let mut total = 0;
    for h in handles {
        for alt in h.join().unwrap() {
            assert_eq!(alt, 16.0);
            total += 1;
        }
    }
    assert_eq!(total, 4);
}

#[test]
fn collective_set_and_get_cross_rank_boundaries() {
    // 3 ranks, ratio 2: rank 2 owns the upper half of the parcels
    let fabric = ThreadFabric::new(3);
    let seed = Parcel::new(0.0, 0.0, 16.0);

    let mut handles = Vec::new();
    for r in 0..3 {
        let group = fabric.rank(r).unwrap();
        handles.push(thread::spawn(move || {
            let mut ctx = rank_ctx();
            let mut flock = Flock::new(&seed, Box::new(group), 4, 2, &mut ctx).unwrap();

            // the root's value must land on the owning rank
            let marked = Parcel::new(77.0, -12.0, 9.0);
            flock.set(3, &marked, Authority::Root).unwrap();

            // and travel back to every tracing rank on a collective read
            let got = flock.parcel(3, Authority::Root).unwrap();
            (flock.is_met_rank(), got)
        }));
    }

    for h in handles {
        let (is_met, got) = h.join().unwrap();
        if is_met {
            assert!(got.is_none());
        } else {
            let p = got.expect("tracer ranks see the broadcast value");
            assert_eq!(p.lon, 77.0);
            assert_eq!(p.lat, -12.0);
            assert_eq!(p.z, 9.0);
        }
    }
}

#[test]
fn owner_mode_reads_stay_local() {
    let fabric = ThreadFabric::new(2);
    let seed = Parcel::new(5.0, 5.0, 16.0);

    let mut handles = Vec::new();
    for r in 0..2 {
        let group = fabric.rank(r).unwrap();
        handles.push(thread::spawn(move || {
            let mut ctx = rank_ctx();
            // no met reservation: both ranks trace two parcels each
            let flock = Flock::new(&seed, Box::new(group), 4, 0, &mut ctx).unwrap();
            let mine = flock.parcel(2, Authority::Owner).unwrap();
            (flock.partition().owner_of(2).unwrap(), group_rank(&flock), mine)
        }));
    }

    for h in handles {
        let (owner, rank, mine) = h.join().unwrap();
        if rank == owner {
            assert!(mine.is_some());
        } else {
            assert!(mine.is_none());
        }
    }
}

fn group_rank(flock: &Flock) -> usize {
    // the owner of the first local index is this rank
    flock
        .iter_local()
        .next()
        .map(|(i, _)| flock.partition().owner_of(i).unwrap())
        .unwrap_or(usize::MAX)
}
