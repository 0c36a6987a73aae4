//! End-to-end trajectory scenarios in the solid-body-rotation field.

use windtraj::met::{SolidBodyRotation, TracingContext};
use windtraj::nav::SphereNav;
use windtraj::swarm::trace;
use windtraj::types::Parcel;

const RCONV: f64 = std::f64::consts::PI / 180.0;

fn ctx_with(met: SolidBodyRotation) -> TracingContext {
    TracingContext::new(SphereNav::earth(), Box::new(met))
}

/// Degrees of longitude an untilted equatorial parcel covers per step.
fn zonal_step_deg(ws: f64, dt: f64) -> f64 {
    ws / 1000.0 * dt * 86400.0 / 6371.0 / RCONV
}

#[test]
fn untilted_equatorial_advance_matches_the_analytic_rate() {
    let ctx = ctx_with(SolidBodyRotation::new());
    let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];

    let dt = 0.01;
    let steps = 100;
    trace(&mut parcels, &ctx, dt, steps).unwrap();

    let expected = steps as f64 * zonal_step_deg(40.0, dt);
    assert!(
        (parcels[0].lon - expected).abs() < 1e-6,
        "lon {} vs {}",
        parcels[0].lon,
        expected
    );
    assert!(parcels[0].lat.abs() < 1e-9);
    assert!((parcels[0].t - 1.0).abs() < 1e-12);
}

#[test]
fn twelve_day_tilted_trace_hits_the_known_endpoint() {
    let ctx = ctx_with(SolidBodyRotation::with_tilt(40.0, 30.0));
    let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];

    trace(&mut parcels, &ctx, 0.01, 1200).unwrap();

    assert!(
        (parcels[0].lon - 11.5486).abs() < 0.01,
        "lon {}",
        parcels[0].lon
    );
    assert!(
        (parcels[0].lat - (-6.59377)).abs() < 0.01,
        "lat {}",
        parcels[0].lat
    );
}

#[test]
fn backward_trace_returns_to_the_start() {
    let ctx = ctx_with(SolidBodyRotation::with_tilt(40.0, 30.0));
    let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];

    trace(&mut parcels, &ctx, 0.01, 1200).unwrap();
    trace(&mut parcels, &ctx, -0.01, 1200).unwrap();

    assert!(parcels[0].lon.abs() < 0.01, "lon {}", parcels[0].lon);
    assert!(parcels[0].lat.abs() < 0.01, "lat {}", parcels[0].lat);
    assert!(parcels[0].t.abs() < 1e-9);
}

#[test]
fn crossing_the_dateline_wraps_into_canonical_range() {
    let ctx = ctx_with(SolidBodyRotation::new());
    let start = 170.0;
    let mut parcels = vec![Parcel::new(start, 0.0, 16.0)];

    let dt = 0.01;
    let steps = 100;
    trace(&mut parcels, &ctx, dt, steps).unwrap();

    let unwrapped = start + steps as f64 * zonal_step_deg(40.0, dt);
    assert!(unwrapped > 180.0, "scenario must actually cross");
    let expected = unwrapped - 360.0;
    assert!((-180.0..180.0).contains(&parcels[0].lon));
    assert!(
        (parcels[0].lon - expected).abs() < 1e-6,
        "lon {} vs {}",
        parcels[0].lon,
        expected
    );
}

#[test]
fn polar_orbits_stay_finite_and_bounded() {
    // a 90-degree tilt sends equatorial parcels over the poles
    let ctx = ctx_with(SolidBodyRotation::with_tilt(40.0, 90.0));
    let mut parcels = vec![Parcel::new(90.0, 0.0, 16.0)];

    trace(&mut parcels, &ctx, 0.01, 2400).unwrap();

    let p = &parcels[0];
    assert!(p.lon.is_finite() && p.lat.is_finite());
    assert!(p.lat.abs() <= 90.0);
    assert!((-180.0..180.0).contains(&p.lon));
    assert!(p.is_traceable(), "parcel was retired: {:?}", p.status);
}

#[test]
fn vertical_oscillation_integrates_in_altitude() {
    let mut met = SolidBodyRotation::new();
    // one full period per day, 1 m/s amplitude
    met.set_vertical(1.0, 2.0 * std::f64::consts::PI / 86400.0);
    let ctx = ctx_with(met);
    let mut parcels = vec![Parcel::new(0.0, 0.0, 16.0)];

    // half a period up, half back down
    trace(&mut parcels, &ctx, 0.01, 100).unwrap();
    let drift = (parcels[0].z - 16.0).abs();
    assert!(drift < 0.5, "z drifted by {}", drift);
}
