// Detector ring intersection and event formation
//
// Photons that left the phantom fly on a straight line, so the crossing
// with the detector cylinder has a closed form and needs no stepping. The
// transaxial part is a law-of-sines solve in the ring plane; the axial part
// follows from the chord length and the polar angle. A hit is reduced to
// (block, block ring, crystal column I, crystal row J) and written out as
// a SingleEvent with Anger channels.
//
// Geometry discards are Option::None. All range and finiteness checks run
// on f64 before anything is cast, because float-to-int casts in Rust
// saturate instead of propagating NaN; a corrupted position must fall out
// here, not turn into a fake crystal 0 hit.

use std::f64::consts::TAU;

use crate::digitize::EventConverter;
use crate::events::{DetectorPosition, SingleEvent};
use crate::photon::Photon;
use crate::types::ScannerGeometry;
use crate::vec3::wrap_tau;

// ============================================================================
// DETECTOR RING
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct DetectorRing {
    geometry: ScannerGeometry,
}

impl DetectorRing {
    pub fn new(geometry: ScannerGeometry) -> Self {
        Self { geometry }
    }

    #[inline]
    pub fn geometry(&self) -> &ScannerGeometry {
        &self.geometry
    }

    // Intersect a finished photon with the ring
    //
    // The converter's block size must match the geometry's crystals per
    // block; acquisition builds both from the same ScannerGeometry.
    //
    // Returns None for photons still in flight or absorbed, for flights
    // that never cross the ring (axial flights, no forward solution), and
    // for crossings outside the axial extent of the scanner.
    pub fn detect(
        &self,
        photon: &Photon,
        timestamp_ns: u32,
        converter: &EventConverter,
    ) -> Option<SingleEvent> {
        if !photon.is_detectable() {
            return None;
        }

        let g = &self.geometry;
        let pos = photon.position;

        // Law of sines in the ring plane: the crossing azimuth ψ satisfies
        // sin(ψ - φ) = rc/R · sin(α - φ), with α the azimuth of the photon
        // position and rc its transaxial radius. No solution means the
        // flight never meets the ring. The negated test also rejects NaN.
        let azimuth = wrap_tau(pos.y.atan2(pos.x));
        let rc = pos.radial();
        let arg = rc / g.radius_mm * (azimuth - photon.phi).sin();
        if !(arg.abs() <= 1.0) {
            return None;
        }
        let psi = wrap_tau(arg.asin() + photon.phi);

        // Chord from the photon position to the crossing point
        let r1 = (g.radius_mm * g.radius_mm + rc * rc
            - 2.0 * g.radius_mm * rc * (azimuth - psi).cos())
        .sqrt();

        // Axial coordinate at the crossing, in block units, shifted so the
        // first block ring starts at zero. An axial flight makes tan θ
        // vanish and the coordinate infinite, which fails the range test.
        let axial = pos.z / g.block_size_mm
            + r1 / photon.theta.tan() / g.block_size_mm
            + g.block_rings as f64 / 2.0;
        let block_ring = axial.floor();
        if !(block_ring >= 0.0 && block_ring < g.block_rings as f64) {
            return None;
        }

        // Global crystal column, then block and in-block column. The modulo
        // folds the ψ ≈ 2π float edge back onto crystal 0.
        let total = g.transaxial_crystals();
        let global = ((psi / TAU * total as f64) as u32) % total;
        let block = (global / g.crystals_per_block) as u16;
        let i = (global % g.crystals_per_block) as u16;

        // In-block crystal row from the fractional block-ring coordinate
        let cpb = g.crystals_per_block;
        let j = (((axial - block_ring) * cpb as f64) as u32 % cpb) as u16;

        Some(SingleEvent {
            timestamp_ns,
            position: DetectorPosition::new(block, block_ring as u16),
            channels: converter.channels(i, j, photon.energy_kev),
            flags: 0,
        })
    }
}
