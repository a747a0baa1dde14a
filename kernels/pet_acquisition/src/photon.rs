// Photon state for annihilation-pair transport
//
// A positron annihilates with an electron and the pair's rest mass comes out
// as two 511 keV photons flying in opposite directions. Each photon is then
// tracked independently through the phantom until it is absorbed or leaves
// the volume. This file holds the per-photon state; the stepping itself
// lives in transport.rs.

use std::f64::consts::{PI, TAU};

use rand::Rng;

use crate::vec3::{wrap_tau, Vec3};
use crate::REST_ENERGY_KEV;

// ============================================================================
// PHOTON STATUS
// ============================================================================

// Where a photon is in its life cycle
//
// Free and Scattered are in-flight states; the distinction matters because a
// scattered photon picks a fresh direction (and loses energy) at the top of
// its next transport step. Absorbed and Finished are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotonStatus {
    // In flight, direction unchanged since emission or last redirect
    Free,

    // Compton-scattered; needs a redirect and energy update next step
    Scattered,

    // Deposited its energy in the phantom; never reaches a detector
    Absorbed,

    // Left the phantom volume; candidate for detection
    Finished,
}

impl PhotonStatus {
    // Terminal states end the transport loop
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhotonStatus::Absorbed | PhotonStatus::Finished)
    }
}

// ============================================================================
// PHOTON STATE
// ============================================================================

// A single annihilation photon
//
// Direction is stored as polar angles in scanner coordinates:
// direction = (sin θ cos φ, sin θ sin φ, cos θ), with θ measured from the
// bore axis. θ = π/2 is a transaxial flight, θ = 0 or π runs along the bore.
#[derive(Debug, Clone, Copy)]
pub struct Photon {
    // Current position in mm
    pub position: Vec3,

    // Azimuthal angle φ ∈ [0, 2π)
    pub phi: f64,

    // Polar angle θ ∈ [0, π], measured from the scanner axis
    pub theta: f64,

    // Current energy in keV; only ever decreases after emission
    pub energy_kev: f64,

    // Life-cycle state, see PhotonStatus
    pub status: PhotonStatus,

    // Total path length travelled in mm
    pub path_mm: f64,

    // Number of Compton scatters so far
    pub scatter_count: u32,

    // Sticky flag: true once the photon has scattered at least once
    pub was_scattered: bool,
}

impl Photon {
    // Create a free photon at a position with a given flight direction
    pub fn new(position: Vec3, phi: f64, theta: f64, energy_kev: f64) -> Self {
        assert!(energy_kev > 0.0, "Photon energy must be positive");
        assert!((0.0..=PI).contains(&theta), "Theta must be in [0, π]");
        Self {
            position,
            phi: wrap_tau(phi),
            theta,
            energy_kev,
            status: PhotonStatus::Free,
            path_mm: 0.0,
            scatter_count: 0,
            was_scattered: false,
        }
    }

    // Emit a back-to-back annihilation pair at a decay position
    //
    // The first photon gets an isotropic direction: φ uniform on [0, 2π),
    // cos θ uniform on [-1, 1]. The second flies exactly opposite, which in
    // polar angles is (φ + π mod 2π, π - θ). Both start at 511 keV.
    pub fn annihilation_pair<R: Rng>(position: Vec3, rng: &mut R) -> (Photon, Photon) {
        let phi = TAU * rng.gen::<f64>();
        let theta = (2.0 * rng.gen::<f64>() - 1.0).acos();
        let forward = Photon::new(position, phi, theta, REST_ENERGY_KEV);
        let backward = Photon::new(position, wrap_tau(phi + PI), PI - theta, REST_ENERGY_KEV);
        (forward, backward)
    }

    // Unit direction vector for the current (φ, θ)
    #[inline]
    pub fn direction(&self) -> Vec3 {
        let st = self.theta.sin();
        Vec3::new(st * self.phi.cos(), st * self.phi.sin(), self.theta.cos())
    }

    // Store a new flight direction, converting unit cosines back to (φ, θ)
    pub fn set_direction(&mut self, dir: Vec3) {
        self.theta = dir.z.clamp(-1.0, 1.0).acos();
        self.phi = wrap_tau(dir.y.atan2(dir.x));
    }

    // Only photons that left the phantom can be detected
    #[inline]
    pub fn is_detectable(&self) -> bool {
        self.status == PhotonStatus::Finished
    }
}
