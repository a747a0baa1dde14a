// Monte-Carlo photon transport through the phantom
//
// Two variants of the same random walk:
// - analog transport: every interaction is played out with its physical
//   probability, photons die at photoelectric absorptions
// - roulette transport: absorption is folded into a continuous energy loss
//   (implicit capture) and only the Russian roulette below the energy
//   cutoff actually kills photons, boosting the survivors' energy
// Exactly one variant is active per acquisition run.

use std::f64::consts::TAU;

use rand::Rng;

use crate::photon::{Photon, PhotonStatus};
use crate::types::{Material, Phantom};
use crate::vec3::Vec3;

// Step cap for one photon. Physically the walk terminates almost surely
// (absorption or boundary exit); the cap only catches degenerate
// configurations such as a pure scatterer with a zero cutoff.
const MAX_STEPS: usize = 100_000;

// ============================================================================
// TRANSPORT BOUNDARY
// ============================================================================

// Cylinder the photons are tracked inside, centred on the scanner axis
//
// A photon is outside once its transaxial radius reaches the cylinder
// radius or its axial coordinate reaches an end cap. Either exit ends
// the walk with status Finished.
#[derive(Debug, Clone, Copy)]
pub struct Boundary {
    // Cylinder radius in mm
    pub radius_mm: f64,

    // Full cylinder length in mm, centred at z = 0
    pub length_mm: f64,
}

impl Boundary {
    pub fn new(radius_mm: f64, length_mm: f64) -> Self {
        assert!(radius_mm > 0.0, "Boundary radius must be positive");
        assert!(length_mm > 0.0, "Boundary length must be positive");
        Self { radius_mm, length_mm }
    }

    // The transport boundary of a phantom is the cylinder enclosing it
    pub fn from_phantom(phantom: &Phantom) -> Self {
        let (radius_mm, length_mm) = phantom.bounds();
        Self::new(radius_mm, length_mm)
    }

    // Radial or axial exit. NaN coordinates compare false on the inside
    // tests, so a corrupted position also counts as outside.
    #[inline]
    pub fn is_outside(&self, p: &Vec3) -> bool {
        !(p.x * p.x + p.y * p.y < self.radius_mm * self.radius_mm
            && p.z.abs() < self.length_mm / 2.0)
    }
}

// ============================================================================
// ANALOG TRANSPORT
// ============================================================================

// Walk one photon until it is absorbed or leaves the boundary
//
// Each loop iteration is one flight segment. The order of checks matters:
// a photon that scattered last segment is redirected (and loses energy)
// before anything else, and the energy cutoff applies before the vacuum
// shortcut so that an under-cutoff photon dies even in empty space.
pub fn trace<R: Rng>(
    photon: &mut Photon,
    material: &Material,
    boundary: &Boundary,
    cutoff_kev: f64,
    rng: &mut R,
) {
    let mu_s = material.mu_scatter;
    let mu_e = material.mu_absorb;
    let mu_t = mu_s + mu_e;

    for _ in 0..MAX_STEPS {
        if photon.status.is_terminal() {
            return;
        }

        // Redirect after a Compton scatter. The new direction is sampled
        // isotropically; the energy loss follows from the angle χ between
        // the old and new flight via E' = E / (2 - cos χ), the Compton
        // formula evaluated at the electron rest energy.
        if photon.status == PhotonStatus::Scattered {
            let old_dir = photon.direction();
            photon.phi = TAU * rng.gen::<f64>();
            photon.theta = (2.0 * rng.gen::<f64>() - 1.0).acos();
            let cos_chi = old_dir.dot(&photon.direction()).clamp(-1.0, 1.0);
            photon.energy_kev /= 2.0 - cos_chi;
            photon.scatter_count += 1;
            photon.was_scattered = true;
        }

        // Below the cutoff the photon is treated as locally absorbed
        if photon.energy_kev < cutoff_kev {
            photon.status = PhotonStatus::Absorbed;
            return;
        }

        // Vacuum: nothing to interact with, the photon leaves the volume
        if mu_t == 0.0 {
            photon.status = PhotonStatus::Finished;
            return;
        }

        // Free path from the exponential attenuation law
        let ksi = -rng.gen::<f64>().ln() / mu_t;
        photon.position = photon.position + photon.direction() * ksi;
        photon.path_mm += ksi;

        if boundary.is_outside(&photon.position) {
            photon.status = PhotonStatus::Finished;
            return;
        }

        // Interaction: photoelectric absorption or Compton scatter
        if rng.gen::<f64>() < mu_e / mu_t {
            photon.status = PhotonStatus::Absorbed;
            return;
        }
        photon.status = PhotonStatus::Scattered;
    }

    // Step cap reached: the photon has thermalized for our purposes
    photon.status = PhotonStatus::Absorbed;
}

// ============================================================================
// ROULETTE TRANSPORT
// ============================================================================

// Implicit-capture walk with Russian roulette below the cutoff
//
// Every interaction scatters; the absorbed fraction mu_e / (mu_s + mu_e)
// comes off the energy continuously instead. Once the energy falls under
// the cutoff the roulette decides: survive with probability `survival`
// (energy boosted by 1/survival to keep the estimate unbiased) or die.
pub fn trace_with_roulette<R: Rng>(
    photon: &mut Photon,
    material: &Material,
    boundary: &Boundary,
    cutoff_kev: f64,
    survival: f64,
    rng: &mut R,
) {
    assert!(
        survival > 0.0 && survival <= 1.0,
        "Roulette survival probability must be in (0, 1]"
    );

    let mu_s = material.mu_scatter;
    let mu_e = material.mu_absorb;
    let mu_t = mu_s + mu_e;

    for _ in 0..MAX_STEPS {
        if photon.status.is_terminal() {
            return;
        }

        // Vacuum: no interactions, the photon flies straight out
        if mu_t == 0.0 {
            photon.status = PhotonStatus::Finished;
            return;
        }

        // Advance by one sampled free path
        let ksi = -rng.gen::<f64>().ln() / mu_t;
        photon.position = photon.position + photon.direction() * ksi;
        photon.path_mm += ksi;

        if boundary.is_outside(&photon.position) {
            photon.status = PhotonStatus::Finished;
            return;
        }

        // Implicit capture: the absorption probability becomes a weight loss
        photon.energy_kev *= 1.0 - mu_e / mu_t;

        // Scatter into a new direction relative to the current flight
        let new_dir = scatter_direction(photon.direction(), rng);
        photon.set_direction(new_dir);
        photon.status = PhotonStatus::Scattered;
        photon.scatter_count += 1;
        photon.was_scattered = true;

        // Russian roulette once the energy is under the cutoff
        if photon.energy_kev < cutoff_kev {
            if rng.gen::<f64>() < survival {
                photon.energy_kev /= survival;
            } else {
                photon.energy_kev = 0.0;
                photon.status = PhotonStatus::Absorbed;
                return;
            }
        }
    }

    photon.status = PhotonStatus::Absorbed;
}

// Rotate the flight direction by a sampled scattering angle
//
// Standard direction-cosine recomposition: the scattering polar angle θs is
// measured from the incoming flight, the azimuth ψ is uniform around it.
// The general formula divides by sqrt(1 - uz²), so a flight (anti)parallel
// to the scanner axis takes the degenerate branch.
fn scatter_direction<R: Rng>(dir: Vec3, rng: &mut R) -> Vec3 {
    let cos_ts = 2.0 * rng.gen::<f64>() - 1.0;
    let sin_ts = (1.0 - cos_ts * cos_ts).sqrt();
    let psi = TAU * rng.gen::<f64>();
    let (sin_ps, cos_ps) = psi.sin_cos();

    let (ux, uy, uz) = (dir.x, dir.y, dir.z);
    if uz.abs() > 1.0 - 1e-12 {
        return Vec3::new(sin_ts * cos_ps, sin_ts * sin_ps, cos_ts * uz.signum());
    }

    let denom = (1.0 - uz * uz).sqrt();
    Vec3::new(
        sin_ts * (ux * uz * cos_ps - uy * sin_ps) / denom + ux * cos_ts,
        sin_ts * (uy * uz * cos_ps + ux * sin_ps) / denom + uy * cos_ts,
        -sin_ts * cos_ps * denom + uz * cos_ts,
    )
}
