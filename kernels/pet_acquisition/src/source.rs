// Positron sources and decay scheduling
//
// Physics: a radioactive source with activity A emits A decays per second
// on average, but the actual counts in a time slice follow a Poisson
// distribution. Each decay annihilates into a back-to-back photon pair at
// a position drawn from the phantom shape, and between processing
// intervals the activity itself falls off with the isotope half-life.

use std::f64::consts::TAU;

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use crate::photon::Photon;
use crate::types::Phantom;
use crate::vec3::Vec3;

// ============================================================================
// DECAY SOURCE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DecaySource {
    phantom: Phantom,
    activity_bq: f64,
    half_life_s: f64,
}

impl DecaySource {
    pub fn new(phantom: Phantom, activity_bq: f64, half_life_s: f64) -> Self {
        assert!(
            activity_bq.is_finite() && activity_bq >= 0.0,
            "Activity must be finite and non-negative"
        );
        assert!(half_life_s > 0.0, "Half-life must be positive");
        Self {
            phantom,
            activity_bq,
            half_life_s,
        }
    }

    #[inline]
    pub fn activity_bq(&self) -> f64 {
        self.activity_bq
    }

    #[inline]
    pub fn phantom(&self) -> Phantom {
        self.phantom
    }

    // Number of decays in one interval: Poisson with mean activity * dt
    pub fn counts<R: Rng>(&self, interval_s: f64, rng: &mut R) -> u64 {
        let mean = self.activity_bq * interval_s;
        if !(mean > 0.0) {
            return 0;
        }
        let poisson = Poisson::new(mean).expect("mean is positive and finite");
        poisson.sample(rng) as u64
    }

    // Draw a decay position inside the phantom
    pub fn decay_position<R: Rng>(&self, rng: &mut R) -> Vec3 {
        match self.phantom {
            Phantom::Cylinder { radius_mm, length_mm } => {
                // Folding the sum of two uniforms gives the triangular radial
                // density (pdf proportional to r), i.e. uniform over the disc
                let phi = TAU * rng.gen::<f64>();
                let u = rng.gen::<f64>() + rng.gen::<f64>();
                let r = if u > 1.0 { (2.0 - u) * radius_mm } else { u * radius_mm };
                let z = (rng.gen::<f64>() - 0.5) * length_mm;
                Vec3::new(r * phi.cos(), r * phi.sin(), z)
            }
            Phantom::Line { radius_mm, length_mm } => {
                let z = (rng.gen::<f64>() - 0.5) * length_mm;
                Vec3::new(radius_mm, 0.0, z)
            }
        }
    }

    // One decay: the annihilation pair plus its absolute timestamp in ns
    pub fn decay<R: Rng>(
        &self,
        interval_index: u32,
        interval_s: f64,
        time_in_interval_s: f64,
        rng: &mut R,
    ) -> (Photon, Photon, u32) {
        let position = self.decay_position(rng);
        let (first, second) = Photon::annihilation_pair(position, rng);
        let absolute_s = interval_index as f64 * interval_s + time_in_interval_s;
        let timestamp_ns = (absolute_s * 1e9) as u32;
        (first, second, timestamp_ns)
    }

    // End-of-interval bookkeeping: exponential decay of the activity
    pub fn elapse(&mut self, interval_s: f64) {
        self.activity_bq *= (-interval_s / self.half_life_s).exp2();
    }
}

// Event times inside one interval, uniform in [0, dt) and sorted ascending
pub fn event_times<R: Rng>(count: u64, interval_s: f64, rng: &mut R) -> Vec<f64> {
    let mut times: Vec<f64> = (0..count).map(|_| rng.gen::<f64>() * interval_s).collect();
    times.sort_unstable_by(f64::total_cmp);
    times
}
