// Type definitions for the PET acquisition chain
//
// A scanner is a cylinder of detector blocks around the bore. Decays happen
// inside a phantom volume, the annihilation photons random-walk through the
// phantom material, and the ones that leave the volume are intersected with
// the detector ring. Everything downstream (digitization, coincidences,
// sinograms) is driven by the numbers defined here.

use serde::Serialize;
use std::f64::consts::TAU;

use crate::error::{Error, Result};
use crate::REST_ENERGY_KEV;

// ============================================================================
// SCANNER GEOMETRY
// ============================================================================

// Detector ring geometry
//
// The ring is built from identical blocks: `blocks` of them side by side
// around the circumference, stacked `block_rings` deep along the bore. Each
// block is a 15x15 crystal matrix in the default configuration, so crystal
// coordinates are (transaxial column I, axial row J) within a block.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScannerGeometry {
    // Number of detector blocks around the ring
    pub blocks: u32,

    // Crystal columns per block transaxially, and crystal rows per block
    // axially (blocks are square matrices)
    pub crystals_per_block: u32,

    // Number of block rings along the bore
    pub block_rings: u32,

    // Ring radius in mm, measured to the crystal face
    pub radius_mm: f64,

    // Axial extent of one block in mm
    pub block_size_mm: f64,

    // Energy resolution width in keV (reserved for the digitizer model)
    pub energy_resolution_kev: f64,
}

impl ScannerGeometry {
    // Create a geometry, checking the counts and lengths are usable
    pub fn new(
        blocks: u32,
        crystals_per_block: u32,
        block_rings: u32,
        radius_mm: f64,
        block_size_mm: f64,
        energy_resolution_kev: f64,
    ) -> Self {
        assert!(blocks > 0, "Block count must be positive");
        assert!(crystals_per_block > 0, "Crystals per block must be positive");
        assert!(block_rings > 0, "Block ring count must be positive");
        assert!(radius_mm > 0.0, "Ring radius must be positive");
        assert!(block_size_mm > 0.0, "Block size must be positive");
        assert!(energy_resolution_kev >= 0.0, "Energy resolution must be non-negative");
        Self {
            blocks,
            crystals_per_block,
            block_rings,
            radius_mm,
            block_size_mm,
            energy_resolution_kev,
        }
    }

    // Total crystal rings along the bore (block rings x rows per block)
    #[inline]
    pub fn crystal_rings(&self) -> u32 {
        self.block_rings * self.crystals_per_block
    }

    // Total crystal columns around the ring
    #[inline]
    pub fn transaxial_crystals(&self) -> u32 {
        self.blocks * self.crystals_per_block
    }

    // Number of michelogram slices: one per ring sum, 2R-1 of them
    #[inline]
    pub fn michelogram_slices(&self) -> u32 {
        2 * self.crystal_rings() - 1
    }

    // Azimuthal arc covered by one block, in radians
    #[inline]
    pub fn block_arc(&self) -> f64 {
        TAU / self.blocks as f64
    }

    // Azimuthal arc covered by one crystal column, in radians
    #[inline]
    pub fn crystal_arc(&self) -> f64 {
        TAU / (self.blocks * self.crystals_per_block) as f64
    }

    // Axial extent of the whole scanner in mm
    #[inline]
    pub fn axial_extent_mm(&self) -> f64 {
        self.block_rings as f64 * self.block_size_mm
    }
}

impl Default for ScannerGeometry {
    // Base configuration: 48 blocks of 15x15 crystals, 4 block rings,
    // 410 mm radius, 49.9 mm blocks
    fn default() -> Self {
        Self::new(48, 15, 4, 410.0, 49.9, 3.0)
    }
}

// ============================================================================
// MATERIAL AND TRANSPORT
// ============================================================================

// Homogeneous phantom material, described by its interaction coefficients
//
// Physics: a 511 keV photon travelling through matter either Compton-scatters
// (mu_scatter) or is photoelectrically absorbed (mu_absorb). The sum sets the
// mean free path, the ratio decides the outcome of each interaction.
// Units are 1/mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Material {
    // Scattering coefficient in 1/mm
    pub mu_scatter: f64,

    // Absorption coefficient in 1/mm
    pub mu_absorb: f64,
}

impl Material {
    pub fn new(mu_scatter: f64, mu_absorb: f64) -> Self {
        assert!(mu_scatter >= 0.0, "Scattering coefficient must be non-negative");
        assert!(mu_absorb >= 0.0, "Absorption coefficient must be non-negative");
        Self { mu_scatter, mu_absorb }
    }

    // No interactions at all; photons fly straight out of the phantom
    pub fn vacuum() -> Self {
        Self::new(0.0, 0.0)
    }

    // Water at 511 keV, Compton dominated
    pub fn water() -> Self {
        Self::new(0.0095, 0.0001)
    }

    #[inline]
    pub fn mu_total(&self) -> f64 {
        self.mu_scatter + self.mu_absorb
    }

    #[inline]
    pub fn is_vacuum(&self) -> bool {
        self.mu_total() == 0.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::vacuum()
    }
}

// Monte-Carlo transport variant
//
// Exactly one mode is active per acquisition. Analog transport kills photons
// at interactions with the physical absorption probability. Roulette
// transport deposits energy continuously (implicit capture) and only kills
// low-energy photons by a survival lottery, boosting the survivors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TransportMode {
    // One interaction per free path: absorb or scatter
    Analog,

    // Implicit capture with Russian roulette below the energy cutoff
    Roulette {
        // Survival probability of the roulette, in (0, 1]
        survival: f64,
    },
}

impl TransportMode {
    pub fn analog() -> Self {
        Self::Analog
    }

    pub fn roulette(survival: f64) -> Self {
        assert!(
            survival > 0.0 && survival <= 1.0,
            "Roulette survival probability must be in (0, 1]"
        );
        Self::Roulette { survival }
    }

    // Get a human-readable name for this mode
    pub fn name(&self) -> &'static str {
        match self {
            Self::Analog => "Analog",
            Self::Roulette { .. } => "Roulette",
        }
    }
}

impl Default for TransportMode {
    fn default() -> Self {
        Self::Analog
    }
}

// ============================================================================
// PHANTOM SOURCES
// ============================================================================

// Activity distribution inside the bore
//
// Cylinder: decays uniform over a solid cylinder volume centred on the axis.
// Line: decays on a thin circular line at fixed radius, uniform axially
// (a rod source offset from the axis, the classic calibration phantom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Phantom {
    Cylinder {
        // Cylinder radius in mm
        radius_mm: f64,
        // Cylinder length in mm, centred axially
        length_mm: f64,
    },
    Line {
        // Radial offset of the rod from the axis in mm
        radius_mm: f64,
        // Rod length in mm, centred axially
        length_mm: f64,
    },
}

impl Phantom {
    pub fn cylinder(radius_mm: f64, length_mm: f64) -> Self {
        assert!(radius_mm > 0.0, "Phantom radius must be positive");
        assert!(length_mm > 0.0, "Phantom length must be positive");
        Self::Cylinder { radius_mm, length_mm }
    }

    pub fn line(radius_mm: f64, length_mm: f64) -> Self {
        assert!(radius_mm >= 0.0, "Rod offset must be non-negative");
        assert!(length_mm > 0.0, "Rod length must be positive");
        Self::Line { radius_mm, length_mm }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cylinder { .. } => "Cylinder",
            Self::Line { .. } => "Line",
        }
    }

    // Transport boundary: photons are tracked while inside this cylinder.
    // For the line phantom the boundary is the cylinder swept by the rod.
    #[inline]
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Cylinder { radius_mm, length_mm } => (radius_mm, length_mm),
            Self::Line { radius_mm, length_mm } => (radius_mm.max(1.0), length_mm),
        }
    }
}

impl Default for Phantom {
    fn default() -> Self {
        Self::cylinder(100.0, 300.0)
    }
}

// ============================================================================
// ACQUISITION CONFIGURATION
// ============================================================================

// Everything one acquisition run needs
//
// Defaults reproduce the reference run: 0.5 s of a 100 MBq cylinder source
// in vacuum, processed in 50 ms intervals with a 10 ns coincidence window.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionConfig {
    pub geometry: ScannerGeometry,
    pub phantom: Phantom,
    pub material: Material,
    pub mode: TransportMode,

    // Transport cutoff as a fraction of 511 keV; photons below it are
    // absorbed (analog) or sent to the roulette
    pub cutoff_fraction: f64,

    // Total acquisition time in seconds
    pub total_time_s: f64,

    // Length of one processing interval in seconds
    pub interval_s: f64,

    // Source activity at the start of the run, in becquerel
    pub activity_bq: f64,

    // Isotope half-life in seconds (activity decays between intervals)
    pub half_life_s: f64,

    // Coincidence window in nanoseconds
    pub coincidence_window_ns: u32,

    // Transaxial mashing factor for sinogram binning
    pub det_mash: u32,

    // Axial mashing factor for sinogram binning
    pub ring_mash: u32,

    // Master seed; None draws one from the OS
    pub seed: Option<u64>,

    // Worker thread cap; None lets the pool size itself
    pub threads: Option<usize>,
}

impl AcquisitionConfig {
    // Number of processing intervals in the run
    #[inline]
    pub fn intervals(&self) -> u32 {
        (self.total_time_s / self.interval_s).round() as u32
    }

    // Transport cutoff in keV
    #[inline]
    pub fn cutoff_kev(&self) -> f64 {
        self.cutoff_fraction * REST_ENERGY_KEV
    }

    // Reject configurations the chain cannot run. Geometry and mode carry
    // their own constructor checks; this covers the driver-level numbers.
    pub fn validate(&self) -> Result<()> {
        if !(self.interval_s > 0.0) {
            return Err(Error::Config("interval must be positive".into()));
        }
        if self.total_time_s < self.interval_s {
            return Err(Error::Config(
                "total time must cover at least one interval".into(),
            ));
        }
        // Event timestamps are 32-bit nanosecond counters
        if !(self.total_time_s * 1e9 <= u32::MAX as f64) {
            return Err(Error::Config(
                "total time must fit the 32-bit nanosecond clock (under 4.29 s)".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.cutoff_fraction) {
            return Err(Error::Config("cutoff fraction must be in [0, 1)".into()));
        }
        if !(self.activity_bq >= 0.0) {
            return Err(Error::Config("activity must be non-negative".into()));
        }
        if !(self.half_life_s > 0.0) {
            return Err(Error::Config("half-life must be positive".into()));
        }
        if self.det_mash == 0 || self.ring_mash == 0 {
            return Err(Error::Config("mashing factors must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            geometry: ScannerGeometry::default(),
            phantom: Phantom::default(),
            material: Material::default(),
            mode: TransportMode::default(),
            cutoff_fraction: 0.5,
            total_time_s: 0.5,
            interval_s: 0.05,
            activity_bq: 100.0e6,
            half_life_s: 6400.0,
            coincidence_window_ns: 10,
            det_mash: 2,
            ring_mash: 1,
            seed: None,
            threads: None,
        }
    }
}
