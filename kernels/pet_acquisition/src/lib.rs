// kernels/pet_acquisition/src/lib.rs

// PET Acquisition Chain Simulator
//
// This library implements the forward simulation of a cylindrical PET
// scanner: positron decays in a phantom volume, Monte Carlo transport of
// the annihilation photons, detector-ring intersection, digitization into
// front-end channel values, coincidence sorting, and michelogram sinogram
// binning. Geometry and transport run in f64; event records are the
// packed little-endian formats of the front-end electronics.

pub mod acquisition;
pub mod coincidence;
pub mod detector;
pub mod digitize;
pub mod error;
pub mod events;
pub mod indexer;
pub mod listmode;
pub mod packets;
pub mod photon;
pub mod sinogram;
pub mod source;
pub mod transport;
pub mod types;
pub mod vec3;

// Electron rest energy in keV. Both annihilation photons start here.
pub const REST_ENERGY_KEV: f64 = 511.0;

pub use acquisition::{run_acquisition, AcquisitionReport, AcquisitionStats, IntervalSummary, Manifest};
pub use coincidence::find_coincidences;
pub use detector::DetectorRing;
pub use digitize::EventConverter;
pub use error::Error;
pub use events::{
    Channels, Coincidence, CoincidenceTof, DetectorPosition, DigitalCoincidence,
    DigitalSingleEvent, Record, SingleEvent,
};
pub use indexer::Indexer;
pub use packets::Packet;
pub use photon::{Photon, PhotonStatus};
pub use sinogram::{AngleDistribution, Sinogram, SinogramBuilder};
pub use source::DecaySource;
pub use transport::{trace, trace_with_roulette, Boundary};
pub use types::{AcquisitionConfig, Material, Phantom, ScannerGeometry, TransportMode};
pub use vec3::Vec3;
