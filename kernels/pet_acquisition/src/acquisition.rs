// Acquisition driver
//
// Runs the whole chain interval by interval: schedule decays, transport
// both annihilation photons, intersect them with the detector ring, pair
// the time-sorted singles into coincidences, and finally bin everything
// into michelogram sinograms. Each interval's singles and coincidences are
// dumped to per-interval list-mode files as they are produced.
//
// Decays are independent, so each one gets its own seeded RNG stream and
// the intervals fan out over rayon. The stream seed is derived from the
// master seed and the decay's global index, which makes a run reproducible
// for a fixed seed no matter how the work is split across threads.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::coincidence::find_coincidences;
use crate::detector::DetectorRing;
use crate::digitize::EventConverter;
use crate::error::{Error, Result};
use crate::events::SingleEvent;
use crate::listmode;
use crate::sinogram::SinogramBuilder;
use crate::source::{self, DecaySource};
use crate::transport::{trace, trace_with_roulette, Boundary};
use crate::types::{AcquisitionConfig, TransportMode};

// ============================================================================
// RUN STATISTICS
// ============================================================================

// Counters over one acquisition run
//
// All photon counters are exact: escaped + absorbed = 2 * decays, and
// every detected photon is one single event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    pub decays: u64,
    pub escaped: u64,
    pub absorbed: u64,
    pub detected: u64,
    pub scattered_detected: u64,
    pub coincidences: u64,
    pub binned: u64,
}

impl AcquisitionStats {
    pub fn new() -> Self {
        Self::default()
    }

    // Field-wise sum, used as the rayon reduction
    pub fn merge(mut self, other: Self) -> Self {
        self.decays += other.decays;
        self.escaped += other.escaped;
        self.absorbed += other.absorbed;
        self.detected += other.detected;
        self.scattered_detected += other.scattered_detected;
        self.coincidences += other.coincidences;
        self.binned += other.binned;
        self
    }

    // Fraction of detected photons that Compton-scattered on the way out
    pub fn scatter_fraction(&self) -> f64 {
        if self.detected == 0 {
            return 0.0;
        }
        self.scattered_detected as f64 / self.detected as f64
    }

    pub fn report(&self) -> String {
        format!(
            "Acquisition Stats: decays={}, escaped={}, absorbed={}, detected={}, scatter_fraction={:.3}, coincidences={}, binned={}",
            self.decays,
            self.escaped,
            self.absorbed,
            self.detected,
            self.scatter_fraction(),
            self.coincidences,
            self.binned
        )
    }
}

// One interval's share of the run, for the manifest breakdown
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntervalSummary {
    pub interval: u32,
    pub decays: u64,
    pub singles: u64,
    pub coincidences: u64,
}

// Run metadata, serialized to JSON next to the data files
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub config: AcquisitionConfig,
    pub seed: u64,
    pub intervals: u32,
    pub slice_count: u32,
    pub stats: AcquisitionStats,
    pub per_interval: Vec<IntervalSummary>,

    // Build provenance, stamped by the build script
    pub git_sha: &'static str,
    pub rustc_version: &'static str,
    pub build_timestamp: &'static str,
}

// What the driver hands back to the caller
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    pub seed: u64,
    pub intervals: u32,
    pub slice_count: u32,
    pub stats: AcquisitionStats,
}

// ============================================================================
// SEEDED STREAMS
// ============================================================================

// splitmix64 of the master seed and a stream index. Every decay over the
// whole run owns one index, so streams never collide and never depend on
// the thread that happens to process them.
fn stream_seed(master: u64, index: u64) -> u64 {
    let mut z = master.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// The decay schedule (counts and times) draws from its own stream, pinned
// to an index no decay can reach
const SCHEDULE_STREAM: u64 = u64::MAX;

// ============================================================================
// DRIVER
// ============================================================================

// Run a full acquisition into `out_dir`
//
// The progress callback fires once per finished interval with the number
// of intervals completed.
pub fn run_acquisition(
    config: &AcquisitionConfig,
    out_dir: &Path,
    write_png: bool,
    mut progress: impl FnMut(u32) + Send,
) -> Result<AcquisitionReport> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);

    match config.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::Config(format!("thread pool: {e}")))?;
            pool.install(|| run_inner(config, out_dir, write_png, seed, &mut progress))
        }
        None => run_inner(config, out_dir, write_png, seed, &mut progress),
    }
}

fn run_inner<F: FnMut(u32)>(
    config: &AcquisitionConfig,
    out_dir: &Path,
    write_png: bool,
    seed: u64,
    progress: &mut F,
) -> Result<AcquisitionReport> {
    let geometry = config.geometry;
    let ring = DetectorRing::new(geometry);
    let converter = EventConverter::new(
        geometry.crystals_per_block as u16,
        geometry.crystals_per_block as u16,
    );
    let boundary = Boundary::from_phantom(&config.phantom);
    let material = config.material;
    let cutoff_kev = config.cutoff_kev();
    let mut source = DecaySource::new(config.phantom, config.activity_bq, config.half_life_s);

    let singles_dir = out_dir.join("singles");
    let coinc_dir = out_dir.join("coincidences");
    fs::create_dir_all(&singles_dir)?;
    fs::create_dir_all(&coinc_dir)?;

    let mut schedule_rng = StdRng::seed_from_u64(stream_seed(seed, SCHEDULE_STREAM));
    let mut stats = AcquisitionStats::new();
    let mut all_coincidences = Vec::new();
    let mut per_interval = Vec::new();
    let mut next_stream = 0u64;

    let intervals = config.intervals();
    for interval in 0..intervals {
        let count = source.counts(config.interval_s, &mut schedule_rng);
        let times = source::event_times(count, config.interval_s, &mut schedule_rng);
        let first_stream = next_stream;
        next_stream += count;

        // Fan the decays out; each one carries a sort key so the merged
        // singles list can be restored to emission order afterwards
        let (mut keyed, interval_stats) = (0..count as usize)
            .into_par_iter()
            .fold(
                || (Vec::new(), AcquisitionStats::new()),
                |(mut events, mut local), k| {
                    let stream = first_stream + k as u64;
                    let mut rng = StdRng::seed_from_u64(stream_seed(seed, stream));
                    let (mut first, mut second, timestamp) =
                        source.decay(interval, config.interval_s, times[k], &mut rng);
                    local.decays += 1;

                    for photon in [&mut first, &mut second] {
                        match config.mode {
                            TransportMode::Analog => {
                                trace(photon, &material, &boundary, cutoff_kev, &mut rng)
                            }
                            TransportMode::Roulette { survival } => trace_with_roulette(
                                photon, &material, &boundary, cutoff_kev, survival, &mut rng,
                            ),
                        }
                    }

                    for (slot, photon) in [&first, &second].into_iter().enumerate() {
                        if photon.is_detectable() {
                            local.escaped += 1;
                        } else {
                            local.absorbed += 1;
                        }
                        if let Some(event) = ring.detect(photon, timestamp, &converter) {
                            local.detected += 1;
                            if photon.was_scattered {
                                local.scattered_detected += 1;
                            }
                            events.push((stream * 2 + slot as u64, event));
                        }
                    }
                    (events, local)
                },
            )
            .reduce(
                || (Vec::new(), AcquisitionStats::new()),
                |(mut a, sa), (mut b, sb)| {
                    a.append(&mut b);
                    (a, sa.merge(sb))
                },
            );

        // Schedule times are sorted, so emission order is time order
        keyed.sort_unstable_by_key(|(key, _)| *key);
        let singles: Vec<SingleEvent> = keyed.into_iter().map(|(_, e)| e).collect();

        let pairs = find_coincidences(&singles, config.coincidence_window_ns);

        stats = stats.merge(interval_stats);
        stats.coincidences += pairs.len() as u64;
        per_interval.push(IntervalSummary {
            interval,
            decays: count,
            singles: singles.len() as u64,
            coincidences: pairs.len() as u64,
        });

        if !singles.is_empty() {
            listmode::write_singles_csv(&singles_dir.join(format!("{interval}.csv")), &singles)?;
            listmode::write_records(&singles_dir.join(format!("{interval}.bin")), &singles)?;
        }
        if !pairs.is_empty() {
            listmode::write_coincidences_csv(&coinc_dir.join(format!("{interval}.csv")), &pairs)?;
            listmode::write_records(&coinc_dir.join(format!("{interval}.bin")), &pairs)?;
        }

        all_coincidences.extend(pairs);
        source.elapse(config.interval_s);
        progress(interval + 1);
    }

    let mut builder = SinogramBuilder::new(&geometry, config.det_mash, config.ring_mash);
    stats.binned = builder.fill(&all_coincidences) as u64;
    builder.save_all(&out_dir.join("sinograms"), write_png)?;

    let manifest = Manifest {
        config: config.clone(),
        seed,
        intervals,
        slice_count: builder.indexer().slice_count(),
        stats,
        per_interval,
        git_sha: env!("BUILD_GIT_SHA"),
        rustc_version: env!("BUILD_RUSTC_VERSION"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
    };
    fs::write(
        out_dir.join("manifest.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    Ok(AcquisitionReport {
        seed,
        intervals,
        slice_count: builder.indexer().slice_count(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Material, Phantom};

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pet_acq_{}_{}", std::process::id(), name))
    }

    // Small run: coarse mashing keeps the sinogram files small and the
    // low activity keeps the decay count in the thousands
    fn small_config(seed: u64) -> AcquisitionConfig {
        AcquisitionConfig {
            activity_bq: 2.0e5,
            total_time_s: 0.02,
            interval_s: 0.01,
            det_mash: 6,
            ring_mash: 4,
            seed: Some(seed),
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn stats_merge_is_field_wise() {
        let a = AcquisitionStats {
            decays: 10,
            escaped: 18,
            absorbed: 2,
            detected: 5,
            scattered_detected: 1,
            coincidences: 2,
            binned: 2,
        };
        let b = AcquisitionStats {
            decays: 1,
            escaped: 2,
            absorbed: 0,
            detected: 2,
            scattered_detected: 0,
            coincidences: 1,
            binned: 0,
        };
        let m = a.merge(b);
        assert_eq!(m.decays, 11);
        assert_eq!(m.escaped, 20);
        assert_eq!(m.detected, 7);
        assert_eq!(m.binned, 2);
        assert!((m.scatter_fraction() - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_io() {
        let config = AcquisitionConfig {
            interval_s: 0.0,
            ..AcquisitionConfig::default()
        };
        let dir = tmp_dir("invalid");
        assert!(run_acquisition(&config, &dir, false, |_| {}).is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn same_seed_reproduces_the_run() {
        let config = small_config(7);
        let dir_a = tmp_dir("run_a");
        let dir_b = tmp_dir("run_b");
        let report_a = run_acquisition(&config, &dir_a, false, |_| {}).unwrap();
        let report_b = run_acquisition(&config, &dir_b, false, |_| {}).unwrap();
        assert_eq!(report_a.stats, report_b.stats);

        let singles_a: Vec<SingleEvent> =
            listmode::read_records(&dir_a.join("singles").join("0.bin")).unwrap();
        let singles_b: Vec<SingleEvent> =
            listmode::read_records(&dir_b.join("singles").join("0.bin")).unwrap();
        let _ = fs::remove_dir_all(&dir_a);
        let _ = fs::remove_dir_all(&dir_b);
        assert!(!singles_a.is_empty());
        assert_eq!(singles_a, singles_b);
    }

    #[test]
    fn vacuum_run_produces_coincidences_and_artifacts() {
        // Decays near the axis: both photons always escape in vacuum and
        // land in (nearly) opposite blocks
        let config = AcquisitionConfig {
            phantom: Phantom::cylinder(1.0, 2.0),
            activity_bq: 1.0e5,
            total_time_s: 0.01,
            interval_s: 0.01,
            det_mash: 6,
            ring_mash: 4,
            seed: Some(11),
            ..AcquisitionConfig::default()
        };
        let dir = tmp_dir("vacuum_run");
        let mut ticks = 0;
        let report = run_acquisition(&config, &dir, false, |i| ticks = i).unwrap();
        let stats = report.stats;

        assert_eq!(ticks, 1);
        assert_eq!(stats.escaped, 2 * stats.decays);
        assert_eq!(stats.absorbed, 0);
        assert!(stats.coincidences > 0);
        assert!(stats.binned > 0);
        assert!(stats.binned <= stats.coincidences);
        assert!(stats.detected >= 2 * stats.coincidences);

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["seed"], 11);
        assert_eq!(manifest["per_interval"].as_array().unwrap().len(), 1);
        assert_eq!(manifest["per_interval"][0]["decays"], stats.decays);

        assert!(dir.join("sinograms").join("slice_000.sg").is_file());
        let slice_files = fs::read_dir(dir.join("sinograms")).unwrap().count();
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(slice_files, report.slice_count as usize);
        assert_eq!(report.slice_count, 29);
    }

    #[test]
    fn roulette_water_run_completes() {
        let config = AcquisitionConfig {
            material: Material::water(),
            mode: TransportMode::roulette(0.8),
            activity_bq: 5.0e4,
            total_time_s: 0.01,
            interval_s: 0.01,
            det_mash: 6,
            ring_mash: 4,
            seed: Some(19),
            ..AcquisitionConfig::default()
        };
        let dir = tmp_dir("roulette_run");
        let report = run_acquisition(&config, &dir, false, |_| {}).unwrap();
        let _ = fs::remove_dir_all(&dir);
        assert_eq!(
            report.stats.escaped + report.stats.absorbed,
            2 * report.stats.decays
        );
    }
}
