// Michelogram sinograms: binning, storage and preview images
//
// A coincidence defines a line of response between two crystals. Reduced to
// mashed indices it becomes (direction, line) inside one michelogram slice,
// the slice being selected by the sum of the two crystal rings. One
// Sinogram holds the counts of one slice as a flat directions x lines grid;
// the builder owns one sinogram per slice and routes coincidences into
// them.
//
// On disk a slice is a small header (sample count, angle count, both u32
// little-endian) followed by the counts as f64 in angle-major order. A PNG
// preview maps the counts onto an 8-bit grayscale ramp.

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use image::GrayImage;

use crate::digitize::EventConverter;
use crate::error::{Error, Result};
use crate::events::CoincidenceTof;
use crate::indexer::Indexer;
use crate::types::ScannerGeometry;

// ============================================================================
// ANGLE DISTRIBUTION
// ============================================================================

// Bin edges over an interval: `count` bins need count + 1 edge values
#[derive(Debug, Clone, PartialEq)]
pub struct AngleDistribution {
    values: Vec<f64>,
}

impl AngleDistribution {
    pub fn uniform(start: f64, end: f64, count: u32) -> Self {
        assert!(count > 0, "Bin count must be positive");
        assert!(end > start, "Interval must be non-empty");
        let step = (end - start) / count as f64;
        let values = (0..=count).map(|i| start + i as f64 * step).collect();
        Self { values }
    }

    // Number of bins
    #[inline]
    pub fn count(&self) -> usize {
        self.values.len() - 1
    }

    // Edge value i, for i in 0..=count
    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        self.values[i]
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

// ============================================================================
// SINOGRAM
// ============================================================================

// Counts of one michelogram slice
//
// Directions index the projection angle over [0, π); samples index the
// line of response across the field of view. Data is angle-major: all
// samples of direction 0, then direction 1, and so on.
#[derive(Debug, Clone)]
pub struct Sinogram {
    directions: AngleDistribution,
    samples: AngleDistribution,
    data: Vec<f64>,
}

impl Sinogram {
    pub fn new(directions: AngleDistribution, samples: AngleDistribution) -> Self {
        let data = vec![0.0; directions.count() * samples.count()];
        Self {
            directions,
            samples,
            data,
        }
    }

    #[inline]
    pub fn direction_count(&self) -> usize {
        self.directions.count()
    }

    #[inline]
    pub fn sample_count(&self) -> usize {
        self.samples.count()
    }

    #[inline]
    pub fn get(&self, direction: usize, sample: usize) -> f64 {
        self.data[direction * self.sample_count() + sample]
    }

    // Count one line of response
    pub fn add(&mut self, direction: usize, sample: usize) {
        let idx = direction * self.sample_count() + sample;
        self.data[idx] += 1.0;
    }

    // Total counts in the slice
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    // Write the slice: sample count, angle count, then angle-major f64 data
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf =
            Vec::with_capacity(8 + self.data.len() * std::mem::size_of::<f64>());
        buf.extend_from_slice(&(self.sample_count() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.direction_count() as u32).to_le_bytes());
        for v in &self.data {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(path, buf)?;
        Ok(())
    }

    // Read a slice back; the payload length must match the header exactly
    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read(path)?;
        if buf.len() < 8 {
            return Err(Error::SinogramFormat("header shorter than 8 bytes".into()));
        }
        let samples = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let angles = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if samples == 0 || angles == 0 {
            return Err(Error::SinogramFormat("empty axis in header".into()));
        }
        let expected = 8 + samples * angles * std::mem::size_of::<f64>();
        if buf.len() != expected {
            return Err(Error::SinogramFormat(format!(
                "payload is {} bytes, header implies {}",
                buf.len(),
                expected
            )));
        }
        let data = buf[8..]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        Ok(Self {
            directions: AngleDistribution::uniform(0.0, PI, angles as u32),
            samples: AngleDistribution::uniform(-1.0, 1.0, samples as u32),
            data,
        })
    }

    // Grayscale preview, one pixel per bin, counts stretched to 0..255.
    // A slice with no spread (all bins equal, typically empty) comes out
    // black instead of dividing by zero.
    pub fn dump_png(&self, path: &Path) -> Result<()> {
        let width = self.sample_count() as u32;
        let height = self.direction_count() as u32;
        let min = self.data.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let img = GrayImage::from_fn(width, height, |x, y| {
            let v = self.get(y as usize, x as usize);
            let level = if range > 0.0 {
                ((v - min) / range * 255.0) as u8
            } else {
                0
            };
            image::Luma([level])
        });
        img.save(path)?;
        Ok(())
    }
}

// ============================================================================
// SINOGRAM BUILDER
// ============================================================================

// Routes coincidences into per-slice sinograms
pub struct SinogramBuilder {
    indexer: Indexer,
    converter: EventConverter,
    sinograms: Vec<Sinogram>,
}

impl SinogramBuilder {
    pub fn new(geometry: &ScannerGeometry, det_mash: u32, ring_mash: u32) -> Self {
        let indexer = Indexer::from_geometry(geometry, det_mash, ring_mash);
        let converter = EventConverter::new(
            geometry.crystals_per_block as u16,
            geometry.crystals_per_block as u16,
        );
        let directions = indexer.direction_count();
        let lines = indexer.line_count();
        let sinograms = (0..indexer.slice_count())
            .map(|_| {
                Sinogram::new(
                    AngleDistribution::uniform(0.0, PI, directions),
                    AngleDistribution::uniform(-1.0, 1.0, lines),
                )
            })
            .collect();
        Self {
            indexer,
            converter,
            sinograms,
        }
    }

    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn slices(&self) -> &[Sinogram] {
        &self.sinograms
    }

    // Bin a batch of coincidences, returning how many were accepted.
    // Degenerate lines and out-of-range ring sums fall out silently, the
    // same way the geometry discards.
    pub fn fill(&mut self, coincidences: &[CoincidenceTof]) -> usize {
        let mut binned = 0;
        for tof in coincidences {
            let d = self.converter.digital_coincidence_tof(tof);
            let r1 = self.indexer.ring(d.position_1, d.j1);
            let r2 = self.indexer.ring(d.position_2, d.j2);
            let det1 = self.indexer.detector(d.position_1, d.i1);
            let det2 = self.indexer.detector(d.position_2, d.i2);

            let Some(slice) = self.indexer.slice(r1, r2) else {
                continue;
            };
            let Some(line) = self.indexer.line(det1, det2) else {
                continue;
            };
            let direction = self.indexer.direction(det1, det2);

            self.sinograms[slice as usize].add(direction as usize, line as usize);
            binned += 1;
        }
        binned
    }

    // Write every slice as slice_###.sg, with an optional PNG preview
    pub fn save_all(&self, dir: &Path, with_png: bool) -> Result<()> {
        fs::create_dir_all(dir)?;
        for (idx, sinogram) in self.sinograms.iter().enumerate() {
            sinogram.save(&dir.join(format!("slice_{:03}.sg", idx)))?;
            if with_png {
                sinogram.dump_png(&dir.join(format!("slice_{:03}.png", idx)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectorPosition, SingleEvent};

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pet_acq_{}_{}", std::process::id(), name))
    }

    #[test]
    fn uniform_distribution_has_count_plus_one_edges() {
        let d = AngleDistribution::uniform(0.0, PI, 180);
        assert_eq!(d.count(), 180);
        assert_eq!(d.values().len(), 181);
        assert_eq!(d.value(0), 0.0);
        assert!((d.value(180) - PI).abs() < 1e-12);
    }

    #[test]
    fn add_and_total() {
        let mut s = Sinogram::new(
            AngleDistribution::uniform(0.0, PI, 4),
            AngleDistribution::uniform(-1.0, 1.0, 7),
        );
        s.add(0, 0);
        s.add(3, 6);
        s.add(3, 6);
        assert_eq!(s.get(0, 0), 1.0);
        assert_eq!(s.get(3, 6), 2.0);
        assert_eq!(s.total(), 3.0);
    }

    #[test]
    fn save_load_round_trip() {
        let mut s = Sinogram::new(
            AngleDistribution::uniform(0.0, PI, 5),
            AngleDistribution::uniform(-1.0, 1.0, 9),
        );
        s.add(2, 4);
        s.add(4, 8);
        let path = tmp_path("roundtrip.sg");
        s.save(&path).unwrap();
        let back = Sinogram::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back.direction_count(), 5);
        assert_eq!(back.sample_count(), 9);
        assert_eq!(back.get(2, 4), 1.0);
        assert_eq!(back.get(4, 8), 1.0);
        assert_eq!(back.total(), 2.0);
    }

    #[test]
    fn truncated_sinogram_file_is_rejected() {
        let path = tmp_path("truncated.sg");
        fs::write(&path, [9u8, 0, 0, 0, 5, 0, 0, 0, 1, 2, 3]).unwrap();
        let err = Sinogram::load(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(err.is_data_error());
    }

    #[test]
    fn empty_slice_renders_black() {
        let s = Sinogram::new(
            AngleDistribution::uniform(0.0, PI, 3),
            AngleDistribution::uniform(-1.0, 1.0, 4),
        );
        let path = tmp_path("empty.png");
        s.dump_png(&path).unwrap();
        let img = image::open(&path).unwrap().to_luma8();
        let _ = fs::remove_file(&path);
        assert_eq!(img.dimensions(), (4, 3));
        assert!(img.pixels().all(|p| p.0[0] == 0));
    }

    fn single(block: u16, ring: u16, i: u16, j: u16) -> SingleEvent {
        let conv = EventConverter::default();
        SingleEvent {
            timestamp_ns: 0,
            position: DetectorPosition::new(block, ring),
            channels: conv.channels(i, j, crate::REST_ENERGY_KEV),
            flags: 0,
        }
    }

    #[test]
    fn builder_bins_a_known_pair_where_expected() {
        let mut builder = SinogramBuilder::new(&ScannerGeometry::default(), 2, 1);
        // Crystal rings 37 and 37, mashed detectors 0 and 180:
        // slice 74, direction 90, line 179
        let a = single(0, 2, 0, 7);
        let b = single(24, 2, 0, 7);
        let binned = builder.fill(&[CoincidenceTof::from_singles(&a, &b)]);
        assert_eq!(binned, 1);
        assert_eq!(builder.slices().len(), 119);
        assert_eq!(builder.slices()[74].get(90, 179), 1.0);
        let grand_total: f64 = builder.slices().iter().map(Sinogram::total).sum();
        assert_eq!(grand_total, 1.0);
    }

    #[test]
    fn degenerate_line_is_discarded() {
        let mut builder = SinogramBuilder::new(&ScannerGeometry::default(), 2, 1);
        // Same mashed detector on both sides: no line of response
        let a = single(0, 2, 0, 7);
        let b = single(0, 2, 1, 7);
        let binned = builder.fill(&[CoincidenceTof::from_singles(&a, &b)]);
        assert_eq!(binned, 0);
    }

    #[test]
    fn out_of_range_ring_sum_is_discarded() {
        let mut builder = SinogramBuilder::new(&ScannerGeometry::default(), 2, 1);
        // Block ring 15 comes from a corrupted wire position and maps past
        // the last michelogram slice
        let mut a = single(0, 2, 0, 7);
        a.position = DetectorPosition::from_raw((0 << 4) | 15);
        let b = single(24, 2, 0, 7);
        let binned = builder.fill(&[CoincidenceTof::from_singles(&a, &b)]);
        assert_eq!(binned, 0);
    }
}
