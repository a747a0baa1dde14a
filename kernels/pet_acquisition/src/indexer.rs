// Crystal addressing for sinogram binning
//
// A hit is located by (block, block ring) plus the in-block crystal (I, J).
// For binning that pair is flattened into a global crystal ring index and a
// global transaxial detector index, both optionally mashed: neighbouring
// crystals share a bin to trade resolution for counts. A coincidence then
// becomes (direction, line) within one michelogram slice, the slice being
// addressed by the sum of the two mashed ring indices.

use crate::events::DetectorPosition;
use crate::types::ScannerGeometry;

// ============================================================================
// INDEXER
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Indexer {
    // Total transaxial crystal columns before mashing
    detectors: u32,

    // Total crystal rings before mashing
    rings: u32,

    // Crystal columns (and rows) per block
    crystals_per_block: u32,

    // Transaxial mashing factor
    det_mash: u32,

    // Axial mashing factor
    ring_mash: u32,
}

impl Indexer {
    pub fn new(
        detectors: u32,
        rings: u32,
        crystals_per_block: u32,
        det_mash: u32,
        ring_mash: u32,
    ) -> Self {
        assert!(detectors > 0 && rings > 0, "Crystal counts must be positive");
        assert!(crystals_per_block > 0, "Crystals per block must be positive");
        assert!(det_mash > 0 && ring_mash > 0, "Mashing factors must be non-zero");
        assert!(
            detectors % det_mash == 0,
            "Transaxial mash must divide the crystal count"
        );
        assert!(
            (detectors / det_mash) % 2 == 0,
            "Mashed detector count must be even to pair opposite crystals"
        );
        Self {
            detectors,
            rings,
            crystals_per_block,
            det_mash,
            ring_mash,
        }
    }

    pub fn from_geometry(geometry: &ScannerGeometry, det_mash: u32, ring_mash: u32) -> Self {
        Self::new(
            geometry.transaxial_crystals(),
            geometry.crystal_rings(),
            geometry.crystals_per_block,
            det_mash,
            ring_mash,
        )
    }

    // Mashed transaxial bins around the ring
    #[inline]
    pub fn mashed_detectors(&self) -> u32 {
        self.detectors / self.det_mash
    }

    // Mashed axial bins along the bore
    #[inline]
    pub fn mashed_rings(&self) -> u32 {
        self.rings / self.ring_mash
    }

    // Projection directions per slice
    #[inline]
    pub fn direction_count(&self) -> u32 {
        self.mashed_detectors() / 2
    }

    // Lines of response per direction
    #[inline]
    pub fn line_count(&self) -> u32 {
        self.mashed_detectors() - 1
    }

    // Michelogram slices, one per ring sum
    #[inline]
    pub fn slice_count(&self) -> u32 {
        2 * self.mashed_rings() - 1
    }

    // Mashed crystal ring of a hit
    #[inline]
    pub fn ring(&self, position: DetectorPosition, j: u8) -> u32 {
        (position.ring() as u32 * self.crystals_per_block + j as u32) / self.ring_mash
    }

    // Mashed transaxial detector of a hit
    #[inline]
    pub fn detector(&self, position: DetectorPosition, i: u8) -> u32 {
        (position.block() as u32 * self.crystals_per_block + i as u32) / self.det_mash
    }

    // Projection direction of a mashed detector pair
    #[inline]
    pub fn direction(&self, d1: u32, d2: u32) -> u32 {
        ((d1 + d2) % self.mashed_detectors()) / 2
    }

    // Line of response of a mashed detector pair
    //
    // The pair is put into canonical order, reflected once when it wraps
    // past the far side of the ring, and reduced to a signed offset. A pair
    // landing in the same mashed detector has no line and is discarded.
    pub fn line(&self, d1: u32, d2: u32) -> Option<u32> {
        let n = self.mashed_detectors();
        let (mut a, mut b) = if d1 > d2 { (d2, d1) } else { (d1, d2) };
        if a + b >= n {
            std::mem::swap(&mut a, &mut b);
        }
        let offset = (a + n - b) % n;
        if offset == 0 {
            return None;
        }
        Some(offset - 1)
    }

    // Michelogram slice of a mashed ring pair; sums past the last slice
    // come from out-of-range addresses and are discarded
    pub fn slice(&self, r1: u32, r2: u32) -> Option<u32> {
        let sum = r1 + r2;
        if sum < self.slice_count() {
            Some(sum)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Indexer {
        Indexer::from_geometry(&ScannerGeometry::default(), 2, 1)
    }

    #[test]
    fn base_scanner_bin_counts() {
        let ix = base();
        assert_eq!(ix.mashed_detectors(), 360);
        assert_eq!(ix.mashed_rings(), 60);
        assert_eq!(ix.direction_count(), 180);
        assert_eq!(ix.line_count(), 359);
        assert_eq!(ix.slice_count(), 119);
    }

    #[test]
    fn ring_and_detector_flatten_block_addresses() {
        let ix = base();
        assert_eq!(ix.ring(DetectorPosition::new(0, 2), 7), 37);
        assert_eq!(ix.detector(DetectorPosition::new(37, 0), 4), 279);
        // Mashing merges neighbouring columns
        assert_eq!(ix.detector(DetectorPosition::new(0, 0), 0), 0);
        assert_eq!(ix.detector(DetectorPosition::new(0, 0), 1), 0);
        assert_eq!(ix.detector(DetectorPosition::new(0, 0), 2), 1);
    }

    #[test]
    fn direction_wraps_around_the_ring() {
        let ix = base();
        assert_eq!(ix.direction(10, 20), 15);
        assert_eq!(ix.direction(350, 20), 5);
        assert_eq!(ix.direction(0, 359), 179);
    }

    #[test]
    fn line_values_by_hand() {
        let ix = base();
        assert_eq!(ix.line(0, 1), Some(358));
        assert_eq!(ix.line(100, 260), Some(159));
        assert_eq!(ix.line(10, 10), None);
    }

    #[test]
    fn line_is_symmetric_and_bounded() {
        let ix = base();
        for d1 in 0..360 {
            for d2 in d1..360 {
                let ab = ix.line(d1, d2);
                assert_eq!(ab, ix.line(d2, d1), "pair ({}, {})", d1, d2);
                match ab {
                    None => assert_eq!(d1, d2),
                    Some(line) => assert!(line < ix.line_count()),
                }
            }
        }
    }

    #[test]
    fn ring_sums_past_the_last_slice_are_discarded() {
        let ix = base();
        assert_eq!(ix.slice(0, 0), Some(0));
        assert_eq!(ix.slice(59, 59), Some(118));
        assert_eq!(ix.slice(59, 60), None);
        assert_eq!(ix.slice(200, 200), None);
    }
}
