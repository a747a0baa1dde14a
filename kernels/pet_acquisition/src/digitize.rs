// Anger-logic digitization: crystal indices to channel quads and back
//
// A block is read out through four photomultiplier channels. The crystal
// column I splits the scintillation light between X+ and X- in proportion
// to its normalized coordinate x = 2I/(Nx-1) - 1, the row J does the same
// for Y+ and Y-. Two channel families exist:
// - energy-scaled: the pair sums to E/2 per axis, so the quad also carries
//   the deposited energy (this is what the detector front end produces)
// - fixed-scale: the pair sums to 16384, a quarter of u16 full scale, used
//   when reconstructing analog records from digital ones
// The inverse only ever looks at the ratio, so both families decode with
// the same formula.

use crate::events::{
    Channels, Coincidence, CoincidenceTof, DigitalCoincidence, DigitalSingleEvent, SingleEvent,
};

// Fixed-scale channel sum per axis
const FIXED_SCALE: f64 = 16384.0;

// ============================================================================
// EVENT CONVERTER
// ============================================================================

// Channel math for one block geometry
//
// nx is the number of crystal columns per block, ny the number of rows.
// They are equal on the base scanner but the math keeps them apart.
#[derive(Debug, Clone, Copy)]
pub struct EventConverter {
    nx: u16,
    ny: u16,
}

impl EventConverter {
    pub fn new(nx: u16, ny: u16) -> Self {
        assert!((2..=256).contains(&nx), "Columns per block must be in [2, 256]");
        assert!((2..=256).contains(&ny), "Rows per block must be in [2, 256]");
        Self { nx, ny }
    }

    #[inline]
    pub fn nx(&self) -> u16 {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> u16 {
        self.ny
    }

    // ------------------------------------------------------------------
    // forward: indices to channels
    // ------------------------------------------------------------------

    // Energy-scaled quad for a hit of `energy_kev` in crystal (i, j)
    pub fn channels(&self, i: u16, j: u16, energy_kev: f64) -> Channels {
        assert!(i < self.nx, "Column index out of block");
        assert!(j < self.ny, "Row index out of block");
        let x = Self::normalized(i, self.nx);
        let y = Self::normalized(j, self.ny);
        let quarter = energy_kev / 4.0;
        Channels {
            x_plus: (quarter * (1.0 + x)) as u16,
            x_minus: (quarter * (1.0 - x)) as u16,
            y_plus: (quarter * (1.0 + y)) as u16,
            y_minus: (quarter * (1.0 - y)) as u16,
        }
    }

    // Fixed-scale quad, energy independent
    pub fn fixed_channels(&self, i: u16, j: u16) -> Channels {
        let (x_plus, x_minus) = Self::fixed_pair(i, self.nx);
        let (y_plus, y_minus) = Self::fixed_pair(j, self.ny);
        Channels {
            x_plus,
            x_minus,
            y_plus,
            y_minus,
        }
    }

    // Normalized crystal coordinate in [-1, 1]
    #[inline]
    fn normalized(index: u16, n: u16) -> f64 {
        2.0 * index as f64 / (n - 1) as f64 - 1.0
    }

    // One fixed-scale pair. The end crystals throw all light on one side,
    // written out exactly so the inverse recovers them without rounding.
    fn fixed_pair(index: u16, n: u16) -> (u16, u16) {
        assert!(index < n, "Crystal index out of block");
        if index == 0 {
            return (0, FIXED_SCALE as u16);
        }
        if index == n - 1 {
            return (FIXED_SCALE as u16, 0);
        }
        let x = Self::normalized(index, n);
        let plus = (FIXED_SCALE * (1.0 + x) / 2.0) as u16;
        let minus = (FIXED_SCALE * (1.0 - x) / 2.0) as u16;
        (plus, minus)
    }

    // ------------------------------------------------------------------
    // inverse: channels to indices
    // ------------------------------------------------------------------

    // Column index from the X pair. The ratio estimator is evaluated in
    // f32, matching the front-end arithmetic width.
    pub fn index_for_x(&self, x_plus: u16, x_minus: u16) -> u8 {
        Self::index_from_pair(x_plus, x_minus, self.nx)
    }

    // Row index from the Y pair
    pub fn index_for_y(&self, y_plus: u16, y_minus: u16) -> u8 {
        Self::index_from_pair(y_plus, y_minus, self.ny)
    }

    fn index_from_pair(plus: u16, minus: u16, n: u16) -> u8 {
        let sum = plus as f32 + minus as f32;
        if sum == 0.0 {
            // An empty quad carries no position information
            return 0;
        }
        let x = (plus as f32 - minus as f32) / sum;
        let index = ((n - 1) as f32 * (x + 1.0) / 2.0).round();
        index as u8
    }

    // ------------------------------------------------------------------
    // record conversions
    // ------------------------------------------------------------------

    // Reduce a detected single to its crystal coordinates
    pub fn digital_single(&self, ev: &SingleEvent) -> DigitalSingleEvent {
        DigitalSingleEvent {
            timestamp_ns: ev.timestamp_ns,
            position: ev.position,
            i: self.index_for_x(ev.channels.x_plus, ev.channels.x_minus),
            j: self.index_for_y(ev.channels.y_plus, ev.channels.y_minus),
        }
    }

    pub fn digital_coincidence(&self, c: &Coincidence) -> DigitalCoincidence {
        DigitalCoincidence {
            timestamp_ns: c.timestamp_ns,
            position_1: c.position_1,
            position_2: c.position_2,
            i1: self.index_for_x(c.channels_1.x_plus, c.channels_1.x_minus),
            j1: self.index_for_y(c.channels_1.y_plus, c.channels_1.y_minus),
            i2: self.index_for_x(c.channels_2.x_plus, c.channels_2.x_minus),
            j2: self.index_for_y(c.channels_2.y_plus, c.channels_2.y_minus),
        }
    }

    // TOF pairs bin on the earlier timestamp once reduced
    pub fn digital_coincidence_tof(&self, t: &CoincidenceTof) -> DigitalCoincidence {
        DigitalCoincidence {
            timestamp_ns: t.timestamp_1_ns,
            position_1: t.position_1,
            position_2: t.position_2,
            i1: self.index_for_x(t.channels_1.x_plus, t.channels_1.x_minus),
            j1: self.index_for_y(t.channels_1.y_plus, t.channels_1.y_minus),
            i2: self.index_for_x(t.channels_2.x_plus, t.channels_2.x_minus),
            j2: self.index_for_y(t.channels_2.y_plus, t.channels_2.y_minus),
        }
    }

    // Rebuild an analog record from crystal coordinates on the fixed scale
    pub fn analog_single(&self, d: &DigitalSingleEvent) -> SingleEvent {
        SingleEvent {
            timestamp_ns: d.timestamp_ns,
            position: d.position,
            channels: self.fixed_channels(d.i as u16, d.j as u16),
            flags: 0,
        }
    }

    pub fn analog_coincidence(&self, d: &DigitalCoincidence) -> Coincidence {
        Coincidence {
            timestamp_ns: d.timestamp_ns,
            position_1: d.position_1,
            position_2: d.position_2,
            channels_1: self.fixed_channels(d.i1 as u16, d.j1 as u16),
            channels_2: self.fixed_channels(d.i2 as u16, d.j2 as u16),
            flags: 0,
        }
    }
}

impl Default for EventConverter {
    // Base scanner blocks are 15x15 crystal matrices
    fn default() -> Self {
        Self::new(15, 15)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DetectorPosition;
    use crate::REST_ENERGY_KEV;

    #[test]
    fn energy_scaled_round_trip_covers_every_crystal() {
        let conv = EventConverter::default();
        for i in 0..15u16 {
            for j in 0..15u16 {
                let ch = conv.channels(i, j, REST_ENERGY_KEV);
                assert_eq!(conv.index_for_x(ch.x_plus, ch.x_minus) as u16, i);
                assert_eq!(conv.index_for_y(ch.y_plus, ch.y_minus) as u16, j);
            }
        }
    }

    #[test]
    fn fixed_scale_round_trip_covers_every_crystal() {
        let conv = EventConverter::default();
        for i in 0..15u16 {
            let ch = conv.fixed_channels(i, 0);
            assert_eq!(conv.index_for_x(ch.x_plus, ch.x_minus) as u16, i);
        }
    }

    #[test]
    fn corner_crystals_are_exact() {
        let conv = EventConverter::default();
        let low = conv.fixed_channels(0, 0);
        assert_eq!((low.x_plus, low.x_minus), (0, 16384));
        let high = conv.fixed_channels(14, 14);
        assert_eq!((high.x_plus, high.x_minus), (16384, 0));
        assert_eq!((high.y_plus, high.y_minus), (16384, 0));
    }

    #[test]
    fn centre_crystal_splits_evenly() {
        let conv = EventConverter::default();
        let ch = conv.channels(7, 7, REST_ENERGY_KEV);
        assert_eq!(ch.x_plus, ch.x_minus);
        // Each axis pair sums to about E/2 up to truncation
        let sum = ch.x_plus + ch.x_minus;
        assert!((sum as f64 - REST_ENERGY_KEV / 2.0).abs() < 2.0);
    }

    #[test]
    fn empty_quad_decodes_to_zero() {
        let conv = EventConverter::default();
        assert_eq!(conv.index_for_x(0, 0), 0);
    }

    #[test]
    fn row_index_uses_the_y_pair() {
        let conv = EventConverter::default();
        let ch = conv.channels(3, 9, REST_ENERGY_KEV);
        let ev = SingleEvent {
            timestamp_ns: 5,
            position: DetectorPosition::new(1, 1),
            channels: ch,
            flags: 0,
        };
        let d = conv.digital_single(&ev);
        assert_eq!((d.i, d.j), (3, 9));
    }

    #[test]
    fn analog_reconstruction_preserves_crystal_coordinates() {
        let conv = EventConverter::default();
        for i in 0..15u8 {
            for j in [0u8, 7, 14] {
                let d = DigitalSingleEvent {
                    timestamp_ns: 1,
                    position: DetectorPosition::new(0, 0),
                    i,
                    j,
                };
                let back = conv.digital_single(&conv.analog_single(&d));
                assert_eq!((back.i, back.j), (i, j));
            }
        }
    }

    #[test]
    fn asymmetric_blocks_keep_axes_apart() {
        let conv = EventConverter::new(15, 7);
        let ch = conv.channels(14, 6, REST_ENERGY_KEV);
        assert_eq!(conv.index_for_x(ch.x_plus, ch.x_minus), 14);
        assert_eq!(conv.index_for_y(ch.y_plus, ch.y_minus), 6);
    }
}
