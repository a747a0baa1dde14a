// Coincidence sorting
//
// Two 511 keV photons from the same annihilation arrive at the ring within
// nanoseconds of each other, so the sorter walks the time-ordered singles
// and pairs each event with the next one inside the window. Both photons
// hitting the same block cannot define a line of response through the
// patient, so such neighbours are passed over and the scan continues. Once
// a pair is emitted both events are consumed and the scan resumes at the
// first event after the pair.
//
// Input must be sorted by timestamp; the acquisition driver sorts each
// interval batch before calling in here.

use crate::events::{CoincidenceTof, SingleEvent};

pub fn find_coincidences(events: &[SingleEvent], window_ns: u32) -> Vec<CoincidenceTof> {
    let mut result = Vec::new();
    let mut i = 0;
    while i + 1 < events.len() {
        let mut paired = false;
        let mut j = i + 1;
        while j < events.len() && events[j].timestamp_ns - events[i].timestamp_ns < window_ns {
            if events[j].position.block() != events[i].position.block() {
                result.push(CoincidenceTof::from_singles(&events[i], &events[j]));
                i = j + 1;
                paired = true;
                break;
            }
            j += 1;
        }
        if !paired {
            i += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Channels, DetectorPosition};

    fn single(timestamp_ns: u32, block: u16) -> SingleEvent {
        SingleEvent {
            timestamp_ns,
            position: DetectorPosition::new(block, 0),
            channels: Channels {
                x_plus: 1,
                x_minus: 2,
                y_plus: 3,
                y_minus: 4,
            },
            flags: 0,
        }
    }

    #[test]
    fn pairs_two_singles_inside_the_window() {
        let events = vec![single(100, 0), single(105, 24)];
        let pairs = find_coincidences(&events, 10);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].timestamp_1_ns, 100);
        assert_eq!(pairs[0].timestamp_2_ns, 105);
        assert_eq!(pairs[0].position_1.block(), 0);
        assert_eq!(pairs[0].position_2.block(), 24);
    }

    #[test]
    fn same_block_pair_is_rejected() {
        let events = vec![single(100, 7), single(105, 7)];
        assert!(find_coincidences(&events, 10).is_empty());
    }

    #[test]
    fn same_block_neighbour_does_not_end_the_search() {
        let events = vec![single(0, 3), single(2, 3), single(4, 19)];
        let pairs = find_coincidences(&events, 10);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].timestamp_1_ns, 0);
        assert_eq!(pairs[0].timestamp_2_ns, 4);
    }

    #[test]
    fn window_edge_is_exclusive() {
        let at_edge = vec![single(0, 0), single(10, 24)];
        assert!(find_coincidences(&at_edge, 10).is_empty());

        let inside = vec![single(0, 0), single(9, 24)];
        assert_eq!(find_coincidences(&inside, 10).len(), 1);
    }

    #[test]
    fn paired_events_are_consumed() {
        let events = vec![single(0, 0), single(1, 12), single(2, 24), single(3, 36)];
        let pairs = find_coincidences(&events, 10);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].timestamp_1_ns, 0);
        assert_eq!(pairs[0].timestamp_2_ns, 1);
        assert_eq!(pairs[1].timestamp_1_ns, 2);
        assert_eq!(pairs[1].timestamp_2_ns, 3);
    }

    #[test]
    fn unpaired_event_advances_by_one() {
        let events = vec![single(0, 0), single(100, 12), single(105, 24)];
        let pairs = find_coincidences(&events, 10);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].timestamp_1_ns, 100);
        assert_eq!(pairs[0].timestamp_2_ns, 105);
    }

    #[test]
    fn short_inputs_yield_nothing() {
        assert!(find_coincidences(&[], 10).is_empty());
        assert!(find_coincidences(&[single(0, 0)], 10).is_empty());
    }
}
