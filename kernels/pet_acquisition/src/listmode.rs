// List-mode event files
//
// Every processing interval dumps its events twice: a headerless CSV for
// quick inspection and import into analysis scripts, and a packed binary
// stream of the wire records. CSV columns follow the binary field order,
// so a row reads the same as a hex dump of the record:
//
//   singles       t, p, xp, xm, yp, ym
//   coincidences  t1, t2, p1, p2, xp1, xm1, yp1, ym1, xp2, xm2, yp2, ym2
//
// Flags never make it to CSV; readers restore them as zero.

use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::events::{
    decode_stream, encode_stream, Channels, CoincidenceTof, DetectorPosition, Record, SingleEvent,
};

// ============================================================================
// CSV
// ============================================================================

pub fn write_singles_csv(path: &Path, events: &[SingleEvent]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for e in events {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            e.timestamp_ns,
            e.position.raw(),
            e.channels.x_plus,
            e.channels.x_minus,
            e.channels.y_plus,
            e.channels.y_minus,
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_singles_csv(path: &Path) -> Result<Vec<SingleEvent>> {
    let file = File::open(path)?;
    let mut events = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let number = idx + 1;
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 6 {
            return Err(Error::CsvParse {
                line: number,
                reason: format!("expected 6 columns, found {}", parts.len()),
            });
        }
        events.push(SingleEvent {
            timestamp_ns: parse(parts[0], number)?,
            position: DetectorPosition::from_raw(parse(parts[1], number)?),
            channels: Channels {
                x_plus: parse(parts[2], number)?,
                x_minus: parse(parts[3], number)?,
                y_plus: parse(parts[4], number)?,
                y_minus: parse(parts[5], number)?,
            },
            flags: 0,
        });
    }
    Ok(events)
}

pub fn write_coincidences_csv(path: &Path, pairs: &[CoincidenceTof]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for c in pairs {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            c.timestamp_1_ns,
            c.timestamp_2_ns,
            c.position_1.raw(),
            c.position_2.raw(),
            c.channels_1.x_plus,
            c.channels_1.x_minus,
            c.channels_1.y_plus,
            c.channels_1.y_minus,
            c.channels_2.x_plus,
            c.channels_2.x_minus,
            c.channels_2.y_plus,
            c.channels_2.y_minus,
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_coincidences_csv(path: &Path) -> Result<Vec<CoincidenceTof>> {
    let file = File::open(path)?;
    let mut pairs = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let number = idx + 1;
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 12 {
            return Err(Error::CsvParse {
                line: number,
                reason: format!("expected 12 columns, found {}", parts.len()),
            });
        }
        pairs.push(CoincidenceTof {
            timestamp_1_ns: parse(parts[0], number)?,
            timestamp_2_ns: parse(parts[1], number)?,
            position_1: DetectorPosition::from_raw(parse(parts[2], number)?),
            position_2: DetectorPosition::from_raw(parse(parts[3], number)?),
            channels_1: Channels {
                x_plus: parse(parts[4], number)?,
                x_minus: parse(parts[5], number)?,
                y_plus: parse(parts[6], number)?,
                y_minus: parse(parts[7], number)?,
            },
            channels_2: Channels {
                x_plus: parse(parts[8], number)?,
                x_minus: parse(parts[9], number)?,
                y_plus: parse(parts[10], number)?,
                y_minus: parse(parts[11], number)?,
            },
            flags: 0,
        });
    }
    Ok(pairs)
}

fn parse<T: std::str::FromStr>(field: &str, line: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    field.trim().parse().map_err(|err| Error::CsvParse {
        line,
        reason: format!("{field:?}: {err}"),
    })
}

// ============================================================================
// BINARY
// ============================================================================

pub fn write_records<R: Record>(path: &Path, records: &[R]) -> Result<()> {
    fs::write(path, encode_stream(records))?;
    Ok(())
}

pub fn read_records<R: Record>(path: &Path) -> Result<Vec<R>> {
    decode_stream(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pet_acq_{}_{}", std::process::id(), name))
    }

    fn sample_single(timestamp_ns: u32, block: u16) -> SingleEvent {
        SingleEvent {
            timestamp_ns,
            position: DetectorPosition::new(block, 1),
            channels: Channels {
                x_plus: 100,
                x_minus: 27,
                y_plus: 3,
                y_minus: 124,
            },
            flags: 0,
        }
    }

    #[test]
    fn singles_csv_round_trip() {
        let events = vec![sample_single(10, 0), sample_single(9_999, 24), sample_single(0, 47)];
        let path = tmp_path("singles.csv");
        write_singles_csv(&path, &events).unwrap();
        let back = read_singles_csv(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back, events);
    }

    #[test]
    fn coincidences_csv_round_trip() {
        let pairs = vec![
            CoincidenceTof::from_singles(&sample_single(100, 0), &sample_single(105, 24)),
            CoincidenceTof::from_singles(&sample_single(2_000, 3), &sample_single(2_001, 40)),
        ];
        let path = tmp_path("coinc.csv");
        write_coincidences_csv(&path, &pairs).unwrap();
        let back = read_coincidences_csv(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back, pairs);
    }

    #[test]
    fn wrong_column_count_is_fatal() {
        let path = tmp_path("badcols.csv");
        fs::write(&path, "1,2,3\n").unwrap();
        let err = read_singles_csv(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, Error::CsvParse { line: 1, .. }));
    }

    #[test]
    fn bad_number_reports_its_line() {
        let path = tmp_path("badnum.csv");
        fs::write(&path, "1,2,3,4,5,6\nnope,2,3,4,5,6\n").unwrap();
        let err = read_singles_csv(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, Error::CsvParse { line: 2, .. }));
    }

    #[test]
    fn empty_csv_reads_as_empty() {
        let path = tmp_path("empty.csv");
        write_singles_csv(&path, &[]).unwrap();
        let back = read_singles_csv(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert!(back.is_empty());
    }

    #[test]
    fn binary_stream_round_trip() {
        let mut rng = StdRng::seed_from_u64(51);
        let pairs: Vec<CoincidenceTof> =
            (0..200).map(|_| CoincidenceTof::random(&mut rng)).collect();
        let path = tmp_path("coinc.bin");
        write_records(&path, &pairs).unwrap();
        let back: Vec<CoincidenceTof> = read_records(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(back, pairs);
    }
}
