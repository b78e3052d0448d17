//! CSV export of an episode step log.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::episode::StepRecord;

/// Write `records` as CSV to a new file at `path`.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be created or written.
pub fn export_csv(records: &[StepRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(records, io::BufWriter::new(file))
}

/// Write `records` as CSV to any writer.
///
/// Columns: `step`, `timestamp`, one column per scalar reading (taken from
/// the first record, in order), `mean_zone`, `reward`, `action`. Missing
/// values are written as empty fields.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[StepRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let readings: Vec<&str> = records
        .first()
        .map(|r| r.readings.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let mut header = vec!["step", "timestamp"];
    header.extend(readings.iter().copied());
    header.extend(["mean_zone", "reward", "action"]);
    wtr.write_record(&header)?;

    for r in records {
        let mut row = Vec::with_capacity(header.len());
        row.push(r.step.to_string());
        row.push(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            r.clock.year, r.clock.month, r.clock.day, r.clock.hour, r.clock.minute
        ));
        for name in &readings {
            row.push(optional(r.readings.get(*name).copied()));
        }
        row.push(optional(r.mean_zone));
        row.push(format!("{:.6}", r.reward));
        row.push(r.action.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::SimClock;

    fn record(step: u64, power: Option<f64>) -> StepRecord {
        let mut readings = indexmap::IndexMap::new();
        readings.insert("outdoor_temp".to_string(), 5.5);
        if let Some(p) = power {
            readings.insert("total_power".to_string(), p);
        }
        StepRecord {
            step,
            clock: SimClock {
                year: 2024,
                month: 1,
                day: 2,
                hour: 3,
                minute: 15,
            },
            readings,
            mean_zone: Some(21.25),
            reward: -0.1,
            action: "uniform",
        }
    }

    fn render(records: &[StepRecord]) -> String {
        let mut buf = Vec::new();
        write_csv(records, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_follows_first_record() {
        let out = render(&[record(1, Some(100_000.0))]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("step,timestamp,outdoor_temp,total_power,mean_zone,reward,action")
        );
        assert_eq!(
            lines.next(),
            Some("1,2024-01-02 03:15,5.5000,100000.0000,21.2500,-0.100000,uniform")
        );
    }

    #[test]
    fn missing_reading_is_empty_field() {
        let out = render(&[record(1, Some(1.0)), record(2, None)]);
        let last = out.lines().last().unwrap();
        assert!(last.starts_with("2,2024-01-02 03:15,5.5000,,"));
    }

    #[test]
    fn empty_log_writes_header_only() {
        let out = render(&[]);
        assert_eq!(out, "step,timestamp,mean_zone,reward,action\n");
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.csv");
        export_csv(&[record(1, None)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
