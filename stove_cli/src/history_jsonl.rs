//! History snapshots appended to a JSON-lines file.

use serde_json::{Map, Value, json};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use stove_core::history::{HistorySink, SampleValue, Snapshot};

pub struct JsonlHistory {
    out: BufWriter<File>,
}

impl JsonlHistory {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> eyre::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eyre::eyre!("open history file {}: {e}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }
}

/// One snapshot as a JSON object: wall-clock and uptime seconds plus every value.
pub fn snapshot_json(snapshot: &Snapshot, unix_s: f64) -> Value {
    let values: Map<String, Value> = snapshot
        .values
        .iter()
        .map(|(k, v)| {
            let v = match v {
                SampleValue::Number(n) => json!(n),
                SampleValue::Text(s) => json!(s),
            };
            (k.clone(), v)
        })
        .collect();
    json!({
        "ts": unix_s,
        "uptime_s": snapshot.uptime.as_secs_f64(),
        "values": values,
    })
}

impl HistorySink for JsonlHistory {
    fn record(&mut self, snapshot: &Snapshot) -> stove_core::Result<()> {
        let unix_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        writeln!(self.out, "{}", snapshot_json(snapshot, unix_s))?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use stove_core::history::Sample;

    #[test]
    fn numbers_and_text_keep_their_types() {
        let snapshot = Snapshot {
            taken_at: Instant::now(),
            uptime: Duration::from_secs(90),
            values: Sample::from([
                ("temperature".to_owned(), SampleValue::Number(215.5)),
                ("state".to_owned(), SampleValue::Text("45%".into())),
                ("bad".to_owned(), SampleValue::Number(f64::NAN)),
            ]),
        };
        let v = snapshot_json(&snapshot, 1_700_000_000.0);
        assert_eq!(v["uptime_s"], json!(90.0));
        assert_eq!(v["values"]["temperature"], json!(215.5));
        assert_eq!(v["values"]["state"], json!("45%"));
        assert!(v["values"]["bad"].is_null());
    }

    #[test]
    fn appends_one_line_per_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.jsonl");
        let mut sink = JsonlHistory::create(&path).expect("create");
        let snapshot = Snapshot {
            taken_at: Instant::now(),
            uptime: Duration::ZERO,
            values: Sample::from([("auto-mode".to_owned(), SampleValue::Text("on".into()))]),
        };
        sink.record(&snapshot).expect("record");
        sink.record(&snapshot).expect("record");
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let v: Value = serde_json::from_str(line).expect("json line");
            assert_eq!(v["values"]["auto-mode"], "on");
        }
    }
}
