use crate::error::LogError;
use oddex_core::TrialEventRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Sink for per-event trial rows
pub trait TrialLog {
    fn write(&mut self, record: &TrialEventRecord) -> Result<(), LogError>;
    fn flush(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

impl TrialLog for Vec<TrialEventRecord> {
    fn write(&mut self, record: &TrialEventRecord) -> Result<(), LogError> {
        self.push(record.clone());
        Ok(())
    }
}

impl<L: TrialLog + ?Sized> TrialLog for &mut L {
    fn write(&mut self, record: &TrialEventRecord) -> Result<(), LogError> {
        (**self).write(record)
    }
    fn flush(&mut self) -> Result<(), LogError> {
        (**self).flush()
    }
}

/// One JSON object per line
pub struct JsonLinesLog<W: Write> {
    writer: W,
    rows: usize,
}

impl JsonLinesLog<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, LogError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, rows: 0 }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TrialLog for JsonLinesLog<W> {
    fn write(&mut self, record: &TrialEventRecord) -> Result<(), LogError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oddex_core::{Condition, EventType, KeyPress, StimulusKind, TrialType};

    fn record() -> TrialEventRecord {
        TrialEventRecord {
            session: 1,
            block: 2,
            trial: 3,
            event_index: 1,
            event_type: EventType::StimPhase,
            condition: Condition::Attend,
            trial_type: TrialType::Oddball,
            stimulus: Some(StimulusKind::NoiseDisk),
            prep_time: 1.0,
            visual_onset: Some(1.01),
            stim_onset: Some(1.01),
            stim_offset: Some(1.16),
            target_onset: None,
            target_offset: None,
            is_target: false,
            probe_value: "grey".into(),
            key_presses: vec![KeyPress::new("space", 1.1)],
        }
    }

    #[test]
    fn writes_one_json_object_per_line() {
        let mut log = JsonLinesLog::new(Vec::new());
        log.write(&record()).unwrap();
        log.write(&record()).unwrap();
        assert_eq!(log.rows(), 2);
        let text = String::from_utf8(log.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["event_type"], "stim_phase");
        assert_eq!(value["stimulus"], "noise_disk");
        assert_eq!(value["key_presses"][0]["key"], "space");
        assert!(value["target_onset"].is_null());
    }

    #[test]
    fn file_log_is_flushed_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.jsonl");
        let mut log = JsonLinesLog::create(&path).unwrap();
        log.write(&record()).unwrap();
        log.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let back: TrialEventRecord = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(back, record());
    }
}
