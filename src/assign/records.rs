//! Newline-delimited JSON records in and out.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use tractor::models::{PointOutcome, PointRecord};
use tractor::{Point, PointError};

use crate::config::{InputConfig, OutputConfig};

/// One input line, kept whole so it can be written back augmented
#[derive(Debug, Clone)]
pub struct Record {
    pub line: usize,
    pub fields: Map<String, Value>,
    pub point: Option<Point>,
}

/// Reads records in bounded chunks.
pub struct RecordReader<R> {
    input: R,
    config: InputConfig,
    line: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, config: InputConfig) -> Self {
        Self {
            input,
            config,
            line: 0,
        }
    }

    /// Up to `max` records; empty at end of input. Blank lines are skipped.
    pub fn next_chunk(&mut self, max: usize) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(max.min(4096));
        let mut buf = String::new();

        while records.len() < max {
            buf.clear();
            if self.input.read_line(&mut buf)? == 0 {
                break;
            }
            self.line += 1;

            let text = buf.trim();
            if text.is_empty() {
                continue;
            }
            records.push(parse_record(self.line, text, &self.config)?);
        }

        Ok(records)
    }
}

pub fn parse_record(line: usize, text: &str, config: &InputConfig) -> Result<Record> {
    let fields: Map<String, Value> = serde_json::from_str(text)
        .with_context(|| format!("Line {} is not a JSON object", line))?;

    let id = match fields.get(&config.id_field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => line.to_string(),
    };

    let record = PointRecord::new(
        id,
        coordinate(fields.get(&config.latitude_field)),
        coordinate(fields.get(&config.longitude_field)),
    );

    Ok(Record {
        line,
        point: record.point(),
        fields,
    })
}

/// Absent, null and empty values mean "no coordinate". Anything else that
/// is not a number becomes NaN so the point is reported as invalid.
fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Null => None,
        Value::Number(n) => Some(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().parse().unwrap_or(f64::NAN)),
        _ => Some(f64::NAN),
    }
}

/// Writes augmented records and, optionally, rejected points.
pub struct RecordWriter<W> {
    output: W,
    rejects: Option<Box<dyn Write>>,
    config: OutputConfig,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(output: W, rejects: Option<Box<dyn Write>>, config: OutputConfig) -> Self {
        Self {
            output,
            rejects,
            config,
        }
    }

    /// Write one chunk. `outcomes` holds one entry per record that has a point, in order.
    pub fn write_chunk(&mut self, records: Vec<Record>, outcomes: Vec<PointOutcome>) -> Result<()> {
        let mut outcomes = outcomes.into_iter();

        for mut record in records {
            if record.point.is_none() {
                self.write_line(&record.fields)?;
                continue;
            }

            let outcome = outcomes
                .next()
                .context("Fewer outcomes than queried records")?;
            match outcome {
                Ok(assignment) => {
                    record.fields.insert(
                        self.config.field.clone(),
                        Value::String(assignment.region_code().to_string()),
                    );
                    if let Some(count_field) = &self.config.match_count_field {
                        record
                            .fields
                            .insert(count_field.clone(), json!(assignment.match_count));
                    }
                    self.write_line(&record.fields)?;
                }
                Err(err) => self.write_reject(record.line, &err)?,
            }
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        if let Some(rejects) = &mut self.rejects {
            rejects.flush()?;
        }
        Ok(())
    }

    fn write_line(&mut self, fields: &Map<String, Value>) -> Result<()> {
        serde_json::to_writer(&mut self.output, fields)?;
        self.output.write_all(b"\n")?;
        Ok(())
    }

    fn write_reject(&mut self, line: usize, err: &PointError) -> Result<()> {
        if let Some(rejects) = &mut self.rejects {
            let entry = json!({
                "line": line,
                "id": err.point_id(),
                "reason": err.to_string(),
            });
            serde_json::to_writer(&mut *rejects, &entry)?;
            rejects.write_all(b"\n")?;
        }
        Ok(())
    }
}
