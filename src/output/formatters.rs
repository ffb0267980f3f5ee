use log::error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::devices::TelemetryRecord;
use crate::utils::error::ModbusError;

/// Sink for the records of one run. Batteries arrive one at a time:
/// `begin_device`, the primary record, the extended record if any, then
/// `end_device`.
pub trait ReportEmitter: Send {
    fn begin_device(&mut self, id: u8);
    fn emit(&mut self, record: &TelemetryRecord);
    fn end_device(&mut self, id: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub const NAMES: [&'static str; 2] = ["text", "json"];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }

    pub fn emitter<W: Write + Send + 'static>(self, out: W) -> Box<dyn ReportEmitter> {
        match self {
            OutputFormat::Text => Box::new(TextEmitter::new(out)),
            OutputFormat::Json => Box::new(JsonEmitter::new(out)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ModbusError::ConfigError(format!(
                "unknown output format '{}', expected one of {}",
                other,
                OutputFormat::NAMES.join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = ModbusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        format.as_str().to_string()
    }
}

/// Human readable report, one `name: value<unit>` line per field.
pub struct TextEmitter<W: Write> {
    out: W,
}

impl<W: Write> TextEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_text(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()) {
            error!("❌ Failed to write report: {}", e);
        }
    }
}

impl<W: Write + Send> ReportEmitter for TextEmitter<W> {
    fn begin_device(&mut self, id: u8) {
        self.write_text(&format!("Battery #{}\n===========\n", id));
    }

    fn emit(&mut self, record: &TelemetryRecord) {
        let mut output = String::new();
        for field in record.fields() {
            output.push_str(&format!("{}: {}{}\n", field.display_name(), field.value, field.unit));
        }
        self.write_text(&output);
    }

    fn end_device(&mut self, _id: u8) {
        self.write_text("\n");
        if let Err(e) = self.out.flush() {
            error!("❌ Failed to flush report: {}", e);
        }
    }
}

/// One JSON object per battery and line.
pub struct JsonEmitter<W: Write> {
    out: W,
    current: Option<(u8, Vec<JsonValue>)>,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out, current: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReportEmitter for JsonEmitter<W> {
    fn begin_device(&mut self, id: u8) {
        self.current = Some((id, Vec::new()));
    }

    fn emit(&mut self, record: &TelemetryRecord) {
        let Some((_, records)) = self.current.as_mut() else {
            error!("❌ Record emitted outside of a battery block");
            return;
        };
        match serde_json::to_value(record) {
            Ok(value) => records.push(value),
            Err(e) => error!("❌ Failed to serialize record: {}", e),
        }
    }

    fn end_device(&mut self, id: u8) {
        let records = match self.current.take() {
            Some((current, records)) if current == id => records,
            _ => Vec::new(),
        };
        let mut records = records.into_iter();
        let line = json!({
            "id": id,
            "info": records.next().unwrap_or(JsonValue::Null),
            "extra_info": records.next().unwrap_or(JsonValue::Null),
        });

        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            error!("❌ Failed to write report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Value;

    fn record() -> TelemetryRecord {
        TelemetryRecord::new()
            .with("voltage", "V", Value::Float(53.21))
            .with("max_charging_current", "A", Value::UInt(100))
            .with("model", "", Value::Text("LL-V2".to_string()))
    }

    #[test]
    fn test_text_emitter_block() {
        let mut emitter = TextEmitter::new(Vec::new());
        emitter.begin_device(3);
        emitter.emit(&record());
        emitter.end_device(3);

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(
            text,
            "Battery #3\n===========\nvoltage: 53.21V\nmax charging current: 100A\nmodel: LL-V2\n\n"
        );
    }

    #[test]
    fn test_json_emitter_line() {
        let mut emitter = JsonEmitter::new(Vec::new());
        emitter.begin_device(7);
        emitter.emit(&record());
        emitter.end_device(7);

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let line: JsonValue = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(line["id"], 7);
        assert_eq!(line["info"][0]["name"], "voltage");
        assert_eq!(line["info"][0]["value"], 53.21);
        assert_eq!(line["info"][2]["value"], "LL-V2");
        assert!(line["extra_info"].is_null());
    }

    #[test]
    fn test_json_emitter_with_extra_info() {
        let mut emitter = JsonEmitter::new(Vec::new());
        emitter.begin_device(2);
        emitter.emit(&record());
        emitter.emit(&TelemetryRecord::new().with("serial", "", Value::Text("SN042".to_string())));
        emitter.end_device(2);
        emitter.begin_device(3);
        emitter.emit(&record());
        emitter.end_device(3);

        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<JsonValue> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 2);
        assert_eq!(lines[0]["info"][1]["name"], "max_charging_current");
        assert_eq!(lines[0]["extra_info"][0]["name"], "serial");
        assert_eq!(lines[0]["extra_info"][0]["value"], "SN042");
        assert_eq!(lines[1]["id"], 3);
        assert!(lines[1]["extra_info"].is_null());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
