use serde::Serialize;
use std::fmt;

use crate::utils::error::ModbusError;

/// A single decoded reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: &'static str,
    pub unit: &'static str,
    pub value: Value,
}

impl Field {
    /// Name as shown to people: underscores become spaces.
    pub fn display_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

/// Ordered readings of one battery, in the order the profile produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TelemetryRecord {
    fields: Vec<Field>,
}

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, unit: &'static str, value: Value) -> Self {
        self.push(name, unit, value);
        self
    }

    pub fn push(&mut self, name: &'static str, unit: &'static str, value: Value) {
        self.fields.push(Field { name, unit, value });
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Register decoding helpers shared by the battery profiles.

pub(crate) fn require_len(registers: &[u16], expected: usize, block: &str) -> Result<(), ModbusError> {
    if registers.len() < expected {
        return Err(ModbusError::InvalidData(format!(
            "{} block needs {} registers, got {}",
            block,
            expected,
            registers.len()
        )));
    }
    Ok(())
}

/// `raw / divisor`, so 5321 / 100 shows as 53.21.
pub(crate) fn scaled(raw: i64, divisor: f64) -> Value {
    Value::Float(raw as f64 / divisor)
}

pub(crate) fn signed(register: u16) -> i64 {
    register as i16 as i64
}

pub(crate) fn u32_be(high: u16, low: u16) -> u64 {
    ((high as u64) << 16) | low as u64
}

pub(crate) fn flags(register: u16) -> Value {
    Value::Text(format!("0x{:04X}", register))
}

/// ASCII packed two characters per register, high byte first.
pub(crate) fn ascii(registers: &[u16]) -> Value {
    let text: String = registers
        .iter()
        .flat_map(|r| r.to_be_bytes())
        .take_while(|&b| b != 0)
        .filter(|b| b.is_ascii_graphic() || *b == b' ')
        .map(char::from)
        .collect();
    Value::Text(text.trim().to_string())
}
