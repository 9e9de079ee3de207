//! Parameter codec
//!
//! Builds dotted parameter addresses (`varid[.mv[.window[.layer]]]`) and
//! normalizes the loosely typed replies of the device API into
//! [`DeviceValue`]s, once, at the client boundary.

use super::varid::{Arity, FieldKind, VarId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A single addressable parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterAddress {
    varid: VarId,
    indices: Vec<u32>,
}

impl ParameterAddress {
    /// Build an address, validating arity and index bounds
    pub fn new(varid: VarId, indices: &[u32]) -> Result<Self> {
        let arity = varid.arity();
        if indices.len() != arity.segments() {
            return Err(Error::Validation(format!(
                "VarID {} takes {} index segment(s), got {}",
                varid,
                arity.segments(),
                indices.len()
            )));
        }

        for (index, bound) in indices.iter().zip(arity.bounds()) {
            if index >= bound {
                return Err(Error::Validation(format!(
                    "Index {} out of range for VarID {} (max {})",
                    index,
                    varid,
                    bound - 1
                )));
            }
        }

        Ok(Self {
            varid,
            indices: indices.to_vec(),
        })
    }

    pub fn system(varid: VarId) -> Result<Self> {
        Self::new(varid, &[])
    }

    pub fn mv(varid: VarId, mv: u32) -> Result<Self> {
        Self::new(varid, &[mv])
    }

    pub fn window(varid: VarId, mv: u32, window: u32) -> Result<Self> {
        Self::new(varid, &[mv, window])
    }

    pub fn umd(varid: VarId, mv: u32, window: u32, layer: u32) -> Result<Self> {
        Self::new(varid, &[mv, window, layer])
    }

    pub fn varid(&self) -> VarId {
        self.varid
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Multiviewer index, if the address is scoped to one
    pub fn mv_index(&self) -> Option<u32> {
        self.indices.first().copied()
    }

    /// Window index, if the address is scoped to one
    pub fn window_index(&self) -> Option<u32> {
        self.indices.get(1).copied()
    }

    /// UMD layer index, if the address is scoped to one
    pub fn layer_index(&self) -> Option<u32> {
        self.indices.get(2).copied()
    }

    /// Parse a dotted address. A trailing `@...` suffix (as echoed by the
    /// batched GET reply) is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.split('@').next().unwrap_or_default().trim();
        let mut parts = id.split('.');

        let varid: VarId = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Validation(format!("Empty parameter address: {:?}", raw)))?
            .parse()?;

        let indices = parts
            .map(|p| {
                p.parse::<u32>().map_err(|_| {
                    Error::Validation(format!("Invalid index segment {:?} in {:?}", p, raw))
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        Self::new(varid, &indices)
    }
}

impl fmt::Display for ParameterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.varid)?;
        for index in &self.indices {
            write!(f, ".{}", index)?;
        }
        Ok(())
    }
}

impl FromStr for ParameterAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Arity check helper used by the batch planner
pub(crate) fn is_umd_address(address: &ParameterAddress) -> bool {
    address.varid().arity() == Arity::UmdLayer
}

// ========================================
// Values
// ========================================

/// A normalized device value: integer or text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceValue {
    Int(i64),
    Text(String),
}

impl DeviceValue {
    /// Convert a JSON scalar. `null`, arrays and objects carry no value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            Value::Bool(b) => Some(DeviceValue::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(DeviceValue::Int(i)),
                None => Some(DeviceValue::Text(n.to_string())),
            },
            Value::String(s) => Some(DeviceValue::Text(s.clone())),
        }
    }

    /// Integer interpretation (text is parsed after trimming)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DeviceValue::Int(i) => Some(*i),
            DeviceValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// True for the empty string
    pub fn is_blank(&self) -> bool {
        matches!(self, DeviceValue::Text(s) if s.trim().is_empty())
    }

    /// Wire form (before percent-encoding)
    pub fn to_wire(&self) -> String {
        match self {
            DeviceValue::Int(i) => i.to_string(),
            DeviceValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<i64> for DeviceValue {
    fn from(v: i64) -> Self {
        DeviceValue::Int(v)
    }
}

impl From<&str> for DeviceValue {
    fn from(v: &str) -> Self {
        DeviceValue::Text(v.to_string())
    }
}

impl From<String> for DeviceValue {
    fn from(v: String) -> Self {
        DeviceValue::Text(v)
    }
}

/// Values returned by a batched GET, keyed by the requested addresses
pub type ParameterValues = HashMap<ParameterAddress, DeviceValue>;

/// Enable-flag normalization: absent, `""`, `0` and `"0"` are false.
/// Any other value must be numeric; it is enabled when it equals 1.
pub fn normalize_flag(value: Option<&DeviceValue>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(v) if v.is_blank() => Ok(false),
        Some(v) => v
            .as_int()
            .map(|i| i == 1)
            .ok_or_else(|| Error::Protocol(format!("Non-numeric enable flag: {:?}", v.to_wire()))),
    }
}

/// Numeric field normalization: absent and `""` become 0
pub fn normalize_int(value: Option<&DeviceValue>) -> Result<i64> {
    match value {
        None => Ok(0),
        Some(v) if v.is_blank() => Ok(0),
        Some(v) => v
            .as_int()
            .ok_or_else(|| Error::Protocol(format!("Expected integer, got {:?}", v.to_wire()))),
    }
}

/// Normalize a field to its canonical type. Numeric fields that fail to
/// parse are kept as text rather than dropped.
pub fn normalize_field(varid: VarId, value: Option<&DeviceValue>) -> DeviceValue {
    match varid.kind() {
        FieldKind::Text => DeviceValue::Text(value.map(DeviceValue::to_wire).unwrap_or_default()),
        FieldKind::Integer => match normalize_int(value) {
            Ok(i) => DeviceValue::Int(i),
            Err(_) => value.cloned().unwrap_or(DeviceValue::Int(0)),
        },
    }
}

// ========================================
// Response shapes
// ========================================

fn check_error_field(body: &Value) -> Result<()> {
    if let Some(err) = body.get("error") {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(Error::Protocol(format!("Device error: {}", message)));
    }
    Ok(())
}

/// Parse a single GET reply. Accepted shapes: `{"value": X}`,
/// `{"<address>": X}` or a bare scalar.
pub fn parse_single_response(
    address: &ParameterAddress,
    body: &Value,
) -> Result<Option<DeviceValue>> {
    check_error_field(body)?;

    match body {
        Value::Object(map) => {
            let key = address.to_string();
            Ok(map
                .get("value")
                .or_else(|| map.get(&key))
                .and_then(DeviceValue::from_json))
        }
        other => Ok(DeviceValue::from_json(other)),
    }
}

/// Parse a batched GET reply into raw `id -> value` pairs. Accepted shapes:
/// a list of `{id, value}` objects (ids may carry an `@` suffix) or a
/// direct address-to-value mapping.
pub fn parse_batch_response(body: &Value) -> Result<HashMap<String, DeviceValue>> {
    check_error_field(body)?;

    let mut out = HashMap::new();
    match body {
        Value::Array(items) => {
            for item in items {
                let id = item
                    .get("id")
                    .and_then(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .ok_or_else(|| Error::Protocol(format!("Batch item without id: {}", item)))?;
                let id = id.split('@').next().unwrap_or_default().trim().to_string();
                if let Some(value) = item.get("value").and_then(DeviceValue::from_json) {
                    out.insert(id, value);
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(value) = DeviceValue::from_json(value) {
                    let id = key.split('@').next().unwrap_or_default().trim().to_string();
                    out.insert(id, value);
                }
            }
        }
        other => {
            return Err(Error::Protocol(format!(
                "Unexpected batch reply shape: {}",
                other
            )))
        }
    }

    Ok(out)
}

/// Pick the requested addresses out of a parsed batch reply
pub fn select_values(
    requested: &[ParameterAddress],
    raw: &HashMap<String, DeviceValue>,
) -> ParameterValues {
    requested
        .iter()
        .filter_map(|a| raw.get(&a.to_string()).map(|v| (a.clone(), v.clone())))
        .collect()
}
