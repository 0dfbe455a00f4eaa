//! Append-only JSON log of activated obligations. Each entry pairs the
//! component URI with the action name and its resolved attributes; duplicates
//! are suppressed by value equality.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::error::{ProvaidError, Result};
use crate::reason::ActivatedObligations;
use crate::rule::{ActivatedObligation, Attribute, AttributeValue};

pub struct ObligationStore {
    filename: PathBuf,
    entries: Vec<(String, ActivatedObligation)>,
}

impl ObligationStore {
    /// Opens the store, loading any entries already in the file.
    pub fn new(filename: &Path) -> Result<ObligationStore> {
        let mut store = ObligationStore {
            filename: filename.to_path_buf(),
            entries: Vec::new(),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.entries.clear();
        let content = match fs::read_to_string(&self.filename) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let raw: Value = serde_json::from_str(&content)?;
        let list = raw.as_array().ok_or_else(|| log_error("not a list"))?;
        for item in list {
            self.entries.push(entry_from_value(item)?);
        }
        Ok(())
    }

    pub fn insert(&mut self, activated: &ActivatedObligations) {
        for (component, obligations) in activated {
            for obligation in obligations {
                let entry = (component.clone(), obligation.clone());
                if !self.entries.contains(&entry) {
                    self.entries.push(entry);
                }
            }
        }
    }

    pub fn write(&self) -> Result<()> {
        let raw: Vec<Value> = self.entries.iter().map(entry_to_value).collect();
        fs::write(&self.filename, serde_json::to_string(&raw)?)?;
        Ok(())
    }

    pub fn entries(&self) -> &[(String, ActivatedObligation)] {
        &self.entries
    }
}

fn log_error(reason: &str) -> ProvaidError {
    ProvaidError::MalformedRule {
        kind: "obligation log",
        reason: reason.to_string(),
    }
}

fn value_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Str(s) => json!(s),
        AttributeValue::Int(i) => json!(i),
        AttributeValue::Float(f) => json!(f.into_inner()),
    }
}

fn value_from_json(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::String(s) => Ok(AttributeValue::Str(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(AttributeValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(AttributeValue::float(f))
            } else {
                Err(log_error("attribute value is not representable"))
            }
        }
        _ => Err(log_error("attribute value is neither string nor number")),
    }
}

fn entry_to_value((component, obligation): &(String, ActivatedObligation)) -> Value {
    let attributes: Vec<Value> = obligation
        .attributes
        .iter()
        .map(|attr| json!([attr.name(), attr.type_tag(), value_to_json(attr.value())]))
        .collect();
    json!([component, [&obligation.action, attributes]])
}

fn entry_from_value(item: &Value) -> Result<(String, ActivatedObligation)> {
    let pair = item
        .as_array()
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| log_error("entry is not a pair"))?;
    let component = pair[0]
        .as_str()
        .ok_or_else(|| log_error("component is not a string"))?;
    let body = pair[1]
        .as_array()
        .filter(|body| body.len() == 2)
        .ok_or_else(|| log_error("obligation entry is not a pair"))?;
    let action = body[0]
        .as_str()
        .ok_or_else(|| log_error("action is not a string"))?;
    let mut attributes = Vec::new();
    for raw in body[1]
        .as_array()
        .ok_or_else(|| log_error("attributes are not a list"))?
    {
        let triple = raw
            .as_array()
            .filter(|triple| triple.len() == 3)
            .ok_or_else(|| log_error("attribute is not a triple"))?;
        let name = triple[0]
            .as_str()
            .ok_or_else(|| log_error("attribute name is not a string"))?;
        let type_tag = triple[1]
            .as_str()
            .ok_or_else(|| log_error("attribute type is not a string"))?;
        attributes.push(Attribute::new(name, type_tag, value_from_json(&triple[2])?));
    }
    Ok((
        component.to_string(),
        ActivatedObligation {
            action: action.to_string(),
            attributes,
        },
    ))
}
