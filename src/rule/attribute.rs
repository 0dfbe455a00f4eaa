use ordered_float::OrderedFloat;

/// JSON-escapes a string for the rule text format.
pub(crate) fn escaped(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// A scalar carried by an [`Attribute`] or matched by a flow-rule action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
}

impl AttributeValue {
    pub fn str(value: &str) -> AttributeValue {
        AttributeValue::Str(value.to_string())
    }

    pub fn float(value: f64) -> AttributeValue {
        AttributeValue::Float(OrderedFloat(value))
    }

    /// The raw textual form, used when a value is compared against entries of
    /// the contextual info map.
    pub fn as_text(&self) -> String {
        match self {
            AttributeValue::Str(s) => s.clone(),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Float(f) => dump_float(f.into_inner()),
        }
    }

    /// The form used in rule text. Strings are JSON-escaped, numbers are
    /// written so that re-parsing yields the same variant.
    pub fn dump(&self) -> String {
        match self {
            AttributeValue::Str(s) => escaped(s),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Float(f) => dump_float(f.into_inner()),
        }
    }
}

fn dump_float(f: f64) -> String {
    let s = f.to_string();
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        // keep the decimal point so the value parses back as a float
        format!("{s}.0")
    }
}

/// A named, typed scalar attached to a data rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    name: String,
    type_tag: String,
    value: AttributeValue,
}

impl Attribute {
    pub fn new(name: &str, type_tag: &str, value: AttributeValue) -> Attribute {
        Attribute {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }
}

/// Position of an [`Attribute`] inside the capsule of the given name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeRef {
    pub name: String,
    pub index: usize,
}

impl AttributeRef {
    pub fn new(name: &str, index: usize) -> AttributeRef {
        AttributeRef {
            name: name.to_string(),
            index,
        }
    }

    pub fn dump(&self) -> String {
        format!("{}[{}]", self.name, self.index)
    }
}

/// All positionally indexed attributes sharing one name. Positions are stable
/// and referenced by [`AttributeRef`]s; duplicate values are permitted until a
/// merge de-duplicates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCapsule {
    name: String,
    attrs: Vec<Attribute>,
}

impl AttributeCapsule {
    pub fn new(name: &str, attrs: Vec<Attribute>) -> AttributeCapsule {
        debug_assert!(attrs.iter().all(|a| a.name() == name));
        AttributeCapsule {
            name: name.to_string(),
            attrs,
        }
    }

    /// Builds a capsule from (type, value) pairs as produced by the parser.
    pub fn from_values(name: &str, values: Vec<(String, AttributeValue)>) -> AttributeCapsule {
        let attrs = values
            .into_iter()
            .map(|(type_tag, value)| Attribute::new(name, &type_tag, value))
            .collect();
        AttributeCapsule::new(name, attrs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.attrs.get(index)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    /// Unions `other` into a copy of `self`. The second return value maps each
    /// position of `other` to its position in the merged capsule.
    pub fn merge(&self, other: &AttributeCapsule) -> (AttributeCapsule, Vec<usize>) {
        debug_assert_eq!(self.name, other.name);
        let mut merged = self.clone();
        let mut remap = Vec::with_capacity(other.attrs.len());
        for attr in &other.attrs {
            match merged.attrs.iter().position(|existing| existing == attr) {
                Some(index) => remap.push(index),
                None => {
                    merged.attrs.push(attr.clone());
                    remap.push(merged.attrs.len() - 1);
                }
            }
        }
        (merged, remap)
    }

    pub fn dump(&self) -> String {
        let attrs = self
            .attrs
            .iter()
            .map(|a| format!("{} {}", escaped(a.type_tag()), a.value().dump()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("attribute({}, [{}]).", self.name, attrs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Attribute, AttributeCapsule, AttributeValue};

    fn capsule(name: &str, values: &[&str]) -> AttributeCapsule {
        AttributeCapsule::new(
            name,
            values
                .iter()
                .map(|v| Attribute::new(name, "str", AttributeValue::str(v)))
                .collect(),
        )
    }

    #[test]
    fn clone_equals() {
        let pc = capsule("pr1", &["b", "a", "c"]);
        assert_eq!(pc.clone(), pc);
    }

    #[test]
    fn merge_deduplicates_and_remaps() {
        let first = capsule("pr1", &["a"]);
        let second = capsule("pr1", &["b", "a", "c"]);
        let (merged, remap) = first.merge(&second);
        assert_eq!(merged, capsule("pr1", &["a", "b", "c"]));
        assert_eq!(remap, vec![1, 0, 2]);
    }

    #[test]
    fn value_dump_keeps_variant() {
        assert_eq!(AttributeValue::str("UoE").dump(), "\"UoE\"");
        assert_eq!(AttributeValue::Int(42).dump(), "42");
        assert_eq!(AttributeValue::float(1.0).dump(), "1.0");
        assert_eq!(AttributeValue::float(2.5).dump(), "2.5");
    }
}
