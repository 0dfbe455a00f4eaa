use std::collections::HashMap;

use linked_hash_map::LinkedHashMap;

use crate::error::{ProvaidError, Result};

use super::activation::{ActivationCondition, Info};
use super::attribute::{Attribute, AttributeCapsule, AttributeRef};
use super::ontology::{ActionName, PrefixTable};
use super::stage::Stage;

/// Rule containers keyed by port name.
pub type PortedRules = LinkedHashMap<String, DataRuleContainer>;

/// Maps, per capsule name, an old attribute index to its index after a merge
/// or deletion.
pub type RefRemap = HashMap<String, Vec<usize>>;

/// A materialized obligation trigger: the fully qualified action together with
/// the resolved argument attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedObligation {
    pub action: String,
    pub attributes: Vec<Attribute>,
}

/// Declares that some action must be taken once the activation condition is
/// met. The declaration itself is stateless; argument and validity-binding
/// references point into the capsules of the enclosing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObligationDeclaration {
    action: ActionName,
    args: Vec<AttributeRef>,
    validity: Vec<AttributeRef>,
    condition: ActivationCondition,
}

impl ObligationDeclaration {
    pub fn new(
        action: ActionName,
        args: Vec<AttributeRef>,
        validity: Vec<AttributeRef>,
        condition: ActivationCondition,
    ) -> ObligationDeclaration {
        ObligationDeclaration {
            action,
            args,
            validity,
            condition,
        }
    }

    pub fn action(&self) -> &ActionName {
        &self.action
    }

    pub fn args(&self) -> &[AttributeRef] {
        &self.args
    }

    pub fn validity(&self) -> &[AttributeRef] {
        &self.validity
    }

    pub fn condition(&self) -> &ActivationCondition {
        &self.condition
    }

    pub fn references(&self) -> impl Iterator<Item = &AttributeRef> {
        self.args.iter().chain(self.validity.iter())
    }

    /// Rewrites all attribute references through `remap`. References into
    /// capsules without a remapping entry are left untouched.
    pub fn remapped(&self, remap: &RefRemap) -> ObligationDeclaration {
        let map_refs = |refs: &[AttributeRef]| {
            refs.iter()
                .map(|r| match remap.get(&r.name).and_then(|m| m.get(r.index)) {
                    Some(new_index) => AttributeRef::new(&r.name, *new_index),
                    None => r.clone(),
                })
                .collect()
        };
        ObligationDeclaration {
            action: self.action.clone(),
            args: map_refs(&self.args),
            validity: map_refs(&self.validity),
            condition: self.condition.clone(),
        }
    }

    pub fn dump(&self) -> String {
        let mut action = self.action.dump();
        for r in &self.validity {
            action.push(' ');
            action.push_str(&r.dump());
        }
        let args = self
            .args
            .iter()
            .map(AttributeRef::dump)
            .collect::<Vec<_>>()
            .join(", ");
        let condition = self
            .condition
            .dump()
            .unwrap_or_else(|| "null".to_string());
        format!("obligation({action}, [{args}], {condition}).")
    }
}

/// The unit of rule state carried on a port or data item: a bundle of
/// obligation declarations plus the attribute capsules they reference.
/// Immutable once constructed; merge produces a new container.
#[derive(Debug, Clone, Eq)]
pub struct DataRuleContainer {
    obligations: Vec<ObligationDeclaration>,
    capsules: Vec<AttributeCapsule>,
}

impl DataRuleContainer {
    /// Builds a container and checks its invariants: capsule names are unique
    /// and every obligation reference resolves.
    pub fn new(
        obligations: Vec<ObligationDeclaration>,
        capsules: Vec<AttributeCapsule>,
    ) -> Result<DataRuleContainer> {
        for (i, capsule) in capsules.iter().enumerate() {
            if capsules[..i].iter().any(|c| c.name() == capsule.name()) {
                return Err(ProvaidError::DuplicateCapsule(capsule.name().to_string()));
            }
        }
        let container = DataRuleContainer {
            obligations,
            capsules,
        };
        for ob in &container.obligations {
            for r in ob.references() {
                if container.resolve(r).is_none() {
                    return Err(ProvaidError::DanglingReference {
                        name: r.name.clone(),
                        index: r.index,
                    });
                }
            }
        }
        Ok(container)
    }

    pub fn empty() -> DataRuleContainer {
        DataRuleContainer {
            obligations: Vec::new(),
            capsules: Vec::new(),
        }
    }

    // Internal constructor for operations that preserve the invariants.
    pub(crate) fn from_parts(
        obligations: Vec<ObligationDeclaration>,
        capsules: Vec<AttributeCapsule>,
    ) -> DataRuleContainer {
        DataRuleContainer {
            obligations,
            capsules,
        }
    }

    pub fn obligations(&self) -> &[ObligationDeclaration] {
        &self.obligations
    }

    pub fn capsules(&self) -> &[AttributeCapsule] {
        &self.capsules
    }

    pub fn capsule(&self, name: &str) -> Option<&AttributeCapsule> {
        self.capsules.iter().find(|c| c.name() == name)
    }

    pub fn resolve(&self, reference: &AttributeRef) -> Option<&Attribute> {
        self.capsule(&reference.name)
            .and_then(|c| c.get(reference.index))
    }

    /// Canonical union of rule containers, used at fan-in points.
    ///
    /// Attributes keep their first-seen insertion order and are de-duplicated
    /// by value equality; obligation references are rewritten accordingly and
    /// structurally equal obligations collapse into one.
    pub fn merge<'a>(
        containers: impl IntoIterator<Item = &'a DataRuleContainer>,
    ) -> DataRuleContainer {
        let mut attrs: LinkedHashMap<String, Vec<Attribute>> = LinkedHashMap::new();
        let mut obligations: Vec<ObligationDeclaration> = Vec::new();

        for container in containers {
            let mut remap: RefRemap = RefRemap::new();
            for capsule in &container.capsules {
                let merged = attrs.entry(capsule.name().to_string()).or_insert_with(Vec::new);
                let mapping = remap.entry(capsule.name().to_string()).or_default();
                for attr in capsule.iter() {
                    match merged.iter().position(|existing| existing == attr) {
                        Some(index) => mapping.push(index),
                        None => {
                            merged.push(attr.clone());
                            mapping.push(merged.len() - 1);
                        }
                    }
                }
            }
            for ob in &container.obligations {
                let moved = ob.remapped(&remap);
                if !obligations.contains(&moved) {
                    obligations.push(moved);
                }
            }
        }

        let capsules = attrs
            .into_iter()
            .map(|(name, attrs)| AttributeCapsule::new(&name, attrs))
            .collect();
        DataRuleContainer {
            obligations,
            capsules,
        }
    }

    /// Evaluates all obligations against `(stage, function, info)` and emits
    /// the activated ones with their arguments resolved, in declaration order.
    pub fn on_stage(
        &self,
        stage: Stage,
        function: Option<&str>,
        info: &Info,
        prefixes: &PrefixTable,
    ) -> Result<Vec<ActivatedObligation>> {
        let mut activated = Vec::new();
        for ob in &self.obligations {
            if !ob.condition().is_met(stage, function, info) {
                continue;
            }
            let mut attributes = Vec::with_capacity(ob.args().len());
            for r in ob.args() {
                let attr = self
                    .resolve(r)
                    .ok_or_else(|| ProvaidError::DanglingReference {
                        name: r.name.clone(),
                        index: r.index,
                    })?;
                attributes.push(attr.clone());
            }
            activated.push(ActivatedObligation {
                action: ob.action().fully_qualified(prefixes)?,
                attributes,
            });
        }
        Ok(activated)
    }

    pub fn dump(&self) -> String {
        let mut s = String::from("begin\n");
        for ob in &self.obligations {
            s.push_str(&ob.dump());
            s.push('\n');
        }
        for capsule in &self.capsules {
            s.push_str(&capsule.dump());
            s.push('\n');
        }
        s.push_str("end\n");
        s
    }

    pub fn summary(&self) -> String {
        format!(
            "{} obligations, {} attributes",
            self.obligations.len(),
            self.capsules.len()
        )
    }
}

// Containers compare as a multiset of obligations plus a multiset of
// capsules, independent of declaration order.
impl PartialEq for DataRuleContainer {
    fn eq(&self, other: &Self) -> bool {
        same_multiset(&self.obligations, &other.obligations)
            && same_multiset(&self.capsules, &other.capsules)
    }
}

fn same_multiset<T: PartialEq>(left: &[T], right: &[T]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().all(|item| {
        let in_left = left.iter().filter(|other| *other == item).count();
        let in_right = right.iter().filter(|other| *other == item).count();
        in_left == in_right
    })
}
