//! The immutable rule model: attributes and their capsules, obligation
//! declarations with activation conditions, data-rule containers with their
//! merge algebra, and flow rules. Serialisers (`dump`) live on the types; the
//! deserialisers are in [`crate::parser`].

pub mod activation;
pub mod attribute;
pub mod data_rule;
pub mod flow_rule;
pub mod ontology;
pub mod stage;

pub use activation::{ActivationCondition, Info};
pub use attribute::{Attribute, AttributeCapsule, AttributeRef, AttributeValue};
pub use data_rule::{
    ActivatedObligation, DataRuleContainer, ObligationDeclaration, PortedRules, RefRemap,
};
pub use flow_rule::{Action, FlowRule, default_flow};
pub use ontology::{ActionName, PrefixTable};
pub use stage::Stage;
