use std::collections::BTreeMap;

use super::attribute::AttributeValue;
use super::stage::Stage;

/// Contextual key-value pairs an activation condition can look at, e.g.
/// `user`, `purpose` or `processId`.
pub type Info = BTreeMap<String, String>;

/// The predicate deciding whether an obligation triggers at a given stage,
/// invoked function and context. Evaluation is pure and never fails.
///
/// A comparison value of `None` stands for the wildcard `*` ("any").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationCondition {
    Never,
    Equal {
        slot: String,
        value: Option<AttributeValue>,
    },
    NotEqual {
        slot: String,
        value: Option<AttributeValue>,
    },
    And(Vec<ActivationCondition>),
    Or(Vec<ActivationCondition>),
    Not(Box<ActivationCondition>),
}

impl ActivationCondition {
    pub fn equal(slot: &str, value: Option<AttributeValue>) -> ActivationCondition {
        ActivationCondition::Equal {
            slot: slot.to_string(),
            value,
        }
    }

    pub fn not_equal(slot: &str, value: Option<AttributeValue>) -> ActivationCondition {
        ActivationCondition::NotEqual {
            slot: slot.to_string(),
            value,
        }
    }

    pub fn is_met(&self, stage: Stage, function: Option<&str>, info: &Info) -> bool {
        match self {
            ActivationCondition::Never => false,
            ActivationCondition::Equal { slot, value } => match slot.as_str() {
                "action" => match value {
                    Some(v) => function == Some(v.as_text().as_str()),
                    None => function.is_some(),
                },
                "stage" => match value {
                    Some(v) => stage.as_ref() == v.as_text(),
                    None => true,
                },
                key => match value {
                    Some(v) => info.get(key).is_some_and(|found| *found == v.as_text()),
                    None => info.contains_key(key),
                },
            },
            ActivationCondition::NotEqual { slot, value } => match slot.as_str() {
                "action" => match value {
                    Some(v) => function != Some(v.as_text().as_str()),
                    None => function.is_none(),
                },
                "stage" => match value {
                    Some(v) => stage.as_ref() != v.as_text(),
                    None => false,
                },
                key => match value {
                    Some(v) => info.get(key).is_some_and(|found| *found != v.as_text()),
                    None => info.contains_key(key),
                },
            },
            ActivationCondition::And(children) => {
                children.iter().all(|c| c.is_met(stage, function, info))
            }
            ActivationCondition::Or(children) => {
                children.iter().any(|c| c.is_met(stage, function, info))
            }
            ActivationCondition::Not(inner) => !inner.is_met(stage, function, info),
        }
    }

    /// The rule-text form, or `None` for [`ActivationCondition::Never`]
    /// (written as `null`).
    pub fn dump(&self) -> Option<String> {
        match self {
            ActivationCondition::Never => None,
            _ => Some(self.dump_expr()),
        }
    }

    fn dump_expr(&self) -> String {
        match self {
            ActivationCondition::Never => "null".to_string(),
            ActivationCondition::Equal { slot, value } => {
                format!("{slot} = {}", dump_value(value))
            }
            ActivationCondition::NotEqual { slot, value } => {
                format!("{slot} != {}", dump_value(value))
            }
            ActivationCondition::And(children) => children
                .iter()
                .map(|c| c.dump_operand(true))
                .collect::<Vec<_>>()
                .join(" && "),
            ActivationCondition::Or(children) => children
                .iter()
                .map(|c| c.dump_operand(false))
                .collect::<Vec<_>>()
                .join(" || "),
            ActivationCondition::Not(inner) => match inner.as_ref() {
                ActivationCondition::And(_) | ActivationCondition::Or(_) => {
                    format!("!({})", inner.dump_expr())
                }
                _ => format!("!{}", inner.dump_expr()),
            },
        }
    }

    fn dump_operand(&self, inside_and: bool) -> String {
        match self {
            // `&&` binds tighter than `||`, so a disjunction below a
            // conjunction needs parentheses
            ActivationCondition::Or(_) if inside_and => format!("({})", self.dump_expr()),
            _ => self.dump_expr(),
        }
    }
}

fn dump_value(value: &Option<AttributeValue>) -> String {
    match value {
        Some(v) => v.dump(),
        None => "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::stage::Stage::{Finished, Imported, Processing};
    use super::{ActivationCondition, Info};
    use crate::rule::AttributeValue;

    fn eq(slot: &str, value: &str) -> ActivationCondition {
        ActivationCondition::equal(slot, Some(AttributeValue::str(value)))
    }

    fn neq(slot: &str, value: &str) -> ActivationCondition {
        ActivationCondition::not_equal(slot, Some(AttributeValue::str(value)))
    }

    fn eq_any(slot: &str) -> ActivationCondition {
        ActivationCondition::equal(slot, None)
    }

    fn neq_any(slot: &str) -> ActivationCondition {
        ActivationCondition::not_equal(slot, None)
    }

    #[test]
    fn equal_on_action_and_stage() {
        let info = Info::new();
        let on_publish = eq("action", "publish");
        let on_any = eq_any("action");
        let when_import = eq("stage", "import");

        assert!(on_publish.is_met(Processing, Some("publish"), &info));
        assert!(!on_publish.is_met(Processing, Some("average"), &info));
        assert!(on_any.is_met(Processing, Some("publish"), &info));
        assert!(on_any.is_met(Processing, Some("average"), &info));
        assert!(!on_any.is_met(Processing, None, &info));
        assert!(when_import.is_met(Imported, Some("test"), &info));
        assert!(!when_import.is_met(Finished, Some("test"), &info));
        assert!(eq_any("stage").is_met(Finished, None, &info));
    }

    #[test]
    fn not_equal_on_action_and_stage() {
        let info = Info::new();
        let on_not_publish = neq("action", "publish");
        let when_not_import = neq("stage", "import");

        assert!(!on_not_publish.is_met(Processing, Some("publish"), &info));
        assert!(on_not_publish.is_met(Processing, Some("average"), &info));
        assert!(!neq_any("action").is_met(Processing, Some("publish"), &info));
        assert!(neq_any("action").is_met(Processing, None, &info));
        assert!(!when_not_import.is_met(Imported, Some("aaa"), &info));
        assert!(when_not_import.is_met(Finished, Some("aaa"), &info));
        assert!(!neq_any("stage").is_met(Finished, None, &info));
    }

    #[test]
    fn info_lookup() {
        let mut info = Info::new();
        info.insert("user".to_string(), "alice".to_string());

        assert!(eq("user", "alice").is_met(Processing, None, &info));
        assert!(!eq("user", "bob").is_met(Processing, None, &info));
        assert!(eq_any("user").is_met(Processing, None, &info));
        // a missing key never matches, with either operator
        assert!(!eq("purpose", "research").is_met(Processing, None, &info));
        assert!(!neq("purpose", "research").is_met(Processing, None, &info));
        assert!(!eq_any("purpose").is_met(Processing, None, &info));
        assert!(neq("user", "bob").is_met(Processing, None, &info));
        assert!(!neq("user", "alice").is_met(Processing, None, &info));
    }

    #[test]
    fn never_is_never_met() {
        let info = Info::new();
        for stage in [Imported, Processing, Finished] {
            assert!(!ActivationCondition::Never.is_met(stage, Some("publish"), &info));
            assert!(!ActivationCondition::Never.is_met(stage, None, &info));
        }
    }

    #[test]
    fn connectives() {
        let info = Info::new();
        let on_publish = eq("action", "publish");
        let when_import = eq("stage", "import");

        let both = ActivationCondition::And(vec![on_publish.clone(), when_import.clone()]);
        assert!(!both.is_met(Processing, Some("publish"), &info));
        assert!(both.is_met(Imported, Some("publish"), &info));
        assert!(!both.is_met(Imported, Some("average"), &info));

        let either = ActivationCondition::Or(vec![on_publish.clone(), when_import.clone()]);
        assert!(either.is_met(Processing, Some("publish"), &info));
        assert!(either.is_met(Imported, Some("average"), &info));
        assert!(!either.is_met(Processing, Some("average"), &info));

        let negated = ActivationCondition::Not(Box::new(on_publish));
        assert!(!negated.is_met(Processing, Some("publish"), &info));
        assert!(negated.is_met(Processing, Some("average"), &info));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let mut info = Info::new();
        info.insert("purpose".to_string(), "research".to_string());
        let ac = ActivationCondition::And(vec![eq("purpose", "research"), eq_any("action")]);
        let first = ac.is_met(Processing, Some("load"), &info);
        for _ in 0..3 {
            assert_eq!(ac.is_met(Processing, Some("load"), &info), first);
        }
    }

    #[test]
    fn dump_forms() {
        assert_eq!(ActivationCondition::Never.dump(), None);
        assert_eq!(
            eq("stage", "import").dump().unwrap(),
            "stage = \"import\"".to_string()
        );
        assert_eq!(
            neq("action", "publish").dump().unwrap(),
            "action != \"publish\"".to_string()
        );
        assert_eq!(eq_any("user").dump().unwrap(), "user = *".to_string());
        let nested = ActivationCondition::And(vec![
            ActivationCondition::Or(vec![eq("action", "publish"), eq("action", "share")]),
            eq("stage", "import"),
        ]);
        assert_eq!(
            nested.dump().unwrap(),
            "(action = \"publish\" || action = \"share\") && stage = \"import\""
        );
    }
}
