use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{ProvaidError, Result};
use crate::rule::{
    ActionName, ActivationCondition, AttributeCapsule, AttributeRef, AttributeValue,
    DataRuleContainer, ObligationDeclaration,
};

#[derive(Parser)]
#[grammar = "parser/data_rule.pest"]
struct DataRuleParser;

fn malformed(reason: impl ToString) -> ProvaidError {
    ProvaidError::MalformedRule {
        kind: "data",
        reason: reason.to_string(),
    }
}

fn unexpected(pair: &Pair<Rule>) -> ProvaidError {
    ProvaidError::IllegalCase(format!(
        "unexpected {:?} while building a data rule",
        pair.as_rule()
    ))
}

/// Parses the text form of a [`DataRuleContainer`]. The container invariants
/// (unique capsule names, resolvable references) are checked on construction,
/// so dangling references surface here as errors.
pub fn parse_data_rule(text: &str) -> Result<DataRuleContainer> {
    let mut parsed =
        DataRuleParser::parse(Rule::data_rule, text).map_err(|e| malformed(e.to_string()))?;
    let root = parsed
        .next()
        .ok_or_else(|| malformed("empty parse result"))?;

    let mut obligations = Vec::new();
    let mut capsules = Vec::new();
    for stmt in root.into_inner() {
        match stmt.as_rule() {
            Rule::obligation_decl => obligations.push(build_obligation(stmt)?),
            Rule::attribute_decl => capsules.push(build_capsule(stmt)?),
            Rule::EOI => {}
            _ => return Err(unexpected(&stmt)),
        }
    }
    DataRuleContainer::new(obligations, capsules)
}

/// Parses a standalone activation-condition expression (`null` for never).
pub fn parse_activation_condition(text: &str) -> Result<ActivationCondition> {
    let mut parsed = DataRuleParser::parse(Rule::activation_condition, text)
        .map_err(|e| malformed(e.to_string()))?;
    let root = parsed
        .next()
        .ok_or_else(|| malformed("empty parse result"))?;
    build_condition(root)
}

fn build_obligation(pair: Pair<Rule>) -> Result<ObligationDeclaration> {
    let mut action = None;
    let mut validity = Vec::new();
    let mut args = Vec::new();
    let mut condition = ActivationCondition::Never;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::obligated_action => {
                for inner in part.into_inner() {
                    match inner.as_rule() {
                        Rule::action_ref => action = Some(build_action_ref(inner)?),
                        Rule::attribute_reference => validity.push(build_reference(inner)?),
                        _ => return Err(unexpected(&inner)),
                    }
                }
            }
            Rule::argument_list => {
                for inner in part.into_inner() {
                    args.push(build_reference(inner)?);
                }
            }
            Rule::activation_condition => condition = build_condition(part)?,
            _ => return Err(unexpected(&part)),
        }
    }
    let action = action.ok_or_else(|| malformed("obligation without an action"))?;
    Ok(ObligationDeclaration::new(action, args, validity, condition))
}

fn build_action_ref(pair: Pair<Rule>) -> Result<ActionName> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty action reference"))?;
    let raw = match inner.as_rule() {
        Rule::string => unescape(inner.as_str())?,
        Rule::qualified_name => inner.as_str().to_string(),
        _ => return Err(unexpected(&inner)),
    };
    ActionName::parse(&raw)
}

fn build_reference(pair: Pair<Rule>) -> Result<AttributeRef> {
    let mut name = String::new();
    let mut index = 0;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = inner.as_str().to_string(),
            Rule::index => {
                index = inner
                    .as_str()
                    .parse()
                    .map_err(|e| malformed(format!("attribute index: {e}")))?;
            }
            _ => return Err(unexpected(&inner)),
        }
    }
    Ok(AttributeRef::new(&name, index))
}

fn build_capsule(pair: Pair<Rule>) -> Result<AttributeCapsule> {
    let mut name = String::new();
    let mut values = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = inner.as_str().to_string(),
            Rule::attribute_values => {
                for entry in inner.into_inner() {
                    values.push(build_attribute_value(entry)?);
                }
            }
            _ => return Err(unexpected(&inner)),
        }
    }
    Ok(AttributeCapsule::from_values(&name, values))
}

fn build_attribute_value(pair: Pair<Rule>) -> Result<(String, AttributeValue)> {
    let mut type_tag = String::new();
    let mut value = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::attribute_type => type_tag = build_type_tag(inner)?,
            Rule::value => value = Some(build_value(inner)?),
            _ => return Err(unexpected(&inner)),
        }
    }
    let value = value.ok_or_else(|| malformed("attribute without a value"))?;
    Ok((type_tag, value))
}

fn build_type_tag(pair: Pair<Rule>) -> Result<String> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty attribute type"))?;
    match inner.as_rule() {
        Rule::string => unescape(inner.as_str()),
        Rule::identifier => Ok(inner.as_str().to_string()),
        _ => Err(unexpected(&inner)),
    }
}

fn build_value(pair: Pair<Rule>) -> Result<AttributeValue> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty value"))?;
    match inner.as_rule() {
        Rule::string => Ok(AttributeValue::Str(unescape(inner.as_str())?)),
        Rule::integer => inner
            .as_str()
            .parse()
            .map(AttributeValue::Int)
            .map_err(|e| malformed(format!("integer value: {e}"))),
        Rule::float => inner
            .as_str()
            .parse()
            .map(AttributeValue::float)
            .map_err(|e| malformed(format!("float value: {e}"))),
        _ => Err(unexpected(&inner)),
    }
}

fn build_condition(pair: Pair<Rule>) -> Result<ActivationCondition> {
    match pair.as_rule() {
        Rule::activation_condition => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| malformed("empty activation condition"))?;
            build_condition(inner)
        }
        Rule::disjunction => {
            let mut children = pair
                .into_inner()
                .map(build_condition)
                .collect::<Result<Vec<_>>>()?;
            if children.len() == 1 {
                Ok(children.remove(0))
            } else {
                Ok(ActivationCondition::Or(children))
            }
        }
        Rule::conjunction => {
            let mut children = pair
                .into_inner()
                .map(build_condition)
                .collect::<Result<Vec<_>>>()?;
            if children.len() == 1 {
                Ok(children.remove(0))
            } else {
                Ok(ActivationCondition::And(children))
            }
        }
        Rule::unary | Rule::group => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| malformed("empty condition expression"))?;
            build_condition(inner)
        }
        Rule::negation => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| malformed("empty negation"))?;
            Ok(ActivationCondition::Not(Box::new(build_condition(inner)?)))
        }
        Rule::null_kw => Ok(ActivationCondition::Never),
        Rule::comparison => build_comparison(pair),
        _ => Err(unexpected(&pair)),
    }
}

fn build_comparison(pair: Pair<Rule>) -> Result<ActivationCondition> {
    let mut slot = String::new();
    let mut operator = "";
    let mut value = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::slot => slot = inner.as_str().to_string(),
            Rule::operator => operator = if inner.as_str() == "!=" { "!=" } else { "=" },
            Rule::condition_value => {
                let entry = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| malformed("empty comparison value"))?;
                match entry.as_rule() {
                    Rule::any => value = None,
                    Rule::value => value = Some(build_value(entry)?),
                    _ => return Err(unexpected(&entry)),
                }
            }
            _ => return Err(unexpected(&inner)),
        }
    }
    if operator == "!=" {
        Ok(ActivationCondition::not_equal(&slot, value))
    } else {
        Ok(ActivationCondition::equal(&slot, value))
    }
}

pub(super) fn unescape(quoted: &str) -> Result<String> {
    serde_json::from_str(quoted).map_err(|e| malformed(format!("string literal {quoted}: {e}")))
}
