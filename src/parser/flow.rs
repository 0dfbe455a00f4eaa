use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::{ProvaidError, Result};
use crate::rule::{Action, AttributeValue, FlowRule};

use super::data::unescape;

#[derive(Parser)]
#[grammar = "parser/flow_rule.pest"]
struct FlowRuleParser;

fn malformed(reason: impl ToString) -> ProvaidError {
    ProvaidError::MalformedRule {
        kind: "flow",
        reason: reason.to_string(),
    }
}

fn unexpected(pair: &Pair<Rule>) -> ProvaidError {
    ProvaidError::IllegalCase(format!(
        "unexpected {:?} while building a flow rule",
        pair.as_rule()
    ))
}

/// Parses the text form of a [`FlowRule`]: a sequence of propagate, edit and
/// delete statements.
pub fn parse_flow_rule(text: &str) -> Result<FlowRule> {
    let mut parsed =
        FlowRuleParser::parse(Rule::flow_rule, text).map_err(|e| malformed(e.to_string()))?;
    let root = parsed
        .next()
        .ok_or_else(|| malformed("empty parse result"))?;

    let mut actions = Vec::new();
    for stmt in root.into_inner() {
        match stmt.as_rule() {
            Rule::propagate_stmt => actions.push(build_propagate(stmt)?),
            Rule::edit_stmt => actions.push(build_edit(stmt)?),
            Rule::delete_stmt => actions.push(build_delete(stmt)?),
            Rule::EOI => {}
            _ => return Err(unexpected(&stmt)),
        }
    }
    Ok(FlowRule::new(actions))
}

fn build_propagate(pair: Pair<Rule>) -> Result<Action> {
    let mut ports = pair
        .into_inner()
        .map(build_port)
        .collect::<Result<Vec<_>>>()?;
    if ports.len() < 2 {
        return Err(malformed("propagate needs an input and an output port"));
    }
    let input = ports.remove(0);
    Ok(Action::Propagate {
        input,
        outputs: ports,
    })
}

fn build_edit(pair: Pair<Rule>) -> Result<Action> {
    let mut input = None;
    let mut output = None;
    let mut name = None;
    let mut match_type = None;
    let mut match_value = None;
    let mut new_type = String::new();
    let mut new_value = None;
    let mut seen_ports = 0;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::port_pattern => {
                let port = build_port_pattern(inner)?;
                if seen_ports == 0 {
                    input = port;
                } else {
                    output = port;
                }
                seen_ports += 1;
            }
            Rule::name_pattern => name = build_name_pattern(inner)?,
            Rule::type_pattern => match_type = build_type_pattern(inner)?,
            Rule::value_pattern => match_value = build_value_pattern(inner)?,
            Rule::attribute_type => new_type = build_type(inner)?,
            Rule::value => new_value = Some(build_value(inner)?),
            _ => return Err(unexpected(&inner)),
        }
    }
    let new_value = new_value.ok_or_else(|| malformed("edit without a replacement value"))?;
    Ok(Action::Edit {
        new_type,
        new_value,
        input,
        output,
        name,
        match_type,
        match_value,
    })
}

fn build_delete(pair: Pair<Rule>) -> Result<Action> {
    let mut input = None;
    let mut output = None;
    let mut name = None;
    let mut match_type = None;
    let mut match_value = None;
    let mut seen_ports = 0;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::port_pattern => {
                let port = build_port_pattern(inner)?;
                if seen_ports == 0 {
                    input = port;
                } else {
                    output = port;
                }
                seen_ports += 1;
            }
            Rule::name_pattern => name = build_name_pattern(inner)?,
            Rule::type_pattern => match_type = build_type_pattern(inner)?,
            Rule::value_pattern => match_value = build_value_pattern(inner)?,
            _ => return Err(unexpected(&inner)),
        }
    }
    Ok(Action::Delete {
        input,
        output,
        name,
        match_type,
        match_value,
    })
}

fn build_port(pair: Pair<Rule>) -> Result<String> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty port name"))?;
    match inner.as_rule() {
        Rule::string => unescape(inner.as_str()),
        Rule::identifier => Ok(inner.as_str().to_string()),
        _ => Err(unexpected(&inner)),
    }
}

fn build_port_pattern(pair: Pair<Rule>) -> Result<Option<String>> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty port pattern"))?;
    match inner.as_rule() {
        Rule::any => Ok(None),
        Rule::port => build_port(inner).map(Some),
        _ => Err(unexpected(&inner)),
    }
}

fn build_name_pattern(pair: Pair<Rule>) -> Result<Option<String>> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty attribute name pattern"))?;
    match inner.as_rule() {
        Rule::any => Ok(None),
        Rule::identifier => Ok(Some(inner.as_str().to_string())),
        _ => Err(unexpected(&inner)),
    }
}

fn build_type_pattern(pair: Pair<Rule>) -> Result<Option<String>> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty attribute type pattern"))?;
    match inner.as_rule() {
        Rule::any => Ok(None),
        Rule::attribute_type => build_type(inner).map(Some),
        _ => Err(unexpected(&inner)),
    }
}

fn build_value_pattern(pair: Pair<Rule>) -> Result<Option<AttributeValue>> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| malformed("empty attribute value pattern"))?;
    match inner.as_rule() {
        Rule::any => Ok(None),
        Rule::value => build_value(inner).map(Some),
        _ => Err(unexpected(&inner)),
    }
}

fn build_type(pair: Pair<Rule>) -> Result<String> {
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
