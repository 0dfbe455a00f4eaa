//! Deserialisers for the two rule text formats. Each `parse_*` function is
//! the inverse of the corresponding `dump` on the model types.

mod data;
mod flow;

pub use data::{parse_activation_condition, parse_data_rule};
pub use flow::parse_flow_rule;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::rule::{
        Action, ActionName, ActivationCondition, Attribute, AttributeCapsule, AttributeRef,
        AttributeValue, DataRuleContainer, FlowRule, ObligationDeclaration,
    };

    use super::{parse_activation_condition, parse_data_rule, parse_flow_rule};

    fn str_capsule(name: &str, values: &[&str]) -> AttributeCapsule {
        AttributeCapsule::new(
            name,
            values
                .iter()
                .map(|v| Attribute::new(name, "str", AttributeValue::str(v)))
                .collect(),
        )
    }

    fn obligation(action: &str, refs: &[(&str, usize)]) -> ObligationDeclaration {
        ObligationDeclaration::new(
            ActionName::parse(action).unwrap(),
            refs.iter()
                .map(|(name, index)| AttributeRef::new(name, *index))
                .collect(),
            Vec::new(),
            ActivationCondition::Never,
        )
    }

    #[test]
    fn empty_rule() {
        let parsed = parse_data_rule("begin\nend").unwrap();
        assert_eq!(parsed, DataRuleContainer::empty());
    }

    #[test]
    fn simple_obligations() {
        let parsed = parse_data_rule(
            r#"begin
            obligation(ob1, [], null).
            obligation(ob2, [], null).
            end"#,
        )
        .unwrap();
        let expected = DataRuleContainer::new(
            vec![obligation("ob1", &[]), obligation("ob2", &[])],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn obligation_with_attribute() {
        let parsed = parse_data_rule(
            r#"begin
            obligation(ob1, [pr1], null).
            attribute(pr1, "str" "ddd").
            end"#,
        )
        .unwrap();
        let expected = DataRuleContainer::new(
            vec![obligation("ob1", &[("pr1", 0)])],
            vec![str_capsule("pr1", &["ddd"])],
        )
        .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn surplus_whitespace_is_accepted() {
        let parsed = parse_data_rule(
            r#"
            begin

                obligation (ob1, [], null).

                obligation ( ob2, [pr1], null).

                attribute (pr1, "str" "www")  .

            end"#,
        )
        .unwrap();
        let expected = DataRuleContainer::new(
            vec![obligation("ob1", &[]), obligation("ob2", &[("pr1", 0)])],
            vec![str_capsule("pr1", &["www"])],
        )
        .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn indexed_references() {
        let parsed = parse_data_rule(
            r#"begin
            obligation (ob1, [pr1[0]], null) .
            obligation (ob2, [pr1[1]], null) .
            attribute (pr1, ["str" 1, "str" 2]) .
            end"#,
        )
        .unwrap();
        let expected = DataRuleContainer::new(
            vec![
                obligation("ob1", &[("pr1", 0)]),
                obligation("ob2", &[("pr1", 1)]),
            ],
            vec![AttributeCapsule::from_values(
                "pr1",
                vec![
                    ("str".to_string(), AttributeValue::Int(1)),
                    ("str".to_string(), AttributeValue::Int(2)),
                ],
            )],
        )
        .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn dangling_reference_is_an_error() {
        let result = parse_data_rule(
            r#"begin
            obligation(ob1, [pr1[2]], null).
            attribute(pr1, "str" "a").
            end"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn ill_formed_text_is_an_error() {
        assert!(parse_data_rule("begin obligation(, [], null). end").is_err());
        assert!(parse_data_rule("obligation(ob1, [], null).").is_err());
        assert!(parse_flow_rule("edit(\"a\")").is_err());
    }

    #[test]
    fn activation_condition_forms() {
        assert_eq!(
            parse_activation_condition("null").unwrap(),
            ActivationCondition::Never
        );
        assert_eq!(
            parse_activation_condition(r#"stage = "import""#).unwrap(),
            ActivationCondition::equal("stage", Some(AttributeValue::str("import"))),
        );
        assert_eq!(
            parse_activation_condition("action != *").unwrap(),
            ActivationCondition::not_equal("action", None),
        );
        assert_eq!(
            parse_activation_condition(r#"action = "publish" && user = *"#).unwrap(),
            ActivationCondition::And(vec![
                ActivationCondition::equal("action", Some(AttributeValue::str("publish"))),
                ActivationCondition::equal("user", None),
            ]),
        );
        assert_eq!(
            parse_activation_condition(r#"!(stage = "import" || processId = 5)"#).unwrap(),
            ActivationCondition::Not(Box::new(ActivationCondition::Or(vec![
                ActivationCondition::equal("stage", Some(AttributeValue::str("import"))),
                ActivationCondition::equal("processId", Some(AttributeValue::Int(5))),
            ]))),
        );
    }

    #[test]
    fn condition_dump_round_trip() {
        let eq = |slot: &str, v: &str| {
            ActivationCondition::equal(slot, Some(AttributeValue::str(v)))
        };
        let conditions = vec![
            ActivationCondition::Never,
            eq("stage", "import"),
            ActivationCondition::not_equal("action", None),
            ActivationCondition::equal("processId", Some(AttributeValue::Int(17))),
            ActivationCondition::And(vec![eq("action", "publish"), eq("user", "alice")]),
            ActivationCondition::Or(vec![
                eq("purpose", "research"),
                ActivationCondition::And(vec![
                    eq("stage", "processing"),
                    ActivationCondition::Not(Box::new(eq("user", "bob"))),
                ]),
            ]),
            ActivationCondition::Not(Box::new(ActivationCondition::Or(vec![
                eq("action", "publish"),
                eq("action", "share"),
            ]))),
        ];
        for condition in conditions {
            let text = condition.dump().unwrap_or_else(|| "null".to_string());
            assert_eq!(
                parse_activation_condition(&text).unwrap(),
                condition,
                "text: {text}"
            );
        }
    }

    #[test]
    fn data_rule_round_trip() {
        let rule = DataRuleContainer::new(
            vec![
                ObligationDeclaration::new(
                    ActionName::parse("acknowledge").unwrap(),
                    vec![AttributeRef::new("src", 0)],
                    vec![AttributeRef::new("src", 0)],
                    ActivationCondition::equal("stage", Some(AttributeValue::str("import"))),
                ),
                ObligationDeclaration::new(
                    ActionName::parse("draid:account").unwrap(),
                    Vec::new(),
                    Vec::new(),
                    ActivationCondition::Or(vec![
                        ActivationCondition::equal("action", Some(AttributeValue::str("publish"))),
                        ActivationCondition::And(vec![
                            ActivationCondition::not_equal("user", None),
                            ActivationCondition::Not(Box::new(ActivationCondition::equal(
                                "purpose",
                                Some(AttributeValue::str("research")),
                            ))),
                        ]),
                    ]),
                ),
            ],
            vec![
                str_capsule("src", &["UoE", "UCL"]),
                AttributeCapsule::from_values(
                    "threshold",
                    vec![
                        ("int".to_string(), AttributeValue::Int(42)),
                        ("float".to_string(), AttributeValue::float(0.5)),
                    ],
                ),
            ],
        )
        .unwrap();

        let reparsed = parse_data_rule(&rule.dump()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn capsule_dump_round_trip() {
        let rule = DataRuleContainer::new(
            Vec::new(),
            vec![str_capsule("pr1", &["a", "b"])],
        )
        .unwrap();
        let reparsed = parse_data_rule(&rule.dump()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn escaped_strings_survive() {
        let rule = DataRuleContainer::new(
            Vec::new(),
            vec![str_capsule("pr1", &["with \"quotes\" and \\backslash", "päö"])],
        )
        .unwrap();
        let reparsed = parse_data_rule(&rule.dump()).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn flow_rule_statements() {
        let flow = parse_flow_rule(
            r#""in" -> "out"
            edit("in", "out", src, "str", "UoE", "str", "UK")
            delete(*, *, src, *, *)"#,
        )
        .unwrap();
        assert_eq!(
            flow.actions(),
            &[
                Action::Propagate {
                    input: "in".to_string(),
                    outputs: vec!["out".to_string()],
                },
                Action::Edit {
                    new_type: "str".to_string(),
                    new_value: AttributeValue::str("UK"),
                    input: Some("in".to_string()),
                    output: Some("out".to_string()),
                    name: Some("src".to_string()),
                    match_type: Some("str".to_string()),
                    match_value: Some(AttributeValue::str("UoE")),
                },
                Action::Delete {
                    input: None,
                    output: None,
                    name: Some("src".to_string()),
                    match_type: None,
                    match_value: None,
                },
            ]
        );
    }

    #[test]
    fn propagate_fan_out() {
        let flow = parse_flow_rule(r#"input0 -> output0, output1, "weird output""#).unwrap();
        assert_eq!(
            flow.actions(),
            &[Action::Propagate {
                input: "input0".to_string(),
                outputs: vec![
                    "output0".to_string(),
                    "output1".to_string(),
                    "weird output".to_string(),
                ],
            }]
        );
    }

    #[test]
    fn empty_flow_rule() {
        let flow = parse_flow_rule("").unwrap();
        assert_eq!(flow, FlowRule::default());
    }

    #[test]
    fn flow_rule_round_trip() {
        let flow = FlowRule::new(vec![
            Action::Propagate {
                input: "component1#in".to_string(),
                outputs: vec!["component1#out0".to_string(), "component1#out1".to_string()],
            },
            Action::Edit {
                new_type: "str".to_string(),
                new_value: AttributeValue::str("UK"),
                input: Some("component1#in".to_string()),
                output: None,
                name: Some("src".to_string()),
                match_type: Some("str".to_string()),
                match_value: Some(AttributeValue::str("UoE")),
            },
            Action::Delete {
                input: None,
                output: Some("component1#out1".to_string()),
                name: Some("src".to_string()),
                match_type: None,
                match_value: Some(AttributeValue::Int(3)),
            },
        ]);
        let reparsed = parse_flow_rule(&flow.dump()).unwrap();
        assert_eq!(reparsed, flow);
    }

    #[test]
    fn container_dump_snapshot() {
        let rule = DataRuleContainer::new(
            vec![ObligationDeclaration::new(
                ActionName::parse("acknowledge").unwrap(),
                vec![AttributeRef::new("src", 0)],
                Vec::new(),
                ActivationCondition::equal("stage", Some(AttributeValue::str("import"))),
            )],
            vec![str_capsule("src", &["UoE"])],
        )
        .unwrap();
        insta::assert_snapshot!(rule.dump(), @r###"
        begin
        obligation(acknowledge, [src[0]], stage = "import").
        attribute(src, ["str" "UoE"]).
        end
        "###);
    }
}
