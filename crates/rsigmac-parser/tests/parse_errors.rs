use rsigmac_parser::{
    SigmaCollectionParser, SigmaParserError, parse_condition, parse_field_spec, parse_sigma_yaml,
};

#[test]
fn field_spec_double_pipe_produces_unknown_modifier() {
    let err = parse_field_spec("field||contains").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::UnknownModifier(ref s) if s.is_empty()),
        "expected UnknownModifier for empty modifier string, got: {err}"
    );
}

#[test]
fn condition_dangling_operator_fails() {
    for input in ["selection and", "(selection and filter", "selection and or filter"] {
        let err = parse_condition(input).unwrap_err();
        assert!(
            matches!(err, SigmaParserError::Condition(_)),
            "expected Condition error for {input:?}, got: {err}"
        );
    }
}

#[test]
fn malformed_yaml_is_a_yaml_error() {
    let yaml = "title: [unclosed\ndetection: {";
    let err = parse_sigma_yaml(yaml).unwrap_err();
    assert!(err.is_yaml(), "expected YAML error, got: {err}");
}

#[test]
fn missing_title_is_a_rule_error() {
    let yaml = r#"
logsource:
    product: windows
detection:
    selection:
        CommandLine|contains: test
    condition: selection
"#;
    let err = parse_sigma_yaml(yaml).unwrap_err();
    assert!(!err.is_yaml());
    assert!(matches!(err, SigmaParserError::MissingField(ref f) if f == "title"));
}

#[test]
fn valid_rule_is_yielded_before_the_broken_document() {
    let yaml = r#"
title: Valid Rule
logsource:
    product: windows
detection:
    selection:
        CommandLine|contains: test
    condition: selection
---
title: Broken
detection:
    selection:
        CommandLine|contains: test
"#;
    let results: Vec<_> = SigmaCollectionParser::new(yaml).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().title, "Valid Rule");
    assert!(matches!(
        results[1],
        Err(SigmaParserError::MissingField(ref f)) if f == "condition"
    ));
}

#[test]
fn unknown_level_is_rejected() {
    let yaml = r#"
title: Odd Level
logsource: {product: windows}
detection:
    selection: {EventID: 1}
    condition: selection
level: severe
"#;
    assert!(matches!(
        parse_sigma_yaml(yaml),
        Err(SigmaParserError::InvalidRule(_))
    ));
}

#[test]
fn unknown_action_is_rejected() {
    let yaml = "action: merge\ntitle: x\n";
    assert!(matches!(
        parse_sigma_yaml(yaml),
        Err(SigmaParserError::InvalidAction(ref a)) if a == "merge"
    ));
}

#[test]
fn repeat_without_previous_document_fails() {
    let yaml = r#"
action: repeat
title: Orphan Rule
detection:
    selection:
        CommandLine|contains: 'whoami'
    condition: selection
"#;
    let err = parse_sigma_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("without a previous document"), "{err}");
}

#[test]
fn scalar_document_is_rejected() {
    assert!(matches!(
        parse_sigma_yaml("just a string"),
        Err(SigmaParserError::InvalidRule(_))
    ));
}
