use std::io::Write;

use rsigmac_backend::{BACKENDS, BackendOptions, ConfigError, ConvertError, SigmaConfig, lookup};
use rsigmac_parser::{SigmaRule, parse_sigma_yaml};
use tempfile::NamedTempFile;

const RULE: &str = r#"
title: Suspicious Whoami
id: 8f3c4a1e-0000-4000-8000-000000000001
logsource:
    category: process_creation
    product: windows
detection:
    selection:
        Image|endswith: '\whoami.exe'
        CommandLine|contains: '/priv'
    condition: selection
level: high
"#;

fn rule() -> SigmaRule {
    parse_sigma_yaml(RULE).unwrap().rules.remove(0)
}

fn config_file(yaml: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    f
}

fn chained(files: &[&NamedTempFile]) -> SigmaConfig {
    files
        .iter()
        .map(|f| SigmaConfig::load(f.path()).unwrap())
        .fold(SigmaConfig::default(), SigmaConfig::merge)
}

#[test]
fn chained_configs_apply_in_order() {
    let base = config_file(
        r#"
title: base
order: 10
fieldmappings:
    Image: process.executable
    CommandLine: process.command_line
logsources:
    windows:
        product: windows
        index: winlogbeat-*
"#,
    );
    let overlay = config_file(
        r#"
order: 20
fieldmappings:
    CommandLine: [cmd, args]
logsources:
    process:
        category: process_creation
        conditions:
            event.category: process
"#,
    );
    let config = chained(&[&base, &overlay]);
    assert_eq!(config.indices(&rule().logsource), ["winlogbeat-*"]);

    let mut backend = lookup("es-qs")
        .unwrap()
        .create(config, &BackendOptions::new())
        .unwrap();
    assert_eq!(
        backend.convert(&rule()).unwrap(),
        [r"event.category:process AND process.executable:*\\whoami.exe AND (cmd:*\/priv* OR args:*\/priv*)"]
    );
}

#[test]
fn backends_list_restricts_targets() {
    let f = config_file("backends: [splunk]\n");
    let config = SigmaConfig::load(f.path()).unwrap();
    assert!(config.check_backend("splunk").is_ok());
    assert!(matches!(
        config.check_backend("es-qs"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn config_errors_are_classified() {
    let missing = SigmaConfig::load(std::path::Path::new("/nonexistent/rsigmac.yml"));
    assert!(matches!(missing, Err(ConfigError::Io { .. })));

    let broken = config_file("fieldmappings: [unclosed\n");
    assert!(matches!(
        SigmaConfig::load(broken.path()),
        Err(ConfigError::Yaml(_))
    ));

    let semantic = config_file("logsources:\n  empty:\n    index: x\n");
    assert!(matches!(
        SigmaConfig::load(semantic.path()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn backend_options_from_file_and_args() {
    let f = config_file("table: from_file\nignore_case: true\n");
    let options = BackendOptions::load(f.path())
        .unwrap()
        .merged_with(&BackendOptions::from_args(&["table=from_args"]));
    assert_eq!(options.get("table"), Some("from_args"));
    assert!(options.flag("ignore_case"));

    let mut sql = lookup("sql")
        .unwrap()
        .create(SigmaConfig::default(), &options)
        .unwrap();
    let out = sql.convert(&rule()).unwrap();
    assert!(out[0].starts_with("SELECT * FROM from_args WHERE "), "{}", out[0]);
}

#[test]
fn every_backend_handles_a_common_rule() {
    for info in BACKENDS {
        let mut backend = info
            .create(SigmaConfig::default(), &BackendOptions::new())
            .unwrap();
        let per_rule = backend.convert(&rule()).unwrap();
        let finale = backend.finalize();
        assert!(
            !per_rule.is_empty() || finale.is_some(),
            "{} produced no output",
            info.name
        );
    }
}

#[test]
fn unsupported_selector_count() {
    let yaml = r#"
title: Two Of
logsource: {category: test}
detection:
    a: {x: 1}
    b: {y: 2}
    c: {z: 3}
    condition: 2 of them
"#;
    let rule = parse_sigma_yaml(yaml).unwrap().rules.remove(0);
    for info in BACKENDS {
        let mut backend = info
            .create(SigmaConfig::default(), &BackendOptions::new())
            .unwrap();
        assert!(
            matches!(backend.convert(&rule), Err(ConvertError::NotSupported(_))),
            "{}",
            info.name
        );
    }
}

#[test]
fn value_without_query_terms_is_refused() {
    let yaml = r#"
title: Empty Fragment
logsource: {product: windows}
detection:
    sel:
        CommandLine|base64offset|contains: ''
    condition: sel
"#;
    let rule = parse_sigma_yaml(yaml).unwrap().rules.remove(0);
    for info in BACKENDS {
        let mut backend = info
            .create(SigmaConfig::default(), &BackendOptions::new())
            .unwrap();
        let result = backend.convert(&rule);
        assert!(
            matches!(result, Err(ConvertError::Backend(_))),
            "{}: {result:?}",
            info.name
        );
    }
}
