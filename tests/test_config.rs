use std::collections::HashMap;
use std::time::Duration;

use mpr_sync::config::{ConfigError, ViewerConfig};
use mpr_sync::enums::{RegistrationPolicy, ToolChangeMode};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().expect("create temp file");
    std::fs::write(file.path(), contents).expect("write config");
    file
}

#[test]
fn test_defaults() {
    let config = ViewerConfig::default();

    assert_eq!(config.sync.expected_viewports, 3);
    assert_eq!(config.sync.registration, RegistrationPolicy::Reject);
    assert_eq!(config.sync.tool_change, ToolChangeMode::LocalOnly);
    assert_eq!(config.sync.initial_slab_thickness_mm, 0.1);
    assert_eq!(config.sync.default_preset, "vtkMRMLVolumePropertyNode4");
    assert_eq!(config.load.render_step_percent, 20);
    assert_eq!(config.load.timeout_secs, None);
    assert_eq!(config.pacs.label_type, "nifti");
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let file = write_config(
        r#"
[sync]
registration = "replace"
tool_change = "broadcast_and_reconfigure_overlays"

[load]
render_step_percent = 10
timeout_secs = 30
"#,
    );

    let config = ViewerConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.sync.registration, RegistrationPolicy::Replace);
    assert_eq!(
        config.sync.tool_change,
        ToolChangeMode::BroadcastAndReconfigureOverlays
    );
    assert_eq!(config.sync.expected_viewports, 3);

    let options = config.load.options();
    assert_eq!(options.throttle.step(), 10);
    assert_eq!(options.timeout, Some(Duration::from_secs(30)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ViewerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let file = write_config("[sync\nexpected_viewports = ");
    let err = ViewerConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_zero_viewports_rejected() {
    let file = write_config("[sync]\nexpected_viewports = 0\n");
    let err = ViewerConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            key: "sync.expected_viewports",
            ..
        }
    ));
}

#[test]
fn test_render_step_out_of_range_rejected() {
    let mut config = ViewerConfig::default();
    config.load.render_step_percent = 0;
    assert!(config.validate().is_err());
    config.load.render_step_percent = 101;
    assert!(config.validate().is_err());
}

#[test]
fn test_negative_slab_rejected() {
    let mut config = ViewerConfig::default();
    config.sync.initial_slab_thickness_mm = -1.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config("[pacs]\nhost = \"http://file-host\"\n");
    let mut config = ViewerConfig::from_file(file.path()).unwrap();
    let env: HashMap<&str, &str> = [
        ("PACS_HOST", "http://pacs:8080"),
        ("PACS_LABELLIST_LIST", "/api/labels"),
        ("PACS_LABELLIST_DELETE", "/api/labels/remove"),
        ("DCM4CHEE_HOST", "http://dcm4chee:8080"),
    ]
    .into_iter()
    .collect();

    config.apply_env(|key| env.get(key).map(|value| value.to_string()));

    assert_eq!(config.pacs.list_url(), "http://pacs:8080/api/labels");
    assert_eq!(config.pacs.add_url(), "http://pacs:8080/api/labels");
    assert_eq!(
        config.pacs.delete_url(),
        "http://pacs:8080/api/labels/remove"
    );
    assert_eq!(
        config.dicomweb.rs_url(),
        "http://dcm4chee:8080/dcm4chee-arc/aets/DCM4CHEE/rs"
    );
    assert_eq!(
        config.dicomweb.wado_uri_url(),
        "http://dcm4chee:8080/dcm4chee-arc/aets/DCM4CHEE/wado?requestType=WADO"
    );
}

#[test]
fn test_unset_environment_changes_nothing() {
    let mut config = ViewerConfig::default();
    config.apply_env(|_| None);
    assert!(config.pacs.host.is_empty());
    assert_eq!(config.pacs.labellist_list, "/api/v1/labeling");
}
