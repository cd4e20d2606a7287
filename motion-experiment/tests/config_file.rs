use std::path::PathBuf;

use motion_experiment::{ContrastModulation, ExperimentConfig};
use motion_staircase::{StaircaseSpec, StaircaseStyle, StopRule};

fn shipped_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../configs/motion_threshold.json")
}

#[test]
fn shipped_configuration_loads_and_validates() {
    let config = ExperimentConfig::load(shipped_config()).unwrap();
    assert_eq!(StaircaseStyle::Quest, config.staircase_style);
    assert_eq!(4, config.conditions.len());
    assert_eq!(4, config.runs);
    assert_eq!(10, config.practice.trials);
    assert_eq!("practice", config.practice.condition.label);
    assert_eq!(ContrastModulation::FixedTrapezoidal, config.contrast_mod_type);
    assert_eq!(StopRule::Trials(30), config.stop_rule());
    match config.staircase_spec() {
        StaircaseSpec::Quest(settings) => assert!((settings.start_s - 0.2).abs() < 1e-12),
        other => panic!("expected QUEST settings, got {other:?}"),
    }
}

#[test]
fn missing_file_is_a_config_error() {
    let err = ExperimentConfig::load("/definitely/not/here.json").unwrap_err();
    assert!(err.to_string().contains("not/here.json"));
}
