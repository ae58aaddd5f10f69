use crate::fixtures::COUNTER;
use cloakref_core::parse_module;
use cloakref_transform::global_value_hide::substitution::MbaNegate;
use cloakref_transform::global_value_hide::{GlobalValueHide, SubstitutionLibrary};
use cloakref_transform::obfuscator::{obfuscate_module, ObfuscationConfig};
use cloakref_transform::pass::{self, GLOBAL_VALUE_HIDE};
use cloakref_transform::PassConfig;
use cloakref_utils::errors::{ObfuscateError, TransformError};

#[test]
fn test_pipeline_from_names_and_config() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let cfg = PassConfig::from_json(r#"{ "guard_rounds": 0 }"#).unwrap();
    let transforms = pass::parse_pipeline(GLOBAL_VALUE_HIDE, &cfg).unwrap();

    let result = obfuscate_module(
        COUNTER,
        ObfuscationConfig {
            seed: 11,
            transforms,
            pass_config: cfg,
        },
    )
    .unwrap();
    tracing::debug!("Passes: {:?}", result.passes);

    assert_eq!(result.passes.len(), 1);
    assert!(result.passes[0].mutated && result.passes[0].kept);
    assert_eq!(result.metadata.seed_used, 11);
    assert_eq!(result.metrics_after.decode_sites, 7);

    let reparsed = parse_module(&result.module_text).unwrap();
    reparsed.validate().unwrap();
    assert_eq!(reparsed.instruction_count(), result.final_instructions);
}

#[test]
fn test_more_guard_rounds_grow_the_output() {
    // One formula keeps the per-site size fixed apart from the zero identity variant.
    let run = |guard_rounds| {
        let cfg = PassConfig {
            guard_rounds,
            ..PassConfig::default()
        };
        let hide = GlobalValueHide::with_library(
            cfg.clone(),
            SubstitutionLibrary::with(vec![Box::new(MbaNegate)]),
        );
        obfuscate_module(
            COUNTER,
            ObfuscationConfig {
                transforms: vec![Box::new(hide)],
                pass_config: cfg,
                ..ObfuscationConfig::default()
            },
        )
        .unwrap()
        .final_instructions
    };
    let sizes: Vec<usize> = (0..4).map(run).collect();
    assert!(sizes.windows(2).all(|w| w[0] < w[1]), "{sizes:?}");
}

#[test]
fn test_report_serializes() {
    let result = obfuscate_module(COUNTER, ObfuscationConfig::default()).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["metadata"]["transforms_applied"][0], "GlobalValueHide");
    assert_eq!(json["metrics_before"]["direct_calls"], 3);
    assert_eq!(json["passes"][0]["name"], "GlobalValueHide");
}

#[test]
fn test_unknown_pass_is_rejected() {
    let err = pass::parse_pipeline("global-value-hide,inline", &PassConfig::default());
    assert!(matches!(err, Err(TransformError::UnknownPass(name)) if name == "inline"));
    assert!(matches!(
        obfuscate_module("module broken\n@x = global\n", ObfuscationConfig::default()),
        Err(ObfuscateError::Parse(_))
    ));
}
