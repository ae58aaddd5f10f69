use crate::fixtures::LOOPS;
use cloakref_analysis::{audit, collect_metrics};
use cloakref_core::ir::{InstKind, Operand, Symbol};
use cloakref_core::parse_module;
use cloakref_transform::global_value_hide::substitution::{
    AddXorChain, ComplementSplit, MbaNegate, OBF_MD, OBF_SUB,
};
use cloakref_transform::global_value_hide::{GlobalValueHide, SubstitutionLibrary};
use cloakref_transform::{PassConfig, Transform};
use cloakref_utils::errors::TransformError;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_hide_counts_every_site() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let mut module = parse_module(LOOPS).unwrap();
    let before = collect_metrics(&module).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let summary = GlobalValueHide::new(PassConfig::default())
        .run(&mut module, &mut rng)
        .unwrap();
    tracing::debug!("Summary: {:?}", summary);
    module.validate().unwrap();

    assert_eq!(summary.table.as_deref(), Some("__encrypted_globals"));
    assert_eq!(summary.globals, 5);
    assert_eq!(summary.functions, 3);
    assert_eq!(summary.data_sites, before.direct_data_refs);
    assert_eq!(summary.call_sites, before.direct_calls);
    assert_eq!((summary.data_sites, summary.call_sites), (10, 2));

    let after = collect_metrics(&module).unwrap();
    assert_eq!(after.direct_data_refs, 0);
    assert_eq!(after.direct_calls, 0);
    assert_eq!(after.decode_sites, 12);
    assert_eq!(after.volatile_loads, 12);
    assert_eq!(after.encoded_tables, 1);
    assert_eq!(after.indirect_calls, before.indirect_calls + 2);
    assert_eq!(audit(&module).hideable().count(), 0);
}

#[test]
fn test_decode_sites_are_tagged_with_their_formula() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let names = ["add-xor-chain", "complement-split", "mba-negate"];
    let libraries = [
        SubstitutionLibrary::with(vec![Box::new(AddXorChain)]),
        SubstitutionLibrary::with(vec![Box::new(ComplementSplit)]),
        SubstitutionLibrary::with(vec![Box::new(MbaNegate)]),
    ];

    for (name, library) in names.into_iter().zip(libraries) {
        let mut module = parse_module(LOOPS).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        GlobalValueHide::with_library(PassConfig::default(), library)
            .run(&mut module, &mut rng)
            .unwrap();

        let tagged: Vec<_> = module
            .functions
            .iter()
            .flat_map(|f| f.instructions())
            .filter(|inst| inst.metadata.contains_key(OBF_MD))
            .collect();
        assert_eq!(tagged.len(), 12, "{name}");
        for inst in tagged {
            assert_eq!(inst.metadata[OBF_MD], "obfuscated");
            assert_eq!(inst.metadata[OBF_SUB], name);
            assert!(matches!(
                inst.kind,
                InstKind::Gep {
                    inbounds: false,
                    stride: 1,
                    ..
                }
            ));
        }
    }
}

#[test]
fn test_routine_addresses_outside_calls_stay_direct() {
    let mut module = parse_module(
        r#"
@slot = global ptr 0
define void @target() {
entry:
  ret void
}
define void @main() {
entry:
  store ptr @target, @slot
  call fn() -> void @target()
  ret void
}
"#,
    )
    .unwrap();
    let target = Symbol::Func(module.function_by_name("target").unwrap());
    let mut rng = StdRng::seed_from_u64(3);
    let summary = GlobalValueHide::new(PassConfig::default())
        .run(&mut module, &mut rng)
        .unwrap();
    assert_eq!(summary.call_sites, 1);
    assert_eq!(summary.data_sites, 1);

    let main = module.function(module.function_by_name("main").unwrap());
    let stores: Vec<_> = main
        .instructions()
        .filter_map(|inst| match &inst.kind {
            InstKind::Store { val, .. } => Some(*val),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![Operand::Symbol(target)]);
}

#[test]
fn test_empty_library_fails_before_mutating() {
    let mut module = parse_module(LOOPS).unwrap();
    let original = module.clone();
    let mut rng = StdRng::seed_from_u64(1);
    let hide = GlobalValueHide::with_library(PassConfig::default(), SubstitutionLibrary::with(vec![]));
    assert!(matches!(
        hide.apply(&mut module, &mut rng),
        Err(TransformError::EmptyRegistry)
    ));
    assert_eq!(module, original);
}
