use crate::fixtures::LOOPS;
use cloakref_analysis::{audit, RefKind, ReferenceGraph};
use cloakref_core::ir::Symbol;
use cloakref_core::parse_module;
use cloakref_transform::obfuscator::{obfuscate_module, ObfuscationConfig};
use petgraph::algo::is_cyclic_directed;

#[test]
fn test_hiding_reroutes_references_through_the_table() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let plain = parse_module(LOOPS).unwrap();
    let result = obfuscate_module(LOOPS, ObfuscationConfig::default()).unwrap();
    let hidden = parse_module(&result.module_text).unwrap();

    let main = |m: &cloakref_core::ir::Module| Symbol::Func(m.function_by_name("main").unwrap());
    let square = |m: &cloakref_core::ir::Module| Symbol::Func(m.function_by_name("square").unwrap());

    let before = ReferenceGraph::build(&plain);
    assert!(before.references(main(&plain)).contains(&(square(&plain), RefKind::Call)));
    assert!(!is_cyclic_directed(before.graph()));

    let after = ReferenceGraph::build(&hidden);
    let table = Symbol::Global(hidden.global_by_name("__encrypted_globals").unwrap());
    assert_eq!(after.references(main(&hidden)), vec![(table, RefKind::Address)]);
    // Still reachable, but only through the table's initializer.
    assert!(after.reachable(main(&hidden)).contains(&square(&hidden)));
    assert!(
        after
            .referrers(square(&hidden))
            .iter()
            .all(|(_, kind)| *kind == RefKind::Initializer)
    );
    // main and the table now refer to each other.
    assert!(is_cyclic_directed(after.graph()));

    let report = audit(&hidden);
    tracing::debug!("Audit: {:?}", report);
    assert_eq!(report.hideable().count(), 0);
    assert_eq!(report.decode_sites, 12);
}
