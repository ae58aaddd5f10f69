use crate::fixtures::{COUNTER, LOOPS};
use cloakref_core::ir::{Initializer, Linkage, Symbol};
use cloakref_core::{fingerprint, parse_module, print_module};
use cloakref_utils::errors::ParseError;

#[test]
fn test_parse_fixture_modules() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let module = parse_module(LOOPS).unwrap();
    tracing::debug!("Parsed module: {:?}", module.name);
    assert_eq!(module.name, "loops");
    assert_eq!(module.globals.len(), 5);
    assert_eq!(module.functions.len(), 3);
    assert_eq!(module.instruction_count(), 26);
    module.validate().unwrap();

    let handlers = module.global_by_name("handlers").unwrap();
    let square = module.function_by_name("square").unwrap();
    match &module.global(handlers).init {
        Some(Initializer::Array(entries)) => assert_eq!(entries.len(), 1),
        other => panic!("unexpected initializer: {other:?}"),
    }
    assert!(module.function(module.function_by_name("emit").unwrap()).is_declaration());
    assert_eq!(module.symbol_name(Symbol::Func(square)), "square");
    assert_eq!(module.global(handlers).linkage, Linkage::default());
}

#[test]
fn test_print_parse_fixed_point() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    for text in [COUNTER, LOOPS] {
        let module = parse_module(text).unwrap();
        let printed = print_module(&module);
        let reparsed = parse_module(&printed).unwrap();
        assert_eq!(reparsed, module, "Round trip changed the module");
        assert_eq!(print_module(&reparsed), printed);
        assert_eq!(fingerprint(&reparsed), fingerprint(&module));
    }
}

#[test]
fn test_parse_errors() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let unknown = "define void @main() {\nentry:\n  store i64 1, @missing\n  ret void\n}\n";
    let result = parse_module(unknown);
    tracing::debug!("Unknown symbol result: {:?}", result);
    assert!(matches!(result, Err(ParseError::UnknownSymbol { .. })));

    let duplicate = "@a = global i64 0\n@a = global i64 1\n";
    assert!(matches!(
        parse_module(duplicate),
        Err(ParseError::DuplicateSymbol(name)) if name == "a"
    ));
}
