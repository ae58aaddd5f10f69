use crate::fixtures::{COUNTER, LOOPS};
use cloakref_core::interp::{CODE_BASE, DATA_BASE};
use cloakref_core::ir::Symbol;
use cloakref_core::{parse_module, InterpConfig, Machine};
use cloakref_utils::errors::InterpError;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_run_loop_with_host_sink() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let module = parse_module(LOOPS).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);

    let mut machine = Machine::new(&module).unwrap();
    machine.register_host(
        "emit",
        Box::new(move |args: &[u64]| {
            sink.borrow_mut().push(args[0]);
            0
        }),
    );
    let result = machine.call("main", &[10]).unwrap();
    tracing::debug!("main(10) = {:?} after {} steps", result, machine.steps());

    assert_eq!(result, Some(40));
    assert_eq!(*log.borrow(), vec![11, 15, 24, 40]);
    assert_eq!(machine.read_global("acc").unwrap(), 40);
    let state = machine.writable_state();
    let flags = state.iter().find(|(name, _)| name == "flags").unwrap();
    assert_eq!(flags.1, vec![0, 100]);
}

#[test]
fn test_layout_separates_code_and_data() {
    let module = parse_module(LOOPS).unwrap();
    let machine = Machine::new(&module).unwrap();
    let layout = machine.layout();

    let mut last = 0;
    for id in module.global_ids() {
        let addr = layout.address(Symbol::Global(id));
        assert!(addr >= DATA_BASE && addr < CODE_BASE);
        assert_eq!(addr % 16, 0);
        assert!(addr > last);
        last = addr;
    }
    for id in module.function_ids() {
        let addr = layout.address(Symbol::Func(id));
        assert!(addr >= CODE_BASE);
        assert_eq!(layout.function_at(addr), Some(id));
    }
}

#[test]
fn test_run_failures() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let module = parse_module(COUNTER).unwrap();

    let mut machine = Machine::new(&module).unwrap();
    let result = machine.call("main", &[1]);
    tracing::debug!("Unbound host: {:?}", result);
    assert!(matches!(result, Err(InterpError::UnresolvedExternal(name)) if name == "emit"));

    let mut machine = Machine::new(&module).unwrap().with_config(InterpConfig {
        max_steps: 3,
        ..InterpConfig::default()
    });
    machine.register_host("emit", Box::new(|_: &[u64]| 0));
    assert!(matches!(machine.call("main", &[1]), Err(InterpError::StepLimit(3))));

    assert!(matches!(
        machine.call("nope", &[]),
        Err(InterpError::UnknownFunction(_))
    ));
}
