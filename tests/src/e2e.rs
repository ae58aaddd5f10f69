use crate::fixtures::{COUNTER, LOOPS};
use cloakref_core::ir::Module;
use cloakref_core::{parse_module, Machine};
use cloakref_transform::obfuscator::{obfuscate_module, ObfuscationConfig};
use cloakref_transform::PassConfig;
use std::cell::RefCell;
use std::rc::Rc;

/// Everything observable from one call: the result, the host log and writable memory.
type Observation = (Option<u64>, Vec<u64>, Vec<(String, Vec<u8>)>);

fn observe(module: &Module, args: &[u64]) -> anyhow::Result<Observation> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let mut machine = Machine::new(module)?;
    machine.register_host(
        "emit",
        Box::new(move |args: &[u64]| {
            sink.borrow_mut().extend_from_slice(args);
            0
        }),
    );
    let result = machine.call("main", args)?;
    let state = machine.writable_state();
    let emitted = log.borrow().clone();
    Ok((result, emitted, state))
}

fn obfuscate(text: &str, seed: u64, guard_rounds: usize) -> anyhow::Result<Module> {
    let result = obfuscate_module(
        text,
        ObfuscationConfig {
            seed,
            pass_config: PassConfig {
                guard_rounds,
                ..PassConfig::default()
            },
            ..ObfuscationConfig::default()
        },
    )?;
    Ok(parse_module(&result.module_text)?)
}

#[test]
fn test_obfuscated_modules_behave_identically() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    for text in [COUNTER, LOOPS] {
        let plain = parse_module(text)?;
        for seed in 0..16 {
            let hidden = obfuscate(text, seed, (seed % 5) as usize)?;
            for args in [[0u64], [7], [u64::MAX], [0x8000_0000_0000_0000]] {
                let expected = observe(&plain, &args)?;
                let actual = observe(&hidden, &args)?;
                assert_eq!(
                    actual, expected,
                    "module {} seed {seed} args {args:?}",
                    plain.name
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_expected_results() -> anyhow::Result<()> {
    let hidden = obfuscate(LOOPS, 99, 3)?;
    let (result, emitted, state) = observe(&hidden, &[10])?;
    assert_eq!(result, Some(40));
    assert_eq!(emitted, vec![11, 15, 24, 40]);
    let flags = state
        .iter()
        .find(|(name, _)| name == "flags")
        .map(|(_, bytes)| bytes.clone());
    assert_eq!(flags, Some(vec![0, 100]));

    let hidden = obfuscate(COUNTER, 99, 3)?;
    let (result, emitted, _) = observe(&hidden, &[5])?;
    assert_eq!(result, Some(16));
    assert_eq!(emitted, vec![16]);
    Ok(())
}

#[test]
fn test_repeated_hiding_still_behaves() -> anyhow::Result<()> {
    let once = obfuscate(COUNTER, 5, 2)?;
    let twice = obfuscate(&cloakref_core::print_module(&once), 6, 2)?;
    assert_eq!(twice.globals.len(), once.globals.len() + 1);
    assert!(twice.global_by_name("__encrypted_globals.1").is_some());
    assert_eq!(observe(&twice, &[3])?, observe(&parse_module(COUNTER)?, &[3])?);
    Ok(())
}

#[test]
fn test_tables_differ_between_seeds() -> anyhow::Result<()> {
    let a = obfuscate_module(LOOPS, ObfuscationConfig { seed: 1, ..Default::default() })?;
    let b = obfuscate_module(LOOPS, ObfuscationConfig { seed: 2, ..Default::default() })?;
    assert_ne!(a.module_text, b.module_text);
    assert!(a.final_instructions > a.original_instructions);
    Ok(())
}
