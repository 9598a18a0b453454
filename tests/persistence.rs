//! Tests for saving a context to disk and reconstructing it, including the
//! hook chain round trip.

mod common;

use evm_replay::{
    error::persistence,
    hook::{
        breakpoint::{BpOpCode, BpPc},
        param_tracer::ParamTracer,
    },
    vm::value::Word,
    Context, HookRegistry,
};

/// A scratch file that removes itself when the test ends.
struct ScratchFile {
    path: std::path::PathBuf,
}

impl ScratchFile {
    fn new(name: &str) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("evm-replay-test-{}-{name}.json", std::process::id()));
        Self { path }
    }

    fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn a_mid_run_context_round_trips_and_resumes() -> anyhow::Result<()> {
    let file = ScratchFile::new("mid-run");

    let mut ctx = Context::sample();
    ctx.hooks.attach(Box::new(BpPc::new(0x10)));
    ctx.hooks.attach(Box::new(ParamTracer::new()));

    // Run up to the breakpoint, then capture the paused state.
    ctx.run(-1).expect_err("the breakpoint fires");
    ctx.save(file.path())?;

    let registry = HookRegistry::default();
    let mut restored = Context::load(file.path(), &registry)?;

    // The restored context matches the paused one where it matters.
    assert_eq!(restored.pc(), ctx.pc());
    assert_eq!(restored.done, ctx.done);
    assert_eq!(restored.stack().items(), ctx.stack().items());
    assert_eq!(restored.memory().data(), ctx.memory().data());
    assert_eq!(restored.chain, ctx.chain);
    assert_eq!(restored.block, ctx.block);
    assert_eq!(
        restored.contracts[&restored.this()].storage,
        ctx.contracts[&ctx.this()].storage
    );
    assert_eq!(restored.block_hashes, ctx.block_hashes);

    // The hook chain came back in order, by type tag.
    assert_eq!(restored.hooks.len(), 2);
    assert_eq!(restored.hooks.list()[0].type_name(), "BpPc");
    assert_eq!(restored.hooks.list()[1].type_name(), "ParamTracer");

    // The code was re-disassembled on load, so the restored context can
    // simply resume and complete.
    restored.run(-1)?;
    assert!(restored.done);
    assert_eq!(
        restored.contracts[&restored.this()].storage[&Word::ZERO],
        Word::ONE
    );
    Ok(())
}

#[test]
fn saving_twice_is_stable() -> anyhow::Result<()> {
    let first = ScratchFile::new("stable-1");
    let second = ScratchFile::new("stable-2");

    let ctx = Context::sample();
    ctx.save(first.path())?;

    let restored = Context::load(first.path(), &HookRegistry::default())?;
    restored.save(second.path())?;

    let a: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(first.path())?)?;
    let b: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(second.path())?)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn breakpoint_state_survives_the_round_trip() -> anyhow::Result<()> {
    let file = ScratchFile::new("bp-state");

    let mut ctx = Context::sample();
    let scoped = BpPc::in_contract(0x42, common::address(0xaa));
    ctx.hooks.attach(Box::new(scoped.clone()));
    ctx.hooks.attach(Box::new(BpOpCode::new(0x20)));
    ctx.save(file.path())?;

    let restored = Context::load(file.path(), &HookRegistry::default())?;
    let bp = restored.hooks.list()[0]
        .downcast_ref::<BpPc>()
        .expect("hook zero is the scoped pc breakpoint");
    assert_eq!(*bp, scoped);

    let bp = restored.hooks.list()[1]
        .downcast_ref::<BpOpCode>()
        .expect("hook one is the opcode breakpoint");
    assert_eq!(bp.opcode, 0x20);
    Ok(())
}

#[test]
fn an_unknown_hook_tag_fails_the_load() -> anyhow::Result<()> {
    let file = ScratchFile::new("unknown-hook");

    let mut ctx = Context::sample();
    ctx.hooks.attach(Box::new(BpPc::new(0)));
    ctx.save(file.path())?;

    // Corrupt the hook tag on disk.
    let text = std::fs::read_to_string(file.path())?;
    let text = text.replace("\"BpPc\"", "\"NoSuchHook\"");
    std::fs::write(file.path(), text)?;

    let result = Context::load(file.path(), &HookRegistry::default());
    assert!(matches!(
        result,
        Err(persistence::Error::UnknownHookType { tag }) if tag == "NoSuchHook"
    ));
    Ok(())
}
