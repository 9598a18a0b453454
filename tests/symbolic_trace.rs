//! Tests that drive the symbolic tracer over concrete executions and check
//! the recovered, optimized traces.

mod common;

use evm_replay::{
    trace::{self, HighLevelTracer},
    Context,
};

/// Runs `ctx` to completion under a fresh symbolic tracer and returns the
/// root of the recovered trace.
fn trace_run(mut ctx: Context) -> anyhow::Result<trace::NodeRef> {
    let tracer = HighLevelTracer::new(&ctx);
    ctx.hooks.attach(Box::new(tracer));
    ctx.run(-1)?;
    assert!(ctx.done);

    let root = ctx
        .hooks
        .get_mut(0)
        .expect("the tracer is attached")
        .downcast_ref::<HighLevelTracer>()
        .expect("hook zero is the tracer")
        .root();
    Ok(root)
}

/// Applies the default optimizers until nothing changes.
fn optimize_to_fixed_point(mut root: trace::NodeRef) -> trace::NodeRef {
    let optimizers = trace::default_optimizers();
    loop {
        let (new_root, modified) = trace::optimize(&root, &optimizers);
        root = new_root;
        if !modified {
            return root;
        }
    }
}

#[test]
fn the_function_selector_is_recognised_after_optimization() -> anyhow::Result<()> {
    let root = trace_run(Context::sample())?;

    // Before optimization the raw shift-and-compare idiom is visible.
    let raw = trace::print(&root);
    assert!(raw.contains("(CALLDATALOAD(0x0) >> 0xe0)"));
    assert!(raw.contains("0x3bc5de30"));

    // Afterwards the idiom reads as the selector.
    let optimized = optimize_to_fixed_point(root);
    let rendered = trace::print(&optimized);
    assert!(rendered.contains("func_sig"));
    assert!(!rendered.contains("0xe0"));
    Ok(())
}

#[test]
fn optimization_reaches_a_fixed_point() -> anyhow::Result<()> {
    let root = trace_run(Context::sample())?;
    let optimizers = trace::default_optimizers();

    let mut root = root;
    let mut rounds = 0;
    loop {
        let (new_root, modified) = trace::optimize(&root, &optimizers);
        root = new_root;
        if !modified {
            break;
        }
        rounds += 1;
        assert!(rounds < 64, "no fixed point after {rounds} passes");
    }

    // One more pass right after convergence must be a no-op.
    let (_, modified) = trace::optimize(&root, &optimizers);
    assert!(!modified);
    Ok(())
}

#[test]
fn the_trace_shows_branches_and_storage_traffic() -> anyhow::Result<()> {
    let root = trace_run(Context::sample())?;
    let rendered = trace::print(&root);

    // The dispatcher's branches were recorded with their outcomes.
    assert!(rendered.contains("<yes>") || rendered.contains("<no>"));
    // The storage read of slot zero appears as an externally supplied
    // value.
    assert!(rendered.contains("online Storage["));
    // The trace is framed as the outer transaction's call.
    assert!(rendered.contains("func: 3bc5de30 {"));
    Ok(())
}

#[test]
fn a_sha3_execution_produces_a_preimage_entry() -> anyhow::Result<()> {
    // Store a word, hash it, store the digest, stop:
    // PUSH1 1; PUSH1 0; MSTORE; PUSH1 32; PUSH1 0; SHA3; PUSH1 0; SSTORE;
    // STOP
    let mut ctx = common::new_context_with_hex("6001600052602060002060005500");
    let tracer = HighLevelTracer::new(&ctx);
    ctx.hooks.attach(Box::new(tracer));
    ctx.run(-1)?;

    let root = ctx
        .hooks
        .get_mut(0)
        .unwrap()
        .downcast_ref::<HighLevelTracer>()
        .unwrap()
        .root();
    let rendered = trace::print(&root);

    // The hash variable appears, with its pre-image window and digest.
    assert!(rendered.contains("Sha3_"));
    assert!(rendered.contains("] -> 0xb10e2d52"));
    // The digest was stored under slot zero.
    assert!(rendered.contains("Storage[0x0] = Sha3_"));
    Ok(())
}

#[test]
fn a_bare_transfer_traces_as_a_money_transfer() -> anyhow::Result<()> {
    let a = common::address(0x0a);
    let beneficiary = common::address(0xbe);

    let mut code = vec![
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, // empty windows
        0x60, 0x64, // 100 wei
        0x73,
    ];
    code.extend(beneficiary.as_bytes());
    code.extend([0x61, 0xff, 0xff, 0xf1, 0x00]);

    let mut ctx = Context::new();
    common::install_contract(&mut ctx, a, code);
    ctx.call_mut().this = a;

    let root = trace_run(ctx)?;
    let rendered = trace::print(&root);
    assert!(rendered.contains(&format!("Transfer 100(0x64) -> {beneficiary}")));
    Ok(())
}

#[test]
fn nested_calls_trace_as_nested_frames() -> anyhow::Result<()> {
    let a = common::address(0x0a);
    let b = common::address(0x0b);

    // B returns a constant word; A calls it with a selector-bearing input
    // window and stores the result.
    let b_code = vec![
        0x61, 0xde, 0xad, 0x60, 0x00, 0x52, // MSTORE(0, 0xdead)
        0x60, 0x20, 0x60, 0x00, 0xf3, // RETURN(0, 32)
    ];
    let mut a_code = vec![
        0x63, 0xaa, 0xbb, 0xcc, 0xdd, // PUSH4 selector
        0x60, 0x00, 0x52, // MSTORE(0, selector): input at 0x1c..0x20
        0x60, 0x20, // ret size
        0x60, 0x40, // ret offset
        0x60, 0x04, // in size
        0x60, 0x1c, // in offset
        0x60, 0x00, // value
        0x73,
    ];
    a_code.extend(b.as_bytes());
    a_code.extend([0x61, 0xff, 0xff, 0xf1, 0x00]);

    let mut ctx = Context::new();
    common::install_contract(&mut ctx, a, a_code);
    common::install_contract(&mut ctx, b, b_code);
    ctx.call_mut().this = a;

    let root = trace_run(ctx)?;
    let rendered = trace::print(&root);

    // The inner frame prints under the outer one, with its selector.
    assert!(rendered.contains(&format!("CALL -> {b}, func: aabbccdd {{")));
    // The callee's return landed back in the caller as a named value.
    assert!(rendered.contains("Memory[0x40] = ReturnVal_"));
    Ok(())
}

#[test]
fn symbolic_depth_matches_concrete_depth_throughout() -> anyhow::Result<()> {
    // The tracer asserts after every instruction that the symbolic stack is
    // exactly as deep as the machine stack, so single-stepping the whole
    // sample doubles as a depth-equality property check across every opcode
    // it executes.
    let mut ctx = Context::sample();
    let tracer = HighLevelTracer::new(&ctx);
    ctx.hooks.attach(Box::new(tracer));

    let mut steps = 0;
    while !ctx.done {
        ctx.step()?;
        steps += 1;
        assert!(steps < 10_000, "the sample must terminate");
    }
    Ok(())
}
