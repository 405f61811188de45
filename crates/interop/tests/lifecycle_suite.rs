//! Remote handle lifetimes, dead targets and shutdown.

mod common;

use std::sync::Arc;
use std::sync::Barrier;

use interop::Environment;
use interop::ErrorKind;
use interop::RawHandle;

use common::Func;
use common::OP_CALL;

fn call(target: &interop::Target) -> interop::Result<String> {
    target.out_in_object(OP_CALL, &Func::new(1, 1))
}

// --- Test 1: Dispose exactly once ---

#[test]
fn test_last_reference_disposes_once() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let first = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    let raw = first.raw();
    let clones: Vec<_> = (0..4).map(|_| first.clone()).collect();
    assert_eq!(first.handle().ref_count(), 5);

    drop(clones);
    assert_eq!(fx.engine.dispose_count(raw), 0);
    assert_eq!(first.handle().ref_count(), 1);
    assert_eq!(call(&first)?, "1.1");

    drop(first);
    assert_eq!(fx.engine.dispose_count(raw), 1);
    assert_eq!(fx.engine.disposed(), vec![raw]);
    assert_eq!(fx.engine.live_objects(), 0);
    assert_eq!(fx.env.live_handles(), 0);
    Ok(())
}

#[test]
fn test_concurrent_release_disposes_once() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    let raw = target.raw();

    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let target = target.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                drop(target);
            })
        })
        .collect();
    drop(target);
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    assert_eq!(fx.engine.dispose_count(raw), 1);
    Ok(())
}

#[test]
fn test_attach_joins_existing_owner() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let owner = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    let raw = owner.raw();

    let attached = fx.env.attach(raw);
    assert_eq!(attached.handle().ref_count(), 2);
    assert!(fx.env.handle(raw).is_some());

    drop(owner);
    assert_eq!(fx.engine.dispose_count(raw), 0);
    assert_eq!(call(&attached)?, "1.1");
    drop(attached);
    assert_eq!(fx.engine.dispose_count(raw), 1);
    Ok(())
}

// --- Test 2: Dead targets ---

#[test]
fn test_evicted_target_is_invalid_state() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    assert!(fx.engine.evict(target.raw()));

    let err = call(&target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let err = target
        .out_in_object_async::<Func, String>(OP_CALL, &Func::new(1, 1))
        .get_value()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    Ok(())
}

#[test]
fn test_unknown_raw_handle_is_invalid_state() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let stranger = fx.env.attach(RawHandle(9_999));
    assert!(call(&stranger).unwrap_err().is_invalid_state());
    assert!(stranger.out_in_op_scalar(common::OP_INCREMENT, 1).unwrap_err().is_invalid_state());
    Ok(())
}

#[test]
fn test_disconnected_engine_is_invalid_state() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    fx.engine.disconnect();

    assert!(call(&target).unwrap_err().is_invalid_state());
    let future = target.out_in_object_async::<Func, String>(OP_CALL, &Func::new(1, 1));
    assert!(future.is_ready());
    assert!(future.get_value().unwrap_err().is_invalid_state());
    assert_eq!(fx.env.pending(), 0);
    Ok(())
}

// --- Test 3: Creation failures ---

#[test]
fn test_create_unknown_type() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let err = fx.env.create("NoSuchType", |_| Ok(())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(err.remote_kind(), Some("UnknownType"));
    assert_eq!(fx.env.live_handles(), 0);
    Ok(())
}

// --- Test 4: Shutdown ---

#[test]
fn test_environment_drop_fails_in_flight_calls() -> anyhow::Result<()> {
    let common::Fixture { engine, env } = common::fixture()?;
    let target = env.create(common::COMPUTE, |_| Ok(()))?;
    let future = target.out_in_object_async::<Func, String>(OP_CALL, &Func::new(8, 5).delayed(200));
    let weak_env = Arc::downgrade(&env);

    drop(target);
    drop(env);
    assert!(weak_env.upgrade().is_none());

    let err = future.get_value().unwrap_err();
    assert!(err.is_invalid_state());
    assert!(err.message().contains("abandoned"));
    assert_eq!(engine.disposed().len(), 1);
    Ok(())
}

#[test]
fn test_environments_do_not_share_handles() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let other = Environment::builder(fx.engine.clone()).registry(common::registry()?).build();

    let target = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    assert!(other.handle(target.raw()).is_none());
    assert_eq!(other.live_handles(), 0);
    Ok(())
}
