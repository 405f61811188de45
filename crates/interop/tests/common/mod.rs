//! Shared fixtures: a compute-style object type on a loopback engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use interop::Environment;
use interop::Failure;
use interop::LoopbackEngine;
use interop::ObjectType;
use interpack::BinaryType;
use interpack::Reader;
use interpack::TypeRegistry;
use interpack::Writer;

pub const OP_CALL: i32 = 1;
pub const OP_THREAD: i32 = 2;
pub const OP_INCREMENT: i32 = 3;
pub const OP_INDEX: i32 = 4;

pub const COMPUTE: &str = "ComputeTask";

/// Installs a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A job the compute object runs: joins `a` and `b` as `"a.b"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub a: i32,
    pub b: i32,
    pub delay_ms: i64,
    pub error: Option<(i32, String)>,
}

impl Func {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b, delay_ms: 0, error: None }
    }

    pub fn delayed(mut self, ms: i64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn failing(mut self, code: i32, message: &str) -> Self {
        self.error = Some((code, message.into()));
        self
    }
}

impl BinaryType for Func {
    const TYPE_NAME: &'static str = "Func1";

    fn write(&self, w: &mut Writer<'_>) -> interpack::Result<()> {
        w.write_i32(self.a)?;
        w.write_i32(self.b)?;
        w.write_i64(self.delay_ms)?;
        match &self.error {
            Some((code, message)) => {
                w.write_bool(true)?;
                w.write_i32(*code)?;
                w.write_string(Some(message))
            }
            None => w.write_bool(false),
        }
    }

    fn read(r: &mut Reader<'_>) -> interpack::Result<Self> {
        let a = r.read_i32()?;
        let b = r.read_i32()?;
        let delay_ms = r.read_i64()?;
        let error = if r.read_bool()? {
            Some((r.read_i32()?, r.read_string()?.unwrap_or_default()))
        } else {
            None
        };
        Ok(Self { a, b, delay_ms, error })
    }
}

pub fn registry() -> anyhow::Result<Arc<TypeRegistry>> {
    Ok(TypeRegistry::builder().register::<Func>()?.build())
}

pub fn compute_type() -> ObjectType {
    ObjectType::new(COMPUTE)
        .op(OP_CALL, |r, w| {
            let func: Func = r.read_object()?;
            if func.delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(func.delay_ms as u64));
            }
            if let Some((code, message)) = func.error {
                return Err(Failure::new(code, message).with_kind("TestError"));
            }
            w.write_object(&format!("{}.{}", func.a, func.b))?;
            Ok(())
        })
        .op(OP_THREAD, |_, w| {
            let name = std::thread::current().name().map(str::to_owned);
            w.write_string(name.as_deref())?;
            Ok(())
        })
        .scalar(OP_INCREMENT, |v| Ok(v + 1))
}

/// A member type whose `OP_INDEX` answers with its own index.
pub fn indexed_type(index: i32) -> ObjectType {
    ObjectType::new(format!("Node{}", index)).op(OP_INDEX, move |_, w| {
        w.write_i32(index)?;
        Ok(())
    })
}

pub struct Fixture {
    pub engine: Arc<LoopbackEngine>,
    pub env: Arc<Environment>,
}

pub fn fixture() -> anyhow::Result<Fixture> {
    fixture_with(interop::Config::default())
}

pub fn fixture_with(config: interop::Config) -> anyhow::Result<Fixture> {
    init_tracing();
    let registry = registry()?;
    let engine = Arc::new(LoopbackEngine::new(registry.clone(), 4)?);
    engine.register(compute_type());
    let env = Environment::builder(engine.clone()).registry(registry).config(config).build();
    Ok(Fixture { engine, env })
}
