//! Per-opcode framing, registration checks and buffer limits.
//!
//! The affinity-style commands below deliberately frame their lists
//! differently: `PrimaryPartitions` replies with a leading tag byte before
//! the count, `PartitionOwners` does not.

mod common;

use std::sync::Arc;

use interop::Command;
use interop::Config;
use interop::ErrorKind;
use interop::Failure;
use interop::ObjectType;
use interpack::BinaryType;
use interpack::Guid;
use interpack::Memory;
use interpack::Reader;
use interpack::Writer;

const OP_PARTITIONS: i32 = 1;
const OP_PRIMARY_PARTITIONS: i32 = 2;
const OP_PARTITION_OWNERS: i32 = 3;
const OP_ECHO: i32 = 4;

const AFFINITY: &str = "Affinity";
const NODE: Guid = Guid::new(0x1122, 0x3344);

fn affinity_type() -> ObjectType {
    ObjectType::new(AFFINITY)
        .scalar(OP_PARTITIONS, |_| Ok(1024))
        .op(OP_PRIMARY_PARTITIONS, |r, w| {
            let node = r.read_guid()?;
            if node != NODE {
                return Err(Failure::new(1, format!("unknown node {}", node)));
            }
            w.write_i8(1)?;
            w.write_seq(&[3, 5, 7], |w, p| w.write_i32(*p))?;
            Ok(())
        })
        .op(OP_PARTITION_OWNERS, |r, w| {
            let parts = r.read_seq(|r| r.read_object::<i32>())?;
            w.write_seq(&parts, |w, p| {
                w.write_i32(*p)?;
                w.write_guid(NODE)
            })?;
            Ok(())
        })
        .op(OP_ECHO, |r, w| {
            while r.remaining() > 0 {
                w.write_u8(r.read_u8()?)?;
            }
            Ok(())
        })
}

/// Primary partitions of a node.
///
/// Request: `guid node`. Reply: `i8 tag`, `i32 count`, `count x i32`.
struct PrimaryPartitions;

impl Command for PrimaryPartitions {
    const OPCODE: i32 = OP_PRIMARY_PARTITIONS;

    type Input = Guid;
    type Output = Vec<i32>;

    fn encode(node: &Guid, w: &mut Writer<'_>) -> interpack::Result<()> {
        w.write_guid(*node)
    }

    fn decode(r: &mut Reader<'_>) -> interpack::Result<Vec<i32>> {
        r.read_i8()?;
        r.read_seq(|r| r.read_i32())
    }
}

/// Owner node of each partition.
///
/// Request: `i32 count`, `count x tagged i32`. Reply: `i32 count`,
/// `count x (i32 partition, guid node)`.
struct PartitionOwners;

impl Command for PartitionOwners {
    const OPCODE: i32 = OP_PARTITION_OWNERS;

    type Input = Vec<i32>;
    type Output = Vec<(i32, Guid)>;

    fn encode(parts: &Vec<i32>, w: &mut Writer<'_>) -> interpack::Result<()> {
        w.write_seq(parts, |w, p| w.write_object(p))
    }

    fn decode(r: &mut Reader<'_>) -> interpack::Result<Vec<(i32, Guid)>> {
        r.read_seq(|r| Ok((r.read_i32()?, r.read_guid()?)))
    }
}

/// Never registered anywhere.
#[derive(Debug)]
struct Unlisted;

impl BinaryType for Unlisted {
    const TYPE_NAME: &'static str = "Unlisted";

    fn write(&self, _w: &mut Writer<'_>) -> interpack::Result<()> {
        Ok(())
    }

    fn read(_r: &mut Reader<'_>) -> interpack::Result<Self> {
        Ok(Self)
    }
}

fn affinity(fx: &common::Fixture) -> anyhow::Result<interop::Target> {
    fx.engine.register(affinity_type());
    Ok(fx.env.create(AFFINITY, |_| Ok(()))?)
}

// --- Test 1: Leading tag byte ---

#[test]
fn test_leading_tag_decodes_with_own_decoder() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    assert_eq!(target.execute::<PrimaryPartitions>(&NODE)?, vec![3, 5, 7]);
    Ok(())
}

#[test]
fn test_leading_tag_breaks_generic_decoder() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    let err = target
        .out_in_op(OP_PRIMARY_PARTITIONS, |w| w.write_guid(NODE), |r| r.read_seq(|r| r.read_i32()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    Ok(())
}

// --- Test 2: Tagged elements in, plain pairs out ---

#[test]
fn test_partition_owners() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    let owners = target.execute::<PartitionOwners>(&vec![1, 9])?;
    assert_eq!(owners, vec![(1, NODE), (9, NODE)]);

    let owners = target.execute_async::<PartitionOwners>(&vec![4]).get_value()?;
    assert_eq!(owners, vec![(4, NODE)]);
    Ok(())
}

#[test]
fn test_empty_partition_list() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    assert!(target.execute::<PartitionOwners>(&Vec::new())?.is_empty());
    Ok(())
}

#[test]
fn test_remote_validation_failure() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    let err = target.execute::<PrimaryPartitions>(&Guid::new(0, 1)).unwrap_err();
    assert!(err.is_remote());
    assert!(err.message().starts_with("unknown node"));
    Ok(())
}

#[test]
fn test_scalar_partitions() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    assert_eq!(target.out_in_op_scalar(OP_PARTITIONS, 0)?, 1024);
    Ok(())
}

// --- Test 3: Raw buffers ---

#[test]
fn test_in_stream_out_stream() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = affinity(&fx)?;
    let input = Memory::from_bytes(&[1, 2, 3, 4]);
    let mut output = fx.env.allocate()?;
    target.in_stream_out_stream(OP_ECHO, &input, &mut output)?;
    assert_eq!(output.as_slice(), &[1, 2, 3, 4]);
    Ok(())
}

// --- Test 4: Registration checked before dispatch ---

#[test]
fn test_unregistered_type_never_reaches_engine() -> anyhow::Result<()> {
    let fx = common::fixture()?;
    let target = fx.env.create(common::COMPUTE, |_| Ok(()))?;
    let before = fx.engine.call_count();

    let err = target.out_in_object::<Unlisted, String>(common::OP_CALL, &Unlisted).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert!(err.message().contains("Unlisted"));

    let err = target.out_in_object::<common::Func, Unlisted>(common::OP_CALL, &common::Func::new(1, 2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);

    let err = target
        .out_in_object_async::<Unlisted, String>(common::OP_CALL, &Unlisted)
        .get_value()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);

    assert_eq!(fx.engine.call_count(), before);
    assert_eq!(fx.env.pending(), 0);
    Ok(())
}

// --- Test 5: Buffer limits ---

#[test]
fn test_buffer_limit_is_out_of_memory() -> anyhow::Result<()> {
    let fx = common::fixture_with(Config::default().with_initial_capacity(32).with_buffer_limit(64))?;
    let target = affinity(&fx)?;
    let before = fx.engine.call_count();

    let parts: Vec<i32> = (0..100).collect();
    let err = target.execute::<PartitionOwners>(&parts).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    let err = target.execute_async::<PartitionOwners>(&parts).get_value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(fx.engine.call_count(), before);

    assert_eq!(target.execute::<PartitionOwners>(&vec![2])?, vec![(2, NODE)]);
    Ok(())
}

#[test]
fn test_shared_registry_is_read_only() -> anyhow::Result<()> {
    let registry = common::registry()?;
    let copies: Vec<_> = (0..4).map(|_| Arc::clone(&registry)).collect();
    assert!(copies.iter().all(|r| r.by_name("func1").is_some()));
    assert_eq!(registry.names(), vec!["Func1"]);
    Ok(())
}
