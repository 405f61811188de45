//! # Commands
//!
//! A `Command` binds one opcode to its argument and result framing.
//!
//! Framing is a per-opcode contract. Two commands that both return a list
//! may frame it differently (one with a leading tag byte before the count,
//! one without); each implementation documents its own layout and decodes
//! exactly that, nothing is normalized across opcodes.

use interpack::Reader;
use interpack::Writer;

pub trait Command: 'static {
    const OPCODE: i32;

    type Input;
    type Output;

    fn encode(input: &Self::Input, writer: &mut Writer<'_>) -> interpack::Result<()>;

    fn decode(reader: &mut Reader<'_>) -> interpack::Result<Self::Output>;
}
