//! Tagged operands.
//!
//! An [`Operand`] is a non-negative integer with a 3-bit tag selecting one
//! of `Immediate | Local | Global | State | Type`. Local/Global operands
//! index typed register banks; immediates embed a small integer; `Type`
//! operands carry a [`TypeCode`] through the bytecode.

use crate::type_code::TypeCode;
use std::fmt;

/// Maximum value an `Immediate` operand's payload may hold.
pub const IMMEDIATE_MAX: u32 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Immediate,
    Local,
    Global,
    State,
    Type,
}

impl OperandKind {
    fn tag(self) -> u32 {
        match self {
            OperandKind::Immediate => 0,
            OperandKind::Local => 1,
            OperandKind::Global => 2,
            OperandKind::State => 3,
            OperandKind::Type => 4,
        }
    }

    fn from_tag(tag: u32) -> OperandKind {
        match tag {
            0 => OperandKind::Immediate,
            1 => OperandKind::Local,
            2 => OperandKind::Global,
            3 => OperandKind::State,
            4 => OperandKind::Type,
            other => panic!("invalid operand tag {other}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand(u32);

const TAG_BITS: u32 = 3;
const TAG_MASK: u32 = (1 << TAG_BITS) - 1;

impl Operand {
    pub fn new(kind: OperandKind, payload: u32) -> Operand {
        assert!(payload <= IMMEDIATE_MAX, "operand payload overflow");
        Operand((payload << TAG_BITS) | kind.tag())
    }

    pub fn immediate(value: u32) -> Operand {
        Operand::new(OperandKind::Immediate, value)
    }

    pub fn local(slot: u32) -> Operand {
        Operand::new(OperandKind::Local, slot)
    }

    pub fn global(slot: u32) -> Operand {
        Operand::new(OperandKind::Global, slot)
    }

    pub fn state(slot: u32) -> Operand {
        Operand::new(OperandKind::State, slot)
    }

    pub fn ty(code: TypeCode) -> Operand {
        Operand::new(OperandKind::Type, code.raw())
    }

    pub fn kind(self) -> OperandKind {
        OperandKind::from_tag(self.0 & TAG_MASK)
    }

    pub fn payload(self) -> u32 {
        self.0 >> TAG_BITS
    }

    pub fn as_type_code(self) -> Option<TypeCode> {
        if self.kind() == OperandKind::Type {
            Some(TypeCode::from_raw(self.payload()))
        } else {
            None
        }
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Operand {
        Operand(raw)
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            OperandKind::Immediate => write!(f, "#{}", self.payload()),
            OperandKind::Local => write!(f, "l{}", self.payload()),
            OperandKind::Global => write!(f, "g{}", self.payload()),
            OperandKind::State => write!(f, "s{}", self.payload()),
            OperandKind::Type => write!(f, "t{}", self.payload()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_kind() {
        let cases: Vec<(OperandKind, fn(u32) -> Operand)> = vec![
            (OperandKind::Immediate, Operand::immediate),
            (OperandKind::Local, Operand::local),
            (OperandKind::Global, Operand::global),
            (OperandKind::State, Operand::state),
        ];
        for (kind, make) in cases {
            let op = make(7);
            assert_eq!(op.kind(), kind);
            assert_eq!(op.payload(), 7);
        }
    }
}
