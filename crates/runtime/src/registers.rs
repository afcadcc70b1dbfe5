//! Register storage: per-call local frames and the persistent `state` bank
//! backing `spec.md` §3's `Local`/`State` operand kinds.

use vvm_core::{Dataframe, Value};

/// What a register actually holds. Most operands resolve to a [`Value`];
/// `group`'s per-label sub-tables don't fit that model (there is no
/// `Value::List` case), so they get their own transient variant, read back
/// only through the `subtable` instruction.
#[derive(Debug, Clone)]
pub enum RegisterSlot {
    Value(Value),
    SubTables(Vec<Dataframe>),
}

impl RegisterSlot {
    pub fn as_value(&self) -> &Value {
        match self {
            RegisterSlot::Value(v) => v,
            RegisterSlot::SubTables(_) => panic!("register holds sub-tables, not a Value"),
        }
    }

    pub fn as_sub_tables(&self) -> &[Dataframe] {
        match self {
            RegisterSlot::SubTables(ts) => ts,
            RegisterSlot::Value(_) => panic!("register holds a Value, not sub-tables"),
        }
    }

    pub fn as_dataframe_mut(&mut self) -> &mut Dataframe {
        match self {
            RegisterSlot::Value(Value::Dataframe(df)) => df,
            _ => panic!("register does not hold a Dataframe"),
        }
    }
}

/// A call frame's local register bank, grown on demand (codegen assigns
/// dense indices from `FunctionDef::local_count`, but the top-level
/// "frame" has no fixed size up front).
#[derive(Debug, Default)]
pub struct Frame {
    locals: Vec<Option<RegisterSlot>>,
}

impl Frame {
    pub fn new(local_count: u32) -> Self {
        Frame { locals: (0..local_count).map(|_| None).collect() }
    }

    pub fn get(&self, idx: u32) -> &RegisterSlot {
        self.locals[idx as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("read of uninitialised local register {idx}"))
    }

    pub fn get_mut(&mut self, idx: u32) -> &mut RegisterSlot {
        self.locals[idx as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("read of uninitialised local register {idx}"))
    }

    pub fn set(&mut self, idx: u32, slot: RegisterSlot) {
        if idx as usize >= self.locals.len() {
            self.locals.resize_with(idx as usize + 1, || None);
        }
        self.locals[idx as usize] = Some(slot);
    }
}

/// The persistent mutable global bank backing `var`-declared bindings, kept
/// alive across `evaluate()` calls within one `Session`.
#[derive(Debug, Default)]
pub struct StateBank {
    slots: Vec<Option<RegisterSlot>>,
}

impl StateBank {
    pub fn get(&self, idx: u32) -> &RegisterSlot {
        self.slots[idx as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("read of uninitialised state register {idx}"))
    }

    pub fn get_mut(&mut self, idx: u32) -> &mut RegisterSlot {
        self.slots[idx as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("read of uninitialised state register {idx}"))
    }

    pub fn set(&mut self, idx: u32, slot: RegisterSlot) {
        if idx as usize >= self.slots.len() {
            self.slots.resize_with(idx as usize + 1, || None);
        }
        self.slots[idx as usize] = Some(slot);
    }
}
