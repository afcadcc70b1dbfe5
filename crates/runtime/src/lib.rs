//! Vector VM runtime: the register banks, bytecode model, dispatch loop and
//! table/CSV/display kernels that execute a [`Program`] produced by
//! `vvm_compiler`.
//!
//! # Modules
//!
//! - `program`: the `Instruction` set, constant pool and `Program` bundle.
//! - `registers`: per-call `Frame`s and the persistent `StateBank`.
//! - `dispatch`: `Vm`, the instruction dispatch loop.
//! - `config`: `VmConfig`.
//! - `error`: `RuntimeError`.
//! - `kernels`: table ops (categorise/group/asof/sort/...), CSV load/store,
//!   `repr`/`print` rendering, and element-wise arithmetic/comparison.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod kernels;
pub mod program;
pub mod registers;

pub use config::VmConfig;
pub use dispatch::Vm;
pub use error::RuntimeError;
pub use program::{ArithOp, AsofDirection, CmpOp, ConstantValue, FunctionDef, Instruction, LogicOp, Program, ReduceOp, Shape2};
pub use registers::{Frame, RegisterSlot, StateBank};
