//! End-to-end dispatch-loop tests: hand-assembled [`Program`]s run through
//! [`Vm`], exercising arithmetic, control flow, recursion and Dataframe
//! construction without going through the compiler.

use vvm_core::{BuiltinKind, Operand, Scalar, Shape, TypeCode, UserDefinedType, Value};
use vvm_runtime::{ArithOp, CmpOp, ConstantValue, FunctionDef, Instruction, Program, Shape2, Vm, VmConfig};

fn int(n: i64) -> ConstantValue {
    ConstantValue::Int64(n)
}

#[test]
fn adds_two_constants_and_returns_the_sum() {
    let mut program = Program::new();
    program.constants.push(int(2));
    program.constants.push(int(3));
    program.top_level_locals = 1;
    program.instructions = vec![
        Instruction::LoadConst { dst: Operand::local(0), const_idx: 0 },
        Instruction::BinArith {
            op: ArithOp::Add,
            shape: Shape2::ScalarScalar,
            a: Operand::local(0),
            b: Operand::global(1),
            dst: Operand::local(0),
        },
        Instruction::Ret { value: Operand::local(0) },
    ];

    let mut vm = Vm::new(&program, VmConfig::default());
    let result = vm.run().unwrap();
    assert_eq!(result, Some(Value::Scalar(Scalar::Int64(5))));
}

#[test]
fn branch_skips_the_false_arm() {
    // if 1 < 2 { 10 } else { 20 }
    let mut program = Program::new();
    program.constants.push(int(1));
    program.constants.push(int(2));
    program.constants.push(int(10));
    program.constants.push(int(20));
    program.top_level_locals = 1;
    program.instructions = vec![
        Instruction::Compare {
            op: CmpOp::Lt,
            shape: Shape2::ScalarScalar,
            a: Operand::global(0),
            b: Operand::global(1),
            dst: Operand::local(0),
        },
        Instruction::BFalse { cond: Operand::local(0), target: 4 },
        Instruction::LoadConst { dst: Operand::local(0), const_idx: 2 },
        Instruction::Br { target: 5 },
        Instruction::LoadConst { dst: Operand::local(0), const_idx: 3 },
        Instruction::Ret { value: Operand::local(0) },
    ];

    let mut vm = Vm::new(&program, VmConfig::default());
    let result = vm.run().unwrap();
    assert_eq!(result, Some(Value::Scalar(Scalar::Int64(10))));
}

#[test]
fn recursive_call_computes_factorial() {
    // fn fact(n) { if n < 2 { 1 } else { n * fact(n - 1) } }; fact(5)
    let mut program = Program::new();
    program.constants.push(int(2)); // @0
    program.constants.push(int(1)); // @1
    program.constants.push(int(5)); // @2

    let fact_entry = 0usize;
    // fact(n): local0 = n
    // 0: cmp n < 2 -> local1
    // 1: bfalse local1 -> 3 (skip the base-case ret)
    // 2: ret @1 (=1)
    // 3: sub n - 1 -> local2
    // 4: call fact(local2) -> local3
    // 5: mul n * local3 -> local4
    // 6: ret local4
    let fact_instrs = vec![
        Instruction::Compare {
            op: CmpOp::Lt,
            shape: Shape2::ScalarScalar,
            a: Operand::local(0),
            b: Operand::global(0),
            dst: Operand::local(1),
        },
        Instruction::BFalse { cond: Operand::local(1), target: fact_entry + 3 },
        Instruction::Ret { value: Operand::global(1) },
        Instruction::BinArith {
            op: ArithOp::Sub,
            shape: Shape2::ScalarScalar,
            a: Operand::local(0),
            b: Operand::global(1),
            dst: Operand::local(2),
        },
        Instruction::Call { func_const: 3, args: vec![Operand::local(2)], dst: Operand::local(3) },
        Instruction::BinArith {
            op: ArithOp::Mul,
            shape: Shape2::ScalarScalar,
            a: Operand::local(0),
            b: Operand::local(3),
            dst: Operand::local(4),
        },
        Instruction::Ret { value: Operand::local(4) },
    ];
    let fact_end = fact_instrs.len();
    program.instructions = fact_instrs;
    program.constants.push(ConstantValue::FunctionDef(FunctionDef {
        name: "fact".to_string(),
        arity: 1,
        entry: fact_entry,
        end: fact_end,
        local_count: 5,
    })); // @3

    let top_start = program.instructions.len();
    program.instructions.push(Instruction::Call { func_const: 3, args: vec![Operand::global(2)], dst: Operand::local(0) });
    program.instructions.push(Instruction::Ret { value: Operand::local(0) });
    program.top_level_locals = 1;

    let mut vm = Vm::new(&program, VmConfig::default());
    let result = vm.run_from(top_start).unwrap();
    assert_eq!(result, Some(Value::Scalar(Scalar::Int64(120))));
}

#[test]
fn alloc_append_and_read_member_build_a_dataframe_column() {
    let mut interner = vvm_core::TypeInterner::new();
    let scalar_ty = interner.intern(UserDefinedType {
        name: "Point".to_string(),
        fields: vec![
            ("x".to_string(), TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar)),
            ("y".to_string(), TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar)),
        ],
    });
    let df_ty = interner.intern_dataframe_of(scalar_ty).unwrap();

    let mut program = Program::new();
    program.types = interner;
    program.constants.push(int(1));
    program.constants.push(int(2));
    program.top_level_locals = 1;
    program.instructions = vec![
        Instruction::Alloc { ty: Operand::ty(df_ty), dst: Operand::local(0) },
        Instruction::AppendMember { target: Operand::local(0), field: 0, value: Operand::global(0) },
        Instruction::AppendMember { target: Operand::local(0), field: 1, value: Operand::global(1) },
        Instruction::ReadMember { src: Operand::local(0), field: 0, dst: Operand::local(1) },
        Instruction::Ret { value: Operand::local(1) },
    ];

    let mut vm = Vm::new(&program, VmConfig::default());
    let result = vm.run().unwrap();
    match result {
        Some(Value::Vector(v)) => assert_eq!(v.len(), 1),
        other => panic!("expected a Vector, got {other:?}"),
    }
}

#[test]
fn state_bank_survives_across_separate_runs() {
    // Mirrors how a Session keeps `var` bindings alive across evaluate()
    // calls: a State write in one run is visible to a later run sharing the
    // same StateBank.
    let mut program = Program::new();
    program.constants.push(int(7));
    program.top_level_locals = 1;
    program.instructions = vec![
        Instruction::LoadConst { dst: Operand::state(0), const_idx: 0 },
        Instruction::Halt,
    ];

    let mut vm = Vm::new(&program, VmConfig::default());
    vm.run().unwrap();
    let state = vm.into_state();

    let mut program2 = Program::new();
    program2.top_level_locals = 1;
    program2.instructions = vec![Instruction::Ret { value: Operand::state(0) }];

    let mut vm2 = Vm::with_state(&program2, VmConfig::default(), state);
    let result = vm2.run().unwrap();
    assert_eq!(result, Some(Value::Scalar(Scalar::Int64(7))));
}

#[test]
fn division_by_zero_yields_nil_not_an_error() {
    let mut program = Program::new();
    program.constants.push(int(10));
    program.constants.push(int(0));
    program.top_level_locals = 1;
    program.instructions = vec![
        Instruction::BinArith {
            op: ArithOp::Div,
            shape: Shape2::ScalarScalar,
            a: Operand::global(0),
            b: Operand::global(1),
            dst: Operand::local(0),
        },
        Instruction::Ret { value: Operand::local(0) },
    ];

    let mut vm = Vm::new(&program, VmConfig::default());
    let result = vm.run().unwrap();
    assert_eq!(result, Some(Value::Scalar(Scalar::Int64(vvm_core::NIL_INT))));
}
