//! End-to-end source-to-display tests, driving the full pipeline (lexer,
//! parser, analyzer, codegen, VM) through `vvm_compiler::evaluate`.

use vvm_compiler::{evaluate, EvaluationMode};

fn run(src: &str) -> String {
    evaluate(src, EvaluationMode::Script).unwrap().expect("expression should produce a displayable result")
}

fn run_err(src: &str) -> String {
    evaluate(src, EvaluationMode::Script).unwrap_err().to_string()
}

#[test]
fn integer_arithmetic() {
    assert_eq!(run("3 + 7"), "10");
}

#[test]
fn dataframe_literal_displays_as_a_table() {
    let src = r#"
data Person: name: String, age: Int64 end
!Person(["A", "B"], [1, 2])
"#;
    assert_eq!(run(src), "name age\nA 1\nB 2");
}

#[test]
fn vector_scalar_broadcast() {
    let src = "let xs = [1.0, 2.0, 3.0]\nxs * 3.0";
    assert_eq!(run(src), "3 6 9");
}

#[test]
fn vector_length_mismatch_is_a_runtime_error() {
    let src = "let xs = [1.0, 2.0, 3.0]\nxs * [2.0, 4.0]";
    assert!(run_err(src).contains("Mismatch array lengths"));
}

#[test]
fn grouped_query_sums_by_key() {
    let src = r#"
data Price: symbol: String, volume: Int64 end
let prices = !Price(["A", "B", "A"], [10, 20, 5])
from prices select total = sum(volume) by symbol
"#;
    assert_eq!(run(src), "symbol total\nA 15\nB 20");
}

#[test]
fn asof_join_backward_takes_the_last_right_row_not_after_left() {
    let src = r#"
data Trade: date: Int64, price: Float64 end
data Quote: date: Int64, bid: Float64 end
let lefts = !Trade([2, 12], [1.5, 2.5])
let rights = !Quote([0, 5, 20], [100.0, 101.0, 102.0])
join lefts, rights asof lefts.date, rights.date backward within 20
"#;
    // date=2 -> last right date <= 2 is 0 (bid 100); date=12 -> last right
    // date <= 12 is 5 (bid 101); both within the generous 20-unit tolerance.
    assert_eq!(run(src), "date price bid\n 2 1.5 100\n12 2.5 101");
}

#[test]
fn template_instantiations_are_distinct_types() {
    let ok = r#"
data Person{T}: name: String, age: T end
Person{Float64}("A", 1.2)
"#;
    assert!(run(ok).contains("A"));

    let bad = r#"
data Person{T}: name: String, age: T end
Person{Int64}("A", 1.2)
"#;
    assert!(run_err(bad).contains("type mismatch"));
}

#[test]
fn csv_round_trips_through_store_and_load_builtins() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();

    let write_src = format!(
        r#"
data Person: name: String, age: Int64 end
let people = !Person(["A", "B"], [1, 2])
store(people, "{path}")
"#
    );
    run(&write_src);

    let read_src = format!(
        r#"
data Person: name: String, age: Int64 end
load{{!Person}}("{path}")
"#
    );
    assert_eq!(run(&read_src), "name age\nA 1\nB 2");
}

#[test]
fn load_rejects_a_non_dataframe_type_argument() {
    let src = r#"
load{Int64}("whatever.csv")
"#;
    assert!(run_err(src).contains("Dataframe"));
}
