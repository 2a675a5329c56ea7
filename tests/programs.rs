//! Pruebas de extremo a extremo: cada programa se compila completo y
//! el listado enlazado se corre en la máquina de referencia.

use compiler::{
    compile,
    error::{CompileError, Diagnostic},
    link::EmitOptions,
    machine::{Asm, Dest, Machine},
    semantic::SemanticError,
};

fn build(text: &str) -> Vec<Asm> {
    compile("program.imp", text, EmitOptions::empty())
        .unwrap_or_else(|diagnostic| panic!("compilation failed:\n{}", diagnostic))
}

fn run(text: &str, input: &[u64]) -> Vec<u64> {
    let code = build(text);

    let mut machine = Machine::with_input(input.iter().copied());
    machine.run(&code).expect("program did not halt");
    machine.output().to_vec()
}

fn reject(text: &str) -> Diagnostic {
    match compile("program.imp", text, EmitOptions::empty()) {
        Ok(_) => panic!("compilation should have failed"),
        Err(diagnostic) => diagnostic,
    }
}

#[test]
fn assign_and_write() {
    assert_eq!(run("declare a begin a := 5; write a; end", &[]), [5]);
}

#[test]
fn write_literal_goes_through_the_scratch_cell() {
    assert_eq!(run("begin write 42; end", &[]), [42]);
}

#[test]
fn read_echo() {
    assert_eq!(
        run("declare a begin read a; write a; end", &[7]),
        [7]
    );
}

#[test]
fn arithmetic_over_input() {
    let program = "declare a, b, c \
                   begin \
                     read a; read b; \
                     c := a + b; write c; \
                     c := a - b; write c; \
                     c := a * b; write c; \
                     c := a / b; write c; \
                     c := a % b; write c; \
                   end";

    assert_eq!(run(program, &[17, 5]), [22, 12, 85, 3, 2]);
    assert_eq!(run(program, &[3, 9]), [12, 0, 27, 0, 3]);
}

#[test]
fn division_by_zero_writes_zero() {
    assert_eq!(
        run("declare a begin a := 1 / 0; write a; end", &[]),
        [0]
    );

    assert_eq!(
        run("declare a, b begin b := 0; a := 7 % b; write a; end", &[]),
        [0]
    );
}

#[test]
fn multiply_by_two_compiles_to_a_shift() {
    let code = build("declare a, b begin a := 4; b := a * 2; write b; end");

    // La especialización evita la rutina general: ningún JODD aparece.
    assert!(code.iter().any(|asm| matches!(asm, Asm::Shl(_))));
    assert!(!code.iter().any(|asm| matches!(asm, Asm::Jodd(..))));

    let mut machine = Machine::new();
    machine.run(&code).unwrap();
    assert_eq!(machine.output(), &[8]);
}

#[test]
fn increment_specialization_avoids_general_addition() {
    let code = build("declare a begin a := 3; a := a + 1; write a; end");
    assert!(code.iter().any(|asm| matches!(asm, Asm::Inc(_))));

    let mut machine = Machine::new();
    machine.run(&code).unwrap();
    assert_eq!(machine.output(), &[4]);
}

#[test]
fn if_takes_the_correct_branch() {
    let program = "declare a, r \
                   begin \
                     read a; \
                     if a > 3 then r := 1; else r := 0; endif \
                     write r; \
                   end";

    assert_eq!(run(program, &[5]), [1]);
    assert_eq!(run(program, &[3]), [0]);
}

#[test]
fn all_comparisons_behave() {
    let program = "declare a, b, r \
                   begin \
                     read a; read b; \
                     if a < b then r := 1; else r := 0; endif write r; \
                     if a > b then r := 1; else r := 0; endif write r; \
                     if a <= b then r := 1; else r := 0; endif write r; \
                     if a >= b then r := 1; else r := 0; endif write r; \
                     if a = b then r := 1; else r := 0; endif write r; \
                     if a != b then r := 1; else r := 0; endif write r; \
                   end";

    assert_eq!(run(program, &[2, 3]), [1, 0, 1, 0, 0, 1]);
    assert_eq!(run(program, &[3, 3]), [0, 0, 1, 1, 1, 0]);
    assert_eq!(run(program, &[4, 3]), [0, 1, 0, 1, 0, 1]);
}

#[test]
fn while_counts_down() {
    let program = "declare n \
                   begin \
                     read n; \
                     while n > 0 do write n; n := n - 1; endwhile \
                   end";

    assert_eq!(run(program, &[3]), [3, 2, 1]);
    assert_eq!(run(program, &[0]), []);
}

#[test]
fn repeat_runs_at_least_once() {
    let program = "declare n \
                   begin \
                     n := 0; \
                     repeat n := n + 1; write n; until n = 3; \
                   end";

    assert_eq!(run(program, &[]), [1, 2, 3]);
}

#[test]
fn for_to_iterates_in_order() {
    assert_eq!(
        run("declare x begin for x from 1 to 3 do write x; endfor end", &[]),
        [1, 2, 3]
    );
}

#[test]
fn for_downto_reaches_zero_without_wrapping() {
    assert_eq!(
        run("begin for i from 2 downto 0 do write i; endfor end", &[]),
        [2, 1, 0]
    );
}

#[test]
fn for_bounds_can_be_variables() {
    let program = "declare n \
                   begin \
                     read n; \
                     for i from 1 to n do write i; endfor \
                   end";

    assert_eq!(run(program, &[4]), [1, 2, 3, 4]);

    // Cota menor que el inicio: cero iteraciones.
    assert_eq!(run(program, &[0]), []);
}

#[test]
fn nested_loops_share_the_iterator_stack() {
    let program = "begin \
                     for i from 1 to 3 do \
                       for j from 1 to i do write j; endfor \
                     endfor \
                   end";

    assert_eq!(run(program, &[]), [1, 1, 2, 1, 2, 3]);
}

#[test]
fn arrays_with_nonzero_low_bound() {
    let program = "declare t(5:9), i, s \
                   begin \
                     for i from 5 to 9 do t(i) := i * i; endfor \
                     s := t(7); \
                     write s; \
                     write t(9); \
                   end";

    assert_eq!(run(program, &[]), [49, 81]);
}

#[test]
fn array_sum_through_variable_indices() {
    let program = "declare t(0:4), i, s \
                   begin \
                     for i from 0 to 4 do read t(i); endfor \
                     s := 0; \
                     for i from 0 to 4 do s := s + t(i); endfor \
                     write s; \
                   end";

    assert_eq!(run(program, &[1, 2, 3, 4, 5]), [15]);
}

#[test]
fn out_of_range_index_aborts_without_output() {
    let diagnostic = reject("declare t(0:3) begin t(5) := 1; end");

    assert!(matches!(
        diagnostic.error(),
        CompileError::Semantic(SemanticError::IndexOutOfRange { index: 5, .. })
    ));

    assert_eq!(diagnostic.status(), 5);
}

#[test]
fn error_classes_have_distinct_statuses() {
    // Léxico: carácter inválido.
    assert_eq!(reject("begin ? end").status(), 3);

    // Sintáctico: no hay comandos.
    assert_eq!(reject("begin end").status(), 4);

    // Semántico: identificador sin declarar.
    assert_eq!(reject("begin a := 1; end").status(), 5);
}

#[test]
fn unlinked_mode_preserves_labels() {
    let program = "declare a begin a := 1; if a = 1 then a := 2; endif write a; end";

    let unlinked = compile("program.imp", program, EmitOptions::UNLINKED).unwrap();
    assert!(unlinked.iter().any(|asm| matches!(asm, Asm::Label(_))));
    assert!(unlinked
        .iter()
        .any(|asm| matches!(asm, Asm::Jzero(_, Dest::Symbolic(_)))));

    let linked = compile("program.imp", program, EmitOptions::empty()).unwrap();
    assert!(linked.iter().all(Asm::is_real));

    let mut machine = Machine::new();
    machine.run(&linked).unwrap();
    assert_eq!(machine.output(), &[2]);
}

#[test]
fn iterators_do_not_leak_between_loops() {
    // El mismo nombre puede reutilizarse en lazos consecutivos.
    let program = "begin \
                     for i from 1 to 2 do write i; endfor \
                     for i from 5 to 6 do write i; endfor \
                   end";

    assert_eq!(run(program, &[]), [1, 2, 5, 6]);
}

#[test]
fn modulo_of_equal_operands_is_zero() {
    assert_eq!(
        run("declare a, b begin read a; read b; a := a % b; write a; end", &[9, 9]),
        [0]
    );
}

#[test]
fn comments_do_not_reach_the_parser() {
    assert_eq!(
        run("begin [esto no compila: write x;] write 1; end", &[]),
        [1]
    );
}
