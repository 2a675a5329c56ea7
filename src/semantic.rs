//! Análisis semántico y generación de código intermedio.
//!
//! Esta fase recorre el árbol sintáctico una única vez. Cada
//! referencia a un operando se valida contra la tabla de símbolos
//! antes de usarse; la primera violación aborta la compilación
//! completa. Del recorrido se obtiene un listado lineal de código de
//! tres direcciones ([`Ir`]) que opera sobre direcciones de la tabla
//! y sobre temporales sintetizados por el analizador.
//!
//! Las comparaciones de condiciones se emiten negadas: el salto
//! generado debe brincar el cuerpo verdadero precisamente cuando la
//! condición original falla.
//!
//! Los contadores de nombres frescos (temporales, etiquetas, cotas
//! ocultas de lazos) son campos del contexto del analizador y nunca
//! estado global.

use thiserror::Error;

use crate::{
    ir::{ArithOp, CmpOp, Ir, Labels, Listing, Operand, Temp},
    lex::Identifier,
    parse::{Command, Condition, DeclKind, Declaration, Expr, Index, Program, Target, Value},
    source::Located,
    symbols::{Array, Scalar, Symbol, SymbolError, SymbolTable},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

/// Violación detectada durante el análisis semántico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("Symbol `{0}` is undeclared")]
    Undeclared(Identifier),

    #[error("`{0}` is an array, not a variable")]
    ExpectedScalar(Identifier),

    #[error("`{0}` is a variable, not an array")]
    ExpectedArray(Identifier),

    #[error("Index {index} is outside the declared range of `{name}`")]
    IndexOutOfRange { name: Identifier, index: u64 },

    #[error("Variable `{0}` has no value assigned yet")]
    Uninitialized(Identifier),

    #[error("Cannot modify loop iterator `{0}`")]
    AssignToIterator(Identifier),
}

/// Cota superior o inferior de un lazo `for`.
///
/// Una cota no literal se evalúa una única vez antes de entrar al
/// lazo, hacia un símbolo oculto, para no reevaluar una expresión
/// cambiante en cada iteración.
enum Bound {
    Literal(u64),
    Hidden { name: Identifier, address: u64 },
}

pub struct Analyzer {
    symbols: SymbolTable,
    code: Vec<Ir>,
    labels: Labels,
    temps: u32,
    bounds: u32,
}

impl Analyzer {
    /// Valida un programa completo y lo baja a código intermedio.
    pub fn lower(program: &Program) -> Semantic<Listing> {
        let mut analyzer = Analyzer {
            symbols: SymbolTable::new(),
            code: Vec::new(),
            labels: Labels::default(),
            temps: 0,
            bounds: 0,
        };

        for declaration in &program.declarations {
            analyzer.declare(declaration)?;
        }

        analyzer.block(&program.commands)?;
        analyzer.emit(Ir::Halt);

        Ok(Listing {
            code: analyzer.code,
            labels: analyzer.labels,
        })
    }

    fn declare(&mut self, declaration: &Declaration) -> Semantic<()> {
        let name = declaration.name.as_ref();
        let result = match declaration.kind {
            DeclKind::Scalar => self.symbols.declare_scalar(name),
            DeclKind::Array { low, high } => self.symbols.declare_array(name, low, high),
        };

        result.map_err(|error| {
            Located::at(error.into(), declaration.name.location().clone())
        })
    }

    fn block(&mut self, commands: &[Command]) -> Semantic<()> {
        for command in commands {
            self.command(command)?;
        }

        Ok(())
    }

    fn command(&mut self, command: &Command) -> Semantic<()> {
        match command {
            Command::Assign { target, value } => self.assign(target, value),
            Command::If { condition, body } => self.if_only(condition, body),

            Command::IfElse {
                condition,
                then_body,
                else_body,
            } => self.if_else(condition, then_body, else_body),

            Command::While { condition, body } => self.while_loop(condition, body),
            Command::Repeat { body, condition } => self.repeat_loop(body, condition),

            Command::ForTo {
                iterator,
                from,
                to,
                body,
            } => self.for_loop(iterator, from, to, body, false),

            Command::ForDownto {
                iterator,
                from,
                to,
                body,
            } => self.for_loop(iterator, from, to, body, true),

            Command::Read { target } => self.read(target),
            Command::Write { value } => self.write(value),
        }
    }

    // ------------------------------ comandos ------------------------------

    fn assign(&mut self, target: &Target, value: &Expr) -> Semantic<()> {
        self.check_target(target)?;
        self.check_expr(value)?;

        let result = self.expr(value);
        match target {
            Target::Scalar(name) => {
                let address = self.scalar(name.as_ref()).address;
                self.symbols.initialize(name.as_ref());

                self.emit(Ir::Assign {
                    value: result,
                    target: Operand::Address(address),
                });
            }

            Target::Array { name, index } => {
                let array = self.array(name.as_ref());
                let address = self.cell_address(&array, index);

                self.emit(Ir::Store {
                    value: result,
                    address,
                });
            }
        }

        Ok(())
    }

    fn if_only(&mut self, condition: &Condition, body: &[Command]) -> Semantic<()> {
        self.check_condition(condition)?;
        let (lhs, rhs) = self.condition(condition);

        let exit = self.labels.fresh();
        self.emit(Ir::Branch {
            lhs,
            cmp: condition.op.negated(),
            rhs,
            target: exit.forward(),
        });

        self.block(body)?;
        self.emit(Ir::Label(exit));

        Ok(())
    }

    fn if_else(
        &mut self,
        condition: &Condition,
        then_body: &[Command],
        else_body: &[Command],
    ) -> Semantic<()> {
        self.check_condition(condition)?;
        let (lhs, rhs) = self.condition(condition);

        let alternative = self.labels.fresh();
        let exit = self.labels.fresh();

        self.emit(Ir::Branch {
            lhs,
            cmp: condition.op.negated(),
            rhs,
            target: alternative.forward(),
        });

        self.block(then_body)?;
        self.emit(Ir::Goto(exit.forward()));
        self.emit(Ir::Label(alternative));
        self.block(else_body)?;
        self.emit(Ir::Label(exit));

        Ok(())
    }

    fn while_loop(&mut self, condition: &Condition, body: &[Command]) -> Semantic<()> {
        self.check_condition(condition)?;

        let head = self.labels.fresh();
        let exit = self.labels.fresh();

        self.emit(Ir::Label(head));
        let (lhs, rhs) = self.condition(condition);

        self.emit(Ir::Branch {
            lhs,
            cmp: condition.op.negated(),
            rhs,
            target: exit.forward(),
        });

        self.block(body)?;
        self.emit(Ir::Goto(head.backward()));
        self.emit(Ir::Label(exit));

        Ok(())
    }

    fn repeat_loop(&mut self, body: &[Command], condition: &Condition) -> Semantic<()> {
        let head = self.labels.fresh();
        self.emit(Ir::Label(head));
        self.block(body)?;

        // La condición se valida después del cuerpo: variables que el
        // cuerpo inicializa son legales aquí.
        self.check_condition(condition)?;
        let (lhs, rhs) = self.condition(condition);

        self.emit(Ir::Branch {
            lhs,
            cmp: condition.op.negated(),
            rhs,
            target: head.backward(),
        });

        Ok(())
    }

    fn for_loop(
        &mut self,
        iterator: &Located<Identifier>,
        from: &Value,
        to: &Value,
        body: &[Command],
        downto: bool,
    ) -> Semantic<()> {
        self.check_value(from, false)?;
        self.check_value(to, false)?;

        let iterator_address = self
            .symbols
            .declare_iterator(iterator.as_ref())
            .map_err(|error| Located::at(error.into(), iterator.location().clone()))?;

        let start = self.value(from);
        self.emit(Ir::Store {
            value: start,
            address: Operand::Address(iterator_address),
        });

        let bound = match to {
            Value::Literal(limit) => Bound::Literal(*limit),

            Value::Reference(_) => {
                let name = self.bound_name();
                let address = self
                    .symbols
                    .declare_iterator(&name)
                    .unwrap_or_else(|_| unreachable!("synthesized bound names are unique"));

                let value = self.value(to);
                self.emit(Ir::Store {
                    value,
                    address: Operand::Address(address),
                });

                Bound::Hidden { name, address }
            }
        };

        let head = self.labels.fresh();
        let exit = self.labels.fresh();

        self.emit(Ir::Label(head));
        let current = self.temp();
        self.emit(Ir::Load {
            address: Operand::Address(iterator_address),
            into: current,
        });

        let limit = match &bound {
            Bound::Literal(limit) => Operand::Literal(*limit),
            Bound::Hidden { address, .. } => {
                let temp = self.temp();
                self.emit(Ir::Load {
                    address: Operand::Address(*address),
                    into: temp,
                });

                Operand::Temp(temp)
            }
        };

        self.emit(Ir::Branch {
            lhs: Operand::Temp(current),
            cmp: if downto { CmpOp::Lt } else { CmpOp::Gt },
            rhs: limit,
            target: exit.forward(),
        });

        self.block(body)?;

        let next = self.temp();
        self.emit(Ir::Load {
            address: Operand::Address(iterator_address),
            into: next,
        });

        if downto {
            // La máquina no representa negativos: un decremento bajo
            // cero daría la vuelta, por lo cual se sale antes.
            self.emit(Ir::Branch {
                lhs: Operand::Temp(next),
                cmp: CmpOp::Eq,
                rhs: Operand::Literal(0),
                target: exit.forward(),
            });

            self.emit(Ir::Dec(next));
        } else {
            self.emit(Ir::Inc(next));
        }

        self.emit(Ir::Store {
            value: Operand::Temp(next),
            address: Operand::Address(iterator_address),
        });

        self.emit(Ir::Goto(head.backward()));
        self.emit(Ir::Label(exit));

        if let Bound::Hidden { name, .. } = &bound {
            self.symbols.release_iterator(name);
        }

        self.symbols.release_iterator(iterator.as_ref());

        Ok(())
    }

    fn read(&mut self, target: &Target) -> Semantic<()> {
        self.check_reference(target, true)?;

        match target {
            Target::Scalar(name) => {
                let address = self.scalar(name.as_ref()).address;
                self.emit(Ir::Read(Operand::Address(address)));
                self.symbols.initialize(name.as_ref());
            }

            Target::Array { name, index } => {
                let array = self.array(name.as_ref());
                let address = self.cell_address(&array, index);
                self.emit(Ir::Read(address));
            }
        }

        Ok(())
    }

    fn write(&mut self, value: &Value) -> Semantic<()> {
        self.check_value(value, false)?;

        match value {
            Value::Literal(literal) => {
                // La constante se coloca en la celda transitoria más
                // allá de todo lo reservado y se escribe desde ahí.
                let scratch = self.symbols.scratch_address();
                self.emit(Ir::Store {
                    value: Operand::Literal(*literal),
                    address: Operand::Address(scratch),
                });

                self.emit(Ir::Write(Operand::Address(scratch)));
            }

            Value::Reference(Target::Scalar(name)) => {
                let address = self.scalar(name.as_ref()).address;
                self.emit(Ir::Write(Operand::Address(address)));
            }

            Value::Reference(Target::Array { name, index }) => {
                let array = self.array(name.as_ref());
                let address = self.cell_address(&array, index);
                self.emit(Ir::Write(address));
            }
        }

        Ok(())
    }

    // ----------------------------- validación -----------------------------

    /// Reglas para un operando en posición de lectura (rvalue).
    ///
    /// `for_read` relaja el requisito de inicialización del escalar
    /// destino de un `read`, que existe precisamente para darle valor.
    fn check_reference(&self, target: &Target, for_read: bool) -> Semantic<()> {
        match target {
            Target::Scalar(name) => {
                let scalar = self.lookup_scalar(name)?;
                if !for_read && !scalar.initialized {
                    return Err(Located::at(
                        SemanticError::Uninitialized(name.as_ref().clone()),
                        name.location().clone(),
                    ));
                }
            }

            Target::Array { name, index } => {
                let array = self.lookup_array(name)?;
                match index {
                    Index::Literal(index) => self.check_index(name, &array, index)?,

                    Index::Variable(id) => {
                        let index = self.lookup_scalar(id)?;
                        if !index.initialized {
                            return Err(Located::at(
                                SemanticError::Uninitialized(id.as_ref().clone()),
                                id.location().clone(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Reglas para el destino de una asignación.
    fn check_target(&self, target: &Target) -> Semantic<()> {
        match target {
            Target::Scalar(name) => {
                let scalar = self.lookup_scalar(name)?;
                if scalar.iterator {
                    return Err(Located::at(
                        SemanticError::AssignToIterator(name.as_ref().clone()),
                        name.location().clone(),
                    ));
                }
            }

            Target::Array { name, index } => {
                let array = self.lookup_array(name)?;
                match index {
                    Index::Literal(index) => self.check_index(name, &array, index)?,

                    // A diferencia de la posición de lectura, aquí no
                    // se exige que el índice esté inicializado.
                    Index::Variable(id) => {
                        self.lookup_scalar(id)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn check_value(&self, value: &Value, for_read: bool) -> Semantic<()> {
        match value {
            Value::Literal(_) => Ok(()),
            Value::Reference(target) => self.check_reference(target, for_read),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Semantic<()> {
        match expr {
            Expr::Value(value) => self.check_value(value, false),
            Expr::Binary { lhs, rhs, .. } => {
                self.check_value(lhs, false)?;
                self.check_value(rhs, false)
            }
        }
    }

    fn check_condition(&self, condition: &Condition) -> Semantic<()> {
        self.check_value(&condition.lhs, false)?;
        self.check_value(&condition.rhs, false)
    }

    fn check_index(
        &self,
        name: &Located<Identifier>,
        array: &Array,
        index: &Located<u64>,
    ) -> Semantic<()> {
        if array.contains(*index.as_ref()) {
            Ok(())
        } else {
            Err(Located::at(
                SemanticError::IndexOutOfRange {
                    name: name.as_ref().clone(),
                    index: *index.as_ref(),
                },
                index.location().clone(),
            ))
        }
    }

    fn lookup_scalar(&self, name: &Located<Identifier>) -> Semantic<Scalar> {
        match self.symbols.get(name.as_ref()) {
            Some(Symbol::Scalar(scalar)) => Ok(*scalar),

            Some(Symbol::Array(_)) => Err(Located::at(
                SemanticError::ExpectedScalar(name.as_ref().clone()),
                name.location().clone(),
            )),

            None => Err(Located::at(
                SemanticError::Undeclared(name.as_ref().clone()),
                name.location().clone(),
            )),
        }
    }

    fn lookup_array(&self, name: &Located<Identifier>) -> Semantic<Array> {
        match self.symbols.get(name.as_ref()) {
            Some(Symbol::Array(array)) => Ok(*array),

            Some(Symbol::Scalar(_)) => Err(Located::at(
                SemanticError::ExpectedArray(name.as_ref().clone()),
                name.location().clone(),
            )),

            None => Err(Located::at(
                SemanticError::Undeclared(name.as_ref().clone()),
                name.location().clone(),
            )),
        }
    }

    // ------------------------------- bajada -------------------------------
    //
    // Las rutinas de bajada asumen operandos ya validados.

    fn expr(&mut self, expr: &Expr) -> Operand {
        match expr {
            Expr::Value(value) => self.value(value),

            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.value(lhs);
                let rhs = self.value(rhs);

                let into = self.temp();
                self.emit(Ir::Arith {
                    op: *op,
                    lhs,
                    rhs,
                    into,
                });

                Operand::Temp(into)
            }
        }
    }

    fn value(&mut self, value: &Value) -> Operand {
        match value {
            Value::Literal(literal) => Operand::Literal(*literal),
            Value::Reference(target) => self.reference(target),
        }
    }

    fn reference(&mut self, target: &Target) -> Operand {
        let address = match target {
            Target::Scalar(name) => Operand::Address(self.scalar(name.as_ref()).address),

            Target::Array { name, index } => {
                let array = self.array(name.as_ref());
                self.cell_address(&array, index)
            }
        };

        let into = self.temp();
        self.emit(Ir::Load { address, into });

        Operand::Temp(into)
    }

    /// Dirección de una celda de arreglo.
    ///
    /// Con índice constante toda la aritmética ocurre en tiempo de
    /// compilación. Con índice variable se emite la suma de la base, y
    /// la resta del límite inferior solo cuando este no es cero.
    fn cell_address(&mut self, array: &Array, index: &Index) -> Operand {
        match index {
            Index::Literal(index) => Operand::Address(array.cell(*index.as_ref())),

            Index::Variable(id) => {
                let index = self.scalar(id.as_ref());

                let loaded = self.temp();
                self.emit(Ir::Load {
                    address: Operand::Address(index.address),
                    into: loaded,
                });

                let sum = self.temp();
                self.emit(Ir::Arith {
                    op: ArithOp::Add,
                    lhs: Operand::Address(array.base),
                    rhs: Operand::Temp(loaded),
                    into: sum,
                });

                if array.low != 0 {
                    let rebased = self.temp();
                    self.emit(Ir::Arith {
                        op: ArithOp::Sub,
                        lhs: Operand::Temp(sum),
                        rhs: Operand::Literal(array.low),
                        into: rebased,
                    });

                    Operand::Temp(rebased)
                } else {
                    Operand::Temp(sum)
                }
            }
        }
    }

    fn condition(&mut self, condition: &Condition) -> (Operand, Operand) {
        let lhs = self.value(&condition.lhs);
        let rhs = self.value(&condition.rhs);

        (lhs, rhs)
    }

    fn scalar(&self, name: &Identifier) -> Scalar {
        match self.symbols.get(name) {
            Some(Symbol::Scalar(scalar)) => *scalar,
            _ => unreachable!("reference was validated"),
        }
    }

    fn array(&self, name: &Identifier) -> Array {
        match self.symbols.get(name) {
            Some(Symbol::Array(array)) => *array,
            _ => unreachable!("reference was validated"),
        }
    }

    fn emit(&mut self, instruction: Ir) {
        self.code.push(instruction);
    }

    fn temp(&mut self) -> Temp {
        self.temps += 1;
        Temp(self.temps)
    }

    fn bound_name(&mut self) -> Identifier {
        self.bounds += 1;

        // Los identificadores de usuario no contienen dígitos, por lo
        // cual estos nombres no pueden colisionar.
        Identifier::new(format!("loop{}", self.bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source::Source};

    fn lower(text: &str) -> Result<Listing, SemanticError> {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source).scan().expect("lexing failed");
        let program = parse::parse(&source, tokens).expect("parsing failed");

        Analyzer::lower(&program).map_err(Located::into_inner)
    }

    #[test]
    fn undeclared_identifiers_are_rejected() {
        assert!(matches!(
            lower("begin a := 1; end"),
            Err(SemanticError::Undeclared(_))
        ));
    }

    #[test]
    fn kind_mismatches_are_rejected() {
        assert!(matches!(
            lower("declare t(0:3) begin t := 1; end"),
            Err(SemanticError::ExpectedScalar(_))
        ));

        assert!(matches!(
            lower("declare a, b begin a := 1; b := a(1); end"),
            Err(SemanticError::ExpectedArray(_))
        ));
    }

    #[test]
    fn constant_index_must_be_in_range() {
        assert!(matches!(
            lower("declare t(0:3) begin t(5) := 1; end"),
            Err(SemanticError::IndexOutOfRange { index: 5, .. })
        ));

        assert!(lower("declare t(0:3) begin t(3) := 1; end").is_ok());
    }

    #[test]
    fn uninitialized_reads_are_rejected() {
        assert!(matches!(
            lower("declare a, b begin a := b; end"),
            Err(SemanticError::Uninitialized(_))
        ));

        assert!(matches!(
            lower("declare a begin a := a + 1; end"),
            Err(SemanticError::Uninitialized(_))
        ));

        assert!(matches!(
            lower("declare a begin write a; end"),
            Err(SemanticError::Uninitialized(_))
        ));
    }

    #[test]
    fn iterators_are_immutable() {
        assert!(matches!(
            lower("begin for i from 1 to 3 do i := 2; endfor end"),
            Err(SemanticError::AssignToIterator(_))
        ));
    }

    #[test]
    fn reading_into_an_iterator_is_allowed() {
        assert!(lower("begin for i from 1 to 3 do read i; endfor end").is_ok());
    }

    #[test]
    fn iterators_are_released_after_the_loop() {
        assert!(matches!(
            lower("declare a begin for i from 1 to 3 do a := i; endfor a := i; end"),
            Err(SemanticError::Undeclared(_))
        ));
    }

    #[test]
    fn iterator_shadowing_a_declaration_is_rejected() {
        assert!(matches!(
            lower("declare i begin for i from 1 to 3 do write i; endfor end"),
            Err(SemanticError::Symbol(SymbolError::DuplicateIterator(_)))
        ));
    }

    #[test]
    fn repeat_condition_sees_body_initialization() {
        assert!(lower("declare x begin repeat x := 1; until x = 1; end").is_ok());

        assert!(matches!(
            lower("declare x begin while x = 0 do x := 1; endwhile end"),
            Err(SemanticError::Uninitialized(_))
        ));
    }

    #[test]
    fn nonzero_low_bound_emits_a_rebase_subtraction() {
        let listing = lower("declare t(5:9), i begin i := 6; write t(i); end").unwrap();
        assert!(listing.code.iter().any(|ir| matches!(
            ir,
            Ir::Arith {
                op: ArithOp::Sub,
                rhs: Operand::Literal(5),
                ..
            }
        )));

        let listing = lower("declare t(0:4), i begin i := 1; write t(i); end").unwrap();
        assert!(!listing
            .code
            .iter()
            .any(|ir| matches!(ir, Ir::Arith { op: ArithOp::Sub, .. })));
    }

    #[test]
    fn every_program_ends_in_halt() {
        let listing = lower("declare a begin a := 1; end").unwrap();
        assert_eq!(listing.code.last(), Some(&Ir::Halt));
    }

    #[test]
    fn negated_comparison_reaches_the_branch() {
        let listing = lower("declare a begin a := 1; if a = 1 then a := 2; endif end").unwrap();
        assert!(listing
            .code
            .iter()
            .any(|ir| matches!(ir, Ir::Branch { cmp: CmpOp::Ne, .. })));
    }
}
