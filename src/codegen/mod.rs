//! Generación de código objetivo.
//!
//! El generador consume el listado intermedio en estricto orden de
//! programa, una instrucción a la vez, con un único bloque básico de
//! estado de registros vivo entre transferencias de control. La
//! reutilización de registros depende de ese orden: el horizonte de
//! vida de un valor se examina hacia adelante solo hasta la siguiente
//! transferencia de control y nunca a través de un salto.
//!
//! Antes de invocar las rutinas generales de multiplicación y
//! división se aplican especializaciones para operandos constantes
//! baratos: sumar o restar `1` es un incremento o decremento,
//! multiplicar o dividir por `2` es un desplazamiento, y las
//! divisiones con divisor o dividendo cero tienen resultado definido
//! de cero.

mod math;
mod regs;

use crate::{
    ir::{ArithOp, CmpOp, Ir, LabelRef, Labels, Listing, Operand, Temp},
    machine::{Asm, Dest, Reg},
};

use regs::{Acquired, Contents, RegisterFile, Sym};

/// Traduce un listado intermedio al conjunto de instrucciones de la
/// máquina, con saltos aún simbólicos.
pub fn generate(listing: Listing) -> Vec<Asm> {
    let generator = Generator {
        code: Vec::new(),
        regs: RegisterFile::default(),
        ir: listing.code,
        cursor: 0,
        labels: listing.labels,
    };

    generator.run()
}

struct Generator {
    code: Vec<Asm>,
    regs: RegisterFile,
    ir: Vec<Ir>,
    cursor: usize,
    labels: Labels,
}

impl Generator {
    fn run(mut self) -> Vec<Asm> {
        for position in 0..self.ir.len() {
            // El cursor apunta a la instrucción siguiente; ahí
            // comienza el horizonte de vida de la actual.
            self.cursor = position + 1;
            self.instruction(self.ir[position]);
        }

        self.code
    }

    fn instruction(&mut self, instruction: Ir) {
        match instruction {
            Ir::Assign { value, target } => self.assign(value, target),
            Ir::Load { address, into } => self.load(address, into),
            Ir::Store { value, address } => self.store(value, address),

            Ir::Arith { op, lhs, rhs, into } => match op {
                ArithOp::Add => self.add(lhs, rhs, into),
                ArithOp::Sub => self.sub(lhs, rhs, into),
                ArithOp::Mul => self.mul(lhs, rhs, into),
                ArithOp::Div => self.div(lhs, rhs, into),
                ArithOp::Mod => self.modulo(lhs, rhs, into),
            },

            Ir::Branch {
                lhs,
                cmp,
                rhs,
                target,
            } => self.branch(lhs, cmp, rhs, target),

            Ir::Goto(target) => {
                self.emit(Asm::Jump(Dest::Symbolic(target)));
                self.regs.clear();
            }

            Ir::Read(address) => {
                let reg = self.register_for(address);
                self.emit(Asm::Get(reg));
                self.free(reg);
            }

            Ir::Write(address) => {
                let reg = self.register_for(address);
                self.emit(Asm::Put(reg));
                self.free(reg);
            }

            Ir::Inc(temp) => {
                let reg = self.register_for(Operand::Temp(temp));
                self.emit(Asm::Inc(reg));
                self.free(reg);
            }

            Ir::Dec(temp) => {
                let reg = self.register_for(Operand::Temp(temp));
                self.emit(Asm::Dec(reg));
                self.free(reg);
            }

            Ir::Label(label) => {
                self.emit(Asm::Label(label));
                self.regs.clear();
            }

            Ir::Halt => {
                self.emit(Asm::Halt);
                self.regs.clear();
            }
        }
    }

    // ----------------------- instrucciones simples -----------------------

    fn assign(&mut self, value: Operand, target: Operand) {
        let target_reg = self.register_for(target);
        let value_reg = self.register_for(value);

        self.emit(Asm::Store(value_reg, target_reg));
        self.free(target_reg);
        self.free(value_reg);
    }

    fn load(&mut self, address: Operand, into: Temp) {
        let address_reg = self.register_for(address);
        let value_reg = self.regs.scratch();

        self.emit(Asm::Load(value_reg, address_reg));
        self.retag(value_reg, into);
        self.free(address_reg);
        self.free(value_reg);
    }

    fn store(&mut self, value: Operand, address: Operand) {
        let address_reg = self.register_for(address);
        let value_reg = self.register_for(value);

        self.emit(Asm::Store(value_reg, address_reg));
        self.free(value_reg);
        self.free(address_reg);
    }

    // --------------------------- aritmética ---------------------------

    fn add(&mut self, lhs: Operand, rhs: Operand, into: Temp) {
        if lhs == Operand::Literal(1) {
            let reg = self.register_for(rhs);
            self.emit(Asm::Inc(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(1) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Inc(reg));
            self.retag(reg, into);
            self.free(reg);
        } else {
            let lhs_reg = self.register_for(lhs);
            let rhs_reg = self.register_for(rhs);

            self.emit(Asm::Add(lhs_reg, rhs_reg));
            self.retag(lhs_reg, into);
            self.free(lhs_reg);
            self.free(rhs_reg);
        }
    }

    fn sub(&mut self, lhs: Operand, rhs: Operand, into: Temp) {
        if rhs == Operand::Literal(1) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Dec(reg));
            self.retag(reg, into);
            self.free(reg);
        } else {
            let lhs_reg = self.register_for(lhs);
            let rhs_reg = self.register_for(rhs);

            self.emit(Asm::Sub(lhs_reg, rhs_reg));
            self.retag(lhs_reg, into);
            self.free(lhs_reg);
            self.free(rhs_reg);
        }
    }

    fn mul(&mut self, lhs: Operand, rhs: Operand, into: Temp) {
        if lhs == Operand::Literal(2) {
            let reg = self.register_for(rhs);
            self.emit(Asm::Shl(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(2) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Shl(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(1) {
            let reg = self.register_for(lhs);
            self.retag(reg, into);
            self.free(reg);
        } else if lhs == Operand::Literal(1) {
            let reg = self.register_for(rhs);
            self.retag(reg, into);
            self.free(reg);
        } else {
            let lhs_reg = self.register_for(lhs);
            let rhs_reg = self.register_for(rhs);
            let scratch = self.regs.scratch();

            let product = self.multiply(lhs_reg, rhs_reg, scratch);
            self.retag(product, into);
            self.free(lhs_reg);
            self.free(rhs_reg);
            self.free(scratch);
        }
    }

    fn div(&mut self, lhs: Operand, rhs: Operand, into: Temp) {
        if rhs == Operand::Literal(2) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Shr(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(0) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Reset(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if lhs == Operand::Literal(0) {
            let reg = self.register_for(rhs);
            self.emit(Asm::Reset(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(1) {
            let reg = self.register_for(lhs);
            self.retag(reg, into);
            self.free(reg);
        } else {
            let (quotient, remainder, used) = self.divide_operands(lhs, rhs);
            self.retag(quotient, into);
            self.regs.tag(remainder, Contents::Empty);

            for reg in used {
                self.free(reg);
            }
        }
    }

    fn modulo(&mut self, lhs: Operand, rhs: Operand, into: Temp) {
        if rhs == Operand::Literal(0) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Reset(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if lhs == Operand::Literal(0) {
            let reg = self.register_for(rhs);
            self.emit(Asm::Reset(reg));
            self.retag(reg, into);
            self.free(reg);
        } else if rhs == Operand::Literal(1) {
            let reg = self.register_for(lhs);
            self.emit(Asm::Reset(reg));
            self.retag(reg, into);
            self.free(reg);
        } else {
            let (quotient, remainder, used) = self.divide_operands(lhs, rhs);
            self.retag(remainder, into);
            self.regs.tag(quotient, Contents::Empty);

            for reg in used {
                self.free(reg);
            }
        }
    }

    /// Caso general compartido de `/` y `%`.
    ///
    /// La rutina produce cociente y residuo a la vez; quien llama
    /// conserva la vista que le interesa y descarta la otra.
    fn divide_operands(&mut self, lhs: Operand, rhs: Operand) -> (Reg, Reg, [Reg; 5]) {
        let dividend = self.register_for(lhs);
        let divisor = self.register_for(rhs);
        let bit = self.regs.scratch();
        let quotient = self.regs.scratch();
        let remainder = self.regs.scratch();

        let (quotient, remainder) = self.divide(dividend, divisor, bit, quotient, remainder);

        (
            quotient,
            remainder,
            [dividend, divisor, bit, quotient, remainder],
        )
    }

    // --------------------------- saltos ---------------------------

    fn branch(&mut self, lhs: Operand, cmp: CmpOp, rhs: Operand, target: LabelRef) {
        match cmp {
            // La igualdad prueba directamente la diferencia simétrica.
            CmpOp::Eq => {
                let lhs_reg = self.register_for(lhs);
                let rhs_reg = self.register_for(rhs);
                let scratch = self.regs.scratch();

                let difference = self.difference(lhs_reg, rhs_reg, scratch);
                self.emit(Asm::Jzero(difference, Dest::Symbolic(target)));

                self.free(scratch);
                self.free(lhs_reg);
                self.free(rhs_reg);
            }

            CmpOp::Ne => {
                let lhs_reg = self.register_for(lhs);
                let rhs_reg = self.register_for(rhs);
                let scratch = self.regs.scratch();

                let difference = self.difference(lhs_reg, rhs_reg, scratch);
                let skip = self.labels.fresh();

                self.emit(Asm::Jzero(difference, Dest::Symbolic(skip.forward())));
                self.emit(Asm::Jump(Dest::Symbolic(target)));
                self.emit(Asm::Label(skip));

                self.free(scratch);
                self.free(lhs_reg);
                self.free(rhs_reg);
            }

            // Los órdenes se reducen a una resta truncada cuyo estado
            // de cero se prueba después.
            CmpOp::Gt | CmpOp::Lt | CmpOp::Ge | CmpOp::Le => {
                let lhs_reg = self.register_for(lhs);
                let rhs_reg = self.register_for(rhs);

                let nonzero_when_true = match cmp {
                    CmpOp::Gt => self.greater(lhs_reg, rhs_reg),
                    CmpOp::Lt => self.lesser(lhs_reg, rhs_reg),
                    CmpOp::Ge => self.greater_or_equal(lhs_reg, rhs_reg),
                    CmpOp::Le => self.lesser_or_equal(lhs_reg, rhs_reg),
                    _ => unreachable!(),
                };

                let skip = self.labels.fresh();
                self.emit(Asm::Jzero(nonzero_when_true, Dest::Symbolic(skip.forward())));
                self.emit(Asm::Jump(Dest::Symbolic(target)));
                self.emit(Asm::Label(skip));

                self.free(lhs_reg);
                self.free(rhs_reg);
            }
        }
    }

    // ------------------------ soporte de registros ------------------------

    /// Obtiene un registro que contenga el operando, materializando
    /// constantes cuando no están en caché.
    fn register_for(&mut self, operand: Operand) -> Reg {
        let contents = match operand {
            Operand::Literal(value) => Contents::Literal(value),
            Operand::Address(address) => Contents::Symbolic(Sym::Address(address)),
            Operand::Temp(temp) => Contents::Symbolic(Sym::Temp(temp)),
        };

        match self.regs.acquire(contents) {
            Acquired::Cached(reg) => reg,
            Acquired::Fresh(reg) => {
                match operand {
                    Operand::Literal(value) => self.materialize(reg, value),
                    Operand::Address(address) => self.materialize(reg, address),

                    // Los temporales viven solo en registros; perder
                    // uno antes de su uso sería un error del compilador.
                    Operand::Temp(temp) => {
                        unreachable!("temporary {:?} was evicted before its use", temp)
                    }
                }

                reg
            }
        }
    }

    /// Libera un registro después de su uso en la instrucción actual.
    ///
    /// Un literal se desbloquea sin más: su valor queda en caché y es
    /// rematerializable. Un valor simbólico se libera del todo si ya
    /// no se referencia dentro del bloque básico. Si aún vive, una
    /// dirección se desbloquea conservando la caché, porque es tan
    /// rematerializable como un literal; un temporal en cambio no
    /// tiene respaldo de donde recargarse, así que su registro
    /// permanece reservado hasta que el uso posterior lo encuentre.
    fn free(&mut self, reg: Reg) {
        match self.regs.contents(reg) {
            Contents::Empty | Contents::Literal(_) => self.regs.unlock(reg),
            Contents::Symbolic(sym) => {
                if !self.live_ahead(sym) {
                    self.regs.release(reg);
                } else if let Sym::Address(_) = sym {
                    self.regs.unlock(reg);
                }
            }
        }
    }

    /// Búsqueda acotada de usos futuros dentro del bloque básico.
    fn live_ahead(&self, sym: Sym) -> bool {
        let operand = match sym {
            Sym::Temp(temp) => Operand::Temp(temp),
            Sym::Address(address) => Operand::Address(address),
        };

        for instruction in &self.ir[self.cursor..] {
            if instruction.mentions(operand) {
                return true;
            }

            if instruction.transfers_control() {
                break;
            }
        }

        false
    }

    /// Construye una constante en un registro.
    ///
    /// El cero es solo un `RESET`. Cualquier otro valor se construye a
    /// partir de su expansión binaria sin el bit más significativo: un
    /// incremento realiza ese bit implícito y cada bit restante cuesta
    /// un desplazamiento más un incremento si el bit es uno.
    fn materialize(&mut self, reg: Reg, value: u64) {
        self.emit(Asm::Reset(reg));
        if value == 0 {
            return;
        }

        self.emit(Asm::Inc(reg));

        let bits = 63 - value.leading_zeros() as u64;
        for bit in (0..bits).rev() {
            self.emit(Asm::Shl(reg));
            if value >> bit & 1 == 1 {
                self.emit(Asm::Inc(reg));
            }
        }
    }

    fn retag(&mut self, reg: Reg, temp: Temp) {
        self.regs.tag(reg, Contents::Symbolic(Sym::Temp(temp)));
    }

    fn emit(&mut self, instruction: Asm) {
        self.code.push(instruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link;
    use crate::machine::Machine;

    fn fragment() -> Generator {
        Generator {
            code: Vec::new(),
            regs: RegisterFile::default(),
            ir: Vec::new(),
            cursor: 0,
            labels: Labels::default(),
        }
    }

    #[test]
    fn materialization_is_exact() {
        for value in 0..=1023 {
            let mut generator = fragment();
            generator.materialize(Reg::A, value);

            let mut machine = Machine::new();
            machine.run(&generator.code).unwrap();

            assert_eq!(machine.reg(Reg::A), value, "materializing {}", value);
        }
    }

    #[test]
    fn materialization_of_zero_is_a_single_reset() {
        let mut generator = fragment();
        generator.materialize(Reg::B, 0);
        assert_eq!(generator.code, vec![Asm::Reset(Reg::B)]);
    }

    #[test]
    fn general_division_produces_quotient_and_remainder() {
        for dividend in 0..=50 {
            for divisor in 1..=50 {
                let (quotient, remainder) = divide(dividend, divisor);
                assert_eq!(
                    (quotient, remainder),
                    (dividend / divisor, dividend % divisor),
                    "{} / {}",
                    dividend,
                    divisor
                );
            }
        }
    }

    #[test]
    fn division_by_zero_is_defined_as_zero() {
        assert_eq!(divide(7, 0), (0, 0));
        assert_eq!(divide(0, 0), (0, 0));
    }

    #[test]
    fn general_multiplication_is_exact() {
        for (lhs, rhs) in [(0, 9), (9, 0), (1, 1), (3, 5), (7, 7), (13, 21), (50, 49)] {
            let mut generator = fragment();
            let product = generator.multiply(Reg::A, Reg::B, Reg::C);

            let code = link::link(generator.code);
            let mut machine = Machine::new();
            machine.set_reg(Reg::A, lhs);
            machine.set_reg(Reg::B, rhs);
            machine.run(&code).unwrap();

            assert_eq!(machine.reg(product), lhs * rhs, "{} * {}", lhs, rhs);
        }
    }

    fn divide(dividend: u64, divisor: u64) -> (u64, u64) {
        let mut generator = fragment();
        let (quotient, remainder) =
            generator.divide(Reg::A, Reg::B, Reg::C, Reg::D, Reg::E);

        let code = link::link(generator.code);
        let mut machine = Machine::new();
        machine.set_reg(Reg::A, dividend);
        machine.set_reg(Reg::B, divisor);
        machine.run(&code).unwrap();

        (machine.reg(quotient), machine.reg(remainder))
    }
}
