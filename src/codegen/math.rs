//! Rutinas aritméticas y de comparación.
//!
//! La máquina no tiene comparación ni multiplicación ni división
//! nativas. Las comparaciones se reducen a restas truncadas cuyo
//! estado de cero se prueba con un salto; la multiplicación es
//! corrimiento-y-suma sobre la expansión binaria de un operando; la
//! división es el algoritmo binario con restauración y produce
//! cociente y residuo simultáneamente.

use super::{Contents, Generator};
use crate::machine::{Asm, Dest, Reg};

impl Generator {
    /// Copia `source` en `target`, heredando su descriptor.
    fn mov(&mut self, target: Reg, source: Reg) {
        self.emit(Asm::Reset(target));
        let contents = self.regs.contents(source);
        self.regs.tag(target, contents);
        self.emit(Asm::Add(target, source));
    }

    /// Deja en el registro retornado un valor que es cero exactamente
    /// cuando los operandos eran iguales.
    ///
    /// Ambos registros de operandos quedan invalidados: la secuencia
    /// los consume destructivamente.
    pub(super) fn difference(&mut self, lhs: Reg, rhs: Reg, scratch: Reg) -> Reg {
        self.mov(scratch, lhs);
        self.emit(Asm::Sub(lhs, rhs));
        self.emit(Asm::Sub(rhs, scratch));
        self.emit(Asm::Add(lhs, rhs));

        self.regs.tag(lhs, Contents::Empty);
        self.regs.tag(rhs, Contents::Empty);

        lhs
    }

    /// `lhs > rhs` como resta truncada: el resultado es distinto de
    /// cero exactamente cuando se cumple el orden.
    pub(super) fn greater(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        self.emit(Asm::Sub(lhs, rhs));
        self.regs.tag(lhs, Contents::Empty);

        lhs
    }

    pub(super) fn lesser(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        self.emit(Asm::Sub(rhs, lhs));
        self.regs.tag(rhs, Contents::Empty);

        rhs
    }

    /// `lhs >= rhs` equivale a `lhs + 1 > rhs`.
    pub(super) fn greater_or_equal(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        self.emit(Asm::Inc(lhs));
        self.greater(lhs, rhs)
    }

    pub(super) fn lesser_or_equal(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        self.emit(Asm::Inc(rhs));
        self.lesser(lhs, rhs)
    }

    /// Multiplicación por corrimiento y suma.
    ///
    /// Mientras `rhs` no sea cero, su bit bajo decide si el operando
    /// que se va corriendo a la izquierda se acumula en el producto;
    /// `rhs` se parte a la mitad en cada vuelta. Consume `lhs` y
    /// `rhs`; el producto queda en `product`.
    pub(super) fn multiply(&mut self, lhs: Reg, rhs: Reg, product: Reg) -> Reg {
        let test = self.labels.fresh();
        let shift = self.labels.fresh();
        let accumulate = self.labels.fresh();
        let done = self.labels.fresh();

        self.emit(Asm::Reset(product));

        self.emit(Asm::Label(test));
        self.emit(Asm::Jzero(rhs, Dest::Symbolic(done.forward())));
        self.emit(Asm::Jodd(rhs, Dest::Symbolic(accumulate.forward())));

        self.emit(Asm::Label(shift));
        self.emit(Asm::Shr(rhs));
        self.emit(Asm::Shl(lhs));
        self.emit(Asm::Jump(Dest::Symbolic(test.backward())));

        self.emit(Asm::Label(accumulate));
        self.emit(Asm::Add(product, lhs));
        self.emit(Asm::Jump(Dest::Symbolic(shift.backward())));

        self.emit(Asm::Label(done));

        self.regs.tag(lhs, Contents::Empty);
        self.regs.tag(rhs, Contents::Empty);

        product
    }

    /// División binaria con restauración.
    ///
    /// La primera fase corre el divisor (junto a un acumulador de bit
    /// de cociente) a la izquierda hasta que excedería al dividendo,
    /// estableciendo la alineación. La segunda fase prueba en cada
    /// posición si el divisor corrido cabe en lo que queda del
    /// dividendo, acumulando el bit de cociente y restando cuando
    /// cabe, y corriendo divisor y acumulador a la derecha hasta
    /// agotar el acumulador.
    ///
    /// Un divisor cero en tiempo de ejecución produce cociente y
    /// residuo cero. Consume `dividend`, `divisor` y `bit`.
    pub(super) fn divide(
        &mut self,
        dividend: Reg,
        divisor: Reg,
        bit: Reg,
        quotient: Reg,
        remainder: Reg,
    ) -> (Reg, Reg) {
        let align = self.labels.fresh();
        let aligned = self.labels.fresh();
        let step = self.labels.fresh();
        let done = self.labels.fresh();
        let skip = self.labels.fresh();

        self.emit(Asm::Reset(quotient));
        self.emit(Asm::Reset(remainder));
        self.emit(Asm::Jzero(divisor, Dest::Symbolic(done.forward())));

        self.regs.tag(bit, Contents::Literal(1));
        self.materialize(bit, 1);
        self.mov(remainder, dividend);
        self.emit(Asm::Shl(divisor));
        self.emit(Asm::Shl(bit));

        // Fase uno: `dividend + 1 - divisor` es cero cuando el divisor
        // corrido ya excede al dividendo.
        self.emit(Asm::Label(align));
        self.emit(Asm::Inc(dividend));
        self.emit(Asm::Sub(dividend, divisor));
        self.emit(Asm::Jzero(dividend, Dest::Symbolic(aligned.forward())));
        self.mov(dividend, remainder);
        self.emit(Asm::Shl(divisor));
        self.emit(Asm::Shl(bit));
        self.emit(Asm::Jump(Dest::Symbolic(align.backward())));

        self.emit(Asm::Label(aligned));
        self.emit(Asm::Shr(bit));
        self.emit(Asm::Shr(divisor));
        self.mov(dividend, remainder);

        // Fase dos.
        self.emit(Asm::Label(step));
        self.emit(Asm::Jzero(bit, Dest::Symbolic(done.forward())));
        self.emit(Asm::Inc(dividend));
        self.emit(Asm::Sub(dividend, divisor));
        self.emit(Asm::Jzero(dividend, Dest::Symbolic(skip.forward())));
        self.emit(Asm::Sub(remainder, divisor));
        self.emit(Asm::Add(quotient, bit));

        self.emit(Asm::Label(skip));
        self.emit(Asm::Shr(divisor));
        self.emit(Asm::Shr(bit));
        self.mov(dividend, remainder);
        self.emit(Asm::Jump(Dest::Symbolic(step.backward())));

        self.emit(Asm::Label(done));

        self.regs.tag(dividend, Contents::Empty);
        self.regs.tag(divisor, Contents::Empty);
        self.regs.tag(bit, Contents::Empty);

        (quotient, remainder)
    }
}
