//! Máquina objetivo.
//!
//! La arquitectura es una máquina de registros estilo acumulador: seis
//! registros de propósito general, memoria direccionada únicamente de
//! forma indirecta a través de un registro que contiene la dirección,
//! sin pila ni convención de llamada. Los saltos son relativos al
//! contador de programa, contando desde el propio salto (`k = 1` es la
//! instrucción siguiente).
//!
//! Además de los tipos del listado, este módulo expone [`Machine`], un
//! ejecutor de referencia. El ejecutor fija la semántica aritmética:
//! celdas naturales de 64 bits, `SUB` truncada en cero, `DEC` con
//! vuelta bajo cero (de ahí la guarda del decremento en los lazos
//! descendentes) y desplazamientos que duplican o parten a la mitad.

use std::{
    collections::{HashMap, VecDeque},
    fmt::{self, Display},
};

use thiserror::Error;

use crate::ir::{Label, LabelRef};

/// Registro de propósito general.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Reg {
    /// Archivo de registros completo, en el orden de preferencia de
    /// asignación.
    pub const FILE: [Reg; 6] = [Reg::A, Reg::B, Reg::C, Reg::D, Reg::E, Reg::F];

    fn index(self) -> usize {
        match self {
            Reg::A => 0,
            Reg::B => 1,
            Reg::C => 2,
            Reg::D => 3,
            Reg::E => 4,
            Reg::F => 5,
        }
    }
}

impl Display for Reg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg::A => "a",
            Reg::B => "b",
            Reg::C => "c",
            Reg::D => "d",
            Reg::E => "e",
            Reg::F => "f",
        };

        fmt.write_str(name)
    }
}

/// Destino de un salto.
///
/// Los saltos nacen simbólicos y el enlazador los resuelve a
/// desplazamientos relativos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dest {
    Symbolic(LabelRef),
    Linked(i64),
}

impl Display for Dest {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::Symbolic(label) => label.fmt(fmt),
            Dest::Linked(offset) => offset.fmt(fmt),
        }
    }
}

/// Instrucción del listado objetivo.
///
/// `Label` es una pseudoinstrucción: marca una posición pero no ocupa
/// lugar en el programa final.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Asm {
    Get(Reg),
    Put(Reg),
    Load(Reg, Reg),
    Store(Reg, Reg),
    Add(Reg, Reg),
    Sub(Reg, Reg),
    Inc(Reg),
    Dec(Reg),
    Shl(Reg),
    Shr(Reg),
    Reset(Reg),
    Jump(Dest),
    Jzero(Reg, Dest),
    Jodd(Reg, Dest),
    Label(Label),
    Halt,
}

impl Asm {
    /// Indica si la instrucción ocupa lugar en el programa final.
    pub fn is_real(&self) -> bool {
        !matches!(self, Asm::Label(_))
    }
}

impl Display for Asm {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asm::Get(reg) => write!(fmt, "GET {}", reg),
            Asm::Put(reg) => write!(fmt, "PUT {}", reg),
            Asm::Load(value, address) => write!(fmt, "LOAD {} {}", value, address),
            Asm::Store(value, address) => write!(fmt, "STORE {} {}", value, address),
            Asm::Add(target, source) => write!(fmt, "ADD {} {}", target, source),
            Asm::Sub(target, source) => write!(fmt, "SUB {} {}", target, source),
            Asm::Inc(reg) => write!(fmt, "INC {}", reg),
            Asm::Dec(reg) => write!(fmt, "DEC {}", reg),
            Asm::Shl(reg) => write!(fmt, "SHL {}", reg),
            Asm::Shr(reg) => write!(fmt, "SHR {}", reg),
            Asm::Reset(reg) => write!(fmt, "RESET {}", reg),
            Asm::Jump(dest) => write!(fmt, "JUMP {}", dest),
            Asm::Jzero(reg, dest) => write!(fmt, "JZERO {} {}", reg, dest),
            Asm::Jodd(reg, dest) => write!(fmt, "JODD {} {}", reg, dest),
            Asm::Label(label) => write!(fmt, "{}:", label),
            Asm::Halt => fmt.write_str("HALT"),
        }
    }
}

/// Fallo de ejecución en la máquina de referencia.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Executed {0} instructions without halting")]
    OutOfFuel(u64),

    #[error("GET with exhausted input")]
    InputExhausted,

    #[error("Jump to instruction {0} outside the program")]
    BadJump(i64),

    #[error("Unlinked label or symbolic jump in executable stream")]
    Unlinked,
}

/// Límite de instrucciones por corrida.
const FUEL: u64 = 10_000_000;

/// Ejecutor de referencia del conjunto de instrucciones.
#[derive(Default)]
pub struct Machine {
    regs: [u64; 6],
    memory: HashMap<u64, u64>,
    input: VecDeque<u64>,
    output: Vec<u64>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<I: IntoIterator<Item = u64>>(input: I) -> Self {
        Machine {
            input: input.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn reg(&self, reg: Reg) -> u64 {
        self.regs[reg.index()]
    }

    pub fn set_reg(&mut self, reg: Reg, value: u64) {
        self.regs[reg.index()] = value;
    }

    pub fn cell(&self, address: u64) -> u64 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    pub fn output(&self) -> &[u64] {
        &self.output
    }

    /// Ejecuta un listado enlazado hasta `HALT` o hasta caer fuera del
    /// programa por el final.
    pub fn run(&mut self, code: &[Asm]) -> Result<(), ExecError> {
        let mut pc: i64 = 0;

        for _ in 0..FUEL {
            if pc < 0 || pc as usize > code.len() {
                return Err(ExecError::BadJump(pc));
            }

            let instruction = match code.get(pc as usize) {
                Some(instruction) => *instruction,
                None => return Ok(()),
            };

            let mut next = pc + 1;
            match instruction {
                Asm::Get(reg) => {
                    let value = self.input.pop_front().ok_or(ExecError::InputExhausted)?;
                    self.memory.insert(self.reg(reg), value);
                }

                Asm::Put(reg) => {
                    let value = self.cell(self.reg(reg));
                    self.output.push(value);
                }

                Asm::Load(value, address) => self.regs[value.index()] = self.cell(self.reg(address)),
                Asm::Store(value, address) => {
                    self.memory.insert(self.reg(address), self.reg(value));
                }

                Asm::Add(target, source) => {
                    self.regs[target.index()] = self.reg(target).wrapping_add(self.reg(source));
                }

                Asm::Sub(target, source) => {
                    self.regs[target.index()] = self.reg(target).saturating_sub(self.reg(source));
                }

                Asm::Inc(reg) => self.regs[reg.index()] = self.reg(reg).wrapping_add(1),
                Asm::Dec(reg) => self.regs[reg.index()] = self.reg(reg).wrapping_sub(1),
                Asm::Shl(reg) => self.regs[reg.index()] = self.reg(reg).wrapping_shl(1),
                Asm::Shr(reg) => self.regs[reg.index()] >>= 1,
                Asm::Reset(reg) => self.regs[reg.index()] = 0,

                Asm::Jump(dest) => next = pc + Self::offset(dest)?,
                Asm::Jzero(reg, dest) => {
                    if self.reg(reg) == 0 {
                        next = pc + Self::offset(dest)?;
                    }
                }

                Asm::Jodd(reg, dest) => {
                    if self.reg(reg) % 2 == 1 {
                        next = pc + Self::offset(dest)?;
                    }
                }

                Asm::Label(_) => return Err(ExecError::Unlinked),
                Asm::Halt => return Ok(()),
            }

            pc = next;
        }

        Err(ExecError::OutOfFuel(FUEL))
    }

    fn offset(dest: Dest) -> Result<i64, ExecError> {
        match dest {
            Dest::Linked(offset) => Ok(offset),
            Dest::Symbolic(_) => Err(ExecError::Unlinked),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_truncates_at_zero() {
        let mut machine = Machine::new();
        machine.set_reg(Reg::A, 3);
        machine.set_reg(Reg::B, 5);
        machine.run(&[Asm::Sub(Reg::A, Reg::B)]).unwrap();
        assert_eq!(machine.reg(Reg::A), 0);
    }

    #[test]
    fn dec_wraps_below_zero() {
        let mut machine = Machine::new();
        machine.run(&[Asm::Dec(Reg::A)]).unwrap();
        assert_eq!(machine.reg(Reg::A), u64::MAX);
    }

    #[test]
    fn memory_is_addressed_through_registers() {
        let mut machine = Machine::with_input([7]);
        machine.set_reg(Reg::B, 42);

        // GET escribe mem[b]; LOAD la lee de vuelta.
        machine.run(&[Asm::Get(Reg::B), Asm::Load(Reg::A, Reg::B)]).unwrap();
        assert_eq!(machine.cell(42), 7);
        assert_eq!(machine.reg(Reg::A), 7);
    }

    #[test]
    fn relative_jumps_count_from_the_branch() {
        // JUMP 2 se salta el INC intermedio.
        let code = [
            Asm::Jump(Dest::Linked(2)),
            Asm::Inc(Reg::A),
            Asm::Put(Reg::A),
            Asm::Halt,
        ];

        let mut machine = Machine::new();
        machine.run(&code).unwrap();
        assert_eq!(machine.reg(Reg::A), 0);
        assert_eq!(machine.output(), &[0]);
    }

    #[test]
    fn unlinked_streams_are_rejected() {
        let mut machine = Machine::new();
        assert!(matches!(
            machine.run(&[Asm::Label(Label(1))]),
            Err(ExecError::Unlinked)
        ));
    }
}
