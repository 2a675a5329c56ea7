use std::fmt::{self, Display};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Temp(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Referencia a una etiqueta desde un punto de uso.
///
/// La dirección pertenece al uso y no a la etiqueta: una misma
/// etiqueta puede ser alcanzada hacia adelante por un salto y hacia
/// atrás por otro.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LabelRef {
    pub label: Label,
    pub direction: Direction,
}

impl Label {
    pub fn forward(self) -> LabelRef {
        LabelRef {
            label: self,
            direction: Direction::Forward,
        }
    }

    pub fn backward(self) -> LabelRef {
        LabelRef {
            label: self,
            direction: Direction::Backward,
        }
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

impl Display for LabelRef {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Forward => 'F',
            Direction::Backward => 'B',
        };

        write!(fmt, "{}:{}", self.label, direction)
    }
}

/// Operando de una instrucción intermedia.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Literal(u64),
    Address(u64),
    Temp(Temp),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    /// Operador que acepta exactamente cuando `self` rechaza.
    pub fn negated(self) -> CmpOp {
        use CmpOp::*;

        match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Ge => Lt,
            Gt => Le,
            Le => Gt,
        }
    }
}

/// Código de tres direcciones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ir {
    Assign { value: Operand, target: Operand },
    Load { address: Operand, into: Temp },
    Store { value: Operand, address: Operand },
    Arith { op: ArithOp, lhs: Operand, rhs: Operand, into: Temp },
    Branch { lhs: Operand, cmp: CmpOp, rhs: Operand, target: LabelRef },
    Goto(LabelRef),
    Read(Operand),
    Write(Operand),
    Inc(Temp),
    Dec(Temp),
    Label(Label),
    Halt,
}

impl Ir {
    /// Indica si la instrucción termina un bloque básico.
    pub fn transfers_control(&self) -> bool {
        matches!(
            self,
            Ir::Branch { .. } | Ir::Goto(_) | Ir::Label(_) | Ir::Halt
        )
    }

    /// Indica si alguno de los operandos de la instrucción es `operand`.
    pub fn mentions(&self, operand: Operand) -> bool {
        self.operands().into_iter().flatten().any(|o| o == operand)
    }

    fn operands(&self) -> [Option<Operand>; 3] {
        match *self {
            Ir::Assign { value, target } => [Some(value), Some(target), None],
            Ir::Load { address, into } => [Some(address), Some(Operand::Temp(into)), None],
            Ir::Store { value, address } => [Some(value), Some(address), None],
            Ir::Arith { lhs, rhs, into, .. } => [Some(lhs), Some(rhs), Some(Operand::Temp(into))],
            Ir::Branch { lhs, rhs, .. } => [Some(lhs), Some(rhs), None],
            Ir::Read(address) | Ir::Write(address) => [Some(address), None, None],
            Ir::Inc(temp) | Ir::Dec(temp) => [Some(Operand::Temp(temp)), None, None],
            Ir::Goto(_) | Ir::Label(_) | Ir::Halt => [None, None, None],
        }
    }
}

/// Proveedor de etiquetas frescas.
///
/// El analizador crea las etiquetas del control estructurado y luego
/// cede el proveedor al generador de código, que necesita etiquetas
/// nuevas para sus propias rutinas.
#[derive(Debug, Default)]
pub struct Labels {
    next: u32,
}

impl Labels {
    pub fn fresh(&mut self) -> Label {
        self.next += 1;
        Label(self.next)
    }
}

/// Salida del análisis semántico.
pub struct Listing {
    pub code: Vec<Ir>,
    pub labels: Labels,
}
