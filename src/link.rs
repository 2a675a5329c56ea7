//! Enlazado de saltos.
//!
//! El generador emite saltos con etiquetas simbólicas anotadas con la
//! dirección de búsqueda en cada punto de uso. Este pase único
//! recorre el listado emitido, resuelve cada etiqueta a un
//! desplazamiento relativo contando solamente instrucciones reales, y
//! elimina las pseudoinstrucciones de etiqueta. Como el
//! direccionamiento final es enteramente relativo, no hace falta
//! renumerar nada.
//!
//! El modo sin enlazar se conserva para volcados de diagnóstico: el
//! listado sale con etiquetas y destinos simbólicos intactos.

use std::io::{self, Write};

use bitflags::bitflags;

use crate::ir::{Direction, LabelRef};
use crate::machine::{Asm, Dest};

bitflags! {
    /// Opciones a aplicar durante la emisión.
    pub struct EmitOptions: u32 {
        /// Conservar etiquetas y saltos simbólicos, sin backpatching.
        const UNLINKED = 0x01;
    }
}

/// Resuelve todos los saltos simbólicos y elimina las etiquetas.
///
/// El pase es idempotente: un listado ya enlazado no contiene saltos
/// simbólicos ni etiquetas y pasa sin cambios.
pub fn link(mut code: Vec<Asm>) -> Vec<Asm> {
    for position in 0..code.len() {
        let target = match code[position] {
            Asm::Jump(Dest::Symbolic(target)) => target,
            Asm::Jzero(_, Dest::Symbolic(target)) => target,
            Asm::Jodd(_, Dest::Symbolic(target)) => target,
            _ => continue,
        };

        let offset = resolve(&code, position, target);
        match &mut code[position] {
            Asm::Jump(dest) | Asm::Jzero(_, dest) | Asm::Jodd(_, dest) => {
                *dest = Dest::Linked(offset)
            }

            _ => unreachable!(),
        }
    }

    code.retain(Asm::is_real);
    code
}

/// Desplazamiento relativo desde un salto hasta su etiqueta.
///
/// Se recorre el listado en la dirección anotada contando una unidad
/// por instrucción real encontrada, empezando por el propio salto y
/// deteniéndose en la etiqueta. Hacia adelante la cuenta es el
/// desplazamiento; hacia atrás la cuenta negativa se corrige en uno
/// para ajustarse a la convención de saltos relativos de la máquina.
fn resolve(code: &[Asm], from: usize, target: LabelRef) -> i64 {
    let mut offset: i64 = 0;
    let mut position = from;

    loop {
        let instruction = code
            .get(position)
            .unwrap_or_else(|| panic!("unresolved label {}", target));

        if *instruction == Asm::Label(target.label) {
            break;
        }

        if instruction.is_real() {
            offset += match target.direction {
                Direction::Forward => 1,
                Direction::Backward => -1,
            };
        }

        position = match target.direction {
            Direction::Forward => position + 1,
            Direction::Backward => position
                .checked_sub(1)
                .unwrap_or_else(|| panic!("unresolved label {}", target)),
        };
    }

    match target.direction {
        Direction::Forward => offset,
        Direction::Backward => offset + 1,
    }
}

/// Escribe un listado, una instrucción por línea.
pub fn write_listing<W: Write>(code: &[Asm], output: &mut W) -> io::Result<()> {
    for instruction in code {
        writeln!(output, "{}", instruction)?;
    }

    Ok(())
}
