//! Archivo de registros y descriptores de contenido.
//!
//! Cada registro físico lleva un descriptor con lo que contiene en el
//! punto actual de la emisión y una marca de reserva. El contenido se
//! modela explícitamente en tres casos para no confundir "contiene el
//! literal cero" con "no contiene nada".

use crate::{ir::Temp, machine::Reg};

/// Valor simbólico reflejado en un registro.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sym {
    Temp(Temp),
    Address(u64),
}

/// Contenido conocido de un registro.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Contents {
    Empty,
    Literal(u64),
    Symbolic(Sym),
}

/// Resultado de una solicitud de registro.
pub enum Acquired {
    /// El registro ya contiene el valor solicitado.
    Cached(Reg),

    /// Registro recién tomado; el valor debe materializarse.
    Fresh(Reg),
}

struct Slot {
    reg: Reg,
    contents: Contents,
    locked: bool,
}

pub struct RegisterFile {
    slots: [Slot; 6],
}

impl Default for RegisterFile {
    fn default() -> Self {
        RegisterFile {
            slots: Reg::FILE.map(|reg| Slot {
                reg,
                contents: Contents::Empty,
                locked: false,
            }),
        }
    }
}

impl RegisterFile {
    /// Solicita un registro que contenga `contents`.
    ///
    /// Si algún registro ya refleja exactamente ese valor se reutiliza
    /// (el primero en orden fijo `a..f`), lo cual evita cargas
    /// redundantes. Una salvedad: un literal cuyo registro está
    /// reservado por la instrucción en curso se materializa de nuevo,
    /// porque dos operandos distintos no deben compartir registro. En
    /// otro caso se toma el primer registro libre, desalojando su
    /// contenido anterior sin ninguna salvaguarda; no existe spill.
    pub fn acquire(&mut self, contents: Contents) -> Acquired {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.contents == contents) {
            let aliasable = matches!(contents, Contents::Symbolic(_));
            if !slot.locked || aliasable {
                slot.locked = true;
                return Acquired::Cached(slot.reg);
            }
        }

        let slot = self.first_free();
        slot.contents = contents;
        slot.locked = true;

        Acquired::Fresh(slot.reg)
    }

    /// Toma un registro libre sin contenido asociado.
    pub fn scratch(&mut self) -> Reg {
        let slot = self.first_free();
        slot.contents = Contents::Empty;
        slot.locked = true;

        slot.reg
    }

    pub fn contents(&self, reg: Reg) -> Contents {
        self.slots[reg as usize].contents
    }

    /// Reemplaza el descriptor de contenido de un registro.
    pub fn tag(&mut self, reg: Reg, contents: Contents) {
        self.slots[reg as usize].contents = contents;
    }

    /// Libera la reserva sin olvidar el contenido.
    pub fn unlock(&mut self, reg: Reg) {
        self.slots[reg as usize].locked = false;
    }

    /// Libera la reserva y olvida el contenido.
    pub fn release(&mut self, reg: Reg) {
        let slot = &mut self.slots[reg as usize];
        slot.contents = Contents::Empty;
        slot.locked = false;
    }

    /// Olvida todo estado; ocurre en cada frontera de bloque básico.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.contents = Contents::Empty;
            slot.locked = false;
        }
    }

    fn first_free(&mut self) -> &mut Slot {
        self.slots
            .iter_mut()
            .find(|slot| !slot.locked)
            .expect("register file exhaustion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_values_are_reused_in_fixed_order() {
        let mut file = RegisterFile::default();

        let first = match file.acquire(Contents::Literal(5)) {
            Acquired::Fresh(reg) => reg,
            Acquired::Cached(_) => panic!("nothing was cached yet"),
        };

        assert_eq!(first, Reg::A);
        file.unlock(first);

        assert!(matches!(
            file.acquire(Contents::Literal(5)),
            Acquired::Cached(Reg::A)
        ));
    }

    #[test]
    fn locked_literals_are_not_aliased() {
        let mut file = RegisterFile::default();

        let first = match file.acquire(Contents::Literal(3)) {
            Acquired::Fresh(reg) => reg,
            Acquired::Cached(_) => panic!(),
        };

        // Mismo literal, pero el registro sigue reservado: se exige
        // un registro aparte.
        let second = match file.acquire(Contents::Literal(3)) {
            Acquired::Fresh(reg) => reg,
            Acquired::Cached(_) => panic!("operands must not alias"),
        };

        assert_ne!(first, second);
    }

    #[test]
    fn locked_temporaries_are_found_again() {
        let mut file = RegisterFile::default();
        let temp = Contents::Symbolic(Sym::Temp(Temp(1)));

        let reg = match file.acquire(temp) {
            Acquired::Fresh(reg) => reg,
            Acquired::Cached(_) => panic!(),
        };

        assert!(matches!(file.acquire(temp), Acquired::Cached(r) if r == reg));
    }

    #[test]
    fn eviction_takes_the_first_unlocked_register() {
        let mut file = RegisterFile::default();

        let a = file.scratch();
        let b = file.scratch();
        assert_eq!((a, b), (Reg::A, Reg::B));

        file.tag(b, Contents::Literal(9));
        file.unlock(b);

        // `a` sigue reservado, por lo cual la siguiente toma cae en
        // `b` y desaloja el literal.
        let taken = file.scratch();
        assert_eq!(taken, Reg::B);
        assert_eq!(file.contents(taken), Contents::Empty);
    }
}
