//! Tabla de símbolos y asignación de direcciones.
//!
//! El espacio de direcciones de la máquina objetivo es plano y se
//! reparte con un puntero monotónico: cada declaración reserva el
//! siguiente bloque contiguo y ningún bloque se traslapa. Los
//! iteradores de lazos son la única excepción al carácter monotónico:
//! se reservan al entrar al lazo y su dirección se recupera al salir,
//! en disciplina estricta de pila.

use std::collections::HashMap;
use thiserror::Error;

use crate::lex::Identifier;

/// Fallo de declaración.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Duplicate declaration of `{0}`")]
    Duplicate(Identifier),

    #[error("Bad array bounds for `{name}`: left end {low} is higher than right end {high}")]
    InvalidRange {
        name: Identifier,
        low: u64,
        high: u64,
    },

    #[error("Duplicate declaration of iterator variable `{0}`")]
    DuplicateIterator(Identifier),
}

/// Entrada de la tabla de símbolos.
#[derive(Clone, Debug)]
pub enum Symbol {
    Scalar(Scalar),
    Array(Array),
}

#[derive(Copy, Clone, Debug)]
pub struct Scalar {
    pub address: u64,
    pub initialized: bool,
    pub iterator: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct Array {
    pub base: u64,
    pub low: u64,
    pub high: u64,
}

impl Array {
    /// Cantidad de celdas que ocupa el arreglo.
    pub fn len(&self) -> u64 {
        self.high - self.low + 1
    }

    /// Dirección de la celda `index`, que debe estar en rango.
    pub fn cell(&self, index: u64) -> u64 {
        self.base + (index - self.low)
    }

    /// Determina si `index` está dentro de los límites declarados.
    pub fn contains(&self, index: u64) -> bool {
        (self.low..=self.high).contains(&index)
    }
}

#[derive(Default)]
pub struct SymbolTable {
    symbols: HashMap<Identifier, Symbol>,
    next_address: u64,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Identifier) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Reserva una dirección para una variable escalar.
    pub fn declare_scalar(&mut self, name: &Identifier) -> Result<(), SymbolError> {
        if self.symbols.contains_key(name) {
            return Err(SymbolError::Duplicate(name.clone()));
        }

        let scalar = Scalar {
            address: self.next_address,
            initialized: false,
            iterator: false,
        };

        self.symbols.insert(name.clone(), Symbol::Scalar(scalar));
        self.next_address += 1;

        Ok(())
    }

    /// Reserva un bloque contiguo para un arreglo de límites `[low, high]`.
    pub fn declare_array(
        &mut self,
        name: &Identifier,
        low: u64,
        high: u64,
    ) -> Result<(), SymbolError> {
        if self.symbols.contains_key(name) {
            return Err(SymbolError::Duplicate(name.clone()));
        }

        if low > high {
            return Err(SymbolError::InvalidRange {
                name: name.clone(),
                low,
                high,
            });
        }

        let array = Array {
            base: self.next_address,
            low,
            high,
        };

        self.symbols.insert(name.clone(), Symbol::Array(array));
        self.next_address += array.len();

        Ok(())
    }

    /// Reserva la dirección de un iterador de lazo.
    ///
    /// Los iteradores nacen inicializados y son inmutables para el
    /// código de usuario.
    pub fn declare_iterator(&mut self, name: &Identifier) -> Result<u64, SymbolError> {
        if self.symbols.contains_key(name) {
            return Err(SymbolError::DuplicateIterator(name.clone()));
        }

        let address = self.next_address;
        let scalar = Scalar {
            address,
            initialized: true,
            iterator: true,
        };

        self.symbols.insert(name.clone(), Symbol::Scalar(scalar));
        self.next_address += 1;

        Ok(address)
    }

    /// Recupera la dirección de un iterador al cerrar su lazo.
    ///
    /// Los lazos cierran en orden LIFO, por lo cual la dirección
    /// liberada es siempre la última reservada.
    pub fn release_iterator(&mut self, name: &Identifier) {
        let symbol = self.symbols.remove(name);
        self.next_address -= 1;

        debug_assert!(matches!(
            symbol,
            Some(Symbol::Scalar(Scalar { address, iterator: true, .. })) if address == self.next_address
        ));
    }

    /// Marca una variable escalar como inicializada.
    pub fn initialize(&mut self, name: &Identifier) {
        match self.symbols.get_mut(name) {
            Some(Symbol::Scalar(scalar)) => scalar.initialized = true,
            _ => unreachable!("initialize() on a symbol that was never validated"),
        }
    }

    /// Primera dirección más allá de todo lo reservado.
    ///
    /// La celda no queda reservada; sirve de espacio transitorio para
    /// escribir constantes.
    pub fn scratch_address(&self) -> u64 {
        self.next_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn addresses_never_overlap() {
        let mut table = SymbolTable::new();
        table.declare_scalar(&id("a")).unwrap();
        table.declare_array(&id("t"), 3, 7).unwrap();
        table.declare_scalar(&id("b")).unwrap();

        let a = match table.get(&id("a")) {
            Some(Symbol::Scalar(scalar)) => scalar.address,
            _ => panic!(),
        };

        let t = match table.get(&id("t")) {
            Some(Symbol::Array(array)) => *array,
            _ => panic!(),
        };

        let b = match table.get(&id("b")) {
            Some(Symbol::Scalar(scalar)) => scalar.address,
            _ => panic!(),
        };

        assert_eq!(a, 0);
        assert_eq!(t.base, 1);
        assert_eq!(t.len(), 5);
        assert_eq!(t.cell(3), 1);
        assert_eq!(t.cell(7), 5);
        assert_eq!(b, 6);
        assert_eq!(table.scratch_address(), 7);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut table = SymbolTable::new();
        table.declare_scalar(&id("a")).unwrap();

        assert!(matches!(
            table.declare_scalar(&id("a")),
            Err(SymbolError::Duplicate(_))
        ));

        assert!(matches!(
            table.declare_array(&id("a"), 0, 3),
            Err(SymbolError::Duplicate(_))
        ));

        assert!(matches!(
            table.declare_iterator(&id("a")),
            Err(SymbolError::DuplicateIterator(_))
        ));
    }

    #[test]
    fn backwards_ranges_are_rejected() {
        let mut table = SymbolTable::new();
        assert!(matches!(
            table.declare_array(&id("t"), 5, 2),
            Err(SymbolError::InvalidRange { low: 5, high: 2, .. })
        ));
    }

    #[test]
    fn iterators_follow_stack_discipline() {
        let mut table = SymbolTable::new();
        table.declare_scalar(&id("a")).unwrap();
        let before = table.scratch_address();

        let outer = table.declare_iterator(&id("i")).unwrap();
        let bound = table.declare_iterator(&id("loop1")).unwrap();
        let inner = table.declare_iterator(&id("j")).unwrap();
        assert_eq!((outer, bound, inner), (before, before + 1, before + 2));

        table.release_iterator(&id("j"));
        table.release_iterator(&id("loop1"));
        table.release_iterator(&id("i"));

        assert_eq!(table.scratch_address(), before);
        assert!(table.get(&id("i")).is_none());
    }
}
