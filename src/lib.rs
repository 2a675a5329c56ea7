//! Compilador de un lenguaje imperativo pequeño hacia una máquina de
//! registros.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente. El
//! texto se somete primero a análisis léxico en [`lex`], de lo cual
//! se obtiene un flujo de tokens. El flujo de tokens se dispone en un
//! árbol sintáctico por medio de análisis sintáctico en [`parse`]. El
//! árbol es procesado por análisis semántico en [`semantic`], que
//! valida cada referencia contra la tabla de símbolos de [`symbols`]
//! y genera la representación intermedia descrita en [`ir`], con lo
//! cual concluyen las fases delanteras.
//!
//! # Back end
//! En [`codegen`] el listado intermedio se traduce al conjunto de
//! instrucciones de la máquina descrito en [`machine`], asignando los
//! seis registros físicos con reutilización acotada por vida. Los
//! saltos nacen con etiquetas simbólicas anotadas con su dirección de
//! búsqueda; el pase final de [`link`] las resuelve a desplazamientos
//! relativos y elimina las marcas, produciendo el listado ejecutable.

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod link;
pub mod machine;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod symbols;

use error::Diagnostic;
use link::EmitOptions;
use machine::Asm;

/// Compila un programa completo, de texto fuente a listado objetivo.
pub fn compile(name: &str, text: &str, options: EmitOptions) -> Result<Vec<Asm>, Diagnostic> {
    let source = source::Source::new(name, text);

    let tokens = lex::Lexer::new(&source).scan()?;
    let program = parse::parse(&source, tokens)?;
    let listing = semantic::Analyzer::lower(&program)?;
    let code = codegen::generate(listing);

    Ok(if options.contains(EmitOptions::UNLINKED) {
        code
    } else {
        link::link(code)
    })
}
