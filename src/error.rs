//! Reporte de diagnósticos.
//!
//! Las fases devuelven sus errores por la cadena de `Result` hasta el
//! driver, que los presenta con un extracto del código fuente y
//! termina el proceso con un estado que distingue la clase del error.
//! Ninguna rutina de validación termina el proceso por sí misma.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::{
    lex::LexerError,
    parse::ParserError,
    semantic::SemanticError,
    source::Located,
};

/// Error de cualquier fase de la compilación.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lexical(#[from] LexerError),

    #[error(transparent)]
    Syntax(#[from] ParserError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

impl CompileError {
    /// Estado de salida del proceso, distinto por clase de error.
    pub fn status(&self) -> i32 {
        match self {
            CompileError::Lexical(_) => 3,
            CompileError::Syntax(_) => 4,
            CompileError::Semantic(_) => 5,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CompileError::Lexical(_) => "lexical error",
            CompileError::Syntax(_) => "syntax error",
            CompileError::Semantic(_) => "semantic error",
        }
    }
}

/// Un error de compilación listo para presentarse.
#[derive(Debug)]
pub struct Diagnostic(Located<CompileError>);

impl Diagnostic {
    pub fn status(&self) -> i32 {
        self.0.as_ref().status()
    }

    pub fn error(&self) -> &CompileError {
        self.0.as_ref()
    }
}

impl From<Located<LexerError>> for Diagnostic {
    fn from(error: Located<LexerError>) -> Self {
        Diagnostic(error.map(CompileError::from))
    }
}

impl From<Located<ParserError>> for Diagnostic {
    fn from(error: Located<ParserError>) -> Self {
        Diagnostic(error.map(CompileError::from))
    }
}

impl From<Located<SemanticError>> for Diagnostic {
    fn from(error: Located<SemanticError>) -> Self {
        Diagnostic(error.map(CompileError::from))
    }
}

impl Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = self.0.as_ref();
        let location = self.0.location();

        writeln!(fmt, "{}: {}", error.kind(), error)?;
        writeln!(fmt, " --> {}", location)?;

        let (start, end) = (location.start(), location.end());
        let digits = end.line().to_string().chars().count();
        writeln!(fmt, "{:digits$} |", "", digits = digits)?;

        for line_number in start.line()..=end.line() {
            if let Some(line) = location.line(line_number) {
                writeln!(
                    fmt,
                    "{:>digits$} | {}",
                    line_number,
                    line,
                    digits = digits
                )?;
            }
        }

        let (from, to) = (start.column(), end.column().saturating_sub(1));
        let min = from.min(to).max(1);
        let max = from.max(to);

        let skip = (min - 1) as usize;
        let highlight = (max - min + 1) as usize;

        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = skip,
            highlight = highlight
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Location, Position, Source};

    #[test]
    fn diagnostics_render_an_excerpt() {
        let source = Source::new("program.imp", "begin\n  a := 1;\nend");
        let location = Location::new(
            &source,
            Position::default().newline().advance().advance()
                ..Position::default().newline().advance().advance().advance(),
        );

        let diagnostic = Diagnostic::from(Located::at(
            SemanticError::Undeclared(crate::lex::Identifier::new("a")),
            location,
        ));

        let rendered = diagnostic.to_string();
        assert!(rendered.contains("semantic error: Symbol `a` is undeclared"));
        assert!(rendered.contains("program.imp:2:3"));
        assert!(rendered.contains("a := 1;"));
        assert_eq!(diagnostic.status(), 5);
    }
}
