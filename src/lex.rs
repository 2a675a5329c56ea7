//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. Los espacios en
//! blanco y los comentarios delimitados por corchetes se descartan
//! durante esta operación. Cada token emitido está asociado a una
//! ubicación en el código fuente original, lo cual permite rastrear
//! errores tanto en los tokens como en constructos más elevados de
//! fases posteriores.
//!
//! # Contenido de un token
//! Este lexer no produce lexemas para casos donde no son necesarios.
//! Operadores, puntuación y palabras clave se identifican por el hecho
//! de lo que son y no incluyen lexemas. Los identificadores sí incluyen
//! su lexema original, mientras que las constantes se resuelven a sus
//! valores.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores se componen únicamente de letras minúsculas
//!   y `'_'`.
//! - Las palabras clave son case-insensitive, por lo cual tanto
//!   `while` como `WHILE` y `whILE` resultan en [`Keyword::While`].
//! - Las constantes enteras son naturales y caben en 64 bits.
//!
//! # Errores
//! El análisis es fail-fast: el primer error léxico aborta la fase por
//! completo.

use crate::source::{Located, Location, Position, Source};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", u64::MAX)]
    IntOverflow,

    /// Un comentario `[...]` nunca se cierra.
    #[error("Unterminated comment")]
    UnterminatedComment,

    /// Un término con mayúsculas que no corresponde a palabra clave.
    #[error("Identifiers must be written in lowercase")]
    UppercaseId,
}

/// Un identificador.
///
/// Los identificadores se componen de letras minúsculas y `'_'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<String>);

impl Identifier {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Identifier(Rc::new(name.into()))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Constante entera.
    Num(u64),

    /// `:=`
    Assign,

    /// `;`
    Semicolon,

    /// `:`
    Colon,

    /// `,`
    Comma,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Divide,

    /// `%`
    Modulo,

    /// `=`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `>`
    Greater,

    /// `<=`
    LessOrEqual,

    /// `>=`
    GreaterOrEqual,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Num(integer) => write!(fmt, "literal `{}`", integer),
            Assign => fmt.write_str("`:=`"),
            Semicolon => fmt.write_str("`;`"),
            Colon => fmt.write_str("`:`"),
            Comma => fmt.write_str("`,`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Divide => fmt.write_str("`/`"),
            Modulo => fmt.write_str("`%`"),
            Equal => fmt.write_str("`=`"),
            NotEqual => fmt.write_str("`!=`"),
            Less => fmt.write_str("`<`"),
            Greater => fmt.write_str("`>`"),
            LessOrEqual => fmt.write_str("`<=`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Declare,
    Begin,
    End,
    If,
    Then,
    Else,
    EndIf,
    While,
    Do,
    EndWhile,
    Repeat,
    Until,
    For,
    From,
    To,
    DownTo,
    EndFor,
    Read,
    Write,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;

        let string = match self {
            Declare => "declare",
            Begin => "begin",
            End => "end",
            If => "if",
            Then => "then",
            Else => "else",
            EndIf => "endif",
            While => "while",
            Do => "do",
            EndWhile => "endwhile",
            Repeat => "repeat",
            Until => "until",
            For => "for",
            From => "from",
            To => "to",
            DownTo => "downto",
            EndFor => "endfor",
            Read => "read",
            Write => "write",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
            (NoCase::new("declare"), Declare),
            (NoCase::new("begin"), Begin),
            (NoCase::new("end"), End),
            (NoCase::new("if"), If),
            (NoCase::new("then"), Then),
            (NoCase::new("else"), Else),
            (NoCase::new("endif"), EndIf),
            (NoCase::new("while"), While),
            (NoCase::new("do"), Do),
            (NoCase::new("endwhile"), EndWhile),
            (NoCase::new("repeat"), Repeat),
            (NoCase::new("until"), Until),
            (NoCase::new("for"), For),
            (NoCase::new("from"), From),
            (NoCase::new("to"), To),
            (NoCase::new("downto"), DownTo),
            (NoCase::new("endfor"), EndFor),
            (NoCase::new("read"), Read),
            (NoCase::new("write"), Write),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Escáner sobre el texto de un [`Source`].
pub struct Lexer<'a> {
    source: &'a Rc<Source>,
    chars: Peekable<Chars<'a>>,
    start: Position,
    next: Position,
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial sobre un origen.
    pub fn new(source: &'a Rc<Source>) -> Self {
        Lexer {
            source,
            chars: source.text().chars().peekable(),
            start: Position::default(),
            next: Position::default(),
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens, o bien
    /// al primer error léxico encontrado.
    pub fn scan(mut self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next() {
            tokens.push(token?);
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn token(&mut self) -> Result<Option<Located<Token>>, Located<LexerError>> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }

                Some('[') => self.comment()?,
                _ => break,
            }
        }

        self.start = self.next;
        let c = match self.bump() {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = match c {
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Times,
            '/' => Token::Divide,
            '%' => Token::Modulo,
            '=' => Token::Equal,

            ':' if self.take('=') => Token::Assign,
            ':' => Token::Colon,

            '!' if self.take('=') => Token::NotEqual,
            '!' => return Err(self.fail(LexerError::Expected('='))),

            '<' if self.take('=') => Token::LessOrEqual,
            '<' => Token::Less,

            '>' if self.take('=') => Token::GreaterOrEqual,
            '>' => Token::Greater,

            c if c.is_ascii_digit() => self.number(c)?,
            c if is_word_char(c) => self.word(c)?,
            c => return Err(self.fail(LexerError::BadChar(c))),
        };

        Ok(Some(Located::at(token, self.span())))
    }

    /// Acumulación dígito por dígito de una constante entera.
    fn number(&mut self, first: char) -> Result<Token, Located<LexerError>> {
        let mut value = u64::from(first.to_digit(10).unwrap());

        while let Some(digit) = self.chars.peek().and_then(|c| c.to_digit(10)) {
            self.bump();

            value = match value.checked_mul(10).and_then(|v| v.checked_add(u64::from(digit))) {
                Some(value) => value,
                None => return Err(self.fail(LexerError::IntOverflow)),
            };
        }

        Ok(Token::Num(value))
    }

    /// Término que puede ser un identificador o una palabra clave.
    fn word(&mut self, first: char) -> Result<Token, Located<LexerError>> {
        let mut word = String::from(first);
        while let Some(c) = self.chars.peek().copied().filter(|&c| is_word_char(c)) {
            self.bump();
            word.push(c);
        }

        if let Ok(keyword) = Keyword::from_str(&word) {
            Ok(Token::Keyword(keyword))
        } else if word.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            Ok(Token::Id(Identifier::new(word)))
        } else {
            Err(self.fail(LexerError::UppercaseId))
        }
    }

    /// Descarta un comentario `[...]` por completo.
    fn comment(&mut self) -> Result<(), Located<LexerError>> {
        self.start = self.next;
        self.bump();

        loop {
            match self.bump() {
                Some(']') => break Ok(()),
                Some(_) => continue,
                None => break Err(self.fail(LexerError::UnterminatedComment)),
            }
        }
    }

    /// Consume el siguiente carácter, actualizando la posición.
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.next = match c {
            '\n' => self.next.newline(),
            _ => self.next.advance(),
        };

        Some(c)
    }

    /// Consume el siguiente carácter solo si es el esperado.
    fn take(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn span(&self) -> Location {
        Location::new(self.source, self.start..self.next)
    }

    fn fail(&self, error: LexerError) -> Located<LexerError> {
        Located::at(error, self.span())
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token().transpose()
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Result<Vec<Token>, LexerError> {
        let source = Source::new("test", text);
        match Lexer::new(&source).scan() {
            Ok(tokens) => Ok(tokens.into_iter().map(Located::into_inner).collect()),
            Err(error) => Err(error.into_inner()),
        }
    }

    #[test]
    fn keywords_are_case_insensitive() {
        for text in ["while", "WHILE", "whILE"] {
            assert_eq!(lex(text).unwrap(), vec![Token::Keyword(Keyword::While)]);
        }
    }

    #[test]
    fn punctuation_and_operators() {
        let tokens = lex("a := b(2) ; x <= 5 % 3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Id(Identifier::new("a")),
                Token::Assign,
                Token::Id(Identifier::new("b")),
                Token::OpenParen,
                Token::Num(2),
                Token::CloseParen,
                Token::Semicolon,
                Token::Id(Identifier::new("x")),
                Token::LessOrEqual,
                Token::Num(5),
                Token::Modulo,
                Token::Num(3),
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        let tokens = lex("begin [ cualquier\ncosa ] end").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Begin),
                Token::Keyword(Keyword::End),
            ]
        );
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        assert!(matches!(lex("begin [ oops"), Err(LexerError::UnterminatedComment)));
    }

    #[test]
    fn uppercase_identifiers_are_rejected() {
        assert!(matches!(lex("Abc"), Err(LexerError::UppercaseId)));
    }

    #[test]
    fn bad_characters_are_rejected() {
        assert!(matches!(lex("a # b"), Err(LexerError::BadChar('#'))));
        assert!(matches!(lex("a ! b"), Err(LexerError::Expected('='))));
    }

    #[test]
    fn literal_overflow_is_detected() {
        assert!(matches!(lex("99999999999999999999"), Err(LexerError::IntOverflow)));
        assert!(matches!(
            lex("18446744073709551615").unwrap().as_slice(),
            [Token::Num(u64::MAX)]
        ));
    }
}
