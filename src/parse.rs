//! Análisis sintáctico.
//!
//! Descenso recursivo predictivo con un token de lookahead. El árbol
//! resultante es la entrada del análisis semántico.

use std::{iter::Peekable, rc::Rc, vec};
use thiserror::Error;

use crate::{
    ir::{ArithOp, CmpOp},
    lex::{Identifier, Keyword, Token},
    source::{Located, Location, Position, Source},
};

/// Un programa completo.
#[derive(Debug)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    pub commands: Vec<Command>,
}

#[derive(Debug)]
pub struct Declaration {
    pub name: Located<Identifier>,
    pub kind: DeclKind,
}

#[derive(Debug)]
pub enum DeclKind {
    Scalar,
    Array { low: u64, high: u64 },
}

#[derive(Debug)]
pub enum Command {
    Assign {
        target: Target,
        value: Expr,
    },

    If {
        condition: Condition,
        body: Vec<Command>,
    },

    IfElse {
        condition: Condition,
        then_body: Vec<Command>,
        else_body: Vec<Command>,
    },

    While {
        condition: Condition,
        body: Vec<Command>,
    },

    Repeat {
        body: Vec<Command>,
        condition: Condition,
    },

    ForTo {
        iterator: Located<Identifier>,
        from: Value,
        to: Value,
        body: Vec<Command>,
    },

    ForDownto {
        iterator: Located<Identifier>,
        from: Value,
        to: Value,
        body: Vec<Command>,
    },

    Read {
        target: Target,
    },

    Write {
        value: Value,
    },
}

/// Referencia a una variable escalar o a una celda de arreglo.
#[derive(Debug)]
pub enum Target {
    Scalar(Located<Identifier>),
    Array {
        name: Located<Identifier>,
        index: Index,
    },
}

#[derive(Debug)]
pub enum Index {
    Literal(Located<u64>),
    Variable(Located<Identifier>),
}

#[derive(Debug)]
pub enum Value {
    Literal(u64),
    Reference(Target),
}

/// Una expresión es un valor o una única operación binaria.
#[derive(Debug)]
pub enum Expr {
    Value(Value),
    Binary { op: ArithOp, lhs: Value, rhs: Value },
}

#[derive(Debug)]
pub struct Condition {
    pub op: CmpOp,
    pub lhs: Value,
    pub rhs: Value,
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected an integer literal")]
    ExpectedNumber,

    #[error("Expected a command")]
    ExpectedCommand,

    #[error("Expected a value")]
    ExpectedValue,

    #[error("Expected a comparison operator")]
    ExpectedComparison,

    #[error("Expected end of input after `end`")]
    TrailingInput,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

type Parse<T> = Result<T, Located<ParserError>>;

pub fn parse(source: &Rc<Source>, tokens: Vec<Located<Token>>) -> Parse<Program> {
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        last_known: Location::new(source, Position::default()..Position::default().advance()),
    };

    parser.program()
}

struct Parser {
    tokens: Peekable<vec::IntoIter<Located<Token>>>,
    last_known: Location,
}

impl Parser {
    fn program(&mut self) -> Parse<Program> {
        let declarations = match self.tokens.peek().map(Located::as_ref) {
            Some(Token::Keyword(Keyword::Declare)) => {
                self.next()?;
                self.declarations()?
            }

            _ => Vec::new(),
        };

        self.keyword(Keyword::Begin)?;
        let commands = self.commands()?;
        self.keyword(Keyword::End)?;

        if self.next().is_ok() {
            return self.fail(ParserError::TrailingInput);
        }

        Ok(Program {
            declarations,
            commands,
        })
    }

    fn declarations(&mut self) -> Parse<Vec<Declaration>> {
        let mut declarations = vec![self.declaration()?];
        while let Some(Token::Comma) = self.tokens.peek().map(Located::as_ref) {
            self.next()?;
            declarations.push(self.declaration()?);
        }

        Ok(declarations)
    }

    fn declaration(&mut self) -> Parse<Declaration> {
        let name = self.id()?;

        let kind = match self.tokens.peek().map(Located::as_ref) {
            Some(Token::OpenParen) => {
                self.next()?;
                let low = self.num()?.into_inner();
                self.expect(Token::Colon)?;
                let high = self.num()?.into_inner();
                self.expect(Token::CloseParen)?;

                DeclKind::Array { low, high }
            }

            _ => DeclKind::Scalar,
        };

        Ok(Declaration { name, kind })
    }

    fn commands(&mut self) -> Parse<Vec<Command>> {
        let mut commands = vec![self.command()?];
        while self.starts_command() {
            commands.push(self.command()?);
        }

        Ok(commands)
    }

    fn starts_command(&mut self) -> bool {
        matches!(
            self.tokens.peek().map(Located::as_ref),
            Some(Token::Id(_))
                | Some(Token::Keyword(
                    Keyword::If
                        | Keyword::While
                        | Keyword::Repeat
                        | Keyword::For
                        | Keyword::Read
                        | Keyword::Write
                ))
        )
    }

    fn command(&mut self) -> Parse<Command> {
        match self.tokens.peek().map(Located::as_ref) {
            Some(Token::Keyword(Keyword::If)) => self.if_command(),
            Some(Token::Keyword(Keyword::While)) => self.while_command(),
            Some(Token::Keyword(Keyword::Repeat)) => self.repeat_command(),
            Some(Token::Keyword(Keyword::For)) => self.for_command(),
            Some(Token::Keyword(Keyword::Read)) => self.read_command(),
            Some(Token::Keyword(Keyword::Write)) => self.write_command(),
            Some(Token::Id(_)) => self.assign_command(),

            _ => {
                self.next()?;
                self.fail(ParserError::ExpectedCommand)
            }
        }
    }

    fn assign_command(&mut self) -> Parse<Command> {
        let target = self.target()?;
        self.expect(Token::Assign)?;
        let value = self.expr()?;
        self.expect(Token::Semicolon)?;

        Ok(Command::Assign { target, value })
    }

    fn if_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::If)?;
        let condition = self.condition()?;
        self.keyword(Keyword::Then)?;
        let body = self.commands()?;

        match self.next()?.into_inner() {
            Token::Keyword(Keyword::EndIf) => Ok(Command::If { condition, body }),

            Token::Keyword(Keyword::Else) => {
                let else_body = self.commands()?;
                self.keyword(Keyword::EndIf)?;

                Ok(Command::IfElse {
                    condition,
                    then_body: body,
                    else_body,
                })
            }

            found => self.fail(ParserError::UnexpectedToken(
                Token::Keyword(Keyword::EndIf),
                found,
            )),
        }
    }

    fn while_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::While)?;
        let condition = self.condition()?;
        self.keyword(Keyword::Do)?;
        let body = self.commands()?;
        self.keyword(Keyword::EndWhile)?;

        Ok(Command::While { condition, body })
    }

    fn repeat_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::Repeat)?;
        let body = self.commands()?;
        self.keyword(Keyword::Until)?;
        let condition = self.condition()?;
        self.expect(Token::Semicolon)?;

        Ok(Command::Repeat { body, condition })
    }

    fn for_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::For)?;
        let iterator = self.id()?;
        self.keyword(Keyword::From)?;
        let from = self.value()?;

        let downto = match self.next()?.into_inner() {
            Token::Keyword(Keyword::To) => false,
            Token::Keyword(Keyword::DownTo) => true,
            found => {
                return self.fail(ParserError::UnexpectedToken(
                    Token::Keyword(Keyword::To),
                    found,
                ))
            }
        };

        let to = self.value()?;
        self.keyword(Keyword::Do)?;
        let body = self.commands()?;
        self.keyword(Keyword::EndFor)?;

        Ok(if downto {
            Command::ForDownto {
                iterator,
                from,
                to,
                body,
            }
        } else {
            Command::ForTo {
                iterator,
                from,
                to,
                body,
            }
        })
    }

    fn read_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::Read)?;
        let target = self.target()?;
        self.expect(Token::Semicolon)?;

        Ok(Command::Read { target })
    }

    fn write_command(&mut self) -> Parse<Command> {
        self.keyword(Keyword::Write)?;
        let value = self.value()?;
        self.expect(Token::Semicolon)?;

        Ok(Command::Write { value })
    }

    fn condition(&mut self) -> Parse<Condition> {
        let lhs = self.value()?;

        let op = match self.next()?.into_inner() {
            Token::Equal => CmpOp::Eq,
            Token::NotEqual => CmpOp::Ne,
            Token::Less => CmpOp::Lt,
            Token::Greater => CmpOp::Gt,
            Token::LessOrEqual => CmpOp::Le,
            Token::GreaterOrEqual => CmpOp::Ge,
            _ => return self.fail(ParserError::ExpectedComparison),
        };

        let rhs = self.value()?;
        Ok(Condition { op, lhs, rhs })
    }

    fn expr(&mut self) -> Parse<Expr> {
        let lhs = self.value()?;

        let op = match self.tokens.peek().map(Located::as_ref) {
            Some(Token::Plus) => Some(ArithOp::Add),
            Some(Token::Minus) => Some(ArithOp::Sub),
            Some(Token::Times) => Some(ArithOp::Mul),
            Some(Token::Divide) => Some(ArithOp::Div),
            Some(Token::Modulo) => Some(ArithOp::Mod),
            _ => None,
        };

        match op {
            None => Ok(Expr::Value(lhs)),
            Some(op) => {
                self.next()?;
                let rhs = self.value()?;

                Ok(Expr::Binary { op, lhs, rhs })
            }
        }
    }

    fn value(&mut self) -> Parse<Value> {
        match self.tokens.peek().map(Located::as_ref) {
            Some(Token::Num(_)) => match self.next()?.into_inner() {
                Token::Num(value) => Ok(Value::Literal(value)),
                _ => unreachable!(),
            },

            Some(Token::Id(_)) => Ok(Value::Reference(self.target()?)),

            _ => {
                self.next()?;
                self.fail(ParserError::ExpectedValue)
            }
        }
    }

    fn target(&mut self) -> Parse<Target> {
        let name = self.id()?;

        match self.tokens.peek().map(Located::as_ref) {
            Some(Token::OpenParen) => {
                self.next()?;

                let index = match self.next()?.split() {
                    (location, Token::Num(value)) => Index::Literal(Located::at(value, location)),
                    (location, Token::Id(id)) => Index::Variable(Located::at(id, location)),
                    _ => return self.fail(ParserError::ExpectedValue),
                };

                self.expect(Token::CloseParen)?;
                Ok(Target::Array { name, index })
            }

            _ => Ok(Target::Scalar(name)),
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn num(&mut self) -> Parse<Located<u64>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Num(value) => Ok(Located::at(value, location)),
            _ => self.fail(ParserError::ExpectedNumber),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token)
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;

    fn parse_text(text: &str) -> Result<Program, ParserError> {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source).scan().expect("lexing failed");
        parse(&source, tokens).map_err(Located::into_inner)
    }

    #[test]
    fn minimal_program() {
        let program = parse_text("begin a := 1; end").unwrap();
        assert!(program.declarations.is_empty());
        assert!(matches!(program.commands.as_slice(), [Command::Assign { .. }]));
    }

    #[test]
    fn declarations_scalar_and_array() {
        let program = parse_text("declare a, t(1:5) begin read a; end").unwrap();
        assert_eq!(program.declarations.len(), 2);
        assert!(matches!(program.declarations[0].kind, DeclKind::Scalar));
        assert!(matches!(
            program.declarations[1].kind,
            DeclKind::Array { low: 1, high: 5 }
        ));
    }

    #[test]
    fn structured_commands_nest() {
        let program = parse_text(
            "declare n \
             begin \
                read n; \
                while n > 0 do \
                    if n = 1 then write n; else n := n - 1; endif \
                endwhile \
             end",
        )
        .unwrap();

        match &program.commands[1] {
            Command::While { body, .. } => {
                assert!(matches!(body.as_slice(), [Command::IfElse { .. }]))
            }

            other => panic!("expected while, found {:?}", other),
        }
    }

    #[test]
    fn repeat_holds_condition_after_body() {
        let program = parse_text("declare x begin repeat x := 1; until x = 1; end").unwrap();
        assert!(matches!(
            program.commands.as_slice(),
            [Command::Repeat { condition: Condition { op: CmpOp::Eq, .. }, .. }]
        ));
    }

    #[test]
    fn for_variants() {
        let up = parse_text("begin for i from 1 to 3 do write i; endfor end").unwrap();
        assert!(matches!(up.commands.as_slice(), [Command::ForTo { .. }]));

        let down = parse_text("begin for i from 3 downto 1 do write i; endfor end").unwrap();
        assert!(matches!(down.commands.as_slice(), [Command::ForDownto { .. }]));
    }

    #[test]
    fn missing_semicolon_is_rejected() {
        assert!(matches!(
            parse_text("begin a := 1 end"),
            Err(ParserError::UnexpectedToken(Token::Semicolon, _))
        ));
    }

    #[test]
    fn abrupt_end_is_rejected() {
        assert!(matches!(
            parse_text("begin a := 1;"),
            Err(ParserError::MissingToken(Token::Keyword(Keyword::End)))
        ));
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(matches!(
            parse_text("begin a := 1; end end"),
            Err(ParserError::TrailingInput)
        ));
    }
}
