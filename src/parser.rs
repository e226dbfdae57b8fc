use std::collections::HashMap;
use std::str::Chars;

use lazy_static::lazy_static;

use crate::ast::{Expr, Function, Prototype, ANON_FN};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("expected {0}, found {1}")]
    Expected(&'static str, Token),
    #[error("unknown token {0} when expecting an expression")]
    UnknownToken(Token),
}

pub type ParseResult<T> = Result<T, ParseError>;

lazy_static! {
    static ref DEFAULT_PRECEDENCE: HashMap<char, i32> = {
        let mut table = HashMap::new();
        table.insert('<', 10);
        table.insert('+', 20);
        table.insert('-', 20);
        table.insert('*', 40);
        table
    };
}

/// Recursive-descent parser with a single token of lookahead and
/// precedence climbing for binary operators. Owns all per-session parse
/// state: the lexer, the current-token cursor and the precedence table.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    precedence: HashMap<char, i32>,
}

impl<'a> Parser<Chars<'a>> {
    pub fn from_source(input: &'a str) -> Self {
        Parser::new(Lexer::new(input.chars()))
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(mut lexer: Lexer<I>) -> Self {
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            precedence: DEFAULT_PRECEDENCE.clone(),
        }
    }

    /// The lookahead token; the driver dispatches top-level units on it.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Discard the current token. The driver resynchronizes with this after
    /// a failed unit; the parser itself never recovers.
    pub fn skip(&mut self) {
        self.bump();
    }

    fn bump(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    /// Precedence of the current token, or -1 if it is not a binary
    /// operator here (not an `Op`, or not in the table with a positive
    /// priority).
    fn current_precedence(&self) -> i32 {
        match self.current {
            Token::Op(op) => match self.precedence.get(&op) {
                Some(&prec) if prec > 0 => prec,
                _ => -1,
            },
            _ => -1,
        }
    }

    fn parse_number(&mut self) -> ParseResult<Expr> {
        match self.bump() {
            Token::Number(value) => Ok(Expr::Number(value)),
            token => Err(ParseError::Expected("a number", token)),
        }
    }

    fn parse_paren(&mut self) -> ParseResult<Expr> {
        self.bump(); // eat '('
        let expr = self.parse_expression()?;
        if self.current != Token::Op(')') {
            return Err(ParseError::Expected("')'", self.current.clone()));
        }
        self.bump(); // eat ')'
        Ok(expr)
    }

    fn parse_identifier(&mut self) -> ParseResult<Expr> {
        let name = match self.bump() {
            Token::Ident(name) => name,
            token => return Err(ParseError::Expected("an identifier", token)),
        };

        if self.current != Token::Op('(') {
            return Ok(Expr::Variable(name));
        }
        self.bump(); // eat '('

        let mut args = Vec::new();
        if self.current != Token::Op(')') {
            loop {
                // a malformed argument is dropped, but the delimiter after
                // it is still required
                if let Ok(arg) = self.parse_expression() {
                    args.push(arg);
                }
                if self.current == Token::Op(')') {
                    break;
                }
                if self.current != Token::Op(',') {
                    return Err(ParseError::Expected("')' or ','", self.current.clone()));
                }
                self.bump(); // eat ','
            }
        }
        self.bump(); // eat ')'

        Ok(Expr::Call(name, args))
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match &self.current {
            Token::Number(_) => self.parse_number(),
            Token::Ident(_) => self.parse_identifier(),
            Token::Op('(') => self.parse_paren(),
            token => Err(ParseError::UnknownToken(token.clone())),
        }
    }

    fn parse_binop_rhs(&mut self, min_prec: i32, mut lhs: Expr) -> ParseResult<Expr> {
        loop {
            let prec = self.current_precedence();
            if prec < min_prec {
                return Ok(lhs);
            }

            let op = match self.bump() {
                Token::Op(op) => op,
                _ => unreachable!("current_precedence only matches operators"),
            };

            let mut rhs = self.parse_primary()?;

            // a tighter-binding operator after rhs claims it first;
            // equal precedence folds left
            if prec < self.current_precedence() {
                rhs = self.parse_binop_rhs(prec + 1, rhs)?;
            }

            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    /// prototype ::= IDENT '(' IDENT* ')' — parameters are whitespace
    /// separated, no commas.
    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            token => {
                return Err(ParseError::Expected(
                    "function name in prototype",
                    token.clone(),
                ))
            }
        };
        self.bump(); // eat the name

        if self.current != Token::Op('(') {
            return Err(ParseError::Expected("'(' in prototype", self.current.clone()));
        }

        let mut params = Vec::new();
        loop {
            self.bump();
            match &self.current {
                Token::Ident(param) => params.push(param.clone()),
                _ => break,
            }
        }

        if self.current != Token::Op(')') {
            return Err(ParseError::Expected("')' in prototype", self.current.clone()));
        }
        self.bump(); // eat ')'

        Ok(Prototype { name, params })
    }

    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        self.bump(); // eat 'def'
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.bump(); // eat 'extern'
        self.parse_prototype()
    }

    /// A bare expression at the top level becomes the body of an anonymous
    /// zero-parameter function.
    pub fn parse_toplevel(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        let prototype = Prototype {
            name: ANON_FN.to_string(),
            params: Vec::new(),
        };
        Ok(Function { prototype, body })
    }
}
