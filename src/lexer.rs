use std::fmt;
use std::iter::Peekable;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Op(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Op(op) => write!(f, "'{}'", op),
        }
    }
}

/// Streaming tokenizer: pulls characters one at a time with a single
/// character of lookahead. Never rejects input; anything unrecognised
/// comes back verbatim as an `Op` token.
pub struct Lexer<I: Iterator<Item = char>> {
    chars: Peekable<I>,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(chars: I) -> Self {
        Lexer {
            chars: chars.peekable(),
        }
    }

    /// Scan and return the next token. Once the input is exhausted this
    /// returns `Eof` on every call.
    pub fn next_token(&mut self) -> Token {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }

        let c = match self.chars.peek() {
            Some(&c) => c,
            None => return Token::Eof,
        };

        if c.is_ascii_alphabetic() {
            let mut ident = String::new();
            while let Some(&c) = self.chars.peek() {
                if !c.is_ascii_alphanumeric() {
                    break;
                }
                ident.push(c);
                self.chars.next();
            }
            return match ident.as_str() {
                "def" => Token::Def,
                "extern" => Token::Extern,
                _ => Token::Ident(ident),
            };
        }

        if c.is_ascii_digit() || c == '.' {
            // accumulate the whole run before converting; a second '.' ends
            // the literal and is left for the next scan
            let mut text = String::new();
            let mut seen_point = false;
            while let Some(&c) = self.chars.peek() {
                if c == '.' && !seen_point {
                    seen_point = true;
                } else if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.chars.next();
            }
            // a lone '.' scans as zero rather than rejecting the input
            return Token::Number(text.parse().unwrap_or(0.0));
        }

        if c == '#' {
            while matches!(self.chars.peek(), Some(&c) if c != '\n' && c != '\r') {
                self.chars.next();
            }
            return self.next_token();
        }

        self.chars.next();
        Token::Op(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex_all(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input.chars());
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            lex_all("def extern deff x1"),
            vec![
                Token::Def,
                Token::Extern,
                Token::Ident("deff".to_string()),
                Token::Ident("x1".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literal_fidelity() {
        assert_eq!(
            lex_all("3.14"),
            vec![Token::Number(3.14), Token::Eof]
        );
        assert_eq!(lex_all("1"), vec![Token::Number(1.0), Token::Eof]);
        assert_eq!(lex_all("2."), vec![Token::Number(2.0), Token::Eof]);
        assert_eq!(lex_all(".5"), vec![Token::Number(0.5), Token::Eof]);
    }

    #[test]
    fn second_point_ends_the_literal() {
        assert_eq!(
            lex_all("1.2.3"),
            vec![Token::Number(1.2), Token::Number(0.3), Token::Eof]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            lex_all("1 # the rest is noise ()*\n2"),
            vec![Token::Number(1.0), Token::Number(2.0), Token::Eof]
        );
        assert_eq!(lex_all("# only a comment"), vec![Token::Eof]);
    }

    #[test]
    fn punctuation_comes_back_verbatim() {
        assert_eq!(
            lex_all("(),;+<"),
            vec![
                Token::Op('('),
                Token::Op(')'),
                Token::Op(','),
                Token::Op(';'),
                Token::Op('+'),
                Token::Op('<'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn eof_repeats_after_exhaustion() {
        let mut lexer = Lexer::new("x".chars());
        assert_eq!(lexer.next_token(), Token::Ident("x".to_string()));
        assert_eq!(lexer.next_token(), Token::Eof);
        assert_eq!(lexer.next_token(), Token::Eof);
    }

    #[test]
    fn relex_of_identical_input_is_identical() {
        let input = "def f(x) x + 1 # trailing\nextern g(a b) 2.5, y";
        assert_eq!(lex_all(input), lex_all(input));
    }
}
