use shale_core::pos::Pos;

use crate::token::{Token, TokenKind};

/// An error produced while tokenizing source text.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub pos: Pos,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for LexError {}

/// The lexer for the Shale language.
///
/// Yields tokens one at a time; on a malformed input the iterator stops and
/// the error is retrievable through [`Lexer::take_error`].
#[derive(Debug, Clone)]
pub struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
    pending_blank: bool,
    error: Option<LexError>,
}

impl Lexer {
    /// Construct a new lexer.
    pub fn new<T: AsRef<str>>(input: T) -> Lexer {
        Lexer {
            chars: input.as_ref().chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
            pending_blank: false,
            error: None,
        }
    }

    /// Take the error the lexer stopped on, if any.
    pub fn take_error(&mut self) -> Option<LexError> {
        self.error.take()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.idx).copied()?;
        self.idx += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn fail(&mut self, message: impl Into<String>, pos: Pos) -> Option<Token> {
        self.error = Some(LexError {
            message: message.into(),
            pos,
        });
        None
    }

    fn lex_string(&mut self) -> Option<Token> {
        let pos = self.pos();
        let blank = self.pending_blank;
        self.pending_blank = false;
        self.bump();
        let mut output = String::new();
        loop {
            let ch = match self.bump() {
                Some(ch) => ch,
                None => return self.fail("unterminated string literal", pos),
            };
            match ch {
                '"' => break,
                '\\' => {
                    let escape = match self.bump() {
                        Some(escape) => escape,
                        None => return self.fail("unterminated string literal", pos),
                    };
                    match escape {
                        'n' => output.push('\n'),
                        't' => output.push('\t'),
                        'r' => output.push('\r'),
                        '0' => output.push('\0'),
                        '"' => output.push('"'),
                        '\\' => output.push('\\'),
                        '$' => output.push('$'),
                        other => {
                            output.push('\\');
                            output.push(other);
                        }
                    }
                }
                ch => output.push(ch),
            }
        }
        Some(Token::new(TokenKind::LitString(output), pos, blank))
    }

    fn lex_number(&mut self) -> Option<Token> {
        let pos = self.pos();
        let blank = self.pending_blank;
        self.pending_blank = false;
        let mut repr = String::new();
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            repr.push(self.bump()?);
        }
        let is_real = matches!(
            (self.peek(), self.peek_at(1)),
            (Some('.'), Some(ch)) if ch.is_ascii_digit()
        );
        if is_real {
            repr.push(self.bump()?);
            while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
                repr.push(self.bump()?);
            }
            match repr.parse::<f64>() {
                Ok(number) => Some(Token::new(TokenKind::LitReal(number), pos, blank)),
                Err(_) => self.fail(format!("invalid number literal '{}'", repr), pos),
            }
        } else {
            match repr.parse::<i64>() {
                Ok(number) => Some(Token::new(TokenKind::LitInteger(number), pos, blank)),
                Err(_) => self.fail(format!("integer literal '{}' out of range", repr), pos),
            }
        }
    }

    fn lex_identifier(&mut self) -> Option<Token> {
        let pos = self.pos();
        let blank = self.pending_blank;
        self.pending_blank = false;
        let mut ident = String::new();
        while matches!(self.peek(), Some(ch) if ch.is_alphanumeric() || ch == '_') {
            ident.push(self.bump()?);
        }
        let kind = match ident.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "func" => TokenKind::Func,
            "class" => TokenKind::Class,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "throw" => TokenKind::Throw,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "alias" => TokenKind::Alias,
            "cmd" => TokenKind::CmdKw,
            "global" => TokenKind::Global,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Identifier(ident),
        };
        Some(Token::new(kind, pos, blank))
    }

    /// Lex an operator, preferring the longest match.
    fn lex_operator(&mut self) -> Option<Token> {
        let pos = self.pos();
        let blank = self.pending_blank;
        self.pending_blank = false;
        let first = self.bump()?;
        let second = self.peek();
        let kind = match (first, second) {
            ('*', Some('*')) => {
                self.bump();
                TokenKind::StarStar
            }
            ('*', Some('=')) => {
                self.bump();
                TokenKind::StarAssign
            }
            ('*', _) => TokenKind::Star,
            ('+', Some('=')) => {
                self.bump();
                TokenKind::PlusAssign
            }
            ('+', _) => TokenKind::Plus,
            ('-', Some('=')) => {
                self.bump();
                TokenKind::MinusAssign
            }
            ('-', _) => TokenKind::Minus,
            ('/', Some('=')) => {
                self.bump();
                TokenKind::SlashAssign
            }
            ('/', _) => TokenKind::Slash,
            ('%', Some('=')) => {
                self.bump();
                TokenKind::PercentAssign
            }
            ('%', Some('{')) => {
                self.bump();
                TokenKind::PercentLBrace
            }
            ('%', _) => TokenKind::Percent,
            ('&', Some('&')) => {
                self.bump();
                TokenKind::AmpAmp
            }
            ('&', Some('=')) => {
                self.bump();
                TokenKind::AmpAssign
            }
            ('&', _) => TokenKind::Amp,
            ('|', Some('|')) => {
                self.bump();
                TokenKind::PipePipe
            }
            ('|', Some('=')) => {
                self.bump();
                TokenKind::PipeAssign
            }
            ('|', _) => TokenKind::Pipe,
            ('^', Some('=')) => {
                self.bump();
                TokenKind::CaretAssign
            }
            ('^', _) => TokenKind::Caret,
            ('~', _) => TokenKind::Tilde,
            ('!', Some('=')) => {
                self.bump();
                TokenKind::NotEqual
            }
            ('!', _) => TokenKind::Bang,
            ('?', _) => TokenKind::Question,
            ('=', Some('=')) => {
                self.bump();
                TokenKind::Equal
            }
            ('=', _) => TokenKind::Assign,
            ('<', Some('<')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::ShlAssign
                } else {
                    TokenKind::Shl
                }
            }
            ('<', Some('=')) => {
                self.bump();
                TokenKind::LessEq
            }
            ('<', _) => TokenKind::Less,
            ('>', Some('>')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::ShrAssign
                } else {
                    TokenKind::Shr
                }
            }
            ('>', Some('=')) => {
                self.bump();
                TokenKind::GreaterEq
            }
            ('>', _) => TokenKind::Greater,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            (',', _) => TokenKind::Comma,
            ('.', Some('.')) if self.peek_at(1) == Some('.') => {
                self.bump();
                self.bump();
                TokenKind::Ellipsis
            }
            ('.', _) => TokenKind::Dot,
            (':', _) => TokenKind::Colon,
            (';', _) => TokenKind::Semicolon,
            ('$', Some('(')) => {
                self.bump();
                TokenKind::DollarLParen
            }
            ('$', Some('{')) => {
                self.bump();
                TokenKind::DollarLBrace
            }
            ('$', _) => TokenKind::Dollar,
            (other, _) => {
                return self.fail(format!("unexpected character '{}'", other), pos);
            }
        };
        Some(Token::new(kind, pos, blank))
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }
        loop {
            let peeked = self.peek()?;
            match peeked {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    self.pending_blank = true;
                }
                '\n' => {
                    let pos = self.pos();
                    self.bump();
                    self.pending_blank = true;
                    return Some(Token::new(TokenKind::Newline, pos, false));
                }
                '#' => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.bump();
                    }
                }
                '"' => return self.lex_string(),
                ch if ch.is_ascii_digit() => return self.lex_number(),
                ch if ch.is_alphabetic() || ch == '_' => return self.lex_identifier(),
                _ => return self.lex_operator(),
            }
        }
    }
}

/// Tokenize a whole input, failing on the first malformed construct.
pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input);
    let tokens: Vec<Token> = lexer.by_ref().collect();
    match lexer.take_error() {
        Some(err) => Err(err),
        None => Ok(tokens),
    }
}
