use std::rc::Rc;

use shale_core::ast::*;
use shale_core::pos::Pos;
use shale_lexer::{Token, TokenKind};

/// An error produced while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.pos)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

/// The parser for the Shale language.
///
/// A hand-written recursive-descent parser over the token stream, with
/// single-token lookahead. Placement of `break`, `continue` and `return` is
/// checked here, so the evaluator never sees a stray one.
pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    loop_depth: usize,
    switch_depth: usize,
    func_depth: usize,
    /// When > 0, `{` does not start a map display (so `if x { }` works).
    no_brace_depth: usize,
}

const EOF: Token = Token {
    kind: TokenKind::Eof,
    pos: Pos { line: 0, col: 0 },
    blank_before: true,
};

impl Parser {
    /// Construct a parser over a token stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            idx: 0,
            loop_depth: 0,
            switch_depth: 0,
            func_depth: 0,
            no_brace_depth: 0,
        }
    }

    /// Parse a whole program.
    pub fn parse_program(mut self) -> PResult<Block> {
        let pos = self.current().pos;
        let stmts = self.parse_stmt_list(None)?;
        self.expect_kind(&TokenKind::Eof, "statement")?;
        Ok(Block { stmts, pos })
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.idx).unwrap_or(&EOF)
    }

    fn peek_ahead(&self) -> &Token {
        self.tokens.get(self.idx + 1).unwrap_or(&EOF)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.idx + offset).unwrap_or(&EOF)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.idx).cloned().unwrap_or(EOF);
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> PResult<(String, Pos)> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let pos = self.current().pos;
                self.advance();
                Ok((name, pos))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        let token = self.current();
        ParseError {
            message: format!("unexpected '{}', expected {}", token.kind.text(), what),
            pos: token.pos,
        }
    }

    fn error(&self, message: impl Into<String>, pos: Pos) -> ParseError {
        ParseError {
            message: message.into(),
            pos,
        }
    }

    fn at_separator(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn skip_separators(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.current().kind, TokenKind::Newline) {
            self.advance();
        }
    }

    // ---- statements -------------------------------------------------------

    fn parse_stmt_list(&mut self, terminator: Option<&TokenKind>) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&TokenKind::Eof) {
                break;
            }
            if let Some(kind) = terminator {
                if self.check(kind) {
                    break;
                }
            }
            stmts.push(self.parse_stmt()?);
            if !self.at_separator() && !self.prev_was_rbrace() {
                if let Some(kind) = terminator {
                    if self.check(kind) {
                        break;
                    }
                }
                return Err(self.unexpected("end of statement"));
            }
        }
        Ok(stmts)
    }

    /// Whether the token just consumed was a `}`; a block-shaped statement
    /// terminates itself, no separator needed after it.
    fn prev_was_rbrace(&self) -> bool {
        self.idx > 0
            && matches!(
                self.tokens.get(self.idx - 1).map(|token| &token.kind),
                Some(TokenKind::RBrace)
            )
    }

    fn parse_block(&mut self) -> PResult<Block> {
        self.skip_newlines();
        let open = self.expect_kind(&TokenKind::LBrace, "'{'")?;
        let saved = self.no_brace_depth;
        self.no_brace_depth = 0;
        let stmts = self.parse_stmt_list(Some(&TokenKind::RBrace))?;
        self.no_brace_depth = saved;
        self.expect_kind(&TokenKind::RBrace, "'}'")?;
        Ok(Block {
            stmts,
            pos: open.pos,
        })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.current().pos;
        match &self.current().kind {
            TokenKind::If => self.parse_if().map(Stmt::If),
            TokenKind::While => self.parse_while().map(Stmt::While),
            TokenKind::For => self.parse_for_in().map(Stmt::ForIn),
            TokenKind::Switch => self.parse_switch().map(Stmt::Switch),
            TokenKind::Break => {
                self.advance();
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    return Err(self.error("'break' outside of a loop or switch", pos));
                }
                Ok(Stmt::Break(pos))
            }
            TokenKind::Continue => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error("'continue' outside of a loop", pos));
                }
                Ok(Stmt::Continue(pos))
            }
            TokenKind::Return => {
                self.advance();
                if self.func_depth == 0 {
                    return Err(self.error("'return' outside of a function", pos));
                }
                let value = if self.at_separator() || self.check(&TokenKind::RBrace) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(Stmt::Return(value, pos))
            }
            TokenKind::Func => {
                // `func name(...)` declares; `func (...)` is an expression.
                if matches!(self.peek_ahead().kind, TokenKind::Identifier(_)) {
                    self.parse_func_decl(false).map(Stmt::FuncDecl)
                } else {
                    self.parse_expr_or_assignment(false)
                }
            }
            TokenKind::Class => self.parse_class().map(Stmt::ClassDecl),
            TokenKind::Try => self.parse_try().map(Stmt::Try),
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                Ok(Stmt::Throw(value, pos))
            }
            TokenKind::Import => self.parse_import().map(Stmt::Import),
            TokenKind::Alias => self.parse_alias().map(Stmt::Alias),
            TokenKind::CmdKw => self.parse_cmd_decl().map(Stmt::CmdDecl),
            TokenKind::Global => {
                self.advance();
                self.parse_expr_or_assignment(true)
            }
            _ if self.looks_like_command() => self.parse_cmd_stmt().map(Stmt::Cmd),
            _ => self.parse_expr_or_assignment(false),
        }
    }

    fn parse_if(&mut self) -> PResult<IfStmt> {
        let pos = self.expect_kind(&TokenKind::If, "'if'")?.pos;
        let cond = self.parse_cond_expr()?;
        let then = self.parse_block()?;
        let alt = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(Stmt::If(self.parse_if()?)))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };
        Ok(IfStmt {
            cond,
            then,
            alt,
            pos,
        })
    }

    fn parse_while(&mut self) -> PResult<WhileStmt> {
        let pos = self.expect_kind(&TokenKind::While, "'while'")?.pos;
        let cond = self.parse_cond_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Ok(WhileStmt {
            cond,
            body: body?,
            pos,
        })
    }

    fn parse_for_in(&mut self) -> PResult<ForInStmt> {
        let pos = self.expect_kind(&TokenKind::For, "'for'")?.pos;
        self.no_brace_depth += 1;
        let targets = self.parse_expr_list();
        self.no_brace_depth -= 1;
        let targets = targets?;
        self.expect_kind(&TokenKind::In, "'in'")?;
        let iterable = self.parse_cond_expr()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Ok(ForInStmt {
            targets,
            iterable,
            body: body?,
            pos,
        })
    }

    fn parse_switch(&mut self) -> PResult<SwitchStmt> {
        let pos = self.expect_kind(&TokenKind::Switch, "'switch'")?.pos;
        let subject = self.parse_cond_expr()?;
        self.skip_newlines();
        self.expect_kind(&TokenKind::LBrace, "'{'")?;
        self.switch_depth += 1;
        let result = self.parse_switch_body();
        self.switch_depth -= 1;
        let (cases, default) = result?;
        self.expect_kind(&TokenKind::RBrace, "'}'")?;
        Ok(SwitchStmt {
            subject,
            cases,
            default,
            pos,
        })
    }

    fn parse_switch_body(&mut self) -> PResult<(Vec<CaseClause>, Option<Block>)> {
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            self.skip_separators();
            match &self.current().kind {
                TokenKind::Case => {
                    self.advance();
                    self.no_brace_depth += 1;
                    let values = self.parse_expr_list();
                    self.no_brace_depth -= 1;
                    let values = values?;
                    let body = self.parse_block()?;
                    cases.push(CaseClause { values, body });
                }
                TokenKind::Default => {
                    let pos = self.advance().pos;
                    if default.is_some() {
                        return Err(self.error("duplicate 'default' clause", pos));
                    }
                    default = Some(self.parse_block()?);
                }
                TokenKind::RBrace => return Ok((cases, default)),
                _ => return Err(self.unexpected("'case', 'default' or '}'")),
            }
        }
    }

    fn parse_func_decl(&mut self, method: bool) -> PResult<Rc<FuncDecl>> {
        let pos = self.expect_kind(&TokenKind::Func, "'func'")?.pos;
        let (name, _) = self.expect_identifier("function name")?;
        let params = self.parse_params()?;
        // Nested declarations close over their enclosing function's scopes;
        // methods and top-level functions only see the main table.
        let is_closure = !method && self.func_depth > 0;
        let body = self.parse_func_body();
        Ok(Rc::new(FuncDecl {
            name: Some(name),
            params,
            body: body?,
            is_closure,
            pos,
        }))
    }

    /// Parse a function body; `break`/`continue` do not reach across it.
    fn parse_func_body(&mut self) -> PResult<Block> {
        let saved_loop = std::mem::take(&mut self.loop_depth);
        let saved_switch = std::mem::take(&mut self.switch_depth);
        self.func_depth += 1;
        let body = self.parse_block();
        self.func_depth -= 1;
        self.loop_depth = saved_loop;
        self.switch_depth = saved_switch;
        body
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let pos = self.expect_kind(&TokenKind::Func, "'func'")?.pos;
        let params = self.parse_params()?;
        let body = self.parse_func_body();
        Ok(Expr::Lambda(
            Rc::new(FuncDecl {
                name: None,
                params,
                body: body?,
                is_closure: true,
                pos,
            }),
            pos,
        ))
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect_kind(&TokenKind::LParen, "'('")?;
        let mut params: Vec<Param> = Vec::new();
        let mut seen_default = false;
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::RParen) {
                break;
            }
            let (name, pos) = self.expect_identifier("parameter name")?;
            if self.eat(&TokenKind::Ellipsis) {
                params.push(Param {
                    name,
                    default: None,
                    variadic: true,
                });
                self.skip_newlines();
                if !self.check(&TokenKind::RParen) {
                    return Err(self.error("variadic parameter must come last", pos));
                }
                break;
            }
            let default = if self.eat(&TokenKind::Assign) {
                seen_default = true;
                Some(self.parse_expr()?)
            } else {
                if seen_default {
                    return Err(
                        self.error("parameter without default after defaulted parameter", pos)
                    );
                }
                None
            };
            params.push(Param {
                name,
                default,
                variadic: false,
            });
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_kind(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_class(&mut self) -> PResult<ClassDecl> {
        let pos = self.expect_kind(&TokenKind::Class, "'class'")?.pos;
        let (name, _) = self.expect_identifier("class name")?;
        let base = if self.eat(&TokenKind::LParen) {
            let base = self.parse_expr()?;
            self.expect_kind(&TokenKind::RParen, "')'")?;
            Some(base)
        } else {
            None
        };
        self.expect_kind(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&TokenKind::RBrace) || self.check(&TokenKind::Eof) {
                break;
            }
            let stmt_pos = self.current().pos;
            let stmt = if self.check(&TokenKind::Func) {
                Stmt::FuncDecl(self.parse_func_decl(true)?)
            } else {
                let stmt = self.parse_expr_or_assignment(false)?;
                if !matches!(stmt, Stmt::Assignment(_)) {
                    return Err(self.error(
                        "only methods and attribute assignments are allowed in a class body",
                        stmt_pos,
                    ));
                }
                stmt
            };
            stmts.push(stmt);
            if !self.at_separator() && !self.check(&TokenKind::RBrace) && !self.prev_was_rbrace() {
                return Err(self.unexpected("end of statement"));
            }
        }
        let body_pos = self.current().pos;
        self.expect_kind(&TokenKind::RBrace, "'}'")?;
        Ok(ClassDecl {
            name,
            base,
            body: Block {
                stmts,
                pos: body_pos,
            },
            pos,
        })
    }

    fn parse_try(&mut self) -> PResult<TryStmt> {
        let pos = self.expect_kind(&TokenKind::Try, "'try'")?.pos;
        let body = self.parse_block()?;
        self.skip_newlines();
        self.expect_kind(&TokenKind::Catch, "'catch'")?;
        let catch_name = match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let catch_body = self.parse_block()?;
        Ok(TryStmt {
            body,
            catch_name,
            catch_body,
            pos,
        })
    }

    fn parse_import(&mut self) -> PResult<ImportStmt> {
        let pos = self.expect_kind(&TokenKind::Import, "'import'")?.pos;
        let path = match &self.current().kind {
            TokenKind::LitString(path) => {
                let path = path.clone();
                self.advance();
                path
            }
            _ => return Err(self.unexpected("module path string")),
        };
        self.expect_kind(&TokenKind::As, "'as'")?;
        let (name, _) = self.expect_identifier("module name")?;
        Ok(ImportStmt { path, name, pos })
    }

    fn parse_alias(&mut self) -> PResult<AliasDecl> {
        let pos = self.expect_kind(&TokenKind::Alias, "'alias'")?.pos;
        let (name, _) = self.expect_identifier("alias name")?;
        self.expect_kind(&TokenKind::Assign, "'='")?;
        let mut words = Vec::new();
        while !self.at_separator() {
            words.push(self.parse_cmd_word()?);
        }
        if words.is_empty() {
            return Err(self.error("alias replacement cannot be empty", pos));
        }
        Ok(AliasDecl { name, words, pos })
    }

    fn parse_cmd_decl(&mut self) -> PResult<CmdDeclStmt> {
        let pos = self.expect_kind(&TokenKind::CmdKw, "'cmd'")?.pos;
        let (name, _) = self.expect_identifier("command name")?;
        let body = self.parse_func_body();
        Ok(CmdDeclStmt {
            name,
            body: Rc::new(body?),
            pos,
        })
    }

    // ---- assignment and expression statements -----------------------------

    fn parse_expr_or_assignment(&mut self, global: bool) -> PResult<Stmt> {
        let pos = self.current().pos;
        let targets = self.parse_expr_list()?;
        let op = match &self.current().kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::Add),
            TokenKind::MinusAssign => Some(AssignOp::Sub),
            TokenKind::StarAssign => Some(AssignOp::Mul),
            TokenKind::SlashAssign => Some(AssignOp::Div),
            TokenKind::PercentAssign => Some(AssignOp::Mod),
            TokenKind::AmpAssign => Some(AssignOp::BitAnd),
            TokenKind::PipeAssign => Some(AssignOp::BitOr),
            TokenKind::CaretAssign => Some(AssignOp::BitXor),
            TokenKind::ShlAssign => Some(AssignOp::Shl),
            TokenKind::ShrAssign => Some(AssignOp::Shr),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                self.skip_newlines();
                let values = self.parse_expr_list()?;
                Ok(Stmt::Assignment(AssignmentStmt {
                    targets,
                    op,
                    values,
                    global,
                    pos,
                }))
            }
            None => {
                if global {
                    return Err(self.error("'global' must be followed by an assignment", pos));
                }
                let mut targets = targets;
                if targets.len() != 1 {
                    return Err(self.unexpected("assignment token"));
                }
                Ok(Stmt::Expr(targets.remove(0)))
            }
        }
    }

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            self.skip_newlines();
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // ---- command statements ------------------------------------------------

    /// Decide whether the statement starting here is an external command.
    ///
    /// Words that begin with a path or glob character always are; a leading
    /// identifier is a command unless the next token reads like an
    /// expression continuation (`print(x)`, `a[0] = 1`, `a.b`, `a + b`,
    /// `a == b`, `a, b = ...`, `a = 1`).
    fn looks_like_command(&self) -> bool {
        match &self.current().kind {
            TokenKind::Slash | TokenKind::Dot | TokenKind::Tilde | TokenKind::Star
            | TokenKind::Question => true,
            TokenKind::Identifier(_) => {
                let next = self.peek_ahead();
                match &next.kind {
                    TokenKind::Assign
                    | TokenKind::PlusAssign
                    | TokenKind::MinusAssign
                    | TokenKind::StarAssign
                    | TokenKind::SlashAssign
                    | TokenKind::PercentAssign
                    | TokenKind::AmpAssign
                    | TokenKind::PipeAssign
                    | TokenKind::CaretAssign
                    | TokenKind::ShlAssign
                    | TokenKind::ShrAssign
                    | TokenKind::Comma
                    | TokenKind::LParen
                    | TokenKind::LBracket
                    | TokenKind::Dot
                    | TokenKind::Equal
                    | TokenKind::NotEqual
                    | TokenKind::LessEq
                    | TokenKind::GreaterEq
                    | TokenKind::And
                    | TokenKind::Or
                    | TokenKind::StarStar => false,
                    // `a - b` is a subtraction; `ls -l` keeps the dash glued
                    // to its word.
                    TokenKind::Plus
                    | TokenKind::Minus
                    | TokenKind::Percent
                    | TokenKind::Caret
                    | TokenKind::Shl => {
                        !(next.blank_before && self.peek_at(2).blank_before)
                    }
                    _ => true,
                }
            }
            // `true && make` and `false || echo` read as command lines; a
            // bare `true` stays an expression.
            TokenKind::True | TokenKind::False => matches!(
                self.peek_ahead().kind,
                TokenKind::AmpAmp
                    | TokenKind::PipePipe
                    | TokenKind::Pipe
                    | TokenKind::Amp
                    | TokenKind::Greater
                    | TokenKind::Less
                    | TokenKind::Shr
                    | TokenKind::Identifier(_)
                    | TokenKind::LitString(_)
                    | TokenKind::LitInteger(_)
                    | TokenKind::Minus
                    | TokenKind::Slash
                    | TokenKind::Dollar
                    | TokenKind::DollarLBrace
                    | TokenKind::DollarLParen
            ),
            _ => false,
        }
    }

    fn parse_cmd_stmt(&mut self) -> PResult<CmdFull> {
        let pos = self.current().pos;
        let cmd = self.parse_cmd_and_or()?;
        let background = self.eat(&TokenKind::Amp);
        Ok(CmdFull {
            cmd,
            background,
            pos,
        })
    }

    fn parse_cmd_and_or(&mut self) -> PResult<CmdAndOr> {
        let pos = self.current().pos;
        let first = self.parse_cmd_pipe_sequence()?;
        let mut rest = Vec::new();
        loop {
            let op = match &self.current().kind {
                TokenKind::AmpAmp => AndOrOp::And,
                TokenKind::PipePipe => AndOrOp::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            rest.push((op, self.parse_cmd_pipe_sequence()?));
        }
        Ok(CmdAndOr { first, rest, pos })
    }

    fn parse_cmd_pipe_sequence(&mut self) -> PResult<CmdPipeSequence> {
        let pos = self.current().pos;
        let mut stages = vec![self.parse_cmd_io_redirect_list()?];
        while self.check(&TokenKind::Pipe) {
            self.advance();
            self.skip_newlines();
            stages.push(self.parse_cmd_io_redirect_list()?);
        }
        Ok(CmdPipeSequence { stages, pos })
    }

    fn parse_cmd_io_redirect_list(&mut self) -> PResult<CmdIoRedirectList> {
        let pos = self.current().pos;
        let mut words = Vec::new();
        let mut redirects = Vec::new();
        loop {
            match &self.current().kind {
                TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Amp
                | TokenKind::AmpAmp
                | TokenKind::Pipe
                | TokenKind::PipePipe
                | TokenKind::RParen => {
                    // `&>` redirects both output streams.
                    if self.check(&TokenKind::Amp)
                        && matches!(self.peek_ahead().kind, TokenKind::Greater | TokenKind::Shr)
                        && !self.peek_ahead().blank_before
                    {
                        self.advance();
                        let append = self.check(&TokenKind::Shr);
                        self.advance();
                        let path = self.parse_cmd_word()?;
                        redirects.push(IoRedirect::OutAll { path, append });
                        continue;
                    }
                    break;
                }
                TokenKind::Greater | TokenKind::Shr => {
                    redirects.push(self.parse_redirect_out(1)?);
                }
                TokenKind::Less => {
                    self.advance();
                    let path = self.parse_cmd_word()?;
                    redirects.push(IoRedirect::In { fd: 0, path });
                }
                TokenKind::LitInteger(fd)
                    if matches!(self.peek_ahead().kind, TokenKind::Greater | TokenKind::Shr)
                        && !self.peek_ahead().blank_before =>
                {
                    let fd = *fd as i32;
                    self.advance();
                    redirects.push(self.parse_redirect_out(fd)?);
                }
                TokenKind::LitInteger(fd)
                    if self.peek_ahead().kind == TokenKind::Less
                        && !self.peek_ahead().blank_before =>
                {
                    let fd = *fd as i32;
                    self.advance();
                    self.advance();
                    let path = self.parse_cmd_word()?;
                    redirects.push(IoRedirect::In { fd, path });
                }
                _ => words.push(self.parse_cmd_word()?),
            }
        }
        if words.is_empty() {
            return Err(self.error("empty command", pos));
        }
        Ok(CmdIoRedirectList {
            cmd: SimpleCmd { words, pos },
            redirects,
        })
    }

    /// Parse the remainder of a `[n]>`-style redirection, with `>&m`
    /// duplications handled (`2>&1`).
    fn parse_redirect_out(&mut self, fd: i32) -> PResult<IoRedirect> {
        let append = self.check(&TokenKind::Shr);
        let pos = self.current().pos;
        self.advance();
        if self.check(&TokenKind::Amp) && !self.current().blank_before {
            self.advance();
            if append {
                return Err(self.error("cannot append to a file descriptor", pos));
            }
            match &self.current().kind {
                TokenKind::LitInteger(to) => {
                    let to = *to as i32;
                    self.advance();
                    Ok(IoRedirect::Dup { from: fd, to })
                }
                _ => Err(self.unexpected("file descriptor number")),
            }
        } else {
            let path = self.parse_cmd_word()?;
            Ok(IoRedirect::Out { fd, path, append })
        }
    }

    /// Whether the token can terminate a command word.
    fn is_word_boundary(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::Amp
                | TokenKind::AmpAmp
                | TokenKind::Pipe
                | TokenKind::PipePipe
                | TokenKind::Greater
                | TokenKind::Less
                | TokenKind::Shr
                | TokenKind::RParen
        )
    }

    /// Assemble one command word from consecutive unseparated tokens.
    fn parse_cmd_word(&mut self) -> PResult<CmdWord> {
        if Self::is_word_boundary(&self.current().kind) {
            return Err(self.unexpected("command word"));
        }
        let mut pieces = Vec::new();
        let mut first = true;
        loop {
            let token = self.current().clone();
            if Self::is_word_boundary(&token.kind) || (!first && token.blank_before) {
                break;
            }
            match token.kind {
                TokenKind::Dollar => {
                    self.advance();
                    match &self.current().kind {
                        TokenKind::Identifier(name) if !self.current().blank_before => {
                            let name = name.clone();
                            self.advance();
                            pieces.push(CmdPiece::Var(name));
                        }
                        _ => pieces.push(CmdPiece::Lit("$".to_string())),
                    }
                }
                TokenKind::DollarLBrace => {
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect_kind(&TokenKind::RBrace, "'}'")?;
                    pieces.push(CmdPiece::Expr(expr));
                }
                TokenKind::DollarLParen => {
                    self.advance();
                    self.skip_newlines();
                    let sub = self.parse_cmd_and_or()?;
                    self.expect_kind(&TokenKind::RParen, "')'")?;
                    pieces.push(CmdPiece::Sub(Box::new(sub)));
                }
                TokenKind::LitString(value) => {
                    self.advance();
                    pieces.push(CmdPiece::Quoted(value));
                }
                kind => {
                    self.advance();
                    pieces.push(CmdPiece::Lit(kind.text()));
                }
            }
            first = false;
        }
        // Fuse adjacent literal pieces so globbing sees whole patterns.
        let mut fused: Vec<CmdPiece> = Vec::new();
        for piece in pieces {
            match (fused.last_mut(), piece) {
                (Some(CmdPiece::Lit(prev)), CmdPiece::Lit(text)) => prev.push_str(&text),
                (_, piece) => fused.push(piece),
            }
        }
        Ok(CmdWord { pieces: fused })
    }

    // ---- expressions ------------------------------------------------------

    /// Parse an expression in a position where `{` opens a block, not a map.
    fn parse_cond_expr(&mut self) -> PResult<Expr> {
        self.no_brace_depth += 1;
        let expr = self.parse_expr();
        self.no_brace_depth -= 1;
        expr
    }

    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.check(&TokenKind::And) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_or()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Equal => BinOp::Equal,
                TokenKind::NotEqual => BinOp::NotEqual,
                TokenKind::Less => BinOp::Less,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::LessEq => BinOp::LessEq,
                TokenKind::GreaterEq => BinOp::GreaterEq,
                _ => break,
            };
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_bit_or()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_xor()?;
        while self.check(&TokenKind::Pipe) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_bit_xor()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_and()?;
        while self.check(&TokenKind::Caret) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_bit_and()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift()?;
        while self.check(&TokenKind::Amp) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let pos = self.advance().pos;
            self.skip_newlines();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.current().pos;
        let op = match &self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not | TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(op, Box::new(operand), pos))
            }
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::StarStar) {
            let pos = self.advance().pos;
            self.skip_newlines();
            let exponent = self.parse_power()?;
            Ok(Expr::Binary(
                BinOp::Pow,
                Box::new(base),
                Box::new(exponent),
                pos,
            ))
        } else {
            Ok(base)
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.current().kind {
                TokenKind::LParen => {
                    let pos = self.advance().pos;
                    let mut args = Vec::new();
                    self.skip_newlines();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            self.skip_newlines();
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                            self.skip_newlines();
                        }
                    }
                    self.expect_kind(&TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        pos,
                    };
                }
                TokenKind::LBracket => {
                    let pos = self.advance().pos;
                    self.skip_newlines();
                    let index = self.parse_subscript_index(pos)?;
                    self.expect_kind(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                TokenKind::Dot => {
                    let pos = self.advance().pos;
                    let (name, _) = self.expect_identifier("attribute name")?;
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_subscript_index(&mut self, pos: Pos) -> PResult<Expr> {
        let start = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if self.eat(&TokenKind::Colon) {
            let end = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            Ok(Expr::Slice { start, end, pos })
        } else {
            match start {
                Some(index) => Ok(*index),
                None => Err(self.unexpected("subscript expression")),
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.current().clone();
        let pos = token.pos;
        match token.kind {
            TokenKind::LitInteger(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(value), pos))
            }
            TokenKind::LitReal(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Real(value), pos))
            }
            TokenKind::LitString(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value), pos))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(true), pos))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Boolean(false), pos))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Literal(Literal::Nil, pos))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name, pos))
            }
            TokenKind::Func => self.parse_lambda(),
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr::Tuple(Vec::new(), pos));
                }
                let saved = self.no_brace_depth;
                self.no_brace_depth = 0;
                let result = self.parse_paren_body(pos);
                self.no_brace_depth = saved;
                let expr = result?;
                self.expect_kind(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                self.skip_newlines();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        self.skip_newlines();
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                }
                self.expect_kind(&TokenKind::RBracket, "']'")?;
                Ok(Expr::Array(items, pos))
            }
            TokenKind::LBrace if self.no_brace_depth == 0 => {
                self.advance();
                let mut pairs = Vec::new();
                self.skip_newlines();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect_kind(&TokenKind::Colon, "':'")?;
                        self.skip_newlines();
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        self.skip_newlines();
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                }
                self.expect_kind(&TokenKind::RBrace, "'}'")?;
                Ok(Expr::Map(pairs, pos))
            }
            TokenKind::PercentLBrace => {
                self.advance();
                let mut items = Vec::new();
                self.skip_newlines();
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        items.push(self.parse_expr()?);
                        self.skip_newlines();
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                }
                self.expect_kind(&TokenKind::RBrace, "'}'")?;
                Ok(Expr::Set(items, pos))
            }
            TokenKind::DollarLParen => {
                self.advance();
                self.skip_newlines();
                let cmd = self.parse_cmd_and_or()?;
                self.expect_kind(&TokenKind::RParen, "')'")?;
                Ok(Expr::CmdSub(Box::new(cmd), pos))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Parse the inside of parentheses: a grouped expression, or a tuple
    /// display if a comma shows up.
    fn parse_paren_body(&mut self, pos: Pos) -> PResult<Expr> {
        let first = self.parse_expr()?;
        self.skip_newlines();
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            self.skip_newlines();
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_expr()?);
            self.skip_newlines();
        }
        Ok(Expr::Tuple(items, pos))
    }
}
