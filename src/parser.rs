//! Recursive-descent, precedence-climbing parser.
//!
//! The precedence chain, desugaring rules (compound assignment, for-loops,
//! zero-value synthesis) and statement grammar all follow
//! `LinhC/Parsing/Parser/{ParseExpression,ParseStatement,ParseDeclaration}.cpp`;
//! the C++ visitor-returning-owned-pointers shape becomes ordinary
//! value-returning methods over owned [`Expr`]/[`Stmt`] trees.

use crate::ast::{
    BinOp, CatchClause, DeclKind, Expr, InterpPart, Literal, LogicalOp, PostfixOp, Program,
    Stmt, SwitchCase, TypeNode, UnaryOp,
};
use crate::error::{Diagnostic, Stage};
use crate::token::{Literal as TokLit, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<Diagnostic>,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0, errors: Vec::new() }
    }

    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        (Program { statements }, self.errors)
    }

    // --- token plumbing ---

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.current + 1).min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_next(&self, kind: TokenKind) -> bool {
        self.peek_next().kind == kind
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        for k in kinds {
            if self.check(*k) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<&Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error(message))
    }

    fn error(&mut self, message: &str) -> () {
        let tok = self.peek();
        self.errors.push(Diagnostic::new(Stage::Parser, tok.line, tok.col, message.to_string()));
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            if matches!(
                self.peek().kind,
                Var | Vas | Let | Const | Func | If | While | For | Switch | Print | Return | Try | Throw
            ) {
                return;
            }
            self.advance();
        }
    }

    // --- declarations ---

    fn declaration(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::Var, TokenKind::Vas, TokenKind::Let, TokenKind::Const]) {
            let kw = self.previous().clone();
            return self.var_declaration(kw);
        }
        if self.matches(&[TokenKind::Func]) {
            return self.function_declaration();
        }
        if self.matches(&[TokenKind::Import]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let name_tok = self.consume(TokenKind::Str, "expected a module name string after 'import'")?.clone();
            self.consume(TokenKind::Semicolon, "expected ';' after import")?;
            let name = if let TokLit::Str(s) = name_tok.literal { s } else { name_tok.lexeme };
            return Ok(Stmt::Import { name, line, col });
        }
        self.statement()
    }

    fn decl_kind(kind: TokenKind) -> DeclKind {
        match kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Vas => DeclKind::Vas,
            TokenKind::Let => DeclKind::Let,
            _ => DeclKind::Const,
        }
    }

    fn var_declaration(&mut self, keyword: Token) -> PResult<Stmt> {
        let kind = Self::decl_kind(keyword.kind);
        let name_tok = self.consume(TokenKind::Identifier, "expected a variable name")?.clone();
        let mut type_ann = None;
        if self.matches(&[TokenKind::Colon]) {
            type_ann = Some(self.parse_type()?);
        }
        let init = if self.matches(&[TokenKind::Assign]) {
            Some(self.expression()?)
        } else {
            match kind {
                DeclKind::Var => Some(match &type_ann {
                    Some(t) => self.zero_value_for_type(t, &name_tok),
                    None => Expr::Uninit { line: name_tok.line, col: name_tok.col },
                }),
                DeclKind::Vas => None,
                DeclKind::Let | DeclKind::Const => match &type_ann {
                    Some(t) => Some(self.zero_value_for_type(t, &name_tok)),
                    None => {
                        self.error("'let'/'const' declaration must have an explicit initializer or type");
                        return Err(());
                    }
                },
            }
        };
        self.consume(TokenKind::Semicolon, "expected ';' after variable declaration")?;
        Ok(Stmt::VarDecl { kind, name: name_tok.lexeme, type_ann, init, line: name_tok.line, col: name_tok.col })
    }

    fn zero_value_for_type(&self, t: &TypeNode, at: &Token) -> Expr {
        let (line, col) = (at.line, at.col);
        match t {
            TypeNode::Int(_) | TypeNode::UInt(_) => Expr::Literal { value: Literal::Int(0), line, col },
            TypeNode::Float(_) => Expr::Literal { value: Literal::Float(0.0), line, col },
            TypeNode::Str(_) => Expr::Literal { value: Literal::Str(String::new()), line, col },
            TypeNode::Bool => Expr::Literal { value: Literal::Bool(false), line, col },
            TypeNode::Map(..) => Expr::MapLit { entries: Vec::new(), line, col },
            TypeNode::Array(_) => Expr::ArrayLit { elements: Vec::new(), line, col },
            TypeNode::Union(types) => types.first().map(|t0| self.zero_value_for_type(t0, at)).unwrap_or(Expr::Uninit { line, col }),
            TypeNode::Sol | TypeNode::Any | TypeNode::Void => Expr::Uninit { line, col },
        }
    }

    fn function_declaration(&mut self) -> PResult<Stmt> {
        let (line, col) = (self.previous().line, self.previous().col);
        let name_tok = self.consume(TokenKind::Identifier, "expected a function name")?.clone();
        self.consume(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let p = self.consume(TokenKind::Identifier, "expected a parameter name")?.clone();
                let mut ty = None;
                if self.matches(&[TokenKind::Colon]) {
                    ty = Some(self.parse_type()?);
                }
                params.push((p.lexeme, ty));
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after parameter list")?;
        let mut return_type = None;
        if self.matches(&[TokenKind::Colon]) {
            return_type = Some(self.parse_type()?);
        }
        self.consume(TokenKind::LBrace, "expected '{' before function body")?;
        let body = self.block()?;
        Ok(Stmt::FuncDecl { name: name_tok.lexeme, params, return_type, body, line, col })
    }

    // --- types ---

    fn parse_type(&mut self) -> PResult<TypeNode> {
        let base = self.parse_primary_type()?;
        self.parse_array_suffix(base)
    }

    fn parse_array_suffix(&mut self, mut t: TypeNode) -> PResult<TypeNode> {
        while self.matches(&[TokenKind::LBracket]) {
            self.consume(TokenKind::RBracket, "expected ']' after array type")?;
            t = TypeNode::Array(Box::new(t));
        }
        Ok(t)
    }

    fn parse_primary_type(&mut self) -> PResult<TypeNode> {
        if self.matches(&[TokenKind::Map]) {
            self.consume(TokenKind::Lt, "expected '<' after 'map'")?;
            let k = self.parse_type()?;
            self.consume(TokenKind::Comma, "expected ',' in map type")?;
            let v = self.parse_type()?;
            self.consume(TokenKind::Gt, "expected '>' after map type")?;
            return Ok(TypeNode::Map(Box::new(k), Box::new(v)));
        }
        if self.matches(&[TokenKind::Array]) {
            self.consume(TokenKind::Lt, "expected '<' after 'array'")?;
            let e = self.parse_type()?;
            self.consume(TokenKind::Gt, "expected '>' after array type")?;
            return Ok(TypeNode::Array(Box::new(e)));
        }
        if self.matches(&[TokenKind::IntKw]) {
            return Ok(TypeNode::Int(self.maybe_width()?));
        }
        if self.matches(&[TokenKind::UintKw]) {
            return Ok(TypeNode::UInt(self.maybe_width()?));
        }
        if self.matches(&[TokenKind::FloatKw]) {
            return Ok(TypeNode::Float(self.maybe_width()?));
        }
        if self.matches(&[TokenKind::StrKw]) {
            let mut n = None;
            if self.matches(&[TokenKind::Lt]) {
                let tok = self.consume(TokenKind::Int, "expected an integer string-length bound")?.clone();
                if let TokLit::Int(v) = tok.literal {
                    n = Some(v as u32);
                }
                self.consume(TokenKind::Gt, "expected '>' after string length bound")?;
            }
            return Ok(TypeNode::Str(n));
        }
        if self.matches(&[TokenKind::Bool]) {
            return Ok(TypeNode::Bool);
        }
        if self.matches(&[TokenKind::Void]) {
            return Ok(TypeNode::Void);
        }
        if self.matches(&[TokenKind::Any]) {
            return Ok(TypeNode::Any);
        }
        if self.matches(&[TokenKind::Sol]) {
            return Ok(TypeNode::Sol);
        }
        if self.matches(&[TokenKind::Lt]) {
            let mut members = vec![self.parse_type()?];
            while self.matches(&[TokenKind::Comma]) {
                members.push(self.parse_type()?);
            }
            self.consume(TokenKind::Gt, "expected '>' after union type")?;
            return Ok(TypeNode::Union(members));
        }
        self.error("expected a type");
        Err(())
    }

    fn maybe_width(&mut self) -> PResult<Option<u8>> {
        if self.matches(&[TokenKind::Lt]) {
            let tok = self.consume(TokenKind::Int, "expected a numeric width")?.clone();
            let width = if let TokLit::Int(v) = tok.literal { v as u8 } else { 0 };
            self.consume(TokenKind::Gt, "expected '>' after width")?;
            Ok(Some(width))
        } else {
            Ok(None)
        }
    }

    // --- statements ---

    fn statement(&mut self) -> PResult<Stmt> {
        if self.matches(&[TokenKind::Print]) {
            return self.print_statement();
        }
        if self.check(TokenKind::LBrace) {
            self.advance();
            return Ok(Stmt::Block(self.block()?));
        }
        if self.matches(&[TokenKind::If]) {
            return self.if_statement();
        }
        if self.matches(&[TokenKind::While]) {
            return self.while_statement();
        }
        if self.matches(&[TokenKind::Do]) {
            return self.do_while_statement();
        }
        if self.matches(&[TokenKind::For]) {
            return self.for_statement();
        }
        if self.matches(&[TokenKind::Switch]) {
            return self.switch_statement();
        }
        if self.matches(&[TokenKind::Delete]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let target = self.expression()?;
            self.consume(TokenKind::Semicolon, "expected ';' after 'delete'")?;
            return Ok(Stmt::Delete { target, line, col });
        }
        if self.matches(&[TokenKind::Throw]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let value = self.expression()?;
            self.consume(TokenKind::Semicolon, "expected ';' after 'throw'")?;
            return Ok(Stmt::Throw { value, line, col });
        }
        if self.matches(&[TokenKind::Try]) {
            return self.try_statement();
        }
        if self.matches(&[TokenKind::Return]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let value = if !self.check(TokenKind::Semicolon) { Some(self.expression()?) } else { None };
            self.consume(TokenKind::Semicolon, "expected ';' after return")?;
            return Ok(Stmt::Return { value, line, col });
        }
        if self.matches(&[TokenKind::Break]) {
            let (line, col) = (self.previous().line, self.previous().col);
            self.consume(TokenKind::Semicolon, "expected ';' after 'break'")?;
            return Ok(Stmt::Break { line, col });
        }
        if self.matches(&[TokenKind::Continue]) {
            let (line, col) = (self.previous().line, self.previous().col);
            self.consume(TokenKind::Semicolon, "expected ';' after 'continue'")?;
            return Ok(Stmt::Continue { line, col });
        }
        self.expression_statement()
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let (line, col) = (self.previous().line, self.previous().col);
        self.consume(TokenKind::LParen, "expected '(' after 'print'")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after print arguments")?;
        self.consume(TokenKind::Semicolon, "expected ';' after print statement")?;
        Ok(Stmt::Print { args, newline: true, line, col })
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        self.consume(TokenKind::RBrace, "expected '}' to close block")?;
        Ok(stmts)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "expected '(' after 'if'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RParen, "expected ')' after if condition")?;
        let then_branch = vec![self.statement()?];
        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(vec![self.statement()?])
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "expected '(' after 'while'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RParen, "expected ')' after while condition")?;
        let body = vec![self.statement()?];
        Ok(Stmt::While { cond, body })
    }

    fn do_while_statement(&mut self) -> PResult<Stmt> {
        let body = vec![self.statement()?];
        self.consume(TokenKind::While, "expected 'while' after do-while body")?;
        self.consume(TokenKind::LParen, "expected '(' after 'while'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RParen, "expected ')' after do-while condition")?;
        self.consume(TokenKind::Semicolon, "expected ';' after do-while statement")?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        let (line, col) = (self.previous().line, self.previous().col);
        self.consume(TokenKind::LParen, "expected '(' after 'for'")?;

        let initializer = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else if matches!(self.peek().kind, TokenKind::Var | TokenKind::Vas | TokenKind::Const) {
            Some(self.declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let cond = if !self.check(TokenKind::Semicolon) {
            self.expression()?
        } else {
            Expr::Literal { value: Literal::Bool(true), line, col }
        };
        self.consume(TokenKind::Semicolon, "expected ';' after for condition")?;

        let increment = if !self.check(TokenKind::RParen) { Some(self.expression()?) } else { None };
        self.consume(TokenKind::RParen, "expected ')' after for clauses")?;

        let mut body = vec![self.statement()?];
        if let Some(inc) = increment {
            body.push(Stmt::Expr(inc));
        }
        let while_loop = Stmt::While { cond, body };
        match initializer {
            Some(init) => Ok(Stmt::Block(vec![init, while_loop])),
            None => Ok(while_loop),
        }
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LParen, "expected '(' after 'switch'")?;
        let scrutinee = self.expression()?;
        self.consume(TokenKind::RParen, "expected ')' after switch expression")?;
        self.consume(TokenKind::LBrace, "expected '{' before switch body")?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            if self.matches(&[TokenKind::Case]) {
                if default.is_some() {
                    self.error("'case' must not follow 'default'");
                    return Err(());
                }
                let test = self.expression()?;
                self.consume(TokenKind::Colon, "expected ':' after case value")?;
                let mut body = Vec::new();
                while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Case | TokenKind::Default) && !self.is_at_end() {
                    body.push(self.declaration()?);
                }
                cases.push(SwitchCase { test, body });
            } else if self.matches(&[TokenKind::Default]) {
                if default.is_some() {
                    self.error("only one 'default' clause is allowed");
                    return Err(());
                }
                self.consume(TokenKind::Colon, "expected ':' after 'default'")?;
                let mut body = Vec::new();
                while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Case) && !self.is_at_end() {
                    body.push(self.declaration()?);
                }
                default = Some(body);
            } else {
                self.error("expected 'case', 'default', or '}' in switch body");
                return Err(());
            }
        }
        self.consume(TokenKind::RBrace, "expected '}' to close switch")?;
        Ok(Stmt::Switch { scrutinee, cases, default })
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LBrace, "expected '{' after 'try'")?;
        let body = self.block()?;

        let mut catches = Vec::new();
        while self.check(TokenKind::Catch) {
            self.advance();
            let mut binding = None;
            if self.matches(&[TokenKind::LParen]) {
                let name = self.consume(TokenKind::Identifier, "expected an exception variable name")?.clone();
                binding = Some(name.lexeme);
                self.consume(TokenKind::RParen, "expected ')' after exception variable")?;
            }
            self.consume(TokenKind::LBrace, "expected '{' after 'catch'")?;
            let catch_body = self.block()?;
            catches.push(CatchClause { binding, body: catch_body });
        }

        let finally = if self.check(TokenKind::Finally) {
            self.advance();
            self.consume(TokenKind::LBrace, "expected '{' after 'finally'")?;
            Some(self.block()?)
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            self.error("'try' must have at least one 'catch' or a 'finally'");
            return Err(());
        }
        Ok(Stmt::Try { body, catches, finally })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        if self.check(TokenKind::Semicolon) {
            self.advance();
        } else if !self.check(TokenKind::RBrace) {
            self.error("expected ';' after expression");
            return Err(());
        }
        Ok(Stmt::Expr(expr))
    }

    // --- expressions ---

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.logical_or()?;
        const COMPOUND: &[TokenKind] = &[
            TokenKind::Assign,
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::PercentEq,
            TokenKind::HashEq,
        ];
        if self.matches(COMPOUND) {
            let op_tok = self.previous().clone();
            let value = self.assignment()?;
            let (line, col) = (op_tok.line, op_tok.col);

            let rhs = if op_tok.kind == TokenKind::Assign {
                value
            } else {
                let op = match op_tok.kind {
                    TokenKind::PlusEq => BinOp::Add,
                    TokenKind::MinusEq => BinOp::Sub,
                    TokenKind::StarEq => BinOp::Mul,
                    TokenKind::SlashEq => BinOp::Div,
                    TokenKind::PercentEq => BinOp::Mod,
                    TokenKind::HashEq => BinOp::FloorDiv,
                    _ => unreachable!(),
                };
                Expr::Binary { op, left: Box::new(expr.clone()), right: Box::new(value), line, col }
            };

            match &expr {
                Expr::Identifier { .. } | Expr::Subscript { .. } | Expr::Member { .. } => {
                    Ok(Expr::Assign { target: Box::new(expr), value: Box::new(rhs), line, col })
                }
                _ => {
                    self.error("invalid assignment target");
                    Err(())
                }
            }
        } else {
            Ok(expr)
        }
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.matches(&[TokenKind::PipePipe, TokenKind::Or]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let right = self.logical_and()?;
            expr = Expr::Logical { op: LogicalOp::Or, left: Box::new(expr), right: Box::new(right), line, col };
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        let mut expr = self.bitwise_or()?;
        while self.matches(&[TokenKind::AmpAmp, TokenKind::And]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let right = self.bitwise_or()?;
            expr = Expr::Logical { op: LogicalOp::And, left: Box::new(expr), right: Box::new(right), line, col };
        }
        Ok(expr)
    }

    fn bitwise_or(&mut self) -> PResult<Expr> {
        let mut expr = self.bitwise_xor()?;
        while self.matches(&[TokenKind::Pipe]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let right = self.bitwise_xor()?;
            expr = Expr::Binary { op: BinOp::BitOr, left: Box::new(expr), right: Box::new(right), line, col };
        }
        Ok(expr)
    }

    fn bitwise_xor(&mut self) -> PResult<Expr> {
        let mut expr = self.bitwise_and()?;
        while self.matches(&[TokenKind::Caret]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let right = self.bitwise_and()?;
            expr = Expr::Binary { op: BinOp::BitXor, left: Box::new(expr), right: Box::new(right), line, col };
        }
        Ok(expr)
    }

    fn bitwise_and(&mut self) -> PResult<Expr> {
        let mut expr = self.bitwise_shift()?;
        while self.matches(&[TokenKind::Amp]) {
            let (line, col) = (self.previous().line, self.previous().col);
            let right = self.bitwise_shift()?;
            expr = Expr::Binary { op: BinOp::BitAnd, left: Box::new(expr), right: Box::new(right), line, col };
        }
        Ok(expr)
    }

    fn bitwise_shift(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.matches(&[TokenKind::LtLt, TokenKind::GtGt]) {
            let op_tok = self.previous().clone();
            let right = self.comparison()?;
            let op = if op_tok.kind == TokenKind::LtLt { BinOp::Shl } else { BinOp::Shr };
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&[TokenKind::Gt, TokenKind::GtEq, TokenKind::Lt, TokenKind::LtEq, TokenKind::Is]) {
            let op_tok = self.previous().clone();
            let right = self.equality()?;
            let op = match op_tok.kind {
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                _ => BinOp::Is,
            };
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.additive()?;
        while self.matches(&[TokenKind::EqEq, TokenKind::BangEq]) {
            let op_tok = self.previous().clone();
            let right = self.additive()?;
            let op = if op_tok.kind == TokenKind::EqEq { BinOp::Eq } else { BinOp::NotEq };
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col };
        }
        Ok(expr)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut expr = self.multiplicative()?;
        while self.matches(&[TokenKind::Minus, TokenKind::Plus]) {
            let op_tok = self.previous().clone();
            let right = self.multiplicative()?;
            let op = if op_tok.kind == TokenKind::Plus { BinOp::Add } else { BinOp::Sub };
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col };
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut expr = self.exponentiation()?;
        while self.matches(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent, TokenKind::Hash]) {
            let op_tok = self.previous().clone();
            let right = self.exponentiation()?;
            let op = match op_tok.kind {
                TokenKind::Slash => BinOp::Div,
                TokenKind::Star => BinOp::Mul,
                TokenKind::Percent => BinOp::Mod,
                _ => BinOp::FloorDiv,
            };
            expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col };
        }
        Ok(expr)
    }

    /// Right-associative: recurses into itself rather than looping.
    fn exponentiation(&mut self) -> PResult<Expr> {
        let expr = self.unary()?;
        if self.matches(&[TokenKind::StarStar]) {
            let op_tok = self.previous().clone();
            let right = self.exponentiation()?;
            return Ok(Expr::Binary { op: BinOp::Pow, left: Box::new(expr), right: Box::new(right), line: op_tok.line, col: op_tok.col });
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.matches(&[TokenKind::Bang, TokenKind::Not]) {
            let tok = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(right), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Minus]) {
            let tok = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(right), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Tilde]) {
            let tok = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::BitNot, expr: Box::new(right), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::PlusPlus, TokenKind::MinusMinus]) {
            // Prefix increment/decrement desugars like compound assignment:
            // `++x` becomes `x = x + 1`.
            let op_tok = self.previous().clone();
            let target = self.unary()?;
            let op = if op_tok.kind == TokenKind::PlusPlus { BinOp::Add } else { BinOp::Sub };
            let one = Expr::Literal { value: Literal::Int(1), line: op_tok.line, col: op_tok.col };
            let rhs = Expr::Binary { op, left: Box::new(target.clone()), right: Box::new(one), line: op_tok.line, col: op_tok.col };
            return Ok(Expr::Assign { target: Box::new(target), value: Box::new(rhs), line: op_tok.line, col: op_tok.col });
        }
        if self.matches(&[TokenKind::New]) {
            let tok = self.previous().clone();
            let ty = self.parse_type()?;
            let mut args = Vec::new();
            if self.matches(&[TokenKind::LParen]) {
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.matches(&[TokenKind::Comma]) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RParen, "expected ')' after constructor arguments")?;
            }
            return Ok(Expr::New { type_name: Box::new(ty), args, line: tok.line, col: tok.col });
        }
        self.call_or_member_access()
    }

    const METHOD_NAMES: &'static [&'static str] = &[
        "append", "remove", "clear", "clone", "pop", "delete", "keys", "values", "len",
    ];

    fn call_or_member_access(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&[TokenKind::LParen]) {
                expr = self.finish_call(expr)?;
            } else if self.matches(&[TokenKind::PlusPlus, TokenKind::MinusMinus]) {
                let op_tok = self.previous().clone();
                let op = if op_tok.kind == TokenKind::PlusPlus { PostfixOp::Inc } else { PostfixOp::Dec };
                expr = Expr::Postfix { op, target: Box::new(expr), line: op_tok.line, col: op_tok.col };
            } else if self.matches(&[TokenKind::LBracket]) {
                let (line, col) = (self.previous().line, self.previous().col);
                let index = self.expression()?;
                self.consume(TokenKind::RBracket, "expected ']' after subscript")?;
                expr = Expr::Subscript { object: Box::new(expr), index: Box::new(index), line, col };
            } else if self.matches(&[TokenKind::Dot]) {
                let (line, col) = (self.previous().line, self.previous().col);
                let name_tok = self.consume(TokenKind::Identifier, "expected a member name after '.'")?.clone();
                if self.check(TokenKind::LParen) && Self::METHOD_NAMES.contains(&name_tok.lexeme.as_str()) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if !self.matches(&[TokenKind::Comma]) {
                                break;
                            }
                        }
                    }
                    self.consume(TokenKind::RParen, "expected ')' after method arguments")?;
                    expr = Expr::MethodCall { object: Box::new(expr), method: name_tok.lexeme, args, line, col };
                } else {
                    expr = Expr::Member { object: Box::new(expr), name: name_tok.lexeme, line, col };
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let (line, col) = callee.line_col();
        let name = match &callee {
            Expr::Identifier { name, .. } => name.clone(),
            // `package.function(args)` — a dotted callee naming a package
            // function (e.g. `math.sqrt(x)`). The semantic pass later
            // validates `package` against the host; the emitter/VM split
            // on the single '.' to dispatch through `PackageHost`.
            Expr::Member { object, name: member, .. } => match object.as_ref() {
                Expr::Identifier { name: pkg, .. } => format!("{pkg}.{member}"),
                _ => {
                    self.error("call target must be an identifier or package member");
                    return Err(());
                }
            },
            _ => {
                self.error("call target must be an identifier");
                return Err(());
            }
        };
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected ')' after argument list")?;
        Ok(Expr::Call { callee: name, args, line, col })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        if self.matches(&[TokenKind::False]) {
            return Ok(Expr::Literal { value: Literal::Bool(false), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::True]) {
            return Ok(Expr::Literal { value: Literal::Bool(true), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Sol]) {
            return Ok(Expr::Literal { value: Literal::Sol, line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Uninit]) {
            return Ok(Expr::Uninit { line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::This]) {
            return Ok(Expr::This { line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Int]) {
            let v = if let TokLit::Int(v) = tok.literal { v } else { 0 };
            return Ok(Expr::Literal { value: Literal::Int(v), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::UInt]) {
            let v = if let TokLit::UInt(v) = tok.literal { v } else { 0 };
            return Ok(Expr::Literal { value: Literal::UInt(v), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Float]) {
            let v = if let TokLit::Float(v) = tok.literal { v } else { 0.0 };
            return Ok(Expr::Literal { value: Literal::Float(v), line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Str]) {
            let text = if let TokLit::Str(s) = tok.literal { s } else { tok.lexeme.clone() };
            if self.check(TokenKind::InterpStart) {
                return self.parse_interpolated_string(text, tok.line, tok.col);
            }
            return Ok(Expr::Literal { value: Literal::Str(text), line: tok.line, col: tok.col });
        }
        if self.check(TokenKind::InterpStart) {
            // A string segment can be empty (e.g. `"&{x}"` begins with no
            // leading text), so the interpolation can start without a
            // preceding `Str` token.
            return self.parse_interpolated_string(String::new(), tok.line, tok.col);
        }
        if self.matches(&[
            TokenKind::StrKw,
            TokenKind::IntKw,
            TokenKind::FloatKw,
            TokenKind::Bool,
            TokenKind::UintKw,
        ]) {
            // `str(x)`, `int(x)`, ... act as built-in conversion calls.
            return Ok(Expr::Identifier { name: tok.lexeme, line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::Identifier]) {
            return Ok(Expr::Identifier { name: tok.lexeme, line: tok.line, col: tok.col });
        }
        if self.matches(&[TokenKind::LParen]) {
            let inner = self.expression()?;
            self.consume(TokenKind::RParen, "expected ')' after grouped expression")?;
            return Ok(Expr::Grouping(Box::new(inner)));
        }
        if self.check(TokenKind::LBracket) {
            return self.parse_array_literal();
        }
        if self.check(TokenKind::LBrace) {
            return self.parse_map_literal();
        }
        self.error(&format!("unexpected token '{}', expected an expression", tok.lexeme));
        Err(())
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let open = self.consume(TokenKind::LBracket, "expected '['")?.clone();
        let mut elements = Vec::new();
        if !self.check(TokenKind::RBracket) {
            loop {
                if self.check(TokenKind::RBracket) {
                    break;
                }
                elements.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBracket, "expected ']' to close array literal")?;
        Ok(Expr::ArrayLit { elements, line: open.line, col: open.col })
    }

    fn parse_map_literal(&mut self) -> PResult<Expr> {
        let open = self.consume(TokenKind::LBrace, "expected '{'")?.clone();
        let mut entries = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                let key = self.expression()?;
                let colon = self.consume(TokenKind::Colon, "expected ':' between map key and value")?.clone();
                let value = if self.check(TokenKind::Comma) || self.check(TokenKind::RBrace) {
                    Expr::Literal { value: Literal::Sol, line: colon.line, col: colon.col }
                } else {
                    self.expression()?
                };
                entries.push((key, value));
                if self.matches(&[TokenKind::Comma]) {
                    if self.check(TokenKind::RBrace) {
                        self.error("trailing comma in map literal is not allowed");
                        return Err(());
                    }
                } else {
                    break;
                }
            }
        }
        self.consume(TokenKind::RBrace, "expected '}' to close map literal")?;
        Ok(Expr::MapLit { entries, line: open.line, col: open.col })
    }

    fn parse_interpolated_string(&mut self, leading: String, line: usize, col: usize) -> PResult<Expr> {
        let mut parts = Vec::new();
        if !leading.is_empty() {
            parts.push(InterpPart::Text(leading));
        }
        while self.matches(&[TokenKind::InterpStart]) {
            let expr = self.expression()?;
            self.consume(TokenKind::InterpEnd, "expected '}' after interpolated expression")?;
            parts.push(InterpPart::Expr(expr));
            if self.check(TokenKind::Str) {
                let tok = self.advance().clone();
                let text = if let TokLit::Str(s) = tok.literal { s } else { tok.lexeme };
                parts.push(InterpPart::Text(text));
            }
        }
        Ok(Expr::Interpolated { parts, line, col })
    }
}

pub fn parse(tokens: Vec<Token>) -> (Program, Vec<Diagnostic>) {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> (Program, Vec<Diagnostic>) {
        parse(lex(src))
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let (prog, errs) = parse_src("1 + 2 * 3;");
        assert!(errs.is_empty());
        assert_eq!(prog.statements.len(), 1);
        match &prog.statements[0] {
            Stmt::Expr(Expr::Binary { op: BinOp::Add, right, .. }) => {
                assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn floor_div_binds_tighter_than_additive() {
        let (prog, errs) = parse_src("1 - 7 # 2;");
        assert!(errs.is_empty());
        match &prog.statements[0] {
            Stmt::Expr(Expr::Binary { op: BinOp::Sub, right, .. }) => {
                assert!(matches!(**right, Expr::Binary { op: BinOp::FloorDiv, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn exponent_is_right_associative() {
        let (prog, errs) = parse_src("2 ** 3 ** 2;");
        assert!(errs.is_empty());
        match &prog.statements[0] {
            Stmt::Expr(Expr::Binary { op: BinOp::Pow, right, .. }) => {
                assert!(matches!(**right, Expr::Binary { op: BinOp::Pow, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn compound_assignment_desugars() {
        let (prog, errs) = parse_src("x += 1;");
        assert!(errs.is_empty());
        match &prog.statements[0] {
            Stmt::Expr(Expr::Assign { value, .. }) => {
                assert!(matches!(**value, Expr::Binary { op: BinOp::Add, .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn for_loop_desugars_to_block_and_while() {
        let (prog, errs) = parse_src("for (var i: int = 0; i < 3; i += 1) { print(i); }");
        assert!(errs.is_empty());
        assert!(matches!(prog.statements[0], Stmt::Block(_)));
    }

    #[test]
    fn let_without_type_or_init_is_rejected() {
        let (_prog, errs) = parse_src("let x;");
        assert!(!errs.is_empty());
    }

    #[test]
    fn try_without_catch_or_finally_is_rejected() {
        let (_prog, errs) = parse_src("try { print(1); }");
        assert!(!errs.is_empty());
    }

    #[test]
    fn member_access_tagged_for_later_package_resolution() {
        let (prog, errs) = parse_src("print(math.pi);");
        assert!(errs.is_empty());
        match &prog.statements[0] {
            Stmt::Print { args, .. } => assert!(matches!(args[0], Expr::Member { .. })),
            other => panic!("unexpected ast: {other:?}"),
        }
    }
}
