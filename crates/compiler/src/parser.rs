//! Recursive-descent + precedence-climbing parser producing the untyped
//! [`crate::ast`]. This is the "external" syntax-tree-producing collaborator
//! `spec.md` describes; it does no type resolution or diagnostics beyond
//! malformed-syntax errors.

use crate::ast::*;
use crate::lexer::{LexError, Lexer, Token};
use std::fmt;

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { message: e.to_string() }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_module()
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), ParseError> {
        if self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(ParseError { message: format!("expected {tok}, found {}", self.peek()) })
        }
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError { message: format!("expected identifier, found {other}") }),
        }
    }

    fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut items = Vec::new();
        while *self.peek() != Token::Eof {
            items.push(self.parse_item()?);
            self.eat(&Token::Semicolon);
        }
        Ok(Module { items })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        match self.peek() {
            Token::Data => Ok(Item::Data(self.parse_data()?)),
            Token::Fn | Token::Inline | Token::Generic | Token::Macro => Ok(Item::Function(self.parse_function()?)),
            _ => Ok(Item::Stmt(self.parse_stmt()?)),
        }
    }

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        if self.eat(&Token::Bang) {
            let name = self.ident()?;
            return Ok(TypeExpr::Dataframe(name));
        }
        let name = self.ident()?;
        if self.eat(&Token::LBrace) {
            let mut args = Vec::new();
            if *self.peek() != Token::RBrace {
                loop {
                    args.push(self.parse_template_arg()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RBrace)?;
            return Ok(TypeExpr::Template(name, args));
        }
        Ok(TypeExpr::Named(name))
    }

    fn parse_template_arg(&mut self) -> Result<TemplateArg, ParseError> {
        // A template argument is a type if it parses as a bare (possibly
        // dataframe/template) type name; otherwise a comptime value.
        if matches!(self.peek(), Token::Ident(_)) || *self.peek() == Token::Bang {
            let save = self.pos;
            if let Ok(ty) = self.parse_type() {
                if matches!(self.peek(), Token::Comma | Token::RBrace) {
                    return Ok(TemplateArg::Type(ty));
                }
            }
            self.pos = save;
        }
        Ok(TemplateArg::Value(self.parse_expr()?))
    }

    fn parse_data(&mut self) -> Result<DataDecl, ParseError> {
        self.expect(&Token::Data)?;
        let name = self.ident()?;
        let mut template_params = Vec::new();
        if self.eat(&Token::LBrace) {
            loop {
                template_params.push(self.ident()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RBrace)?;
        }
        self.expect(&Token::Colon)?;
        let mut fields = Vec::new();
        loop {
            let fname = self.ident()?;
            self.expect(&Token::Colon)?;
            let ty = self.parse_type()?;
            fields.push(FieldDecl { name: fname, ty });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::End)?;
        Ok(DataDecl { name, fields, template_params })
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, ParseError> {
        let inline = self.eat(&Token::Inline);
        let is_generic = self.eat(&Token::Generic);
        let is_macro = !is_generic && self.eat(&Token::Macro);
        self.expect(&Token::Fn)?;
        let name = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        let mut macro_params = Vec::new();
        if *self.peek() != Token::RParen {
            loop {
                let is_macro_param = is_macro && self.eat(&Token::Bang);
                let pname = self.ident()?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                if is_macro_param {
                    macro_params.push(pname.clone());
                }
                params.push(Param { name: pname, ty });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let ret = if self.eat(&Token::Colon) { Some(self.parse_type()?) } else { None };
        let generic_params = if is_generic {
            params.iter().map(|p| if let TypeExpr::Named(n) = &p.ty { n.clone() } else { String::new() }).collect()
        } else {
            Vec::new()
        };
        let body = self.parse_block_until_end()?;
        Ok(FunctionDecl { name, params, ret, body, inline, generic_params, macro_params })
    }

    fn parse_block_until_end(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while *self.peek() != Token::End {
            stmts.push(self.parse_stmt()?);
            self.eat(&Token::Semicolon);
        }
        self.expect(&Token::End)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Token::Let => {
                self.bump();
                let name = self.ident()?;
                let ty = if self.eat(&Token::Colon) { Some(self.parse_type()?) } else { None };
                self.expect(&Token::Eq)?;
                let value = self.parse_expr()?;
                Ok(Stmt::Let { name, ty, value })
            }
            Token::Var => {
                self.bump();
                let name = self.ident()?;
                let ty = if self.eat(&Token::Colon) { Some(self.parse_type()?) } else { None };
                self.expect(&Token::Eq)?;
                let value = self.parse_expr()?;
                Ok(Stmt::Var { name, ty, value })
            }
            Token::While => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&Token::Colon)?;
                let body = self.parse_block_until_end()?;
                Ok(Stmt::While { cond, body })
            }
            Token::Return => {
                self.bump();
                if matches!(self.peek(), Token::Semicolon | Token::End | Token::Eof) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_expr()?)))
                }
            }
            Token::Print => {
                self.bump();
                Ok(Stmt::Print(self.parse_expr()?))
            }
            Token::Save => {
                self.bump();
                Ok(Stmt::Save(self.parse_expr()?))
            }
            Token::Exit => {
                self.bump();
                Ok(Stmt::Exit(self.parse_expr()?))
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Eq) {
            let rhs = self.parse_assignment()?;
            return Ok(Expr::Assign(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.eat(&Token::Bang) {
            if let Token::Ident(_) = self.peek() {
                // `!Name(...)` — a Dataframe constructor call, not negation.
                let name = self.ident()?;
                let callee = Expr::Ident(format!("!{name}"));
                return self.parse_postfix(callee);
            }
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix_primary()
    }

    fn parse_postfix_primary(&mut self) -> Result<Expr, ParseError> {
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            if self.eat(&Token::Dot) {
                let name = self.ident()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen)?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.bump() {
            Token::IntLit(n) => Ok(Expr::IntLit(n)),
            Token::FloatLit(f) => Ok(Expr::FloatLit(f)),
            Token::StringLit(s) => Ok(Expr::StringLit(s)),
            Token::CharLit(c) => Ok(Expr::CharLit(c)),
            Token::BoolLit(b) => Ok(Expr::BoolLit(b)),
            Token::Ident(s) => {
                if *self.peek() == Token::LBrace {
                    self.bump();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RBrace {
                        loop {
                            args.push(self.parse_template_arg()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RBrace)?;
                    Ok(Expr::TemplateIdent(s, args))
                } else {
                    Ok(Expr::Ident(s))
                }
            }
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::VectorLit(items))
            }
            Token::If => self.parse_if(),
            Token::From => self.parse_query(),
            Token::Sort => self.parse_sort(),
            Token::Join => self.parse_join(),
            other => Err(ParseError { message: format!("unexpected token {other} in expression") }),
        }
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(&Token::Colon)?;
        let body = self.parse_if_body()?;
        arms.push((cond, body));
        loop {
            if self.eat(&Token::Elif) {
                let cond = self.parse_expr()?;
                self.expect(&Token::Colon)?;
                let body = self.parse_if_body()?;
                arms.push((cond, body));
            } else {
                break;
            }
        }
        let else_body = if self.eat(&Token::Else) {
            self.expect(&Token::Colon)?;
            Some(self.parse_if_body()?)
        } else {
            None
        };
        self.expect(&Token::End)?;
        Ok(Expr::If(arms, else_body))
    }

    fn parse_if_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Token::Elif | Token::Else | Token::End) {
            stmts.push(self.parse_stmt()?);
            self.eat(&Token::Semicolon);
        }
        Ok(stmts)
    }

    fn parse_named_list(&mut self, terminators: &[Token]) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut out = Vec::new();
        loop {
            if terminators.contains(self.peek()) {
                break;
            }
            // `name = expr` or bare `name` (implied member, name == expr text).
            let save = self.pos;
            let name = self.ident()?;
            if self.eat(&Token::Eq) {
                let value = self.parse_expr()?;
                out.push((name, value));
            } else {
                self.pos = save;
                let value = self.parse_expr()?;
                out.push((name, value));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(out)
    }

    fn parse_query(&mut self) -> Result<Expr, ParseError> {
        let source = Box::new(self.parse_unary()?);
        self.expect(&Token::Select)?;
        let select = self.parse_named_list(&[Token::By, Token::Where, Token::Eof, Token::Semicolon])?;
        let by = if self.eat(&Token::By) {
            self.parse_named_list(&[Token::Where, Token::Eof, Token::Semicolon])?
        } else {
            Vec::new()
        };
        let filter = if self.eat(&Token::Where) { Some(Box::new(self.parse_expr()?)) } else { None };
        Ok(Expr::Query(QueryExpr { source, select, by, filter }))
    }

    fn parse_sort(&mut self) -> Result<Expr, ParseError> {
        let source = Box::new(self.parse_unary()?);
        self.expect(&Token::By)?;
        let mut by = Vec::new();
        loop {
            by.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Expr::Sort(SortExpr { source, by }))
    }

    fn parse_join(&mut self) -> Result<Expr, ParseError> {
        let left = Box::new(self.parse_unary()?);
        self.expect(&Token::Comma)?;
        let right = Box::new(self.parse_unary()?);
        let mut on = Vec::new();
        let mut asof = None;
        let mut strict = false;
        let mut direction = None;
        let mut within = None;
        if self.eat(&Token::On) {
            loop {
                on.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        if self.eat(&Token::Asof) {
            let l = self.parse_expr()?;
            self.expect(&Token::Comma)?;
            let r = self.parse_expr()?;
            asof = Some((l, r));
        }
        strict = strict || self.eat(&Token::Strict);
        if self.eat(&Token::Backward) {
            direction = Some(AsofDir::Backward);
        } else if self.eat(&Token::Forward) {
            direction = Some(AsofDir::Forward);
        } else if self.eat(&Token::Nearest) {
            direction = Some(AsofDir::Nearest);
        }
        if self.eat(&Token::Within) {
            within = Some(Box::new(self.parse_expr()?));
        }
        Ok(Expr::Join(JoinExpr { left, right, on, asof, strict, direction, within }))
    }
}
