//! Parser for Lona
//!
//! Recursive descent parser with Pratt parsing for expressions. Builds the
//! node arena directly; every statement body is a `StatList` node.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// Binding power of prefix operators; above every binary operator
const PREFIX_BP: u8 = 8;

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
}

impl Parser {
    /// Create a new parser from a lexer
    pub fn new(mut lexer: Lexer) -> Self {
        Self {
            tokens: lexer.tokenize(),
            pos: 0,
            ast: Ast::new(),
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof and advance() never steps past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(Error::UnexpectedToken {
                expected: format!("{:?}", expected),
                got: format!("{:?}", self.current_kind()),
                span: self.current().span,
            })
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(&self.prev_span())
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete program and hand back the finished arena
    pub fn parse_program(mut self) -> Result<Ast> {
        let start = self.current().span;
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }
        let span = self.span_from(start);
        let body = self.ast.add(NodeKind::StatList { stmts }, span);
        let root = self.ast.add(NodeKind::Program { body }, span);
        self.ast.set_root(root);
        Ok(self.ast)
    }

    fn parse_ident(&mut self) -> Result<(String, Span)> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok((name, token.span))
            }
            _ => Err(Error::ExpectedIdent { span: token.span }),
        }
    }

    /// `name (* | [] | [N])*`
    fn parse_type(&mut self) -> Result<TypeExpr> {
        let (name, start) = match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                (name, span)
            }
            _ => return Err(Error::ExpectedType { span: self.current().span }),
        };

        let mut suffixes = Vec::new();
        loop {
            if self.consume(&TokenKind::Star) {
                suffixes.push(TypeSuffix::Pointer);
            } else if self.consume(&TokenKind::LBracket) {
                let size = match self.current_kind().clone() {
                    TokenKind::IntLit(text) => {
                        let span = self.advance().span;
                        let n = text
                            .parse::<u32>()
                            .map_err(|_| Error::InvalidNumber { text, span })?;
                        Some(n)
                    }
                    _ => None,
                };
                self.expect(TokenKind::RBracket)?;
                suffixes.push(TypeSuffix::Array(size));
            } else {
                break;
            }
        }

        Ok(TypeExpr { name, suffixes, span: self.span_from(start) })
    }

    fn parse_block(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_stmt()?);
        }

        self.expect(TokenKind::RBrace)?;
        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::StatList { stmts }, span))
    }

    fn parse_stmt(&mut self) -> Result<NodeId> {
        let stmt = match self.current_kind() {
            TokenKind::Func => self.parse_function()?,
            TokenKind::Struct => self.parse_struct()?,
            TokenKind::Var => self.parse_var()?,
            TokenKind::Return => self.parse_return()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While | TokenKind::For => self.parse_loop()?,
            TokenKind::LBrace => self.parse_block()?,
            _ => self.parse_expr()?,
        };
        self.consume(&TokenKind::Semicolon);
        Ok(stmt)
    }

    fn parse_function(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::Func)?;
        let (name, _) = self.parse_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let (param, param_start) = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param { name: param, ty, span: self.span_from(param_start) });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let ret = if self.consume(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::FuncDecl { name, params, ret, body }, span))
    }

    fn parse_struct(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::Struct)?;
        let (name, _) = self.parse_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.check(&TokenKind::Func) {
                methods.push(self.parse_function()?);
            } else {
                let (field, field_start) = self.parse_ident()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                fields.push(FieldDecl { name: field, ty, span: self.span_from(field_start) });
            }
            if !self.consume(&TokenKind::Semicolon) {
                self.consume(&TokenKind::Comma);
            }
        }

        self.expect(TokenKind::RBrace)?;
        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::StructDecl { name, fields, methods }, span))
    }

    fn parse_var(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::Var)?;
        let (name, _) = self.parse_ident()?;

        let ty = if self.consume(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let init = if self.consume(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::VarDecl { name, ty, init }, span))
    }

    fn parse_return(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::Return)?;

        let value = if !self.check(&TokenKind::Semicolon)
            && !self.check(&TokenKind::RBrace)
            && !self.is_at_end()
        {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::Return { value }, span))
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        let start = self.current().span;
        self.expect(TokenKind::If)?;

        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;

        let else_body = if self.consume(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // `else if` nests the inner if in a one-statement list
                let nested = self.parse_if()?;
                let span = self.ast.span(nested);
                Some(self.ast.add(NodeKind::StatList { stmts: vec![nested] }, span))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::If { cond, then_body, else_body }, span))
    }

    fn parse_loop(&mut self) -> Result<NodeId> {
        let start = self.advance().span; // `while` or `for`
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::Loop { cond, body }, span))
    }

    // ==================== Expression Parsing (Pratt) ====================

    fn parse_expr(&mut self) -> Result<NodeId> {
        self.parse_expr_bp(0)
    }

    /// Parse expression with binding power (Pratt parsing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<NodeId> {
        let mut left = self.parse_unary()?;

        loop {
            let op_kind = self.current_kind().clone();
            let Some(bp) = op_kind.binary_precedence() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();

            // Assignment is right-associative
            let next_bp = if op_kind == TokenKind::Eq { bp } else { bp + 1 };
            let right = self.parse_expr_bp(next_bp)?;
            let span = self.ast.span(left).merge(&self.ast.span(right));

            let kind = match Self::token_to_binop(&op_kind) {
                Some(op) => NodeKind::BinOp { op, left, right },
                None => NodeKind::Assign { left, right },
            };
            left = self.ast.add(kind, span);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeId> {
        let op = match self.current_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::And => UnaryOp::AddrOf,
            TokenKind::Star => UnaryOp::Deref,
            _ => return self.parse_primary(),
        };
        let start = self.advance().span;
        let operand = self.parse_expr_bp(PREFIX_BP)?;
        let span = self.span_from(start);
        Ok(self.ast.add(NodeKind::UnaryOp { op, operand }, span))
    }

    fn parse_primary(&mut self) -> Result<NodeId> {
        let token = self.current().clone();

        let expr = match token.kind {
            TokenKind::IntLit(text) => {
                self.advance();
                let value = text
                    .parse::<i32>()
                    .map_err(|_| Error::InvalidNumber { text, span: token.span })?;
                self.ast.add(NodeKind::Const { value: Constant::Int32(value) }, token.span)
            }
            TokenKind::FloatLit(text) => {
                self.advance();
                let value = text
                    .parse::<f32>()
                    .map_err(|_| Error::InvalidNumber { text, span: token.span })?;
                self.ast.add(NodeKind::Const { value: Constant::Float32(value) }, token.span)
            }
            TokenKind::StringLit(s) => {
                self.advance();
                self.ast.add(NodeKind::Const { value: Constant::Str(s) }, token.span)
            }
            TokenKind::True => {
                self.advance();
                self.ast.add(NodeKind::Const { value: Constant::Bool(true) }, token.span)
            }
            TokenKind::False => {
                self.advance();
                self.ast.add(NodeKind::Const { value: Constant::Bool(false) }, token.span)
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.ast.add(NodeKind::Ident { name }, token.span)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                inner
            }
            _ => return Err(Error::ExpectedExpr { span: token.span }),
        };

        self.parse_postfix(expr)
    }

    fn parse_postfix(&mut self, mut expr: NodeId) -> Result<NodeId> {
        loop {
            let start = self.ast.span(expr);
            if self.consume(&TokenKind::LParen) {
                let mut args = Vec::new();
                while !self.check(&TokenKind::RParen) && !self.is_at_end() {
                    args.push(self.parse_expr()?);
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let span = self.span_from(start);
                expr = self.ast.add(NodeKind::FieldCall { callee: expr, args }, span);
            } else if self.consume(&TokenKind::Dot) {
                let (field, _) = self.parse_ident()?;
                let span = self.span_from(start);
                expr = self.ast.add(NodeKind::Selector { parent: expr, field }, span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn token_to_binop(kind: &TokenKind) -> Option<BinaryOp> {
        match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Ge => Some(BinaryOp::Ge),
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::Ne => Some(BinaryOp::Ne),
            TokenKind::AndAnd => Some(BinaryOp::And),
            TokenKind::OrOr => Some(BinaryOp::Or),
            _ => None,
        }
    }
}

/// Lex and parse `source` in one step
pub fn parse_source(source: &str, file_id: usize) -> Result<Ast> {
    Parser::new(Lexer::new(source, file_id)).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Ast> {
        parse_source(source, 0)
    }

    fn top_level(ast: &Ast) -> Vec<NodeId> {
        let root = ast.root().unwrap();
        match ast.kind(root) {
            NodeKind::Program { body } => ast.stmts(*body).to_vec(),
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_function_with_return() {
        let ast = parse("func add(a: i32, b: i32) -> i32 { return a + b; }").unwrap();
        let stmts = top_level(&ast);
        assert_eq!(stmts.len(), 1);
        match ast.kind(stmts[0]) {
            NodeKind::FuncDecl { name, params, ret, body } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert_eq!(ret.as_ref().unwrap().name, "i32");
                assert_eq!(ast.stmts(*body).len(), 1);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_with_method() {
        let ast = parse("struct Point { x: i32; y: i32; func sum() -> i32 { return self.x + self.y; } }")
            .unwrap();
        let stmts = top_level(&ast);
        match ast.kind(stmts[0]) {
            NodeKind::StructDecl { name, fields, methods } => {
                assert_eq!(name, "Point");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].name, "y");
                assert_eq!(methods.len(), 1);
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_type_suffixes() {
        let ast = parse("var p: i32*[4][] ;").unwrap();
        let stmts = top_level(&ast);
        match ast.kind(stmts[0]) {
            NodeKind::VarDecl { ty: Some(ty), init: None, .. } => {
                assert_eq!(
                    ty.suffixes,
                    vec![TypeSuffix::Pointer, TypeSuffix::Array(Some(4)), TypeSuffix::Array(None)]
                );
                assert_eq!(ty.to_string(), "i32*[4][]");
            }
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_and_assignment() {
        let ast = parse("x = 1 + 2 * 3").unwrap();
        let stmts = top_level(&ast);
        let NodeKind::Assign { right, .. } = ast.kind(stmts[0]) else {
            panic!("expected assignment");
        };
        let NodeKind::BinOp { op: BinaryOp::Add, right: mul, .. } = ast.kind(*right) else {
            panic!("expected addition");
        };
        assert!(matches!(ast.kind(*mul), NodeKind::BinOp { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_method_call_and_unary() {
        let ast = parse("p.move(1, -2); *q = &n;").unwrap();
        let stmts = top_level(&ast);
        let NodeKind::FieldCall { callee, args } = ast.kind(stmts[0]) else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(ast.kind(*callee), NodeKind::Selector { field, .. } if field == "move"));
        let NodeKind::Assign { left, right } = ast.kind(stmts[1]) else {
            panic!("expected assignment");
        };
        assert!(matches!(ast.kind(*left), NodeKind::UnaryOp { op: UnaryOp::Deref, .. }));
        assert!(matches!(ast.kind(*right), NodeKind::UnaryOp { op: UnaryOp::AddrOf, .. }));
    }

    #[test]
    fn test_control_flow() {
        let ast = parse("if (a) { return 1; } else if b { x = 2 } while (x < 3) { x = x + 1 }")
            .unwrap();
        let stmts = top_level(&ast);
        assert_eq!(stmts.len(), 2);
        let NodeKind::If { else_body: Some(else_body), .. } = ast.kind(stmts[0]) else {
            panic!("expected if/else");
        };
        let nested = ast.stmts(*else_body);
        assert!(matches!(ast.kind(nested[0]), NodeKind::If { else_body: None, .. }));
        assert!(matches!(ast.kind(stmts[1]), NodeKind::Loop { .. }));
    }

    #[test]
    fn test_bare_block_statement() {
        let ast = parse("{ var x = 1; { x = 2; } }").unwrap();
        let stmts = top_level(&ast);
        let NodeKind::StatList { stmts: inner } = ast.kind(stmts[0]) else {
            panic!("expected block");
        };
        assert_eq!(inner.len(), 2);
        assert!(matches!(ast.kind(inner[1]), NodeKind::StatList { .. }));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("var : i32"), Err(Error::ExpectedIdent { .. })));
        assert!(matches!(parse("var x: 3"), Err(Error::ExpectedType { .. })));
        assert!(matches!(parse("x = )"), Err(Error::ExpectedExpr { .. })));
        assert!(matches!(parse("x = 99999999999"), Err(Error::InvalidNumber { .. })));
        assert!(matches!(parse("func f( {"), Err(Error::ExpectedIdent { .. })));
    }
}
