//! Recursive-descent parser for MPCL.

use mpcl_circuit::TypeInfo;

use crate::ast::{Argument, BinaryOp, Expr, Func, List, Name, Stmt, Unit};
use crate::error::{CompileError, Point};
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    lexer: Lexer,
    unit: Unit,
    /// Composite literals are not allowed directly in `if`/`for`
    /// headers, where `{` starts the statement block.
    no_composite: bool,
}

/// Parse one MPCL source file into a compilation unit.
pub fn parse(source_name: &str, input: &str) -> Result<Unit, CompileError> {
    Parser {
        lexer: Lexer::new(source_name, input),
        unit: Unit::default(),
        no_composite: false,
    }
    .run()
}

impl Parser {
    fn err(&self, point: Point, message: String) -> CompileError {
        CompileError::syntax(self.lexer.source(), point, message)
    }

    fn get(&mut self) -> Result<Token, CompileError> {
        match self.lexer.get()? {
            Some(token) => Ok(token),
            None => Err(self.err(Point::default(), "unexpected end of file".to_string())),
        }
    }

    fn unget(&mut self, token: Token) {
        self.lexer.unget(token);
    }

    fn need(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        let token = self.get()?;
        if std::mem::discriminant(&token.kind) != std::mem::discriminant(&kind) {
            return Err(self.err(
                token.from,
                format!("unexpected token '{}': expected '{}'", token, kind),
            ));
        }
        Ok(token)
    }

    fn next_is(&mut self, kind: &TokenKind) -> Result<bool, CompileError> {
        match self.lexer.get()? {
            Some(token) => {
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(kind) {
                    Ok(true)
                } else {
                    self.unget(token);
                    Ok(false)
                }
            }
            None => Ok(false),
        }
    }

    fn identifier(&mut self) -> Result<(String, Point), CompileError> {
        let token = self.get()?;
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, token.from)),
            _ => Err(self.err(
                token.from,
                format!("unexpected token '{}': expected identifier", token),
            )),
        }
    }

    fn run(mut self) -> Result<Unit, CompileError> {
        self.need(TokenKind::Package)?;
        let (package, _) = self.identifier()?;
        self.unit.package = package;

        while let Some(token) = self.lexer.get()? {
            match token.kind {
                TokenKind::Import => self.parse_import()?,
                TokenKind::Const => self.parse_const()?,
                TokenKind::Type => self.parse_type_decl()?,
                TokenKind::Func => {
                    let func = self.parse_func(token.from)?;
                    self.unit.functions.push(func);
                }
                _ => {
                    return Err(
                        self.err(token.from, format!("unexpected token '{}'", token))
                    )
                }
            }
        }
        Ok(self.unit)
    }

    fn parse_import(&mut self) -> Result<(), CompileError> {
        if self.next_is(&TokenKind::LParen)? {
            loop {
                let token = self.get()?;
                match token.kind {
                    TokenKind::StringLit(path) => self.unit.imports.push(path),
                    TokenKind::RParen => break,
                    _ => {
                        return Err(self.err(
                            token.from,
                            format!("unexpected token '{}' in import", token),
                        ))
                    }
                }
            }
        } else {
            let token = self.get()?;
            match token.kind {
                TokenKind::StringLit(path) => self.unit.imports.push(path),
                _ => {
                    return Err(self.err(
                        token.from,
                        format!("unexpected token '{}' in import", token),
                    ))
                }
            }
        }
        Ok(())
    }

    fn parse_const(&mut self) -> Result<(), CompileError> {
        if self.next_is(&TokenKind::LParen)? {
            loop {
                if self.next_is(&TokenKind::RParen)? {
                    break;
                }
                let (name, _) = self.identifier()?;
                self.need(TokenKind::Assign)?;
                let init = self.parse_expr()?;
                self.unit.constants.push((name, init));
            }
        } else {
            let (name, _) = self.identifier()?;
            self.need(TokenKind::Assign)?;
            let init = self.parse_expr()?;
            self.unit.constants.push((name, init));
        }
        Ok(())
    }

    fn parse_type_decl(&mut self) -> Result<(), CompileError> {
        let (name, loc) = self.identifier()?;
        self.need(TokenKind::Struct)?;
        self.need(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.next_is(&TokenKind::RBrace)? {
                break;
            }
            let (field, _) = self.identifier()?;
            let type_info = self.parse_type()?;
            fields.push((field, type_info));
        }
        if self.unit.type_decl(&name).is_some() {
            return Err(self.err(loc, format!("type '{}' redeclared", name)));
        }
        self.unit.types.push((name, TypeInfo::structure(fields)));
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeInfo, CompileError> {
        let token = self.get()?;
        match token.kind {
            TokenKind::LBracket => {
                let count = self.get()?;
                let count = match count.kind {
                    TokenKind::IntLit(v) if v >= 0 => v as u32,
                    _ => {
                        return Err(self.err(
                            count.from,
                            "array size must be a constant".to_string(),
                        ))
                    }
                };
                self.need(TokenKind::RBracket)?;
                let element = self.parse_type()?;
                Ok(TypeInfo::array(element, count))
            }
            TokenKind::Identifier(name) => {
                if let Ok(type_info) = TypeInfo::parse(&name) {
                    return Ok(type_info);
                }
                if let Some(type_info) = self.unit.type_decl(&name) {
                    return Ok(type_info.clone());
                }
                Err(self.err(token.from, format!("unknown type: {}", name)))
            }
            _ => Err(self.err(
                token.from,
                format!("unexpected token '{}': expected type", token),
            )),
        }
    }

    fn parse_func(&mut self, loc: Point) -> Result<Func, CompileError> {
        let (name, _) = self.identifier()?;
        self.need(TokenKind::LParen)?;

        // Argument list; names may share a trailing type: `a, b uint3`.
        let mut args: Vec<Argument> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        loop {
            if self.next_is(&TokenKind::RParen)? {
                if !pending.is_empty() {
                    return Err(self.err(loc, "missing argument type".to_string()));
                }
                break;
            }
            let (arg, _) = self.identifier()?;
            pending.push(arg);
            if self.next_is(&TokenKind::Comma)? {
                continue;
            }
            let type_info = self.parse_type()?;
            for name in pending.drain(..) {
                args.push(Argument {
                    name,
                    type_info: type_info.clone(),
                });
            }
            if !self.next_is(&TokenKind::Comma)? {
                self.need(TokenKind::RParen)?;
                break;
            }
        }

        // Return values.
        let mut returns = Vec::new();
        let token = self.get()?;
        match token.kind {
            TokenKind::LParen => loop {
                returns.push(self.parse_type()?);
                let token = self.get()?;
                match token.kind {
                    TokenKind::RParen => break,
                    TokenKind::Comma => (),
                    _ => {
                        return Err(self.err(
                            token.from,
                            format!("unexpected token '{}' in return types", token),
                        ))
                    }
                }
            },
            TokenKind::LBrace => {
                self.unget(token);
            }
            _ => {
                self.unget(token);
                returns.push(self.parse_type()?);
            }
        }

        self.need(TokenKind::LBrace)?;
        let body = self.parse_block()?;

        Ok(Func {
            loc,
            name,
            args,
            returns,
            body,
        })
    }

    fn parse_block(&mut self) -> Result<List, CompileError> {
        let mut result = Vec::new();
        loop {
            if self.next_is(&TokenKind::RBrace)? {
                break;
            }
            result.push(self.parse_stmt()?);
        }
        Ok(result)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let token = self.get()?;
        match token.kind {
            TokenKind::Var => self.parse_var(token.from),
            TokenKind::Const => {
                let (name, _) = self.identifier()?;
                self.need(TokenKind::Assign)?;
                let init = self.parse_expr()?;
                Ok(Stmt::ConstantDef {
                    loc: token.from,
                    name,
                    init,
                })
            }
            TokenKind::If => self.parse_if(token.from),
            TokenKind::For => self.parse_for(token.from),
            TokenKind::Return => {
                let mut exprs = Vec::new();
                // Return values end at the closing brace of the block.
                if let Some(next) = self.lexer.get()? {
                    if next.kind == TokenKind::RBrace {
                        self.unget(next);
                    } else {
                        self.unget(next);
                        exprs.push(self.parse_expr()?);
                        while self.next_is(&TokenKind::Comma)? {
                            exprs.push(self.parse_expr()?);
                        }
                    }
                }
                Ok(Stmt::Return {
                    loc: token.from,
                    exprs,
                })
            }
            _ => {
                self.unget(token);
                self.parse_simple_stmt()
            }
        }
    }

    fn parse_var(&mut self, loc: Point) -> Result<Stmt, CompileError> {
        let mut names = Vec::new();
        loop {
            let (name, _) = self.identifier()?;
            names.push(name);
            if !self.next_is(&TokenKind::Comma)? {
                break;
            }
        }
        let type_info = self.parse_type()?;
        let init = if self.next_is(&TokenKind::Assign)? {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::VariableDef {
            loc,
            names,
            type_info,
            init,
        })
    }

    fn parse_if(&mut self, loc: Point) -> Result<Stmt, CompileError> {
        let saved = self.no_composite;
        self.no_composite = true;
        let cond = self.parse_expr()?;
        self.no_composite = saved;
        self.need(TokenKind::LBrace)?;
        let true_branch = self.parse_block()?;
        let mut false_branch = Vec::new();
        if self.next_is(&TokenKind::Else)? {
            let token = self.get()?;
            match token.kind {
                TokenKind::If => false_branch.push(self.parse_if(token.from)?),
                TokenKind::LBrace => false_branch = self.parse_block()?,
                _ => {
                    return Err(self.err(
                        token.from,
                        format!("unexpected token '{}' after else", token),
                    ))
                }
            }
        }
        Ok(Stmt::If {
            loc,
            cond,
            true_branch,
            false_branch,
        })
    }

    fn parse_for(&mut self, loc: Point) -> Result<Stmt, CompileError> {
        let saved = self.no_composite;
        self.no_composite = true;
        let init = self.parse_simple_stmt()?;
        self.need(TokenKind::Semicolon)?;
        let cond = self.parse_expr()?;
        self.need(TokenKind::Semicolon)?;
        let inc = self.parse_simple_stmt()?;
        self.no_composite = saved;
        self.need(TokenKind::LBrace)?;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            loc,
            init: Box::new(init),
            cond,
            inc: Box::new(inc),
            body,
        })
    }

    /// Expression statements, assignments, `:=` definitions, compound
    /// assignments, and `++`/`--`.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, CompileError> {
        let mut lvalues = vec![self.parse_expr()?];
        let loc = lvalues[0].location();
        while self.next_is(&TokenKind::Comma)? {
            lvalues.push(self.parse_expr()?);
        }
        let token = self.get()?;
        match token.kind {
            TokenKind::Assign | TokenKind::Define => {
                let define = token.kind == TokenKind::Define;
                let mut exprs = vec![self.parse_expr()?];
                while self.next_is(&TokenKind::Comma)? {
                    exprs.push(self.parse_expr()?);
                }
                Ok(Stmt::Assign {
                    loc,
                    lvalues,
                    op: None,
                    exprs,
                    define,
                })
            }
            TokenKind::PlusEq | TokenKind::MinusEq => {
                let op = if token.kind == TokenKind::PlusEq {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let expr = self.parse_expr()?;
                Ok(Stmt::Assign {
                    loc,
                    lvalues,
                    op: Some(op),
                    exprs: vec![expr],
                    define: false,
                })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if token.kind == TokenKind::PlusPlus {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                Ok(Stmt::Assign {
                    loc,
                    lvalues,
                    op: Some(op),
                    exprs: vec![Expr::IntLit { loc, value: 1 }],
                    define: false,
                })
            }
            _ => {
                self.unget(token);
                if lvalues.len() != 1 {
                    return Err(self.err(loc, "expected assignment".to_string()));
                }
                Ok(Stmt::ExprStmt {
                    loc,
                    expr: lvalues.pop().unwrap(),
                })
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary(1)
    }

    fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
        Some(match kind {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Lshift => BinaryOp::Lshift,
            TokenKind::Rshift => BinaryOp::Rshift,
            TokenKind::BitAnd => BinaryOp::Band,
            TokenKind::BitClear => BinaryOp::Bclear,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::BitOr => BinaryOp::Bor,
            TokenKind::BitXor => BinaryOp::Bxor,
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Neq => BinaryOp::Neq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::And => BinaryOp::And,
            TokenKind::Or => BinaryOp::Or,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let token = match self.lexer.get()? {
                Some(token) => token,
                None => return Ok(left),
            };
            let op = match Self::binary_op(&token.kind) {
                Some(op) if op.precedence() >= min_prec => op,
                _ => {
                    self.unget(token);
                    return Ok(left);
                }
            };
            let right = self.parse_binary(op.precedence() + 1)?;
            left = Expr::Binary {
                loc: token.from,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let token = self.get()?;
        match token.kind {
            TokenKind::Minus => Ok(Expr::Unary {
                loc: token.from,
                op: crate::ast::UnaryOp::Minus,
                expr: Box::new(self.parse_unary()?),
            }),
            TokenKind::Not => Ok(Expr::Unary {
                loc: token.from,
                op: crate::ast::UnaryOp::Not,
                expr: Box::new(self.parse_unary()?),
            }),
            _ => {
                self.unget(token);
                self.parse_postfix()
            }
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            let token = match self.lexer.get()? {
                Some(token) => token,
                None => return Ok(expr),
            };
            match token.kind {
                TokenKind::Dot => {
                    let (field, _) = self.identifier()?;
                    expr = Expr::Field {
                        loc: token.from,
                        expr: Box::new(expr),
                        field,
                    };
                }
                TokenKind::LParen => {
                    let name = match expr {
                        Expr::NameRef { name, .. } => name,
                        Expr::Field {
                            expr: base, field, ..
                        } => match *base {
                            Expr::NameRef { name, .. } if name.package.is_none() => Name {
                                package: Some(name.name),
                                name: field,
                            },
                            _ => {
                                return Err(self.err(
                                    token.from,
                                    "expression is not callable".to_string(),
                                ))
                            }
                        },
                        _ => {
                            return Err(self.err(
                                token.from,
                                "expression is not callable".to_string(),
                            ))
                        }
                    };
                    expr = self.parse_call(token.from, name)?;
                }
                TokenKind::LBracket => {
                    // Index `e[i]` or slice `e[a:b]`.
                    let mut from = None;
                    if !self.next_is(&TokenKind::Colon)? {
                        from = Some(Box::new(self.parse_expr()?));
                        if !self.next_is(&TokenKind::Colon)? {
                            self.need(TokenKind::RBracket)?;
                            expr = Expr::Index {
                                loc: token.from,
                                expr: Box::new(expr),
                                index: from.unwrap(),
                            };
                            continue;
                        }
                    }
                    let mut to = None;
                    if !self.next_is(&TokenKind::RBracket)? {
                        to = Some(Box::new(self.parse_expr()?));
                        self.need(TokenKind::RBracket)?;
                    }
                    expr = Expr::Slice {
                        loc: token.from,
                        expr: Box::new(expr),
                        from,
                        to,
                    };
                }
                TokenKind::LBrace if !self.no_composite => {
                    // Composite literal: only after a declared type name.
                    let type_name = match &expr {
                        Expr::NameRef { name, .. }
                            if name.package.is_none()
                                && self.unit.type_decl(&name.name).is_some() =>
                        {
                            name.name.clone()
                        }
                        _ => {
                            self.unget(token);
                            return Ok(expr);
                        }
                    };
                    expr = self.parse_composite(token.from, Some(type_name), None)?;
                }
                _ => {
                    self.unget(token);
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_call(&mut self, loc: Point, name: Name) -> Result<Expr, CompileError> {
        // make(T) takes a type argument.
        if name.package.is_none() && name.name == "make" {
            let type_info = self.parse_type()?;
            self.need(TokenKind::RParen)?;
            return Ok(Expr::Make { loc, type_info });
        }
        let mut args = Vec::new();
        if !self.next_is(&TokenKind::RParen)? {
            loop {
                args.push(self.parse_expr()?);
                let token = self.get()?;
                match token.kind {
                    TokenKind::RParen => break,
                    TokenKind::Comma => (),
                    _ => {
                        return Err(self.err(
                            token.from,
                            format!("unexpected token '{}' in call", token),
                        ))
                    }
                }
            }
        }
        // A call whose callee is a type name is a conversion.
        if name.package.is_none() {
            if let Ok(type_info) = TypeInfo::parse(&name.name) {
                if args.len() != 1 {
                    return Err(
                        self.err(loc, format!("conversion to {} takes one argument", name))
                    );
                }
                return Ok(Expr::Conversion {
                    loc,
                    type_info,
                    expr: Box::new(args.pop().unwrap()),
                });
            }
        }
        Ok(Expr::Call { loc, name, args })
    }

    fn parse_composite(
        &mut self,
        loc: Point,
        type_name: Option<String>,
        type_info: Option<TypeInfo>,
    ) -> Result<Expr, CompileError> {
        let mut values = Vec::new();
        loop {
            if self.next_is(&TokenKind::RBrace)? {
                break;
            }
            // Struct literals may name fields: `Point{x: 1, y: 2}`.
            let mut field = None;
            let token = self.get()?;
            if let TokenKind::Identifier(name) = &token.kind {
                if self.next_is(&TokenKind::Colon)? {
                    field = Some(name.clone());
                } else {
                    self.unget(token);
                }
            } else {
                self.unget(token);
            }
            values.push((field, self.parse_expr()?));
            if !self.next_is(&TokenKind::Comma)? {
                self.need(TokenKind::RBrace)?;
                break;
            }
        }
        Ok(Expr::Composite {
            loc,
            type_name,
            type_info,
            values,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.get()?;
        match token.kind {
            TokenKind::IntLit(value) => Ok(Expr::IntLit {
                loc: token.from,
                value,
            }),
            TokenKind::True => Ok(Expr::BoolLit {
                loc: token.from,
                value: true,
            }),
            TokenKind::False => Ok(Expr::BoolLit {
                loc: token.from,
                value: false,
            }),
            TokenKind::StringLit(value) => Ok(Expr::StringLit {
                loc: token.from,
                value,
            }),
            TokenKind::Identifier(name) => Ok(Expr::NameRef {
                loc: token.from,
                name: Name::plain(&name),
            }),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.need(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                // Array literal: `[N]type{...}`.
                self.unget(Token {
                    kind: TokenKind::LBracket,
                    from: token.from,
                    to: token.to,
                });
                let type_info = self.parse_type()?;
                self.need(TokenKind::LBrace)?;
                self.parse_composite(token.from, None, Some(type_info))
            }
            _ => Err(self.err(
                token.from,
                format!("unexpected token '{}' in expression", token),
            )),
        }
    }
}
