//! Recursive-descent parser over the token stream produced by
//! [`crate::lexer`].
//!
//! Expressions are parsed by a chain of precedence-specific methods
//! (`assignment` → `conditional` → `logical_or` → ... → `unary` →
//! `postfix` → `primary`), the classic approach for a fixed C-like grammar.
//! A parse error never aborts the run: it is recorded as a diagnostic and
//! [`Parser::synchronize`] skips to the next likely statement/declaration
//! boundary so later errors in the same file still get reported.

use crate::ast::*;
use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::lexer::{Token, TokenKind};
use crate::types::{BaseType, Type};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diags: &'a mut Diagnostics,
}

type PResult<T> = Option<T>;

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, diags: &'a mut Diagnostics) -> Self {
        Parser { tokens, pos: 0, diags }
    }

    pub fn parse(mut self) -> TranslationUnit {
        let mut declarations = Vec::new();
        while !self.at_eof() {
            match self.external_decl() {
                Some(decl) => declarations.push(decl),
                None => self.synchronize_top_level(),
            }
        }
        TranslationUnit { declarations }
    }

    // -- token stream helpers ------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let tok = self.peek().clone();
            self.diags.error(
                format!("expected {what}, found '{}'", tok.lexeme),
                tok.location.clone(),
            );
            None
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let loc = self.peek().location.clone();
        self.diags.error(message.into(), loc);
    }

    /// Skip tokens until a plausible statement/declaration boundary: past a
    /// `;`, or just before a `}`, type keyword, or EOF.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if self.check(TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if self.check(TokenKind::RBrace) || self.starts_type_specifier() {
                return;
            }
            self.advance();
        }
    }

    fn synchronize_top_level(&mut self) {
        while !self.at_eof() {
            if self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
                self.advance();
                return;
            }
            if self.starts_type_specifier() || self.check(TokenKind::KwExtern) {
                return;
            }
            self.advance();
        }
    }

    fn starts_type_specifier(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::KwVoid
                | TokenKind::KwChar
                | TokenKind::KwShort
                | TokenKind::KwInt
                | TokenKind::KwLong
                | TokenKind::KwFloat
                | TokenKind::KwDouble
                | TokenKind::KwStruct
                | TokenKind::KwSigned
                | TokenKind::KwUnsigned
                | TokenKind::KwConst
        )
    }

    // -- top level ------------------------------------------------------------

    fn external_decl(&mut self) -> PResult<ExternalDecl> {
        let start_loc = self.peek().location.clone();

        for unsupported in [
            TokenKind::KwTypedef,
            TokenKind::KwEnum,
            TokenKind::KwUnion,
        ] {
            if self.check(unsupported) {
                self.error_here(format!(
                    "'{}' is not supported by this compiler's C89 subset",
                    self.peek().lexeme
                ));
                return None;
            }
        }

        let is_extern = self.matches(TokenKind::KwExtern);
        let is_static = self.matches(TokenKind::KwStatic);

        if self.check(TokenKind::KwStruct) && self.peek_at(2).kind == TokenKind::LBrace {
            return self.struct_def(start_loc).map(ExternalDecl::StructDef);
        }

        let base_type = self.type_specifier()?;
        let (name, ty, is_function_decl, params, is_variadic) =
            self.declarator(base_type.clone())?;

        if is_function_decl {
            let body = if self.check(TokenKind::LBrace) {
                Some(self.block()?)
            } else {
                self.expect(TokenKind::Semicolon, "';' after function prototype")?;
                None
            };
            return Some(ExternalDecl::Function(FunctionDef {
                name,
                return_type: ty,
                params,
                is_variadic,
                is_extern: is_extern || body.is_none(),
                body,
                location: start_loc,
            }));
        }

        let init = if self.matches(TokenKind::Assign) {
            Some(self.assignment()?)
        } else {
            None
        };
        let mut declarators = vec![Declarator {
            name,
            ty,
            init,
            location: start_loc.clone(),
        }];
        while self.matches(TokenKind::Comma) {
            let (name, ty, _, _, _) = self.declarator(base_type.clone())?;
            let loc = self.peek().location.clone();
            let init = if self.matches(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarators.push(Declarator { name, ty, init, location: loc });
        }
        self.expect(TokenKind::Semicolon, "';' after declaration")?;
        Some(ExternalDecl::Declaration(Declaration {
            base_type,
            is_extern,
            is_static,
            declarators,
            location: start_loc,
        }))
    }

    fn struct_def(&mut self, location: SourceLocation) -> PResult<StructDef> {
        self.advance(); // 'struct'
        let name_tok = self.expect(TokenKind::Identifier, "struct name")?;
        self.expect(TokenKind::LBrace, "'{' to open struct body")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            let member_loc = self.peek().location.clone();
            let base = self.type_specifier()?;
            let (mname, mty, _, _, _) = self.declarator(base)?;
            self.expect(TokenKind::Semicolon, "';' after struct member")?;
            members.push(Param {
                name: mname,
                ty: mty,
                location: member_loc,
            });
        }
        self.expect(TokenKind::RBrace, "'}' to close struct body")?;
        self.expect(TokenKind::Semicolon, "';' after struct definition")?;
        Some(StructDef {
            name: name_tok.text().to_string(),
            members,
            location,
        })
    }

    /// Consumes `void|char|short|int|long|float|double|struct IDENT`, along
    /// with `const`/`signed`/`unsigned` qualifiers that don't change the
    /// underlying [`BaseType`] in this simplified type system.
    fn type_specifier(&mut self) -> PResult<Type> {
        while matches!(
            self.peek().kind,
            TokenKind::KwConst | TokenKind::KwVolatile | TokenKind::KwSigned | TokenKind::KwUnsigned
        ) {
            self.advance();
        }
        let base = match self.peek().kind {
            TokenKind::KwVoid => BaseType::Void,
            TokenKind::KwChar => BaseType::Char,
            TokenKind::KwShort => BaseType::Short,
            TokenKind::KwInt => BaseType::Int,
            TokenKind::KwLong => BaseType::Long,
            TokenKind::KwFloat => BaseType::Float,
            TokenKind::KwDouble => BaseType::Double,
            TokenKind::KwStruct => {
                self.advance();
                let name = self.expect(TokenKind::Identifier, "struct tag name")?;
                return Some(Type::struct_ref(name.text().to_string()));
            }
            _ => {
                self.error_here("expected a type specifier");
                return None;
            }
        };
        self.advance();
        while matches!(
            self.peek().kind,
            TokenKind::KwConst | TokenKind::KwVolatile
        ) {
            self.advance();
        }
        Some(Type::scalar(base))
    }

    /// Parses the declarator following a type specifier: pointer stars,
    /// name, and either `[N]` (array) or `(params)` (function). Returns
    /// `(name, resolved_type, is_function, params, is_variadic)`.
    #[allow(clippy::type_complexity)]
    fn declarator(&mut self, base: Type) -> PResult<(String, Type, bool, Vec<Param>, bool)> {
        let mut ty = base;
        while self.matches(TokenKind::Star) {
            ty = ty.pointer();
        }
        let name_tok = self.expect(TokenKind::Identifier, "declarator name")?;
        let name = name_tok.text().to_string();

        if self.matches(TokenKind::LParen) {
            let (params, is_variadic) = self.param_list()?;
            self.expect(TokenKind::RParen, "')' after parameter list")?;
            return Some((name, ty, true, params, is_variadic));
        }

        if self.matches(TokenKind::LBracket) {
            let size = if self.check(TokenKind::RBracket) {
                0
            } else {
                let tok = self.expect(TokenKind::IntLiteral, "array size")?;
                parse_int_literal(tok.text()).max(0) as usize
            };
            self.expect(TokenKind::RBracket, "']' after array size")?;
            ty = Type {
                base: ty.base,
                pointer_depth: ty.pointer_depth,
                is_array: true,
                array_size: size,
            };
        }

        Some((name, ty, false, Vec::new(), false))
    }

    fn param_list(&mut self) -> PResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        let mut is_variadic = false;
        if self.check(TokenKind::KwVoid) && self.peek_at(1).kind == TokenKind::RParen {
            self.advance();
            return Some((params, false));
        }
        if self.check(TokenKind::RParen) {
            return Some((params, false));
        }
        loop {
            if self.matches(TokenKind::Dot) {
                // `...`: lexer tokenizes three dots as three `Dot` tokens.
                self.expect(TokenKind::Dot, "'.' in '...'")?;
                self.expect(TokenKind::Dot, "'.' in '...'")?;
                is_variadic = true;
                break;
            }
            let loc = self.peek().location.clone();
            let base = self.type_specifier()?;
            let (name, ty, _, _, _) = self.declarator(base)?;
            params.push(Param { name, ty, location: loc });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Some((params, is_variadic))
    }

    // -- statements -------------------------------------------------------------

    fn block(&mut self) -> PResult<Block> {
        let location = self.peek().location.clone();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            match self.statement() {
                Some(s) => statements.push(s),
                None => self.synchronize(),
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Some(Block { statements, location })
    }

    fn statement(&mut self) -> PResult<Statement> {
        let location = self.peek().location.clone();
        match self.peek().kind {
            TokenKind::LBrace => self.block().map(Statement::Block),
            TokenKind::KwIf => self.if_statement(location),
            TokenKind::KwWhile => self.while_statement(location),
            TokenKind::KwFor => self.for_statement(location),
            TokenKind::KwReturn => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(TokenKind::Semicolon, "';' after return statement")?;
                Some(Statement::Return { value, location })
            }
            TokenKind::KwBreak => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';' after 'break'")?;
                Some(Statement::Break { location })
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';' after 'continue'")?;
                Some(Statement::Continue { location })
            }
            TokenKind::Semicolon => {
                self.advance();
                Some(Statement::Empty { location })
            }
            TokenKind::KwDo | TokenKind::KwSwitch | TokenKind::KwGoto => {
                self.error_here(format!(
                    "'{}' is not supported by this compiler's C89 subset",
                    self.peek().lexeme
                ));
                None
            }
            _ if self.starts_type_specifier() => {
                let decl = self.local_declaration()?;
                Some(Statement::Declaration(decl))
            }
            _ => {
                let expr = self.expression()?;
                self.expect(TokenKind::Semicolon, "';' after expression statement")?;
                Some(Statement::Expr { expr, location })
            }
        }
    }

    fn local_declaration(&mut self) -> PResult<Declaration> {
        let location = self.peek().location.clone();
        let is_static = self.matches(TokenKind::KwStatic);
        let is_extern = self.matches(TokenKind::KwExtern);
        let base_type = self.type_specifier()?;
        let mut declarators = Vec::new();
        loop {
            let dloc = self.peek().location.clone();
            let (name, ty, _, _, _) = self.declarator(base_type.clone())?;
            let init = if self.matches(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarators.push(Declarator { name, ty, init, location: dloc });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "';' after declaration")?;
        Some(Declaration {
            base_type,
            is_extern,
            is_static,
            declarators,
            location,
        })
    }

    fn if_statement(&mut self, location: SourceLocation) -> PResult<Statement> {
        self.advance();
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RParen, "')' after if condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(TokenKind::KwElse) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Some(Statement::If {
            condition,
            then_branch,
            else_branch,
            location,
        })
    }

    fn while_statement(&mut self, location: SourceLocation) -> PResult<Statement> {
        self.advance();
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RParen, "')' after while condition")?;
        let body = Box::new(self.statement()?);
        Some(Statement::While { condition, body, location })
    }

    fn for_statement(&mut self, location: SourceLocation) -> PResult<Statement> {
        self.advance();
        self.expect(TokenKind::LParen, "'(' after 'for'")?;
        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.starts_type_specifier() {
            Some(Box::new(Statement::Declaration(self.local_declaration()?)))
        } else {
            let loc = self.peek().location.clone();
            let expr = self.expression()?;
            self.expect(TokenKind::Semicolon, "';' after for-init")?;
            Some(Box::new(Statement::Expr { expr, location: loc }))
        };
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after for-condition")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen, "')' after for-clauses")?;
        let body = Box::new(self.statement()?);
        Some(Statement::For {
            init,
            condition,
            step,
            body,
            location,
        })
    }

    // -- expressions: precedence-climbing chain --------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if self.check(TokenKind::Comma) {
            let mut items = vec![first];
            while self.matches(TokenKind::Comma) {
                items.push(self.assignment()?);
            }
            let loc = items[0].location.clone();
            return Some(Expr::new(ExprKind::Comma(items), loc));
        }
        Some(first)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let lhs = self.conditional()?;
        let op = match self.peek().kind {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            TokenKind::StarAssign => AssignOp::MulAssign,
            TokenKind::SlashAssign => AssignOp::DivAssign,
            TokenKind::PercentAssign => AssignOp::ModAssign,
            TokenKind::AmpAssign => AssignOp::AndAssign,
            TokenKind::PipeAssign => AssignOp::OrAssign,
            TokenKind::CaretAssign => AssignOp::XorAssign,
            TokenKind::ShlAssign => AssignOp::ShlAssign,
            TokenKind::ShrAssign => AssignOp::ShrAssign,
            _ => return Some(lhs),
        };
        let loc = self.peek().location.clone();
        self.advance();
        let value = self.assignment()?; // right-associative
        Some(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(lhs),
                value: Box::new(value),
            },
            loc,
        ))
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.logical_or()?;
        if self.matches(TokenKind::Question) {
            let loc = cond.location.clone();
            let then_expr = self.expression()?;
            self.expect(TokenKind::Colon, "':' in conditional expression")?;
            let else_expr = self.conditional()?;
            return Some(Expr::new(
                ExprKind::Conditional {
                    condition: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                loc,
            ));
        }
        Some(cond)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> PResult<Expr>,
        ops: &[(TokenKind, BinOp)],
    ) -> PResult<Expr> {
        let mut lhs = next(self)?;
        loop {
            let found = ops.iter().find(|(k, _)| *k == self.peek().kind);
            let Some((_, op)) = found else { break };
            let op = *op;
            let loc = self.peek().location.clone();
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                loc,
            );
        }
        Some(lhs)
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        self.binary_level(Self::logical_and, &[(TokenKind::OrOr, BinOp::LogOr)])
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        self.binary_level(Self::bit_or, &[(TokenKind::AndAnd, BinOp::LogAnd)])
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        self.binary_level(Self::bit_xor, &[(TokenKind::Pipe, BinOp::BitOr)])
    }

    fn bit_xor(&mut self) -> PResult<Expr> {
        self.binary_level(Self::bit_and, &[(TokenKind::Caret, BinOp::BitXor)])
    }

    fn bit_and(&mut self) -> PResult<Expr> {
        self.binary_level(Self::equality, &[(TokenKind::Amp, BinOp::BitAnd)])
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.binary_level(
            Self::relational,
            &[(TokenKind::Eq, BinOp::Eq), (TokenKind::Ne, BinOp::Ne)],
        )
    }

    fn relational(&mut self) -> PResult<Expr> {
        self.binary_level(
            Self::shift,
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
        )
    }

    fn shift(&mut self) -> PResult<Expr> {
        self.binary_level(
            Self::additive,
            &[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)],
        )
    }

    fn additive(&mut self) -> PResult<Expr> {
        self.binary_level(
            Self::multiplicative,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
        )
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        self.binary_level(
            Self::unary,
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
        )
    }

    fn unary(&mut self) -> PResult<Expr> {
        let loc = self.peek().location.clone();
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Inc => Some(UnaryOp::PreInc),
            TokenKind::Dec => Some(UnaryOp::PreDec),
            TokenKind::Plus => {
                self.advance();
                return self.unary();
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Some(Expr::new(
                ExprKind::Unary { op, operand: Box::new(operand) },
                loc,
            ));
        }
        if self.check(TokenKind::KwSizeof) {
            return self.sizeof_expr(loc);
        }
        if self.check(TokenKind::LParen) && self.looks_like_cast() {
            self.advance();
            let ty = self.type_specifier_for_cast()?;
            self.expect(TokenKind::RParen, "')' after cast type")?;
            let operand = self.unary()?;
            return Some(Expr::new(
                ExprKind::Cast { target_type: ty, operand: Box::new(operand) },
                loc,
            ));
        }
        self.postfix()
    }

    fn sizeof_expr(&mut self, loc: SourceLocation) -> PResult<Expr> {
        self.advance();
        if self.check(TokenKind::LParen) && self.starts_type_specifier_at(1) {
            self.advance();
            let ty = self.type_specifier_for_cast()?;
            self.expect(TokenKind::RParen, "')' after sizeof type")?;
            return Some(Expr::new(ExprKind::Sizeof(SizeofOperand::Type(ty)), loc));
        }
        let operand = self.unary()?;
        Some(Expr::new(ExprKind::Sizeof(SizeofOperand::Expr(Box::new(operand))), loc))
    }

    fn starts_type_specifier_at(&self, offset: usize) -> bool {
        matches!(
            self.peek_at(offset).kind,
            TokenKind::KwVoid
                | TokenKind::KwChar
                | TokenKind::KwShort
                | TokenKind::KwInt
                | TokenKind::KwLong
                | TokenKind::KwFloat
                | TokenKind::KwDouble
                | TokenKind::KwStruct
                | TokenKind::KwConst
                | TokenKind::KwSigned
                | TokenKind::KwUnsigned
        )
    }

    fn looks_like_cast(&self) -> bool {
        self.starts_type_specifier_at(1)
    }

    fn type_specifier_for_cast(&mut self) -> PResult<Type> {
        let mut ty = self.type_specifier()?;
        while self.matches(TokenKind::Star) {
            ty = ty.pointer();
        }
        Some(ty)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            let loc = self.peek().location.clone();
            match self.peek().kind {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']' after index expression")?;
                    expr = Expr::new(
                        ExprKind::Index { base: Box::new(expr), index: Box::new(index) },
                        loc,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect(TokenKind::Identifier, "field name after '.'")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field: field.text().to_string(),
                            arrow: false,
                        },
                        loc,
                    );
                }
                TokenKind::Arrow => {
                    self.advance();
                    let field = self.expect(TokenKind::Identifier, "field name after '->'")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field: field.text().to_string(),
                            arrow: true,
                        },
                        loc,
                    );
                }
                TokenKind::Inc => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary { op: UnaryOp::PostInc, operand: Box::new(expr) },
                        loc,
                    );
                }
                TokenKind::Dec => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary { op: UnaryOp::PostDec, operand: Box::new(expr) },
                        loc,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                Some(Expr::new(ExprKind::IntLiteral(parse_int_literal(tok.text())), tok.location))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let v: f64 = tok.text().trim_end_matches(['f', 'F', 'l', 'L']).parse().unwrap_or(0.0);
                Some(Expr::new(ExprKind::FloatLiteral(v), tok.location))
            }
            TokenKind::CharLiteral => {
                self.advance();
                let c = tok.text().chars().next().unwrap_or('\0') as i64;
                Some(Expr::new(ExprKind::CharLiteral(c), tok.location))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Some(Expr::new(ExprKind::StringLiteral(tok.text().to_string()), tok.location))
            }
            TokenKind::Identifier => {
                self.advance();
                if self.matches(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.assignment()?);
                            if !self.matches(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')' after call arguments")?;
                    return Some(Expr::new(
                        ExprKind::Call { callee: tok.text().to_string(), args },
                        tok.location,
                    ));
                }
                Some(Expr::new(ExprKind::Ident(tok.text().to_string()), tok.location))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')' to close parenthesized expression")?;
                Some(inner)
            }
            _ => {
                self.diags.error(
                    format!("expected an expression, found '{}'", tok.lexeme),
                    tok.location,
                );
                None
            }
        }
    }
}

fn parse_int_literal(text: &str) -> i64 {
    let trimmed = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).unwrap_or(0)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        i64::from_str_radix(&trimmed[1..], 8).unwrap_or(0)
    } else {
        trimmed.parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> (TranslationUnit, Diagnostics) {
        let mut diags = Diagnostics::default();
        let tokens = Lexer::new(src, "t.c").lex_all(&mut diags);
        let tu = Parser::new(tokens, &mut diags).parse();
        (tu, diags)
    }

    #[test]
    fn parses_simple_function() {
        let (tu, diags) = parse("int main(void) { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(tu.declarations.len(), 1);
        match &tu.declarations[0] {
            ExternalDecl::Function(f) => {
                assert_eq!(f.name, "main");
                assert!(f.body.is_some());
            }
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn parses_extern_prototype() {
        let (tu, diags) = parse("extern int printf(const char* fmt, ...);");
        assert!(!diags.has_errors());
        match &tu.declarations[0] {
            ExternalDecl::Function(f) => {
                assert!(f.is_variadic);
                assert!(f.is_extern);
                assert!(f.body.is_none());
            }
            _ => panic!("expected function prototype"),
        }
    }

    #[test]
    fn parses_pointer_and_array_declarators() {
        let (tu, diags) = parse("int *p; int arr[10];");
        assert!(!diags.has_errors());
        assert_eq!(tu.declarations.len(), 2);
    }

    #[test]
    fn parses_struct_with_self_referential_pointer() {
        let (tu, diags) = parse("struct Node { int value; struct Node *next; };");
        assert!(!diags.has_errors());
        match &tu.declarations[0] {
            ExternalDecl::StructDef(s) => {
                assert_eq!(s.name, "Node");
                assert_eq!(s.members.len(), 2);
                assert!(s.members[1].ty.is_pointer());
            }
            _ => panic!("expected struct def"),
        }
    }

    #[test]
    fn operator_precedence_multiplication_binds_tighter_than_addition() {
        let (tu, diags) = parse("int main(void) { return 1 + 2 * 3; }");
        assert!(!diags.has_errors());
        let ExternalDecl::Function(f) = &tu.declarations[0] else { panic!() };
        let Statement::Return { value: Some(expr), .. } = &f.body.as_ref().unwrap().statements[0] else {
            panic!()
        };
        match &expr.kind {
            ExprKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected top-level Add, got {other:?}"),
        }
    }

    #[test]
    fn if_else_and_while_parse() {
        let (tu, diags) = parse(
            "int main(void) { int i; i = 0; while (i < 10) { if (i == 5) { break; } else { i = i + 1; } } return i; }",
        );
        assert!(!diags.has_errors());
        assert_eq!(tu.declarations.len(), 1);
    }

    #[test]
    fn for_loop_with_empty_clauses_parses() {
        let (tu, diags) = parse("int main(void) { for (;;) { break; } return 0; }");
        assert!(!diags.has_errors());
        let ExternalDecl::Function(f) = &tu.declarations[0] else { panic!() };
        assert!(matches!(
            f.body.as_ref().unwrap().statements[0],
            Statement::For { .. }
        ));
    }

    #[test]
    fn unsupported_switch_reports_diagnostic_and_recovers() {
        let (tu, diags) = parse("int main(void) { switch (1) { } return 0; } int g(void) { return 1; }");
        assert!(diags.has_errors());
        // recovery should still find the second function
        assert!(tu.declarations.iter().any(|d| matches!(d, ExternalDecl::Function(f) if f.name == "g")));
    }

    #[test]
    fn cast_expression_parses() {
        let (tu, diags) = parse("int main(void) { double d; int i; i = (int) d; return 0; }");
        assert!(!diags.has_errors());
        let ExternalDecl::Function(f) = &tu.declarations[0] else { panic!() };
        let stmt = &f.body.as_ref().unwrap().statements[2];
        match stmt {
            Statement::Expr { expr, .. } => match &expr.kind {
                ExprKind::Assign { value, .. } => {
                    assert!(matches!(value.kind, ExprKind::Cast { .. }));
                }
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn sizeof_of_type_and_expr() {
        let (tu, diags) = parse("int main(void) { int i; i = sizeof(int); i = sizeof i; return 0; }");
        assert!(!diags.has_errors());
        let ExternalDecl::Function(f) = &tu.declarations[0] else { panic!() };
        assert_eq!(f.body.as_ref().unwrap().statements.len(), 4);
    }
}
