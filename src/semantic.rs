//! Semantic analysis: name resolution, type checking, and diagnostic
//! warnings (unused variables, narrowing conversions, shadowing,
//! sign/pointer mismatches).
//!
//! Walks the AST once, writing inferred types back into each [`Expr`] node
//! (`resolved_type`) in place rather than building a side table. Every
//! problem is a
//! [`crate::diagnostics::Diagnostic`], never a hard failure: a function with
//! a type error still gets walked to completion so later stages (and the
//! user) see every mistake in one run, not one-at-a-time.

use crate::ast::*;
use crate::config::WarningSet;
use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::symbol::{is_near_miss, Scopes, Symbol, SymbolKind};
use crate::types::{BaseType, StructInfo, StructTable, Type};

pub struct Analyzer<'a> {
    scopes: Scopes,
    structs: StructTable,
    diags: &'a mut Diagnostics,
    warnings: WarningSet,
    current_function_return: Type,
    /// Nesting depth of loop bodies, so `break`/`continue` outside a loop is
    /// diagnosed rather than silently accepted.
    loop_depth: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(diags: &'a mut Diagnostics) -> Self {
        Self::with_warnings(diags, WarningSet::all())
    }

    pub fn with_warnings(diags: &'a mut Diagnostics, warnings: WarningSet) -> Self {
        Analyzer {
            scopes: Scopes::new(),
            structs: StructTable::new(),
            diags,
            warnings,
            current_function_return: Type::void(),
            loop_depth: 0,
        }
    }

    pub fn analyze(&mut self, tu: &mut TranslationUnit) {
        log::debug!("semantic: analyzing {} top-level declaration(s)", tu.declarations.len());
        self.collect_struct_defs(tu);
        self.collect_top_level_signatures(tu);
        for decl in &mut tu.declarations {
            match decl {
                ExternalDecl::Function(f) => {
                    log::trace!("semantic: checking function '{}'", f.name);
                    self.check_function(f)
                }
                ExternalDecl::Declaration(d) => self.check_global_declaration(d),
                ExternalDecl::StructDef(_) => {}
            }
        }
    }

    pub fn into_struct_table(self) -> StructTable {
        self.structs
    }

    fn collect_struct_defs(&mut self, tu: &TranslationUnit) {
        for decl in &tu.declarations {
            if let ExternalDecl::StructDef(s) = decl {
                if self.structs.contains(&s.name) {
                    self.diags.error(
                        format!("redefinition of struct '{}'", s.name),
                        s.location.clone(),
                    );
                    continue;
                }
                let members = s
                    .members
                    .iter()
                    .map(|m| crate::types::StructMember { name: m.name.clone(), ty: m.ty.clone() })
                    .collect();
                self.structs.insert(StructInfo { name: s.name.clone(), members });
            }
        }
    }

    fn collect_top_level_signatures(&mut self, tu: &TranslationUnit) {
        for decl in &tu.declarations {
            if let ExternalDecl::Function(f) = decl {
                let sym = Symbol::function(
                    f.name.clone(),
                    f.return_type.clone(),
                    f.params.iter().map(|p| p.ty.clone()).collect(),
                    f.is_variadic,
                    0,
                    f.location.clone(),
                );
                if !self.scopes.insert(sym) {
                    self.redeclare_error(&f.name, &f.location);
                }
            }
        }
    }

    fn redeclare_error(&mut self, name: &str, at: &SourceLocation) {
        self.diags.error(format!("redeclaration of '{name}'"), at.clone());
    }

    fn check_global_declaration(&mut self, decl: &mut Declaration) {
        for d in &mut decl.declarators {
            let sym = Symbol::variable(d.name.clone(), d.ty.clone(), 0, d.location.clone());
            if !self.scopes.insert(sym) {
                self.redeclare_error(&d.name, &d.location);
            }
            if let Some(init) = &mut d.init {
                let init_ty = self.check_expr(init);
                self.check_assignable(&d.ty, &init_ty, &d.location);
            }
        }
    }

    fn check_function(&mut self, f: &mut FunctionDef) {
        self.current_function_return = f.return_type.clone();
        self.scopes.enter();
        for p in &f.params {
            let sym = Symbol::variable(p.name.clone(), p.ty.clone(), self.scopes.level(), p.location.clone());
            if !self.scopes.insert(sym) {
                self.redeclare_error(&p.name, &p.location);
            }
        }
        if let Some(body) = &mut f.body {
            self.check_block(body);
        }
        self.warn_unused_in_current_scope();
        self.scopes.exit();
    }

    fn warn_unused_in_current_scope(&mut self) {
        if !self.warnings.unused_variable {
            return;
        }
        let unused: Vec<(String, SourceLocation)> = self
            .scopes
            .unused_in_current_scope()
            .into_iter()
            .map(|s| (s.name.clone(), s.declared_at.clone()))
            .collect();
        for (name, at) in unused {
            self.diags.warning(format!("unused variable '{name}'"), at);
        }
    }

    fn check_block(&mut self, block: &mut Block) {
        for stmt in &mut block.statements {
            self.check_statement(stmt);
        }
    }

    fn check_statement(&mut self, stmt: &mut Statement) {
        match stmt {
            Statement::Expr { expr, .. } => {
                self.check_expr(expr);
            }
            Statement::Declaration(decl) => self.check_local_declaration(decl),
            Statement::Block(b) => {
                self.scopes.enter();
                self.check_block(b);
                self.warn_unused_in_current_scope();
                self.scopes.exit();
            }
            Statement::If { condition, then_branch, else_branch, .. } => {
                self.check_expr(condition);
                self.check_statement(then_branch);
                if let Some(e) = else_branch {
                    self.check_statement(e);
                }
            }
            Statement::While { condition, body, .. } => {
                self.check_expr(condition);
                self.loop_depth += 1;
                self.check_statement(body);
                self.loop_depth -= 1;
            }
            Statement::For { init, condition, step, body, .. } => {
                self.scopes.enter();
                if let Some(init) = init {
                    self.check_statement(init);
                }
                if let Some(cond) = condition {
                    self.check_expr(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.loop_depth += 1;
                self.check_statement(body);
                self.loop_depth -= 1;
                self.warn_unused_in_current_scope();
                self.scopes.exit();
            }
            Statement::Return { value, location } => {
                let expected = self.current_function_return.clone();
                if let Some(v) = value {
                    let ty = self.check_expr(v);
                    if expected.is_void() {
                        self.diags.error(
                            "returning a value from a function returning void".to_string(),
                            location.clone(),
                        );
                    } else {
                        self.check_assignable(&expected, &ty, location);
                    }
                } else if !expected.is_void() {
                    self.diags.error(
                        format!("non-void function must return a value of type '{expected}'"),
                        location.clone(),
                    );
                }
            }
            Statement::Break { location } => {
                if self.loop_depth == 0 {
                    self.diags.error("'break' outside of a loop".to_string(), location.clone());
                }
            }
            Statement::Continue { location } => {
                if self.loop_depth == 0 {
                    self.diags.error("'continue' outside of a loop".to_string(), location.clone());
                }
            }
            Statement::Empty { .. } => {}
        }
    }

    fn check_local_declaration(&mut self, decl: &mut Declaration) {
        for d in &mut decl.declarators {
            if self.scopes.exists_in_current_scope(&d.name) {
                self.redeclare_error(&d.name, &d.location);
            } else {
                if let Some(existing) = self.scopes.lookup(&d.name) {
                    if existing.scope_level < self.scopes.level() && self.warnings.shadow {
                        self.diags.warning(
                            format!("declaration of '{}' shadows an outer variable", d.name),
                            d.location.clone(),
                        );
                    }
                }
                let sym = Symbol::variable(d.name.clone(), d.ty.clone(), self.scopes.level(), d.location.clone());
                self.scopes.insert(sym);
            }
            if let Some(init) = &mut d.init {
                let init_ty = self.check_expr(init);
                self.check_assignable(&d.ty, &init_ty, &d.location);
            }
        }
    }

    fn check_assignable(&mut self, target: &Type, value: &Type, at: &SourceLocation) {
        if value.is_void() {
            return; // already diagnosed at the expression site
        }
        if !value.assignable_to(target, &self.structs) {
            self.diags.error(
                format!("cannot assign value of type '{value}' to target of type '{target}'"),
                at.clone(),
            );
            return;
        }
        if self.warnings.narrowing && value.is_narrowing_conversion_to(target) {
            self.diags.warning(
                format!("implicit conversion from '{value}' to '{target}' may lose precision"),
                at.clone(),
            );
        }
    }

    /// Checks an expression, writes its resolved type into the node, and
    /// returns that type for the caller's own checks.
    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let ty = self.infer_expr(expr);
        expr.resolved_type = Some(ty.clone());
        ty
    }

    fn infer_expr(&mut self, expr: &mut Expr) -> Type {
        let loc = expr.location.clone();
        match &mut expr.kind {
            ExprKind::IntLiteral(_) => Type::int(),
            ExprKind::FloatLiteral(_) => Type::scalar(BaseType::Double),
            ExprKind::CharLiteral(_) => Type::char(),
            ExprKind::StringLiteral(_) => Type::char().pointer(),
            ExprKind::Ident(name) => self.resolve_ident(name, &loc),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs, &loc),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, &loc),
            ExprKind::Assign { op, target, value } => self.check_assign(*op, target, value, &loc),
            ExprKind::Conditional { condition, then_expr, else_expr } => {
                self.check_expr(condition);
                let t = self.check_expr(then_expr);
                let e = self.check_expr(else_expr);
                if !t.equals(&e) && !(t.is_arithmetic() && e.is_arithmetic()) {
                    self.diags.error(
                        format!("conditional operator branches have incompatible types '{t}' and '{e}'"),
                        loc,
                    );
                }
                t
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, &loc),
            ExprKind::Index { base, index } => self.check_index(base, index, &loc),
            ExprKind::Member { base, field, arrow } => self.check_member(base, field, *arrow, &loc),
            ExprKind::Cast { target_type, operand } => {
                self.check_expr(operand);
                target_type.clone()
            }
            ExprKind::Sizeof(operand) => {
                match operand {
                    SizeofOperand::Type(_) => {}
                    SizeofOperand::Expr(e) => {
                        self.check_expr(e);
                    }
                }
                Type::scalar(BaseType::Long)
            }
            ExprKind::Comma(items) => {
                let mut last = Type::void();
                for item in items {
                    last = self.check_expr(item);
                }
                last
            }
        }
    }

    fn resolve_ident(&mut self, name: &str, loc: &SourceLocation) -> Type {
        if let Some(sym) = self.scopes.lookup_mut(name) {
            sym.used = true;
            return sym.ty.clone();
        }
        let mut diag = crate::diagnostics::Diagnostic::error(
            format!("use of undeclared identifier '{name}'"),
            loc.clone(),
        );
        if let Some(candidate) = self.scopes.all_names().into_iter().find(|n| is_near_miss(n, name)) {
            diag = diag.with_note(format!("did you mean '{candidate}'?"), loc.clone());
        }
        self.diags.push(diag);
        Type::void()
    }

    fn check_binary(&mut self, op: BinOp, lhs: &mut Expr, rhs: &mut Expr, loc: &SourceLocation) -> Type {
        let lt = self.check_expr(lhs).decayed();
        let rt = self.check_expr(rhs).decayed();

        match op {
            BinOp::LogAnd | BinOp::LogOr => {
                self.require_scalar(&lt, &lhs.location);
                self.require_scalar(&rt, &rhs.location);
                return Type::int();
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if self.warnings.sign_compare
                    && lt.is_pointer()
                    && rt.is_pointer()
                    && !lt.equals(&rt)
                    && !lt.is_void_pointer()
                    && !rt.is_void_pointer()
                {
                    self.diags.warning(
                        format!("comparison of distinct pointer types '{lt}' and '{rt}'"),
                        loc.clone(),
                    );
                }
                return Type::int();
            }
            _ => {}
        }

        if matches!(op, BinOp::Add | BinOp::Sub) && (lt.is_pointer() || rt.is_pointer()) {
            return self.check_pointer_arith(op, &lt, &rt, loc);
        }

        if !lt.is_arithmetic() || !rt.is_arithmetic() {
            self.diags.error(
                format!("invalid operands of type '{lt}' and '{rt}' to binary operator"),
                loc.clone(),
            );
            return Type::int();
        }
        usual_arithmetic_conversion(&lt, &rt)
    }

    fn check_pointer_arith(&mut self, op: BinOp, lt: &Type, rt: &Type, loc: &SourceLocation) -> Type {
        match (lt.is_pointer(), rt.is_pointer()) {
            (true, false) if rt.is_integral() => lt.clone(),
            (false, true) if op == BinOp::Add && lt.is_integral() => rt.clone(),
            (true, true) if op == BinOp::Sub => {
                if !lt.equals(rt) {
                    self.diags.error(
                        format!("subtracting pointers of different types '{lt}' and '{rt}'"),
                        loc.clone(),
                    );
                }
                Type::scalar(BaseType::Long)
            }
            _ => {
                self.diags.error(
                    format!("invalid pointer arithmetic between '{lt}' and '{rt}'"),
                    loc.clone(),
                );
                lt.clone()
            }
        }
    }

    fn require_scalar(&mut self, ty: &Type, loc: &SourceLocation) {
        if !ty.is_arithmetic() && !ty.is_pointer() {
            self.diags.error(format!("expression of type '{ty}' is not a scalar"), loc.clone());
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &mut Expr, loc: &SourceLocation) -> Type {
        let ty = self.check_expr(operand);
        match op {
            UnaryOp::Deref => match ty.decayed().dereferenced() {
                Some(t) => t,
                None => {
                    self.diags.error(format!("cannot dereference non-pointer type '{ty}'"), loc.clone());
                    Type::void()
                }
            },
            UnaryOp::AddrOf => {
                if !is_lvalue(operand) {
                    self.diags.error("cannot take the address of a non-lvalue".to_string(), loc.clone());
                }
                ty.pointer()
            }
            UnaryOp::Neg | UnaryOp::BitNot => {
                if !ty.is_arithmetic() {
                    self.diags.error(format!("invalid operand of type '{ty}' to unary operator"), loc.clone());
                }
                ty
            }
            UnaryOp::Not => Type::int(),
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                if !is_lvalue(operand) {
                    self.diags.error("increment/decrement requires an lvalue".to_string(), loc.clone());
                }
                ty
            }
        }
    }

    fn check_assign(&mut self, op: AssignOp, target: &mut Expr, value: &mut Expr, loc: &SourceLocation) -> Type {
        let tt = self.check_expr(target);
        let vt = self.check_expr(value);
        if !is_lvalue(target) {
            self.diags.error("assignment target is not an lvalue".to_string(), loc.clone());
        }
        if op == AssignOp::Assign {
            self.check_assignable(&tt, &vt, loc);
        } else if !tt.is_arithmetic() && !(tt.is_pointer() && matches!(op, AssignOp::AddAssign | AssignOp::SubAssign)) {
            self.diags.error(format!("invalid compound assignment to type '{tt}'"), loc.clone());
        }
        tt
    }

    fn check_call(&mut self, callee: &str, args: &mut [Expr], loc: &SourceLocation) -> Type {
        let Some(sym) = self.scopes.lookup(callee).cloned() else {
            let mut diag = crate::diagnostics::Diagnostic::error(
                format!("call to undeclared function '{callee}'"),
                loc.clone(),
            );
            if let Some(candidate) = self.scopes.all_names().into_iter().find(|n| is_near_miss(n, callee)) {
                diag = diag.with_note(format!("did you mean '{candidate}'?"), loc.clone());
            }
            self.diags.push(diag);
            for a in args {
                self.check_expr(a);
            }
            return Type::int();
        };
        if sym.kind != SymbolKind::Function {
            self.diags.error(format!("'{callee}' is not a function"), loc.clone());
        }
        let min_args = sym.parameter_types.len();
        if args.len() < min_args || (args.len() > min_args && !sym.is_variadic) {
            self.diags.error(
                format!(
                    "function '{callee}' expects {min_args} argument{}, got {}",
                    if min_args == 1 { "" } else { "s" },
                    args.len()
                ),
                loc.clone(),
            );
        }
        for (i, arg) in args.iter_mut().enumerate() {
            let at = self.check_expr(arg);
            if let Some(expected) = sym.parameter_types.get(i) {
                self.check_assignable(expected, &at, &arg.location);
            }
        }
        sym.ty
    }

    fn check_index(&mut self, base: &mut Expr, index: &mut Expr, loc: &SourceLocation) -> Type {
        let bt = self.check_expr(base).decayed();
        let it = self.check_expr(index);
        if !it.is_integral() {
            self.diags.error(format!("array subscript is not an integer: '{it}'"), loc.clone());
        }
        match bt.dereferenced() {
            Some(t) => t,
            None => {
                self.diags.error(format!("subscripted value of type '{bt}' is not a pointer"), loc.clone());
                Type::void()
            }
        }
    }

    fn check_member(&mut self, base: &mut Expr, field: &str, arrow: bool, loc: &SourceLocation) -> Type {
        let bt = self.check_expr(base).decayed();
        let struct_ty = if arrow {
            match bt.dereferenced() {
                Some(t) => t,
                None => {
                    self.diags.error(format!("member reference with '->' on non-pointer type '{bt}'"), loc.clone());
                    return Type::void();
                }
            }
        } else {
            bt
        };
        let Some(name) = struct_ty.struct_name() else {
            self.diags.error(format!("member reference base type '{struct_ty}' is not a struct"), loc.clone());
            return Type::void();
        };
        let Some(info) = self.structs.get(name) else {
            self.diags.error(format!("undefined struct '{name}'"), loc.clone());
            return Type::void();
        };
        match info.member_type(field) {
            Some(ty) => ty.clone(),
            None => {
                self.diags.error(format!("struct '{name}' has no member named '{field}'"), loc.clone());
                Type::void()
            }
        }
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Ident(_) | ExprKind::Unary { op: UnaryOp::Deref, .. } | ExprKind::Index { .. } | ExprKind::Member { .. }
    )
}

/// The C89 usual arithmetic conversions: promote to the wider/higher-rank
/// operand type, with float/double dominating over any integer type.
pub(crate) fn usual_arithmetic_conversion(a: &Type, b: &Type) -> Type {
    if a.is_floating() || b.is_floating() {
        if a.base == BaseType::Double || b.base == BaseType::Double {
            return Type::scalar(BaseType::Double);
        }
        return Type::scalar(BaseType::Float);
    }
    if crate::types::integer_rank(&a.base) >= crate::types::integer_rank(&b.base) {
        a.clone()
    } else {
        b.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze(src: &str) -> Diagnostics {
        let mut diags = Diagnostics::default();
        let tokens = Lexer::new(src, "t.c").lex_all(&mut diags);
        let mut tu = Parser::new(tokens, &mut diags).parse();
        Analyzer::new(&mut diags).analyze(&mut tu);
        diags
    }

    #[test]
    fn undeclared_identifier_reports_error_with_suggestion() {
        let diags = analyze("int main(void) { int count; count = 1; retrun count; }");
        // 'retrun' isn't a keyword so it's parsed as a call to an undeclared function
        assert!(diags.has_errors());
    }

    #[test]
    fn near_miss_produces_did_you_mean_note() {
        let diags = analyze("int main(void) { int count; coutn = 1; return count; }");
        assert!(diags.has_errors());
        let found = diags.iter().any(|d| d.notes.iter().any(|n| n.message.contains("did you mean")));
        assert!(found);
    }

    #[test]
    fn unused_variable_warns() {
        let diags = analyze("int main(void) { int unused; return 0; }");
        assert!(diags.iter().any(|d| d.message.contains("unused variable")));
    }

    #[test]
    fn shadowing_inner_scope_warns() {
        let diags = analyze("int main(void) { int x; { int x; x = 1; } return x; }");
        assert!(diags.iter().any(|d| d.message.contains("shadows")));
    }

    #[test]
    fn narrowing_double_to_int_warns() {
        let diags = analyze("int main(void) { int i; double d; d = 3.5; i = d; return i; }");
        assert!(diags.iter().any(|d| d.message.contains("lose precision")));
    }

    #[test]
    fn disabled_warning_category_is_suppressed() {
        let src = "int main(void) { int unused; return 0; }";
        let mut diags = Diagnostics::default();
        let tokens = Lexer::new(src, "t.c").lex_all(&mut diags);
        let mut tu = Parser::new(tokens, &mut diags).parse();
        let mut warnings = WarningSet::all();
        warnings.disable("unused-variable");
        Analyzer::with_warnings(&mut diags, warnings).analyze(&mut tu);
        assert!(!diags.iter().any(|d| d.message.contains("unused variable")));
    }

    #[test]
    fn break_outside_loop_is_error() {
        let diags = analyze("int main(void) { break; return 0; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn struct_member_access_resolves_type() {
        let diags = analyze(
            "struct P { int x; int y; }; int main(void) { struct P p; p.x = 1; return p.x; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn self_referential_struct_pointer_member_resolves() {
        let diags = analyze(
            "struct Node { int value; struct Node *next; }; \
             int main(void) { struct Node n; n.next = 0; return n.value; }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn call_with_wrong_argument_count_errors() {
        let diags = analyze("int f(int a) { return a; } int main(void) { return f(1, 2); }");
        assert!(diags.has_errors());
    }

    #[test]
    fn return_type_mismatch_void_function_errors() {
        let diags = analyze("void f(void) { return 1; }");
        assert!(diags.has_errors());
    }
}
