//! Lowers a type-checked AST into the three-address IR.
//!
//! Every local variable becomes an `alloca` in the function's entry block;
//! reads and writes go through `load`/`store`. This sidesteps full SSA
//! construction (no phi placement) at the cost of a few extra
//! load/store pairs the optimizer's DCE/CSE passes clean up later.

use crate::ast::*;
use crate::diagnostics::SourceLocation;
use crate::ir::*;
use crate::semantic::usual_arithmetic_conversion;
use crate::types::{BaseType, StructTable, Type};
use std::collections::HashMap;

pub struct IrGen<'a> {
    structs: &'a StructTable,
    module: Module,
    temp_counter: usize,
    label_counter: usize,
    string_counter: usize,
    /// Scope stack of variable name -> (address operand, element type).
    vars: Vec<HashMap<String, (Operand, Type)>>,
    /// File-scope variable names visible to every function, for identifiers
    /// that don't resolve in `vars`.
    globals: HashMap<String, Type>,
    /// `(break_target, continue_target)` for the innermost enclosing loop.
    loop_targets: Vec<(String, String)>,
    blocks: Vec<BasicBlock>,
    entry_label: String,
    current: String,
    current_return_type: Type,
}

impl<'a> IrGen<'a> {
    pub fn new(structs: &'a StructTable) -> Self {
        IrGen {
            structs,
            module: Module::new(),
            temp_counter: 0,
            label_counter: 0,
            string_counter: 0,
            vars: vec![HashMap::new()],
            globals: HashMap::new(),
            loop_targets: Vec::new(),
            blocks: Vec::new(),
            entry_label: String::new(),
            current: String::new(),
            current_return_type: Type::void(),
        }
    }

    pub fn generate(mut self, tu: &TranslationUnit) -> Module {
        log::debug!("ir_gen: lowering {} top-level declaration(s)", tu.declarations.len());
        for decl in &tu.declarations {
            if let ExternalDecl::Declaration(d) = decl {
                for declarator in &d.declarators {
                    self.globals.insert(declarator.name.clone(), declarator.ty.clone());
                }
            }
        }
        for decl in &tu.declarations {
            match decl {
                ExternalDecl::Function(f) => {
                    log::trace!("ir_gen: lowering function '{}'", f.name);
                    self.gen_function(f)
                }
                ExternalDecl::Declaration(d) if !d.is_extern => self.gen_global(d),
                ExternalDecl::Declaration(_) | ExternalDecl::StructDef(_) => {}
            }
        }
        self.module
    }

    /// Lowers a file-scope variable declaration. Only constant-literal
    /// initializers are evaluated at compile time; anything else is
    /// zero-initialized (this subset has no static initializer evaluator
    /// for arbitrary expressions).
    fn gen_global(&mut self, decl: &Declaration) {
        for d in &decl.declarators {
            let init = match &d.init {
                Some(Expr { kind: ExprKind::IntLiteral(v), .. }) => Some(Constant::Int(*v)),
                Some(Expr { kind: ExprKind::CharLiteral(v), .. }) => Some(Constant::Int(*v)),
                Some(Expr { kind: ExprKind::FloatLiteral(v), .. }) => Some(Constant::Float(*v)),
                _ => None,
            };
            self.module.globals.push(GlobalVar { name: d.name.clone(), ty: d.ty.clone(), init });
        }
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn fresh_label(&mut self, hint: &str) -> String {
        let name = format!("{hint}.{}", self.label_counter);
        self.label_counter += 1;
        name
    }

    fn intern_string(&mut self, value: &str) -> String {
        if let Some(existing) = self.module.strings.iter().find(|s| s.value == value) {
            return existing.label.clone();
        }
        let label = format!(".Lstr{}", self.string_counter);
        self.string_counter += 1;
        self.module.strings.push(StringLiteral { label: label.clone(), value: value.to_string() });
        label
    }

    fn emit(&mut self, dest: Option<String>, kind: InstKind, location: SourceLocation) -> Operand {
        let inst = Instruction { dest, kind, location };
        let ty = inst.ty();
        let result = inst.dest.clone().map(|d| Operand::Value(d, ty));
        self.current_block_mut().instructions.push(inst);
        result.unwrap_or(Operand::Const(Constant::Int(0), Type::void()))
    }

    fn current_block_mut(&mut self) -> &mut BasicBlock {
        let label = self.current.clone();
        self.blocks.iter_mut().find(|b| b.label == label).expect("current block always exists")
    }

    fn start_block(&mut self, label: String) {
        self.blocks.push(BasicBlock::new(label.clone()));
        self.current = label;
    }

    fn terminate(&mut self, term: Terminator) {
        if self.current_block_mut().is_terminated() {
            return; // already terminated by an earlier return/break/continue
        }
        self.current_block_mut().terminator = term;
    }

    fn gen_function(&mut self, f: &FunctionDef) {
        let Some(body) = &f.body else {
            self.module.functions.push(IrFunction {
                name: f.name.clone(),
                return_type: f.return_type.clone(),
                params: f.params.iter().map(|p| IrParam { name: p.name.clone(), ty: p.ty.clone() }).collect(),
                is_variadic: f.is_variadic,
                blocks: Vec::new(),
            });
            return;
        };

        self.blocks = Vec::new();
        self.temp_counter = 0;
        self.label_counter = 0;
        self.vars = vec![HashMap::new()];
        self.current_return_type = f.return_type.clone();
        self.entry_label = "entry".to_string();
        self.start_block(self.entry_label.clone());

        for p in &f.params {
            let addr = self.emit(Some(self.fresh_temp()), InstKind::Alloca { ty: p.ty.clone() }, p.location.clone());
            self.emit(
                None,
                InstKind::Store { ty: p.ty.clone(), address: addr.clone(), value: Operand::Value(p.name.clone(), p.ty.clone()) },
                p.location.clone(),
            );
            self.vars.last_mut().unwrap().insert(p.name.clone(), (addr, p.ty.clone()));
        }

        self.gen_block(body);

        if !self.current_block_mut().is_terminated() {
            let value = if f.return_type.is_void() { None } else { Some(Operand::Const(Constant::Int(0), f.return_type.clone())) };
            self.terminate(Terminator::Return { value });
        }

        self.module.functions.push(IrFunction {
            name: f.name.clone(),
            return_type: f.return_type.clone(),
            params: f.params.iter().map(|p| IrParam { name: p.name.clone(), ty: p.ty.clone() }).collect(),
            is_variadic: f.is_variadic,
            blocks: std::mem::take(&mut self.blocks),
        });
    }

    fn gen_block(&mut self, block: &Block) {
        self.vars.push(HashMap::new());
        for stmt in &block.statements {
            self.gen_stmt(stmt);
        }
        self.vars.pop();
    }

    fn declare_local(&mut self, decl: &Declaration) {
        for d in &decl.declarators {
            let addr = self.emit(Some(self.fresh_temp()), InstKind::Alloca { ty: d.ty.clone() }, d.location.clone());
            if let Some(init) = &d.init {
                let value = self.gen_expr(init);
                self.emit(None, InstKind::Store { ty: d.ty.clone(), address: addr.clone(), value }, d.location.clone());
            }
            self.vars.last_mut().unwrap().insert(d.name.clone(), (addr, d.ty.clone()));
        }
    }

    fn lookup_var(&self, name: &str) -> Option<&(Operand, Type)> {
        self.vars.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Resolves an identifier to its storage address, checking locals
    /// (innermost scope first) before falling back to file-scope globals.
    fn resolve_ident_addr(&self, name: &str) -> Option<(Operand, Type)> {
        if let Some(local) = self.lookup_var(name) {
            return Some(local.clone());
        }
        let ty = self.globals.get(name)?.clone();
        Some((Operand::GlobalAddr(name.to_string(), ty.clone()), ty))
    }

    fn gen_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expr { expr, .. } => {
                self.gen_expr(expr);
            }
            Statement::Declaration(decl) => self.declare_local(decl),
            Statement::Block(b) => self.gen_block(b),
            Statement::If { condition, then_branch, else_branch, location } => {
                let cond = self.gen_expr(condition);
                let then_label = self.fresh_label("if.then");
                let end_label = self.fresh_label("if.end");
                let else_label = if else_branch.is_some() { self.fresh_label("if.else") } else { end_label.clone() };
                self.terminate(Terminator::CondBranch {
                    cond,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });

                self.start_block(then_label);
                self.gen_stmt(then_branch);
                self.terminate(Terminator::Branch { target: end_label.clone() });

                if let Some(else_stmt) = else_branch {
                    self.start_block(else_label);
                    self.gen_stmt(else_stmt);
                    self.terminate(Terminator::Branch { target: end_label.clone() });
                }

                self.start_block(end_label);
                let _ = location;
            }
            Statement::While { condition, body, .. } => {
                let cond_label = self.fresh_label("while.cond");
                let body_label = self.fresh_label("while.body");
                let end_label = self.fresh_label("while.end");

                self.terminate(Terminator::Branch { target: cond_label.clone() });
                self.start_block(cond_label.clone());
                let cond = self.gen_expr(condition);
                self.terminate(Terminator::CondBranch { cond, then_label: body_label.clone(), else_label: end_label.clone() });

                self.start_block(body_label);
                self.loop_targets.push((end_label.clone(), cond_label.clone()));
                self.gen_stmt(body);
                self.loop_targets.pop();
                self.terminate(Terminator::Branch { target: cond_label });

                self.start_block(end_label);
            }
            Statement::For { init, condition, step, body, .. } => {
                self.vars.push(HashMap::new());
                if let Some(init) = init {
                    self.gen_stmt(init);
                }

                let cond_label = self.fresh_label("for.cond");
                let body_label = self.fresh_label("for.body");
                let end_label = self.fresh_label("for.end");
                let step_label = self.fresh_label("for.step");

                self.terminate(Terminator::Branch { target: cond_label.clone() });
                self.start_block(cond_label.clone());
                let cond = match condition {
                    Some(c) => self.gen_expr(c),
                    None => Operand::Const(Constant::Int(1), Type::int()),
                };
                self.terminate(Terminator::CondBranch { cond, then_label: body_label.clone(), else_label: end_label.clone() });

                self.start_block(body_label);
                self.loop_targets.push((end_label.clone(), step_label.clone()));
                self.gen_stmt(body);
                self.loop_targets.pop();
                self.terminate(Terminator::Branch { target: step_label.clone() });

                self.start_block(step_label);
                if let Some(step) = step {
                    self.gen_expr(step);
                }
                self.terminate(Terminator::Branch { target: cond_label });

                self.start_block(end_label);
                self.vars.pop();
            }
            Statement::Return { value, location } => {
                let operand = value.as_ref().map(|v| {
                    let v = self.gen_expr(v);
                    self.coerce(v, &self.current_return_type.clone(), location.clone())
                });
                self.terminate(Terminator::Return { value: operand });
            }
            Statement::Break { .. } => {
                if let Some((break_target, _)) = self.loop_targets.last().cloned() {
                    self.terminate(Terminator::Branch { target: break_target });
                }
            }
            Statement::Continue { .. } => {
                if let Some((_, continue_target)) = self.loop_targets.last().cloned() {
                    self.terminate(Terminator::Branch { target: continue_target });
                }
            }
            Statement::Empty { .. } => {}
        }
    }

    /// Lowers an expression to the operand that represents its value.
    fn gen_expr(&mut self, expr: &Expr) -> Operand {
        let loc = expr.location.clone();
        let ty = expr.resolved_type.clone().unwrap_or_else(Type::void);
        match &expr.kind {
            ExprKind::IntLiteral(v) => Operand::Const(Constant::Int(*v), ty),
            ExprKind::CharLiteral(v) => Operand::Const(Constant::Int(*v), ty),
            ExprKind::FloatLiteral(v) => Operand::Const(Constant::Float(*v), ty),
            ExprKind::StringLiteral(s) => Operand::StringLit(self.intern_string(s)),
            ExprKind::Ident(name) => {
                let Some((addr, var_ty)) = self.resolve_ident_addr(name) else {
                    return Operand::Const(Constant::Int(0), ty);
                };
                if var_ty.is_array {
                    // An array name decays to the address of its storage;
                    // the alloca's own pointer type already reflects that
                    // (see `Type::pointer`'s array-decay rule).
                    addr
                } else {
                    self.emit(Some(self.fresh_temp()), InstKind::Load { ty: var_ty, address: addr }, loc)
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs, ty, loc),
            ExprKind::Unary { op, operand } => self.gen_unary(*op, operand, ty, loc),
            ExprKind::Assign { op, target, value } => self.gen_assign(*op, target, value, ty, loc),
            ExprKind::Conditional { condition, then_expr, else_expr } => self.gen_conditional(condition, then_expr, else_expr, ty, loc),
            ExprKind::Call { callee, args } => {
                let arg_operands: Vec<Operand> = args.iter().map(|a| self.gen_expr(a)).collect();
                self.emit(Some(self.fresh_temp()), InstKind::Call { callee: callee.clone(), args: arg_operands, ty }, loc)
            }
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                let addr = self.gen_lvalue_addr(expr);
                self.emit(Some(self.fresh_temp()), InstKind::Load { ty, address: addr }, loc)
            }
            ExprKind::Cast { target_type, operand } => {
                let value = self.gen_expr(operand);
                let from = operand.resolved_type.clone().unwrap_or_else(Type::void);
                if from == *target_type {
                    value
                } else {
                    self.emit(Some(self.fresh_temp()), InstKind::Convert { from, to: target_type.clone(), value }, loc)
                }
            }
            ExprKind::Sizeof(operand) => {
                let size = match operand {
                    SizeofOperand::Type(t) => t.size_in_bytes(self.structs),
                    SizeofOperand::Expr(e) => e.resolved_type.clone().unwrap_or_else(Type::void).size_in_bytes(self.structs),
                };
                Operand::Const(Constant::Int(size as i64), Type::scalar(BaseType::Long))
            }
            ExprKind::Comma(items) => {
                let mut last = Operand::Const(Constant::Int(0), Type::void());
                for item in items {
                    last = self.gen_expr(item);
                }
                last
            }
        }
    }

    /// Lowers an expression used as an lvalue, returning the address of its
    /// storage rather than its value (used by `&`, assignment targets, and
    /// indexing/member chains).
    fn gen_lvalue_addr(&mut self, expr: &Expr) -> Operand {
        let loc = expr.location.clone();
        match &expr.kind {
            ExprKind::Ident(name) => self.resolve_ident_addr(name).map(|(addr, _)| addr).unwrap_or(Operand::Const(Constant::Int(0), Type::void())),
            ExprKind::Unary { op: UnaryOp::Deref, operand } => self.gen_expr(operand),
            ExprKind::Index { base, index } => {
                let base_addr = self.gen_expr(base); // arrays/pointers decay to their element address
                let idx = self.gen_expr(index);
                let elem_ty = expr.resolved_type.clone().unwrap_or_else(Type::void);
                let elem_size = elem_ty.size_in_bytes(self.structs) as i64;
                let scaled = self.emit(
                    Some(self.fresh_temp()),
                    InstKind::Arith {
                        op: ArithOp::Mul,
                        ty: Type::scalar(BaseType::Long),
                        lhs: idx,
                        rhs: Operand::Const(Constant::Int(elem_size), Type::scalar(BaseType::Long)),
                    },
                    loc.clone(),
                );
                self.emit(Some(self.fresh_temp()), InstKind::AddrOf { base: base_addr, offset: scaled }, loc)
            }
            ExprKind::Member { base, field, arrow } => {
                let base_addr = if *arrow { self.gen_expr(base) } else { self.gen_lvalue_addr(base) };
                let base_ty = if *arrow {
                    base.resolved_type.clone().unwrap_or_else(Type::void).dereferenced().unwrap_or_else(Type::void)
                } else {
                    base.resolved_type.clone().unwrap_or_else(Type::void)
                };
                let offset = base_ty
                    .struct_name()
                    .and_then(|n| self.structs.get(n))
                    .and_then(|info| info.member_offset(field, self.structs))
                    .unwrap_or(0) as i64;
                self.emit(
                    Some(self.fresh_temp()),
                    InstKind::AddrOf { base: base_addr, offset: Operand::Const(Constant::Int(offset), Type::scalar(BaseType::Long)) },
                    loc,
                )
            }
            _ => self.gen_expr(expr), // should not happen for a well-formed lvalue
        }
    }

    /// Emits a `Convert` from `value`'s own type to `target` when they
    /// differ, otherwise returns `value` unchanged. Keeps codegen from ever
    /// reinterpreting an integer slot as a float (or vice versa) because two
    /// operands of a binary op were lowered at their original, unconverted
    /// types.
    fn coerce(&mut self, value: Operand, target: &Type, loc: SourceLocation) -> Operand {
        let from = value.ty();
        if from == *target {
            return value;
        }
        self.emit(Some(self.fresh_temp()), InstKind::Convert { from, to: target.clone(), value }, loc)
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, ty: Type, loc: SourceLocation) -> Operand {
        if op == BinOp::LogAnd || op == BinOp::LogOr {
            return self.gen_short_circuit(op, lhs, rhs, loc);
        }

        let lhs_ty = lhs.resolved_type.clone().unwrap_or_else(Type::void).decayed();
        let rhs_ty = rhs.resolved_type.clone().unwrap_or_else(Type::void).decayed();
        let l = self.gen_expr(lhs);
        let r = self.gen_expr(rhs);

        if matches!(op, BinOp::Add | BinOp::Sub) && (lhs_ty.is_pointer() || rhs_ty.is_pointer()) {
            return self.gen_pointer_arith(op, l, lhs_ty, r, rhs_ty, loc);
        }

        if let Some(cmp) = compare_op(op) {
            if lhs_ty.is_pointer() || rhs_ty.is_pointer() {
                return self.emit(Some(self.fresh_temp()), InstKind::Compare { op: cmp, ty: lhs_ty, lhs: l, rhs: r }, loc);
            }
            let common = usual_arithmetic_conversion(&lhs_ty, &rhs_ty);
            let l = self.coerce(l, &common, loc.clone());
            let r = self.coerce(r, &common, loc.clone());
            return self.emit(Some(self.fresh_temp()), InstKind::Compare { op: cmp, ty: common, lhs: l, rhs: r }, loc);
        }

        let arith = arith_op(op).expect("non-comparison binary op maps to an arithmetic opcode");
        let l = self.coerce(l, &ty, loc.clone());
        let r = self.coerce(r, &ty, loc.clone());
        self.emit(Some(self.fresh_temp()), InstKind::Arith { op: arith, ty, lhs: l, rhs: r }, loc)
    }

    fn gen_pointer_arith(&mut self, op: BinOp, l: Operand, lty: Type, r: Operand, rty: Type, loc: SourceLocation) -> Operand {
        if lty.is_pointer() && rty.is_pointer() {
            // pointer - pointer: byte difference divided by element size
            let diff = self.emit(
                Some(self.fresh_temp()),
                InstKind::Arith { op: ArithOp::Sub, ty: Type::scalar(BaseType::Long), lhs: l, rhs: r },
                loc.clone(),
            );
            let elem_size = lty.dereferenced().unwrap_or_else(Type::void).size_in_bytes(self.structs).max(1) as i64;
            return self.emit(
                Some(self.fresh_temp()),
                InstKind::Arith {
                    op: ArithOp::Div,
                    ty: Type::scalar(BaseType::Long),
                    lhs: diff,
                    rhs: Operand::Const(Constant::Int(elem_size), Type::scalar(BaseType::Long)),
                },
                loc,
            );
        }
        let (ptr, ptr_ty, int_val) = if lty.is_pointer() { (l, lty, r) } else { (r, rty, l) };
        let elem_size = ptr_ty.dereferenced().unwrap_or_else(Type::void).size_in_bytes(self.structs).max(1) as i64;
        let scaled = self.emit(
            Some(self.fresh_temp()),
            InstKind::Arith {
                op: ArithOp::Mul,
                ty: Type::scalar(BaseType::Long),
                lhs: int_val,
                rhs: Operand::Const(Constant::Int(elem_size), Type::scalar(BaseType::Long)),
            },
            loc.clone(),
        );
        let signed_offset = if op == BinOp::Sub {
            self.emit(
                Some(self.fresh_temp()),
                InstKind::Neg { ty: Type::scalar(BaseType::Long), operand: scaled },
                loc.clone(),
            )
        } else {
            scaled
        };
        self.emit(Some(self.fresh_temp()), InstKind::AddrOf { base: ptr, offset: signed_offset }, loc)
    }

    fn gen_short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, loc: SourceLocation) -> Operand {
        let result_addr = self.emit(Some(self.fresh_temp()), InstKind::Alloca { ty: Type::int() }, loc.clone());
        let l = self.gen_expr(lhs);

        let rhs_label = self.fresh_label("logic.rhs");
        let short_label = self.fresh_label("logic.short");
        let end_label = self.fresh_label("logic.end");

        if op == BinOp::LogAnd {
            self.terminate(Terminator::CondBranch { cond: l, then_label: rhs_label.clone(), else_label: short_label.clone() });
        } else {
            self.terminate(Terminator::CondBranch { cond: l, then_label: short_label.clone(), else_label: rhs_label.clone() });
        }

        self.start_block(rhs_label);
        let r = self.gen_expr(rhs);
        let normalized = self.emit(
            Some(self.fresh_temp()),
            InstKind::Compare { op: CompareOp::Ne, ty: Type::int(), lhs: r, rhs: Operand::Const(Constant::Int(0), Type::int()) },
            loc.clone(),
        );
        self.emit(None, InstKind::Store { ty: Type::int(), address: result_addr.clone(), value: normalized }, loc.clone());
        self.terminate(Terminator::Branch { target: end_label.clone() });

        self.start_block(short_label);
        let short_value = if op == BinOp::LogAnd { 0 } else { 1 };
        self.emit(
            None,
            InstKind::Store { ty: Type::int(), address: result_addr.clone(), value: Operand::Const(Constant::Int(short_value), Type::int()) },
            loc.clone(),
        );
        self.terminate(Terminator::Branch { target: end_label.clone() });

        self.start_block(end_label);
        self.emit(Some(self.fresh_temp()), InstKind::Load { ty: Type::int(), address: result_addr }, loc)
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr, ty: Type, loc: SourceLocation) -> Operand {
        match op {
            UnaryOp::AddrOf => self.gen_lvalue_addr(operand),
            UnaryOp::Deref => {
                let addr = self.gen_expr(operand);
                self.emit(Some(self.fresh_temp()), InstKind::Load { ty, address: addr }, loc)
            }
            UnaryOp::Neg => {
                let v = self.gen_expr(operand);
                self.emit(Some(self.fresh_temp()), InstKind::Neg { ty, operand: v }, loc)
            }
            UnaryOp::BitNot => {
                let v = self.gen_expr(operand);
                self.emit(Some(self.fresh_temp()), InstKind::BitNot { ty, operand: v }, loc)
            }
            UnaryOp::Not => {
                let v = self.gen_expr(operand);
                self.emit(Some(self.fresh_temp()), InstKind::Not { ty: Type::int(), operand: v }, loc)
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let addr = self.gen_lvalue_addr(operand);
                let operand_ty = operand.resolved_type.clone().unwrap_or_else(Type::void);
                let old = self.emit(Some(self.fresh_temp()), InstKind::Load { ty: operand_ty.clone(), address: addr.clone() }, loc.clone());
                let delta = if operand_ty.is_pointer() { operand_ty.dereferenced().unwrap_or_else(Type::void).size_in_bytes(self.structs) as i64 } else { 1 };
                let arith_op = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) { ArithOp::Add } else { ArithOp::Sub };
                let new_value = self.emit(
                    Some(self.fresh_temp()),
                    InstKind::Arith { op: arith_op, ty: operand_ty.clone(), lhs: old.clone(), rhs: Operand::Const(Constant::Int(delta), Type::scalar(BaseType::Long)) },
                    loc.clone(),
                );
                self.emit(None, InstKind::Store { ty: operand_ty, address: addr, value: new_value.clone() }, loc);
                if matches!(op, UnaryOp::PreInc | UnaryOp::PreDec) {
                    new_value
                } else {
                    old
                }
            }
        }
    }

    fn gen_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, ty: Type, loc: SourceLocation) -> Operand {
        let addr = self.gen_lvalue_addr(target);
        if op == AssignOp::Assign {
            let v = self.gen_expr(value);
            let v = self.coerce(v, &ty, loc.clone());
            self.emit(None, InstKind::Store { ty: ty.clone(), address: addr.clone(), value: v.clone() }, loc);
            return v;
        }
        let current = self.emit(Some(self.fresh_temp()), InstKind::Load { ty: ty.clone(), address: addr.clone() }, target.location.clone());
        let rhs = self.gen_expr(value);
        let rhs = self.coerce(rhs, &ty, loc.clone());
        let arith = compound_arith_op(op);
        let updated = self.emit(Some(self.fresh_temp()), InstKind::Arith { op: arith, ty: ty.clone(), lhs: current, rhs }, loc.clone());
        self.emit(None, InstKind::Store { ty, address: addr, value: updated.clone() }, loc);
        updated
    }

    fn gen_conditional(&mut self, condition: &Expr, then_expr: &Expr, else_expr: &Expr, ty: Type, loc: SourceLocation) -> Operand {
        let result_addr = self.emit(Some(self.fresh_temp()), InstKind::Alloca { ty: ty.clone() }, loc.clone());
        let cond = self.gen_expr(condition);

        let then_label = self.fresh_label("cond.then");
        let else_label = self.fresh_label("cond.else");
        let end_label = self.fresh_label("cond.end");
        self.terminate(Terminator::CondBranch { cond, then_label: then_label.clone(), else_label: else_label.clone() });

        self.start_block(then_label);
        let t = self.gen_expr(then_expr);
        self.emit(None, InstKind::Store { ty: ty.clone(), address: result_addr.clone(), value: t }, loc.clone());
        self.terminate(Terminator::Branch { target: end_label.clone() });

        self.start_block(else_label);
        let e = self.gen_expr(else_expr);
        self.emit(None, InstKind::Store { ty: ty.clone(), address: result_addr.clone(), value: e }, loc.clone());
        self.terminate(Terminator::Branch { target: end_label.clone() });

        self.start_block(end_label);
        self.emit(Some(self.fresh_temp()), InstKind::Load { ty, address: result_addr }, loc)
    }
}

fn arith_op(op: BinOp) -> Option<ArithOp> {
    Some(match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::Mod => ArithOp::Mod,
        BinOp::Shl => ArithOp::Shl,
        BinOp::Shr => ArithOp::Shr,
        BinOp::BitAnd => ArithOp::And,
        BinOp::BitOr => ArithOp::Or,
        BinOp::BitXor => ArithOp::Xor,
        _ => return None,
    })
}

fn compare_op(op: BinOp) -> Option<CompareOp> {
    Some(match op {
        BinOp::Eq => CompareOp::Eq,
        BinOp::Ne => CompareOp::Ne,
        BinOp::Lt => CompareOp::Lt,
        BinOp::Le => CompareOp::Le,
        BinOp::Gt => CompareOp::Gt,
        BinOp::Ge => CompareOp::Ge,
        _ => return None,
    })
}

fn compound_arith_op(op: AssignOp) -> ArithOp {
    match op {
        AssignOp::AddAssign => ArithOp::Add,
        AssignOp::SubAssign => ArithOp::Sub,
        AssignOp::MulAssign => ArithOp::Mul,
        AssignOp::DivAssign => ArithOp::Div,
        AssignOp::ModAssign => ArithOp::Mod,
        AssignOp::AndAssign => ArithOp::And,
        AssignOp::OrAssign => ArithOp::Or,
        AssignOp::XorAssign => ArithOp::Xor,
        AssignOp::ShlAssign => ArithOp::Shl,
        AssignOp::ShrAssign => ArithOp::Shr,
        AssignOp::Assign => unreachable!("plain assignment has its own path"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::Analyzer;

    fn lower(src: &str) -> Module {
        let mut diags = Diagnostics::default();
        let tokens = Lexer::new(src, "t.c").lex_all(&mut diags);
        let mut tu = Parser::new(tokens, &mut diags).parse();
        let mut analyzer = Analyzer::new(&mut diags);
        analyzer.analyze(&mut tu);
        assert!(!diags.has_errors(), "unexpected errors: {:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let structs = analyzer.into_struct_table();
        IrGen::new(&structs).generate(&tu)
    }

    #[test]
    fn simple_function_has_single_terminated_block() {
        let m = lower("int main(void) { return 0; }");
        let f = m.function("main").unwrap();
        assert_eq!(f.blocks.len(), 1);
        assert!(f.verify().is_ok());
    }

    #[test]
    fn if_else_produces_three_extra_blocks() {
        let m = lower("int main(void) { int x; if (1) { x = 1; } else { x = 2; } return x; }");
        let f = m.function("main").unwrap();
        assert!(f.blocks.len() >= 4);
        assert!(f.verify().is_ok());
    }

    #[test]
    fn while_loop_has_cond_body_end_blocks() {
        let m = lower("int main(void) { int i; i = 0; while (i) { i = i - 1; } return 0; }");
        let f = m.function("main").unwrap();
        assert!(f.blocks.iter().any(|b| b.label.starts_with("while.cond")));
        assert!(f.blocks.iter().any(|b| b.label.starts_with("while.body")));
        assert!(f.blocks.iter().any(|b| b.label.starts_with("while.end")));
        assert!(f.verify().is_ok());
    }

    #[test]
    fn break_in_loop_branches_to_end_label() {
        let m = lower("int main(void) { while (1) { break; } return 0; }");
        let f = m.function("main").unwrap();
        assert!(f.verify().is_ok());
    }

    #[test]
    fn string_literal_is_interned_once() {
        let m = lower(r#"int puts(char *s); int main(void) { puts("hi"); puts("hi"); return 0; }"#);
        assert_eq!(m.strings.len(), 1);
    }

    #[test]
    fn extern_function_has_no_blocks() {
        let m = lower("extern int printf(char *fmt, ...); int main(void) { return 0; }");
        let f = m.function("printf").unwrap();
        assert!(f.blocks.is_empty());
    }

    #[test]
    fn call_lowers_to_call_instruction_with_dest() {
        let m = lower("int add(int a, int b) { return a + b; } int main(void) { return add(1, 2); }");
        let f = m.function("main").unwrap();
        let has_call = f.blocks.iter().any(|b| b.instructions.iter().any(|i| matches!(i.kind, InstKind::Call { .. })));
        assert!(has_call);
    }
}
