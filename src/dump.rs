//! JSON dump support for `--dump-tokens`/`--dump-ast`/`--dump-ir`.
//!
//! A deliberately separate adapter rather than `#[derive(Serialize)]` on the
//! compiler's own AST/IR types: the dump shape is a tooling contract (every
//! node tagged with `kind` and `location`) and is free to diverge from
//! however those types are actually laid out internally.

use crate::ast::*;
use crate::diagnostics::SourceLocation;
use crate::ir::*;
use crate::lexer::{Token, TokenKind};
use crate::types::Type;
use serde_json::{json, Value};

fn loc(l: &SourceLocation) -> Value {
    json!({ "file": l.file.display().to_string(), "line": l.line, "column": l.column })
}

pub fn dump_tokens(tokens: &[Token]) -> Value {
    Value::Array(
        tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| {
                json!({
                    "kind": format!("{:?}", t.kind),
                    "lexeme": t.lexeme.as_ref(),
                    "location": loc(&t.location),
                })
            })
            .collect(),
    )
}

pub fn dump_ast(tu: &TranslationUnit) -> Value {
    json!({
        "kind": "TranslationUnit",
        "declarations": tu.declarations.iter().map(external_decl).collect::<Vec<_>>(),
    })
}

fn external_decl(d: &ExternalDecl) -> Value {
    match d {
        ExternalDecl::Function(f) => json!({
            "kind": "Function",
            "name": f.name,
            "return_type": f.return_type.to_string(),
            "params": f.params.iter().map(param).collect::<Vec<_>>(),
            "is_variadic": f.is_variadic,
            "is_extern": f.is_extern,
            "body": f.body.as_ref().map(block),
            "location": loc(&f.location),
        }),
        ExternalDecl::Declaration(decl) => declaration(decl),
        ExternalDecl::StructDef(s) => json!({
            "kind": "StructDef",
            "name": s.name,
            "members": s.members.iter().map(param).collect::<Vec<_>>(),
            "location": loc(&s.location),
        }),
    }
}

fn param(p: &Param) -> Value {
    json!({ "name": p.name, "type": p.ty.to_string(), "location": loc(&p.location) })
}

fn declaration(d: &Declaration) -> Value {
    json!({
        "kind": "Declaration",
        "base_type": d.base_type.to_string(),
        "is_extern": d.is_extern,
        "is_static": d.is_static,
        "declarators": d.declarators.iter().map(|decl| json!({
            "name": decl.name,
            "type": decl.ty.to_string(),
            "init": decl.init.as_ref().map(expr),
            "location": loc(&decl.location),
        })).collect::<Vec<_>>(),
        "location": loc(&d.location),
    })
}

fn block(b: &Block) -> Value {
    json!({
        "kind": "Block",
        "statements": b.statements.iter().map(statement).collect::<Vec<_>>(),
        "location": loc(&b.location),
    })
}

fn statement(s: &Statement) -> Value {
    match s {
        Statement::Expr { expr: e, location } => json!({ "kind": "ExprStmt", "expr": expr(e), "location": loc(location) }),
        Statement::Declaration(d) => declaration(d),
        Statement::Block(b) => block(b),
        Statement::If { condition, then_branch, else_branch, location } => json!({
            "kind": "If",
            "condition": expr(condition),
            "then": statement(then_branch),
            "else": else_branch.as_ref().map(|s| statement(s)),
            "location": loc(location),
        }),
        Statement::While { condition, body, location } => json!({
            "kind": "While",
            "condition": expr(condition),
            "body": statement(body),
            "location": loc(location),
        }),
        Statement::For { init, condition, step, body, location } => json!({
            "kind": "For",
            "init": init.as_ref().map(|s| statement(s)),
            "condition": condition.as_ref().map(expr),
            "step": step.as_ref().map(expr),
            "body": statement(body),
            "location": loc(location),
        }),
        Statement::Return { value, location } => json!({
            "kind": "Return",
            "value": value.as_ref().map(expr),
            "location": loc(location),
        }),
        Statement::Break { location } => json!({ "kind": "Break", "location": loc(location) }),
        Statement::Continue { location } => json!({ "kind": "Continue", "location": loc(location) }),
        Statement::Empty { location } => json!({ "kind": "Empty", "location": loc(location) }),
    }
}

fn expr(e: &Expr) -> Value {
    let mut v = match &e.kind {
        ExprKind::IntLiteral(n) => json!({ "kind": "IntLiteral", "value": n }),
        ExprKind::FloatLiteral(n) => json!({ "kind": "FloatLiteral", "value": n }),
        ExprKind::CharLiteral(n) => json!({ "kind": "CharLiteral", "value": n }),
        ExprKind::StringLiteral(s) => json!({ "kind": "StringLiteral", "value": s }),
        ExprKind::Ident(name) => json!({ "kind": "Ident", "name": name }),
        ExprKind::Binary { op, lhs, rhs } => json!({
            "kind": "Binary", "op": format!("{op:?}"), "lhs": expr(lhs), "rhs": expr(rhs),
        }),
        ExprKind::Unary { op, operand } => json!({
            "kind": "Unary", "op": format!("{op:?}"), "operand": expr(operand),
        }),
        ExprKind::Assign { op, target, value } => json!({
            "kind": "Assign", "op": format!("{op:?}"), "target": expr(target), "value": expr(value),
        }),
        ExprKind::Conditional { condition, then_expr, else_expr } => json!({
            "kind": "Conditional", "condition": expr(condition), "then": expr(then_expr), "else": expr(else_expr),
        }),
        ExprKind::Call { callee, args } => json!({
            "kind": "Call", "callee": callee, "args": args.iter().map(expr).collect::<Vec<_>>(),
        }),
        ExprKind::Index { base, index } => json!({
            "kind": "Index", "base": expr(base), "index": expr(index),
        }),
        ExprKind::Member { base, field, arrow } => json!({
            "kind": "Member", "base": expr(base), "field": field, "arrow": arrow,
        }),
        ExprKind::Cast { target_type, operand } => json!({
            "kind": "Cast", "target_type": target_type.to_string(), "operand": expr(operand),
        }),
        ExprKind::Sizeof(SizeofOperand::Type(ty)) => json!({ "kind": "SizeofType", "type": ty.to_string() }),
        ExprKind::Sizeof(SizeofOperand::Expr(inner)) => json!({ "kind": "SizeofExpr", "operand": expr(inner) }),
        ExprKind::Comma(items) => json!({ "kind": "Comma", "items": items.iter().map(expr).collect::<Vec<_>>() }),
    };
    if let (Some(obj), Some(ty)) = (v.as_object_mut(), e.resolved_type.as_ref()) {
        obj.insert("resolved_type".to_string(), json!(ty.to_string()));
    }
    if let (Some(obj), true) = (v.as_object_mut(), true) {
        obj.entry("location").or_insert_with(|| loc(&e.location));
    }
    v
}

pub fn dump_ir(module: &Module) -> Value {
    json!({
        "kind": "Module",
        "functions": module.functions.iter().map(ir_function).collect::<Vec<_>>(),
        "globals": module.globals.iter().map(|g| json!({
            "name": g.name,
            "type": g.ty.to_string(),
            "init": g.init.as_ref().map(constant),
        })).collect::<Vec<_>>(),
        "strings": module.strings.iter().map(|s| json!({ "label": s.label, "value": s.value })).collect::<Vec<_>>(),
    })
}

fn ir_function(f: &IrFunction) -> Value {
    json!({
        "kind": "Function",
        "name": f.name,
        "return_type": f.return_type.to_string(),
        "params": f.params.iter().map(|p| json!({ "name": p.name, "type": p.ty.to_string() })).collect::<Vec<_>>(),
        "is_variadic": f.is_variadic,
        "blocks": f.blocks.iter().map(basic_block).collect::<Vec<_>>(),
    })
}

fn basic_block(b: &BasicBlock) -> Value {
    json!({
        "label": b.label,
        "instructions": b.instructions.iter().map(instruction).collect::<Vec<_>>(),
        "terminator": terminator(&b.terminator),
    })
}

fn instruction(inst: &Instruction) -> Value {
    let mut v = inst_kind(&inst.kind);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("dest".to_string(), json!(inst.dest));
        obj.insert("location".to_string(), loc(&inst.location));
    }
    v
}

fn operand(op: &Operand) -> Value {
    match op {
        Operand::Const(c, ty) => json!({ "kind": "Const", "value": constant(c), "type": ty.to_string() }),
        Operand::Value(name, ty) => json!({ "kind": "Value", "name": name, "type": ty.to_string() }),
        Operand::Label(name) => json!({ "kind": "Label", "name": name }),
        Operand::StringLit(label) => json!({ "kind": "StringLit", "label": label }),
        Operand::GlobalAddr(name, ty) => json!({ "kind": "GlobalAddr", "name": name, "type": ty.to_string() }),
    }
}

fn constant(c: &Constant) -> Value {
    match c {
        Constant::Int(v) => json!(v),
        Constant::Float(v) => json!(v),
    }
}

fn type_json(ty: &Type) -> Value {
    json!(ty.to_string())
}

fn inst_kind(kind: &InstKind) -> Value {
    match kind {
        InstKind::Arith { op, ty, lhs, rhs } => json!({
            "kind": "Arith", "op": format!("{op:?}"), "type": type_json(ty), "lhs": operand(lhs), "rhs": operand(rhs),
        }),
        InstKind::Compare { op, ty, lhs, rhs } => json!({
            "kind": "Compare", "op": format!("{op:?}"), "type": type_json(ty), "lhs": operand(lhs), "rhs": operand(rhs),
        }),
        InstKind::Neg { ty, operand: o } => json!({ "kind": "Neg", "type": type_json(ty), "operand": operand(o) }),
        InstKind::Not { ty, operand: o } => json!({ "kind": "Not", "type": type_json(ty), "operand": operand(o) }),
        InstKind::BitNot { ty, operand: o } => json!({ "kind": "BitNot", "type": type_json(ty), "operand": operand(o) }),
        InstKind::Alloca { ty } => json!({ "kind": "Alloca", "type": type_json(ty) }),
        InstKind::Load { ty, address } => json!({ "kind": "Load", "type": type_json(ty), "address": operand(address) }),
        InstKind::Store { ty, address, value } => json!({
            "kind": "Store", "type": type_json(ty), "address": operand(address), "value": operand(value),
        }),
        InstKind::AddrOf { base, offset } => json!({ "kind": "AddrOf", "base": operand(base), "offset": operand(offset) }),
        InstKind::Move { ty, value } => json!({ "kind": "Move", "type": type_json(ty), "value": operand(value) }),
        InstKind::Convert { from, to, value } => json!({
            "kind": "Convert", "from": type_json(from), "to": type_json(to), "value": operand(value),
        }),
        InstKind::Call { callee, args, ty } => json!({
            "kind": "Call", "callee": callee, "args": args.iter().map(operand).collect::<Vec<_>>(), "type": type_json(ty),
        }),
    }
}

fn terminator(t: &Terminator) -> Value {
    match t {
        Terminator::Branch { target } => json!({ "kind": "Branch", "target": target }),
        Terminator::CondBranch { cond, then_label, else_label } => json!({
            "kind": "CondBranch", "cond": operand(cond), "then": then_label, "else": else_label,
        }),
        Terminator::Return { value } => json!({ "kind": "Return", "value": value.as_ref().map(operand) }),
        Terminator::Unset => json!({ "kind": "Unset" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_tokens_reports_kind_and_lexeme() {
        let mut diags = crate::diagnostics::Diagnostics::default();
        let tokens = crate::lexer::Lexer::new("int x;", "t.c").lex_all(&mut diags);
        let v = dump_tokens(&tokens);
        let arr = v.as_array().unwrap();
        assert_eq!(arr[0]["kind"], "KwInt");
        assert_eq!(arr[1]["lexeme"], "x");
    }

    #[test]
    fn dump_ast_tags_every_declaration_with_kind() {
        let mut diags = crate::diagnostics::Diagnostics::default();
        let tokens = crate::lexer::Lexer::new("int main(void) { return 0; }", "t.c").lex_all(&mut diags);
        let tu = crate::parser::Parser::new(tokens, &mut diags).parse();
        let v = dump_ast(&tu);
        assert_eq!(v["declarations"][0]["kind"], "Function");
        assert_eq!(v["declarations"][0]["name"], "main");
    }

    #[test]
    fn dump_ir_reports_function_blocks() {
        let mut diags = crate::diagnostics::Diagnostics::default();
        let tokens = crate::lexer::Lexer::new("int main(void) { return 7; }", "t.c").lex_all(&mut diags);
        let mut tu = crate::parser::Parser::new(tokens, &mut diags).parse();
        let mut analyzer = crate::semantic::Analyzer::new(&mut diags);
        analyzer.analyze(&mut tu);
        let structs = analyzer.into_struct_table();
        let module = crate::ir_gen::IrGen::new(&structs).generate(&tu);
        let v = dump_ir(&module);
        assert_eq!(v["functions"][0]["name"], "main");
        assert!(v["functions"][0]["blocks"].as_array().unwrap().len() >= 1);
    }
}
