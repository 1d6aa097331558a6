//! IR-level optimization passes.
//!
//! Each pass rewrites `Vec<Instruction>`/`Vec<BasicBlock>` in place and
//! reports whether it changed anything; the driver loop in [`optimize`]
//! reruns all enabled passes until none of them reports a change (fixpoint)
//! or a pass-count budget is exhausted, whichever comes first.

use crate::config::OptLevel;
use crate::diagnostics::Diagnostics;
use crate::ir::*;
use log::{debug, trace};
use std::collections::HashMap;

/// Caps the fixpoint loop so a pathological program can't optimize forever.
const MAX_PASS_ROUNDS: usize = 32;

pub fn optimize(module: &mut Module, level: OptLevel, diags: &mut Diagnostics) {
    if level == OptLevel::O0 {
        return;
    }
    for func in &mut module.functions {
        if func.blocks.is_empty() {
            continue;
        }
        let mut rounds = 0;
        loop {
            let mut changed = false;
            changed |= constant_fold(func, diags);
            changed |= algebraic_simplify(func);
            changed |= dead_code_eliminate(func);
            if level >= OptLevel::O2 {
                changed |= common_subexpr_eliminate(func);
            }
            rounds += 1;
            trace!("optimize({}): round {rounds} changed={changed}", func.name);
            if !changed || rounds >= MAX_PASS_ROUNDS {
                break;
            }
        }
        debug!("optimize({}): converged after {rounds} round(s)", func.name);
    }
}

fn as_int_const(op: &Operand) -> Option<i64> {
    match op {
        Operand::Const(Constant::Int(v), _) => Some(*v),
        _ => None,
    }
}

fn as_float_const(op: &Operand) -> Option<f64> {
    match op {
        Operand::Const(Constant::Float(v), _) => Some(*v),
        _ => None,
    }
}

/// Folds arithmetic/compare instructions whose operands are both constants
/// into a `Move` of the folded constant. Division/modulo by a constant zero
/// is left untouched and reported as a warning, not folded.
fn constant_fold(func: &mut IrFunction, diags: &mut Diagnostics) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        for inst in &mut block.instructions {
            let folded = match &inst.kind {
                InstKind::Arith { op, ty, lhs, rhs } => fold_arith(*op, ty, lhs, rhs, &inst.location, diags),
                InstKind::Compare { op, ty, lhs, rhs } => fold_compare(*op, lhs, rhs).map(|v| (Constant::Int(v), ty.clone())),
                InstKind::Neg { ty, operand } => as_int_const(operand)
                    .map(|v| (Constant::Int(-v), ty.clone()))
                    .or_else(|| as_float_const(operand).map(|v| (Constant::Float(-v), ty.clone()))),
                InstKind::BitNot { ty, operand } => as_int_const(operand).map(|v| (Constant::Int(!v), ty.clone())),
                InstKind::Not { ty, operand } => as_int_const(operand).map(|v| (Constant::Int((v == 0) as i64), ty.clone())),
                _ => None,
            };
            if let Some((value, ty)) = folded {
                inst.kind = InstKind::Move { ty: ty.clone(), value: Operand::Const(value, ty) };
                changed = true;
            }
        }
    }
    changed
}

fn fold_arith(op: ArithOp, ty: &crate::types::Type, lhs: &Operand, rhs: &Operand, loc: &crate::diagnostics::SourceLocation, diags: &mut Diagnostics) -> Option<(Constant, crate::types::Type)> {
    if let (Some(a), Some(b)) = (as_int_const(lhs), as_int_const(rhs)) {
        if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0 {
            diags.warning("division by a constant zero".to_string(), loc.clone());
            return None;
        }
        let result = match op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Mod => a.wrapping_rem(b),
            ArithOp::Shl => a.wrapping_shl(b as u32),
            ArithOp::Shr => a.wrapping_shr(b as u32),
            ArithOp::And => a & b,
            ArithOp::Or => a | b,
            ArithOp::Xor => a ^ b,
        };
        return Some((Constant::Int(result), ty.clone()));
    }
    if let (Some(a), Some(b)) = (as_float_const(lhs), as_float_const(rhs)) {
        let result = match op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            _ => return None, // mod/shift/bitwise are undefined on float operands
        };
        return Some((Constant::Float(result), ty.clone()));
    }
    None
}

fn fold_compare(op: CompareOp, lhs: &Operand, rhs: &Operand) -> Option<i64> {
    let (a, b) = (as_int_const(lhs)?, as_int_const(rhs)?);
    let result = match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    };
    Some(result as i64)
}

/// Rewrites the standard C identity/annihilator patterns into a simpler
/// instruction: `x+0 -> x`, `x*1 -> x`, `x*0 -> 0`, `x-x -> 0`,
/// `x*2^k -> x<<k`, `x&x -> x`, `x|0 -> x`.
fn algebraic_simplify(func: &mut IrFunction) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        for inst in &mut block.instructions {
            let InstKind::Arith { op, ty, lhs, rhs } = &inst.kind else { continue };
            let simplified = match op {
                ArithOp::Add if as_int_const(rhs) == Some(0) => Some(lhs.clone()),
                ArithOp::Add if as_int_const(lhs) == Some(0) => Some(rhs.clone()),
                ArithOp::Sub if as_int_const(rhs) == Some(0) => Some(lhs.clone()),
                ArithOp::Sub if lhs == rhs => Some(Operand::Const(Constant::Int(0), ty.clone())),
                ArithOp::Mul if as_int_const(rhs) == Some(1) => Some(lhs.clone()),
                ArithOp::Mul if as_int_const(lhs) == Some(1) => Some(rhs.clone()),
                ArithOp::Mul if as_int_const(rhs) == Some(0) || as_int_const(lhs) == Some(0) => {
                    Some(Operand::Const(Constant::Int(0), ty.clone()))
                }
                ArithOp::Div if as_int_const(rhs) == Some(1) => Some(lhs.clone()),
                ArithOp::And if lhs == rhs => Some(lhs.clone()),
                ArithOp::Or if as_int_const(rhs) == Some(0) => Some(lhs.clone()),
                ArithOp::Or if as_int_const(lhs) == Some(0) => Some(rhs.clone()),
                _ => None,
            };
            if let Some(value) = simplified {
                inst.kind = InstKind::Move { ty: ty.clone(), value };
                changed = true;
                continue;
            }
            if *op == ArithOp::Mul {
                if let Some(k) = as_int_const(rhs).and_then(power_of_two) {
                    inst.kind = InstKind::Arith { op: ArithOp::Shl, ty: ty.clone(), lhs: lhs.clone(), rhs: Operand::Const(Constant::Int(k), ty.clone()) };
                    changed = true;
                }
            }
        }
    }
    changed
}

fn power_of_two(n: i64) -> Option<i64> {
    if n > 0 && (n & (n - 1)) == 0 {
        Some(n.trailing_zeros() as i64)
    } else {
        None
    }
}

fn operand_uses_value(op: &Operand, name: &str) -> bool {
    matches!(op, Operand::Value(n, _) if n == name)
}

fn inst_uses(inst: &Instruction, name: &str) -> bool {
    match &inst.kind {
        InstKind::Arith { lhs, rhs, .. } | InstKind::Compare { lhs, rhs, .. } => {
            operand_uses_value(lhs, name) || operand_uses_value(rhs, name)
        }
        InstKind::Neg { operand, .. } | InstKind::Not { operand, .. } | InstKind::BitNot { operand, .. } => operand_uses_value(operand, name),
        InstKind::Alloca { .. } => false,
        InstKind::Load { address, .. } => operand_uses_value(address, name),
        InstKind::Store { address, value, .. } => operand_uses_value(address, name) || operand_uses_value(value, name),
        InstKind::AddrOf { base, offset } => operand_uses_value(base, name) || operand_uses_value(offset, name),
        InstKind::Move { value, .. } | InstKind::Convert { value, .. } => operand_uses_value(value, name),
        InstKind::Call { args, .. } => args.iter().any(|a| operand_uses_value(a, name)),
    }
}

fn terminator_uses(term: &Terminator, name: &str) -> bool {
    match term {
        Terminator::CondBranch { cond, .. } => operand_uses_value(cond, name),
        Terminator::Return { value: Some(v) } => operand_uses_value(v, name),
        _ => false,
    }
}

/// Has side effects that must survive even if its (nonexistent) destination
/// is unused: stores, calls, and control flow. Everything else is "pure":
/// safe to delete if its SSA destination is never read.
fn has_side_effects(inst: &Instruction) -> bool {
    matches!(inst.kind, InstKind::Store { .. } | InstKind::Call { .. })
}

/// Removes pure instructions whose destination is never used anywhere in
/// the function, then removes blocks unreachable from the entry block.
/// Stores are never removed by this pass — aliasing analysis would be
/// required to prove a store is dead, which this compiler doesn't attempt.
fn dead_code_eliminate(func: &mut IrFunction) -> bool {
    let mut changed = false;

    loop {
        let mut used: std::collections::HashSet<String> = std::collections::HashSet::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Arith { lhs, rhs, .. } | InstKind::Compare { lhs, rhs, .. } => {
                        collect_use(lhs, &mut used);
                        collect_use(rhs, &mut used);
                    }
                    InstKind::Neg { operand, .. } | InstKind::Not { operand, .. } | InstKind::BitNot { operand, .. } => collect_use(operand, &mut used),
                    InstKind::Load { address, .. } => collect_use(address, &mut used),
                    InstKind::Store { address, value, .. } => {
                        collect_use(address, &mut used);
                        collect_use(value, &mut used);
                    }
                    InstKind::AddrOf { base, offset } => {
                        collect_use(base, &mut used);
                        collect_use(offset, &mut used);
                    }
                    InstKind::Move { value, .. } | InstKind::Convert { value, .. } => collect_use(value, &mut used),
                    InstKind::Call { args, .. } => args.iter().for_each(|a| collect_use(a, &mut used)),
                    InstKind::Alloca { .. } => {}
                }
            }
            match &block.terminator {
                Terminator::CondBranch { cond, .. } => collect_use(cond, &mut used),
                Terminator::Return { value: Some(v) } => collect_use(v, &mut used),
                _ => {}
            }
        }

        let mut removed_any = false;
        for block in &mut func.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|inst| {
                if has_side_effects(inst) {
                    return true;
                }
                match &inst.dest {
                    Some(d) => used.contains(d),
                    None => true,
                }
            });
            if block.instructions.len() != before {
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
        changed = true;
    }

    if remove_unreachable_blocks(func) {
        changed = true;
    }

    changed
}

fn collect_use(op: &Operand, used: &mut std::collections::HashSet<String>) {
    if let Operand::Value(name, _) = op {
        used.insert(name.clone());
    }
}

fn remove_unreachable_blocks(func: &mut IrFunction) -> bool {
    let Some(entry) = func.blocks.first().map(|b| b.label.clone()) else { return false };
    let mut reachable = std::collections::HashSet::new();
    let mut stack = vec![entry];
    while let Some(label) = stack.pop() {
        if !reachable.insert(label.clone()) {
            continue;
        }
        if let Some(block) = func.blocks.iter().find(|b| b.label == label) {
            match &block.terminator {
                Terminator::Branch { target } => stack.push(target.clone()),
                Terminator::CondBranch { then_label, else_label, .. } => {
                    stack.push(then_label.clone());
                    stack.push(else_label.clone());
                }
                Terminator::Return { .. } | Terminator::Unset => {}
            }
        }
    }
    let before = func.blocks.len();
    func.blocks.retain(|b| reachable.contains(&b.label));
    func.blocks.len() != before
}

/// Intra-block common subexpression elimination: hashes each pure
/// instruction by `(opcode, operands)`; a later identical instruction in
/// the same block is replaced by a `Move` of the earlier destination.
fn common_subexpr_eliminate(func: &mut IrFunction) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        let mut seen: HashMap<String, String> = HashMap::new();
        for inst in &mut block.instructions {
            if has_side_effects(inst) || matches!(inst.kind, InstKind::Alloca { .. } | InstKind::Load { .. }) {
                continue; // alloca/load are never CSE'd: load aliases a store this pass can't see
            }
            let Some(dest) = inst.dest.clone() else { continue };
            let key = cse_key(&inst.kind);
            if let Some(earlier) = seen.get(&key) {
                let ty = inst.ty();
                inst.kind = InstKind::Move { ty: ty.clone(), value: Operand::Value(earlier.clone(), ty) };
                changed = true;
            } else {
                seen.insert(key, dest);
            }
        }
    }
    changed
}

fn cse_key(kind: &InstKind) -> String {
    match kind {
        InstKind::Arith { op, lhs, rhs, .. } => format!("arith:{op:?}:{lhs}:{rhs}"),
        InstKind::Compare { op, lhs, rhs, .. } => format!("cmp:{op:?}:{lhs}:{rhs}"),
        InstKind::Neg { operand, .. } => format!("neg:{operand}"),
        InstKind::Not { operand, .. } => format!("not:{operand}"),
        InstKind::BitNot { operand, .. } => format!("bitnot:{operand}"),
        InstKind::AddrOf { base, offset } => format!("addrof:{base}:{offset}"),
        InstKind::Convert { from, to, value } => format!("convert:{from}:{to}:{value}"),
        InstKind::Move { value, .. } => format!("move:{value}"),
        InstKind::Store { .. } | InstKind::Call { .. } | InstKind::Alloca { .. } | InstKind::Load { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceLocation;
    use crate::types::Type;
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.c"), 1, 1)
    }

    fn const_op(v: i64) -> Operand {
        Operand::Const(Constant::Int(v), Type::int())
    }

    fn single_block_func(instructions: Vec<Instruction>, terminator: Terminator) -> IrFunction {
        IrFunction {
            name: "f".into(),
            return_type: Type::int(),
            params: vec![],
            is_variadic: false,
            blocks: vec![BasicBlock { label: "entry".into(), instructions, terminator }],
        }
    }

    #[test]
    fn constant_fold_collapses_arithmetic() {
        let mut f = single_block_func(
            vec![Instruction {
                dest: Some("t0".into()),
                kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: const_op(2), rhs: const_op(3) },
                location: loc(),
            }],
            Terminator::Return { value: Some(Operand::Value("t0".into(), Type::int())) },
        );
        let mut diags = Diagnostics::default();
        assert!(constant_fold(&mut f, &mut diags));
        assert!(matches!(f.blocks[0].instructions[0].kind, InstKind::Move { value: Operand::Const(Constant::Int(5), _), .. }));
    }

    #[test]
    fn constant_fold_leaves_division_by_zero_and_warns() {
        let mut f = single_block_func(
            vec![Instruction {
                dest: Some("t0".into()),
                kind: InstKind::Arith { op: ArithOp::Div, ty: Type::int(), lhs: const_op(1), rhs: const_op(0) },
                location: loc(),
            }],
            Terminator::Return { value: None },
        );
        let mut diags = Diagnostics::default();
        assert!(!constant_fold(&mut f, &mut diags));
        assert!(diags.iter().any(|d| d.message.contains("division by a constant zero")));
    }

    #[test]
    fn algebraic_simplify_removes_add_zero() {
        let mut f = single_block_func(
            vec![Instruction {
                dest: Some("t0".into()),
                kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: Operand::Value("x".into(), Type::int()), rhs: const_op(0) },
                location: loc(),
            }],
            Terminator::Return { value: None },
        );
        assert!(algebraic_simplify(&mut f));
        assert!(matches!(f.blocks[0].instructions[0].kind, InstKind::Move { .. }));
    }

    #[test]
    fn algebraic_simplify_rewrites_power_of_two_multiply_as_shift() {
        let mut f = single_block_func(
            vec![Instruction {
                dest: Some("t0".into()),
                kind: InstKind::Arith { op: ArithOp::Mul, ty: Type::int(), lhs: Operand::Value("x".into(), Type::int()), rhs: const_op(8) },
                location: loc(),
            }],
            Terminator::Return { value: None },
        );
        assert!(algebraic_simplify(&mut f));
        match &f.blocks[0].instructions[0].kind {
            InstKind::Arith { op: ArithOp::Shl, rhs, .. } => assert_eq!(as_int_const(rhs), Some(3)),
            other => panic!("expected shift, got {other:?}"),
        }
    }

    #[test]
    fn dce_removes_unused_pure_instruction() {
        let mut f = single_block_func(
            vec![Instruction {
                dest: Some("t0".into()),
                kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: const_op(1), rhs: const_op(2) },
                location: loc(),
            }],
            Terminator::Return { value: None },
        );
        assert!(dead_code_eliminate(&mut f));
        assert!(f.blocks[0].instructions.is_empty());
    }

    #[test]
    fn dce_keeps_stores_even_when_unread() {
        let mut f = single_block_func(
            vec![
                Instruction { dest: Some("p".into()), kind: InstKind::Alloca { ty: Type::int() }, location: loc() },
                Instruction {
                    dest: None,
                    kind: InstKind::Store { ty: Type::int(), address: Operand::Value("p".into(), Type::int().pointer()), value: const_op(1) },
                    location: loc(),
                },
            ],
            Terminator::Return { value: None },
        );
        dead_code_eliminate(&mut f);
        assert_eq!(f.blocks[0].instructions.len(), 2);
    }

    #[test]
    fn dce_removes_unreachable_block() {
        let mut f = IrFunction {
            name: "f".into(),
            return_type: Type::void(),
            params: vec![],
            is_variadic: false,
            blocks: vec![
                BasicBlock { label: "entry".into(), instructions: vec![], terminator: Terminator::Return { value: None } },
                BasicBlock { label: "dead".into(), instructions: vec![], terminator: Terminator::Return { value: None } },
            ],
        };
        assert!(dead_code_eliminate(&mut f));
        assert_eq!(f.blocks.len(), 1);
    }

    #[test]
    fn cse_rewrites_duplicate_expression_to_earlier_dest() {
        let mut f = single_block_func(
            vec![
                Instruction {
                    dest: Some("t0".into()),
                    kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: Operand::Value("x".into(), Type::int()), rhs: Operand::Value("y".into(), Type::int()) },
                    location: loc(),
                },
                Instruction {
                    dest: Some("t1".into()),
                    kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: Operand::Value("x".into(), Type::int()), rhs: Operand::Value("y".into(), Type::int()) },
                    location: loc(),
                },
            ],
            Terminator::Return { value: None },
        );
        assert!(common_subexpr_eliminate(&mut f));
        assert!(matches!(&f.blocks[0].instructions[1].kind, InstKind::Move { value: Operand::Value(name, _), .. } if name == "t0"));
    }

    #[test]
    fn optimize_skips_all_passes_at_o0() {
        let mut module = Module {
            functions: vec![single_block_func(
                vec![Instruction {
                    dest: Some("t0".into()),
                    kind: InstKind::Arith { op: ArithOp::Add, ty: Type::int(), lhs: const_op(2), rhs: const_op(3) },
                    location: loc(),
                }],
                Terminator::Return { value: None },
            )],
            strings: vec![],
            globals: vec![],
        };
        let mut diags = Diagnostics::default();
        optimize(&mut module, OptLevel::O0, &mut diags);
        assert!(matches!(module.functions[0].blocks[0].instructions[0].kind, InstKind::Arith { .. }));
    }
}
