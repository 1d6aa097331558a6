//! x86-64 System V assembly code generation (AT&T syntax).
//!
//! Every SSA value and every `alloca`'d local is spilled to its own stack
//! slot; this keeps instruction selection a direct, value-at-a-time
//! translation with no register allocator, mirroring the alloca-heavy,
//! no-phi shape the IR generator already commits to. A function is emitted
//! in two passes: [`CodeGen::layout_function`] walks its instructions once
//! to assign every local and temporary a `-k(%rbp)` slot (and to fold
//! statically-known addresses so struct-member and local-array access need
//! no runtime pointer arithmetic), then [`CodeGen::emit_function`] walks it
//! again to produce the actual instruction text.

use crate::error::CompileError;
use crate::ir::*;
use crate::types::{StructTable, Type};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

const INT_ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
const SSE_ARG_REGS: [&str; 8] = ["%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5", "%xmm6", "%xmm7"];

/// A compile-time-known storage location, computed during layout so loads
/// and stores through it need no runtime pointer materialization.
#[derive(Debug, Clone, PartialEq)]
enum KnownAddr {
    /// `-<offset>(%rbp)`.
    Rbp(i64),
    /// `<name>(%rip)` or `<name>+<offset>(%rip)`.
    Global(String, i64),
}

#[derive(Debug, Default)]
struct FunctionLayout {
    known_addrs: HashMap<String, KnownAddr>,
    slots: HashMap<String, i64>,
    frame_bytes: i64,
}

impl FunctionLayout {
    fn alloc_slot(&mut self, frame_bytes: &mut i64, size: usize) -> i64 {
        let rounded = (size.max(1) as i64 + 7) / 8 * 8;
        *frame_bytes += rounded;
        *frame_bytes
    }
}

fn round_up_16(n: i64) -> i64 {
    (n + 15) / 16 * 16
}

fn as_int_const(op: &Operand) -> Option<i64> {
    match op {
        Operand::Const(Constant::Int(v), _) => Some(*v),
        _ => None,
    }
}

pub struct CodeGen<'a> {
    structs: &'a StructTable,
    opt_level: crate::config::OptLevel,
    output: String,
    externs: HashSet<String>,
    float_consts: Vec<(String, u64)>,
    float_const_counter: usize,
    layout: FunctionLayout,
}

impl<'a> CodeGen<'a> {
    pub fn new(structs: &'a StructTable, opt_level: crate::config::OptLevel) -> Self {
        CodeGen {
            structs,
            opt_level,
            output: String::new(),
            externs: HashSet::new(),
            float_consts: Vec::new(),
            float_const_counter: 0,
            layout: FunctionLayout::default(),
        }
    }

    pub fn generate(mut self, module: &Module) -> Result<String, CompileError> {
        module.verify().map_err(CompileError::Internal)?;
        self.externs = module.functions.iter().filter(|f| f.blocks.is_empty()).map(|f| f.name.clone()).collect();

        log::debug!("codegen: emitting {} function(s)", module.functions.len());
        writeln!(self.output, "\t.text")?;
        for f in &module.functions {
            if !f.blocks.is_empty() {
                self.emit_function(f)?;
            }
        }
        self.emit_globals(&module.globals)?;
        self.emit_strings(&module.strings)?;

        let mut text = self.output;
        if self.opt_level >= crate::config::OptLevel::O2 {
            log::debug!("codegen: running -O2 peephole pass");
            text = apply_peephole(&text);
        }
        Ok(text)
    }

    // ---- layout ----------------------------------------------------

    fn static_addr_of(&self, op: &Operand) -> Option<KnownAddr> {
        match op {
            Operand::Value(name, _) => self.layout.known_addrs.get(name).cloned(),
            Operand::GlobalAddr(name, _) => Some(KnownAddr::Global(name.clone(), 0)),
            _ => None,
        }
    }

    fn layout_function(&self, f: &IrFunction) -> FunctionLayout {
        let mut layout = FunctionLayout::default();
        let mut frame_bytes: i64 = 0;

        for p in &f.params {
            let off = layout.alloc_slot(&mut frame_bytes, 8);
            layout.slots.insert(p.name.clone(), off);
        }

        for block in &f.blocks {
            for inst in &block.instructions {
                let Some(dest) = &inst.dest else { continue };
                match &inst.kind {
                    InstKind::Alloca { ty } => {
                        let off = layout.alloc_slot(&mut frame_bytes, ty.size_in_bytes(self.structs));
                        layout.known_addrs.insert(dest.clone(), KnownAddr::Rbp(off));
                    }
                    InstKind::AddrOf { base, offset } => {
                        let base_addr = match base {
                            Operand::Value(name, _) => layout.known_addrs.get(name).cloned(),
                            Operand::GlobalAddr(name, _) => Some(KnownAddr::Global(name.clone(), 0)),
                            _ => None,
                        };
                        let folded = match (base_addr, as_int_const(offset)) {
                            (Some(KnownAddr::Rbp(o)), Some(k)) => Some(KnownAddr::Rbp(o - k)),
                            (Some(KnownAddr::Global(n, base_off)), Some(k)) => Some(KnownAddr::Global(n, base_off + k)),
                            _ => None,
                        };
                        match folded {
                            Some(addr) => {
                                layout.known_addrs.insert(dest.clone(), addr);
                            }
                            None => {
                                let off = layout.alloc_slot(&mut frame_bytes, 8);
                                layout.slots.insert(dest.clone(), off);
                            }
                        }
                    }
                    _ => {
                        let off = layout.alloc_slot(&mut frame_bytes, 8);
                        layout.slots.insert(dest.clone(), off);
                    }
                }
            }
        }

        layout.frame_bytes = round_up_16(frame_bytes);
        layout
    }

    // ---- operand access ----------------------------------------------

    fn materialize_known_addr(&mut self, addr: &KnownAddr, reg: &str) -> Result<(), CompileError> {
        match addr {
            KnownAddr::Rbp(off) => writeln!(self.output, "\tleaq -{off}(%rbp), {reg}")?,
            KnownAddr::Global(name, 0) => writeln!(self.output, "\tleaq {name}(%rip), {reg}")?,
            KnownAddr::Global(name, off) => writeln!(self.output, "\tleaq {name}+{off}(%rip), {reg}")?,
        }
        Ok(())
    }

    fn intern_float_const(&mut self, v: f64) -> String {
        let bits = v.to_bits();
        if let Some((label, _)) = self.float_consts.iter().find(|(_, b)| *b == bits) {
            return label.clone();
        }
        let label = format!(".LCF{}", self.float_const_counter);
        self.float_const_counter += 1;
        self.float_consts.push((label.clone(), bits));
        label
    }

    /// Loads an operand's integer/pointer value into `reg`.
    fn load_into(&mut self, op: &Operand, reg: &str) -> Result<(), CompileError> {
        match op {
            Operand::Const(Constant::Int(v), _) => writeln!(self.output, "\tmovq ${v}, {reg}")?,
            Operand::Const(Constant::Float(v), _) => {
                let bits = v.to_bits() as i64;
                writeln!(self.output, "\tmovq ${bits}, {reg}")?;
            }
            Operand::Value(name, _) => {
                if let Some(addr) = self.layout.known_addrs.get(name).cloned() {
                    self.materialize_known_addr(&addr, reg)?;
                } else {
                    let off = *self.layout.slots.get(name).ok_or_else(|| {
                        CompileError::Internal(format!("no stack slot assigned for value '{name}'"))
                    })?;
                    writeln!(self.output, "\tmovq -{off}(%rbp), {reg}")?;
                }
            }
            Operand::Label(name) => {
                return Err(CompileError::Internal(format!("label '{name}' used as a value operand")));
            }
            Operand::StringLit(label) => writeln!(self.output, "\tleaq {label}(%rip), {reg}")?,
            Operand::GlobalAddr(name, _) => writeln!(self.output, "\tleaq {name}(%rip), {reg}")?,
        }
        Ok(())
    }

    /// Loads an operand's floating-point value into `xmm`.
    fn load_float_into(&mut self, op: &Operand, xmm: &str) -> Result<(), CompileError> {
        match op {
            Operand::Const(Constant::Float(v), _) => {
                let label = self.intern_float_const(*v);
                writeln!(self.output, "\tmovsd {label}(%rip), {xmm}")?;
            }
            Operand::Const(Constant::Int(v), _) => {
                writeln!(self.output, "\tmovq ${v}, %rax")?;
                writeln!(self.output, "\tcvtsi2sdq %rax, {xmm}")?;
            }
            Operand::Value(name, ty) => {
                if !ty.is_floating() {
                    // A well-formed IR never reaches here: every implicit
                    // int/float mix is made explicit by a `Convert`
                    // instruction before the value lands in a float slot.
                    return Err(CompileError::Internal(format!(
                        "value '{name}' of non-floating type '{ty}' used where a floating-point operand was expected"
                    )));
                }
                let off = *self.layout.slots.get(name).ok_or_else(|| {
                    CompileError::Internal(format!("no stack slot assigned for value '{name}'"))
                })?;
                writeln!(self.output, "\tmovsd -{off}(%rbp), {xmm}")?;
            }
            other => {
                return Err(CompileError::Internal(format!("operand '{other}' is not a floating-point value")));
            }
        }
        Ok(())
    }

    fn store_reg(&mut self, reg: &str, dest: &str) -> Result<(), CompileError> {
        let off = *self.layout.slots.get(dest).ok_or_else(|| CompileError::Internal(format!("no stack slot assigned for dest '{dest}'")))?;
        writeln!(self.output, "\tmovq {reg}, -{off}(%rbp)")?;
        Ok(())
    }

    fn store_xmm(&mut self, xmm: &str, dest: &str) -> Result<(), CompileError> {
        let off = *self.layout.slots.get(dest).ok_or_else(|| CompileError::Internal(format!("no stack slot assigned for dest '{dest}'")))?;
        writeln!(self.output, "\tmovsd {xmm}, -{off}(%rbp)")?;
        Ok(())
    }

    /// An addressable location for `address`, as used by loads, stores, and
    /// the base of address arithmetic: either a statically-known location,
    /// or a runtime pointer materialized into `scratch`.
    fn resolve_address(&mut self, address: &Operand, scratch: &str) -> Result<String, CompileError> {
        match address {
            Operand::GlobalAddr(name, _) => Ok(format!("{name}(%rip)")),
            Operand::Value(name, _) => {
                if let Some(addr) = self.layout.known_addrs.get(name).cloned() {
                    Ok(match addr {
                        KnownAddr::Rbp(off) => format!("-{off}(%rbp)"),
                        KnownAddr::Global(n, 0) => format!("{n}(%rip)"),
                        KnownAddr::Global(n, off) => format!("{n}+{off}(%rip)"),
                    })
                } else {
                    self.load_into(address, scratch)?;
                    Ok(format!("({scratch})"))
                }
            }
            _ => {
                self.load_into(address, scratch)?;
                Ok(format!("({scratch})"))
            }
        }
    }

    // ---- functions -----------------------------------------------------

    fn emit_function(&mut self, f: &IrFunction) -> Result<(), CompileError> {
        self.layout = self.layout_function(f);

        writeln!(self.output, "\t.globl {}", f.name)?;
        writeln!(self.output, "\t.type {}, @function", f.name)?;
        writeln!(self.output, "{}:", f.name)?;
        writeln!(self.output, "\tpushq %rbp")?;
        writeln!(self.output, "\tmovq %rsp, %rbp")?;
        if self.layout.frame_bytes > 0 {
            writeln!(self.output, "\tsubq ${}, %rsp", self.layout.frame_bytes)?;
        }
        self.emit_param_prologue(f)?;

        for block in &f.blocks {
            writeln!(self.output, ".L{}_{}:", f.name, block.label)?;
            for inst in &block.instructions {
                self.emit_instruction(inst)?;
            }
            self.emit_terminator(f, &block.terminator)?;
        }
        writeln!(self.output, "\t.size {0}, .-{0}", f.name)?;
        Ok(())
    }

    fn emit_param_prologue(&mut self, f: &IrFunction) -> Result<(), CompileError> {
        let mut int_idx = 0;
        let mut sse_idx = 0;
        let mut stack_offset: i64 = 16; // above the saved return address and %rbp
        for p in &f.params {
            let off = *self.layout.slots.get(&p.name).expect("every parameter has a slot");
            if p.ty.is_floating() {
                if sse_idx < SSE_ARG_REGS.len() {
                    writeln!(self.output, "\tmovsd {}, -{off}(%rbp)", SSE_ARG_REGS[sse_idx])?;
                    sse_idx += 1;
                } else {
                    writeln!(self.output, "\tmovsd {stack_offset}(%rbp), %xmm0")?;
                    writeln!(self.output, "\tmovsd %xmm0, -{off}(%rbp)")?;
                    stack_offset += 8;
                }
            } else if int_idx < INT_ARG_REGS.len() {
                writeln!(self.output, "\tmovq {}, -{off}(%rbp)", INT_ARG_REGS[int_idx])?;
                int_idx += 1;
            } else {
                writeln!(self.output, "\tmovq {stack_offset}(%rbp), %rax")?;
                writeln!(self.output, "\tmovq %rax, -{off}(%rbp)")?;
                stack_offset += 8;
            }
        }
        Ok(())
    }

    fn emit_instruction(&mut self, inst: &Instruction) -> Result<(), CompileError> {
        match &inst.kind {
            InstKind::Arith { op, ty, lhs, rhs } => self.emit_arith(inst.dest.as_deref(), *op, ty, lhs, rhs)?,
            InstKind::Compare { op, ty, lhs, rhs } => self.emit_compare(inst.dest.as_deref(), *op, ty, lhs, rhs)?,
            InstKind::Neg { ty, operand } => self.emit_neg(inst.dest.as_deref(), ty, operand)?,
            InstKind::Not { operand, .. } => self.emit_logical_not(inst.dest.as_deref(), operand)?,
            InstKind::BitNot { operand, .. } => self.emit_bitnot(inst.dest.as_deref(), operand)?,
            InstKind::Alloca { .. } => {} // fully accounted for by layout; no runtime work
            InstKind::Load { ty, address } => self.emit_load(inst.dest.as_deref(), ty, address)?,
            InstKind::Store { ty, address, value } => self.emit_store(ty, address, value)?,
            InstKind::AddrOf { base, offset } => self.emit_addrof(inst.dest.as_deref(), base, offset)?,
            InstKind::Move { ty, value } => self.emit_move(inst.dest.as_deref(), ty, value)?,
            InstKind::Convert { from, to, value } => self.emit_convert(inst.dest.as_deref(), from, to, value)?,
            InstKind::Call { callee, args, ty } => self.emit_call(inst.dest.as_deref(), callee, args, ty)?,
        }
        Ok(())
    }

    fn emit_arith(&mut self, dest: Option<&str>, op: ArithOp, ty: &Type, lhs: &Operand, rhs: &Operand) -> Result<(), CompileError> {
        if ty.is_floating() {
            self.load_float_into(lhs, "%xmm0")?;
            self.load_float_into(rhs, "%xmm1")?;
            let mnemonic = match op {
                ArithOp::Add => "addsd",
                ArithOp::Sub => "subsd",
                ArithOp::Mul => "mulsd",
                ArithOp::Div => "divsd",
                _ => return Err(CompileError::Internal(format!("{op:?} is not defined on floating-point operands"))),
            };
            writeln!(self.output, "\t{mnemonic} %xmm1, %xmm0")?;
            if let Some(d) = dest {
                self.store_xmm("%xmm0", d)?;
            }
            return Ok(());
        }

        self.load_into(lhs, "%rax")?;
        self.load_into(rhs, "%rcx")?;
        match op {
            ArithOp::Add => writeln!(self.output, "\taddq %rcx, %rax")?,
            ArithOp::Sub => writeln!(self.output, "\tsubq %rcx, %rax")?,
            ArithOp::Mul => writeln!(self.output, "\timulq %rcx, %rax")?,
            ArithOp::Div => {
                writeln!(self.output, "\tcqto")?;
                writeln!(self.output, "\tidivq %rcx")?;
            }
            ArithOp::Mod => {
                writeln!(self.output, "\tcqto")?;
                writeln!(self.output, "\tidivq %rcx")?;
                writeln!(self.output, "\tmovq %rdx, %rax")?;
            }
            ArithOp::Shl => writeln!(self.output, "\tshlq %cl, %rax")?,
            ArithOp::Shr => writeln!(self.output, "\tsarq %cl, %rax")?,
            ArithOp::And => writeln!(self.output, "\tandq %rcx, %rax")?,
            ArithOp::Or => writeln!(self.output, "\torq %rcx, %rax")?,
            ArithOp::Xor => writeln!(self.output, "\txorq %rcx, %rax")?,
        }
        if let Some(d) = dest {
            self.store_reg("%rax", d)?;
        }
        Ok(())
    }

    fn emit_compare(&mut self, dest: Option<&str>, op: CompareOp, ty: &Type, lhs: &Operand, rhs: &Operand) -> Result<(), CompileError> {
        let setcc = if ty.is_floating() {
            self.load_float_into(lhs, "%xmm0")?;
            self.load_float_into(rhs, "%xmm1")?;
            writeln!(self.output, "\tucomisd %xmm1, %xmm0")?;
            // ucomisd only sets CF/ZF/PF, never SF/OF, so the signed setcc
            // forms below don't apply — use the unsigned/unordered ones.
            match op {
                CompareOp::Eq => "sete",
                CompareOp::Ne => "setne",
                CompareOp::Lt => "setb",
                CompareOp::Le => "setbe",
                CompareOp::Gt => "seta",
                CompareOp::Ge => "setae",
            }
        } else {
            self.load_into(lhs, "%rax")?;
            self.load_into(rhs, "%rcx")?;
            writeln!(self.output, "\tcmpq %rcx, %rax")?;
            match op {
                CompareOp::Eq => "sete",
                CompareOp::Ne => "setne",
                CompareOp::Lt => "setl",
                CompareOp::Le => "setle",
                CompareOp::Gt => "setg",
                CompareOp::Ge => "setge",
            }
        };
        writeln!(self.output, "\t{setcc} %al")?;
        writeln!(self.output, "\tmovzbq %al, %rax")?;
        if let Some(d) = dest {
            self.store_reg("%rax", d)?;
        }
        Ok(())
    }

    fn emit_neg(&mut self, dest: Option<&str>, ty: &Type, operand: &Operand) -> Result<(), CompileError> {
        if ty.is_floating() {
            self.load_float_into(operand, "%xmm0")?;
            writeln!(self.output, "\tpxor %xmm1, %xmm1")?;
            writeln!(self.output, "\tsubsd %xmm0, %xmm1")?;
            if let Some(d) = dest {
                self.store_xmm("%xmm1", d)?;
            }
        } else {
            self.load_into(operand, "%rax")?;
            writeln!(self.output, "\tnegq %rax")?;
            if let Some(d) = dest {
                self.store_reg("%rax", d)?;
            }
        }
        Ok(())
    }

    fn emit_logical_not(&mut self, dest: Option<&str>, operand: &Operand) -> Result<(), CompileError> {
        self.load_into(operand, "%rax")?;
        writeln!(self.output, "\ttestq %rax, %rax")?;
        writeln!(self.output, "\tsete %al")?;
        writeln!(self.output, "\tmovzbq %al, %rax")?;
        if let Some(d) = dest {
            self.store_reg("%rax", d)?;
        }
        Ok(())
    }

    fn emit_bitnot(&mut self, dest: Option<&str>, operand: &Operand) -> Result<(), CompileError> {
        self.load_into(operand, "%rax")?;
        writeln!(self.output, "\tnotq %rax")?;
        if let Some(d) = dest {
            self.store_reg("%rax", d)?;
        }
        Ok(())
    }

    fn emit_load(&mut self, dest: Option<&str>, ty: &Type, address: &Operand) -> Result<(), CompileError> {
        let addr = self.resolve_address(address, "%rcx")?;
        if ty.is_floating() {
            writeln!(self.output, "\tmovsd {addr}, %xmm0")?;
            if let Some(d) = dest {
                self.store_xmm("%xmm0", d)?;
            }
        } else {
            writeln!(self.output, "\tmovq {addr}, %rax")?;
            if let Some(d) = dest {
                self.store_reg("%rax", d)?;
            }
        }
        Ok(())
    }

    fn emit_store(&mut self, ty: &Type, address: &Operand, value: &Operand) -> Result<(), CompileError> {
        let addr = self.resolve_address(address, "%rcx")?;
        if ty.is_floating() {
            self.load_float_into(value, "%xmm0")?;
            writeln!(self.output, "\tmovsd %xmm0, {addr}")?;
        } else {
            self.load_into(value, "%rax")?;
            writeln!(self.output, "\tmovq %rax, {addr}")?;
        }
        Ok(())
    }

    fn emit_addrof(&mut self, dest: Option<&str>, base: &Operand, offset: &Operand) -> Result<(), CompileError> {
        let Some(d) = dest else { return Ok(()) };
        if self.layout.known_addrs.contains_key(d) {
            return Ok(()); // folded into a static address at layout time
        }
        self.load_into(base, "%rax")?;
        self.load_into(offset, "%rcx")?;
        writeln!(self.output, "\taddq %rcx, %rax")?;
        self.store_reg("%rax", d)?;
        Ok(())
    }

    fn emit_move(&mut self, dest: Option<&str>, ty: &Type, value: &Operand) -> Result<(), CompileError> {
        let Some(d) = dest else { return Ok(()) };
        if ty.is_floating() {
            self.load_float_into(value, "%xmm0")?;
            self.store_xmm("%xmm0", d)?;
        } else {
            self.load_into(value, "%rax")?;
            self.store_reg("%rax", d)?;
        }
        Ok(())
    }

    fn emit_convert(&mut self, dest: Option<&str>, from: &Type, to: &Type, value: &Operand) -> Result<(), CompileError> {
        let Some(d) = dest else { return Ok(()) };
        match (from.is_floating(), to.is_floating()) {
            (true, false) => {
                self.load_float_into(value, "%xmm0")?;
                writeln!(self.output, "\tcvttsd2siq %xmm0, %rax")?;
                self.store_reg("%rax", d)?;
            }
            (false, true) => {
                self.load_into(value, "%rax")?;
                writeln!(self.output, "\tcvtsi2sdq %rax, %xmm0")?;
                self.store_xmm("%xmm0", d)?;
            }
            (true, true) => {
                self.load_float_into(value, "%xmm0")?;
                self.store_xmm("%xmm0", d)?;
            }
            (false, false) => {
                self.load_into(value, "%rax")?;
                match to.size_in_bytes(self.structs) {
                    1 => writeln!(self.output, "\tmovsbq %al, %rax")?,
                    2 => writeln!(self.output, "\tmovswq %ax, %rax")?,
                    4 => writeln!(self.output, "\tmovslq %eax, %rax")?,
                    _ => {}
                }
                self.store_reg("%rax", d)?;
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, dest: Option<&str>, callee: &str, args: &[Operand], ty: &Type) -> Result<(), CompileError> {
        let mut stack_args = Vec::new();
        let mut int_idx = 0;
        let mut sse_idx = 0;
        for a in args {
            if a.ty().is_floating() {
                if sse_idx < SSE_ARG_REGS.len() {
                    sse_idx += 1;
                } else {
                    stack_args.push(a.clone());
                }
            } else if int_idx < INT_ARG_REGS.len() {
                int_idx += 1;
            } else {
                stack_args.push(a.clone());
            }
        }

        let needs_pad = stack_args.len() % 2 == 1;
        if needs_pad {
            writeln!(self.output, "\tsubq $8, %rsp")?;
        }
        for a in stack_args.iter().rev() {
            if a.ty().is_floating() {
                self.load_float_into(a, "%xmm0")?;
                writeln!(self.output, "\tsubq $8, %rsp")?;
                writeln!(self.output, "\tmovsd %xmm0, (%rsp)")?;
            } else {
                self.load_into(a, "%rax")?;
                writeln!(self.output, "\tpushq %rax")?;
            }
        }

        let mut int_idx = 0;
        let mut sse_idx = 0;
        for a in args {
            if a.ty().is_floating() {
                if sse_idx < SSE_ARG_REGS.len() {
                    self.load_float_into(a, SSE_ARG_REGS[sse_idx])?;
                    sse_idx += 1;
                }
            } else if int_idx < INT_ARG_REGS.len() {
                self.load_into(a, INT_ARG_REGS[int_idx])?;
                int_idx += 1;
            }
        }

        writeln!(self.output, "\tmovb ${}, %al", sse_idx.min(8))?;
        let target = if self.externs.contains(callee) { format!("{callee}@PLT") } else { callee.to_string() };
        writeln!(self.output, "\tcall {target}")?;

        let popped = stack_args.len() as i64 * 8 + if needs_pad { 8 } else { 0 };
        if popped > 0 {
            writeln!(self.output, "\taddq ${popped}, %rsp")?;
        }

        if let Some(d) = dest {
            if ty.is_floating() {
                self.store_xmm("%xmm0", d)?;
            } else {
                self.store_reg("%rax", d)?;
            }
        }
        Ok(())
    }

    fn emit_terminator(&mut self, f: &IrFunction, term: &Terminator) -> Result<(), CompileError> {
        match term {
            Terminator::Branch { target } => writeln!(self.output, "\tjmp .L{}_{}", f.name, target)?,
            Terminator::CondBranch { cond, then_label, else_label } => {
                self.load_into(cond, "%rax")?;
                writeln!(self.output, "\ttestq %rax, %rax")?;
                writeln!(self.output, "\tjz .L{}_{}", f.name, else_label)?;
                writeln!(self.output, "\tjmp .L{}_{}", f.name, then_label)?;
            }
            Terminator::Return { value } => {
                if let Some(v) = value {
                    if v.ty().is_floating() {
                        self.load_float_into(v, "%xmm0")?;
                    } else {
                        self.load_into(v, "%rax")?;
                    }
                }
                writeln!(self.output, "\tmovq %rbp, %rsp")?;
                writeln!(self.output, "\tpopq %rbp")?;
                writeln!(self.output, "\tret")?;
            }
            Terminator::Unset => {
                return Err(CompileError::Internal(format!("block in function '{}' has no terminator", f.name)));
            }
        }
        Ok(())
    }

    // ---- globals/strings ------------------------------------------------

    fn emit_globals(&mut self, globals: &[GlobalVar]) -> Result<(), CompileError> {
        if globals.is_empty() {
            return Ok(());
        }
        writeln!(self.output, "\t.data")?;
        for g in globals {
            let size = g.ty.size_in_bytes(self.structs);
            writeln!(self.output, "\t.globl {}", g.name)?;
            writeln!(self.output, "{}:", g.name)?;
            match &g.init {
                Some(Constant::Int(v)) if size <= 8 => writeln!(self.output, "\t.quad {v}")?,
                Some(Constant::Float(v)) => writeln!(self.output, "\t.quad {}", v.to_bits())?,
                _ => writeln!(self.output, "\t.zero {}", size.max(8))?,
            }
        }
        Ok(())
    }

    fn emit_strings(&mut self, strings: &[StringLiteral]) -> Result<(), CompileError> {
        if strings.is_empty() && self.float_consts.is_empty() {
            return Ok(());
        }
        writeln!(self.output, "\t.section .rodata")?;
        for s in strings {
            writeln!(self.output, "{}:", s.label)?;
            writeln!(self.output, "\t.string {:?}", s.value)?;
        }
        for (label, bits) in &self.float_consts {
            writeln!(self.output, "{label}:")?;
            writeln!(self.output, "\t.quad {bits}")?;
        }
        Ok(())
    }
}

/// The `-O2` peephole pass, applied to the emitted assembly text.
///
/// Runs to a fixpoint since collapsing one pair of instructions can expose
/// another (e.g. a `movq %rax, %rax` left behind by an earlier collapse).
fn apply_peephole(text: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    loop {
        let mut out = Vec::with_capacity(lines.len());
        let mut changed = false;
        let mut i = 0;
        while i < lines.len() {
            let cur = lines[i].trim();

            if cur == "movq %rax, %rax" {
                changed = true;
                i += 1;
                continue;
            }

            if let Some(rest) = cur.strip_prefix("imulq $") {
                if let Some((imm, reg)) = rest.split_once(", ") {
                    if let Ok(v) = imm.parse::<i64>() {
                        if v > 0 && (v & (v - 1)) == 0 {
                            out.push(format!("\tshlq ${}, {reg}", v.trailing_zeros()));
                            changed = true;
                            i += 1;
                            continue;
                        }
                    }
                }
            }

            if let Some(reg) = cur.strip_prefix("addq $0, ").or_else(|| cur.strip_prefix("subq $0, ")) {
                let _ = reg;
                changed = true;
                i += 1;
                continue;
            }

            if i + 1 < lines.len() {
                let next = lines[i + 1].trim().to_string();
                if let Some(src) = cur.strip_prefix("movq ").and_then(|s| s.strip_suffix(", %rax")) {
                    if next == format!("movq %rax, {src}") {
                        changed = true;
                        i += 2;
                        continue;
                    }
                }
                if let Some(dst) = cur.strip_prefix("movq %rax, ") {
                    if next == format!("movq {dst}, %rax") {
                        out.push(lines[i].clone());
                        changed = true;
                        i += 2;
                        continue;
                    }
                }
            }

            out.push(lines[i].clone());
            i += 1;
        }
        lines = out;
        if !changed {
            break;
        }
    }
    let mut s = lines.join("\n");
    s.push('\n');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, SourceLocation};
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::semantic::Analyzer;
    use std::path::PathBuf;

    fn compile(src: &str, opt: crate::config::OptLevel) -> String {
        let mut diags = Diagnostics::default();
        let tokens = Lexer::new(src, "t.c").lex_all(&mut diags);
        let mut tu = Parser::new(tokens, &mut diags).parse();
        let mut analyzer = Analyzer::new(&mut diags);
        analyzer.analyze(&mut tu);
        assert!(!diags.has_errors(), "unexpected errors: {:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let structs = analyzer.into_struct_table();
        let mut module = crate::ir_gen::IrGen::new(&structs).generate(&tu);
        crate::optimizer::optimize(&mut module, opt, &mut diags);
        CodeGen::new(&structs, opt).generate(&module).expect("codegen should not fail on a well-formed module")
    }

    #[test]
    fn simple_return_emits_prologue_and_epilogue() {
        let asm = compile("int main(void) { return 42; }", crate::config::OptLevel::O0);
        assert!(asm.contains("main:"));
        assert!(asm.contains("pushq %rbp"));
        assert!(asm.contains("popq %rbp"));
        assert!(asm.contains("ret"));
        assert!(asm.contains("movq $42, %rax"));
    }

    #[test]
    fn call_to_extern_uses_plt() {
        let asm = compile("extern int puts(char *s); int main(void) { return puts(\"hi\"); }", crate::config::OptLevel::O0);
        assert!(asm.contains("call puts@PLT"));
    }

    #[test]
    fn string_literal_lands_in_rodata() {
        let asm = compile("extern int puts(char *s); int main(void) { puts(\"hi\"); return 0; }", crate::config::OptLevel::O0);
        assert!(asm.contains(".section .rodata"));
        assert!(asm.contains(".string \"hi\""));
    }

    #[test]
    fn o2_rewrites_power_of_two_multiply_and_drops_add_zero() {
        let src = "int u(void) { int x; x = 2 + 3; int y; y = x * 8; int z; z = y + 0; return z; }";
        let asm = compile(src, crate::config::OptLevel::O2);
        assert!(!asm.contains("addq $0,"));
        assert!(!asm.contains("imulq $8,"));
        assert!(asm.contains("shlq $3,"));
    }

    #[test]
    fn global_variable_emitted_in_data_section() {
        let asm = compile("int counter = 7; int main(void) { return counter; }", crate::config::OptLevel::O0);
        assert!(asm.contains("\t.data"));
        assert!(asm.contains("counter:"));
        assert!(asm.contains(".quad 7"));
    }

    #[test]
    fn unterminated_block_is_an_internal_error_not_a_diagnostic() {
        let structs = crate::types::StructTable::new();
        let f = IrFunction {
            name: "f".into(),
            return_type: Type::void(),
            params: vec![],
            is_variadic: false,
            blocks: vec![BasicBlock::new("entry")],
        };
        let module = Module { functions: vec![f], strings: vec![], globals: vec![] };
        let err = CodeGen::new(&structs, crate::config::OptLevel::O0).generate(&module);
        assert!(err.is_err());
    }

    #[test]
    fn peephole_removes_self_move() {
        let text = "\tmovq %rax, %rax\n\tret\n";
        let out = apply_peephole(text);
        assert!(!out.contains("movq %rax, %rax"));
        assert!(out.contains("ret"));
    }

    #[test]
    fn float_comparison_uses_unsigned_unordered_setcc() {
        let src = "int lt(double a, double b) { return a < b; } int gt(double a, double b) { return a > b; }";
        let asm = compile(src, crate::config::OptLevel::O0);
        assert!(asm.contains("ucomisd"));
        assert!(asm.contains("setb %al"));
        assert!(asm.contains("seta %al"));
        assert!(!asm.contains("setl %al"));
        assert!(!asm.contains("setg %al"));
    }

    #[test]
    fn mixed_int_and_double_arithmetic_inserts_explicit_conversion() {
        let src = "int main(void) { double d; d = 1.5; int i; i = 2; double r; r = d + i; return (int)r; }";
        let asm = compile(src, crate::config::OptLevel::O0);
        assert!(asm.contains("cvtsi2sdq"));
        assert!(asm.contains("addsd"));
    }

    fn _unused(_: SourceLocation) {
        let _ = PathBuf::new();
    }
}
