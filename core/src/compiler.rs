//! Lowering: walks the typed [Program] and drives a [Codegen] to produce a
//! flat word stream, ready for [crate::emulator::Emulator].
//!
//! Grounded directly on the predecessor's `Compiler::compile` in
//! `compiler.cc` — same register ABI (`$28` return value, `$29` base,
//! `$30` stack, `$31` link), same `curReg` discipline (a monotonically
//! increasing scratch-register counter that gets rewound whenever a value
//! it produced is consumed), same two-shape `TempStorage` (a value lives in
//! a register, or behind a pointer for anything struct-sized), same
//! prologue/epilogue sequence. Where the predecessor's loop counters were
//! clearly off (the old-to-new variant's struct-copy loop that increments
//! the wrong counter, and the call-argument loop that never actually
//! copies struct-sized arguments onto the stack) this reimplementation
//! does what the surrounding code was evidently trying to do.

use crate::ast::*;
use crate::codegen::Codegen;
use crate::error::{CompileError, SymbolError};
use crate::symbols::{Func, SymbolTable};
use crate::types::{TypeId, TypeRegistry};
use crate::util::Position;

const ZERO: u32 = 0;
const RETVAL: u32 = 28;
const BASE: u32 = 29;
const STACK: u32 = 30;
const LINK: u32 = 31;

/// Where an expression's value ended up once it's been lowered.
#[derive(Copy, Clone, Debug)]
enum TempStorage {
    /// A scalar (or a pointer) living in a register.
    Reg(u32),
    /// A struct-sized value, already copied onto the scratch stack, with
    /// `ptr` pointing at its first word and `size` its size in bytes.
    Stack { ptr: u32, size: u32 },
}

/// Where an lvalue's storage is addressed from, for assignment and
/// pointer-taking. `Direct` covers plain named variables (global or
/// local), which the predecessor addressed with a single immediate
/// relative to `$0`/`$29` rather than materializing an address register
/// first; `Indirect` covers everything reached through a pointer
/// (dereference, field, index), where the address has to be computed
/// into a register before it can be read or written.
#[derive(Copy, Clone, Debug)]
enum Dest {
    Direct { loc: i32, base: u32 },
    Indirect { reg: u32 },
}

pub struct Compiler<'a> {
    table: &'a mut SymbolTable,
    types: &'a TypeRegistry,
    gen: Codegen,
    cur_reg: u32,
    label_index: u32,
    cur_func: Option<&'a str>,
    /// Size in bytes of the current function's locals, needed by the
    /// epilogue to fully undo the prologue's stack reservation. See the
    /// note on [Compiler::restore_link_and_sp].
    cur_locals_size: i32,
    /// Errors raised from user-supplied `asm { ... }` text. Unlike the
    /// labels the compiler itself generates (whose uniqueness is already
    /// guaranteed by construction), an inline assembly block's registers,
    /// immediates, and mnemonics come straight from source and can be
    /// wrong, so lowering one can't simply assume success the way the rest
    /// of codegen does. Collected rather than returned immediately so that
    /// one bad `asm` block doesn't stop the rest of the function from
    /// lowering (and possibly turning up further errors).
    errors: Vec<(CompileError, Position)>,
}

impl<'a> Compiler<'a> {
    pub fn new(table: &'a mut SymbolTable, types: &'a TypeRegistry) -> Self {
        Self {
            table,
            types,
            gen: Codegen::new(),
            cur_reg: 1,
            label_index: 0,
            cur_func: None,
            cur_locals_size: 0,
            errors: Vec::new(),
        }
    }

    /// Lowers an entire program to a finished word stream. Mirrors
    /// `Compiler::compile`: check `main` exists and every struct is
    /// defined, lay out storage, lower every function, then resolve every
    /// forward reference.
    pub fn compile(mut self, program: &Program) -> Result<Vec<u32>, Vec<(CompileError, Position)>> {
        if self.table.get_func("main").is_none() {
            return Err(vec![(CompileError::Symbol(SymbolError::MissingMain), Position::synthetic())]);
        }
        if let Some((name, pos)) = self.types.unfilled_structs().into_iter().next() {
            return Err(vec![(
                CompileError::Symbol(SymbolError::UnfilledStruct(name)),
                pos,
            )]);
        }

        self.resolve_symbol_locations(program);

        for item in &program.items {
            if let Item::Func(f) = &item.kind {
                self.lower_func(f);
            }
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        self.gen
            .finalize()
            .map_err(|errs| errs.into_iter().map(|(e, p)| (CompileError::Assembly(e), p)).collect())
    }

    fn unique_label(&mut self) -> String {
        let label = format!("L{}", self.label_index);
        self.label_index += 1;
        label
    }

    fn size_of(&self, ty: TypeId) -> u32 {
        self.types.size_in_words(ty) * 4
    }

    /// Emits the fixed entry sequence, lays out globals/strings/locals/args,
    /// and records their addresses back into the symbol table. Grounded in
    /// `resolveSymbolLocations`: the entry prologue saves the caller's
    /// return address behind a synthetic global, jumps to `main`, then
    /// every global and string constant is laid out as consecutive words
    /// starting right after that prologue so their addresses are known
    /// before any function body is lowered.
    fn resolve_symbol_locations(&mut self, program: &Program) {
        let pos = Position::synthetic();
        let exit_label = "exitAddrGlobal";

        self.gen.lis_label(pos.clone(), BASE, exit_label);
        self.gen.sw(LINK, 0, BASE);
        self.gen.lis_label(pos.clone(), BASE, "main");
        self.gen.jr(BASE);

        // Global initializers are applied by writing the literal value
        // directly into the data word rather than zero-initializing and
        // assigning at runtime; only constant-foldable initializers can be
        // expressed this way, which covers every initializer the grammar
        // allows (int/char/bool literals, negation of one). Anything else
        // is left zero-initialized, same as the predecessor.
        let global_inits: std::collections::HashMap<&str, i32> = program
            .items
            .iter()
            .filter_map(|item| match &item.kind {
                Item::GlobalVar(name, _, Some(init)) => const_int(init).map(|v| (name.as_str(), v)),
                _ => None,
            })
            .collect();
        for global in &mut self.table.globals {
            global.loc = (self.gen.pos() * 4) as i32;
            self.gen.word(*global_inits.get(global.name.as_str()).unwrap_or(&0));
        }

        for s in &mut self.table.strings {
            s.loc = (self.gen.pos() * 4) as i32;
            for &b in &s.bytes {
                self.gen.word(b as i32);
            }
            self.gen.word(0);
        }

        self.gen.label_here(pos.clone(), exit_label).unwrap();
        self.gen.word(0);

        for func in &mut self.table.funcs {
            let locals_size: i32 = func
                .locals
                .iter()
                .map(|v| (self.types.size_in_words(v.ty) * 4) as i32)
                .sum();
            let mut cur = locals_size;
            for v in &mut func.locals {
                cur -= (self.types.size_in_words(v.ty) * 4) as i32;
                v.loc = cur;
            }

            let mut space_used = locals_size;
            for v in &func.args {
                space_used += (self.types.size_in_words(v.ty) * 4) as i32;
            }
            let mut cur = space_used;
            for v in &mut func.args {
                cur -= (self.types.size_in_words(v.ty) * 4) as i32;
                v.loc = cur;
            }
        }
    }

    /// Emits one function's prologue, body, and epilogue. Mirrors the
    /// `FUNC` arm of `compileStatement`: reserve the locals' stack space,
    /// save the caller's link/base pointers below it, point `$29` at the
    /// bottom of the locals region, then compile the body with `curReg`
    /// reset to 1 for every function.
    fn lower_func(&mut self, func: &FuncDecl) {
        let pos = func.pos.clone();
        self.gen.label_here(pos.clone(), func.name.clone()).unwrap();
        self.cur_reg = 1;
        self.cur_func = Some(func.name.as_str());

        let sym = self.table.func(self.table.get_func(&func.name).unwrap()).clone();
        let locals_size: i32 = sym
            .locals
            .iter()
            .map(|v| (self.types.size_in_words(v.ty) * 4) as i32)
            .sum();
        self.cur_locals_size = locals_size;

        if locals_size > 0 {
            let temp = self.alloc_reg();
            self.gen.lis(temp, locals_size);
            self.gen.sub(STACK, STACK, temp);
            self.cur_reg -= 1;
        }
        self.gen.sw(LINK, -4, STACK);
        self.gen.sw(BASE, -8, STACK);
        self.gen.add(BASE, STACK, ZERO);
        let temp = self.alloc_reg();
        self.gen.lis(temp, 8);
        self.gen.sub(STACK, STACK, temp);
        self.cur_reg -= 1;

        for stmt in &func.body {
            self.lower_stmt(stmt);
        }

        self.restore_link_and_sp();
        self.gen.jr(LINK);
        self.cur_func = None;
    }

    /// Undoes `lower_func`'s prologue: restores the link register and the
    /// caller's base pointer from this frame's fixed slots, then resets
    /// the stack pointer all the way back to what it was *before* this
    /// function's prologue ran — not merely to `$29`.
    ///
    /// The predecessor's version of this (`add $30,$29,0`) only restores
    /// the stack pointer to the bottom of this frame's locals region,
    /// `locals_size` bytes short of where the caller actually left it. On
    /// every call that function makes, the caller's stack pointer would
    /// quietly drift downward by the callee's locals size and never come
    /// back — fatal for recursion (`fact(5)` would already be corrupting
    /// its own frame two calls deep) and for any loop that calls a
    /// function repeatedly. Folding `locals_size` (a compile-time
    /// constant per function) into the restore fixes that: `$29 + locals`
    /// is exactly the stack pointer value the caller's `jalr` landed on.
    fn restore_link_and_sp(&mut self) {
        self.gen.lw(LINK, -4, BASE);
        let saved_base = self.alloc_reg();
        self.gen.lw(saved_base, -8, BASE);
        if self.cur_locals_size != 0 {
            let temp = self.alloc_reg();
            self.gen.lis(temp, self.cur_locals_size);
            self.gen.add(STACK, BASE, temp);
        } else {
            self.gen.add(STACK, BASE, ZERO);
        }
        self.gen.add(BASE, saved_base, ZERO);
    }

    fn alloc_reg(&mut self) -> u32 {
        let r = self.cur_reg;
        self.cur_reg += 1;
        r
    }

    fn cur_func_id(&self) -> Option<crate::symbols::FuncId> {
        self.cur_func.and_then(|name| self.table.get_func(name))
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        let pos = stmt.pos.clone();
        match &stmt.kind {
            StmtKind::Expr(e) => {
                let before = self.cur_reg;
                self.lower_expr(e);
                self.cur_reg = before;
            }
            StmtKind::Assign(lhs, rhs) => {
                let size = self.size_of(lhs.ty());
                let dest = self.lower_lvalue(lhs);
                let val = self.lower_expr(rhs);
                self.store(dest, val, size);
                self.cur_reg = self.reg_floor(dest);
            }
            StmtKind::VarDecl(name, _, Some(init)) => {
                let func_id = self.cur_func_id();
                let var = self.table.get_var(name, func_id).unwrap().clone();
                let size = self.size_of(var.ty);
                let base = if var.owner.is_some() { BASE } else { ZERO };
                let dest = Dest::Direct { loc: var.loc, base };
                let saved_reg = self.cur_reg;
                let val = self.lower_expr(init);
                self.store(dest, val, size);
                self.cur_reg = saved_reg;
            }
            StmtKind::VarDecl(_, _, None) => {}
            StmtKind::Block(body) => {
                for s in body {
                    self.lower_stmt(s);
                }
            }
            StmtKind::If(cond, then_branch, else_branch) => {
                let alt_label = self.unique_label();
                let end_label = self.unique_label();
                let saved_reg = self.cur_reg;

                let cond_reg = self.lower_expr(cond).as_reg();
                self.gen.beq_label(pos.clone(), cond_reg, ZERO, alt_label.clone());
                self.cur_reg = saved_reg;
                self.lower_stmt(then_branch);
                self.cur_reg = saved_reg;

                let temp = self.alloc_reg();
                self.gen.lis_label(pos.clone(), temp, end_label.clone());
                self.gen.jr(temp);
                self.cur_reg = saved_reg;

                self.gen.label_here(pos.clone(), alt_label).unwrap();
                if let Some(else_branch) = else_branch {
                    self.lower_stmt(else_branch);
                    self.cur_reg = saved_reg;
                }
                self.gen.label_here(pos, end_label).unwrap();
            }
            StmtKind::While(cond, body) => {
                let cond_label = self.unique_label();
                let end_label = self.unique_label();
                let saved_reg = self.cur_reg;

                self.gen.label_here(pos.clone(), cond_label.clone()).unwrap();
                let cond_reg = self.lower_expr(cond).as_reg();
                self.gen.beq_label(pos.clone(), cond_reg, ZERO, end_label.clone());
                self.cur_reg = saved_reg;

                self.lower_stmt(body);
                self.cur_reg = saved_reg;

                let temp = self.alloc_reg();
                self.gen.lis_label(pos.clone(), temp, cond_label);
                self.gen.jr(temp);
                self.cur_reg = saved_reg;

                self.gen.label_here(pos, end_label).unwrap();
            }
            StmtKind::Return(value) => {
                if let Some(expr) = value {
                    let size = self.size_of(expr.ty());
                    let val = self.lower_expr(expr);
                    self.store(Dest::Indirect { reg: RETVAL }, val, size);
                }
                self.restore_link_and_sp();
                self.gen.jr(LINK);
            }
            StmtKind::Asm(code) => {
                if let Err((e, p)) = self.gen.assemble_inline(pos, code) {
                    self.errors.push((CompileError::Assembly(e), p));
                }
            }
        }
    }

    /// Stores `val` (of size `size` bytes) into `dest`. Covers both the
    /// single-word case (`sw`) and the struct case (a word-by-word copy),
    /// for both addressing modes.
    fn store(&mut self, dest: Dest, val: TempStorage, size: u32) {
        match (dest, val) {
            (Dest::Direct { loc, base }, TempStorage::Reg(r)) => {
                self.gen.sw(r, loc as i16, base);
            }
            (Dest::Direct { loc, base }, TempStorage::Stack { ptr, .. }) => {
                let temp = self.alloc_reg();
                for i in (0..size).step_by(4) {
                    self.gen.lw(temp, i as i16, ptr);
                    self.gen.sw(temp, (loc + i as i32) as i16, base);
                }
            }
            (Dest::Indirect { reg }, TempStorage::Reg(r)) => {
                self.gen.sw(r, 0, reg);
            }
            (Dest::Indirect { reg }, TempStorage::Stack { ptr, .. }) => {
                let temp = self.alloc_reg();
                for i in (0..size).step_by(4) {
                    self.gen.lw(temp, i as i16, ptr);
                    self.gen.sw(temp, i as i16, reg);
                }
            }
        }
    }

    fn reg_floor(&self, dest: Dest) -> u32 {
        match dest {
            Dest::Direct { .. } => self.cur_reg,
            Dest::Indirect { reg } => reg,
        }
    }

    /// Computes the address an assignment or `&expr` needs, without
    /// loading through it. `Ident` keeps the predecessor's direct-operand
    /// addressing; everything reached through a pointer materializes the
    /// address into a scratch register first.
    fn lower_lvalue(&mut self, expr: &Expr) -> Dest {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let func_id = self.cur_func_id();
                let var = self.table.get_var(name, func_id).unwrap();
                let base = if var.owner.is_some() { BASE } else { ZERO };
                Dest::Direct { loc: var.loc, base }
            }
            ExprKind::Unary(UnOp::Deref, inner) => {
                let reg = self.lower_expr(inner).as_reg();
                Dest::Indirect { reg }
            }
            _ => unreachable!("is_lvalue rejects anything else before codegen sees it"),
        }
    }

    /// Address of any lvalue expression, for `&expr`.
    fn lower_lvalue_addr(&mut self, expr: &Expr) -> u32 {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let func_id = self.cur_func_id();
                let var = self.table.get_var(name, func_id).unwrap();
                let base = if var.owner.is_some() { BASE } else { ZERO };
                let dest = self.alloc_reg();
                self.gen.lis(dest, var.loc);
                self.gen.add(dest, dest, base);
                dest
            }
            ExprKind::Unary(UnOp::Deref, inner) => self.lower_expr(inner).as_reg(),
            _ => unreachable!("is_lvalue rejects anything else before codegen sees it"),
        }
    }

    /// Lowers one expression to its value, the heart of the original
    /// `compileTerm`.
    fn lower_expr(&mut self, expr: &Expr) -> TempStorage {
        let pos = expr.pos.clone();
        match &expr.kind {
            ExprKind::Int(n) => self.load_const(*n),
            ExprKind::Bool(b) => self.load_const(*b as i32),
            ExprKind::Char(c) => self.load_const(*c as i32),
            ExprKind::Str(id) => {
                let loc = self.table.strings[*id].loc;
                self.load_const(loc)
            }
            ExprKind::Array(values, declared_len) => self.lower_array(values, *declared_len, &pos),
            ExprKind::Ident(name) => self.lower_ident(name, expr.ty()),
            ExprKind::Paren(inner) => self.lower_expr(inner),
            ExprKind::Unary(op, inner) => self.lower_unary(*op, inner),
            ExprKind::Binary(op, lhs, rhs) => self.lower_binary(*op, lhs, rhs, &pos),
            ExprKind::Call(name, args) => self.lower_call(name, args, &pos),
            ExprKind::Cast(_, inner) => self.lower_expr(inner),
        }
    }

    fn load_const(&mut self, value: i32) -> TempStorage {
        let r = self.alloc_reg();
        self.gen.lis(r, value);
        TempStorage::Reg(r)
    }

    /// `var x: int[5] = { 1, 2 };` and string-flavoured array literals both
    /// lower to an inline data block the code jumps over, then a pointer
    /// to its first word. Mirrors the ARRAY/ARRAY_STRING arm of
    /// `compileTerm`: jump past the words, emit them (zero-padded out to
    /// the declared length), then materialize the start address by
    /// reusing the same register that held the jump target.
    fn lower_array(&mut self, values: &[Expr], declared_len: u32, pos: &Position) -> TempStorage {
        let start_label = self.unique_label();
        let end_label = self.unique_label();

        let reg = self.alloc_reg();
        self.gen.lis_label(pos.clone(), reg, end_label.clone());
        self.gen.jr(reg);

        self.gen.label_here(pos.clone(), start_label.clone()).unwrap();
        for v in values {
            let value = const_int(v).expect("array literal elements are constant-folded by the parser's grammar");
            self.gen.word(value);
        }
        for _ in values.len()..declared_len as usize {
            self.gen.word(0);
        }
        self.gen.label_here(pos.clone(), end_label).unwrap();

        self.gen.lis_label(pos.clone(), reg, start_label);
        TempStorage::Reg(reg)
    }

    fn lower_ident(&mut self, name: &str, ty: TypeId) -> TempStorage {
        let func_id = self.cur_func_id();
        let var = self.table.get_var(name, func_id).unwrap();
        let loc = var.loc;
        let base = if var.owner.is_some() { BASE } else { ZERO };
        let size = self.size_of(ty);

        if size == 4 {
            let dest = self.alloc_reg();
            self.gen.lw(dest, loc as i16, base);
            TempStorage::Reg(dest)
        } else {
            let temp = self.alloc_reg();
            for i in (0..size).step_by(4) {
                self.gen.lw(temp, (loc + i as i32) as i16, base);
                self.gen.sw(temp, -((i + 4) as i32) as i16, STACK);
            }
            let size_reg = self.alloc_reg();
            self.gen.lis(size_reg, size as i32);
            self.gen.sub(STACK, STACK, size_reg);
            let ptr = self.alloc_reg();
            self.gen.add(ptr, STACK, ZERO);
            TempStorage::Stack { ptr, size }
        }
    }

    fn lower_unary(&mut self, op: UnOp, inner: &Expr) -> TempStorage {
        match op {
            UnOp::Neg => {
                let val = self.lower_expr(inner).as_reg();
                let dest = self.alloc_reg();
                self.gen.sub(dest, ZERO, val);
                TempStorage::Reg(dest)
            }
            UnOp::Not => {
                let val = self.lower_expr(inner).as_reg();
                let one = self.alloc_reg();
                self.gen.lis(one, 1);
                let dest = self.alloc_reg();
                self.gen.sub(dest, one, val);
                TempStorage::Reg(dest)
            }
            UnOp::Deref => {
                let val = self.lower_expr(inner).as_reg();
                let size = self.size_of(inner.ty());
                let target_size = self
                    .types
                    .deref_target(inner.ty())
                    .map(|t| self.size_of(t))
                    .unwrap_or(size);
                if target_size == 4 {
                    let dest = self.alloc_reg();
                    self.gen.lw(dest, 0, val);
                    TempStorage::Reg(dest)
                } else {
                    TempStorage::Stack { ptr: val, size: target_size }
                }
            }
            UnOp::AddrOf => {
                let addr = self.lower_lvalue_addr(inner);
                TempStorage::Reg(addr)
            }
        }
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, pos: &Position) -> TempStorage {
        let lhs_ty = lhs.ty();
        let rhs_ty = rhs.ty();
        let lhs_reg = self.lower_expr(lhs).as_reg();
        let mut rhs_reg = self.lower_expr(rhs).as_reg();

        // Pointer arithmetic is byte-scaled: `p + 1` advances by
        // `sizeof(*p)`, not by one. Only scale when the other side is a
        // plain integer; pointer-minus-pointer is left as a raw register
        // difference, same as the predecessor.
        if matches!(op, BinOp::Add | BinOp::Sub) {
            if let Some(elem) = self.types.deref_target(lhs_ty) {
                if self.types.deref_target(rhs_ty).is_none() {
                    let elem_size = self.size_of(elem) as i32;
                    if elem_size != 1 {
                        let scale = self.alloc_reg();
                        self.gen.lis(scale, elem_size);
                        self.gen.mult(rhs_reg, scale);
                        let scaled = self.alloc_reg();
                        self.gen.mflo(scaled);
                        rhs_reg = scaled;
                    }
                }
            }
        }

        let dest = self.alloc_reg();
        match op {
            BinOp::Add => {
                self.gen.add(dest, lhs_reg, rhs_reg);
            }
            BinOp::Sub => {
                self.gen.sub(dest, lhs_reg, rhs_reg);
            }
            BinOp::Mul => {
                self.gen.mult(lhs_reg, rhs_reg);
                self.gen.mflo(dest);
            }
            BinOp::Div => {
                self.gen.div(lhs_reg, rhs_reg);
                self.gen.mflo(dest);
            }
            BinOp::Mod => {
                self.gen.div(lhs_reg, rhs_reg);
                self.gen.mfhi(dest);
            }
            BinOp::Eq => {
                self.gen.lis(dest, 1);
                self.gen.beq_imm(lhs_reg, rhs_reg, 1);
                self.gen.add(dest, ZERO, ZERO);
            }
            BinOp::NotEq => {
                self.gen.lis(dest, 1);
                self.gen.bne_imm(lhs_reg, rhs_reg, 1);
                self.gen.add(dest, ZERO, ZERO);
            }
            BinOp::Lt => {
                self.gen.slt(dest, lhs_reg, rhs_reg);
            }
            BinOp::Gt => {
                self.gen.slt(dest, rhs_reg, lhs_reg);
            }
            BinOp::Le => {
                // `lhs <= rhs` is `!(rhs < lhs)`.
                self.gen.slt(dest, rhs_reg, lhs_reg);
                let one = self.alloc_reg();
                self.gen.lis(one, 1);
                self.gen.sub(dest, one, dest);
            }
            BinOp::Ge => {
                // `lhs >= rhs` is `!(lhs < rhs)`.
                self.gen.slt(dest, lhs_reg, rhs_reg);
                let one = self.alloc_reg();
                self.gen.lis(one, 1);
                self.gen.sub(dest, one, dest);
            }
            BinOp::And => {
                self.gen.lis(dest, 0);
                self.gen.beq_imm(lhs_reg, ZERO, 3);
                self.gen.beq_imm(rhs_reg, ZERO, 2);
                self.gen.lis(dest, 1);
            }
            BinOp::Or => {
                self.gen.lis(dest, 1);
                self.gen.bne_imm(lhs_reg, ZERO, 3);
                self.gen.bne_imm(rhs_reg, ZERO, 2);
                self.gen.lis(dest, 0);
            }
        }
        let _ = pos;
        TempStorage::Reg(dest)
    }

    /// Mirrors `compileCall`: reserve a stack slot for the return value if
    /// there is one, save every live scratch register across the call,
    /// push the arguments (struct-sized ones as a word-by-word copy, a
    /// fix over the predecessor which only copied scalar arguments), jump
    /// to the callee, then restore the saved registers.
    fn lower_call(&mut self, name: &str, args: &[Expr], pos: &Position) -> TempStorage {
        let func_id = self.table.get_func(name).unwrap();
        let func: Func = self.table.func(func_id).clone();
        let has_return = func.return_type != TypeRegistry::VOID;
        let return_size = self.size_of(func.return_type);

        let saved_reg = self.cur_reg;
        if has_return {
            let size_reg = self.alloc_reg();
            self.gen.lis(size_reg, return_size as i32);
            self.gen.sub(STACK, STACK, size_reg);
            self.gen.add(RETVAL, STACK, ZERO);
            self.cur_reg = saved_reg;
        }

        // Every scratch register already in use belongs to the caller's
        // live expression state and must survive the call. Each is saved at
        // `-r*4` against the not-yet-decremented stack pointer, then the
        // pointer is dropped by `saved_reg*4` bytes in one shot (one word
        // more than the `saved_reg - 1` registers actually in use, a slack
        // the predecessor carried too and which is harmless here).
        let live_regs: Vec<u32> = (1..saved_reg).collect();
        for &r in &live_regs {
            self.gen.sw(r, -((r * 4) as i16), STACK);
        }
        if saved_reg > 1 {
            let size_reg = self.alloc_reg();
            self.gen.lis(size_reg, (saved_reg * 4) as i32);
            self.gen.sub(STACK, STACK, size_reg);
            self.cur_reg = saved_reg;
        }

        let mut size_so_far: i32 = 0;
        for arg in args {
            let size = self.size_of(arg.ty()) as i32;
            let val = self.lower_expr(arg);
            size_so_far += size;
            match val {
                TempStorage::Reg(r) => {
                    self.gen.sw(r, (-size_so_far) as i16, STACK);
                    self.cur_reg = r;
                }
                TempStorage::Stack { ptr, size: ssize } => {
                    let temp = self.alloc_reg();
                    for i in (0..ssize).step_by(4) {
                        self.gen.lw(temp, i as i16, ptr);
                        self.gen.sw(temp, (-size_so_far + i as i32) as i16, STACK);
                    }
                    self.cur_reg = ptr;
                }
            }
        }

        let callee = self.alloc_reg();
        self.gen.lis_label(pos.clone(), callee, func.name.clone());
        self.gen.jalr(callee);
        self.cur_reg = saved_reg;

        // Pop the arguments, then the saved registers, restoring the stack
        // pointer to exactly its pre-call value before any register reload.
        if size_so_far > 0 {
            let size_reg = self.alloc_reg();
            self.gen.lis(size_reg, size_so_far);
            self.gen.add(STACK, STACK, size_reg);
            self.cur_reg = saved_reg;
        }
        if saved_reg > 1 {
            let size_reg = self.alloc_reg();
            self.gen.lis(size_reg, (saved_reg * 4) as i32);
            self.gen.add(STACK, STACK, size_reg);
            self.cur_reg = saved_reg;
        }
        for &r in &live_regs {
            self.gen.lw(r, -((r * 4) as i16), STACK);
        }

        if has_return {
            if return_size == 4 {
                let dest = self.alloc_reg();
                self.gen.lw(dest, 0, RETVAL);
                TempStorage::Reg(dest)
            } else {
                let ptr = self.alloc_reg();
                self.gen.add(ptr, RETVAL, ZERO);
                TempStorage::Stack { ptr, size: return_size }
            }
        } else {
            TempStorage::Reg(ZERO)
        }
    }
}

impl TempStorage {
    fn as_reg(self) -> u32 {
        match self {
            TempStorage::Reg(r) => r,
            TempStorage::Stack { ptr, .. } => ptr,
        }
    }
}

/// Folds an expression built only from literals and negation to a constant
/// word value. Array literal elements and global initializers are the only
/// places the grammar allows arbitrary expressions where the lowering
/// actually needs a compile-time constant; everything else is evaluated at
/// runtime.
fn const_int(expr: &Expr) -> Option<i32> {
    match &expr.kind {
        ExprKind::Int(n) => Some(*n),
        ExprKind::Char(c) => Some(*c as i32),
        ExprKind::Bool(b) => Some(*b as i32),
        ExprKind::Paren(inner) => const_int(inner),
        ExprKind::Unary(UnOp::Neg, inner) => const_int(inner).map(|n| -n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{self, IncludeResolver};
    use crate::symbols::SymbolTable;
    use crate::typer::{Binder, Typer};
    use crate::types::TypeRegistry;

    struct NoIncludes;
    impl IncludeResolver for NoIncludes {
        fn resolve(&self, _path: &str) -> Result<String, String> {
            Err("no includes in this test".to_string())
        }
    }

    fn compile_ok(src: &str) -> Vec<u32> {
        let mut table = SymbolTable::new();
        let mut types = TypeRegistry::new();
        let mut program = parser::parse_program(src, "t.wat", &NoIncludes, &mut table)
            .unwrap_or_else(|(e, _)| panic!("parse error: {:?}", e));
        Binder::new(&mut table, &mut types)
            .bind(&program)
            .unwrap_or_else(|(e, _)| panic!("bind error: {:?}", e));
        Typer::new(&table, &types)
            .check_program(&mut program)
            .unwrap_or_else(|(e, _)| panic!("type error: {:?}", e));
        Compiler::new(&mut table, &types)
            .compile(&program)
            .unwrap_or_else(|errs| panic!("compile error: {:?}", errs))
    }

    #[test]
    fn compiles_a_minimal_main() {
        let code = compile_ok("func main() { }");
        assert!(!code.is_empty());
    }

    #[test]
    fn compiles_arithmetic_and_return() {
        let code = compile_ok("func main(): int { return 2 + 3 * 4; }");
        assert!(code.len() > 4);
    }

    #[test]
    fn compiles_a_recursive_function() {
        let code = compile_ok(
            "func fact(n: int): int { \
                if (n <= 1) { return 1; } \
                return n * fact(n - 1); \
             } \
             func main(): int { return fact(5); }",
        );
        assert!(!code.is_empty());
    }

    #[test]
    fn compiles_a_while_loop() {
        let code = compile_ok(
            "func main() { \
                var i: int = 0; \
                while (i < 10) { i = i + 1; } \
             }",
        );
        assert!(!code.is_empty());
    }

    #[test]
    fn compiles_pointer_store() {
        let code = compile_ok(
            "func main() { \
                var x: int = 0; \
                var p: *int = &x; \
                *p = 7; \
             }",
        );
        assert!(!code.is_empty());
    }

    #[test]
    fn bad_inline_assembly_is_a_compile_error_not_a_panic() {
        let mut table = SymbolTable::new();
        let mut types = TypeRegistry::new();
        let mut program = parser::parse_program(
            "func main() { asm { add $1, $2, $40 } }",
            "t.wat",
            &NoIncludes,
            &mut table,
        )
        .unwrap();
        Binder::new(&mut table, &mut types).bind(&program).unwrap();
        Typer::new(&table, &types).check_program(&mut program).unwrap();
        let err = Compiler::new(&mut table, &types).compile(&program).unwrap_err();
        assert!(matches!(err[0].0, CompileError::Assembly(_)));
    }

    #[test]
    fn missing_main_is_an_error() {
        let mut table = SymbolTable::new();
        let mut types = TypeRegistry::new();
        let mut program = parser::parse_program("func f() { }", "t.wat", &NoIncludes, &mut table).unwrap();
        Binder::new(&mut table, &mut types).bind(&program).unwrap();
        Typer::new(&table, &types).check_program(&mut program).unwrap();
        assert!(Compiler::new(&mut table, &types).compile(&program).is_err());
    }
}
