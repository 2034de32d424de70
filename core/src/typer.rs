//! Name resolution and type checking.
//!
//! Split into two passes, same as the predecessor split a declaration pass
//! (`SymbolTable::decl*`) from `Typer::checkTypes`/`inferType`:
//!
//! 1. [Binder] walks the [Program] once, populating the [TypeRegistry] and
//!    [SymbolTable] — struct decls/defs, globals, and each function's
//!    signature plus every local declared anywhere in its body.
//! 2. [Typer] walks it again, filling in every [Expr]'s cached `ty` and
//!    checking that every operation is applied to operands of a sensible
//!    type.
//!
//! Binary-operator and cast rules mirror `typer.cc`'s `inferType`: pointer
//! arithmetic is allowed against an int or another pointer, `+ - * /` on
//! numeric operands keep the left operand's type, and all other binary
//! operators always produce `bool`.

use crate::ast::*;
use crate::error::{SymbolError, TypeError};
use crate::symbols::{FuncId, SymbolTable};
use crate::types::{TypeData, TypeId, TypeRegistry};
use crate::util::Position;

pub struct Binder<'a> {
    pub table: &'a mut SymbolTable,
    pub types: &'a mut TypeRegistry,
}

impl<'a> Binder<'a> {
    pub fn new(table: &'a mut SymbolTable, types: &'a mut TypeRegistry) -> Self {
        Self { table, types }
    }

    pub fn bind(&mut self, program: &Program) -> Result<(), (SymbolError, Position)> {
        // Structs first, so every function signature can reference them.
        for item in &program.items {
            match &item.kind {
                Item::StructDecl(name) => {
                    self.types.get_struct(item.pos.clone(), name);
                }
                Item::StructDef(name, fields) => {
                    let resolved: Vec<(String, TypeId)> = fields
                        .iter()
                        .map(|(n, t)| (n.clone(), self.resolve_type(t, &item.pos)))
                        .collect();
                    // Struct errors surface at the typer stage (they're
                    // TypeErrors, not SymbolErrors); ignore them here and
                    // let `TypeRegistry::unfilled_structs` catch residue.
                    let _ = self.types.define_struct(item.pos.clone(), name, resolved);
                }
                _ => {}
            }
        }

        for item in &program.items {
            match &item.kind {
                Item::GlobalVar(name, ty, _) => {
                    let ty = self.resolve_type(ty, &item.pos);
                    self.table
                        .decl_global(item.pos.clone(), name.clone(), ty)
                        .map_err(|e| (e, item.pos.clone()))?;
                }
                Item::Func(f) => {
                    let ret = self.resolve_type(&f.return_type, &f.pos);
                    let id = self
                        .table
                        .decl_func(f.pos.clone(), f.name.clone(), ret)
                        .map_err(|e| (e, f.pos.clone()))?;
                    for (pname, pty) in &f.params {
                        let pty = self.resolve_type(pty, &f.pos);
                        self.table
                            .decl_arg(f.pos.clone(), pname.clone(), id, pty)
                            .map_err(|e| (e, f.pos.clone()))?;
                    }
                    self.bind_locals(id, &f.body)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn bind_locals(&mut self, func: FuncId, stmts: &[Stmt]) -> Result<(), (SymbolError, Position)> {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::VarDecl(name, ty, _) => {
                    let ty = self.resolve_type(ty, &stmt.pos);
                    self.table
                        .decl_local(stmt.pos.clone(), name.clone(), func, ty)
                        .map_err(|e| (e, stmt.pos.clone()))?;
                }
                StmtKind::Block(inner) => self.bind_locals(func, inner)?,
                StmtKind::If(_, then_branch, else_branch) => {
                    self.bind_locals(func, std::slice::from_ref(then_branch))?;
                    if let Some(else_branch) = else_branch {
                        self.bind_locals(func, std::slice::from_ref(else_branch))?;
                    }
                }
                StmtKind::While(_, body) => self.bind_locals(func, std::slice::from_ref(body))?,
                _ => {}
            }
        }
        Ok(())
    }

    fn resolve_type(&mut self, ty: &TypeExpr, pos: &Position) -> TypeId {
        match ty {
            TypeExpr::Name(name) => match name.as_str() {
                "void" => TypeRegistry::VOID,
                "bool" => TypeRegistry::BOOL,
                "char" => TypeRegistry::CHAR,
                "int" => TypeRegistry::INT,
                _ => self.types.get_struct(pos.clone(), name),
            },
            TypeExpr::Ptr(inner) => {
                let inner = self.resolve_type(inner, pos);
                self.types.ptr_to(inner)
            }
        }
    }
}

pub struct Typer<'a> {
    table: &'a SymbolTable,
    types: &'a TypeRegistry,
    cur_func: Option<FuncId>,
}

impl<'a> Typer<'a> {
    pub fn new(table: &'a SymbolTable, types: &'a TypeRegistry) -> Self {
        Self { table, types, cur_func: None }
    }

    pub fn check_program(&mut self, program: &mut Program) -> Result<(), (TypeError, Position)> {
        for item in &mut program.items {
            if let Item::Func(f) = &mut item.kind {
                self.cur_func = self.table.get_func(&f.name);
                self.check_block(&mut f.body)?;
                self.cur_func = None;
            }
        }
        if let Some((name, pos)) = self.types.unfilled_structs().into_iter().next() {
            return Err((TypeError::UnfilledStruct(name), pos));
        }
        Ok(())
    }

    fn check_block(&mut self, stmts: &mut [Stmt]) -> Result<(), (TypeError, Position)> {
        for stmt in stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Result<(), (TypeError, Position)> {
        match &mut stmt.kind {
            StmtKind::Expr(e) => {
                self.infer(e)?;
            }
            StmtKind::Assign(lhs, rhs) => {
                if !is_lvalue(lhs) {
                    return Err((TypeError::NotAnLvalue, lhs.pos.clone()));
                }
                let lhs_ty = self.infer(lhs)?;
                let rhs_ty = self.infer(rhs)?;
                if !self.assignable(lhs_ty, rhs_ty) {
                    return Err((
                        TypeError::Mismatch {
                            expected: self.types.display(lhs_ty),
                            found: self.types.display(rhs_ty),
                        },
                        stmt.pos.clone(),
                    ));
                }
            }
            StmtKind::VarDecl(_, ty, Some(init)) => {
                let declared = self.resolve_type_ref(ty);
                let found = self.infer(init)?;
                if !self.assignable(declared, found) {
                    return Err((
                        TypeError::Mismatch {
                            expected: self.types.display(declared),
                            found: self.types.display(found),
                        },
                        init.pos.clone(),
                    ));
                }
            }
            StmtKind::VarDecl(_, _, None) => {}
            StmtKind::Block(inner) => self.check_block(inner)?,
            StmtKind::If(cond, then_branch, else_branch) => {
                let cond_ty = self.infer(cond)?;
                if cond_ty != TypeRegistry::BOOL {
                    return Err((
                        TypeError::Mismatch {
                            expected: "bool".to_string(),
                            found: self.types.display(cond_ty),
                        },
                        cond.pos.clone(),
                    ));
                }
                self.check_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch)?;
                }
            }
            StmtKind::While(cond, body) => {
                let cond_ty = self.infer(cond)?;
                if cond_ty != TypeRegistry::BOOL {
                    return Err((
                        TypeError::Mismatch {
                            expected: "bool".to_string(),
                            found: self.types.display(cond_ty),
                        },
                        cond.pos.clone(),
                    ));
                }
                self.check_stmt(body)?;
            }
            StmtKind::Return(value) => {
                let func = self.cur_func.map(|id| self.table.func(id));
                let expected = func.map(|f| f.return_type).unwrap_or(TypeRegistry::VOID);
                match value {
                    Some(expr) => {
                        let found = self.infer(expr)?;
                        if !self.assignable(expected, found) {
                            return Err((
                                TypeError::Mismatch {
                                    expected: self.types.display(expected),
                                    found: self.types.display(found),
                                },
                                stmt.pos.clone(),
                            ));
                        }
                    }
                    None if expected != TypeRegistry::VOID => {
                        return Err((
                            TypeError::Mismatch {
                                expected: self.types.display(expected),
                                found: "void".to_string(),
                            },
                            stmt.pos.clone(),
                        ));
                    }
                    None => {}
                }
            }
            StmtKind::Asm(_) => {}
        }
        Ok(())
    }

    fn infer(&mut self, expr: &mut Expr) -> Result<TypeId, (TypeError, Position)> {
        let ty = self.infer_kind(&mut expr.kind, &expr.pos)?;
        expr.ty = Some(ty);
        Ok(ty)
    }

    fn infer_kind(
        &mut self,
        kind: &mut ExprKind,
        pos: &Position,
    ) -> Result<TypeId, (TypeError, Position)> {
        Ok(match kind {
            ExprKind::Int(_) => TypeRegistry::INT,
            ExprKind::Bool(_) => TypeRegistry::BOOL,
            ExprKind::Char(_) => TypeRegistry::CHAR,
            ExprKind::Str(_) => self.char_ptr(),
            ExprKind::Array(values, _) => {
                let mut elem = TypeRegistry::INT;
                for (i, v) in values.iter_mut().enumerate() {
                    let t = self.infer(v)?;
                    if i == 0 {
                        elem = t;
                    }
                }
                self.ptr_to_existing(elem)
            }
            ExprKind::Ident(name) => {
                self.table
                    .get_var(name, self.cur_func)
                    .map(|v| v.ty)
                    .ok_or_else(|| {
                        (
                            TypeError::Mismatch {
                                expected: "a declared variable".to_string(),
                                found: format!("undefined `{}`", name),
                            },
                            pos.clone(),
                        )
                    })?
            }
            ExprKind::Paren(inner) => self.infer(inner)?,
            ExprKind::Unary(op, rhs) => {
                if matches!(op, UnOp::AddrOf) && !is_lvalue(rhs) {
                    return Err((TypeError::NotAnLvalue, rhs.pos.clone()));
                }
                let rhs_ty = self.infer(rhs)?;
                match op {
                    UnOp::Neg => {
                        if rhs_ty != TypeRegistry::INT {
                            return Err((
                                TypeError::Mismatch {
                                    expected: "int".to_string(),
                                    found: self.types.display(rhs_ty),
                                },
                                pos.clone(),
                            ));
                        }
                        rhs_ty
                    }
                    UnOp::Not => {
                        if rhs_ty != TypeRegistry::BOOL {
                            return Err((
                                TypeError::Mismatch {
                                    expected: "bool".to_string(),
                                    found: self.types.display(rhs_ty),
                                },
                                pos.clone(),
                            ));
                        }
                        TypeRegistry::BOOL
                    }
                    UnOp::Deref => self.types.deref_target(rhs_ty).ok_or_else(|| {
                        (
                            TypeError::NotIndexable { ty: self.types.display(rhs_ty) },
                            pos.clone(),
                        )
                    })?,
                    UnOp::AddrOf => self.ptr_to_existing(rhs_ty),
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs_ty = self.infer(lhs)?;
                let rhs_ty = self.infer(rhs)?;
                self.infer_binary(*op, lhs_ty, rhs_ty, pos)?
            }
            ExprKind::Call(name, args) => {
                let func_id = self.table.get_func(name).ok_or_else(|| {
                    (
                        TypeError::Mismatch {
                            expected: "a declared function".to_string(),
                            found: format!("undefined `{}`", name),
                        },
                        pos.clone(),
                    )
                })?;
                let func = self.table.func(func_id);
                if func.args.len() != args.len() {
                    return Err((
                        TypeError::WrongArgCount { expected: func.args.len(), found: args.len() },
                        pos.clone(),
                    ));
                }
                let expected: Vec<TypeId> = func.args.iter().map(|a| a.ty).collect();
                for (arg, expected_ty) in args.iter_mut().zip(expected.iter()) {
                    let found = self.infer(arg)?;
                    if !self.assignable(*expected_ty, found) {
                        return Err((
                            TypeError::Mismatch {
                                expected: self.types.display(*expected_ty),
                                found: self.types.display(found),
                            },
                            arg.pos.clone(),
                        ));
                    }
                }
                func.return_type
            }
            ExprKind::Cast(ty_expr, value) => {
                let from = self.infer(value)?;
                let to = self.resolve_type_ref(ty_expr);
                if self.types.is_struct(from) || self.types.is_struct(to) {
                    return Err((
                        TypeError::InvalidCast {
                            from: self.types.display(from),
                            to: self.types.display(to),
                        },
                        pos.clone(),
                    ));
                }
                to
            }
        })
    }

    fn infer_binary(
        &self,
        op: BinOp,
        lhs: TypeId,
        rhs: TypeId,
        pos: &Position,
    ) -> Result<TypeId, (TypeError, Position)> {
        let is_ptr = |t: TypeId| matches!(self.types.get(t), TypeData::Ptr(_));
        let is_numeric = |t: TypeId| t == TypeRegistry::INT || t == TypeRegistry::CHAR;

        if is_ptr(lhs) {
            if !(is_numeric(rhs) || is_ptr(rhs)) {
                return Err((
                    TypeError::Mismatch {
                        expected: "int or pointer".to_string(),
                        found: self.types.display(rhs),
                    },
                    pos.clone(),
                ));
            }
            return Ok(match op {
                BinOp::Add | BinOp::Sub => lhs,
                _ => TypeRegistry::BOOL,
            });
        }

        if is_numeric(lhs) {
            if !(is_numeric(rhs) || is_ptr(rhs)) {
                return Err((
                    TypeError::Mismatch {
                        expected: "int or pointer".to_string(),
                        found: self.types.display(rhs),
                    },
                    pos.clone(),
                ));
            }
            return Ok(match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                    if is_ptr(rhs) {
                        rhs
                    } else {
                        lhs
                    }
                }
                _ => TypeRegistry::BOOL,
            });
        }

        if lhs == TypeRegistry::BOOL && rhs == TypeRegistry::BOOL {
            return Ok(TypeRegistry::BOOL);
        }

        Err((
            TypeError::Mismatch {
                expected: self.types.display(lhs),
                found: self.types.display(rhs),
            },
            pos.clone(),
        ))
    }

    /// Assignability: types must match exactly, with one relaxation —
    /// a `*void` value may flow into any pointer-typed slot (void-pointer
    /// weakening, spec §4.6). The reverse (assigning `*T` into a `*void`
    /// slot) is NOT allowed by that rule, only `*void` into `*T`.
    fn assignable(&self, target: TypeId, value: TypeId) -> bool {
        if target == value {
            return true;
        }
        let is_void_ptr = matches!(
            self.types.get(value),
            TypeData::Ptr(inner) if *inner == TypeRegistry::VOID
        );
        is_void_ptr && matches!(self.types.get(target), TypeData::Ptr(_))
    }

    /// Resolves a type as written in a `cast(T)` expression. By the time the
    /// typer runs, every named type has already been interned by [Binder],
    /// so this never needs to create one.
    fn resolve_type_ref(&self, ty: &TypeExpr) -> TypeId {
        match ty {
            TypeExpr::Name(name) => match name.as_str() {
                "void" => TypeRegistry::VOID,
                "bool" => TypeRegistry::BOOL,
                "char" => TypeRegistry::CHAR,
                "int" => TypeRegistry::INT,
                _ => self.types.find_struct(name).unwrap_or(TypeRegistry::VOID),
            },
            TypeExpr::Ptr(inner) => {
                let inner = self.resolve_type_ref(inner);
                self.ptr_to_existing(inner)
            }
        }
    }

    fn char_ptr(&self) -> TypeId {
        self.ptr_to_existing(TypeRegistry::CHAR)
    }

    /// Looks up the pointer type for `inner` without creating one. The
    /// typer only ever needs pointer types [Binder] already interned while
    /// resolving declared types, so a read-only scan is enough here.
    fn ptr_to_existing(&self, inner: TypeId) -> TypeId {
        self.types
            .iter()
            .find_map(|(idx, data)| match data {
                TypeData::Ptr(i) if *i == inner => Some(idx),
                _ => None,
            })
            .unwrap_or(inner)
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Ident(_)) || matches!(&expr.kind, ExprKind::Unary(UnOp::Deref, _))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{self, IncludeResolver};

    struct NoIncludes;
    impl IncludeResolver for NoIncludes {
        fn resolve(&self, _path: &str) -> Result<String, String> {
            Err("no includes in this test".to_string())
        }
    }

    fn check(src: &str) -> Result<(), String> {
        let mut table = SymbolTable::new();
        let mut types = TypeRegistry::new();
        let mut program = parser::parse_program(src, "t.wat", &NoIncludes, &mut table)
            .map_err(|(e, _)| format!("{:?}", e))?;
        Binder::new(&mut table, &mut types)
            .bind(&program)
            .map_err(|(e, _)| format!("{:?}", e))?;
        Typer::new(&table, &types)
            .check_program(&mut program)
            .map_err(|(e, _)| format!("{:?}", e))
    }

    #[test]
    fn assigns_matching_types() {
        check("func main() { var x: int = 1; x = 2; }").unwrap();
    }

    #[test]
    fn assignment_mismatch_is_rejected() {
        assert!(check("func main() { var x: int = 1; x = true; }").is_err());
    }

    #[test]
    fn if_condition_must_be_bool() {
        assert!(check("func main() { if (1) { } }").is_err());
        check("func main() { if (true) { } }").unwrap();
    }

    #[test]
    fn call_arg_count_is_checked() {
        assert!(check("func f(a: int) { } func main() { f(); }").is_err());
        check("func f(a: int) { } func main() { f(1); }").unwrap();
    }

    #[test]
    fn struct_pointer_var_decl_is_well_typed() {
        check(
            "struct Point { x: int; y: int; } \
             func main() { var p: *Point; var q: *Point = p; }",
        )
        .unwrap();
    }

    #[test]
    fn address_of_non_lvalue_is_rejected() {
        assert!(check("func main() { var x: *int = &1; }").is_err());
        check("func main() { var x: int = 1; var p: *int = &x; }").unwrap();
    }

    #[test]
    fn struct_cast_is_rejected() {
        assert!(check(
            "struct Point { x: int; y: int; } \
             func main() { var p: Point; var v: int = cast(int) p; }"
        )
        .is_err());
    }

    #[test]
    fn unfilled_struct_is_an_error() {
        assert!(check("struct Point; func main() { var p: *Point; }").is_err());
    }

    #[test]
    fn void_pointer_weakens_into_any_pointer() {
        check(
            "func main() { \
                var v: *void; var p: *int; \
                p = v; \
             }",
        )
        .unwrap();
    }

    #[test]
    fn non_void_pointer_mismatch_still_rejected() {
        assert!(check(
            "func main() { var p: *int; var c: *char; p = c; }"
        )
        .is_err());
    }
}
