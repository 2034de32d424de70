//! The symbol table: global variables, functions (with their args and
//! locals), and interned string constants.
//!
//! Grounded on the predecessor's `SymbolTable`: lookup order is always
//! current-function locals, then current-function args, then globals, and a
//! local is allowed to shadow a global of the same name. Functions carry
//! their args/locals as index-based owners (`FuncId`) rather than a pointer
//! back to the struct, so nothing here borrows `self`.

use crate::error::SymbolError;
use crate::types::TypeId;
use crate::util::Position;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub struct FuncId(pub usize);

#[derive(Clone, Debug, serde::Serialize)]
pub struct Var {
    pub pos: Position,
    pub name: String,
    pub owner: Option<FuncId>,
    pub ty: TypeId,
    /// Byte offset relative to the owning function's base pointer (for
    /// globals: the global data section), filled in by storage layout.
    pub loc: i32,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct Func {
    pub pos: Position,
    pub name: String,
    pub args: Vec<Var>,
    pub locals: Vec<Var>,
    pub return_type: TypeId,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct CString {
    pub bytes: Vec<u8>,
    pub loc: i32,
}

#[derive(Default)]
pub struct SymbolTable {
    pub globals: Vec<Var>,
    pub funcs: Vec<Func>,
    pub strings: Vec<CString>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decl_func(
        &mut self,
        pos: Position,
        name: String,
        return_type: TypeId,
    ) -> Result<FuncId, SymbolError> {
        if self.funcs.iter().any(|f| f.name == name) {
            return Err(SymbolError::DuplicateFunction(name));
        }
        let id = FuncId(self.funcs.len());
        self.funcs.push(Func {
            pos,
            name,
            args: Vec::new(),
            locals: Vec::new(),
            return_type,
        });
        Ok(id)
    }

    pub fn decl_arg(
        &mut self,
        pos: Position,
        name: String,
        func: FuncId,
        ty: TypeId,
    ) -> Result<(), SymbolError> {
        let f = &mut self.funcs[func.0];
        if f.args.iter().any(|v| v.name == name) {
            return Err(SymbolError::DuplicateArg(name));
        }
        f.args.push(Var {
            pos,
            name,
            owner: Some(func),
            ty,
            loc: -1,
        });
        Ok(())
    }

    pub fn decl_local(
        &mut self,
        pos: Position,
        name: String,
        func: FuncId,
        ty: TypeId,
    ) -> Result<(), SymbolError> {
        let f = &mut self.funcs[func.0];
        if f.locals.iter().any(|v| v.name == name) {
            return Err(SymbolError::DuplicateLocal(name));
        }
        f.locals.push(Var {
            pos,
            name,
            owner: Some(func),
            ty,
            loc: -1,
        });
        Ok(())
    }

    pub fn decl_global(
        &mut self,
        pos: Position,
        name: String,
        ty: TypeId,
    ) -> Result<(), SymbolError> {
        if self.globals.iter().any(|v| v.name == name) {
            return Err(SymbolError::DuplicateGlobal(name));
        }
        self.globals.push(Var {
            pos,
            name,
            owner: None,
            ty,
            loc: -1,
        });
        Ok(())
    }

    /// Locals shadow args, which shadow globals. `func` is `None` when
    /// resolving names outside any function body.
    pub fn get_var(&self, name: &str, func: Option<FuncId>) -> Option<&Var> {
        if let Some(func) = func {
            let f = &self.funcs[func.0];
            if let Some(v) = f.locals.iter().find(|v| v.name == name) {
                return Some(v);
            }
            if let Some(v) = f.args.iter().find(|v| v.name == name) {
                return Some(v);
            }
        }
        self.globals.iter().find(|v| v.name == name)
    }

    pub fn get_func(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| f.name == name)
            .map(FuncId)
    }

    pub fn func(&self, id: FuncId) -> &Func {
        &self.funcs[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Func {
        &mut self.funcs[id.0]
    }

    /// Interns a string, reusing an existing entry with the same bytes.
    pub fn intern_string(&mut self, bytes: Vec<u8>) -> usize {
        if let Some(i) = self.strings.iter().position(|s| s.bytes == bytes) {
            return i;
        }
        self.strings.push(CString { bytes, loc: -1 });
        self.strings.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn locals_shadow_globals() {
        let mut table = SymbolTable::new();
        table
            .decl_global(Position::synthetic(), "x".into(), TypeRegistry::INT)
            .unwrap();
        let f = table
            .decl_func(Position::synthetic(), "main".into(), TypeRegistry::VOID)
            .unwrap();
        table
            .decl_local(Position::synthetic(), "x".into(), f, TypeRegistry::CHAR)
            .unwrap();

        let found = table.get_var("x", Some(f)).unwrap();
        assert_eq!(found.ty, TypeRegistry::CHAR);
    }

    #[test]
    fn duplicate_local_errors() {
        let mut table = SymbolTable::new();
        let f = table
            .decl_func(Position::synthetic(), "main".into(), TypeRegistry::VOID)
            .unwrap();
        table
            .decl_local(Position::synthetic(), "x".into(), f, TypeRegistry::INT)
            .unwrap();
        assert!(table
            .decl_local(Position::synthetic(), "x".into(), f, TypeRegistry::INT)
            .is_err());
    }

    #[test]
    fn string_interning_dedupes() {
        let mut table = SymbolTable::new();
        let a = table.intern_string(b"hi".to_vec());
        let b = table.intern_string(b"hi".to_vec());
        let c = table.intern_string(b"bye".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
