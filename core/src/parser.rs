//! A hand-rolled recursive-descent parser with a single token of lookahead,
//! the same shape as the predecessor's `curTok`-driven parse loop. Unlike
//! that version, WAT requires explicit type annotations everywhere (there
//! is no type inference beyond literals), so the grammar below adds a
//! `: type` suffix to declarations that the original left untyped.
//!
//! `#include` is resolved here, not in a separate preprocessing pass: each
//! directive reads, lexes, and recursively parses the referenced file, and
//! its items are spliced into the current item list. The set of
//! already-included paths is threaded through as an explicit parameter
//! (never stored on `Parser` itself) so a file included from two different
//! places — or in a cycle — is silently skipped the second time, rather
//! than re-parsed or rejected.

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::symbols::SymbolTable;
use crate::util::Position;
use std::collections::HashSet;
use std::rc::Rc;

pub type ParseResult<T> = Result<T, (SyntaxError, Position)>;

/// Supplies the contents of an `#include`d path. The CLI implements this
/// against the filesystem; tests can use an in-memory map.
pub trait IncludeResolver {
    fn resolve(&self, path: &str) -> Result<String, String>;
}

pub struct Parser<'t> {
    tokens: Vec<SpannedToken>,
    idx: usize,
    file: Rc<str>,
    table: &'t mut SymbolTable,
}

/// Parses a complete program starting from `file`, following `#include`
/// directives as they're encountered.
pub fn parse_program(
    source: &str,
    file: &str,
    resolver: &dyn IncludeResolver,
    table: &mut SymbolTable,
) -> ParseResult<Program> {
    let mut included = HashSet::new();
    included.insert(file.to_string());
    let items = parse_file(source, file, resolver, &mut included, table)?;
    Ok(Program { items })
}

fn parse_file(
    source: &str,
    file: &str,
    resolver: &dyn IncludeResolver,
    included: &mut HashSet<String>,
    table: &mut SymbolTable,
) -> ParseResult<Vec<ItemNode>> {
    let tokens = Lexer::new(source, file).tokenize().map_err(|(e, pos)| {
        (
            SyntaxError::IncludeLexError {
                path: file.to_string(),
                msg: e.to_string_lossy(),
            },
            pos,
        )
    })?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        file: Rc::from(file),
        table,
    };
    parser.parse_items(resolver, included)
}

impl crate::error::LexicalError {
    fn to_string_lossy(&self) -> String {
        format!("{:?}", self)
    }
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.idx].token
    }

    fn pos(&self) -> Position {
        self.tokens[self.idx].pos.clone()
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.idx].token.clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token, what: &str) -> ParseResult<()> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            let found = self.peek().describe();
            Err((
                SyntaxError::Expected {
                    expected: what.to_string(),
                    found,
                },
                self.pos(),
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err((
                SyntaxError::Expected {
                    expected: what.to_string(),
                    found: other.describe(),
                },
                self.pos(),
            )),
        }
    }

    fn parse_items(
        &mut self,
        resolver: &dyn IncludeResolver,
        included: &mut HashSet<String>,
    ) -> ParseResult<Vec<ItemNode>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Token::Eof => return Ok(items),
                Token::Hash => {
                    let pos = self.pos();
                    self.bump();
                    self.expect(&Token::Include, "`include`")?;
                    let path = match self.bump() {
                        Token::Str(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                        other => {
                            return Err((
                                SyntaxError::Expected {
                                    expected: "a quoted path".to_string(),
                                    found: other.describe(),
                                },
                                pos,
                            ))
                        }
                    };
                    if included.insert(path.clone()) {
                        let source = resolver
                            .resolve(&path)
                            .map_err(|_| (SyntaxError::IncludeNotFound(path.clone()), pos))?;
                        let nested = parse_file(&source, &path, resolver, included, self.table)?;
                        items.extend(nested);
                    }
                }
                Token::Struct => items.push(self.parse_struct_item()?),
                Token::Func => items.push(self.parse_func_item()?),
                Token::Var => items.push(self.parse_global_var_item()?),
                other => {
                    return Err((
                        SyntaxError::Expected {
                            expected: "a top-level item".to_string(),
                            found: other.describe(),
                        },
                        self.pos(),
                    ))
                }
            }
        }
    }

    fn parse_struct_item(&mut self) -> ParseResult<ItemNode> {
        let pos = self.pos();
        self.bump(); // struct
        let name = self.expect_ident("a struct name")?;
        if self.peek() == &Token::Semi {
            self.bump();
            return Ok(ItemNode { kind: Item::StructDecl(name), pos });
        }
        self.expect(&Token::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while self.peek() != &Token::RBrace {
            let field_name = self.expect_ident("a field name")?;
            self.expect(&Token::Colon, "`:`")?;
            let ty = self.parse_type()?;
            self.expect(&Token::Semi, "`;`")?;
            fields.push((field_name, ty));
        }
        self.bump(); // }
        Ok(ItemNode { kind: Item::StructDef(name, fields), pos })
    }

    fn parse_func_item(&mut self) -> ParseResult<ItemNode> {
        let pos = self.pos();
        self.bump(); // func
        let name = self.expect_ident("a function name")?;
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        while self.peek() != &Token::RParen {
            let pname = self.expect_ident("a parameter name")?;
            self.expect(&Token::Colon, "`:`")?;
            let ty = self.parse_type()?;
            params.push((pname, ty));
            if self.peek() == &Token::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen, "`)`")?;
        let return_type = if self.peek() == &Token::Colon {
            self.bump();
            self.parse_type()?
        } else {
            TypeExpr::Name("void".to_string())
        };
        let body = self.parse_block()?;
        Ok(ItemNode {
            kind: Item::Func(FuncDecl { name, params, return_type, body, pos: pos.clone() }),
            pos,
        })
    }

    fn parse_global_var_item(&mut self) -> ParseResult<ItemNode> {
        let pos = self.pos();
        let (name, ty, init) = self.parse_var_decl_tail()?;
        Ok(ItemNode { kind: Item::GlobalVar(name, ty, init), pos })
    }

    /// Parses `name: type [= expr];`, used by both global and local `var`
    /// declarations. Assumes the leading `var` keyword has already been
    /// consumed by the caller... actually consumes it itself for symmetry.
    fn parse_var_decl_tail(&mut self) -> ParseResult<(String, TypeExpr, Option<Expr>)> {
        self.expect(&Token::Var, "`var`")?;
        let name = self.expect_ident("a variable name")?;
        self.expect(&Token::Colon, "`:`")?;
        let ty = self.parse_type()?;
        let init = if self.peek() == &Token::Assign {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Semi, "`;`")?;
        Ok((name, ty, init))
    }

    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        if self.peek() == &Token::Star {
            self.bump();
            return Ok(TypeExpr::Ptr(Box::new(self.parse_type()?)));
        }
        let name = self.expect_ident("a type name")?;
        Ok(TypeExpr::Name(name))
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while self.peek() != &Token::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.bump(); // }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let pos = self.pos();
        match self.peek() {
            Token::LBrace => {
                let stmts = self.parse_block()?;
                Ok(Stmt { kind: StmtKind::Block(stmts), pos })
            }
            Token::Var => {
                let (name, ty, init) = self.parse_var_decl_tail()?;
                Ok(Stmt { kind: StmtKind::VarDecl(name, ty, init), pos })
            }
            Token::If => {
                self.bump();
                self.expect(&Token::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.peek() == &Token::Else {
                    self.bump();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt { kind: StmtKind::If(cond, then_branch, else_branch), pos })
            }
            Token::While => {
                self.bump();
                self.expect(&Token::LParen, "`(`")?;
                let cond = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt { kind: StmtKind::While(cond, body), pos })
            }
            Token::Return => {
                self.bump();
                let value = if self.peek() == &Token::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Token::Semi, "`;`")?;
                Ok(Stmt { kind: StmtKind::Return(value), pos })
            }
            Token::Asm => {
                self.bump();
                self.expect(&Token::LBrace, "`{`")?;
                let mut depth = 1u32;
                let mut code = String::new();
                loop {
                    match self.peek().clone() {
                        Token::LBrace => {
                            depth += 1;
                            code.push_str("{ ");
                            self.bump();
                        }
                        Token::RBrace => {
                            depth -= 1;
                            self.bump();
                            if depth == 0 {
                                break;
                            }
                            code.push_str("} ");
                        }
                        Token::Eof => {
                            return Err((SyntaxError::UnexpectedEof, self.pos()))
                        }
                        other => {
                            code.push_str(&render_asm_token(&other));
                            code.push(' ');
                            self.bump();
                        }
                    }
                }
                Ok(Stmt { kind: StmtKind::Asm(code), pos })
            }
            _ => {
                let lhs = self.parse_expr()?;
                if self.peek() == &Token::Assign {
                    self.bump();
                    let rhs = self.parse_expr()?;
                    self.expect(&Token::Semi, "`;`")?;
                    Ok(Stmt { kind: StmtKind::Assign(lhs, rhs), pos })
                } else {
                    self.expect(&Token::Semi, "`;`")?;
                    Ok(Stmt { kind: StmtKind::Expr(lhs), pos })
                }
            }
        }
    }

    // Precedence, low to high: || -> && -> equality -> relational
    // -> additive -> multiplicative -> unary -> postfix -> primary.
    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == &Token::OrOr {
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::new(ExprKind::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.peek() == &Token::AndAnd {
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::new(ExprKind::Binary(BinOp::And, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::NotEq => BinOp::NotEq,
                _ => break,
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let pos = self.pos();
        match self.peek() {
            Token::Minus => {
                self.bump();
                let rhs = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::Neg, Box::new(rhs)), pos))
            }
            Token::Bang => {
                self.bump();
                let rhs = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::Not, Box::new(rhs)), pos))
            }
            Token::Star => {
                self.bump();
                let rhs = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::Deref, Box::new(rhs)), pos))
            }
            Token::Amp => {
                self.bump();
                let rhs = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Unary(UnOp::AddrOf, Box::new(rhs)), pos))
            }
            Token::Cast => {
                self.bump();
                self.expect(&Token::LParen, "`(`")?;
                let ty = self.parse_type()?;
                self.expect(&Token::RParen, "`)`")?;
                let rhs = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Cast(ty, Box::new(rhs)), pos))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.pos();
        match self.peek().clone() {
            Token::Int(n) => {
                self.bump();
                Ok(Expr::new(ExprKind::Int(n), pos))
            }
            Token::True => {
                self.bump();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            Token::False => {
                self.bump();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            Token::Char(c) => {
                self.bump();
                Ok(Expr::new(ExprKind::Char(c), pos))
            }
            Token::Str(bytes) => {
                self.bump();
                let id = self.table.intern_string(bytes);
                Ok(Expr::new(ExprKind::Str(id), pos))
            }
            Token::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(Expr::new(ExprKind::Paren(Box::new(inner)), pos))
            }
            Token::LBracket => {
                self.bump();
                let mut values = Vec::new();
                while self.peek() != &Token::RBracket {
                    values.push(self.parse_expr()?);
                    if self.peek() == &Token::Comma {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "`]`")?;
                let len = if self.peek() == &Token::Colon {
                    self.bump();
                    match self.bump() {
                        Token::Int(n) if n > 0 => n as u32,
                        _ => {
                            return Err((
                                SyntaxError::Expected {
                                    expected: "a positive array length".to_string(),
                                    found: "something else".to_string(),
                                },
                                pos,
                            ))
                        }
                    }
                } else {
                    values.len() as u32
                };
                Ok(Expr::new(ExprKind::Array(values, len), pos))
            }
            Token::Ident(name) => {
                self.bump();
                if self.peek() == &Token::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    while self.peek() != &Token::RParen {
                        args.push(self.parse_expr()?);
                        if self.peek() == &Token::Comma {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.expect(&Token::RParen, "`)`")?;
                    if name == "assert" {
                        args.push(Expr::new(
                            ExprKind::Str(self.table.intern_string(self.file.as_bytes().to_vec())),
                            pos.clone(),
                        ));
                        args.push(Expr::new(ExprKind::Int(pos.line as i32), pos.clone()));
                    }
                    Ok(Expr::new(ExprKind::Call(name, args), pos))
                } else {
                    Ok(Expr::new(ExprKind::Ident(name), pos))
                }
            }
            other => Err((
                SyntaxError::Expected {
                    expected: "an expression".to_string(),
                    found: other.describe(),
                },
                pos,
            )),
        }
    }
}

/// Renders a token back into the text the inline-assembly mini-assembler
/// expects: `asm { ... }` bodies are plain WAT-assembly source, but we
/// already tokenized them as part of the host language's lexer, so this
/// stitches them back into text for [crate::codegen::Codegen::assemble_inline].
fn render_asm_token(token: &Token) -> String {
    match token {
        Token::Ident(s) => s.clone(),
        Token::Int(n) => n.to_string(),
        Token::Minus => "-".to_string(),
        Token::Comma => ",".to_string(),
        Token::Colon => ":".to_string(),
        Token::Semi => ";".to_string(),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        Token::Str(bytes) => format!("\"{}\"", String::from_utf8_lossy(bytes)),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, &'static str>);
    impl IncludeResolver for MapResolver {
        fn resolve(&self, path: &str) -> Result<String, String> {
            self.0
                .get(path)
                .map(|s| s.to_string())
                .ok_or_else(|| "not found".to_string())
        }
    }

    fn parse(src: &str) -> (Program, SymbolTable) {
        let mut table = SymbolTable::new();
        let resolver = MapResolver(HashMap::new());
        let program = parse_program(src, "t.wat", &resolver, &mut table).unwrap();
        (program, table)
    }

    #[test]
    fn parses_a_trivial_function() {
        let (program, _) = parse("func main(): void { return; }");
        assert_eq!(program.items.len(), 1);
        assert!(matches!(program.items[0].kind, Item::Func(_)));
    }

    #[test]
    fn parses_global_var() {
        let (program, _) = parse("var x: int = 5;");
        match &program.items[0].kind {
            Item::GlobalVar(name, ty, Some(_)) => {
                assert_eq!(name, "x");
                assert_eq!(*ty, TypeExpr::Name("int".to_string()));
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn respects_precedence() {
        let (program, _) = parse("func f(): int { return 1 + 2 * 3; } ");
        let Item::Func(f) = &program.items[0].kind else { panic!() };
        let StmtKind::Return(Some(expr)) = &f.body[0].kind else { panic!() };
        match &expr.kind {
            ExprKind::Binary(BinOp::Add, lhs, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Int(1)));
                assert!(matches!(rhs.kind, ExprKind::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn assert_call_gets_position_args_appended() {
        let (program, _) = parse("func f(): void { assert(1); }");
        let Item::Func(f) = &program.items[0].kind else { panic!() };
        let StmtKind::Expr(expr) = &f.body[0].kind else { panic!() };
        match &expr.kind {
            ExprKind::Call(name, args) => {
                assert_eq!(name, "assert");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn repeated_include_is_deduped() {
        let mut table = SymbolTable::new();
        let mut files = HashMap::new();
        files.insert("a.wat", "var x: int;");
        let resolver = MapResolver(files);
        let program = parse_program(
            "#include \"a.wat\"\n#include \"a.wat\"\nfunc main(): void { return; }",
            "t.wat",
            &resolver,
            &mut table,
        )
        .unwrap();
        // one GlobalVar from a.wat (not two) plus main
        assert_eq!(program.items.len(), 2);
    }
}
