//! Single-pass compiler from tokens to bytecode
//!
//! Every grammar rule recognizes its input and emits instructions as it goes,
//! there is no syntax tree in between:
//!
//! ```text
//! program      := { functionDecl | statement }
//! statement    := declStmt ";" | call ";" | returnStmt ";" | assignStmt ";"
//!               | ifChain | loopStmt | block
//! declStmt     := "let" ["mut"] IDENT "=" expression
//! assignStmt   := IDENT "=" expression
//! returnStmt   := "return" expression
//! ifChain      := "if" expression block ["else" (ifChain | block)]
//! loopStmt     := "loop" expression block
//! functionDecl := "fun" IDENT "(" [IDENT {"," IDENT}] ")" block
//! block        := "{" { statement } "}"
//! expression   := equality
//! equality     := comparison { ("==" | "!=") comparison }
//! comparison   := term { (">" | ">=" | "<" | "<=") term }
//! term         := factor { ("+" | "-") factor }
//! factor       := unary { ("*" | "/") unary }
//! unary        := ("-" | "!") unary | primary
//! primary      := INTEGER | FLOAT | STRING | "(" expression ")" | call | IDENT
//! call         := IDENT "(" [expression {"," expression}] ")"
//! ```
//!
//! Function signatures are collected by a first scan over the source, so a
//! call may name a function declared further down. Such calls are emitted
//! with a placeholder target and patched once every body is compiled.

use crate::{
    bytecode::{Bytecode, Comparison, Function, Instruction},
    cursor::TokenCursor,
    error::{CompileError, CompileErrorKind, CompileResult},
    lexer::{Lexer, TokenSource},
    scope::{Resolved, Scopes, SymbolTable},
    token::{Keyword, Token, TokenKind},
    value::Value,
};

/// Name of the builtin that prints its single argument
const PRINT: &str = "print";

/// Deepest allowed nesting of blocks, parentheses, prefix operators and call
/// arguments, counted together
pub const MAX_NESTING: usize = 128;

/// Compile `program` into bytecode
pub fn compile(program: &str) -> CompileResult<Bytecode> {
    let symbols = collect_signatures(Lexer::new(program))?;
    Compiler::new(Lexer::new(program), symbols).compile()
}

/// Scan the token stream for global `fun` declarations and register their
/// names and parameters. Malformed signatures are skipped here and reported
/// by the compiling pass.
pub fn collect_signatures<'a, S: TokenSource<'a>>(mut source: S) -> CompileResult<SymbolTable<'a>> {
    let mut symbols = SymbolTable::default();
    let mut depth = 0usize;

    loop {
        let token = source.next_token();
        match token.kind {
            TokenKind::Eof => return Ok(symbols),
            TokenKind::LBrace => depth += 1,
            TokenKind::RBrace => depth = depth.saturating_sub(1),
            TokenKind::Keyword(Keyword::Fun) if depth == 0 => {
                let Some((name, params)) = read_signature(&mut source) else {
                    continue;
                };
                if name.lexeme == PRINT {
                    return Err(CompileError::new(
                        name.line,
                        CompileErrorKind::DuplicateFunction(PRINT.to_string()),
                    ));
                }
                symbols.declare(name.lexeme, params, name.line)?;
            }
            _ => {}
        }
    }
}

fn read_signature<'a, S: TokenSource<'a>>(source: &mut S) -> Option<(Token<'a>, Vec<&'a str>)> {
    let name = source.next_token();
    if name.kind != TokenKind::Identifier || source.next_token().kind != TokenKind::LParen {
        return None;
    }

    let mut params = Vec::new();
    let mut token = source.next_token();
    if token.kind == TokenKind::RParen {
        return Some((name, params));
    }
    loop {
        if token.kind != TokenKind::Identifier {
            return None;
        }
        params.push(token.lexeme);
        match source.next_token().kind {
            TokenKind::Comma => token = source.next_token(),
            TokenKind::RParen => return Some((name, params)),
            _ => return None,
        }
    }
}

pub struct Compiler<'a, S> {
    cursor: TokenCursor<'a, S>,
    bytecode: Bytecode,
    symbols: SymbolTable<'a>,
    scopes: Scopes<'a>,
    /// Calls emitted before their target was compiled
    unresolved_calls: Vec<(usize, &'a str)>,
    nesting: usize,
}

impl<'a, S: TokenSource<'a>> Compiler<'a, S> {
    /// `symbols` should come from [`collect_signatures`] over the same source.
    pub fn new(source: S, symbols: SymbolTable<'a>) -> Self {
        Compiler {
            cursor: TokenCursor::new(source),
            bytecode: Bytecode::new(),
            symbols,
            scopes: Scopes::default(),
            unresolved_calls: Vec::new(),
            nesting: 0,
        }
    }

    pub fn compile(mut self) -> CompileResult<Bytecode> {
        loop {
            let token = self.cursor.advance();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Keyword(Keyword::Fun) => self.function_decl()?,
                _ => {
                    self.cursor.pushback();
                    self.statement()?;
                }
            }
        }

        for (addr, name) in std::mem::take(&mut self.unresolved_calls) {
            match self.symbols.get(name).and_then(|symbol| symbol.entry) {
                Some(entry) => self.bytecode.patch_call(addr, entry),
                None => {
                    return Err(CompileError::new(
                        self.bytecode.line(addr),
                        CompileErrorKind::Undeclared(name.to_string()),
                    ))
                }
            }
        }

        let mut functions: Vec<Function> = self
            .symbols
            .iter()
            .filter_map(|symbol| {
                Some(Function {
                    name: symbol.name.to_string(),
                    ptr: symbol.entry?,
                    arity: symbol.params.len(),
                })
            })
            .collect();
        functions.sort_by_key(|function| function.ptr);
        self.bytecode.functions = functions;

        Ok(self.bytecode)
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        let line = self.cursor.current().line;
        self.emit_at(instruction, line)
    }

    /// Emit with the line of an operator read before its operands
    fn emit_at(&mut self, instruction: Instruction, line: u32) -> usize {
        self.bytecode.emit(instruction, line)
    }

    fn nest(&mut self, line: u32) -> CompileResult<()> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error(line, CompileErrorKind::TooDeeplyNested(MAX_NESTING)));
        }
        self.nesting += 1;
        Ok(())
    }

    fn unnest(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    /// Error for a name that is neither a function, a local nor a parameter
    fn unresolved(&self, name: Token<'a>) -> CompileError {
        let kind = if self.scopes.hides_global(name.lexeme) {
            CompileErrorKind::GlobalInFunction(name.lexeme.to_string())
        } else {
            CompileErrorKind::Undeclared(name.lexeme.to_string())
        };
        self.error(name.line, kind)
    }

    /// Functions and `print` own their names everywhere
    fn check_not_function(&self, name: Token<'a>) -> CompileResult<()> {
        if name.lexeme == PRINT || self.symbols.get(name.lexeme).is_some() {
            return Err(self.error(
                name.line,
                CompileErrorKind::DuplicateDeclaration(name.lexeme.to_string()),
            ));
        }
        Ok(())
    }

    fn error(&self, line: u32, kind: CompileErrorKind) -> CompileError {
        CompileError::new(line, kind)
    }

    /// Error for a token that does not fit the grammar at this point
    fn unexpected(&self, token: Token<'a>, expected: &'static str) -> CompileError {
        let kind = match token.kind {
            TokenKind::Error if token.lexeme.starts_with('"') => {
                CompileErrorKind::MissingDelimiter("'\"'")
            }
            TokenKind::Error if token.lexeme.starts_with(|ch: char| ch.is_ascii_digit()) => {
                CompileErrorKind::MalformedLiteral(token.lexeme.to_string())
            }
            TokenKind::Eof => CompileErrorKind::UnexpectedToken {
                expected,
                found: "end of input".to_string(),
            },
            _ => CompileErrorKind::UnexpectedToken {
                expected,
                found: token.lexeme.to_string(),
            },
        };
        self.error(token.line, kind)
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> CompileResult<Token<'a>> {
        let token = self.cursor.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(token, expected))
        }
    }

    /// Like `expect`, for the closing half of a pair
    fn expect_closing(&mut self, kind: TokenKind, delimiter: &'static str) -> CompileResult<()> {
        let token = self.cursor.advance();
        if token.kind == kind {
            Ok(())
        } else {
            Err(self.error(token.line, CompileErrorKind::MissingDelimiter(delimiter)))
        }
    }

    fn expect_semicolon(&mut self) -> CompileResult<()> {
        self.expect(TokenKind::Semicolon, "';'").map(|_| ())
    }

    // functionDecl := "fun" IDENT "(" [IDENT {"," IDENT}] ")" block
    fn function_decl(&mut self) -> CompileResult<()> {
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if self.cursor.peek().kind == TokenKind::RParen {
            self.cursor.advance();
        } else {
            loop {
                let param = self.expect(TokenKind::Identifier, "parameter name")?;
                self.check_not_function(param)?;
                params.push(param.lexeme);
                let token = self.cursor.advance();
                match token.kind {
                    TokenKind::Comma => {}
                    TokenKind::RParen => break,
                    _ => return Err(self.error(token.line, CompileErrorKind::MissingDelimiter("')'"))),
                }
            }
        }

        if self.symbols.get(name.lexeme).is_none() {
            self.symbols.declare(name.lexeme, params.clone(), name.line)?;
        }

        // Global code runs straight through declarations
        let skip = self.emit(Instruction::Jmp(0));
        self.symbols.set_entry(name.lexeme, self.bytecode.len());

        self.scopes.enter_function(params);
        self.block()?;
        // Falling off the end returns 0
        self.emit(Instruction::Push(Value::Int(0)));
        self.emit(Instruction::Ret);
        self.scopes.exit_function();

        self.bytecode.patch_jump(skip);
        Ok(())
    }

    // block := "{" { statement } "}"
    fn block(&mut self) -> CompileResult<()> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        self.nest(open.line)?;
        self.scopes.begin_block();

        loop {
            let token = self.cursor.peek();
            match token.kind {
                TokenKind::RBrace => {
                    self.cursor.advance();
                    break;
                }
                TokenKind::Eof => {
                    return Err(self.error(token.line, CompileErrorKind::MissingDelimiter("'}'")))
                }
                _ => self.statement()?,
            }
        }

        let declared = self.scopes.end_block();
        if declared > 0 {
            self.emit(Instruction::StackSweep(declared));
        }
        self.unnest();
        Ok(())
    }

    fn statement(&mut self) -> CompileResult<()> {
        let token = self.cursor.advance();
        match token.kind {
            TokenKind::Keyword(Keyword::Let) => {
                self.decl_stmt()?;
                self.expect_semicolon()
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.return_stmt()?;
                self.expect_semicolon()
            }
            TokenKind::Keyword(Keyword::If) => self.if_chain(),
            TokenKind::Keyword(Keyword::Loop) => self.loop_stmt(),
            TokenKind::Keyword(Keyword::Fun) => {
                Err(self.error(token.line, CompileErrorKind::NestedFunction))
            }
            TokenKind::LBrace => {
                self.cursor.pushback();
                self.block()
            }
            TokenKind::Identifier => {
                let next = self.cursor.peek();
                match next.kind {
                    TokenKind::LParen => {
                        self.identifier(token)?;
                        // Discard the unused return value
                        self.emit(Instruction::StackSweep(1));
                    }
                    TokenKind::Assign => self.assign_stmt(token)?,
                    _ => return Err(self.unexpected(next, "'=' or '('")),
                }
                self.expect_semicolon()
            }
            _ => Err(self.unexpected(token, "statement")),
        }
    }

    // declStmt := "let" ["mut"] IDENT "=" expression
    fn decl_stmt(&mut self) -> CompileResult<()> {
        let mutable = self.cursor.peek().is_keyword(Keyword::Mut);
        if mutable {
            self.cursor.advance();
        }

        let name = self.expect(TokenKind::Identifier, "identifier")?;
        self.check_not_function(name)?;
        self.expect(TokenKind::Assign, "'=' after variable declaration")?;
        self.expression()?;

        // The value left on the stack becomes the variable's slot
        self.scopes.declare(name.lexeme, mutable, name.line)?;
        Ok(())
    }

    // assignStmt := IDENT "=" expression
    fn assign_stmt(&mut self, name: Token<'a>) -> CompileResult<()> {
        self.cursor.advance();

        if self.symbols.get(name.lexeme).is_some() || name.lexeme == PRINT {
            return Err(self.error(
                name.line,
                CompileErrorKind::FunctionAsValue(name.lexeme.to_string()),
            ));
        }
        let slot = match self.scopes.resolve(name.lexeme) {
            Some(Resolved::Local {
                slot,
                mutable: true,
            }) => slot,
            Some(_) => {
                return Err(self.error(
                    name.line,
                    CompileErrorKind::ImmutableAssignment(name.lexeme.to_string()),
                ))
            }
            None => return Err(self.unresolved(name)),
        };

        self.expression()?;
        self.emit(Instruction::AssignVar(slot));
        Ok(())
    }

    // returnStmt := "return" expression
    fn return_stmt(&mut self) -> CompileResult<()> {
        self.expression()?;
        if self.scopes.in_function() {
            self.emit(Instruction::Ret);
        } else {
            self.emit(Instruction::Halt);
        }
        Ok(())
    }

    // ifChain := "if" expression block ["else" (ifChain | block)]
    //
    // Every arm is guarded by one forward conditional jump. Once an arm has
    // run, the chain's branch flag makes the guards of all later arms jump.
    fn if_chain(&mut self) -> CompileResult<()> {
        self.emit(Instruction::BeginChain);

        loop {
            self.expression()?;
            self.guarded_block()?;

            if !self.cursor.peek().is_keyword(Keyword::Else) {
                break;
            }
            self.cursor.advance();

            if self.cursor.peek().is_keyword(Keyword::If) {
                self.cursor.advance();
                continue;
            }

            // A trailing else behaves like an arm whose condition always holds
            self.emit(Instruction::Push(Value::Int(1)));
            self.guarded_block()?;
            break;
        }

        self.emit(Instruction::EndChain);
        Ok(())
    }

    /// Conditional jump over a block and the branch flag update after it
    fn guarded_block(&mut self) -> CompileResult<()> {
        let jump = self.emit(Instruction::JmpIfFalsy(0));
        self.block()?;
        self.emit(Instruction::SetBranch);
        self.bytecode.patch_jump(jump);
        Ok(())
    }

    // loopStmt := "loop" expression block
    fn loop_stmt(&mut self) -> CompileResult<()> {
        let condition = self.bytecode.len();
        self.expression()?;
        let exit = self.emit(Instruction::JmpIfFalsy(0));
        self.block()?;

        let back = self.bytecode.len();
        self.emit(Instruction::Jmp(condition as i32 - back as i32));
        self.bytecode.patch_jump(exit);
        Ok(())
    }

    fn expression(&mut self) -> CompileResult<()> {
        self.equality()
    }

    // equality := comparison { ("==" | "!=") comparison }
    fn equality(&mut self) -> CompileResult<()> {
        self.comparison()?;

        loop {
            let operator = self.cursor.advance();
            let comparison = match operator.kind {
                TokenKind::Equal => Comparison::Equal,
                TokenKind::NotEqual => Comparison::NotEqual,
                _ => {
                    self.cursor.pushback();
                    return Ok(());
                }
            };
            self.comparison()?;
            self.emit_at(Instruction::Cmp(comparison), operator.line);
        }
    }

    // comparison := term { (">" | ">=" | "<" | "<=") term }
    fn comparison(&mut self) -> CompileResult<()> {
        self.term()?;

        loop {
            let operator = self.cursor.advance();
            let comparison = match operator.kind {
                TokenKind::Greater => Comparison::Greater,
                TokenKind::GreaterEqual => Comparison::GreaterEqual,
                TokenKind::Less => Comparison::Less,
                TokenKind::LessEqual => Comparison::LessEqual,
                _ => {
                    self.cursor.pushback();
                    return Ok(());
                }
            };
            self.term()?;
            self.emit_at(Instruction::Cmp(comparison), operator.line);
        }
    }

    // term := factor { ("+" | "-") factor }
    fn term(&mut self) -> CompileResult<()> {
        self.factor()?;

        loop {
            let operator = self.cursor.advance();
            let instruction = match operator.kind {
                TokenKind::Plus => Instruction::Add,
                TokenKind::Minus => Instruction::Sub,
                _ => {
                    self.cursor.pushback();
                    return Ok(());
                }
            };
            self.factor()?;
            self.emit_at(instruction, operator.line);
        }
    }

    // factor := unary { ("*" | "/") unary }
    fn factor(&mut self) -> CompileResult<()> {
        self.unary()?;

        loop {
            let operator = self.cursor.advance();
            let instruction = match operator.kind {
                TokenKind::Star => Instruction::Mul,
                TokenKind::Slash => Instruction::Div,
                _ => {
                    self.cursor.pushback();
                    return Ok(());
                }
            };
            self.unary()?;
            self.emit_at(instruction, operator.line);
        }
    }

    // unary := ("-" | "!") unary | primary
    fn unary(&mut self) -> CompileResult<()> {
        let operator = self.cursor.advance();
        let instruction = match operator.kind {
            TokenKind::Minus if self.cursor.peek().kind == TokenKind::Integer => {
                // Folded so that -2147483648 stays an int
                let literal = self.cursor.advance();
                let value = Value::from_integer_literal(&format!("-{}", literal.lexeme))
                    .ok_or_else(|| {
                        self.error(
                            literal.line,
                            CompileErrorKind::MalformedLiteral(literal.lexeme.to_string()),
                        )
                    })?;
                self.emit(Instruction::Push(value));
                return Ok(());
            }
            TokenKind::Minus => Instruction::Negate,
            TokenKind::Bang => Instruction::Not,
            _ => {
                self.cursor.pushback();
                return self.primary();
            }
        };
        self.nest(operator.line)?;
        self.unary()?;
        self.unnest();
        self.emit_at(instruction, operator.line);
        Ok(())
    }

    // primary := INTEGER | FLOAT | STRING | "(" expression ")" | call | IDENT
    fn primary(&mut self) -> CompileResult<()> {
        let token = self.cursor.advance();
        match token.kind {
            TokenKind::Integer => {
                let value = Value::from_integer_literal(token.lexeme).ok_or_else(|| {
                    self.error(
                        token.line,
                        CompileErrorKind::MalformedLiteral(token.lexeme.to_string()),
                    )
                })?;
                self.emit(Instruction::Push(value));
            }
            TokenKind::Float => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    self.error(
                        token.line,
                        CompileErrorKind::MalformedLiteral(token.lexeme.to_string()),
                    )
                })?;
                self.emit(Instruction::Push(Value::Float(value)));
            }
            TokenKind::String => {
                self.emit(Instruction::Push(Value::from(token.lexeme)));
            }
            TokenKind::LParen => {
                self.nest(token.line)?;
                self.expression()?;
                self.expect_closing(TokenKind::RParen, "')' for expression")?;
                self.unnest();
            }
            TokenKind::Identifier => self.identifier(token)?,
            _ => return Err(self.unexpected(token, "expression")),
        }
        Ok(())
    }

    /// Resolve an identifier used as a value: function call first, then
    /// locals from the innermost block out, then parameters.
    fn identifier(&mut self, name: Token<'a>) -> CompileResult<()> {
        if name.lexeme == PRINT {
            return self.print_call(name);
        }

        if self.symbols.get(name.lexeme).is_some() {
            if self.cursor.peek().kind != TokenKind::LParen {
                return Err(self.error(
                    name.line,
                    CompileErrorKind::FunctionAsValue(name.lexeme.to_string()),
                ));
            }
            return self.call(name);
        }

        match self.scopes.resolve(name.lexeme) {
            Some(Resolved::Local { slot, .. }) => self.emit(Instruction::FetchVar(slot)),
            Some(Resolved::Param(index)) => self.emit(Instruction::FetchArg(index)),
            None => return Err(self.unresolved(name)),
        };
        Ok(())
    }

    // call := IDENT "(" [expression {"," expression}] ")"
    //
    // Arguments are moved onto the call stack as soon as they are evaluated,
    // followed by their count.
    fn call(&mut self, name: Token<'a>) -> CompileResult<()> {
        self.expect(TokenKind::LParen, "'('")?;
        self.nest(name.line)?;

        let mut argc = 0;
        if self.cursor.peek().kind == TokenKind::RParen {
            self.cursor.advance();
        } else {
            loop {
                self.expression()?;
                self.emit(Instruction::PushArg);
                argc += 1;

                let token = self.cursor.advance();
                match token.kind {
                    TokenKind::Comma => {}
                    TokenKind::RParen => break,
                    _ => {
                        return Err(self.error(
                            token.line,
                            CompileErrorKind::MissingDelimiter("')' for argument list"),
                        ))
                    }
                }
            }
        }
        self.unnest();

        let (arity, entry) = match self.symbols.get(name.lexeme) {
            Some(symbol) => (symbol.params.len(), symbol.entry),
            None => {
                return Err(self.error(
                    name.line,
                    CompileErrorKind::Undeclared(name.lexeme.to_string()),
                ))
            }
        };
        if arity != argc {
            return Err(self.error(
                name.line,
                CompileErrorKind::ArityMismatch {
                    name: name.lexeme.to_string(),
                    expected: arity,
                    found: argc,
                },
            ));
        }

        self.emit(Instruction::Push(Value::Int(argc as i32)));
        self.emit(Instruction::PushArg);
        let call = self.emit(Instruction::Call(entry.unwrap_or_default()));
        if entry.is_none() {
            self.unresolved_calls.push((call, name.lexeme));
        }
        Ok(())
    }

    // print "(" expression ")"
    fn print_call(&mut self, name: Token<'a>) -> CompileResult<()> {
        self.expect(TokenKind::LParen, "'('")?;
        self.nest(name.line)?;
        if self.cursor.peek().kind == TokenKind::RParen {
            return Err(self.error(
                name.line,
                CompileErrorKind::ArityMismatch {
                    name: PRINT.to_string(),
                    expected: 1,
                    found: 0,
                },
            ));
        }
        self.expression()?;
        let token = self.cursor.advance();
        match token.kind {
            TokenKind::RParen => {}
            TokenKind::Comma => {
                return Err(self.error(
                    name.line,
                    CompileErrorKind::ArityMismatch {
                        name: PRINT.to_string(),
                        expected: 1,
                        found: 2,
                    },
                ))
            }
            _ => {
                return Err(self.error(
                    token.line,
                    CompileErrorKind::MissingDelimiter("')' for argument list"),
                ))
            }
        }
        self.unnest();
        self.emit(Instruction::Print);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;

    fn opcodes(program: &str) -> Vec<Opcode> {
        compile(program)
            .unwrap()
            .instructions
            .iter()
            .map(Instruction::opcode)
            .collect()
    }

    fn compile_err(program: &str) -> CompileError {
        compile(program).unwrap_err()
    }

    #[test]
    fn precedence() {
        let bytecode = compile("let x = 1 + 2 * 3 == 7;").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Push(Value::Int(1)),
                Instruction::Push(Value::Int(2)),
                Instruction::Push(Value::Int(3)),
                Instruction::Mul,
                Instruction::Add,
                Instruction::Push(Value::Int(7)),
                Instruction::Cmp(Comparison::Equal),
            ]
        );
    }

    #[test]
    fn left_associative() {
        let bytecode = compile("let x = 8 - 2 - 1;").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Push(Value::Int(8)),
                Instruction::Push(Value::Int(2)),
                Instruction::Sub,
                Instruction::Push(Value::Int(1)),
                Instruction::Sub,
            ]
        );
    }

    #[test]
    fn block_sweeps_its_locals() {
        let bytecode = compile("let x = 5; { let x = 10; let y = 1; } return x;").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Push(Value::Int(5)),
                Instruction::Push(Value::Int(10)),
                Instruction::Push(Value::Int(1)),
                Instruction::StackSweep(2),
                Instruction::FetchVar(0),
                Instruction::Halt,
            ]
        );
    }

    #[test]
    fn if_chain_layout() {
        let bytecode = compile("if 1 { } else if 2 { } else { }").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::BeginChain,
                Instruction::Push(Value::Int(1)),
                Instruction::JmpIfFalsy(2),
                Instruction::SetBranch,
                Instruction::Push(Value::Int(2)),
                Instruction::JmpIfFalsy(2),
                Instruction::SetBranch,
                Instruction::Push(Value::Int(1)),
                Instruction::JmpIfFalsy(2),
                Instruction::SetBranch,
                Instruction::EndChain,
            ]
        );
    }

    #[test]
    fn loop_jumps_back_to_condition() {
        let bytecode = compile("let mut i = 0; loop i < 3 { i = i + 1; }").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Push(Value::Int(0)),
                Instruction::FetchVar(0),
                Instruction::Push(Value::Int(3)),
                Instruction::Cmp(Comparison::Less),
                Instruction::JmpIfFalsy(6),
                Instruction::FetchVar(0),
                Instruction::Push(Value::Int(1)),
                Instruction::Add,
                Instruction::AssignVar(0),
                Instruction::Jmp(-8),
            ]
        );
    }

    #[test]
    fn function_layout() {
        let bytecode = compile("fun add(a, b) { return a + b; } let x = add(2, 3);").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Jmp(7),
                Instruction::FetchArg(0),
                Instruction::FetchArg(1),
                Instruction::Add,
                Instruction::Ret,
                Instruction::Push(Value::Int(0)),
                Instruction::Ret,
                Instruction::Push(Value::Int(2)),
                Instruction::PushArg,
                Instruction::Push(Value::Int(3)),
                Instruction::PushArg,
                Instruction::Push(Value::Int(2)),
                Instruction::PushArg,
                Instruction::Call(1),
            ]
        );
        assert_eq!(
            bytecode.function("add"),
            Some(&Function {
                name: "add".to_string(),
                ptr: 1,
                arity: 2
            })
        );
    }

    #[test]
    fn forward_call_is_patched() {
        let bytecode = compile("let x = later(); fun later() { return 1; }").unwrap();
        let entry = bytecode.function("later").unwrap().ptr;
        assert!(bytecode.instructions.contains(&Instruction::Call(entry)));
    }

    #[test]
    fn call_statement_discards_result() {
        assert_eq!(
            opcodes("fun f() { } f();")[3..],
            [
                Opcode::Push,
                Opcode::PushArg,
                Opcode::Call,
                Opcode::StackSweep
            ]
        );
    }

    #[test]
    fn undeclared() {
        let err = compile_err("let x = 1;\nreturn y;");
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, CompileErrorKind::Undeclared("y".to_string()));
    }

    #[test]
    fn duplicate_declaration() {
        let err = compile_err("let x = 1; let x = 2;");
        assert_eq!(
            err.kind,
            CompileErrorKind::DuplicateDeclaration("x".to_string())
        );
        assert!(compile("let x = 1; { let x = 2; }").is_ok());
    }

    #[test]
    fn missing_delimiters() {
        assert_eq!(
            compile_err("let x = (1 + 2;").kind,
            CompileErrorKind::MissingDelimiter("')' for expression")
        );
        assert_eq!(
            compile_err("{ let x = 1;").kind,
            CompileErrorKind::MissingDelimiter("'}'")
        );
        assert_eq!(
            compile_err("let s = \"open;").kind,
            CompileErrorKind::MissingDelimiter("'\"'")
        );
    }

    #[test]
    fn missing_semicolon() {
        let err = compile_err("let x = 1\nlet y = 2;");
        assert_eq!(err.line, 2);
        assert!(matches!(
            err.kind,
            CompileErrorKind::UnexpectedToken { expected: "';'", .. }
        ));
    }

    #[test]
    fn malformed_literal() {
        let err = compile_err("let x = 1.;");
        assert_eq!(err.kind, CompileErrorKind::MalformedLiteral("1.".to_string()));
    }

    #[test]
    fn arity_mismatch() {
        let err = compile_err("fun add(a, b) { return a + b; } let x = add(1);");
        assert_eq!(
            err.kind,
            CompileErrorKind::ArityMismatch {
                name: "add".to_string(),
                expected: 2,
                found: 1
            }
        );
        let err = compile_err("fun zero() { return 0; } let x = zero(1);");
        assert!(matches!(
            err.kind,
            CompileErrorKind::ArityMismatch { expected: 0, found: 1, .. }
        ));
    }

    #[test]
    fn immutable_assignment() {
        let err = compile_err("let x = 1; x = 2;");
        assert_eq!(
            err.kind,
            CompileErrorKind::ImmutableAssignment("x".to_string())
        );
        let err = compile_err("fun f(a) { a = 1; }");
        assert_eq!(
            err.kind,
            CompileErrorKind::ImmutableAssignment("a".to_string())
        );
    }

    #[test]
    fn nested_function() {
        let err = compile_err("fun f() { fun g() { } }");
        assert_eq!(err.kind, CompileErrorKind::NestedFunction);
        let err = compile_err("{ fun g() { } }");
        assert_eq!(err.kind, CompileErrorKind::NestedFunction);
    }

    #[test]
    fn duplicate_function() {
        let err = compile_err("fun f() { }\nfun f() { }");
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, CompileErrorKind::DuplicateFunction("f".to_string()));
        assert!(matches!(
            compile_err("fun print(x) { }").kind,
            CompileErrorKind::DuplicateFunction(_)
        ));
    }

    #[test]
    fn functions_are_not_values() {
        let err = compile_err("fun f() { } let x = f;");
        assert_eq!(err.kind, CompileErrorKind::FunctionAsValue("f".to_string()));
    }

    #[test]
    fn globals_are_not_visible_in_functions() {
        let err = compile_err("let g = 1; fun f() { return g; }");
        assert_eq!(err.kind, CompileErrorKind::GlobalInFunction("g".to_string()));
        let err = compile_err("let mut g = 1; fun f() { g = 2; }");
        assert_eq!(err.kind, CompileErrorKind::GlobalInFunction("g".to_string()));
        // Declared after the body, so simply unknown there
        let err = compile_err("fun f() { return g; } let g = 1;");
        assert_eq!(err.kind, CompileErrorKind::Undeclared("g".to_string()));
    }

    #[test]
    fn function_names_cannot_be_rebound() {
        let err = compile_err("fun f() { }\nlet f = 2;");
        assert_eq!(err.line, 2);
        assert_eq!(
            err.kind,
            CompileErrorKind::DuplicateDeclaration("f".to_string())
        );
        let err = compile_err("let print = 1;");
        assert_eq!(
            err.kind,
            CompileErrorKind::DuplicateDeclaration("print".to_string())
        );
        let err = compile_err("fun f() { } fun g(f) { }");
        assert_eq!(
            err.kind,
            CompileErrorKind::DuplicateDeclaration("f".to_string())
        );
    }

    #[test]
    fn operators_keep_their_own_line() {
        let bytecode = compile("let x = 1\n+ 2\n;\nlet y = x\n== 3\n;").unwrap();
        let line_of = |wanted: &Instruction| {
            let addr = bytecode
                .instructions
                .iter()
                .position(|instruction| instruction == wanted)
                .unwrap();
            bytecode.line(addr)
        };
        assert_eq!(line_of(&Instruction::Add), 2);
        assert_eq!(line_of(&Instruction::Cmp(Comparison::Equal)), 5);
    }

    #[test]
    fn negative_integer_literals_are_folded() {
        let bytecode = compile("let x = -2147483648; let y = -x; let z = --1;").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![
                Instruction::Push(Value::Int(i32::MIN)),
                Instruction::FetchVar(0),
                Instruction::Negate,
                Instruction::Push(Value::Int(-1)),
                Instruction::Negate,
            ]
        );
        let bytecode = compile("let x = -2147483649;").unwrap();
        assert_eq!(
            bytecode.instructions,
            vec![Instruction::Push(Value::Float(-2147483649.0))]
        );
    }

    #[test]
    fn nesting_limit() {
        let depth = MAX_NESTING - 1;
        let program = format!("let x = {}1{};", "(".repeat(depth), ")".repeat(depth));
        assert!(compile(&program).is_ok());

        let too_deep = [
            format!("let x = {}1{};", "(".repeat(100_000), ")".repeat(100_000)),
            format!("let x = {}1;", "!".repeat(100_000)),
            format!("{}{}", "{".repeat(100_000), "}".repeat(100_000)),
            format!("{}let x = (1);{}", "{".repeat(MAX_NESTING), "}".repeat(MAX_NESTING)),
        ];
        for program in &too_deep {
            assert_eq!(
                compile_err(program).kind,
                CompileErrorKind::TooDeeplyNested(MAX_NESTING)
            );
        }
    }

    #[test]
    fn signatures() {
        let symbols = collect_signatures(Lexer::new(
            "fun a() { } fun b(x, y) { if x { } } fun (",
        ))
        .unwrap();
        assert_eq!(symbols.get("a").unwrap().params.len(), 0);
        assert_eq!(symbols.get("b").unwrap().params, vec!["x", "y"]);
        assert_eq!(symbols.iter().count(), 2);
    }
}
