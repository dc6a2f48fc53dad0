//! Compile-time name tables: the global function table and, per function
//! being compiled, its parameters and block-scoped locals.

use crate::error::{CompileError, CompileErrorKind, CompileResult};

/// A declared function
#[derive(Debug, Clone)]
pub struct Symbol<'a> {
    pub name: &'a str,
    pub params: Vec<&'a str>,
    /// First instruction of the body, known once the body is compiled
    pub entry: Option<usize>,
}

#[derive(Debug, Default)]
pub struct SymbolTable<'a> {
    symbols: Vec<Symbol<'a>>,
}

impl<'a> SymbolTable<'a> {
    pub fn declare(&mut self, name: &'a str, params: Vec<&'a str>, line: u32) -> CompileResult<()> {
        if self.get(name).is_some() {
            return Err(CompileError::new(
                line,
                CompileErrorKind::DuplicateFunction(name.to_string()),
            ));
        }
        if let Some(duplicate) = params
            .iter()
            .enumerate()
            .find_map(|(i, param)| params[..i].contains(param).then_some(param))
        {
            return Err(CompileError::new(
                line,
                CompileErrorKind::DuplicateParameter(duplicate.to_string()),
            ));
        }

        self.symbols.push(Symbol {
            name,
            params,
            entry: None,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Symbol<'a>> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    pub fn set_entry(&mut self, name: &str, entry: usize) {
        if let Some(symbol) = self.symbols.iter_mut().find(|symbol| symbol.name == name) {
            symbol.entry = Some(entry);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol<'a>> {
        self.symbols.iter()
    }
}

/// A `let` binding living in an operand stack slot
#[derive(Debug, Clone, Copy)]
struct Binding<'a> {
    name: &'a str,
    depth: usize,
    slot: usize,
    mutable: bool,
}

/// What an identifier refers to inside the current function
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Resolved {
    Local { slot: usize, mutable: bool },
    Param(usize),
}

/// Names visible while compiling one function body (or the global code)
#[derive(Debug, Default)]
struct Frame<'a> {
    params: Vec<&'a str>,
    bindings: Vec<Binding<'a>>,
    depth: usize,
}

/// Stack of frames, the bottom one being the global scope.
#[derive(Debug)]
pub struct Scopes<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> Default for Scopes<'a> {
    fn default() -> Self {
        Scopes {
            frames: vec![Frame::default()],
        }
    }
}

impl<'a> Scopes<'a> {
    fn frame(&self) -> &Frame<'a> {
        // The global frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame<'a> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn enter_function(&mut self, params: Vec<&'a str>) {
        self.frames.push(Frame {
            params,
            ..Frame::default()
        });
    }

    pub fn exit_function(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn begin_block(&mut self) {
        self.frame_mut().depth += 1;
    }

    /// Leave the innermost block and return how many slots it declared
    pub fn end_block(&mut self) -> usize {
        let frame = self.frame_mut();
        let depth = frame.depth;
        let live = frame
            .bindings
            .iter()
            .rposition(|binding| binding.depth < depth)
            .map_or(0, |i| i + 1);
        let dropped = frame.bindings.len() - live;
        frame.bindings.truncate(live);
        frame.depth = depth.saturating_sub(1);
        dropped
    }

    /// Bind `name` to the next free slot of the current frame
    pub fn declare(&mut self, name: &'a str, mutable: bool, line: u32) -> CompileResult<usize> {
        let frame = self.frame_mut();
        let depth = frame.depth;
        if frame
            .bindings
            .iter()
            .any(|binding| binding.depth == depth && binding.name == name)
        {
            return Err(CompileError::new(
                line,
                CompileErrorKind::DuplicateDeclaration(name.to_string()),
            ));
        }

        let slot = frame.bindings.len();
        frame.bindings.push(Binding {
            name,
            depth,
            slot,
            mutable,
        });
        Ok(slot)
    }

    /// Whether `name` is a live global binding that the current function
    /// body cannot see
    pub fn hides_global(&self, name: &str) -> bool {
        self.in_function()
            && self.frames[0]
                .bindings
                .iter()
                .any(|binding| binding.name == name)
    }

    /// Innermost local first, then the parameters of the current function
    pub fn resolve(&self, name: &str) -> Option<Resolved> {
        let frame = self.frame();
        let local = frame
            .bindings
            .iter()
            .rev()
            .find(|binding| binding.name == name && binding.depth <= frame.depth)
            .map(|binding| Resolved::Local {
                slot: binding.slot,
                mutable: binding.mutable,
            });

        local.or_else(|| {
            frame
                .params
                .iter()
                .position(|param| *param == name)
                .map(Resolved::Param)
        })
    }
}
