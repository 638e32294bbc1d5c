use callsite_abi::SiteKind;
use rustc_hash::FxHashMap;

use crate::bytecode::{BytecodeBuilder, OpCode, Program};
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Eq,
    Compare,
}

impl BinaryOp {
    /// Operator method the left operand receives.
    pub fn method_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "plus",
            BinaryOp::Sub => "minus",
            BinaryOp::Mul => "multiply",
            BinaryOp::Div => "div",
            BinaryOp::IntDiv => "intdiv",
            BinaryOp::Mod => "mod",
            BinaryOp::Eq => "equals",
            BinaryOp::Compare => "compareTo",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Var(String),
    This,
    Class(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Range(Box<Expr>, Box<Expr>),
    /// `expr as Type`: an explicit coercion request.
    Cast(Box<Expr>, String),
    Call {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        safe: bool,
    },
    /// Unqualified call inside a method body, dispatched on `this`.
    CallCurrent {
        name: String,
        args: Vec<Expr>,
    },
    CallStatic {
        class: String,
        name: String,
        args: Vec<Expr>,
    },
    New {
        class: String,
        args: Vec<Expr>,
    },
    Property {
        receiver: Box<Expr>,
        name: String,
        safe: bool,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn call(receiver: Expr, name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Box::new(receiver),
            name: name.to_string(),
            args,
            safe: false,
        }
    }

    pub fn safe_call(receiver: Expr, name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Box::new(receiver),
            name: name.to_string(),
            args,
            safe: true,
        }
    }

    pub fn property(receiver: Expr, name: &str) -> Self {
        Expr::Property {
            receiver: Box::new(receiver),
            name: name.to_string(),
            safe: false,
        }
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let(String, Expr),
    Assign(String, Expr),
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Return(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    TooManyCallSites,
    TooManyConstants,
    TooManyLocals,
    TooManyClasses,
    TooManyArguments(usize),
    TooManyElements(usize),
    UnknownLocal(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::TooManyCallSites => write!(f, "too many call sites in one unit"),
            CompileError::TooManyConstants => write!(f, "too many constants in one unit"),
            CompileError::TooManyLocals => write!(f, "too many locals in one unit"),
            CompileError::TooManyClasses => write!(f, "too many class references in one unit"),
            CompileError::TooManyArguments(count) => {
                write!(f, "call has {count} arguments, at most 255 are supported")
            }
            CompileError::TooManyElements(count) => {
                write!(f, "literal has {count} elements, at most 65535 are supported")
            }
            CompileError::UnknownLocal(name) => write!(f, "unknown local '{name}'"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Lowers statements to bytecode. Every invocation expression gets its own
/// call site slot, numbered in source order.
pub struct Compiler {
    builder: BytecodeBuilder,
    program: Program,
    int_constants: FxHashMap<i64, u32>,
    float_constants: FxHashMap<u64, u32>,
    string_constants: FxHashMap<String, u32>,
    locals: FxHashMap<String, u8>,
    classes: FxHashMap<String, u16>,
}

impl Compiler {
    pub fn new(owner: &str) -> Self {
        Self {
            builder: BytecodeBuilder::new(),
            program: Program::new(owner, Vec::new(), Vec::new()),
            int_constants: FxHashMap::default(),
            float_constants: FxHashMap::default(),
            string_constants: FxHashMap::default(),
            locals: FxHashMap::default(),
            classes: FxHashMap::default(),
        }
    }

    pub fn compile_program(mut self, stmts: &[Stmt]) -> Result<Program, CompileError> {
        self.compile_stmts(stmts)?;
        self.builder.ldnull();
        self.builder.ret();
        let mut program = self.program;
        program.code = self.builder.finish();
        Ok(program)
    }

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let(name, expr) => {
                self.compile_expr(expr)?;
                let index = self.declare_local(name)?;
                self.builder.stloc(index);
            }
            Stmt::Assign(name, expr) => {
                self.compile_expr(expr)?;
                let index = self.local(name)?;
                self.builder.stloc(index);
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.builder.pop();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let to_else = self.builder.br_placeholder(OpCode::Brfalse);
                self.compile_stmts(then_branch)?;
                let to_end = self.builder.br_placeholder(OpCode::Br);
                let else_start = self.builder.position();
                self.builder.patch_target(to_else, else_start);
                self.compile_stmts(else_branch)?;
                let end = self.builder.position();
                self.builder.patch_target(to_end, end);
            }
            Stmt::While { condition, body } => {
                let start = self.builder.position();
                self.compile_expr(condition)?;
                let to_end = self.builder.br_placeholder(OpCode::Brfalse);
                self.compile_stmts(body)?;
                self.builder.br(start);
                let end = self.builder.position();
                self.builder.patch_target(to_end, end);
            }
            Stmt::Return(expr) => {
                self.compile_expr(expr)?;
                self.builder.ret();
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Null => self.builder.ldnull(),
            Expr::Bool(flag) => {
                let index = self.add_constant(Value::Bool(*flag))?;
                self.builder.ldc(index);
            }
            Expr::Int(number) => {
                let index = self.add_constant(Value::Int(*number))?;
                self.builder.ldc(index);
            }
            Expr::Float(number) => {
                let index = self.add_constant(Value::Float(*number))?;
                self.builder.ldc(index);
            }
            Expr::String(text) => {
                let index = self.add_constant(Value::string(text))?;
                self.builder.ldc(index);
            }
            Expr::Var(name) => {
                let index = self.local(name)?;
                self.builder.ldloc(index);
            }
            Expr::This => self.builder.ldthis(),
            Expr::Class(name) => {
                let class = self.class(name)?;
                self.builder.ldclass(class);
            }
            Expr::List(items) => {
                let len = element_count(items.len())?;
                for item in items {
                    self.compile_expr(item)?;
                }
                self.builder.new_list(len);
            }
            Expr::Map(entries) => {
                let len = element_count(entries.len())?;
                for (key, value) in entries {
                    let index = self.add_constant(Value::string(key))?;
                    self.builder.ldc(index);
                    self.compile_expr(value)?;
                }
                self.builder.new_map(len);
            }
            Expr::Range(from, to) => {
                self.compile_expr(from)?;
                self.compile_expr(to)?;
                self.builder.new_range();
            }
            Expr::Cast(value, class) => {
                self.compile_expr(value)?;
                let class = self.class(class)?;
                self.builder.wrap(class);
            }
            Expr::Call {
                receiver,
                name,
                args,
                safe,
            } => {
                self.compile_expr(receiver)?;
                let opcode = if *safe { OpCode::CallSafe } else { OpCode::Call };
                self.compile_invoke(opcode, name, args)?;
            }
            Expr::CallCurrent { name, args } => {
                self.builder.ldthis();
                self.compile_invoke(OpCode::CallCurrent, name, args)?;
            }
            Expr::CallStatic { class, name, args } => {
                let class = self.class(class)?;
                self.builder.ldclass(class);
                self.compile_invoke(OpCode::CallStatic, name, args)?;
            }
            Expr::New { class, args } => {
                let class_index = self.class(class)?;
                self.builder.ldclass(class_index);
                self.compile_invoke(OpCode::CallNew, "<init>", args)?;
            }
            Expr::Property {
                receiver,
                name,
                safe,
            } => {
                self.compile_expr(receiver)?;
                let slot = self.add_call_site(name, SiteKind::GetProperty)?;
                self.builder.get_property(slot, *safe);
            }
            Expr::Binary(op, lhs, rhs) => {
                self.compile_expr(lhs)?;
                self.compile_invoke(OpCode::Call, op.method_name(), std::slice::from_ref(rhs.as_ref()))?;
            }
            Expr::Neg(value) => {
                self.compile_expr(value)?;
                self.compile_invoke(OpCode::Call, "negative", &[])?;
            }
            Expr::Not(value) => {
                self.compile_expr(value)?;
                self.builder.not();
            }
        }
        Ok(())
    }

    /// Receiver is already on the stack.
    fn compile_invoke(&mut self, opcode: OpCode, name: &str, args: &[Expr]) -> Result<(), CompileError> {
        let argc = u8::try_from(args.len()).map_err(|_| CompileError::TooManyArguments(args.len()))?;
        for arg in args {
            self.compile_expr(arg)?;
        }
        let kind = opcode.site_kind().unwrap_or(SiteKind::Call);
        let slot = self.add_call_site(name, kind)?;
        self.builder.invoke(opcode, slot, argc);
        Ok(())
    }

    fn add_call_site(&mut self, name: &str, kind: SiteKind) -> Result<u16, CompileError> {
        self.program
            .call_sites
            .push(name, kind)
            .ok_or(CompileError::TooManyCallSites)
    }

    fn add_constant(&mut self, value: Value) -> Result<u32, CompileError> {
        let existing = match &value {
            Value::Int(number) => self.int_constants.get(number).copied(),
            Value::Float(number) => self.float_constants.get(&number.to_bits()).copied(),
            Value::String(text) => self.string_constants.get(&**text).copied(),
            _ => None,
        };
        if let Some(index) = existing {
            return Ok(index);
        }
        let index =
            u32::try_from(self.program.constants.len()).map_err(|_| CompileError::TooManyConstants)?;
        match &value {
            Value::Int(number) => {
                self.int_constants.insert(*number, index);
            }
            Value::Float(number) => {
                self.float_constants.insert(number.to_bits(), index);
            }
            Value::String(text) => {
                self.string_constants.insert(text.to_string(), index);
            }
            _ => {}
        }
        self.program.constants.push(value);
        Ok(index)
    }

    fn declare_local(&mut self, name: &str) -> Result<u8, CompileError> {
        if let Some(index) = self.locals.get(name) {
            return Ok(*index);
        }
        if self.locals.len() >= u8::MAX as usize {
            return Err(CompileError::TooManyLocals);
        }
        let index = self.locals.len() as u8;
        self.locals.insert(name.to_string(), index);
        self.program.locals = index + 1;
        Ok(index)
    }

    fn local(&self, name: &str) -> Result<u8, CompileError> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownLocal(name.to_string()))
    }

    fn class(&mut self, name: &str) -> Result<u16, CompileError> {
        if let Some(index) = self.classes.get(name) {
            return Ok(*index);
        }
        let index =
            u16::try_from(self.program.classes.len()).map_err(|_| CompileError::TooManyClasses)?;
        self.program.classes.push(name.to_string());
        self.classes.insert(name.to_string(), index);
        Ok(index)
    }
}

fn element_count(len: usize) -> Result<u16, CompileError> {
    u16::try_from(len).map_err(|_| CompileError::TooManyElements(len))
}

pub fn compile(owner: &str, stmts: &[Stmt]) -> Result<Program, CompileError> {
    Compiler::new(owner).compile_program(stmts)
}
