use std::sync::Arc;

use tracing::debug;

use crate::bytecode::{OpCode, Program};
use crate::callsite::CallSiteTable;
use crate::error::RuntimeError;
use crate::runtime::Runtime;
use crate::value::{TypeId, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    StackUnderflow,
    TypeMismatch(&'static str),
    InvalidConstant(u32),
    InvalidLocal(u8),
    InvalidClass(u16),
    UnknownClass(String),
    InvalidOpcode(u8),
    BytecodeBounds,
    Runtime(RuntimeError),
}

pub type VmResult<T> = Result<T, VmError>;

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::StackUnderflow => write!(f, "stack underflow"),
            VmError::TypeMismatch(expected) => write!(f, "type mismatch: expected {expected}"),
            VmError::InvalidConstant(index) => write!(f, "invalid constant index {index}"),
            VmError::InvalidLocal(index) => write!(f, "invalid local index {index}"),
            VmError::InvalidClass(index) => write!(f, "invalid class index {index}"),
            VmError::UnknownClass(name) => write!(f, "unknown class '{name}'"),
            VmError::InvalidOpcode(opcode) => write!(f, "invalid opcode 0x{opcode:02X}"),
            VmError::BytecodeBounds => write!(f, "bytecode read out of bounds"),
            VmError::Runtime(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for VmError {}

impl From<RuntimeError> for VmError {
    fn from(err: RuntimeError) -> Self {
        VmError::Runtime(err)
    }
}

/// A program bound to a runtime: class references resolved and its call
/// site table built. Every `Vm` running the unit shares the table.
pub struct LoadedUnit {
    program: Program,
    owner: TypeId,
    classes: Vec<TypeId>,
    call_sites: CallSiteTable,
}

impl LoadedUnit {
    pub fn load(runtime: Arc<Runtime>, program: Program) -> VmResult<Arc<LoadedUnit>> {
        let registry = runtime.registry().clone();
        let owner = match registry.lookup(program.owner()) {
            Some(owner) => owner,
            None => registry.define_class(program.owner()).build().type_id(),
        };
        let classes = program
            .classes
            .iter()
            .map(|name| {
                registry
                    .lookup(name)
                    .ok_or_else(|| VmError::UnknownClass(name.clone()))
            })
            .collect::<VmResult<Vec<_>>>()?;
        let call_sites = CallSiteTable::new(runtime, owner, &program.call_sites);
        debug!(
            owner = program.owner(),
            sites = call_sites.len(),
            classes = classes.len(),
            "loaded unit"
        );
        Ok(Arc::new(LoadedUnit {
            program,
            owner,
            classes,
            call_sites,
        }))
    }

    pub fn owner(&self) -> TypeId {
        self.owner
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn call_sites(&self) -> &CallSiteTable {
        &self.call_sites
    }
}

pub struct Vm {
    unit: Arc<LoadedUnit>,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    this: Value,
}

impl Vm {
    pub fn new(unit: Arc<LoadedUnit>) -> Self {
        let locals = vec![Value::Null; unit.program.locals as usize];
        Self {
            unit,
            ip: 0,
            stack: Vec::new(),
            locals,
            this: Value::Null,
        }
    }

    /// Receiver for `ldthis` and unqualified calls.
    pub fn with_this(mut self, this: Value) -> Self {
        self.this = this;
        self
    }

    pub fn locals(&self) -> &[Value] {
        &self.locals
    }

    pub fn run(&mut self) -> VmResult<Value> {
        self.ip = 0;
        self.stack.clear();
        loop {
            if self.ip >= self.unit.program.code.len() {
                return Err(VmError::BytecodeBounds);
            }
            let opcode = self.read_u8()?;
            if let Some(result) = self.execute_instruction(opcode)? {
                return Ok(result);
            }
        }
    }

    fn execute_instruction(&mut self, opcode: u8) -> VmResult<Option<Value>> {
        match opcode {
            x if x == OpCode::Nop as u8 => {}
            x if x == OpCode::Ret as u8 => return self.pop_value().map(Some),
            x if x == OpCode::Ldc as u8 => {
                let index = self.read_u32()?;
                let value = self
                    .unit
                    .program
                    .constants
                    .get(index as usize)
                    .cloned()
                    .ok_or(VmError::InvalidConstant(index))?;
                self.stack.push(value);
            }
            x if x == OpCode::Ldnull as u8 => self.stack.push(Value::Null),
            x if x == OpCode::Ldloc as u8 => {
                let index = self.read_u8()?;
                let value = self
                    .locals
                    .get(index as usize)
                    .cloned()
                    .ok_or(VmError::InvalidLocal(index))?;
                self.stack.push(value);
            }
            x if x == OpCode::Stloc as u8 => {
                let index = self.read_u8()?;
                let value = self.pop_value()?;
                let slot = self
                    .locals
                    .get_mut(index as usize)
                    .ok_or(VmError::InvalidLocal(index))?;
                *slot = value;
            }
            x if x == OpCode::Ldthis as u8 => self.stack.push(self.this.clone()),
            x if x == OpCode::Ldclass as u8 => {
                let class = self.read_class()?;
                self.stack.push(Value::Class(class));
            }
            x if x == OpCode::Pop as u8 => {
                self.pop_value()?;
            }
            x if x == OpCode::Dup as u8 => {
                let value = self.stack.last().cloned().ok_or(VmError::StackUnderflow)?;
                self.stack.push(value);
            }
            x if x == OpCode::Br as u8 => {
                let target = self.read_u32()? as usize;
                self.jump_to(target)?;
            }
            x if x == OpCode::Brfalse as u8 => {
                let target = self.read_u32()? as usize;
                let condition = self.pop_condition()?;
                if !condition {
                    self.jump_to(target)?;
                }
            }
            x if x == OpCode::Not as u8 => {
                let condition = self.pop_condition()?;
                self.stack.push(Value::Bool(!condition));
            }
            x if x == OpCode::NewList as u8 => {
                let len = self.read_u16()? as usize;
                let values = self.pop_values(len)?;
                self.stack.push(Value::list(values));
            }
            x if x == OpCode::NewMap as u8 => {
                let len = self.read_u16()? as usize;
                let flat = self.pop_values(len * 2)?;
                let mut entries = Vec::with_capacity(len);
                let mut flat = flat.into_iter();
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    let key = key.as_str().ok_or(VmError::TypeMismatch("string map key"))?.to_string();
                    entries.push((key, value));
                }
                self.stack.push(Value::map(entries));
            }
            x if x == OpCode::NewRange as u8 => {
                let to = self.pop_int()?;
                let from = self.pop_int()?;
                let values: Vec<Value> = if from <= to {
                    (from..=to).map(Value::Int).collect()
                } else {
                    (to..=from).rev().map(Value::Int).collect()
                };
                self.stack.push(Value::list(values));
            }
            x if x == OpCode::Wrap as u8 => {
                let declared = self.read_class()?;
                let value = self.pop_value()?;
                self.stack.push(Value::wrap(value, declared));
            }
            x if x == OpCode::Call as u8 => {
                let (slot, args, receiver) = self.read_invocation()?;
                let result = self.unit.call_sites.call(slot, &receiver, &args)?;
                self.stack.push(result);
            }
            x if x == OpCode::CallSafe as u8 => {
                let (slot, args, receiver) = self.read_invocation()?;
                let result = self.unit.call_sites.call_safe(slot, &receiver, &args)?;
                self.stack.push(result);
            }
            x if x == OpCode::CallCurrent as u8 => {
                let (slot, args, receiver) = self.read_invocation()?;
                let result = self.unit.call_sites.call_current(slot, &receiver, &args)?;
                self.stack.push(result);
            }
            x if x == OpCode::CallStatic as u8 => {
                let (slot, args, receiver) = self.read_invocation()?;
                let class = class_operand(&receiver)?;
                let result = self.unit.call_sites.call_static(slot, class, &args)?;
                self.stack.push(result);
            }
            x if x == OpCode::CallNew as u8 => {
                let (slot, args, receiver) = self.read_invocation()?;
                let class = class_operand(&receiver)?;
                let result = self.unit.call_sites.call_constructor(slot, class, &args)?;
                self.stack.push(result);
            }
            x if x == OpCode::GetProp as u8 => {
                let slot = self.read_u16()? as usize;
                let receiver = self.pop_value()?;
                let result = self.unit.call_sites.get_property(slot, &receiver)?;
                self.stack.push(result);
            }
            x if x == OpCode::GetPropSafe as u8 => {
                let slot = self.read_u16()? as usize;
                let receiver = self.pop_value()?;
                let result = self.unit.call_sites.get_property_safe(slot, &receiver)?;
                self.stack.push(result);
            }
            other => return Err(VmError::InvalidOpcode(other)),
        }
        Ok(None)
    }

    /// Decodes `slot argc` and pops the arguments, then the receiver.
    fn read_invocation(&mut self) -> VmResult<(usize, Vec<Value>, Value)> {
        let slot = self.read_u16()? as usize;
        let argc = self.read_u8()? as usize;
        let args = self.pop_values(argc)?;
        let receiver = self.pop_value()?;
        Ok((slot, args, receiver))
    }

    fn read_class(&mut self) -> VmResult<TypeId> {
        let index = self.read_u16()?;
        self.unit
            .classes
            .get(index as usize)
            .copied()
            .ok_or(VmError::InvalidClass(index))
    }

    fn jump_to(&mut self, target: usize) -> VmResult<()> {
        if target > self.unit.program.code.len() {
            return Err(VmError::BytecodeBounds);
        }
        self.ip = target;
        Ok(())
    }

    fn pop_value(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_values(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if count > self.stack.len() {
            return Err(VmError::StackUnderflow);
        }
        let start = self.stack.len() - count;
        Ok(self.stack.split_off(start))
    }

    fn pop_int(&mut self) -> VmResult<i64> {
        self.pop_value()?
            .as_int()
            .ok_or(VmError::TypeMismatch("int"))
    }

    fn pop_condition(&mut self) -> VmResult<bool> {
        match self.pop_value()? {
            Value::Bool(flag) => Ok(flag),
            Value::Null => Ok(false),
            _ => Err(VmError::TypeMismatch("bool")),
        }
    }

    fn read_u8(&mut self) -> VmResult<u8> {
        let code = &self.unit.program.code;
        let value = *code.get(self.ip).ok_or(VmError::BytecodeBounds)?;
        self.ip += 1;
        Ok(value)
    }

    fn read_u16(&mut self) -> VmResult<u16> {
        let bytes = self.read_bytes::<2>()?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn read_u32(&mut self) -> VmResult<u32> {
        let bytes = self.read_bytes::<4>()?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_bytes<const N: usize>(&mut self) -> VmResult<[u8; N]> {
        let code = &self.unit.program.code;
        let bytes = code
            .get(self.ip..self.ip + N)
            .ok_or(VmError::BytecodeBounds)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        self.ip += N;
        Ok(buf)
    }
}

fn class_operand(receiver: &Value) -> VmResult<TypeId> {
    match receiver {
        Value::Class(class) => Ok(*class),
        _ => Err(VmError::TypeMismatch("class")),
    }
}

/// Loads `program` and runs it once on a fresh `Vm`.
pub fn run_program(runtime: Arc<Runtime>, program: Program) -> VmResult<Value> {
    let unit = LoadedUnit::load(runtime, program)?;
    Vm::new(unit).run()
}
