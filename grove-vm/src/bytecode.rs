use callsite_abi::{CallSiteManifest, SiteKind};

use crate::value::Value;

#[derive(Clone, Debug)]
pub struct Program {
    pub constants: Vec<Value>,
    pub code: Vec<u8>,
    pub locals: u8,
    /// Class names referenced by `ldclass` and `wrap`, resolved at load.
    pub classes: Vec<String>,
    pub call_sites: CallSiteManifest,
}

impl Program {
    pub fn new(owner: impl Into<String>, constants: Vec<Value>, code: Vec<u8>) -> Self {
        Self {
            constants,
            code,
            locals: 0,
            classes: Vec::new(),
            call_sites: CallSiteManifest::new(owner),
        }
    }

    pub fn owner(&self) -> &str {
        &self.call_sites.owner
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0x00,
    Ret = 0x01,
    Ldc = 0x02,
    Ldnull = 0x03,
    Ldloc = 0x04,
    Stloc = 0x05,
    Ldthis = 0x06,
    Ldclass = 0x07,
    Pop = 0x08,
    Dup = 0x09,
    Br = 0x0A,
    Brfalse = 0x0B,
    Not = 0x0C,
    NewList = 0x0D,
    NewMap = 0x0E,
    NewRange = 0x0F,
    Wrap = 0x10,
    Call = 0x11,
    CallSafe = 0x12,
    CallCurrent = 0x13,
    CallStatic = 0x14,
    CallNew = 0x15,
    GetProp = 0x16,
    GetPropSafe = 0x17,
}

const OPCODES: [OpCode; 24] = [
    OpCode::Nop,
    OpCode::Ret,
    OpCode::Ldc,
    OpCode::Ldnull,
    OpCode::Ldloc,
    OpCode::Stloc,
    OpCode::Ldthis,
    OpCode::Ldclass,
    OpCode::Pop,
    OpCode::Dup,
    OpCode::Br,
    OpCode::Brfalse,
    OpCode::Not,
    OpCode::NewList,
    OpCode::NewMap,
    OpCode::NewRange,
    OpCode::Wrap,
    OpCode::Call,
    OpCode::CallSafe,
    OpCode::CallCurrent,
    OpCode::CallStatic,
    OpCode::CallNew,
    OpCode::GetProp,
    OpCode::GetPropSafe,
];

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        OPCODES.get(byte as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::Ret => "ret",
            OpCode::Ldc => "ldc",
            OpCode::Ldnull => "ldnull",
            OpCode::Ldloc => "ldloc",
            OpCode::Stloc => "stloc",
            OpCode::Ldthis => "ldthis",
            OpCode::Ldclass => "ldclass",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Br => "br",
            OpCode::Brfalse => "brfalse",
            OpCode::Not => "not",
            OpCode::NewList => "newlist",
            OpCode::NewMap => "newmap",
            OpCode::NewRange => "newrange",
            OpCode::Wrap => "wrap",
            OpCode::Call => "call",
            OpCode::CallSafe => "call.safe",
            OpCode::CallCurrent => "call.current",
            OpCode::CallStatic => "call.static",
            OpCode::CallNew => "call.new",
            OpCode::GetProp => "getprop",
            OpCode::GetPropSafe => "getprop.safe",
        }
    }

    pub fn parse_mnemonic(op: &str) -> Option<Self> {
        OPCODES.iter().copied().find(|opcode| opcode.mnemonic() == op)
    }

    /// Slot kind an invocation opcode exercises.
    pub fn site_kind(self) -> Option<SiteKind> {
        match self {
            OpCode::Call | OpCode::CallSafe => Some(SiteKind::Call),
            OpCode::CallCurrent => Some(SiteKind::CallCurrent),
            OpCode::CallStatic => Some(SiteKind::CallStatic),
            OpCode::CallNew => Some(SiteKind::CallConstructor),
            OpCode::GetProp | OpCode::GetPropSafe => Some(SiteKind::GetProperty),
            _ => None,
        }
    }
}

pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn finish(self) -> Vec<u8> {
        self.code
    }

    pub fn ret(&mut self) {
        self.emit_opcode(OpCode::Ret);
    }

    pub fn ldc(&mut self, index: u32) {
        self.emit_opcode(OpCode::Ldc);
        self.emit_u32(index);
    }

    pub fn ldnull(&mut self) {
        self.emit_opcode(OpCode::Ldnull);
    }

    pub fn ldloc(&mut self, index: u8) {
        self.emit_opcode(OpCode::Ldloc);
        self.emit_u8(index);
    }

    pub fn stloc(&mut self, index: u8) {
        self.emit_opcode(OpCode::Stloc);
        self.emit_u8(index);
    }

    pub fn ldthis(&mut self) {
        self.emit_opcode(OpCode::Ldthis);
    }

    pub fn ldclass(&mut self, class: u16) {
        self.emit_opcode(OpCode::Ldclass);
        self.emit_u16(class);
    }

    pub fn pop(&mut self) {
        self.emit_opcode(OpCode::Pop);
    }

    pub fn dup(&mut self) {
        self.emit_opcode(OpCode::Dup);
    }

    pub fn br(&mut self, target: u32) {
        self.emit_opcode(OpCode::Br);
        self.emit_u32(target);
    }

    pub fn brfalse(&mut self, target: u32) {
        self.emit_opcode(OpCode::Brfalse);
        self.emit_u32(target);
    }

    /// Emits a forward branch and returns the offset of its target operand.
    pub fn br_placeholder(&mut self, opcode: OpCode) -> usize {
        self.emit_opcode(opcode);
        let at = self.code.len();
        self.emit_u32(0);
        at
    }

    pub fn patch_target(&mut self, at: usize, target: u32) {
        self.code[at..at + 4].copy_from_slice(&target.to_le_bytes());
    }

    pub fn not(&mut self) {
        self.emit_opcode(OpCode::Not);
    }

    pub fn new_list(&mut self, len: u16) {
        self.emit_opcode(OpCode::NewList);
        self.emit_u16(len);
    }

    pub fn new_map(&mut self, len: u16) {
        self.emit_opcode(OpCode::NewMap);
        self.emit_u16(len);
    }

    pub fn new_range(&mut self) {
        self.emit_opcode(OpCode::NewRange);
    }

    pub fn wrap(&mut self, class: u16) {
        self.emit_opcode(OpCode::Wrap);
        self.emit_u16(class);
    }

    /// Invocation through call site `slot` with `argc` stacked arguments.
    pub fn invoke(&mut self, opcode: OpCode, slot: u16, argc: u8) {
        self.emit_opcode(opcode);
        self.emit_u16(slot);
        self.emit_u8(argc);
    }

    pub fn get_property(&mut self, slot: u16, safe: bool) {
        self.emit_opcode(if safe {
            OpCode::GetPropSafe
        } else {
            OpCode::GetProp
        });
        self.emit_u16(slot);
    }

    fn emit_opcode(&mut self, opcode: OpCode) {
        self.code.push(opcode as u8);
    }

    fn emit_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_decode_from_their_byte() {
        for opcode in OPCODES {
            assert_eq!(OpCode::from_u8(opcode as u8), Some(opcode));
            assert_eq!(OpCode::parse_mnemonic(opcode.mnemonic()), Some(opcode));
        }
        assert_eq!(OpCode::from_u8(OPCODES.len() as u8), None);
    }

    #[test]
    fn forward_branch_is_patched_in_place() {
        let mut builder = BytecodeBuilder::new();
        let at = builder.br_placeholder(OpCode::Brfalse);
        builder.ldnull();
        let end = builder.position();
        builder.patch_target(at, end);
        let code = builder.finish();
        assert_eq!(code[0], OpCode::Brfalse as u8);
        assert_eq!(u32::from_le_bytes([code[1], code[2], code[3], code[4]]), end);
    }
}
