//! x86-64 : System V et Win64.
//!
//! `r0..r5` → rax, rcx, rdx, r8, r9, r10 ; scratch r11. Tous volatils dans
//! les deux conventions : rien à sauvegarder hormis rbp. rsp est restauré
//! depuis rbp à l'épilogue, les push/pop non équilibrés sont donc sans effet
//! sur l'appelant.

use astc_core::{Arch, EngineError, EngineResult};

use super::Backend;
use crate::{
    codebuf::CodeBuffer,
    lower::{NativeOp, NativeReg},
};

const RAX: u8 = 0;
const MAP: [u8; 6] = [0, 1, 2, 8, 9, 10];
const SCRATCH: u8 = 11;

/// `push rbp ; mov rbp, rsp`
const PROLOGUE: [u8; 4] = [0x55, 0x48, 0x89, 0xE5];
/// `mov rsp, rbp ; pop rbp ; ret`
const EPILOGUE: [u8; 5] = [0x48, 0x89, 0xEC, 0x5D, 0xC3];

#[derive(Debug, Default, Clone, Copy)]
pub struct X86_64Backend;

fn hw(r: NativeReg) -> EngineResult<u8> {
    match r {
        NativeReg::R(i) => MAP
            .get(usize::from(i))
            .copied()
            .ok_or_else(|| EngineError::invalid(format!("x86_64: registre r{i} hors banc"))),
        NativeReg::Scratch => Ok(SCRATCH),
    }
}

/// `op r/m64, r64` en mode registre (`mov`=0x89, `add`=0x01, `sub`=0x29).
fn rr(buf: &mut CodeBuffer, opcode: u8, dst: u8, src: u8) -> EngineResult<()> {
    let rex = 0x48 | ((src >> 3) << 2) | (dst >> 3);
    buf.emit_bytes(&[rex, opcode, 0xC0 | ((src & 7) << 3) | (dst & 7)])
}

fn mov_imm(buf: &mut CodeBuffer, dst: u8, imm: i64) -> EngineResult<()> {
    if let Ok(v) = u32::try_from(imm) {
        // mov r32, imm32 (étend à zéro)
        if dst >= 8 {
            buf.emit_u8(0x41)?;
        }
        buf.emit_u8(0xB8 + (dst & 7))?;
        buf.emit_u32_le(v)
    } else if let Ok(v) = i32::try_from(imm) {
        // mov r/m64, imm32 (étend le signe)
        buf.emit_bytes(&[0x48 | (dst >> 3), 0xC7, 0xC0 | (dst & 7)])?;
        buf.emit_bytes(&v.to_le_bytes())
    } else {
        // movabs r64, imm64
        buf.emit_bytes(&[0x48 | (dst >> 3), 0xB8 + (dst & 7)])?;
        buf.emit_bytes(&imm.to_le_bytes())
    }
}

fn push_pop(buf: &mut CodeBuffer, base: u8, reg: u8) -> EngineResult<()> {
    if reg >= 8 {
        buf.emit_u8(0x41)?;
    }
    buf.emit_u8(base + (reg & 7))
}

impl Backend for X86_64Backend {
    fn arch(&self) -> Arch {
        Arch::X86_64
    }

    fn name(&self) -> &'static str {
        "x86_64-sysv"
    }

    fn register_count(&self) -> u8 {
        MAP.len() as u8
    }

    fn prologue(&self, buf: &mut CodeBuffer) -> EngineResult<()> {
        buf.emit_bytes(&PROLOGUE)
    }

    fn emit(&self, op: NativeOp, buf: &mut CodeBuffer) -> EngineResult<()> {
        match op {
            NativeOp::MovImm { dst, imm } => mov_imm(buf, hw(dst)?, imm),
            NativeOp::Mov { dst, src } => rr(buf, 0x89, hw(dst)?, hw(src)?),
            NativeOp::Add { dst, src } => rr(buf, 0x01, hw(dst)?, hw(src)?),
            NativeOp::Sub { dst, src } => rr(buf, 0x29, hw(dst)?, hw(src)?),
            NativeOp::Push(r) => push_pop(buf, 0x50, hw(r)?),
            NativeOp::Pop(r) => push_pop(buf, 0x58, hw(r)?),
            NativeOp::Ret(r) => {
                let src = hw(r)?;
                if src != RAX {
                    rr(buf, 0x89, RAX, src)?;
                }
                self.epilogue(buf)
            }
            NativeOp::RetImm(imm) => {
                mov_imm(buf, RAX, imm)?;
                self.epilogue(buf)
            }
        }
    }

    fn epilogue(&self, buf: &mut CodeBuffer) -> EngineResult<()> {
        buf.emit_bytes(&EPILOGUE)
    }
}
