//! AArch64 (AAPCS64).
//!
//! `r0..r7` → x9..x16, scratch x17 : registres temporaires, non sauvegardés.
//! Chaque push occupe 16 octets pour garder sp aligné ; sp est restauré
//! depuis x29 à l'épilogue.

use astc_core::{Arch, EngineError, EngineResult};

use super::Backend;
use crate::{
    codebuf::CodeBuffer,
    lower::{NativeOp, NativeReg},
};

const X0: u32 = 0;
const FIRST: u32 = 9;
const COUNT: u8 = 8;
const SCRATCH: u32 = 17;
const SP: u32 = 31;

/// `stp x29, x30, [sp, #-16]! ; mov x29, sp`
const PROLOGUE: [u32; 2] = [0xA9BF_7BFD, 0x9100_03FD];
/// `mov sp, x29 ; ldp x29, x30, [sp], #16 ; ret`
const EPILOGUE: [u32; 3] = [0x9100_03BF, 0xA8C1_7BFD, 0xD65F_03C0];

#[derive(Debug, Default, Clone, Copy)]
pub struct Aarch64Backend;

fn hw(r: NativeReg) -> EngineResult<u32> {
    match r {
        NativeReg::R(i) if i < COUNT => Ok(FIRST + u32::from(i)),
        NativeReg::R(i) => Err(EngineError::invalid(format!("aarch64: registre r{i} hors banc"))),
        NativeReg::Scratch => Ok(SCRATCH),
    }
}

fn words(buf: &mut CodeBuffer, ws: &[u32]) -> EngineResult<()> {
    ws.iter().try_for_each(|&w| buf.emit_u32_le(w))
}

/// `movz` sur le demi-mot 0 puis `movk` pour chaque demi-mot non nul.
fn mov_imm(buf: &mut CodeBuffer, rd: u32, imm: i64) -> EngineResult<()> {
    let bits = imm as u64;
    let half = |hw: u32| ((bits >> (16 * hw)) & 0xFFFF) as u32;
    buf.emit_u32_le(0xD280_0000 | (half(0) << 5) | rd)?;
    for hw in 1..4 {
        if half(hw) != 0 {
            buf.emit_u32_le(0xF280_0000 | (hw << 21) | (half(hw) << 5) | rd)?;
        }
    }
    Ok(())
}

/// `mov xd, xm` (alias de `orr xd, xzr, xm`).
const fn mov(rd: u32, rm: u32) -> u32 {
    0xAA00_03E0 | (rm << 16) | rd
}

impl Backend for Aarch64Backend {
    fn arch(&self) -> Arch {
        Arch::Aarch64
    }

    fn name(&self) -> &'static str {
        "aarch64-aapcs64"
    }

    fn register_count(&self) -> u8 {
        COUNT
    }

    fn prologue(&self, buf: &mut CodeBuffer) -> EngineResult<()> {
        words(buf, &PROLOGUE)
    }

    fn emit(&self, op: NativeOp, buf: &mut CodeBuffer) -> EngineResult<()> {
        match op {
            NativeOp::MovImm { dst, imm } => mov_imm(buf, hw(dst)?, imm),
            NativeOp::Mov { dst, src } => buf.emit_u32_le(mov(hw(dst)?, hw(src)?)),
            NativeOp::Add { dst, src } => {
                let (d, m) = (hw(dst)?, hw(src)?);
                buf.emit_u32_le(0x8B00_0000 | (m << 16) | (d << 5) | d)
            }
            NativeOp::Sub { dst, src } => {
                let (d, m) = (hw(dst)?, hw(src)?);
                buf.emit_u32_le(0xCB00_0000 | (m << 16) | (d << 5) | d)
            }
            // str xt, [sp, #-16]!
            NativeOp::Push(r) => buf.emit_u32_le(0xF81F_0C00 | (SP << 5) | hw(r)?),
            // ldr xt, [sp], #16
            NativeOp::Pop(r) => buf.emit_u32_le(0xF841_0400 | (SP << 5) | hw(r)?),
            NativeOp::Ret(r) => {
                buf.emit_u32_le(mov(X0, hw(r)?))?;
                self.epilogue(buf)
            }
            NativeOp::RetImm(imm) => {
                mov_imm(buf, X0, imm)?;
                self.epilogue(buf)
            }
        }
    }

    fn epilogue(&self, buf: &mut CodeBuffer) -> EngineResult<()> {
        words(buf, &EPILOGUE)
    }
}
