//! Small line-based assembler for the opcode table.
//!
//! ```text
//! ; commentaire
//! LOAD_IMM r0, 10
//! LOAD_IMM r1, 0x14
//! ADD r0, r1, r0      ; r0 = r0 + r1
//! CALL 0, 2, r3       ; import, argc, dst
//! RETURN r0
//! .byte 0xEE          ; raw bytes
//! ```

use super::{builder::ProgramBuilder, opcode::Opcode};
use crate::error::{EngineError, EngineResult};

/// Assemble a source snippet into bytecode.
pub fn assemble(source: &str) -> EngineResult<Vec<u8>> {
    let mut b = ProgramBuilder::new();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args: Vec<&str> =
            rest.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

        if head.eq_ignore_ascii_case(".byte") {
            for a in &args {
                let v = parse_int(a, line_no)?;
                let byte = u8::try_from(v).map_err(|_| err(line_no, format!("octet hors bornes `{a}`")))?;
                b.raw(&[byte]);
            }
            continue;
        }

        let op = Opcode::from_mnemonic(head)
            .ok_or_else(|| err(line_no, format!("instruction non supportée: `{head}`")))?;
        let want = match op {
            Opcode::Nop | Opcode::Halt => 0,
            Opcode::LoadImm => 2,
            Opcode::Add | Opcode::Sub | Opcode::Call => 3,
            Opcode::Return | Opcode::Push | Opcode::Pop | Opcode::Exit => 1,
        };
        if args.len() != want {
            return Err(err(line_no, format!("{} attend {want} opérande(s), reçu {}", op.mnemonic(), args.len())));
        }

        match op {
            Opcode::Nop => b.nop(),
            Opcode::Halt => b.halt(),
            Opcode::LoadImm => b.load_imm(parse_reg(args[0], line_no)?, parse_int(args[1], line_no)?),
            Opcode::Add => b.add(
                parse_reg(args[0], line_no)?,
                parse_reg(args[1], line_no)?,
                parse_reg(args[2], line_no)?,
            ),
            Opcode::Sub => b.sub(
                parse_reg(args[0], line_no)?,
                parse_reg(args[1], line_no)?,
                parse_reg(args[2], line_no)?,
            ),
            Opcode::Call => {
                let import = u16::try_from(parse_int(args[0], line_no)?)
                    .map_err(|_| err(line_no, "index d'import hors bornes"))?;
                let argc = u8::try_from(parse_int(args[1], line_no)?)
                    .map_err(|_| err(line_no, "argc hors bornes"))?;
                b.call(import, argc, parse_reg(args[2], line_no)?)
            }
            Opcode::Return => b.ret(parse_reg(args[0], line_no)?),
            Opcode::Push => b.push(parse_reg(args[0], line_no)?),
            Opcode::Pop => b.pop(parse_reg(args[0], line_no)?),
            Opcode::Exit => {
                let code = u8::try_from(parse_int(args[0], line_no)?)
                    .map_err(|_| err(line_no, "code de sortie hors bornes (0..=255)"))?;
                b.exit(code)
            }
        };
    }

    Ok(b.finish())
}

fn err(line: usize, msg: impl std::fmt::Display) -> EngineError {
    EngineError::invalid(format!("ligne {line}: {msg}"))
}

fn parse_reg(s: &str, line: usize) -> EngineResult<u8> {
    let digits = s
        .strip_prefix('r')
        .or_else(|| s.strip_prefix('R'))
        .ok_or_else(|| err(line, format!("registre attendu: `{s}`")))?;
    digits.parse::<u8>().map_err(|_| err(line, format!("registre invalide: `{s}`")))
}

fn parse_int(s: &str, line: usize) -> EngineResult<i64> {
    let (neg, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parsed = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map(|v| v as i64)
    } else {
        body.parse::<i64>()
    };
    let v = parsed.map_err(|_| err(line, format!("entier invalide: `{s}`")))?;
    Ok(if neg { v.wrapping_neg() } else { v })
}
