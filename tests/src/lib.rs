//! Outils partagés des tests d'intégration : programmes de référence et
//! générateurs `proptest` de programmes sans branchement.

use astc_core::{ProgramBuilder, Reg, STACK_SLOTS};
use proptest::prelude::*;

/// `LOAD_IMM r0,10 ; LOAD_IMM r1,20 ; ADD r0,r1,r0 ; RETURN r0` → 30.
pub fn scenario_a() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, 10).load_imm(1, 20).add(0, 1, 0).ret(0);
    b.finish()
}

/// Un seul octet hors table.
pub const SCENARIO_B: [u8; 1] = [0xEE];

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Load(Reg, i64),
    Add(Reg, Reg, Reg),
    Sub(Reg, Reg, Reg),
    Push(Reg),
    Pop(Reg),
    Nop,
}

#[derive(Debug, Clone, Copy)]
pub enum End {
    Return(Reg),
    Exit(u8),
    Halt,
    /// Fin du buffer sans terminateur.
    Fallthrough,
}

/// Étapes sur `r0..r{regs-1}` (registres communs à toutes les backends).
pub fn step(regs: Reg) -> impl Strategy<Value = Step> {
    let r = 0..regs;
    prop_oneof![
        3 => (r.clone(), any::<i64>()).prop_map(|(d, i)| Step::Load(d, i)),
        3 => (r.clone(), r.clone(), r.clone()).prop_map(|(a, b, d)| Step::Add(a, b, d)),
        3 => (r.clone(), r.clone(), r.clone()).prop_map(|(a, b, d)| Step::Sub(a, b, d)),
        1 => r.clone().prop_map(Step::Push),
        1 => r.clone().prop_map(Step::Pop),
        1 => Just(Step::Nop),
    ]
}

pub fn end(regs: Reg) -> impl Strategy<Value = End> {
    prop_oneof![
        4 => (0..regs).prop_map(End::Return),
        1 => any::<u8>().prop_map(End::Exit),
        1 => Just(End::Halt),
        1 => Just(End::Fallthrough),
    ]
}

/// Encode les étapes ; les `POP` sur pile vide et les `PUSH` au-delà de
/// [`STACK_SLOTS`] sont sautés pour que le programme reste valide.
pub fn build(steps: &[Step], end: End) -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    let mut depth = 0usize;
    for s in steps {
        match *s {
            Step::Load(d, i) => {
                b.load_imm(d, i);
            }
            Step::Add(x, y, d) => {
                b.add(x, y, d);
            }
            Step::Sub(x, y, d) => {
                b.sub(x, y, d);
            }
            Step::Push(r) if depth < STACK_SLOTS => {
                depth += 1;
                b.push(r);
            }
            Step::Pop(r) if depth > 0 => {
                depth -= 1;
                b.pop(r);
            }
            Step::Push(_) | Step::Pop(_) => {}
            Step::Nop => {
                b.nop();
            }
        }
    }
    match end {
        End::Return(r) => {
            b.ret(r);
        }
        End::Exit(c) => {
            b.exit(c);
        }
        End::Halt => {
            b.halt();
        }
        End::Fallthrough => {
            b.nop();
        }
    }
    b.finish()
}

/// Programme valide aléatoire sur `regs` registres.
pub fn program(regs: Reg, max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    (prop::collection::vec(step(regs), 0..max_len), end(regs)).prop_map(|(s, e)| build(&s, e))
}
