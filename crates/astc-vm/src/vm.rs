//! Interpréteur : état, chargement, boucle d'exécution.

use core::fmt;

use astc_core::{
    decode_at, EngineError, EngineResult, Fault, Instruction, REGISTER_COUNT, STACK_SLOTS,
};

use crate::host::{HostCalls, NoHost};

/// État de la machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    Ready,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        })
    }
}

/// Interpréteur de bytecode.
///
/// Le buffer chargé est emprunté (`'code`) et jamais modifié.
#[derive(Clone)]
pub struct Vm<'code> {
    regs: [i64; REGISTER_COUNT],
    stack: [i64; STACK_SLOTS],
    sp: usize,
    pc: usize,
    code: Option<&'code [u8]>,
    state: VmState,
    result: Option<i64>,
    last_error: Option<EngineError>,
    steps: u64,
    step_limit: Option<u64>,
}

impl Default for Vm<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Vm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("sp", &self.sp)
            .field("code_len", &self.code.map(<[u8]>::len))
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl<'code> Vm<'code> {
    /// VM vide, `Ready`, sans programme.
    pub const fn new() -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            stack: [0; STACK_SLOTS],
            sp: 0,
            pc: 0,
            code: None,
            state: VmState::Ready,
            result: None,
            last_error: None,
            steps: 0,
            step_limit: None,
        }
    }

    /// Charge un programme ; remet PC, pile et registres à zéro.
    ///
    /// Légal depuis `Ready` et `Stopped`. Une VM en `Error` doit d'abord
    /// passer par [`reset`](Self::reset).
    pub fn load(&mut self, code: &'code [u8]) -> EngineResult<()> {
        match self.state {
            VmState::Ready | VmState::Stopped => {}
            VmState::Running => return Err(EngineError::invalid("load pendant un run")),
            VmState::Error => return Err(EngineError::invalid("VM en erreur : reset() requis avant load")),
        }
        if code.is_empty() {
            return Err(EngineError::invalid("programme vide"));
        }
        self.clear_machine();
        self.code = Some(code);
        self.state = VmState::Ready;
        Ok(())
    }

    /// Retour à `Ready`, sans programme.
    pub fn reset(&mut self) {
        self.clear_machine();
        self.code = None;
        self.state = VmState::Ready;
    }

    fn clear_machine(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.sp = 0;
        self.pc = 0;
        self.result = None;
        self.last_error = None;
        self.steps = 0;
    }

    /// Budget d'instructions par run (`None` : illimité).
    pub fn set_step_limit(&mut self, limit: Option<u64>) {
        self.step_limit = limit;
    }

    pub const fn state(&self) -> VmState {
        self.state
    }

    pub const fn pc(&self) -> usize {
        self.pc
    }

    pub fn register(&self, r: usize) -> Option<i64> {
        self.regs.get(r).copied()
    }

    pub const fn stack_depth(&self) -> usize {
        self.sp
    }

    /// Valeur du dernier run terminé en `Stopped`.
    pub const fn result(&self) -> Option<i64> {
        self.result
    }

    pub const fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    /// Instructions exécutées depuis le dernier `load`.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Exécute sans imports (tout `CALL` échoue).
    pub fn run(&mut self) -> EngineResult<i64> {
        self.run_with(&mut NoHost)
    }

    /// Exécute le programme chargé jusqu'à `HALT`/`EXIT`/`RETURN`, la fin du
    /// buffer, ou une faute.
    pub fn run_with<H: HostCalls + ?Sized>(&mut self, host: &mut H) -> EngineResult<i64> {
        let code = match (self.state, self.code) {
            (VmState::Ready, Some(code)) => code,
            (VmState::Ready, None) => return Err(EngineError::invalid("aucun programme chargé")),
            (VmState::Stopped, _) => return Err(EngineError::invalid("run terminé : load() requis")),
            (VmState::Running, _) => return Err(EngineError::invalid("run déjà en cours")),
            (VmState::Error, _) => return Err(EngineError::invalid("VM en erreur : reset() requis")),
        };

        self.state = VmState::Running;
        vm_trace!(len = code.len(), "run");
        match self.execute(code, host) {
            Ok(v) => {
                self.state = VmState::Stopped;
                self.result = Some(v);
                vm_trace!(value = v, steps = self.steps, "stopped");
                Ok(v)
            }
            Err(e) => {
                self.state = VmState::Error;
                vm_trace!(error = %e, pc = self.pc, "error");
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /* ─────────────────────────── Boucle ─────────────────────────── */

    fn execute<H: HostCalls + ?Sized>(&mut self, code: &[u8], host: &mut H) -> EngineResult<i64> {
        loop {
            if self.pc >= code.len() {
                return Ok(0);
            }
            if let Some(limit) = self.step_limit {
                if self.steps >= limit {
                    return Err(self.fault(Fault::StepLimit(limit)));
                }
            }
            // en cas d'échec, PC reste sur l'instruction fautive
            let ins = decode_at(code, self.pc)?;
            let next = self.pc + ins.width();
            self.steps += 1;

            match ins {
                Instruction::Nop => {}
                Instruction::Halt => {
                    self.pc = next;
                    return Ok(0);
                }
                Instruction::Exit { code } => {
                    self.pc = next;
                    return Ok(i64::from(code));
                }
                Instruction::Return { src } => {
                    let v = self.read(src)?;
                    self.pc = next;
                    return Ok(v);
                }
                Instruction::LoadImm { dst, imm } => self.write(dst, imm)?,
                Instruction::Add { a, b, dst } => {
                    let v = self.read(a)?.wrapping_add(self.read(b)?);
                    self.write(dst, v)?;
                }
                Instruction::Sub { a, b, dst } => {
                    let v = self.read(a)?.wrapping_sub(self.read(b)?);
                    self.write(dst, v)?;
                }
                Instruction::Push { src } => {
                    let v = self.read(src)?;
                    if self.sp == STACK_SLOTS {
                        return Err(self.fault(Fault::StackOverflow));
                    }
                    self.stack[self.sp] = v;
                    self.sp += 1;
                }
                Instruction::Pop { dst } => {
                    self.check_reg(dst)?;
                    if self.sp == 0 {
                        return Err(self.fault(Fault::StackUnderflow));
                    }
                    self.sp -= 1;
                    self.regs[usize::from(dst)] = self.stack[self.sp];
                }
                Instruction::Call { import, argc, dst } => {
                    self.check_reg(dst)?;
                    let argc = usize::from(argc);
                    if argc > self.sp {
                        return Err(self.fault(Fault::StackUnderflow));
                    }
                    let base = self.sp - argc;
                    let v = host.call_host(import, &self.stack[base..self.sp])?;
                    self.sp = base;
                    self.regs[usize::from(dst)] = v;
                }
            }
            self.pc = next;
        }
    }

    const fn fault(&self, fault: Fault) -> EngineError {
        EngineError::ExecutionFault { pc: self.pc, fault }
    }

    fn check_reg(&self, r: u8) -> EngineResult<()> {
        if usize::from(r) < REGISTER_COUNT {
            Ok(())
        } else {
            Err(self.fault(Fault::BadRegister(r)))
        }
    }

    fn read(&self, r: u8) -> EngineResult<i64> {
        self.regs.get(usize::from(r)).copied().ok_or_else(|| self.fault(Fault::BadRegister(r)))
    }

    fn write(&mut self, r: u8, v: i64) -> EngineResult<()> {
        self.check_reg(r)?;
        self.regs[usize::from(r)] = v;
        Ok(())
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use astc_core::{ErrorKind, ProgramBuilder};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn reference() -> Vec<u8> {
        let mut b = ProgramBuilder::new();
        b.load_imm(0, 10).load_imm(1, 20).add(0, 1, 0).ret(0);
        b.finish()
    }

    #[test]
    fn runs_reference_program() {
        let code = reference();
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Ok(30));
        assert_eq!(vm.state(), VmState::Stopped);
        assert_eq!(vm.result(), Some(30));
        assert_eq!(vm.steps(), 4);
        assert_eq!(vm.pc(), code.len());
    }

    #[test]
    fn unknown_opcode_stops_without_advancing() {
        let code = [0xEE];
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Err(EngineError::UnknownOpcode { opcode: 0xEE, pc: 0 }));
        assert_eq!(vm.state(), VmState::Error);
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.last_error().map(EngineError::kind), Some(ErrorKind::UnknownOpcode));
    }

    #[test]
    fn unknown_opcode_after_valid_prefix() {
        let mut b = ProgramBuilder::new();
        b.load_imm(0, 1).raw(&[0xEE]).ret(0);
        let code = b.finish();
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert!(vm.run().is_err());
        assert_eq!(vm.pc(), 10);
        assert_eq!(vm.register(0), Some(1));
    }

    #[test]
    fn terminators() {
        for (code, want) in [(vec![0x01], 0), (vec![0xFF, 42], 42), (vec![0x00, 0x00], 0)] {
            let mut vm = Vm::new();
            vm.load(&code).unwrap();
            assert_eq!(vm.run(), Ok(want), "{code:?}");
        }
    }

    #[test]
    fn code_after_terminator_is_never_decoded() {
        let code = [0xFF, 3, 0xEE, 0xEE];
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Ok(3));
    }

    #[test]
    fn truncated_instruction_ends_scan() {
        let code = [0x00, 0x10, 0x00, 0x01];
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(vm.pc(), 1);
        assert_eq!(vm.register(0), Some(0));
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut b = ProgramBuilder::new();
        b.load_imm(0, 1).load_imm(1, 2).push(0).push(1).pop(2).pop(3).sub(2, 3, 4).ret(4);
        let code = b.finish();
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Ok(1));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn stack_faults_are_errors() {
        let mut vm = Vm::new();
        let underflow = [0x51, 0x00];
        vm.load(&underflow).unwrap();
        assert_eq!(vm.run(), Err(EngineError::ExecutionFault { pc: 0, fault: Fault::StackUnderflow }));

        let mut b = ProgramBuilder::new();
        for _ in 0..=STACK_SLOTS {
            b.push(0);
        }
        let overflow = b.finish();
        vm.reset();
        vm.load(&overflow).unwrap();
        assert_eq!(
            vm.run(),
            Err(EngineError::ExecutionFault { pc: 2 * STACK_SLOTS, fault: Fault::StackOverflow })
        );
        assert_eq!(vm.stack_depth(), STACK_SLOTS);
    }

    #[test]
    fn bad_register_is_a_fault() {
        let code = [0x31, 16];
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Err(EngineError::ExecutionFault { pc: 0, fault: Fault::BadRegister(16) }));
    }

    #[test]
    fn lifecycle_rules() {
        let code = reference();
        let mut vm = Vm::new();
        assert_eq!(vm.run().unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(vm.load(&[]).unwrap_err().kind(), ErrorKind::InvalidInput);

        vm.load(&code).unwrap();
        vm.run().unwrap();
        // Stopped: relance interdite sans reload, reload autorisé
        assert!(vm.run().is_err());
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Ok(30));

        let bad = [0xEE];
        vm.load(&bad).unwrap();
        vm.run().unwrap_err();
        assert_eq!(vm.load(&code).unwrap_err().kind(), ErrorKind::InvalidInput);
        vm.reset();
        assert_eq!(vm.state(), VmState::Ready);
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Ok(30));
    }

    #[test]
    fn load_resets_machine() {
        let mut b = ProgramBuilder::new();
        b.load_imm(5, 99).push(5).halt();
        let first = b.finish();
        let mut vm = Vm::new();
        vm.load(&first).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.register(5), Some(99));
        assert_eq!(vm.stack_depth(), 1);

        let second = [0x31, 5];
        vm.load(&second).unwrap();
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(vm.run(), Ok(0));
    }

    #[test]
    fn call_goes_through_host() {
        let mut b = ProgramBuilder::new();
        b.load_imm(0, 7).load_imm(1, 5).push(0).push(1).call(3, 2, 2).ret(2);
        let code = b.finish();

        let mut seen = Vec::new();
        let mut host = |import: u16, args: &[i64]| -> EngineResult<i64> {
            seen.push((import, args.to_vec()));
            Ok(args[0] * args[1])
        };
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run_with(&mut host), Ok(35));
        assert_eq!(vm.stack_depth(), 0);
        assert_eq!(seen, vec![(3, vec![7, 5])]);
    }

    #[test]
    fn call_without_host_fails() {
        let mut b = ProgramBuilder::new();
        b.call(0, 0, 0).ret(0);
        let code = b.finish();
        let mut vm = Vm::new();
        vm.load(&code).unwrap();
        assert_eq!(vm.run().unwrap_err().kind(), ErrorKind::FfiNotFound);
        assert_eq!(vm.state(), VmState::Error);
    }

    #[test]
    fn step_limit_stops_long_runs() {
        let code = [0x00; 8];
        let mut vm = Vm::new();
        vm.set_step_limit(Some(3));
        vm.load(&code).unwrap();
        assert_eq!(vm.run(), Err(EngineError::ExecutionFault { pc: 3, fault: Fault::StepLimit(3) }));
    }

    proptest! {
        #[test]
        fn arithmetic_wraps(a in any::<i64>(), b in any::<i64>()) {
            let mut p = ProgramBuilder::new();
            p.load_imm(0, a).load_imm(1, b).add(0, 1, 2).sub(0, 1, 3).push(2).push(3).pop(4).pop(5).sub(5, 4, 6).ret(6);
            let code = p.finish();
            let mut vm = Vm::new();
            vm.load(&code).unwrap();
            let sum = a.wrapping_add(b);
            let diff = a.wrapping_sub(b);
            prop_assert_eq!(vm.run(), Ok(sum.wrapping_sub(diff)));
        }
    }
}
