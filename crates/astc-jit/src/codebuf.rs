//! Buffer d'émission à capacité fixe.
//!
//! Ne grandit jamais : un dépassement renvoie `BufferOverflow` et le contenu
//! partiel est abandonné par l'appelant.

use astc_core::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl CodeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), capacity }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) -> EngineResult<()> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.capacity {
            return Err(EngineError::BufferOverflow { needed, capacity: self.capacity });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn emit_u8(&mut self, b: u8) -> EngineResult<()> {
        self.emit_bytes(&[b])
    }

    pub fn emit_u32_le(&mut self, v: u32) -> EngineResult<()> {
        self.emit_bytes(&v.to_le_bytes())
    }

    pub fn emit_u64_le(&mut self, v: u64) -> EngineResult<()> {
        self.emit_bytes(&v.to_le_bytes())
    }
}
