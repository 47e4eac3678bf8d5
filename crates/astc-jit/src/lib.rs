//! astc-jit : compilation native du bytecode astc
//!
//! Pipeline : [`lower`] (bytecode → [`NativeOp`] deux-adresses), puis une
//! [`Backend`] par architecture (x86-64, AArch64) qui émet dans un
//! [`CodeBuffer`] borné, et enfin un [`CodeBlock`] exécutable. Le
//! [`JitCompiler`] place le code émis dans un [`CodeCache`] indexé par hash
//! de contenu et par architecture.
//!
//! `CALL` n'est pas compilé : l'Execution Service retombe sur
//! l'interpréteur pour ces programmes.
//!
//! ```ignore
//! use astc_core::{Arch, ProgramBuilder};
//! use astc_jit::{JitCompiler, JitConfig};
//! let mut b = ProgramBuilder::new();
//! b.load_imm(0, 10).load_imm(1, 20).add(0, 1, 0).ret(0);
//! let mut jit = JitCompiler::new(JitConfig::default());
//! let block = jit.compile(b.as_slice(), Arch::X86_64)?;
//! assert_eq!(block.invoke()?, 30);
//! ```

pub mod backend;
pub mod block;
pub mod cache;
pub mod codebuf;
pub mod compiler;
pub mod lower;

pub use backend::{backend_for, Aarch64Backend, Backend, X86_64Backend};
pub use block::CodeBlock;
pub use cache::{CacheEntry, CacheStats, CodeCache, ContentHasher};
pub use codebuf::CodeBuffer;
pub use compiler::{JitCompiler, JitConfig, JitStats};
pub use lower::{lower, NativeOp, NativeReg};

/// Architectures pour lesquelles une backend existe.
pub const SUPPORTED_ARCHES: [astc_core::Arch; 2] = [astc_core::Arch::X86_64, astc_core::Arch::Aarch64];
