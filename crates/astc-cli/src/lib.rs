//! astc-cli : bibliothèque interne du binaire `astc`
//!
//! `main.rs` parse les arguments et installe le subscriber ; ici on garde la
//! logique testable : lecture des programmes (binaire, hex, assembleur),
//! superposition de la configuration, exécution des tâches.

#![deny(unused_must_use)]

use std::{
    fmt::Write as _,
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, bail, Context, Result};
use astc_core::{asm, disasm, Arch};
use astc_jit::SUPPORTED_ARCHES;
use astc_runtime::{EngineConfig, ExecMode, ExecutionService};
use tracing::{debug, info, warn};

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

// ───────────────────────────── Types publics ─────────────────────────────

#[derive(Clone, Debug)]
pub enum Command {
    /// Exécuter un programme (interpréteur, JIT ou auto).
    Run(RunTask),
    /// Compiler vers du code natif brut.
    Compile(CompileTask),
    /// Désassembler un bytecode.
    Disasm(DisasmTask),
    /// Assembler un texte vers du bytecode.
    Asm(AsmTask),
    /// Hôte, backends, configuration effective.
    Info(InfoTask),
}

#[derive(Clone, Debug, Default)]
pub struct RunTask {
    pub program: Program,
    pub config: ConfigLayers,
    pub repeat: u32,
    pub stats: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CompileTask {
    pub program: Program,
    pub arch: Option<Arch>,
    pub output: Output,
    pub config: ConfigLayers,
}

#[derive(Clone, Debug, Default)]
pub struct DisasmTask {
    pub program: Program,
    pub output: Output,
}

#[derive(Clone, Debug, Default)]
pub struct AsmTask {
    pub input: Input,
    pub output: Output,
}

#[derive(Clone, Debug, Default)]
pub struct InfoTask {
    pub config: ConfigLayers,
    pub json: bool,
}

/// Entrée : fichier ou `-` (stdin).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Input {
    #[default]
    Stdin,
    Path(PathBuf),
}

impl Input {
    pub fn from_arg(p: Option<PathBuf>) -> Self {
        match p {
            Some(path) if path.as_os_str() != "-" => Self::Path(path),
            _ => Self::Stdin,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Stdin => "<stdin>".into(),
            Self::Path(p) => display(p),
        }
    }
}

/// Encodage d'un programme en entrée.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// Octets bruts ; `.s`/`.asm` passent par l'assembleur.
    #[default]
    Auto,
    Binary,
    Hex,
    Asm,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub input: Input,
    pub format: Format,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    Stdout,
    Path(PathBuf),
}

impl Output {
    pub fn from_arg(p: Option<PathBuf>) -> Self {
        match p {
            Some(path) if path.as_os_str() != "-" => Self::Path(path),
            _ => Self::Stdout,
        }
    }
}

/// Couches de configuration : défauts < fichier JSON < `ASTC_*` < options.
#[derive(Clone, Debug, Default)]
pub struct ConfigLayers {
    pub file: Option<PathBuf>,
    pub mode: Option<ExecMode>,
    pub arch: Option<Arch>,
    pub cache_capacity: Option<usize>,
    pub seal_code: bool,
    pub no_fallback: bool,
}

impl ConfigLayers {
    pub fn resolve(&self) -> Result<EngineConfig> {
        self.resolve_with(|k| std::env::var(k).ok())
    }

    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
        let mut cfg = match &self.file {
            Some(p) => {
                let text = fs::read_to_string(p).with_context(|| format!("lecture de {}", display(p)))?;
                EngineConfig::from_json(&text).with_context(|| format!("config {}", display(p)))?
            }
            None => EngineConfig::default(),
        };
        cfg.apply_env(env).context("variables ASTC_*")?;
        if let Some(m) = self.mode {
            cfg.mode = m;
        }
        if let Some(a) = self.arch {
            cfg.arch = Some(a);
        }
        if let Some(c) = self.cache_capacity {
            cfg.jit.cache_capacity = c;
        }
        if self.seal_code {
            cfg.jit.seal_code = true;
        }
        if self.no_fallback {
            cfg.fallback_to_interpreter = false;
        }
        debug!(target: "astc::cli", ?cfg, "configuration");
        Ok(cfg)
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande ; retourne le code de sortie du processus.
pub fn execute(cmd: Command) -> Result<i32> {
    match cmd {
        Command::Run(t) => run_entry(&t),
        Command::Compile(t) => compile_entry(&t).map(|()| 0),
        Command::Disasm(t) => disasm_entry(&t).map(|()| 0),
        Command::Asm(t) => asm_entry(&t).map(|()| 0),
        Command::Info(t) => info_entry(&t).map(|()| 0),
    }
}

fn run_entry(task: &RunTask) -> Result<i32> {
    let code = load_program(&task.program)?;
    let cfg = task.config.resolve()?;
    let mode = cfg.mode;
    let mut svc = ExecutionService::new(cfg);

    let repeat = task.repeat.max(1);
    let start = Instant::now();
    let mut last = None;
    for _ in 0..repeat {
        last = Some(svc.execute(&code, mode).context("échec d'exécution")?);
    }
    let elapsed = start.elapsed();
    let out = last.ok_or_else(|| anyhow!("aucune exécution"))?;
    info!(target: "astc::cli", value = out.value, path = %out.path, repeat, "terminé");

    println!("{}", out.value);
    status_info("exec", &format!("{} via {} ({repeat}× en {elapsed:.2?})", out.value, out.path));
    if task.stats {
        println!("{}", serde_json::to_string_pretty(&svc.stats())?);
    }
    // code de sortie du processus : octet bas de la valeur
    Ok(i32::from(out.value.to_le_bytes()[0]))
}

fn compile_entry(task: &CompileTask) -> Result<()> {
    let code = load_program(&task.program)?;
    let cfg = task.config.resolve()?;
    let arch = task
        .arch
        .or(cfg.arch)
        .or_else(Arch::host)
        .ok_or_else(|| anyhow!("architecture hôte inconnue : précisez --arch"))?;
    let mut svc = ExecutionService::new(cfg);
    let block = svc.compile(&code, arch).with_context(|| format!("compilation {arch}"))?;
    let native = block.bytes().to_vec();
    block.release().context("libération du bloc")?;

    match &task.output {
        Output::Path(p) => {
            write_bytes_atomic(p, &native)?;
            status_ok("compilé", &format!("{} octets {arch} → {}", native.len(), display(p)));
        }
        Output::Stdout => println!("{}", hex_dump(&native)),
    }
    Ok(())
}

fn disasm_entry(task: &DisasmTask) -> Result<()> {
    let code = load_program(&task.program)?;
    let text = disasm::disassemble_full(&code, &task.program.input.label());
    emit_text(&task.output, &text)
}

fn asm_entry(task: &AsmTask) -> Result<()> {
    let src = read_text(&task.input)?;
    let code = asm::assemble(&src).with_context(|| format!("assemblage de {}", task.input.label()))?;
    match &task.output {
        Output::Path(p) => {
            write_bytes_atomic(p, &code)?;
            status_ok("assemblé", &format!("{} octets → {}", code.len(), display(p)));
        }
        Output::Stdout => println!("{}", hex_dump(&code)),
    }
    Ok(())
}

fn info_entry(task: &InfoTask) -> Result<()> {
    let cfg = task.config.resolve()?;
    let host = Arch::host().map_or("inconnue", Arch::name);
    let backends: Vec<&str> = SUPPORTED_ARCHES.iter().map(|a| a.name()).collect();
    if task.json {
        let payload = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "host": host,
            "page_size": astc_sys::page_size(),
            "backends": backends,
            "config": cfg,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    println!("astc {}", env!("CARGO_PKG_VERSION"));
    println!("hôte       : {host}");
    println!("page       : {} octets", astc_sys::page_size());
    println!("backends   : {}", backends.join(", "));
    println!("mode       : {}", cfg.mode);
    println!("cible JIT  : {}", cfg.target_arch().map_or("aucune", Arch::name));
    println!("cache      : {} entrées", cfg.jit.cache_capacity);
    println!("scellement : {}", if cfg.jit.seal_code { "oui" } else { "non" });
    Ok(())
}

// ───────────────────────────── Programmes ─────────────────────────────

/// Lit un programme selon son format (auto : extension `.s`/`.asm`/`.hex`).
pub fn load_program(p: &Program) -> Result<Vec<u8>> {
    let format = match (p.format, &p.input) {
        (Format::Auto, Input::Path(path)) => match path.extension().and_then(|e| e.to_str()) {
            Some("s" | "asm") => Format::Asm,
            Some("hex") => Format::Hex,
            _ => Format::Binary,
        },
        (Format::Auto, Input::Stdin) => Format::Binary,
        (f, _) => f,
    };
    let code = match format {
        Format::Asm => asm::assemble(&read_text(&p.input)?)?,
        Format::Hex => parse_hex(&read_text(&p.input)?)?,
        Format::Binary | Format::Auto => read_bytes(&p.input)?,
    };
    if code.is_empty() {
        bail!("programme vide : {}", p.input.label());
    }
    Ok(code)
}

/// Hex libre : espaces ignorés, `#` commente jusqu'à la fin de ligne.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default())
        .flat_map(str::bytes)
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        bail!("hex : nombre impair de chiffres");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).map_err(|_| anyhow!("hex : caractère non ASCII"))?;
            u8::from_str_radix(s, 16).map_err(|_| anyhow!("hex : `{s}` invalide"))
        })
        .collect()
}

/// Octets en hex, 16 par ligne.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, chunk) in bytes.chunks(16).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let _ = write!(out, "{}", line.join(" "));
    }
    out
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_bytes(input: &Input) -> Result<Vec<u8>> {
    match input {
        Input::Stdin => {
            let mut v = Vec::new();
            io::stdin().read_to_end(&mut v)?;
            Ok(v)
        }
        Input::Path(p) => fs::read(p).with_context(|| format!("ouverture: {}", display(p))),
    }
}

fn read_text(input: &Input) -> Result<String> {
    match input {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            Ok(s)
        }
        Input::Path(p) => fs::read_to_string(p).with_context(|| format!("ouverture: {}", display(p))),
    }
}

fn emit_text(output: &Output, text: &str) -> Result<()> {
    match output {
        Output::Stdout => {
            print!("{text}");
            Ok(())
        }
        Output::Path(p) => write_bytes_atomic(p, text.as_bytes()),
    }
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let base = path.file_name().ok_or_else(|| anyhow!("chemin de sortie invalide: {}", display(path)))?;
    let tmp = parent.join(format!("{}.tmp", base.to_string_lossy()));
    {
        let mut w = BufWriter::new(File::create(&tmp).with_context(|| format!("création: {}", display(&tmp)))?);
        w.write_all(bytes)?;
        w.flush()?;
    }
    if path.exists() {
        // Windows : rename sur une cible existante échoue
        if let Err(e) = fs::remove_file(path) {
            warn!(target: "astc::cli", path = %crate::display(path), error = %e, "suppression de l'ancienne sortie");
        }
    }
    if let Err(e) = fs::rename(&tmp, path) {
        if let Err(rm) = fs::remove_file(&tmp) {
            warn!(target: "astc::cli", path = %crate::display(&tmp), error = %rm, "fichier temporaire laissé en place");
        }
        return Err(e).with_context(|| format!("renommage vers {}", display(path)));
    }
    Ok(())
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    eprintln!("{} {}", tag.green().bold(), msg);
    #[cfg(not(feature = "color"))]
    eprintln!("{tag} {msg}");
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    eprintln!("{} {}", tag.blue().bold(), msg);
    #[cfg(not(feature = "color"))]
    eprintln!("{tag} {msg}");
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("10 00 0a00000000000000  # r0 = 10\n31 00").unwrap()[..2], [0x10, 0x00]);
        assert_eq!(parse_hex("ff\n02").unwrap(), vec![0xFF, 0x02]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn hex_dump_wraps_at_sixteen() {
        let dump = hex_dump(&[0xAB; 17]);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.ends_with("\nab"));
    }

    #[test]
    fn programs_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let s = dir.path().join("a.s");
        fs::write(&s, "load_imm r0, 10\nload_imm r1, 20\nadd r0, r1, r0\nreturn r0\n").unwrap();
        let from_asm = load_program(&Program { input: Input::Path(s), format: Format::Auto }).unwrap();

        let bin = dir.path().join("a.bin");
        fs::write(&bin, &from_asm).unwrap();
        let from_bin = load_program(&Program { input: Input::Path(bin), format: Format::Auto }).unwrap();
        assert_eq!(from_asm, from_bin);

        let hex = dir.path().join("a.hex");
        fs::write(&hex, hex_dump(&from_asm)).unwrap();
        let from_hex = load_program(&Program { input: Input::Path(hex), format: Format::Auto }).unwrap();
        assert_eq!(from_hex, from_asm);
    }

    #[test]
    fn empty_program_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("vide.bin");
        fs::write(&p, b"").unwrap();
        assert!(load_program(&Program { input: Input::Path(p), format: Format::Binary }).is_err());
    }

    #[test]
    fn flags_override_file_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("astc.json");
        fs::write(&file, r#"{ "mode": "jit", "jit": { "cache_capacity": 8 } }"#).unwrap();
        let layers = ConfigLayers {
            file: Some(file),
            arch: Some(Arch::Aarch64),
            no_fallback: true,
            ..ConfigLayers::default()
        };
        let cfg = layers
            .resolve_with(|k| (k == "ASTC_CACHE_CAPACITY").then(|| "32".to_string()))
            .unwrap();
        assert_eq!(cfg.mode, ExecMode::Jit);
        assert_eq!(cfg.jit.cache_capacity, 32);
        assert_eq!(cfg.arch, Some(Arch::Aarch64));
        assert!(!cfg.fallback_to_interpreter);
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out.bin");
        write_bytes_atomic(&p, b"un").unwrap();
        write_bytes_atomic(&p, b"deux").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"deux");
        assert!(!dir.path().join("out.bin.tmp").exists());
    }

    #[test]
    fn failed_atomic_write_cleans_up() {
        // la cible est un répertoire non vide : ni remove_file ni rename ne passent
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sortie");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("garde.txt"), b"x").unwrap();

        assert!(write_bytes_atomic(&target, b"code").is_err());
        assert!(target.join("garde.txt").exists());
        assert!(!dir.path().join("sortie.tmp").exists());
    }

    #[test]
    fn compile_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("p.s");
        fs::write(&src, "exit 3\n").unwrap();
        let out = dir.path().join("p.x64");
        let task = CompileTask {
            program: Program { input: Input::Path(src), format: Format::Auto },
            arch: Some(Arch::X86_64),
            output: Output::Path(out.clone()),
            config: ConfigLayers::default(),
        };
        execute(Command::Compile(task)).unwrap();
        let native = fs::read(out).unwrap();
        assert_eq!(&native[..4], &[0x55, 0x48, 0x89, 0xE5]);
        assert_eq!(native.last(), Some(&0xC3));
    }
}
