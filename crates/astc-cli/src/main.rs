//! `astc` : CLI du moteur astc
//!
//! Ici : parsing d'arguments, installation du subscriber `tracing`, puis
//! délégation à `astc_cli` (lib).

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use astc_core::Arch;
use astc_runtime::ExecMode;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use astc_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "astc", version, about = "astc : exécuter, compiler, (dés)assembler du bytecode", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Erreurs uniquement
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Interpret,
    Jit,
    Auto,
}

impl From<Mode> for ExecMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Interpret => Self::Interpret,
            Mode::Jit => Self::Jit,
            Mode::Auto => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    Auto,
    Bin,
    Hex,
    Asm,
}

impl From<InputFormat> for cli::Format {
    fn from(f: InputFormat) -> Self {
        match f {
            InputFormat::Auto => Self::Auto,
            InputFormat::Bin => Self::Binary,
            InputFormat::Hex => Self::Hex,
            InputFormat::Asm => Self::Asm,
        }
    }
}

/// Options de configuration communes.
#[derive(Debug, Args)]
struct ConfigArgs {
    /// Fichier de configuration JSON
    #[arg(long, env = "ASTC_CONFIG")]
    config: Option<PathBuf>,
    /// Capacité du cache de code (entrées)
    #[arg(long)]
    cache: Option<usize>,
    /// Retirer le droit d'écriture du code émis
    #[arg(long)]
    seal: bool,
    /// Pas de repli sur l'interpréteur en mode auto
    #[arg(long = "no-fallback")]
    no_fallback: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Exécuter un programme
    Run {
        /// Programme (ou - pour stdin)
        input: Option<PathBuf>,
        /// Chemin d'exécution
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Cible du JIT (x86_64, aarch64…)
        #[arg(long)]
        arch: Option<Arch>,
        /// Entrée en hex texte
        #[arg(long, conflicts_with = "format")]
        hex: bool,
        /// Format d'entrée
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,
        /// Nombre d'exécutions
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Statistiques JSON après exécution
        #[arg(long)]
        stats: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Compiler vers du code natif brut
    Compile {
        input: Option<PathBuf>,
        /// Architecture cible (hôte par défaut)
        #[arg(long)]
        arch: Option<Arch>,
        /// Fichier de sortie (hex sur stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Désassembler un bytecode
    Disasm {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,
    },

    /// Assembler un texte vers du bytecode
    Asm {
        input: Option<PathBuf>,
        /// Bytecode de sortie (hex sur stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Hôte, backends et configuration effective
    Info {
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

impl ConfigArgs {
    fn layers(self, mode: Option<Mode>, arch: Option<Arch>) -> cli::ConfigLayers {
        cli::ConfigLayers {
            file: self.config,
            mode: mode.map(Into::into),
            arch,
            cache_capacity: self.cache,
            seal_code: self.seal,
            no_fallback: self.no_fallback,
        }
    }
}

// ──────────────────────────── Traces ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    // -v/-q explicites priment sur ASTC_LOG / RUST_LOG
    let filter = if quiet || verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_env("ASTC_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(level))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(true).try_init();
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("erreur: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> Result<u8> {
    let opt = Opt::parse();
    init_telemetry(opt.verbose, opt.quiet);

    let command = match opt.cmd {
        Command::Run { input, mode, arch, hex, format, repeat, stats, config } => cli::Command::Run(cli::RunTask {
            program: cli::Program {
                input: cli::Input::from_arg(input),
                format: if hex { cli::Format::Hex } else { format.into() },
            },
            config: config.layers(mode, arch),
            repeat,
            stats,
        }),
        Command::Compile { input, arch, output, format, config } => cli::Command::Compile(cli::CompileTask {
            program: cli::Program { input: cli::Input::from_arg(input), format: format.into() },
            arch,
            output: cli::Output::from_arg(output),
            config: config.layers(None, arch),
        }),
        Command::Disasm { input, output, format } => cli::Command::Disasm(cli::DisasmTask {
            program: cli::Program { input: cli::Input::from_arg(input), format: format.into() },
            output: cli::Output::from_arg(output),
        }),
        Command::Asm { input, output } => cli::Command::Asm(cli::AsmTask {
            input: cli::Input::from_arg(input),
            output: cli::Output::from_arg(output),
        }),
        Command::Info { json, config } => cli::Command::Info(cli::InfoTask { config: config.layers(None, None), json }),
    };

    let code = cli::execute(command).context("échec de la commande")?;
    Ok(code.clamp(0, 255) as u8)
}
