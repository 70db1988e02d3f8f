//! `rap` : déploiement d'applications sur la carte
//!
//! Ici uniquement : parsing d'arguments, initialisation (logger, couleur),
//! complétions shell, puis délégation à `rap_cli` (lib).

#![forbid(unsafe_code)]

use std::{io, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use rap_cli as cli;
use rap_deploy::DeployMode;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "rap", version, about = "rap : construire, empaqueter et flasher une application", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (erreurs uniquement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Couleur des sorties
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Construire l'image du projet puis flasher la carte (ou écrire un paquet)
    Deploy {
        /// Racine du projet
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Déployer les scripts en source, sans passer par le compilateur
        #[arg(long)]
        source: bool,
        /// Écrire un paquet au lieu de flasher (nom du projet si omis)
        #[arg(long, num_args = 0..=1, value_name = "PATH", conflicts_with = "package_compact")]
        package: Option<Option<PathBuf>>,
        /// Comme --package, encodage compact
        #[arg(long = "package-compact", num_args = 0..=1, value_name = "PATH")]
        package_compact: Option<Option<PathBuf>>,
        /// Origine de l'image (négative : image relative) ; décimal ou 0x…
        #[arg(long, allow_negative_numbers = true, value_parser = parse_address)]
        address: Option<i64>,
        /// Fichier de layout JSON (flash_size, origin, compiler, flasher)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Délai max du flash, en secondes
        #[arg(long = "flash-timeout", value_name = "SECS")]
        flash_timeout: Option<u64>,
        /// Afficher le rapport de build (JSON) sur stdout
        #[arg(long)]
        summary: bool,
    },

    /// Opérations système sur la carte
    System {
        #[command(subcommand)]
        cmd: SystemCommand,
    },

    /// Décoder une image .bin
    Inspect {
        /// Image à lire
        input: PathBuf,
        /// Sortie JSON
        #[arg(long)]
        json: bool,
    },

    /// Générer le script de complétion pour un shell
    Completions {
        /// Shell cible
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum SystemCommand {
    /// Flasher un nouveau firmware (adresse 0)
    Upgrade {
        /// Binaire du firmware
        #[arg(value_name = "FIRMWARE-BINARY-FILE")]
        firmware: PathBuf,
        /// Fichier de layout JSON (utilitaire de flash)
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Délai max du flash, en secondes
        #[arg(long = "flash-timeout", value_name = "SECS")]
        flash_timeout: Option<u64>,
    },
}

fn parse_address(s: &str) -> std::result::Result<i64, String> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|e| format!("adresse invalide `{s}`: {e}"))?;
    Ok(if neg { -value } else { value })
}

// ──────────────────────────── Logger / Couleur ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    #[cfg(feature = "trace")]
    {
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
        std::env::set_var(
            "RUST_LOG",
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        );
        cli::init_logger();
    }
}

fn init_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Auto => {},
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();

    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    use cli::{Command as C, DeployTask, InspectTask, UpgradeTask};

    let command = match opt.cmd {
        Command::Deploy { project, source, package, package_compact, address, layout, flash_timeout, summary } => {
            let compact = package_compact.is_some();
            let mode = match package.or(package_compact) {
                Some(path) => DeployMode::Package { path },
                None => DeployMode::Flash,
            };
            C::Deploy(DeployTask {
                project,
                compile_scripts: !source,
                mode,
                compact,
                address,
                layout,
                flash_timeout,
                summary,
            })
        },
        Command::System { cmd: SystemCommand::Upgrade { firmware, layout, flash_timeout } } => {
            C::Upgrade(UpgradeTask { firmware, layout, flash_timeout })
        },
        Command::Inspect { input, json } => C::Inspect(InspectTask { input, json }),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Opt::command(), "rap", &mut io::stdout());
            return Ok(());
        },
    };

    let code = cli::execute(command).context("échec d'exécution de la commande")?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Opt::command().debug_assert();
    }

    #[test]
    fn addresses() {
        assert_eq!(parse_address("512000"), Ok(512_000));
        assert_eq!(parse_address("0x7d000"), Ok(0x7_D000));
        assert_eq!(parse_address("-1"), Ok(-1));
        assert_eq!(parse_address("0"), Ok(0));
        assert!(parse_address("abc").is_err());
    }

    #[test]
    fn package_flag_with_and_without_path() {
        let opt = Opt::try_parse_from(["rap", "deploy", "--package"]).unwrap();
        assert!(matches!(opt.cmd, Command::Deploy { package: Some(None), .. }));

        let opt = Opt::try_parse_from(["rap", "deploy", "--package-compact", "out.bin", "--address", "-1"]).unwrap();
        match opt.cmd {
            Command::Deploy { package_compact: Some(Some(p)), address: Some(-1), .. } => {
                assert_eq!(p, PathBuf::from("out.bin"));
            },
            other => panic!("unexpected {other:?}"),
        }

        assert!(Opt::try_parse_from(["rap", "deploy", "--package", "--package-compact"]).is_err());
    }

    #[test]
    fn system_upgrade() {
        let opt = Opt::try_parse_from(["rap", "system", "upgrade", "fw.bin"]).unwrap();
        assert!(matches!(opt.cmd, Command::System { cmd: SystemCommand::Upgrade { .. } }));
    }
}
