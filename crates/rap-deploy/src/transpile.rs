//! Pont vers le compilateur de scripts externe (`ruff-compiler`).
//!
//! Protocole : `<compilateur> <nom d'entrée>`, texte enveloppé sur stdin,
//! bytecode (ou diagnostic) sur stdout, statut de sortie = verdict.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use camino::Utf8Path;
use rap_core::ManifestEntry;

use crate::classify::ScriptKind;
use crate::error::{DeployError, Result};

/// Nom par défaut du compilateur, cherché dans `PATH`.
pub const DEFAULT_COMPILER: &str = "ruff-compiler";

/* ───────────────────────────── Enveloppes ───────────────────────────── */

/// Enveloppe d'un module JS : fabrique `(exports, require, module, __filename, __dirname)`.
pub fn wrap_js(raw: &str) -> String {
    format!("(function(){{return function(exports,require,module,__filename,__dirname){{{raw}\n}}}})();")
}

/// Enveloppe d'un document JSON, contenu rogné aux deux bouts.
pub fn wrap_json(raw: &str) -> String {
    format!("(function(){{return {};}})();", raw.trim())
}

/// Enveloppe selon la famille.
pub fn wrap(kind: ScriptKind, raw: &str) -> String {
    match kind {
        ScriptKind::Js => wrap_js(raw),
        ScriptKind::Json => wrap_json(raw),
    }
}

/* ───────────────────────────── Compilateurs ───────────────────────────── */

/// Stratégie de compilation injectée dans le build.
pub trait ScriptCompiler {
    /// Compile le texte enveloppé de l'entrée `name` ; rend le bytecode.
    fn compile(&self, name: &Utf8Path, wrapped: &str) -> Result<Vec<u8>>;

    /// Désignation pour les journaux.
    fn describe(&self) -> String;
}

/// Compilateur lancé en sous-processus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCompiler {
    program: PathBuf,
}

impl ProcessCompiler {
    /// Compilateur à l'exécutable donné (déjà résolu).
    pub fn new(program: impl Into<PathBuf>) -> Self { Self { program: program.into() } }

    /// Exécutable utilisé.
    pub fn program(&self) -> &Path { &self.program }

    fn unavailable(&self, source: std::io::Error) -> DeployError {
        DeployError::CompilerUnavailable { program: self.program.clone(), source }
    }
}

impl ScriptCompiler for ProcessCompiler {
    fn compile(&self, name: &Utf8Path, wrapped: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .arg(name.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        // stdin écrit à part : le compilateur peut remplir stdout avant d'avoir tout lu.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = wrapped.as_bytes().to_vec();
            std::thread::spawn(move || stdin.write_all(&input))
        });
        let output = child.wait_with_output().map_err(|e| self.unavailable(e))?;
        if let Some(Ok(Err(e))) = writer.map(|h| h.join()) {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(self.unavailable(e));
            }
        }

        if !output.stderr.is_empty() {
            tracing::debug!(entry = %name, stderr = %String::from_utf8_lossy(&output.stderr), "stderr du compilateur");
        }
        if !output.status.success() {
            return Err(DeployError::Compilation {
                name: name.to_path_buf(),
                diagnostic: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn describe(&self) -> String { self.program.display().to_string() }
}

/// État du compilateur, résolu une fois par build.
pub enum CompilerStatus {
    /// Compilation désactivée (`--source`) : aucun processus lancé.
    Disabled,
    /// Compilateur introuvable : avertissement unique, scripts laissés en source.
    Unavailable {
        /// Programme cherché.
        program: PathBuf,
    },
    /// Compilateur prêt.
    Available(Box<dyn ScriptCompiler>),
}

impl CompilerStatus {
    /// Libellé court (rapport de build).
    pub fn label(&self) -> &'static str {
        match self {
            CompilerStatus::Disabled => "disabled",
            CompilerStatus::Unavailable { .. } => "unavailable",
            CompilerStatus::Available(_) => "available",
        }
    }
}

impl fmt::Debug for CompilerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerStatus::Disabled => f.write_str("Disabled"),
            CompilerStatus::Unavailable { program } => {
                f.debug_struct("Unavailable").field("program", program).finish()
            }
            CompilerStatus::Available(c) => f.debug_tuple("Available").field(&c.describe()).finish(),
        }
    }
}

/// Résout le compilateur : désactivé, introuvable ou prêt.
///
/// Un nom contenant un séparateur (ou absolu) est vérifié tel quel, sinon il
/// est cherché dans `PATH`.
pub fn resolve_compiler(compile_scripts: bool, program: &str) -> CompilerStatus {
    if !compile_scripts {
        return CompilerStatus::Disabled;
    }
    match find_executable(program) {
        Some(path) => {
            tracing::debug!(compiler = %path.display(), "compilateur résolu");
            CompilerStatus::Available(Box::new(ProcessCompiler::new(path)))
        }
        None => CompilerStatus::Unavailable { program: PathBuf::from(program.trim()) },
    }
}

fn find_executable(program: &str) -> Option<PathBuf> {
    let trimmed = program.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = Path::new(trimmed);
    if candidate.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(trimmed)).find(|p| is_executable_file(p))
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/* ───────────────────────────── Transpileur ───────────────────────────── */

/// Sort d'une entrée compilable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpiled {
    /// Contenu remplacé par le bytecode.
    Compiled,
    /// Contenu laissé tel quel.
    Unchanged,
}

/// Applique le compilateur aux entrées d'un build.
#[derive(Debug)]
pub struct Transpiler {
    status: CompilerStatus,
    warned: bool,
}

impl Transpiler {
    /// Transpileur d'un build.
    pub fn new(status: CompilerStatus) -> Self { Self { status, warned: false } }

    /// État du compilateur.
    pub fn status(&self) -> &CompilerStatus { &self.status }

    /// Vrai si l'avertissement « compilateur introuvable » a été émis.
    pub fn warned(&self) -> bool { self.warned }

    /// Compile l'entrée en place (remplace sa charge par la sortie du compilateur).
    pub fn transpile(&mut self, entry: &mut ManifestEntry, kind: ScriptKind) -> Result<Transpiled> {
        let compiler = match &self.status {
            CompilerStatus::Disabled => return Ok(Transpiled::Unchanged),
            CompilerStatus::Unavailable { program } => {
                if !std::mem::replace(&mut self.warned, true) {
                    tracing::warn!(
                        "{} not found, scripts are deployed as source (use --source to silence this)",
                        program.display()
                    );
                }
                return Ok(Transpiled::Unchanged);
            }
            CompilerStatus::Available(c) => c,
        };

        let raw = entry
            .payload
            .load()
            .map_err(|source| DeployError::EntryRead { name: entry.name.clone(), source })?;
        let wrapped = wrap(kind, &String::from_utf8_lossy(&raw));
        drop(raw);

        tracing::debug!(entry = %entry.name, ?kind, "compilation");
        let bytecode = compiler.compile(&entry.name, &wrapped)?;
        entry.replace_content(bytecode);
        Ok(Transpiled::Compiled)
    }
}
