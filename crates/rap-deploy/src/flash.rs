//! Flash de la carte via un utilitaire externe (`lm4flash` par défaut).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{DeployError, Result};

/// Mécanisme de flash : `flash(binaire, adresse)`.
pub trait Flasher {
    /// Écrit `binary` en flash à `address`. Aucune reprise.
    fn flash(&self, binary: &Path, address: u32) -> Result<()>;
}

/// Pilote de l'utilitaire `lm4flash` : `lm4flash -S <adresse> <binaire>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lm4Flash {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Lm4Flash {
    /// Pilote pour l'exécutable donné, sans délai max.
    pub fn new(program: impl Into<PathBuf>) -> Self { Self { program: program.into(), timeout: None } }

    /// Délai max d'une opération de flash.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exécutable utilisé.
    pub fn program(&self) -> &Path { &self.program }
}

impl Flasher for Lm4Flash {
    fn flash(&self, binary: &Path, address: u32) -> Result<()> {
        tracing::info!(program = %self.program.display(), binary = %binary.display(), address = format_args!("{address:#x}"), "flash");
        let mut child = Command::new(&self.program)
            .arg("-S")
            .arg(format!("{address:#x}"))
            .arg(binary)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::Flash(format!("unable to start {}: {e}", self.program.display())))?;

        let reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let status = match self.timeout {
            Some(limit) => match child.wait_timeout(limit) {
                Ok(Some(status)) => status,
                Ok(None) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(DeployError::Flash(format!(
                        "{} timed out after {} s",
                        self.program.display(),
                        limit.as_secs_f64()
                    )));
                }
                Err(e) => return Err(DeployError::Flash(format!("waiting for {}: {e}", self.program.display()))),
            },
            None => child
                .wait()
                .map_err(|e| DeployError::Flash(format!("waiting for {}: {e}", self.program.display())))?,
        };
        let stderr = reader.and_then(|h| h.join().ok()).unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(DeployError::Flash(format!(
                "{} exited with {code}: {}",
                self.program.display(),
                stderr.trim()
            )))
        }
    }
}

/// Remplace le firmware de la carte : le fichier est flashé à l'adresse 0.
pub fn upgrade_firmware(flasher: &dyn Flasher, firmware: &Path) -> Result<()> {
    if !firmware.is_file() {
        return Err(DeployError::FirmwareMissing { path: firmware.to_path_buf() });
    }
    flasher.flash(firmware, 0)
}
