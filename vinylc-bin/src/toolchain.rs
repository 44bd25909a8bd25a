use std::{path::Path, process::Command};

use anyhow::{bail, Context, Result};
use tracing::info;

/// The external GNU assembler and linker.
pub struct Toolchain {
    prefix: String,
    gcc_version: String,
}

impl Toolchain {
    pub fn new(prefix: impl Into<String>, gcc_version: impl Into<String>) -> Toolchain {
        Toolchain {
            prefix: prefix.into(),
            gcc_version: gcc_version.into(),
        }
    }

    pub fn assemble(&self, asm: &Path, object: &Path) -> Result<()> {
        run(self.assemble_command(asm, object))
    }

    /// Links a freestanding, static executable.
    pub fn link(&self, object: &Path, exe: &Path) -> Result<()> {
        run(self.link_command(object, exe))
    }

    fn assemble_command(&self, asm: &Path, object: &Path) -> Command {
        let mut command = Command::new(format!("{}as", self.prefix));
        command.arg(asm).arg("-o").arg(object);
        command
    }

    fn link_command(&self, object: &Path, exe: &Path) -> Command {
        let mut command = Command::new(format!("{}gcc-{}", self.prefix, self.gcc_version));
        command
            .arg(object)
            .arg("-o")
            .arg(exe)
            .args(["-nostdlib", "-static"]);
        command
    }
}

fn run(mut command: Command) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    info!(?command, "running toolchain");
    let output = command
        .output()
        .with_context(|| format!("failed to run `{program}`"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("`{program}` failed ({}):\n{stderr}", output.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_assemble_command() {
        let toolchain = Toolchain::new("aarch64-linux-gnu-", "11");
        let command = toolchain.assemble_command(Path::new("vinyl.asm"), Path::new("vinyl.o"));
        assert_eq!(command.get_program(), "aarch64-linux-gnu-as");
        assert_eq!(args(&command), ["vinyl.asm", "-o", "vinyl.o"]);
    }

    #[test]
    fn test_link_command() {
        let toolchain = Toolchain::new("aarch64-linux-gnu-", "11");
        let command = toolchain.link_command(Path::new("vinyl.o"), Path::new("vinyl.exe"));
        assert_eq!(command.get_program(), "aarch64-linux-gnu-gcc-11");
        assert_eq!(
            args(&command),
            ["vinyl.o", "-o", "vinyl.exe", "-nostdlib", "-static"]
        );
    }

    #[test]
    fn test_missing_tool_is_reported() {
        let toolchain = Toolchain::new("vinyl-test-missing-", "0");
        let error = toolchain
            .assemble(Path::new("in.asm"), Path::new("out.o"))
            .unwrap_err();
        assert_eq!(error.to_string(), "failed to run `vinyl-test-missing-as`");
    }
}
