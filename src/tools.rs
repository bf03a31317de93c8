use std::{
    ffi::OsString,
    process::{Command, Stdio},
};

use crate::error::{AtlasError, AtlasResult};

/// Seam over external process invocation.
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args` to completion; a non-zero exit is an error.
    fn run(&self, program: &str, args: &[OsString]) -> AtlasResult<()>;
}

/// Runs tools as child processes found on `PATH`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn run(&self, program: &str, args: &[OsString]) -> AtlasResult<()> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                AtlasError::external_tool(
                    program,
                    format!("failed to spawn (is it installed and on PATH?): {e}"),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AtlasError::external_tool(
                program,
                format!("exited with status {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

/// Whether `program` can be spawned at all. Exit status is ignored since the
/// raster tools disagree on how they report `--version`.
pub fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Owned argument list builder for tool invocations.
pub(crate) fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    items.into_iter().map(Into::into).collect()
}
