// ============================================================================
// File: os-faults/src/drivers/power/command.rs
// ----------------------------------------------------------------------------
// Local CLI invocation shared by the virsh and ipmitool clients
// ============================================================================

use std::process::Command;

use log::debug;

use crate::error::{OsFaultsError, Result};

/// Run a local tool and return its trimmed stdout
///
/// # Arguments
/// * `program` - Binary to run
/// * `args` - Arguments passed verbatim and logged
/// * `envs` - Extra environment, never logged
pub(crate) fn run_tool(program: &str, args: &[&str], envs: &[(&str, &str)]) -> Result<String> {
    let line = args.join(" ");
    debug!("Running {program} {line}");

    let output = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .output()
        .map_err(|e| OsFaultsError::power(format!("Failed to launch '{program}': {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OsFaultsError::power(format!(
            "'{program} {line}' failed: {}",
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_is_trimmed() {
        assert_eq!(run_tool("echo", &["  hello  "], &[]).expect("echo runs"), "hello");
    }

    #[test]
    fn environment_reaches_the_tool() {
        let out = run_tool("sh", &["-c", "echo $OS_FAULTS_PROBE"], &[("OS_FAULTS_PROBE", "x1")])
            .expect("sh runs");
        assert_eq!(out, "x1");
    }

    #[test]
    fn missing_binary_is_a_power_error() {
        let err = run_tool("os-faults-no-such-tool", &[], &[]).unwrap_err();
        assert!(matches!(err, OsFaultsError::PowerManagement { .. }));
    }

    #[test]
    fn non_zero_exit_is_a_power_error() {
        assert!(run_tool("false", &[], &[]).is_err());
    }
}
