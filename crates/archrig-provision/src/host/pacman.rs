//! Native package database via pacman

use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use super::PackageClient;
use super::system::capture;
use crate::error::ExecError;

/// `pacman`, run as root
#[derive(Debug, Clone)]
pub struct Pacman {
    program: String,
}

impl Pacman {
    pub fn new() -> Self {
        Self {
            program: "pacman".into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), ExecError> {
        let label = format!("{} {}", self.program, args.join(" "));
        info!(command = %label, "running package manager");
        capture(Command::new(&self.program).args(args), &label)?.into_result(label)?;
        Ok(())
    }
}

impl Default for Pacman {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageClient for Pacman {
    fn is_installed(&self, name: &str) -> Result<bool, ExecError> {
        let output = capture(
            Command::new(&self.program).args(["-Q", name]),
            &format!("{} -Q {name}", self.program),
        )?;
        Ok(output.success())
    }

    fn install_batch(&self, names: &[String]) -> Result<(), ExecError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = vec!["-S", "--needed", "--noconfirm"];
        args.extend(names.iter().map(String::as_str));
        self.run(&args)
    }

    fn update_all(&self) -> Result<(), ExecError> {
        self.run(&["-Syu", "--noconfirm"])
    }

    fn install_artifacts(&self, artifacts: &[PathBuf]) -> Result<(), ExecError> {
        if artifacts.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = artifacts
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut args = vec!["-U", "--noconfirm"];
        args.extend(paths.iter().map(String::as_str));
        self.run(&args)
    }
}
