//! Idempotent block insertion into text files

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::fcntl::OFlag;
use nix::unistd::{Gid, Uid, fchown};
use tracing::debug;

use super::ConfigEditor;
use crate::context::TargetUser;

/// Edits files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConfigEditor;

impl FileConfigEditor {
    pub fn new() -> Self {
        Self
    }
}

/// Files handed to a user are never reached through a symlink
fn options(owner: Option<&TargetUser>) -> OpenOptions {
    let mut options = OpenOptions::new();
    if owner.is_some() {
        options.custom_flags(OFlag::O_NOFOLLOW.bits());
    }
    options
}

fn give_to(file: &File, owner: Option<&TargetUser>) -> std::io::Result<()> {
    if let Some(user) = owner {
        fchown(
            file.as_raw_fd(),
            Some(Uid::from_raw(user.uid)),
            Some(Gid::from_raw(user.gid)),
        )
        .map_err(std::io::Error::from)?;
    }
    Ok(())
}

/// Create every missing ancestor of `dir`, handing each new one to `owner`
fn create_dirs(dir: &Path, owner: Option<&TargetUser>) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        create_dirs(parent, owner)?;
    }
    match fs::create_dir(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "created directory");
            let created = options(owner)
                .read(true)
                .custom_flags(OFlag::O_NOFOLLOW.bits() | OFlag::O_DIRECTORY.bits())
                .open(dir)?;
            give_to(&created, owner)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

fn read_existing(path: &Path, owner: Option<&TargetUser>) -> std::io::Result<Option<String>> {
    match options(owner).read(true).open(path) {
        Ok(mut file) => {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl ConfigEditor for FileConfigEditor {
    fn is_block_present(&self, path: &Path, marker: &str) -> std::io::Result<bool> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(content.contains(marker)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn ensure_block_present(
        &self,
        path: &Path,
        marker: &str,
        block: &str,
        owner: Option<&TargetUser>,
    ) -> std::io::Result<bool> {
        let existing = read_existing(path, owner)?;

        if existing.as_deref().is_some_and(|c| c.contains(marker)) {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            create_dirs(parent, owner)?;
        }

        let mut text = String::new();
        if existing.as_deref().is_some_and(|c| !c.is_empty() && !c.ends_with('\n')) {
            text.push('\n');
        }
        text.push_str(block);
        if !block.ends_with('\n') {
            text.push('\n');
        }

        let mut file = options(owner).create(true).append(true).open(path)?;
        if existing.is_none() {
            give_to(&file, owner)?;
        }
        file.write_all(text.as_bytes())?;
        debug!(path = %path.display(), "appended configuration block");
        Ok(true)
    }
}
