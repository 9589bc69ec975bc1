//! OVA image store.
//!
//! Images are plain `.ova` files kept in one directory. Importing copies a
//! file in; creating exports a powered-off machine into the store.

use crate::error::{Error, Result};
use crate::hypervisor::Hypervisor;
use crate::vm::MachineState;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Offset of the tar header magic.
const TAR_MAGIC_OFFSET: usize = 257;

/// Tar header magic (POSIX and GNU both start with it).
const TAR_MAGIC: &[u8] = b"ustar";

/// How to build a minimal guest image by hand.
const PACK_INSTRUCTIONS: &str = "\
To build a new image:
  1. Create a VM in the VirtualBox GUI and install a minimal Linux on it.
  2. Inside the guest:
     - create the user 'vmuser' with passwordless sudo
     - add the contents of ~/.vmc/id_vmc.pub to ~vmuser/.ssh/authorized_keys
     - install the VirtualBox guest additions
     - install a boot script that reads the /vm/ip, /vm/netmask,
       /vm/broadcast and /vm/nettype guest properties and configures
       the second network interface from them
     - enable sshd
  3. Power the VM off.
  4. Run: vmc image create <name>.ova <vm>
";

/// One image in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// File name, including `.ova`.
    pub name: String,
    /// Size in MB.
    pub size_mb: u64,
    /// Last modification, RFC 3339.
    pub modified: String,
}

/// Directory of OVA images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Open the store at `dir` (created lazily).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an image named `name` would have.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Whether an image named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    /// List images, sorted by name.
    pub fn list(&self) -> Result<Vec<ImageEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut images = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !has_ova_extension(Path::new(&name)) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            images.push(ImageEntry {
                name,
                size_mb: meta.len() / (1024 * 1024),
                modified: humantime::format_rfc3339_seconds(modified).to_string(),
            });
        }
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    /// Resolve an image reference.
    ///
    /// An existing `.ova` file path wins; otherwise `reference` names an
    /// image in the store.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let direct = Path::new(reference);
        if direct.is_file() && has_ova_extension(direct) {
            return Ok(direct.to_path_buf());
        }

        let stored = self.path_of(reference);
        if stored.is_file() {
            return Ok(stored);
        }

        Err(Error::ImageNotFound { path: stored })
    }

    /// Copy an OVA file into the store. Returns the stored path.
    pub fn import(&self, src: &Path) -> Result<PathBuf> {
        if !src.is_file() {
            return Err(Error::ImageNotFound {
                path: src.to_path_buf(),
            });
        }
        if !has_ova_extension(src) {
            return Err(Error::image(format!(
                "'{}' is not an .ova file",
                src.display()
            )));
        }
        if !is_tar_archive(src)? {
            return Err(Error::image(format!(
                "'{}' is not an OVA archive",
                src.display()
            )));
        }

        let name = src
            .file_name()
            .ok_or_else(|| Error::image(format!("'{}' has no file name", src.display())))?;
        let dest = self.dir.join(name);
        if dest.exists() {
            return Err(Error::image(format!(
                "image '{}' already exists",
                name.to_string_lossy()
            )));
        }

        fs::create_dir_all(&self.dir)?;
        tracing::info!(src = %src.display(), dest = %dest.display(), "importing image");
        fs::copy(src, &dest)?;
        Ok(dest)
    }

    /// Delete an image from the store.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        if !path.is_file() {
            return Err(Error::ImageNotFound { path });
        }
        tracing::info!(image = %name, "deleting image");
        fs::remove_file(&path)?;
        Ok(())
    }

    /// Export the powered-off machine `vm` as image `name`.
    pub fn create(&self, hv: &dyn Hypervisor, name: &str, vm: &str) -> Result<PathBuf> {
        if !has_ova_extension(Path::new(name)) {
            return Err(Error::image(format!("image name '{}' must end in .ova", name)));
        }
        let dest = self.path_of(name);
        if dest.exists() {
            return Err(Error::image(format!("image '{}' already exists", name)));
        }

        let state = hv.machine_state(vm)?;
        if state != MachineState::PoweredOff {
            return Err(Error::invalid_state(vm, "powered off", state.name()));
        }

        fs::create_dir_all(&self.dir)?;
        hv.export_appliance(vm, &dest)?;
        Ok(dest)
    }

    /// Instructions for preparing a guest image by hand.
    pub fn pack_instructions() -> &'static str {
        PACK_INSTRUCTIONS
    }
}

fn has_ova_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("ova"))
        .unwrap_or(false)
}

fn is_tar_archive(path: &Path) -> Result<bool> {
    let mut header = [0u8; TAR_MAGIC_OFFSET + 5];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header[TAR_MAGIC_OFFSET..] == TAR_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
