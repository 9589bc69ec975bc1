//! Provision command implementation.

use clap::Args;
use std::path::{Path, PathBuf};
use vmc::provision::{self, Outcome, Reconciler};
use vmc::Context;

/// Default provisioning file name.
const DEFAULT_FILE: &str = "vm.conf";

/// Create, fix up and start every VM listed in a provisioning file.
#[derive(Args, Debug)]
pub struct ProvCmd {
    /// Provisioning file.
    #[arg(default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    /// Write a skeleton provisioning file instead.
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file without asking (with --init).
    #[arg(short, long)]
    pub force: bool,
}

impl ProvCmd {
    /// Execute the provision command.
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        if self.init {
            return self.write_skeleton();
        }
        refuse_home_dir()?;

        let specs = provision::load_specs(&self.file)?;
        let mut manager = ctx.manager()?;
        let reports = Reconciler::new(&mut manager, ctx.images()).reconcile(&specs)?;

        let mut failed = 0;
        for report in &reports {
            println!("{:<24} {}", report.name, report.outcome);
            for step in &report.bootstrap {
                if let Some(error) = &step.error {
                    println!("  {} failed: {}", step.action, error);
                }
            }
            if matches!(report.outcome, Outcome::Failed(_)) {
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(vmc::Error::provision(format!(
                "{} of {} vms failed",
                failed,
                reports.len()
            )));
        }
        Ok(())
    }

    fn write_skeleton(&self) -> vmc::Result<()> {
        if self.file.exists()
            && !self.force
            && !super::confirm(&format!("'{}' exists. Overwrite?", self.file.display()))
        {
            println!("Cancelled");
            return Ok(());
        }

        std::fs::write(&self.file, provision::skeleton())?;
        set_mode(&self.file)?;
        println!("Wrote {}", self.file.display());
        Ok(())
    }
}

/// Provisioning files are per project; never run from the home directory.
fn refuse_home_dir() -> vmc::Result<()> {
    check_not_home(&std::env::current_dir()?, dirs::home_dir().as_deref())
}

fn check_not_home(cwd: &Path, home: Option<&Path>) -> vmc::Result<()> {
    if home == Some(cwd) {
        return Err(vmc::Error::provision(
            "refusing to provision from the home directory; cd into a project directory",
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path) -> vmc::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> vmc::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_not_home() {
        let home = Path::new("/home/dev");
        assert!(check_not_home(home, Some(home)).is_err());
        assert!(check_not_home(&home.join("project"), Some(home)).is_ok());
        assert!(check_not_home(home, None).is_ok());
    }

    #[test]
    fn test_init_writes_skeleton() {
        let dir = TempDir::new().unwrap();
        let cmd = ProvCmd {
            file: dir.path().join("vm.conf"),
            init: true,
            force: true,
        };
        cmd.write_skeleton().unwrap();
        assert_eq!(
            std::fs::read_to_string(&cmd.file).unwrap(),
            provision::skeleton()
        );
    }
}
