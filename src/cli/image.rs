//! Image subcommands.

use clap::{Args, Subcommand};
use std::path::PathBuf;
use vmc::image::ImageStore;
use vmc::Context;

/// Manage OVA images.
#[derive(Subcommand, Debug)]
pub enum ImageCmd {
    /// List stored images
    #[command(alias = "ls")]
    List(ImageListCmd),
    /// Export a powered-off VM as a new image
    Create(ImageCreateCmd),
    /// Copy an .ova file into the store
    Import(ImageImportCmd),
    /// Delete a stored image
    #[command(aliases = ["del", "rm"])]
    Delete(ImageDeleteCmd),
    /// Show how to build an image by hand
    Pack,
}

impl ImageCmd {
    pub fn run(self, ctx: &Context) -> vmc::Result<()> {
        match self {
            ImageCmd::List(cmd) => cmd.run(ctx),
            ImageCmd::Create(cmd) => cmd.run(ctx),
            ImageCmd::Import(cmd) => cmd.run(ctx),
            ImageCmd::Delete(cmd) => cmd.run(ctx),
            ImageCmd::Pack => {
                print!("{}", ImageStore::pack_instructions());
                Ok(())
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct ImageListCmd {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ImageListCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let images = ctx.images().list()?;

        if self.json {
            let out = serde_json::to_string_pretty(&images)
                .map_err(|e| vmc::Error::Parse(e.to_string()))?;
            println!("{}", out);
            return Ok(());
        }

        if images.is_empty() {
            println!("No images in {}", ctx.images().dir().display());
            return Ok(());
        }

        println!("{:<32} {:>10}  {:<20}", "NAME", "SIZE", "MODIFIED");
        for image in images {
            println!(
                "{:<32} {:>7} MB  {:<20}",
                super::truncate(&image.name, 30),
                image.size_mb,
                image.modified
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ImageCreateCmd {
    /// New image name (must end in .ova).
    pub image: String,

    /// Powered-off VM to export.
    pub vm: String,
}

impl ImageCreateCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let hv = ctx.hypervisor()?;
        println!("Exporting VM '{}' to image '{}'...", self.vm, self.image);
        let path = ctx.images().create(hv, &self.image, &self.vm)?;
        println!("Created image {}", path.display());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ImageImportCmd {
    /// Path to the .ova file.
    pub file: PathBuf,
}

impl ImageImportCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        let path = ctx.images().import(&self.file)?;
        println!("Imported image {}", path.display());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ImageDeleteCmd {
    /// Image name.
    pub image: String,

    /// Force deletion without confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl ImageDeleteCmd {
    pub fn run(&self, ctx: &Context) -> vmc::Result<()> {
        if !ctx.images().contains(&self.image) {
            return Err(vmc::Error::ImageNotFound {
                path: ctx.images().path_of(&self.image),
            });
        }
        if !self.force && !super::confirm(&format!("Delete image '{}'?", self.image)) {
            println!("Cancelled");
            return Ok(());
        }

        ctx.images().delete(&self.image)?;
        println!("Deleted image '{}'", self.image);
        Ok(())
    }
}
