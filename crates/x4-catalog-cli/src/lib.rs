//! Command line front end for the `x4-catalog` resolver.
//!
//! Options can come from the command line, from `X4_CATALOG_*` environment
//! variables, or from a JSON settings file passed with `--config`. Explicit
//! options override the file.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use x4_catalog::{CatalogConfig, CatalogResolver, LayerSource};

/// Command line options.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "x4-catalog",
    about = "Inspect and extract files from an X4 installation",
    version
)]
pub struct Cli {
    /// Installation root
    #[arg(long, env = "X4_CATALOG_ROOT")]
    pub root: Option<PathBuf>,

    /// Ignore everything under extensions/
    #[arg(long)]
    pub no_extensions: bool,

    /// JSON settings file
    #[arg(long, env = "X4_CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do with the installation.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the installation build number
    Version,
    /// List layers, highest priority first
    Layers,
    /// Write a file to stdout
    Cat {
        /// Logical path
        path: String,
    },
    /// Copy a file out of the catalog
    Extract {
        /// Logical path
        path: String,
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Resolve an index key and print its target
    Index {
        /// Index document, e.g. index/macros.xml
        index: String,
        /// Key to look up
        key: String,
    },
    /// List visible files
    Ls {
        /// Only list files below this directory
        prefix: Option<String>,
    },
    /// Check catalog entries against their recorded checksums
    Verify,
}

impl Cli {
    /// Build the resolver settings from the file, environment and flags.
    pub fn catalog_config(&self) -> Result<CatalogConfig> {
        let mut config = match &self.config {
            Some(path) => CatalogConfig::from_json_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => match &self.root {
                Some(root) => CatalogConfig::new(root),
                None => bail!("no installation given, pass --root or set X4_CATALOG_ROOT"),
            },
        };

        if let Some(root) = &self.root {
            config = config.with_root(root);
        }
        if self.no_extensions {
            config = config.with_extensions(false);
        }
        Ok(config)
    }
}

/// Run `cli`, writing results to `out`.
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let config = cli.catalog_config()?;
    tracing::debug!("Opening installation {}", config.root.display());
    let catalog = CatalogResolver::with_config(config)?;

    match &cli.command {
        Command::Version => writeln!(out, "{}", catalog.version()?)?,
        Command::Layers => {
            for layer in catalog.layers() {
                let location = match layer.source() {
                    LayerSource::Archive(archive) => archive.listing_path().display().to_string(),
                    LayerSource::Loose(root) => root.path().display().to_string(),
                };
                writeln!(out, "{:<32} {location}", layer.kind().to_string())?;
            }
        }
        Command::Cat { path } => {
            let mut stream = catalog.open_file(path)?;
            std::io::copy(&mut stream, out)?;
        }
        Command::Extract { path, output } => {
            let mut stream = catalog.open_file(path)?;
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(output)
                .with_context(|| format!("creating {}", output.display()))?;
            let written = std::io::copy(&mut stream, &mut file)?;
            tracing::info!("Extracted {path} ({written} bytes) from {}", stream.layer());
        }
        Command::Index { index, key } => {
            let entry = catalog
                .index_entry(index, key)?
                .with_context(|| format!("key '{key}' not found in index {index}"))?;
            let served_by = catalog.locate(entry.target.as_str())?;
            match served_by {
                Some(layer) => writeln!(out, "{} ({layer})", entry.target)?,
                None => writeln!(out, "{} (missing)", entry.target)?,
            }
        }
        Command::Ls { prefix } => {
            for path in catalog.list_files(prefix.as_deref())? {
                writeln!(out, "{path}")?;
            }
        }
        Command::Verify => {
            let mut failures = 0usize;
            for layer in catalog.layers() {
                let LayerSource::Archive(archive) = layer.source() else {
                    continue;
                };
                let bad = archive.verify_all();
                for path in &bad {
                    writeln!(out, "{}: checksum mismatch for {path}", layer.kind())?;
                }
                failures += bad.len();
            }
            if failures > 0 {
                bail!("{failures} catalog entries failed verification");
            }
            writeln!(out, "all catalog entries verified")?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn run_with(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("x4-catalog").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn install() -> tempfile::TempDir {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("01.cat"),
            "libraries/wares.xml 8 0 d41d8cd98f00b204e9800998ecf8427e\n",
        )
        .expect("write listing");
        std::fs::write(dir.path().join("01.dat"), "<wares/>").expect("write blob");
        std::fs::write(dir.path().join("version.dat"), "330").expect("write version");
        dir
    }

    #[test]
    fn test_version_and_cat() {
        let dir = install();
        let root = dir.path().to_str().expect("utf-8 path");

        assert_eq!(run_with(&["--root", root, "version"]).expect("version"), "330\n");
        assert_eq!(
            run_with(&["--root", root, "cat", "Libraries\\Wares.xml"]).expect("cat"),
            "<wares/>"
        );
        assert_eq!(
            run_with(&["--root", root, "ls"]).expect("ls"),
            "libraries/wares.xml\nversion.dat\n"
        );
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let dir = install();
        let root = dir.path().to_str().expect("utf-8 path");

        let err = run_with(&["--root", root, "verify"]).expect_err("bad checksum");
        assert!(err.to_string().contains("1 catalog entries"));
    }

    #[test]
    fn test_root_is_required() {
        let cli = Cli {
            root: None,
            no_extensions: false,
            config: None,
            command: Command::Version,
        };
        let err = cli.catalog_config().expect_err("no root");
        assert!(err.to_string().contains("--root"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = install();
        let settings = dir.path().join("settings.json");
        std::fs::write(
            &settings,
            format!(r#"{{"root": {:?}, "load_extensions": true}}"#, dir.path()),
        )
        .expect("write settings");

        let cli = Cli::try_parse_from([
            "x4-catalog",
            "--config",
            settings.to_str().expect("utf-8 path"),
            "--no-extensions",
            "layers",
        ])
        .expect("parse");
        let config = cli.catalog_config().expect("config");
        assert_eq!(config.root, dir.path());
        assert!(!config.load_extensions);
    }
}
