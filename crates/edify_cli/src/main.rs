mod ui;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edify_core::profile::PRESET_NAMES;
use edify_core::{stage_setup_files, write_package, DeviceProfile, EdifyGenerator, Script};
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "edifygen", version, about = "Generate edify updater-scripts and OTA packages", long_about = None)]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an updater-script to a file or stdout
    Generate {
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        script: ScriptArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build an OTA zip with the script, update-binary and setup files
    Package {
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        script: ScriptArgs,
        /// Directory holding the files the setup steps extract
        #[arg(long)]
        input_dir: PathBuf,
        /// Defaults to OTA/bin/updater inside the input directory
        #[arg(long)]
        update_binary: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show the setup steps a profile appends after the device assertion
    Steps {
        #[command(flatten)]
        profile: ProfileArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ProfileArgs {
    /// Built-in device profile
    #[arg(long, default_value = "samsung-bml", value_parser = clap::builder::PossibleValuesParser::new(PRESET_NAMES.iter().copied()))]
    preset: String,
    /// TOML device profile; takes precedence over --preset
    #[arg(long)]
    profile: Option<PathBuf>,
}

impl ProfileArgs {
    fn load(&self) -> Result<DeviceProfile> {
        match &self.profile {
            Some(path) => DeviceProfile::load(path)
                .with_context(|| format!("failed to load profile {}", path.display())),
            None => Ok(DeviceProfile::preset(&self.preset)?),
        }
    }
}

#[derive(clap::Args, Debug)]
struct ScriptArgs {
    /// Device name checked against ro.product.device / ro.build.product
    #[arg(short, long)]
    device: String,
    /// Accepted build fingerprints (repeatable)
    #[arg(long)]
    fingerprint: Vec<String>,
    /// Refuse to install over builds newer than this ro.build.date.utc
    #[arg(long)]
    older_than: Option<u64>,
    /// Run backuptool with this command after the assertions
    #[arg(long)]
    backup: Option<String>,
}

fn build_script(generator: &EdifyGenerator, args: &ScriptArgs) -> Result<Script> {
    let mut script = Script::new();
    if let Some(ts) = args.older_than {
        generator.assert_older_build(&mut script, ts);
    }
    generator.assert_device(&mut script, &args.device);
    if !args.fingerprint.is_empty() {
        generator.assert_some_fingerprint(&mut script, args.fingerprint.as_slice())?;
    }
    if let Some(command) = &args.backup {
        generator.run_backup(&mut script, command);
    }
    Ok(script)
}

fn init_logging(verbose: bool) {
    let default = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Generate { profile, script, output } => {
            let profile = profile.load()?;
            ui::step(&format!("Generating updater-script for {} ({})", script.device, profile.name));
            let generator = profile.generator()?;
            let mut built = build_script(&generator, &script)?;
            generator.unmount_all(&mut built);

            match output {
                Some(path) => {
                    fs::write(&path, built.render())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    ui::ok(&format!("{} entries written to {}", built.len(), path.display()));
                }
                None => print!("{}", built.render()),
            }
        }
        Command::Package { profile, script, input_dir, update_binary, output } => {
            let profile = profile.load()?;
            let generator = profile.generator()?;

            let update_binary = match update_binary {
                Some(path) => path,
                None => utils::path_resolver::resolve_update_binary(&input_dir).with_context(|| {
                    format!("no updater binary under {}, pass --update-binary", input_dir.display())
                })?,
            };
            let binary = fs::read(&update_binary)
                .with_context(|| format!("failed to read {}", update_binary.display()))?;

            ui::step(&format!("Staging setup files from {}", input_dir.display()));
            let files = stage_setup_files(generator.extra_setup(), &input_dir)?;
            if files.is_empty() {
                ui::warn("profile has no setup steps, packaging script and binary only");
            }

            let mut built = build_script(&generator, &script)?;
            let out = File::create(&output)
                .with_context(|| format!("failed to create {}", output.display()))?;
            write_package(&generator, &mut built, &binary, &files, out)?;
            ui::ok(&format!("OTA package written to {}", output.display()));
        }
        Command::Steps { profile } => {
            let profile = profile.load()?;
            println!("{}", profile.name);
            if let Some(desc) = &profile.description {
                println!("  {}", desc);
            }
            print!("{}", ui::format_steps(&profile.setup));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::err(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
