use crate::error::{EdifyError, Result};
use crate::generator::EdifyGenerator;
use crate::script::Script;
use crate::setup::SetupStep;
use std::fs;
use std::io::{Seek, Write};
use std::path::{Component, Path};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const UPDATER_SCRIPT_PATH: &str = "META-INF/com/google/android/updater-script";
pub const UPDATE_BINARY_PATH: &str = "META-INF/com/google/android/update-binary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub name: String,
    pub data: Vec<u8>,
}

fn file_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
}

/// Reads every package member the setup steps extract from `dir`.
pub fn stage_setup_files(steps: &[SetupStep], dir: &Path) -> Result<Vec<PackageFile>> {
    let mut staged: Vec<PackageFile> = Vec::new();
    for member in steps.iter().filter_map(SetupStep::archive_member) {
        if staged.iter().any(|f| f.name == member) {
            continue;
        }
        let relative = Path::new(member);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(EdifyError::UnsafePackagePath(member.to_string()));
        }
        let path = dir.join(relative);
        if !path.is_file() {
            return Err(EdifyError::MissingPackageFile(path.to_string_lossy().to_string()));
        }
        staged.push(PackageFile {
            name: member.to_string(),
            data: fs::read(&path)?,
        });
    }
    Ok(staged)
}

/// Unmounts what the script left mounted, then writes the updater-script,
/// the update-binary and `files` into a new zip.
pub fn write_package<W: Write + Seek>(
    generator: &EdifyGenerator,
    script: &mut Script,
    update_binary: &[u8],
    files: &[PackageFile],
    writer: W,
) -> Result<W> {
    generator.unmount_all(script);

    let mut zip = ZipWriter::new(writer);

    zip.start_file(UPDATER_SCRIPT_PATH, file_options(0o644))?;
    zip.write_all(script.render().as_bytes())?;

    zip.start_file(UPDATE_BINARY_PATH, file_options(0o755))?;
    zip.write_all(update_binary)?;

    for file in files {
        zip.start_file(file.name.as_str(), file_options(0o644))?;
        zip.write_all(&file.data)?;
    }

    tracing::info!(
        entries = script.len(),
        files = files.len(),
        "wrote OTA package"
    );
    Ok(zip.finish()?)
}
