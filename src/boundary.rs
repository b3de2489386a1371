//! Loading the input assembly and writing the publicized copy.

use std::{
    fs,
    path::{Path, PathBuf},
};

use dotscope::{CilAssembly, CilAssemblyView};

use crate::{Error, Result};

/// Suffix appended to the input file stem when the output names a directory.
pub const OUTPUT_SUFFIX: &str = "_publicized";

/// Output used when none is given on the command line.
pub const DEFAULT_OUTPUT_DIR: &str = "publicized_assemblies/";

/// Reads and parses the assembly at `path`.
///
/// # Errors
///
/// - [`Error::InputNotFound`] if the file cannot be read
/// - [`Error::InvalidAssembly`] if the bytes are not a .NET assembly
pub fn load(path: &Path) -> Result<CilAssembly> {
    let data = fs::read(path).map_err(|source| Error::InputNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("loaded {} ({} bytes)", path.display(), data.len());

    let view = CilAssemblyView::from_mem(data).map_err(|source| Error::InvalidAssembly {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(CilAssembly::new(view))
}

/// Regenerates `assembly` and writes it to `path`, creating missing parent directories.
///
/// # Errors
///
/// - [`Error::SerializeFailed`] if the PE image cannot be generated
/// - [`Error::OutputUnwritable`] if the directory or file cannot be written
pub fn save(assembly: &mut CilAssembly, path: &Path) -> Result<()> {
    let bytes = assembly.to_memory().map_err(|source| Error::SerializeFailed {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes(path, &bytes)?;
    log::info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Writes `bytes` to `path`, creating missing parent directories first.
///
/// # Errors
///
/// Returns [`Error::OutputUnwritable`] on any I/O failure.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let unwritable = |source| Error::OutputUnwritable {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(unwritable)?;
    }
    fs::write(path, bytes).map_err(unwritable)
}

/// Decides where the publicized copy of `input` goes.
///
/// An `output` without a file name (empty, or ending in a path separator) is a directory and
/// receives `<stem>_publicized.<ext>`. Anything else is used as the file path verbatim.
#[must_use]
pub fn resolve_output_path(input: &Path, output: &str) -> PathBuf {
    if !names_directory(output) {
        return PathBuf::from(output);
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match input.extension().filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{stem}{OUTPUT_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{OUTPUT_SUFFIX}"),
    };

    Path::new(output).join(file_name)
}

fn names_directory(output: &str) -> bool {
    output.is_empty() || output.ends_with(std::path::is_separator)
}
