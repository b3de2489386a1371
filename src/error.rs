use std::path::PathBuf;

use thiserror::Error;

/// Process exit status for a missing or unreadable input file.
pub const EXIT_INPUT_NOT_FOUND: u8 = 30;
/// Process exit status for an input file that is not a loadable assembly.
pub const EXIT_INVALID_ASSEMBLY: u8 = 40;
/// Process exit status for an output file that cannot be produced.
pub const EXIT_OUTPUT_UNWRITABLE: u8 = 50;
/// Process exit status for a metadata editing failure between load and save.
pub const EXIT_METADATA: u8 = 1;

/// The generic Error type, which provides coverage for all errors this crate can return.
///
/// Every variant is fatal for a publicize run: the process prints the message together with
/// the underlying diagnostic and terminates with [`Error::exit_code`]. Nothing is retried.
///
/// # Error Categories
///
/// ## Load Errors
/// - [`Error::InputNotFound`] - The input path is missing or cannot be read
/// - [`Error::InvalidAssembly`] - The input was read but is not a well-formed .NET assembly
///
/// ## Editing Errors
/// - [`Error::Metadata`] - The metadata layer rejected a read or an edit
///
/// ## Save Errors
/// - [`Error::SerializeFailed`] - The modified assembly could not be regenerated
/// - [`Error::OutputUnwritable`] - The output directory or file could not be written
///
/// # Examples
///
/// ```rust,no_run
/// use assembly_publicizer::{boundary, Error};
/// use std::path::Path;
///
/// match boundary::load(Path::new("Assembly-CSharp.dll")) {
///     Ok(_) => println!("loaded"),
///     Err(Error::InputNotFound { path, .. }) => eprintln!("missing: {}", path.display()),
///     Err(e) => eprintln!("{e} (exit {})", e.exit_code()),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input file does not exist or cannot be read.
    #[error("File doesn't exist or you don't have sufficient permissions: {}", path.display())]
    InputNotFound {
        /// The path that was requested
        path: PathBuf,
        /// The I/O error reported while reading it
        #[source]
        source: std::io::Error,
    },

    /// The input file was read but could not be parsed as a .NET assembly.
    #[error("Cannot read the assembly {}", path.display())]
    InvalidAssembly {
        /// The path that was parsed
        path: PathBuf,
        /// The parser diagnostic
        #[source]
        source: dotscope::Error,
    },

    /// A metadata read or edit failed after the assembly was loaded.
    ///
    /// Covers missing metadata tables, unresolvable heap entries and builder rejections
    /// while injecting the marker type or rewriting flags.
    #[error("Metadata edit failed: {0}")]
    Metadata(#[from] dotscope::Error),

    /// The modified assembly could not be turned back into a PE image.
    #[error("Cannot create the new assembly {}", path.display())]
    SerializeFailed {
        /// The requested output path
        path: PathBuf,
        /// The generator diagnostic
        #[source]
        source: dotscope::Error,
    },

    /// The output directory or file could not be created or overwritten.
    #[error(
        "Cannot create/overwrite the new assembly {}. Please check the path and its permissions \
         and in case of overwriting an existing file ensure that it isn't currently used",
        path.display()
    )]
    OutputUnwritable {
        /// The requested output path
        path: PathBuf,
        /// The I/O error reported while writing it
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the stable process exit status for this failure class.
    ///
    /// | Status | Variants                                          |
    /// |--------|---------------------------------------------------|
    /// | 30     | [`Error::InputNotFound`]                          |
    /// | 40     | [`Error::InvalidAssembly`]                        |
    /// | 50     | [`Error::SerializeFailed`], [`Error::OutputUnwritable`] |
    /// | 1      | [`Error::Metadata`]                               |
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InputNotFound { .. } => EXIT_INPUT_NOT_FOUND,
            Error::InvalidAssembly { .. } => EXIT_INVALID_ASSEMBLY,
            Error::SerializeFailed { .. } | Error::OutputUnwritable { .. } => {
                EXIT_OUTPUT_UNWRITABLE
            }
            Error::Metadata(_) => EXIT_METADATA,
        }
    }
}
