//! Identify files in legacy binary formats, and pull out what's inside them.
//!
//! Everything is built on [`ByteSource`], a random-access byte container that
//! never fails to read. Formats are handled by modules (see [`module`]) kept in
//! a [`Registry`]. A [`Dispatcher`] opens an input, picks a module (by name or
//! by [`detect`]ing it), runs it, and cleans up. Per-run state such as options,
//! counters, and the message channel lives in a [`Session`].
//!
//! ```rust,no_run
//! use fmtsift::{run::Request, Dispatcher, Registry, Session};
//!
//! fn example() -> Option<()> {
//!     let registry = Registry::builtin();
//!     let mut session = Session::default();
//!     let report = Dispatcher::new(&registry).run(&mut session, &Request::file("input.bin"));
//!     println!("{} file(s) extracted", report.files_extracted);
//!     report.run_ok.then_some(())
//! }
//! ```

#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(
    unknown_lints,
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names
)]

mod archive;
mod cc;
mod containers;
mod crc;
pub mod dbuf;
mod derive;
mod guess;
pub mod io;
pub mod module;
pub mod modules;
mod naming;
pub mod registry;
pub mod run;
pub mod session;
pub mod strings;

pub use crate::{
    cc::FourCC,
    crc::{crc16_arc, crc16_ccitt},
    dbuf::ByteSource,
    guess::detect,
    module::{ModuleFlags, ModuleInfo, ModuleParams},
    naming::sanitize_filename,
    registry::Registry,
    run::{Dispatcher, Report},
    session::{Options, OptionsBuilder, Session},
};

use core::num::TryFromIntError;
use std::path::PathBuf;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("format detection failed")]
    DetectionFailed,

    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {}", .0.display())]
    NotARegularFile(PathBuf),

    #[error("this source can not be written to at arbitrary positions")]
    NotSeekable,

    #[error("this source can not be written to")]
    NotWritable,

    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("output file is a symlink: {}", .0.display())]
    OutputIsSymlink(PathBuf),

    #[error("invalid module registration: {0}")]
    Registry(String),

    #[error("module {0} is security-sensitive and must be requested explicitly")]
    SecurityConfirmationRequired(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("unknown or unsupported file format")]
    UnsupportedFormat { empty: bool },
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
