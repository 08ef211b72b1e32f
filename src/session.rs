//! Per-run state: options, message routing, counters, and the output-file
//! policy that every module goes through when it writes something out.

use crate::{
    archive::ZipWriter,
    dbuf::{open_for_write, ByteSource, FileInfo, Kind, Managed, ModeHint, OutputFile},
    naming::{self, sanitize_filename},
    Result,
};
use core::cell::RefCell;
use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

pub use crate::{dbuf::OverwriteMode, naming::BaseNameFlags};

/// Where extracted files go.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputStyle {
    #[default]
    Files,
    Zip,
    Stdout,
}

/// Which kinds of output files to actually write.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExtractPolicy {
    #[default]
    Both,
    MainOnly,
    AuxOnly,
}

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct CreateFlags: u32 {
        /// The file is auxiliary, e.g. a thumbnail or a metadata dump.
        const AUX = 1 << 0;
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    output_style: OutputStyle,
    extract_policy: ExtractPolicy,
    extract_level: u8,
    list_mode: bool,
    max_output_files: Option<u64>,
    first_output_file: u64,
    overwrite_mode: OverwriteMode,
    base_output_filename: Option<String>,
    archive_path: PathBuf,
    zip_to_stdout: bool,
    preserve_file_times: bool,
    input_tz_offset: i64,
    show_messages: bool,
    show_warnings: bool,
    modhelp: bool,
    module_codes: Option<String>,
    extrlist_path: Option<PathBuf>,
    extrlist_append: bool,
}

impl Options {
    #[must_use]
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::new()
    }

    #[must_use]
    pub fn output_style(&self) -> OutputStyle {
        self.output_style
    }

    #[must_use]
    pub fn extract_policy(&self) -> ExtractPolicy {
        self.extract_policy
    }

    #[must_use]
    pub fn extract_level(&self) -> u8 {
        self.extract_level
    }

    #[must_use]
    pub fn list_mode(&self) -> bool {
        self.list_mode
    }

    #[must_use]
    pub fn max_output_files(&self) -> Option<u64> {
        self.max_output_files
    }

    #[must_use]
    pub fn first_output_file(&self) -> u64 {
        self.first_output_file
    }

    #[must_use]
    pub fn overwrite_mode(&self) -> OverwriteMode {
        self.overwrite_mode
    }

    #[must_use]
    pub fn base_output_filename(&self) -> Option<&str> {
        self.base_output_filename.as_deref()
    }

    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    #[must_use]
    pub fn zip_to_stdout(&self) -> bool {
        self.zip_to_stdout
    }

    #[must_use]
    pub fn preserve_file_times(&self) -> bool {
        self.preserve_file_times
    }

    /// Seconds east of UTC that local timestamps found in files are assumed
    /// to be in.
    #[must_use]
    pub fn input_tz_offset(&self) -> i64 {
        self.input_tz_offset
    }

    #[must_use]
    pub fn show_messages(&self) -> bool {
        self.show_messages
    }

    #[must_use]
    pub fn show_warnings(&self) -> bool {
        self.show_warnings
    }

    #[must_use]
    pub fn modhelp(&self) -> bool {
        self.modhelp
    }

    #[must_use]
    pub fn module_codes(&self) -> Option<&str> {
        self.module_codes.as_deref()
    }

    #[must_use]
    pub fn extrlist_path(&self) -> Option<&Path> {
        self.extrlist_path.as_deref()
    }

    #[must_use]
    pub fn extrlist_append(&self) -> bool {
        self.extrlist_append
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_style: OutputStyle::default(),
            extract_policy: ExtractPolicy::default(),
            extract_level: 1,
            list_mode: false,
            max_output_files: None,
            first_output_file: 0,
            overwrite_mode: OverwriteMode::default(),
            base_output_filename: None,
            archive_path: PathBuf::from("output.zip"),
            zip_to_stdout: false,
            preserve_file_times: true,
            input_tz_offset: 0,
            show_messages: true,
            show_warnings: true,
            modhelp: false,
            module_codes: None,
            extrlist_path: None,
            extrlist_append: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
#[repr(transparent)]
pub struct OptionsBuilder(Options);

impl OptionsBuilder {
    #[must_use]
    pub fn build(self) -> Options {
        self.0
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output_style(mut self, output_style: OutputStyle) -> Self {
        self.0.output_style = output_style;
        self
    }

    #[must_use]
    pub fn extract_policy(mut self, extract_policy: ExtractPolicy) -> Self {
        self.0.extract_policy = extract_policy;
        self
    }

    #[must_use]
    pub fn extract_level(mut self, extract_level: u8) -> Self {
        self.0.extract_level = extract_level;
        self
    }

    #[must_use]
    pub fn list_mode(mut self, list_mode: bool) -> Self {
        self.0.list_mode = list_mode;
        self
    }

    #[must_use]
    pub fn max_output_files(mut self, max_output_files: Option<u64>) -> Self {
        self.0.max_output_files = max_output_files;
        self
    }

    #[must_use]
    pub fn first_output_file(mut self, first_output_file: u64) -> Self {
        self.0.first_output_file = first_output_file;
        self
    }

    #[must_use]
    pub fn overwrite_mode(mut self, overwrite_mode: OverwriteMode) -> Self {
        self.0.overwrite_mode = overwrite_mode;
        self
    }

    /// Sets the prefix for output file names. A name that is empty after
    /// cleanup leaves the default in place.
    #[must_use]
    pub fn base_output_filename(mut self, name: &str, flags: BaseNameFlags) -> Self {
        self.0.base_output_filename = naming::prepare_base_name(name, flags);
        self
    }

    #[must_use]
    pub fn archive_path(mut self, archive_path: impl Into<PathBuf>) -> Self {
        self.0.archive_path = archive_path.into();
        self
    }

    #[must_use]
    pub fn zip_to_stdout(mut self, zip_to_stdout: bool) -> Self {
        self.0.zip_to_stdout = zip_to_stdout;
        self
    }

    #[must_use]
    pub fn preserve_file_times(mut self, preserve_file_times: bool) -> Self {
        self.0.preserve_file_times = preserve_file_times;
        self
    }

    #[must_use]
    pub fn input_tz_offset(mut self, seconds: i64) -> Self {
        self.0.input_tz_offset = seconds;
        self
    }

    #[must_use]
    pub fn show_messages(mut self, show_messages: bool) -> Self {
        self.0.show_messages = show_messages;
        self
    }

    #[must_use]
    pub fn show_warnings(mut self, show_warnings: bool) -> Self {
        self.0.show_warnings = show_warnings;
        self
    }

    #[must_use]
    pub fn modhelp(mut self, modhelp: bool) -> Self {
        self.0.modhelp = modhelp;
        self
    }

    #[must_use]
    pub fn module_codes(mut self, module_codes: Option<String>) -> Self {
        self.0.module_codes = module_codes;
        self
    }

    #[must_use]
    pub fn extrlist_path(mut self, extrlist_path: Option<PathBuf>) -> Self {
        self.0.extrlist_path = extrlist_path;
        self
    }

    /// Adds to an existing extraction list instead of replacing it.
    #[must_use]
    pub fn extrlist_append(mut self, extrlist_append: bool) -> Self {
        self.0.extrlist_append = extrlist_append;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    Message,
    Warning,
    Error,
}

/// Receives everything a session has to say to the user.
pub trait MessageHandler {
    fn message(&mut self, kind: MessageKind, text: &str);
}

/// Messages go to stdout, unless stdout is taken by output files. Warnings
/// and errors go to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdHandler {
    pub messages_to_stderr: bool,
}

impl MessageHandler for StdHandler {
    fn message(&mut self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Message if self.messages_to_stderr => eprintln!("{text}"),
            MessageKind::Message => println!("{text}"),
            MessageKind::Warning => eprintln!("Warning: {text}"),
            MessageKind::Error => eprintln!("Error: {text}"),
        }
    }
}

/// Collects messages in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct MemoryHandler {
    log: Rc<RefCell<Vec<(MessageKind, String)>>>,
}

impl MemoryHandler {
    #[must_use]
    pub fn messages(&self) -> Vec<(MessageKind, String)> {
        self.log.borrow().clone()
    }

    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.log.borrow().iter().map(|(_, x)| x.clone()).collect()
    }

    #[must_use]
    pub fn texts_of(&self, kind: MessageKind) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, x)| x.clone())
            .collect()
    }
}

impl MessageHandler for MemoryHandler {
    fn message(&mut self, kind: MessageKind, text: &str) {
        self.log.borrow_mut().push((kind, text.to_owned()));
    }
}

/// Facts gathered about the input before any module's identify function runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DetectionData {
    pub has_utf8_bom: bool,
}

pub struct Session {
    options: Options,
    handler: Box<dyn MessageHandler>,
    errors: u64,
    warnings: u64,
    files_created: u64,
    files_extracted: u64,
    inputs_closed: u64,
    detection: DetectionData,
    zip: Option<ZipWriter>,
    extrlist: Option<ByteSource<'static>>,
}

impl Session {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self::with_handler(options, Box::new(StdHandler::default()))
    }

    #[must_use]
    pub fn with_handler(options: Options, handler: Box<dyn MessageHandler>) -> Self {
        Self {
            options,
            handler,
            errors: 0,
            warnings: 0,
            files_created: 0,
            files_extracted: 0,
            inputs_closed: 0,
            detection: DetectionData::default(),
            zip: None,
            extrlist: None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    #[must_use]
    pub fn warnings(&self) -> u64 {
        self.warnings
    }

    /// How many output files were requested, including ones that were
    /// suppressed by the file-range options.
    #[must_use]
    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    #[must_use]
    pub fn files_extracted(&self) -> u64 {
        self.files_extracted
    }

    #[must_use]
    pub fn inputs_closed(&self) -> u64 {
        self.inputs_closed
    }

    #[must_use]
    pub fn detection(&self) -> &DetectionData {
        &self.detection
    }

    pub(crate) fn detection_mut(&mut self) -> &mut DetectionData {
        &mut self.detection
    }

    pub fn msg(&mut self, text: &str) {
        if self.options.show_messages {
            self.handler.message(MessageKind::Message, text);
        }
    }

    pub fn warn(&mut self, text: &str) {
        self.warnings += 1;
        if self.options.show_warnings {
            self.handler.message(MessageKind::Warning, text);
        }
    }

    /// Reports an error. Errors are always shown, and are what decides the
    /// exit status.
    pub fn err(&mut self, text: &str) {
        self.errors += 1;
        self.handler.message(MessageKind::Error, text);
    }

    fn output_name(&self, ext: Option<&str>, fi: Option<&FileInfo>, index: u64) -> String {
        let internal = fi
            .and_then(|x| x.name.as_deref())
            .filter(|x| !x.is_empty())
            .map(sanitize_filename);

        if self.options.output_style == OutputStyle::Zip
            && self.options.base_output_filename.is_none()
            && fi.is_some_and(|x| x.original_filename)
        {
            if let Some(name) = &internal {
                return name.clone();
            }
        }

        let suffix = match (ext, internal) {
            (Some(ext), Some(name)) => format!("{name}.{ext}"),
            (Some(ext), None) => ext.to_owned(),
            (None, Some(name)) => name,
            (None, None) => "bin".to_owned(),
        };
        let base = self.options.base_output_filename.as_deref().unwrap_or("output");
        format!("{base}.{index:03}.{suffix}")
    }

    /// Opens the next output file.
    ///
    /// This never fails. If the file is excluded by the extraction policy or
    /// the file-range options, or can not be opened, a null sink is returned
    /// instead, and the module carries on writing into it.
    pub fn create_output_file(
        &mut self,
        ext: Option<&str>,
        fi: Option<&FileInfo>,
        flags: CreateFlags,
    ) -> ByteSource<'static> {
        let aux = flags.contains(CreateFlags::AUX);
        match self.options.extract_policy {
            ExtractPolicy::MainOnly if aux => {
                tracing::debug!("skipping auxiliary output");
                return ByteSource::null();
            }
            ExtractPolicy::AuxOnly if !aux => {
                tracing::debug!("skipping main output");
                return ByteSource::null();
            }
            _ => (),
        }

        let index = self.files_created;
        self.files_created += 1;
        let name = self.output_name(ext, fi, index);

        let first = self.options.first_output_file;
        let past_end = self
            .options
            .max_output_files
            .is_some_and(|max| index >= first.saturating_add(max));
        if index < first || past_end {
            tracing::debug!("not extracting {name} (file {index} is out of range)");
            let mut result = ByteSource::null();
            result.set_name(name);
            return result;
        }

        self.files_extracted += 1;
        if let Some(list) = &mut self.extrlist {
            let written = writeln!(list, "{name}").and_then(|()| list.flush());
            if let Err(e) = written {
                tracing::warn!("failed to update extraction list: {e}");
            }
        }

        if self.options.list_mode {
            self.msg(&name);
            let mut result = ByteSource::null();
            result.set_name(name);
            return result;
        }

        let info = fi.cloned().map(|mut x| {
            x.mod_time = x.mod_time.map(|t| t.to_utc(self.options.input_tz_offset));
            x
        });
        let managed = Managed {
            info,
            preserve_times: self.options.preserve_file_times,
            archive: false,
        };

        match self.options.output_style {
            OutputStyle::Zip => {
                self.msg(&format!("Adding {name} to ZIP file"));
                let managed = Managed {
                    archive: true,
                    ..managed
                };
                ByteSource::managed(None, name, managed)
            }
            OutputStyle::Stdout => {
                self.msg(&format!("Writing {name} to [stdout]"));
                ByteSource::managed(Some(OutputFile::stdout()), name, managed)
            }
            OutputStyle::Files => {
                self.msg(&format!("Writing {name}"));
                let path = PathBuf::from(&name);
                match open_for_write(&path, self.options.overwrite_mode, false) {
                    Ok(file) => {
                        ByteSource::managed(Some(OutputFile::file(file, path, false)), name, managed)
                    }
                    Err(e) => {
                        self.err(&format!("Failed to write {name}: {e}"));
                        ByteSource::null()
                    }
                }
            }
        }
    }

    /// Finishes an output file made by [`create_output_file`](Self::create_output_file).
    /// Archive members are compressed into the ZIP file at this point.
    pub fn close_output(&mut self, output: ByteSource<'_>) -> Result<()> {
        let member = output
            .managed_info()
            .filter(|x| x.archive && output.kind() == Kind::MemBuf)
            .map(|x| {
                let info = x.info.as_ref();
                let mod_time = info
                    .and_then(|x| x.mod_time)
                    .filter(|_| x.preserve_times);
                let executable = info.is_some_and(|x| x.mode == ModeHint::Executable);
                (mod_time, executable)
            });

        if let Some((mod_time, executable)) = member {
            let name = output.name().unwrap_or("unnamed").to_owned();
            let data = output.as_slice().unwrap_or_default();
            self.zip_writer()?.add(&name, data, mod_time, executable)?;
        }
        output.close()
    }

    /// Copies a range of `input` to a new output file.
    pub fn create_file_from_slice(
        &mut self,
        input: &ByteSource<'_>,
        pos: u64,
        len: u64,
        ext: Option<&str>,
        fi: Option<&FileInfo>,
        flags: CreateFlags,
    ) -> Result<()> {
        let mut output = self.create_output_file(ext, fi, flags);
        let copied = input.copy_to(pos, len, &mut output);
        let closed = self.close_output(output);
        copied.and(closed)
    }

    pub(crate) fn zip_writer(&mut self) -> Result<&mut ZipWriter> {
        let zip = match self.zip.take() {
            Some(x) => x,
            None if self.options.zip_to_stdout => ZipWriter::stdout(),
            None => ZipWriter::create(&self.options.archive_path, self.options.overwrite_mode)?,
        };
        Ok(self.zip.insert(zip))
    }

    pub(crate) fn open_extrlist(&mut self) {
        let Some(path) = self.options.extrlist_path.clone() else {
            return;
        };
        let append = self.options.extrlist_append;
        match ByteSource::create_unmanaged_file(&path, OverwriteMode::Standard, append) {
            Ok(x) => self.extrlist = Some(x),
            Err(e) => self.err(&format!("Failed to write {}: {e}", path.display())),
        }
    }

    pub(crate) fn close_extrlist(&mut self) -> Result<()> {
        match self.extrlist.take() {
            Some(x) => x.close(),
            None => Ok(()),
        }
    }

    pub(crate) fn close_input(&mut self, input: ByteSource<'_>) {
        if let Err(e) = input.close() {
            tracing::warn!("failed to close input: {e}");
        }
        self.inputs_closed += 1;
    }

    /// Writes out the ZIP file's central directory, if one was started. Call
    /// this once all inputs have been processed.
    pub fn finish(&mut self) -> Result<()> {
        let list = self.close_extrlist();
        let zip = match self.zip.take() {
            Some(x) => x.finish(),
            None => Ok(()),
        };
        list.and(zip)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
