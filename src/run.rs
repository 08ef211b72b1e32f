//! Drives one input through the whole pipeline.
//!
//! A run goes `Start → OpenInput → [Slice] → SelectModule → Validate → Run →
//! Report → Close`. Failures at any stage are reported through the session's
//! message channel and recorded in the returned [`Report`]. Everything that
//! was opened is closed on every path.

use crate::{
    dbuf::ByteSource,
    guess,
    module::{Disposition, ModuleInfo, ModuleParams},
    registry::Registry,
    session::{OutputStyle, Session},
    Error, Result,
};
use std::path::PathBuf;

/// Where the input comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputSpec {
    File(PathBuf),
    Stdin,
    Memory(Vec<u8>),
}

impl InputSpec {
    fn open(&self) -> Result<ByteSource<'static>> {
        match self {
            Self::File(path) => ByteSource::open_file(path),
            Self::Stdin => {
                let mut result = ByteSource::open_stdin()?;
                result.set_name("[stdin]");
                Ok(result)
            }
            Self::Memory(bytes) => Ok(ByteSource::from_vec(bytes.clone())),
        }
    }

    fn display_name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Stdin => "[stdin]".into(),
            Self::Memory(_) => "[memory]".into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    input: InputSpec,
    module: Option<String>,
    slice_start: u64,
    slice_len: Option<u64>,
}

impl Request {
    #[must_use]
    pub fn new(input: InputSpec) -> Self {
        Self {
            input,
            module: None,
            slice_start: 0,
            slice_len: None,
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(InputSpec::File(path.into()))
    }

    #[must_use]
    pub fn stdin() -> Self {
        Self::new(InputSpec::Stdin)
    }

    #[must_use]
    pub fn memory(bytes: Vec<u8>) -> Self {
        Self::new(InputSpec::Memory(bytes))
    }

    /// Uses the named module (id or alias) instead of autodetecting one.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    /// Only looks at `len` bytes starting at `start`. Without a length, the
    /// slice runs to the end of the input.
    #[must_use]
    pub fn slice(mut self, start: u64, len: Option<u64>) -> Self {
        self.slice_start = start;
        self.slice_len = len;
        self
    }

    #[must_use]
    pub fn input(&self) -> &InputSpec {
        &self.input
    }

    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module.as_deref()
    }

    fn is_sliced(&self) -> bool {
        self.slice_start > 0 || self.slice_len.is_some()
    }
}

/// How far a run got. Stages are entered in declaration order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Stage {
    #[default]
    Start,
    OpenInput,
    Slice,
    SelectModule,
    Validate,
    Run,
    Report,
    Close,
}

/// What happened during a run.
#[derive(Debug, Default)]
pub struct Report {
    /// The module that was selected, if any.
    pub module: Option<&'static str>,
    pub autodetected: bool,
    /// Whether the module ran and returned successfully.
    pub run_ok: bool,
    pub files_extracted: u64,
    pub errors: u64,
    pub warnings: u64,
    /// The furthest stage reached before closing.
    pub last_stage: Stage,
    /// Why the run stopped early, if it did.
    pub failure: Option<Error>,
}

/// Runs one input through every [`Stage`], from opening it to cleanup.
pub struct Dispatcher<'r> {
    registry: &'r Registry,
}

impl<'r> Dispatcher<'r> {
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn run(&self, session: &mut Session, request: &Request) -> Report {
        let mut report = Report::default();

        if session.options().modhelp() {
            if let Some(name) = request.module_name() {
                report.failure = self.module_help(session, name);
                return finish(session, report);
            }
        }

        session.open_extrlist();
        self.run_input(session, request, &mut report);

        report.last_stage = Stage::Close;
        if let Err(err) = session.finish() {
            session.err(&format!("Failed to finish writing output: {err}"));
            report.failure.get_or_insert(err);
        }
        finish(session, report)
    }

    fn module_help(&self, session: &mut Session, name: &str) -> Option<Error> {
        let Some(info) = self.registry.get(name) else {
            session.err(&format!("Unknown module \"{name}\""));
            return Some(Error::UnknownModule(name.to_owned()));
        };
        if info.id() != name {
            session.msg(&format!("\"{name}\" is an alias for module \"{}\"", info.id()));
        }
        info.print_help(session);
        None
    }

    fn run_input(&self, session: &mut Session, request: &Request, report: &mut Report) {
        let explicit = match request.module_name() {
            Some(name) => match self.registry.get(name) {
                Some(info) => Some(info),
                None => {
                    session.err(&format!("Unknown module \"{name}\""));
                    report.failure = Some(Error::UnknownModule(name.to_owned()));
                    return;
                }
            },
            None => None,
        };

        report.last_stage = Stage::OpenInput;
        let name = request.input.display_name();
        match (request.is_sliced(), request.slice_len) {
            (true, Some(len)) => tracing::debug!("input file: {name}[{},{len}]", request.slice_start),
            (true, None) => tracing::debug!("input file: {name}[{}]", request.slice_start),
            _ => tracing::debug!("input file: {name}"),
        }

        let input = match request.input.open() {
            Ok(x) => x,
            Err(err) => {
                session.err(&format!("Can't read {name}: {err}"));
                report.failure = Some(err);
                return;
            }
        };

        self.process(session, &input, explicit, request, report);
        session.close_input(input);
    }

    fn process(
        &self,
        session: &mut Session,
        input: &ByteSource<'_>,
        explicit: Option<&'r ModuleInfo>,
        request: &Request,
        report: &mut Report,
    ) {
        let slice;
        let input = if request.is_sliced() {
            report.last_stage = Stage::Slice;
            let len = request
                .slice_len
                .unwrap_or_else(|| input.len().saturating_sub(request.slice_start));
            slice = ByteSource::subfile(input, request.slice_start, len);
            &slice
        } else {
            input
        };

        report.last_stage = Stage::SelectModule;
        let (info, autodetected) = match explicit {
            Some(info) => (info, false),
            None => match guess::detect(self.registry, session, input) {
                Ok(Some(info)) => (info, true),
                Ok(None) => {
                    let empty = input.is_empty();
                    if empty {
                        session.err("Unknown or unsupported file format (empty file)");
                    } else {
                        session.err("Unknown or unsupported file format");
                    }
                    report.failure = Some(Error::UnsupportedFormat { empty });
                    return;
                }
                Err(err) => {
                    report.failure = Some(err);
                    return;
                }
            },
        };
        report.module = Some(info.id());
        report.autodetected = autodetected;

        if session.options().modhelp() && autodetected && !info.module_flags().no_modhelp() {
            info.print_help(session);
            return;
        }

        session.msg(&format!("Module: {}", info.id()));

        report.last_stage = Stage::Validate;
        let flags = info.module_flags();
        if autodetected && flags.security_warning() {
            let id = info.id();
            session.err(&format!(
                "The {id} module has not been audited for security. There is a greater \
                 than average chance that it is unsafe to use with untrusted input files. \
                 Use \"-m {id}\" to confirm that you want to use it."
            ));
            report.failure = Some(Error::SecurityConfirmationRequired(id.to_owned()));
            return;
        }
        if flags.non_working() {
            session.warn(&format!(
                "The {} module is considered to be incomplete, and may not work properly. \
                 Caveat emptor.",
                info.id()
            ));
        }
        tracing::debug!("file size: {}", input.len());

        // an archive written to stdout is produced even when nothing is extracted
        let options = session.options();
        if options.output_style() == OutputStyle::Zip && options.zip_to_stdout() {
            if let Err(err) = session.zip_writer() {
                session.err(&format!("Failed to create ZIP file: {err}"));
                report.failure = Some(err);
                return;
            }
        }

        let params = ModuleParams {
            codes: session.options().module_codes().map(str::to_owned),
            disposition: if autodetected {
                Disposition::Autodetected
            } else {
                Disposition::Explicit
            },
        };

        report.last_stage = Stage::Run;
        if let Err(err) = (info.run_fn())(session, input, &params) {
            session.err(&err.to_string());
            report.failure = Some(err);
            return;
        }
        report.run_ok = true;

        report.last_stage = Stage::Report;
        if session.files_extracted() == 0 && session.errors() == 0 && !flags.no_extract() {
            session.msg("No files found to extract!");
        }
    }
}

fn finish(session: &Session, mut report: Report) -> Report {
    report.files_extracted = session.files_extracted();
    report.errors = session.errors();
    report.warnings = session.warnings();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        module::ModuleFlags,
        session::{MemoryHandler, MessageKind, Options},
    };
    use core::cell::Cell;

    thread_local! {
        static SEEN_LEN: Cell<Option<u64>> = const { Cell::new(None) };
    }

    fn run_record(_: &mut Session, input: &ByteSource<'_>, params: &ModuleParams) -> Result<()> {
        SEEN_LEN.with(|x| x.set(Some(input.len())));
        assert_eq!(params.codes.as_deref(), None);
        Ok(())
    }

    fn run_failing(_: &mut Session, _: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
        Err(Error::Decompression("broken stream".into()))
    }

    fn identify_abc(_: &mut Session, input: &ByteSource<'_>) -> u8 {
        if input.memcmp(0, b"abc") {
            80
        } else {
            0
        }
    }

    fn identify_risky(_: &mut Session, input: &ByteSource<'_>) -> u8 {
        if input.memcmp(0, b"RISK") {
            100
        } else {
            0
        }
    }

    fn identify_fallback(_: &mut Session, input: &ByteSource<'_>) -> u8 {
        if input.memcmp(0, b"ZZZ") {
            10
        } else {
            0
        }
    }

    fn registry() -> anyhow::Result<Registry> {
        let mut result = Registry::new();
        result.register(
            ModuleInfo::new("abc", "ABC files", run_record)
                .alias("abc2")
                .identify(identify_abc),
        )?;
        result.register(
            ModuleInfo::new("risky", "Risky files", run_record)
                .identify(identify_risky)
                .flags(ModuleFlags::SECURITY_WARNING),
        )?;
        result.register(
            ModuleInfo::new("wip", "Work in progress", run_record)
                .flags(ModuleFlags::NON_WORKING | ModuleFlags::NO_EXTRACT),
        )?;
        result.register(ModuleInfo::new("fails", "Always fails", run_failing))?;
        result.register(
            ModuleInfo::new("fallback", "Catches stragglers", run_record)
                .identify(identify_fallback)
                .flags(ModuleFlags::NO_MODHELP | ModuleFlags::NO_EXTRACT),
        )?;
        Ok(result)
    }

    fn new_session(builder: crate::OptionsBuilder) -> (Session, MemoryHandler) {
        let handler = MemoryHandler::default();
        let session = Session::with_handler(builder.build(), Box::new(handler.clone()));
        (session, handler)
    }

    #[test]
    fn autodetects_and_runs() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let report = Dispatcher::new(&registry).run(&mut session, &Request::memory(b"abcdef".to_vec()));

        assert_eq!(report.module, Some("abc"));
        assert!(report.autodetected);
        assert!(report.run_ok);
        assert_eq!(report.last_stage, Stage::Close);
        assert_eq!(session.inputs_closed(), 1);
        assert_eq!(handler.texts(), ["Module: abc", "No files found to extract!"]);
        Ok(())
    }

    #[test]
    fn help_mode_skips_flagged_modules() -> anyhow::Result<()> {
        let registry = registry()?;
        let dispatcher = Dispatcher::new(&registry);

        let (mut session, handler) = new_session(Options::builder().modhelp(true));
        let report = dispatcher.run(&mut session, &Request::memory(b"abcdef".to_vec()));
        assert_eq!(report.module, Some("abc"));
        assert!(!report.run_ok);
        assert_eq!(
            handler.texts(),
            [
                "Module: abc",
                "Alias: abc2",
                "Description: ABC files",
                "No help available for module \"abc\"",
            ]
        );

        let (mut session, handler) = new_session(Options::builder().modhelp(true));
        let report = dispatcher.run(&mut session, &Request::memory(b"ZZZ".to_vec()));
        assert_eq!(report.module, Some("fallback"));
        assert!(report.run_ok);
        assert_eq!(handler.texts(), ["Module: fallback"]);
        Ok(())
    }

    #[test]
    fn unknown_module_never_opens_input() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let request = Request::file("/nonexistent/input.bin").module("nope");
        let report = Dispatcher::new(&registry).run(&mut session, &request);

        assert!(matches!(report.failure, Some(Error::UnknownModule(_))));
        assert_eq!(report.errors, 1);
        assert_eq!(session.inputs_closed(), 0);
        assert_eq!(handler.texts(), ["Unknown module \"nope\""]);
        Ok(())
    }

    #[test]
    fn open_failure() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let report = Dispatcher::new(&registry).run(&mut session, &Request::file("/nonexistent/input.bin"));

        assert_eq!(report.last_stage, Stage::Close);
        assert!(matches!(report.failure, Some(Error::Io(_))));
        assert_eq!(session.inputs_closed(), 0);
        assert!(handler.texts()[0].starts_with("Can't read /nonexistent/input.bin: "));
        Ok(())
    }

    #[test]
    fn unsupported_formats() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let dispatcher = Dispatcher::new(&registry);

        let report = dispatcher.run(&mut session, &Request::memory(b"xyz".to_vec()));
        assert!(matches!(report.failure, Some(Error::UnsupportedFormat { empty: false })));
        let report = dispatcher.run(&mut session, &Request::memory(Vec::new()));
        assert!(matches!(report.failure, Some(Error::UnsupportedFormat { empty: true })));

        assert_eq!(
            handler.texts_of(MessageKind::Error),
            [
                "Unknown or unsupported file format",
                "Unknown or unsupported file format (empty file)",
            ]
        );
        assert_eq!(session.inputs_closed(), 2);
        Ok(())
    }

    #[test]
    fn slices() -> anyhow::Result<()> {
        let registry = registry()?;
        let dispatcher = Dispatcher::new(&registry);
        let bytes = b"....abcdefgh".to_vec();

        let (mut session, _) = new_session(Options::builder());
        let report = dispatcher.run(&mut session, &Request::memory(bytes.clone()).slice(4, None));
        assert_eq!(report.module, Some("abc"));
        assert_eq!(SEEN_LEN.with(Cell::get), Some(8));

        let (mut session, _) = new_session(Options::builder());
        let request = Request::memory(bytes.clone()).slice(4, Some(3)).module("abc2");
        let report = dispatcher.run(&mut session, &request);
        assert!(!report.autodetected);
        assert_eq!(SEEN_LEN.with(Cell::get), Some(3));

        let (mut session, _) = new_session(Options::builder());
        let request = Request::memory(bytes).slice(100, None).module("abc");
        dispatcher.run(&mut session, &request);
        assert_eq!(SEEN_LEN.with(Cell::get), Some(0));
        Ok(())
    }

    #[test]
    fn security_confirmation() -> anyhow::Result<()> {
        let registry = registry()?;
        let dispatcher = Dispatcher::new(&registry);

        let (mut session, handler) = new_session(Options::builder());
        let report = dispatcher.run(&mut session, &Request::memory(b"RISKY".to_vec()));
        assert!(!report.run_ok);
        assert_eq!(report.last_stage, Stage::Close);
        assert!(matches!(report.failure, Some(Error::SecurityConfirmationRequired(_))));
        assert!(handler.texts_of(MessageKind::Error)[0].ends_with(
            "Use \"-m risky\" to confirm that you want to use it."
        ));

        let (mut session, _) = new_session(Options::builder());
        let report = dispatcher.run(&mut session, &Request::memory(b"RISKY".to_vec()).module("risky"));
        assert!(report.run_ok);
        Ok(())
    }

    #[test]
    fn incomplete_modules_warn() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let request = Request::memory(b"x".to_vec()).module("wip");
        let report = Dispatcher::new(&registry).run(&mut session, &request);

        assert!(report.run_ok);
        assert_eq!(report.warnings, 1);
        assert_eq!(
            handler.texts(),
            [
                "Module: wip",
                "The wip module is considered to be incomplete, and may not work properly. \
                 Caveat emptor.",
            ]
        );
        Ok(())
    }

    #[test]
    fn module_errors_are_reported() -> anyhow::Result<()> {
        let registry = registry()?;
        let (mut session, handler) = new_session(Options::builder());
        let request = Request::memory(b"x".to_vec()).module("fails");
        let report = Dispatcher::new(&registry).run(&mut session, &request);

        assert!(!report.run_ok);
        assert_eq!(report.last_stage, Stage::Close);
        assert_eq!(session.inputs_closed(), 1);
        assert_eq!(
            handler.texts(),
            ["Module: fails", "decompression failed: broken stream"]
        );
        Ok(())
    }

    #[test]
    fn module_help() -> anyhow::Result<()> {
        let registry = registry()?;
        let dispatcher = Dispatcher::new(&registry);

        let (mut session, handler) = new_session(Options::builder().modhelp(true));
        dispatcher.run(&mut session, &Request::file("/nonexistent").module("abc2"));
        assert_eq!(
            handler.texts(),
            [
                "\"abc2\" is an alias for module \"abc\"",
                "Module: abc",
                "Alias: abc2",
                "Description: ABC files",
                "No help available for module \"abc\"",
            ]
        );
        assert_eq!(session.inputs_closed(), 0);

        let (mut session, handler) = new_session(Options::builder().modhelp(true));
        let report = dispatcher.run(&mut session, &Request::memory(b"abc".to_vec()));
        assert_eq!(report.module, Some("abc"));
        assert!(!report.run_ok);
        assert_eq!(handler.texts()[0], "Module: abc");
        assert_eq!(handler.texts()[1], "Alias: abc2");
        Ok(())
    }
}
