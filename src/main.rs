use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use fmtsift::{
    run::Request,
    session::{BaseNameFlags, ExtractPolicy, OutputStyle, OverwriteMode, StdHandler},
    Dispatcher, Options, Registry, Session,
};
use std::{path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Overwrite {
    Standard,
    Never,
    Default,
}

impl From<Overwrite> for OverwriteMode {
    fn from(value: Overwrite) -> Self {
        match value {
            Overwrite::Standard => Self::Standard,
            Overwrite::Never => Self::Never,
            Overwrite::Default => Self::Default,
        }
    }
}

/// Identify files in legacy formats, and extract what's inside them.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The file to process
    file: Option<PathBuf>,

    /// Use this module instead of autodetecting one
    #[arg(short, long)]
    module: Option<String>,

    /// Read the input from stdin
    #[arg(long)]
    fromstdin: bool,

    /// Only process the input starting at this offset
    #[arg(long, value_name = "OFFSET")]
    start: Option<u64>,

    /// Only process this many bytes of the input
    #[arg(long, value_name = "BYTES")]
    size: Option<u64>,

    /// Prefix for output file names
    #[arg(short = 'o', long)]
    base_name: Option<String>,

    /// Write output files into a ZIP archive
    #[arg(long)]
    zip: bool,

    /// Name of the ZIP archive
    #[arg(long, value_name = "PATH")]
    arcfn: Option<PathBuf>,

    /// Write output to stdout
    #[arg(long)]
    tostdout: bool,

    /// List the files that would be extracted, without writing them
    #[arg(short, long)]
    list: bool,

    /// Extract more, and list hidden modules
    #[arg(short = 'a', long)]
    extract_all: bool,

    /// Skip auxiliary files
    #[arg(long, conflicts_with = "aux_only")]
    main_only: bool,

    /// Only extract auxiliary files
    #[arg(long)]
    aux_only: bool,

    /// Extract at most this many files
    #[arg(long, value_name = "N")]
    maxfiles: Option<u64>,

    /// Skip output files numbered below this
    #[arg(long, value_name = "N", default_value_t = 0)]
    firstfile: u64,

    /// What to do about existing output files
    #[arg(long, value_enum, default_value_t = Overwrite::Standard)]
    overwrite: Overwrite,

    /// Don't set the modification time of output files
    #[arg(long)]
    no_modtime: bool,

    /// Hours east of UTC that timestamps in the input are in
    #[arg(long, value_name = "HOURS", allow_negative_numbers = true)]
    intz: Option<f64>,

    /// Codes that switch some modules into special modes
    #[arg(long)]
    modcodes: Option<String>,

    /// Print the list of modules
    #[arg(long)]
    modules: bool,

    /// Print help for the module given with -m, or for the detected module
    #[arg(long)]
    modhelp: bool,

    /// Record the names of extracted files in this file
    #[arg(long, value_name = "PATH")]
    extrlist: Option<PathBuf>,

    /// Add to the extraction list instead of replacing it
    #[arg(long, requires = "extrlist")]
    extrlist_append: bool,

    /// Comma-separated modules to disable
    #[arg(long, value_name = "LIST")]
    disablemods: Option<String>,

    /// Comma-separated modules to keep; all others are disabled
    #[arg(long, value_name = "LIST")]
    onlymods: Option<String>,

    /// Comma-separated modules to exclude from autodetection
    #[arg(long, value_name = "LIST")]
    nodetectmods: Option<String>,

    /// Comma-separated modules to keep in autodetection
    #[arg(long, value_name = "LIST")]
    onlydetectmods: Option<String>,

    /// Print debugging information (repeat for more)
    #[arg(short, action = ArgAction::Count)]
    debug: u8,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Don't print warnings
    #[arg(long)]
    nowarnings: bool,
}

impl Cli {
    fn output_style(&self) -> OutputStyle {
        if self.zip {
            OutputStyle::Zip
        } else if self.tostdout {
            OutputStyle::Stdout
        } else {
            OutputStyle::Files
        }
    }

    fn options(&self) -> Options {
        let style = self.output_style();
        let max_output_files = match (self.maxfiles, style) {
            (None, OutputStyle::Stdout) => Some(1),
            (x, _) => x,
        };
        let extract_policy = if self.main_only {
            ExtractPolicy::MainOnly
        } else if self.aux_only {
            ExtractPolicy::AuxOnly
        } else {
            ExtractPolicy::Both
        };
        #[allow(clippy::cast_possible_truncation)]
        let input_tz_offset = self.intz.map_or(0, |x| (x * 3600.0).round() as i64);

        let mut builder = Options::builder()
            .output_style(style)
            .extract_policy(extract_policy)
            .extract_level(if self.extract_all { 2 } else { 1 })
            .list_mode(self.list)
            .max_output_files(max_output_files)
            .first_output_file(self.firstfile)
            .overwrite_mode(self.overwrite.into())
            .zip_to_stdout(self.zip && self.tostdout)
            .preserve_file_times(!self.no_modtime)
            .input_tz_offset(input_tz_offset)
            .show_messages(!self.quiet)
            .show_warnings(!self.nowarnings)
            .modhelp(self.modhelp)
            .module_codes(self.modcodes.clone())
            .extrlist_path(self.extrlist.clone())
            .extrlist_append(self.extrlist_append);
        if let Some(name) = &self.base_name {
            builder = builder.base_output_filename(name, BaseNameFlags::empty());
        }
        if let Some(path) = &self.arcfn {
            builder = builder.archive_path(path);
        }
        builder.build()
    }

    fn request(&self) -> anyhow::Result<Request> {
        let mut request = if self.fromstdin {
            Request::stdin()
        } else if let Some(file) = &self.file {
            Request::file(file)
        } else if self.modhelp && self.module.is_some() {
            // module help never touches the input
            Request::memory(Vec::new())
        } else {
            anyhow::bail!("no input file specified");
        };
        if let Some(module) = &self.module {
            request = request.module(module);
        }
        if self.start.is_some() || self.size.is_some() {
            request = request.slice(self.start.unwrap_or(0), self.size);
        }
        Ok(request)
    }
}

fn init_tracing(debug: u8) {
    let level = match debug {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut registry = Registry::builtin();
    registry.apply_filters(
        cli.disablemods.as_deref(),
        cli.onlymods.as_deref(),
        cli.nodetectmods.as_deref(),
        cli.onlydetectmods.as_deref(),
    );

    let options = cli.options();
    let handler = StdHandler {
        messages_to_stderr: cli.tostdout,
    };
    let mut session = Session::with_handler(options, Box::new(handler));

    if cli.modules {
        registry.print_module_list(&mut session);
        return Ok(ExitCode::SUCCESS);
    }

    let request = cli.request().context("failed to build the request")?;
    let report = Dispatcher::new(&registry).run(&mut session, &request);
    tracing::debug!(
        "finished at stage {:?}: {} file(s) extracted, {} error(s)",
        report.last_stage,
        report.files_extracted,
        report.errors
    );

    Ok(if report.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
