//! Format module descriptors.
//!
//! A module pairs an optional `identify` function, which scores how likely the
//! input is to be in the module's format, with a `run` function that parses
//! it and writes out whatever it finds.

use crate::{derive, dbuf::ByteSource, session::Session, Result};

/// The most aliases a module may have.
pub const MAX_ALIASES: usize = 8;

/// Scores the input from 0 (not this format) to 100 (certainly this format).
pub type IdentifyFn = fn(&mut Session, &ByteSource<'_>) -> u8;

/// Processes the input.
pub type RunFn = fn(&mut Session, &ByteSource<'_>, &ModuleParams) -> Result<()>;

/// Prints module-specific usage notes through the session's message channel.
pub type HelpFn = fn(&mut Session);

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ModuleFlags: u32 {
        /// Left out of module listings.
        const HIDDEN = 1 << 0;
        /// Never selected by autodetection.
        const DISABLE_DETECT = 1 << 1;
        /// The identify function must run even when detection is disabled.
        const SHARED_DETECTION = 1 << 2;
        /// Not expected to produce any output files.
        const NO_EXTRACT = 1 << 3;
        /// Has to be requested by name.
        const SECURITY_WARNING = 1 << 4;
        /// Known to be incomplete.
        const NON_WORKING = 1 << 5;
        /// Runs normally when autodetected in help mode, instead of printing help.
        const NO_MODHELP = 1 << 6;
    }
}

derive::module_flags!(ModuleFlags {
    HIDDEN => hidden,
    DISABLE_DETECT => disable_detect,
    SHARED_DETECTION => shared_detection,
    NO_EXTRACT => no_extract,
    SECURITY_WARNING => security_warning,
    NON_WORKING => non_working,
    NO_MODHELP => no_modhelp,
});

/// How a module came to be chosen.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Disposition {
    #[default]
    Explicit,
    Autodetected,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ModuleParams {
    /// A free-form string that switches some modules into special modes.
    pub codes: Option<String>,
    pub disposition: Disposition,
}

impl ModuleParams {
    /// Whether the codes string contains `code`.
    #[must_use]
    pub fn has_code(&self, code: char) -> bool {
        self.codes.as_deref().is_some_and(|x| x.contains(code))
    }
}

#[derive(Clone)]
pub struct ModuleInfo {
    id: &'static str,
    aliases: Vec<&'static str>,
    description: &'static str,
    notes: Option<&'static str>,
    flags: ModuleFlags,
    identify: Option<IdentifyFn>,
    run: RunFn,
    help: Option<HelpFn>,
}

impl ModuleInfo {
    #[must_use]
    pub fn new(id: &'static str, description: &'static str, run: RunFn) -> Self {
        Self {
            id,
            aliases: Vec::new(),
            description,
            notes: None,
            flags: ModuleFlags::empty(),
            identify: None,
            run,
            help: None,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: &'static str) -> Self {
        self.notes = Some(notes);
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: ModuleFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn identify(mut self, identify: IdentifyFn) -> Self {
        self.identify = Some(identify);
        self
    }

    #[must_use]
    pub fn help(mut self, help: HelpFn) -> Self {
        self.help = Some(help);
        self
    }

    #[must_use]
    pub fn id(&self) -> &'static str {
        self.id
    }

    #[must_use]
    pub fn aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    #[must_use]
    pub fn other_notes(&self) -> Option<&'static str> {
        self.notes
    }

    #[must_use]
    pub fn module_flags(&self) -> ModuleFlags {
        self.flags
    }

    #[must_use]
    pub fn identify_fn(&self) -> Option<IdentifyFn> {
        self.identify
    }

    #[must_use]
    pub fn run_fn(&self) -> RunFn {
        self.run
    }

    #[must_use]
    pub fn help_fn(&self) -> Option<HelpFn> {
        self.help
    }

    /// Whether `name` is this module's id or one of its aliases.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.id == name || self.aliases.iter().any(|&x| x == name)
    }

    pub(crate) fn add_flags(&mut self, flags: ModuleFlags) {
        self.flags |= flags;
    }

    /// Prints the module's description and help text.
    pub fn print_help(&self, session: &mut Session) {
        session.msg(&format!("Module: {}", self.id));
        for alias in &self.aliases {
            session.msg(&format!("Alias: {alias}"));
        }
        session.msg(&format!("Description: {}", self.description));
        if let Some(notes) = self.notes {
            session.msg(&format!("Other notes: {notes}"));
        }

        match self.help {
            Some(help) => {
                session.msg(&format!("Help for module \"{}\":", self.id));
                help(session);
            }
            None => session.msg(&format!("No help available for module \"{}\"", self.id)),
        }
    }
}

impl core::fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("id", &self.id)
            .field("aliases", &self.aliases)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
