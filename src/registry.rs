use crate::{
    module::{ModuleFlags, ModuleInfo, MAX_ALIASES},
    modules,
    session::Session,
    Error, Result,
};

/// The table of known format modules, in registration order.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    modules: Vec<ModuleInfo>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in module.
    #[must_use]
    pub fn builtin() -> Self {
        let mut result = Self::new();
        for info in modules::builtins() {
            if let Err(err) = result.register(info) {
                tracing::error!("failed to register built-in module: {err}");
            }
        }
        result
    }

    /// Adds a module. Its id and aliases must not collide with any name
    /// that is already registered.
    pub fn register(&mut self, info: ModuleInfo) -> Result<()> {
        if info.aliases().len() > MAX_ALIASES {
            return Err(Error::Registry(format!(
                "module \"{}\" has more than {MAX_ALIASES} aliases",
                info.id()
            )));
        }

        let names = core::iter::once(info.id()).chain(info.aliases().iter().copied());
        for name in names {
            if let Some(existing) = self.modules.iter().find(|x| x.answers_to(name)) {
                return Err(Error::Registry(format!(
                    "name \"{name}\" is already taken by module \"{}\"",
                    existing.id()
                )));
            }
        }

        tracing::trace!("registered module {}", info.id());
        self.modules.push(info);
        Ok(())
    }

    /// Looks up a module by id, or failing that, by alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules
            .iter()
            .find(|x| x.id() == name)
            .or_else(|| self.modules.iter().find(|x| x.answers_to(name)))
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The modules worth listing at `extract_level`, sorted by id. Hidden and
    /// incomplete modules only show up at level 2 and above.
    #[must_use]
    pub fn list(&self, extract_level: u8) -> Vec<&ModuleInfo> {
        let mut result: Vec<_> = self
            .modules
            .iter()
            .filter(|x| {
                let flags = x.module_flags();
                extract_level >= 2 || !(flags.hidden() || flags.non_working())
            })
            .collect();
        result.sort_by_key(|x| x.id());
        result
    }

    pub fn print_module_list(&self, session: &mut Session) {
        let level = session.options().extract_level();
        for info in self.list(level) {
            let description = match info.description() {
                "" => "-",
                x => x,
            };
            session.msg(&format!("{:<14} {description}", info.id()));
        }
    }

    /// Applies the comma-separated module filters.
    ///
    /// Modules named in `disable`, or left out of `only`, are removed.
    /// Modules named in `nodetect`, or left out of `onlydetect`, are never
    /// autodetected.
    pub fn apply_filters(
        &mut self,
        disable: Option<&str>,
        only: Option<&str>,
        nodetect: Option<&str>,
        onlydetect: Option<&str>,
    ) {
        fn named(list: Option<&str>, info: &ModuleInfo) -> Option<bool> {
            list.map(|x| {
                x.split(',')
                    .map(str::trim)
                    .filter(|x| !x.is_empty())
                    .any(|x| info.answers_to(x))
            })
        }

        self.modules.retain(|x| {
            let keep = named(disable, x) != Some(true) && named(only, x) != Some(false);
            if !keep {
                tracing::debug!("disabled module {}", x.id());
            }
            keep
        });

        for info in &mut self.modules {
            if named(nodetect, info) == Some(true) || named(onlydetect, info) == Some(false) {
                tracing::debug!("disabled detection for module {}", info.id());
                info.add_flags(ModuleFlags::DISABLE_DETECT);
            }
        }
    }
}
