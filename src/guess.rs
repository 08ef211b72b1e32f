use crate::{dbuf::ByteSource, module::ModuleInfo, registry::Registry, session::Session, Error, Result};

/// A score at which a module is taken as certain, and detection stops early.
const CERTAIN: u8 = 100;

/// Picks the module most confident that it can handle `input`.
///
/// Every eligible module's identify function is called in registration
/// order, and the first module with the strictly highest score wins.
/// Modules with detection disabled are still consulted when they share
/// their detection with another module, but never win.
///
/// An identify function that reports an error aborts detection.
pub fn detect<'r>(
    registry: &'r Registry,
    session: &mut Session,
    input: &ByteSource<'_>,
) -> Result<Option<&'r ModuleInfo>> {
    session.detection_mut().has_utf8_bom = input.has_utf8_bom(0);

    let mut best: Option<(&ModuleInfo, u8)> = None;
    for info in registry.modules() {
        let Some(identify) = info.identify_fn() else {
            continue;
        };
        let flags = info.module_flags();
        if flags.disable_detect() && !flags.shared_detection() {
            continue;
        }

        let errors = session.errors();
        let score = identify(session, input);
        if session.errors() > errors {
            tracing::debug!("module {} reported an error during detection", info.id());
            return Err(Error::DetectionFailed);
        }
        if flags.disable_detect() || score == 0 {
            continue;
        }

        tracing::trace!("module {} scored {score}", info.id());
        if best.map_or(true, |(_, x)| score > x) {
            best = Some((info, score));
            if score >= CERTAIN {
                break;
            }
        }
    }

    if let Some((info, score)) = best {
        tracing::debug!("detected module {} with score {score}", info.id());
    }
    Ok(best.map(|(info, _)| info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        module::{ModuleFlags, ModuleParams},
        session::{MemoryHandler, Options},
    };
    use core::cell::Cell;

    thread_local! {
        static CALLS: Cell<u32> = const { Cell::new(0) };
    }

    fn run_nothing(_: &mut Session, _: &ByteSource<'_>, _: &ModuleParams) -> Result<()> {
        Ok(())
    }

    fn score_40(_: &mut Session, _: &ByteSource<'_>) -> u8 {
        CALLS.with(|x| x.set(x.get() + 1));
        40
    }

    fn score_60(_: &mut Session, _: &ByteSource<'_>) -> u8 {
        CALLS.with(|x| x.set(x.get() + 1));
        60
    }

    fn score_100(_: &mut Session, _: &ByteSource<'_>) -> u8 {
        CALLS.with(|x| x.set(x.get() + 1));
        100
    }

    fn score_failing(session: &mut Session, _: &ByteSource<'_>) -> u8 {
        session.err("bad input");
        90
    }

    fn module(id: &'static str, identify: crate::module::IdentifyFn) -> ModuleInfo {
        ModuleInfo::new(id, "", run_nothing).identify(identify)
    }

    fn quiet_session() -> Session {
        Session::with_handler(Options::default(), Box::new(MemoryHandler::default()))
    }

    #[test]
    fn highest_first_wins() -> anyhow::Result<()> {
        let mut registry = Registry::new();
        registry.register(module("low", score_40))?;
        registry.register(module("high", score_60))?;
        registry.register(module("tie", score_60))?;
        registry.register(ModuleInfo::new("none", "", run_nothing))?;

        let input = ByteSource::from_vec(b"\xEF\xBB\xBFtext".to_vec());
        let mut session = quiet_session();
        let found = detect(&registry, &mut session, &input)?;
        assert_eq!(found.map(ModuleInfo::id), Some("high"));
        assert!(session.detection().has_utf8_bom);

        let again = detect(&registry, &mut session, &input)?;
        assert_eq!(again.map(ModuleInfo::id), Some("high"));
        Ok(())
    }

    #[test]
    fn certain_score_stops_early() -> anyhow::Result<()> {
        let mut registry = Registry::new();
        registry.register(module("sure", score_100))?;
        registry.register(module("later", score_40))?;

        CALLS.with(|x| x.set(0));
        let mut session = quiet_session();
        let found = detect(&registry, &mut session, &ByteSource::membuf())?;
        assert_eq!(found.map(ModuleInfo::id), Some("sure"));
        assert_eq!(CALLS.with(Cell::get), 1);
        Ok(())
    }

    #[test]
    fn disabled_detection() -> anyhow::Result<()> {
        let mut registry = Registry::new();
        registry.register(module("off", score_100).flags(ModuleFlags::DISABLE_DETECT))?;
        registry.register(
            module("shared", score_100)
                .flags(ModuleFlags::DISABLE_DETECT | ModuleFlags::SHARED_DETECTION),
        )?;
        registry.register(module("on", score_40))?;

        CALLS.with(|x| x.set(0));
        let mut session = quiet_session();
        let found = detect(&registry, &mut session, &ByteSource::membuf())?;
        assert_eq!(found.map(ModuleInfo::id), Some("on"));
        assert_eq!(CALLS.with(Cell::get), 2);
        Ok(())
    }

    #[test]
    fn identify_errors_abort() -> anyhow::Result<()> {
        let mut registry = Registry::new();
        registry.register(module("fails", score_failing))?;
        registry.register(module("fine", score_60))?;

        let mut session = quiet_session();
        let result = detect(&registry, &mut session, &ByteSource::membuf());
        assert!(matches!(result, Err(Error::DetectionFailed)));
        Ok(())
    }

    #[test]
    fn nothing_matches() -> anyhow::Result<()> {
        let registry = Registry::new();
        let mut session = quiet_session();
        assert!(detect(&registry, &mut session, &ByteSource::membuf())?.is_none());
        Ok(())
    }
}
