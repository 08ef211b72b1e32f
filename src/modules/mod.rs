//! The built-in format modules.
//!
//! Each submodule exposes constructors returning a [`ModuleInfo`], and
//! [`builtins`] gathers them in registration order. Registration order
//! matters to autodetection: among equal scores the earlier module wins.

mod applesd;
mod misc;
mod unsupported;
mod zlib;

use crate::module::ModuleInfo;

/// Every built-in module, in registration order.
#[must_use]
pub fn builtins() -> Vec<ModuleInfo> {
    vec![
        misc::copy(),
        misc::null(),
        misc::crc(),
        misc::hexdump(),
        zlib::zlib(),
        applesd::applesingle(),
        applesd::appledouble(),
        unsupported::unsupported(),
    ]
}
