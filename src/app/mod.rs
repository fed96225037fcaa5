//! Application runtime composition modules.

pub(crate) mod exit_handler;
pub(crate) mod runtime;
pub(crate) mod terminal;
pub(crate) mod validation;
