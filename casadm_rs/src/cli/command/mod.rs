//! Command and option model.
//!
//! The grammar engine works on static descriptions of commands and their
//! options. It is modularized as follows:
//!
//! - `types`: option, namespace and command descriptors, flag sets, [`App`]
//! - `parsed`: [`ParseState`], the per-invocation "was supplied" record
//! - `validate`: uniqueness and capacity checks over a catalogue

mod parsed;
mod types;
mod validate;

pub use parsed::ParseState;
pub use types::{
    App, Arity, CommandBody, CommandFlags, CommandHandler, CommandSpec, Configure, HelpPrinter,
    MAX_NAMESPACE_OPTIONS, NamespaceEntry, NamespaceHandler, NamespaceSpec, OptionFlags,
    OptionHandler, OptionSpec, Output,
};
pub(crate) use types::bracket_name;
pub use validate::{ModelError, validate};
