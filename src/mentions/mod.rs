//! Mention pipeline: scan draft text, suggest targets, apply selections.
//!
//! Submitted drafts feed [`crate::fanout`] and, when the assistant is
//! mentioned, [`crate::assistant`].

mod applier;
mod resolver;
mod scanner;
mod session;

pub use applier::*;
pub use resolver::*;
pub use scanner::*;
pub use session::*;
