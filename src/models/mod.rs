//! Data models for the EduHive backend.
//!
//! Wire names are camelCase to match the web client.

mod attachment;
mod feed;
mod mention;
mod notification;
mod post;
mod profile;

pub use attachment::*;
pub use feed::*;
pub use mention::*;
pub use notification::*;
pub use post::*;
pub use profile::*;
