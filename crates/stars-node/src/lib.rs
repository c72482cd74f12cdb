//! A full STaRS node: C1-C6 wired together behind one cooperative event
//! loop, plus the `Transport`/`Overlay`/`Executor` boundary it is driven
//! through (spec.md §5-§6).
//!
//! - [`node`] -- [`node::Node`], [`node::NodeEffect`].
//! - [`message`] -- [`message::Message`], the wire envelope tagging every
//!   payload type the other crates define.
//! - [`traits`] -- [`traits::Transport`], [`traits::Overlay`],
//!   [`traits::Executor`].
//! - [`error`] -- [`error::NodeError`].
//! - [`testkit`] -- in-process doubles used by this crate's own tests.

pub mod error;
pub mod message;
pub mod node;
pub mod testkit;
pub mod traits;

pub use error::NodeError;
pub use message::Message;
pub use node::{Node, NodeEffect};
pub use traits::{Executor, Overlay, Transport};
