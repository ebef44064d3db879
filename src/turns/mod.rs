//! Turn chain controller.
//!
//! A turn is one student interaction. Its kind fixes a pipeline of prompt
//! stages; each stage is streamed through the orchestrator and its fragment
//! merged onto a single [`TurnResult`].

mod controller;
mod core;
mod types;


pub use self::core::TurnCore;
pub use controller::TurnController;
pub use types::{PublicTurn, TurnInput, TurnKind, TurnResult};
