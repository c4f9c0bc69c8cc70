//! Provider stream handling: frame normalization and the per-turn state machine.

pub mod machine;
pub mod normalize;

pub use machine::{Step, StreamMachine, StreamOutput};
pub use normalize::{error_text_from_raw, normalize};
