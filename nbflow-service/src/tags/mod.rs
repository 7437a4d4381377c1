// Tags Module
// String tag encoding of the step graph

pub mod codec;
pub mod names;

pub use codec::{decode, encode, StepTag, StepTags};
pub use names::{is_assignable_name, is_reserved_name, is_valid_step_name, RESERVED_NAMES, SKIP};
