//! Page templates and the data envelopes rendered into them.

pub mod templates;
pub mod views;
