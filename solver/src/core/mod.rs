mod label;
mod labeled_values;
mod sat_int;

pub use label::*;
pub use labeled_values::*;
pub use sat_int::*;
