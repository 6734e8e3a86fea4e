//! Hardware sensor polling. Each sensor gates itself on its own timer and
//! returns `Some` only when there is something new for the runtime to
//! publish.

pub mod climate;
pub mod illuminance;
pub mod pir;
