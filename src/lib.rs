mod error;
mod kdt;
mod midi_exporter;
mod model;
mod mute;
mod report;
mod util;

pub use error::*;
pub use kdt::container::*;
pub use kdt::cursor::*;
pub use kdt::opcode;
pub use midi_exporter::*;
pub use model::config::*;
pub use model::event::*;
pub use mute::*;
pub use report::*;
pub use util::*;
