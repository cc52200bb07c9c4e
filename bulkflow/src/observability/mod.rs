//! Observability utilities: diagnostic log installation and stage timing.

mod logging;
mod timer;

pub use logging::{default_filter, init_file_logging};
pub use timer::SpanTimer;
