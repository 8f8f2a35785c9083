pub mod clock;
pub mod compositor;
pub mod error;
pub mod frame;
pub mod merge;
pub mod mixer;
pub mod probe;
pub mod progress;
pub mod sink;
pub mod source;
pub mod transition;

pub use error::{ErrorKind, RenderError, Result};
pub use merge::{merge, merge_with, MergeOutput};
