pub mod deepseek;
pub mod error;
pub mod traits;
pub mod util;

pub use deepseek::DeepSeek;
pub use error::{AiError, Result};
pub use traits::Completion;
pub use util::{strip_code_blocks, truncate_chars};
