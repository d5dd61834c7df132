pub mod logging;
pub mod progress;
pub mod shutdown;
pub mod types;
pub mod utils;

pub use logging::*;
pub use progress::*;
pub use shutdown::*;
pub use types::*;
pub use utils::*;
