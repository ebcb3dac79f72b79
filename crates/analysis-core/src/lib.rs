pub mod analytics;
pub mod error;
pub mod stats;
pub mod traits;
pub mod types;

pub use analytics::*;
pub use error::*;
pub use traits::*;
pub use types::*;
