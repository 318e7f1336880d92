pub mod detail;
pub mod event;
pub mod filter;
pub mod result;

pub use detail::*;
pub use event::*;
pub use filter::*;
pub use result::*;
