mod buffer_pool_manager;
mod frame;
mod lru_k_replacer;
mod page_guard;

pub use buffer_pool_manager::*;
pub use frame::*;
pub use lru_k_replacer::*;
pub use page_guard::*;
