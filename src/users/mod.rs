mod memory;
mod pg;
mod repo;
mod repo_types;

pub use memory::MemoryUserStore;
pub use pg::PgUserStore;
pub use repo::{StoreError, UserStore};
pub use repo_types::User;
