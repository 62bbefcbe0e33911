pub mod accounts;
pub mod atomic;
pub mod templates;

pub use accounts::{Account, AccountDirectory, AccountStatus, FileAccountStore, MemoryAccountStore};
pub use templates::{FileTemplateStore, MemoryTemplateStore, TemplateStore};
