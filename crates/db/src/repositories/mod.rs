//! Repositories: zero-sized structs with async methods over `&PgPool`.

pub mod alert_repo;
pub mod dead_letter_repo;
pub mod template_repo;

pub use alert_repo::AlertRepo;
pub use dead_letter_repo::DeadLetterRepo;
pub use template_repo::TemplateRepo;
