// Collaborator contracts and their HTTP / in-memory backends.

pub mod history;
pub mod http_source;
pub mod traits;
