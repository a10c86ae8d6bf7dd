pub mod codec;
pub mod filemap;
pub mod path_resolver;
pub mod prompt;
pub mod update_review;
pub mod write_back;
