pub mod buffer;
pub mod config;
pub mod cursor;
pub mod markdown;
pub mod mode;
pub mod note_list;
