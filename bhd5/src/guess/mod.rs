//! File-type/folder/name inference engine.

pub mod ext;
pub mod folder;
pub mod name;
