//! Command modules - one file per CLI command

pub mod completions;
pub mod gc;
pub mod hash;
pub mod inspect;
pub mod key;
pub mod publish;
pub mod show;
pub mod verify;
