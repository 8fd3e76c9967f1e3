pub mod resolve;
pub mod update;

pub use resolve::{resolve_binary, resolve_binary_path, resolve_json, Resolver};
pub use update::{
    GlobalUpdateOutcome, PatchUpdateOutcome, StackProgress, StackUpdater, UpdateEnvironment,
};
