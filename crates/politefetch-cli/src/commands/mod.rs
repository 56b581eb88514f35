/// CLI subcommand argument definitions and implementations.
pub mod canonicalize;
pub mod fetch;
pub mod paginate;
pub mod validate;
