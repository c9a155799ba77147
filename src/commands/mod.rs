// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports relay, store, and validate

pub mod relay;
pub mod store;
pub mod validate;

pub use relay::RelayOptions;
pub use store::StoreOptions;
pub use validate::ValidationSummary;
