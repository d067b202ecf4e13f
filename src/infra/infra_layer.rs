// The infra module contains implementations of core traits.
// Each port gets its own submodule.

#[path = "i18n/mod.rs"]
pub mod i18n;

#[path = "plugins/directory_source.rs"]
pub mod plugins;

#[path = "reporting/mod.rs"]
pub mod reporting;
