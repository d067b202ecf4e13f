// poise glue: shared data, hooks, locale lookup and the paginator view.

pub mod bot_builder;
pub mod data;
pub mod hooks;
pub mod locale_context;
pub mod paginator_view;
