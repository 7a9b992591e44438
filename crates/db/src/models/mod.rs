pub mod app;
pub mod event_outbox;
pub mod ids;
pub mod note;
pub mod release_train;
pub mod stop;
