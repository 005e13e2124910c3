pub mod record;
pub mod snapshot;
pub mod store;
