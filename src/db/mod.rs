pub mod mysql;
pub mod source;

pub use mysql::{create_pool, MySqlSource};
pub use source::{DataSource, StaticSource};
