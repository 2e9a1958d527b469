pub(crate) mod record;
pub mod value;

pub use record::Record;
