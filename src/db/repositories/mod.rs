pub mod runs;
pub mod users;

pub use users::UserCredentials;
