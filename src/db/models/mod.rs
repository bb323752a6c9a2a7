pub mod run;
pub mod user;

pub use run::{Run, RunStop};
pub use user::User;
