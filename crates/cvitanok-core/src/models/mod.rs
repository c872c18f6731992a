pub mod user;

pub use user::{Entity as User, UserCreate, UserRead, UserUpdate};
