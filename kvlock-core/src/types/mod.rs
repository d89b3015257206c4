mod primitives;
mod user;

pub use primitives::{FencingToken, KEY_PREFIX, LockKey};
pub use user::{NewUser, mask_username, RegisterRequest, UpdateUserRequest, User, UserProfile};
