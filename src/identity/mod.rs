pub mod memory;
pub mod pg;
pub mod record;
pub mod store;

pub use record::{Identity, IdentityKind, PublicIdentity};
pub use store::{IdentityStore, NewIdentity, StoreError};
