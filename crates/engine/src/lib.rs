//! Notification dispatch core: the user directory, the dispatcher that fans
//! requests out to channel queues, and the retry policy applied on delivery.

pub mod delivery;
pub mod directory;
pub mod dispatch;

pub use delivery::{MAX_DELIVERY_ATTEMPTS, RetryDecision, RetryingHandler};
pub use directory::{
    DirectoryError, NewUser, SharedDirectory, UserDirectory, UserFilter, UserPatch,
};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};
