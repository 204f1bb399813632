mod dest;
mod error;
mod registry;
mod resolver;
mod session;

#[cfg(feature = "stats")]
mod session_stats;

pub use dest::{Many, ManyShared, ManySlot, One, OneShared, OneSlot};
pub use error::{BoxError, LoadError};
pub use registry::Registry;
pub use resolver::{Entity, EntityValue, IntoResolver, Key, ResolverOutput};
pub use session::Loader;

#[doc(hidden)]
pub use resolver::{Bare, Registered, WithCtx, WithCtxAndLoader, WithLoader};
