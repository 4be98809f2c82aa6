//! Aggregate call profiling.
//!
//! Every callable wrapped with [`profile`] samples into one
//! [`ProfileSession`]: a call enables sampling, runs the target, disables
//! sampling and prints the accumulated statistics sorted by self time.
//! Code inside a wrapped call can mark nested units with
//! [`ProfileSession::enter`] or [`profile_scope!`](crate::profile_scope).

mod clock;
mod session;

pub use clock::Clock;
pub use session::{ProfileSession, ScopeGuard};

use crate::report::Unit;
use std::panic::Location;

impl ProfileSession {
    /// Wrap `f` so every call is sampled into this session.
    ///
    /// The unit is labelled with `name` and the location of this call.
    #[track_caller]
    pub fn wrap<A, R, F>(&self, name: &str, f: F) -> impl Fn(A) -> R + use<A, R, F>
    where
        F: Fn(A) -> R,
    {
        let location = Location::caller();
        let unit = Unit::new(name, location.file(), location.line());
        let session = self.clone();
        move |args: A| session.run(&unit, || f(args))
    }
}

/// Wrap `f` so every call is sampled into `session`
#[track_caller]
pub fn profile<A, R, F>(
    session: &ProfileSession,
    name: &str,
    f: F,
) -> impl Fn(A) -> R + use<A, R, F>
where
    F: Fn(A) -> R,
{
    session.wrap(name, f)
}

/// Record the rest of the enclosing block as a unit of a session.
///
/// `profile_scope!("name")` uses the global session.
#[macro_export]
macro_rules! profile_scope {
    ($name:expr) => {
        let _callwrap_scope = $crate::profile::ProfileSession::global().enter($name);
    };
    ($session:expr, $name:expr) => {
        let _callwrap_scope = $session.enter($name);
    };
}
