//! Clock port so window boundaries can be driven deterministically in tests.

use crate::domain::foundation::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
