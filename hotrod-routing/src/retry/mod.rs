mod retry_policy;

pub use self::retry_policy::*;
