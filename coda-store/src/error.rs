use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-agnostic error kinds shared by the node components.
///
/// The gateway maps each variant to a stable HTTP status; inside the store
/// any error rolls the surrounding transaction back before it propagates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("sync in progress for {0}")]
    Locked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("requested byte range not satisfiable")]
    RangeNotSatisfiable,

    /// The sync source reported a clock behind our own; importing would
    /// rewind the user.
    #[error("sync source clock {remote_clock} is behind local clock {local}")]
    Regression { remote_clock: i64, local: i64 },

    /// The export window does not start exactly one past our local clock.
    /// Accepting it would leave a gap that clock-record uniqueness makes
    /// unrepairable, so the import is refused.
    #[error("export window starts at clock {got}, expected {expected}")]
    NonContiguous { expected: u64, got: u64 },

    /// A clock record for `(user_uuid, clock)` already exists. The write
    /// path retries at a higher layer; in steady state the sync lock keeps
    /// this from happening.
    #[error("clock conflict for user {user_uuid} at clock {clock}")]
    ClockConflict { user_uuid: Uuid, clock: u64 },

    #[error("upstream fetch failed: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

macro_rules! internal_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Error {
                fn from(value: $t) -> Self {
                    Error::Internal(anyhow::Error::new(value))
                }
            }
        )*
    };
}

internal_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    postcard::Error,
    std::io::Error,
);
