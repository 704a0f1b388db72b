//! Engine dispatch macros.
//!
//! The three SQL variants of `DbPool` expose the same sqlx API over different
//! concrete pool types, so most operations are written once and expanded into
//! one match arm per variant. The document-store variant always gets its own
//! arm.

/// Expand explicit match arms over `DbPool` variants.
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     Postgres(p) => pg_thing(p),
///     MySql(p) => mysql_thing(p),
///     SQLite(p) => sqlite_thing(p),
///     Mongo(m) => mongo_thing(m),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Run the same body against whichever sqlx pool `$pool` holds; the
/// document-store variant takes the separate `Mongo` arm.
///
/// ```ignore
/// sql_dispatch!(pool, p => sqlx::query("SELECT 1").execute(p).await.map(|_| ()),
///     Mongo(m) => ping(m).await)
/// ```
#[macro_export]
macro_rules! sql_dispatch {
    ($pool:expr, $p:ident => $body:expr, Mongo($m:ident) => $mongo:expr $(,)?) => {
        $crate::impl_db_dispatch!($pool, {
            Postgres($p) => $body,
            MySql($p) => $body,
            SQLite($p) => $body,
            Mongo($m) => $mongo,
        })
    };
}

pub use impl_db_dispatch;
pub use sql_dispatch;
