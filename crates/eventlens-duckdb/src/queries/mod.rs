pub mod events;
pub mod sources;

use eventlens_core::store::SortSpec;

/// `ORDER BY` clause for `column`, tie-broken on insertion order in the same
/// direction. `column` must come from a fixed whitelist, never from input.
pub(crate) fn order_by(column: &str, sort: SortSpec) -> String {
    let direction = if sort.descending { "DESC" } else { "ASC" };
    format!("ORDER BY {column} {direction}, seq {direction}")
}
