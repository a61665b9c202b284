/// Picks the entry with the fewest active jobs.
///
/// Ties go to the lexicographically smallest endpoint, whatever order the
/// entries arrive in. Returns `None` for an empty pool.
///
/// # Example
///
/// ```
/// use mxrpc_dispatcher::select_least_busy;
///
/// let pool = [("w2:5002", 1), ("w1:5001", 3), ("w3:5003", 1)];
/// assert_eq!(select_least_busy(pool), Some("w2:5002"));
/// ```
pub fn select_least_busy<'a, I>(entries: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, usize)>,
{
    entries
        .into_iter()
        .min_by(|(ea, ja), (eb, jb)| ja.cmp(jb).then_with(|| ea.cmp(eb)))
        .map(|(endpoint, _)| endpoint)
}
