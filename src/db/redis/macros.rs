/// Read-through caching for fallible async lookups.
///
/// Returns the cached value for `$key` when present. Otherwise awaits `$block`, queues
/// its `Ok` value for a background write with the key's TTL, and returns it. Errors
/// from the block are returned as-is and never cached.
///
/// # Example
/// ```rust,ignore
/// let record: ContentRecord = cached!(self.cache, key, async move {
///     self.fetch_movie(id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await? {
            Some(hit) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(hit)
            }
            None => {
                tracing::debug!(key = %key, "Cache miss");
                let value = $block.await?;
                $cache.set_in_background(&key, &value);
                Ok(value)
            }
        }
    }};
}
