/// Display name of a cited document: the last `/`-separated segment of its
/// source path.
///
/// Sources come from the ingestion side as whatever path the loader saw, so
/// Windows separators are folded too.
pub fn format_source(source: &str) -> &str {
    source
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}
