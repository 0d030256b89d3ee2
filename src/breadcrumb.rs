use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub label: String,
    pub href: String,
    pub active: bool,
}

/// Splits a navigation path into cumulative, clickable segments.
///
/// Empty components are skipped. `raw_query` (when non-empty) is appended to
/// every href so sort state survives navigation. Only the last segment is active.
pub fn build(nav_path: &str, raw_query: &str) -> Vec<Segment> {
    let components: Vec<&str> = nav_path.split('/').filter(|c| !c.is_empty()).collect();
    let last = components.len().saturating_sub(1);

    let mut prefix = String::new();
    components
        .iter()
        .enumerate()
        .map(|(i, component)| {
            prefix.push('/');
            prefix.push_str(&urlencoding::encode(component));
            let href = if raw_query.is_empty() {
                prefix.clone()
            } else {
                format!("{prefix}?{raw_query}")
            };
            Segment {
                label: component.to_string(),
                href,
                active: i == last,
            }
        })
        .collect()
}
