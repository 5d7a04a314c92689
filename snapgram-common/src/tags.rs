/// Normalizes a comma separated tag string.
///
/// All whitespace is dropped, including whitespace inside a tag, and empty
/// segments are skipped. Order is preserved.
#[must_use]
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.split(',')
        .map(|segment| segment.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|tag| !tag.is_empty())
        .collect()
}
