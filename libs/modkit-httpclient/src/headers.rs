use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Ordered header list shared by requests and responses.
///
/// Duplicates are kept in insertion order. Names are compared
/// case-insensitively; `HeaderName` already stores them in lower case.
///
/// The full interleaving (`a`, `b`, `a`) is what [`MockBackend`](crate::MockBackend)
/// records. The hyper backend writes through an `http::HeaderMap`, which
/// groups values by name in first-seen order, so it sends `a`, `a`, `b`.
/// The order of values within one name is kept either way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// First value recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// First value for `name` as a string, if it is visible ASCII.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values recorded for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values grouped by name, names in first-seen order.
    pub(crate) fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        // HeaderMap iterates every value, repeating the name for duplicates.
        let entries = map.iter().map(|(n, v)| (n.clone(), v.clone())).collect();
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a HeaderName, &'a HeaderValue);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (HeaderName, HeaderValue)>,
        fn(&'a (HeaderName, HeaderValue)) -> (&'a HeaderName, &'a HeaderValue),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn sample() -> Headers {
        let mut headers = Headers::new();
        headers.push(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/plain"),
        );
        headers.push(
            HeaderName::from_static("link"),
            HeaderValue::from_static("</a>; rel=\"first\""),
        );
        headers.push(
            HeaderName::from_static("link"),
            HeaderValue::from_static("</b>; rel=\"second\""),
        );
        headers
    }

    #[test]
    fn test_header_map_groups_by_name_in_first_seen_order() {
        let mut headers = Headers::new();
        for (name, value) in [("x-a", "1"), ("x-b", "2"), ("x-a", "3")] {
            headers.push(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        let map = headers.to_header_map();
        let written: Vec<_> = map
            .iter()
            .map(|(n, v)| format!("{n}={}", v.to_str().unwrap()))
            .collect();
        assert_eq!(written, vec!["x-a=1", "x-a=3", "x-b=2"]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = sample();
        assert_eq!(headers.get_str("ACCEPT"), Some("text/plain"));
        assert!(headers.contains("Link"));
        assert!(!headers.contains("content-type"));
    }

    #[test]
    fn test_duplicates_keep_order() {
        let headers = sample();
        let links: Vec<_> = headers
            .get_all("LINK")
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(links, vec!["</a>; rel=\"first\"", "</b>; rel=\"second\""]);
        assert_eq!(headers.get_str("link"), Some("</a>; rel=\"first\""));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_header_map_conversion_keeps_duplicates() {
        let headers = sample();
        let map = headers.to_header_map();
        assert_eq!(map.get_all("link").iter().count(), 2);

        let back = Headers::from(&map);
        assert_eq!(back.len(), 3);
        assert_eq!(back.get_all("link").count(), 2);
    }
}
