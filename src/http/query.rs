//! Ordered multimap for query parameters and headers.

use smallvec::SmallVec;

/// An insertion-ordered string multimap.
///
/// Used for query parameters and header collections; both allow repeated
/// names. Storage is inline for up to eight pairs, which covers typical
/// requests without touching the heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: SmallVec<[(String, String); 8]>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a pair, keeping any existing pairs with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every pair named `name` with the single given value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.push((name.to_string(), value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// First value for `name`, compared ASCII case-insensitively. Header
    /// names arrive on the wire in whatever case the peer chose.
    pub fn get_ignore_ascii_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'map>(&'map self, name: &'map str) -> impl Iterator<Item = &'map str> {
        self.entries
            .iter()
            .filter(move |(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Decode an `application/x-www-form-urlencoded` string.
    pub fn from_url_encoded(input: &str) -> Self {
        let mut map = Self::new();
        for (name, value) in url::form_urlencoded::parse(input.as_bytes()) {
            map.add(name.into_owned(), value.into_owned());
        }
        map
    }

    /// Encode back to `application/x-www-form-urlencoded`, preserving pair
    /// order. Decoding the result yields an equal map.
    pub fn to_url_encoded(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.iter() {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }
}

impl<'map> IntoIterator for &'map ParamMap {
    type Item = (&'map str, &'map str);
    type IntoIter = Box<dyn Iterator<Item = (&'map str, &'map str)> + 'map>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_duplicates_in_order() {
        let mut map = ParamMap::new();
        map.add("tag", "a");
        map.add("tag", "b");
        map.add("other", "c");
        assert_eq!(map.get("tag"), Some("a"));
        assert_eq!(map.get_all("tag").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn set_replaces_all_occurrences() {
        let mut map = ParamMap::new();
        map.add("tag", "a");
        map.add("tag", "b");
        map.set("tag", "z");
        assert_eq!(map.get_all("tag").collect::<Vec<_>>(), ["z"]);
    }

    #[test]
    fn case_insensitive_lookup() {
        let mut map = ParamMap::new();
        map.add("Content-Length", "42");
        assert_eq!(map.get_ignore_ascii_case("content-length"), Some("42"));
        assert_eq!(map.get("content-length"), None);
    }

    #[test]
    fn decodes_url_encoding() {
        let map = ParamMap::from_url_encoded("name=hello%20world&empty=&a=1&a=2");
        assert_eq!(map.get("name"), Some("hello world"));
        assert_eq!(map.get("empty"), Some(""));
        assert_eq!(map.get_all("a").collect::<Vec<_>>(), ["1", "2"]);
    }

    #[test]
    fn encode_decode_round_trip_is_stable() {
        let original = ParamMap::from_url_encoded("q=rust+lang&page=2&tag=a&tag=b%26c");
        let encoded = original.to_url_encoded();
        let decoded = ParamMap::from_url_encoded(&encoded);
        assert_eq!(decoded, original);
        // A second pass over the canonical form is byte-identical.
        assert_eq!(decoded.to_url_encoded(), encoded);
    }
}
