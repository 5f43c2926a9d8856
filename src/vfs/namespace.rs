//! Entry-name assignment over the raw document listing.
//!
//! Titles are not unique and may be empty, so every enumeration builds a
//! fresh `NameMapping` that gives each document exactly one name. The
//! table is immutable once built; `RootDir` publishes it atomically and
//! replaces it wholesale on the next enumeration.

use std::collections::HashMap;

use crate::store::client::DocumentSummary;

/// One generation of the name <-> id table.
#[derive(Debug, Default)]
pub struct NameMapping {
    by_name: HashMap<String, String>, // entry name -> document id
    order: Vec<String>,               // names in listing order
}

impl NameMapping {
    /// Assign a unique name to every summary, processing in listing
    /// order (server history order). The candidate name is the title;
    /// on collision a `(k)` suffix is appended for k = 1, 2, ... until
    /// the name is free. Titles compare byte-for-byte, and an empty
    /// title is an ordinary base name. `reserved` names count as taken
    /// from the start (the caller's fixed entries) and are never
    /// assigned to a document.
    pub fn assign(summaries: &[DocumentSummary], reserved: &[&str]) -> Self {
        let mut by_name = HashMap::with_capacity(summaries.len());
        let mut order = Vec::with_capacity(summaries.len());
        for doc in summaries {
            let mut name = doc.title.clone();
            let mut k = 1u32;
            while by_name.contains_key(&name) || reserved.contains(&name.as_str()) {
                name = format!("{}({})", doc.title, k);
                k += 1;
            }
            by_name.insert(name.clone(), doc.id.clone());
            order.push(name);
        }
        Self { by_name, order }
    }

    pub fn id_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Reverse direction, derived by scan; only diagnostics need it.
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, v)| v.as_str() == id)
            .map(|(k, _)| k.as_str())
    }

    /// Entry names in listing order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str) -> DocumentSummary {
        DocumentSummary {
            id: id.to_string(),
            title: title.to_string(),
            time: 0,
            tags: Vec::new(),
        }
    }

    #[test]
    fn unique_titles_map_verbatim() {
        let mapping = NameMapping::assign(&[doc("1", "a"), doc("2", "b")], &[]);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.id_of("a"), Some("1"));
        assert_eq!(mapping.id_of("b"), Some("2"));
        assert_eq!(mapping.names(), ["a", "b"]);
    }

    #[test]
    fn duplicate_titles_get_suffixes_in_listing_order() {
        let mapping = NameMapping::assign(&[doc("1", "x"), doc("2", "x")], &[]);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.id_of("x"), Some("1"));
        assert_eq!(mapping.id_of("x(1)"), Some("2"));

        // Reversing the listing moves the bare name to the other copy.
        let mapping = NameMapping::assign(&[doc("2", "x"), doc("1", "x")], &[]);
        assert_eq!(mapping.id_of("x"), Some("2"));
        assert_eq!(mapping.id_of("x(1)"), Some("1"));
    }

    #[test]
    fn triple_collision_counts_up() {
        let mapping = NameMapping::assign(&[doc("1", "x"), doc("2", "x"), doc("3", "x")], &[]);
        assert_eq!(mapping.id_of("x"), Some("1"));
        assert_eq!(mapping.id_of("x(1)"), Some("2"));
        assert_eq!(mapping.id_of("x(2)"), Some("3"));
    }

    #[test]
    fn empty_titles_are_valid_and_disambiguated() {
        let mapping = NameMapping::assign(&[doc("1", ""), doc("2", "")], &[]);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.id_of(""), Some("1"));
        assert_eq!(mapping.id_of("(1)"), Some("2"));
    }

    #[test]
    fn suffixed_title_can_itself_collide() {
        // A real title equal to a generated suffix form still ends up unique.
        let mapping = NameMapping::assign(&[doc("1", "x"), doc("2", "x(1)"), doc("3", "x")], &[]);
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.id_of("x"), Some("1"));
        assert_eq!(mapping.id_of("x(1)"), Some("2"));
        assert_eq!(mapping.id_of("x(2)"), Some("3"));
    }

    #[test]
    fn mapping_size_equals_input_size() {
        let docs: Vec<_> = (0..50).map(|i| doc(&i.to_string(), "same")).collect();
        let mapping = NameMapping::assign(&docs, &[]);
        assert_eq!(mapping.len(), docs.len());
    }

    #[test]
    fn reserved_names_are_never_assigned() {
        let mapping = NameMapping::assign(&[doc("1", ".scratch"), doc("2", ".scratch")], &[".scratch"]);
        assert_eq!(mapping.id_of(".scratch"), None);
        assert_eq!(mapping.id_of(".scratch(1)"), Some("1"));
        assert_eq!(mapping.id_of(".scratch(2)"), Some("2"));
        assert_eq!(mapping.names(), [".scratch(1)", ".scratch(2)"]);
    }

    #[test]
    fn reverse_lookup_is_derived() {
        let mapping = NameMapping::assign(&[doc("1", "x"), doc("2", "x")], &[]);
        assert_eq!(mapping.name_of("2"), Some("x(1)"));
        assert_eq!(mapping.name_of("missing"), None);
    }
}
