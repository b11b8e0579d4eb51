//! Well-known RDF namespaces and URI shortening.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// The `rdf:type` predicate.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Namespace prefix whose classes and predicates get unqualified names.
pub const DEFAULT_NAMESPACE: &str = "cpmeta";

/// Prefix to namespace URI. Longer URIs are tried first when shortening.
pub static NAMESPACES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
        ("owl", "http://www.w3.org/2002/07/owl#"),
        ("cpmeta", "http://meta.icos-cp.eu/ontologies/cpmeta/"),
        ("prov", "http://www.w3.org/ns/prov#"),
        ("purl", "http://purl.org/dc/terms/"),
        ("dcat", "http://www.w3.org/ns/dcat#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("wdcgg", "http://meta.icos-cp.eu/resources/wdcgg/"),
        ("ssn", "http://www.w3.org/ns/ssn/"),
    ]
    .into_iter()
    .collect()
});

/// Shortens a URI to `prefix:local` form when its namespace is known.
///
/// Unknown namespaces are returned unchanged.
pub fn shorten_uri(uri: &str) -> String {
    match split_known(uri) {
        Some((prefix, local)) => format!("{prefix}:{local}"),
        None => uri.to_string(),
    }
}

/// Returns the namespace prefix of a URI, or an empty string if unknown.
pub fn namespace_of(uri: &str) -> &'static str {
    split_known(uri).map(|(prefix, _)| prefix).unwrap_or("")
}

/// Local name of a URI: the part after the last `#` or `/`.
pub fn local_name(uri: &str) -> &str {
    uri.rsplit(['#', '/']).next().unwrap_or(uri)
}

/// Splits a `prefix:local` short name. Full URIs yield an empty prefix.
pub fn split_short_name(short: &str) -> (&str, &str) {
    if short.contains("://") {
        return ("", local_name(short));
    }
    match short.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", short),
    }
}

fn split_known(uri: &str) -> Option<(&'static str, &str)> {
    NAMESPACES
        .iter()
        .filter(|(_, ns)| uri.starts_with(**ns))
        .max_by_key(|(_, ns)| ns.len())
        .map(|(prefix, ns)| (*prefix, &uri[ns.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_known_namespace() {
        assert_eq!(
            shorten_uri("http://meta.icos-cp.eu/ontologies/cpmeta/Station"),
            "cpmeta:Station"
        );
        assert_eq!(shorten_uri(RDF_TYPE), "rdf:type");
        assert_eq!(shorten_uri("http://example.org/x"), "http://example.org/x");
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(namespace_of("http://www.w3.org/ns/prov#endedAtTime"), "prov");
        assert_eq!(namespace_of("http://example.org/x"), "");
    }

    #[test]
    fn test_local_name_and_split() {
        assert_eq!(local_name("http://example.org/a/b#hasName"), "hasName");
        assert_eq!(local_name("http://example.org/a/hasName"), "hasName");
        assert_eq!(split_short_name("prov:Activity"), ("prov", "Activity"));
        assert_eq!(split_short_name("http://example.org/Thing"), ("", "Thing"));
        assert_eq!(split_short_name("Thing"), ("", "Thing"));
    }
}
