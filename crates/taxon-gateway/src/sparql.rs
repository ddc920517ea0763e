//! SPARQL query construction and result parsing.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use taxon_core::gateway::{GatewayItem, TaxonomyItem};

use crate::Result;

const ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";
const ALIAS_SEPARATOR: char = '\u{1f}';

// ─── Query construction ──────────────────────────────────────────────────────

/// `Q` followed by one or more digits. Anything else never reaches a query.
pub(crate) fn is_item_id(id: &str) -> bool {
  id.strip_prefix('Q')
    .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Quote `value` as a SPARQL string literal.
pub(crate) fn literal(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for c in value.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '"' => out.push_str("\\\""),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}

fn language_list(language: &str) -> String {
  // Wikidata's label service walks the list left to right.
  if language == "en" { "en".to_owned() } else { format!("{language},en") }
}

/// Wrap a binding clause in the projection both queries share.
fn item_query(binding: &str, language: &str) -> String {
  let alias_language = literal(language);
  let label_languages = language_list(language);
  format!(
    r#"SELECT ?item ?itemLabel ?itemDescription ?commonsCategory ?coord ?area ?image
  (GROUP_CONCAT(DISTINCT ?alias; separator="\u001f") AS ?aliases)
  (GROUP_CONCAT(DISTINCT ?class; separator=" ") AS ?classes)
WHERE {{
{binding}
  OPTIONAL {{ ?item wdt:P625 ?coord. }}
  OPTIONAL {{ ?item p:P2046/psn:P2046/wikibase:quantityAmount ?area. }}
  OPTIONAL {{ ?item wdt:P18 ?image. }}
  OPTIONAL {{ ?item skos:altLabel ?alias. FILTER(LANG(?alias) = {alias_language}) }}
  OPTIONAL {{ ?item wdt:P31 ?class. }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "{label_languages}". }}
}}
GROUP BY ?item ?itemLabel ?itemDescription ?commonsCategory ?coord ?area ?image"#
  )
}

/// Look items up by id; their Commons category is optional.
pub(crate) fn items_query(ids: &[String], language: &str) -> String {
  let values: Vec<String> = ids.iter().map(|id| format!("wd:{id}")).collect();
  let binding = format!(
    "  VALUES ?item {{ {} }}\n  OPTIONAL {{ ?item wdt:P373 ?commonsCategory. }}",
    values.join(" ")
  );
  item_query(&binding, language)
}

/// Look items up by the Commons category (P373) that names them.
pub(crate) fn taxonomy_query(names: &[String], language: &str) -> String {
  let values: Vec<String> = names.iter().map(|n| literal(n)).collect();
  let binding = format!(
    "  VALUES ?commonsCategory {{ {} }}\n  ?item wdt:P373 ?commonsCategory.",
    values.join(" ")
  );
  item_query(&binding, language)
}

// ─── Result parsing ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct SparqlResponse {
  results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
  bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
  value: String,
}

/// One result row with convenient accessors.
struct Row<'a>(&'a HashMap<String, Binding>);

impl<'a> Row<'a> {
  fn get(&self, key: &str) -> Option<&'a str> {
    self
      .0
      .get(key)
      .map(|b| b.value.trim())
      .filter(|v| !v.is_empty())
  }

  fn item_id(&self) -> Option<&'a str> {
    self.get("item").and_then(|uri| uri.strip_prefix(ENTITY_PREFIX))
  }

  fn into_item(self, id: &str) -> GatewayItem {
    let (longitude, latitude) = self.get("coord").and_then(parse_point).unzip();

    GatewayItem {
      // The label service echoes the id back when no label exists.
      label:           self.get("itemLabel").filter(|l| *l != id).map(str::to_owned),
      description:     self.get("itemDescription").map(str::to_owned),
      aliases:         self
        .get("aliases")
        .map(|a| {
          a.split(ALIAS_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
        })
        .unwrap_or_default(),
      latitude,
      longitude,
      area_sqm:        self.get("area").and_then(|a| a.parse().ok()),
      image_url:       self.get("image").map(str::to_owned),
      instance_of_ids: self
        .get("classes")
        .map(|c| {
          c.split_whitespace()
            .map(|uri| uri.strip_prefix(ENTITY_PREFIX).unwrap_or(uri).to_owned())
            .collect()
        })
        .unwrap_or_default(),
      taxonomy_name:   self.get("commonsCategory").map(str::to_owned),
    }
  }
}

/// Parse a WKT `Point(lon lat)` literal.
fn parse_point(wkt: &str) -> Option<(f64, f64)> {
  let inner = wkt.trim().strip_prefix("Point(")?.strip_suffix(')')?;
  let mut parts = inner.split_whitespace();
  let lon = parts.next()?.parse().ok()?;
  let lat = parts.next()?.parse().ok()?;
  Some((lon, lat))
}

/// Items keyed by id. When an item produced several rows the first one wins.
pub(crate) fn parse_items(body: &[u8]) -> Result<HashMap<String, GatewayItem>> {
  let response: SparqlResponse = serde_json::from_slice(body)?;
  let mut items = HashMap::new();
  for bindings in &response.results.bindings {
    let row = Row(bindings);
    let Some(id) = row.item_id() else { continue };
    if !items.contains_key(id) {
      items.insert(id.to_owned(), row.into_item(id));
    }
  }
  Ok(items)
}

/// Crossref hits in response order, one per (name, id) pair.
pub(crate) fn parse_taxonomy_items(body: &[u8]) -> Result<Vec<TaxonomyItem>> {
  let response: SparqlResponse = serde_json::from_slice(body)?;
  let mut seen = HashSet::new();
  let mut out = Vec::new();
  for bindings in &response.results.bindings {
    let row = Row(bindings);
    let (Some(id), Some(name)) = (row.item_id(), row.get("commonsCategory")) else {
      continue;
    };
    if seen.insert((name.to_owned(), id.to_owned())) {
      out.push(TaxonomyItem {
        taxonomy_name: name.to_owned(),
        canonical_id:  id.to_owned(),
        item:          row.into_item(id),
      });
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn uri(id: &str) -> String { format!("{ENTITY_PREFIX}{id}") }

  fn body(rows: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({ "head": { "vars": [] }, "results": { "bindings": rows } }))
      .unwrap()
  }

  #[test]
  fn item_ids_are_validated() {
    assert!(is_item_id("Q42"));
    assert!(!is_item_id("Q"));
    assert!(!is_item_id("P31"));
    assert!(!is_item_id("Q1 }"));
  }

  #[test]
  fn literals_are_escaped() {
    assert_eq!(literal(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    assert_eq!(literal("x\ny"), r#""x\ny""#);
  }

  #[test]
  fn queries_bind_their_inputs() {
    let q = items_query(&["Q1".into(), "Q2".into()], "fr");
    assert!(q.contains("VALUES ?item { wd:Q1 wd:Q2 }"));
    assert!(q.contains(r#"wikibase:language "fr,en""#));

    let q = taxonomy_query(&["Lakes of \"X\"".into()], "en");
    assert!(q.contains(r#"VALUES ?commonsCategory { "Lakes of \"X\"" }"#));
    assert!(q.contains("?item wdt:P373 ?commonsCategory."));
  }

  #[test]
  fn parses_full_item_row() {
    let body = body(json!([{
      "item":            { "type": "uri", "value": uri("Q90") },
      "itemLabel":       { "type": "literal", "value": "Paris" },
      "itemDescription": { "type": "literal", "value": "capital of France" },
      "commonsCategory": { "type": "literal", "value": "Paris" },
      "coord":           { "type": "literal", "value": "Point(2.3514 48.8575)" },
      "area":            { "type": "literal", "value": "105400000" },
      "image":           { "type": "uri", "value": "http://commons.wikimedia.org/wiki/Special:FilePath/Paris.jpg" },
      "aliases":         { "type": "literal", "value": "City of Light\u{1f}Lutetia" },
      "classes":         { "type": "literal", "value": format!("{} {}", uri("Q515"), uri("Q5119")) },
    }]));

    let items = parse_items(&body).unwrap();
    let paris = &items["Q90"];
    assert_eq!(paris.label.as_deref(), Some("Paris"));
    assert_eq!(paris.description.as_deref(), Some("capital of France"));
    assert_eq!(paris.taxonomy_name.as_deref(), Some("Paris"));
    assert_eq!(paris.longitude, Some(2.3514));
    assert_eq!(paris.latitude, Some(48.8575));
    assert_eq!(paris.area_sqm, Some(105_400_000.0));
    assert_eq!(paris.aliases, vec!["City of Light", "Lutetia"]);
    assert_eq!(paris.instance_of_ids, vec!["Q515", "Q5119"]);
    assert!(paris.image_url.is_some());
  }

  #[test]
  fn label_echoing_id_is_dropped() {
    let body = body(json!([{
      "item":      { "type": "uri", "value": uri("Q7") },
      "itemLabel": { "type": "literal", "value": "Q7" },
      "aliases":   { "type": "literal", "value": "" },
      "classes":   { "type": "literal", "value": "" },
    }]));

    let item = &parse_items(&body).unwrap()["Q7"];
    assert_eq!(item.label, None);
    assert!(item.aliases.is_empty());
    assert!(item.instance_of_ids.is_empty());
    assert_eq!(item.latitude, None);
  }

  #[test]
  fn first_row_per_item_wins() {
    let body = body(json!([
      { "item": { "value": uri("Q1") }, "coord": { "value": "Point(1 2)" } },
      { "item": { "value": uri("Q1") }, "coord": { "value": "Point(3 4)" } },
    ]));

    let items = parse_items(&body).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items["Q1"].longitude, Some(1.0));
  }

  #[test]
  fn parses_taxonomy_rows() {
    let body = body(json!([
      { "item": { "value": uri("Q5") }, "commonsCategory": { "value": "Lakes" } },
      { "item": { "value": uri("Q5") }, "commonsCategory": { "value": "Lakes" } },
      { "item": { "value": uri("Q6") } },
    ]));

    let hits = parse_taxonomy_items(&body).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].taxonomy_name, "Lakes");
    assert_eq!(hits[0].canonical_id, "Q5");
    assert_eq!(hits[0].item.taxonomy_name.as_deref(), Some("Lakes"));
  }

  #[test]
  fn malformed_body_is_a_parse_error() {
    assert!(matches!(
      parse_items(b"<html>"),
      Err(crate::GatewayError::Parse(_))
    ));
  }
}
