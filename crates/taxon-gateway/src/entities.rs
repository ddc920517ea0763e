//! `wbgetentities` parsing: labels, descriptions and redirects.

use std::collections::HashMap;

use serde::Deserialize;
use taxon_core::gateway::LabelEntry;

use crate::{GatewayError, Result};

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
  #[serde(default)]
  entities: HashMap<String, Entity>,
  error:    Option<ApiFailure>,
}

#[derive(Debug, Deserialize)]
struct ApiFailure {
  code: String,
  #[serde(default)]
  info: String,
}

#[derive(Debug, Deserialize)]
struct Entity {
  id:           Option<String>,
  missing:      Option<serde_json::Value>,
  redirects:    Option<Redirect>,
  #[serde(default)]
  labels:       HashMap<String, Term>,
  #[serde(default)]
  descriptions: HashMap<String, Term>,
}

#[derive(Debug, Deserialize)]
struct Redirect {
  from: String,
  to:   String,
}

#[derive(Debug, Deserialize)]
struct Term {
  value: String,
}

/// The first of `languages` with a value, else the value of the smallest
/// language code.
fn pick(terms: &HashMap<String, Term>, languages: &[String]) -> Option<String> {
  languages
    .iter()
    .find_map(|l| terms.get(l))
    .or_else(|| terms.iter().min_by(|a, b| a.0.cmp(b.0)).map(|(_, t)| t))
    .map(|t| t.value.trim().to_owned())
    .filter(|v| !v.is_empty())
}

/// Entries keyed by the id that was asked for. Missing entities are absent.
pub(crate) fn parse_labels(body: &[u8], languages: &[String]) -> Result<HashMap<String, LabelEntry>> {
  let response: EntitiesResponse = serde_json::from_slice(body)?;
  if let Some(failure) = response.error {
    return Err(GatewayError::Api { code: failure.code, info: failure.info });
  }

  let mut out = HashMap::with_capacity(response.entities.len());
  for (key, entity) in response.entities {
    if entity.missing.is_some() {
      continue;
    }

    // A merged item comes back either with an explicit redirect record or
    // under the id it was merged into.
    let (requested, redirect_target) = match (&entity.redirects, &entity.id) {
      (Some(r), _) => (r.from.clone(), Some(r.to.clone())),
      (None, Some(id)) if *id != key => (key.clone(), Some(id.clone())),
      _ => (key.clone(), None),
    };
    let redirect_target = redirect_target.filter(|to| *to != requested);

    out.insert(requested, LabelEntry {
      label: pick(&entity.labels, languages),
      description: pick(&entity.descriptions, languages),
      redirect_target,
    });
  }
  Ok(out)
}
