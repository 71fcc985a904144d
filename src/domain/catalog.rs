//! Field catalog: the `{model -> field -> {scalarType, dottedPath}}` source
//! of `field` token metadata.
//!
//! The catalog is owned elsewhere; this module only validates, looks up and
//! filters it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::error::DomainError;
use crate::domain::token::TokenMetadata;

/// One catalog entry as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub scalar_type: String,
    pub dotted_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A field as handed to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub model: String,
    pub name: String,
    pub field_type: String,
    pub data_path: String,
    pub unit: Option<String>,
}

impl FieldDescriptor {
    pub fn new(model: &str, name: &str, field_type: &str, data_path: &str) -> Self {
        Self {
            model: model.to_string(),
            name: name.to_string(),
            field_type: field_type.to_string(),
            data_path: data_path.to_string(),
            unit: None,
        }
    }

    /// `Model.field`, the name shown in pickers.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.model, self.name)
    }

    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            field_type: Some(self.field_type.clone()),
            data_path: Some(self.data_path.clone()),
            unit: self.unit.clone(),
        }
    }
}

fn dotted_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("dotted path pattern compiles")
    })
}

/// Hierarchical field catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCatalog {
    models: BTreeMap<String, BTreeMap<String, FieldSpec>>,
}

impl FieldCatalog {
    /// Build a catalog, rejecting entries whose dotted path is malformed.
    pub fn from_models(
        models: BTreeMap<String, BTreeMap<String, FieldSpec>>,
    ) -> Result<Self, DomainError> {
        let catalog = Self { models };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (model, fields) in &self.models {
            for (field, spec) in fields {
                if !dotted_path_regex().is_match(&spec.dotted_path) {
                    return Err(DomainError::InvalidCatalogEntry {
                        model: model.clone(),
                        field: field.clone(),
                        message: format!("malformed dotted path '{}'", spec.dotted_path),
                    });
                }
                if spec.scalar_type.trim().is_empty() {
                    return Err(DomainError::InvalidCatalogEntry {
                        model: model.clone(),
                        field: field.clone(),
                        message: "missing scalar type".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Built-in clinical sample catalog used when none is configured.
    pub fn sample() -> Self {
        let spec = |scalar_type: &str, dotted_path: &str, unit: Option<&str>| FieldSpec {
            scalar_type: scalar_type.to_string(),
            dotted_path: dotted_path.to_string(),
            unit: unit.map(str::to_string),
        };
        let mut models = BTreeMap::new();
        models.insert(
            "Patient".to_string(),
            BTreeMap::from([
                ("Age".to_string(), spec("number", "Patient.Age", Some("years"))),
                ("Gender".to_string(), spec("string", "Patient.Gender", None)),
                ("BirthDate".to_string(), spec("date", "Patient.BirthDate", None)),
                ("IsDeceased".to_string(), spec("boolean", "Patient.IsDeceased", None)),
            ]),
        );
        models.insert(
            "LabResult".to_string(),
            BTreeMap::from([
                ("Value".to_string(), spec("number", "LabResult.Value", None)),
                ("Code".to_string(), spec("string", "LabResult.Code", None)),
                ("Unit".to_string(), spec("string", "LabResult.Unit", None)),
                ("EffectiveDate".to_string(), spec("date", "LabResult.EffectiveDate", None)),
            ]),
        );
        models.insert(
            "Medication".to_string(),
            BTreeMap::from([
                ("Name".to_string(), spec("string", "Medication.Name", None)),
                ("Code".to_string(), spec("string", "Medication.Code", None)),
                ("CodeSystem".to_string(), spec("string", "Medication.CodeSystem", None)),
                ("Strength".to_string(), spec("number", "Medication.Strength", Some("mg"))),
            ]),
        );
        Self { models }
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every field, ordered by model then field name.
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.models
            .iter()
            .flat_map(|(model, fields)| {
                fields.iter().map(move |(name, spec)| FieldDescriptor {
                    model: model.clone(),
                    name: name.clone(),
                    field_type: spec.scalar_type.clone(),
                    data_path: spec.dotted_path.clone(),
                    unit: spec.unit.clone(),
                })
            })
            .collect()
    }

    /// Resolve a field by dotted path or `Model.field`, case-insensitively.
    pub fn lookup(&self, path: &str) -> Result<FieldDescriptor, DomainError> {
        let wanted = path.trim();
        self.fields()
            .into_iter()
            .find(|f| {
                f.data_path.eq_ignore_ascii_case(wanted) || f.qualified_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| DomainError::UnknownField(path.to_string()))
    }

    /// Filter fields by name.
    ///
    /// Substring matches on `Model.field` or the dotted path rank first
    /// (earlier match position wins), then fuzzy subsequence matches by
    /// score. An empty query returns everything.
    #[instrument(level = "debug", skip(self))]
    pub fn filter(&self, query: &str) -> Vec<FieldDescriptor> {
        let query = query.trim();
        if query.is_empty() {
            return self.fields();
        }
        let needle = query.to_lowercase();
        let matcher = SkimMatcherV2::default().ignore_case();

        let ranked = self
            .fields()
            .into_iter()
            .filter_map(|field| {
                let qualified = field.qualified_name();
                let substring = [qualified.to_lowercase(), field.data_path.to_lowercase()]
                    .iter()
                    .filter_map(|hay| hay.find(&needle))
                    .min();
                if let Some(pos) = substring {
                    return Some((0u8, -(pos as i64), field));
                }
                let fuzzy = matcher
                    .fuzzy_match(&qualified, query)
                    .into_iter()
                    .chain(matcher.fuzzy_match(&field.data_path, query))
                    .max()?;
                Some((1u8, fuzzy, field))
            })
            .sorted_by(|a, b| {
                a.0.cmp(&b.0)
                    .then_with(|| b.1.cmp(&a.1))
                    .then_with(|| a.2.data_path.cmp(&b.2.data_path))
            })
            .map(|(_, _, field)| field)
            .collect::<Vec<_>>();
        debug!(query, hits = ranked.len(), "catalog filter");
        ranked
    }
}
